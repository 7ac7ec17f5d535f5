mod http_recognizer;
mod stub_recognizer;

pub use http_recognizer::*;
pub use stub_recognizer::*;
