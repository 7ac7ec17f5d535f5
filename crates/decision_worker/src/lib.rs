pub mod dead_letter;
mod decision_worker;
pub mod domain;
pub mod http;
pub mod inference;

pub use decision_worker::*;
