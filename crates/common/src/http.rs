mod api_error;
mod server;

pub use api_error::*;
pub use server::*;
