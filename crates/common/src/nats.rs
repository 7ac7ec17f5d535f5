mod artifact_store;
mod client;

pub use artifact_store::*;
pub use client::*;
