mod command_service;
mod status_ingestion_service;

pub use command_service::*;
pub use status_ingestion_service::*;
