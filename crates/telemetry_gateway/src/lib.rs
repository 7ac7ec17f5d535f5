mod command_routes;
mod decoder;
pub mod domain;
pub mod hub;
pub mod mqtt;
mod telemetry_gateway;
mod ws;

pub use command_routes::*;
pub use decoder::decode_status;
pub use telemetry_gateway::*;
pub use ws::telemetry_routes;
