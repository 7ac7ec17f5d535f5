mod client;
mod decision_repository;
mod vehicle_status_repository;

pub use client::*;
pub use decision_repository::*;
pub use vehicle_status_repository::*;
