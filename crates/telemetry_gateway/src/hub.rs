mod broadcast_hub;
mod observer_session;

pub use broadcast_hub::*;
pub use observer_session::*;
