mod decision_routes;

pub use decision_routes::*;
