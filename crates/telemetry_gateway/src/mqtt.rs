mod command_publisher;
mod subscriber;
mod topic;

pub use command_publisher::*;
pub use subscriber::*;
pub use topic::{command_topic, parse_topic, status_subscription, ParsedTopic};
