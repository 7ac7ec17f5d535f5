use common::domain::{DomainError, DomainResult};

/// Parsed status topic `<namespace>/<vehicle_id>/<subject>`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub namespace: String,
    pub vehicle_id: String,
    pub subject: String,
}

/// Parse an MQTT topic in the format `<namespace>/<vehicle_id>/<subject>`
///
/// Segments past the third are ignored.
///
/// # Examples
/// ```
/// use telemetry_gateway::mqtt::parse_topic;
///
/// let parsed = parse_topic("vehicles/veh-1/status").unwrap();
/// assert_eq!(parsed.vehicle_id, "veh-1");
/// ```
pub fn parse_topic(topic: &str) -> DomainResult<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();

    if parts.len() < 3 {
        return Err(DomainError::MalformedTopic(topic.to_string()));
    }

    if parts[1].is_empty() {
        return Err(DomainError::MalformedTopic(topic.to_string()));
    }

    Ok(ParsedTopic {
        namespace: parts[0].to_string(),
        vehicle_id: parts[1].to_string(),
        subject: parts[2].to_string(),
    })
}

/// Wildcard filter covering every vehicle's status subject under `prefix`
pub fn status_subscription(prefix: &str) -> String {
    format!("{}/+/status", prefix)
}

/// Topic on which `vehicle_id` receives commands
pub fn command_topic(prefix: &str, vehicle_id: &str) -> String {
    format!("{}/{}/command", prefix, vehicle_id)
}
