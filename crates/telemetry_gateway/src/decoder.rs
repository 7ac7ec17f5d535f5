use crate::mqtt::parse_topic;
use common::domain::{DomainError, DomainResult, StatusRecord};

/// Decode a status event into the vehicle it came from and its status record.
///
/// The topic is checked first; the payload is never parsed for a malformed topic.
pub fn decode_status(topic: &str, payload: &[u8]) -> DomainResult<(String, StatusRecord)> {
    let parsed = parse_topic(topic)?;

    let status: StatusRecord = serde_json::from_slice(payload)
        .map_err(|e| DomainError::MalformedPayload(e.to_string()))?;

    Ok((parsed.vehicle_id, status))
}
