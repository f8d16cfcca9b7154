//! Response envelope shared by every outer surface. Command handlers
//! build one `Envelope` per request; transports only serialize it.

use serde::Serialize;
use serde_json::Value;

use crate::engine::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub message: String,
    /// Stable machine-readable error class; absent on success.
    #[serde(rename = "errorKind", skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl Envelope {
    pub fn ok<T: Serialize>(data: T, message: impl Into<String>) -> Self {
        // Unit-ish payloads serialize to null; collapse them so the
        // envelope omits `data` instead of carrying `"data": null`.
        let data = serde_json::to_value(data).ok().filter(|v| !v.is_null());
        Self { success: true, data, message: message.into(), error_kind: None }
    }

    pub fn err(error: &EngineError) -> Self {
        Self {
            success: false,
            data: None,
            message: error.to_string(),
            error_kind: Some(error.kind()),
        }
    }
}

/// Fold a command result into the envelope, with `message` used on the
/// success path.
pub fn respond<T: Serialize>(message: &str, result: Result<T, EngineError>) -> Envelope {
    match result {
        Ok(data) => Envelope::ok(data, message),
        Err(e) => Envelope::err(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssignmentSummary, RoomStatus};

    #[test]
    fn ok_envelope_carries_data_and_message() {
        let summary = AssignmentSummary { assigned_count: 2, room_status: RoomStatus::Reserved };
        let env = Envelope::ok(summary, "rooms assigned");
        assert!(env.success);
        assert_eq!(env.message, "rooms assigned");
        assert_eq!(env.error_kind, None);
        let data = env.data.unwrap();
        assert_eq!(data["assignedCount"], 2);
        assert_eq!(data["roomStatus"], "Reserved");
    }

    #[test]
    fn err_envelope_names_the_kind() {
        let env = Envelope::err(&EngineError::Busy("booking row"));
        assert!(!env.success);
        assert_eq!(env.error_kind, Some("Busy"));
        assert!(env.message.contains("booking row"));
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["errorKind"], "Busy");
    }

    #[test]
    fn unit_result_omits_data_key() {
        let env = respond("done", Ok(()));
        assert!(env.success);
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("data").is_none());
        assert!(json.get("errorKind").is_none());
    }
}
