use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    DomainError,
    ServerError,
}

impl ResponseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Success => "SUCCESS",
            ResponseStatus::DomainError => "DOMAIN_ERROR",
            ResponseStatus::ServerError => "SERVER_ERROR",
        }
    }
}

/// Uniform response body returned by every population endpoint.
///
/// The serialized shape is `{"status", "message", "payload"?}` with `payload`
/// omitted unless the status is [`ResponseStatus::Success`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    pub fn success(message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            payload: Some(payload),
        }
    }

    pub fn domain_error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::DomainError,
            message: message.into(),
            payload: None,
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::ServerError,
            message: message.into(),
            payload: None,
        }
    }

    /// Success when `payload` carries at least one entry, otherwise a domain
    /// error with `empty_message`.
    pub fn from_payload(
        payload: serde_json::Value,
        success_message: impl Into<String>,
        empty_message: impl Into<String>,
    ) -> Self {
        if payload_is_empty(&payload) {
            Self::domain_error(empty_message)
        } else {
            Self::success(success_message, payload)
        }
    }
}

fn payload_is_empty(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::Null => true,
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape_omits_missing_payload() {
        let wire = serde_json::to_value(Envelope::domain_error("No valid population features"))
            .expect("envelope should serialize");

        assert_eq!(
            wire,
            serde_json::json!({
                "status": "DOMAIN_ERROR",
                "message": "No valid population features"
            })
        );
    }

    #[test]
    fn envelope_wire_shape_carries_success_payload() {
        let wire = serde_json::to_value(Envelope::success(
            "Generated population features",
            serde_json::json!({ "sessions": 10 }),
        ))
        .expect("envelope should serialize");

        assert_eq!(wire["status"], "SUCCESS");
        assert_eq!(wire["payload"]["sessions"], 10);
    }

    #[test]
    fn from_payload_never_reports_success_for_empty_results() {
        for empty in [
            serde_json::json!({}),
            serde_json::json!([]),
            serde_json::Value::Null,
        ] {
            let envelope = Envelope::from_payload(empty, "ok", "nothing");
            assert_eq!(envelope.status, ResponseStatus::DomainError);
            assert_eq!(envelope.message, "nothing");
            assert_eq!(envelope.payload, None);
        }

        let envelope = Envelope::from_payload(serde_json::json!(["a"]), "ok", "nothing");
        assert_eq!(envelope.status, ResponseStatus::Success);
    }

    #[test]
    fn response_status_names_match_serde_names() {
        for status in [
            ResponseStatus::Success,
            ResponseStatus::DomainError,
            ResponseStatus::ServerError,
        ] {
            let wire = serde_json::to_value(status).expect("status should serialize");
            assert_eq!(wire, status.as_str());
        }
    }
}
