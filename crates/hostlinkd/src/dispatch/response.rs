//! Response envelope serialisation.
//!
//! Every request produces exactly one envelope carrying either `result` or
//! `error`, never both:
//!
//! ```json
//! {"id":1,"result":{"pong":true}}
//! {"id":1,"error":{"code":-32601,"message":"Unknown method: doesNotExist"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DispatchError;

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Wire error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// Success or failure half of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The handler's return value.
    Result(Value),
    /// The failure reported to the client.
    Error(ErrorObject),
}

/// A complete response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Id of the request being answered; `null` when unknown.
    #[serde(default)]
    pub id: Value,
    /// Result or error.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ResponseEnvelope {
    /// Creates a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(result),
        }
    }

    /// Creates an error response from a dispatch error.
    pub fn failure(id: Value, error: &DispatchError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(ErrorObject {
                code: error.code(),
                message: error.to_string(),
            }),
        }
    }

    /// Whether the response carries a result.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }

    /// The error payload, if any.
    pub fn error(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }

    /// Serialises the envelope to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler result cannot be serialised, which only
    /// happens for non-string map keys produced outside `serde_json`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn writes_success_envelope() {
        let envelope = ResponseEnvelope::success(json!(1), json!({"pong": true}));
        let text = envelope.to_json().expect("serialise");
        assert_eq!(
            serde_json::from_str::<Value>(&text).expect("json"),
            json!({"id": 1, "result": {"pong": true}})
        );
    }

    #[test]
    fn writes_error_envelope_with_null_id() {
        let envelope = ResponseEnvelope::failure(Value::Null, &DispatchError::parse("EOF"));
        let text = envelope.to_json().expect("serialise");
        assert_eq!(
            serde_json::from_str::<Value>(&text).expect("json"),
            json!({"id": null, "error": {"code": -32700, "message": "Parse error: EOF"}})
        );
    }

    #[test]
    fn reads_envelopes_back() {
        let envelope: ResponseEnvelope =
            serde_json::from_str(r#"{"id":"7","error":{"code":-32000,"message":"boom"}}"#)
                .expect("deserialise");
        assert_eq!(envelope.id, json!("7"));
        assert!(!envelope.is_success());
        assert_eq!(envelope.error().map(|error| error.code), Some(-32000));
    }
}
