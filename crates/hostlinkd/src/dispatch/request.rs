//! Request envelope parsing.
//!
//! Requests arrive as `{"id": <any>, "method": "<name>", "params": <any>}`.
//! Parsing goes through [`serde_json::Value`] rather than a derived struct so
//! that the `id` can still be echoed when the rest of the envelope is wrong.

use serde_json::{Map, Value};

use super::errors::DispatchError;

/// A parsed request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation token echoed in the response; `null` when omitted.
    pub id: Value,
    /// Method looked up case-sensitively in the registry.
    pub method: String,
    /// Handler parameters; an empty object when omitted.
    pub params: Value,
}

/// A message that could not become a [`Request`], with the id to answer on.
#[derive(Debug)]
pub struct RejectedRequest {
    /// Id recovered from the message, or `null`.
    pub id: Value,
    /// Why the message was rejected.
    pub error: DispatchError,
}

impl Request {
    /// Parses one transport message.
    ///
    /// # Errors
    ///
    /// Returns a [`RejectedRequest`] carrying [`DispatchError::Parse`] with a
    /// `null` id when the message is not a JSON object, or
    /// [`DispatchError::MethodNotFound`] with the request's id when `method`
    /// is not a string.
    pub fn parse(message: &[u8]) -> Result<Self, RejectedRequest> {
        let value: Value = serde_json::from_slice(message).map_err(|error| RejectedRequest {
            id: Value::Null,
            error: DispatchError::from_json_error(&error),
        })?;
        let Value::Object(mut object) = value else {
            return Err(RejectedRequest {
                id: Value::Null,
                error: DispatchError::parse("request must be a JSON object"),
            });
        };

        let id = object.remove("id").unwrap_or(Value::Null);
        let method = match object.remove("method") {
            None => String::new(),
            Some(Value::String(method)) => method,
            Some(other) => {
                return Err(RejectedRequest {
                    id,
                    error: DispatchError::method_not_found(other.to_string()),
                });
            }
        };
        let params = object
            .remove("params")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok(Self { id, method, params })
    }
}
