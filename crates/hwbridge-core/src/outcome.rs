use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BridgeError;

/// Tagged result handed to callers.
///
/// Serialized as `{"success": true, "payload": …}` or
/// `{"success": false, "error": "<code>", "message": "<detail>"}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure { error: String, message: String },
}

impl<T> Outcome<T> {
    pub fn failure(error: impl Into<String>, message: impl Into<String>) -> Self {
        Outcome::Failure {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(payload) => Outcome::Success(f(payload)),
            Outcome::Failure { error, message } => Outcome::Failure { error, message },
        }
    }

    /// Error code of a failure.
    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure { error, .. } => Some(error),
        }
    }
}

impl<T> From<Result<T, BridgeError>> for Outcome<T> {
    fn from(result: Result<T, BridgeError>) -> Self {
        match result {
            Ok(payload) => Outcome::Success(payload),
            Err(err) => Outcome::failure(err.code(), err.to_string()),
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Success(payload) => {
                let mut state = serializer.serialize_struct("Outcome", 2)?;
                state.serialize_field("success", &true)?;
                state.serialize_field("payload", payload)?;
                state.end()
            }
            Outcome::Failure { error, message } => {
                let mut state = serializer.serialize_struct("Outcome", 3)?;
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
                state.serialize_field("message", message)?;
                state.end()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
struct RawOutcome<T> {
    success: bool,
    #[serde(default)]
    payload: T,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl<'de, T> Deserialize<'de> for Outcome<T>
where
    T: Deserialize<'de> + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawOutcome::<T>::deserialize(deserializer)?;
        if raw.success {
            return Ok(Outcome::Success(raw.payload));
        }
        let error = raw.error.ok_or_else(|| D::Error::missing_field("error"))?;
        Ok(Outcome::Failure {
            message: raw.message.unwrap_or_else(|| error.clone()),
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use hwbridge_sessions::SessionsError;
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn success_shape() {
        let outcome: Outcome<Value> = Outcome::Success(json!({"session": "1"}));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"success": true, "payload": {"session": "1"}})
        );
    }

    #[test]
    fn failure_from_error() {
        let outcome: Outcome<()> = Err(BridgeError::from(SessionsError::SessionNotFound)).into();
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"success": false, "error": "session not found", "message": "session not found"})
        );
    }

    #[test]
    fn null_payload_survives_roundtrip() {
        let wire = serde_json::to_string(&Outcome::Success(Value::Null)).unwrap();
        let back: Outcome<Value> = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, Outcome::Success(Value::Null));

        let failure: Outcome<Value> =
            serde_json::from_str(r#"{"success":false,"error":"device busy"}"#).unwrap();
        assert_eq!(failure.error(), Some("device busy"));
    }
}
