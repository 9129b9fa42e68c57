use serde::ser::{Serialize, SerializeStruct, Serializer};

use changeflow_core::{DomainError, DomainResult, ErrorKind};

/// Response envelope handed back to the boundary layer.
///
/// Serializes as `{"ok": true, "data": ...}` or
/// `{"ok": false, "errorKind": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Err { kind: ErrorKind, message: String },
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Err { kind, .. } => Some(*kind),
        }
    }
}

impl<T> From<DomainResult<T>> for Outcome<T> {
    fn from(result: DomainResult<T>) -> Self {
        match result {
            Ok(data) => Outcome::Ok(data),
            Err(err) => err.into(),
        }
    }
}

impl<T> From<DomainError> for Outcome<T> {
    fn from(err: DomainError) -> Self {
        Outcome::Err {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Ok(data) => {
                let mut state = serializer.serialize_struct("Outcome", 2)?;
                state.serialize_field("ok", &true)?;
                state.serialize_field("data", data)?;
                state.end()
            }
            Outcome::Err { kind, message } => {
                let mut state = serializer.serialize_struct("Outcome", 3)?;
                state.serialize_field("ok", &false)?;
                state.serialize_field("errorKind", kind)?;
                state.serialize_field("message", message)?;
                state.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope() {
        let outcome: Outcome<u32> = Ok(7).into();
        assert!(outcome.is_ok());
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({"ok": true, "data": 7}));
    }

    #[test]
    fn failure_envelope_carries_kind_and_message() {
        let result: DomainResult<u32> = Err(DomainError::invalid_transition(
            "cannot send requests to audit while status is Pending (requires Approved)",
        ));
        let outcome = Outcome::from(result);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::InvalidTransition));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "ok": false,
                "errorKind": "InvalidTransition",
                "message": "cannot send requests to audit while status is Pending (requires Approved)",
            })
        );
    }
}
