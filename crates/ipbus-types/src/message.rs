//! Payload and handle types carried across the engine boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The byte envelope exchanged between sessions.
///
/// `format` is an application-defined tag the bus never inspects; receivers
/// use it to interpret `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytesMessage {
    pub format: u32,
    pub data: Vec<u8>,
}

impl BytesMessage {
    pub fn new(format: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }
}

/// Opaque capability naming an engine-managed resource.
///
/// The client holds a reference; the engine owns the resource's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(u64);

impl Object {
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Engine-issued identifier of a joined session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    /// Issue a fresh, time-sortable handle.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_message_json_shape() {
        let msg = BytesMessage::new(3, vec![1u8, 2, 3]);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"format":3,"data":[1,2,3]}"#);
    }

    #[test]
    fn object_value_is_raw() {
        assert_eq!(Object::from_raw(42).value(), 42);
    }

    #[test]
    fn session_handles_are_unique() {
        assert_ne!(SessionHandle::new(), SessionHandle::new());
    }
}
