//! The bus engine boundary.
//!
//! A [`BusEngine`] matches labels across sessions, routes messages and owns
//! shared memory. The client side of ipbus only ever talks to it through the
//! narrow synchronous interface below; in particular there is no unbounded
//! blocking receive, only [`BusEngine::recv_blocking`] with a timeout and the
//! non-blocking [`BusEngine::try_recv`].
//!
//! Implementations live in `ipbus-infra` (e.g. `LocalEngine`).

use std::time::Duration;

use ipbus_types::error::EngineError;
use ipbus_types::{BytesMessage, LabelSet, Object, Options, Selector, SessionHandle, Version};

use crate::region::MemoryRegion;

/// Everything the engine needs to admit a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub identifier: String,
    pub label: LabelSet,
    pub token: String,
    pub controller_affinity: bool,
    /// Client protocol version, checked for compatibility by the engine.
    pub version: Version,
}

impl JoinRequest {
    pub fn from_options(options: &Options) -> Self {
        Self {
            identifier: options.identifier.clone(),
            label: options.label.clone(),
            token: options.token.clone(),
            controller_affinity: options.controller_affinity,
            version: Version::current(),
        }
    }
}

/// A resource transferred alongside a message.
#[derive(Debug, Clone)]
pub enum Resource {
    /// Bytes the engine copies into a fresh shared region.
    Buffer(Vec<u8>),
    /// An object handle forwarded as-is.
    Object(Object),
    /// An existing region forwarded without copying.
    Region(MemoryRegion),
}

/// A message as delivered to a receiver: envelope, the selector it was sent
/// with, and its attached resources.
#[derive(Debug, Clone)]
pub struct Message {
    pub selector: Selector,
    pub payload: BytesMessage,
    pub objects: Vec<Object>,
    pub memory_regions: Vec<MemoryRegion>,
}

impl Message {
    pub fn new(selector: Selector, payload: BytesMessage) -> Self {
        Self {
            selector,
            payload,
            objects: Vec::new(),
            memory_regions: Vec::new(),
        }
    }
}

/// Operations a bus engine provides to clients.
///
/// Every method is synchronous. `send` and `recv_blocking` may be called
/// concurrently for the same session; the engine serializes internally.
/// `close_receiver` must not block and must wake any in-flight
/// `recv_blocking` for the session, which then fails with
/// [`EngineError::Closed`].
pub trait BusEngine: Send + Sync {
    /// Admit a session, waiting at most `timeout` (forever if `None`).
    fn join(
        &self,
        request: &JoinRequest,
        timeout: Option<Duration>,
    ) -> Result<SessionHandle, EngineError>;

    /// Accept a message into the delivery pipeline. Returning `Ok` is not a
    /// delivery acknowledgement.
    fn send(
        &self,
        session: SessionHandle,
        selector: Selector,
        payload: BytesMessage,
        resources: Vec<Resource>,
    ) -> Result<(), EngineError>;

    /// Wait up to `timeout` for the next message addressed to `session`.
    /// Fails with [`EngineError::TimedOut`] when nothing arrives in time.
    fn recv_blocking(
        &self,
        session: SessionHandle,
        timeout: Duration,
    ) -> Result<Message, EngineError>;

    /// Take the next already-queued message, if any, without waiting.
    fn try_recv(&self, session: SessionHandle) -> Result<Option<Message>, EngineError>;

    /// Stop delivery to `session` and release its receive-side resources.
    fn close_receiver(&self, session: SessionHandle);

    /// Every sender of `session` is gone. Once its receiver is closed too,
    /// the engine may forget the session.
    fn close_sender(&self, _session: SessionHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipbus_types::labels;

    #[test]
    fn join_request_copies_options() {
        let options = Options::new("solar.com", labels!("cc"), "secret")
            .with_controller_affinity(false);
        let request = JoinRequest::from_options(&options);

        assert_eq!(request.identifier, "solar.com");
        assert!(request.label.contains("cc"));
        assert_eq!(request.token, "secret");
        assert!(!request.controller_affinity);
        assert_eq!(request.version, Version::current());
    }

    #[test]
    fn message_starts_without_resources() {
        let msg = Message::new(Selector::unicast("a"), BytesMessage::new(1, b"hi".to_vec()));
        assert!(msg.objects.is_empty());
        assert!(msg.memory_regions.is_empty());
    }
}
