//! The sending half of a session.

use std::sync::Arc;

use ipbus_types::error::SendError;
use ipbus_types::{BytesMessage, Selector, SessionHandle};
use tracing::debug;

use crate::engine::{BusEngine, Resource};

/// Publishes messages into the bus on behalf of one session.
///
/// Stateless apart from the session handle: cloning is cheap and clones may
/// send concurrently without any client-side locking. The engine is told
/// once the last clone is dropped.
#[derive(Clone)]
pub struct Sender {
    shared: Arc<SenderShared>,
}

struct SenderShared {
    engine: Arc<dyn BusEngine>,
    session: SessionHandle,
}

impl Drop for SenderShared {
    fn drop(&mut self) {
        self.engine.close_sender(self.session);
        debug!(session = %self.session, "sender closed");
    }
}

impl Sender {
    pub(crate) fn new(engine: Arc<dyn BusEngine>, session: SessionHandle) -> Self {
        Self {
            shared: Arc::new(SenderShared { engine, session }),
        }
    }

    /// Hand a message to the engine.
    ///
    /// Returns once the engine has accepted the message for delivery, which
    /// says nothing about whether any session received it. Errors are
    /// surfaced as-is; retrying is up to the caller.
    pub fn send(
        &self,
        selector: Selector,
        payload: BytesMessage,
        resources: Vec<Resource>,
    ) -> Result<(), SendError> {
        debug!(
            session = %self.shared.session,
            label_op = %selector.label_op,
            mode = %selector.mode,
            format = payload.format,
            resources = resources.len(),
            "sending message"
        );

        self.shared
            .engine
            .send(self.shared.session, selector, payload, resources)
            .map_err(SendError::from)
    }

    pub fn session(&self) -> SessionHandle {
        self.shared.session
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("session", &self.shared.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{JoinRequest, Message};
    use ipbus_types::error::EngineError;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records sends and fails with a fixed error once `fail_with` is set.
    #[derive(Default)]
    struct RecordingEngine {
        sent: Mutex<Vec<(Selector, BytesMessage, usize)>>,
        fail_with: Mutex<Option<EngineError>>,
        closed_senders: Mutex<Vec<SessionHandle>>,
    }

    impl BusEngine for RecordingEngine {
        fn join(&self, _: &JoinRequest, _: Option<Duration>) -> Result<SessionHandle, EngineError> {
            Ok(SessionHandle::new())
        }

        fn send(
            &self,
            _session: SessionHandle,
            selector: Selector,
            payload: BytesMessage,
            resources: Vec<Resource>,
        ) -> Result<(), EngineError> {
            if let Some(err) = self.fail_with.lock().unwrap().clone() {
                return Err(err);
            }
            self.sent
                .lock()
                .unwrap()
                .push((selector, payload, resources.len()));
            Ok(())
        }

        fn recv_blocking(&self, _: SessionHandle, _: Duration) -> Result<Message, EngineError> {
            Err(EngineError::TimedOut)
        }

        fn try_recv(&self, _: SessionHandle) -> Result<Option<Message>, EngineError> {
            Ok(None)
        }

        fn close_receiver(&self, _: SessionHandle) {}

        fn close_sender(&self, session: SessionHandle) {
            self.closed_senders.lock().unwrap().push(session);
        }
    }

    #[test]
    fn send_forwards_to_engine() {
        let engine = Arc::new(RecordingEngine::default());
        let sender = Sender::new(engine.clone(), SessionHandle::new());

        sender
            .send(
                Selector::unicast("cc"),
                BytesMessage::new(3, vec![0u8; 8]),
                vec![Resource::Buffer(vec![1, 2, 3])],
            )
            .unwrap();

        let sent = engine.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.format, 3);
        assert_eq!(sent[0].2, 1);
    }

    #[test]
    fn clones_share_the_session() {
        let engine = Arc::new(RecordingEngine::default());
        let sender = Sender::new(engine.clone(), SessionHandle::new());
        let clone = sender.clone();
        assert_eq!(sender.session(), clone.session());

        clone
            .send(Selector::multicast("a"), BytesMessage::new(0, vec![]), vec![])
            .unwrap();
        assert_eq!(engine.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn engine_hears_when_last_clone_drops() {
        let engine = Arc::new(RecordingEngine::default());
        let session = SessionHandle::new();
        let sender = Sender::new(engine.clone(), session);
        let clone = sender.clone();

        drop(sender);
        assert!(engine.closed_senders.lock().unwrap().is_empty());

        drop(clone);
        assert_eq!(*engine.closed_senders.lock().unwrap(), vec![session]);
    }

    #[test]
    fn closed_session_maps_to_send_error() {
        let engine = Arc::new(RecordingEngine::default());
        *engine.fail_with.lock().unwrap() = Some(EngineError::UnknownSession);
        let sender = Sender::new(engine, SessionHandle::new());

        let err = sender
            .send(Selector::unicast("a"), BytesMessage::new(0, vec![]), vec![])
            .unwrap_err();
        assert_eq!(err, SendError::Closed);
    }

    #[test]
    fn oversized_payload_is_rejected_without_retry() {
        let engine = Arc::new(RecordingEngine::default());
        *engine.fail_with.lock().unwrap() =
            Some(EngineError::PayloadTooLarge { size: 100, max: 10 });
        let sender = Sender::new(engine.clone(), SessionHandle::new());

        let err = sender
            .send(Selector::unicast("a"), BytesMessage::new(0, vec![0; 100]), vec![])
            .unwrap_err();
        assert!(matches!(err, SendError::Rejected(_)));
        assert!(engine.sent.lock().unwrap().is_empty());
    }
}
