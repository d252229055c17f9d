//! Joining the bus.
//!
//! [`join`] admits a session with the engine and hands back a [`Session`]
//! that owns the paired [`Sender`] and [`Receiver`].

use std::sync::Arc;
use std::time::Duration;

use ipbus_types::config::BusConfig;
use ipbus_types::error::{EngineError, JoinError};
use ipbus_types::{Options, SessionHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::{BusEngine, JoinRequest};
use crate::receiver::Receiver;
use crate::sender::Sender;

/// A joined session.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    options: Options,
    sender: Sender,
    receiver: Receiver,
}

impl Session {
    pub fn id(&self) -> SessionHandle {
        self.handle
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Separate the two halves so they can move to different tasks.
    pub fn split(self) -> (Sender, Receiver) {
        (self.sender, self.receiver)
    }
}

/// Join the bus described by `options` with the default configuration.
///
/// `timeout` of `None` waits indefinitely.
pub async fn join(
    engine: Arc<dyn BusEngine>,
    options: Options,
    timeout: Option<Duration>,
) -> Result<Session, JoinError> {
    join_with_config(engine, options, timeout, &BusConfig::default()).await
}

/// Join the bus, using `config` for the retry policy and receive polling.
///
/// An `Unavailable` engine is retried every `join.retry_interval_ms` up to
/// `join.max_attempts` times; every other engine failure is returned as is.
pub async fn join_with_config(
    engine: Arc<dyn BusEngine>,
    options: Options,
    timeout: Option<Duration>,
    config: &BusConfig,
) -> Result<Session, JoinError> {
    if options.identifier.trim().is_empty() {
        return Err(JoinError::InvalidOptions(
            "identifier must not be empty".to_string(),
        ));
    }

    let request = JoinRequest::from_options(&options);
    let deadline = timeout.map(|t| Instant::now() + t);
    let max_attempts = config.join.max_attempts.max(1);
    let mut attempt = 0u32;

    info!(
        bus.identifier = %options.identifier,
        labels = %options.label,
        controller_affinity = options.controller_affinity,
        "joining bus"
    );

    let handle = loop {
        attempt += 1;
        let remaining = remaining_until(deadline)?;

        let result = {
            let engine = Arc::clone(&engine);
            let request = request.clone();
            tokio::task::spawn_blocking(move || engine.join(&request, remaining))
                .await
                .map_err(|e| JoinError::Engine(EngineError::Internal(e.to_string())))?
        };

        match result {
            Ok(handle) => break handle,
            Err(EngineError::Unavailable(reason)) if attempt < max_attempts => {
                let mut wait = config.join.retry_interval();
                if let Some(remaining) = remaining_until(deadline)? {
                    wait = wait.min(remaining);
                }
                debug!(
                    bus.identifier = %options.identifier,
                    attempt,
                    max_attempts,
                    %reason,
                    "bus unavailable, retrying join"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => {
                warn!(bus.identifier = %options.identifier, attempt, error = %err, "join failed");
                return Err(err.into());
            }
        }
    };

    info!(bus.identifier = %options.identifier, bus.session_id = %handle, "joined bus");

    let sender = Sender::new(Arc::clone(&engine), handle);
    let receiver = Receiver::new(
        engine,
        handle,
        options.label.clone(),
        config.receiver.poll_interval(),
    );

    Ok(Session {
        handle,
        options,
        sender,
        receiver,
    })
}

/// Time left before `deadline`, or `Timeout` once it has passed.
fn remaining_until(deadline: Option<Instant>) -> Result<Option<Duration>, JoinError> {
    match deadline {
        None => Ok(None),
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                Err(JoinError::Timeout)
            } else {
                Ok(Some(remaining))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Message, Resource};
    use ipbus_types::config::{JoinConfig, ReceiverConfig};
    use ipbus_types::{BytesMessage, Selector, labels};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers joins from a script; once the script runs out it repeats
    /// `fallback`.
    struct ScriptedEngine {
        script: Mutex<VecDeque<Result<SessionHandle, EngineError>>>,
        fallback: Result<SessionHandle, EngineError>,
        requests: Mutex<Vec<JoinRequest>>,
    }

    impl ScriptedEngine {
        fn new(
            script: Vec<Result<SessionHandle, EngineError>>,
            fallback: Result<SessionHandle, EngineError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl BusEngine for ScriptedEngine {
        fn join(
            &self,
            request: &JoinRequest,
            _timeout: Option<Duration>,
        ) -> Result<SessionHandle, EngineError> {
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }

        fn send(
            &self,
            _: SessionHandle,
            _: Selector,
            _: BytesMessage,
            _: Vec<Resource>,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        fn recv_blocking(&self, _: SessionHandle, _: Duration) -> Result<Message, EngineError> {
            Err(EngineError::TimedOut)
        }

        fn try_recv(&self, _: SessionHandle) -> Result<Option<Message>, EngineError> {
            Ok(None)
        }

        fn close_receiver(&self, _: SessionHandle) {}
    }

    fn fast_retry(max_attempts: u32) -> BusConfig {
        BusConfig {
            join: JoinConfig {
                retry_interval_ms: 10,
                max_attempts,
            },
            ..BusConfig::default()
        }
    }

    fn unavailable() -> EngineError {
        EngineError::Unavailable("no controller".into())
    }

    #[tokio::test]
    async fn join_builds_paired_halves() {
        let handle = SessionHandle::new();
        let engine = ScriptedEngine::new(vec![], Ok(handle));
        let options = Options::new("solar.com", labels!("cc"), "tok");

        let session = join(engine.clone(), options, Some(Duration::from_secs(1)))
            .await
            .unwrap();

        assert_eq!(session.id(), handle);
        assert_eq!(session.options().identifier, "solar.com");
        assert_eq!(session.sender().session(), handle);
        assert_eq!(session.receiver().poll_interval(), Duration::from_secs(1));

        let (sender, receiver) = session.split();
        assert_eq!(sender.session(), receiver.session());

        let requests = engine.requests.lock().unwrap();
        assert_eq!(requests[0].token, "tok");
        assert!(requests[0].label.contains("cc"));
    }

    #[tokio::test]
    async fn token_mismatch_is_not_retried() {
        let engine = ScriptedEngine::new(vec![], Err(EngineError::TokenMismatch));
        let options = Options::new("solar.com", labels!("cc"), "wrong");

        let err = join_with_config(engine.clone(), options, None, &fast_retry(5))
            .await
            .unwrap_err();

        assert_eq!(err, JoinError::TokenMismatch);
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn unavailable_engine_is_retried() {
        let handle = SessionHandle::new();
        let engine = ScriptedEngine::new(vec![Err(unavailable()), Err(unavailable())], Ok(handle));
        let options = Options::new("solar.com", labels!("cc"), "");

        let session = join_with_config(engine.clone(), options, None, &fast_retry(5))
            .await
            .unwrap();

        assert_eq!(session.id(), handle);
        assert_eq!(engine.calls(), 3);
    }

    #[tokio::test]
    async fn retries_stop_after_max_attempts() {
        let engine = ScriptedEngine::new(vec![], Err(unavailable()));
        let options = Options::new("solar.com", labels!("cc"), "");

        let err = join_with_config(engine.clone(), options, None, &fast_retry(3))
            .await
            .unwrap_err();

        assert!(matches!(err, JoinError::Unavailable(_)));
        assert_eq!(engine.calls(), 3);
    }

    #[tokio::test]
    async fn deadline_during_retry_is_a_timeout() {
        let engine = ScriptedEngine::new(vec![], Err(unavailable()));
        let options = Options::new("solar.com", labels!("cc"), "");
        let config = BusConfig {
            join: JoinConfig {
                retry_interval_ms: 50,
                max_attempts: 1_000,
            },
            ..BusConfig::default()
        };

        let err = join_with_config(engine, options, Some(Duration::from_millis(120)), &config)
            .await
            .unwrap_err();

        assert_eq!(err, JoinError::Timeout);
    }

    #[tokio::test]
    async fn empty_identifier_is_rejected_locally() {
        let engine = ScriptedEngine::new(vec![], Ok(SessionHandle::new()));
        let options = Options::new("  ", labels!("cc"), "");

        let err = join(engine.clone(), options, None).await.unwrap_err();

        assert!(matches!(err, JoinError::InvalidOptions(_)));
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn receiver_uses_configured_poll_interval() {
        let engine = ScriptedEngine::new(vec![], Ok(SessionHandle::new()));
        let options = Options::new("solar.com", labels!("cc"), "");
        let config = BusConfig {
            receiver: ReceiverConfig {
                poll_interval_ms: 250,
            },
            ..BusConfig::default()
        };

        let session = join_with_config(engine, options, None, &config).await.unwrap();
        assert_eq!(session.receiver().poll_interval(), Duration::from_millis(250));
    }
}
