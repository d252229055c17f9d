//! The receiving half of a session.
//!
//! The engine only offers a bounded blocking receive and a non-blocking
//! drain. [`Receiver::recv`] turns those into an unbounded, cancellable async
//! wait:
//!
//! 1. Drain anything already buffered with `try_recv` (no suspension).
//! 2. With an explicit timeout, run one bounded receive and return its result,
//!    `TimedOut` included.
//! 3. Without a timeout, repeat bounded receives of `poll_interval` until one
//!    yields a message or fails with anything other than `TimedOut`.
//!
//! Bounded receives run on tokio's blocking pool and race the receiver's
//! cancellation token, so [`Receiver::close`] resolves a pending `recv` with
//! `Closed` right away instead of after the current poll.
//!
//! At most one bounded receive is in flight per receiver. A wait whose caller
//! went away stays parked in the receiver and is picked up by the next call,
//! so an abandoned `recv` can neither lose nor reorder a message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures_util::Stream;
use ipbus_types::error::{EngineError, RecvError};
use ipbus_types::{LabelSet, SessionHandle};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::engine::{BusEngine, Message};

type PendingWait = oneshot::Receiver<Result<Message, RecvError>>;

/// State shared between a [`Receiver`], its close handles and any bounded
/// receive still running on the blocking pool.
struct ReceiverShared {
    engine: Arc<dyn BusEngine>,
    session: SessionHandle,
    labels: LabelSet,
    poll_interval: Duration,
    closed: AtomicBool,
    cancel: CancellationToken,
    /// The bounded receive currently running on the blocking pool, if any.
    /// Its result is claimed before the engine is asked again.
    in_flight: Mutex<Option<PendingWait>>,
}

impl ReceiverShared {
    fn ensure_open(&self) -> Result<(), RecvError> {
        if self.closed.load(Ordering::Acquire) {
            Err(RecvError::Closed)
        } else {
            Ok(())
        }
    }

    /// Messages routed here must match our labels; anything else is an
    /// engine routing slip and is dropped.
    fn accept(&self, message: Message) -> Option<Message> {
        if message.selector.label_op.matches(&self.labels) {
            Some(message)
        } else {
            warn!(
                session = %self.session,
                label_op = %message.selector.label_op,
                "unexpected message label_op, skipping"
            );
            None
        }
    }

    fn try_recv(&self) -> Result<Option<Message>, RecvError> {
        self.ensure_open()?;

        // An async receive holds the slot while it waits.
        let Ok(mut in_flight) = self.in_flight.try_lock() else {
            return Ok(None);
        };
        if let Some(wait) = in_flight.as_mut() {
            match wait.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => return Ok(None),
                Err(oneshot::error::TryRecvError::Closed) => *in_flight = None,
                Ok(result) => {
                    *in_flight = None;
                    match result {
                        Ok(message) => return Ok(Some(message)),
                        Err(RecvError::TimedOut) => {}
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        loop {
            match self.engine.try_recv(self.session)? {
                Some(message) => {
                    if let Some(message) = self.accept(message) {
                        return Ok(Some(message));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    /// Bounded wait. Skipped messages do not extend the deadline.
    fn recv_blocking(&self, timeout: Duration) -> Result<Message, RecvError> {
        self.ensure_open()?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.engine.recv_blocking(self.session, remaining)?;
            if let Some(message) = self.accept(message) {
                return Ok(message);
            }
            if Instant::now() >= deadline {
                return Err(RecvError::TimedOut);
            }
        }
    }

    /// Start a bounded receive on the blocking pool.
    fn spawn_wait(self: &Arc<Self>, timeout: Duration) -> PendingWait {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            // A dropped slot means the receiver is gone along with the result.
            let _ = tx.send(shared.recv_blocking(timeout));
        });
        rx
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.engine.close_receiver(self.session);
        debug!(session = %self.session, "receiver closed");
    }
}

/// Receives messages addressed to one session's labels.
///
/// Meant for a single logical consumer. Dropping the receiver closes it.
pub struct Receiver {
    shared: Arc<ReceiverShared>,
}

impl Receiver {
    pub(crate) fn new(
        engine: Arc<dyn BusEngine>,
        session: SessionHandle,
        labels: LabelSet,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(ReceiverShared {
                engine,
                session,
                labels,
                poll_interval,
                closed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> SessionHandle {
        self.shared.session
    }

    /// Interval of each bounded wait inside an unbounded [`recv`](Self::recv).
    pub fn poll_interval(&self) -> Duration {
        self.shared.poll_interval
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Take a message that is already buffered, without waiting.
    pub fn try_recv(&self) -> Result<Option<Message>, RecvError> {
        self.shared.try_recv()
    }

    /// Block the calling thread for up to `timeout` waiting for a message.
    ///
    /// Do not call this from an async task; use
    /// [`recv_timeout`](Self::recv_timeout) there.
    pub fn recv_blocking(&self, timeout: Duration) -> Result<Message, RecvError> {
        self.shared.recv_blocking(timeout)
    }

    /// Wait up to `timeout` for a message without blocking the async runtime.
    ///
    /// Fails with `TimedOut` when the wait expires and with `Closed` as soon as
    /// the receiver is closed. A bounded receive left running by an earlier,
    /// abandoned call is awaited instead of starting a second one.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Message, RecvError> {
        self.shared.ensure_open()?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut in_flight = self.shared.in_flight.lock().await;
        loop {
            let wait = in_flight.get_or_insert_with(|| {
                self.shared
                    .spawn_wait(deadline.saturating_duration_since(tokio::time::Instant::now()))
            });

            let result = tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => return Err(RecvError::Closed),
                outcome = tokio::time::timeout_at(deadline, wait) => match outcome {
                    // The wait keeps running and is claimed by the next call.
                    Err(_) => return Err(RecvError::TimedOut),
                    Ok(result) => result.unwrap_or_else(|_| {
                        Err(RecvError::Engine(EngineError::Internal(
                            "blocking receive task ended without a result".to_string(),
                        )))
                    }),
                },
            };
            *in_flight = None;

            match result {
                Err(RecvError::TimedOut) if tokio::time::Instant::now() < deadline => {
                    trace!(session = %self.shared.session, "adopted wait expired early, waiting again");
                }
                result => return result,
            }
        }
    }

    /// Wait for the next message.
    ///
    /// With `Some(timeout)` this is a single bounded wait and `TimedOut` is
    /// returned to the caller. With `None` it waits until a message arrives,
    /// the receiver is closed, or the engine fails; timeouts of the internal
    /// polls are never surfaced.
    pub async fn recv(&self, timeout: Option<Duration>) -> Result<Message, RecvError> {
        if let Some(message) = self.try_recv()? {
            return Ok(message);
        }

        let Some(timeout) = timeout else {
            return self.recv_unbounded().await;
        };
        self.recv_timeout(timeout).await
    }

    async fn recv_unbounded(&self) -> Result<Message, RecvError> {
        let poll_interval = self.shared.poll_interval;
        loop {
            match self.recv_timeout(poll_interval).await {
                Err(RecvError::TimedOut) => {
                    trace!(session = %self.shared.session, ?poll_interval, "poll expired, waiting again");
                }
                result => return result,
            }
        }
    }

    /// Close the receiver. Idempotent and safe to call while a receive is in
    /// flight; every pending and future receive fails with `Closed`.
    pub fn close(&self) {
        self.shared.close();
    }

    /// A cloneable handle that can close this receiver from another task.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Turn the receiver into a stream of messages.
    ///
    /// The stream ends once the receiver is closed. An engine failure is
    /// yielded once and then ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message, RecvError>> + Send + 'static {
        async_stream::stream! {
            loop {
                match self.recv(None).await {
                    Ok(message) => yield Ok(message),
                    Err(RecvError::Closed) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("session", &self.shared.session)
            .field("labels", &self.shared.labels)
            .field("poll_interval", &self.shared.poll_interval)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Closes a [`Receiver`] from elsewhere.
#[derive(Clone)]
pub struct CloseHandle {
    shared: Arc<ReceiverShared>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("session", &self.shared.session)
            .field("closed", &self.is_closed())
            .finish()
    }
}
