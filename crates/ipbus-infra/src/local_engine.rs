//! In-process bus engine.
//!
//! `LocalEngine` hosts any number of buses inside the current process, keyed
//! by identifier. It routes the way a bus controller does:
//!
//! - Sessions are kept in join order. A message goes to every open session
//!   whose labels satisfy the selector (multicast) or to the first one
//!   (unicast).
//! - A message no session accepts is dropped when its TTL is zero. Otherwise
//!   it is held until the TTL expires and offered again whenever a session
//!   joins the bus.
//! - Each session has a mailbox guarded by a mutex and condition variable;
//!   `recv_blocking` waits on it with a timeout.
//! - A session is forgotten once its receiver is closed and its last sender
//!   is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ipbus_core::{BusEngine, JoinRequest, MemoryRegion, Message, Resource};
use ipbus_types::config::EngineConfig;
use ipbus_types::error::EngineError;
use ipbus_types::{BytesMessage, LabelSet, Selector, SelectorMode, SessionHandle, Version};
use tracing::{debug, trace};

use crate::region_arena::RegionArena;

/// Tag of arena regions holding copied `Resource::Buffer` payloads.
const BUFFER_TAG: &str = "buffer";

/// An in-process [`BusEngine`].
pub struct LocalEngine {
    config: EngineConfig,
    buses: DashMap<String, Arc<Bus>>,
    sessions: DashMap<SessionHandle, SessionEntry>,
}

#[derive(Clone)]
struct SessionEntry {
    bus: Arc<Bus>,
    endpoint: Arc<Endpoint>,
}

struct Bus {
    identifier: String,
    token: String,
    state: Mutex<BusState>,
}

struct BusState {
    endpoints: Vec<Arc<Endpoint>>,
    pending: Vec<(Instant, Message)>,
    arena: RegionArena,
}

struct Endpoint {
    session: SessionHandle,
    labels: LabelSet,
    mailbox: Mutex<Mailbox>,
    ready: Condvar,
}

#[derive(Default)]
struct Mailbox {
    queue: VecDeque<Message>,
    closed: bool,
    sender_closed: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Endpoint {
    fn is_open(&self) -> bool {
        !lock(&self.mailbox).closed
    }

    /// Queue `message`; `false` if the mailbox is closed.
    fn deliver(&self, message: Message) -> bool {
        let mut mailbox = lock(&self.mailbox);
        if mailbox.closed {
            return false;
        }
        mailbox.queue.push_back(message);
        self.ready.notify_one();
        true
    }
}

impl BusState {
    /// Offer `message` to the open endpoints. Returns it back if nobody took it.
    fn route(&self, message: Message) -> Option<Message> {
        let mut routed = false;

        for endpoint in &self.endpoints {
            if routed && message.selector.mode == SelectorMode::Unicast {
                break;
            }
            if !message.selector.label_op.matches(&endpoint.labels) || !endpoint.is_open() {
                continue;
            }
            if endpoint.deliver(message.clone()) {
                trace!(session = %endpoint.session, label_op = %message.selector.label_op, "delivered");
                routed = true;
            }
        }

        if routed { None } else { Some(message) }
    }

    /// Re-offer held messages, dropping the ones that expired.
    fn flush_pending(&mut self, now: Instant) {
        let pending = std::mem::take(&mut self.pending);
        for (expires, message) in pending {
            if expires <= now {
                continue;
            }
            if let Some(message) = self.route(message) {
                self.pending.push((expires, message));
            }
        }
    }
}

impl LocalEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            buses: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of sessions with an open receiver on bus `identifier`.
    pub fn open_sessions(&self, identifier: &str) -> usize {
        let Some(bus) = self.buses.get(identifier).map(|b| Arc::clone(b.value())) else {
            return 0;
        };
        let state = lock(&bus.state);
        state.endpoints.iter().filter(|e| e.is_open()).count()
    }

    /// Number of sessions the engine still tracks, across all buses.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of messages held for late joiners on bus `identifier`.
    pub fn pending_messages(&self, identifier: &str) -> usize {
        self.buses
            .get(identifier)
            .map(|bus| lock(&bus.state).pending.len())
            .unwrap_or(0)
    }

    fn release(&self, entry: &SessionEntry, session: SessionHandle) {
        self.sessions.remove(&session);
        debug!(bus.identifier = %entry.bus.identifier, bus.session_id = %session, "session released");
    }

    fn session(&self, session: SessionHandle) -> Result<SessionEntry, EngineError> {
        self.sessions
            .get(&session)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::UnknownSession)
    }

    /// Find the bus for `request`, creating it when the session may become
    /// its controller.
    fn bus_for(&self, request: &JoinRequest) -> Result<Arc<Bus>, EngineError> {
        let existing = self
            .buses
            .get(&request.identifier)
            .map(|bus| Arc::clone(bus.value()));

        match existing {
            Some(bus) => Ok(bus),
            None if request.controller_affinity => {
                let bus = self
                    .buses
                    .entry(request.identifier.clone())
                    .or_insert_with(|| {
                        debug!(bus.identifier = %request.identifier, "creating bus");
                        Arc::new(Bus {
                            identifier: request.identifier.clone(),
                            token: request.token.clone(),
                            state: Mutex::new(BusState {
                                endpoints: Vec::new(),
                                pending: Vec::new(),
                                arena: RegionArena::new(self.config.region_idle()),
                            }),
                        })
                    });
                Ok(Arc::clone(bus.value()))
            }
            None => Err(EngineError::Unavailable(format!(
                "no controller for bus '{}'",
                request.identifier
            ))),
        }
    }

    fn collect_resources(
        &self,
        state: &mut BusState,
        resources: Vec<Resource>,
        message: &mut Message,
    ) -> Result<(), EngineError> {
        for resource in resources {
            match resource {
                Resource::Buffer(bytes) => {
                    let region = state.arena.alloc(bytes.len(), Some(BUFFER_TAG));
                    copy_into(&region, &bytes)?;
                    message.memory_regions.push(region);
                }
                Resource::Object(object) => message.objects.push(object),
                Resource::Region(region) => message.memory_regions.push(region),
            }
        }
        Ok(())
    }
}

fn copy_into(region: &MemoryRegion, bytes: &[u8]) -> Result<(), EngineError> {
    let mut view = region
        .map_mut(..bytes.len())
        .map_err(|e| EngineError::Region(e.to_string()))?;
    view.copy_from_slice(bytes);
    Ok(())
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl BusEngine for LocalEngine {
    /// Local joins never wait, so `timeout` is not consulted.
    fn join(
        &self,
        request: &JoinRequest,
        _timeout: Option<Duration>,
    ) -> Result<SessionHandle, EngineError> {
        if request.identifier.trim().is_empty() {
            return Err(EngineError::InvalidIdentifier);
        }
        if !request.version.compatible(Version::current()) {
            return Err(EngineError::VersionMismatch(Version::current()));
        }

        let bus = self.bus_for(request)?;
        if bus.token != request.token {
            return Err(EngineError::TokenMismatch);
        }

        let endpoint = Arc::new(Endpoint {
            session: SessionHandle::new(),
            labels: request.label.clone(),
            mailbox: Mutex::new(Mailbox::default()),
            ready: Condvar::new(),
        });
        let session = endpoint.session;

        {
            let mut state = lock(&bus.state);
            state.endpoints.push(Arc::clone(&endpoint));
            if !state.pending.is_empty() {
                state.flush_pending(Instant::now());
            }
        }

        self.sessions.insert(
            session,
            SessionEntry {
                bus: Arc::clone(&bus),
                endpoint,
            },
        );

        debug!(
            bus.identifier = %bus.identifier,
            bus.session_id = %session,
            labels = %request.label,
            "session joined"
        );
        Ok(session)
    }

    fn send(
        &self,
        session: SessionHandle,
        selector: Selector,
        payload: BytesMessage,
        resources: Vec<Resource>,
    ) -> Result<(), EngineError> {
        let entry = self.session(session)?;

        let max = self.config.max_message_size;
        if payload.data.len() > max {
            return Err(EngineError::PayloadTooLarge {
                size: payload.data.len(),
                max,
            });
        }

        let ttl = selector.ttl_duration();
        let mut message = Message::new(selector, payload);
        let mut state = lock(&entry.bus.state);
        self.collect_resources(&mut state, resources, &mut message)?;

        if let Some(message) = state.route(message) {
            if ttl.is_zero() {
                trace!(bus.identifier = %entry.bus.identifier, "unroutable message dropped");
            } else {
                let now = Instant::now();
                state.pending.retain(|(expires, _)| *expires > now);
                state.pending.push((now + ttl, message));
                trace!(bus.identifier = %entry.bus.identifier, ?ttl, "unroutable message held");
            }
        }
        Ok(())
    }

    fn recv_blocking(
        &self,
        session: SessionHandle,
        timeout: Duration,
    ) -> Result<Message, EngineError> {
        let endpoint = self.session(session)?.endpoint;
        let deadline = Instant::now() + timeout;

        let mut mailbox = lock(&endpoint.mailbox);
        loop {
            if mailbox.closed {
                return Err(EngineError::Closed);
            }
            if let Some(message) = mailbox.queue.pop_front() {
                return Ok(message);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(EngineError::TimedOut);
            }
            mailbox = endpoint
                .ready
                .wait_timeout(mailbox, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn try_recv(&self, session: SessionHandle) -> Result<Option<Message>, EngineError> {
        let endpoint = self.session(session)?.endpoint;
        let mut mailbox = lock(&endpoint.mailbox);
        if mailbox.closed {
            return Err(EngineError::Closed);
        }
        Ok(mailbox.queue.pop_front())
    }

    fn close_receiver(&self, session: SessionHandle) {
        let Ok(entry) = self.session(session) else {
            return;
        };

        let sender_closed = {
            let mut mailbox = lock(&entry.endpoint.mailbox);
            mailbox.closed = true;
            mailbox.queue.clear();
            mailbox.sender_closed
        };
        entry.endpoint.ready.notify_all();

        lock(&entry.bus.state)
            .endpoints
            .retain(|endpoint| endpoint.session != session);
        debug!(bus.identifier = %entry.bus.identifier, bus.session_id = %session, "receiver closed");

        if sender_closed {
            self.release(&entry, session);
        }
    }

    fn close_sender(&self, session: SessionHandle) {
        let Ok(entry) = self.session(session) else {
            return;
        };

        let receiver_closed = {
            let mut mailbox = lock(&entry.endpoint.mailbox);
            mailbox.sender_closed = true;
            mailbox.closed
        };
        if receiver_closed {
            self.release(&entry, session);
        }
    }
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("buses", &self.buses.len())
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}
