//! Connection-oriented backend.
//!
//! [`ManagedBackend`] drives a [`LocationService`] that must be connected
//! before it accepts registrations. Requests made while the connection is
//! down are queued and replayed in order once it comes up.
//!
//! # Connection Lifecycle
//!
//! ```text
//!                request                success
//! Disconnected ─────────► Connecting ──────────► Connected
//!      ▲                      │                      │
//!      └──── failure/timeout ─┘                      │
//!      └───────────────────── last request gone ─────┘
//! ```
//!
//! Only one connect attempt runs at a time; further requests made while
//! connecting simply join the queue. A failed attempt is not retried: queued
//! requests wait for the next request to trigger a fresh attempt.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::{BackendEvent, FixSink, PositionBackend, RequestKind, SourceReport, UpdateSender};
use crate::location::accuracy::Priority;
use crate::location::error::ServiceError;
use crate::location::fix::Fix;
use crate::location::registry::{RequestId, SlotArena};
use crate::location::request::LocationRequest;

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A managed location service that needs a connection before use.
///
/// Implementations must not call back into the [`FixSink`] synchronously
/// from [`remove_updates`](LocationService::remove_updates) or
/// [`disconnect`](LocationService::disconnect).
pub trait LocationService: Send + Sync + 'static {
    /// Start connecting. The future resolves once the service is usable.
    fn connect(&self) -> BoxFuture<'static, Result<(), ServiceError>>;

    /// Drop the connection.
    fn disconnect(&self);

    /// The service's own last known fix, if any.
    fn last_location(&self) -> Option<Fix>;

    /// Register for updates delivered through `sink`.
    fn request_updates(&self, request: ServiceRequest, sink: FixSink) -> Result<(), ServiceError>;

    /// Stop updates for a registration.
    fn remove_updates(&self, id: RequestId);
}

impl<S: LocationService + ?Sized> LocationService for Arc<S> {
    fn connect(&self) -> BoxFuture<'static, Result<(), ServiceError>> {
        (**self).connect()
    }

    fn disconnect(&self) {
        (**self).disconnect()
    }

    fn last_location(&self) -> Option<Fix> {
        (**self).last_location()
    }

    fn request_updates(&self, request: ServiceRequest, sink: FixSink) -> Result<(), ServiceError> {
        (**self).request_updates(request, sink)
    }

    fn remove_updates(&self, id: RequestId) {
        (**self).remove_updates(id)
    }
}

/// Registration parameters in the managed service's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub priority: Priority,
    /// Stop after this many fixes.
    pub max_updates: Option<u32>,
    /// Give up after this long.
    pub expiration: Option<Duration>,
    pub interval: Duration,
    pub fastest_interval: Duration,
}

impl ServiceRequest {
    /// Parameters for a one-shot fix.
    pub fn single(request: &LocationRequest) -> Self {
        Self {
            priority: request.accuracy.priority(),
            max_updates: Some(1),
            expiration: request.has_timeout().then_some(request.fallback_timeout),
            interval: Duration::ZERO,
            fastest_interval: Duration::ZERO,
        }
    }

    /// Parameters for a stream of fixes.
    pub fn recurring(request: &LocationRequest) -> Self {
        Self {
            priority: request.accuracy.priority(),
            max_updates: None,
            expiration: None,
            interval: request.tracking_rate,
            fastest_interval: request.tracking_rate,
        }
    }

    fn for_kind(kind: RequestKind, request: &LocationRequest) -> Self {
        match kind {
            RequestKind::Single => Self::single(request),
            RequestKind::Recurring => Self::recurring(request),
        }
    }
}

/// Tuning for [`ManagedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedBackendConfig {
    /// Bound on each connect attempt. An attempt that runs over counts as a
    /// connection failure.
    pub connect_timeout: Duration,
}

impl Default for ManagedBackendConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Connection state of a [`ManagedBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

enum Slot {
    /// Waiting for the connection.
    Pending {
        kind: RequestKind,
        request: LocationRequest,
        events: UpdateSender,
    },
    /// Registered with the service. `registering` stays set until
    /// `request_updates` has returned.
    Live {
        kind: RequestKind,
        events: UpdateSender,
        registering: bool,
    },
    /// Finished or cancelled while still registering. The registering call
    /// removes it and unregisters from the service.
    Retired,
}

impl Slot {
    fn is_live(&self) -> bool {
        matches!(self, Slot::Live { .. })
    }

    fn is_registering(&self) -> bool {
        matches!(
            self,
            Slot::Live {
                registering: true,
                ..
            }
        )
    }

    fn promote(&mut self) {
        if let Slot::Pending { kind, events, .. } = self {
            let live = Slot::Live {
                kind: *kind,
                events: events.clone(),
                registering: true,
            };
            *self = live;
        }
    }
}

struct ConnectionState {
    status: ConnectionStatus,
    created: bool,
    /// Bumped on every attempt and on destroy so stale results are ignored.
    attempt: u64,
    requests: SlotArena<Slot>,
    pending: VecDeque<RequestId>,
    last_fix: Option<Fix>,
}

impl ConnectionState {
    fn live_count(&self) -> usize {
        self.requests.iter().filter(|(_, slot)| slot.is_live()).count()
    }
}

struct ManagedInner<S> {
    service: S,
    config: ManagedBackendConfig,
    runtime: Handle,
    state: Mutex<ConnectionState>,
}

/// Backend over a connection-oriented [`LocationService`].
///
/// The service is never called while the internal lock is held. Caller
/// channels are written under the lock, so once
/// [`cancel_updates`](PositionBackend::cancel_updates) returns no further
/// event for that id can be sent.
pub struct ManagedBackend<S> {
    inner: Arc<ManagedInner<S>>,
}

impl<S: LocationService> ManagedBackend<S> {
    /// Create a backend. Connect attempts are spawned on `runtime`.
    pub fn new(service: S, config: ManagedBackendConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(ManagedInner {
                service,
                config,
                runtime,
                state: Mutex::new(ConnectionState {
                    status: ConnectionStatus::Disconnected,
                    created: false,
                    attempt: 0,
                    requests: SlotArena::new(),
                    pending: VecDeque::new(),
                    last_fix: None,
                }),
            }),
        }
    }

    /// Current connection state.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status
    }

    /// Number of requests waiting for the connection.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Number of requests registered with the service.
    pub fn live_count(&self) -> usize {
        self.inner.state.lock().live_count()
    }

    fn submit(&self, kind: RequestKind, request: &LocationRequest, events: UpdateSender) -> RequestId {
        let mut state = self.inner.state.lock();

        if !state.created {
            debug!(kind = ?kind, "Managed backend not created, failing request");
            let _ = events.send(BackendEvent::Failure);
            return state.requests.reserve_released();
        }

        let id = state.requests.insert(Slot::Pending {
            kind,
            request: request.clone(),
            events,
        });

        match state.status {
            ConnectionStatus::Connected => {
                drop(state);
                self.inner.activate(id);
                self.inner.disconnect_if_idle();
            }
            ConnectionStatus::Connecting => {
                state.pending.push_back(id);
                debug!(request_id = %id, "Queued request while connecting");
            }
            ConnectionStatus::Disconnected => {
                state.pending.push_back(id);
                drop(state);
                self.inner.trigger_connect();
            }
        }

        id
    }
}

impl<S: LocationService> ManagedInner<S> {
    fn sink(self: &Arc<Self>, id: RequestId) -> FixSink {
        let weak: Weak<Self> = Arc::downgrade(self);
        FixSink::new(
            id,
            Arc::new(move |id, report| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_report(id, report);
                }
            }),
        )
    }

    /// Start a connect attempt unless one is already running.
    fn trigger_connect(self: &Arc<Self>) {
        let attempt = {
            let mut state = self.state.lock();
            if state.status != ConnectionStatus::Disconnected {
                return;
            }
            state.status = ConnectionStatus::Connecting;
            state.attempt += 1;
            state.attempt
        };

        info!(attempt, "Connecting to location service");

        let connect = self.service.connect();
        let timeout = self.config.connect_timeout;
        let weak = Arc::downgrade(self);

        self.runtime.spawn(async move {
            let result = match tokio::time::timeout(timeout, connect).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::ConnectTimeout(timeout.as_millis() as u64)),
            };
            if let Some(inner) = weak.upgrade() {
                inner.on_connect_result(attempt, result);
            }
        });
    }

    fn on_connect_result(self: &Arc<Self>, attempt: u64, result: Result<(), ServiceError>) {
        match result {
            Ok(()) => {
                let last = self.service.last_location();
                {
                    let mut state = self.state.lock();
                    if state.attempt != attempt || state.status != ConnectionStatus::Connecting {
                        drop(state);
                        debug!(attempt, "Discarding superseded connection");
                        self.service.disconnect();
                        return;
                    }
                    state.status = ConnectionStatus::Connected;
                    if last.is_some() {
                        state.last_fix = last;
                    }
                    info!(
                        attempt,
                        pending = state.pending.len(),
                        "Connected to location service"
                    );
                }
                self.replay_pending();
                self.disconnect_if_idle();
            }
            Err(e) => {
                let mut state = self.state.lock();
                if state.attempt == attempt && state.status == ConnectionStatus::Connecting {
                    state.status = ConnectionStatus::Disconnected;
                    warn!(
                        attempt,
                        error = %e,
                        pending = state.pending.len(),
                        "Location service connection failed"
                    );
                }
            }
        }
    }

    /// Activate queued requests in insertion order.
    fn replay_pending(self: &Arc<Self>) {
        loop {
            let id = {
                let mut state = self.state.lock();
                if state.status != ConnectionStatus::Connected {
                    return;
                }
                match state.pending.pop_front() {
                    Some(id) => id,
                    None => return,
                }
            };
            self.activate(id);
        }
    }

    /// Turn a pending entry into a live registration, or answer it from the
    /// last known fix.
    fn activate(self: &Arc<Self>, id: RequestId) {
        let service_request = {
            let mut state = self.state.lock();

            let (kind, request) = match state.requests.get(id) {
                Some(Slot::Pending { kind, request, .. }) => (*kind, request.clone()),
                _ => return,
            };

            if kind == RequestKind::Single && request.use_cache {
                let cached = state
                    .last_fix
                    .clone()
                    .filter(|fix| fix.satisfies(&request, Utc::now()));
                if let Some(fix) = cached {
                    if let Some(Slot::Pending { events, .. }) = state.requests.remove(id) {
                        debug!(request_id = %id, fix = %fix, "Answered single request from cache");
                        let _ = events.send(BackendEvent::Update(fix));
                    }
                    return;
                }
            }

            if let Some(slot) = state.requests.get_mut(id) {
                slot.promote();
            }
            ServiceRequest::for_kind(kind, &request)
        };

        let registered = self.service.request_updates(service_request, self.sink(id));

        match registered {
            Ok(()) => {
                // Whatever ended the request while it registered left the
                // unregistration to us.
                let ended = {
                    let mut state = self.state.lock();
                    match state.requests.get_mut(id) {
                        Some(Slot::Live { registering, .. }) => {
                            *registering = false;
                            None
                        }
                        Some(Slot::Pending { .. }) => None,
                        Some(Slot::Retired) => {
                            state.requests.remove(id);
                            Some("request ended")
                        }
                        None => Some("backend destroyed"),
                    }
                };

                match ended {
                    None => debug!(request_id = %id, "Registered with location service"),
                    Some(reason) => {
                        debug!(request_id = %id, reason, "Unregistering after registration");
                        self.service.remove_updates(id);
                    }
                }
            }
            Err(e) => {
                warn!(request_id = %id, error = %e, "Location service rejected registration");
                let mut state = self.state.lock();
                if let Some(Slot::Live { events, .. }) = state.requests.remove(id) {
                    let _ = events.send(BackendEvent::Failure);
                }
            }
        }
    }

    fn on_report(self: &Arc<Self>, id: RequestId, report: SourceReport) {
        let mut state = self.state.lock();

        if let SourceReport::Fix(fix) = &report {
            state.last_fix = Some(fix.clone());
        }

        let (kind, registering) = match state.requests.get(id) {
            Some(Slot::Live {
                kind,
                events,
                registering,
            }) => {
                let event = match report {
                    SourceReport::Fix(fix) => BackendEvent::Update(fix),
                    SourceReport::Unavailable => BackendEvent::Failure,
                };
                let terminal = *kind == RequestKind::Single || event == BackendEvent::Failure;
                let _ = events.send(event);
                if !terminal {
                    return;
                }
                (*kind, *registering)
            }
            _ => {
                debug!(request_id = %id, "Dropping report for inactive request");
                return;
            }
        };

        if registering {
            if let Some(slot) = state.requests.get_mut(id) {
                *slot = Slot::Retired;
            }
            debug!(request_id = %id, kind = ?kind, "Registration finished before it completed");
            return;
        }

        state.requests.remove(id);
        drop(state);

        debug!(request_id = %id, kind = ?kind, "Registration finished");
        self.service.remove_updates(id);
        self.disconnect_if_idle();
    }

    fn cancel(&self, id: RequestId) {
        let mut state = self.state.lock();
        if state.requests.get(id).is_some_and(Slot::is_registering) {
            if let Some(slot) = state.requests.get_mut(id) {
                *slot = Slot::Retired;
            }
            debug!(request_id = %id, "Cancelled request while registering");
            return;
        }

        match state.requests.remove(id) {
            None | Some(Slot::Retired) => {}
            Some(Slot::Pending { .. }) => {
                state.pending.retain(|queued| *queued != id);
                debug!(request_id = %id, "Cancelled pending request");
            }
            Some(Slot::Live { .. }) => {
                drop(state);
                debug!(request_id = %id, "Cancelled live registration");
                self.service.remove_updates(id);
                self.disconnect_if_idle();
            }
        }
    }

    /// Tear the connection down when no request of any kind remains.
    ///
    /// Pending entries count even after they leave the queue: they are on
    /// their way to `activate`, whose caller rechecks afterwards.
    fn disconnect_if_idle(&self) {
        {
            let mut state = self.state.lock();
            if state.status != ConnectionStatus::Connected || !state.requests.is_empty() {
                return;
            }
            state.status = ConnectionStatus::Disconnected;
        }

        info!("Disconnecting idle location service");
        self.service.disconnect();
    }

    fn destroy(&self) {
        let (drained, was_connected) = {
            let mut state = self.state.lock();
            if !state.created {
                return;
            }
            state.created = false;
            state.attempt += 1;
            state.pending.clear();
            let was_connected = state.status == ConnectionStatus::Connected;
            state.status = ConnectionStatus::Disconnected;
            (state.requests.drain(), was_connected)
        };

        debug!(requests = drained.len(), "Destroying managed backend");

        // Slots still registering are unregistered by their `activate` call.
        for (id, slot) in drained {
            if slot.is_live() && !slot.is_registering() {
                self.service.remove_updates(id);
            }
        }
        if was_connected {
            self.service.disconnect();
        }
    }
}

impl<S: LocationService> PositionBackend for ManagedBackend<S> {
    fn name(&self) -> &str {
        "managed"
    }

    fn create(&self) {
        self.inner.state.lock().created = true;
    }

    fn destroy(&self) {
        self.inner.destroy();
    }

    fn last_known_location(&self, request: &LocationRequest) -> Option<Fix> {
        let state = self.inner.state.lock();
        state
            .last_fix
            .clone()
            .filter(|fix| fix.satisfies(request, Utc::now()))
    }

    fn request_single_update(
        &self,
        request: &LocationRequest,
        events: UpdateSender,
    ) -> RequestId {
        self.submit(RequestKind::Single, request, events)
    }

    fn request_recurring_updates(
        &self,
        request: &LocationRequest,
        events: UpdateSender,
    ) -> RequestId {
        self.submit(RequestKind::Recurring, request, events)
    }

    fn cancel_updates(&self, id: RequestId) {
        self.inner.cancel(id);
    }
}
