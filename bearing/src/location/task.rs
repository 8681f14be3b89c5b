//! Acquisition task: one caller-facing request driven to completion.
//!
//! A [`LocationTask`] binds a request policy to exactly one backend. Starting
//! it yields a [`LocationHandle`] that receives [`LocationEvent`]s and can
//! cancel the request.
//!
//! # State Machine
//!
//! ```text
//! Created ──start──► Running ──fix/failure──► Completed
//!                       │
//!                       ├──────timer────────► TimedOut
//!                       └──────cancel───────► Cancelled
//! ```
//!
//! Exactly one terminal transition wins. Events are only emitted by the
//! transition that wins, so a cancelled task never reports anything.
//!
//! # Example
//!
//! ```ignore
//! let task = LocationTask::new(&backends, &host)?
//!     .accuracy(Accuracy::High)
//!     .fallback(FallbackMode::UseCache, Duration::from_secs(15));
//!
//! let mut handle = task.current()?;
//! match handle.next_event().await {
//!     Some(LocationEvent::Update(fix)) => println!("{}", fix),
//!     Some(LocationEvent::Timeout) => println!("timed out"),
//!     _ => println!("no fix"),
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::accuracy::Accuracy;
use super::backend::{
    BackendEvent, BackendSet, HostPlatform, PositionBackend, UpdateReceiver,
};
use super::error::LocationError;
use super::filter::RecurringFilter;
use super::fix::Fix;
use super::registry::RequestId;
use super::request::{FallbackMode, LocationRequest};

/// Lifecycle state of a started task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Cancelled,
    TimedOut,
}

impl TaskState {
    /// Whether the task has reached a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Created | TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Created => write!(f, "created"),
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Cancelled => write!(f, "cancelled"),
            TaskState::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Event delivered to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// A position fix.
    Update(Fix),
    /// No fix arrived within the fallback timeout.
    Timeout,
    /// No fix could be obtained.
    Failure,
}

/// Builder for location requests bound to one backend.
pub struct LocationTask {
    backend: Arc<dyn PositionBackend>,
    request: LocationRequest,
}

impl LocationTask {
    /// Select a backend for this host and bind a task to it.
    pub fn new(backends: &BackendSet, host: &dyn HostPlatform) -> Result<Self, LocationError> {
        let backend = backends.select(host)?;
        Ok(Self::with_backend(backend))
    }

    /// Bind a task to a specific backend.
    pub fn with_backend(backend: Arc<dyn PositionBackend>) -> Self {
        backend.create();
        debug!(backend = backend.name(), "Location task bound to backend");
        Self {
            backend,
            request: LocationRequest::default(),
        }
    }

    pub fn accuracy(mut self, accuracy: Accuracy) -> Self {
        self.request.accuracy = accuracy;
        self
    }

    pub fn cache(mut self, use_cache: bool, expiry: Duration) -> Self {
        self.request = self.request.with_cache(use_cache, expiry);
        self
    }

    pub fn fallback(mut self, mode: FallbackMode, timeout: Duration) -> Self {
        self.request = self.request.with_fallback(mode, timeout);
        self
    }

    /// Recurring policy. A negative displacement disables the displacement
    /// filter.
    pub fn tracking(mut self, displacement_m: f64, rate: Duration, fallback: Duration) -> Self {
        self.request = self.request.with_tracking(displacement_m, rate, fallback);
        self
    }

    /// Replace the whole request policy.
    pub fn request(mut self, request: LocationRequest) -> Self {
        self.request = request;
        self
    }

    /// The policy the task will run with.
    pub fn policy(&self) -> &LocationRequest {
        &self.request
    }

    /// Name of the bound backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Freshest cached fix satisfying the task's policy.
    pub fn last_location(&self) -> Option<Fix> {
        self.backend.last_known_location(&self.request)
    }

    /// Request a single fix.
    ///
    /// A qualifying cached fix completes the task immediately without
    /// registering with the backend.
    pub fn current(&self) -> Result<LocationHandle, LocationError> {
        self.request.validate()?;
        let runtime = Handle::try_current().map_err(|_| LocationError::NoRuntime)?;
        let (events, receiver) = mpsc::unbounded_channel();

        if self.request.use_cache {
            if let Some(fix) = self.backend.last_known_location(&self.request) {
                debug!(fix = %fix, "Single request answered from cache");
                let _ = events.send(LocationEvent::Update(fix));
                let shared = TaskShared::new(Arc::clone(&self.backend), None, TaskState::Completed);
                return Ok(LocationHandle::new(shared, receiver));
            }
        }

        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let id = self.backend.request_single_update(&self.request, backend_tx);
        let shared = TaskShared::new(Arc::clone(&self.backend), Some(id), TaskState::Running);

        info!(
            request_id = %id,
            backend = self.backend.name(),
            accuracy = %self.request.accuracy,
            timeout_ms = self.request.fallback_timeout.as_millis() as u64,
            "Single location request started"
        );

        runtime.spawn(drive_single(
            Arc::clone(&shared),
            self.request.clone(),
            backend_rx,
            events,
        ));

        Ok(LocationHandle::new(shared, receiver))
    }

    /// Request fixes until cancelled.
    pub fn track(&self) -> Result<LocationHandle, LocationError> {
        self.request.validate_tracking()?;
        let runtime = Handle::try_current().map_err(|_| LocationError::NoRuntime)?;
        let (events, receiver) = mpsc::unbounded_channel();

        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let id = self.backend.request_recurring_updates(&self.request, backend_tx);
        let shared = TaskShared::new(Arc::clone(&self.backend), Some(id), TaskState::Running);

        info!(
            request_id = %id,
            backend = self.backend.name(),
            accuracy = %self.request.accuracy,
            displacement_m = ?self.request.tracking_displacement,
            "Recurring location request started"
        );

        runtime.spawn(drive_recurring(
            Arc::clone(&shared),
            self.request.clone(),
            backend_rx,
            events,
        ));

        Ok(LocationHandle::new(shared, receiver))
    }
}

impl fmt::Debug for LocationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationTask")
            .field("backend", &self.backend.name())
            .field("request", &self.request)
            .finish()
    }
}

type EventSender = mpsc::UnboundedSender<LocationEvent>;

/// State shared between a handle and its driver.
struct TaskShared {
    state: Mutex<TaskState>,
    backend: Arc<dyn PositionBackend>,
    request_id: Option<RequestId>,
    cancellation: CancellationToken,
}

impl TaskShared {
    fn new(
        backend: Arc<dyn PositionBackend>,
        request_id: Option<RequestId>,
        state: TaskState,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            backend,
            request_id,
            cancellation: CancellationToken::new(),
        })
    }

    /// Leave `Running` for `to`, running `emit` under the state lock.
    /// Returns false if another transition already won.
    fn finish(&self, to: TaskState, emit: impl FnOnce()) -> bool {
        let mut state = self.state.lock();
        if *state != TaskState::Running {
            return false;
        }
        *state = to;
        emit();
        true
    }

    /// Send an event while still running.
    fn emit(&self, events: &EventSender, event: LocationEvent) -> bool {
        let state = self.state.lock();
        if *state != TaskState::Running {
            return false;
        }
        events.send(event).is_ok()
    }

    fn release(&self) {
        if let Some(id) = self.request_id {
            self.backend.cancel_updates(id);
        }
    }

    fn cancel(&self) {
        if self.finish(TaskState::Cancelled, || {}) {
            self.cancellation.cancel();
            self.release();
            debug!(request_id = ?self.request_id, "Location request cancelled");
        }
    }

    fn complete(&self, events: &EventSender, event: Option<BackendEvent>) {
        let event = match event {
            Some(BackendEvent::Update(fix)) => LocationEvent::Update(fix),
            Some(BackendEvent::Failure) | None => LocationEvent::Failure,
        };
        let failed = event == LocationEvent::Failure;

        if self.finish(TaskState::Completed, || {
            let _ = events.send(event);
        }) {
            self.release();
            if failed {
                warn!(request_id = ?self.request_id, "Location request failed");
            } else {
                debug!(request_id = ?self.request_id, "Location request completed");
            }
        }
    }

    fn time_out(&self, request: &LocationRequest, events: &EventSender) {
        if !self.finish(TaskState::TimedOut, || {
            let _ = events.send(LocationEvent::Timeout);
        }) {
            return;
        }

        self.release();
        warn!(
            request_id = ?self.request_id,
            timeout_ms = request.fallback_timeout.as_millis() as u64,
            "Location request timed out"
        );

        if request.fallback_mode == FallbackMode::UseCache {
            let event = match self.backend.last_known_location(request) {
                Some(fix) => {
                    debug!(fix = %fix, "Falling back to last known fix");
                    LocationEvent::Update(fix)
                }
                None => LocationEvent::Failure,
            };
            let _ = events.send(event);
        }
    }
}

async fn drive_single(
    shared: Arc<TaskShared>,
    request: LocationRequest,
    mut backend_rx: UpdateReceiver,
    events: EventSender,
) {
    let armed = request.has_timeout();
    let timer = tokio::time::sleep(request.fallback_timeout);
    tokio::pin!(timer);

    tokio::select! {
        biased;
        _ = shared.cancellation.cancelled() => {}
        () = &mut timer, if armed => shared.time_out(&request, &events),
        event = backend_rx.recv() => shared.complete(&events, event),
        _ = events.closed() => shared.cancel(),
    }
}

async fn drive_recurring(
    shared: Arc<TaskShared>,
    request: LocationRequest,
    mut backend_rx: UpdateReceiver,
    events: EventSender,
) {
    let mut filter = RecurringFilter::from_request(&request);
    let mut armed = request.has_timeout();
    let timer = tokio::time::sleep(request.fallback_timeout);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = shared.cancellation.cancelled() => return,
            () = &mut timer, if armed => {
                shared.time_out(&request, &events);
                return;
            }
            event = backend_rx.recv() => match event {
                Some(BackendEvent::Update(fix)) => {
                    armed = false;
                    if !filter.offer(&fix, Instant::now()) {
                        debug!(request_id = ?shared.request_id, "Filtered recurring fix");
                        continue;
                    }
                    if !shared.emit(&events, LocationEvent::Update(fix)) {
                        return;
                    }
                }
                other => {
                    shared.complete(&events, other);
                    return;
                }
            },
            _ = events.closed() => {
                shared.cancel();
                return;
            }
        }
    }
}

/// Caller's handle on a started task.
///
/// Dropping the handle cancels the task.
pub struct LocationHandle {
    shared: Arc<TaskShared>,
    events: mpsc::UnboundedReceiver<LocationEvent>,
}

impl LocationHandle {
    fn new(shared: Arc<TaskShared>, events: mpsc::UnboundedReceiver<LocationEvent>) -> Self {
        Self { shared, events }
    }

    /// Cancel the task. No event is emitted. No-op once terminated.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Current state snapshot.
    pub fn state(&self) -> TaskState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Backend registration id, if the task registered.
    pub fn request_id(&self) -> Option<RequestId> {
        self.shared.request_id
    }

    /// Wait for the next event. Returns `None` once the task has finished
    /// and every event has been read.
    pub async fn next_event(&mut self) -> Option<LocationEvent> {
        self.events.recv().await
    }

    /// Take an already delivered event without waiting.
    pub fn try_next_event(&mut self) -> Option<LocationEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for LocationHandle {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}

impl fmt::Debug for LocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationHandle")
            .field("state", &self.state())
            .field("request_id", &self.shared.request_id)
            .finish()
    }
}
