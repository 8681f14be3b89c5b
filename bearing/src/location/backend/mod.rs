//! Position backend abstraction.
//!
//! A [`PositionBackend`] wraps one concrete source of fixes. Two variants
//! ship with the crate:
//!
//! - [`ManagedBackend`] - connection-oriented, drives a [`LocationService`]
//!   and queues requests until the connection is up
//! - [`DirectBackend`] - polls a [`LocationManager`] directly, no connection
//!
//! # Delivery Model
//!
//! Callers hand the backend an [`UpdateSender`] per request and receive
//! [`BackendEvent`]s on the matching receiver. External collaborators push
//! raw readings into a [`FixSink`] bound to the request id; the backend
//! drops readings for ids that are no longer live, so a cancelled request
//! never sees a late delivery.
//!
//! # Backend Selection
//!
//! [`BackendSet::select`] applies a fixed priority using a [`HostPlatform`]
//! probe: the managed service when it is installed and functional, otherwise
//! OS location services, otherwise [`LocationError::NoBackendAvailable`].

mod direct;
mod managed;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::error::LocationError;
use super::fix::Fix;
use super::registry::RequestId;
use super::request::LocationRequest;

pub use direct::{DirectBackend, LocationManager};
pub use managed::{
    ConnectionStatus, LocationService, ManagedBackend, ManagedBackendConfig, ServiceRequest,
    DEFAULT_CONNECT_TIMEOUT,
};

/// Event delivered by a backend for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// A fix for the request.
    Update(Fix),
    /// The backend could not serve the request.
    Failure,
}

/// Channel on which a backend delivers events for one request.
pub type UpdateSender = mpsc::UnboundedSender<BackendEvent>;

/// Receiving half of an [`UpdateSender`].
pub type UpdateReceiver = mpsc::UnboundedReceiver<BackendEvent>;

/// A source of position fixes.
///
/// Every method is non-blocking. Fixes arrive asynchronously on the
/// [`UpdateSender`] supplied with each request.
pub trait PositionBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Acquire backend resources. Idempotent.
    fn create(&self);

    /// Release all resources and unregister every request. Idempotent.
    fn destroy(&self);

    /// Freshest known fix satisfying the request's accuracy and expiry.
    fn last_known_location(&self, request: &LocationRequest) -> Option<Fix>;

    /// Ask for exactly one fix.
    ///
    /// Exactly one of `Update` or `Failure` is eventually sent, unless the
    /// request is cancelled first, in which case nothing is sent.
    fn request_single_update(&self, request: &LocationRequest, events: UpdateSender)
        -> RequestId;

    /// Ask for fixes until cancelled.
    ///
    /// Zero or more `Update`s are sent. A `Failure` ends the registration.
    fn request_recurring_updates(
        &self,
        request: &LocationRequest,
        events: UpdateSender,
    ) -> RequestId;

    /// Unregister a request. Unknown or finished ids are ignored.
    fn cancel_updates(&self, id: RequestId);
}

impl<B: PositionBackend + ?Sized> PositionBackend for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn create(&self) {
        (**self).create()
    }

    fn destroy(&self) {
        (**self).destroy()
    }

    fn last_known_location(&self, request: &LocationRequest) -> Option<Fix> {
        (**self).last_known_location(request)
    }

    fn request_single_update(
        &self,
        request: &LocationRequest,
        events: UpdateSender,
    ) -> RequestId {
        (**self).request_single_update(request, events)
    }

    fn request_recurring_updates(
        &self,
        request: &LocationRequest,
        events: UpdateSender,
    ) -> RequestId {
        (**self).request_recurring_updates(request, events)
    }

    fn cancel_updates(&self, id: RequestId) {
        (**self).cancel_updates(id)
    }
}

/// A raw report from an external position source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceReport {
    /// The source produced a fix.
    Fix(Fix),
    /// The source gave up on the request.
    Unavailable,
}

type Dispatch = dyn Fn(RequestId, SourceReport) + Send + Sync;

/// Delivery endpoint handed to external collaborators for one request.
///
/// Cheap to clone. Reports for a request that has since been cancelled are
/// silently dropped by the owning backend.
#[derive(Clone)]
pub struct FixSink {
    id: RequestId,
    dispatch: Arc<Dispatch>,
}

impl FixSink {
    pub(crate) fn new(id: RequestId, dispatch: Arc<Dispatch>) -> Self {
        Self { id, dispatch }
    }

    /// The request this sink delivers to.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Deliver a fix.
    pub fn deliver(&self, fix: Fix) {
        (self.dispatch)(self.id, SourceReport::Fix(fix));
    }

    /// Report that no fix will be produced.
    pub fn unavailable(&self) {
        (self.dispatch)(self.id, SourceReport::Unavailable);
    }
}

impl fmt::Debug for FixSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixSink").field("id", &self.id).finish()
    }
}

/// Whether a request wants one fix or a stream of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Single,
    Recurring,
}

/// Host capability probe used for backend selection.
pub trait HostPlatform: Send + Sync {
    /// Whether the managed location service is installed and functional.
    fn managed_service_available(&self) -> bool;

    /// Whether any OS location capability is present.
    fn location_services_available(&self) -> bool;
}

/// The backends a caller has constructed, shared across tasks.
#[derive(Clone, Default)]
pub struct BackendSet {
    managed: Option<Arc<dyn PositionBackend>>,
    direct: Option<Arc<dyn PositionBackend>>,
}

impl BackendSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the connection-oriented backend.
    pub fn with_managed(mut self, backend: Arc<dyn PositionBackend>) -> Self {
        self.managed = Some(backend);
        self
    }

    /// Add the direct-poll backend.
    pub fn with_direct(mut self, backend: Arc<dyn PositionBackend>) -> Self {
        self.direct = Some(backend);
        self
    }

    /// Pick a backend for the given host.
    pub fn select(&self, host: &dyn HostPlatform) -> Result<Arc<dyn PositionBackend>, LocationError> {
        if host.managed_service_available() {
            if let Some(managed) = &self.managed {
                return Ok(Arc::clone(managed));
            }
        }

        if host.location_services_available() {
            if let Some(direct) = &self.direct {
                return Ok(Arc::clone(direct));
            }
        }

        Err(LocationError::NoBackendAvailable)
    }
}

impl fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSet")
            .field("managed", &self.managed.as_ref().map(|b| b.name().to_string()))
            .field("direct", &self.direct.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}
