//! Location acquisition.
//!
//! This module coordinates position requests against interchangeable
//! backends under caller-specified accuracy, cache, timeout and fallback
//! policy.
//!
//! # Architecture
//!
//! ```text
//! LocationRequest ──► LocationTask ──► PositionBackend ──► LocationService
//!                          │             (managed)          (connection)
//!                          │
//!                          │           PositionBackend ──► LocationManager
//!                          │             (direct)           (OS sources)
//!                          ▼
//!                   RecurringFilter ──► LocationHandle ──► caller
//! ```
//!
//! - [`LocationRequest`] - immutable policy for one request
//! - [`LocationTask`] - binds a request to one backend and starts it
//! - [`LocationHandle`] - receives [`LocationEvent`]s, cancels
//! - [`ManagedBackend`] / [`DirectBackend`] - the two backend variants
//! - [`RecurringFilter`] - gates recurring deliveries by time and distance

mod accuracy;
mod backend;
mod error;
mod filter;
mod fix;
mod registry;
mod request;
mod task;

pub use accuracy::{Accuracy, Criteria, CriteriaAccuracy, PowerRequirement, Priority, SourceKind};
pub use backend::{
    BackendEvent, BackendSet, ConnectionStatus, DirectBackend, FixSink, HostPlatform,
    LocationManager, LocationService, ManagedBackend, ManagedBackendConfig, PositionBackend,
    ServiceRequest, SourceReport, UpdateReceiver, UpdateSender, DEFAULT_CONNECT_TIMEOUT,
};
pub use error::{LocationError, ManagerError, ServiceError};
pub use filter::RecurringFilter;
pub use fix::{Fix, FixSource};
pub use registry::{RequestId, SlotArena};
pub use request::{
    FallbackMode, LocationRequest, DEFAULT_CACHE_EXPIRY, DEFAULT_FALLBACK_TIMEOUT,
    DEFAULT_TRACKING_FALLBACK, DEFAULT_TRACKING_RATE,
};
pub use task::{LocationEvent, LocationHandle, LocationTask, TaskState};
