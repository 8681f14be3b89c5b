//! Direct-poll backend over the OS location manager.
//!
//! No connection step: every request goes straight to the
//! [`LocationManager`]. Cached lookups consult the enabled sources that the
//! request's accuracy tier allows and keep the freshest qualifying fix.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{BackendEvent, FixSink, PositionBackend, RequestKind, SourceReport, UpdateSender};
use crate::location::accuracy::{Criteria, SourceKind};
use crate::location::error::ManagerError;
use crate::location::fix::Fix;
use crate::location::registry::{RequestId, SlotArena};
use crate::location::request::LocationRequest;

/// The OS location manager.
///
/// Implementations must not call back into the [`FixSink`] synchronously
/// from [`remove_updates`](LocationManager::remove_updates): the backend
/// calls it while handling a report.
pub trait LocationManager: Send + Sync + 'static {
    /// Sources currently switched on.
    fn enabled_sources(&self) -> Vec<SourceKind>;

    /// Last fix seen by one source.
    fn last_known(&self, source: SourceKind) -> Option<Fix>;

    /// Best enabled source for the criteria.
    fn best_source(&self, criteria: &Criteria) -> Option<SourceKind>;

    /// Ask for a single fix from whichever source matches the criteria.
    fn request_single(&self, criteria: &Criteria, sink: FixSink) -> Result<(), ManagerError>;

    /// Ask one source for a fix every `min_interval`.
    fn request_updates(
        &self,
        source: SourceKind,
        min_interval: Duration,
        sink: FixSink,
    ) -> Result<(), ManagerError>;

    /// Stop updates for a registration.
    fn remove_updates(&self, id: RequestId);
}

impl<M: LocationManager + ?Sized> LocationManager for Arc<M> {
    fn enabled_sources(&self) -> Vec<SourceKind> {
        (**self).enabled_sources()
    }

    fn last_known(&self, source: SourceKind) -> Option<Fix> {
        (**self).last_known(source)
    }

    fn best_source(&self, criteria: &Criteria) -> Option<SourceKind> {
        (**self).best_source(criteria)
    }

    fn request_single(&self, criteria: &Criteria, sink: FixSink) -> Result<(), ManagerError> {
        (**self).request_single(criteria, sink)
    }

    fn request_updates(
        &self,
        source: SourceKind,
        min_interval: Duration,
        sink: FixSink,
    ) -> Result<(), ManagerError> {
        (**self).request_updates(source, min_interval, sink)
    }

    fn remove_updates(&self, id: RequestId) {
        (**self).remove_updates(id)
    }
}

struct Registration {
    kind: RequestKind,
    events: UpdateSender,
}

struct DirectState {
    created: bool,
    requests: SlotArena<Registration>,
}

struct DirectInner<M> {
    manager: M,
    state: Mutex<DirectState>,
}

/// Backend that polls a [`LocationManager`] directly.
pub struct DirectBackend<M> {
    inner: Arc<DirectInner<M>>,
}

impl<M: LocationManager> DirectBackend<M> {
    pub fn new(manager: M) -> Self {
        Self {
            inner: Arc::new(DirectInner {
                manager,
                state: Mutex::new(DirectState {
                    created: false,
                    requests: SlotArena::new(),
                }),
            }),
        }
    }

    /// Number of registrations currently held with the manager.
    pub fn active_count(&self) -> usize {
        self.inner.state.lock().requests.len()
    }

    /// Fail a request that was never registered.
    fn reject(&self, events: UpdateSender) -> RequestId {
        let _ = events.send(BackendEvent::Failure);
        self.inner.state.lock().requests.reserve_released()
    }

    /// Reserve an id for a registration. Returns `None` if not created.
    fn register(&self, kind: RequestKind, events: &UpdateSender) -> Option<RequestId> {
        let mut state = self.inner.state.lock();
        if !state.created {
            return None;
        }
        Some(state.requests.insert(Registration {
            kind,
            events: events.clone(),
        }))
    }

    /// Drop a registration the manager refused, reporting the failure.
    fn abandon(&self, id: RequestId) {
        let mut state = self.inner.state.lock();
        if let Some(registration) = state.requests.remove(id) {
            let _ = registration.events.send(BackendEvent::Failure);
        }
    }
}

impl<M: LocationManager> DirectInner<M> {
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

    fn freshest(&self, request: &LocationRequest) -> Option<Fix> {
        let enabled = self.manager.enabled_sources();
        let now = Utc::now();

        let mut best: Option<Fix> = None;
        for source in request.accuracy.candidate_sources(&enabled) {
            let Some(fix) = self.manager.last_known(source) else {
                continue;
            };
            if !fix.satisfies(request, now) {
                continue;
            }
            // Strictly newer wins; ties keep the more precise source.
            if best.as_ref().map_or(true, |b| fix.timestamp > b.timestamp) {
                best = Some(fix);
            }
        }
        best
    }

    fn on_report(&self, id: RequestId, report: SourceReport) {
        let mut state = self.state.lock();

        let Some(registration) = state.requests.get(id) else {
            debug!(request_id = %id, "Dropping report for inactive request");
            return;
        };

        let event = match report {
            SourceReport::Fix(fix) => BackendEvent::Update(fix),
            SourceReport::Unavailable => BackendEvent::Failure,
        };
        let terminal = registration.kind == RequestKind::Single || event == BackendEvent::Failure;
        let _ = registration.events.send(event);

        if terminal {
            state.requests.remove(id);
            drop(state);
            self.manager.remove_updates(id);
        }
    }
}

impl<M: LocationManager> PositionBackend for DirectBackend<M> {
    fn name(&self) -> &str {
        "direct"
    }

    fn create(&self) {
        self.inner.state.lock().created = true;
    }

    fn destroy(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            if !state.created {
                return;
            }
            state.created = false;
            state.requests.drain()
        };

        debug!(requests = drained.len(), "Destroying direct backend");
        for (id, _) in drained {
            self.inner.manager.remove_updates(id);
        }
    }

    fn last_known_location(&self, request: &LocationRequest) -> Option<Fix> {
        self.inner.freshest(request)
    }

    fn request_single_update(
        &self,
        request: &LocationRequest,
        events: UpdateSender,
    ) -> RequestId {
        if !self.inner.state.lock().created {
            return self.reject(events);
        }

        if request.use_cache {
            if let Some(fix) = self.inner.freshest(request) {
                debug!(fix = %fix, "Answered single request from last known fix");
                let _ = events.send(BackendEvent::Update(fix));
                return self.inner.state.lock().requests.reserve_released();
            }
        }

        let Some(id) = self.register(RequestKind::Single, &events) else {
            return self.reject(events);
        };

        let criteria = request.accuracy.criteria();
        if let Err(e) = self.inner.manager.request_single(&criteria, self.inner.sink(id)) {
            warn!(request_id = %id, criteria = %criteria, error = %e, "Single update registration failed");
            self.abandon(id);
        }

        id
    }

    fn request_recurring_updates(
        &self,
        request: &LocationRequest,
        events: UpdateSender,
    ) -> RequestId {
        let Some(id) = self.register(RequestKind::Recurring, &events) else {
            return self.reject(events);
        };

        let criteria = request.accuracy.criteria();
        let Some(source) = self.inner.manager.best_source(&criteria) else {
            warn!(request_id = %id, criteria = %criteria, "No location source for recurring updates");
            self.abandon(id);
            return id;
        };

        let registered =
            self.inner
                .manager
                .request_updates(source, request.tracking_rate, self.inner.sink(id));

        match registered {
            Ok(()) => {
                debug!(request_id = %id, source = %source, "Registered for recurring updates");
            }
            Err(e) => {
                warn!(request_id = %id, source = %source, error = %e, "Recurring update registration failed");
                self.abandon(id);
            }
        }

        id
    }

    fn cancel_updates(&self, id: RequestId) {
        let removed = self.inner.state.lock().requests.remove(id);
        if removed.is_some() {
            debug!(request_id = %id, "Cancelled registration");
            self.inner.manager.remove_updates(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Accuracy, FixSource};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MockManager {
        enabled: Vec<SourceKind>,
        cached: Mutex<HashMap<SourceKind, Fix>>,
        fail_registration: AtomicBool,
        singles: Mutex<Vec<(Criteria, FixSink)>>,
        recurring: Mutex<Vec<(SourceKind, Duration, FixSink)>>,
        removed: Mutex<Vec<RequestId>>,
    }

    impl MockManager {
        fn all_enabled() -> Arc<Self> {
            Arc::new(Self {
                enabled: vec![SourceKind::Passive, SourceKind::Network, SourceKind::Gps],
                ..Default::default()
            })
        }

        fn cache(&self, source: SourceKind, age_secs: i64, accuracy_m: f32) -> Fix {
            let fix = Fix::at(
                Utc::now() - chrono::Duration::seconds(age_secs),
                40.0,
                -3.7,
                accuracy_m,
                source.into(),
            );
            self.cached.lock().insert(source, fix.clone());
            fix
        }
    }

    impl LocationManager for MockManager {
        fn enabled_sources(&self) -> Vec<SourceKind> {
            self.enabled.clone()
        }

        fn last_known(&self, source: SourceKind) -> Option<Fix> {
            self.cached.lock().get(&source).cloned()
        }

        fn best_source(&self, criteria: &Criteria) -> Option<SourceKind> {
            let wanted = match criteria.accuracy {
                crate::location::CriteriaAccuracy::Fine => SourceKind::Gps,
                _ => SourceKind::Network,
            };
            self.enabled.contains(&wanted).then_some(wanted)
        }

        fn request_single(&self, criteria: &Criteria, sink: FixSink) -> Result<(), ManagerError> {
            if self.fail_registration.load(Ordering::SeqCst) {
                return Err(ManagerError::RegistrationFailed("listener rejected".to_string()));
            }
            self.singles.lock().push((*criteria, sink));
            Ok(())
        }

        fn request_updates(
            &self,
            source: SourceKind,
            min_interval: Duration,
            sink: FixSink,
        ) -> Result<(), ManagerError> {
            if self.fail_registration.load(Ordering::SeqCst) {
                return Err(ManagerError::SourceDisabled(source.to_string()));
            }
            self.recurring.lock().push((source, min_interval, sink));
            Ok(())
        }

        fn remove_updates(&self, id: RequestId) {
            self.removed.lock().push(id);
        }
    }

    fn backend(manager: &Arc<MockManager>) -> DirectBackend<Arc<MockManager>> {
        let backend = DirectBackend::new(Arc::clone(manager));
        backend.create();
        backend
    }

    #[test]
    fn test_freshest_qualifying_fix_wins() {
        let manager = MockManager::all_enabled();
        manager.cache(SourceKind::Gps, 60, 5.0);
        let network = manager.cache(SourceKind::Network, 10, 15.0);
        let backend = backend(&manager);

        let request = LocationRequest::new().with_accuracy(Accuracy::High);
        assert_eq!(backend.last_known_location(&request), Some(network));
    }

    #[test]
    fn test_inaccurate_fix_is_skipped() {
        let manager = MockManager::all_enabled();
        let gps = manager.cache(SourceKind::Gps, 60, 5.0);
        manager.cache(SourceKind::Network, 10, 150.0);
        let backend = backend(&manager);

        let request = LocationRequest::new().with_accuracy(Accuracy::High);
        assert_eq!(backend.last_known_location(&request), Some(gps));
    }

    #[test]
    fn test_timestamp_tie_keeps_most_precise_source() {
        let manager = MockManager::all_enabled();
        let stamp = Utc::now() - chrono::Duration::seconds(5);
        for source in [SourceKind::Passive, SourceKind::Network, SourceKind::Gps] {
            manager
                .cached
                .lock()
                .insert(source, Fix::at(stamp, 1.0, 1.0, 10.0, source.into()));
        }
        let backend = backend(&manager);

        let request = LocationRequest::new().with_accuracy(Accuracy::High);
        let fix = backend.last_known_location(&request).unwrap();
        assert_eq!(fix.source, FixSource::Gps);
    }

    #[test]
    fn test_low_accuracy_only_consults_passive() {
        let manager = MockManager::all_enabled();
        manager.cache(SourceKind::Gps, 1, 5.0);
        let backend = backend(&manager);

        let request = LocationRequest::new().with_accuracy(Accuracy::Low);
        assert!(backend.last_known_location(&request).is_none());

        let passive = manager.cache(SourceKind::Passive, 100, 500.0);
        assert_eq!(backend.last_known_location(&request), Some(passive));
    }

    #[test]
    fn test_expired_fix_is_ignored() {
        let manager = MockManager::all_enabled();
        manager.cache(SourceKind::Network, 120, 10.0);
        let backend = backend(&manager);

        let request = LocationRequest::new().with_cache(true, Duration::from_secs(60));
        assert!(backend.last_known_location(&request).is_none());
    }

    #[test]
    fn test_single_cache_hit_skips_registration() {
        let manager = MockManager::all_enabled();
        let cached = manager.cache(SourceKind::Network, 5, 50.0);
        let backend = backend(&manager);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = backend.request_single_update(&LocationRequest::new(), tx);

        assert_eq!(rx.try_recv(), Ok(BackendEvent::Update(cached)));
        assert!(manager.singles.lock().is_empty());
        backend.cancel_updates(id);
        assert!(manager.removed.lock().is_empty());
    }

    #[test]
    fn test_single_without_cache_registers_and_delivers_once() {
        let manager = MockManager::all_enabled();
        manager.cache(SourceKind::Network, 5, 50.0);
        let backend = backend(&manager);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let request = LocationRequest::new()
            .with_accuracy(Accuracy::High)
            .with_cache(false, Duration::from_secs(60));
        let id = backend.request_single_update(&request, tx);

        let (criteria, sink) = manager.singles.lock()[0].clone();
        assert_eq!(criteria, Accuracy::High.criteria());
        assert_eq!(sink.id(), id);

        let fix = Fix::new(1.0, 2.0, 4.0, FixSource::Gps);
        sink.deliver(fix.clone());
        sink.deliver(fix.clone());

        assert_eq!(rx.try_recv(), Ok(BackendEvent::Update(fix)));
        assert!(rx.try_recv().is_err());
        assert_eq!(*manager.removed.lock(), vec![id]);
        assert_eq!(backend.active_count(), 0);
    }

    #[test]
    fn test_single_registration_error_becomes_failure() {
        let manager = MockManager::all_enabled();
        manager.fail_registration.store(true, Ordering::SeqCst);
        let backend = backend(&manager);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let request = LocationRequest::new().with_cache(false, Duration::from_secs(60));
        backend.request_single_update(&request, tx);

        assert_eq!(rx.try_recv(), Ok(BackendEvent::Failure));
        assert_eq!(backend.active_count(), 0);
    }

    #[test]
    fn test_recurring_uses_best_source_and_tracking_rate() {
        let manager = MockManager::all_enabled();
        let backend = backend(&manager);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let request = LocationRequest::new().with_accuracy(Accuracy::High).with_tracking(
            25.0,
            Duration::from_secs(15),
            Duration::from_secs(120),
        );
        let id = backend.request_recurring_updates(&request, tx);

        let (source, interval, sink) = manager.recurring.lock()[0].clone();
        assert_eq!(source, SourceKind::Gps);
        assert_eq!(interval, Duration::from_secs(15));

        sink.deliver(Fix::new(1.0, 1.0, 3.0, FixSource::Gps));
        sink.deliver(Fix::new(1.1, 1.0, 3.0, FixSource::Gps));
        assert!(matches!(rx.try_recv(), Ok(BackendEvent::Update(_))));
        assert!(matches!(rx.try_recv(), Ok(BackendEvent::Update(_))));

        backend.cancel_updates(id);
        sink.deliver(Fix::new(1.2, 1.0, 3.0, FixSource::Gps));
        assert!(rx.try_recv().is_err());
        assert_eq!(*manager.removed.lock(), vec![id]);
    }

    #[test]
    fn test_recurring_without_matching_source_fails() {
        let manager = Arc::new(MockManager {
            enabled: vec![SourceKind::Passive],
            ..Default::default()
        });
        let backend = backend(&manager);
        let (tx, mut rx) = mpsc::unbounded_channel();

        backend.request_recurring_updates(&LocationRequest::new(), tx);

        assert_eq!(rx.try_recv(), Ok(BackendEvent::Failure));
        assert!(manager.recurring.lock().is_empty());
    }

    #[test]
    fn test_request_before_create_fails() {
        let manager = MockManager::all_enabled();
        let backend = DirectBackend::new(Arc::clone(&manager));
        let (tx, mut rx) = mpsc::unbounded_channel();

        backend.request_recurring_updates(&LocationRequest::new(), tx);
        assert_eq!(rx.try_recv(), Ok(BackendEvent::Failure));
    }

    #[test]
    fn test_destroy_removes_all_registrations() {
        let manager = MockManager::all_enabled();
        let backend = backend(&manager);
        let (tx, _rx) = mpsc::unbounded_channel();

        let a = backend.request_recurring_updates(&LocationRequest::new(), tx.clone());
        let b = backend.request_recurring_updates(&LocationRequest::new(), tx);
        backend.destroy();
        backend.destroy();

        assert_eq!(*manager.removed.lock(), vec![a, b]);
        assert_eq!(backend.active_count(), 0);
    }
}
