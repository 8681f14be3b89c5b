//! Recorded-fix location source.
//!
//! Plays back a JSON array of fixes through the [`LocationManager`] seam so
//! the direct backend can be driven from the command line. Fixes are emitted
//! at their offsets relative to the first recorded timestamp and restamped
//! with the wall-clock time of emission.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bearing::location::{
    Criteria, Fix, FixSink, FixSource, HostPlatform, LocationManager, ManagerError, RequestId,
    SourceKind,
};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CliError;

/// One recorded fix and when to emit it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntry {
    pub offset: Duration,
    pub fix: Fix,
}

/// Source kind a recorded fix is attributed to.
fn source_kind(source: FixSource) -> SourceKind {
    match source {
        FixSource::Gps | FixSource::Fused => SourceKind::Gps,
        FixSource::Network => SourceKind::Network,
        FixSource::Passive => SourceKind::Passive,
    }
}

/// Parse a JSON array of fixes into replay entries, ordered by timestamp.
pub fn parse_fixes(json: &str) -> Result<Vec<ReplayEntry>, String> {
    let mut fixes: Vec<Fix> = serde_json::from_str(json).map_err(|e| e.to_string())?;
    if fixes.is_empty() {
        return Err("no fixes in file".to_string());
    }
    fixes.sort_by_key(|fix| fix.timestamp);

    let start = fixes[0].timestamp;
    Ok(fixes
        .into_iter()
        .map(|fix| ReplayEntry {
            offset: (fix.timestamp - start).to_std().unwrap_or(Duration::ZERO),
            fix,
        })
        .collect())
}

struct ReplayState {
    seen: HashMap<SourceKind, Fix>,
    playbacks: HashMap<RequestId, JoinHandle<()>>,
}

/// [`LocationManager`] that plays back recorded fixes.
pub struct ReplayLocationManager {
    entries: Arc<Vec<ReplayEntry>>,
    runtime: Handle,
    state: Arc<Mutex<ReplayState>>,
}

impl ReplayLocationManager {
    pub fn new(entries: Vec<ReplayEntry>, runtime: Handle) -> Self {
        Self {
            entries: Arc::new(entries),
            runtime,
            state: Arc::new(Mutex::new(ReplayState {
                seen: HashMap::new(),
                playbacks: HashMap::new(),
            })),
        }
    }

    /// Load entries from a file.
    pub fn from_file(path: &Path, runtime: Handle) -> Result<Self, CliError> {
        let replay_error = |reason: String| CliError::Replay {
            path: path.display().to_string(),
            reason,
        };
        let json = std::fs::read_to_string(path).map_err(|e| replay_error(e.to_string()))?;
        let entries = parse_fixes(&json).map_err(replay_error)?;
        Ok(Self::new(entries, runtime))
    }

    /// Number of recorded fixes.
    pub fn fix_count(&self) -> usize {
        self.entries.len()
    }

    /// Play `entries` into `sink`, stopping after `limit` fixes. A playback
    /// that runs out of fixes reports the source as unavailable.
    fn play(&self, sink: FixSink, limit: Option<usize>) {
        let entries = Arc::clone(&self.entries);
        let state = Arc::clone(&self.state);
        let id = sink.id();

        // Held across spawn so the playback cannot deregister before it is recorded.
        let mut guard = self.state.lock();
        let playback = self.runtime.spawn(async move {
            let start = Instant::now();
            let count = limit.unwrap_or(entries.len());

            for entry in entries.iter().take(count) {
                tokio::time::sleep_until(start + entry.offset).await;
                let fix = Fix {
                    timestamp: Utc::now(),
                    ..entry.fix.clone()
                };
                state
                    .lock()
                    .seen
                    .insert(source_kind(fix.source), fix.clone());
                debug!(request_id = %id, fix = %fix, "Replaying fix");
                sink.deliver(fix);
            }

            if limit.is_none() {
                debug!(request_id = %id, "Replay exhausted");
                sink.unavailable();
            }
            state.lock().playbacks.remove(&id);
        });

        guard.playbacks.insert(id, playback);
    }
}

impl LocationManager for ReplayLocationManager {
    fn enabled_sources(&self) -> Vec<SourceKind> {
        SourceKind::PRIORITY_ORDER
            .iter()
            .copied()
            .filter(|kind| {
                self.entries
                    .iter()
                    .any(|entry| source_kind(entry.fix.source) == *kind)
            })
            .collect()
    }

    fn last_known(&self, source: SourceKind) -> Option<Fix> {
        self.state.lock().seen.get(&source).cloned()
    }

    fn best_source(&self, _criteria: &Criteria) -> Option<SourceKind> {
        self.enabled_sources().first().copied()
    }

    fn request_single(&self, _criteria: &Criteria, sink: FixSink) -> Result<(), ManagerError> {
        self.play(sink, Some(1));
        Ok(())
    }

    fn request_updates(
        &self,
        _source: SourceKind,
        _min_interval: Duration,
        sink: FixSink,
    ) -> Result<(), ManagerError> {
        self.play(sink, None);
        Ok(())
    }

    fn remove_updates(&self, id: RequestId) {
        if let Some(playback) = self.state.lock().playbacks.remove(&id) {
            playback.abort();
        }
    }
}

/// Host description for replay runs: OS location only.
pub struct ReplayHost;

impl HostPlatform for ReplayHost {
    fn managed_service_available(&self) -> bool {
        false
    }

    fn location_services_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bearing::location::{
        BackendSet, DirectBackend, LocationEvent, LocationTask, PositionBackend,
    };

    const FIXES: &str = r#"[
        {"timestamp": "2025-03-01T10:00:30Z", "latitude": 52.5200, "longitude": 13.4050, "accuracy": 10.0, "source": "gps"},
        {"timestamp": "2025-03-01T10:00:00Z", "latitude": 52.5100, "longitude": 13.4000, "accuracy": 25.0, "source": "network"},
        {"timestamp": "2025-03-01T10:01:00Z", "latitude": 52.5300, "longitude": 13.4100, "accuracy": 8.0, "source": "fused"}
    ]"#;

    fn task(manager: ReplayLocationManager) -> LocationTask {
        let backend = Arc::new(DirectBackend::new(manager)) as Arc<dyn PositionBackend>;
        LocationTask::new(&BackendSet::new().with_direct(backend), &ReplayHost).unwrap()
    }

    #[test]
    fn test_parse_orders_by_timestamp() {
        let entries = parse_fixes(FIXES).unwrap();
        let offsets: Vec<u64> = entries.iter().map(|e| e.offset.as_secs()).collect();
        assert_eq!(offsets, vec![0, 30, 60]);
        assert_eq!(entries[0].fix.source, FixSource::Network);
    }

    #[test]
    fn test_parse_rejects_empty_and_malformed() {
        assert!(parse_fixes("[]").is_err());
        assert!(parse_fixes("{}").is_err());
        assert!(parse_fixes(r#"[{"latitude": 1.0}]"#).is_err());
    }

    #[tokio::test]
    async fn test_from_file_loads_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.json");
        std::fs::write(&path, FIXES).unwrap();

        let manager = ReplayLocationManager::from_file(&path, Handle::current()).unwrap();
        assert_eq!(manager.fix_count(), 3);
    }

    #[tokio::test]
    async fn test_from_file_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.json");
        match ReplayLocationManager::from_file(&missing, Handle::current()) {
            Err(CliError::Replay { path, .. }) => assert!(path.ends_with("missing.json")),
            _ => panic!("expected a replay error for a missing file"),
        }

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();
        assert!(matches!(
            ReplayLocationManager::from_file(&empty, Handle::current()),
            Err(CliError::Replay { .. })
        ));
    }

    #[tokio::test]
    async fn test_enabled_sources_follow_recording() {
        let manager =
            ReplayLocationManager::new(parse_fixes(FIXES).unwrap(), Handle::current());
        assert_eq!(manager.fix_count(), 3);
        assert_eq!(
            manager.enabled_sources(),
            vec![SourceKind::Gps, SourceKind::Network]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_shot_takes_first_fix() {
        let manager =
            ReplayLocationManager::new(parse_fixes(FIXES).unwrap(), Handle::current());
        let mut handle = task(manager).current().unwrap();

        match handle.next_event().await {
            Some(LocationEvent::Update(fix)) => {
                assert_eq!(fix.latitude, 52.5100);
                assert_eq!(fix.source, FixSource::Network);
            }
            other => panic!("expected a fix, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracking_replays_at_offsets_then_ends() {
        let manager =
            ReplayLocationManager::new(parse_fixes(FIXES).unwrap(), Handle::current());
        let task = task(manager).tracking(-1.0, Duration::from_secs(1), Duration::from_secs(1));
        let started = Instant::now();
        let mut handle = task.track().unwrap();

        let mut arrivals = Vec::new();
        while let Some(event) = handle.next_event().await {
            match event {
                LocationEvent::Update(_) => arrivals.push(started.elapsed().as_secs()),
                LocationEvent::Failure => break,
                LocationEvent::Timeout => panic!("unexpected timeout"),
            }
        }

        assert_eq!(arrivals, vec![0, 30, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_playback() {
        let manager =
            ReplayLocationManager::new(parse_fixes(FIXES).unwrap(), Handle::current());
        let state = Arc::clone(&manager.state);
        let mut handle = task(manager).track().unwrap();

        assert!(matches!(handle.next_event().await, Some(LocationEvent::Update(_))));
        handle.cancel();

        assert!(state.lock().playbacks.is_empty());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(handle.try_next_event().is_none());
    }
}
