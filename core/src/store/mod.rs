//! The single mutable collection of detections and scan history.
//!
//! Every mutation recomputes [`Stats`] from the collections and bumps a
//! version observers can subscribe to. Readers always see a consistent
//! state: a refresh swaps all three collections at once or not at all.

pub mod backend;
mod stats;

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;

pub use backend::{DetectionBackend, MemoryBackend};

use crate::interface::{Detection, DetectionInput, HistoryInput, ScanHistory, Stats};
use crate::prelude::StoreError;
use crate::telemetry::LogManager;

#[derive(Debug, Default)]
struct StoreState {
    detections: Vec<Detection>,
    history: Vec<ScanHistory>,
    stats: Stats,
    // High-water marks so ids are never reused, even if a refresh drops rows.
    last_detection_id: u64,
    last_history_id: u64,
    last_error: Option<StoreError>,
}

impl StoreState {
    fn recompute(&mut self) {
        self.stats = Stats::aggregate(&self.detections, &self.history);
    }
}

/// Consistent copy of the store's visible collections.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub detections: Vec<Detection>,
    pub history: Vec<ScanHistory>,
    pub stats: Stats,
}

pub struct DetectionStore {
    state: RwLock<StoreState>,
    backend: Arc<dyn DetectionBackend>,
    version: watch::Sender<u64>,
    logger: LogManager,
}

impl DetectionStore {
    pub fn new(backend: Arc<dyn DetectionBackend>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: RwLock::new(StoreState::default()),
            backend,
            version,
            logger: LogManager::scoped("store"),
        }
    }

    /// Store backed by empty in-memory collections.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.version.send_modify(|version| *version += 1);
    }

    /// Persist a detection under the next id. Id assignment is atomic with
    /// the append, so concurrent callers never share an id. The backend is
    /// written first; if it refuses, nothing becomes visible.
    pub fn add(&self, input: DetectionInput) -> Result<Detection, StoreError> {
        input.validate()?;
        let detection = {
            let mut state = self.write();
            let existing = state.detections.iter().map(|d| d.id).max().unwrap_or(0);
            let id = state.last_detection_id.max(existing) + 1;
            let detection = input.into_detection(id);
            self.backend.persist_detection(&detection)?;
            state.last_detection_id = id;
            state.detections.push(detection.clone());
            state.recompute();
            detection
        };
        self.logger.record(&format!(
            "detection #{} stored: {} {} at {}% confidence",
            detection.id, detection.detection_method, detection.device_type, detection.confidence
        ));
        self.notify();
        Ok(detection)
    }

    pub fn record_scan(&self, input: HistoryInput) -> Result<ScanHistory, StoreError> {
        let entry = {
            let mut state = self.write();
            let existing = state.history.iter().map(|h| h.id).max().unwrap_or(0);
            let id = state.last_history_id.max(existing) + 1;
            let entry = input.into_history(id);
            self.backend.persist_history(&entry)?;
            state.last_history_id = id;
            state.history.push(entry.clone());
            state.recompute();
            entry
        };
        self.logger.debug(&format!(
            "scan history #{} recorded ({:?}, {} detections)",
            entry.id, entry.status, entry.detected_miners
        ));
        self.notify();
        Ok(entry)
    }

    /// Detections in insertion order.
    pub fn list(&self) -> Vec<Detection> {
        self.read().detections.clone()
    }

    pub fn history(&self) -> Vec<ScanHistory> {
        self.read().history.clone()
    }

    pub fn stats(&self) -> Stats {
        self.read().stats.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.read();
        StoreSnapshot {
            detections: state.detections.clone(),
            history: state.history.clone(),
            stats: state.stats.clone(),
        }
    }

    pub fn for_scan(&self, scan_id: &str) -> Vec<Detection> {
        self.read()
            .detections
            .iter()
            .filter(|d| d.scan_id.as_deref() == Some(scan_id))
            .cloned()
            .collect()
    }

    /// Receiver whose value increments on every visible change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Most recent refresh failure, cleared by the next successful refresh.
    pub fn last_error(&self) -> Option<StoreError> {
        self.read().last_error.clone()
    }

    /// Reload every collection from the backend. On any failure the visible
    /// state is left untouched and the error is kept in [`Self::last_error`].
    pub async fn refresh(&self) -> Result<Stats, StoreError> {
        let fetched = futures::try_join!(
            self.backend.fetch_detections(),
            self.backend.fetch_history()
        )
        .and_then(|(detections, history)| {
            check_unique("detection", detections.iter().map(|d| d.id))?;
            check_unique("scan history", history.iter().map(|h| h.id))?;
            if let Some(bad) = detections.iter().find(|d| d.confidence > 100) {
                return Err(StoreError::Sync(format!(
                    "detection #{} has confidence {} above 100",
                    bad.id, bad.confidence
                )));
            }
            Ok((detections, history))
        });

        let (detections, history) = match fetched {
            Ok(collections) => collections,
            Err(err) => {
                self.logger.warn(&format!("refresh failed, keeping current data: {err}"));
                self.write().last_error = Some(err.clone());
                self.notify();
                return Err(err);
            }
        };

        let stats = {
            let mut state = self.write();
            let max_detection = detections.iter().map(|d| d.id).max().unwrap_or(0);
            let max_history = history.iter().map(|h| h.id).max().unwrap_or(0);
            state.last_detection_id = state.last_detection_id.max(max_detection);
            state.last_history_id = state.last_history_id.max(max_history);
            state.detections = detections;
            state.history = history;
            state.last_error = None;
            state.recompute();
            state.stats.clone()
        };
        self.logger.record(&format!(
            "refreshed: {} detections, {} scans",
            stats.total_detections, stats.total_scans
        ));
        self.notify();
        Ok(stats)
    }
}

fn check_unique(what: &str, ids: impl Iterator<Item = u64>) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(StoreError::Sync(format!("duplicate {what} id {id}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::thread;

    use crate::interface::{AudioProfile, HistoryStatus, Location, Signature};
    use crate::prelude::{DetectionMethod, DeviceType, Modality};

    fn input(confidence: u8) -> DetectionInput {
        DetectionInput {
            timestamp: "2025/05/14 14:30:15".into(),
            location: Location {
                lat: 33.638,
                lng: 46.4153,
                address: "Ilam".into(),
            },
            confidence,
            device_type: DeviceType::Asic,
            detection_method: DetectionMethod::Acoustic,
            device_info: "Bitmain Antminer S19".into(),
            signature: Some(Signature::Audio(AudioProfile {
                frequency: 50.0,
                pattern: "continuous".into(),
                decibels: 70.0,
            })),
            scan_id: Some("scan-1".into()),
        }
    }

    fn history_input(status: HistoryStatus) -> HistoryInput {
        HistoryInput {
            scan_id: Some("scan-1".into()),
            date: "2025/05/14 14:30:15".into(),
            location: "Ilam".into(),
            coordinates: None,
            radius_m: Some(1000),
            detected_miners: 1,
            duration: 12,
            operator: "operator".into(),
            methods: vec![Modality::Acoustic],
            status,
        }
    }

    struct FailingHistory {
        detections: Vec<Detection>,
    }

    #[async_trait]
    impl DetectionBackend for FailingHistory {
        async fn fetch_detections(&self) -> Result<Vec<Detection>, StoreError> {
            Ok(self.detections.clone())
        }

        async fn fetch_history(&self) -> Result<Vec<ScanHistory>, StoreError> {
            Err(StoreError::Sync("history endpoint returned 503".into()))
        }

        fn persist_detection(&self, _detection: &Detection) -> Result<(), StoreError> {
            Ok(())
        }

        fn persist_history(&self, _entry: &ScanHistory) -> Result<(), StoreError> {
            Err(StoreError::Sync("history endpoint returned 503".into()))
        }
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let store = DetectionStore::in_memory();
        assert_eq!(store.add(input(80)).unwrap().id, 1);
        assert_eq!(store.add(input(81)).unwrap().id, 2);
        assert_eq!(store.stats().total_detections, 2);
    }

    #[test]
    fn concurrent_adds_get_unique_increasing_ids() {
        let store = Arc::new(DetectionStore::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..25)
                        .map(|_| store.add(input(90)).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        let listed: Vec<u64> = store.list().iter().map(|d| d.id).collect();
        assert!(listed.windows(2).all(|pair| pair[0] < pair[1]));

        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert_eq!(store.stats().total_detections, store.list().len());
    }

    #[test]
    fn invalid_input_is_rejected_without_consuming_an_id() {
        let store = DetectionStore::in_memory();
        assert!(store.add(input(101)).is_err());
        assert_eq!(store.add(input(70)).unwrap().id, 1);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn history_feeds_stats() {
        let store = DetectionStore::in_memory();
        let entry = store
            .record_scan(history_input(HistoryStatus::Partial))
            .unwrap();
        assert_eq!(entry.id, 1);
        let stats = store.stats();
        assert_eq!(stats.total_scans, 1);
        assert_eq!(stats.scans_by_method.acoustic, 1);
    }

    #[tokio::test]
    async fn refresh_keeps_written_through_rows_and_monotonic_ids() {
        let seeded = input(75).into_detection(40);
        let store = DetectionStore::new(Arc::new(MemoryBackend::new(vec![seeded], Vec::new())));
        store.add(input(80)).unwrap();
        store.add(input(80)).unwrap();
        store
            .record_scan(history_input(HistoryStatus::Completed))
            .unwrap();

        let stats = store.refresh().await.unwrap();
        assert_eq!(stats.total_detections, 3);
        assert_eq!(stats.total_scans, 1);
        let ids: Vec<u64> = store.list().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![40, 1, 2]);
        assert_eq!(store.add(input(90)).unwrap().id, 41);
        assert_eq!(store.stats().total_detections, store.list().len());
    }

    #[tokio::test]
    async fn rejected_write_leaves_store_unchanged() {
        let backend = Arc::new(MemoryBackend::default());
        backend
            .persist_detection(&input(70).into_detection(1))
            .unwrap();
        let store = DetectionStore::new(backend);

        let err = store.add(input(80)).unwrap_err();
        assert!(matches!(err, StoreError::Sync(_)));
        assert!(store.list().is_empty());

        store.refresh().await.unwrap();
        assert_eq!(store.add(input(80)).unwrap().id, 2);
    }

    #[test]
    fn history_write_failure_is_reported() {
        let store = DetectionStore::new(Arc::new(FailingHistory {
            detections: Vec::new(),
        }));
        assert!(store
            .record_scan(history_input(HistoryStatus::Completed))
            .is_err());
        assert!(store.history().is_empty());
        assert_eq!(store.stats().total_scans, 0);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_prior_state_visible() {
        let store = DetectionStore::new(Arc::new(FailingHistory {
            detections: vec![input(60).into_detection(9)],
        }));
        store.add(input(88)).unwrap();
        let before = store.snapshot();

        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, StoreError::Sync(_)));
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.last_error(), Some(err));
    }

    #[tokio::test]
    async fn duplicate_backend_ids_fail_the_refresh() {
        let duplicate = input(60).into_detection(3);
        let store = DetectionStore::new(Arc::new(MemoryBackend::new(
            vec![duplicate.clone(), duplicate],
            Vec::new(),
        )));
        assert!(store.refresh().await.is_err());
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_each_mutation() {
        let store = DetectionStore::in_memory();
        let mut updates = store.subscribe();
        store.add(input(80)).unwrap();
        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow_and_update(), 1);
        store.refresh().await.unwrap();
        assert_eq!(*updates.borrow(), 2);
    }
}
