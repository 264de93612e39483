use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::interface::{Detection, ScanHistory};
use crate::prelude::StoreError;

/// Authoritative collections the store writes through to and reloads from.
///
/// The persist calls run while the store holds its write lock, so they must
/// not block for long; a remote implementation should queue the write.
#[async_trait]
pub trait DetectionBackend: Send + Sync {
    async fn fetch_detections(&self) -> Result<Vec<Detection>, StoreError>;

    async fn fetch_history(&self) -> Result<Vec<ScanHistory>, StoreError>;

    fn persist_detection(&self, detection: &Detection) -> Result<(), StoreError>;

    fn persist_history(&self, entry: &ScanHistory) -> Result<(), StoreError>;
}

/// In-memory collections, useful offline and in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    detections: RwLock<Vec<Detection>>,
    history: RwLock<Vec<ScanHistory>>,
}

impl MemoryBackend {
    pub fn new(detections: Vec<Detection>, history: Vec<ScanHistory>) -> Self {
        Self {
            detections: RwLock::new(detections),
            history: RwLock::new(history),
        }
    }
}

#[async_trait]
impl DetectionBackend for MemoryBackend {
    async fn fetch_detections(&self) -> Result<Vec<Detection>, StoreError> {
        Ok(self
            .detections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn fetch_history(&self) -> Result<Vec<ScanHistory>, StoreError> {
        Ok(self
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn persist_detection(&self, detection: &Detection) -> Result<(), StoreError> {
        let mut detections = self
            .detections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if detections.iter().any(|d| d.id == detection.id) {
            return Err(StoreError::Sync(format!(
                "detection #{} already exists",
                detection.id
            )));
        }
        detections.push(detection.clone());
        Ok(())
    }

    fn persist_history(&self, entry: &ScanHistory) -> Result<(), StoreError> {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        if history.iter().any(|h| h.id == entry.id) {
            return Err(StoreError::Sync(format!(
                "scan history #{} already exists",
                entry.id
            )));
        }
        history.push(entry.clone());
        Ok(())
    }
}
