use std::sync::Mutex;

use serde::Serialize;

pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub scans_started: usize,
    pub scans_completed: usize,
    pub scans_failed: usize,
    pub scans_cancelled: usize,
    pub method_failures: usize,
    pub detections_accepted: usize,
    pub geocode_failures: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_started(&self) {
        self.update(|m| m.scans_started += 1);
    }

    pub fn record_completed(&self) {
        self.update(|m| m.scans_completed += 1);
    }

    pub fn record_failed(&self) {
        self.update(|m| m.scans_failed += 1);
    }

    pub fn record_cancelled(&self) {
        self.update(|m| m.scans_cancelled += 1);
    }

    pub fn record_method_failure(&self) {
        self.update(|m| m.method_failures += 1);
    }

    pub fn record_detection(&self) {
        self.update(|m| m.detections_accepted += 1);
    }

    pub fn record_geocode_failure(&self) {
        self.update(|m| m.geocode_failures += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsRecorder::new();
        metrics.record_started();
        metrics.record_started();
        metrics.record_cancelled();
        metrics.record_detection();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.scans_started, 2);
        assert_eq!(snapshot.scans_cancelled, 1);
        assert_eq!(snapshot.detections_accepted, 1);
        assert_eq!(snapshot.scans_failed, 0);
    }
}
