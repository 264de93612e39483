use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::warn;
use minercore::analysis::default_analyzers;
use minercore::interface::{ScanSnapshot, Stats};
use minercore::telemetry::MetricsSnapshot;
use minercore::{DetectionStore, ScanManager};

use crate::api_bridge::map::FieldMap;
use crate::backend::SeedData;
use crate::generator::synthetic_sources;
use crate::geocode::build_resolver;
use crate::workflow::config::WorkflowConfig;

/// Outcome of one offline scan plus the store's view afterwards.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub snapshot: ScanSnapshot,
    pub stats: Stats,
    pub metrics: MetricsSnapshot,
}

impl ScanReport {
    pub fn summary(&self) -> String {
        let snapshot = &self.snapshot;
        format!(
            "scan={} status={} progress={} results={} detections={} errors={} warnings={} total_detections={} total_scans={} success_rate={:.1}",
            snapshot.scan_id,
            snapshot.status.as_str(),
            snapshot.progress,
            snapshot.results.len(),
            snapshot.detections.len(),
            snapshot.errors.len(),
            snapshot.warnings.len(),
            self.stats.total_detections,
            self.stats.total_scans,
            self.stats.success_rate,
        )
    }
}

/// Wires the synthetic sources, seeded store and geocoder into a scan manager.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    manager: Arc<ScanManager>,
    map: Arc<FieldMap>,
}

impl Runner {
    pub async fn build(config: WorkflowConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let seed = match &config.seed_data {
            Some(path) => SeedData::load(path)?,
            None => SeedData::sample(),
        };
        let store = Arc::new(DetectionStore::new(Arc::new(seed.into_backend())));
        if let Err(err) = store.refresh().await {
            warn!("initial sync failed, starting from an empty store: {}", err);
        }

        let geo = build_resolver(
            &config.geocoder,
            Duration::from_millis(config.timeouts.geocode_ms),
        )
        .context("building reverse geocoder")?;
        let map = Arc::new(FieldMap::new());

        let analyzers = default_analyzers();
        let mut manager =
            ScanManager::new(store, geo, config.session_settings()).with_map(map.clone());
        for source in synthetic_sources(&config.generator) {
            let modality = source.modality();
            let analyzer = analyzers
                .iter()
                .find(|analyzer| analyzer.modality() == modality)
                .cloned()
                .with_context(|| format!("no analyzer available for {}", modality))?;
            manager = manager
                .with_modality(source, analyzer)
                .context("registering signal pipeline")?;
        }

        Ok(Self {
            config,
            manager: Arc::new(manager),
            map,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ScanManager> {
        &self.manager
    }

    pub fn map(&self) -> &Arc<FieldMap> {
        &self.map
    }

    /// Start the configured scan and block until it reaches a terminal state.
    pub async fn run_once(&self) -> anyhow::Result<ScanReport> {
        let scan_id = self
            .manager
            .start(self.config.scan_request())
            .await
            .context("starting scan")?;
        let snapshot = self
            .manager
            .wait(&scan_id, self.config.poll_interval())
            .await
            .context("waiting for scan")?;
        Ok(ScanReport {
            snapshot,
            stats: self.manager.store().stats(),
            metrics: self.manager.metrics().snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minercore::interface::SessionStatus;

    fn fast_config(miner_probability: f64) -> WorkflowConfig {
        let mut cfg = WorkflowConfig::default();
        cfg.scan.sensitivity = 50;
        cfg.generator.step_delay_ms = 0;
        cfg.generator.miner_probability = miner_probability;
        cfg.poll_interval_ms = 10;
        cfg
    }

    #[tokio::test]
    async fn offline_scan_with_miners_lands_detections() {
        let runner = Runner::build(fast_config(1.0)).await.unwrap();
        let report = runner.run_once().await.unwrap();

        assert_eq!(report.snapshot.status, SessionStatus::Completed);
        assert_eq!(report.snapshot.progress, 100);
        assert_eq!(report.snapshot.results.len(), 3);
        assert!(!report.snapshot.detections.is_empty());
        assert_eq!(report.stats.total_scans, 8);
        assert_eq!(
            report.stats.total_detections,
            5 + report.snapshot.detections.len()
        );
        assert_eq!(report.metrics.scans_completed, 1);
        assert_eq!(runner.map().view().markers.len(), report.stats.total_detections);
        assert!(report.summary().contains("status=completed"));
    }

    #[tokio::test]
    async fn offline_scan_without_miners_completes_empty() {
        let runner = Runner::build(fast_config(0.0)).await.unwrap();
        let report = runner.run_once().await.unwrap();

        assert_eq!(report.snapshot.status, SessionStatus::Completed);
        assert!(report.snapshot.detections.is_empty());
        assert_eq!(report.stats.total_detections, 5);
        assert!(report.snapshot.results.iter().all(|r| !r.detected));
    }

    #[tokio::test]
    async fn missing_seed_file_fails_the_build() {
        let mut cfg = fast_config(0.0);
        cfg.seed_data = Some("/nonexistent/seed.json".into());
        assert!(Runner::build(cfg).await.is_err());
    }
}
