use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use uuid::Uuid;

use crate::geo::GeoResolver;
use crate::interface::{FailureReason, ScanRequest, ScanSnapshot, SessionStatus};
use crate::map::MapAdapter;
use crate::prelude::{Analyzer, Modality, ScanError, Sensitivity, SignalSource};
use crate::session::pipeline::{Pipeline, SessionContext};
use crate::session::state::SessionShared;
use crate::store::DetectionStore;
use crate::telemetry::{LogManager, MetricsRecorder};

/// Time budgets and defaults applied to every session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub acquisition_timeout: Duration,
    pub analysis_timeout: Duration,
    pub geocode_timeout: Duration,
    pub default_radius_m: u32,
    pub operator: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            acquisition_timeout: Duration::from_secs(30),
            analysis_timeout: Duration::from_secs(5),
            geocode_timeout: Duration::from_secs(5),
            default_radius_m: 1000,
            operator: "field operator".to_string(),
        }
    }
}

/// Starts, tracks and cancels scan sessions.
///
/// At most one session is active at a time; sessions remain pollable after
/// they finish until [`ScanManager::prune`] drops them.
pub struct ScanManager {
    pipelines: BTreeMap<Modality, Pipeline>,
    store: Arc<DetectionStore>,
    geo: Arc<dyn GeoResolver>,
    map: Option<Arc<dyn MapAdapter>>,
    metrics: Arc<MetricsRecorder>,
    settings: SessionSettings,
    sessions: RwLock<HashMap<String, Arc<SessionShared>>>,
    logger: LogManager,
}

impl ScanManager {
    pub fn new(
        store: Arc<DetectionStore>,
        geo: Arc<dyn GeoResolver>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            pipelines: BTreeMap::new(),
            store,
            geo,
            map: None,
            metrics: Arc::new(MetricsRecorder::new()),
            settings,
            sessions: RwLock::new(HashMap::new()),
            logger: LogManager::scoped("scans"),
        }
    }

    /// Register the source and analyzer for one modality.
    pub fn with_modality(
        mut self,
        source: Arc<dyn SignalSource>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self, ScanError> {
        if source.modality() != analyzer.modality() {
            return Err(ScanError::MismatchedPipeline {
                acquires: source.modality(),
                analyzes: analyzer.modality(),
            });
        }
        self.pipelines
            .insert(source.modality(), Pipeline { source, analyzer });
        Ok(self)
    }

    pub fn with_map(mut self, map: Arc<dyn MapAdapter>) -> Self {
        self.map = Some(map);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<DetectionStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn map(&self) -> Option<&Arc<dyn MapAdapter>> {
        self.map.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Modalities with a registered pipeline.
    pub fn methods(&self) -> Vec<Modality> {
        self.pipelines.keys().copied().collect()
    }

    fn sessions(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SessionShared>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SessionShared>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self, scan_id: &str) -> Result<Arc<SessionShared>, ScanError> {
        self.sessions()
            .get(scan_id)
            .cloned()
            .ok_or_else(|| ScanError::UnknownScan(scan_id.to_string()))
    }

    /// Id of the session still running, if any.
    pub fn active(&self) -> Option<String> {
        self.sessions()
            .values()
            .find(|session| !session.is_terminal())
            .map(|session| session.scan_id.clone())
    }

    /// Validate the request and launch its methods concurrently.
    ///
    /// Validation failures are returned before any session exists, so an
    /// invalid request never reaches `scanning`.
    pub async fn start(&self, request: ScanRequest) -> Result<String, ScanError> {
        let sensitivity = Sensitivity::new(request.sensitivity)?;
        let location = request.location.ok_or_else(|| {
            ScanError::MissingLocation(
                "no position was provided; enable location access or pick a point on the map"
                    .into(),
            )
        })?;
        location.validate()?;
        if request.methods.is_empty() {
            return Err(ScanError::NoMethods);
        }

        let mut methods: Vec<Modality> = Vec::with_capacity(request.methods.len());
        for method in &request.methods {
            if !methods.contains(method) {
                methods.push(*method);
            }
        }
        let pipelines = methods
            .iter()
            .map(|method| {
                self.pipelines
                    .get(method)
                    .cloned()
                    .map(|pipeline| (*method, pipeline))
                    .ok_or(ScanError::UnsupportedMethod(*method))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let scan_id = Uuid::new_v4().to_string();
        let radius_m = request.radius_m.unwrap_or(self.settings.default_radius_m);
        let operator = request
            .operator
            .clone()
            .unwrap_or_else(|| self.settings.operator.clone());
        let shared = Arc::new(SessionShared::new(
            scan_id.clone(),
            request,
            methods.clone(),
            location,
            radius_m,
            sensitivity,
            operator,
        ));

        {
            let mut sessions = self.sessions_mut();
            if let Some(active) = sessions.values().find(|session| !session.is_terminal()) {
                return Err(ScanError::SessionActive(active.scan_id.clone()));
            }
            let mut state = shared.lock();
            let names: Vec<&str> = methods.iter().map(Modality::as_str).collect();
            state.log(format!(
                "scan of {} m around {} with {} at sensitivity {}",
                radius_m,
                location,
                names.join(", "),
                sensitivity.value()
            ));
            state.transition(SessionStatus::Scanning)?;
            drop(state);
            sessions.insert(scan_id.clone(), Arc::clone(&shared));
        }

        self.metrics.record_started();
        if let Some(map) = &self.map {
            map.set_scan_circle(location, radius_m);
        }
        self.logger.record(&format!("started scan {scan_id}"));

        let context = SessionContext {
            shared,
            store: Arc::clone(&self.store),
            geo: Arc::clone(&self.geo),
            map: self.map.clone(),
            metrics: Arc::clone(&self.metrics),
            settings: self.settings.clone(),
        };
        tokio::spawn(context.drive(pipelines));
        Ok(scan_id)
    }

    pub fn poll(&self, scan_id: &str) -> Result<ScanSnapshot, ScanError> {
        Ok(self.session(scan_id)?.snapshot())
    }

    /// Move a running session straight to `failed`. Returns `false` when the
    /// session had already finished.
    pub fn cancel(&self, scan_id: &str) -> Result<bool, ScanError> {
        let shared = self.session(scan_id)?;
        {
            let mut state = shared.lock();
            if state.status.is_terminal() {
                return Ok(false);
            }
            state.transition(SessionStatus::Failed)?;
            state.failure = Some(FailureReason::Cancelled);
            state.log(FailureReason::Cancelled.describe());
            let history = shared.history_input(&state);
            if let Err(err) = self.store.record_scan(history) {
                state.warn(format!("scan history not saved: {err}"));
            }
        }
        shared.signal_cancel();
        self.metrics.record_cancelled();
        self.logger.record(&format!("cancelled scan {scan_id}"));
        Ok(true)
    }

    /// Poll every `interval` until the session reaches a terminal state.
    pub async fn wait(&self, scan_id: &str, interval: Duration) -> Result<ScanSnapshot, ScanError> {
        loop {
            let snapshot = self.poll(scan_id)?;
            if snapshot.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Start a new session with the request of a finished one.
    pub async fn retry(&self, scan_id: &str) -> Result<String, ScanError> {
        let shared = self.session(scan_id)?;
        if !shared.is_terminal() {
            return Err(ScanError::SessionActive(scan_id.to_string()));
        }
        self.logger.record(&format!("retrying scan {scan_id}"));
        self.start(shared.request.clone()).await
    }

    /// Forget sessions that finished at least `older_than` ago.
    pub fn prune(&self, older_than: Duration) -> usize {
        let mut sessions = self.sessions_mut();
        let before = sessions.len();
        sessions.retain(|_, session| {
            let state = session.lock();
            match state.finished {
                Some(finished) => finished.elapsed() < older_than,
                None => true,
            }
        });
        before - sessions.len()
    }
}
