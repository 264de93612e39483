use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::gate::ConfidenceGate;
use crate::geo::{resolve_within, GeoResolver, UNKNOWN_ADDRESS};
use crate::interface::{Candidate, FailureReason, Location, SessionStatus};
use crate::map::MapAdapter;
use crate::prelude::{
    AcquireRequest, AcquisitionError, AnalysisError, Analyzer, MethodError, Modality, SignalSource,
};
use crate::session::manager::SessionSettings;
use crate::session::state::{SessionShared, ACQUIRED_PERCENT, ANALYZED_PERCENT};
use crate::session::ProgressReporter;
use crate::store::DetectionStore;
use crate::telemetry::{LogManager, MetricsRecorder};

/// A source paired with the analyzer for the same modality.
#[derive(Clone)]
pub(crate) struct Pipeline {
    pub(crate) source: Arc<dyn SignalSource>,
    pub(crate) analyzer: Arc<dyn Analyzer>,
}

/// Collaborators a running session needs.
pub(crate) struct SessionContext {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) store: Arc<DetectionStore>,
    pub(crate) geo: Arc<dyn GeoResolver>,
    pub(crate) map: Option<Arc<dyn MapAdapter>>,
    pub(crate) metrics: Arc<MetricsRecorder>,
    pub(crate) settings: SessionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MethodOutcome {
    Finished,
    Failed,
    Cancelled,
}

impl SessionContext {
    /// Drive every method concurrently, then settle the terminal state.
    pub(crate) async fn drive(self, pipelines: Vec<(Modality, Pipeline)>) {
        let context = &self;
        let runs = pipelines
            .into_iter()
            .enumerate()
            .map(|(index, (modality, pipeline))| async move {
                // Panics outside the source and analyzer (map, geocoder) settle as a failed method.
                match AssertUnwindSafe(context.run_method(index, modality, pipeline))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(payload) => context.fail(
                        index,
                        MethodError::Analysis {
                            modality,
                            source: AnalysisError::Internal(format!(
                                "{modality} pipeline panicked: {}",
                                panic_message(payload.as_ref())
                            )),
                        },
                    ),
                }
            });
        let outcomes = futures::future::join_all(runs).await;
        let failed = outcomes
            .iter()
            .filter(|outcome| **outcome == MethodOutcome::Failed)
            .count();
        LogManager::scoped(self.shared.scan_id.clone()).debug(&format!(
            "{} method(s) returned, {} failed",
            outcomes.len(),
            failed
        ));
        self.finalize();
    }

    async fn run_method(&self, index: usize, modality: Modality, pipeline: Pipeline) -> MethodOutcome {
        {
            let mut state = self.shared.lock();
            if state.status.is_terminal() {
                return MethodOutcome::Cancelled;
            }
            state.running.push(modality);
            state.log(format!("{modality}: acquiring signal"));
        }

        let request = AcquireRequest {
            scan_id: self.shared.scan_id.clone(),
            location: self.shared.location,
            radius_m: self.shared.radius_m,
        };
        let reporter = ProgressReporter::attached(Arc::clone(&self.shared), index);
        let budget = self.settings.acquisition_timeout;
        let acquired = tokio::select! {
            biased;
            _ = self.shared.cancelled() => return MethodOutcome::Cancelled,
            outcome = tokio::time::timeout(
                budget,
                guarded(pipeline.source.acquire(&request, &reporter), |message| {
                    AcquisitionError::Unavailable(format!("signal source panicked: {message}"))
                }),
            ) => outcome,
        };
        if !self.finish_acquisition(index) {
            return MethodOutcome::Cancelled;
        }
        let sample = match acquired {
            Ok(Ok(sample)) => sample,
            Ok(Err(source)) => return self.fail(index, MethodError::Acquisition { modality, source }),
            Err(_) => {
                return self.fail(
                    index,
                    MethodError::AcquisitionTimeout {
                        modality,
                        after: budget,
                    },
                )
            }
        };

        let budget = self.settings.analysis_timeout;
        let analyzed = tokio::select! {
            biased;
            _ = self.shared.cancelled() => return MethodOutcome::Cancelled,
            outcome = tokio::time::timeout(
                budget,
                guarded(pipeline.analyzer.analyze(sample), |message| {
                    AnalysisError::Internal(format!("analyzer panicked: {message}"))
                }),
            ) => outcome,
        };
        let result = match analyzed {
            Ok(Ok(result)) => result,
            Ok(Err(source)) => return self.fail(index, MethodError::Analysis { modality, source }),
            Err(_) => {
                return self.fail(
                    index,
                    MethodError::AnalysisTimeout {
                        modality,
                        after: budget,
                    },
                )
            }
        };

        let candidates = ConfidenceGate::admit(&result, self.shared.sensitivity);
        {
            let mut state = self.shared.lock();
            if state.status.is_terminal() {
                return MethodOutcome::Cancelled;
            }
            state.log(format!(
                "{modality}: detected={} confidence={}%, {} candidate(s) at sensitivity {}",
                result.detected,
                result.confidence,
                candidates.len(),
                self.shared.sensitivity.value()
            ));
            state.results.push(result);
            state.progress.advance(index, ANALYZED_PERCENT);
        }

        if !candidates.is_empty() {
            let address = tokio::select! {
                biased;
                _ = self.shared.cancelled() => return MethodOutcome::Cancelled,
                address = self.resolve_address() => address,
            };
            if !self.commit(candidates, address) {
                return MethodOutcome::Cancelled;
            }
            if let Some(map) = &self.map {
                map.set_markers(&self.store.list());
            }
        }

        self.complete_method(index, modality);
        MethodOutcome::Finished
    }

    /// Marks one acquisition done; `false` if the session already ended.
    fn finish_acquisition(&self, index: usize) -> bool {
        let mut state = self.shared.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.pending_acquisitions = state.pending_acquisitions.saturating_sub(1);
        state.progress.advance(index, ACQUIRED_PERCENT);
        if state.pending_acquisitions == 0 && state.status == SessionStatus::Scanning {
            if let Err(err) = state.transition(SessionStatus::Analyzing) {
                state.warn(err.to_string());
            }
        }
        true
    }

    fn fail(&self, index: usize, error: MethodError) -> MethodOutcome {
        let mut state = self.shared.lock();
        if state.status.is_terminal() {
            return MethodOutcome::Cancelled;
        }
        self.metrics.record_method_failure();
        state.fatal |= error.is_fatal();
        state.error(error.to_string());
        state.progress.advance(index, 100);
        let modality = error.modality();
        state.running.retain(|running| *running != modality);
        MethodOutcome::Failed
    }

    fn complete_method(&self, index: usize, modality: Modality) {
        let mut state = self.shared.lock();
        if state.status.is_terminal() {
            return;
        }
        state.progress.advance(index, 100);
        state.running.retain(|running| *running != modality);
        state.log(format!("{modality}: done"));
    }

    /// One lookup per session; failures degrade to [`UNKNOWN_ADDRESS`].
    async fn resolve_address(&self) -> String {
        self.shared
            .address
            .get_or_init(|| async {
                match resolve_within(
                    self.geo.as_ref(),
                    self.shared.location,
                    self.settings.geocode_timeout,
                )
                .await
                {
                    Ok(address) => address,
                    Err(err) => {
                        self.metrics.record_geocode_failure();
                        self.shared.lock().warn(format!(
                            "{err}; recording location as '{UNKNOWN_ADDRESS}'"
                        ));
                        UNKNOWN_ADDRESS.to_string()
                    }
                }
            })
            .await
            .clone()
    }

    /// Persist accepted candidates while holding the session lock, so a
    /// concurrent cancel either lands before all of them or after all of them.
    fn commit(&self, candidates: Vec<Candidate>, address: String) -> bool {
        let mut state = self.shared.lock();
        if state.status.is_terminal() {
            return false;
        }
        for candidate in candidates {
            let location = Location {
                lat: self.shared.location.lat,
                lng: self.shared.location.lng,
                address: address.clone(),
            };
            let input = candidate.into_input(location, Some(self.shared.scan_id.clone()));
            match self.store.add(input) {
                Ok(detection) => {
                    self.metrics.record_detection();
                    state.log(format!(
                        "detection #{} accepted: {} at {}%",
                        detection.id, detection.device_info, detection.confidence
                    ));
                    state.detections.push(detection);
                }
                Err(err) => state.warn(format!("detection discarded: {err}")),
            }
        }
        true
    }

    /// Settle the terminal status once every method has returned.
    pub(crate) fn finalize(&self) {
        let mut state = self.shared.lock();
        if state.status.is_terminal() {
            return;
        }
        let failure = if state.fatal {
            Some(FailureReason::MethodFailed)
        } else if state.results.is_empty() {
            Some(FailureReason::NoResults)
        } else {
            None
        };
        let next = match failure {
            Some(_) => SessionStatus::Failed,
            None => SessionStatus::Completed,
        };
        if let Err(err) = state.transition(next) {
            state.warn(err.to_string());
            return;
        }
        state.failure = failure;
        match failure {
            Some(reason) => {
                state.log(reason.describe());
                self.metrics.record_failed();
            }
            None => {
                state.progress.complete_all();
                self.metrics.record_completed();
            }
        }
        let history = self.shared.history_input(&state);
        if let Err(err) = self.store.record_scan(history) {
            state.warn(format!("scan history not saved: {err}"));
        }
    }
}

/// Await `work`, turning a panic inside it into the error `on_panic` builds.
async fn guarded<T, E>(
    work: impl Future<Output = Result<T, E>>,
    on_panic: impl FnOnce(String) -> E,
) -> Result<T, E> {
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(on_panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
