use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Context;
use log::{info, warn};
use minercore::prelude::{Coordinates, ScanError};
use minercore::map::MapAdapter;
use minercore::ScanRequest;
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

use crate::api_bridge::model::{Cancelled, ErrorBody, Started};
use crate::workflow::runner::Runner;

const SESSION_RETENTION: Duration = Duration::from_secs(60 * 60);

type JsonReply = WithStatus<Json>;

/// HTTP surface over the scan manager, detection store and field map.
pub struct ApiBridge {
    runner: Runner,
    selected: Arc<RwLock<Option<Coordinates>>>,
}

impl ApiBridge {
    pub fn new(runner: Runner) -> Self {
        let selected = Arc::new(RwLock::new(None));
        let slot = selected.clone();
        runner.map().on_map_click(Arc::new(move |at| {
            *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(at);
        }));
        Self { runner, selected }
    }

    /// Location picked on the map, used when a scan request carries none.
    pub fn selected(&self) -> Option<Coordinates> {
        *self.selected.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone + Send + Sync + 'static
    {
        let bridge = warp::any().map(move || self.clone());

        let start = warp::path!("scans")
            .and(warp::post())
            .and(warp::body::json())
            .and(bridge.clone())
            .and_then(start_scan);
        let poll = warp::path!("scans" / String)
            .and(warp::get())
            .and(bridge.clone())
            .and_then(poll_scan);
        let cancel = warp::path!("scans" / String / "cancel")
            .and(warp::post())
            .and(bridge.clone())
            .and_then(cancel_scan);
        let retry = warp::path!("scans" / String / "retry")
            .and(warp::post())
            .and(bridge.clone())
            .and_then(retry_scan);
        let detections = warp::path!("detections")
            .and(warp::get())
            .and(bridge.clone())
            .map(|bridge: Arc<ApiBridge>| {
                json_reply(StatusCode::OK, &bridge.runner.manager().store().list())
            });
        let history = warp::path!("history")
            .and(warp::get())
            .and(bridge.clone())
            .map(|bridge: Arc<ApiBridge>| {
                json_reply(StatusCode::OK, &bridge.runner.manager().store().history())
            });
        let stats = warp::path!("stats")
            .and(warp::get())
            .and(bridge.clone())
            .map(|bridge: Arc<ApiBridge>| {
                json_reply(StatusCode::OK, &bridge.runner.manager().store().stats())
            });
        let refresh = warp::path!("refresh")
            .and(warp::post())
            .and(bridge.clone())
            .and_then(refresh_store);
        let click = warp::path!("map" / "click")
            .and(warp::post())
            .and(warp::body::json())
            .and(bridge.clone())
            .map(|at: Coordinates, bridge: Arc<ApiBridge>| match at.validate() {
                Ok(()) => {
                    bridge.runner.map().click(at);
                    json_reply(StatusCode::OK, &bridge.runner.map().view())
                }
                Err(err) => scan_error_reply(&err),
            });
        let map = warp::path!("map")
            .and(warp::get())
            .and(bridge.clone())
            .map(|bridge: Arc<ApiBridge>| json_reply(StatusCode::OK, &bridge.runner.map().view()));
        let metrics = warp::path!("metrics")
            .and(warp::get())
            .and(bridge)
            .map(|bridge: Arc<ApiBridge>| {
                json_reply(StatusCode::OK, &bridge.runner.manager().metrics().snapshot())
            });

        start
            .or(poll)
            .or(cancel)
            .or(retry)
            .or(detections)
            .or(history)
            .or(stats)
            .or(refresh)
            .or(click)
            .or(map)
            .or(metrics)
            .recover(recover_rejection)
    }

    /// Serve until `shutdown` resolves. Finished sessions are pruned hourly.
    pub async fn serve<F>(self: Arc<Self>, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let manager = self.runner.manager().clone();
        let pruner = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SESSION_RETENTION);
            loop {
                ticker.tick().await;
                let pruned = manager.prune(SESSION_RETENTION);
                if pruned > 0 {
                    info!("pruned {} finished scan sessions", pruned);
                }
            }
        });

        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .with_context(|| format!("binding API bridge to {}", addr))?;
        info!("API bridge listening on http://{}", bound);
        server.await;
        pruner.abort();
        Ok(())
    }
}

fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> JsonReply {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> JsonReply {
    json_reply(
        status,
        &ErrorBody {
            error: message.into(),
        },
    )
}

fn scan_error_status(err: &ScanError) -> StatusCode {
    match err {
        err if err.is_validation() => StatusCode::BAD_REQUEST,
        ScanError::UnknownScan(_) => StatusCode::NOT_FOUND,
        ScanError::SessionActive(_) | ScanError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn scan_error_reply(err: &ScanError) -> JsonReply {
    error_reply(scan_error_status(err), err.to_string())
}

async fn start_scan(
    mut request: ScanRequest,
    bridge: Arc<ApiBridge>,
) -> Result<JsonReply, Infallible> {
    if request.location.is_none() {
        request.location = bridge.selected();
    }
    Ok(match bridge.runner.manager().start(request).await {
        Ok(scan_id) => json_reply(StatusCode::CREATED, &Started { scan_id }),
        Err(err) => scan_error_reply(&err),
    })
}

async fn poll_scan(scan_id: String, bridge: Arc<ApiBridge>) -> Result<JsonReply, Infallible> {
    Ok(match bridge.runner.manager().poll(&scan_id) {
        Ok(snapshot) => json_reply(StatusCode::OK, &snapshot),
        Err(err) => scan_error_reply(&err),
    })
}

async fn cancel_scan(scan_id: String, bridge: Arc<ApiBridge>) -> Result<JsonReply, Infallible> {
    Ok(match bridge.runner.manager().cancel(&scan_id) {
        Ok(cancelled) => json_reply(StatusCode::OK, &Cancelled { cancelled }),
        Err(err) => scan_error_reply(&err),
    })
}

async fn retry_scan(scan_id: String, bridge: Arc<ApiBridge>) -> Result<JsonReply, Infallible> {
    Ok(match bridge.runner.manager().retry(&scan_id).await {
        Ok(scan_id) => json_reply(StatusCode::CREATED, &Started { scan_id }),
        Err(err) => scan_error_reply(&err),
    })
}

async fn refresh_store(bridge: Arc<ApiBridge>) -> Result<JsonReply, Infallible> {
    Ok(match bridge.runner.manager().store().refresh().await {
        Ok(stats) => json_reply(StatusCode::OK, &stats),
        Err(err) => {
            warn!("refresh failed: {}", err);
            error_reply(StatusCode::BAD_GATEWAY, err.to_string())
        }
    })
}

async fn recover_rejection(rejection: Rejection) -> Result<JsonReply, Infallible> {
    let reply = if rejection.is_not_found() {
        error_reply(StatusCode::NOT_FOUND, "no such route")
    } else if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        error_reply(StatusCode::BAD_REQUEST, err.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    } else {
        warn!("unhandled rejection: {:?}", rejection);
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::WorkflowConfig;
    use serde_json::{json, Value};

    async fn bridge(step_delay_ms: u64) -> Arc<ApiBridge> {
        let mut cfg = WorkflowConfig::default();
        cfg.scan.location = None;
        cfg.generator.step_delay_ms = step_delay_ms;
        cfg.poll_interval_ms = 10;
        Arc::new(ApiBridge::new(Runner::build(cfg).await.unwrap()))
    }

    fn body(response: &warp::http::Response<impl AsRef<[u8]>>) -> Value {
        serde_json::from_slice(response.body().as_ref()).unwrap()
    }

    #[tokio::test]
    async fn scan_without_location_is_rejected() {
        let api = bridge(0).await.routes();
        let response = warp::test::request()
            .method("POST")
            .path("/scans")
            .json(&json!({ "methods": ["acoustic"] }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(&response)["error"]
            .as_str()
            .unwrap()
            .contains("location"));
    }

    #[tokio::test]
    async fn map_click_supplies_the_scan_location() {
        let bridge = bridge(0).await;
        let api = bridge.clone().routes();

        let clicked = warp::test::request()
            .method("POST")
            .path("/map/click")
            .json(&json!({ "lat": 33.64, "lng": 46.42 }))
            .reply(&api)
            .await;
        assert_eq!(clicked.status(), StatusCode::OK);
        assert_eq!(bridge.selected(), Some(Coordinates::new(33.64, 46.42)));

        let started = warp::test::request()
            .method("POST")
            .path("/scans")
            .json(&json!({ "methods": ["network", "emi"], "radius": 400 }))
            .reply(&api)
            .await;
        assert_eq!(started.status(), StatusCode::CREATED);
        let scan_id = body(&started)["scanId"].as_str().unwrap().to_string();

        bridge
            .runner
            .manager()
            .wait(&scan_id, Duration::from_millis(10))
            .await
            .unwrap();
        let polled = warp::test::request()
            .path(&format!("/scans/{scan_id}"))
            .reply(&api)
            .await;
        assert_eq!(polled.status(), StatusCode::OK);
        let snapshot = body(&polled);
        assert_eq!(snapshot["progress"], 100);
        assert_eq!(snapshot["location"]["lat"], 33.64);

        let map = body(&warp::test::request().path("/map").reply(&api).await);
        assert_eq!(map["scanCircle"]["radiusM"], 400);
    }

    #[tokio::test]
    async fn second_scan_conflicts_until_cancelled() {
        let bridge = bridge(200).await;
        let api = bridge.clone().routes();
        let request = json!({ "location": { "lat": 33.6, "lng": 46.4 }, "methods": ["acoustic"] });

        let first = warp::test::request()
            .method("POST")
            .path("/scans")
            .json(&request)
            .reply(&api)
            .await;
        assert_eq!(first.status(), StatusCode::CREATED);
        let scan_id = body(&first)["scanId"].as_str().unwrap().to_string();

        let second = warp::test::request()
            .method("POST")
            .path("/scans")
            .json(&request)
            .reply(&api)
            .await;
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let retry_running = warp::test::request()
            .method("POST")
            .path(&format!("/scans/{scan_id}/retry"))
            .reply(&api)
            .await;
        assert_eq!(retry_running.status(), StatusCode::CONFLICT);

        let cancel_path = format!("/scans/{scan_id}/cancel");
        let cancelled = warp::test::request()
            .method("POST")
            .path(&cancel_path)
            .reply(&api)
            .await;
        assert_eq!(body(&cancelled)["cancelled"], true);
        let again = warp::test::request()
            .method("POST")
            .path(&cancel_path)
            .reply(&api)
            .await;
        assert_eq!(body(&again)["cancelled"], false);

        let history = body(&warp::test::request().path("/history").reply(&api).await);
        assert_eq!(history.as_array().unwrap().len(), 8);
        let metrics = body(&warp::test::request().path("/metrics").reply(&api).await);
        assert_eq!(metrics["scansCancelled"], 1);
    }

    #[tokio::test]
    async fn store_routes_serve_seeded_collections() {
        let api = bridge(0).await.routes();

        let stats = body(&warp::test::request().path("/stats").reply(&api).await);
        assert_eq!(stats["totalScans"], 7);
        assert_eq!(stats["totalDetections"], 5);

        let detections = body(&warp::test::request().path("/detections").reply(&api).await);
        assert_eq!(detections.as_array().unwrap().len(), 5);

        let refreshed = warp::test::request()
            .method("POST")
            .path("/refresh")
            .reply(&api)
            .await;
        assert_eq!(refreshed.status(), StatusCode::OK);
        assert_eq!(body(&refreshed)["totalDetections"], 5);
    }

    #[tokio::test]
    async fn unknown_scan_and_route_are_not_found() {
        let api = bridge(0).await.routes();
        let scan = warp::test::request().path("/scans/missing").reply(&api).await;
        assert_eq!(scan.status(), StatusCode::NOT_FOUND);
        assert!(body(&scan)["error"].as_str().unwrap().contains("missing"));

        let route = warp::test::request().path("/nowhere").reply(&api).await;
        assert_eq!(route.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_click_is_rejected() {
        let bridge = bridge(0).await;
        let api = bridge.clone().routes();
        let response = warp::test::request()
            .method("POST")
            .path("/map/click")
            .json(&json!({ "lat": 123.0, "lng": 0.0 }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bridge.selected(), None);
    }
}
