use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use minercore::geo::{CoordinateResolver, GeoResolver};
use minercore::prelude::{Coordinates, GeoError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeocoderConfig {
    /// Offline: addresses are the formatted coordinates.
    #[default]
    Coordinates,
    Nominatim {
        #[serde(default = "default_endpoint")]
        endpoint: String,
        #[serde(default = "default_user_agent")]
        user_agent: String,
        #[serde(default)]
        language: Option<String>,
    },
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_user_agent() -> String {
    format!("miner-field-sim/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    error: Option<String>,
}

/// Reverse geocoder against a Nominatim-compatible `/reverse` endpoint.
pub struct NominatimResolver {
    client: reqwest::Client,
    endpoint: String,
    language: Option<String>,
}

impl NominatimResolver {
    pub fn new(
        endpoint: impl Into<String>,
        user_agent: &str,
        language: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building geocoder HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            language,
        })
    }
}

#[async_trait]
impl GeoResolver for NominatimResolver {
    async fn resolve(&self, at: Coordinates) -> Result<String, GeoError> {
        let mut query = vec![
            ("format", "json".to_string()),
            ("lat", at.lat.to_string()),
            ("lon", at.lng.to_string()),
            ("zoom", "18".to_string()),
        ];
        if let Some(language) = &self.language {
            query.push(("accept-language", language.clone()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?;
        let body: ReverseResponse = response.json().await.map_err(transport_error)?;

        match body {
            ReverseResponse {
                display_name: Some(name),
                ..
            } if !name.trim().is_empty() => Ok(name),
            ReverseResponse {
                error: Some(message),
                ..
            } => {
                log::debug!("geocoder reported: {}", message);
                Err(GeoError::NotFound(at))
            }
            _ => Err(GeoError::NotFound(at)),
        }
    }
}

fn transport_error(err: reqwest::Error) -> GeoError {
    GeoError::Transport(err.to_string())
}

pub fn build_resolver(
    config: &GeocoderConfig,
    timeout: Duration,
) -> anyhow::Result<Arc<dyn GeoResolver>> {
    Ok(match config {
        GeocoderConfig::Coordinates => Arc::new(CoordinateResolver),
        GeocoderConfig::Nominatim {
            endpoint,
            user_agent,
            language,
        } => Arc::new(NominatimResolver::new(
            endpoint.clone(),
            user_agent,
            language.clone(),
            timeout,
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use warp::Filter;

    async fn serve_reverse(reply: serde_json::Value) -> String {
        let route = warp::path("reverse")
            .and(warp::query::<HashMap<String, String>>())
            .map(move |query: HashMap<String, String>| {
                let well_formed = query.get("format").map(String::as_str) == Some("json")
                    && query.contains_key("lat")
                    && query.contains_key("lon");
                if well_formed {
                    warp::reply::json(&reply)
                } else {
                    warp::reply::json(&serde_json::json!({"error": "malformed query"}))
                }
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{addr}/reverse")
    }

    #[tokio::test]
    async fn resolves_display_name() {
        let endpoint =
            serve_reverse(serde_json::json!({"display_name": "Ilam, Taleghani St."})).await;
        let resolver =
            NominatimResolver::new(endpoint, "test-agent", None, Duration::from_secs(2)).unwrap();
        let address = resolver.resolve(Coordinates::new(33.638, 46.4153)).await.unwrap();
        assert_eq!(address, "Ilam, Taleghani St.");
    }

    #[tokio::test]
    async fn error_body_maps_to_not_found() {
        let endpoint = serve_reverse(serde_json::json!({"error": "Unable to geocode"})).await;
        let resolver =
            NominatimResolver::new(endpoint, "test-agent", None, Duration::from_secs(2)).unwrap();
        let at = Coordinates::new(0.0, 0.0);
        assert_eq!(resolver.resolve(at).await, Err(GeoError::NotFound(at)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let resolver = NominatimResolver::new(
            "http://127.0.0.1:9/reverse",
            "test-agent",
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = resolver.resolve(Coordinates::new(1.0, 1.0)).await.unwrap_err();
        assert!(matches!(err, GeoError::Transport(_)));
    }

    #[test]
    fn geocoder_config_parses_from_yaml() {
        let config: GeocoderConfig = serde_yaml::from_str("kind: nominatim\nlanguage: en\n").unwrap();
        match config {
            GeocoderConfig::Nominatim {
                endpoint, language, ..
            } => {
                assert_eq!(endpoint, DEFAULT_ENDPOINT);
                assert_eq!(language.as_deref(), Some("en"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
