//! Reverse geocoding seam. Resolution is best effort and never fatal.

use std::time::Duration;

use async_trait::async_trait;

use crate::prelude::{Coordinates, GeoError};

/// Address recorded when a position cannot be resolved.
pub const UNKNOWN_ADDRESS: &str = "unknown address";

#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, at: Coordinates) -> Result<String, GeoError>;
}

/// Resolver that renders the coordinates themselves; never fails.
#[derive(Debug, Clone, Default)]
pub struct CoordinateResolver;

#[async_trait]
impl GeoResolver for CoordinateResolver {
    async fn resolve(&self, at: Coordinates) -> Result<String, GeoError> {
        Ok(format!("near {}", at))
    }
}

/// Resolve within `budget`, mapping expiry to [`GeoError::Timeout`].
pub async fn resolve_within(
    resolver: &dyn GeoResolver,
    at: Coordinates,
    budget: Duration,
) -> Result<String, GeoError> {
    match tokio::time::timeout(budget, resolver.resolve(at)).await {
        Ok(Ok(address)) if !address.trim().is_empty() => Ok(address),
        Ok(Ok(_)) => Err(GeoError::NotFound(at)),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(GeoError::Timeout(budget)),
    }
}
