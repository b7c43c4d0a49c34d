use crate::config::{GEO_HIGH_ACCURACY, GEO_TIMEOUT};
use crate::structs::LatLon;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        PositionOptions {
            high_accuracy: GEO_HIGH_ACCURACY,
            timeout: GEO_TIMEOUT,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("geolocation is not supported")]
    Unsupported,

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    PositionUnavailable(String),

    #[error("Timeout expired")]
    Timeout,
}

/// Source of the device's current position.
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self, options: PositionOptions) -> Result<LatLon, GeoError>;
}

/// A position the user shared in chat, if they shared one at all.
#[derive(Debug, Clone, Copy)]
pub struct SharedLocation(pub Option<LatLon>);

#[async_trait]
impl Geolocator for SharedLocation {
    async fn current_position(&self, _options: PositionOptions) -> Result<LatLon, GeoError> {
        match self.0 {
            Some(at) if at.lat.is_finite() && at.lon.is_finite() => Ok(at),
            Some(_) => Err(GeoError::PositionUnavailable(
                "posição recebida inválida".to_string(),
            )),
            None => Err(GeoError::PermissionDenied(
                "a localização não foi partilhada".to_string(),
            )),
        }
    }
}

/// Runs the provider, giving up after `options.timeout`.
pub async fn locate<G: Geolocator + ?Sized>(
    geo: &G,
    options: PositionOptions,
) -> Result<LatLon, GeoError> {
    match tokio::time::timeout(options.timeout, geo.current_position(options)).await {
        Ok(result) => result,
        Err(_) => Err(GeoError::Timeout),
    }
}
