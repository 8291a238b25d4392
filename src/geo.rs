//! Best-effort geolocation capture.
//!
//! A punch submission may carry device coordinates, but never depends on
//! them: denial, timeout, or plain unavailability downgrade silently to a
//! punch without coordinates. The engine bounds the wait; sources here only
//! report a position or fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Geolocation failures. All of them are non-fatal to a punch.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("position access denied")]
    Denied,

    #[error("no position source available")]
    Unavailable,

    #[error("position request timed out")]
    Timeout,
}

/// Device coordinates, serialized on the wire as `"lat,long"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Source of a single best-effort position fix.
#[async_trait]
pub trait GeolocationSource: Send + Sync {
    async fn locate(&self) -> Result<Coordinates, GeoError>;
}

/// Always-failing source, for environments with no position device.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeolocation;

#[async_trait]
impl GeolocationSource for NoGeolocation {
    async fn locate(&self) -> Result<Coordinates, GeoError> {
        Err(GeoError::Unavailable)
    }
}

/// Fixed coordinates, typically loaded from config for a stationary terminal.
#[derive(Debug, Clone, Copy)]
pub struct FixedGeolocation {
    coordinates: Coordinates,
}

impl FixedGeolocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinates: Coordinates {
                latitude,
                longitude,
            },
        }
    }
}

#[async_trait]
impl GeolocationSource for FixedGeolocation {
    async fn locate(&self) -> Result<Coordinates, GeoError> {
        Ok(self.coordinates)
    }
}
