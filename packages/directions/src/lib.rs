#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Route geometry sources.
//!
//! The routing engine asks a [`DirectionsProvider`] for candidate routes
//! between two points and scores whatever comes back. Providers own their
//! transport and retry policy; the engine never retries a failed call.
//!
//! [`google::GoogleDirections`] is the production provider.

pub mod google;
pub mod polyline;
pub mod retry;

use std::str::FromStr;

use safe_steps_grid_models::GeoPoint;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use google::{GoogleDirections, extract_routes};
pub use polyline::decode_polyline;

/// Errors from directions providers.
#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    /// Transport-level failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Non-retryable HTTP status, or retries exhausted.
    #[error("directions HTTP error: {message}")]
    HttpStatus {
        /// Description including the status code.
        message: String,
    },

    /// The provider answered with an error status (e.g. `REQUEST_DENIED`).
    #[error("directions provider status {status}: {message}")]
    ProviderStatus {
        /// Status string returned by the provider.
        status: String,
        /// Provider error message, if any.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed directions response: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },

    /// An encoded polyline could not be decoded.
    #[error("invalid encoded polyline at byte {position}: {message}")]
    Polyline {
        /// Byte offset where decoding failed.
        position: usize,
        /// Description of the problem.
        message: String,
    },

    /// Provider credentials are not configured.
    #[error("missing API key: environment variable {var} is not set")]
    MissingApiKey {
        /// Environment variable that was consulted.
        var: String,
    },
}

/// Travel mode requested from the provider.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TravelMode {
    /// On foot.
    #[default]
    Walking,
    /// By car.
    Driving,
    /// By bicycle. Accepts the `cycling` alias used by map clients.
    #[serde(alias = "cycling")]
    #[strum(to_string = "bicycling", serialize = "cycling")]
    Bicycling,
    /// Public transport.
    Transit,
}

impl TravelMode {
    /// Parses a mode string, ignoring case and surrounding whitespace.
    /// Returns `None` for unknown modes.
    #[must_use]
    pub fn from_raw(raw: &str) -> Option<Self> {
        Self::from_str(&raw.trim().to_lowercase()).ok()
    }
}

/// A request for candidate routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsRequest {
    /// Start point.
    pub origin: GeoPoint,
    /// End point.
    pub destination: GeoPoint,
    /// Travel mode.
    pub mode: TravelMode,
    /// Whether the provider may return more than one route.
    pub alternatives: bool,
}

/// One route returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    /// Provider's short description (usually the main road names).
    pub summary: String,
    /// Travel time in seconds.
    pub duration_s: f64,
    /// Travel distance in meters.
    pub distance_m: f64,
    /// Ordered route vertices.
    pub points: Vec<GeoPoint>,
}

/// Source of candidate route geometries.
#[async_trait::async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Fetches candidate routes for `request`.
    ///
    /// An empty list means the provider found no route.
    ///
    /// # Errors
    ///
    /// Returns [`DirectionsError`] if the provider cannot be reached or
    /// rejects the request.
    async fn routes(
        &self,
        request: &DirectionsRequest,
    ) -> Result<Vec<RouteGeometry>, DirectionsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_mode_accepts_cycling_alias() {
        assert_eq!(TravelMode::from_raw("cycling"), Some(TravelMode::Bicycling));
        assert_eq!(TravelMode::from_raw(" Walking "), Some(TravelMode::Walking));
        assert_eq!(TravelMode::from_raw("hovercraft"), None);
        assert_eq!(TravelMode::Bicycling.to_string(), "bicycling");
        assert_eq!(TravelMode::Transit.as_ref(), "transit");
    }

    #[test]
    fn travel_mode_serde() {
        let mode: TravelMode = serde_json::from_str("\"cycling\"").unwrap();
        assert_eq!(mode, TravelMode::Bicycling);
        assert_eq!(
            serde_json::to_string(&TravelMode::Driving).unwrap(),
            "\"driving\""
        );
    }
}
