//! Google Directions API provider.

use std::time::Duration;

use serde_json::Value;

use crate::polyline::decode_polyline;
use crate::retry::{self, RetryPolicy};
use crate::{DirectionsError, DirectionsProvider, DirectionsRequest, RouteGeometry};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "GOOGLE_MAPS_API_KEY";

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// Google Directions API client.
pub struct GoogleDirections {
    api_key: String,
    base_url: String,
    region: Option<String>,
    avoid: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl GoogleDirections {
    /// Creates a client with the given API key.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build HTTP client with timeout ({e}), using defaults");
                reqwest::Client::new()
            });

        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            region: None,
            avoid: None,
            retry: RetryPolicy::default(),
            client,
        }
    }

    /// Creates a client from [`API_KEY_VAR`].
    ///
    /// # Errors
    ///
    /// Returns [`DirectionsError::MissingApiKey`] if the variable is unset or
    /// blank.
    pub fn from_env() -> Result<Self, DirectionsError> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DirectionsError::MissingApiKey {
                var: API_KEY_VAR.to_string(),
            })?;
        Ok(Self::new(api_key))
    }

    /// Biases results toward a region (ccTLD code, e.g. `"lb"`).
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Features to avoid (e.g. `"ferries"`, `"tolls|highways"`).
    #[must_use]
    pub fn with_avoid(mut self, avoid: impl Into<String>) -> Self {
        self.avoid = Some(avoid.into());
        self
    }

    /// Overrides the endpoint URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the transient-error retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Query parameters for `request`, without the API key.
    #[must_use]
    pub fn query_params(&self, request: &DirectionsRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("origin", request.origin.to_string()),
            ("destination", request.destination.to_string()),
            ("mode", request.mode.to_string()),
            ("alternatives", request.alternatives.to_string()),
        ];
        if let Some(region) = &self.region {
            params.push(("region", region.clone()));
        }
        if let Some(avoid) = &self.avoid {
            params.push(("avoid", avoid.clone()));
        }
        params
    }
}

#[async_trait::async_trait]
impl DirectionsProvider for GoogleDirections {
    async fn routes(
        &self,
        request: &DirectionsRequest,
    ) -> Result<Vec<RouteGeometry>, DirectionsError> {
        let mut params = self.query_params(request);
        params.push(("key", self.api_key.clone()));

        log::debug!(
            "Requesting {} directions {} -> {} (alternatives={})",
            request.mode,
            request.origin,
            request.destination,
            request.alternatives
        );

        let body = retry::send_json(&self.retry, || {
            self.client.get(&self.base_url).query(&params)
        })
        .await?;

        let routes = extract_routes(&body)?;
        log::debug!("Directions returned {} route(s)", routes.len());
        Ok(routes)
    }
}

/// Extracts route geometries from a Directions API response body.
///
/// Per route, durations and distances are summed over its legs and the
/// `overview_polyline` is decoded. `ZERO_RESULTS` yields an empty list.
///
/// # Errors
///
/// Returns [`DirectionsError::ProviderStatus`] for any status other than
/// `OK` or `ZERO_RESULTS`, and [`DirectionsError::Malformed`] or
/// [`DirectionsError::Polyline`] for unexpected shapes.
pub fn extract_routes(body: &Value) -> Result<Vec<RouteGeometry>, DirectionsError> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or("");
    match status {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(vec![]),
        other => {
            return Err(DirectionsError::ProviderStatus {
                status: if other.is_empty() {
                    "MISSING_STATUS".to_string()
                } else {
                    other.to_string()
                },
                message: body
                    .get("error_message")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            });
        }
    }

    let routes = body
        .get("routes")
        .and_then(Value::as_array)
        .ok_or_else(|| DirectionsError::Malformed {
            message: "missing 'routes' array".to_string(),
        })?;

    routes.iter().map(parse_route).collect()
}

fn parse_route(route: &Value) -> Result<RouteGeometry, DirectionsError> {
    let summary = route
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let legs = route
        .get("legs")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);

    let sum_leg_values = |key: &str| -> f64 {
        legs.iter()
            .filter_map(|leg| leg.get(key)?.get("value")?.as_f64())
            .sum()
    };

    let encoded = route
        .get("overview_polyline")
        .and_then(|p| p.get("points"))
        .and_then(Value::as_str)
        .ok_or_else(|| DirectionsError::Malformed {
            message: format!("route '{summary}' has no overview_polyline"),
        })?;

    Ok(RouteGeometry {
        duration_s: sum_leg_values("duration"),
        distance_m: sum_leg_values("distance"),
        points: decode_polyline(encoded)?,
        summary,
    })
}
