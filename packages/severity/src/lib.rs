#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Severity model for grid cells.
//!
//! Each incident contributes `weight(type) * 0.5^(age_days / half_life_days)`
//! to the score of its cell, and the sum is capped. Scores are mapped to
//! display bands by a configurable [`RiskScale`].
//!
//! Nothing here is persisted: a [`SeverityMap`] is rebuilt per request from
//! whatever the caller supplies.

pub mod map;
pub mod risk;
pub mod score;
pub mod timestamp;

pub use map::SeverityMap;
pub use risk::{RiskBand, RiskScale};
pub use score::{SeverityConfig, age_in_days, decay, score_cell, score_cells};

use safe_steps_hazard_models::IncidentType;

/// Errors from invalid severity configuration.
#[derive(Debug, thiserror::Error)]
pub enum SeverityConfigError {
    /// Half-life must be strictly positive.
    #[error("half-life must be positive, got {0} days")]
    NonPositiveHalfLife(f64),

    /// Cap must be strictly positive and finite.
    #[error("score cap must be positive and finite, got {0}")]
    InvalidCap(f64),

    /// Weights must be non-negative.
    #[error("weight for {incident_type} must be non-negative, got {weight}")]
    NegativeWeight {
        /// Offending incident type.
        incident_type: IncidentType,
        /// Offending weight.
        weight: f64,
    },

    /// Default weight must be non-negative.
    #[error("default weight must be non-negative, got {0}")]
    NegativeDefaultWeight(f64),

    /// Fallback decay must lie in `[0, 1]`.
    #[error("fallback decay must be within [0, 1], got {0}")]
    InvalidFallbackDecay(f64),

    /// Risk bands are empty, non-monotonic, or do not reach the cap.
    #[error("invalid risk scale: {message}")]
    InvalidRiskScale {
        /// Description of the problem.
        message: String,
    },
}
