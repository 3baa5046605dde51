#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types produced by the routing engine.
//!
//! These are what the HTTP layer serializes: `{chosen, candidates,
//! cities_used?}` for routing and `{safe_hex, safe_point, route}` for
//! exit-to-safety.

use safe_steps_grid_models::{Cell, GeoPoint};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Severity aggregated along a route's visited cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeveritySummary {
    /// Mean over cells whose severity was resolved; 0 when none were.
    pub average: f64,
    /// Highest resolved severity; 0 when none were.
    pub max: f64,
    /// Number of cells whose severity was resolved.
    pub sample_count: usize,
    /// Cells with no known severity (absent everywhere, timed out, or
    /// failed).
    pub unknown_cells: usize,
    /// Subset of `unknown_cells` whose lookup failed or timed out.
    pub failed_lookups: usize,
}

/// One scored route candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    /// Provider's route description.
    pub summary: String,
    /// Ordered route vertices.
    pub geometry: Vec<GeoPoint>,
    /// Travel time in seconds.
    pub duration_s: f64,
    /// Travel distance in meters.
    pub distance_m: f64,
    /// Cells the route passes through, consecutive duplicates removed.
    pub visited_cells: Vec<Cell>,
    /// Severity along the route.
    pub severity: SeveritySummary,
    /// Weighted time/risk cost relative to the other candidates. Lower is
    /// better.
    pub cost: f64,
}

/// Ranked routing result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSelection {
    /// Lowest-cost candidate.
    pub chosen: RouteCandidate,
    /// Index of `chosen` within `candidates`.
    pub chosen_index: usize,
    /// Every candidate, in provider order.
    pub candidates: Vec<RouteCandidate>,
    /// Regions whose severities were preloaded for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cities_used: Option<Vec<String>>,
}

/// Nearest cell at or below the safety threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeCell {
    /// The safe cell.
    pub cell: Cell,
    /// Grid distance from the start cell.
    pub ring: u32,
    /// Severity that qualified the cell.
    pub severity: f64,
}

/// Why the alert hysteresis decided the way it did.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertReason {
    /// No previous score and the new one is at or above the up threshold.
    NoPrevHigh,
    /// No previous score and the new one is below the up threshold.
    NoPrevLow,
    /// Previously high and still at or above the down threshold.
    StillHigh,
    /// Crossed the up threshold with a large enough jump.
    CrossedUp,
    /// Below the thresholds, or the rise was too small.
    LowOrSmallChange,
}

/// Outcome of the alert hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDecision {
    /// Whether to alert.
    pub alert: bool,
    /// Which rule decided.
    pub reason: AlertReason,
}

/// A computed exit route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRoute {
    /// Cell containing the current position.
    pub start_cell: Cell,
    /// Nearest safe cell.
    #[serde(rename = "safe_hex")]
    pub safe_cell: Cell,
    /// Center of the safe cell (the route destination).
    pub safe_point: GeoPoint,
    /// Grid distance from start to safe cell.
    pub ring: u32,
    /// Severity of the safe cell.
    pub safe_severity: f64,
    /// Route from the current position to `safe_point`.
    pub route: RouteSelection,
    /// Alert decision, when one was evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertDecision>,
    /// Notification message id, when an alert was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Notification failure, when an alert could not be sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_error: Option<String>,
}

/// Result of an exit-to-safety request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// A safe cell was found and a route computed.
    Exit(ExitRoute),
    /// The current cell is already safe.
    AlreadySafe {
        /// Cell containing the current position.
        start_cell: Cell,
        /// Its severity.
        severity: f64,
    },
    /// No safe cell within the search radius.
    NoSafeExit {
        /// Cell containing the current position.
        start_cell: Cell,
        /// Rings searched before giving up.
        rings_searched: u32,
        /// Alert decision, when the current cell's severity is known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alert: Option<AlertDecision>,
        /// Notification message id, when an alert was sent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        /// Notification failure, when an alert could not be sent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notification_error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_safe_exit_serializes_with_status() {
        let outcome = ExitOutcome::NoSafeExit {
            start_cell: Cell::from_raw(0x0892_8308_28ff_ffff),
            rings_searched: 4,
            alert: None,
            message_id: None,
            notification_error: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "no_safe_exit");
        assert_eq!(json["start_cell"], "892830828ffffff");
        assert_eq!(json["rings_searched"], 4);
        assert!(json.get("alert").is_none());
    }

    #[test]
    fn alert_reason_names() {
        assert_eq!(AlertReason::LowOrSmallChange.to_string(), "low_or_small_change");
        assert_eq!(
            serde_json::to_string(&AlertReason::NoPrevHigh).unwrap(),
            "\"no_prev_high\""
        );
    }

    #[test]
    fn cities_used_is_omitted_when_absent() {
        let candidate = RouteCandidate {
            summary: String::new(),
            geometry: vec![],
            duration_s: 1.0,
            distance_m: 1.0,
            visited_cells: vec![],
            severity: SeveritySummary::default(),
            cost: 0.0,
        };
        let selection = RouteSelection {
            chosen: candidate.clone(),
            chosen_index: 0,
            candidates: vec![candidate],
            cities_used: None,
        };
        let json = serde_json::to_value(&selection).unwrap();
        assert!(json.get("cities_used").is_none());
        assert!(json.get("chosen").is_some());
    }
}
