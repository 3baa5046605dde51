#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard incident taxonomy and per-cell severity payload types.
//!
//! Every incident feeding the severity model is normalized into one of the
//! [`IncidentType`] categories. Reporting pipelines use free-form strings
//! ("Shooting", "drone activity", ...), so [`IncidentType::from_raw`] is
//! lenient and falls back to [`IncidentType::Other`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use safe_steps_grid_models::Cell;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Hazard categories an incident can be reported as.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentType {
    /// Homicide.
    Murder,
    /// Physical attack on a person.
    Assault,
    /// Taking property by force or threat.
    Robbery,
    /// Taking property without force.
    Theft,
    /// Verbal or physical harassment.
    Harassment,
    /// Damage to property.
    Vandalism,
    /// Drone sightings or drone strikes.
    DroneActivity,
    /// Aerial bombardment.
    Airstrike,
    /// Explosion of any origin.
    Explosion,
    /// Gunfire.
    Shooting,
    /// Abduction.
    Kidnapping,
    /// Anything not fitting another category.
    Other,
}

impl IncidentType {
    /// Normalizes a free-form type string.
    ///
    /// Case and surrounding whitespace are ignored, and spaces or dashes are
    /// treated as underscores. Unrecognized strings map to
    /// [`IncidentType::Other`].
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
        Self::from_str(&normalized).unwrap_or(Self::Other)
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Murder,
            Self::Assault,
            Self::Robbery,
            Self::Theft,
            Self::Harassment,
            Self::Vandalism,
            Self::DroneActivity,
            Self::Airstrike,
            Self::Explosion,
            Self::Shooting,
            Self::Kidnapping,
            Self::Other,
        ]
    }
}

/// A reported incident attributed to one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Normalized hazard category.
    pub incident_type: IncidentType,
    /// When the incident occurred. `None` when the source timestamp was
    /// missing or could not be parsed.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Cell the incident was reported in.
    pub cell: Cell,
}

/// Severity payload for a single cell as served to map clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSeverity {
    /// Decayed, capped severity score.
    pub score: f64,
    /// Display color of the risk band the score falls into.
    pub color: String,
}

/// A [`CellSeverity`] with its cell attached, used for bulk listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCell {
    /// The scored cell.
    pub cell: Cell,
    /// Decayed, capped severity score.
    pub score: f64,
    /// Display color of the risk band.
    pub color: String,
    /// Label of the risk band (e.g. `"high"`).
    pub category: String,
}
