//! Weighted, time-decayed, capped scoring.

use std::collections::BTreeMap;
use std::str::FromStr as _;

use chrono::{DateTime, TimeDelta, Utc};
use safe_steps_hazard_models::{Incident, IncidentType};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{SeverityConfigError, SeverityMap};

/// Milliseconds in a day.
const MS_PER_DAY: f64 = 86_400_000.0;

/// Smallest half-life used in the decay exponent. Keeps a zero half-life
/// from dividing by zero when a caller bypasses validation.
const MIN_HALF_LIFE_DAYS: f64 = 1e-6;

/// Severity model parameters.
///
/// Loaded once at startup (usually from the `[severity]` section of the
/// engine TOML) and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityConfig {
    /// Age at which an incident contributes half its weight.
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    /// Upper bound on a cell score.
    #[serde(default = "default_cap")]
    pub cap: f64,
    /// Weight for incident types missing from [`Self::weights`].
    #[serde(default = "default_weight")]
    pub default_weight: f64,
    /// Decay applied to incidents whose timestamp is missing or unparseable.
    #[serde(default = "default_fallback_decay")]
    pub fallback_decay: f64,
    /// Weight per incident type. Replaces the built-in table when given.
    #[serde(default = "default_weights", deserialize_with = "deserialize_weights")]
    pub weights: BTreeMap<IncidentType, f64>,
}

const fn default_half_life_days() -> f64 {
    7.0
}

const fn default_cap() -> f64 {
    10.0
}

const fn default_weight() -> f64 {
    1.0
}

const fn default_fallback_decay() -> f64 {
    0.4
}

fn default_weights() -> BTreeMap<IncidentType, f64> {
    BTreeMap::from([
        (IncidentType::Murder, 10.0),
        (IncidentType::Assault, 7.0),
        (IncidentType::Robbery, 5.5),
        (IncidentType::Theft, 4.0),
        (IncidentType::Harassment, 2.0),
        (IncidentType::Vandalism, 2.5),
        (IncidentType::DroneActivity, 1.5),
        (IncidentType::Airstrike, 9.0),
        (IncidentType::Explosion, 6.5),
        (IncidentType::Shooting, 8.0),
        (IncidentType::Kidnapping, 7.5),
        (IncidentType::Other, 1.0),
    ])
}

/// Reads the weight table with incident types as plain string keys, so
/// unknown types are rejected instead of silently becoming `other`.
fn deserialize_weights<'de, D>(deserializer: D) -> Result<BTreeMap<IncidentType, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    BTreeMap::<String, f64>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, weight)| {
            IncidentType::from_str(&key)
                .map(|t| (t, weight))
                .map_err(|_| D::Error::custom(format!("unknown incident type '{key}'")))
        })
        .collect()
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
            cap: default_cap(),
            default_weight: default_weight(),
            fallback_decay: default_fallback_decay(),
            weights: default_weights(),
        }
    }
}

impl SeverityConfig {
    /// Checks every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SeverityConfigError`] for a non-positive half-life or cap,
    /// negative weights, or a fallback decay outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), SeverityConfigError> {
        if !(self.half_life_days > 0.0 && self.half_life_days.is_finite()) {
            return Err(SeverityConfigError::NonPositiveHalfLife(
                self.half_life_days,
            ));
        }
        if !(self.cap > 0.0 && self.cap.is_finite()) {
            return Err(SeverityConfigError::InvalidCap(self.cap));
        }
        if self.default_weight.is_nan() || self.default_weight < 0.0 {
            return Err(SeverityConfigError::NegativeDefaultWeight(
                self.default_weight,
            ));
        }
        if !(0.0..=1.0).contains(&self.fallback_decay) {
            return Err(SeverityConfigError::InvalidFallbackDecay(
                self.fallback_decay,
            ));
        }
        for (&incident_type, &weight) in &self.weights {
            if weight.is_nan() || weight < 0.0 {
                return Err(SeverityConfigError::NegativeWeight {
                    incident_type,
                    weight,
                });
            }
        }
        Ok(())
    }

    /// Weight for an incident type, falling back to the default weight.
    #[must_use]
    pub fn weight_for(&self, incident_type: IncidentType) -> f64 {
        self.weights
            .get(&incident_type)
            .copied()
            .unwrap_or(self.default_weight)
    }

    /// Decay factor for an incident that occurred at `occurred_at`.
    ///
    /// Missing timestamps get [`Self::fallback_decay`].
    #[must_use]
    pub fn decay_for(&self, occurred_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        occurred_at.map_or(self.fallback_decay, |at| {
            decay(age_in_days(now, at), self.half_life_days)
        })
    }

    /// Scores one cell's incidents: `min(cap, sum(weight * decay))`.
    #[must_use]
    pub fn score_cell(&self, incidents: &[Incident], now: DateTime<Utc>) -> f64 {
        let total: f64 = incidents
            .iter()
            .map(|inc| self.weight_for(inc.incident_type) * self.decay_for(inc.occurred_at, now))
            .sum();
        total.min(self.cap)
    }
}

/// Age of an incident in fractional days. Future timestamps have age 0.
#[must_use]
pub fn age_in_days(now: DateTime<Utc>, occurred_at: DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let ms = (now - occurred_at).num_milliseconds() as f64;
    (ms / MS_PER_DAY).max(0.0)
}

/// Exponential half-life decay: `0.5^(age_days / half_life_days)`.
#[must_use]
pub fn decay(age_days: f64, half_life_days: f64) -> f64 {
    0.5_f64.powf(age_days.max(0.0) / half_life_days.max(MIN_HALF_LIFE_DAYS))
}

/// Scores one cell with the default weight table.
///
/// Convenience over [`SeverityConfig::score_cell`] for callers that only
/// vary the half-life and the cap.
#[must_use]
pub fn score_cell(
    incidents: &[Incident],
    now: DateTime<Utc>,
    half_life: TimeDelta,
    cap: f64,
) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let half_life_days = half_life.num_milliseconds() as f64 / MS_PER_DAY;
    let config = SeverityConfig {
        half_life_days,
        cap,
        ..SeverityConfig::default()
    };
    config.score_cell(incidents, now)
}

/// Groups incidents by cell and scores every cell.
#[must_use]
pub fn score_cells(
    incidents: &[Incident],
    now: DateTime<Utc>,
    config: &SeverityConfig,
) -> SeverityMap {
    let mut by_cell: BTreeMap<_, Vec<Incident>> = BTreeMap::new();
    for inc in incidents {
        by_cell.entry(inc.cell).or_default().push(inc.clone());
    }

    log::debug!(
        "Scoring {} incidents across {} cells",
        incidents.len(),
        by_cell.len()
    );

    by_cell
        .into_iter()
        .map(|(cell, incs)| (cell, config.score_cell(&incs, now)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use safe_steps_grid_models::Cell;

    const CELL: Cell = Cell::from_raw(0x0892_8308_28ff_ffff);

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn incident(incident_type: IncidentType, days_ago: i64) -> Incident {
        Incident {
            incident_type,
            occurred_at: Some(now() - TimeDelta::days(days_ago)),
            cell: CELL,
        }
    }

    #[test]
    fn empty_incidents_score_zero() {
        assert!(score_cell(&[], now(), TimeDelta::days(7), 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fresh_incident_scores_full_weight() {
        let config = SeverityConfig::default();
        let score = config.score_cell(&[incident(IncidentType::Robbery, 0)], now());
        assert!((score - 5.5).abs() < 1e-9);
    }

    #[test]
    fn one_half_life_halves_weight() {
        let config = SeverityConfig::default();
        let score = config.score_cell(&[incident(IncidentType::Theft, 7)], now());
        assert!((score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn score_never_exceeds_cap() {
        let config = SeverityConfig {
            cap: 5.0,
            ..SeverityConfig::default()
        };
        let incidents: Vec<_> = (0..20)
            .map(|d| incident(IncidentType::Murder, d))
            .collect();
        let score = config.score_cell(&incidents, now());
        assert!((score - 5.0).abs() < f64::EPSILON);

        let capped = score_cell(&incidents, now(), TimeDelta::days(7), 3.0);
        assert!(capped <= 3.0);
    }

    #[test]
    fn decay_is_monotonic_in_age() {
        let mut previous = f64::INFINITY;
        for age in [0.0, 0.5, 1.0, 3.0, 7.0, 14.0, 30.0, 365.0] {
            let d = decay(age, 7.0);
            assert!(d <= previous, "decay({age}) = {d} > {previous}");
            assert!(d > 0.0 && d <= 1.0);
            previous = d;
        }
    }

    #[test]
    fn future_timestamps_have_age_zero() {
        let future = now() + TimeDelta::days(3);
        assert!(age_in_days(now(), future).abs() < f64::EPSILON);

        let config = SeverityConfig::default();
        let inc = Incident {
            incident_type: IncidentType::Assault,
            occurred_at: Some(future),
            cell: CELL,
        };
        assert!((config.score_cell(&[inc], now()) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn missing_timestamp_uses_fallback_decay() {
        let config = SeverityConfig::default();
        let inc = Incident {
            incident_type: IncidentType::Murder,
            occurred_at: None,
            cell: CELL,
        };
        let score = config.score_cell(&[inc], now());
        assert!((score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn unweighted_type_uses_default_weight() {
        let mut config = SeverityConfig::default();
        config.weights.remove(&IncidentType::Harassment);
        config.default_weight = 1.25;
        let score = config.score_cell(&[incident(IncidentType::Harassment, 0)], now());
        assert!((score - 1.25).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(SeverityConfig::default().validate().is_ok());

        let bad_half_life = SeverityConfig {
            half_life_days: 0.0,
            ..SeverityConfig::default()
        };
        assert!(matches!(
            bad_half_life.validate(),
            Err(SeverityConfigError::NonPositiveHalfLife(_))
        ));

        let mut negative = SeverityConfig::default();
        negative.weights.insert(IncidentType::Theft, -1.0);
        assert!(matches!(
            negative.validate(),
            Err(SeverityConfigError::NegativeWeight { .. })
        ));

        let bad_fallback = SeverityConfig {
            fallback_decay: 1.5,
            ..SeverityConfig::default()
        };
        assert!(matches!(
            bad_fallback.validate(),
            Err(SeverityConfigError::InvalidFallbackDecay(_))
        ));
    }

    #[test]
    fn weights_deserialize_by_name() {
        let config: SeverityConfig =
            serde_json::from_str(r#"{"cap": 5.0, "weights": {"drone_activity": 3.0}}"#).unwrap();
        assert!((config.cap - 5.0).abs() < f64::EPSILON);
        assert!((config.half_life_days - 7.0).abs() < f64::EPSILON);
        assert!((config.weight_for(IncidentType::DroneActivity) - 3.0).abs() < f64::EPSILON);
        assert!((config.weight_for(IncidentType::Murder) - 1.0).abs() < f64::EPSILON);

        let err = serde_json::from_str::<SeverityConfig>(r#"{"weights": {"meteor": 3.0}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn score_cells_groups_by_cell() {
        let other = Cell::from_raw(0x0892_8308_2d7f_ffff);
        let config = SeverityConfig::default();
        let incidents = vec![
            incident(IncidentType::Theft, 0),
            incident(IncidentType::Theft, 0),
            Incident {
                incident_type: IncidentType::Harassment,
                occurred_at: Some(now()),
                cell: other,
            },
        ];
        let map = score_cells(&incidents, now(), &config);
        assert_eq!(map.len(), 2);
        assert!((map.get(CELL).unwrap() - 8.0).abs() < 1e-9);
        assert!((map.get(other).unwrap() - 2.0).abs() < 1e-9);
    }
}
