//! Mapping scores onto ordered display bands.

use safe_steps_hazard_models::{CellSeverity, ScoredCell};
use safe_steps_grid_models::Cell;
use serde::{Deserialize, Serialize};

use crate::SeverityConfigError;

/// One band of the risk scale. A band covers scores in
/// `(previous_band.upper_bound, upper_bound]`; the first band starts at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBand {
    /// Band name (e.g. `"low"`).
    pub label: String,
    /// Display color (e.g. `"#00FF00"`).
    pub color: String,
    /// Inclusive upper bound of the band.
    pub upper_bound: f64,
}

/// Ordered set of bands partitioning `[0, cap]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScale {
    bands: Vec<RiskBand>,
}

impl Default for RiskScale {
    fn default() -> Self {
        Self {
            bands: vec![
                RiskBand {
                    label: "low".to_string(),
                    color: "#00FF00".to_string(),
                    upper_bound: 3.0,
                },
                RiskBand {
                    label: "medium".to_string(),
                    color: "#FFFF00".to_string(),
                    upper_bound: 6.0,
                },
                RiskBand {
                    label: "high".to_string(),
                    color: "#FF0000".to_string(),
                    upper_bound: 10.0,
                },
            ],
        }
    }
}

impl RiskScale {
    /// Builds a scale and checks that it partitions `[0, cap]`.
    ///
    /// # Errors
    ///
    /// Returns [`SeverityConfigError::InvalidRiskScale`] if the bands are
    /// empty, not strictly increasing, or stop short of `cap`.
    pub fn new(bands: Vec<RiskBand>, cap: f64) -> Result<Self, SeverityConfigError> {
        let scale = Self { bands };
        scale.validate(cap)?;
        Ok(scale)
    }

    /// Checks that the bands partition `[0, cap]` without gaps.
    ///
    /// # Errors
    ///
    /// Returns [`SeverityConfigError::InvalidRiskScale`] on violation.
    pub fn validate(&self, cap: f64) -> Result<(), SeverityConfigError> {
        let invalid = |message: String| SeverityConfigError::InvalidRiskScale { message };

        let Some(last) = self.bands.last() else {
            return Err(invalid("at least one band is required".to_string()));
        };

        let mut lower = 0.0;
        for band in &self.bands {
            if !band.upper_bound.is_finite() {
                return Err(invalid(format!(
                    "band '{}' has non-finite upper bound",
                    band.label
                )));
            }
            if band.upper_bound <= lower {
                return Err(invalid(format!(
                    "band '{}' upper bound {} must exceed {lower}",
                    band.label, band.upper_bound
                )));
            }
            lower = band.upper_bound;
        }

        if last.upper_bound < cap {
            return Err(invalid(format!(
                "last band '{}' ends at {} but scores reach {cap}",
                last.label, last.upper_bound
            )));
        }
        Ok(())
    }

    /// Bands in ascending order.
    #[must_use]
    pub fn bands(&self) -> &[RiskBand] {
        &self.bands
    }

    /// Band containing `score`. Scores above the last bound fall into the
    /// last band; negative scores fall into the first.
    ///
    /// Returns `None` only for an empty scale, which [`Self::validate`]
    /// rejects.
    #[must_use]
    pub fn categorize(&self, score: f64) -> Option<&RiskBand> {
        self.bands
            .iter()
            .find(|band| score <= band.upper_bound)
            .or_else(|| self.bands.last())
    }

    /// Builds the `{score, color}` payload for a cell.
    #[must_use]
    pub fn cell_severity(&self, score: f64) -> CellSeverity {
        CellSeverity {
            score,
            color: self
                .categorize(score)
                .map(|b| b.color.clone())
                .unwrap_or_default(),
        }
    }

    /// Builds a [`ScoredCell`] listing entry.
    #[must_use]
    pub fn scored_cell(&self, cell: Cell, score: f64) -> ScoredCell {
        let band = self.categorize(score);
        ScoredCell {
            cell,
            score,
            color: band.map(|b| b.color.clone()).unwrap_or_default(),
            category: band.map(|b| b.label.clone()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(label: &str, upper_bound: f64) -> RiskBand {
        RiskBand {
            label: label.to_string(),
            color: format!("#{label}"),
            upper_bound,
        }
    }

    #[test]
    fn default_scale_matches_thresholds() {
        let scale = RiskScale::default();
        assert!(scale.validate(10.0).is_ok());
        assert_eq!(scale.categorize(0.0).unwrap().label, "low");
        assert_eq!(scale.categorize(3.0).unwrap().label, "low");
        assert_eq!(scale.categorize(3.01).unwrap().label, "medium");
        assert_eq!(scale.categorize(6.0).unwrap().label, "medium");
        assert_eq!(scale.categorize(6.5).unwrap().label, "high");
        assert_eq!(scale.categorize(10.0).unwrap().label, "high");
    }

    #[test]
    fn categorize_is_monotonic() {
        let scale = RiskScale::default();
        let index = |score: f64| {
            let label = &scale.categorize(score).unwrap().label;
            scale.bands().iter().position(|b| &b.label == label).unwrap()
        };
        let mut previous = 0;
        for step in 0..=100 {
            let score = f64::from(step) / 10.0;
            let i = index(score);
            assert!(i >= previous);
            previous = i;
        }
    }

    #[test]
    fn out_of_range_scores_clamp_to_edge_bands() {
        let scale = RiskScale::default();
        assert_eq!(scale.categorize(-1.0).unwrap().label, "low");
        assert_eq!(scale.categorize(42.0).unwrap().label, "high");
    }

    #[test]
    fn rejects_non_monotonic_bands() {
        let err = RiskScale::new(vec![band("a", 5.0), band("b", 4.0)], 5.0);
        assert!(matches!(err, Err(SeverityConfigError::InvalidRiskScale { .. })));
    }

    #[test]
    fn rejects_scale_short_of_cap() {
        let err = RiskScale::new(vec![band("a", 2.0), band("b", 4.0)], 5.0);
        assert!(matches!(err, Err(SeverityConfigError::InvalidRiskScale { .. })));
    }

    #[test]
    fn rejects_empty_scale() {
        assert!(RiskScale::new(vec![], 5.0).is_err());
    }

    #[test]
    fn accepts_custom_band_count() {
        let scale = RiskScale::new(
            vec![band("calm", 1.0), band("watch", 2.5), band("danger", 5.0)],
            5.0,
        )
        .unwrap();
        assert_eq!(scale.categorize(2.0).unwrap().label, "watch");
        let payload = scale.cell_severity(4.0);
        assert_eq!(payload.color, "#danger");
    }
}
