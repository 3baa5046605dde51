//! External severity sources and bounded lookup fan-out.
//!
//! Every call that leaves the process goes through [`lookup_one`] or
//! [`lookup_many`], which bound each call with a timeout and absorb
//! failures as "unknown" so a single bad lookup never aborts a request.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{self, StreamExt as _};
use safe_steps_grid_models::Cell;
use safe_steps_severity::SeverityMap;

use crate::config::LookupConfig;

/// Errors reported by severity sources.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The source answered with an error.
    #[error("severity lookup for {key} via {provider} failed: {message}")]
    Failure {
        /// Cell handle or region key being looked up.
        key: String,
        /// Name of the failing source.
        provider: String,
        /// Source error message.
        message: String,
    },

    /// The source did not answer in time.
    #[error("severity lookup for {key} via {provider} timed out after {after:?}")]
    Timeout {
        /// Cell handle or region key being looked up.
        key: String,
        /// Name of the slow source.
        provider: String,
        /// Time waited.
        after: Duration,
    },
}

/// Per-cell severity source, usually backed by the store holding current
/// scores.
#[async_trait::async_trait]
pub trait SeverityLookup: Send + Sync {
    /// Source name used in diagnostics.
    fn name(&self) -> &str {
        "severity_lookup"
    }

    /// Current severity of `cell`, or `None` if the source has no score.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the source cannot answer.
    async fn severity(&self, cell: Cell) -> Result<Option<f64>, LookupError>;
}

/// Bulk severity source keyed by region, used to preload a
/// [`SeverityMap`] for an area in one call.
#[async_trait::async_trait]
pub trait BulkSeverityProvider: Send + Sync {
    /// Source name used in diagnostics.
    fn name(&self) -> &str {
        "bulk_severity_provider"
    }

    /// Every scored cell in `region`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the source cannot answer.
    async fn region_severities(&self, region: &str) -> Result<SeverityMap, LookupError>;
}

#[async_trait::async_trait]
impl SeverityLookup for SeverityMap {
    fn name(&self) -> &str {
        "severity_map"
    }

    async fn severity(&self, cell: Cell) -> Result<Option<f64>, LookupError> {
        Ok(self.get(cell))
    }
}

/// Region severities held in memory, for hosts that preload everything and
/// for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegions {
    regions: BTreeMap<String, SeverityMap>,
}

impl InMemoryRegions {
    /// Wraps a region → severities mapping.
    #[must_use]
    pub const fn new(regions: BTreeMap<String, SeverityMap>) -> Self {
        Self { regions }
    }
}

#[async_trait::async_trait]
impl BulkSeverityProvider for InMemoryRegions {
    fn name(&self) -> &str {
        "in_memory_regions"
    }

    async fn region_severities(&self, region: &str) -> Result<SeverityMap, LookupError> {
        Ok(self.regions.get(region).cloned().unwrap_or_default())
    }
}

/// Outcome of one bounded lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookupResult {
    /// The source returned a score.
    Known(f64),
    /// The source has no score for the cell.
    Unknown,
    /// The lookup failed or timed out; treated as unknown.
    Failed,
}

impl LookupResult {
    /// The score, if known.
    #[must_use]
    pub const fn score(self) -> Option<f64> {
        match self {
            Self::Known(score) => Some(score),
            Self::Unknown | Self::Failed => None,
        }
    }
}

/// Whether `score` can take part in ranking: finite and non-negative.
#[must_use]
pub fn is_usable_score(score: f64) -> bool {
    score.is_finite() && score >= 0.0
}

/// Looks up one cell, bounded by `timeout`.
///
/// Scores that are not finite or are negative count as failed lookups.
pub async fn lookup_one<L>(lookup: &L, cell: Cell, timeout: Duration) -> LookupResult
where
    L: SeverityLookup + ?Sized,
{
    match tokio::time::timeout(timeout, lookup.severity(cell)).await {
        Ok(Ok(Some(score))) if is_usable_score(score) => LookupResult::Known(score),
        Ok(Ok(Some(score))) => {
            log::warn!(
                "Discarding severity {score} for {cell} from {}: not a finite non-negative score",
                lookup.name()
            );
            LookupResult::Failed
        }
        Ok(Ok(None)) => LookupResult::Unknown,
        Ok(Err(e)) => {
            log::warn!("{e}");
            LookupResult::Failed
        }
        Err(_) => {
            let e = LookupError::Timeout {
                key: cell.to_string(),
                provider: lookup.name().to_string(),
                after: timeout,
            };
            log::warn!("{e}");
            LookupResult::Failed
        }
    }
}

/// Looks up many cells with at most `config.concurrency` calls in flight.
///
/// Results are returned in input order regardless of completion order.
pub async fn lookup_many<L>(
    lookup: &L,
    cells: &[Cell],
    config: &LookupConfig,
) -> Vec<(Cell, LookupResult)>
where
    L: SeverityLookup + ?Sized,
{
    let timeout = config.timeout();
    stream::iter(cells.iter().map(|&cell| async move {
        (cell, lookup_one(lookup, cell, timeout).await)
    }))
    .buffered(config.concurrency.max(1))
    .collect()
    .await
}
