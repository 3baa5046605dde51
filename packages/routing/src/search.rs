//! Outward ring search for the nearest safe cell.

use safe_steps_grid::{Cell, GridError, HexGrid};
use safe_steps_routing_models::SafeCell;

use crate::config::{LookupConfig, SearchConfig};
use crate::lookup::{LookupResult, SeverityLookup, lookup_many, lookup_one};

/// Outcome of [`search_safe_cell`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeSearch {
    /// Lookup result for the start cell, resolved once at ring 0.
    pub start: LookupResult,
    /// Nearest safe cell, if any ring up to the limit had one.
    pub safe: Option<SafeCell>,
}

/// Finds the nearest cell whose severity is at or below
/// `search.safe_threshold`, expanding ring by ring from `start`.
///
/// Ring 0 is the start cell itself. For each ring `k` in
/// `1..=search.max_rings`, every cell at exactly distance `k` is looked up
/// (concurrently, bounded by `lookups`) and the first qualifying cell in
/// the grid's enumeration order wins. Cells with unknown severity are
/// skipped.
///
/// Returns `Ok(None)` when no ring up to `max_rings` has a safe cell.
///
/// # Errors
///
/// Returns [`GridError::InvalidCell`] if `start` is not a valid cell.
pub async fn find_nearest_safe_cell<G, L>(
    grid: &G,
    lookup: &L,
    start: Cell,
    search: &SearchConfig,
    lookups: &LookupConfig,
) -> Result<Option<SafeCell>, GridError>
where
    G: HexGrid + ?Sized,
    L: SeverityLookup + ?Sized,
{
    Ok(search_safe_cell(grid, lookup, start, search, lookups)
        .await?
        .safe)
}

/// Same search as [`find_nearest_safe_cell`], also returning the start
/// cell's lookup result so callers need not query it again.
///
/// # Errors
///
/// Returns [`GridError::InvalidCell`] if `start` is not a valid cell.
pub async fn search_safe_cell<G, L>(
    grid: &G,
    lookup: &L,
    start: Cell,
    search: &SearchConfig,
    lookups: &LookupConfig,
) -> Result<SafeSearch, GridError>
where
    G: HexGrid + ?Sized,
    L: SeverityLookup + ?Sized,
{
    let threshold = search.safe_threshold;

    let start_result = lookup_one(lookup, start, lookups.timeout()).await;
    match start_result {
        LookupResult::Known(severity) if severity <= threshold => {
            log::debug!("Start cell {start} is already safe ({severity:.2} <= {threshold})");
            return Ok(SafeSearch {
                start: start_result,
                safe: Some(SafeCell {
                    cell: start,
                    ring: 0,
                    severity,
                }),
            });
        }
        _ => {}
    }

    for k in 1..=search.max_rings {
        let shell = grid.ring_shell(start, k)?;
        log::debug!("Searching ring {k} around {start} ({} cells)", shell.len());

        let found = lookup_many(lookup, &shell, lookups)
            .await
            .into_iter()
            .find_map(|(cell, result)| match result {
                LookupResult::Known(severity) if severity <= threshold => Some(SafeCell {
                    cell,
                    ring: k,
                    severity,
                }),
                _ => None,
            });

        if let Some(safe) = found {
            log::debug!(
                "Found safe cell {} at ring {k} (severity {:.2})",
                safe.cell,
                safe.severity
            );
            return Ok(SafeSearch {
                start: start_result,
                safe: Some(safe),
            });
        }
    }

    log::debug!(
        "No cell at or below {threshold} within {} rings of {start}",
        search.max_rings
    );
    Ok(SafeSearch {
        start: start_result,
        safe: None,
    })
}
