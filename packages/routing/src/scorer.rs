//! Route candidate scoring and selection.
//!
//! Each candidate is densified, cellified, and given a severity summary;
//! candidates are then ranked by
//! `alpha * duration / max_duration + (1 - alpha) * avg / max_avg`.

use std::collections::{BTreeMap, BTreeSet};

use safe_steps_directions::RouteGeometry;
use safe_steps_grid::{Cell, HexGrid};
use safe_steps_routing_models::{RouteCandidate, RouteSelection, SeveritySummary};
use safe_steps_severity::SeverityMap;

use crate::RoutingError;
use crate::config::{LookupConfig, RoutingConfig};
use crate::densify::route_cells;
use crate::lookup::{LookupResult, SeverityLookup, is_usable_score, lookup_many};

/// Aggregates severity along `cells`.
///
/// Scores come from `map` first. Cells missing from it are looked up
/// through `fallback` (each distinct cell once, bounded by `lookups`).
/// Cells still unresolved are left out of the average and counted in
/// `unknown_cells`; those whose lookup failed or timed out are also counted
/// in `failed_lookups`. Map entries that are not finite and non-negative
/// are treated like failed lookups.
pub async fn summarize_severity<L>(
    cells: &[Cell],
    map: &SeverityMap,
    fallback: &L,
    lookups: &LookupConfig,
) -> SeveritySummary
where
    L: SeverityLookup + ?Sized,
{
    let missing: Vec<Cell> = cells
        .iter()
        .copied()
        .filter(|c| !map.contains(*c))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let resolved: BTreeMap<Cell, LookupResult> = if missing.is_empty() {
        BTreeMap::new()
    } else {
        lookup_many(fallback, &missing, lookups)
            .await
            .into_iter()
            .collect()
    };

    let mut summary = SeveritySummary::default();
    let mut total = 0.0;

    for cell in cells {
        let result = match map.get(*cell) {
            Some(score) if is_usable_score(score) => LookupResult::Known(score),
            Some(_) => LookupResult::Failed,
            None => resolved.get(cell).copied().unwrap_or(LookupResult::Unknown),
        };
        match result {
            LookupResult::Known(score) => {
                total += score;
                summary.max = if summary.sample_count == 0 {
                    score
                } else {
                    summary.max.max(score)
                };
                summary.sample_count += 1;
            }
            LookupResult::Unknown => summary.unknown_cells += 1,
            LookupResult::Failed => {
                summary.unknown_cells += 1;
                summary.failed_lookups += 1;
            }
        }
    }

    if summary.sample_count > 0 {
        #[allow(clippy::cast_precision_loss)]
        let count = summary.sample_count as f64;
        summary.average = total / count;
    }
    summary
}

/// Computes every candidate's cost and returns the index of the cheapest.
///
/// Durations and average severities are normalized by their maximum across
/// candidates (a zero maximum is replaced by 1). Ties go to the earliest
/// candidate. A candidate whose cost is NaN ranks last.
///
/// # Errors
///
/// Returns [`RoutingError::NoRouteCandidates`] if `candidates` is empty.
pub fn choose_best_route(
    candidates: &mut [RouteCandidate],
    alpha: f64,
) -> Result<usize, RoutingError> {
    if candidates.is_empty() {
        return Err(RoutingError::NoRouteCandidates);
    }

    let max_duration = non_zero_or_one(candidates.iter().map(|c| c.duration_s));
    let max_average = non_zero_or_one(candidates.iter().map(|c| c.severity.average));

    for candidate in candidates.iter_mut() {
        let norm_duration = candidate.duration_s / max_duration;
        let norm_severity = candidate.severity.average / max_average;
        candidate.cost = alpha.mul_add(norm_duration, (1.0 - alpha) * norm_severity);
    }

    let rank = |cost: f64| if cost.is_nan() { f64::INFINITY } else { cost };
    let mut best = 0;
    for (i, candidate) in candidates.iter().enumerate().skip(1) {
        if rank(candidate.cost) < rank(candidates[best].cost) {
            best = i;
        }
    }
    Ok(best)
}

fn non_zero_or_one(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.filter(|v| v.is_finite()).fold(0.0_f64, f64::max);
    if max > 0.0 { max } else { 1.0 }
}

/// Scores every route geometry and picks the best one.
///
/// Candidates are summarized concurrently; the result only depends on the
/// inputs, never on completion order.
///
/// # Errors
///
/// Returns [`RoutingError::NoRouteCandidates`] for an empty `routes` list
/// and [`RoutingError::Grid`] if a route vertex is out of range.
pub async fn score_candidates<G, L>(
    grid: &G,
    routes: Vec<RouteGeometry>,
    map: &SeverityMap,
    fallback: &L,
    routing: &RoutingConfig,
    lookups: &LookupConfig,
) -> Result<RouteSelection, RoutingError>
where
    G: HexGrid + ?Sized,
    L: SeverityLookup + ?Sized,
{
    if routes.is_empty() {
        return Err(RoutingError::NoRouteCandidates);
    }

    let cellified = routes
        .into_iter()
        .map(|route| {
            let cells = route_cells(
                grid,
                &route.points,
                routing.resolution,
                routing.sample_step_m,
            )?;
            Ok((route, cells))
        })
        .collect::<Result<Vec<_>, RoutingError>>()?;

    let summaries = futures::future::join_all(
        cellified
            .iter()
            .map(|(_, cells)| summarize_severity(cells, map, fallback, lookups)),
    )
    .await;

    let mut candidates: Vec<RouteCandidate> = cellified
        .into_iter()
        .zip(summaries)
        .map(|((route, visited_cells), severity)| RouteCandidate {
            summary: route.summary,
            geometry: route.points,
            duration_s: route.duration_s,
            distance_m: route.distance_m,
            visited_cells,
            severity,
            cost: 0.0,
        })
        .collect();

    let chosen_index = choose_best_route(&mut candidates, routing.alpha)?;

    for (i, c) in candidates.iter().enumerate() {
        log::debug!(
            "Candidate {i} '{}': {:.0}s, {} cells, avg {:.2} max {:.2} ({} samples, {} unknown), cost {:.3}{}",
            c.summary,
            c.duration_s,
            c.visited_cells.len(),
            c.severity.average,
            c.severity.max,
            c.severity.sample_count,
            c.severity.unknown_cells,
            c.cost,
            if i == chosen_index { " [chosen]" } else { "" }
        );
    }

    Ok(RouteSelection {
        chosen: candidates[chosen_index].clone(),
        chosen_index,
        candidates,
        cities_used: None,
    })
}
