//! Route geometry sampling and cellification.

use safe_steps_grid::distance::haversine_m;
use safe_steps_grid::{Cell, GeoPoint, GridError, HexGrid};

/// Interpolates points from `start` toward `end` spaced no more than
/// `step_m` meters apart.
///
/// The result starts at `start` and excludes `end`, so consecutive segments
/// can be chained without duplicating vertices. A zero-length segment, or a
/// non-positive step, yields just `start`.
#[must_use]
pub fn densify_segment(start: GeoPoint, end: GeoPoint, step_m: f64) -> Vec<GeoPoint> {
    let distance = haversine_m(&start, &end);
    if distance <= 0.0 || !distance.is_finite() || step_m.is_nan() || step_m <= 0.0 {
        return vec![start];
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let steps = ((distance / step_m).ceil() as usize).max(1);

    (0..steps)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 / steps as f64;
            GeoPoint::new(
                (end.lat - start.lat).mul_add(t, start.lat),
                (end.lng - start.lng).mul_add(t, start.lng),
            )
        })
        .collect()
}

/// Samples a whole polyline: every segment densified, plus the final vertex.
#[must_use]
pub fn densify(points: &[GeoPoint], step_m: f64) -> Vec<GeoPoint> {
    let Some(last) = points.last() else {
        return vec![];
    };

    let mut sampled: Vec<GeoPoint> = points
        .windows(2)
        .flat_map(|pair| densify_segment(pair[0], pair[1], step_m))
        .collect();
    sampled.push(*last);
    sampled
}

/// Maps points to cells, collapsing consecutive duplicates. A cell may
/// reappear later if the route comes back to it.
///
/// # Errors
///
/// Returns [`GridError`] if a point is out of range or the resolution is
/// unsupported.
pub fn cellify<G>(grid: &G, points: &[GeoPoint], resolution: u8) -> Result<Vec<Cell>, GridError>
where
    G: HexGrid + ?Sized,
{
    let mut cells: Vec<Cell> = Vec::new();
    for point in points {
        let cell = grid.cell_for_point(*point, resolution)?;
        if cells.last() != Some(&cell) {
            cells.push(cell);
        }
    }
    Ok(cells)
}

/// Densifies a route geometry and returns the ordered cells it visits.
///
/// # Errors
///
/// Returns [`GridError`] if a vertex is out of range or the resolution is
/// unsupported.
pub fn route_cells<G>(
    grid: &G,
    points: &[GeoPoint],
    resolution: u8,
    step_m: f64,
) -> Result<Vec<Cell>, GridError>
where
    G: HexGrid + ?Sized,
{
    cellify(grid, &densify(points, step_m), resolution)
}
