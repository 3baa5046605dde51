//! Polygon coverage: the set of cells whose centers lie inside a ring.
//!
//! Works against any [`HexGrid`] by taking a disk around the cell at the
//! center of the polygon's bounding box. The first radius is estimated from
//! the seed's cell spacing; cell size varies across the globe, so the disk
//! keeps growing until no center on its outer shell lies inside the
//! bounding box. Each visited cell is kept when its center is contained in
//! the polygon.
//!
//! Rings that cross the antimeridian are not supported.

use std::collections::BTreeSet;

use geo::{Contains, LineString, Point, Polygon};
use safe_steps_grid_models::{BoundingBox, Cell, GeoPoint};

use crate::distance::haversine_m;
use crate::{GridError, HexGrid, validate_point, validate_resolution};

/// Upper bound on cells visited for a single polygon. A hex disk of
/// radius `k` holds `3k(k+1)+1` cells.
const MAX_VISITED_CELLS: u64 = 4_000_000;

/// Inner radius of a hex shell relative to center spacing (`sqrt(3)/2`),
/// rounded down.
const SHELL_INNER_RATIO: f64 = 0.85;

/// See [`HexGrid::cells_covering_polygon`].
///
/// # Errors
///
/// Returns [`GridError::InvalidGeometry`] for degenerate rings or polygons
/// too large for `resolution`, [`GridError::InvalidCoordinate`] for
/// out-of-range vertices, and [`GridError::InvalidResolution`] for bad
/// resolutions.
pub fn cells_covering_polygon<G: HexGrid + ?Sized>(
    grid: &G,
    ring: &[GeoPoint],
    resolution: u8,
) -> Result<BTreeSet<Cell>, GridError> {
    validate_resolution(resolution)?;
    for p in ring {
        validate_point(p)?;
    }

    let vertices = open_ring(ring);
    if distinct_vertex_count(vertices) < 3 {
        return Err(GridError::InvalidGeometry {
            message: format!(
                "polygon ring needs at least 3 distinct vertices, got {}",
                distinct_vertex_count(vertices)
            ),
        });
    }

    let polygon = to_polygon(vertices);
    let Some(bbox) = BoundingBox::from_points(vertices) else {
        return Ok(BTreeSet::new());
    };

    let seed = grid.cell_for_point(bbox.center(), resolution)?;
    let spacing = center_spacing_m(grid, seed)?;
    let reach_m = haversine_m(&bbox.center(), &GeoPoint::new(bbox.min_lat, bbox.min_lng))
        .max(haversine_m(
            &bbox.center(),
            &GeoPoint::new(bbox.max_lat, bbox.max_lng),
        ))
        .max(haversine_m(
            &bbox.center(),
            &GeoPoint::new(bbox.min_lat, bbox.max_lng),
        ))
        .max(haversine_m(
            &bbox.center(),
            &GeoPoint::new(bbox.max_lat, bbox.min_lng),
        ));

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut rings = (reach_m / (spacing * SHELL_INNER_RATIO)).ceil() as u32 + 1;

    loop {
        let visited_estimate = 3 * u64::from(rings) * (u64::from(rings) + 1) + 1;
        if visited_estimate > MAX_VISITED_CELLS {
            return Err(GridError::InvalidGeometry {
                message: format!(
                    "polygon spans ~{reach_m:.0}m from its center, too large to cover at \
                     resolution {resolution} ({visited_estimate} cells)"
                ),
            });
        }

        log::debug!(
            "Covering polygon of {} vertices at resolution {resolution} ({rings} rings)",
            vertices.len()
        );

        let mut covered = BTreeSet::new();
        let mut shell_in_bbox = false;
        for (cell, distance) in grid.grid_disk(seed, rings)? {
            let center = grid.cell_to_center(cell)?;
            if distance == rings && bbox.contains(&center) {
                shell_in_bbox = true;
            }
            if polygon.contains(&Point::new(center.lng, center.lat)) {
                covered.insert(cell);
            }
        }

        if !shell_in_bbox {
            return Ok(covered);
        }
        log::debug!("Outer shell at {rings} rings still inside the bounding box, growing");
        rings += rings / 4 + 1;
    }
}

/// Drops the closing vertex when the ring repeats its first point.
fn open_ring(ring: &[GeoPoint]) -> &[GeoPoint] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

fn distinct_vertex_count(vertices: &[GeoPoint]) -> usize {
    let mut seen: Vec<&GeoPoint> = Vec::with_capacity(vertices.len());
    for v in vertices {
        if !seen.contains(&v) {
            seen.push(v);
        }
    }
    seen.len()
}

fn to_polygon(vertices: &[GeoPoint]) -> Polygon<f64> {
    let exterior: LineString<f64> = vertices
        .iter()
        .map(|p| (p.lng, p.lat))
        .collect::<Vec<_>>()
        .into();
    Polygon::new(exterior, vec![])
}

/// Distance between the seed's center and its nearest neighbor's center.
fn center_spacing_m<G: HexGrid + ?Sized>(grid: &G, seed: Cell) -> Result<f64, GridError> {
    let center = grid.cell_to_center(seed)?;
    let mut spacing = f64::INFINITY;
    for neighbor in grid.ring_shell(seed, 1)? {
        let d = haversine_m(&center, &grid.cell_to_center(neighbor)?);
        spacing = spacing.min(d);
    }
    if spacing.is_finite() && spacing > 0.0 {
        Ok(spacing)
    } else {
        Err(GridError::InvalidGeometry {
            message: format!("cannot measure cell spacing around {seed}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::H3Grid;

    fn square(lat: f64, lng: f64, half: f64) -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(lat - half, lng - half),
            GeoPoint::new(lat - half, lng + half),
            GeoPoint::new(lat + half, lng + half),
            GeoPoint::new(lat + half, lng - half),
        ]
    }

    #[test]
    fn covers_small_square() {
        let grid = H3Grid::new();
        let ring = square(33.8938, 35.5018, 0.01);
        let cells = grid.cells_covering_polygon(&ring, 9).unwrap();

        // ~2.2km x ~1.8km at ~0.1 km^2 per cell
        assert!(cells.len() > 20, "only {} cells", cells.len());
        let polygon = to_polygon(&ring);
        for cell in &cells {
            let c = grid.cell_to_center(*cell).unwrap();
            assert!(polygon.contains(&Point::new(c.lng, c.lat)));
        }
    }

    #[test]
    fn closed_and_open_rings_agree() {
        let grid = H3Grid::new();
        let open = square(33.8938, 35.5018, 0.005);
        let mut closed = open.clone();
        closed.push(open[0]);
        assert_eq!(
            grid.cells_covering_polygon(&open, 9).unwrap(),
            grid.cells_covering_polygon(&closed, 9).unwrap()
        );
    }

    #[test]
    fn includes_cell_of_interior_point() {
        let grid = H3Grid::new();
        let ring = square(33.8938, 35.5018, 0.01);
        let cells = grid.cells_covering_polygon(&ring, 9).unwrap();
        let inner = grid
            .cell_for_point(GeoPoint::new(33.8938, 35.5018), 9)
            .unwrap();
        assert!(cells.contains(&inner));
    }

    #[test]
    fn degenerate_ring_is_invalid_geometry() {
        let grid = H3Grid::new();
        let ring = vec![
            GeoPoint::new(33.0, 35.0),
            GeoPoint::new(33.1, 35.1),
            GeoPoint::new(33.0, 35.0),
        ];
        assert!(matches!(
            grid.cells_covering_polygon(&ring, 9),
            Err(GridError::InvalidGeometry { .. })
        ));
        assert!(matches!(
            grid.cells_covering_polygon(&[], 9),
            Err(GridError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn self_intersecting_ring_does_not_panic() {
        let grid = H3Grid::new();
        let bowtie = vec![
            GeoPoint::new(33.88, 35.49),
            GeoPoint::new(33.90, 35.51),
            GeoPoint::new(33.88, 35.51),
            GeoPoint::new(33.90, 35.49),
        ];
        assert!(grid.cells_covering_polygon(&bowtie, 9).is_ok());
    }

    #[test]
    fn rejects_out_of_range_vertex() {
        let grid = H3Grid::new();
        let mut ring = square(33.8938, 35.5018, 0.01);
        ring[1] = GeoPoint::new(95.0, 35.5);
        assert!(matches!(
            grid.cells_covering_polygon(&ring, 9),
            Err(GridError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn continental_polygon_is_closed_under_adjacency() {
        let grid = H3Grid::new();
        let ring = vec![
            GeoPoint::new(10.0, 0.0),
            GeoPoint::new(10.0, 40.0),
            GeoPoint::new(55.0, 40.0),
            GeoPoint::new(55.0, 0.0),
        ];
        let polygon = to_polygon(&ring);

        for resolution in [2, 3] {
            let cells = grid.cells_covering_polygon(&ring, resolution).unwrap();
            assert!(!cells.is_empty());

            for cell in &cells {
                for neighbor in grid.ring_shell(*cell, 1).unwrap() {
                    let c = grid.cell_to_center(neighbor).unwrap();
                    if polygon.contains(&Point::new(c.lng, c.lat)) {
                        assert!(
                            cells.contains(&neighbor),
                            "{neighbor} is inside the polygon but not covered at resolution {resolution}"
                        );
                    }
                }
            }

            for corner in [GeoPoint::new(10.5, 0.5), GeoPoint::new(54.5, 39.5)] {
                let cell = grid.cell_for_point(corner, resolution).unwrap();
                let c = grid.cell_to_center(cell).unwrap();
                if polygon.contains(&Point::new(c.lng, c.lat)) {
                    assert!(cells.contains(&cell));
                }
            }
        }
    }

    #[test]
    fn rejects_polygon_too_large_for_resolution() {
        let grid = H3Grid::new();
        let ring = square(30.0, 30.0, 10.0);
        assert!(matches!(
            grid.cells_covering_polygon(&ring, 12),
            Err(GridError::InvalidGeometry { .. })
        ));
    }
}
