#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hexagonal grid addressing.
//!
//! The risk engine never talks to a hex library directly. Everything it
//! needs from the grid goes through the [`HexGrid`] capability trait:
//! point-to-cell, cell-to-center, cell boundary, and the k-disk around a
//! cell. [`H3Grid`] implements it on top of `h3o`.
//!
//! Shell enumeration ([`HexGrid::ring_shell`]) and polygon coverage
//! ([`HexGrid::cells_covering_polygon`]) are provided methods built from
//! those primitives, so any backend gets them for free.

pub mod coverage;
pub mod distance;
pub mod h3;

use std::collections::BTreeSet;

pub use h3::H3Grid;
pub use safe_steps_grid_models::{
    BoundingBox, Cell, DEFAULT_RESOLUTION, GeoPoint, MAX_RESOLUTION, MIN_RESOLUTION,
};

/// Errors from grid addressing operations.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// Latitude outside `[-90, 90]` or longitude outside `[-180, 180]`.
    #[error("invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate {
        /// Rejected latitude.
        lat: f64,
        /// Rejected longitude.
        lng: f64,
    },

    /// Resolution outside the supported range.
    #[error("invalid resolution {0}: expected {MIN_RESOLUTION}-{MAX_RESOLUTION}")]
    InvalidResolution(u8),

    /// The handle does not name a cell known to the backend.
    #[error("invalid cell {0}")]
    InvalidCell(String),

    /// A polygon ring could not be used for coverage.
    #[error("invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of the problem.
        message: String,
    },
}

/// Validates that a point lies within WGS84 bounds.
///
/// # Errors
///
/// Returns [`GridError::InvalidCoordinate`] if latitude or longitude is out
/// of range or not a number.
pub fn validate_point(point: &GeoPoint) -> Result<(), GridError> {
    if point.is_valid() {
        Ok(())
    } else {
        Err(GridError::InvalidCoordinate {
            lat: point.lat,
            lng: point.lng,
        })
    }
}

/// Validates a grid resolution.
///
/// # Errors
///
/// Returns [`GridError::InvalidResolution`] outside
/// [`MIN_RESOLUTION`]..=[`MAX_RESOLUTION`].
pub const fn validate_resolution(resolution: u8) -> Result<(), GridError> {
    if resolution >= MIN_RESOLUTION && resolution <= MAX_RESOLUTION {
        Ok(())
    } else {
        Err(GridError::InvalidResolution(resolution))
    }
}

/// Capability interface over a hexagonal grid library.
///
/// Implementations must be deterministic: the same point and resolution
/// always map to the same cell, and [`HexGrid::grid_disk`] enumerates
/// cells in the same order for the same input.
pub trait HexGrid: Send + Sync {
    /// Maps a point to the cell containing it at `resolution`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidCoordinate`] for out-of-range points and
    /// [`GridError::InvalidResolution`] for unsupported resolutions.
    fn cell_for_point(&self, point: GeoPoint, resolution: u8) -> Result<Cell, GridError>;

    /// Returns the center point of `cell`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidCell`] if the handle is not a valid cell.
    fn cell_to_center(&self, cell: Cell) -> Result<GeoPoint, GridError>;

    /// Returns the ordered boundary ring of `cell` (not closed).
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidCell`] if the handle is not a valid cell.
    fn cell_boundary(&self, cell: Cell) -> Result<Vec<GeoPoint>, GridError>;

    /// Returns every cell within grid distance `k` of `cell`, paired with
    /// its distance.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidCell`] if the handle is not a valid cell.
    fn grid_disk(&self, cell: Cell, k: u32) -> Result<Vec<(Cell, u32)>, GridError>;

    /// Returns the cells at exactly grid distance `k` from `cell`
    /// (disk(k) minus disk(k-1)), in the backend's enumeration order.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidCell`] if the handle is not a valid cell.
    fn ring_shell(&self, cell: Cell, k: u32) -> Result<Vec<Cell>, GridError> {
        Ok(self
            .grid_disk(cell, k)?
            .into_iter()
            .filter_map(|(c, d)| (d == k).then_some(c))
            .collect())
    }

    /// Returns the cells whose centers fall inside the polygon described by
    /// `ring` (ordered vertices, no holes).
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidGeometry`] for rings with fewer than
    /// three distinct vertices or polygons too large for the resolution,
    /// and [`GridError::InvalidCoordinate`] for out-of-range vertices.
    fn cells_covering_polygon(
        &self,
        ring: &[GeoPoint],
        resolution: u8,
    ) -> Result<BTreeSet<Cell>, GridError> {
        coverage::cells_covering_polygon(self, ring, resolution)
    }
}
