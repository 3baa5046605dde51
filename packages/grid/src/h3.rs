//! [`HexGrid`] backend on top of `h3o`.

use h3o::{CellIndex, LatLng, Resolution};
use safe_steps_grid_models::{Cell, GeoPoint};

use crate::{GridError, HexGrid, validate_point, validate_resolution};

/// H3 grid backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct H3Grid;

impl H3Grid {
    /// Creates the backend. It holds no state.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn to_index(cell: Cell) -> Result<CellIndex, GridError> {
    CellIndex::try_from(cell.raw()).map_err(|_| GridError::InvalidCell(cell.to_string()))
}

fn from_index(index: CellIndex) -> Cell {
    Cell::from_raw(u64::from(index))
}

fn to_resolution(resolution: u8) -> Result<Resolution, GridError> {
    validate_resolution(resolution)?;
    Resolution::try_from(resolution).map_err(|_| GridError::InvalidResolution(resolution))
}

impl HexGrid for H3Grid {
    fn cell_for_point(&self, point: GeoPoint, resolution: u8) -> Result<Cell, GridError> {
        validate_point(&point)?;
        let res = to_resolution(resolution)?;
        let coord = LatLng::new(point.lat, point.lng).map_err(|_| GridError::InvalidCoordinate {
            lat: point.lat,
            lng: point.lng,
        })?;
        Ok(from_index(coord.to_cell(res)))
    }

    fn cell_to_center(&self, cell: Cell) -> Result<GeoPoint, GridError> {
        let center = LatLng::from(to_index(cell)?);
        Ok(GeoPoint::new(center.lat(), center.lng()))
    }

    fn cell_boundary(&self, cell: Cell) -> Result<Vec<GeoPoint>, GridError> {
        let boundary = to_index(cell)?.boundary();
        Ok(boundary
            .iter()
            .map(|v| GeoPoint::new(v.lat(), v.lng()))
            .collect())
    }

    fn grid_disk(&self, cell: Cell, k: u32) -> Result<Vec<(Cell, u32)>, GridError> {
        let index = to_index(cell)?;
        let disk: Vec<(CellIndex, u32)> = index.grid_disk_distances(k);
        Ok(disk
            .into_iter()
            .map(|(c, d)| (from_index(c), d))
            .collect())
    }
}
