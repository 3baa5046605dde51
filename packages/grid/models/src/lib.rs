#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hex-grid cell handles and geographic point types.
//!
//! These types are shared by every crate that talks about locations on the
//! grid. They carry no grid-library state: a [`Cell`] is an opaque handle
//! that only a grid backend knows how to interpret.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Finest supported grid resolution.
pub const MAX_RESOLUTION: u8 = 15;

/// Coarsest supported grid resolution.
pub const MIN_RESOLUTION: u8 = 1;

/// Resolution used when the caller does not pick one (~175m hexagons).
pub const DEFAULT_RESOLUTION: u8 = 9;

/// Opaque identifier for one hexagonal grid cell at a fixed resolution.
///
/// Serialized as the lowercase hexadecimal string form of the underlying
/// 64-bit index (e.g. `"892830828ffffff"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Cell(u64);

impl Cell {
    /// Wraps a raw 64-bit cell index.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit cell index.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Error returned when a string is not a valid hexadecimal cell handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCellError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseCellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid cell handle '{}'", self.input)
    }
}

impl std::error::Error for ParseCellError {}

impl FromStr for Cell {
    type Err = ParseCellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseCellError {
                input: s.to_string(),
            });
        }
        u64::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|_| ParseCellError {
                input: s.to_string(),
            })
    }
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        cell.to_string()
    }
}

impl TryFrom<String> for Cell {
    type Error = ParseCellError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl GeoPoint {
    /// Creates a point from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `true` when latitude is in `[-90, 90]` and longitude is in
    /// `[-180, 180]`. NaN coordinates are never valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Error returned when parsing a `"lat,lng"` string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePointError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParsePointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid point '{}': expected \"lat,lng\"", self.input)
    }
}

impl std::error::Error for ParsePointError {}

impl FromStr for GeoPoint {
    type Err = ParsePointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePointError {
            input: s.to_string(),
        };
        let (lat, lng) = s.split_once(',').ok_or_else(err)?;
        let lat = lat.trim().parse::<f64>().map_err(|_| err())?;
        let lng = lng.trim().parse::<f64>().map_err(|_| err())?;
        Ok(Self { lat, lng })
    }
}

/// An axis-aligned latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lng: f64,
    /// Eastern edge.
    pub max_lng: f64,
}

impl BoundingBox {
    /// Builds the smallest box containing every point, or `None` when the
    /// iterator is empty.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lng: first.lng,
            max_lng: first.lng,
        };
        for p in iter {
            bbox.extend(p);
        }
        Some(bbox)
    }

    /// Grows the box to include `point`.
    pub fn extend(&mut self, point: &GeoPoint) {
        self.min_lat = self.min_lat.min(point.lat);
        self.max_lat = self.max_lat.max(point.lat);
        self.min_lng = self.min_lng.min(point.lng);
        self.max_lng = self.max_lng.max(point.lng);
    }

    /// Returns the union of two boxes.
    #[must_use]
    pub fn union(mut self, other: &Self) -> Self {
        self.min_lat = self.min_lat.min(other.min_lat);
        self.max_lat = self.max_lat.max(other.max_lat);
        self.min_lng = self.min_lng.min(other.min_lng);
        self.max_lng = self.max_lng.max(other.max_lng);
        self
    }

    /// Returns `true` if the boxes overlap (touching edges count).
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lng <= other.max_lng
            && other.min_lng <= self.max_lng
    }

    /// Returns `true` if `point` lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}
