#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory catalog of named regions (cities).
//!
//! Loads city polygons from a `GeoJSON` `FeatureCollection`, builds an
//! R-tree over their envelopes, and answers point-in-region and
//! bbox-intersection queries. The routing engine uses it to decide which
//! regions' severities to preload for a request.
//!
//! The catalog is an explicit value owned by the host application; nothing
//! here is cached process-wide.

use std::collections::BTreeSet;
use std::path::Path;

use geo::{BoundingRect, Intersects, MultiPolygon, Point, Rect};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use safe_steps_grid_models::{BoundingBox, GeoPoint};

/// Errors from loading a region catalog.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// The catalog file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The input is not valid `GeoJSON`.
    #[error("failed to parse region GeoJSON: {message}")]
    Parse {
        /// Parser message.
        message: String,
    },

    /// The top-level object is not a `FeatureCollection`.
    #[error("region catalog must be a GeoJSON FeatureCollection")]
    NotFeatureCollection,

    /// A feature with geometry has neither `shapeName` nor `name`.
    #[error("region feature #{index} has no 'shapeName' or 'name' property")]
    MissingName {
        /// Zero-based feature index in the collection.
        index: usize,
    },
}

/// A region polygon stored in the R-tree with its metadata.
struct RegionEntry {
    name: String,
    /// Position in the source collection; earlier features win point lookups.
    order: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over named region polygons.
pub struct RegionIndex {
    regions: RTree<RegionEntry>,
    names: BTreeSet<String>,
}

impl RegionIndex {
    /// Reads and indexes a `GeoJSON` region file.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let index = Self::from_geojson_str(&raw)?;
        log::info!(
            "Loaded {} regions into spatial index from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Parses and indexes a `GeoJSON` `FeatureCollection`.
    ///
    /// Each feature's name comes from its `shapeName` property, falling
    /// back to `name`. Features without geometry are skipped, as are
    /// geometries other than `Polygon`/`MultiPolygon`.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError`] if the input is not a `FeatureCollection` or a
    /// feature with geometry has no name.
    pub fn from_geojson_str(raw: &str) -> Result<Self, RegionError> {
        let geojson: GeoJson = raw.parse().map_err(|e: geojson::Error| RegionError::Parse {
            message: e.to_string(),
        })?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(RegionError::NotFeatureCollection);
        };

        let mut entries = Vec::new();
        let mut names = BTreeSet::new();

        for (index, feature) in collection.features.into_iter().enumerate() {
            let Some(geometry) = feature.geometry else {
                continue;
            };

            let name = feature
                .properties
                .as_ref()
                .and_then(|props| {
                    props
                        .get("shapeName")
                        .and_then(serde_json::Value::as_str)
                        .or_else(|| props.get("name").and_then(serde_json::Value::as_str))
                })
                .map(str::to_string)
                .ok_or(RegionError::MissingName { index })?;

            let Some(polygon) = to_multipolygon(geometry) else {
                log::warn!("Skipping region '{name}': geometry is not a polygon");
                continue;
            };

            names.insert(name.clone());
            entries.push(RegionEntry {
                name,
                order: index,
                envelope: compute_envelope(&polygon),
                polygon,
            });
        }

        Ok(Self {
            regions: RTree::bulk_load(entries),
            names,
        })
    }

    /// Number of indexed region polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.size()
    }

    /// Returns `true` if no region is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.size() == 0
    }

    /// Sorted, de-duplicated region names.
    #[must_use]
    pub fn region_names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }

    /// Name of the first region (in source order) covering `point`.
    /// Points on a region's edge count as covered.
    #[must_use]
    pub fn region_for_point(&self, point: &GeoPoint) -> Option<&str> {
        let query = Point::new(point.lng, point.lat);
        let query_env = AABB::from_point([point.lng, point.lat]);

        self.regions
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&query))
            .min_by_key(|entry| entry.order)
            .map(|entry| entry.name.as_str())
    }

    /// Names of every region whose polygon intersects `bbox`, in source
    /// order, without duplicates.
    #[must_use]
    pub fn regions_intersecting(&self, bbox: &BoundingBox) -> Vec<String> {
        let rect = Rect::new((bbox.min_lng, bbox.min_lat), (bbox.max_lng, bbox.max_lat));
        let query_env = AABB::from_corners(
            [bbox.min_lng, bbox.min_lat],
            [bbox.max_lng, bbox.max_lat],
        );

        let mut hits: Vec<&RegionEntry> = self
            .regions
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&rect))
            .collect();
        hits.sort_by_key(|entry| entry.order);

        let mut seen = BTreeSet::new();
        hits.into_iter()
            .filter(|entry| seen.insert(entry.name.as_str()))
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Outer rings of every polygon belonging to `name`, as `(lat, lng)`
    /// vertices. Empty if the region is unknown.
    #[must_use]
    pub fn region_rings(&self, name: &str) -> Vec<Vec<GeoPoint>> {
        let mut matching: Vec<&RegionEntry> =
            self.regions.iter().filter(|e| e.name == name).collect();
        matching.sort_by_key(|entry| entry.order);

        matching
            .into_iter()
            .flat_map(|entry| entry.polygon.0.iter())
            .map(|polygon| {
                polygon
                    .exterior()
                    .coords()
                    .map(|c| GeoPoint::new(c.y, c.x))
                    .collect()
            })
            .collect()
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
