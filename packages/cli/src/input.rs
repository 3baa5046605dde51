//! JSON input files and the file-backed collaborators the CLI hands to the
//! engine.

use std::path::Path;
use std::sync::Arc;

use safe_steps_directions::{
    DirectionsError, DirectionsProvider, DirectionsRequest, RouteGeometry, extract_routes,
};
use safe_steps_grid::{GeoPoint, HexGrid};
use safe_steps_hazard_models::{Incident, IncidentType};
use safe_steps_routing::{BulkSeverityProvider, LookupError};
use safe_steps_severity::SeverityMap;
use safe_steps_severity::timestamp::parse_timestamp;
use safe_steps_spatial::RegionIndex;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn read(path: &Path) -> Result<String, InputError> {
    std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// One raw incident report as exported by the reporting pipeline.
#[derive(Debug, Deserialize)]
struct IncidentRecord {
    lat: f64,
    lng: f64,
    #[serde(default, rename = "type")]
    incident_type: Option<String>,
    #[serde(default)]
    timestamp: serde_json::Value,
}

/// Parses a JSON array of incident reports and attributes each to a cell.
///
/// Reports with out-of-range coordinates are logged and skipped. Returns
/// the incidents and the number skipped.
pub fn parse_incidents<G>(
    raw: &str,
    grid: &G,
    resolution: u8,
) -> Result<(Vec<Incident>, usize), InputError>
where
    G: HexGrid + ?Sized,
{
    let records: Vec<IncidentRecord> = serde_json::from_str(raw)?;
    let mut incidents = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for (i, record) in records.into_iter().enumerate() {
        let cell = match grid.cell_for_point(GeoPoint::new(record.lat, record.lng), resolution) {
            Ok(cell) => cell,
            Err(e) => {
                log::warn!("Skipping incident #{i}: {e}");
                skipped += 1;
                continue;
            }
        };
        let occurred_at = parse_timestamp(&record.timestamp);
        if occurred_at.is_none() && !record.timestamp.is_null() {
            log::debug!("Incident #{i} has unparseable timestamp {}", record.timestamp);
        }
        incidents.push(Incident {
            incident_type: record
                .incident_type
                .as_deref()
                .map_or(IncidentType::Other, IncidentType::from_raw),
            occurred_at,
            cell,
        });
    }

    Ok((incidents, skipped))
}

pub fn load_incidents<G>(
    path: &Path,
    grid: &G,
    resolution: u8,
) -> Result<(Vec<Incident>, usize), InputError>
where
    G: HexGrid + ?Sized,
{
    parse_incidents(&read(path)?, grid, resolution)
}

/// Loads a severity store: a JSON object mapping cell handles to scores.
pub fn load_severity(path: &Path) -> Result<SeverityMap, InputError> {
    Ok(serde_json::from_str(&read(path)?)?)
}

/// Loads a polygon ring: a JSON array of `{ "lat", "lng" }` vertices.
pub fn load_polygon(path: &Path) -> Result<Vec<GeoPoint>, InputError> {
    Ok(serde_json::from_str(&read(path)?)?)
}

/// Directions provider replaying a saved Google Directions response.
///
/// Every request gets the same routes, which keeps offline runs
/// reproducible.
pub struct RecordedDirections {
    body: serde_json::Value,
}

impl RecordedDirections {
    pub fn load(path: &Path) -> Result<Self, InputError> {
        Ok(Self {
            body: serde_json::from_str(&read(path)?)?,
        })
    }
}

#[async_trait::async_trait]
impl DirectionsProvider for RecordedDirections {
    async fn routes(
        &self,
        request: &DirectionsRequest,
    ) -> Result<Vec<RouteGeometry>, DirectionsError> {
        log::debug!(
            "Replaying recorded directions for {} -> {} ({})",
            request.origin,
            request.destination,
            request.mode
        );
        extract_routes(&self.body)
    }
}

/// Bulk provider slicing one severity store by region.
///
/// A cell belongs to the first catalog region containing its center.
pub struct CatalogSeverities {
    regions: Arc<RegionIndex>,
    grid: Arc<dyn HexGrid>,
    scores: SeverityMap,
}

impl CatalogSeverities {
    pub fn new(regions: Arc<RegionIndex>, grid: Arc<dyn HexGrid>, scores: SeverityMap) -> Self {
        Self {
            regions,
            grid,
            scores,
        }
    }
}

#[async_trait::async_trait]
impl BulkSeverityProvider for CatalogSeverities {
    fn name(&self) -> &str {
        "catalog_severities"
    }

    async fn region_severities(&self, region: &str) -> Result<SeverityMap, LookupError> {
        Ok(self
            .scores
            .iter()
            .filter(|(cell, _)| {
                self.grid
                    .cell_to_center(*cell)
                    .is_ok_and(|center| self.regions.region_for_point(&center) == Some(region))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use safe_steps_grid::H3Grid;

    use super::*;

    #[test]
    fn incidents_are_normalized_and_attributed() {
        let raw = r#"[
            { "lat": 33.8938, "lng": 35.5018, "type": "Drone Activity", "timestamp": "2025-03-01T10:00:00Z" },
            { "lat": 33.8938, "lng": 35.5018, "type": "alien sighting", "timestamp": 1740823200 },
            { "lat": 33.8938, "lng": 35.5018, "timestamp": "yesterday-ish" },
            { "lat": 123.0, "lng": 35.5, "type": "theft" }
        ]"#;
        let (incidents, skipped) = parse_incidents(raw, &H3Grid, 9).unwrap();

        assert_eq!(skipped, 1);
        assert_eq!(incidents.len(), 3);
        assert_eq!(incidents[0].incident_type, IncidentType::DroneActivity);
        assert!(incidents[0].occurred_at.is_some());
        assert_eq!(incidents[1].incident_type, IncidentType::Other);
        assert!(incidents[1].occurred_at.is_some());
        assert_eq!(incidents[2].incident_type, IncidentType::Other);
        assert!(incidents[2].occurred_at.is_none());
        assert!(incidents.iter().all(|i| i.cell == incidents[0].cell));
    }

    #[test]
    fn malformed_incident_file_is_an_error() {
        assert!(matches!(
            parse_incidents(r#"{"lat": 1}"#, &H3Grid, 9),
            Err(InputError::Json(_))
        ));
    }

    #[tokio::test]
    async fn catalog_slices_scores_by_region() {
        let catalog = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "shapeName": "Beirut" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[35.45, 33.85], [35.60, 33.85], [35.60, 33.95], [35.45, 33.95], [35.45, 33.85]]]
                }
            }]
        }"#;
        let inside = H3Grid
            .cell_for_point(GeoPoint::new(33.8938, 35.5018), 9)
            .unwrap();
        let outside = H3Grid
            .cell_for_point(GeoPoint::new(34.4367, 35.8497), 9)
            .unwrap();
        let scores: SeverityMap = [(inside, 4.0), (outside, 6.0)].into_iter().collect();

        let provider = CatalogSeverities::new(
            Arc::new(RegionIndex::from_geojson_str(catalog).unwrap()),
            Arc::new(H3Grid),
            scores,
        );
        let beirut = provider.region_severities("Beirut").await.unwrap();
        assert_eq!(beirut.len(), 1);
        assert_eq!(beirut.get(inside), Some(4.0));
        assert!(provider.region_severities("Tyre").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recorded_directions_replay_body() {
        let provider = RecordedDirections {
            body: serde_json::json!({ "status": "ZERO_RESULTS", "routes": [] }),
        };
        let request = DirectionsRequest {
            origin: GeoPoint::new(33.89, 35.50),
            destination: GeoPoint::new(33.90, 35.51),
            mode: safe_steps_directions::TravelMode::Walking,
            alternatives: true,
        };
        assert!(provider.routes(&request).await.unwrap().is_empty());
    }
}
