//! Request-level orchestration: safest route between two points and
//! exit-to-safety from a current position.
//!
//! The [`Engine`] owns read-only configuration and the collaborators the
//! host supplies (grid backend, directions provider, severity sources,
//! region catalog, notification sink). It holds no mutable state, so one
//! instance can serve concurrent requests.

use std::sync::Arc;

use futures::stream::{self, StreamExt as _};
use safe_steps_directions::{DirectionsProvider, DirectionsRequest, RouteGeometry, TravelMode};
use safe_steps_grid::{BoundingBox, Cell, GeoPoint, HexGrid};
use safe_steps_routing_models::{AlertDecision, ExitOutcome, ExitRoute, RouteSelection};
use safe_steps_severity::SeverityMap;
use safe_steps_spatial::RegionIndex;

use crate::RoutingError;
use crate::alerts::{AlertContext, NotificationSink, alert_if_needed, evaluate_alert};
use crate::config::EngineConfig;
use crate::lookup::{BulkSeverityProvider, LookupResult, SeverityLookup};
use crate::scorer::score_candidates;
use crate::search::search_safe_cell;

/// Per-request options for [`Engine::safest_route`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOptions {
    /// Regions to preload severities for. When `None`, every catalog region
    /// intersecting the candidate routes is used.
    pub regions: Option<Vec<String>>,
    /// Travel mode, overriding the configured default.
    pub mode: Option<TravelMode>,
}

/// Per-request options for [`Engine::exit_to_safety`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitOptions {
    /// Score of the start cell at the previous evaluation.
    pub previous_score: Option<f64>,
    /// Where to send an alert. No alert is sent without one.
    pub alert_destination: Option<String>,
    /// Region name for the alert text. Looked up in the catalog if unset.
    pub city: Option<String>,
    /// Travel mode, overriding the configured default.
    pub mode: Option<TravelMode>,
}

/// Alert decision for the start cell and how delivery went.
struct AlertNotice {
    decision: AlertDecision,
    message_id: Option<String>,
    error: Option<String>,
}

/// Geospatial risk engine.
pub struct Engine {
    config: EngineConfig,
    grid: Arc<dyn HexGrid>,
    directions: Arc<dyn DirectionsProvider>,
    lookup: Arc<dyn SeverityLookup>,
    regions: Option<Arc<RegionIndex>>,
    bulk: Option<Arc<dyn BulkSeverityProvider>>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("lookup", &self.lookup.name())
            .field("regions", &self.regions.as_ref().map(|r| r.len()))
            .field("bulk", &self.bulk.as_ref().map(|b| b.name().to_string()))
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Config`] if the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        grid: Arc<dyn HexGrid>,
        directions: Arc<dyn DirectionsProvider>,
        lookup: Arc<dyn SeverityLookup>,
    ) -> Result<Self, RoutingError> {
        config.validate()?;
        Ok(Self {
            config,
            grid,
            directions,
            lookup,
            regions: None,
            bulk: None,
            notifier: None,
        })
    }

    /// Attaches a region catalog used to pick regions to preload and to
    /// name the city in alerts.
    #[must_use]
    pub fn with_regions(mut self, regions: Arc<RegionIndex>) -> Self {
        self.regions = Some(regions);
        self
    }

    /// Attaches a bulk severity source used to preload region severities.
    #[must_use]
    pub fn with_bulk_provider(mut self, bulk: Arc<dyn BulkSeverityProvider>) -> Self {
        self.bulk = Some(bulk);
        self
    }

    /// Attaches the sink alerts are sent through.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// The validated configuration this engine runs with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Finds the best route from `origin` to `destination`, trading travel
    /// time against severity along the way.
    ///
    /// # Errors
    ///
    /// * [`RoutingError::Directions`] if the provider fails
    /// * [`RoutingError::NoRouteCandidates`] if it returns no route
    /// * [`RoutingError::Grid`] if a point is out of range
    pub async fn safest_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        options: &RouteOptions,
    ) -> Result<RouteSelection, RoutingError> {
        let request = DirectionsRequest {
            origin,
            destination,
            mode: options.mode.unwrap_or(self.config.routing.mode),
            alternatives: self.config.routing.alternatives,
        };
        self.route(&request, options.regions.as_deref()).await
    }

    /// Finds the nearest safe cell around `position` and routes to it.
    ///
    /// "No safe cell nearby" and "already safe" are outcomes, not errors.
    /// For an exit route or a failed search, an alert decision is attached
    /// when the start cell's severity is known, and sent if a destination
    /// and sink are configured; a sink failure is recorded on the outcome.
    /// The start cell is looked up once, by the search.
    ///
    /// # Errors
    ///
    /// * [`RoutingError::Grid`] if `position` is out of range
    /// * [`RoutingError::Directions`] if the provider fails
    /// * [`RoutingError::NoRouteCandidates`] if it returns no route
    pub async fn exit_to_safety(
        &self,
        position: GeoPoint,
        options: &ExitOptions,
    ) -> Result<ExitOutcome, RoutingError> {
        let start_cell = self
            .grid
            .cell_for_point(position, self.config.routing.resolution)?;
        log::debug!("Exit to safety from {position} (cell {start_cell})");

        let search = search_safe_cell(
            &*self.grid,
            &*self.lookup,
            start_cell,
            &self.config.search,
            &self.config.lookups,
        )
        .await?;

        let Some(safe) = search.safe else {
            log::info!(
                "No safe cell within {} rings of {start_cell}",
                self.config.search.max_rings
            );
            let notice = self
                .evaluate_start(start_cell, search.start, position, None, options)
                .await;
            return Ok(ExitOutcome::NoSafeExit {
                start_cell,
                rings_searched: self.config.search.max_rings,
                alert: notice.as_ref().map(|n| n.decision),
                message_id: notice.as_ref().and_then(|n| n.message_id.clone()),
                notification_error: notice.and_then(|n| n.error),
            });
        };

        if safe.ring == 0 {
            return Ok(ExitOutcome::AlreadySafe {
                start_cell,
                severity: safe.severity,
            });
        }

        let safe_point = self.grid.cell_to_center(safe.cell)?;
        let request = DirectionsRequest {
            origin: position,
            destination: safe_point,
            mode: options.mode.unwrap_or(self.config.routing.mode),
            alternatives: false,
        };
        let route = self.route(&request, None).await?;

        let notice = self
            .evaluate_start(start_cell, search.start, position, Some(safe.cell), options)
            .await;

        Ok(ExitOutcome::Exit(ExitRoute {
            start_cell,
            safe_cell: safe.cell,
            safe_point,
            ring: safe.ring,
            safe_severity: safe.severity,
            route,
            alert: notice.as_ref().map(|n| n.decision),
            message_id: notice.as_ref().and_then(|n| n.message_id.clone()),
            notification_error: notice.and_then(|n| n.error),
        }))
    }

    /// Evaluates, and sends when configured, an alert for the start cell.
    ///
    /// Returns `None` when the start cell's severity is unknown.
    async fn evaluate_start(
        &self,
        cell: Cell,
        start: LookupResult,
        position: GeoPoint,
        nearest_safe: Option<Cell>,
        options: &ExitOptions,
    ) -> Option<AlertNotice> {
        let LookupResult::Known(new_score) = start else {
            log::debug!("Skipping alert evaluation: severity of {cell} is unknown");
            return None;
        };

        let city = options.city.clone().or_else(|| {
            self.regions
                .as_ref()
                .and_then(|r| r.region_for_point(&position))
                .map(str::to_string)
        });
        let context = AlertContext {
            cell,
            city,
            new_score,
            previous_score: options.previous_score,
            nearest_safe,
        };
        Some(
            self.notify(&context, options.alert_destination.as_deref())
                .await,
        )
    }

    async fn notify(&self, context: &AlertContext, destination: Option<&str>) -> AlertNotice {
        let decide = || {
            evaluate_alert(
                context.previous_score,
                context.new_score,
                &self.config.alerts,
            )
        };
        let (Some(sink), Some(destination)) = (self.notifier.as_deref(), destination) else {
            return AlertNotice {
                decision: decide(),
                message_id: None,
                error: None,
            };
        };

        match alert_if_needed(sink, destination, context, &self.config.alerts).await {
            Ok(dispatch) => AlertNotice {
                decision: dispatch.decision,
                message_id: dispatch.message_id,
                error: None,
            },
            Err(e) => {
                log::warn!("Alert for {} not delivered: {e}", context.cell);
                AlertNotice {
                    decision: decide(),
                    message_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn route(
        &self,
        request: &DirectionsRequest,
        regions: Option<&[String]>,
    ) -> Result<RouteSelection, RoutingError> {
        let routes = self.directions.routes(request).await?;
        log::debug!(
            "Directions returned {} route(s) from {} to {}",
            routes.len(),
            request.origin,
            request.destination
        );
        if routes.is_empty() {
            return Err(RoutingError::NoRouteCandidates);
        }

        let (map, cities_used) = self.preload(&routes, regions).await;

        let mut selection = score_candidates(
            &*self.grid,
            routes,
            &map,
            &*self.lookup,
            &self.config.routing,
            &self.config.lookups,
        )
        .await?;
        selection.cities_used = cities_used;
        Ok(selection)
    }

    /// Bulk-loads severities for the requested regions, or for every
    /// catalog region the routes pass through.
    ///
    /// Returns the merged map and the regions that loaded, or `None` for
    /// the regions when no bulk provider is configured.
    async fn preload(
        &self,
        routes: &[RouteGeometry],
        regions: Option<&[String]>,
    ) -> (SeverityMap, Option<Vec<String>>) {
        let Some(bulk) = self.bulk.as_deref() else {
            return (SeverityMap::new(), None);
        };

        let names: Vec<String> = match (regions, self.regions.as_deref()) {
            (Some(explicit), _) => explicit.to_vec(),
            (None, Some(catalog)) => {
                BoundingBox::from_points(routes.iter().flat_map(|r| r.points.iter()))
                    .map(|bbox| catalog.regions_intersecting(&bbox))
                    .unwrap_or_default()
            }
            (None, None) => vec![],
        };

        let timeout = self.config.lookups.timeout();
        let loaded: Vec<(String, Option<SeverityMap>)> =
            stream::iter(names.into_iter().map(|name| async move {
                let result = tokio::time::timeout(timeout, bulk.region_severities(&name)).await;
                let map = match result {
                    Ok(Ok(map)) => Some(map),
                    Ok(Err(e)) => {
                        log::warn!("Skipping region '{name}': {e}");
                        None
                    }
                    Err(_) => {
                        log::warn!(
                            "Skipping region '{name}': {} timed out after {timeout:?}",
                            bulk.name()
                        );
                        None
                    }
                };
                (name, map)
            }))
            .buffered(self.config.lookups.concurrency.max(1))
            .collect()
            .await;

        let mut merged = SeverityMap::new();
        let mut used = Vec::new();
        for (name, map) in loaded {
            if let Some(map) = map {
                log::debug!("Preloaded {} scored cells for '{name}'", map.len());
                merged.merge(map);
                used.push(name);
            }
        }
        (merged, Some(used))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use safe_steps_directions::DirectionsError;
    use safe_steps_grid::{Cell, H3Grid};
    use safe_steps_routing_models::AlertReason;

    use super::*;
    use crate::alerts::tests::RecordingSink;
    use crate::densify::route_cells;
    use crate::lookup::{InMemoryRegions, LookupError};

    /// Directions double: returns canned routes, or a straight line from
    /// origin to destination, and records every request.
    #[derive(Default)]
    struct StubDirections {
        routes: Option<Vec<RouteGeometry>>,
        fail: bool,
        requests: Mutex<Vec<DirectionsRequest>>,
    }

    #[async_trait::async_trait]
    impl DirectionsProvider for StubDirections {
        async fn routes(
            &self,
            request: &DirectionsRequest,
        ) -> Result<Vec<RouteGeometry>, DirectionsError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(DirectionsError::ProviderStatus {
                    status: "OVER_QUERY_LIMIT".to_string(),
                    message: "quota exceeded".to_string(),
                });
            }
            Ok(self.routes.clone().unwrap_or_else(|| {
                vec![RouteGeometry {
                    summary: "direct".to_string(),
                    duration_s: 300.0,
                    distance_m: 400.0,
                    points: vec![request.origin, request.destination],
                }]
            }))
        }
    }

    struct FailingBulk;

    #[async_trait::async_trait]
    impl BulkSeverityProvider for FailingBulk {
        async fn region_severities(&self, region: &str) -> Result<SeverityMap, LookupError> {
            Err(LookupError::Failure {
                key: region.to_string(),
                provider: "failing".to_string(),
                message: "store offline".to_string(),
            })
        }
    }

    const CATALOG: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "shapeName": "Beirut" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[35.45, 33.85], [35.65, 33.85], [35.65, 34.00], [35.45, 34.00], [35.45, 33.85]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "shapeName": "Tripoli" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[35.80, 34.40], [35.88, 34.40], [35.88, 34.47], [35.80, 34.47], [35.80, 34.40]]]
                }
            }
        ]
    }"#;

    fn position() -> GeoPoint {
        GeoPoint::new(33.8938, 35.5018)
    }

    fn start() -> Cell {
        H3Grid.cell_for_point(position(), 9).unwrap()
    }

    fn engine(directions: StubDirections, lookup: SeverityMap) -> Engine {
        Engine::new(
            EngineConfig::default(),
            Arc::new(H3Grid),
            Arc::new(directions),
            Arc::new(lookup),
        )
        .unwrap()
    }

    fn line(summary: &str, duration_s: f64, from: GeoPoint, to: GeoPoint) -> RouteGeometry {
        RouteGeometry {
            summary: summary.to_string(),
            duration_s,
            distance_m: duration_s,
            points: vec![from, to],
        }
    }

    fn two_routes() -> Vec<RouteGeometry> {
        vec![
            line(
                "risky",
                600.0,
                GeoPoint::new(33.890, 35.500),
                GeoPoint::new(33.900, 35.500),
            ),
            line(
                "calm",
                900.0,
                GeoPoint::new(33.890, 35.520),
                GeoPoint::new(33.900, 35.520),
            ),
        ]
    }

    fn scored(route: &RouteGeometry, score: f64) -> SeverityMap {
        route_cells(&H3Grid, &route.points, 9, 80.0)
            .unwrap()
            .into_iter()
            .map(|c| (c, score))
            .collect()
    }

    fn beirut_regions() -> InMemoryRegions {
        let routes = two_routes();
        let mut beirut = scored(&routes[0], 9.0);
        beirut.merge(scored(&routes[1], 1.0));
        InMemoryRegions::new(BTreeMap::from([("Beirut".to_string(), beirut)]))
    }

    #[tokio::test]
    async fn safest_route_preloads_intersecting_regions() {
        let directions = StubDirections {
            routes: Some(two_routes()),
            ..StubDirections::default()
        };
        let engine = engine(directions, SeverityMap::new())
            .with_regions(Arc::new(RegionIndex::from_geojson_str(CATALOG).unwrap()))
            .with_bulk_provider(Arc::new(beirut_regions()));

        let selection = engine
            .safest_route(
                GeoPoint::new(33.890, 35.510),
                GeoPoint::new(33.900, 35.510),
                &RouteOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(selection.chosen.summary, "calm");
        assert_eq!(selection.cities_used, Some(vec!["Beirut".to_string()]));
        assert!((selection.candidates[0].severity.average - 9.0).abs() < 1e-12);
        assert_eq!(selection.candidates[0].severity.unknown_cells, 0);
    }

    #[tokio::test]
    async fn safest_route_uses_requested_mode_and_alternatives() {
        let directions = Arc::new(StubDirections::default());
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(H3Grid),
            directions.clone(),
            Arc::new(SeverityMap::new()),
        )
        .unwrap();
        let options = RouteOptions {
            regions: None,
            mode: Some(TravelMode::Driving),
        };
        let selection = engine
            .safest_route(position(), GeoPoint::new(33.90, 35.51), &options)
            .await
            .unwrap();
        assert!(selection.cities_used.is_none());
        assert_eq!(selection.chosen.severity.sample_count, 0);

        let requests = directions.requests.lock().unwrap();
        assert_eq!(requests[0].mode, TravelMode::Driving);
        assert!(requests[0].alternatives);
        assert_eq!(requests[0].origin, position());
    }

    #[tokio::test]
    async fn explicit_regions_skip_failures() {
        let engine = engine(
            StubDirections {
                routes: Some(two_routes()),
                ..StubDirections::default()
            },
            SeverityMap::new(),
        )
        .with_bulk_provider(Arc::new(FailingBulk));

        let options = RouteOptions {
            regions: Some(vec!["Beirut".to_string()]),
            mode: None,
        };
        let selection = engine
            .safest_route(position(), GeoPoint::new(33.90, 35.51), &options)
            .await
            .unwrap();

        assert_eq!(selection.cities_used, Some(vec![]));
        assert_eq!(selection.chosen_index, 0);
        assert_eq!(selection.candidates[0].severity.sample_count, 0);
    }

    #[tokio::test]
    async fn directions_failure_propagates() {
        let engine = engine(
            StubDirections {
                fail: true,
                ..StubDirections::default()
            },
            SeverityMap::new(),
        );
        let err = engine
            .safest_route(position(), GeoPoint::new(33.90, 35.51), &RouteOptions::default())
            .await;
        assert!(matches!(err, Err(RoutingError::Directions(_))));
    }

    #[tokio::test]
    async fn empty_directions_result_is_no_candidates() {
        let engine = engine(
            StubDirections {
                routes: Some(vec![]),
                ..StubDirections::default()
            },
            SeverityMap::new(),
        );
        let err = engine
            .safest_route(position(), GeoPoint::new(33.90, 35.51), &RouteOptions::default())
            .await;
        assert!(matches!(err, Err(RoutingError::NoRouteCandidates)));
    }

    #[tokio::test]
    async fn already_safe_start_needs_no_route() {
        let directions = Arc::new(StubDirections::default());
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(H3Grid),
            directions.clone(),
            Arc::new([(start(), 1.5)].into_iter().collect::<SeverityMap>()),
        )
        .unwrap();

        let outcome = engine
            .exit_to_safety(position(), &ExitOptions::default())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExitOutcome::AlreadySafe {
                start_cell: start(),
                severity: 1.5,
            }
        );
        assert!(directions.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_safe_exit_reports_radius() {
        let all_unsafe: SeverityMap = H3Grid
            .grid_disk(start(), 4)
            .unwrap()
            .into_iter()
            .map(|(c, _)| (c, 9.0))
            .collect();
        let engine = engine(StubDirections::default(), all_unsafe);

        let outcome = engine
            .exit_to_safety(position(), &ExitOptions::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ExitOutcome::NoSafeExit {
                start_cell: start(),
                rings_searched: 4,
                alert: Some(AlertDecision {
                    alert: true,
                    reason: AlertReason::NoPrevHigh,
                }),
                message_id: None,
                notification_error: None,
            }
        );
    }

    #[tokio::test]
    async fn no_safe_exit_sends_alert_without_safer_area() {
        let all_unsafe: SeverityMap = H3Grid
            .grid_disk(start(), 4)
            .unwrap()
            .into_iter()
            .map(|(c, _)| (c, 9.0))
            .collect();
        let sink = Arc::new(RecordingSink::default());
        let engine = engine(StubDirections::default(), all_unsafe).with_notifier(sink.clone());
        let options = ExitOptions {
            alert_destination: Some("ops".to_string()),
            city: Some("Beirut".to_string()),
            ..ExitOptions::default()
        };

        let ExitOutcome::NoSafeExit {
            alert, message_id, ..
        } = engine.exit_to_safety(position(), &options).await.unwrap()
        else {
            panic!("expected no safe exit");
        };
        assert!(alert.unwrap().alert);
        assert_eq!(message_id.as_deref(), Some("msg-1"));

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("City: Beirut"));
        assert!(!sent[0].0.contains("Nearest safer area"));
    }

    #[tokio::test]
    async fn unknown_start_severity_has_no_alert() {
        let engine = engine(StubDirections::default(), SeverityMap::new());
        let outcome = engine
            .exit_to_safety(position(), &ExitOptions::default())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExitOutcome::NoSafeExit { alert: None, .. }
        ));
    }

    /// Lookup double that counts calls per cell.
    struct CountingLookup {
        scores: SeverityMap,
        calls: Mutex<BTreeMap<Cell, usize>>,
    }

    #[async_trait::async_trait]
    impl SeverityLookup for CountingLookup {
        async fn severity(&self, cell: Cell) -> Result<Option<f64>, LookupError> {
            *self.calls.lock().unwrap().entry(cell).or_default() += 1;
            Ok(self.scores.get(cell))
        }
    }

    #[tokio::test]
    async fn exit_looks_up_start_cell_once() {
        let (map, _) = unsafe_except_one_neighbor();
        let lookup = Arc::new(CountingLookup {
            scores: map,
            calls: Mutex::new(BTreeMap::new()),
        });
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(H3Grid),
            Arc::new(StubDirections::default()),
            lookup.clone(),
        )
        .unwrap();

        let outcome = engine
            .exit_to_safety(position(), &ExitOptions::default())
            .await
            .unwrap();
        assert!(matches!(outcome, ExitOutcome::Exit(_)));
        assert_eq!(lookup.calls.lock().unwrap().get(&start()), Some(&1));
    }

    fn unsafe_except_one_neighbor() -> (SeverityMap, Cell) {
        let mut map: SeverityMap = H3Grid
            .grid_disk(start(), 2)
            .unwrap()
            .into_iter()
            .map(|(c, _)| (c, 9.0))
            .collect();
        let safe = H3Grid.ring_shell(start(), 1).unwrap()[0];
        map.insert(safe, 1.0);
        (map, safe)
    }

    #[tokio::test]
    async fn exit_routes_to_safe_cell_center_and_alerts() {
        let (map, safe) = unsafe_except_one_neighbor();
        let directions = Arc::new(StubDirections::default());
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(H3Grid),
            directions.clone(),
            Arc::new(map),
        )
        .unwrap()
        .with_notifier(sink.clone());

        let options = ExitOptions {
            alert_destination: Some("+96170000000".to_string()),
            city: Some("Beirut".to_string()),
            ..ExitOptions::default()
        };
        let ExitOutcome::Exit(exit) = engine.exit_to_safety(position(), &options).await.unwrap()
        else {
            panic!("expected an exit route");
        };

        let center = H3Grid.cell_to_center(safe).unwrap();
        assert_eq!(exit.start_cell, start());
        assert_eq!(exit.safe_cell, safe);
        assert_eq!(exit.ring, 1);
        assert_eq!(exit.safe_point, center);
        assert_eq!(exit.route.candidates.len(), 1);

        let requests = directions.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].origin, position());
        assert_eq!(requests[0].destination, center);
        assert!(!requests[0].alternatives);

        let decision = exit.alert.unwrap();
        assert!(decision.alert);
        assert_eq!(decision.reason, AlertReason::NoPrevHigh);
        assert_eq!(exit.message_id.as_deref(), Some("msg-1"));
        assert!(exit.notification_error.is_none());

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("City: Beirut"));
        assert!(sent[0].0.contains(&format!("Nearest safer area: {safe}")));
    }

    #[tokio::test]
    async fn sink_failure_does_not_fail_exit() {
        let (map, _) = unsafe_except_one_neighbor();
        let engine = engine(StubDirections::default(), map).with_notifier(Arc::new(
            RecordingSink {
                fail: true,
                ..RecordingSink::default()
            },
        ));
        let options = ExitOptions {
            previous_score: Some(8.5),
            alert_destination: Some("ops".to_string()),
            ..ExitOptions::default()
        };

        let ExitOutcome::Exit(exit) = engine.exit_to_safety(position(), &options).await.unwrap()
        else {
            panic!("expected an exit route");
        };
        assert_eq!(exit.alert.unwrap().reason, AlertReason::StillHigh);
        assert!(exit.message_id.is_none());
        assert!(exit.notification_error.unwrap().contains("carrier rejected"));
    }

    #[tokio::test]
    async fn decision_without_sink_is_not_sent() {
        let (map, _) = unsafe_except_one_neighbor();
        let engine = engine(StubDirections::default(), map);
        let options = ExitOptions {
            previous_score: Some(8.5),
            ..ExitOptions::default()
        };
        let ExitOutcome::Exit(exit) = engine.exit_to_safety(position(), &options).await.unwrap()
        else {
            panic!("expected an exit route");
        };
        assert!(exit.alert.unwrap().alert);
        assert!(exit.message_id.is_none());
    }

    #[tokio::test]
    async fn invalid_position_is_an_error() {
        let engine = engine(StubDirections::default(), SeverityMap::new());
        let err = engine
            .exit_to_safety(GeoPoint::new(91.0, 0.0), &ExitOptions::default())
            .await;
        assert!(matches!(err, Err(RoutingError::Grid(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.routing.alpha = 1.5;
        let err = Engine::new(
            config,
            Arc::new(H3Grid),
            Arc::new(StubDirections::default()),
            Arc::new(SeverityMap::new()),
        );
        assert!(matches!(err, Err(RoutingError::Config(_))));
    }
}
