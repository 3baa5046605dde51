#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safe-cell search, route candidate scoring, and exit-to-safety.
//!
//! The free functions ([`find_nearest_safe_cell`], [`score_candidates`],
//! [`choose_best_route`], [`evaluate_alert`]) are the building blocks; the
//! [`Engine`] wires them to the directions provider, severity sources, and
//! notification sink supplied by the host.

pub mod alerts;
pub mod config;
pub mod densify;
pub mod engine;
pub mod lookup;
pub mod scorer;
pub mod search;

pub use alerts::{
    AlertContext, AlertDispatch, LogNotificationSink, NotificationSink, NotifyError,
    alert_if_needed, build_alert_message, evaluate_alert,
};
pub use config::{AlertConfig, ConfigError, EngineConfig, LookupConfig, RoutingConfig, SearchConfig};
pub use engine::{Engine, ExitOptions, RouteOptions};
pub use lookup::{
    BulkSeverityProvider, InMemoryRegions, LookupError, LookupResult, SeverityLookup, lookup_many,
    lookup_one,
};
pub use scorer::{choose_best_route, score_candidates, summarize_severity};
pub use search::{SafeSearch, find_nearest_safe_cell, search_safe_cell};

use safe_steps_directions::DirectionsError;
use safe_steps_grid::GridError;

/// Errors from routing and exit-to-safety requests.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// A coordinate, cell, or resolution was invalid.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// There were no route candidates to choose from.
    #[error("no route candidates")]
    NoRouteCandidates,

    /// The directions provider failed. Not retried here.
    #[error(transparent)]
    Directions(#[from] DirectionsError),

    /// The engine configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
