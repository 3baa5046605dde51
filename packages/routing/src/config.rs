//! Engine configuration.
//!
//! A default configuration is embedded at compile time from
//! `config/engine.toml`. Hosts may load their own file; any section left out
//! falls back to the built-in defaults. A handful of routing knobs can be
//! overridden from the environment (see [`EngineConfig::apply_env_overrides`]).

use std::path::Path;
use std::time::Duration;

use safe_steps_directions::TravelMode;
use safe_steps_grid_models::{DEFAULT_RESOLUTION, MAX_RESOLUTION, MIN_RESOLUTION};
use safe_steps_severity::{RiskScale, SeverityConfig, SeverityConfigError};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/engine.toml");

/// Environment variable overriding [`RoutingConfig::alpha`].
pub const ROUTE_ALPHA_VAR: &str = "ROUTE_ALPHA";
/// Environment variable overriding [`RoutingConfig::sample_step_m`].
pub const SAMPLE_STEP_VAR: &str = "ROUTE_SAMPLE_STEP_METERS";
/// Environment variable overriding [`SearchConfig::safe_threshold`].
pub const SAFE_THRESHOLD_VAR: &str = "SAFE_STEPS_SAFE_THRESHOLD";
/// Environment variable overriding [`SearchConfig::max_rings`].
pub const MAX_RINGS_VAR: &str = "SAFE_STEPS_MAX_RINGS";

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration is not valid TOML or has the wrong shape.
    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    /// Severity or risk-band parameters are invalid.
    #[error(transparent)]
    Severity(#[from] SeverityConfigError),

    /// A routing, search, lookup, or alert parameter is out of range.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// Safe-cell search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Cells at or below this severity are safe.
    #[serde(default = "default_safe_threshold")]
    pub safe_threshold: f64,
    /// Outermost ring searched.
    #[serde(default = "default_max_rings")]
    pub max_rings: u32,
}

const fn default_safe_threshold() -> f64 {
    3.0
}

const fn default_max_rings() -> u32 {
    4
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            safe_threshold: default_safe_threshold(),
            max_rings: default_max_rings(),
        }
    }
}

/// Route scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Grid resolution routes are cellified at.
    #[serde(default = "default_resolution")]
    pub resolution: u8,
    /// Time/risk tradeoff: 0 = safest, 1 = fastest.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Maximum spacing between sampled route points, in meters.
    #[serde(default = "default_sample_step_m")]
    pub sample_step_m: f64,
    /// Travel mode requested from the directions provider.
    #[serde(default)]
    pub mode: TravelMode,
    /// Whether route requests ask for alternatives.
    #[serde(default = "default_true")]
    pub alternatives: bool,
}

const fn default_resolution() -> u8 {
    DEFAULT_RESOLUTION
}

const fn default_alpha() -> f64 {
    0.6
}

const fn default_sample_step_m() -> f64 {
    80.0
}

const fn default_true() -> bool {
    true
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            alpha: default_alpha(),
            sample_step_m: default_sample_step_m(),
            mode: TravelMode::default(),
            alternatives: default_true(),
        }
    }
}

/// Bounds on external per-cell severity lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Maximum lookups in flight per fan-out.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-lookup timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_concurrency() -> usize {
    8
}

const fn default_timeout_ms() -> u64 {
    2000
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl LookupConfig {
    /// Per-lookup timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Alert hysteresis thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Alerting starts at or above this score.
    #[serde(default = "default_up_threshold")]
    pub up_threshold: f64,
    /// Alerting continues until the score drops below this.
    #[serde(default = "default_down_threshold")]
    pub down_threshold: f64,
    /// Minimum rise required for a fresh upward crossing.
    #[serde(default = "default_min_jump")]
    pub min_jump: f64,
}

const fn default_up_threshold() -> f64 {
    7.0
}

const fn default_down_threshold() -> f64 {
    5.0
}

const fn default_min_jump() -> f64 {
    1.0
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            up_threshold: default_up_threshold(),
            down_threshold: default_down_threshold(),
            min_jump: default_min_jump(),
        }
    }
}

/// Complete engine configuration. Read-only once the engine is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Severity model parameters.
    #[serde(default)]
    pub severity: SeverityConfig,
    /// Ordered risk bands.
    #[serde(default)]
    pub risk_bands: RiskScale,
    /// Safe-cell search parameters.
    #[serde(default)]
    pub search: SearchConfig,
    /// Route scoring parameters.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// External lookup bounds.
    #[serde(default)]
    pub lookups: LookupConfig,
    /// Alert hysteresis thresholds.
    #[serde(default)]
    pub alerts: AlertConfig,
}

impl EngineConfig {
    /// Parses the configuration embedded at compile time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the embedded file is malformed.
    pub fn default_config() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Parses a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(raw)?)
    }

    /// Reads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        log::info!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|var| std::env::var(var).ok());
    }

    /// Applies overrides read through `get`. Values that do not parse are
    /// logged and ignored.
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(alpha) = parse_override(&get, ROUTE_ALPHA_VAR) {
            self.routing.alpha = alpha;
        }
        if let Some(step) = parse_override(&get, SAMPLE_STEP_VAR) {
            self.routing.sample_step_m = step;
        }
        if let Some(threshold) = parse_override(&get, SAFE_THRESHOLD_VAR) {
            self.search.safe_threshold = threshold;
        }
        if let Some(rings) = parse_override(&get, MAX_RINGS_VAR) {
            self.search.max_rings = rings;
        }
    }

    /// Checks every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.severity.validate()?;
        self.risk_bands.validate(self.severity.cap)?;

        let routing = &self.routing;
        if !(0.0..=1.0).contains(&routing.alpha) {
            return Err(invalid(format!(
                "routing.alpha must be within [0, 1], got {}",
                routing.alpha
            )));
        }
        if !(routing.sample_step_m > 0.0 && routing.sample_step_m.is_finite()) {
            return Err(invalid(format!(
                "routing.sample_step_m must be positive, got {}",
                routing.sample_step_m
            )));
        }
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&routing.resolution) {
            return Err(invalid(format!(
                "routing.resolution must be within {MIN_RESOLUTION}-{MAX_RESOLUTION}, got {}",
                routing.resolution
            )));
        }

        if self.search.safe_threshold.is_nan() {
            return Err(invalid("search.safe_threshold must be a number".to_string()));
        }

        if self.lookups.concurrency == 0 {
            return Err(invalid("lookups.concurrency must be at least 1".to_string()));
        }
        if self.lookups.timeout_ms == 0 {
            return Err(invalid("lookups.timeout_ms must be at least 1".to_string()));
        }

        let alerts = &self.alerts;
        if alerts.down_threshold > alerts.up_threshold {
            return Err(invalid(format!(
                "alerts.down_threshold ({}) must not exceed alerts.up_threshold ({})",
                alerts.down_threshold, alerts.up_threshold
            )));
        }
        if alerts.min_jump.is_nan() || alerts.min_jump < 0.0 {
            return Err(invalid(format!(
                "alerts.min_jump must be non-negative, got {}",
                alerts.min_jump
            )));
        }

        Ok(())
    }
}

const fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}

fn parse_override<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Option<T> {
    let raw = get(var)?;
    let parsed = raw.trim().parse::<T>().ok();
    if parsed.is_none() {
        log::warn!("Ignoring {var}={raw:?}: not a valid value");
    }
    parsed
}
