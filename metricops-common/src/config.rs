use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MetricOpsError, Result};
use crate::format::{Grouping, NumberFormat};
use crate::types::{validate_top_n, Dimension, DEFAULT_TOP_N, PREFERRED_METRIC};

/// Prefix of environment overrides, e.g. `METRICOPS_API_BASE_URL`
pub const ENV_PREFIX: &str = "METRICOPS";
/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "METRICOPS_CONFIG";

/// Dashboard client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Base URL of the metrics API, without a trailing slash
    pub api_base_url: String,
    /// Metric selected when the catalog is loaded
    pub default_metric: String,
    /// Dimension used by why-changed when none is given
    pub default_dimension: Dimension,
    /// Driver rows requested by why-changed
    pub default_top_n: u32,
    /// Symbol printed before currency amounts
    pub currency_symbol: String,
    /// Digit grouping convention
    pub grouping: Grouping,
    /// Colorize terminal output
    pub color: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            default_metric: PREFERRED_METRIC.to_string(),
            default_dimension: Dimension::ShipState,
            default_top_n: DEFAULT_TOP_N,
            currency_symbol: "₹".to_string(),
            grouping: Grouping::Indian,
            color: true,
        }
    }
}

/// Expand `~` and environment variables in a user supplied path
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

impl DashboardConfig {
    /// Load from the first config file found, then environment overrides
    pub fn load() -> Result<Self> {
        let file = Self::search_paths().into_iter().find(|p| p.exists());
        Self::build(file.as_deref(), ENV_PREFIX)
    }

    /// Load from a specific file, then environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MetricOpsError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        Self::build(Some(path), ENV_PREFIX)
    }

    /// Candidate config files, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(expand_path(&explicit));
        }
        paths.push(PathBuf::from("./metricops.toml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".metricops").join("config.toml"));
        }
        paths
    }

    fn build(file: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("default_metric", defaults.default_metric)?
            .set_default("default_dimension", defaults.default_dimension.as_str())?
            .set_default("default_top_n", defaults.default_top_n as i64)?
            .set_default("currency_symbol", defaults.currency_symbol)?
            .set_default("grouping", defaults.grouping.as_str())?
            .set_default("color", defaults.color)?;

        if let Some(path) = file {
            debug!("Loading dashboard configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        // Override with environment variables
        builder = builder.add_source(config::Environment::with_prefix(env_prefix).try_parsing(true));

        let mut config: DashboardConfig = builder.build()?.try_deserialize()?;
        config.api_base_url = config.api_base_url.trim_end_matches('/').to_string();

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err(MetricOpsError::Config("api_base_url must not be empty".to_string()));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(MetricOpsError::Config(format!(
                "api_base_url must start with http:// or https://, got '{}'",
                url
            )));
        }

        if self.default_metric.trim().is_empty() {
            return Err(MetricOpsError::Config("default_metric must not be empty".to_string()));
        }

        validate_top_n(self.default_top_n)
            .map_err(|e| MetricOpsError::Config(format!("default_top_n: {}", e)))?;

        Ok(())
    }

    pub fn number_format(&self) -> NumberFormat {
        NumberFormat::new(self.grouping, self.currency_symbol.clone())
    }
}
