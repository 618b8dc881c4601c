use chrono::NaiveDate;
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `STOREPULSE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub cohort: CohortConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CohortConfig {
    /// A store counts as active if it had orders within this many days
    /// before the base date (inclusive).
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: i64,
    /// Number of most-recent cohorts shown in the report.
    #[serde(default = "default_display_cohorts")]
    pub display_cohorts: usize,
    /// Installs strictly before this date collapse into the legacy bucket.
    #[serde(default = "default_cutover_date")]
    pub cutover_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    /// Width of the semaphore bounding concurrent per-store history
    /// lookups.
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent: usize,
}

// Default functions
fn default_node_id() -> String {
    "pulse-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_recency_window_days() -> i64 {
    14
}
fn default_display_cohorts() -> usize {
    6
}
fn default_cutover_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid cutover date")
}
fn default_max_concurrent_lookups() -> usize {
    16
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            recency_window_days: default_recency_window_days(),
            display_cohorts: default_display_cohorts(),
            cutover_date: default_cutover_date(),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent_lookups(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            cohort: CohortConfig::default(),
            lookup: LookupConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("STOREPULSE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
