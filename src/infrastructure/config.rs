// Configuration loading - Backend settings and chart definitions
use crate::application::session_registry::ChartDefinition;
use crate::domain::nearest::DEFAULT_RADIUS_PX;
use crate::domain::time_series::ChartSeries;
use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub values: ValuesSettings,
    #[serde(default)]
    pub chart: ChartSettings,
    #[serde(default)]
    pub live: LiveSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ValuesSettings {
    pub host: String,
    /// Sent verbatim as the `Authorization` header.
    pub authorization: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ValuesSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChartSettings {
    #[serde(default = "default_px_per_point")]
    pub px_per_point: f64,
    #[serde(default = "default_pointer_radius_px")]
    pub pointer_radius_px: f64,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            px_per_point: default_px_per_point(),
            pointer_radius_px: default_pointer_radius_px(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveSettings {
    /// Push channel; polling only when unset.
    pub websocket_url: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            websocket_url: None,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl LiveSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChartsConfig {
    #[serde(default)]
    pub charts: Vec<ChartConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChartConfig {
    pub id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub series: Vec<SeriesConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeriesConfig {
    pub id: String,
    pub path: String,
    pub unit: String,
}

impl ChartsConfig {
    /// Series keep their configured order as display order.
    pub fn into_definitions(self) -> Vec<ChartDefinition> {
        self.charts
            .into_iter()
            .map(|chart| ChartDefinition {
                title: chart.title.unwrap_or_else(|| chart.id.clone()),
                series: chart
                    .series
                    .into_iter()
                    .enumerate()
                    .map(|(index, s)| ChartSeries::new(s.id, s.path, s.unit, index))
                    .collect(),
                id: chart.id,
            })
            .collect()
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_px_per_point() -> f64 {
    10.0
}

fn default_pointer_radius_px() -> f64 {
    DEFAULT_RADIUS_PX
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("CHART")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn deserialize<T: DeserializeOwned>(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    name: &str,
) -> anyhow::Result<T> {
    let settings = builder
        .add_source(environment())
        .build()
        .with_context(|| format!("Failed to load {} configuration", name))?;

    settings
        .try_deserialize()
        .with_context(|| format!("Invalid {} configuration", name))
}

pub fn load_backend_config() -> anyhow::Result<BackendConfig> {
    let builder = config::Config::builder().add_source(config::File::with_name("config/backend"));
    deserialize(builder, "backend")
}

pub fn load_charts_config() -> anyhow::Result<ChartsConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/charts").required(false));
    deserialize(builder, "charts")
}
