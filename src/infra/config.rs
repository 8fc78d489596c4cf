//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config/dev.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Facility identifier used as metrics label (e.g., "lot-a")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "parking".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Recognition engine endpoint
    #[serde(default = "default_ocr_url")]
    pub url: String,
    /// Recognition language passed to the engine
    #[serde(default = "default_ocr_language")]
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { url: default_ocr_url(), language: default_ocr_language() }
    }
}

fn default_ocr_url() -> String {
    "http://127.0.0.1:8884/recognize".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// File the camera keeps its latest still frame in
    #[serde(default = "default_frame_path")]
    pub frame_path: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { frame_path: default_frame_path() }
    }
}

fn default_frame_path() -> String {
    "capture/latest.jpg".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Initial hourly rate (editable at runtime)
    #[serde(default = "default_hourly_rate")]
    pub hourly_rate: f64,
    /// Currency symbol prefixed to amounts on the console
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self { hourly_rate: default_hourly_rate(), currency: default_currency() }
    }
}

fn default_hourly_rate() -> f64 {
    10.0
}

fn default_currency() -> String {
    "$".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Preload demonstration sessions and payments on start
    #[serde(default)]
    pub seed_demo_data: bool,
    /// Log file for the TUI (stdout belongs to the terminal UI)
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { seed_demo_data: false, log_file: default_log_file() }
    }
}

fn default_log_file() -> String {
    "parking-console.log".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind_address")]
    pub bind_address: String,
    /// Operator API port (0 to disable)
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind_address: default_api_bind_address(), port: default_api_port() }
    }
}

fn default_api_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Configured rates must be finite; anything else falls back to the default
fn checked_hourly_rate(hourly_rate: f64) -> f64 {
    if hourly_rate.is_finite() {
        hourly_rate
    } else {
        eprintln!(
            "Warning: billing.hourly_rate {} is not a finite number. Using {}.",
            hourly_rate,
            default_hourly_rate()
        );
        default_hourly_rate()
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    ocr_url: String,
    ocr_language: String,
    frame_path: String,
    hourly_rate: f64,
    currency: String,
    seed_demo_data: bool,
    log_file: String,
    api_bind_address: String,
    api_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            ocr_url: toml_config.ocr.url,
            ocr_language: toml_config.ocr.language,
            frame_path: toml_config.capture.frame_path,
            hourly_rate: checked_hourly_rate(toml_config.billing.hourly_rate),
            currency: toml_config.billing.currency,
            seed_demo_data: toml_config.console.seed_demo_data,
            log_file: toml_config.console.log_file,
            api_bind_address: toml_config.api.bind_address,
            api_port: toml_config.api.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path: `--config` value, then `CONFIG_FILE`, then the default
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        DEFAULT_CONFIG_PATH.to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path - falls back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Resolve the config path and load it - falls back to defaults on error
    pub fn load(cli_path: Option<&str>) -> Self {
        Self::load_from_path(&Self::resolve_config_path(cli_path))
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn ocr_url(&self) -> &str {
        &self.ocr_url
    }

    pub fn ocr_language(&self) -> &str {
        &self.ocr_language
    }

    pub fn frame_path(&self) -> &str {
        &self.frame_path
    }

    pub fn hourly_rate(&self) -> f64 {
        self.hourly_rate
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn seed_demo_data(&self) -> bool {
        self.seed_demo_data
    }

    pub fn log_file(&self) -> &str {
        &self.log_file
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_port(&self) -> u16 {
        self.api_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
