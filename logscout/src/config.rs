use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a scan run.
///
/// # Configuration Locations
///
/// Loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.logscout.yaml` in the current directory
/// 3. Global `$HOME/.config/logscout/config.yaml`
///
/// # Configuration Format
///
/// YAML. Example:
/// ```yaml
/// # Pattern to match (literal or regex)
/// pattern: "ERROR|FATAL"
///
/// # Glob patterns naming the files to scan
/// paths:
///   - "./logs/*.log"
///
/// # Worker count (default: CPU cores)
/// concurrency: 4
///
/// # Milliseconds between progress snapshots
/// tick_interval_ms: 200
///
/// # Longest line the scanner will buffer, in bytes
/// max_line_len: 8388608
///
/// # Optional webhook notified on every match
/// webhook_url: "https://example.com/hook"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "warn"
/// ```
///
/// CLI arguments take precedence over config file values; the merging
/// behavior is defined in `merge_with_cli`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// The pattern to match against each line (literal or regex)
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Glob patterns naming the files to scan
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,

    /// Number of scan workers; non-positive values are coerced to 1 at
    /// pipeline start. Defaults to the number of CPU cores.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Milliseconds between periodic totals snapshots
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Longest line the scanner will buffer, in bytes. Longer lines fail
    /// the file rather than the run.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    /// Optional webhook URL notified on every match
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_pattern() -> String {
    "ERROR".to_string()
}

fn default_paths() -> Vec<String> {
    vec!["./logs/*.log".to_string()]
}

fn default_concurrency() -> usize {
    num_cpus::get()
}

fn default_tick_interval_ms() -> u64 {
    200
}

fn default_max_line_len() -> usize {
    8 * 1024 * 1024
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            paths: default_paths(),
            concurrency: default_concurrency(),
            tick_interval_ms: default_tick_interval_ms(),
            max_line_len: default_max_line_len(),
            webhook_url: None,
            log_level: default_log_level(),
        }
    }
}

impl ScanConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Default config locations
        let config_files = [
            // Global config
            dirs::config_dir().map(|p| p.join("logscout/config.yaml")),
            // Local config
            Some(PathBuf::from(".logscout.yaml")),
            // Custom config
            config_path.map(PathBuf::from),
        ];

        // Add existing config files
        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // Build and deserialize
        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli_config: ScanConfig) -> Self {
        // CLI values take precedence over config file values
        if cli_config.pattern != default_pattern() {
            self.pattern = cli_config.pattern;
        }
        if cli_config.paths != default_paths() {
            self.paths = cli_config.paths;
        }
        if cli_config.concurrency != default_concurrency() {
            self.concurrency = cli_config.concurrency;
        }
        if cli_config.tick_interval_ms != default_tick_interval_ms() {
            self.tick_interval_ms = cli_config.tick_interval_ms;
        }
        if cli_config.max_line_len != default_max_line_len() {
            self.max_line_len = cli_config.max_line_len;
        }
        if cli_config.webhook_url.is_some() {
            self.webhook_url = cli_config.webhook_url;
        }
        if cli_config.log_level != default_log_level() {
            self.log_level = cli_config.log_level;
        }
        self
    }

    /// The snapshot period as a `Duration`
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
