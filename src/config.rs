//! TOML configuration for fastmeter.
//!
//! Layered the same way for every entry point: an explicit path wins, then the
//! `FASTMETER_CONFIG` environment variable, then the system location, then the
//! compiled-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "FASTMETER_CONFIG";

/// Standard system config location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/fastmeter/fastmeter.toml";

/// Longest accepted measurement window or drain timeout.
pub const MAX_WINDOW: Duration = Duration::from_secs(60 * 60);

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FastmeterConfig {
    #[serde(default)]
    pub measure: MeasureConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FastmeterConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load from an explicitly requested file, or fall back to
    /// [`FastmeterConfig::load_or_default`]. A file the user asked for by name
    /// must load; the fallbacks are recorded on the result.
    pub fn resolve(explicit: Option<&Path>) -> Result<ResolvedConfig> {
        match explicit {
            Some(path) => Ok(ResolvedConfig {
                config: Self::load(path)?,
                path: Some(path.to_path_buf()),
                skipped: Vec::new(),
            }),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `FASTMETER_CONFIG` environment variable.
    /// 2. `/etc/fastmeter/fastmeter.toml`.
    /// 3. Fall back to compiled-in defaults.
    ///
    /// Nothing is logged here; this runs before the subscriber exists, so the
    /// caller reports the outcome with [`ResolvedConfig::log`].
    pub fn load_or_default() -> ResolvedConfig {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_layered(env_path, Path::new(SYSTEM_CONFIG_PATH))
    }

    fn load_layered(env_path: Option<PathBuf>, system_path: &Path) -> ResolvedConfig {
        let mut skipped = Vec::new();

        if let Some(path) = env_path {
            match Self::load(&path) {
                Ok(config) => {
                    return ResolvedConfig {
                        config,
                        path: Some(path),
                        skipped,
                    }
                }
                Err(error) => skipped.push(SkippedConfig {
                    origin: CONFIG_ENV,
                    path,
                    error,
                }),
            }
        }

        if system_path.exists() {
            match Self::load(system_path) {
                Ok(config) => {
                    return ResolvedConfig {
                        config,
                        path: Some(system_path.to_path_buf()),
                        skipped,
                    }
                }
                Err(error) => skipped.push(SkippedConfig {
                    origin: "system",
                    path: system_path.to_path_buf(),
                    error,
                }),
            }
        }

        ResolvedConfig {
            config: Self::default(),
            path: None,
            skipped,
        }
    }

    /// Reject values the measurement cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.measure.concurrency > 0,
            "measure.concurrency must be at least 1"
        );
        anyhow::ensure!(
            !self.measure.duration.is_zero(),
            "measure.duration must be greater than zero"
        );
        anyhow::ensure!(
            self.measure.duration <= MAX_WINDOW,
            "measure.duration must be at most {}",
            humantime::format_duration(MAX_WINDOW)
        );
        anyhow::ensure!(
            self.measure.drain_timeout <= MAX_WINDOW,
            "measure.drain_timeout must be at most {}",
            humantime::format_duration(MAX_WINDOW)
        );
        anyhow::ensure!(
            self.provider.url_count > 0,
            "provider.url_count must be at least 1"
        );
        Ok(())
    }
}

/// A configuration together with where it came from.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub config: FastmeterConfig,
    /// File the config was read from; `None` means compiled-in defaults.
    pub path: Option<PathBuf>,
    /// Config files that were found but could not be used.
    pub skipped: Vec<SkippedConfig>,
}

/// A config file passed over during resolution.
#[derive(Debug)]
pub struct SkippedConfig {
    /// `FASTMETER_CONFIG` or `system`.
    pub origin: &'static str,
    pub path: PathBuf,
    pub error: anyhow::Error,
}

impl ResolvedConfig {
    /// Report how the configuration was resolved. Call once tracing is up.
    pub fn log(&self) {
        for skipped in &self.skipped {
            warn!(
                origin = skipped.origin,
                path = %skipped.path.display(),
                error = %format!("{:#}", skipped.error),
                "config file could not be loaded, falling back"
            );
        }
        match &self.path {
            Some(path) => info!(path = %path.display(), "loaded configuration"),
            None => debug!("no usable config file, using compiled-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// Parameters of a single measurement run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Maximum number of downloads in flight at once.
    pub concurrency: usize,
    /// Length of the measurement window.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// How long past the window to wait for in-flight downloads to wind down.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Treat non-2xx download responses as errors instead of counting their bytes.
    pub strict_status: bool,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            duration: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(2),
            user_agent: concat!("fastmeter/", env!("CARGO_PKG_VERSION")).to_string(),
            strict_status: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Where and how download endpoints are discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Landing page that references the app script.
    pub base_url: String,
    /// Endpoint listing API.
    pub api_url: String,
    /// Number of download URLs to request.
    pub url_count: u32,
    /// Ask the API for https download URLs.
    pub https: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fast.com".to_string(),
            api_url: "https://api.fast.com/netflix/speedtest/v2".to_string(),
            url_count: 5,
            https: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = FastmeterConfig::default();
        assert_eq!(cfg.measure.concurrency, 8);
        assert_eq!(cfg.measure.duration, Duration::from_secs(10));
        assert!(!cfg.measure.strict_status);
        assert_eq!(cfg.provider.url_count, 5);
        assert_eq!(cfg.provider.base_url, "https://fast.com");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: FastmeterConfig = toml::from_str(
            r#"
            [measure]
            concurrency = 4
            duration = "500ms"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.measure.concurrency, 4);
        assert_eq!(cfg.measure.duration, Duration::from_millis(500));
        assert_eq!(cfg.measure.drain_timeout, Duration::from_secs(2));
        assert_eq!(cfg.provider.api_url, "https://api.fast.com/netflix/speedtest/v2");
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_bad_duration_rejected() {
        let res: std::result::Result<FastmeterConfig, _> = toml::from_str(
            r#"
            [measure]
            duration = "ten seconds"
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut cfg = FastmeterConfig::default();
        cfg.measure.concurrency = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = FastmeterConfig::default();
        cfg.measure.duration = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = FastmeterConfig::default();
        cfg.provider.url_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[provider]\nbase_url = \"http://localhost:9000\"\nurl_count = 3\nhttps = false"
        )
        .unwrap();

        let cfg = FastmeterConfig::load(file.path()).unwrap();
        assert_eq!(cfg.provider.base_url, "http://localhost:9000");
        assert_eq!(cfg.provider.url_count, 3);
        assert!(!cfg.provider.https);
    }

    #[test]
    fn test_resolve_explicit_missing_file_fails() {
        let res = FastmeterConfig::resolve(Some(Path::new("/nonexistent/fastmeter.toml")));
        assert!(res.is_err());
    }

    #[test]
    fn test_humantime_durations_in_toml() {
        let cfg: FastmeterConfig = toml::from_str(
            r#"
            [measure]
            duration = "1m 30s"
            drain_timeout = "250ms"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.measure.duration, Duration::from_secs(90));
        assert_eq!(cfg.measure.drain_timeout, Duration::from_millis(250));

        let out = toml::to_string(&cfg).unwrap();
        assert!(out.contains(r#"duration = "1m 30s""#));
    }

    #[test]
    fn test_overflowing_duration_is_an_error() {
        assert!(humantime::parse_duration("307445734561825861m").is_err());

        let res: std::result::Result<FastmeterConfig, _> = toml::from_str(
            r#"
            [measure]
            duration = "307445734561825861m"
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_validate_caps_window_and_drain() {
        let mut cfg = FastmeterConfig::default();
        cfg.measure.duration = MAX_WINDOW;
        cfg.measure.drain_timeout = MAX_WINDOW;
        assert!(cfg.validate().is_ok());

        let mut cfg = FastmeterConfig::default();
        cfg.measure.duration = Duration::from_secs(u64::MAX);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("measure.duration"));

        let mut cfg = FastmeterConfig::default();
        cfg.measure.drain_timeout = MAX_WINDOW + Duration::from_millis(1);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("measure.drain_timeout"));
    }

    #[test]
    fn test_resolve_explicit_file_has_no_fallbacks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[measure]\nconcurrency = 3").unwrap();

        let resolved = FastmeterConfig::resolve(Some(file.path())).unwrap();
        assert_eq!(resolved.config.measure.concurrency, 3);
        assert_eq!(resolved.path.as_deref(), Some(file.path()));
        assert!(resolved.skipped.is_empty());
    }

    #[test]
    fn test_broken_env_config_is_recorded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[measure]\nconcurrency = \"eight\"").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("fastmeter.toml");

        let resolved =
            FastmeterConfig::load_layered(Some(file.path().to_path_buf()), &system);

        assert!(resolved.path.is_none());
        assert_eq!(resolved.config.measure.concurrency, 8);
        assert_eq!(resolved.skipped.len(), 1);
        assert_eq!(resolved.skipped[0].origin, CONFIG_ENV);
        assert_eq!(resolved.skipped[0].path, file.path());
        assert!(format!("{:#}", resolved.skipped[0].error).contains("failed to parse"));
    }

    #[test]
    fn test_broken_env_config_falls_through_to_system_file() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("fastmeter.toml");
        std::fs::write(&system, "[measure]\nconcurrency = 2\n").unwrap();

        let resolved = FastmeterConfig::load_layered(
            Some(dir.path().join("missing.toml")),
            &system,
        );

        assert_eq!(resolved.path.as_deref(), Some(system.as_path()));
        assert_eq!(resolved.config.measure.concurrency, 2);
        assert_eq!(resolved.skipped.len(), 1);
    }
}
