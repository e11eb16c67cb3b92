use anyhow::{bail, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::workflow::{SubmitPolicy, WorkflowSettings};

pub const CONFIG_FILE: &str = "etc-apply.toml";
pub const RC_FILE: &str = ".etc-apply-rc";

/// Main configuration structure for the ETC application client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EtcApplyConfig {
    pub backend: BackendConfig,
    pub workflow: WorkflowConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: String,
    /// Per-request timeout
    pub timeout_seconds: u64,
    pub rate_limit: RateLimitConfig,
    /// Cache for reference lookups (provinces, defaults, operators, ...)
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_capacity: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Progress polling interval for passenger runs
    pub poll_interval_ms: u64,
    pub submit_policy: SubmitPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Default filter when RUST_LOG is unset
    pub log_level: String,
    pub json_logs: bool,
    pub metrics_enabled: bool,
}

impl Default for EtcApplyConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                base_url: "http://127.0.0.1:5000/api".to_string(),
                timeout_seconds: 30,
                rate_limit: RateLimitConfig {
                    requests_per_second: 5,
                    burst_capacity: 10,
                },
                cache: CacheConfig {
                    ttl_seconds: 300,
                    max_capacity: 256,
                },
            },
            workflow: WorkflowConfig {
                poll_interval_ms: 2000,
                submit_policy: SubmitPolicy::LatestWins,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
                metrics_enabled: true,
            },
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl WorkflowConfig {
    pub fn settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            submit_policy: self.submit_policy,
        }
    }
}

impl EtcApplyConfig {
    /// Load configuration from the working directory. Precedence:
    /// 1. Default values
    /// 2. Configuration files (etc-apply.toml, .etc-apply-rc)
    /// 3. Environment variables (ETC_APPLY_BACKEND__BASE_URL, ...)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."), None)
    }

    /// Same layering rooted at `dir`; an explicit `file` is added last among
    /// the files and must exist.
    pub fn load_from(dir: &Path, file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_path = dir.join(CONFIG_FILE);
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path).format(FileFormat::Toml));
        }

        let rc_path = dir.join(RC_FILE);
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(FileFormat::Toml));
        }

        if let Some(file) = file {
            if !file.exists() {
                bail!("Configuration file {} does not exist", file.display());
            }
            builder = builder.add_source(File::from(PathBuf::from(file)));
        }

        builder = builder.add_source(
            Environment::with_prefix("ETC_APPLY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: EtcApplyConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            bail!("backend.base_url must not be empty");
        }
        if self.backend.timeout_seconds == 0 {
            bail!("backend.timeout_seconds must be positive");
        }
        if self.backend.rate_limit.requests_per_second == 0 {
            bail!("backend.rate_limit.requests_per_second must be positive");
        }
        if self.workflow.poll_interval_ms == 0 {
            bail!("workflow.poll_interval_ms must be positive");
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<EtcApplyConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = EtcApplyConfig::load_env_file();
        EtcApplyConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static EtcApplyConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
