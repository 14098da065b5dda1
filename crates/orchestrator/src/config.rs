use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use procflow_core::BlockKind;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::fallback::{default_playbooks, Playbook};

pub const CONFIG_DIR: &str = ".procflow";
pub const CONFIG_FILE: &str = "config.toml";

/// Bounds of the GUI fallback loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Capture/act/verify attempts per playbook step.
    pub max_attempts: u32,
    pub verify_wait_ms: u64,
    pub step_timeout_ms: u64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            verify_wait_ms: 500,
            step_timeout_ms: 10_000,
        }
    }
}

impl FallbackSettings {
    pub fn verify_wait(&self) -> Duration {
        Duration::from_millis(self.verify_wait_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

/// Which engine and automation driver sessions talk to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Simulated {
        /// Block kinds the simulated command interface refuses.
        #[serde(default)]
        unsupported_blocks: Vec<BlockKind>,
        #[serde(default)]
        latency_ms: u64,
        /// Screen never changes, so every fallback verification fails.
        #[serde(default)]
        frozen_screen: bool,
    },
    Bridge {
        base_url: String,
        #[serde(default = "default_request_timeout_ms")]
        request_timeout_ms: u64,
    },
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Simulated {
            unsupported_blocks: Vec::new(),
            latency_ms: 0,
            frozen_screen: false,
        }
    }
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simulated { .. } => "simulated",
            Self::Bridge { .. } => "bridge",
        }
    }
}

/// Orchestrator settings stored in `.procflow/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Where project files are saved when no path is given.
    pub working_dir: PathBuf,
    pub engine_call_timeout_ms: u64,
    pub lock_timeout_ms: u64,
    /// Retries after the first attempt for transient engine faults.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub fallback: FallbackSettings,
    pub backend: BackendConfig,
    /// Fallback playbooks keyed by operation name.
    pub playbooks: BTreeMap<String, Playbook>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("projects"),
            engine_call_timeout_ms: 30_000,
            lock_timeout_ms: 60_000,
            max_retries: 2,
            backoff_base_ms: 250,
            fallback: FallbackSettings::default(),
            backend: BackendConfig::default(),
            playbooks: default_playbooks(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_engine_call_timeout(mut self, timeout: Duration) -> Self {
        self.engine_call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackSettings) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_playbook(mut self, operation: impl Into<String>, playbook: Playbook) -> Self {
        self.playbooks.insert(operation.into(), playbook);
        self
    }

    pub fn engine_call_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_call_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Read config from `dir/.procflow/config.toml`, falling back to defaults.
    pub async fn read(dir: &Path) -> Self {
        let config_path = Self::path_in(dir);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(&config_path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Strict load of an explicit config file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        toml::from_str(&content)
            .map_err(|e| OrchestratorError::Config(format!("{}: {}", path.display(), e)))
    }

    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        let config_path = Self::path_in(dir);
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| OrchestratorError::Config(e.to_string()))?;
        let temp_path = config_path.with_extension("toml.tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &config_path).await?;

        debug!(path = %config_path.display(), "Config saved successfully");
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.engine_call_timeout(), Duration::from_secs(30));
        assert_eq!(config.lock_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_base(), Duration::from_millis(250));
        assert_eq!(config.fallback.max_attempts, 3);
        assert_eq!(config.backend.name(), "simulated");
        assert!(config.playbooks.contains_key("create_block"));
    }

    #[test]
    fn test_builder() {
        let config = OrchestratorConfig::new("/tmp/projects")
            .with_max_retries(0)
            .with_engine_call_timeout(Duration::from_millis(100))
            .with_backend(BackendConfig::Bridge {
                base_url: "http://localhost:9400".to_string(),
                request_timeout_ms: 5_000,
            });

        assert_eq!(config.working_dir, PathBuf::from("/tmp/projects"));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.engine_call_timeout_ms, 100);
        assert_eq!(config.backend.name(), "bridge");
    }

    #[tokio::test]
    async fn test_read_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = OrchestratorConfig::read(temp_dir.path()).await;
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let config = OrchestratorConfig::default()
            .with_lock_timeout(Duration::from_secs(5))
            .with_backend(BackendConfig::Simulated {
                unsupported_blocks: vec![BlockKind::AmineTreater],
                latency_ms: 3,
                frozen_screen: true,
            });

        config.write(temp_dir.path()).await.unwrap();
        let loaded = OrchestratorConfig::read(temp_dir.path()).await;

        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_unparsable_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = OrchestratorConfig::path_in(temp_dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "max_retries = \"lots\"").unwrap();

        let config = OrchestratorConfig::read(temp_dir.path()).await;
        assert_eq!(config.max_retries, 2);

        assert!(matches!(
            OrchestratorConfig::load_from(&path).await,
            Err(OrchestratorError::Config(_))
        ));
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
max_retries = 5

[backend]
kind = "bridge"
base_url = "http://10.0.0.5:9400"
"#,
        )
        .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.lock_timeout_ms, 60_000);
        assert_eq!(
            config.backend,
            BackendConfig::Bridge {
                base_url: "http://10.0.0.5:9400".to_string(),
                request_timeout_ms: 60_000,
            }
        );
    }
}
