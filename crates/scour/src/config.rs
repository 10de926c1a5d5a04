use anyhow::{Context, Result};
use directories::ProjectDirs;
use scour_core::tree_builder::MAX_NESTING_DEPTH;
use scour_core::{Policy, PolicyDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs::try_exists;

const DEFAULT_POLICY: &str = "basic";
const DEFAULT_MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;
const MIN_INPUT_BYTES: u64 = 1024;
const MAX_INPUT_BYTES: u64 = 512 * 1024 * 1024;
const DEFAULT_MAX_NESTING_DEPTH: usize = 256;
const MIN_NESTING_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_policy: String,
    pub policies: BTreeMap<String, PolicyDefinition>,
    pub limits: LimitsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_input_bytes: u64,
    pub max_nesting_depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print the sanitize report to stderr.
    pub report: bool,
    /// Reject input with disallowed content instead of stripping it.
    pub strict: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_policy: String::from(DEFAULT_POLICY),
            policies: BTreeMap::new(),
            limits: LimitsConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        if let Some(config_path) = Self::config_path() {
            if try_exists(&config_path).await? {
                match tokio::fs::read_to_string(&config_path).await {
                    Ok(content) => {
                        if content.trim().is_empty() {
                            log::warn!("Config file is empty, creating new one");
                            let default_config = Self::default();
                            let _ = default_config.save().await;
                            return Ok(default_config);
                        }

                        match serde_json::from_str::<Self>(&content) {
                            Ok(mut config) => {
                                config.validate()?;
                                log::info!(
                                    "Successfully loaded config from: {}",
                                    config_path.display()
                                );
                                return Ok(config);
                            }
                            Err(json_err) => {
                                log::error!("Failed to parse config file: {}", json_err);

                                let backup_path = config_path.with_extension("bak");
                                if let Err(e) = tokio::fs::copy(&config_path, &backup_path).await {
                                    log::warn!("Failed to backup broken config: {}", e);
                                } else {
                                    log::info!(
                                        "Backed up broken config to: {}",
                                        backup_path.display()
                                    );
                                }

                                let default_config = Self::default();
                                let _ = default_config.save().await;
                                return Ok(default_config);
                            }
                        }
                    }
                    Err(io_err) => {
                        log::error!("Failed to read config file: {}", io_err);
                    }
                }
            } else {
                log::info!("Config file does not exist, creating default");
            }
        }

        let default_config = Self::default();
        let _ = default_config.save().await;
        Ok(default_config)
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(config_path) = Self::config_path() {
            let mut config_to_save = self.clone();
            config_to_save.validate()?;

            if let Some(parent) = config_path.parent() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
                log::debug!("Config directory exists or was created: {}", parent.display());
            }

            let content = serde_json::to_string_pretty(&config_to_save)
                .context("Failed to serialize config")?;
            tokio::fs::write(&config_path, content)
                .await
                .with_context(|| {
                    format!("Failed to write config file: {}", config_path.display())
                })?;
            log::info!("Successfully saved config to: {}", config_path.display());
        }
        Ok(())
    }

    /// Validate configuration values and fix invalid ones
    pub fn validate(&mut self) -> Result<()> {
        let mut has_issues = false;

        let limits = &mut self.limits;
        if !(MIN_INPUT_BYTES..=MAX_INPUT_BYTES).contains(&limits.max_input_bytes) {
            log::warn!(
                "Invalid max_input_bytes: {}, using default",
                limits.max_input_bytes
            );
            limits.max_input_bytes = DEFAULT_MAX_INPUT_BYTES;
            has_issues = true;
        }
        if !(MIN_NESTING_DEPTH..=MAX_NESTING_DEPTH).contains(&limits.max_nesting_depth) {
            log::warn!(
                "Invalid max_nesting_depth: {}, using default",
                limits.max_nesting_depth
            );
            limits.max_nesting_depth = DEFAULT_MAX_NESTING_DEPTH;
            has_issues = true;
        }

        let broken: Vec<String> = self
            .policies
            .iter()
            .filter_map(|(name, definition)| match definition.build() {
                Ok(_) => None,
                Err(e) => {
                    log::warn!("Dropping invalid policy '{}': {}", name, e);
                    Some(name.clone())
                }
            })
            .collect();
        for name in broken {
            self.policies.remove(&name);
            has_issues = true;
        }

        let default_policy = self.default_policy.trim().to_string();
        if default_policy.is_empty() || !self.knows_policy(&default_policy) {
            log::warn!(
                "Unknown default policy '{}', using {}",
                self.default_policy,
                DEFAULT_POLICY
            );
            self.default_policy = String::from(DEFAULT_POLICY);
            has_issues = true;
        }

        if has_issues {
            log::info!("Configuration validation completed with corrections");
        }

        Ok(())
    }

    fn knows_policy(&self, name: &str) -> bool {
        self.policies.contains_key(name) || Policy::named(name).is_ok()
    }

    /// Resolves `name` (or the configured default) to a policy. Definitions in the config
    /// shadow presets of the same name. The configured nesting limit caps the policy's own.
    pub fn resolve_policy(&self, name: Option<&str>) -> Result<Policy> {
        let name = name.unwrap_or(&self.default_policy);
        let policy = match self.policies.get(name) {
            Some(definition) => definition
                .build()
                .with_context(|| format!("Invalid policy '{}' in config", name))?,
            None => Policy::named(name).map_err(|_| {
                let mut known: Vec<&str> = scour_core::policy::PRESET_NAMES.to_vec();
                known.extend(self.policies.keys().map(String::as_str));
                anyhow::anyhow!(
                    "Unknown policy '{}'. Expected one of: {}",
                    name,
                    known.join(", ")
                )
            })?,
        };

        let depth = policy.max_nesting_depth().min(self.limits.max_nesting_depth);
        if depth == policy.max_nesting_depth() {
            return Ok(policy);
        }
        policy
            .to_builder()
            .max_nesting_depth(depth)
            .build()
            .with_context(|| format!("Invalid policy '{}'", name))
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SCOUR_CONFIG_PATH") {
            return Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("SCOUR_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.json"));
        }

        ProjectDirs::from("com", "scour", "scour").map(|dirs| dirs.config_dir().join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use tempfile::TempDir;

    fn config_test_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_config_dir(path: &std::path::Path) -> (Option<String>, Option<String>) {
        let previous_dir = std::env::var("SCOUR_CONFIG_DIR").ok();
        let previous_path = std::env::var("SCOUR_CONFIG_PATH").ok();
        std::env::set_var("SCOUR_CONFIG_DIR", path);
        std::env::remove_var("SCOUR_CONFIG_PATH");
        (previous_dir, previous_path)
    }

    fn restore_config_env(previous: (Option<String>, Option<String>)) {
        match previous.0 {
            Some(value) => std::env::set_var("SCOUR_CONFIG_DIR", value),
            None => std::env::remove_var("SCOUR_CONFIG_DIR"),
        }

        match previous.1 {
            Some(value) => std::env::set_var("SCOUR_CONFIG_PATH", value),
            None => std::env::remove_var("SCOUR_CONFIG_PATH"),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.default_policy, "basic");
        assert!(config.policies.is_empty());
        assert_eq!(config.limits.max_input_bytes, 10 * 1024 * 1024);
        assert_eq!(config.limits.max_nesting_depth, 256);
        assert!(!config.output.report);
        assert!(!config.output.strict);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();

        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"default_policy\""));
        assert!(json.contains("\"limits\""));
        assert!(json.contains("\"output\""));

        let config_from_json: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, config_from_json);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "output": { "strict": true } }"#).unwrap();
        assert!(config.output.strict);
        assert_eq!(config.default_policy, "basic");
        assert_eq!(config.limits, LimitsConfig::default());
    }

    #[test]
    fn test_validate_fixes_out_of_range_values() {
        let mut config = Config {
            default_policy: String::from("nonexistent"),
            limits: LimitsConfig {
                max_input_bytes: 1,
                max_nesting_depth: 100_000,
            },
            ..Config::default()
        };
        config.policies.insert(
            String::from("broken"),
            PolicyDefinition {
                elements: vec![String::from("script")],
                ..PolicyDefinition::default()
            },
        );

        config.validate().unwrap();
        assert_eq!(config.default_policy, "basic");
        assert_eq!(config.limits, LimitsConfig::default());
        assert!(config.policies.is_empty());
    }

    #[test]
    fn test_nesting_depth_limit_matches_engine() {
        let mut config = Config::default();
        config.limits.max_nesting_depth = MAX_NESTING_DEPTH;
        config.validate().unwrap();
        assert_eq!(config.limits.max_nesting_depth, MAX_NESTING_DEPTH);

        config.limits.max_nesting_depth = MAX_NESTING_DEPTH + 1;
        config.validate().unwrap();
        assert_eq!(config.limits.max_nesting_depth, DEFAULT_MAX_NESTING_DEPTH);

        config.policies.insert(
            String::from("deep"),
            PolicyDefinition {
                base: Some(String::from("basic")),
                max_nesting_depth: Some(4096),
                ..PolicyDefinition::default()
            },
        );
        config.validate().unwrap();
        assert!(!config.policies.contains_key("deep"));
    }

    #[test]
    fn test_resolve_policy() {
        let mut config: Config = serde_json::from_str(
            r#"{
                "default_policy": "comments",
                "policies": {
                    "comments": { "base": "minimal", "elements": ["p"] }
                },
                "limits": { "max_nesting_depth": 16 }
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_policy, "comments");

        let policy = config.resolve_policy(None).unwrap();
        assert!(policy.allows_element("p"));
        assert!(policy.allows_element("strong"));
        assert_eq!(policy.max_nesting_depth(), 16);

        let preset = config.resolve_policy(Some("markdown")).unwrap();
        assert!(preset.allows_element("table"));

        let err = config.resolve_policy(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("comments"));
    }

    #[tokio::test]
    async fn test_config_load_default() {
        let _guard = config_test_lock();
        let temp_dir = TempDir::new().unwrap();
        let previous_env = set_config_dir(temp_dir.path());

        let config = Config::load().await.unwrap();
        assert_eq!(config, Config::default());
        assert!(temp_dir.path().join("config.json").exists());

        restore_config_env(previous_env);
    }

    #[tokio::test]
    async fn test_config_load_backs_up_broken_file() {
        let _guard = config_test_lock();
        let temp_dir = TempDir::new().unwrap();
        let previous_env = set_config_dir(temp_dir.path());
        let path = temp_dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let config = Config::load().await.unwrap();
        assert_eq!(config, Config::default());
        let backup = tokio::fs::read_to_string(temp_dir.path().join("config.bak"))
            .await
            .unwrap();
        assert_eq!(backup, "{ not json");

        restore_config_env(previous_env);
    }

    #[tokio::test]
    async fn test_config_save_and_reload() {
        let _guard = config_test_lock();
        let temp_dir = TempDir::new().unwrap();
        let previous_env = set_config_dir(temp_dir.path());

        let mut config = Config::default();
        config.output.report = true;
        config.policies.insert(
            String::from("links"),
            PolicyDefinition {
                base: Some(String::from("basic")),
                deny_elements: vec![String::from("img")],
                ..PolicyDefinition::default()
            },
        );
        config.save().await.unwrap();

        let loaded = Config::load().await.unwrap();
        assert_eq!(loaded, config);
        assert!(!loaded.resolve_policy(Some("links")).unwrap().allows_element("img"));

        restore_config_env(previous_env);
    }
}
