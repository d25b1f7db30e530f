use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureConfig {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    /// Path to an Azure SDK auth JSON file.
    pub auth_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcpConfig {
    pub project: Option<String>,
    pub credentials_file: Option<PathBuf>,
}

/// One validator session key as provisioned into the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorKey {
    pub key: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub seed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct E2eConfig {
    #[serde(default = "default_terraform_dir")]
    pub terraform_dir: PathBuf,
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default = "default_validator_name")]
    pub validator_name: String,
    #[serde(default = "default_limit")]
    pub cpu_limit: String,
    #[serde(default = "default_limit")]
    pub ram_limit: String,
    #[serde(default = "default_chain")]
    pub chain: String,
    pub node_key: Option<String>,
    pub admin_email: Option<String>,
    #[serde(default = "default_true")]
    pub expose_ssh: bool,
    #[serde(default = "default_true")]
    pub delete_on_termination: bool,
    #[serde(default)]
    pub validator_keys: BTreeMap<String, ValidatorKey>,
}

fn default_terraform_dir() -> PathBuf {
    PathBuf::from("./terraform")
}
fn default_regions() -> Vec<String> {
    vec![
        "us-east1".to_string(),
        "us-east4".to_string(),
        "us-west1".to_string(),
    ]
}
fn default_ssh_user() -> String {
    "ubuntu".to_string()
}
fn default_validator_name() -> String {
    "test".to_string()
}
fn default_limit() -> String {
    "1".to_string()
}
fn default_chain() -> String {
    "westend".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            terraform_dir: default_terraform_dir(),
            regions: default_regions(),
            ssh_user: default_ssh_user(),
            validator_name: default_validator_name(),
            cpu_limit: default_limit(),
            ram_limit: default_limit(),
            chain: default_chain(),
            node_key: None,
            admin_email: None,
            expose_ssh: true,
            delete_on_termination: true,
            validator_keys: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Resource naming prefix shared by every deployed resource.
    pub prefix: Option<String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub gcp: GcpConfig,
    #[serde(default)]
    pub e2e: E2eConfig,
}

fn env_or(var: &str, fallback: Option<&String>, what: &str) -> anyhow::Result<String> {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            return Ok(value);
        }
    }
    match fallback {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => anyhow::bail!("{} is not configured (set {} or the config file)", what, var),
    }
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("failcheck").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    // Resolved accessors: environment wins over the file; a missing value is
    // a fail-fast precondition error.

    pub fn prefix(&self) -> anyhow::Result<String> {
        env_or("FAILCHECK_PREFIX", self.prefix.as_ref(), "naming prefix")
    }

    pub fn azure_subscription(&self) -> anyhow::Result<String> {
        env_or(
            "AZURE_SUBSCRIPTION_ID",
            self.azure.subscription_id.as_ref(),
            "Azure subscription id",
        )
    }

    pub fn azure_resource_group(&self) -> anyhow::Result<String> {
        env_or(
            "AZURE_RESOURCE_GROUP",
            self.azure.resource_group.as_ref(),
            "Azure resource group",
        )
    }

    pub fn gcp_project(&self) -> anyhow::Result<String> {
        env_or("GCP_PROJECT", self.gcp.project.as_ref(), "GCP project id")
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if self.e2e.regions.is_empty() {
            issues.push("e2e.regions must name at least one region".to_string());
        }
        for (slot, key) in &self.e2e.validator_keys {
            if key.key.is_empty() || key.key_type.is_empty() || key.seed.is_empty() {
                issues.push(format!(
                    "Validator key '{}': key, type, and seed are all required",
                    slot
                ));
            }
        }
        issues
    }
}

/// `FAILCHECK_NO_POST_CLEANUP` skips the deferred terraform destroy.
pub fn skip_post_cleanup() -> bool {
    std::env::var_os("FAILCHECK_NO_POST_CLEANUP").is_some()
}

/// `FAILCHECK_INITIAL_CLEANUP` forces a destroy before provisioning.
pub fn force_initial_cleanup() -> bool {
    std::env::var_os("FAILCHECK_INITIAL_CLEANUP").is_some()
}

/// `FAILCHECK_SKIP_CHANNEL_CLEANUP` skips the notification-channel sweep.
pub fn skip_channel_cleanup() -> bool {
    std::env::var_os("FAILCHECK_SKIP_CHANNEL_CLEANUP").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let config = AppConfig::default();
        let issues = config.validate();
        assert!(issues.is_empty(), "Default config should be valid, got: {:?}", issues);
    }

    #[test]
    fn default_format_is_text() {
        let settings = Settings::default();
        assert_eq!(settings.default_format, "text");
    }

    #[test]
    fn default_e2e_regions_cover_three_zones() {
        let e2e = E2eConfig::default();
        assert_eq!(e2e.regions.len(), 3);
        assert_eq!(e2e.ssh_user, "ubuntu");
    }

    #[test]
    fn validate_catches_invalid_format() {
        let mut config = AppConfig::default();
        config.settings.default_format = "xml".to_string();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("default_format")));
    }

    #[test]
    fn validate_catches_empty_regions() {
        let mut config = AppConfig::default();
        config.e2e.regions.clear();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("regions")));
    }

    #[test]
    fn validate_catches_incomplete_validator_key() {
        let mut config = AppConfig::default();
        config.e2e.validator_keys.insert(
            "key1".to_string(),
            ValidatorKey {
                key: "0xabc".to_string(),
                key_type: String::new(),
                seed: "words".to_string(),
            },
        );
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("key1")));
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
prefix = "test"

[azure]
subscription_id = "sub-123"
resource_group = "rg-test"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.prefix.as_deref(), Some("test"));
        assert_eq!(config.azure.subscription_id.as_deref(), Some("sub-123"));
        assert_eq!(config.settings.default_format, "text");
    }

    #[test]
    fn parse_validator_keys() {
        let toml = r#"
[e2e.validator_keys.key1]
key = "0x6ce9"
type = "gran"
seed = "favorite liar zebra"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let key = &config.e2e.validator_keys["key1"];
        assert_eq!(key.key_type, "gran");
        assert_eq!(key.seed, "favorite liar zebra");
    }

    #[test]
    fn parse_empty_toml_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.settings.default_format, "text");
        assert_eq!(config.e2e.chain, "westend");
        assert!(config.prefix.is_none());
    }

    #[test]
    fn env_overrides_file_value() {
        std::env::set_var("FAILCHECK_PREFIX", "from-env");
        let config = AppConfig {
            prefix: Some("from-file".to_string()),
            ..Default::default()
        };
        let prefix = config.prefix().unwrap();
        std::env::remove_var("FAILCHECK_PREFIX");
        assert_eq!(prefix, "from-env");
    }

    #[test]
    fn missing_identifier_fails_fast() {
        std::env::remove_var("AZURE_RESOURCE_GROUP");
        let config = AppConfig::default();
        let err = config.azure_resource_group().unwrap_err();
        assert!(err.to_string().contains("AZURE_RESOURCE_GROUP"));
    }

    #[test]
    fn config_path_uses_xdg_when_set() {
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/test_xdg_config");
        let path = AppConfig::config_path();
        std::env::remove_var("XDG_CONFIG_HOME");
        assert_eq!(path, PathBuf::from("/tmp/test_xdg_config/failcheck/config.toml"));
    }
}
