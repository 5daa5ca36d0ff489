use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::identity::CredentialScheme;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Log every store commit at debug level
    #[serde(default)]
    pub trace_store: bool,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub credentials: CredentialScheme,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// JSON document holding every table
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "./data/chip_ledger.json".to_string(),
        }
    }
}

/// One account created by `seed_if_absent`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeedAccount {
    pub username: String,
    pub password: String,
    pub name: String,
}

/// Bootstrap accounts ensured at every start
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeedConfig {
    #[serde(default = "SeedConfig::default_demo")]
    pub demo: SeedAccount,
    #[serde(default = "SeedConfig::default_admin")]
    pub admin: SeedAccount,
}

impl SeedConfig {
    fn default_demo() -> SeedAccount {
        SeedAccount {
            username: "testuser1".to_string(),
            password: "test123".to_string(),
            name: "テストユーザー1".to_string(),
        }
    }

    fn default_admin() -> SeedAccount {
        SeedAccount {
            username: "RR管理者".to_string(),
            password: "rr1106".to_string(),
            name: "RR管理者".to_string(),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            demo: Self::default_demo(),
            admin: Self::default_admin(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "chip_ledger.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            trace_store: false,
            store: StoreConfig::default(),
            credentials: CredentialScheme::default(),
            seed: SeedConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
log_level: debug
log_dir: ./logs
log_file: ledger.log
use_json: false
rotation: never
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(!config.trace_store);
        assert_eq!(config.store.path, "./data/chip_ledger.json");
        assert_eq!(config.credentials, CredentialScheme::Plaintext);
        assert_eq!(config.seed.demo.username, "testuser1");
        assert_eq!(config.seed.admin.password, "rr1106");
    }

    #[test]
    fn test_overrides() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: ledger.log
use_json: true
rotation: hourly
store:
  path: /tmp/ledger.json
credentials: argon2
seed:
  admin:
    username: boss
    password: secret
    name: Boss
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.path, "/tmp/ledger.json");
        assert_eq!(config.credentials, CredentialScheme::Argon2);
        assert_eq!(config.seed.admin.username, "boss");
        assert_eq!(config.seed.demo.username, "testuser1");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load("does-not-exist").is_err());
    }
}
