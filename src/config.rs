//! Configuration management for the transaction manager
//!
//! Loads configuration from TOML files with environment variable substitution.
//! A loaded `Settings` is immutable; it is handed to `TransactionManager::new`
//! and shared by every record the manager creates.

use crate::chain::ChainSpec;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub node: NodeConfig,
    #[serde(default)]
    pub booster: BoosterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Lifecycle policy shared by all records of one manager
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoosterConfig {
    /// Chain used when a record names none (name, alias or numeric id)
    pub default_chain: Option<String>,
    /// Gas price increase per boost, in percent
    pub gas_price_step_percent: u64,
    /// Gas price assigned to new records that do not set one
    pub start_gas_price: Option<u64>,
    pub retry_delay_ms: u64,
    pub retry_on_rejection: bool,
    /// Keep the precomputed hash of a terminally rejected broadcast
    pub record_hash_on_rejection: bool,
    pub boost_interval_secs: u64,
    pub event_capacity: usize,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            default_chain: None,
            gas_price_step_percent: 10,
            start_gas_price: None,
            retry_delay_ms: 10_000,
            retry_on_rejection: false,
            record_hash_on_rejection: false,
            boost_interval_secs: 0,
            event_capacity: 1024,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    7_000
}

impl BoosterConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn default_chain_spec(&self) -> Option<ChainSpec> {
        self.default_chain.as_deref().map(ChainSpec::parse)
    }
}

impl Settings {
    /// Load settings from the file named by `TX_BOOSTER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("TX_BOOSTER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.node.rpc_urls.is_empty() {
            anyhow::bail!("At least one RPC URL must be configured");
        }

        if self.booster.gas_price_step_percent == 0 {
            anyhow::bail!("gas_price_step_percent must be greater than zero");
        }

        if let Some(spec) = self.booster.default_chain_spec() {
            spec.resolve()
                .with_context(|| "Invalid default chain")?;
        }

        if self.booster.event_capacity == 0 {
            tracing::warn!("event_capacity of 0 is raised to 1");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TX_BOOSTER_TEST_VAR", "test_value");
        let input = "url = \"https://rpc.example.com/${TX_BOOSTER_TEST_VAR}/v1\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "url = \"https://rpc.example.com/test_value/v1\"");
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::parse(
            r#"
            [node]
            rpc_urls = ["http://localhost:8545"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.node.poll_interval_ms, 7_000);
        assert_eq!(settings.booster.gas_price_step_percent, 10);
        assert_eq!(settings.booster.retry_delay(), Duration::from_secs(10));
        assert!(!settings.booster.retry_on_rejection);
        assert!(settings.booster.default_chain.is_none());
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("TX_BOOSTER_TEST_RPC", "http://node:8545");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [node]
            rpc_urls = ["${{TX_BOOSTER_TEST_RPC}}"]

            [booster]
            default_chain = "ropsten"
            gas_price_step_percent = 25
            retry_on_rejection = true
            "#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.node.rpc_urls, vec!["http://node:8545".to_string()]);
        assert_eq!(settings.booster.gas_price_step_percent, 25);
        assert!(settings.booster.retry_on_rejection);
        assert_eq!(settings.booster.default_chain_spec().unwrap().resolve().unwrap(), 3);
    }

    #[test]
    fn test_bundled_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.booster.default_chain_spec().unwrap().resolve().unwrap(), 1);
        assert_eq!(settings.booster.boost_interval_secs, 0);
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        assert!(Settings::parse("[node]\nrpc_urls = []").is_err());
        assert!(Settings::parse(
            "[node]\nrpc_urls = [\"http://a\"]\n[booster]\ngas_price_step_percent = 0"
        )
        .is_err());
        assert!(Settings::parse(
            "[node]\nrpc_urls = [\"http://a\"]\n[booster]\ndefault_chain = \"atlantis\""
        )
        .is_err());
    }
}
