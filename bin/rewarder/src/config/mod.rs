use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RewarderConfig {
    pub chain: ChainConfig,
    pub rounds: RoundsConfig,
    pub transactions: TransactionConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub bonding_manager_address: String,
    pub rounds_manager_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundsConfig {
    pub polling_interval_ms: u64,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub confirm_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    pub price_bump_percent: u64,
    /// Ceiling for max fee per gas, in gwei
    pub max_fee_per_gas_gwei: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub report_interval_secs: u64,
}

impl RewarderConfig {
    pub async fn load_from_file(path: &Path) -> eyre::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Apply `REWARDER_*` environment overrides to every section
    pub fn with_env_overrides(self) -> Self {
        Self {
            chain: self.chain.with_env_overrides(),
            rounds: self.rounds.with_env_overrides(),
            transactions: self.transactions.with_env_overrides(),
            metrics: self.metrics.with_env_overrides(),
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.transactions.confirm_timeout_secs == 0 {
            eyre::bail!("transactions.confirm_timeout_secs must be greater than zero");
        }
        if self.transactions.receipt_poll_interval_ms == 0 {
            eyre::bail!("transactions.receipt_poll_interval_ms must be greater than zero");
        }
        if self.rounds.polling_interval_ms == 0 {
            eyre::bail!("rounds.polling_interval_ms must be greater than zero");
        }
        if self.metrics.enabled && self.metrics.report_interval_secs == 0 {
            eyre::bail!("metrics.report_interval_secs must be greater than zero");
        }
        // Nodes refuse replacements that raise fees by less than 10%
        if self.transactions.price_bump_percent < 10 {
            eyre::bail!(
                "transactions.price_bump_percent must be at least 10, got {}",
                self.transactions.price_bump_percent
            );
        }
        Ok(())
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl ChainConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env_override("REWARDER_RPC_URL") {
            self.rpc_url = url;
        }
        if let Some(address) = env_override("REWARDER_BONDING_MANAGER") {
            self.bonding_manager_address = address;
        }
        if let Some(address) = env_override("REWARDER_ROUNDS_MANAGER") {
            self.rounds_manager_address = address;
        }
        self
    }
}

impl RoundsConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_override("REWARDER_ROUND_POLL_MS") {
            self.polling_interval_ms = ms;
        }
        if let Some(limit) = env_override("REWARDER_ROUND_MAX_FAILURES") {
            self.max_consecutive_failures = limit;
        }
        self
    }
}

impl TransactionConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = env_override("REWARDER_CONFIRM_TIMEOUT_SECS") {
            self.confirm_timeout_secs = secs;
        }
        if let Some(ms) = env_override("REWARDER_RECEIPT_POLL_MS") {
            self.receipt_poll_interval_ms = ms;
        }
        if let Some(percent) = env_override("REWARDER_PRICE_BUMP_PERCENT") {
            self.price_bump_percent = percent;
        }
        if let Some(gwei) = env_override("REWARDER_MAX_FEE_GWEI") {
            self.max_fee_per_gas_gwei = Some(gwei);
        }
        self
    }

    /// Fee ceiling in wei
    pub fn max_fee_per_gas_wei(&self) -> Option<u128> {
        self.max_fee_per_gas_gwei
            .map(|gwei| gwei as u128 * 1_000_000_000)
    }
}

impl MetricsConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(enabled) = env_override("REWARDER_METRICS_ENABLED") {
            self.enabled = enabled;
        }
        if let Some(secs) = env_override("REWARDER_METRICS_REPORT_SECS") {
            self.report_interval_secs = secs;
        }
        self
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            bonding_manager_address: "0x0000000000000000000000000000000000000000".to_string(),
            rounds_manager_address: "0x0000000000000000000000000000000000000000".to_string(),
        }
    }
}

impl Default for RoundsConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 5000,
            max_consecutive_failures: 20,
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: 300,
            receipt_poll_interval_ms: 2000,
            price_bump_percent: 11,
            max_fee_per_gas_gwei: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RewarderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transactions.price_bump_percent, 11);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{
            "chain": { "rpc_url": "http://node:8545" },
            "transactions": { "confirm_timeout_secs": 60 }
        }"#;
        let config: RewarderConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.chain.rpc_url, "http://node:8545");
        assert_eq!(config.transactions.confirm_timeout_secs, 60);
        assert_eq!(config.transactions.receipt_poll_interval_ms, 2000);
        assert_eq!(config.rounds.polling_interval_ms, 5000);
    }

    #[test]
    fn test_validate_rejects_small_bump() {
        let mut config = RewarderConfig::default();
        config.transactions.price_bump_percent = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = RewarderConfig::default();
        config.transactions.confirm_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_report_interval() {
        let mut config = RewarderConfig::default();
        config.metrics.report_interval_secs = 0;
        assert!(config.validate().is_err());

        // Interval is unused when metrics are off
        config.metrics.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_cover_intervals() {
        std::env::set_var("REWARDER_ROUND_MAX_FAILURES", "3");
        std::env::set_var("REWARDER_RECEIPT_POLL_MS", "250");
        std::env::set_var("REWARDER_METRICS_REPORT_SECS", "60");

        let config = RewarderConfig::default().with_env_overrides();

        std::env::remove_var("REWARDER_ROUND_MAX_FAILURES");
        std::env::remove_var("REWARDER_RECEIPT_POLL_MS");
        std::env::remove_var("REWARDER_METRICS_REPORT_SECS");

        assert_eq!(config.rounds.max_consecutive_failures, 3);
        assert_eq!(config.transactions.receipt_poll_interval_ms, 250);
        assert_eq!(config.metrics.report_interval_secs, 60);
    }

    #[test]
    fn test_max_fee_conversion() {
        let mut tx = TransactionConfig::default();
        assert_eq!(tx.max_fee_per_gas_wei(), None);
        tx.max_fee_per_gas_gwei = Some(150);
        assert_eq!(tx.max_fee_per_gas_wei(), Some(150_000_000_000));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("rewarder-config-{}.json", std::process::id()));
        let config = RewarderConfig::default();
        tokio::fs::write(&path, serde_json::to_string_pretty(&config).unwrap())
            .await
            .unwrap();

        let loaded = RewarderConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.chain.rpc_url, config.chain.rpc_url);
        assert_eq!(loaded.rounds.max_consecutive_failures, 20);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
