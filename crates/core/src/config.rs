//! Configuration management with profile support.
//!
//! Provides centralized configuration for all bot parameters with
//! support for different profiles (default, testing, production).

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Pipeline thresholds and timing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Quote client parameters
    #[serde(default)]
    pub quotes: QuoteConfig,

    /// Gas tracker parameters
    #[serde(default)]
    pub gas: GasConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Pipeline thresholds and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum reported borrow USD to consider a candidate
    #[serde(default = "default_min_borrow_usd")]
    pub min_borrow_usd: f64,

    /// Profit must exceed gas cost by this margin (USD) to submit
    #[serde(default = "default_profit_margin")]
    pub profit_margin_usd: f64,

    /// Gas limit for liquidation transactions
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Sleep between passes in continuous mode (seconds)
    #[serde(default = "default_pass_interval")]
    pub pass_interval_secs: u64,

    /// Process one pass and exit
    #[serde(default)]
    pub single_pass: bool,

    /// Evaluate and log but never broadcast
    #[serde(default)]
    pub dry_run: bool,
}

fn default_min_borrow_usd() -> f64 {
    1.0
}
fn default_profit_margin() -> f64 {
    0.2
}
fn default_gas_limit() -> u64 {
    2_000_000
}
fn default_pass_interval() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_borrow_usd: default_min_borrow_usd(),
            profit_margin_usd: default_profit_margin(),
            gas_limit: default_gas_limit(),
            pass_interval_secs: default_pass_interval(),
            single_pass: false,
            dry_run: false,
        }
    }
}

impl PipelineConfig {
    pub fn pass_interval(&self) -> Duration {
        Duration::from_secs(self.pass_interval_secs)
    }

    /// Minimum borrow threshold as a Decimal for feed-value comparisons.
    pub fn min_borrow_threshold(&self) -> Decimal {
        Decimal::from_f64(self.min_borrow_usd).unwrap_or(Decimal::ONE)
    }
}

/// Quote client parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Attempt budget for quote-oracle calls
    #[serde(default = "default_quote_attempts")]
    pub max_attempts: u32,
}

fn default_quote_attempts() -> u32 {
    20
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_quote_attempts(),
        }
    }
}

/// Gas tracker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Refresh interval for the gas-price snapshot (seconds)
    #[serde(default = "default_gas_refresh")]
    pub refresh_interval_secs: u64,
}

fn default_gas_refresh() -> u64 {
    15
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_gas_refresh(),
        }
    }
}

impl GasConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            pipeline: PipelineConfig::default(),
            quotes: QuoteConfig::default(),
            gas: GasConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Testing profile: single dry-run pass with a small retry budget.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            pipeline: PipelineConfig {
                min_borrow_usd: 0.0001,
                profit_margin_usd: 0.2,
                gas_limit: 2_000_000,
                pass_interval_secs: 10,
                single_pass: true,
                dry_run: true,
            },
            quotes: QuoteConfig { max_attempts: 3 },
            gas: GasConfig::default(),
        }
    }

    /// Production profile: continuous mode with the full retry budget.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            pipeline: PipelineConfig {
                min_borrow_usd: 1.0,
                profit_margin_usd: 0.2,
                gas_limit: 2_000_000,
                pass_interval_secs: 60,
                single_pass: false,
                dry_run: false,
            },
            quotes: QuoteConfig { max_attempts: 20 },
            gas: GasConfig::default(),
        }
    }

    /// Get profile from environment variable BOT_PROFILE, or default.
    /// Supported values: testing, production, or a path to a TOML file.
    pub fn from_env() -> Self {
        let profile = std::env::var("BOT_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            "default" => Self::default(),
            _ => Self::from_file(&profile).unwrap_or_default(),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            min_borrow_usd = self.pipeline.min_borrow_usd,
            profit_margin_usd = self.pipeline.profit_margin_usd,
            gas_limit = self.pipeline.gas_limit,
            pass_interval_secs = self.pipeline.pass_interval_secs,
            single_pass = self.pipeline.single_pass,
            dry_run = self.pipeline.dry_run,
            "Pipeline parameters"
        );
        tracing::info!(
            quote_attempts = self.quotes.max_attempts,
            gas_refresh_secs = self.gas.refresh_interval_secs,
            "Client parameters"
        );
    }
}

static GLOBAL_CONFIG: OnceLock<BotConfig> = OnceLock::new();

/// Initialize global configuration.
pub fn init_config(config: BotConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static BotConfig {
    GLOBAL_CONFIG.get_or_init(BotConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.pipeline.min_borrow_usd, 1.0);
        assert_eq!(config.pipeline.profit_margin_usd, 0.2);
        assert_eq!(config.pipeline.pass_interval_secs, 60);
        assert_eq!(config.quotes.max_attempts, 20);
        assert_eq!(config.gas.refresh_interval_secs, 15);
    }

    #[test]
    fn test_testing_profile() {
        let config = BotConfig::testing();
        assert_eq!(config.profile, "testing");
        assert!(config.pipeline.dry_run);
        assert!(config.pipeline.single_pass);
        assert_eq!(config.quotes.max_attempts, 3);
    }

    #[test]
    fn test_min_borrow_decimal() {
        let config = BotConfig::default();
        assert_eq!(config.pipeline.min_borrow_threshold(), Decimal::ONE);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BotConfig::production();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"production\""));

        let parsed: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "production");
        assert_eq!(parsed.pipeline.pass_interval_secs, 60);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: BotConfig = toml::from_str("profile = \"custom\"").unwrap();
        assert_eq!(parsed.profile, "custom");
        assert_eq!(parsed.pipeline.gas_limit, 2_000_000);
    }
}
