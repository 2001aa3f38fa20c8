//! Flash-loan liquidation bot.
//!
//! Monitors undercollateralized positions on an Aave-style lending protocol,
//! re-validates their health on-chain, plans a flash-loan + swap route, and
//! submits the liquidation when simulated profit clears gas cost by a safety
//! margin.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flashliq_api::{GasPriceTracker, PositionFeedClient, SpotPriceClient};
use flashliq_chain::{
    FlashLiquidatorContract, OneSplitQuoter, ProviderManager, RetryingQuoteClient,
    TransactionSender,
};
use flashliq_core::{init_config, BotConfig, LiquidationPipeline, ProfitEvaluator, RoutePlanner};

/// Environment variable names.
mod env {
    pub const RPC_HTTP_URL: &str = "RPC_HTTP_URL";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const LIQUIDATOR_ADDRESS: &str = "LIQUIDATOR_ADDRESS";
    pub const LENDING_POOL: &str = "LENDING_POOL";
    pub const ONE_SPLIT: &str = "ONE_SPLIT";
    pub const CHAIN_ID: &str = "CHAIN_ID";
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,flashliq_core=debug,flashliq_chain=debug")),
        )
        .init();

    // Load and initialize bot config (use BOT_PROFILE to select: testing,
    // production, or a TOML file path)
    let bot_config = BotConfig::from_env();
    bot_config.log_config();
    init_config(bot_config.clone());

    info!("Starting flash-loan liquidation bot");

    // Load RPC/contract configuration
    let config = load_config()?;

    // Provider
    let provider = Arc::new(ProviderManager::new(&config.http_url, config.lending_pool).await?);
    info!(pool = %config.lending_pool, "Provider initialized");

    // Gas price tracker: background, fire-and-forget
    let gas_tracker = Arc::new(
        GasPriceTracker::new().with_interval(bot_config.gas.refresh_interval()),
    );
    let _gas_handle = Arc::clone(&gas_tracker).spawn();
    info!("Gas price tracker started");

    // External clients
    let feed = Arc::new(PositionFeedClient::new());
    let spot = Arc::new(SpotPriceClient::new());

    // Quote client with bounded retry
    let quoter = Arc::new(OneSplitQuoter::new(&config.http_url, config.one_split));
    let quotes = RetryingQuoteClient::new(quoter).with_attempts(bot_config.quotes.max_attempts);
    let planner = RoutePlanner::new(quotes);

    // Transaction sender
    let sender = Arc::new(
        TransactionSender::new(&config.private_key, &config.http_url, config.chain_id)
            .await?
            .with_gas_limit(bot_config.pipeline.gas_limit),
    );
    info!(address = %sender.address, "Transaction sender initialized");

    // Flash liquidator contract
    let contract = FlashLiquidatorContract::new(config.liquidator);

    let evaluator = ProfitEvaluator::with_margin(bot_config.pipeline.profit_margin_usd);

    let pipeline = LiquidationPipeline::new(
        feed,
        provider,
        planner,
        evaluator,
        gas_tracker,
        spot,
        contract,
        sender,
    );

    if bot_config.pipeline.single_pass {
        let report = pipeline.run_once().await?;
        info!(
            discovered = report.discovered,
            submitted = report.submitted,
            skipped = report.skipped,
            failed = report.failed,
            "Single pass complete"
        );
        return Ok(());
    }

    info!("Starting continuous mode");
    pipeline.run().await
}

/// Configuration loaded from environment.
struct Config {
    http_url: String,
    lending_pool: alloy::primitives::Address,
    one_split: alloy::primitives::Address,
    liquidator: alloy::primitives::Address,
    private_key: String,
    chain_id: u64,
}

fn load_config() -> Result<Config> {
    let get_env = |name: &str| -> Result<String> {
        std::env::var(name).map_err(|_| anyhow::anyhow!("Missing env var: {}", name))
    };

    let get_address = |name: &str| -> Result<alloy::primitives::Address> {
        get_env(name)?
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid address for {}: {}", name, e))
    };

    Ok(Config {
        http_url: get_env(env::RPC_HTTP_URL)?,
        lending_pool: get_address(env::LENDING_POOL)
            .unwrap_or_else(|_| "0x398eC7346DcD622eDc5ae82352F02bE94C62d119".parse().unwrap()),
        one_split: get_address(env::ONE_SPLIT)
            .unwrap_or_else(|_| "0xC586BeF4a0992C495Cf22e1aeEE4E446CECDee0E".parse().unwrap()),
        liquidator: get_address(env::LIQUIDATOR_ADDRESS)?,
        private_key: get_env(env::PRIVATE_KEY)?,
        chain_id: get_env(env::CHAIN_ID)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
    })
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ┌─┐┬  ┌─┐┌─┐┬ ┬┬  ┬┌─┐
    ├┤ │  ├─┤└─┐├─┤│  ││└─┐
    └  ┴─┘┴ ┴└─┘┴ ┴┴─┘┴└─┴┘
    Flash Liquidation Bot v0.1.0
    "#
    );
}
