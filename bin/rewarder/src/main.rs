use alloy::network::EthereumWallet;
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use eyre::Result;
use rewarder::chain::{
    AlloyChainClient, ChainClient, ClientConfig, RoundReader, RoundWatcher, RoundWatcherConfig,
};
use rewarder::config::RewarderConfig;
use rewarder::metrics::RewardMetrics;
use rewarder::RewardWorker;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration directory
    #[arg(long, default_value = "./configs/dev")]
    config_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print the participant's reward status and exit
    #[arg(long)]
    dry_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting reward claimer");

    let config_file = PathBuf::from(&cli.config_path).join("rewarder.json");
    let config = if config_file.exists() {
        RewarderConfig::load_from_file(&config_file).await?
    } else {
        tracing::warn!(path = %config_file.display(), "rewarder.json not found, using defaults");
        RewarderConfig::default()
    }
    .with_env_overrides();
    config.validate()?;

    tracing::info!(
        rpc_url = %config.chain.rpc_url,
        bonding_manager = %config.chain.bonding_manager_address,
        rounds_manager = %config.chain.rounds_manager_address,
        "Config loaded"
    );

    // The claimer signs its own reward transactions
    let private_key = std::env::var("PRIVATE_KEY")
        .map_err(|_| eyre::eyre!("PRIVATE_KEY environment variable is required"))?;
    let signer: PrivateKeySigner = private_key.parse()?;
    let account = signer.address();
    let wallet = EthereumWallet::from(signer);
    tracing::info!(account = %account, "Wallet loaded for signing transactions");

    let provider = ProviderBuilder::new()
        .wallet(wallet)
        .connect_http(config.chain.rpc_url.parse()?);

    let client_config = ClientConfig {
        bonding_manager: config.chain.bonding_manager_address.parse()?,
        rounds_manager: config.chain.rounds_manager_address.parse()?,
        account,
        confirm_timeout_secs: config.transactions.confirm_timeout_secs,
        receipt_poll_interval_ms: config.transactions.receipt_poll_interval_ms,
        price_bump_percent: config.transactions.price_bump_percent,
        max_fee_per_gas: config.transactions.max_fee_per_gas_wei(),
    };
    let client = Arc::new(AlloyChainClient::new_with_provider(client_config, provider));

    if cli.dry_check {
        let round = client.read_last_initialized_round().await?;
        let status = client.participant_status(account).await?;
        tracing::info!(
            round,
            active = status.active,
            last_reward_round = status.last_reward_round,
            can_claim = status.can_claim(round),
            "Participant status"
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();

    let watcher = RoundWatcher::new(
        client.clone(),
        RoundWatcherConfig {
            polling_interval_ms: config.rounds.polling_interval_ms,
            max_consecutive_failures: config.rounds.max_consecutive_failures,
        },
    );
    let watcher_handle = tokio::spawn(watcher.clone().run());

    let mut worker = RewardWorker::new(client.clone(), watcher.clone());

    let metrics_handle = if config.metrics.enabled {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        worker = worker.with_outcome_sink(outcome_tx);
        let metrics = Arc::new(RewardMetrics::new());
        Some(tokio::spawn(metrics.run(
            outcome_rx,
            Duration::from_secs(config.metrics.report_interval_secs),
            shutdown.clone(),
        )))
    } else {
        None
    };

    let worker = Arc::new(worker);
    let mut worker_handle = {
        let worker = worker.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { worker.start(token).await })
    };

    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("🛑 Shutdown signal received");
            if let Err(e) = worker.stop().await {
                tracing::warn!(error = %e, "Worker already stopped");
            }
            worker_handle.await?
        }
        result = &mut worker_handle => result?,
    };

    // Cleanup. Dropping the worker closes the outcome sink so metrics see
    // every outcome before the final report.
    drop(worker);
    shutdown.cancel();
    watcher.cancel_token().cancel();
    let _ = watcher_handle.await;
    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    exit?;

    tracing::info!("✓ Reward claimer stopped");

    Ok(())
}
