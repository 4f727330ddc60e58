use anyhow::{anyhow, Context, Result};
use custody_relay::api::{create_api_router, ApiState};
use custody_relay::chain::{ChainDirectory, RpcChainClient};
use custody_relay::config::AppConfig;
use custody_relay::fees::FeeEstimator;
use custody_relay::pipeline::{AdapterState, BluetoothGate, SubmissionPipeline, TracingDiagnostics};
use custody_relay::registry::{Backends, TransportRegistry};
use custody_relay::surfaces::LogSurfaces;
use custody_relay::wallet::{InMemoryAccountSource, InMemoryWalletStore, WalletDirectory, WalletStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal relay error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration")?;

    let (wallets, accounts) = match &config.wallets_file {
        Some(path) => WalletDirectory::load(path)?
            .into_parts()
            .context("load wallet directory")?,
        None => {
            warn!("no wallets file configured; wallet store is empty");
            (InMemoryWalletStore::default(), InMemoryAccountSource::new())
        }
    };
    let wallets: Arc<dyn WalletStore> = Arc::new(wallets);

    // Hardware and MPC backends are platform integrations; a headless relay
    // runs with software custody only.
    let registry = Arc::new(TransportRegistry::new(Backends::software_only(Arc::new(
        accounts,
    ))));

    let client = Arc::new(
        RpcChainClient::new(config.pipeline.rpc_timeout(), config.pipeline.rpc_retry_budget())
            .context("initialize chain rpc client")?,
    );
    let fees = FeeEstimator::new(client.clone(), config.pipeline.estimation_variant);
    let (_adapter, gate) = BluetoothGate::fixed(AdapterState::Unknown, config.pipeline.device_wait());

    let pipeline = Arc::new(SubmissionPipeline::new(
        registry.clone(),
        fees,
        client,
        gate,
        Arc::new(TracingDiagnostics),
        Arc::new(LogSurfaces),
    ));

    let chains = Arc::new(config.chain_directory());
    log_chains(&chains);

    let api_router = create_api_router(ApiState {
        pipeline: pipeline.clone(),
        chains,
        wallets: wallets.clone(),
        tokens: Arc::new(config.token_directory()),
    });

    let listener = tokio::net::TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("bind API server address {}", config.api_addr))?;
    info!(address = %config.api_addr, wallets = wallets.get_all().len(), "custody relay online");
    let _api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api_router).await {
            warn!(error = %e, "API server error");
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = pipeline.get_stats();
                info!(
                    live_transports = registry.len().await,
                    total_submissions = stats.total_submissions,
                    successful = stats.successful_submissions,
                    failed = stats.failed_submissions,
                    expected_failures = stats.expected_failures,
                    success_rate = stats.success_rate,
                    avg_success_ms = ?stats.avg_success_time_ms,
                    "relay heartbeat"
                );
                for address in registry.addresses().await {
                    debug!(address = %address, "transport cached");
                }
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    warn!(error = %err, "ctrl_c listener error");
                }
                info!("Shutdown signal received, disposing transports");
                let disposed = registry.abort_all().await;
                info!(disposed, "transports disposed, exiting");
                break;
            }
        }
    }
    Ok(())
}

fn log_chains(chains: &ChainDirectory) {
    if chains.is_empty() {
        warn!("no chains configured; fee and submission endpoints will return 404");
    }
    for chain in chains.all() {
        info!(
            chain = %chain.name,
            eth_chain_id = chain.eth_chain_id,
            bandwidth = chain.is_bandwidth,
            evm_rpc = ?chain.evm_rpc.as_ref().map(|u| u.as_str()),
            rest = ?chain.rest_url.as_ref().map(|u| u.as_str()),
            "chain configured"
        );
    }
}

fn init_tracing() -> Result<()> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn,reqwest=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
