//! LADDERBOT: autonomous limit-order ladder agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the orderbook client, the chain gateway and the engine, and runs
//! the placement and clearing loops until Ctrl+C, then drains live orders.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use ladderbot::api::client::{ReqwestTransport, ThrottledClient};
use ladderbot::api::oneinch::OneInchClient;
use ladderbot::api::retry::RetryPolicy;
use ladderbot::api::throttle::ThrottleGate;
use ladderbot::api::{BatchCanceller, OrderBook};
use ladderbot::chain::allowance::AllowanceGuard;
use ladderbot::chain::signer::OrderSigner;
use ladderbot::chain::{ChainGateway, EvmChain};
use ladderbot::config::{self, CancelMode};
use ladderbot::engine::ladder::LadderPlanner;
use ladderbot::engine::lifecycle::OrderLifecycle;
use ladderbot::engine::oracle::PriceOracle;
use ladderbot::engine::program::Program;

const BANNER: &str = r#"
 _        _    ____  ____  _____ ____  ____   ___ _____
| |      / \  |  _ \|  _ \| ____|  _ \| __ ) / _ \_   _|
| |     / _ \ | | | | | | |  _| | |_) |  _ \| | | || |
| |___ / ___ \| |_| | |_| | |___|  _ <| |_) | |_| || |
|_____/_/   \_\____/|____/|_____|_| \_\____/ \___/ |_|

  Limit-order ladder agent for the 1inch orderbook
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = config::AppConfig::path_from_env();
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        network = ?cfg.chain.network,
        chain_id = cfg.chain_id(),
        order_count = cfg.ladder.order_count,
        order_step = %cfg.ladder.order_step,
        "LADDERBOT starting up"
    );

    // -- Initialise components -------------------------------------------

    let wallet = cfg.wallet()?;
    let router = cfg.router_address()?;
    let input_asset = cfg.input_asset()?;
    let output_asset = cfg.output_asset()?;

    let chain = Arc::new(EvmChain::new(&cfg.chain.rpc_url, wallet.clone(), cfg.chain_id(), router)?);
    info!(wallet = ?chain.wallet_address(), router = ?router, "Chain gateway ready");

    let transport = ReqwestTransport::new(cfg.request_timeout())?;
    let http = ThrottledClient::new(
        transport,
        ThrottleGate::new(cfg.min_interval(), cfg.poll_quantum()),
        RetryPolicy::from(cfg.api.retry.clone()),
    );
    let oneinch = Arc::new(OneInchClient::new(
        http,
        &cfg.api.base_url,
        cfg.chain_id(),
        cfg.api_key()?,
    ));

    match (chain.symbol(input_asset).await, chain.symbol(output_asset).await) {
        (Ok(input), Ok(output)) => info!(pair = %format!("{input}/{output}"), "Trading pair"),
        (input, output) => warn!(
            input = ?input.err().map(|e| e.to_string()),
            output = ?output.err().map(|e| e.to_string()),
            "Could not read token symbols"
        ),
    }

    let book: Arc<dyn OrderBook> = oneinch.clone();
    let canceller: Arc<dyn BatchCanceller> = match cfg.api.cancel_mode {
        CancelMode::Onchain => chain.clone() as Arc<dyn BatchCanceller>,
        CancelMode::Api => oneinch.clone() as Arc<dyn BatchCanceller>,
    };
    info!(mode = ?cfg.api.cancel_mode, "Cancellation route");

    let signer = OrderSigner::new(
        wallet,
        cfg.chain_id(),
        router,
        cfg.signed_expiration_secs(),
    );
    let lifecycle = OrderLifecycle::new(
        book.clone(),
        canceller,
        signer,
        cfg.settle_delay(),
        cfg.order_expiration(),
    )?;

    let program = Program::new(
        lifecycle,
        PriceOracle::new(book, input_asset, output_asset),
        LadderPlanner::new(input_asset, output_asset, cfg.ladder.order_step, cfg.ladder.order_count),
        AllowanceGuard::new(chain, input_asset, router),
        cfg.program_settings(),
    );

    // -- Main loop -------------------------------------------------------

    info!(
        cycle_delay_secs = cfg.ladder.cycle_delay_secs,
        cancel_delay_secs = cfg.clearing.cancel_delay_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let report = program
        .run(shutdown)
        .await
        .context("Final drain failed; some orders may still be live until they expire")?;

    info!(
        cancelled = report.cancelled,
        expired = report.expired,
        "LADDERBOT shut down cleanly."
    );
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ladderbot=info"));

    let json_logging = std::env::var("LADDER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
