//! End-to-end sessions against the mock orderbook.
//!
//! The full stack is real (throttled client, 1inch adapter, signer,
//! lifecycle, program loop); only the network hop and the chain are
//! replaced. Time is paused so every session runs instantly.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use ladderbot::api::client::{Method, ThrottledClient};
use ladderbot::api::oneinch::OneInchClient;
use ladderbot::api::retry::RetryPolicy;
use ladderbot::api::throttle::ThrottleGate;
use ladderbot::api::{BatchCanceller, OrderBook};
use ladderbot::chain::allowance::AllowanceGuard;
use ladderbot::chain::signer::{OrderSigner, AGGREGATION_ROUTER_V6};
use ladderbot::engine::ladder::LadderPlanner;
use ladderbot::engine::lifecycle::OrderLifecycle;
use ladderbot::engine::oracle::PriceOracle;
use ladderbot::engine::program::{Program, ProgramSettings};
use ladderbot::error::{ErrorKind, LadderError};

use crate::mock_orderbook::{MockChain, MockOrderbook};

const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const MIN_INTERVAL: Duration = Duration::from_millis(1500);

fn wavax() -> Address {
    "0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7".parse().unwrap()
}

fn dai() -> Address {
    "0xd586e7f844cea2f87f50152665bcbc2c279d8d70".parse().unwrap()
}

struct Harness {
    program: Program,
    book: MockOrderbook,
    chain: MockChain,
}

fn harness(book: MockOrderbook, allowance: U256, order_count: u32) -> Harness {
    let wallet: LocalWallet = TEST_KEY.parse().unwrap();
    let router: Address = AGGREGATION_ROUTER_V6.parse().unwrap();
    let chain = MockChain::new(wallet.address(), allowance);

    let http = ThrottledClient::new(
        book.clone(),
        ThrottleGate::new(MIN_INTERVAL, Duration::from_millis(250)),
        RetryPolicy::new(3, Duration::from_millis(1000)),
    );
    let oneinch = Arc::new(OneInchClient::new(
        http,
        "https://api.1inch.dev",
        43114,
        SecretString::new("test-key".into()),
    ));
    let orderbook: Arc<dyn OrderBook> = oneinch.clone();
    let canceller: Arc<dyn BatchCanceller> = oneinch;

    let lifecycle = OrderLifecycle::new(
        orderbook.clone(),
        canceller,
        OrderSigner::new(wallet, 43114, router, 600),
        Duration::from_millis(2050),
        Duration::from_secs(600),
    )
    .unwrap();

    let program = Program::new(
        lifecycle,
        PriceOracle::new(orderbook, wavax(), dai()),
        LadderPlanner::new(wavax(), dai(), dec!(1), order_count),
        AllowanceGuard::new(Arc::new(chain.clone()), wavax(), router),
        ProgramSettings {
            min_quantity: dec!(0.1),
            max_quantity: dec!(0.2),
            delay_per_order: Duration::from_secs(1),
            cycle_delay: Duration::from_secs(10),
            error_backoff: Duration::from_secs(3),
            clearing_period: Duration::from_secs(300),
        },
    );

    Harness { program, book, chain }
}

fn priced_book() -> MockOrderbook {
    MockOrderbook::with_prices(&[(wavax(), "35.456"), (dai(), "10")])
}

#[tokio::test(start_paused = true)]
async fn test_session_places_ladder_and_drains_on_shutdown() {
    let h = harness(priced_book(), U256::MAX, 2);

    // Cycle one finishes both rungs by ~15s and then waits out the cycle delay.
    let report = h
        .program
        .run(tokio::time::sleep(Duration::from_secs(20)))
        .await
        .unwrap();

    let submitted = h.book.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(report.cancelled, 2);
    assert_eq!(h.book.cancelled(), vec![submitted]);
    assert!(h.program.lifecycle().tracker().is_empty());
    assert!(h.chain.approvals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dispatches_never_closer_than_min_interval() {
    let h = harness(priced_book(), U256::MAX, 3);

    h.program
        .run(tokio::time::sleep(Duration::from_secs(90)))
        .await
        .unwrap();

    let dispatches = h.book.dispatches();
    assert!(dispatches.len() > 10);
    for pair in dispatches.windows(2) {
        assert!(
            pair[1].at - pair[0].at >= MIN_INTERVAL,
            "{} then {} only {:?} apart",
            pair[0].url,
            pair[1].url,
            pair[1].at - pair[0].at
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_lookup_timeouts_never_track_and_never_retry() {
    let book = priced_book();
    book.fail_lookups(504);
    let h = harness(book, U256::MAX, 2);

    let report = h
        .program
        .run(tokio::time::sleep(Duration::from_secs(60)))
        .await
        .unwrap();

    let submitted = h.book.submitted();
    let lookups = h.book.lookups();
    assert!(submitted.len() >= 2, "loop kept cycling after failures");
    // One lookup per submission, no retries. Shutdown may land between
    // the last submit and its lookup.
    assert!(submitted.starts_with(&lookups));
    assert!(submitted.len() - lookups.len() <= 1);
    assert!(h.program.lifecycle().tracker().is_empty());
    assert!(h.book.cancelled().is_empty());
    assert_eq!(report.cancelled, 0);
}

#[tokio::test(start_paused = true)]
async fn test_short_allowance_is_raised_before_first_order() {
    let h = harness(priced_book(), U256::zero(), 1);

    let placed = h.program.run_cycle().await.unwrap();

    assert_eq!(placed, 1);
    let approvals = h.chain.approvals();
    assert_eq!(approvals.len(), 1);
    let lo = U256::exp10(17);
    let hi = U256::from(2u64) * U256::exp10(17);
    assert!(approvals[0] >= lo && approvals[0] <= hi);
    assert_eq!(h.book.submitted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bad_api_key_is_unauthorized_and_not_retried() {
    let book = priced_book();
    book.fail_all(401);
    let h = harness(book, U256::MAX, 1);

    let err = h.program.run_cycle().await.unwrap_err();

    let ladder = err.downcast_ref::<LadderError>().unwrap();
    assert_eq!(ladder.kind(), ErrorKind::Unauthorized);
    let dispatches = h.book.dispatches();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].method, Method::Get);
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_are_retried_then_surface() {
    let book = priced_book();
    book.fail_all(503);
    let h = harness(book, U256::MAX, 1);

    let err = h.program.run_cycle().await.unwrap_err();

    let ladder = err.downcast_ref::<LadderError>().unwrap();
    assert_eq!(ladder.kind(), ErrorKind::Transient);
    assert_eq!(h.book.dispatches().len(), 3);
}
