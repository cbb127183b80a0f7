//! Order lifecycle: sign, submit, confirm, track, and sweep.
//!
//! ```text
//! PENDING_SUBMIT ──submit+fetch ok──▶ LIVE ──sweep (not expired)──▶ CANCELLED
//!        │                              └───sweep (expired)──────▶ SWEPT
//!        └──submit ok, fetch failed──▶ UNTRACKED
//! ```
//!
//! An untracked order may still rest on the remote book. It is reported,
//! not cancelled, and will simply expire on its own.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::tracker::OrderTracker;
use crate::api::{BatchCanceller, OrderBook};
use crate::chain::signer::{OrderSigner, SignedOrder};
use crate::error::LadderError;
use crate::types::{CancelBatch, OrderIntent, OrderRecord, OrderState, TrackedOrder};

/// Minimum wait between submit and the first lookup the orderbook will answer.
pub const MIN_SETTLE_DELAY: Duration = Duration::from_millis(1050);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Still-valid orders sent in the cancel batch.
    pub cancelled: usize,
    /// Already-expired orders dropped without a cancel call.
    pub expired: usize,
    /// Orders left tracked afterwards (recorded while the cancel was in flight).
    pub retained: usize,
}

pub struct OrderLifecycle {
    book: Arc<dyn OrderBook>,
    canceller: Arc<dyn BatchCanceller>,
    signer: OrderSigner,
    tracker: OrderTracker,
    settle_delay: Duration,
    expiration: chrono::Duration,
}

impl OrderLifecycle {
    pub fn new(
        book: Arc<dyn OrderBook>,
        canceller: Arc<dyn BatchCanceller>,
        signer: OrderSigner,
        settle_delay: Duration,
        expiration: Duration,
    ) -> Result<Self, LadderError> {
        let expiration = chrono::Duration::from_std(expiration)
            .map_err(|e| LadderError::Config(format!("order expiration out of range: {e}")))?;
        Ok(Self {
            book,
            canceller,
            signer,
            tracker: OrderTracker::new(),
            settle_delay: settle_delay.max(MIN_SETTLE_DELAY),
            expiration,
        })
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    pub fn signer(&self) -> &OrderSigner {
        &self.signer
    }

    /// Sign and submit `intent`, wait for the book to settle, then fetch the
    /// canonical record and start tracking it.
    pub async fn create_order(&self, intent: &OrderIntent) -> Result<TrackedOrder, LadderError> {
        let now_unix = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let signed = self.signer.sign(intent, now_unix)?;
        debug!(
            order_hash = %signed.order_hash,
            state = %OrderState::PendingSubmit,
            intent = %intent,
            "Submitting order"
        );

        self.book.submit_order(&signed).await?;

        tokio::time::sleep(self.settle_delay).await;

        let tracked = match self.confirm(&signed).await {
            Ok(tracked) => tracked,
            Err(source) => {
                warn!(
                    order_hash = %signed.order_hash,
                    state = %OrderState::Untracked,
                    kind = %source.kind(),
                    error = %source,
                    "Order submitted but could not be confirmed"
                );
                return Err(LadderError::Untracked {
                    order_hash: signed.order_hash,
                    source: Box::new(source),
                });
            }
        };

        // The tracker may have moved on while we slept.
        if !self.tracker.record(tracked.clone()) {
            debug!(order_hash = %tracked.order_hash, "Order already tracked");
        }

        info!(
            order_hash = %tracked.order_hash,
            state = %OrderState::Live,
            expires_at = %tracked.expires_at,
            tracked = self.tracker.len(),
            "Order live"
        );
        Ok(tracked)
    }

    /// One lookup, never retried.
    async fn confirm(&self, signed: &SignedOrder) -> Result<TrackedOrder, LadderError> {
        let record = self.book.order_by_hash(&signed.order_hash).await?;
        self.to_tracked(&signed.order_hash, &record)
    }

    fn to_tracked(&self, order_hash: &str, record: &OrderRecord) -> Result<TrackedOrder, LadderError> {
        if !record.order_hash.eq_ignore_ascii_case(order_hash) {
            return Err(LadderError::DataIntegrity(format!(
                "lookup for {order_hash} returned order {}",
                record.order_hash
            )));
        }
        Ok(TrackedOrder {
            order_hash: order_hash.to_string(),
            trait_bits: record.trait_bits()?,
            expires_at: record.created_at()? + self.expiration,
        })
    }

    /// Cancel every still-valid tracked order in one batch and forget the
    /// snapshot. Expired orders are never part of the batch.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, LadderError> {
        let snapshot = self.tracker.snapshot();
        if snapshot.is_empty() {
            debug!("Nothing to sweep");
            return Ok(SweepReport::default());
        }

        let (expired, live): (Vec<_>, Vec<_>) = snapshot.iter().partition(|o| o.is_expired(now));

        if !live.is_empty() {
            let mut batch = CancelBatch::default();
            for order in &live {
                batch.push(order);
            }
            debug!(count = batch.len(), "Cancelling live orders");
            self.canceller.cancel_batch(&batch).await?;
        }

        self.tracker
            .remove(snapshot.iter().map(|o| o.order_hash.as_str()));

        let report = SweepReport {
            cancelled: live.len(),
            expired: expired.len(),
            retained: self.tracker.len(),
        };
        for order in &live {
            debug!(order_hash = %order.order_hash, state = %OrderState::Cancelled, "Order retired");
        }
        for order in &expired {
            debug!(order_hash = %order.order_hash, state = %OrderState::Swept, "Order retired");
        }
        info!(
            cancelled = report.cancelled,
            expired = report.expired,
            retained = report.retained,
            "Sweep complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockBatchCanceller, MockOrderBook};
    use crate::chain::signer::tests::test_signer;
    use crate::error::ErrorKind;
    use crate::types::OrderRecordData;
    use ethers::types::{Address, U256};
    use parking_lot::Mutex;

    fn intent() -> OrderIntent {
        OrderIntent {
            maker_asset: Address::repeat_byte(1),
            taker_asset: Address::repeat_byte(2),
            making_amount: U256::exp10(18),
            taking_amount: U256::from(3_581_056u64) * U256::exp10(12),
        }
    }

    fn record_for(order_hash: &str, created: &str) -> OrderRecord {
        OrderRecord {
            order_hash: order_hash.to_string(),
            create_date_time: created.to_string(),
            data: OrderRecordData {
                maker_traits: "0x4000000000000000000000000000000000006747e9e700000000000000000000".into(),
                maker_asset: None,
                taker_asset: None,
            },
        }
    }

    fn tracked(hash: &str, expires_at: DateTime<Utc>) -> TrackedOrder {
        TrackedOrder {
            order_hash: hash.to_string(),
            trait_bits: U256::from(hash.len() as u64),
            expires_at,
        }
    }

    fn lifecycle(book: MockOrderBook, canceller: MockBatchCanceller) -> OrderLifecycle {
        OrderLifecycle::new(
            Arc::new(book),
            Arc::new(canceller),
            test_signer(),
            Duration::from_millis(2050),
            Duration::from_secs(600),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_order_tracks_server_timestamp() {
        let mut book = MockOrderBook::new();
        let submitted = Arc::new(Mutex::new(String::new()));
        let seen = submitted.clone();
        book.expect_submit_order().times(1).returning(move |order| {
            *seen.lock() = order.order_hash.clone();
            Ok(())
        });
        book.expect_order_by_hash()
            .times(1)
            .returning(|hash| Ok(record_for(hash, "2024-11-28T04:16:23Z")));

        let lc = lifecycle(book, MockBatchCanceller::new());
        let start = tokio::time::Instant::now();
        let order = lc.create_order(&intent()).await.unwrap();

        assert!(tokio::time::Instant::now() - start >= Duration::from_millis(2050));
        assert_eq!(order.order_hash, *submitted.lock());
        assert_eq!(order.expires_at.timestamp(), 1732767383 + 600);
        assert_eq!(order.trait_bits, (U256::one() << 254) | (U256::from(0x6747e9e7u64) << 80));
        assert!(lc.tracker().contains(&order.order_hash));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_leaves_tracker_unchanged() {
        let mut book = MockOrderBook::new();
        book.expect_submit_order().times(1).returning(|_| Ok(()));
        book.expect_order_by_hash().times(1).returning(|_| {
            Err(LadderError::Transient {
                url: "https://api/order".into(),
                status: None,
                message: "operation timed out".into(),
            })
        });

        let lc = lifecycle(book, MockBatchCanceller::new());
        lc.tracker().record(tracked("0xexisting", Utc::now() + chrono::Duration::minutes(5)));

        let err = lc.create_order(&intent()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Untracked);
        assert!(matches!(err, LadderError::Untracked { ref order_hash, .. } if order_hash.starts_with("0x")));
        assert_eq!(lc.tracker().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_skips_fetch() {
        let mut book = MockOrderBook::new();
        book.expect_submit_order()
            .returning(|_| Err(LadderError::from_status("https://api", 401, String::new())));
        book.expect_order_by_hash().never();

        let lc = lifecycle(book, MockBatchCanceller::new());
        let err = lc.create_order(&intent()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(lc.tracker().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_record_is_untracked() {
        let mut book = MockOrderBook::new();
        book.expect_submit_order().returning(|_| Ok(()));
        book.expect_order_by_hash()
            .returning(|_| Ok(record_for("0xsomeoneelse", "2024-11-28T04:16:23Z")));

        let lc = lifecycle(book, MockBatchCanceller::new());
        let err = lc.create_order(&intent()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Untracked);
        assert!(lc.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_cancels_only_unexpired_and_clears() {
        let now = Utc::now();
        let mut canceller = MockBatchCanceller::new();
        canceller
            .expect_cancel_batch()
            .withf(|batch| batch.order_hashes == vec!["0xfuture".to_string()] && batch.trait_bits.len() == 1)
            .times(1)
            .returning(|_| Ok(()));

        let lc = lifecycle(MockOrderBook::new(), canceller);
        lc.tracker().record(tracked("0xpast", now - chrono::Duration::seconds(1)));
        lc.tracker().record(tracked("0xfuture", now + chrono::Duration::seconds(60)));

        let report = lc.sweep(now).await.unwrap();

        assert_eq!(report, SweepReport { cancelled: 1, expired: 1, retained: 0 });
        assert!(lc.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_with_only_expired_skips_cancel() {
        let now = Utc::now();
        let mut canceller = MockBatchCanceller::new();
        canceller.expect_cancel_batch().never();

        let lc = lifecycle(MockOrderBook::new(), canceller);
        lc.tracker().record(tracked("0xa", now));
        lc.tracker().record(tracked("0xb", now - chrono::Duration::minutes(1)));

        let report = lc.sweep(now).await.unwrap();
        assert_eq!(report.expired, 2);
        assert_eq!(report.cancelled, 0);
        assert!(lc.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_failure_removes_nothing() {
        let now = Utc::now();
        let mut canceller = MockBatchCanceller::new();
        canceller
            .expect_cancel_batch()
            .returning(|_| Err(LadderError::chain("cancelOrders", "execution reverted")));

        let lc = lifecycle(MockOrderBook::new(), canceller);
        lc.tracker().record(tracked("0xpast", now - chrono::Duration::seconds(1)));
        lc.tracker().record(tracked("0xfuture", now + chrono::Duration::seconds(60)));

        let err = lc.sweep(now).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Chain);
        assert_eq!(lc.tracker().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_sweep_is_noop() {
        let mut canceller = MockBatchCanceller::new();
        canceller.expect_cancel_batch().never();
        let lc = lifecycle(MockOrderBook::new(), canceller);
        assert_eq!(lc.sweep(Utc::now()).await.unwrap(), SweepReport::default());
    }

    /// Canceller that records an order into the tracker mid-flight.
    struct InterleavingCanceller {
        lifecycle: Mutex<Option<Arc<OrderLifecycle>>>,
    }

    #[async_trait::async_trait]
    impl BatchCanceller for InterleavingCanceller {
        async fn cancel_batch(&self, _batch: &CancelBatch) -> Result<(), LadderError> {
            let lc = self.lifecycle.lock().clone();
            tokio::task::yield_now().await;
            if let Some(lc) = lc {
                lc.tracker().record(tracked("0xlate", Utc::now() + chrono::Duration::minutes(5)));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_order_recorded_during_sweep_survives() {
        let canceller = Arc::new(InterleavingCanceller { lifecycle: Mutex::new(None) });
        let lc = Arc::new(
            OrderLifecycle::new(
                Arc::new(MockOrderBook::new()),
                canceller.clone(),
                test_signer(),
                Duration::from_millis(2050),
                Duration::from_secs(600),
            )
            .unwrap(),
        );
        *canceller.lifecycle.lock() = Some(lc.clone());

        let now = Utc::now();
        lc.tracker().record(tracked("0xfirst", now + chrono::Duration::minutes(1)));

        let report = lc.sweep(now).await.unwrap();

        assert_eq!(report.cancelled, 1);
        assert_eq!(report.retained, 1);
        assert!(lc.tracker().contains("0xlate"));
        assert!(!lc.tracker().contains("0xfirst"));
    }

    #[test]
    fn test_settle_delay_is_floored() {
        let lc = OrderLifecycle::new(
            Arc::new(MockOrderBook::new()),
            Arc::new(MockBatchCanceller::new()),
            test_signer(),
            Duration::from_millis(10),
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(lc.settle_delay, MIN_SETTLE_DELAY);
    }
}
