//! The outer control: an endless placement cycle and a periodic clearing
//! timer, multiplexed on one task, with a final drain on shutdown.
//!
//! Each cycle:
//! 1. Draw a random base quantity in `[min, max]`.
//! 2. Make sure the router may spend it.
//! 3. For every rung: fetch the rate, plan the rung, create the order,
//!    pause `delay_per_order`.
//! 4. Pause `cycle_delay`.
//!
//! Any error ends the cycle early, is logged, and the loop resumes after
//! `error_backoff`. Nothing in here is fatal.

use anyhow::{Context, Result};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::ladder::{random_quantity, to_wei, LadderPlanner};
use super::lifecycle::{OrderLifecycle, SweepReport};
use super::oracle::PriceOracle;
use crate::chain::allowance::AllowanceGuard;
use crate::error::LadderError;

#[derive(Debug, Clone)]
pub struct ProgramSettings {
    pub min_quantity: rust_decimal::Decimal,
    pub max_quantity: rust_decimal::Decimal,
    pub delay_per_order: Duration,
    pub cycle_delay: Duration,
    pub error_backoff: Duration,
    pub clearing_period: Duration,
}

pub struct Program {
    lifecycle: OrderLifecycle,
    oracle: PriceOracle,
    planner: LadderPlanner,
    allowance: AllowanceGuard,
    settings: ProgramSettings,
}

impl Program {
    pub fn new(
        lifecycle: OrderLifecycle,
        oracle: PriceOracle,
        planner: LadderPlanner,
        allowance: AllowanceGuard,
        settings: ProgramSettings,
    ) -> Self {
        Self {
            lifecycle,
            oracle,
            planner,
            allowance,
            settings,
        }
    }

    pub fn lifecycle(&self) -> &OrderLifecycle {
        &self.lifecycle
    }

    /// Place one full ladder. Returns the number of orders now live.
    pub async fn run_cycle(&self) -> Result<usize> {
        let quantity = {
            let mut rng = rand::thread_rng();
            random_quantity(self.settings.min_quantity, self.settings.max_quantity, &mut rng)?
        };
        let making_amount = to_wei(quantity)?;
        info!(quantity = %quantity, rungs = self.planner.order_count, "Starting ladder");

        self.allowance
            .ensure(making_amount)
            .await
            .context("ensuring allowance")?;

        let mut placed = 0;
        for rung in 1..=self.planner.order_count {
            let rate = self.oracle.rate().await.context("fetching spot rate")?;
            let intent = self.planner.plan_rung(rate, quantity, rung)?;
            info!(rung, rate = %rate, intent = %intent, "Placing rung");

            self.lifecycle
                .create_order(&intent)
                .await
                .with_context(|| format!("placing rung {rung}"))?;
            placed += 1;

            tokio::time::sleep(self.settings.delay_per_order).await;
        }

        tokio::time::sleep(self.settings.cycle_delay).await;
        Ok(placed)
    }

    /// Cycle forever. Errors are logged and followed by a fixed backoff.
    pub async fn run_cycles(&self) {
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let span = info_span!("cycle", cycle, id = %Uuid::new_v4());
            match self.run_cycle().instrument(span.clone()).await {
                Ok(placed) => span.in_scope(|| {
                    info!(placed, tracked = self.lifecycle.tracker().len(), "Cycle complete");
                }),
                Err(e) => {
                    span.in_scope(|| log_cycle_error(&e));
                    tokio::time::sleep(self.settings.error_backoff).await;
                }
            }
        }
    }

    /// Sweep on a fixed period. The first sweep happens one period after
    /// start. A sweep that overruns the period is followed by one catch-up
    /// sweep; later ticks stay on the original grid.
    pub async fn run_clearing(&self) {
        let period = self.settings.clearing_period;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = self.lifecycle.sweep(Utc::now()).await {
                warn!(kind = %e.kind(), error = %e, "Sweep failed, keeping tracked orders");
            }
        }
    }

    /// Run both activities until `shutdown` resolves, then drain.
    pub async fn run<S>(&self, shutdown: S) -> Result<SweepReport>
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.run_cycles() => {}
            _ = self.run_clearing() => {}
            _ = shutdown => {
                info!(tracked = self.lifecycle.tracker().len(), "Shutdown requested, draining");
            }
        }
        self.drain().await
    }

    /// Final best-effort sweep that cancels everything still live.
    pub async fn drain(&self) -> Result<SweepReport> {
        let report = self
            .lifecycle
            .sweep(Utc::now())
            .await
            .context("draining live orders")?;
        info!(cancelled = report.cancelled, expired = report.expired, "Drain complete");
        Ok(report)
    }
}

/// Log a cycle failure with whatever structured context the error carries.
pub fn log_cycle_error(err: &anyhow::Error) {
    match err.downcast_ref::<LadderError>() {
        Some(e) => error!(
            kind = %e.kind(),
            status = ?e.status(),
            details = ?error_details(e),
            error = %format!("{err:#}"),
            "Cycle failed"
        ),
        None => error!(error = %format!("{err:#}"), "Cycle failed"),
    }
}

fn error_details(err: &LadderError) -> Option<String> {
    match err {
        LadderError::Chain { details, .. } => details.clone(),
        LadderError::Rejected { body, .. } => Some(body.clone()),
        LadderError::Untracked { order_hash, .. } => Some(format!("untracked order {order_hash}")),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
