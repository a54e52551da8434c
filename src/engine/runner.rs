//! Per-strategy tick execution.

use super::clock::Clock;
use super::reconciler::OrderReconciler;
use super::state_machine::{PlacementVerdict, SnapshotStateMachine};
use crate::broker::{BrokerGateway, BrokerRouter};
use crate::config::ExecutionConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{FillSummary, ProgressState, Snapshot, SnapshotStatus, Strategy, StrategyStatus};
use crate::persistence::StrategyRepository;
use crate::strategy::{OrderExecutor, StrategyKind, StrategySummary};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of one tick for one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick for the strategy is still running
    Busy,
    /// No gateway serves the strategy's account
    NoBroker,
    /// Latest snapshot is FAILED
    Halted,
    /// Orders of the open round are still working
    AwaitingFills { step: u32 },
    /// Round handed to the broker, snapshot IN_PROGRESS
    Submitted { step: u32, accepted: usize },
    /// Nothing accepted, placement retried next tick
    Deferred { step: u32 },
    /// Snapshot marked FAILED
    Failed { reason: String },
    /// Tick stopped early, snapshot untouched
    Aborted { reason: String },
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickOutcome::Busy => write!(f, "skipped, previous tick still running"),
            TickOutcome::NoBroker => write!(f, "skipped, no broker for account"),
            TickOutcome::Halted => write!(f, "halted, snapshot FAILED"),
            TickOutcome::AwaitingFills { step } => write!(f, "step {step}: awaiting fills"),
            TickOutcome::Submitted { step, accepted } => {
                write!(f, "step {step}: {accepted} order(s) accepted")
            }
            TickOutcome::Deferred { step } => write!(f, "step {step}: placement deferred"),
            TickOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            TickOutcome::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

/// Drives each strategy through reconciliation, transition and placement.
pub struct StrategyRunner {
    repo: Arc<dyn StrategyRepository>,
    brokers: BrokerRouter,
    clock: Arc<dyn Clock>,
    machine: SnapshotStateMachine,
    reconciler: OrderReconciler,
    executor: OrderExecutor,
    /// One tick at a time per strategy id
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl StrategyRunner {
    pub fn new(
        repo: Arc<dyn StrategyRepository>,
        brokers: BrokerRouter,
        clock: Arc<dyn Clock>,
        machine: SnapshotStateMachine,
        execution: &ExecutionConfig,
    ) -> Self {
        Self {
            repo,
            brokers,
            clock,
            machine,
            reconciler: OrderReconciler::new(*machine.calendar(), execution.history_offset_days),
            executor: OrderExecutor::new(Duration::from_millis(execution.order_pacing_ms)),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one tick for every ACTIVE strategy, one after another.
    pub async fn run_all(&self) -> Vec<(String, TickOutcome)> {
        let strategies = match self.repo.list_strategies(Some(StrategyStatus::Active)) {
            Ok(strategies) => strategies,
            Err(e) => {
                error!(error = %e, "Failed to load active strategies");
                return Vec::new();
            }
        };

        info!(count = strategies.len(), "Running strategy tick");
        let mut outcomes = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let outcome = self.run_tick(&strategy).await;
            outcomes.push((strategy.name, outcome));
        }
        outcomes
    }

    /// Run one tick for a strategy by name, whatever its status.
    pub async fn run_named(&self, name: &str) -> EngineResult<TickOutcome> {
        let strategy = self
            .repo
            .get_strategy(name)?
            .ok_or_else(|| EngineError::NotFound(format!("strategy {name}")))?;
        Ok(self.run_tick(&strategy).await)
    }

    /// Run one tick. Errors are classified and logged, never propagated.
    pub async fn run_tick(&self, strategy: &Strategy) -> TickOutcome {
        let lock = self.lock_for(strategy.id);
        let Ok(_guard) = lock.try_lock() else {
            warn!(strategy = %strategy.name, "Previous tick still running, skipping");
            return TickOutcome::Busy;
        };

        let mut open = None;
        match self.execute(strategy, &mut open).await {
            Ok(outcome) => {
                info!(strategy = %strategy.name, %outcome, "Tick finished");
                outcome
            }
            Err(e) => self.handle_failure(strategy, open, e),
        }
    }

    /// Variant-aware report on a strategy's latest snapshot.
    pub fn summary(&self, name: &str) -> EngineResult<StrategySummary> {
        let strategy = self
            .repo
            .get_strategy(name)?
            .ok_or_else(|| EngineError::NotFound(format!("strategy {name}")))?;
        let snapshot = self
            .repo
            .get_latest_snapshot(strategy.id)?
            .ok_or_else(|| EngineError::NotFound(format!("snapshot of strategy {name}")))?;
        let kind = StrategyKind::from_strategy(&strategy)?;

        let latest_orders = match snapshot.id {
            Some(id) => self.repo.list_orders(id)?,
            None => Vec::new(),
        };
        let cycle_orders = self.repo.list_cycle_orders(strategy.id, snapshot.cycle)?;
        Ok(kind.summarize(&strategy, &snapshot, &latest_orders, &cycle_orders))
    }

    fn lock_for(&self, strategy_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(strategy_id).or_default().clone()
    }

    /// `open` tracks the latest persisted open snapshot so a failure can be
    /// recorded on it.
    async fn execute(
        &self,
        strategy: &Strategy,
        open: &mut Option<Snapshot>,
    ) -> EngineResult<TickOutcome> {
        let latest = self.repo.get_latest_snapshot(strategy.id)?;
        if let Some(snapshot) = latest.as_ref().filter(|s| s.status == SnapshotStatus::Failed) {
            warn!(
                strategy = %strategy.name,
                step = snapshot.step,
                last_error = ?snapshot.last_error,
                "Snapshot FAILED, strategy needs attention"
            );
            return Ok(TickOutcome::Halted);
        }
        *open = latest.clone().filter(|s| s.status.is_open());

        let kind = StrategyKind::from_strategy(strategy)?;
        let ticker = kind.ticker().to_string();
        let Some(broker) = self.brokers.resolve(&strategy.account) else {
            error!(strategy = %strategy.name, account = %strategy.account, "No broker for account");
            return Ok(TickOutcome::NoBroker);
        };

        let price = broker.get_price(&ticker).await?.price;
        debug!(strategy = %strategy.name, %ticker, %price, "Price fetched");

        let mut snapshot = match latest {
            None => self.bootstrap(strategy, &kind, price)?,
            Some(closing) if !closing.status.is_open() => self.roll(&kind, closing, price)?,
            Some(snapshot) => snapshot,
        };
        *open = Some(snapshot.clone());

        if snapshot.status == SnapshotStatus::InProgress {
            let report = self
                .reconciler
                .reconcile(
                    broker.as_ref(),
                    self.repo.as_ref(),
                    self.clock.as_ref(),
                    &ticker,
                    &snapshot,
                )
                .await?;

            let now = self.clock.now();
            if self
                .machine
                .boundary_reached(kind.boundary(), report.all_finalized, &snapshot, now)
            {
                snapshot = self.roll(&kind, snapshot, price)?;
                *open = Some(snapshot.clone());
            } else if report.all_finalized && kind.trades_within_round() {
                let orders = self.repo.list_orders(snapshot.require_id()?)?;
                let working =
                    kind.working_state(&snapshot.progress, &FillSummary::from_orders(&orders), price)?;
                debug!(strategy = %strategy.name, step = snapshot.step, "Placing orders within open round");
                return self
                    .place(&kind, broker.as_ref(), &mut snapshot, &working, price)
                    .await;
            } else {
                return Ok(TickOutcome::AwaitingFills {
                    step: snapshot.step,
                });
            }
        }

        let progress = snapshot.progress.clone();
        self.place(&kind, broker.as_ref(), &mut snapshot, &progress, price)
            .await
    }

    /// First tick: persist INIT, then hand over to the first PENDING snapshot.
    fn bootstrap(
        &self,
        strategy: &Strategy,
        kind: &StrategyKind,
        price: Decimal,
    ) -> EngineResult<Snapshot> {
        let mut init = self
            .machine
            .initial_snapshot(strategy.id, kind, self.clock.now());
        self.repo.save_snapshot(&mut init)?;
        info!(strategy = %strategy.name, variant = %kind.variant(), "Strategy initialized");
        self.roll(kind, init, price)
    }

    /// Close `closing` and persist it together with its PENDING successor.
    fn roll(
        &self,
        kind: &StrategyKind,
        mut closing: Snapshot,
        price: Decimal,
    ) -> EngineResult<Snapshot> {
        let orders = match closing.id {
            Some(id) => self.repo.list_orders(id)?,
            None => Vec::new(),
        };
        let mut next = self
            .machine
            .successor(kind, &mut closing, &orders, price, self.clock.now())?;
        self.repo.roll_snapshot(&mut closing, &mut next)?;

        info!(
            strategy_id = next.strategy_id,
            closed_step = closing.step,
            step = next.step,
            cycle = next.cycle,
            equity = %next.progress.equity(),
            "Snapshot rolled over"
        );
        Ok(next)
    }

    async fn place(
        &self,
        kind: &StrategyKind,
        broker: &dyn BrokerGateway,
        snapshot: &mut Snapshot,
        progress: &ProgressState,
        price: Decimal,
    ) -> EngineResult<TickOutcome> {
        let intents = kind.generate_orders(progress, price)?;
        let report = self
            .executor
            .place_orders(
                broker,
                self.repo.as_ref(),
                self.clock.as_ref(),
                kind.ticker(),
                snapshot.require_id()?,
                &intents,
            )
            .await?;

        let verdict = self
            .machine
            .apply_placement(snapshot, &report, self.clock.now());
        self.repo.save_snapshot(snapshot)?;

        Ok(match verdict {
            PlacementVerdict::Started => TickOutcome::Submitted {
                step: snapshot.step,
                accepted: report.accepted,
            },
            PlacementVerdict::Deferred => TickOutcome::Deferred {
                step: snapshot.step,
            },
            PlacementVerdict::Failed(reason) => TickOutcome::Failed { reason },
        })
    }

    fn handle_failure(
        &self,
        strategy: &Strategy,
        open: Option<Snapshot>,
        err: EngineError,
    ) -> TickOutcome {
        let reason = err.to_string();
        if err.is_transient() {
            warn!(strategy = %strategy.name, error = %reason, "Tick aborted, retrying next tick");
            return TickOutcome::Aborted { reason };
        }

        match open {
            Some(mut snapshot) if err.marks_snapshot_failed() => {
                snapshot.fail(reason.clone(), self.clock.now());
                if let Err(e) = self.repo.save_snapshot(&mut snapshot) {
                    error!(strategy = %strategy.name, error = %e, "Failed to record snapshot failure");
                }
                error!(strategy = %strategy.name, step = snapshot.step, error = %reason, "Snapshot FAILED");
                TickOutcome::Failed { reason }
            }
            _ => {
                error!(strategy = %strategy.name, error = %reason, "Tick aborted");
                TickOutcome::Aborted { reason }
            }
        }
    }
}
