//! Daily strategy summary.

use crate::model::{OrderRecord, OrderSide, Snapshot, SnapshotStatus, Strategy, StrategyVariant};
use crate::utils::decimal::{round_cents, safe_div};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

/// Order statistics for one side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SideStats {
    pub orders: usize,
    pub filled_orders: usize,
    pub filled_quantity: Decimal,
    pub filled_value: Decimal,
}

impl SideStats {
    pub fn avg_fill_price(&self) -> Decimal {
        round_cents(safe_div(self.filled_value, self.filled_quantity))
    }
}

/// Buy and sell statistics over a set of orders.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrderStats {
    pub buy: SideStats,
    pub sell: SideStats,
}

impl OrderStats {
    pub fn from_orders(orders: &[OrderRecord]) -> Self {
        let mut stats = Self::default();
        for order in orders {
            let side = match order.side {
                OrderSide::Buy => &mut stats.buy,
                OrderSide::Sell => &mut stats.sell,
            };
            side.orders += 1;
            if order.status.has_fill() {
                side.filled_orders += 1;
                side.filled_quantity += order.filled_quantity;
                side.filled_value += order.filled_value();
            }
        }
        stats
    }
}

/// Point-in-time report on a strategy.
#[derive(Debug, Clone)]
pub struct StrategySummary {
    pub strategy: String,
    pub ticker: String,
    pub variant: StrategyVariant,
    pub cycle: u32,
    pub step: u32,
    pub status: SnapshotStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Variant-specific state, label and value
    pub state: Vec<(&'static str, String)>,
    /// Orders of the latest snapshot
    pub latest: OrderStats,
    /// Orders of every snapshot in the current cycle
    pub cycle_totals: OrderStats,
}

impl StrategySummary {
    pub(crate) fn new(
        strategy: &Strategy,
        ticker: &str,
        snapshot: &Snapshot,
        state: Vec<(&'static str, String)>,
        latest_orders: &[OrderRecord],
        cycle_orders: &[OrderRecord],
    ) -> Self {
        Self {
            strategy: strategy.name.clone(),
            ticker: ticker.to_string(),
            variant: strategy.variant,
            cycle: snapshot.cycle,
            step: snapshot.step,
            status: snapshot.status,
            executed_at: snapshot.executed_at,
            last_error: snapshot.last_error.clone(),
            state,
            latest: OrderStats::from_orders(latest_orders),
            cycle_totals: OrderStats::from_orders(cycle_orders),
        }
    }
}

fn write_side(f: &mut fmt::Formatter<'_>, label: &str, side: &SideStats) -> fmt::Result {
    writeln!(
        f,
        "  {label:<5} orders {:>3}  filled {:>3}  qty {:>8}  value {:>12}  avg {:>10}",
        side.orders,
        side.filled_orders,
        side.filled_quantity.normalize(),
        round_cents(side.filled_value),
        side.avg_fill_price()
    )
}

impl fmt::Display for StrategySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} [{} {}] cycle {} step {} - {}",
            self.strategy, self.variant, self.ticker, self.cycle, self.step, self.status
        )?;
        if let Some(executed_at) = self.executed_at {
            writeln!(f, "  executed at {}", executed_at.to_rfc3339())?;
        }
        if let Some(error) = &self.last_error {
            writeln!(f, "  last error: {error}")?;
        }
        for (label, value) in &self.state {
            writeln!(f, "  {label:<16} {value}")?;
        }
        writeln!(f, "latest round")?;
        write_side(f, "buy", &self.latest.buy)?;
        write_side(f, "sell", &self.latest.sell)?;
        writeln!(f, "cycle {} total", self.cycle)?;
        write_side(f, "buy", &self.cycle_totals.buy)?;
        write_side(f, "sell", &self.cycle_totals.sell)
    }
}
