//! Paper broker.
//!
//! Orders fill immediately against the configured price: buys when the price
//! is at or below the limit, sells when at or above, market-on-close always.
//! With auto-fill disabled orders stay open (absent from history) until
//! [`PaperBroker::settle_open_orders`] is called. Built with
//! [`PaperBroker::with_ledger`], orders and fills are kept in SQLite and
//! reloaded by the next process; otherwise they live in memory only.

use super::paper_ledger::PaperLedger;
use super::traits::BrokerGateway;
use super::types::{FillRecord, OrderOutcome, PriceQuote};
use crate::engine::Clock;
use crate::error::{EngineError, EngineResult};
use crate::model::{OrderKind, OrderSide, OrderStatus};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub(super) struct PaperOrder {
    pub(super) order_id: String,
    pub(super) ticker: String,
    pub(super) side: OrderSide,
    pub(super) kind: OrderKind,
    pub(super) quantity: Decimal,
    pub(super) limit: Decimal,
    /// Local trading date of submission
    pub(super) date: NaiveDate,
    pub(super) fill: Option<FillRecord>,
}

/// Simulated brokerage account.
pub struct PaperBroker {
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
    orders: Arc<RwLock<Vec<PaperOrder>>>,
    order_id_counter: AtomicU64,
    market_open: AtomicBool,
    auto_fill: AtomicBool,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
    ledger: Option<PaperLedger>,
}

impl PaperBroker {
    /// Broker whose orders are forgotten with the process.
    pub fn new(clock: Arc<dyn Clock>, utc_offset: FixedOffset) -> Self {
        Self::build(clock, utc_offset, Vec::new(), None)
    }

    /// Broker backed by a `paper_orders` table in `db_path`, reloading earlier orders.
    pub fn with_ledger<P: AsRef<Path>>(
        clock: Arc<dyn Clock>,
        utc_offset: FixedOffset,
        db_path: P,
    ) -> anyhow::Result<Self> {
        let ledger = PaperLedger::open(db_path)?;
        let orders = ledger.load()?;
        let open = orders.iter().filter(|o| o.fill.is_none()).count();
        info!(orders = orders.len(), open, "Paper ledger restored");
        Ok(Self::build(clock, utc_offset, orders, Some(ledger)))
    }

    fn build(
        clock: Arc<dyn Clock>,
        utc_offset: FixedOffset,
        orders: Vec<PaperOrder>,
        ledger: Option<PaperLedger>,
    ) -> Self {
        Self {
            prices: Arc::new(RwLock::new(HashMap::new())),
            orders: Arc::new(RwLock::new(orders)),
            order_id_counter: AtomicU64::new(1),
            market_open: AtomicBool::new(true),
            auto_fill: AtomicBool::new(true),
            clock,
            utc_offset,
            ledger,
        }
    }

    pub async fn set_price(&self, ticker: &str, price: Decimal) {
        self.prices.write().await.insert(ticker.to_string(), price);
    }

    pub async fn set_prices(&self, prices: HashMap<String, Decimal>) {
        self.prices.write().await.extend(prices);
    }

    pub fn set_market_open(&self, open: bool) {
        self.market_open.store(open, Ordering::SeqCst);
    }

    /// Whether new orders are settled at submission.
    pub fn set_auto_fill(&self, enabled: bool) {
        self.auto_fill.store(enabled, Ordering::SeqCst);
    }

    /// Number of orders accepted so far.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Settle every open order against the current prices; returns how many settled.
    pub async fn settle_open_orders(&self) -> EngineResult<usize> {
        let prices = self.prices.read().await;
        let mut orders = self.orders.write().await;
        let mut settled = 0;
        for order in orders.iter_mut().filter(|o| o.fill.is_none()) {
            if let Some(&price) = prices.get(&order.ticker) {
                let fill = Self::match_order(order, price);
                if let Some(ledger) = &self.ledger {
                    ledger.record_fill(&fill)?;
                }
                order.fill = Some(fill);
                settled += 1;
            }
        }
        if settled > 0 {
            info!(settled, "Paper orders settled");
        }
        Ok(settled)
    }

    /// Ledger row id when persisted, process counter otherwise.
    fn assign_order_id(&self, order: &PaperOrder) -> EngineResult<String> {
        let id = match &self.ledger {
            Some(ledger) => ledger.insert(order)?.to_string(),
            None => self.order_id_counter.fetch_add(1, Ordering::SeqCst).to_string(),
        };
        Ok(id)
    }

    fn match_order(order: &PaperOrder, price: Decimal) -> FillRecord {
        let order_id = order.order_id.clone();
        let crosses = match (order.kind, order.side) {
            (OrderKind::Moc, _) => true,
            (_, OrderSide::Buy) => price <= order.limit,
            (_, OrderSide::Sell) => price >= order.limit,
        };

        if crosses {
            FillRecord {
                order_id,
                status: OrderStatus::Filled,
                filled_quantity: order.quantity,
                filled_amount: order.quantity * price,
            }
        } else {
            FillRecord {
                order_id,
                status: OrderStatus::Unfilled,
                filled_quantity: Decimal::ZERO,
                filled_amount: Decimal::ZERO,
            }
        }
    }

    async fn submit(
        &self,
        ticker: &str,
        side: OrderSide,
        quantity: Decimal,
        limit: Decimal,
        kind: OrderKind,
    ) -> EngineResult<OrderOutcome> {
        if !self.market_open.load(Ordering::SeqCst) {
            return Ok(OrderOutcome::market_closed("market is closed today"));
        }
        if quantity <= Decimal::ZERO {
            return Ok(OrderOutcome::rejected("INVALID_QTY", "quantity must be positive"));
        }

        let Some(price) = self.prices.read().await.get(ticker).copied() else {
            return Ok(OrderOutcome::rejected(
                "NO_QUOTE",
                format!("no quote for {ticker}"),
            ));
        };

        let mut order = PaperOrder {
            order_id: String::new(),
            ticker: ticker.to_string(),
            side,
            kind,
            quantity,
            limit,
            date: self.clock.now().with_timezone(&self.utc_offset).date_naive(),
            fill: None,
        };
        if self.auto_fill.load(Ordering::SeqCst) {
            order.fill = Some(Self::match_order(&order, price));
        }
        let order_id = self.assign_order_id(&order)?;
        order.order_id = order_id.clone();
        if let Some(fill) = order.fill.as_mut() {
            fill.order_id = order_id.clone();
        }

        info!(
            %order_id,
            %ticker,
            side = %side,
            kind = %kind,
            %quantity,
            %limit,
            market_price = %price,
            status = ?order.fill.as_ref().map(|f| f.status),
            "Paper order accepted"
        );
        self.orders.write().await.push(order);

        Ok(OrderOutcome::accepted(order_id))
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn get_price(&self, ticker: &str) -> EngineResult<PriceQuote> {
        self.prices
            .read()
            .await
            .get(ticker)
            .copied()
            .map(PriceQuote::flat)
            .ok_or_else(|| EngineError::TransientNetwork(format!("no paper quote for {ticker}")))
    }

    async fn buy_order(
        &self,
        ticker: &str,
        quantity: Decimal,
        price: Decimal,
        kind: OrderKind,
    ) -> EngineResult<OrderOutcome> {
        self.submit(ticker, OrderSide::Buy, quantity, price, kind).await
    }

    async fn sell_order(
        &self,
        ticker: &str,
        quantity: Decimal,
        price: Decimal,
        kind: OrderKind,
    ) -> EngineResult<OrderOutcome> {
        self.submit(ticker, OrderSide::Sell, quantity, price, kind).await
    }

    async fn get_transaction_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<FillRecord>> {
        let orders = self.orders.read().await;
        let history: Vec<FillRecord> = orders
            .iter()
            .filter(|o| o.ticker == ticker && o.date >= start && o.date <= end)
            .filter_map(|o| o.fill.clone())
            .collect();

        debug!(%ticker, %start, %end, records = history.len(), "Paper history served");
        Ok(history)
    }
}
