//! SQLite ledger behind the paper broker.
//!
//! Paper orders and their fills outlive the process, and order ids come from
//! the table's AUTOINCREMENT key so they never repeat across runs.

use super::paper::PaperOrder;
use super::types::FillRecord;
use crate::model::{OrderKind, OrderSide, OrderStatus};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub(super) struct PaperLedger {
    conn: Mutex<Connection>,
}

/// Raw `paper_orders` row, all text columns unparsed.
struct LedgerRow {
    id: i64,
    ticker: String,
    side: String,
    kind: String,
    quantity: String,
    limit_price: String,
    trade_date: String,
    fill_status: Option<String>,
    filled_quantity: Option<String>,
    filled_amount: Option<String>,
}

impl PaperLedger {
    pub(super) fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open paper ledger at {path:?}"))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS paper_orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                side TEXT NOT NULL,
                kind TEXT NOT NULL,
                quantity TEXT NOT NULL,
                limit_price TEXT NOT NULL,
                trade_date TEXT NOT NULL,
                fill_status TEXT,
                filled_quantity TEXT,
                filled_amount TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_paper_orders_ticker ON paper_orders(ticker, trade_date);
            "#,
        )
        .context("Failed to create paper ledger schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("paper ledger lock poisoned"))
    }

    /// Store a new order and return its id.
    pub(super) fn insert(&self, order: &PaperOrder) -> Result<i64> {
        let conn = self.conn()?;
        let fill = order.fill.as_ref();
        conn.execute(
            r#"
            INSERT INTO paper_orders (ticker, side, kind, quantity, limit_price, trade_date,
                                      fill_status, filled_quantity, filled_amount)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                order.ticker,
                order.side.as_str(),
                order.kind.as_str(),
                order.quantity.to_string(),
                order.limit.to_string(),
                order.date.to_string(),
                fill.map(|f| f.status.as_str()),
                fill.map(|f| f.filled_quantity.to_string()),
                fill.map(|f| f.filled_amount.to_string()),
            ],
        )
        .with_context(|| format!("Failed to record paper order for {}", order.ticker))?;
        Ok(conn.last_insert_rowid())
    }

    pub(super) fn record_fill(&self, fill: &FillRecord) -> Result<()> {
        let id: i64 = fill
            .order_id
            .parse()
            .with_context(|| format!("paper order id {} is not numeric", fill.order_id))?;
        let changed = self.conn()?.execute(
            "UPDATE paper_orders SET fill_status = ?1, filled_quantity = ?2, filled_amount = ?3 \
             WHERE id = ?4",
            params![
                fill.status.as_str(),
                fill.filled_quantity.to_string(),
                fill.filled_amount.to_string(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(anyhow!("paper order {} not in ledger", fill.order_id));
        }
        Ok(())
    }

    /// Every stored order, oldest first.
    pub(super) fn load(&self) -> Result<Vec<PaperOrder>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, ticker, side, kind, quantity, limit_price, trade_date, fill_status, \
             filled_quantity, filled_amount FROM paper_orders ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LedgerRow {
                    id: row.get(0)?,
                    ticker: row.get(1)?,
                    side: row.get(2)?,
                    kind: row.get(3)?,
                    quantity: row.get(4)?,
                    limit_price: row.get(5)?,
                    trade_date: row.get(6)?,
                    fill_status: row.get(7)?,
                    filled_quantity: row.get(8)?,
                    filled_amount: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let orders = rows
            .into_iter()
            .map(LedgerRow::into_order)
            .collect::<Result<Vec<_>>>()?;
        debug!(orders = orders.len(), "Paper ledger loaded");
        Ok(orders)
    }
}

impl LedgerRow {
    fn into_order(self) -> Result<PaperOrder> {
        let order_id = self.id.to_string();
        let context = || format!("corrupt paper order {}", self.id);

        let fill = match (self.fill_status, self.filled_quantity, self.filled_amount) {
            (Some(status), Some(quantity), Some(amount)) => Some(FillRecord {
                order_id: order_id.clone(),
                status: status.parse::<OrderStatus>().with_context(context)?,
                filled_quantity: quantity.parse::<Decimal>().with_context(context)?,
                filled_amount: amount.parse::<Decimal>().with_context(context)?,
            }),
            _ => None,
        };

        Ok(PaperOrder {
            order_id,
            side: self.side.parse::<OrderSide>().with_context(context)?,
            kind: self.kind.parse::<OrderKind>().with_context(context)?,
            quantity: self.quantity.parse::<Decimal>().with_context(context)?,
            limit: self.limit_price.parse::<Decimal>().with_context(context)?,
            date: self.trade_date.parse::<NaiveDate>().with_context(context)?,
            ticker: self.ticker,
            fill,
        })
    }
}
