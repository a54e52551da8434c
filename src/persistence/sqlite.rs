//! SQLite-backed repository.
//!
//! Decimals are stored as TEXT to keep exact values, timestamps as RFC 3339,
//! snapshot progress as tagged JSON next to its schema version.

use super::StrategyRepository;
use crate::model::{
    NewStrategy, OrderRecord, ProgressState, Snapshot, Strategy, StrategyParams, StrategyStatus,
    PROGRESS_VERSION,
};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const STRATEGY_COLUMNS: &str =
    "id, name, account, variant, status, params, description, created_at, updated_at";

const SNAPSHOT_COLUMNS: &str = "id, strategy_id, cycle, step, status, progress, progress_version, \
     last_error, created_at, updated_at, executed_at";

const ORDER_COLUMNS: &str = "o.id, o.snapshot_id, o.broker_order_id, o.symbol, o.side, o.kind, \
     o.tag, o.status, o.quantity, o.price, o.filled_quantity, o.filled_price, o.error_message, \
     o.ordered_at, o.updated_at";

/// Repository over a single SQLite connection.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database and apply the schema. `":memory:"` works for tests.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {parent:?}"))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {path:?}"))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;

        info!("Strategy repository initialized at {:?}", path);
        Ok(repo)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS strategies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                account TEXT NOT NULL,
                variant TEXT NOT NULL,
                status TEXT NOT NULL,
                params TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS strategy_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id INTEGER NOT NULL REFERENCES strategies(id) ON DELETE CASCADE,
                cycle INTEGER NOT NULL,
                step INTEGER NOT NULL,
                status TEXT NOT NULL,
                progress TEXT NOT NULL,
                progress_version INTEGER NOT NULL,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                executed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_strategy ON strategy_snapshots(strategy_id, step);
            -- At most one open snapshot per strategy
            CREATE UNIQUE INDEX IF NOT EXISTS idx_snapshots_open
                ON strategy_snapshots(strategy_id)
                WHERE status IN ('PENDING', 'IN_PROGRESS');

            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                snapshot_id INTEGER NOT NULL REFERENCES strategy_snapshots(id) ON DELETE CASCADE,
                broker_order_id TEXT UNIQUE,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                kind TEXT NOT NULL,
                tag TEXT NOT NULL,
                status TEXT NOT NULL,
                quantity TEXT NOT NULL,
                price TEXT NOT NULL,
                filled_quantity TEXT NOT NULL,
                filled_price TEXT NOT NULL,
                error_message TEXT,
                ordered_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_snapshot ON orders(snapshot_id);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    fn query_strategies(
        conn: &Connection,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Strategy>> {
        let sql = format!("SELECT {STRATEGY_COLUMNS} FROM strategies {filter} ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let strategies = stmt
            .query_map(args, strategy_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(strategies)
    }

    fn query_snapshots(
        conn: &Connection,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Snapshot>> {
        let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM strategy_snapshots {filter}");
        let mut stmt = conn.prepare(&sql)?;
        let snapshots = stmt
            .query_map(args, snapshot_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(snapshots)
    }

    fn query_orders(conn: &Connection, filter: &str, args: impl rusqlite::Params) -> Result<Vec<OrderRecord>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders o {filter} ORDER BY o.id");
        let mut stmt = conn.prepare(&sql)?;
        let orders = stmt
            .query_map(args, order_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }
}

impl StrategyRepository for SqliteRepository {
    fn create_strategy(&self, new: &NewStrategy, now: DateTime<Utc>) -> Result<Strategy> {
        let conn = self.conn()?;
        let params_json = serde_json::to_string(&new.params)?;
        conn.execute(
            r#"
            INSERT INTO strategies (name, account, variant, status, params, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
            params![
                new.name,
                new.account,
                new.variant.as_str(),
                StrategyStatus::Active.as_str(),
                params_json,
                new.description,
                now.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to create strategy {}", new.name))?;

        let id = conn.last_insert_rowid();
        info!(strategy = %new.name, id, variant = %new.variant, "Strategy created");

        Ok(Strategy {
            id,
            name: new.name.clone(),
            account: new.account.clone(),
            variant: new.variant,
            status: StrategyStatus::Active,
            params: new.params.clone(),
            description: new.description.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    fn get_strategy(&self, name: &str) -> Result<Option<Strategy>> {
        let conn = self.conn()?;
        Ok(Self::query_strategies(&conn, "WHERE name = ?1", [name])?.into_iter().next())
    }

    fn list_strategies(&self, status: Option<StrategyStatus>) -> Result<Vec<Strategy>> {
        let conn = self.conn()?;
        match status {
            Some(status) => Self::query_strategies(&conn, "WHERE status = ?1", [status.as_str()]),
            None => Self::query_strategies(&conn, "", []),
        }
    }

    fn set_strategy_status(&self, id: i64, status: StrategyStatus, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE strategies SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now.to_rfc3339(), id],
        )?;
        if changed == 0 {
            bail!("strategy {id} not found");
        }
        info!(id, status = %status, "Strategy status changed");
        Ok(())
    }

    fn delete_strategy(&self, id: i64) -> Result<()> {
        let changed = self
            .conn()?
            .execute("DELETE FROM strategies WHERE id = ?1", [id])?;
        if changed == 0 {
            bail!("strategy {id} not found");
        }
        info!(id, "Strategy deleted with its snapshots and orders");
        Ok(())
    }

    fn get_latest_snapshot(&self, strategy_id: i64) -> Result<Option<Snapshot>> {
        let conn = self.conn()?;
        Ok(Self::query_snapshots(
            &conn,
            "WHERE strategy_id = ?1 ORDER BY step DESC, id DESC LIMIT 1",
            [strategy_id],
        )?
        .into_iter()
        .next())
    }

    fn get_snapshot(&self, id: i64) -> Result<Option<Snapshot>> {
        let conn = self.conn()?;
        Ok(Self::query_snapshots(&conn, "WHERE id = ?1", [id])?.into_iter().next())
    }

    fn list_snapshots(&self, strategy_id: i64) -> Result<Vec<Snapshot>> {
        let conn = self.conn()?;
        Self::query_snapshots(&conn, "WHERE strategy_id = ?1 ORDER BY step, id", [strategy_id])
    }

    fn save_snapshot(&self, snapshot: &mut Snapshot) -> Result<()> {
        let conn = self.conn()?;
        write_snapshot(&conn, snapshot)
    }

    fn roll_snapshot(&self, closing: &mut Snapshot, opening: &mut Snapshot) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        write_snapshot(&tx, closing)?;
        write_snapshot(&tx, opening)?;
        tx.commit()?;
        Ok(())
    }

    fn list_orders(&self, snapshot_id: i64) -> Result<Vec<OrderRecord>> {
        let conn = self.conn()?;
        Self::query_orders(&conn, "WHERE o.snapshot_id = ?1", [snapshot_id])
    }

    fn list_cycle_orders(&self, strategy_id: i64, cycle: u32) -> Result<Vec<OrderRecord>> {
        let conn = self.conn()?;
        Self::query_orders(
            &conn,
            "JOIN strategy_snapshots s ON s.id = o.snapshot_id WHERE s.strategy_id = ?1 AND s.cycle = ?2",
            params![strategy_id, cycle],
        )
    }

    fn save_order(&self, order: &mut OrderRecord) -> Result<()> {
        let conn = self.conn()?;
        write_order(&conn, order)
    }

    fn save_orders(&self, orders: &mut [OrderRecord]) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        for order in orders.iter_mut() {
            write_order(&tx, order)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn write_snapshot(conn: &Connection, snapshot: &mut Snapshot) -> Result<()> {
    let progress = serde_json::to_string(&snapshot.progress)?;
    let executed_at = snapshot.executed_at.map(|t| t.to_rfc3339());

    match snapshot.id {
        None => {
            conn.execute(
                r#"
                INSERT INTO strategy_snapshots (strategy_id, cycle, step, status, progress, progress_version,
                                                last_error, created_at, updated_at, executed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    snapshot.strategy_id,
                    snapshot.cycle,
                    snapshot.step,
                    snapshot.status.as_str(),
                    progress,
                    PROGRESS_VERSION,
                    snapshot.last_error,
                    snapshot.created_at.to_rfc3339(),
                    snapshot.updated_at.to_rfc3339(),
                    executed_at,
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert snapshot step {} of strategy {}",
                    snapshot.step, snapshot.strategy_id
                )
            })?;
            snapshot.id = Some(conn.last_insert_rowid());
        }
        Some(id) => {
            conn.execute(
                r#"
                UPDATE strategy_snapshots
                SET cycle = ?1, step = ?2, status = ?3, progress = ?4, progress_version = ?5,
                    last_error = ?6, updated_at = ?7, executed_at = ?8
                WHERE id = ?9
                "#,
                params![
                    snapshot.cycle,
                    snapshot.step,
                    snapshot.status.as_str(),
                    progress,
                    PROGRESS_VERSION,
                    snapshot.last_error,
                    snapshot.updated_at.to_rfc3339(),
                    executed_at,
                    id,
                ],
            )
            .with_context(|| format!("Failed to update snapshot {id}"))?;
        }
    }

    debug!(
        snapshot_id = ?snapshot.id,
        strategy_id = snapshot.strategy_id,
        status = %snapshot.status,
        "Snapshot saved"
    );
    Ok(())
}

fn write_order(conn: &Connection, order: &mut OrderRecord) -> Result<()> {
    match order.id {
        None => {
            conn.execute(
                r#"
                INSERT INTO orders (snapshot_id, broker_order_id, symbol, side, kind, tag, status,
                                    quantity, price, filled_quantity, filled_price, error_message,
                                    ordered_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    order.snapshot_id,
                    order.broker_order_id,
                    order.symbol,
                    order.side.as_str(),
                    order.kind.as_str(),
                    order.tag.as_str(),
                    order.status.as_str(),
                    order.quantity.to_string(),
                    order.price.to_string(),
                    order.filled_quantity.to_string(),
                    order.filled_price.to_string(),
                    order.error_message,
                    order.ordered_at.to_rfc3339(),
                    order.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("Failed to insert order {:?}", order.broker_order_id))?;
            order.id = Some(conn.last_insert_rowid());
        }
        Some(id) => {
            conn.execute(
                r#"
                UPDATE orders
                SET status = ?1, filled_quantity = ?2, filled_price = ?3, error_message = ?4,
                    updated_at = ?5
                WHERE id = ?6
                "#,
                params![
                    order.status.as_str(),
                    order.filled_quantity.to_string(),
                    order.filled_price.to_string(),
                    order.error_message,
                    order.updated_at.to_rfc3339(),
                    id,
                ],
            )
            .with_context(|| format!("Failed to update order {id}"))?;
        }
    }
    Ok(())
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    parsed(row, idx)
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn strategy_from_row(row: &Row<'_>) -> rusqlite::Result<Strategy> {
    let params: StrategyParams = json(row, 5)?;
    Ok(Strategy {
        id: row.get(0)?,
        name: row.get(1)?,
        account: row.get(2)?,
        variant: parsed(row, 3)?,
        status: parsed(row, 4)?,
        params,
        description: row.get(6)?,
        created_at: timestamp(row, 7)?,
        updated_at: timestamp(row, 8)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    let version: u32 = row.get(6)?;
    if version > PROGRESS_VERSION {
        return Err(conversion_error(
            6,
            crate::error::EngineError::InvalidState(format!(
                "progress version {version} is newer than supported {PROGRESS_VERSION}"
            )),
        ));
    }
    let progress: ProgressState = json(row, 5)?;

    Ok(Snapshot {
        id: row.get(0)?,
        strategy_id: row.get(1)?,
        cycle: row.get(2)?,
        step: row.get(3)?,
        status: parsed(row, 4)?,
        progress,
        last_error: row.get(7)?,
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
        executed_at: optional_timestamp(row, 10)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<OrderRecord> {
    Ok(OrderRecord {
        id: row.get(0)?,
        snapshot_id: row.get(1)?,
        broker_order_id: row.get(2)?,
        symbol: row.get(3)?,
        side: parsed(row, 4)?,
        kind: parsed(row, 5)?,
        tag: parsed(row, 6)?,
        status: parsed(row, 7)?,
        quantity: decimal(row, 8)?,
        price: decimal(row, 9)?,
        filled_quantity: decimal(row, 10)?,
        filled_price: decimal(row, 11)?,
        error_message: row.get(12)?,
        ordered_at: timestamp(row, 13)?,
        updated_at: timestamp(row, 14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AveragingState, OrderKind, OrderSide, OrderStatus, OrderTag, SnapshotStatus,
        StrategyVariant,
    };
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn repo() -> SqliteRepository {
        SqliteRepository::new(":memory:").unwrap()
    }

    fn new_strategy(name: &str) -> NewStrategy {
        NewStrategy {
            name: name.to_string(),
            account: "12345678-01".to_string(),
            variant: StrategyVariant::Averaging,
            params: json!({"ticker": "TQQQ", "division": 20})
                .as_object()
                .cloned()
                .unwrap(),
            description: Some("test".to_string()),
        }
    }

    fn progress() -> ProgressState {
        ProgressState::Averaging(AveragingState {
            t: dec!(1.25),
            star: dec!(0.18),
            investment: dec!(10000),
            unit_investment: dec!(500),
            quantity: dec!(6),
            avg_price: dec!(104.17),
            balance: dec!(9374.98),
            equity: dec!(10000.00),
            daily_profit: Decimal::ZERO,
        })
    }

    fn order(snapshot_id: i64, broker_id: Option<&str>) -> OrderRecord {
        let now = Utc::now();
        OrderRecord {
            id: None,
            snapshot_id,
            broker_order_id: broker_id.map(str::to_string),
            symbol: "TQQQ".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Loc,
            tag: OrderTag::StarBuy,
            status: OrderStatus::Submitted,
            quantity: dec!(3),
            price: dec!(101.25),
            filled_quantity: Decimal::ZERO,
            filled_price: Decimal::ZERO,
            error_message: None,
            ordered_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_strategy_crud() {
        let repo = repo();
        let created = repo.create_strategy(&new_strategy("alpha"), Utc::now()).unwrap();
        repo.create_strategy(&new_strategy("beta"), Utc::now()).unwrap();
        assert!(repo.create_strategy(&new_strategy("alpha"), Utc::now()).is_err());

        let loaded = repo.get_strategy("alpha").unwrap().unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.ticker().unwrap(), "TQQQ");
        assert_eq!(loaded.params["division"], 20);

        repo.set_strategy_status(created.id, StrategyStatus::Paused, Utc::now()).unwrap();
        let active = repo.list_strategies(Some(StrategyStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "beta");
        assert_eq!(repo.list_strategies(None).unwrap().len(), 2);
        assert!(repo.set_strategy_status(999, StrategyStatus::Active, Utc::now()).is_err());
    }

    #[test]
    fn test_snapshot_round_trip_and_latest() {
        let repo = repo();
        let strategy = repo.create_strategy(&new_strategy("alpha"), Utc::now()).unwrap();
        let now = Utc::now();

        let mut first = Snapshot::new(strategy.id, 0, 0, SnapshotStatus::Completed, progress(), now);
        repo.save_snapshot(&mut first).unwrap();
        let mut second = Snapshot::new(strategy.id, 1, 1, SnapshotStatus::Pending, progress(), now);
        repo.save_snapshot(&mut second).unwrap();

        let latest = repo.get_latest_snapshot(strategy.id).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.status, SnapshotStatus::Pending);
        assert_eq!(latest.progress, progress());

        second.status = SnapshotStatus::InProgress;
        second.executed_at = Some(now);
        repo.save_snapshot(&mut second).unwrap();
        let reloaded = repo.get_snapshot(second.id.unwrap()).unwrap().unwrap();
        assert_eq!(reloaded.status, SnapshotStatus::InProgress);
        assert!(reloaded.executed_at.is_some());
        assert_eq!(repo.list_snapshots(strategy.id).unwrap().len(), 2);
    }

    #[test]
    fn test_single_open_snapshot_enforced() {
        let repo = repo();
        let strategy = repo.create_strategy(&new_strategy("alpha"), Utc::now()).unwrap();
        let now = Utc::now();

        let mut open = Snapshot::new(strategy.id, 1, 1, SnapshotStatus::InProgress, progress(), now);
        repo.save_snapshot(&mut open).unwrap();
        let mut second = Snapshot::new(strategy.id, 1, 2, SnapshotStatus::Pending, progress(), now);
        assert!(repo.save_snapshot(&mut second).is_err());

        // closing and opening together is allowed
        open.status = SnapshotStatus::Completed;
        let mut next = Snapshot::new(strategy.id, 1, 2, SnapshotStatus::Pending, progress(), now);
        repo.roll_snapshot(&mut open, &mut next).unwrap();
        assert!(next.id.is_some());
        let latest = repo.get_latest_snapshot(strategy.id).unwrap().unwrap();
        assert_eq!(latest.step, 2);
    }

    #[test]
    fn test_orders_saved_and_updated() {
        let repo = repo();
        let strategy = repo.create_strategy(&new_strategy("alpha"), Utc::now()).unwrap();
        let mut snapshot =
            Snapshot::new(strategy.id, 1, 1, SnapshotStatus::Pending, progress(), Utc::now());
        repo.save_snapshot(&mut snapshot).unwrap();
        let snapshot_id = snapshot.id.unwrap();

        let mut rejected = order(snapshot_id, None);
        rejected.status = OrderStatus::Rejected;
        rejected.error_message = Some("40310000 - insufficient cash".to_string());
        let mut orders = vec![order(snapshot_id, Some("A1")), rejected, order(snapshot_id, None)];
        orders[2].status = OrderStatus::Rejected;
        repo.save_orders(&mut orders).unwrap();
        assert!(orders.iter().all(|o| o.id.is_some()));

        orders[0].status = OrderStatus::Filled;
        orders[0].filled_quantity = dec!(3);
        orders[0].filled_price = dec!(100.5);
        repo.save_order(&mut orders[0]).unwrap();

        let loaded = repo.list_orders(snapshot_id).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].status, OrderStatus::Filled);
        assert_eq!(loaded[0].filled_price, dec!(100.5));
        assert_eq!(loaded[0].price, dec!(101.25));
        assert_eq!(loaded[1].broker_order_id, None);
        assert_eq!(repo.list_cycle_orders(strategy.id, 1).unwrap().len(), 3);
        assert!(repo.list_cycle_orders(strategy.id, 2).unwrap().is_empty());

        // broker ids are unique
        let mut duplicate = order(snapshot_id, Some("A1"));
        assert!(repo.save_order(&mut duplicate).is_err());
    }

    #[test]
    fn test_delete_cascades() {
        let repo = repo();
        let strategy = repo.create_strategy(&new_strategy("alpha"), Utc::now()).unwrap();
        let mut snapshot =
            Snapshot::new(strategy.id, 1, 1, SnapshotStatus::Pending, progress(), Utc::now());
        repo.save_snapshot(&mut snapshot).unwrap();
        let snapshot_id = snapshot.id.unwrap();
        repo.save_order(&mut order(snapshot_id, Some("A1"))).unwrap();

        repo.delete_strategy(strategy.id).unwrap();
        assert!(repo.get_strategy("alpha").unwrap().is_none());
        assert!(repo.get_snapshot(snapshot_id).unwrap().is_none());
        assert!(repo.list_orders(snapshot_id).unwrap().is_empty());
        assert!(repo.delete_strategy(strategy.id).is_err());
    }
}
