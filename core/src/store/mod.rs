//! Single-writer, WAL-mode persistent store.
//!
//! All mutating operations funnel through one dedicated writer thread via a
//! bounded channel — the same shape as the teacher's `AsyncJournal` writer
//! thread, generalized from fire-and-forget logging to request/reply so
//! callers observe the committed result and can react to a failure. Reads
//! open their own short-lived read-only connection (safe and concurrent
//! under WAL) rather than going through the writer.

mod schema;

use crate::errors::{ReplicationError, Result};
use crate::model::{
    AccountRole, BracketLeg, CorrespondenceMapping, FundsSnapshot, Instrument, LegKind, MappingStatus,
    Order, OrderStatus,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    PutOrder(Order, Reply<()>),
    PutMapping(CorrespondenceMapping, Reply<()>),
    AppendEvent { order_id: String, sequence: u64, kind: String, payload: serde_json::Value, ts: i64, reply: Reply<()> },
    PutLeg(BracketLeg, Reply<()>),
    UpdateLegStatus { leg_order_id: String, status: OrderStatus, reply: Reply<()> },
    SetWatermark(i64, Reply<()>),
    AppendAudit { action: String, role: AccountRole, request: String, response: Option<String>, status: String, duration_ms: i64, error: Option<String>, ts: i64, reply: Reply<()> },
    SaveFunds(AccountRole, FundsSnapshot, Reply<()>),
    PutInstrument(Instrument, Reply<()>),
}

/// Handle to the persistent store. Cheap to clone; all clones share the
/// same writer thread and database file.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    tx: mpsc::Sender<Command>,
}

impl Store {
    /// Open (creating if absent) the store at `path` and spawn its writer thread.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch(schema::SCHEMA)?;

        let (tx, rx) = mpsc::channel::<Command>(1024);
        let writer_path = path.clone();
        std::thread::Builder::new()
            .name("store-writer".into())
            .spawn(move || Self::writer_loop(conn, rx, writer_path))
            .expect("failed to spawn store writer thread");

        Ok(Self { path, tx })
    }

    fn writer_loop(conn: Connection, mut rx: mpsc::Receiver<Command>, _path: PathBuf) {
        while let Some(cmd) = rx.blocking_recv() {
            match cmd {
                Command::PutOrder(order, reply) => {
                    let _ = reply.send(Self::exec_put_order(&conn, &order));
                }
                Command::PutMapping(mapping, reply) => {
                    let _ = reply.send(Self::exec_put_mapping(&conn, &mapping));
                }
                Command::AppendEvent { order_id, sequence, kind, payload, ts, reply } => {
                    let _ = reply.send(Self::exec_append_event(&conn, &order_id, sequence, &kind, &payload, ts));
                }
                Command::PutLeg(leg, reply) => {
                    let _ = reply.send(Self::exec_put_leg(&conn, &leg));
                }
                Command::UpdateLegStatus { leg_order_id, status, reply } => {
                    let _ = reply.send(Self::exec_update_leg_status(&conn, &leg_order_id, status));
                }
                Command::SetWatermark(ts, reply) => {
                    let _ = reply.send(Self::exec_set_watermark(&conn, ts));
                }
                Command::AppendAudit { action, role, request, response, status, duration_ms, error, ts, reply } => {
                    let _ = reply.send(Self::exec_append_audit(
                        &conn, &action, role, &request, response.as_deref(), &status, duration_ms, error.as_deref(), ts,
                    ));
                }
                Command::SaveFunds(role, snapshot, reply) => {
                    let _ = reply.send(Self::exec_save_funds(&conn, role, &snapshot));
                }
                Command::PutInstrument(instrument, reply) => {
                    let _ = reply.send(Self::exec_put_instrument(&conn, &instrument));
                }
            }
        }
    }

    fn read_conn(&self) -> Result<Connection> {
        Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .map_err(ReplicationError::from)
    }

    async fn call<T: Send + 'static>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(build(tx)).await.map_err(|_| ReplicationError::store("writer thread gone"))?;
        rx.await.map_err(|_| ReplicationError::store("writer thread dropped reply"))?
    }

    // ---- writes ----

    pub async fn put_order(&self, order: Order) -> Result<()> {
        self.call(|reply| Command::PutOrder(order, reply)).await
    }

    pub async fn put_mapping(&self, mapping: CorrespondenceMapping) -> Result<()> {
        self.call(|reply| Command::PutMapping(mapping, reply)).await
    }

    pub async fn append_event(&self, order_id: &str, sequence: u64, kind: &str, payload: serde_json::Value, ts: i64) -> Result<()> {
        let order_id = order_id.to_string();
        let kind = kind.to_string();
        self.call(|reply| Command::AppendEvent { order_id, sequence, kind, payload, ts, reply }).await
    }

    pub async fn put_leg(&self, leg: BracketLeg) -> Result<()> {
        self.call(|reply| Command::PutLeg(leg, reply)).await
    }

    pub async fn update_leg_status(&self, leg_order_id: &str, status: OrderStatus) -> Result<()> {
        let leg_order_id = leg_order_id.to_string();
        self.call(|reply| Command::UpdateLegStatus { leg_order_id, status, reply }).await
    }

    pub async fn set_watermark(&self, ts: i64) -> Result<()> {
        self.call(|reply| Command::SetWatermark(ts, reply)).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append_audit(
        &self,
        action: &str,
        role: AccountRole,
        request: &str,
        response: Option<&str>,
        status: &str,
        duration_ms: i64,
        error: Option<&str>,
        ts: i64,
    ) -> Result<()> {
        let action = action.to_string();
        let request = request.to_string();
        let response = response.map(str::to_string);
        let status = status.to_string();
        let error = error.map(str::to_string);
        self.call(|reply| Command::AppendAudit { action, role, request, response, status, duration_ms, error, ts, reply }).await
    }

    pub async fn save_funds_snapshot(&self, role: AccountRole, snapshot: FundsSnapshot) -> Result<()> {
        self.call(|reply| Command::SaveFunds(role, snapshot, reply)).await
    }

    pub async fn put_instrument(&self, instrument: Instrument) -> Result<()> {
        self.call(|reply| Command::PutInstrument(instrument, reply)).await
    }

    // ---- reads ----

    pub fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT order_id, account_role, side, product, kind, validity, security_id, exchange_segment,
                    quantity, disclosed_quantity, price, trigger_price, status, filled_quantity,
                    average_fill_price, stop_loss_value, profit_target_value, leg_kind, parent_order_id,
                    slice_group_id, created_at_ts, updated_at_ts, completed_at_ts
             FROM orders WHERE order_id = ?1",
            params![order_id],
            row_to_order,
        )
        .optional()
        .map_err(ReplicationError::from)
    }

    pub fn get_mapping_by_leader(&self, leader_order_id: &str) -> Result<Option<CorrespondenceMapping>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT leader_order_id, follower_order_id, leader_quantity, follower_quantity,
                    sizing_strategy, capital_ratio, status, last_error, created_at_ts, updated_at_ts
             FROM copy_mappings WHERE leader_order_id = ?1",
            params![leader_order_id],
            row_to_mapping,
        )
        .optional()
        .map_err(ReplicationError::from)
    }

    pub fn get_mapping_by_follower(&self, follower_order_id: &str) -> Result<Option<CorrespondenceMapping>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT leader_order_id, follower_order_id, leader_quantity, follower_quantity,
                    sizing_strategy, capital_ratio, status, last_error, created_at_ts, updated_at_ts
             FROM copy_mappings WHERE follower_order_id = ?1",
            params![follower_order_id],
            row_to_mapping,
        )
        .optional()
        .map_err(ReplicationError::from)
    }

    pub fn list_legs(&self, parent_order_id: &str) -> Result<Vec<BracketLeg>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT parent_order_id, leg_kind, leg_order_id, status FROM bracket_order_legs WHERE parent_order_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![parent_order_id], row_to_leg)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_watermark(&self) -> Result<i64> {
        let conn = self.read_conn()?;
        conn.query_row("SELECT last_leader_event_ts FROM watermark WHERE id = 1", [], |r| r.get(0))
            .map_err(ReplicationError::from)
    }

    pub fn get_funds_snapshot(&self, role: AccountRole) -> Result<Option<FundsSnapshot>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT available, utilized, collateral, captured_at_ts FROM funds WHERE account_role = ?1",
            params![role.as_str()],
            |r| {
                Ok(FundsSnapshot {
                    available_balance: r.get(0)?,
                    utilized: r.get(1)?,
                    collateral: r.get(2)?,
                    captured_at_ts: r.get(3)?,
                })
            },
        )
        .optional()
        .map_err(ReplicationError::from)
    }

    pub fn get_instrument(&self, security_id: &str) -> Result<Option<Instrument>> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT security_id, symbol, lot_size, tick_size, premium FROM instruments WHERE security_id = ?1",
            params![security_id],
            |r| {
                let tick_size: String = r.get(3)?;
                Ok(Instrument {
                    security_id: r.get(0)?,
                    symbol: r.get(1)?,
                    lot_size: r.get(2)?,
                    tick_size: tick_size.parse().unwrap_or_default(),
                    premium: r.get(4)?,
                })
            },
        )
        .optional()
        .map_err(ReplicationError::from)
    }

    // ---- writer-thread execution bodies ----

    fn exec_put_order(conn: &Connection, order: &Order) -> Result<()> {
        conn.execute(
            "INSERT INTO orders (order_id, account_role, side, product, kind, validity, security_id,
                exchange_segment, quantity, disclosed_quantity, price, trigger_price, status,
                filled_quantity, average_fill_price, stop_loss_value, profit_target_value, leg_kind,
                parent_order_id, slice_group_id, created_at_ts, updated_at_ts, completed_at_ts)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)
             ON CONFLICT(order_id) DO UPDATE SET
                status = excluded.status,
                filled_quantity = excluded.filled_quantity,
                average_fill_price = excluded.average_fill_price,
                updated_at_ts = excluded.updated_at_ts,
                completed_at_ts = excluded.completed_at_ts",
            params![
                order.order_id,
                serde_json::to_string(&order.account_role).unwrap(),
                serde_json::to_string(&order.side).unwrap(),
                serde_json::to_string(&order.product).unwrap(),
                serde_json::to_string(&order.kind).unwrap(),
                serde_json::to_string(&order.validity).unwrap(),
                order.security_id,
                order.exchange_segment,
                order.quantity,
                order.disclosed_quantity,
                order.price.to_string(),
                order.trigger_price.map(|p| p.to_string()),
                serde_json::to_string(&order.status).unwrap(),
                order.filled_quantity,
                order.average_fill_price.map(|p| p.to_string()),
                order.stop_loss_value.map(|p| p.to_string()),
                order.profit_target_value.map(|p| p.to_string()),
                order.leg_kind.map(|k| serde_json::to_string(&k).unwrap()),
                order.parent_order_id,
                order.slice_group_id,
                order.created_at_ts,
                order.updated_at_ts,
                order.completed_at_ts,
            ],
        )?;
        Ok(())
    }

    fn exec_put_mapping(conn: &Connection, mapping: &CorrespondenceMapping) -> Result<()> {
        if let Some(existing) = conn
            .query_row(
                "SELECT status FROM copy_mappings WHERE leader_order_id = ?1",
                params![mapping.leader_order_id],
                |r| r.get::<_, String>(0),
            )
            .optional()?
        {
            let existing_status: MappingStatus = serde_json::from_str(&format!("\"{existing}\"")).unwrap_or(MappingStatus::Pending);
            if matches!(existing_status, MappingStatus::Placed | MappingStatus::Cancelled)
                && !matches!(mapping.status, MappingStatus::Cancelled)
            {
                return Err(ReplicationError::store(format!(
                    "refusing to regress mapping {} from {:?} to {:?}",
                    mapping.leader_order_id, existing_status, mapping.status
                )));
            }
        }

        conn.execute(
            "INSERT INTO copy_mappings (leader_order_id, follower_order_id, leader_quantity, follower_quantity,
                sizing_strategy, capital_ratio, status, last_error, created_at_ts, updated_at_ts)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(leader_order_id) DO UPDATE SET
                follower_order_id = COALESCE(copy_mappings.follower_order_id, excluded.follower_order_id),
                follower_quantity = excluded.follower_quantity,
                status = excluded.status,
                last_error = excluded.last_error,
                updated_at_ts = excluded.updated_at_ts",
            params![
                mapping.leader_order_id,
                mapping.follower_order_id,
                mapping.leader_quantity,
                mapping.follower_quantity,
                mapping.sizing_strategy,
                mapping.capital_ratio,
                serde_json::to_string(&mapping.status).unwrap().trim_matches('"'),
                mapping.last_error,
                mapping.created_at_ts,
                mapping.updated_at_ts,
            ],
        )?;
        Ok(())
    }

    fn exec_append_event(conn: &Connection, order_id: &str, sequence: u64, kind: &str, payload: &serde_json::Value, ts: i64) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO order_events (order_id, sequence, kind, payload, ts) VALUES (?1,?2,?3,?4,?5)",
            params![order_id, sequence as i64, kind, payload.to_string(), ts],
        )?;
        Ok(())
    }

    fn exec_put_leg(conn: &Connection, leg: &BracketLeg) -> Result<()> {
        conn.execute(
            "INSERT INTO bracket_order_legs (parent_order_id, leg_kind, leg_order_id, status)
             VALUES (?1,?2,?3,?4)
             ON CONFLICT(parent_order_id, leg_kind) DO UPDATE SET
                leg_order_id = excluded.leg_order_id, status = excluded.status",
            params![
                leg.parent_follower_order_id,
                serde_json::to_string(&leg.leg_kind).unwrap().trim_matches('"'),
                leg.leg_order_id,
                serde_json::to_string(&leg.status).unwrap().trim_matches('"'),
            ],
        )?;
        Ok(())
    }

    fn exec_update_leg_status(conn: &Connection, leg_order_id: &str, status: OrderStatus) -> Result<()> {
        conn.execute(
            "UPDATE bracket_order_legs SET status = ?1 WHERE leg_order_id = ?2",
            params![serde_json::to_string(&status).unwrap().trim_matches('"'), leg_order_id],
        )?;
        Ok(())
    }

    fn exec_set_watermark(conn: &Connection, ts: i64) -> Result<()> {
        conn.execute("UPDATE watermark SET last_leader_event_ts = ?1 WHERE id = 1 AND ?1 > last_leader_event_ts", params![ts])?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn exec_append_audit(
        conn: &Connection,
        action: &str,
        role: AccountRole,
        request: &str,
        response: Option<&str>,
        status: &str,
        duration_ms: i64,
        error: Option<&str>,
        ts: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO audit_log (action, role, request, response, status, duration_ms, error, ts)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![action, role.as_str(), request, response, status, duration_ms, error, ts],
        )?;
        Ok(())
    }

    fn exec_save_funds(conn: &Connection, role: AccountRole, snapshot: &FundsSnapshot) -> Result<()> {
        conn.execute(
            "INSERT INTO funds (account_role, available, utilized, collateral, captured_at_ts)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(account_role) DO UPDATE SET
                available = excluded.available, utilized = excluded.utilized,
                collateral = excluded.collateral, captured_at_ts = excluded.captured_at_ts",
            params![role.as_str(), snapshot.available_balance, snapshot.utilized, snapshot.collateral, snapshot.captured_at_ts],
        )?;
        Ok(())
    }

    fn exec_put_instrument(conn: &Connection, instrument: &Instrument) -> Result<()> {
        conn.execute(
            "INSERT INTO instruments (security_id, symbol, lot_size, tick_size, premium)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(security_id) DO UPDATE SET
                symbol = excluded.symbol, lot_size = excluded.lot_size,
                tick_size = excluded.tick_size, premium = excluded.premium",
            params![instrument.security_id, instrument.symbol, instrument.lot_size, instrument.tick_size.to_string(), instrument.premium],
        )?;
        Ok(())
    }
}

fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
    let parse_json = |s: String| -> String { s };
    Ok(Order {
        order_id: row.get(0)?,
        account_role: serde_json::from_str(&parse_json(row.get(1)?)).unwrap(),
        side: serde_json::from_str(&parse_json(row.get(2)?)).unwrap(),
        product: serde_json::from_str(&parse_json(row.get(3)?)).unwrap(),
        kind: serde_json::from_str(&parse_json(row.get(4)?)).unwrap(),
        validity: serde_json::from_str(&parse_json(row.get(5)?)).unwrap(),
        security_id: row.get(6)?,
        exchange_segment: row.get(7)?,
        quantity: row.get(8)?,
        disclosed_quantity: row.get(9)?,
        price: row.get::<_, String>(10)?.parse().unwrap_or_default(),
        trigger_price: row.get::<_, Option<String>>(11)?.map(|s| s.parse().unwrap_or_default()),
        status: serde_json::from_str(&parse_json(row.get(12)?)).unwrap(),
        filled_quantity: row.get(13)?,
        average_fill_price: row.get::<_, Option<String>>(14)?.map(|s| s.parse().unwrap_or_default()),
        stop_loss_value: row.get::<_, Option<String>>(15)?.map(|s| s.parse().unwrap_or_default()),
        profit_target_value: row.get::<_, Option<String>>(16)?.map(|s| s.parse().unwrap_or_default()),
        leg_kind: row.get::<_, Option<String>>(17)?.and_then(|s| serde_json::from_str(&s).ok()),
        parent_order_id: row.get(18)?,
        slice_group_id: row.get(19)?,
        created_at_ts: row.get(20)?,
        updated_at_ts: row.get(21)?,
        completed_at_ts: row.get(22)?,
    })
}

fn row_to_mapping(row: &rusqlite::Row) -> rusqlite::Result<CorrespondenceMapping> {
    let status_str: String = row.get(6)?;
    Ok(CorrespondenceMapping {
        leader_order_id: row.get(0)?,
        follower_order_id: row.get(1)?,
        leader_quantity: row.get(2)?,
        follower_quantity: row.get(3)?,
        sizing_strategy: row.get(4)?,
        capital_ratio: row.get(5)?,
        status: serde_json::from_str(&format!("\"{status_str}\"")).unwrap_or(MappingStatus::Pending),
        last_error: row.get(7)?,
        created_at_ts: row.get(8)?,
        updated_at_ts: row.get(9)?,
    })
}

fn row_to_leg(row: &rusqlite::Row) -> rusqlite::Result<BracketLeg> {
    let leg_kind_str: String = row.get(1)?;
    let status_str: String = row.get(3)?;
    Ok(BracketLeg {
        parent_follower_order_id: row.get(0)?,
        leg_kind: serde_json::from_str(&format!("\"{leg_kind_str}\"")).unwrap_or(LegKind::Entry),
        leg_order_id: row.get(2)?,
        status: serde_json::from_str(&format!("\"{status_str}\"")).unwrap_or(OrderStatus::Pending),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountRole, OrderKind, Product, Side, Validity};
    use rust_decimal_macros::dec;

    fn sample_order(id: &str) -> Order {
        Order {
            order_id: id.to_string(),
            account_role: AccountRole::Follower,
            side: Side::Buy,
            product: Product::Intraday,
            kind: OrderKind::Limit,
            validity: Validity::Day,
            security_id: "SEC1".into(),
            exchange_segment: "NSE_FNO".into(),
            quantity: 50,
            disclosed_quantity: 0,
            price: dec!(1500),
            trigger_price: None,
            status: OrderStatus::Open,
            filled_quantity: 0,
            average_fill_price: None,
            stop_loss_value: None,
            profit_target_value: None,
            leg_kind: None,
            parent_order_id: None,
            slice_group_id: None,
            created_at_ts: 1,
            updated_at_ts: 1,
            completed_at_ts: None,
        }
    }

    #[tokio::test]
    async fn put_and_get_order_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        store.put_order(sample_order("F1")).await.unwrap();
        let fetched = store.get_order("F1").unwrap().unwrap();
        assert_eq!(fetched.security_id, "SEC1");
        assert_eq!(fetched.quantity, 50);
    }

    #[tokio::test]
    async fn watermark_only_moves_forward() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        store.set_watermark(100).await.unwrap();
        store.set_watermark(50).await.unwrap();
        assert_eq!(store.get_watermark().unwrap(), 100);
        store.set_watermark(200).await.unwrap();
        assert_eq!(store.get_watermark().unwrap(), 200);
    }

    #[tokio::test]
    async fn mapping_cannot_regress_from_placed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let mapping = CorrespondenceMapping {
            leader_order_id: "L1".into(),
            follower_order_id: Some("F1".into()),
            leader_quantity: 100,
            follower_quantity: 50,
            sizing_strategy: "capital_proportional".into(),
            capital_ratio: Some(0.5),
            status: MappingStatus::Placed,
            last_error: None,
            created_at_ts: 1,
            updated_at_ts: 1,
        };
        store.put_mapping(mapping.clone()).await.unwrap();

        let mut regressed = mapping;
        regressed.status = MappingStatus::Pending;
        let result = store.put_mapping(regressed).await;
        assert!(result.is_err());

        let fetched = store.get_mapping_by_leader("L1").unwrap().unwrap();
        assert_eq!(fetched.status, MappingStatus::Placed);
    }

    #[tokio::test]
    async fn append_event_is_idempotent_on_order_id_and_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        store.append_event("L1", 1, "new", serde_json::json!({"a":1}), 10).await.unwrap();
        store.append_event("L1", 1, "new", serde_json::json!({"a":1}), 10).await.unwrap();
        // second insert is ignored, not an error
    }

    #[tokio::test]
    async fn bracket_legs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        store
            .put_leg(BracketLeg {
                parent_follower_order_id: "P1".into(),
                leg_kind: LegKind::Target,
                leg_order_id: "T1".into(),
                status: OrderStatus::Open,
            })
            .await
            .unwrap();
        store.update_leg_status("T1", OrderStatus::Executed).await.unwrap();
        let legs = store.list_legs("P1").unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].status, OrderStatus::Executed);
    }
}
