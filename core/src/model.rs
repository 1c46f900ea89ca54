//! Data model shared by the store, sizer, dispatcher, and replicator.
//!
//! Field shapes follow the broker's order payload (security id, exchange
//! segment, transaction type, product, validity, cover/bracket parameters)
//! as used throughout the replication pipeline.

use serde::{Deserialize, Serialize};

/// Which account an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Leader,
    Follower,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Leader => "leader",
            AccountRole::Follower => "follower",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// Product type, determining whether the order carries cover/bracket legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Product {
    Cash,
    Intraday,
    Margin,
    /// Cover order: a single mandatory stop-loss leg.
    Co,
    /// Bracket order: a target leg and a stop leg (OCO).
    Bo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    StopMarket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Validity {
    Day,
    Ioc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Transit,
    Open,
    Partial,
    Executed,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Executed | OrderStatus::Cancelled | OrderStatus::Rejected)
    }
}

/// Which leg of a bracket order this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    Entry,
    Target,
    Stop,
}

/// Status of the leader-to-follower correspondence for one leader order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Pending,
    Placed,
    Failed,
    Cancelled,
}

/// An order belonging to either account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub account_role: AccountRole,
    pub side: Side,
    pub product: Product,
    pub kind: OrderKind,
    pub validity: Validity,
    pub security_id: String,
    pub exchange_segment: String,
    pub quantity: i64,
    pub disclosed_quantity: i64,
    pub price: rust_decimal::Decimal,
    pub trigger_price: Option<rust_decimal::Decimal>,
    pub status: OrderStatus,
    pub filled_quantity: i64,
    pub average_fill_price: Option<rust_decimal::Decimal>,
    pub stop_loss_value: Option<rust_decimal::Decimal>,
    pub profit_target_value: Option<rust_decimal::Decimal>,
    pub leg_kind: Option<LegKind>,
    pub parent_order_id: Option<String>,
    pub slice_group_id: Option<String>,
    pub created_at_ts: i64,
    pub updated_at_ts: i64,
    pub completed_at_ts: Option<i64>,
}

/// One row of the correspondence map; the idempotency source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrespondenceMapping {
    pub leader_order_id: String,
    pub follower_order_id: Option<String>,
    pub leader_quantity: i64,
    pub follower_quantity: i64,
    pub sizing_strategy: String,
    pub capital_ratio: Option<f64>,
    pub status: MappingStatus,
    pub last_error: Option<String>,
    pub created_at_ts: i64,
    pub updated_at_ts: i64,
}

/// One leg of a bracket parent's leg graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketLeg {
    pub parent_follower_order_id: String,
    pub leg_kind: LegKind,
    pub leg_order_id: String,
    pub status: OrderStatus,
}

/// An append-only event-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogRecord {
    pub order_id: String,
    pub sequence: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub ts: i64,
}

/// A normalized event delivered by the stream coordinator to the replicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub order_id: String,
    pub sequence: u64,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub created_at_ts: i64,
}

/// The classification the replicator assigns to an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    New,
    Modified,
    Cancelled,
    Executed,
    Rejected,
    Ignored,
}

impl EventKind {
    /// Classify a broker order status string per the specification's table.
    pub fn classify(status: &str) -> EventKind {
        match status.to_ascii_lowercase().as_str() {
            "pending" | "transit" | "open" => EventKind::New,
            "modified" => EventKind::Modified,
            "cancelled" => EventKind::Cancelled,
            "traded" | "executed" | "partial" => EventKind::Executed,
            "rejected" => EventKind::Rejected,
            _ => EventKind::Ignored,
        }
    }
}

/// Per-role available funds snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundsSnapshot {
    pub available_balance: f64,
    pub utilized: f64,
    pub collateral: f64,
    pub captured_at_ts: i64,
}

/// Cached instrument metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub security_id: String,
    pub symbol: String,
    pub lot_size: i64,
    pub tick_size: rust_decimal::Decimal,
    pub premium: Option<f64>,
}
