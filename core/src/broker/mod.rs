//! Broker collaborator boundary.
//!
//! The broker is an external system this crate consumes, not implements:
//! a fixed set of HTTP operations plus a WebSocket event feed. Everything
//! here is a thin wrapper over those operations — core replication logic
//! lives in [`crate::replicator`], [`crate::sizer`], and [`crate::dispatcher`].

pub mod http;
pub mod mock;
pub mod stream;

use crate::errors::Result;
use crate::model::{AccountRole, FundsSnapshot, Instrument, NormalizedEvent, OrderKind, Product, Side, Validity};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Parameters for a new order placement, shared across `place_*` variants.
#[derive(Debug, Clone)]
pub struct PlaceOrderParams {
    pub account_role: AccountRole,
    pub side: Side,
    pub product: Product,
    pub kind: OrderKind,
    pub validity: Validity,
    pub security_id: String,
    pub exchange_segment: String,
    pub quantity: i64,
    pub disclosed_quantity: i64,
    pub price: Decimal,
    pub trigger_price: Option<Decimal>,
    pub stop_loss_value: Option<Decimal>,
    pub profit_target_value: Option<Decimal>,
}

/// A single broker acknowledgement of an order placement.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: String,
}

/// The three ids returned by a bracket placement.
#[derive(Debug, Clone)]
pub struct BracketPlacement {
    pub entry_order_id: String,
    pub target_order_id: String,
    pub stop_order_id: String,
}

/// Fields accepted on an open-order modification. All are total values, not deltas.
#[derive(Debug, Clone, Default)]
pub struct ModifyPatch {
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub validity: Option<Validity>,
}

/// The broker operations the replication pipeline depends on. Async and
/// object-safe so the dispatcher and replicator can hold a `dyn BrokerClient`
/// and tests can swap in [`mock::MockBroker`].
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn fund_limits(&self, role: AccountRole) -> Result<FundsSnapshot>;

    async fn place_single(&self, params: PlaceOrderParams) -> Result<PlacedOrder>;
    async fn place_cover(&self, params: PlaceOrderParams) -> Result<PlacedOrder>;
    async fn place_bracket(&self, params: PlaceOrderParams) -> Result<BracketPlacement>;
    async fn place_sliced(&self, params: PlaceOrderParams) -> Result<Vec<PlacedOrder>>;

    async fn modify_order(&self, order_id: &str, patch: ModifyPatch) -> Result<()>;
    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Orders with timestamps suitable for gap-recovery diffing, already
    /// normalized so [`crate::stream::gap_recovery`] can replay them
    /// through the same handler path as live events.
    async fn order_list(&self, role: AccountRole) -> Result<Vec<NormalizedEvent>>;

    async fn instrument(&self, security_id: &str) -> Result<Instrument>;
}

#[async_trait]
impl<T: BrokerClient + ?Sized> crate::sizer::FundsSource for T {
    async fn fetch_funds(&self, role: AccountRole) -> Result<FundsSnapshot> {
        self.fund_limits(role).await
    }
}

/// Thin adapter letting an already-erased `&dyn BrokerClient` be passed where
/// a `&dyn FundsSource` is expected (trait objects can't be re-coerced to a
/// sibling trait object once erased, even when a blanket impl connects them).
pub struct BrokerAsFundsSource<'a>(pub &'a dyn BrokerClient);

#[async_trait]
impl<'a> crate::sizer::FundsSource for BrokerAsFundsSource<'a> {
    async fn fetch_funds(&self, role: AccountRole) -> Result<FundsSnapshot> {
        self.0.fund_limits(role).await
    }
}
