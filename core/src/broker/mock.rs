//! Deterministic in-memory [`BrokerClient`] for tests.

use super::{BracketPlacement, BrokerClient, ModifyPatch, PlaceOrderParams, PlacedOrder};
use crate::errors::{ReplicationError, Result};
use crate::model::{AccountRole, FundsSnapshot, Instrument, NormalizedEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
pub enum RecordedCall {
    PlaceSingle(PlaceOrderParams),
    PlaceCover(PlaceOrderParams),
    PlaceBracket(PlaceOrderParams),
    PlaceSliced(PlaceOrderParams),
    Modify(String, ModifyPatch),
    Cancel(String),
}

/// A scriptable broker double: funds, instruments, and order-list contents
/// are set up by the test; placements succeed deterministically and are
/// recorded for assertions.
pub struct MockBroker {
    funds: Mutex<HashMap<AccountRole, FundsSnapshot>>,
    instruments: Mutex<HashMap<String, Instrument>>,
    order_list: Mutex<HashMap<AccountRole, Vec<NormalizedEvent>>>,
    calls: Mutex<Vec<RecordedCall>>,
    next_id: AtomicU64,
    fail_next_placement: Mutex<Option<ReplicationError>>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            funds: Mutex::new(HashMap::new()),
            instruments: Mutex::new(HashMap::new()),
            order_list: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail_next_placement: Mutex::new(None),
        }
    }

    pub fn set_funds(&self, role: AccountRole, snapshot: FundsSnapshot) {
        self.funds.lock().insert(role, snapshot);
    }

    pub fn set_instrument(&self, instrument: Instrument) {
        self.instruments.lock().insert(instrument.security_id.clone(), instrument);
    }

    pub fn set_order_list(&self, role: AccountRole, events: Vec<NormalizedEvent>) {
        self.order_list.lock().insert(role, events);
    }

    pub fn fail_next_placement(&self, err: ReplicationError) {
        *self.fail_next_placement.lock() = Some(err);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn next_order_id(&self) -> String {
        format!("MOCK{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn maybe_fail(&self) -> Result<()> {
        if let Some(err) = self.fail_next_placement.lock().take() {
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn fund_limits(&self, role: AccountRole) -> Result<FundsSnapshot> {
        self.funds
            .lock()
            .get(&role)
            .copied()
            .ok_or_else(|| ReplicationError::configuration(format!("no funds configured for {role:?}")))
    }

    async fn place_single(&self, params: PlaceOrderParams) -> Result<PlacedOrder> {
        self.maybe_fail()?;
        let id = self.next_order_id();
        self.calls.lock().push(RecordedCall::PlaceSingle(params));
        Ok(PlacedOrder { order_id: id })
    }

    async fn place_cover(&self, params: PlaceOrderParams) -> Result<PlacedOrder> {
        self.maybe_fail()?;
        let id = self.next_order_id();
        self.calls.lock().push(RecordedCall::PlaceCover(params));
        Ok(PlacedOrder { order_id: id })
    }

    async fn place_bracket(&self, params: PlaceOrderParams) -> Result<BracketPlacement> {
        self.maybe_fail()?;
        let entry = self.next_order_id();
        let target = self.next_order_id();
        let stop = self.next_order_id();
        self.calls.lock().push(RecordedCall::PlaceBracket(params));
        Ok(BracketPlacement { entry_order_id: entry, target_order_id: target, stop_order_id: stop })
    }

    async fn place_sliced(&self, params: PlaceOrderParams) -> Result<Vec<PlacedOrder>> {
        self.maybe_fail()?;
        let ids = vec![PlacedOrder { order_id: self.next_order_id() }, PlacedOrder { order_id: self.next_order_id() }];
        self.calls.lock().push(RecordedCall::PlaceSliced(params));
        Ok(ids)
    }

    async fn modify_order(&self, order_id: &str, patch: ModifyPatch) -> Result<()> {
        self.calls.lock().push(RecordedCall::Modify(order_id.to_string(), patch));
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.calls.lock().push(RecordedCall::Cancel(order_id.to_string()));
        Ok(())
    }

    async fn order_list(&self, role: AccountRole) -> Result<Vec<NormalizedEvent>> {
        Ok(self.order_list.lock().get(&role).cloned().unwrap_or_default())
    }

    async fn instrument(&self, security_id: &str) -> Result<Instrument> {
        self.instruments
            .lock()
            .get(security_id)
            .cloned()
            .ok_or_else(|| ReplicationError::configuration(format!("no instrument configured for {security_id}")))
    }
}
