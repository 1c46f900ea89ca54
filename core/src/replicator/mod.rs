//! Event-to-action state machine: classify, idempotency-gate, size,
//! dispatch, reconcile.

mod payload;

use crate::broker::{BrokerClient, ModifyPatch, PlaceOrderParams};
use crate::dispatcher::{exceeds_freeze_limit, Dispatcher};
use crate::errors::{ErrorKind, ReplicationError, Result};
use crate::model::{
    AccountRole, BracketLeg, CorrespondenceMapping, EventKind, LegKind, MappingStatus, NormalizedEvent, Order, OrderKind, OrderStatus, Product,
};
use crate::sizer::{Sizer, SizingOutcome};
use crate::store::Store;
use payload::order_from_payload;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Tunables for the replicator that aren't owned by another component.
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Quantity threshold above which `place_sliced` replaces `place_single`.
    pub freeze_limit_qty: i64,
    /// Run drift reconciliation every N decisions.
    pub reconcile_every_n_decisions: u64,
    /// Filled-quantity mismatch within this many units is absorbed silently.
    pub auto_correct_threshold: i64,
    /// Mismatch beyond this is logged at error and recorded to the audit log.
    pub max_mismatch: i64,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self { freeze_limit_qty: 1_800, reconcile_every_n_decisions: 1_000, auto_correct_threshold: 0, max_mismatch: 5 }
    }
}

/// Wires Store, Sizer, Dispatcher, and the broker client into the event
/// handling state machine described for each event kind.
pub struct Replicator {
    config: ReplicatorConfig,
    store: Store,
    sizer: Sizer,
    dispatcher: Dispatcher,
    broker: Arc<dyn BrokerClient>,
    decisions: AtomicU64,
}

impl Replicator {
    pub fn new(config: ReplicatorConfig, store: Store, sizer: Sizer, dispatcher: Dispatcher, broker: Arc<dyn BrokerClient>) -> Self {
        Self { config, store, sizer, dispatcher, broker, decisions: AtomicU64::new(0) }
    }

    /// Process one normalized event end to end; commits a watermark advance
    /// on any handled outcome (including a recorded failure), never on a
    /// silently ignored one.
    pub async fn handle(&self, event: NormalizedEvent) -> Result<()> {
        self.store.append_event(&event.order_id, event.sequence, &format!("{:?}", event.kind), event.payload.clone(), event.created_at_ts).await?;

        let outcome = match event.kind {
            EventKind::New => self.handle_new(&event).await,
            EventKind::Modified => self.handle_modified(&event).await,
            EventKind::Cancelled => self.handle_cancelled(&event).await,
            EventKind::Executed => self.handle_executed(&event).await,
            EventKind::Rejected => self.handle_rejected(&event).await,
            EventKind::Ignored => Ok(()),
        };

        if !matches!(event.kind, EventKind::Ignored) {
            self.store.set_watermark(event.created_at_ts).await?;
            let n = self.decisions.fetch_add(1, Ordering::Relaxed) + 1;
            if n % self.config.reconcile_every_n_decisions == 0 {
                if let Err(e) = self.reconcile_drift(&event.order_id).await {
                    warn!("drift reconciliation failed for {}: {}", event.order_id, e);
                }
            }
        }

        outcome
    }

    async fn handle_new(&self, event: &NormalizedEvent) -> Result<()> {
        let leader_order = order_from_payload(&event.payload, AccountRole::Leader)?;
        self.store.put_order(leader_order.clone()).await?;

        if let Some(existing) = self.store.get_mapping_by_leader(&leader_order.order_id)? {
            match existing.status {
                MappingStatus::Placed => {
                    info!("leader order {} already placed as {:?}, idempotent replay", leader_order.order_id, existing.follower_order_id);
                    return Ok(());
                }
                MappingStatus::Cancelled => return Ok(()),
                MappingStatus::Failed | MappingStatus::Pending => {}
            }
        }

        if leader_order.kind == OrderKind::Limit && leader_order.price.is_zero() {
            return self.fail_mapping(&leader_order, Some(ErrorKind::Validation), "limit order has zero price".into()).await;
        }

        let instrument = match self.broker.instrument(&leader_order.security_id).await {
            Ok(i) => i,
            Err(e) => return self.fail_mapping(&leader_order, None, format!("instrument lookup failed: {e}")).await,
        };

        let funds_source = crate::broker::BrokerAsFundsSource(self.broker.as_ref());
        let (leader_funds, _) = self.sizer.funds(AccountRole::Leader, &funds_source).await?;
        let (follower_funds, follower_stale) = self.sizer.funds(AccountRole::Follower, &funds_source).await?;
        if follower_stale {
            return self.fail_mapping(&leader_order, None, "follower funds snapshot is stale".into()).await;
        }

        let price_f64: f64 = leader_order.price.to_string().parse().unwrap_or(0.0);
        let outcome = self.sizer.compute_quantity(leader_order.quantity, price_f64, &leader_funds, &follower_funds, &instrument);

        let (follower_qty, capital_ratio) = match outcome {
            SizingOutcome::Zero => return self.fail_mapping(&leader_order, Some(ErrorKind::Sizing), "sizing produced zero quantity".into()).await,
            SizingOutcome::Quantity { qty, capital_ratio } => (qty, capital_ratio),
        };

        if let Err(e) = self.sizer.validate(follower_qty, price_f64, &instrument, &follower_funds) {
            return self.fail_mapping(&leader_order, Some(e.kind()), e.message().to_string()).await;
        }

        let disclosed_qty =
            Sizer::proportional_disclosed_qty(follower_qty, leader_order.quantity, leader_order.disclosed_quantity, instrument.lot_size);

        let params = PlaceOrderParams {
            account_role: AccountRole::Follower,
            side: leader_order.side,
            product: leader_order.product,
            kind: leader_order.kind,
            validity: leader_order.validity,
            security_id: leader_order.security_id.clone(),
            exchange_segment: leader_order.exchange_segment.clone(),
            quantity: follower_qty,
            disclosed_quantity: disclosed_qty,
            price: leader_order.price,
            trigger_price: leader_order.trigger_price,
            stop_loss_value: leader_order.stop_loss_value,
            profit_target_value: leader_order.profit_target_value,
        };

        let placement = self.place(&leader_order, params).await;

        let now = event.created_at_ts;
        match placement {
            Ok(follower_ids) => {
                let primary_id = follower_ids.first().cloned().unwrap_or_default();
                self.store
                    .put_order(Order {
                        order_id: primary_id.clone(),
                        account_role: AccountRole::Follower,
                        side: leader_order.side,
                        product: leader_order.product,
                        kind: leader_order.kind,
                        validity: leader_order.validity,
                        security_id: leader_order.security_id.clone(),
                        exchange_segment: leader_order.exchange_segment.clone(),
                        quantity: follower_qty,
                        disclosed_quantity: disclosed_qty,
                        price: leader_order.price,
                        trigger_price: leader_order.trigger_price,
                        status: OrderStatus::Open,
                        filled_quantity: 0,
                        average_fill_price: None,
                        stop_loss_value: leader_order.stop_loss_value,
                        profit_target_value: leader_order.profit_target_value,
                        leg_kind: if follower_ids.len() > 1 { Some(LegKind::Entry) } else { None },
                        parent_order_id: None,
                        slice_group_id: None,
                        created_at_ts: now,
                        updated_at_ts: now,
                        completed_at_ts: None,
                    })
                    .await?;
                self.store
                    .put_mapping(CorrespondenceMapping {
                        leader_order_id: leader_order.order_id.clone(),
                        follower_order_id: Some(primary_id.clone()),
                        leader_quantity: leader_order.quantity,
                        follower_quantity: follower_qty,
                        sizing_strategy: self.sizer_strategy_tag(),
                        capital_ratio,
                        status: MappingStatus::Placed,
                        last_error: None,
                        created_at_ts: now,
                        updated_at_ts: now,
                    })
                    .await?;

                if follower_ids.len() > 1 {
                    self.store
                        .put_leg(BracketLeg {
                            parent_follower_order_id: primary_id.clone(),
                            leg_kind: LegKind::Target,
                            leg_order_id: follower_ids[1].clone(),
                            status: OrderStatus::Open,
                        })
                        .await?;
                }
                if follower_ids.len() > 2 {
                    self.store
                        .put_leg(BracketLeg {
                            parent_follower_order_id: primary_id,
                            leg_kind: LegKind::Stop,
                            leg_order_id: follower_ids[2].clone(),
                            status: OrderStatus::Open,
                        })
                        .await?;
                }
                Ok(())
            }
            Err(e) => self.fail_mapping(&leader_order, Some(e.kind()), e.message().to_string()).await,
        }
    }

    async fn place(&self, leader_order: &Order, params: PlaceOrderParams) -> Result<Vec<String>> {
        match leader_order.product {
            Product::Co => {
                if params.stop_loss_value.is_none() {
                    return Err(ReplicationError::validation("cover order missing stop-loss value"));
                }
                Ok(vec![self.dispatcher.place_cover(params).await?.order_id])
            }
            Product::Bo => {
                if params.stop_loss_value.is_none() || params.profit_target_value.is_none() {
                    return Err(ReplicationError::validation("bracket order missing stop-loss or profit target"));
                }
                let b = self.dispatcher.place_bracket(params).await?;
                Ok(vec![b.entry_order_id, b.target_order_id, b.stop_order_id])
            }
            _ if exceeds_freeze_limit(params.quantity, self.config.freeze_limit_qty) => {
                let placed = self.dispatcher.place_sliced(params).await?;
                Ok(placed.into_iter().map(|p| p.order_id).collect())
            }
            _ => Ok(vec![self.dispatcher.place_single(params).await?.order_id]),
        }
    }

    async fn fail_mapping(&self, leader_order: &Order, kind: Option<ErrorKind>, reason: String) -> Result<()> {
        warn!("leader order {} failed replication: {}", leader_order.order_id, reason);
        self.store
            .put_mapping(CorrespondenceMapping {
                leader_order_id: leader_order.order_id.clone(),
                follower_order_id: None,
                leader_quantity: leader_order.quantity,
                follower_quantity: 0,
                sizing_strategy: self.sizer_strategy_tag(),
                capital_ratio: None,
                status: MappingStatus::Failed,
                last_error: Some(reason),
                created_at_ts: leader_order.created_at_ts,
                updated_at_ts: leader_order.updated_at_ts,
            })
            .await?;
        let _ = kind;
        Ok(())
    }

    fn sizer_strategy_tag(&self) -> String {
        self.sizer.strategy_tag().to_string()
    }

    async fn handle_modified(&self, event: &NormalizedEvent) -> Result<()> {
        let Some(mapping) = self.store.get_mapping_by_leader(&event.order_id)? else {
            return Ok(());
        };
        let Some(follower_id) = mapping.follower_order_id.clone() else { return Ok(()) };
        let Some(follower) = self.store.get_order(&follower_id)? else { return Ok(()) };
        if !matches!(follower.status, OrderStatus::Pending | OrderStatus::Open) {
            return Ok(());
        }

        let leader_order = order_from_payload(&event.payload, AccountRole::Leader)?;
        self.store.put_order(leader_order.clone()).await?;

        let patch = ModifyPatch {
            quantity: Some(leader_order.quantity),
            price: Some(leader_order.price),
            trigger_price: leader_order.trigger_price,
            validity: Some(leader_order.validity),
        };
        self.dispatcher.modify(&follower_id, patch).await
    }

    async fn handle_cancelled(&self, event: &NormalizedEvent) -> Result<()> {
        let Some(mapping) = self.store.get_mapping_by_leader(&event.order_id)? else {
            return Ok(());
        };
        let Some(follower_id) = mapping.follower_order_id.clone() else { return Ok(()) };
        let Some(follower) = self.store.get_order(&follower_id)? else { return Ok(()) };
        if follower.status.is_terminal() {
            return Ok(());
        }

        for leg in self.store.list_legs(&follower_id)? {
            if !leg.status.is_terminal() {
                if let Err(e) = self.dispatcher.cancel(&leg.leg_order_id).await {
                    warn!("best-effort leg cancel failed for {}: {}", leg.leg_order_id, e);
                }
            }
        }

        self.dispatcher.cancel(&follower_id).await?;

        let mut cancelled_follower = follower;
        cancelled_follower.status = OrderStatus::Cancelled;
        cancelled_follower.updated_at_ts = event.created_at_ts;
        cancelled_follower.completed_at_ts = Some(event.created_at_ts);
        self.store.put_order(cancelled_follower).await?;

        let mut updated = mapping;
        updated.status = MappingStatus::Cancelled;
        updated.updated_at_ts = event.created_at_ts;
        self.store.put_mapping(updated).await
    }

    async fn handle_executed(&self, event: &NormalizedEvent) -> Result<()> {
        let Some(mapping) = self.store.get_mapping_by_leader(&event.order_id)? else {
            return Ok(());
        };
        let Some(follower_id) = mapping.follower_order_id.clone() else { return Ok(()) };

        let fired_leg_id = event
            .payload
            .get("legOrderId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| follower_id.clone());

        let legs = self.store.list_legs(&follower_id)?;
        if legs.is_empty() {
            return Ok(());
        }

        let fired = legs.iter().find(|l| l.leg_order_id == fired_leg_id);
        match fired {
            Some(fired_leg) => {
                self.store.update_leg_status(&fired_leg.leg_order_id, OrderStatus::Executed).await?;
                for leg in &legs {
                    if leg.leg_order_id != fired_leg.leg_order_id && !leg.status.is_terminal() {
                        if let Err(e) = self.dispatcher.cancel(&leg.leg_order_id).await {
                            warn!("OCO cancel failed for sibling leg {}: {}", leg.leg_order_id, e);
                        } else {
                            self.store.update_leg_status(&leg.leg_order_id, OrderStatus::Cancelled).await?;
                        }
                    }
                }
                Ok(())
            }
            None => {
                warn!("oco-ambiguous: executed leg {} for parent {} not found in leg graph", fired_leg_id, follower_id);
                self.store
                    .append_audit("oco-ambiguous", AccountRole::Follower, &fired_leg_id, None, "warning", 0, Some("executed leg unresolved"), event.created_at_ts)
                    .await
            }
        }
    }

    async fn handle_rejected(&self, event: &NormalizedEvent) -> Result<()> {
        if let Some(mapping) = self.store.get_mapping_by_leader(&event.order_id)? {
            let mut updated = mapping;
            updated.status = MappingStatus::Failed;
            updated.last_error = Some("leader order rejected by broker".into());
            updated.updated_at_ts = event.created_at_ts;
            self.store.put_mapping(updated).await?;
        }
        Ok(())
    }

    /// Compare the follower's recorded filled quantity against the broker's
    /// current view; log-and-continue on drift rather than halting.
    async fn reconcile_drift(&self, leader_order_id: &str) -> Result<()> {
        let Some(mapping) = self.store.get_mapping_by_leader(leader_order_id)? else { return Ok(()) };
        let Some(follower_id) = mapping.follower_order_id else { return Ok(()) };
        let Some(recorded) = self.store.get_order(&follower_id)? else { return Ok(()) };

        let broker_view = self.broker.order_list(AccountRole::Follower).await?;
        let Some(observed) = broker_view.iter().find(|e| e.order_id == follower_id) else { return Ok(()) };
        let observed_filled = observed.payload.get("filledQty").and_then(|v| v.as_i64()).unwrap_or(recorded.filled_quantity);

        let drift = (observed_filled - recorded.filled_quantity).abs();
        if drift == 0 || drift <= self.config.auto_correct_threshold {
            return Ok(());
        }
        if drift > self.config.max_mismatch {
            error!("reconciliation drift of {} units detected for follower order {}", drift, follower_id);
            self.store
                .append_audit(
                    "reconciliation-drift",
                    AccountRole::Follower,
                    &follower_id,
                    None,
                    "error",
                    0,
                    Some(&format!("recorded={} observed={}", recorded.filled_quantity, observed_filled)),
                    chrono::Utc::now().timestamp(),
                )
                .await?;
        }
        Ok(())
    }
}
