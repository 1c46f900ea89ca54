//! Follower quantity sizing.
//!
//! Pure arithmetic over a funds snapshot and instrument metadata, cached per
//! role with a TTL the way the dispatcher caches its rate-limit state — a
//! `parking_lot::Mutex` guarding a small struct, refreshed lazily rather than
//! on a timer.

use crate::errors::{ErrorKind, ReplicationError, Result};
use crate::model::{AccountRole, FundsSnapshot, Instrument};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Which sizing strategy the operator configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingStrategy {
    CapitalProportional,
    FixedRatio,
    RiskBased,
}

impl SizingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizingStrategy::CapitalProportional => "capital_proportional",
            SizingStrategy::FixedRatio => "fixed_ratio",
            SizingStrategy::RiskBased => "risk_based",
        }
    }
}

impl std::str::FromStr for SizingStrategy {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "capital_proportional" => Ok(SizingStrategy::CapitalProportional),
            "fixed_ratio" => Ok(SizingStrategy::FixedRatio),
            "risk_based" => Ok(SizingStrategy::RiskBased),
            other => Err(ReplicationError::configuration(format!("unknown SIZING_STRATEGY: {other}"))),
        }
    }
}

/// Fetches a fresh funds snapshot for a role; implemented by the broker client.
#[async_trait]
pub trait FundsSource: Send + Sync {
    async fn fetch_funds(&self, role: AccountRole) -> Result<FundsSnapshot>;
}

/// Configuration for the Sizer.
#[derive(Debug, Clone)]
pub struct SizerConfig {
    pub strategy: SizingStrategy,
    pub copy_ratio: Option<f64>,
    pub max_position_pct: f64,
    pub funds_ttl: Duration,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            strategy: SizingStrategy::CapitalProportional,
            copy_ratio: None,
            max_position_pct: 1.0,
            funds_ttl: Duration::from_secs(30),
        }
    }
}

/// Reason a sizing or margin decision failed, recorded in the correspondence map.
#[derive(Debug, Clone, PartialEq)]
pub enum SizingOutcome {
    Quantity { qty: i64, capital_ratio: Option<f64> },
    Zero,
}

struct CachedFunds {
    snapshot: FundsSnapshot,
    fetched_at: Instant,
}

/// Caches a funds snapshot per role and computes follower quantities.
pub struct Sizer {
    config: SizerConfig,
    cache: Mutex<std::collections::HashMap<u8, CachedFunds>>,
}

fn role_key(role: AccountRole) -> u8 {
    match role {
        AccountRole::Leader => 0,
        AccountRole::Follower => 1,
    }
}

impl Sizer {
    pub fn new(config: SizerConfig) -> Self {
        Self { config, cache: Mutex::new(std::collections::HashMap::new()) }
    }

    /// The configured strategy's wire-stable tag, for audit rows and logs.
    pub fn strategy_tag(&self) -> &'static str {
        self.config.strategy.as_str()
    }

    /// Current cached snapshot for a role, if present and not stale.
    pub fn cached_funds(&self, role: AccountRole) -> Option<FundsSnapshot> {
        let cache = self.cache.lock();
        cache.get(&role_key(role)).and_then(|c| {
            if c.fetched_at.elapsed() < self.config.funds_ttl {
                Some(c.snapshot)
            } else {
                None
            }
        })
    }

    fn store_cache(&self, role: AccountRole, snapshot: FundsSnapshot) {
        self.cache.lock().insert(role_key(role), CachedFunds { snapshot, fetched_at: Instant::now() });
    }

    /// Return a fresh snapshot, refreshing via `source` if the cache is
    /// stale or absent. On refresh failure, returns the last good snapshot
    /// marked stale (`.1 == true`) so the caller can decide whether to
    /// proceed; a placement should only proceed on a fresh snapshot.
    pub async fn funds(&self, role: AccountRole, source: &dyn FundsSource) -> Result<(FundsSnapshot, bool)> {
        if let Some(snapshot) = self.cached_funds(role) {
            return Ok((snapshot, false));
        }
        match source.fetch_funds(role).await {
            Ok(snapshot) => {
                self.store_cache(role, snapshot);
                Ok((snapshot, false))
            }
            Err(e) => {
                let stale = self.cache.lock().get(&role_key(role)).map(|c| c.snapshot);
                match stale {
                    Some(snapshot) => {
                        warn!("funds refresh for {:?} failed, using stale snapshot: {}", role, e);
                        Ok((snapshot, true))
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Round `raw` down to the nearest whole lot; bump to one lot if `raw >
    /// 0` rounded to zero, but only when that single lot's value fits the
    /// cap.
    pub fn round_to_lots(raw: f64, lot_size: i64, price: f64, cap_value: f64) -> i64 {
        if lot_size <= 0 {
            return 0;
        }
        let lots = (raw / lot_size as f64).floor();
        let mut qty = (lots as i64) * lot_size;
        if qty == 0 && raw > 0.0 {
            let one_lot_value = lot_size as f64 * price;
            if one_lot_value <= cap_value {
                qty = lot_size;
            }
        }
        qty
    }

    /// Reduce `qty` to the largest lot multiple whose position value fits
    /// `cap_value`; zero if even one lot does not fit.
    fn apply_cap(qty: i64, lot_size: i64, price: f64, cap_value: f64) -> i64 {
        if lot_size <= 0 || price <= 0.0 {
            return qty;
        }
        let mut q = qty;
        while q > 0 && (q as f64 * price) > cap_value {
            q -= lot_size;
        }
        q.max(0)
    }

    /// Compute the follower quantity for a leader quantity, per the
    /// configured strategy.
    pub fn compute_quantity(
        &self,
        leader_qty: i64,
        price: f64,
        leader_funds: &FundsSnapshot,
        follower_funds: &FundsSnapshot,
        instrument: &Instrument,
    ) -> SizingOutcome {
        let lot_size = instrument.lot_size.max(1);
        let cap_value = self.config.max_position_pct * follower_funds.available_balance;

        let (raw, capital_ratio) = match self.config.strategy {
            SizingStrategy::CapitalProportional => self.capital_proportional(leader_qty, leader_funds, follower_funds),
            SizingStrategy::FixedRatio => match self.config.copy_ratio {
                Some(ratio) => (leader_qty as f64 * ratio, None),
                None => self.capital_proportional(leader_qty, leader_funds, follower_funds),
            },
            SizingStrategy::RiskBased => match instrument.premium {
                Some(premium) if premium > 0.0 => {
                    let leader_lots = (leader_qty as f64 / lot_size as f64).floor();
                    let max_lots_by_cap = (cap_value / (premium * lot_size as f64)).floor();
                    let lots = leader_lots.min(max_lots_by_cap).max(0.0);
                    (lots * lot_size as f64, None)
                }
                _ => self.capital_proportional(leader_qty, leader_funds, follower_funds),
            },
        };

        let rounded = Self::round_to_lots(raw, lot_size, price, cap_value);
        let capped = Self::apply_cap(rounded, lot_size, price, cap_value);

        if capped <= 0 {
            SizingOutcome::Zero
        } else {
            SizingOutcome::Quantity { qty: capped, capital_ratio }
        }
    }

    fn capital_proportional(&self, leader_qty: i64, leader_funds: &FundsSnapshot, follower_funds: &FundsSnapshot) -> (f64, Option<f64>) {
        if leader_funds.available_balance <= 0.0 {
            return (0.0, Some(0.0));
        }
        let ratio = follower_funds.available_balance / leader_funds.available_balance;
        (leader_qty as f64 * ratio, Some(ratio))
    }

    /// Proportional disclosed quantity per the entry-order handling rule:
    /// `floor(follower_qty * disclosed_leader / leader_qty)`, clamped to one
    /// lot (if the leader disclosed any) through `follower_qty`.
    pub fn proportional_disclosed_qty(follower_qty: i64, leader_qty: i64, leader_disclosed: i64, lot_size: i64) -> i64 {
        if leader_qty <= 0 || leader_disclosed <= 0 {
            return 0;
        }
        let raw = (follower_qty as f64 * leader_disclosed as f64 / leader_qty as f64).floor() as i64;
        raw.clamp(lot_size.max(1), follower_qty.max(lot_size.max(1))).min(follower_qty)
    }

    /// Estimate required margin and compare against available balance.
    pub fn validate(&self, qty: i64, price: f64, instrument: &Instrument, follower_funds: &FundsSnapshot) -> Result<()> {
        let estimated_margin = match instrument.premium {
            Some(premium) if premium > 0.0 => premium * qty as f64,
            _ => price * qty as f64,
        };
        if estimated_margin > follower_funds.available_balance {
            return Err(ReplicationError::new(
                ErrorKind::InsufficientFunds,
                format!(
                    "estimated margin {estimated_margin:.2} exceeds available balance {:.2}",
                    follower_funds.available_balance
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn instrument(lot_size: i64, premium: Option<f64>) -> Instrument {
        Instrument {
            security_id: "SEC1".into(),
            symbol: "TEST".into(),
            lot_size,
            tick_size: rust_decimal_macros::dec!(0.05),
            premium,
        }
    }

    fn funds(available: f64) -> FundsSnapshot {
        FundsSnapshot { available_balance: available, utilized: 0.0, collateral: 0.0, captured_at_ts: 0 }
    }

    #[test]
    fn capital_proportional_scales_by_available_ratio() {
        let sizer = Sizer::new(SizerConfig { strategy: SizingStrategy::CapitalProportional, ..Default::default() });
        let outcome = sizer.compute_quantity(100, 1500.0, &funds(200_000.0), &funds(100_000.0), &instrument(50, None));
        assert_eq!(outcome, SizingOutcome::Quantity { qty: 50, capital_ratio: Some(0.5) });
    }

    #[test]
    fn zero_leader_available_yields_zero() {
        let sizer = Sizer::new(SizerConfig::default());
        let outcome = sizer.compute_quantity(100, 1500.0, &funds(0.0), &funds(100_000.0), &instrument(50, None));
        assert_eq!(outcome, SizingOutcome::Zero);
    }

    #[test]
    fn fixed_ratio_uses_configured_multiplier() {
        let sizer = Sizer::new(SizerConfig {
            strategy: SizingStrategy::FixedRatio,
            copy_ratio: Some(2.0),
            max_position_pct: 1.0,
            ..Default::default()
        });
        let outcome = sizer.compute_quantity(1000, 150.0, &funds(1.0), &funds(1_000_000.0), &instrument(1, None));
        assert_eq!(outcome, SizingOutcome::Quantity { qty: 2000, capital_ratio: None });
    }

    #[test]
    fn fixed_ratio_without_configured_ratio_falls_back_to_proportional() {
        let sizer = Sizer::new(SizerConfig { strategy: SizingStrategy::FixedRatio, copy_ratio: None, ..Default::default() });
        let outcome = sizer.compute_quantity(100, 1500.0, &funds(200_000.0), &funds(100_000.0), &instrument(50, None));
        assert_eq!(outcome, SizingOutcome::Quantity { qty: 50, capital_ratio: Some(0.5) });
    }

    #[test]
    fn risk_based_caps_by_premium_and_position_value() {
        let sizer = Sizer::new(SizerConfig { strategy: SizingStrategy::RiskBased, max_position_pct: 1.0, ..Default::default() });
        // lot_size 25, premium 100 -> one lot costs 2500; cap is 10000 -> max 4 lots of 25 = 100
        let outcome = sizer.compute_quantity(200, 0.0, &funds(1.0), &funds(10_000.0), &instrument(25, Some(100.0)));
        assert_eq!(outcome, SizingOutcome::Quantity { qty: 100, capital_ratio: None });
    }

    #[test]
    fn risk_based_without_premium_falls_back_to_proportional() {
        let sizer = Sizer::new(SizerConfig { strategy: SizingStrategy::RiskBased, ..Default::default() });
        let outcome = sizer.compute_quantity(100, 1500.0, &funds(200_000.0), &funds(100_000.0), &instrument(50, None));
        assert_eq!(outcome, SizingOutcome::Quantity { qty: 50, capital_ratio: Some(0.5) });
    }

    #[test]
    fn sub_one_lot_rounds_up_when_cap_permits() {
        let raw = 10.0;
        let qty = Sizer::round_to_lots(raw, 50, 10.0, 1_000.0);
        assert_eq!(qty, 50);
    }

    #[test]
    fn sub_one_lot_yields_zero_when_cap_forbids() {
        let qty = Sizer::round_to_lots(10.0, 50, 100.0, 1_000.0); // one lot = 5000 > cap
        assert_eq!(qty, 0);
    }

    #[test]
    fn cap_reduces_to_largest_fitting_lot_multiple() {
        let qty = Sizer::apply_cap(500, 50, 25.0, 400.0); // 500*25=12500 too big; 50*25=1250 still too big
        assert_eq!(qty, 0);
        let qty2 = Sizer::apply_cap(500, 50, 1.0, 400.0); // 500*1=500 > 400; drop to 450*1=450>400; ... 400
        assert_eq!(qty2, 400);
    }

    #[test]
    fn proportional_disclosed_qty_clamps_to_one_lot_minimum() {
        let qty = Sizer::proportional_disclosed_qty(50, 100, 1, 50);
        assert_eq!(qty, 50);
    }

    #[test]
    fn proportional_disclosed_qty_zero_when_leader_undisclosed() {
        let qty = Sizer::proportional_disclosed_qty(50, 100, 0, 50);
        assert_eq!(qty, 0);
    }

    #[test]
    fn validate_rejects_when_margin_exceeds_balance() {
        let sizer = Sizer::new(SizerConfig::default());
        let result = sizer.validate(2000, 150.0, &instrument(1, None), &funds(100_000.0));
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientFunds);
    }

    #[test]
    fn validate_accepts_when_margin_within_balance() {
        let sizer = Sizer::new(SizerConfig::default());
        let result = sizer.validate(50, 1500.0, &instrument(50, None), &funds(100_000.0));
        assert!(result.is_ok());
    }

    proptest! {
        /// `compute_quantity` is a pure function of its arguments: same
        /// inputs, same outcome, no hidden state leaking between calls.
        #[test]
        fn compute_quantity_is_pure(
            leader_qty in 1i64..50_000,
            price in 0.01..50_000.0f64,
            leader_avail in 1.0..10_000_000.0f64,
            follower_avail in 0.0..10_000_000.0f64,
        ) {
            let sizer = Sizer::new(SizerConfig::default());
            let instr = instrument(50, None);
            let leader = funds(leader_avail);
            let follower = funds(follower_avail);
            let a = sizer.compute_quantity(leader_qty, price, &leader, &follower, &instr);
            let b = sizer.compute_quantity(leader_qty, price, &leader, &follower, &instr);
            prop_assert_eq!(a, b);
        }

        /// Whatever comes out of `round_to_lots` is always a non-negative
        /// multiple of the instrument's lot size.
        #[test]
        fn round_to_lots_is_always_a_lot_multiple(
            raw in 0.0..200_000.0f64,
            lot_size in 1i64..1_000,
            price in 0.01..10_000.0f64,
            cap_value in 0.0..10_000_000.0f64,
        ) {
            let qty = Sizer::round_to_lots(raw, lot_size, price, cap_value);
            prop_assert!(qty >= 0);
            prop_assert_eq!(qty % lot_size, 0);
        }

        /// `apply_cap` never leaves a position whose value exceeds the cap,
        /// and what it returns stays a lot multiple of the input quantity.
        #[test]
        fn apply_cap_never_exceeds_the_cap_value(
            lots in 0i64..500,
            lot_size in 1i64..1_000,
            price in 0.01..10_000.0f64,
            cap_value in 0.0..10_000_000.0f64,
        ) {
            let qty = lots * lot_size;
            let capped = Sizer::apply_cap(qty, lot_size, price, cap_value);
            prop_assert!(capped >= 0);
            prop_assert!(capped <= qty);
            prop_assert_eq!(capped % lot_size, 0);
            if capped > 0 {
                prop_assert!(capped as f64 * price <= cap_value + 1e-6);
            }
        }
    }
}
