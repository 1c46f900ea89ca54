//! Maps a raw broker event payload onto the typed [`Order`] record.
//!
//! The broker wire format is a dynamic JSON map; this is the one place in
//! the crate that reads it positionally, so everything downstream of the
//! Stream Coordinator operates on a statically shaped record.

use crate::errors::{ReplicationError, Result};
use crate::model::{AccountRole, LegKind, Order, OrderKind, OrderStatus, Product, Side, Validity};
use rust_decimal::Decimal;
use serde_json::Value;

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(|v| v.as_str())
}

fn decimal_field(payload: &Value, key: &str) -> Option<Decimal> {
    str_field(payload, key).and_then(|s| s.parse().ok()).or_else(|| payload.get(key).and_then(|v| v.as_f64()).and_then(Decimal::from_f64_retain))
}

fn side(payload: &Value) -> Side {
    match str_field(payload, "transactionType").unwrap_or("").to_ascii_uppercase().as_str() {
        "SELL" => Side::Sell,
        _ => Side::Buy,
    }
}

fn product(payload: &Value) -> Product {
    match str_field(payload, "productType").unwrap_or("").to_ascii_uppercase().as_str() {
        "CASH" => Product::Cash,
        "MARGIN" => Product::Margin,
        "CO" => Product::Co,
        "BO" => Product::Bo,
        _ => Product::Intraday,
    }
}

fn order_kind(payload: &Value) -> OrderKind {
    match str_field(payload, "orderType").unwrap_or("").to_ascii_uppercase().as_str() {
        "MARKET" => OrderKind::Market,
        "STOP_LOSS" | "STOP" => OrderKind::Stop,
        "STOP_LOSS_MARKET" | "STOPMARKET" => OrderKind::StopMarket,
        _ => OrderKind::Limit,
    }
}

fn validity(payload: &Value) -> Validity {
    match str_field(payload, "validity").unwrap_or("").to_ascii_uppercase().as_str() {
        "IOC" => Validity::Ioc,
        _ => Validity::Day,
    }
}

fn status(payload: &Value) -> OrderStatus {
    match str_field(payload, "orderStatus").unwrap_or("").to_ascii_lowercase().as_str() {
        "transit" => OrderStatus::Transit,
        "open" => OrderStatus::Open,
        "partial" | "part_traded" => OrderStatus::Partial,
        "traded" | "executed" => OrderStatus::Executed,
        "cancelled" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

fn leg_kind(payload: &Value) -> Option<LegKind> {
    match str_field(payload, "legName").unwrap_or("").to_ascii_uppercase().as_str() {
        "ENTRY_LEG" => Some(LegKind::Entry),
        "TARGET_LEG" => Some(LegKind::Target),
        "STOP_LOSS_LEG" => Some(LegKind::Stop),
        _ => None,
    }
}

/// Parse an [`Order`] out of a raw stream or order-list payload.
pub fn order_from_payload(payload: &Value, role: AccountRole) -> Result<Order> {
    let order_id = str_field(payload, "orderId")
        .ok_or_else(|| ReplicationError::validation("payload missing orderId"))?
        .to_string();
    let security_id = str_field(payload, "securityId").unwrap_or_default().to_string();
    let exchange_segment = str_field(payload, "exchangeSegment").unwrap_or_default().to_string();
    let quantity = payload.get("quantity").and_then(|v| v.as_i64()).unwrap_or(0);
    let disclosed_quantity = payload.get("disclosedQuantity").and_then(|v| v.as_i64()).unwrap_or(0);
    let filled_quantity = payload.get("filledQty").and_then(|v| v.as_i64()).unwrap_or(0);
    let price = decimal_field(payload, "price").unwrap_or_default();
    let trigger_price = decimal_field(payload, "triggerPrice");
    let average_fill_price = decimal_field(payload, "averageTradedPrice");
    let stop_loss_value = decimal_field(payload, "boStopLossValue");
    let profit_target_value = decimal_field(payload, "boProfitValue");
    let created_at_ts = payload.get("createTime").and_then(|v| v.as_i64()).unwrap_or(0);
    let updated_at_ts = payload.get("updateTime").and_then(|v| v.as_i64()).unwrap_or(created_at_ts);
    let parent_order_id = str_field(payload, "parentOrderId").map(str::to_string);
    let slice_group_id = str_field(payload, "sliceOrderId").map(str::to_string);

    let order_status = status(payload);
    Ok(Order {
        order_id,
        account_role: role,
        side: side(payload),
        product: product(payload),
        kind: order_kind(payload),
        validity: validity(payload),
        security_id,
        exchange_segment,
        quantity,
        disclosed_quantity,
        price,
        trigger_price,
        status: order_status,
        filled_quantity,
        average_fill_price,
        stop_loss_value,
        profit_target_value,
        leg_kind: leg_kind(payload),
        parent_order_id,
        slice_group_id,
        created_at_ts,
        updated_at_ts,
        completed_at_ts: if order_status.is_terminal() { Some(updated_at_ts) } else { None },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_new_order() {
        let payload = serde_json::json!({
            "orderId": "L1",
            "transactionType": "BUY",
            "productType": "INTRADAY",
            "orderType": "LIMIT",
            "validity": "DAY",
            "securityId": "SEC1",
            "exchangeSegment": "NSE_FNO",
            "quantity": 100,
            "disclosedQuantity": 0,
            "price": "1500.00",
            "orderStatus": "open",
            "createTime": 1000,
        });
        let order = order_from_payload(&payload, AccountRole::Leader).unwrap();
        assert_eq!(order.order_id, "L1");
        assert_eq!(order.quantity, 100);
        assert_eq!(order.status, OrderStatus::Open);
        assert!(!order.status.is_terminal());
    }

    #[test]
    fn missing_order_id_is_a_validation_error() {
        let payload = serde_json::json!({"orderStatus": "open"});
        let result = order_from_payload(&payload, AccountRole::Leader);
        assert!(result.is_err());
    }

    #[test]
    fn terminal_status_stamps_completed_at() {
        let payload = serde_json::json!({"orderId": "L1", "orderStatus": "cancelled", "updateTime": 2000});
        let order = order_from_payload(&payload, AccountRole::Leader).unwrap();
        assert_eq!(order.completed_at_ts, Some(2000));
    }
}
