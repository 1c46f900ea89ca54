//! Production [`BrokerClient`] over the broker's REST API.
//!
//! Each method is a thin `reqwest` wrapper: build the request, send it under
//! `request_timeout`, map non-2xx responses and transport errors onto
//! [`ReplicationError`] via `From<reqwest::Error>`. No retry or rate
//! limiting here — that is the dispatcher's job.

use super::{BracketPlacement, BrokerClient, ModifyPatch, PlaceOrderParams, PlacedOrder};
use crate::errors::{ReplicationError, Result};
use crate::model::{AccountRole, EventKind, FundsSnapshot, Instrument, NormalizedEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Per-role credentials and connection details.
#[derive(Debug, Clone)]
pub struct BrokerCredentials {
    pub leader_client_id: String,
    pub leader_access_token: String,
    pub follower_client_id: String,
    pub follower_access_token: String,
}

impl BrokerCredentials {
    fn token_for(&self, role: AccountRole) -> &str {
        match role {
            AccountRole::Leader => &self.leader_access_token,
            AccountRole::Follower => &self.follower_access_token,
        }
    }
}

/// Reqwest-backed broker client.
pub struct HttpBrokerClient {
    client: Client,
    base_url: String,
    credentials: BrokerCredentials,
    request_timeout: Duration,
}

impl HttpBrokerClient {
    pub fn new(base_url: impl Into<String>, credentials: BrokerCredentials, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ReplicationError::configuration(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url: base_url.into(), credentials, request_timeout })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = tokio::time::timeout(self.request_timeout, req.send())
            .await
            .map_err(|_| ReplicationError::transient("broker request timed out"))??;

        if resp.status().as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ReplicationError::rate_limited("broker throttled the request", retry_after));
        }
        if resp.status().is_server_error() {
            return Err(ReplicationError::transient(format!("broker server error: {}", resp.status())));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ReplicationError::non_retryable(format!("broker rejected request ({status}): {body}")));
        }
        resp.json::<Value>().await.map_err(ReplicationError::from)
    }

    fn place_payload(&self, params: &PlaceOrderParams) -> Value {
        serde_json::json!({
            "transactionType": params.side,
            "productType": params.product,
            "orderType": params.kind,
            "validity": params.validity,
            "securityId": params.security_id,
            "exchangeSegment": params.exchange_segment,
            "quantity": params.quantity,
            "disclosedQuantity": params.disclosed_quantity,
            "price": params.price.to_string(),
            "triggerPrice": params.trigger_price.map(|p| p.to_string()),
            "boStopLossValue": params.stop_loss_value.map(|p| p.to_string()),
            "boProfitValue": params.profit_target_value.map(|p| p.to_string()),
        })
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn fund_limits(&self, role: AccountRole) -> Result<FundsSnapshot> {
        let body = self
            .send_json(
                self.client
                    .get(self.url("/fundlimit"))
                    .header("access-token", self.credentials.token_for(role)),
            )
            .await?;

        Ok(FundsSnapshot {
            available_balance: body["availabelBalance"].as_f64().or_else(|| body["availableBalance"].as_f64()).unwrap_or(0.0),
            utilized: body["utilizedAmount"].as_f64().unwrap_or(0.0),
            collateral: body["collateralAmount"].as_f64().unwrap_or(0.0),
            captured_at_ts: chrono::Utc::now().timestamp(),
        })
    }

    async fn place_single(&self, params: PlaceOrderParams) -> Result<PlacedOrder> {
        let payload = self.place_payload(&params);
        let body = self
            .send_json(
                self.client
                    .post(self.url("/orders"))
                    .header("access-token", self.credentials.token_for(params.account_role))
                    .json(&payload),
            )
            .await?;
        Ok(PlacedOrder { order_id: body["orderId"].as_str().unwrap_or_default().to_string() })
    }

    async fn place_cover(&self, params: PlaceOrderParams) -> Result<PlacedOrder> {
        if params.stop_loss_value.is_none() {
            return Err(ReplicationError::validation("cover order requires a stop-loss value"));
        }
        self.place_single(params).await
    }

    async fn place_bracket(&self, params: PlaceOrderParams) -> Result<BracketPlacement> {
        if params.stop_loss_value.is_none() || params.profit_target_value.is_none() {
            return Err(ReplicationError::validation("bracket order requires both stop-loss and profit target"));
        }
        let payload = self.place_payload(&params);
        let body = self
            .send_json(
                self.client
                    .post(self.url("/orders"))
                    .header("access-token", self.credentials.token_for(params.account_role))
                    .json(&payload),
            )
            .await?;
        Ok(BracketPlacement {
            entry_order_id: body["orderId"].as_str().unwrap_or_default().to_string(),
            target_order_id: body["targetOrderId"].as_str().unwrap_or_default().to_string(),
            stop_order_id: body["stopOrderId"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn place_sliced(&self, params: PlaceOrderParams) -> Result<Vec<PlacedOrder>> {
        let payload = self.place_payload(&params);
        let body = self
            .send_json(
                self.client
                    .post(self.url("/orders/slice"))
                    .header("access-token", self.credentials.token_for(params.account_role))
                    .json(&payload),
            )
            .await?;
        let ids = body
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v["orderId"].as_str()).map(|s| PlacedOrder { order_id: s.to_string() }).collect())
            .unwrap_or_default();
        Ok(ids)
    }

    async fn modify_order(&self, order_id: &str, patch: ModifyPatch) -> Result<()> {
        let payload = serde_json::json!({
            "orderId": order_id,
            "quantity": patch.quantity,
            "price": patch.price.map(|p| p.to_string()),
            "triggerPrice": patch.trigger_price.map(|p| p.to_string()),
            "validity": patch.validity,
        });
        self.send_json(
            self.client
                .put(self.url(&format!("/orders/{order_id}")))
                .header("access-token", &self.credentials.follower_access_token)
                .json(&payload),
        )
        .await?;
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.send_json(
            self.client
                .delete(self.url(&format!("/orders/{order_id}")))
                .header("access-token", &self.credentials.follower_access_token),
        )
        .await?;
        Ok(())
    }

    async fn order_list(&self, role: AccountRole) -> Result<Vec<NormalizedEvent>> {
        let body = self
            .send_json(
                self.client
                    .get(self.url("/orders"))
                    .header("access-token", self.credentials.token_for(role)),
            )
            .await?;

        let events = body
            .as_array()
            .map(|arr| {
                arr.iter()
                    .enumerate()
                    .map(|(i, raw)| {
                        let status = raw["orderStatus"].as_str().unwrap_or("");
                        NormalizedEvent {
                            order_id: raw["orderId"].as_str().unwrap_or_default().to_string(),
                            sequence: i as u64,
                            kind: EventKind::classify(status),
                            payload: raw.clone(),
                            created_at_ts: raw["createTime"].as_i64().unwrap_or(0),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn instrument(&self, security_id: &str) -> Result<Instrument> {
        let body = self.send_json(self.client.get(self.url(&format!("/instruments/{security_id}")))).await?;
        Ok(Instrument {
            security_id: security_id.to_string(),
            symbol: body["symbol"].as_str().unwrap_or_default().to_string(),
            lot_size: body["lotSize"].as_i64().unwrap_or(1),
            tick_size: body["tickSize"].as_str().and_then(|s| s.parse().ok()).unwrap_or_default(),
            premium: body["lastPrice"].as_f64(),
        })
    }
}
