//! HTTP rail client
//!
//! Speaks the backend's REST contracts with `reqwest`. Every response body is
//! handed to [`super::wire`] for parsing; no retries happen here.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use tracing::{debug, warn};

use super::wire::{
    self, CryptoTransferPayload, GasQuote, InitiatePayload, InitiateReceipt, PriceTable, RailStatus,
};
use super::{PaymentRail, RailError};
use crate::config::RailConfig;
use crate::core_types::Coin;
use crate::session::Session;

const TENANT_HEADER: &str = "X-Tenant-ID";

/// REST client for the payment/crypto backend
pub struct HttpRail {
    client: Client,
    base_url: Url,
    session: Arc<Session>,
}

impl HttpRail {
    pub fn new(config: &RailConfig, session: Arc<Session>) -> Result<Self, RailError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RailError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| RailError::Transport(format!("Invalid base url {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RailError::Transport(format!(
                "Base url cannot carry paths: {}",
                config.base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Append percent-encoded path segments to the base url
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, RailError> {
        let token = self.session.bearer().ok_or(RailError::Unauthenticated)?;
        let builder = builder.bearer_auth(token);
        Ok(match self.session.tenant_id() {
            Some(tenant) => builder.header(TENANT_HEADER, tenant),
            None => builder,
        })
    }

    /// Send and return the body of a 2xx response
    async fn send(&self, endpoint: &str, builder: RequestBuilder) -> Result<String, RailError> {
        let builder = self.authorize(builder)?;
        debug!(endpoint, "Rail request");

        let response = builder
            .send()
            .await
            .map_err(|e| RailError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RailError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = wire::error_message(&body);
            warn!(endpoint, status = status.as_u16(), %message, "Rail returned error status");
            return Err(RailError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl PaymentRail for HttpRail {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn initiate(&self, payload: &InitiatePayload) -> Result<InitiateReceipt, RailError> {
        let url = self.endpoint(&["payments", "initiate"]);
        let body = self
            .send("payments/initiate", self.client.post(url).json(payload))
            .await?;
        wire::parse_initiate(&body)
    }

    async fn submit_crypto_transfer(
        &self,
        payload: &CryptoTransferPayload,
    ) -> Result<InitiateReceipt, RailError> {
        let url = self.endpoint(&["crypto", "transfers"]);
        let builder = self.authorize(self.client.post(url).json(payload))?;

        // `{success: false}` may arrive with a 4xx status
        let response = builder
            .send()
            .await
            .map_err(|e| RailError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RailError::Transport(e.to_string()))?;

        if status.is_server_error() {
            return Err(RailError::Http {
                status: status.as_u16(),
                message: wire::error_message(&body),
            });
        }

        match wire::parse_crypto_transfer(&body) {
            Ok(receipt) if status.is_success() => Ok(receipt),
            Ok(_) | Err(RailError::UnrecognizedResponse(_)) if !status.is_success() => {
                Err(RailError::Http {
                    status: status.as_u16(),
                    message: wire::error_message(&body),
                })
            }
            other => other,
        }
    }

    async fn payment_status(&self, reference: &str) -> Result<RailStatus, RailError> {
        let url = self.endpoint(&["payments", "status", reference]);
        let body = self.send("payments/status", self.client.get(url)).await?;
        wire::parse_status(&body)
    }

    async fn validate_address(&self, address: &str, coin: Coin) -> Result<bool, RailError> {
        let mut url = self.endpoint(&["crypto", "validate-address"]);
        url.query_pairs_mut()
            .append_pair("address", address)
            .append_pair("coin", coin.symbol());
        let body = self
            .send("crypto/validate-address", self.client.get(url))
            .await?;
        wire::parse_validation(&body)
    }

    async fn network_fees(&self, coin: Coin) -> Result<GasQuote, RailError> {
        let url = self.endpoint(&["crypto", "fees", coin.symbol()]);
        let body = self.send("crypto/fees", self.client.get(url)).await?;
        wire::parse_fees(&body)
    }

    async fn prices(&self, coins: &[Coin]) -> Result<PriceTable, RailError> {
        let keys: Vec<String> = coins.iter().map(Coin::price_key).collect();
        let mut url = self.endpoint(&["crypto", "prices"]);
        url.query_pairs_mut().append_pair("coins", &keys.join(","));
        let body = self.send("crypto/prices", self.client.get(url)).await?;
        wire::parse_prices(&body)
    }
}
