//! Rail Adapters
//!
//! The external payment/crypto backend is consumed only through the
//! [`PaymentRail`] trait. [`http::HttpRail`] speaks the REST contracts;
//! tests use the scripted `MockRail`.

pub mod http;
pub mod wire;

pub use http::HttpRail;
pub use wire::{
    CryptoTransferPayload, GasQuote, InitiatePayload, InitiateReceipt, PriceTable, RailStatus,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::core_types::Coin;

/// Errors at the rail boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RailError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rail returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Rail rejected the request: {0}")]
    Rejected(String),

    #[error("Unrecognized rail response: {0}")]
    UnrecognizedResponse(String),

    #[error("Session has no bearer credential")]
    Unauthenticated,
}

impl RailError {
    /// Connectivity or server-side trouble; the same request may succeed later
    pub fn is_transient(&self) -> bool {
        match self {
            RailError::Transport(_) => true,
            RailError::Http { status, .. } => *status >= 500 || *status == 429,
            RailError::Rejected(_)
            | RailError::UnrecognizedResponse(_)
            | RailError::Unauthenticated => false,
        }
    }
}

/// External rail operations
///
/// Implementations must not retry internally: the caller owns the attempt
/// budget.
#[async_trait]
pub trait PaymentRail: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    /// `POST /payments/initiate`
    async fn initiate(&self, payload: &InitiatePayload) -> Result<InitiateReceipt, RailError>;

    /// `POST /crypto/transfers`
    async fn submit_crypto_transfer(
        &self,
        payload: &CryptoTransferPayload,
    ) -> Result<InitiateReceipt, RailError>;

    /// `GET /payments/status/{reference}`
    async fn payment_status(&self, reference: &str) -> Result<RailStatus, RailError>;

    /// `GET /crypto/validate-address`
    async fn validate_address(&self, address: &str, coin: Coin) -> Result<bool, RailError>;

    /// `GET /crypto/fees/{coin}`
    async fn network_fees(&self, coin: Coin) -> Result<GasQuote, RailError>;

    /// `GET /crypto/prices?coins=`
    async fn prices(&self, coins: &[Coin]) -> Result<PriceTable, RailError>;
}


#[cfg(test)]
pub use mock::MockRail;
