//! Payment Error Types

use thiserror::Error;

use crate::core_types::Coin;
use crate::money::MoneyError;
use crate::rail::RailError;

/// Payment lifecycle errors
///
/// Terminal poll outcomes are statuses, not errors; `ProviderRejected` and
/// `Timeout` appear here only when a caller asks for a `Result` via
/// [`super::Transaction::settle`] or when a submission is refused outright.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    // === Input Errors (never reach the rail) ===
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid {coin} address: {address}")]
    InvalidAddress { address: String, coin: Coin },

    #[error("Unsupported coin: {0}")]
    UnsupportedCoin(String),

    #[error("Amount error: {0}")]
    Money(#[from] MoneyError),

    // === Rail Errors ===
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Payment provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("No terminal status after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("No USD price for {0}")]
    PriceUnavailable(Coin),

    #[error("Session is not authenticated")]
    Unauthenticated,

    // === State Errors ===
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl PaymentError {
    /// Get the error code for the UI collaborator
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::InvalidAddress { .. } => "INVALID_ADDRESS",
            PaymentError::UnsupportedCoin(_) => "UNSUPPORTED_COIN",
            PaymentError::Money(_) => "INVALID_AMOUNT",
            PaymentError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            PaymentError::ProviderRejected(_) => "PROVIDER_REJECTED",
            PaymentError::Timeout { .. } => "TIMEOUT",
            PaymentError::PriceUnavailable(_) => "PRICE_UNAVAILABLE",
            PaymentError::Unauthenticated => "UNAUTHENTICATED",
            PaymentError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            PaymentError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
        }
    }

    /// Only `ProviderUnavailable` is "try again": nothing was created
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::ProviderUnavailable(_))
    }

    /// Map a rail error raised while submitting or checking a request.
    ///
    /// 5xx/transport/garbled responses mean the rail could not answer;
    /// a 4xx or explicit rejection means it answered "no".
    pub fn from_rail(err: RailError) -> Self {
        match err {
            err if err.is_transient() => PaymentError::ProviderUnavailable(err.to_string()),
            RailError::Unauthenticated | RailError::Http { status: 401 | 403, .. } => {
                PaymentError::Unauthenticated
            }
            RailError::Rejected(reason) => PaymentError::ProviderRejected(reason),
            RailError::Http { status, message } if (400..500).contains(&status) => {
                PaymentError::ProviderRejected(message)
            }
            other => PaymentError::ProviderUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PaymentError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(
            PaymentError::InvalidAddress {
                address: "abc".into(),
                coin: Coin::Btc
            }
            .code(),
            "INVALID_ADDRESS"
        );
        assert_eq!(PaymentError::Timeout { attempts: 30 }.code(), "TIMEOUT");
        assert_eq!(
            PaymentError::UnsupportedCoin("DOGE".into()).code(),
            "UNSUPPORTED_COIN"
        );
    }

    #[test]
    fn test_rail_error_mapping() {
        assert_eq!(
            PaymentError::from_rail(RailError::Transport("reset".into())).code(),
            "PROVIDER_UNAVAILABLE"
        );
        assert_eq!(
            PaymentError::from_rail(RailError::Http {
                status: 502,
                message: "bad gateway".into()
            })
            .code(),
            "PROVIDER_UNAVAILABLE"
        );
        assert_eq!(
            PaymentError::from_rail(RailError::Http {
                status: 422,
                message: "phone not registered".into()
            }),
            PaymentError::ProviderRejected("phone not registered".into())
        );
        assert_eq!(
            PaymentError::from_rail(RailError::Http {
                status: 401,
                message: "expired".into()
            }),
            PaymentError::Unauthenticated
        );
        assert_eq!(
            PaymentError::from_rail(RailError::Http {
                status: 429,
                message: "slow down".into()
            })
            .code(),
            "PROVIDER_UNAVAILABLE"
        );
        assert_eq!(
            PaymentError::from_rail(RailError::UnrecognizedResponse("x".into())).code(),
            "PROVIDER_UNAVAILABLE"
        );
        assert_eq!(
            PaymentError::from_rail(RailError::Http {
                status: 304,
                message: "not modified".into()
            })
            .code(),
            "PROVIDER_UNAVAILABLE"
        );
    }

    #[test]
    fn test_transient_rail_errors_are_retryable() {
        let errors = [
            RailError::Transport("reset".into()),
            RailError::Http {
                status: 500,
                message: "boom".into(),
            },
            RailError::Http {
                status: 429,
                message: "slow down".into(),
            },
        ];
        for err in errors {
            assert!(err.is_transient());
            assert!(PaymentError::from_rail(err).is_retryable());
        }

        let rejected = RailError::Http {
            status: 400,
            message: "bad phone".into(),
        };
        assert!(!rejected.is_transient());
        assert!(!PaymentError::from_rail(rejected).is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(PaymentError::ProviderUnavailable("down".into()).is_retryable());
        assert!(!PaymentError::ProviderRejected("no".into()).is_retryable());
        assert!(!PaymentError::Validation("amount".into()).is_retryable());
        assert!(!PaymentError::Timeout { attempts: 30 }.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = PaymentError::InvalidAddress {
            address: "0x12".into(),
            coin: Coin::Eth,
        };
        assert_eq!(err.to_string(), "Invalid ETH address: 0x12");
    }
}
