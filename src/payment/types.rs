//! Payment Core Types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::PaymentError;
use super::state::TransactionStatus;
use crate::chain::{FeeQuote, ValidatedAddress};
use crate::core_types::{Currency, FeePriority, Rail, TransactionId};
use crate::rail::{RailError, RailStatus};

/// Where the money goes; which variant is valid depends on the rail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// MSISDN for mobile money rails
    Phone(String),
    BankAccount(String),
    /// Crypto destination, already checked by `AddressValidator`
    Wallet(ValidatedAddress),
}

impl Destination {
    pub fn as_str(&self) -> &str {
        match self {
            Destination::Phone(s) | Destination::BankAccount(s) => s,
            Destination::Wallet(addr) => addr.address(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Destination::Phone(_) => "phone",
            Destination::BankAccount(_) => "bank_account",
            Destination::Wallet(_) => "wallet",
        }
    }
}

/// Input DTO for `PaymentInitiator::initiate`, never persisted
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub rail: Rail,
    pub destination: Destination,
    pub amount: Decimal,
    pub currency: Currency,
    pub purpose: String,
    pub metadata: BTreeMap<String, String>,
}

impl PaymentRequest {
    pub fn new(rail: Rail, destination: Destination, amount: Decimal, currency: Currency) -> Self {
        Self {
            rail,
            destination,
            amount,
            currency,
            purpose: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Input for `POST /crypto/transfers`
#[derive(Debug, Clone)]
pub struct CryptoTransfer {
    pub from_wallet: String,
    pub to: ValidatedAddress,
    pub amount: Decimal,
    pub quote: FeeQuote,
    pub priority: FeePriority,
}

/// Result of one status call, as the poller sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollObservation {
    Reported(RailStatus),
    /// Transport error, non-2xx or garbled body. Counts as an attempt only.
    Inconclusive(String),
}

impl PollObservation {
    pub fn from_result(result: Result<RailStatus, RailError>) -> Self {
        match result {
            Ok(status) => PollObservation::Reported(status),
            Err(e) => PollObservation::Inconclusive(e.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollObservation::Reported(status) if status.is_terminal())
    }
}

/// A submitted payment and its observed outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub rail: Rail,
    pub amount: Decimal,
    pub currency: Currency,
    pub destination: String,
    pub purpose: String,
    pub status: TransactionStatus,
    /// Status-poll calls issued so far
    pub attempts: u32,
    pub provider_reference: String,
    /// Set only when `status == Failed`
    pub failure_reason: Option<String>,
    /// Network fee paid on top of `amount` (crypto transfers only)
    pub network_fee: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// New `Pending` transaction with zero attempts
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: TransactionId,
        rail: Rail,
        amount: Decimal,
        currency: Currency,
        destination: impl Into<String>,
        purpose: impl Into<String>,
        provider_reference: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            rail,
            amount,
            currency,
            destination: destination.into(),
            purpose: purpose.into(),
            status: TransactionStatus::Pending,
            attempts: 0,
            provider_reference: provider_reference.into(),
            failure_reason: None,
            network_fee: None,
            created_at,
            last_polled_at: None,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply one status poll.
    ///
    /// Every call counts as an attempt. A success/failure report ends the
    /// transaction; otherwise reaching `max_attempts` ends it as `TimedOut`.
    pub fn apply_poll(
        &mut self,
        observation: &PollObservation,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<TransactionStatus, PaymentError> {
        if self.is_terminal() {
            return Err(PaymentError::InvalidStateTransition(format!(
                "{} is already {}",
                self.id, self.status
            )));
        }
        if self.attempts >= max_attempts {
            return Err(PaymentError::InvalidStateTransition(format!(
                "{} has used its {} attempts",
                self.id, max_attempts
            )));
        }

        self.attempts += 1;
        self.last_polled_at = Some(now);

        match observation {
            PollObservation::Reported(RailStatus::Succeeded) => {
                self.status = TransactionStatus::Completed;
            }
            PollObservation::Reported(RailStatus::Failed { reason }) => {
                self.status = TransactionStatus::Failed;
                self.failure_reason = Some(reason.clone());
            }
            PollObservation::Reported(RailStatus::InProgress { .. })
            | PollObservation::Inconclusive(_) => {
                if self.attempts >= max_attempts {
                    self.status = TransactionStatus::TimedOut;
                }
            }
        }

        Ok(self.status)
    }

    /// Terminal status as a `Result` for callers that want one
    pub fn settle(&self) -> Result<(), PaymentError> {
        match self.status {
            TransactionStatus::Completed => Ok(()),
            TransactionStatus::Failed => Err(PaymentError::ProviderRejected(
                self.failure_reason
                    .clone()
                    .unwrap_or_else(|| "payment failed".to_string()),
            )),
            TransactionStatus::TimedOut => Err(PaymentError::Timeout {
                attempts: self.attempts,
            }),
            TransactionStatus::Pending => Err(PaymentError::InvalidStateTransition(format!(
                "{} is still pending",
                self.id
            ))),
        }
    }
}

/// One entry of a transaction's status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub at: DateTime<Utc>,
    pub status: TransactionStatus,
    pub attempts: u32,
    pub reason: Option<String>,
}

impl StatusSnapshot {
    pub fn of(tx: &Transaction, at: DateTime<Utc>) -> Self {
        Self {
            at,
            status: tx.status,
            attempts: tx.attempts,
            reason: tx.failure_reason.clone(),
        }
    }
}
