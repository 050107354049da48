//! Payment Initiator
//!
//! Validates a request locally, submits it to the rail, and writes the new
//! `Pending` Transaction. Nothing reaches the network until validation passes,
//! and nothing is stored unless the rail accepted the submission.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::error::PaymentError;
use super::store::TransactionStateStore;
use super::types::{CryptoTransfer, Destination, PaymentRequest, Transaction};
use crate::core_types::{Currency, Rail, TransactionId};
use crate::money;
use crate::rail::{CryptoTransferPayload, InitiatePayload, InitiateReceipt, PaymentRail};

/// MSISDN length bounds (E.164 allows at most 15 digits)
const PHONE_MIN_DIGITS: usize = 9;
const PHONE_MAX_DIGITS: usize = 15;

fn invalid(msg: impl Into<String>) -> PaymentError {
    PaymentError::Validation(msg.into())
}

fn check_phone(phone: &str) -> Result<(), PaymentError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("phone number must be digits: {}", phone)));
    }
    if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len()) {
        return Err(invalid(format!(
            "phone number must have {}-{} digits",
            PHONE_MIN_DIGITS, PHONE_MAX_DIGITS
        )));
    }
    Ok(())
}

/// Local checks for a payment request. Performs no I/O.
pub fn validate_request(req: &PaymentRequest) -> Result<(), PaymentError> {
    money::check_amount(req.amount, req.currency.decimals())
        .map_err(|e| invalid(format!("amount {} {}: {}", req.amount, req.currency, e)))?;

    if req.destination.as_str().trim().is_empty() {
        return Err(invalid("destination is empty"));
    }

    match (req.rail, &req.destination, req.currency) {
        (rail, Destination::Phone(phone), Currency::Fiat(_)) if rail.is_mobile_money() => {
            check_phone(phone.trim())
        }
        (Rail::BankTransfer, Destination::BankAccount(_), Currency::Fiat(_)) => Ok(()),
        (Rail::Crypto, Destination::Wallet(address), Currency::Coin(coin)) => {
            if address.coin() == coin {
                Ok(())
            } else {
                Err(invalid(format!(
                    "address was validated for {}, request is in {}",
                    address.coin(),
                    coin
                )))
            }
        }
        (rail, destination, currency) => Err(invalid(format!(
            "{} does not accept a {} destination in {}",
            rail,
            destination.kind(),
            currency
        ))),
    }
}

/// Local checks for a crypto transfer. Performs no I/O.
pub fn validate_transfer(transfer: &CryptoTransfer) -> Result<(), PaymentError> {
    let coin = transfer.to.coin();
    if transfer.from_wallet.trim().is_empty() {
        return Err(invalid("source wallet is empty"));
    }
    money::check_amount(transfer.amount, coin.decimals())
        .map_err(|e| invalid(format!("amount {} {}: {}", transfer.amount, coin, e)))?;
    if !transfer.quote.matches(transfer.amount, coin) {
        return Err(invalid("fee quote does not match amount and coin; requote"));
    }
    Ok(())
}

fn transaction_id(receipt: &InitiateReceipt) -> TransactionId {
    match &receipt.transaction_id {
        Some(id) => TransactionId::from_rail(id.clone()),
        None => TransactionId::generate(),
    }
}

pub struct PaymentInitiator {
    rail: Arc<dyn PaymentRail>,
    store: Arc<TransactionStateStore>,
}

impl PaymentInitiator {
    pub fn new(rail: Arc<dyn PaymentRail>, store: Arc<TransactionStateStore>) -> Self {
        Self { rail, store }
    }

    /// Submit via `POST /payments/initiate` and store the Pending Transaction
    pub async fn initiate(&self, req: PaymentRequest) -> Result<Transaction, PaymentError> {
        validate_request(&req)?;

        let payload = InitiatePayload {
            rail: req.rail,
            destination: req.destination.as_str().trim().to_string(),
            amount: req.amount,
            currency: req.currency,
            purpose: req.purpose.clone(),
            metadata: req.metadata.clone(),
        };

        let receipt = self.rail.initiate(&payload).await.map_err(|e| {
            warn!(
                rail = %req.rail,
                backend = self.rail.name(),
                error = %e,
                "Payment submission failed"
            );
            PaymentError::from_rail(e)
        })?;

        let tx = Transaction::pending(
            transaction_id(&receipt),
            req.rail,
            req.amount,
            req.currency,
            payload.destination,
            req.purpose,
            receipt.provider_reference,
            Utc::now(),
        );
        self.store.insert(tx.clone())?;

        info!(
            tx_id = %tx.id,
            rail = %tx.rail,
            amount = %tx.amount,
            currency = %tx.currency,
            reference = %tx.provider_reference,
            "Payment submitted"
        );
        Ok(tx)
    }

    /// Submit via `POST /crypto/transfers` and store the Pending Transaction
    pub async fn transfer_crypto(&self, transfer: CryptoTransfer) -> Result<Transaction, PaymentError> {
        validate_transfer(&transfer)?;
        let coin = transfer.to.coin();

        let payload = CryptoTransferPayload {
            from_wallet: transfer.from_wallet.trim().to_string(),
            to_address: transfer.to.address().to_string(),
            amount: transfer.amount,
            coin,
            network_fee: transfer.quote.network_fee,
            total_amount: transfer.quote.total_amount,
            priority: transfer.priority,
        };

        let receipt = self.rail.submit_crypto_transfer(&payload).await.map_err(|e| {
            warn!(%coin, backend = self.rail.name(), error = %e, "Crypto transfer submission failed");
            PaymentError::from_rail(e)
        })?;

        let mut tx = Transaction::pending(
            transaction_id(&receipt),
            Rail::Crypto,
            transfer.amount,
            Currency::Coin(coin),
            payload.to_address,
            String::new(),
            receipt.provider_reference,
            Utc::now(),
        );
        tx.network_fee = Some(transfer.quote.network_fee);
        self.store.insert(tx.clone())?;

        info!(
            tx_id = %tx.id,
            %coin,
            amount = %tx.amount,
            network_fee = %transfer.quote.network_fee,
            reference = %tx.provider_reference,
            "Crypto transfer submitted"
        );
        Ok(tx)
    }
}
