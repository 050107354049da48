//! Rail wire format
//!
//! The single parsing boundary between rail JSON and canonical types.
//! Every response body goes through one of the `parse_*` functions; a body
//! missing a required field fails with `RailError::UnrecognizedResponse`
//! instead of being guessed at.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::RailError;
use crate::core_types::{Coin, Currency, FeePriority, Rail};

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /payments/initiate`
#[derive(Debug, Clone, Serialize)]
pub struct InitiatePayload {
    pub rail: Rail,
    pub destination: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub purpose: String,
    pub metadata: BTreeMap<String, String>,
}

/// Body of `POST /crypto/transfers`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoTransferPayload {
    pub from_wallet: String,
    pub to_address: String,
    pub amount: Decimal,
    pub coin: Coin,
    pub network_fee: Decimal,
    pub total_amount: Decimal,
    pub priority: FeePriority,
}

// ============================================================================
// Canonical responses
// ============================================================================

/// Accepted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateReceipt {
    /// Rail-side transaction id, when the rail assigns one immediately
    pub transaction_id: Option<String>,
    pub provider_reference: String,
}

/// Status reported by the rail for one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RailStatus {
    Succeeded,
    Failed { reason: String },
    /// Pending, processing, or a status word we do not recognize
    InProgress { raw: String },
}

impl RailStatus {
    /// Map a rail status word.
    ///
    /// Only explicit success/failure words are terminal; everything else keeps
    /// the transaction pending so the attempt budget decides.
    pub fn from_word(word: &str, reason: Option<String>) -> Self {
        let normalized = word.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "completed" | "complete" | "success" | "successful" | "succeeded" | "confirmed"
            | "paid" => RailStatus::Succeeded,
            "failed" | "failure" | "error" | "rejected" | "declined" | "cancelled"
            | "canceled" | "expired" | "reversed" => RailStatus::Failed {
                reason: reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| format!("rail reported {}", normalized)),
            },
            _ => RailStatus::InProgress { raw: normalized },
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RailStatus::InProgress { .. })
    }
}

/// Network fee inputs for one coin, in the coin's base units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasQuote {
    pub gas_price: Decimal,
    pub gas_limit: Decimal,
}

/// USD unit price per coin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    usd: HashMap<Coin, Decimal>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, coin: Coin, usd: Decimal) -> Self {
        self.usd.insert(coin, usd);
        self
    }

    pub fn usd(&self, coin: Coin) -> Option<Decimal> {
        self.usd.get(&coin).copied()
    }

    pub fn len(&self) -> usize {
        self.usd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usd.is_empty()
    }
}

// ============================================================================
// Raw shapes
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInitiate {
    transaction_id: Option<String>,
    provider_reference: String,
}

#[derive(Deserialize)]
struct RawStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct RawTransfer {
    success: bool,
    data: Option<RawInitiate>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawValidation {
    valid: bool,
}

#[derive(Deserialize)]
struct RawPrice {
    usd: Decimal,
}

/// Error envelope some rails put on non-2xx responses
#[derive(Deserialize)]
struct RawErrorBody {
    #[serde(alias = "message")]
    error: String,
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, RailError> {
    serde_json::from_str(body)
        .map_err(|e| RailError::UnrecognizedResponse(format!("{}: {}", endpoint, e)))
}

fn receipt(endpoint: &str, raw: RawInitiate) -> Result<InitiateReceipt, RailError> {
    if raw.provider_reference.trim().is_empty() {
        return Err(RailError::UnrecognizedResponse(format!(
            "{}: empty providerReference",
            endpoint
        )));
    }
    Ok(InitiateReceipt {
        transaction_id: raw.transaction_id.filter(|id| !id.trim().is_empty()),
        provider_reference: raw.provider_reference,
    })
}

// ============================================================================
// Parsers
// ============================================================================

pub fn parse_initiate(body: &str) -> Result<InitiateReceipt, RailError> {
    let raw: RawInitiate = decode("payments/initiate", body)?;
    receipt("payments/initiate", raw)
}

pub fn parse_status(body: &str) -> Result<RailStatus, RailError> {
    let raw: RawStatus = decode("payments/status", body)?;
    Ok(RailStatus::from_word(&raw.status, raw.reason))
}

/// `{success: true, data}` is a receipt, `{success: false, error}` a rejection
pub fn parse_crypto_transfer(body: &str) -> Result<InitiateReceipt, RailError> {
    let raw: RawTransfer = decode("crypto/transfers", body)?;
    match (raw.success, raw.data) {
        (true, Some(data)) => receipt("crypto/transfers", data),
        (true, None) => Err(RailError::UnrecognizedResponse(
            "crypto/transfers: success without data".into(),
        )),
        (false, _) => Err(RailError::Rejected(
            raw.error
                .unwrap_or_else(|| "transfer rejected without reason".into()),
        )),
    }
}

pub fn parse_validation(body: &str) -> Result<bool, RailError> {
    let raw: RawValidation = decode("crypto/validate-address", body)?;
    Ok(raw.valid)
}

pub fn parse_fees(body: &str) -> Result<GasQuote, RailError> {
    let gas: GasQuote = decode("crypto/fees", body)?;
    if gas.gas_price.is_sign_negative() || gas.gas_limit.is_sign_negative() {
        return Err(RailError::UnrecognizedResponse(
            "crypto/fees: negative gas value".into(),
        ));
    }
    Ok(gas)
}

/// Unknown coin keys are skipped; a key we support must carry a `usd` price
pub fn parse_prices(body: &str) -> Result<PriceTable, RailError> {
    let raw: HashMap<String, RawPrice> = decode("crypto/prices", body)?;
    let mut table = PriceTable::new();
    for (key, price) in raw {
        if let Ok(coin) = key.parse::<Coin>() {
            table = table.with_price(coin, price.usd);
        }
    }
    Ok(table)
}

/// Best-effort message from an error body
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<RawErrorBody>(body) {
        Ok(raw) => raw.error,
        Err(_) => body.chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_initiate() {
        let receipt =
            parse_initiate(r#"{"transactionId":"tx-1","providerReference":"MTN-REF-9"}"#).unwrap();
        assert_eq!(receipt.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(receipt.provider_reference, "MTN-REF-9");

        let receipt = parse_initiate(r#"{"providerReference":"REF"}"#).unwrap();
        assert!(receipt.transaction_id.is_none());
    }

    #[test]
    fn test_parse_initiate_rejects_unknown_shape() {
        // Legacy `reference` field is not guessed at
        let err = parse_initiate(r#"{"id":"tx-1","reference":"REF"}"#).unwrap_err();
        assert!(matches!(err, RailError::UnrecognizedResponse(_)));

        let err = parse_initiate(r#"{"providerReference":"  "}"#).unwrap_err();
        assert!(matches!(err, RailError::UnrecognizedResponse(_)));
    }

    #[test]
    fn test_status_words() {
        assert_eq!(parse_status(r#"{"status":"completed"}"#).unwrap(), RailStatus::Succeeded);
        assert_eq!(parse_status(r#"{"status":"SUCCESSFUL"}"#).unwrap(), RailStatus::Succeeded);
        assert_eq!(
            parse_status(r#"{"status":"failed","reason":"insufficient funds"}"#).unwrap(),
            RailStatus::Failed {
                reason: "insufficient funds".into()
            }
        );
        assert_eq!(
            parse_status(r#"{"status":"declined"}"#).unwrap(),
            RailStatus::Failed {
                reason: "rail reported declined".into()
            }
        );
        assert_eq!(
            parse_status(r#"{"status":"pending"}"#).unwrap(),
            RailStatus::InProgress {
                raw: "pending".into()
            }
        );
        assert!(!parse_status(r#"{"status":"awaiting_otp"}"#).unwrap().is_terminal());
        assert!(parse_status(r#"{"state":"completed"}"#).is_err());
    }

    #[test]
    fn test_parse_crypto_transfer() {
        let ok = parse_crypto_transfer(
            r#"{"success":true,"data":{"transactionId":"c-1","providerReference":"0xabc"}}"#,
        )
        .unwrap();
        assert_eq!(ok.provider_reference, "0xabc");

        let rejected =
            parse_crypto_transfer(r#"{"success":false,"error":"wallet locked"}"#).unwrap_err();
        assert_eq!(rejected, RailError::Rejected("wallet locked".into()));

        assert!(matches!(
            parse_crypto_transfer(r#"{"success":true}"#),
            Err(RailError::UnrecognizedResponse(_))
        ));
    }

    #[test]
    fn test_parse_fees_accepts_numbers_and_strings() {
        let gas = parse_fees(r#"{"gasPrice":20,"gasLimit":"250"}"#).unwrap();
        assert_eq!(gas.gas_price, Decimal::from(20));
        assert_eq!(gas.gas_limit, Decimal::from(250));

        assert!(parse_fees(r#"{"gasPrice":-1,"gasLimit":250}"#).is_err());
        assert!(parse_fees(r#"{"price":1}"#).is_err());
    }

    #[test]
    fn test_parse_prices() {
        let table =
            parse_prices(r#"{"btc":{"usd":65000.5},"eth":{"usd":"3200"},"doge":{"usd":0.1}}"#)
                .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.usd(Coin::Btc), Some(Decimal::from_str("65000.5").unwrap()));
        assert_eq!(table.usd(Coin::Usdt), None);
        assert!(parse_prices(r#"{"btc":{"eur":1}}"#).is_err());
    }

    #[test]
    fn test_payload_serialization() {
        let payload = InitiatePayload {
            rail: Rail::MobileMoneyMtn,
            destination: "256772000000".into(),
            amount: Decimal::from(50_000),
            currency: Currency::from_str("UGX").unwrap(),
            purpose: "wallet_funding".into(),
            metadata: BTreeMap::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["rail"], "mtn_momo");
        assert_eq!(json["amount"], "50000");
        assert_eq!(json["currency"], "UGX");
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"error":"bad phone"}"#), "bad phone");
        assert_eq!(error_message(r#"{"message":"bad phone"}"#), "bad phone");
        assert_eq!(error_message("upstream down"), "upstream down");
    }
}
