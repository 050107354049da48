//! Core types used throughout the system
//!
//! Closed enums for rails, coins and currencies. Wire strings are produced
//! and parsed only here, so adding a rail or coin is a compile-checked change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transaction ID - opaque identifier.
///
/// Taken from the rail's `transactionId` when it returns one, otherwise a
/// locally generated ULID (monotonic, sortable, no coordination needed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generate a new local id
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Wrap an id issued by the rail
    pub fn from_rail(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payment rail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rail {
    #[serde(rename = "mtn_momo")]
    MobileMoneyMtn,
    #[serde(rename = "airtel_money")]
    MobileMoneyAirtel,
    #[serde(rename = "crypto")]
    Crypto,
    #[serde(rename = "bank_transfer")]
    BankTransfer,
}

impl Rail {
    pub const ALL: [Rail; 4] = [
        Rail::MobileMoneyMtn,
        Rail::MobileMoneyAirtel,
        Rail::Crypto,
        Rail::BankTransfer,
    ];

    /// Wire name used by the rail API
    pub fn as_str(&self) -> &'static str {
        match self {
            Rail::MobileMoneyMtn => "mtn_momo",
            Rail::MobileMoneyAirtel => "airtel_money",
            Rail::Crypto => "crypto",
            Rail::BankTransfer => "bank_transfer",
        }
    }

    #[inline]
    pub fn is_mobile_money(&self) -> bool {
        matches!(self, Rail::MobileMoneyMtn | Rail::MobileMoneyAirtel)
    }
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rail::ALL
            .into_iter()
            .find(|rail| rail.as_str() == s)
            .ok_or_else(|| format!("unknown rail: {}", s))
    }
}

/// Address rule family for a coin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFormat {
    /// Base58check or bech32 Bitcoin address
    Bitcoin,
    /// `0x` + 20-byte hex account
    Evm,
}

/// Supported coins
///
/// `decimals` is the base-unit exponent: 1 BTC = 10^8 satoshi,
/// 1 ETH = 10^18 wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coin {
    Btc,
    Eth,
    Bnb,
    Usdt,
}

impl Coin {
    pub const ALL: [Coin; 4] = [Coin::Btc, Coin::Eth, Coin::Bnb, Coin::Usdt];

    pub fn symbol(&self) -> &'static str {
        match self {
            Coin::Btc => "BTC",
            Coin::Eth => "ETH",
            Coin::Bnb => "BNB",
            Coin::Usdt => "USDT",
        }
    }

    /// Base-unit exponent
    pub fn decimals(&self) -> u32 {
        match self {
            Coin::Btc => 8,
            Coin::Eth | Coin::Bnb => 18,
            Coin::Usdt => 6,
        }
    }

    pub fn address_format(&self) -> AddressFormat {
        match self {
            Coin::Btc => AddressFormat::Bitcoin,
            Coin::Eth | Coin::Bnb | Coin::Usdt => AddressFormat::Evm,
        }
    }

    /// Key used by the prices endpoint
    pub fn price_key(&self) -> String {
        self.symbol().to_ascii_lowercase()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Coin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Coin::ALL
            .into_iter()
            .find(|coin| coin.symbol() == upper)
            .ok_or_else(|| format!("unsupported coin: {}", s))
    }
}

/// Fiat currencies the portal settles in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FiatCurrency {
    Usd,
    Ugx,
    Kes,
    Tzs,
}

impl FiatCurrency {
    pub const ALL: [FiatCurrency; 4] = [
        FiatCurrency::Usd,
        FiatCurrency::Ugx,
        FiatCurrency::Kes,
        FiatCurrency::Tzs,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            FiatCurrency::Usd => "USD",
            FiatCurrency::Ugx => "UGX",
            FiatCurrency::Kes => "KES",
            FiatCurrency::Tzs => "TZS",
        }
    }

    /// Minor-unit digits (ISO 4217; UGX has none)
    pub fn decimals(&self) -> u32 {
        match self {
            FiatCurrency::Ugx => 0,
            FiatCurrency::Usd | FiatCurrency::Kes | FiatCurrency::Tzs => 2,
        }
    }
}

impl fmt::Display for FiatCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Currency of a payment: fiat code or coin symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Fiat(FiatCurrency),
    Coin(Coin),
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Fiat(fiat) => fiat.code(),
            Currency::Coin(coin) => coin.symbol(),
        }
    }

    pub fn decimals(&self) -> u32 {
        match self {
            Currency::Fiat(fiat) => fiat.decimals(),
            Currency::Coin(coin) => coin.decimals(),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if let Some(fiat) = FiatCurrency::ALL.into_iter().find(|f| f.code() == upper) {
            return Ok(Currency::Fiat(fiat));
        }
        Coin::from_str(&upper)
            .map(Currency::Coin)
            .map_err(|_| format!("unknown currency: {}", s))
    }
}

impl Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Currency::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// Fee priority for crypto transfers, forwarded to the rail as-is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeePriority {
    Low,
    #[default]
    Medium,
    High,
}
