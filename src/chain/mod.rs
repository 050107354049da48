//! Crypto helpers used before a transfer is submitted
//!
//! - [`address`]: local format/checksum rules plus the rail's validation call
//! - [`fee`]: network fee and fiat value quotes

pub mod address;
pub mod fee;

pub use address::{AddressValidator, ValidatedAddress};
pub use fee::{FeeCalculator, FeeQuote, MarketSnapshot};
