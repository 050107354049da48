//! Payment Lifecycle Manager
//!
//! Submits member payments to mobile money, crypto and bank transfer rails,
//! then polls each one to a bounded terminal outcome.
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers, rails, coins and currencies
//! - [`money`] - Strict decimal parsing, precision checks and display formatting
//! - [`rail`] - `PaymentRail` trait, HTTP client and wire parsing
//! - [`chain`] - Address validation and network fee quotes
//! - [`payment`] - Initiator, status poller, state store and lifecycle manager
//! - [`session`] - Bearer credential holder
//! - [`config`] / [`logging`] - YAML configuration and tracing setup

// Core types - must be first!
pub mod core_types;
pub mod money;

pub mod config;
pub mod logging;
pub mod session;

pub mod chain;
pub mod payment;
pub mod rail;

// Convenient re-exports at crate root
pub use chain::{AddressValidator, FeeCalculator, FeeQuote, ValidatedAddress};
pub use config::AppConfig;
pub use core_types::{Coin, Currency, FeePriority, FiatCurrency, Rail, TransactionId};
pub use payment::{
    CryptoTransfer, Destination, LifecycleManager, PaymentError, PaymentRequest, PollStart,
    PollerConfig, Transaction, TransactionStatus,
};
pub use rail::{HttpRail, PaymentRail, RailError};
pub use session::Session;
