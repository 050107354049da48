//! Payment Lifecycle
//!
//! Drives one payment from submission to a bounded terminal outcome across
//! the mobile money, crypto and bank transfer rails.
//!
//! # State Machine
//!
//! ```text
//! PENDING ──success word──► COMPLETED
//!    │
//!    ├─────failure word───► FAILED (reason)
//!    │
//!    └──budget exhausted──► TIMED_OUT
//! ```
//!
//! # Invariants
//!
//! 1. **Validate-Before-Call**: a request that fails local checks costs no network call
//! 2. **Single Writer**: after the initial insert, only the lease holder mutates a Transaction
//! 3. **Monotonic Status**: terminal Transactions are never mutated again
//! 4. **Bounded Polling**: `attempts <= max_attempts`, and no automatic retry after `TIMED_OUT`

pub mod error;
pub mod initiator;
pub mod manager;
pub mod poller;
pub mod state;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use error::PaymentError;
pub use initiator::PaymentInitiator;
pub use manager::LifecycleManager;
pub use poller::{PollHandle, PollStart, PollerConfig, StatusPoller, VerifyOutcome};
pub use state::TransactionStatus;
pub use store::{LeaseRevoker, TransactionStateStore, TransactionWriter};
pub use types::{
    CryptoTransfer, Destination, PaymentRequest, PollObservation, StatusSnapshot, Transaction,
};
