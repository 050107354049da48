//! Transaction status definitions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction status
///
/// Terminal states: COMPLETED, FAILED, TIMED_OUT. No transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Submitted, outcome not yet observed
    Pending,

    /// Terminal: rail reported success
    Completed,

    /// Terminal: rail reported failure (carries a reason)
    Failed,

    /// Terminal: attempt budget exhausted without a terminal report.
    /// Distinct from `Failed` so the caller can offer a manual verify.
    TimedOut,
}

impl TransactionStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::TimedOut => "TIMED_OUT",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
