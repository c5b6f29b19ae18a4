//! Error taxonomy of the billing core.
//!
//! Validation variants are raised before any write touches the store, so a
//! rejected request never leaves partial state behind. `Storage` wraps the
//! store's own failures; write-path storage errors are always surfaced to the
//! caller, never swallowed or retried.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("unknown cycle: {0}")]
    InvalidCycle(String),

    #[error("period not in cycle calendar: {0}")]
    InvalidPeriod(String),

    #[error("manual splits sum {allocated} does not match payment total {declared}")]
    AmountMismatch { declared: f64, allocated: f64 },

    #[error("invalid payment amount: {0}")]
    InvalidAmount(f64),

    #[error("invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("caller may not view this student")]
    Forbidden,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl BillingError {
    /// Whether the error was raised by input validation, before any write.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BillingError::InvalidCycle(_)
                | BillingError::InvalidPeriod(_)
                | BillingError::AmountMismatch { .. }
                | BillingError::InvalidAmount(_)
                | BillingError::InvalidDate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
