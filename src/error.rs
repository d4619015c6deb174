// Error taxonomy for ledger operations

use std::fmt;

/// Which balance a check ran against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Points,
    Coins,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Points => write!(f, "points"),
            Currency::Coins => write!(f, "coins"),
        }
    }
}

/// Errors surfaced by the engine and the stores.
///
/// Every variant means the enclosing unit of work was not committed.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Request rejected before anything was read or written
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("insufficient {currency}: have {available}, need {required}")]
    InsufficientBalance {
        currency: Currency,
        available: i64,
        required: i64,
    },

    #[error("reward {0} is out of stock")]
    OutOfStock(String),

    /// Another writer won a race on the same row; safe to retry
    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Storage(err.into())
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = LedgerError::InsufficientBalance {
            currency: Currency::Coins,
            available: 3,
            required: 10,
        };
        assert_eq!(err.to_string(), "insufficient coins: have 3, need 10");
        assert_eq!(
            LedgerError::not_found("reward", "abc").to_string(),
            "reward abc not found"
        );
    }

    #[test]
    fn test_only_conflicts_retry() {
        assert!(LedgerError::Conflict("stock".into()).is_retryable());
        assert!(!LedgerError::OutOfStock("r1".into()).is_retryable());
        assert!(!LedgerError::validation("no description").is_retryable());
    }
}
