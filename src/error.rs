use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Every failure the ledger reports to its callers.
///
/// Validation and business-rule variants are expected outcomes and are
/// rendered as corrective responses; `StorageUnavailable`, `IssuanceFailed`
/// and `CodeGenerationExhausted` are faults the caller may retry.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: String },
    #[error("unknown design or add-on: {0}")]
    UnknownDesign(String),
    #[error("invalid card metadata: {0}")]
    InvalidMetadata(String),
    #[error("gift card not found")]
    CardNotFound,
    #[error("gift card is inactive")]
    CardInactive,
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },
    #[error("transaction {0} not found for this card")]
    TransactionNotFound(Uuid),
    #[error("refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsRedemption {
        requested: Decimal,
        refundable: Decimal,
    },
    #[error("idempotency key {0} was already used for a different operation")]
    IdempotencyConflict(String),
    #[error("receipt not found")]
    ReceiptNotFound,
    #[error("could not generate a unique card code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },
    #[error("card issuance failed: {0}")]
    IssuanceFailed(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn invalid_amount(amount: Decimal, reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            amount,
            reason: reason.into(),
        }
    }

    /// Faults where the operation did not apply and a retry is reasonable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_)
                | Self::IssuanceFailed(_)
                | Self::CodeGenerationExhausted { .. }
        )
    }

    /// Stable machine-readable name used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::UnknownDesign(_) => "unknown_design",
            Self::InvalidMetadata(_) => "invalid_metadata",
            Self::CardNotFound => "card_not_found",
            Self::CardInactive => "card_inactive",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::RefundExceedsRedemption { .. } => "refund_exceeds_redemption",
            Self::IdempotencyConflict(_) => "idempotency_conflict",
            Self::ReceiptNotFound => "receipt_not_found",
            Self::CodeGenerationExhausted { .. } => "code_generation_exhausted",
            Self::IssuanceFailed(_) => "issuance_failed",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_faults_are_retryable() {
        assert!(LedgerError::IssuanceFailed("db down".into()).is_retryable());
        assert!(LedgerError::StorageUnavailable(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!LedgerError::CardNotFound.is_retryable());
        assert!(!LedgerError::InsufficientBalance {
            requested: Decimal::ONE,
            available: Decimal::ZERO,
        }
        .is_retryable());
    }
}
