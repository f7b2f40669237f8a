use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One immutable entry in a card's history. `amount` is always positive;
/// the direction comes from `transaction_type`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub gift_card_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub fee_amount: Decimal,
    pub notes: Option<String>,
    pub receipt_token: Option<String>,
    pub idempotency_key: Option<String>,
    pub refund_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Amount with the sign it contributes to the balance.
    pub fn signed_amount(&self) -> Decimal {
        self.transaction_type.signed(self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Recharge,
    Redemption,
    Refund,
}

impl TransactionType {
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Self::Redemption => -amount,
            Self::Purchase | Self::Recharge | Self::Refund => amount,
        }
    }
}

/// A requested mutation of an existing card's balance.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceChange {
    pub kind: TransactionType,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub notes: Option<String>,
    pub receipt_token: String,
    pub idempotency_key: Option<String>,
    pub refund_of: Option<Uuid>,
    /// Upper bound the resulting balance may not exceed.
    pub ceiling: Decimal,
}

impl BalanceChange {
    pub fn new(kind: TransactionType, amount: Decimal, receipt_token: String, ceiling: Decimal) -> Self {
        Self {
            kind,
            amount,
            fee_amount: Decimal::ZERO,
            notes: None,
            receipt_token,
            idempotency_key: None,
            refund_of: None,
            ceiling,
        }
    }

    /// Whether a stored transaction is the result of this same request.
    pub fn matches(&self, existing: &Transaction) -> bool {
        existing.transaction_type == self.kind
            && existing.amount == self.amount
            && existing.refund_of == self.refund_of
    }
}

/// Outcome of applying a [`BalanceChange`].
#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub card: super::card::GiftCard,
    pub transaction: Transaction,
    /// True when an idempotency key matched an earlier transaction and nothing was written.
    pub replayed: bool,
}
