use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    card::GiftCard,
    fee::FeeConfiguration,
    receipt::Receipt,
    tx::{AppliedChange, BalanceChange, Transaction, TransactionType},
};
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another card already holds this code; nothing was written.
    CodeTaken,
}

/// Durable record of cards, their transactions, fee rows and receipts.
///
/// Implementations must apply `apply_change` under a per-card serializing
/// scope: the balance read, the checks in [`plan_change`] and the paired
/// card update plus transaction insert happen as one atomic unit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Write a new card together with its opening purchase transaction.
    async fn insert_card(&self, card: &GiftCard, opening: &Transaction) -> Result<InsertOutcome>;

    async fn find_card_by_code(&self, code: &str) -> Result<Option<GiftCard>>;

    async fn apply_change(&self, code: &str, change: BalanceChange) -> Result<AppliedChange>;

    async fn set_card_active(&self, code: &str, active: bool) -> Result<GiftCard>;

    /// Full history of a card, oldest first.
    async fn list_transactions(&self, code: &str) -> Result<Vec<Transaction>>;

    async fn list_fees(&self) -> Result<Vec<FeeConfiguration>>;

    async fn upsert_fee(&self, fee: &FeeConfiguration) -> Result<FeeConfiguration>;

    async fn insert_receipt(&self, receipt: &Receipt) -> Result<()>;

    async fn find_receipt(&self, token: &str) -> Result<Option<Receipt>>;
}

/// The redemption a refund points at, plus how much of it was already refunded.
#[derive(Debug, Clone, Copy)]
pub struct RefundTarget<'a> {
    pub redemption: &'a Transaction,
    pub already_refunded: Decimal,
}

/// Check a change against the card's current state and return the balance it produces.
pub fn plan_change(
    card: &GiftCard,
    change: &BalanceChange,
    refund: Option<RefundTarget<'_>>,
    now: DateTime<Utc>,
) -> Result<Decimal> {
    if !card.is_usable(now) {
        return Err(LedgerError::CardInactive);
    }
    if change.amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(change.amount, "amount must be positive"));
    }

    let new_balance = match change.kind {
        TransactionType::Redemption => {
            if change.amount > card.balance {
                return Err(LedgerError::InsufficientBalance {
                    requested: change.amount,
                    available: card.balance,
                });
            }
            card.balance - change.amount
        }
        TransactionType::Recharge => credit(card, change)?,
        TransactionType::Refund => {
            let target = match (change.refund_of, refund) {
                (Some(id), Some(target))
                    if target.redemption.id == id
                        && target.redemption.gift_card_id == card.id
                        && target.redemption.transaction_type == TransactionType::Redemption =>
                {
                    target
                }
                (Some(id), _) => return Err(LedgerError::TransactionNotFound(id)),
                (None, _) => return Err(LedgerError::TransactionNotFound(Uuid::nil())),
            };
            let refundable = target.redemption.amount - target.already_refunded;
            if change.amount > refundable {
                return Err(LedgerError::RefundExceedsRedemption {
                    requested: change.amount,
                    refundable,
                });
            }
            credit(card, change)?
        }
        TransactionType::Purchase => {
            return Err(LedgerError::IssuanceFailed(
                "purchase entries are only written at issuance".to_string(),
            ))
        }
    };

    if new_balance > change.ceiling {
        return Err(LedgerError::invalid_amount(
            change.amount,
            format!("balance would exceed the maximum of {}", change.ceiling),
        ));
    }
    Ok(new_balance)
}

fn credit(card: &GiftCard, change: &BalanceChange) -> Result<Decimal> {
    card.balance.checked_add(change.amount).ok_or_else(|| {
        LedgerError::invalid_amount(
            change.amount,
            format!("balance would exceed the maximum of {}", change.ceiling),
        )
    })
}

/// Resolve an idempotency key against an earlier transaction with the same key.
pub fn replay_of(change: &BalanceChange, existing: Transaction) -> Result<Transaction> {
    if change.matches(&existing) {
        Ok(existing)
    } else {
        Err(LedgerError::IdempotencyConflict(
            change.idempotency_key.clone().unwrap_or_default(),
        ))
    }
}

pub fn build_transaction(
    card: &GiftCard,
    change: BalanceChange,
    balance_after: Decimal,
    now: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        gift_card_id: card.id,
        transaction_type: change.kind,
        amount: change.amount,
        balance_after,
        fee_amount: change.fee_amount,
        notes: change.notes,
        receipt_token: Some(change.receipt_token),
        idempotency_key: change.idempotency_key,
        refund_of: change.refund_of,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::card::{CardDesign, CardMetadata};

    fn card(balance: Decimal) -> GiftCard {
        GiftCard {
            id: Uuid::new_v4(),
            code: "GC-AAAA-BBBB-CCCC-DDDD".to_string(),
            initial_amount: dec!(100.00),
            balance,
            design: CardDesign::Classic,
            is_active: true,
            metadata: CardMetadata::default(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    fn change(kind: TransactionType, amount: Decimal) -> BalanceChange {
        BalanceChange::new(kind, amount, "RCPT-test".to_string(), dec!(1000.00))
    }

    #[test]
    fn redemption_cannot_overdraw() {
        let card = card(dec!(70.00));
        let result = plan_change(&card, &change(TransactionType::Redemption, dec!(80.00)), None, Utc::now());
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { requested, available })
                if requested == dec!(80.00) && available == dec!(70.00)
        ));
    }

    #[test]
    fn redemption_may_drain_exactly() {
        let card = card(dec!(70.00));
        let result = plan_change(&card, &change(TransactionType::Redemption, dec!(70.00)), None, Utc::now());
        assert_eq!(result.ok(), Some(Decimal::ZERO));
    }

    #[test]
    fn recharge_respects_ceiling() {
        let card = card(dec!(990.00));
        let result = plan_change(&card, &change(TransactionType::Recharge, dec!(20.00)), None, Utc::now());
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn unrepresentable_credit_is_an_invalid_amount() {
        let card = card(dec!(10.00));
        let result = plan_change(&card, &change(TransactionType::Recharge, Decimal::MAX), None, Utc::now());
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn inactive_card_rejects_everything() {
        let mut card = card(dec!(70.00));
        card.is_active = false;
        for kind in [TransactionType::Recharge, TransactionType::Redemption] {
            let result = plan_change(&card, &change(kind, dec!(1.00)), None, Utc::now());
            assert!(matches!(result, Err(LedgerError::CardInactive)));
        }
    }

    #[test]
    fn refund_is_bounded_by_unrefunded_redemption() {
        let card = card(dec!(40.00));
        let redemption = build_transaction(
            &card,
            change(TransactionType::Redemption, dec!(60.00)),
            dec!(40.00),
            Utc::now(),
        );
        let mut refund = change(TransactionType::Refund, dec!(25.00));
        refund.refund_of = Some(redemption.id);

        let target = RefundTarget {
            redemption: &redemption,
            already_refunded: dec!(40.00),
        };
        let result = plan_change(&card, &refund, Some(target), Utc::now());
        assert!(matches!(
            result,
            Err(LedgerError::RefundExceedsRedemption { refundable, .. }) if refundable == dec!(20.00)
        ));

        let target = RefundTarget {
            redemption: &redemption,
            already_refunded: dec!(10.00),
        };
        assert_eq!(
            plan_change(&card, &refund, Some(target), Utc::now()).ok(),
            Some(dec!(65.00))
        );
    }

    #[test]
    fn refund_of_unknown_transaction_is_rejected() {
        let card = card(dec!(40.00));
        let mut refund = change(TransactionType::Refund, dec!(5.00));
        let missing = Uuid::new_v4();
        refund.refund_of = Some(missing);
        let result = plan_change(&card, &refund, None, Utc::now());
        assert!(matches!(result, Err(LedgerError::TransactionNotFound(id)) if id == missing));
    }

    #[test]
    fn replay_requires_identical_request() {
        let card = card(dec!(40.00));
        let mut original = change(TransactionType::Redemption, dec!(5.00));
        original.idempotency_key = Some("order-17".to_string());
        let stored = build_transaction(&card, original.clone(), dec!(35.00), Utc::now());

        assert!(replay_of(&original, stored.clone()).is_ok());

        let mut different = original;
        different.amount = dec!(6.00);
        assert!(matches!(
            replay_of(&different, stored),
            Err(LedgerError::IdempotencyConflict(key)) if key == "order-17"
        ));
    }
}
