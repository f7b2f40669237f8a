use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use super::{
    card::GiftCard,
    fee::FeeConfiguration,
    receipt::Receipt,
    store::{build_transaction, plan_change, replay_of, InsertOutcome, LedgerStore, RefundTarget},
    tx::{AppliedChange, BalanceChange, Transaction, TransactionType},
};
use crate::error::{LedgerError, Result};

struct CardEntry {
    card: GiftCard,
    transactions: Vec<Transaction>,
}

impl CardEntry {
    fn refunded_against(&self, redemption_id: uuid::Uuid) -> Decimal {
        self.transactions
            .iter()
            .filter(|tx| tx.refund_of == Some(redemption_id))
            .map(|tx| tx.amount)
            .sum()
    }
}

/// Process-local store. Each card sits behind its own mutex, so mutations of
/// one card are serialized while different cards proceed in parallel.
#[derive(Default)]
pub struct MemoryLedgerStore {
    cards: RwLock<HashMap<String, Arc<Mutex<CardEntry>>>>,
    fees: RwLock<Vec<FeeConfiguration>>,
    receipts: RwLock<HashMap<String, Receipt>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fees(fees: Vec<FeeConfiguration>) -> Self {
        Self {
            fees: RwLock::new(fees),
            ..Self::default()
        }
    }

    async fn entry(&self, code: &str) -> Result<Arc<Mutex<CardEntry>>> {
        self.cards
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or(LedgerError::CardNotFound)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_card(&self, card: &GiftCard, opening: &Transaction) -> Result<InsertOutcome> {
        let mut cards = self.cards.write().await;
        if cards.contains_key(&card.code) {
            return Ok(InsertOutcome::CodeTaken);
        }
        let entry = CardEntry {
            card: card.clone(),
            transactions: vec![opening.clone()],
        };
        cards.insert(card.code.clone(), Arc::new(Mutex::new(entry)));
        Ok(InsertOutcome::Inserted)
    }

    async fn find_card_by_code(&self, code: &str) -> Result<Option<GiftCard>> {
        let Some(entry) = self.cards.read().await.get(code).cloned() else {
            return Ok(None);
        };
        let card = entry.lock().await.card.clone();
        Ok(Some(card))
    }

    async fn apply_change(&self, code: &str, change: BalanceChange) -> Result<AppliedChange> {
        let entry = self.entry(code).await?;
        let mut entry = entry.lock().await;

        if let Some(key) = change.idempotency_key.as_deref() {
            if let Some(existing) = entry
                .transactions
                .iter()
                .find(|tx| tx.idempotency_key.as_deref() == Some(key))
            {
                let transaction = replay_of(&change, existing.clone())?;
                return Ok(AppliedChange {
                    card: entry.card.clone(),
                    transaction,
                    replayed: true,
                });
            }
        }

        let now = Utc::now();
        let new_balance = {
            let target = change.refund_of.and_then(|id| {
                entry
                    .transactions
                    .iter()
                    .find(|tx| tx.id == id && tx.transaction_type == TransactionType::Redemption)
                    .map(|redemption| RefundTarget {
                        redemption,
                        already_refunded: entry.refunded_against(id),
                    })
            });
            plan_change(&entry.card, &change, target, now)?
        };

        let transaction = build_transaction(&entry.card, change, new_balance, now);
        entry.card.balance = new_balance;
        entry.transactions.push(transaction.clone());

        Ok(AppliedChange {
            card: entry.card.clone(),
            transaction,
            replayed: false,
        })
    }

    async fn set_card_active(&self, code: &str, active: bool) -> Result<GiftCard> {
        let entry = self.entry(code).await?;
        let mut entry = entry.lock().await;
        entry.card.is_active = active;
        Ok(entry.card.clone())
    }

    async fn list_transactions(&self, code: &str) -> Result<Vec<Transaction>> {
        let entry = self.entry(code).await?;
        let transactions = entry.lock().await.transactions.clone();
        Ok(transactions)
    }

    async fn list_fees(&self) -> Result<Vec<FeeConfiguration>> {
        Ok(self.fees.read().await.clone())
    }

    async fn upsert_fee(&self, fee: &FeeConfiguration) -> Result<FeeConfiguration> {
        let mut fees = self.fees.write().await;
        match fees.iter_mut().find(|existing| existing.id == fee.id) {
            Some(existing) => *existing = fee.clone(),
            None => fees.push(fee.clone()),
        }
        Ok(fee.clone())
    }

    async fn insert_receipt(&self, receipt: &Receipt) -> Result<()> {
        self.receipts
            .write()
            .await
            .insert(receipt.token.clone(), receipt.clone());
        Ok(())
    }

    async fn find_receipt(&self, token: &str) -> Result<Option<Receipt>> {
        Ok(self.receipts.read().await.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use testresult::TestResult;
    use uuid::Uuid;

    use super::*;
    use crate::db::card::{CardDesign, CardMetadata};

    fn seeded(code: &str, amount: Decimal) -> (GiftCard, Transaction) {
        let card = GiftCard {
            id: Uuid::new_v4(),
            code: code.to_string(),
            initial_amount: amount,
            balance: amount,
            design: CardDesign::Love,
            is_active: true,
            metadata: CardMetadata::default(),
            created_at: Utc::now(),
            expires_at: None,
        };
        let opening = Transaction {
            id: Uuid::new_v4(),
            gift_card_id: card.id,
            transaction_type: TransactionType::Purchase,
            amount,
            balance_after: amount,
            fee_amount: Decimal::ZERO,
            notes: None,
            receipt_token: None,
            idempotency_key: None,
            refund_of: None,
            created_at: card.created_at,
        };
        (card, opening)
    }

    fn redeem(amount: Decimal) -> BalanceChange {
        BalanceChange::new(
            TransactionType::Redemption,
            amount,
            format!("RCPT-{}", Uuid::new_v4().simple()),
            dec!(1000.00),
        )
    }

    #[tokio::test]
    async fn duplicate_code_is_reported_not_overwritten() -> TestResult {
        let store = MemoryLedgerStore::new();
        let (card, opening) = seeded("GC-AAAA-AAAA-AAAA-AAAA", dec!(25.00));
        assert_eq!(store.insert_card(&card, &opening).await?, InsertOutcome::Inserted);

        let (other, other_opening) = seeded("GC-AAAA-AAAA-AAAA-AAAA", dec!(99.00));
        assert_eq!(
            store.insert_card(&other, &other_opening).await?,
            InsertOutcome::CodeTaken
        );

        let stored = store.find_card_by_code(&card.code).await?;
        assert_eq!(stored.map(|c| c.balance), Some(dec!(25.00)));
        Ok(())
    }

    #[tokio::test]
    async fn failed_change_leaves_no_trace() -> TestResult {
        let store = MemoryLedgerStore::new();
        let (card, opening) = seeded("GC-BBBB-BBBB-BBBB-BBBB", dec!(10.00));
        store.insert_card(&card, &opening).await?;

        let result = store.apply_change(&card.code, redeem(dec!(10.01))).await;
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert_eq!(store.list_transactions(&card.code).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn idempotent_replay_applies_once() -> TestResult {
        let store = MemoryLedgerStore::new();
        let (card, opening) = seeded("GC-CCCC-CCCC-CCCC-CCCC", dec!(50.00));
        store.insert_card(&card, &opening).await?;

        let mut change = redeem(dec!(20.00));
        change.idempotency_key = Some("checkout-42".to_string());

        let first = store.apply_change(&card.code, change.clone()).await?;
        let second = store.apply_change(&card.code, change).await?;

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.transaction.id, second.transaction.id);
        assert_eq!(second.card.balance, dec!(30.00));
        assert_eq!(store.list_transactions(&card.code).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let store = MemoryLedgerStore::new();
        let result = store.apply_change("GC-ZZZZ-ZZZZ-ZZZZ-ZZZZ", redeem(dec!(1.00))).await;
        assert!(matches!(result, Err(LedgerError::CardNotFound)));
    }
}
