use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::{
    card::GiftCard,
    fee::FeeConfiguration,
    receipt::Receipt,
    store::{build_transaction, plan_change, replay_of, InsertOutcome, LedgerStore, RefundTarget},
    tx::{AppliedChange, BalanceChange, Transaction, TransactionType},
};
use crate::error::{LedgerError, Result};

const CARD_COLUMNS: &str = "id, code, initial_amount, balance, design, is_active, \
    recipient_email, recipient_name, sender_name, custom_message, created_at, expires_at";

const TX_COLUMNS: &str = "id, gift_card_id, transaction_type, amount, balance_after, fee_amount, \
    notes, receipt_token, idempotency_key, refund_of, created_at";

// Database repository
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_transaction(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        record: &Transaction,
    ) -> Result<Transaction> {
        let query = format!(
            r#"
            INSERT INTO transactions ({TX_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {TX_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Transaction>(&query)
            .bind(record.id)
            .bind(record.gift_card_id)
            .bind(record.transaction_type)
            .bind(record.amount)
            .bind(record.balance_after)
            .bind(record.fee_amount)
            .bind(&record.notes)
            .bind(&record.receipt_token)
            .bind(&record.idempotency_key)
            .bind(record.refund_of)
            .bind(record.created_at)
            .fetch_one(&mut **tx)
            .await?;
        Ok(inserted)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_card(&self, card: &GiftCard, opening: &Transaction) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO gift_cards ({CARD_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (code) DO NOTHING
            RETURNING id
            "#
        );
        let inserted: Option<Uuid> = sqlx::query_scalar(&query)
            .bind(card.id)
            .bind(&card.code)
            .bind(card.initial_amount)
            .bind(card.balance)
            .bind(card.design)
            .bind(card.is_active)
            .bind(&card.metadata.recipient_email)
            .bind(&card.metadata.recipient_name)
            .bind(&card.metadata.sender_name)
            .bind(&card.metadata.custom_message)
            .bind(card.created_at)
            .bind(card.expires_at)
            .fetch_optional(&mut *tx)
            .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            tracing::warn!("Card code collision, nothing written");
            return Ok(InsertOutcome::CodeTaken);
        }

        Self::insert_transaction(&mut tx, opening).await?;
        tx.commit().await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn find_card_by_code(&self, code: &str) -> Result<Option<GiftCard>> {
        let query = format!("SELECT {CARD_COLUMNS} FROM gift_cards WHERE code = $1");
        let card = sqlx::query_as::<_, GiftCard>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(card)
    }

    async fn apply_change(&self, code: &str, change: BalanceChange) -> Result<AppliedChange> {
        // Begin a database transaction; the row lock below serializes writers of this card
        let mut tx = self.pool.begin().await?;

        let query = format!("SELECT {CARD_COLUMNS} FROM gift_cards WHERE code = $1 FOR UPDATE");
        let mut card = sqlx::query_as::<_, GiftCard>(&query)
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::CardNotFound)?;

        if let Some(key) = change.idempotency_key.as_deref() {
            let query = format!(
                "SELECT {TX_COLUMNS} FROM transactions WHERE gift_card_id = $1 AND idempotency_key = $2"
            );
            let existing = sqlx::query_as::<_, Transaction>(&query)
                .bind(card.id)
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(existing) = existing {
                // dropping `tx` releases the row lock
                drop(tx);
                let transaction = replay_of(&change, existing)?;
                return Ok(AppliedChange {
                    card,
                    transaction,
                    replayed: true,
                });
            }
        }

        let redemption = match change.refund_of {
            Some(id) => {
                let query = format!(
                    "SELECT {TX_COLUMNS} FROM transactions WHERE id = $1 AND gift_card_id = $2 AND transaction_type = $3"
                );
                sqlx::query_as::<_, Transaction>(&query)
                    .bind(id)
                    .bind(card.id)
                    .bind(TransactionType::Redemption)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };
        let already_refunded: Decimal = match &redemption {
            Some(redemption) => {
                sqlx::query_scalar(
                    "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE refund_of = $1",
                )
                .bind(redemption.id)
                .fetch_one(&mut *tx)
                .await?
            }
            None => Decimal::ZERO,
        };
        let target = redemption.as_ref().map(|redemption| RefundTarget {
            redemption,
            already_refunded,
        });

        let now = Utc::now();
        let new_balance = match plan_change(&card, &change, target, now) {
            Ok(balance) => balance,
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback after rejected {:?} failed: {rollback}", change.kind);
                }
                return Err(err);
            }
        };

        // Conditional on the balance read under the row lock
        let updated = sqlx::query("UPDATE gift_cards SET balance = $1 WHERE id = $2 AND balance = $3")
            .bind(new_balance)
            .bind(card.id)
            .bind(card.balance)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated != 1 {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!("Rollback after lost balance update failed: {rollback}");
            }
            return Err(LedgerError::StorageUnavailable(sqlx::Error::RowNotFound));
        }

        let record = build_transaction(&card, change, new_balance, now);
        let transaction = Self::insert_transaction(&mut tx, &record).await?;
        tx.commit().await?;

        card.balance = new_balance;
        tracing::info!("Applied {:?} to card {}: balance {}", transaction.transaction_type, card.id, new_balance);
        Ok(AppliedChange {
            card,
            transaction,
            replayed: false,
        })
    }

    async fn set_card_active(&self, code: &str, active: bool) -> Result<GiftCard> {
        let query = format!(
            "UPDATE gift_cards SET is_active = $1 WHERE code = $2 RETURNING {CARD_COLUMNS}"
        );
        sqlx::query_as::<_, GiftCard>(&query)
            .bind(active)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::CardNotFound)
    }

    async fn list_transactions(&self, code: &str) -> Result<Vec<Transaction>> {
        let card_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM gift_cards WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        let card_id = card_id.ok_or(LedgerError::CardNotFound)?;

        let query = format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE gift_card_id = $1 ORDER BY created_at, seq"
        );
        let transactions = sqlx::query_as::<_, Transaction>(&query)
            .bind(card_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(transactions)
    }

    async fn list_fees(&self) -> Result<Vec<FeeConfiguration>> {
        let fees = sqlx::query_as::<_, FeeConfiguration>(
            r#"
            SELECT id, fee_type, fee_name, fee_amount, is_percentage, min_amount, max_amount, is_active
            FROM fee_configurations
            ORDER BY fee_type, fee_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(fees)
    }

    async fn upsert_fee(&self, fee: &FeeConfiguration) -> Result<FeeConfiguration> {
        let saved = sqlx::query_as::<_, FeeConfiguration>(
            r#"
            INSERT INTO fee_configurations
                (id, fee_type, fee_name, fee_amount, is_percentage, min_amount, max_amount, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                fee_type = EXCLUDED.fee_type,
                fee_name = EXCLUDED.fee_name,
                fee_amount = EXCLUDED.fee_amount,
                is_percentage = EXCLUDED.is_percentage,
                min_amount = EXCLUDED.min_amount,
                max_amount = EXCLUDED.max_amount,
                is_active = EXCLUDED.is_active
            RETURNING id, fee_type, fee_name, fee_amount, is_percentage, min_amount, max_amount, is_active
            "#,
        )
        .bind(fee.id)
        .bind(fee.fee_type)
        .bind(&fee.fee_name)
        .bind(fee.fee_amount)
        .bind(fee.is_percentage)
        .bind(fee.min_amount)
        .bind(fee.max_amount)
        .bind(fee.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn insert_receipt(&self, receipt: &Receipt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO receipts (token, gift_card_id, transaction_id, snapshot, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token) DO NOTHING
            "#,
        )
        .bind(&receipt.token)
        .bind(receipt.gift_card_id)
        .bind(receipt.transaction_id)
        .bind(&receipt.snapshot)
        .bind(receipt.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_receipt(&self, token: &str) -> Result<Option<Receipt>> {
        let receipt = sqlx::query_as::<_, Receipt>(
            "SELECT token, gift_card_id, transaction_id, snapshot, created_at FROM receipts WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(receipt)
    }
}
