use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{compute_fee, lookup_code, money, FeeBreakdown, GiftCardLedger};
use crate::db::{AppliedChange, BalanceChange, CardDesign, CardStatus, GiftCard, TransactionType};
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub balance: Decimal,
    pub is_active: bool,
    pub design: CardDesign,
    pub status: CardStatus,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub redemption_id: Uuid,
    pub amount: Decimal,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RechargeOutcome {
    pub recharged_amount: Decimal,
    pub new_balance: Decimal,
    pub transaction_id: Uuid,
    pub fee: Decimal,
    pub receipt_url: Option<String>,
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedeemOutcome {
    pub redeemed_amount: Decimal,
    pub remaining_balance: Decimal,
    pub transaction_id: Uuid,
    pub receipt_url: Option<String>,
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub refunded_amount: Decimal,
    pub new_balance: Decimal,
    pub transaction_id: Uuid,
    pub receipt_url: Option<String>,
    pub replayed: bool,
}

impl GiftCardLedger {
    /// Read-only lookup. Unknown, malformed, disabled and expired codes all
    /// come back as `CardNotFound`.
    pub async fn check_balance(&self, code: &str) -> Result<BalanceView> {
        let card = self.usable_card(code).await.map_err(|err| match err {
            LedgerError::CardInactive => LedgerError::CardNotFound,
            other => other,
        })?;
        let now = Utc::now();
        Ok(BalanceView {
            balance: card.balance,
            is_active: card.is_usable(now),
            design: card.design,
            status: card.status(now),
            expires_at: card.expires_at,
        })
    }

    pub async fn recharge(&self, code: &str, req: AmountRequest) -> Result<RechargeOutcome> {
        let amount = self.crediting_amount(req.amount)?;
        let card = self.usable_card(code).await?;

        let configs = self.store.list_fees().await?;
        let fee = compute_fee(card.design, &[], amount, &configs)?;

        let mut change = self.change(TransactionType::Recharge, amount, req.idempotency_key);
        change.fee_amount = fee.total;

        let applied = self.apply(&card.code, change, fee).await?;
        Ok(RechargeOutcome {
            recharged_amount: applied.transaction.amount,
            new_balance: applied.transaction.balance_after,
            transaction_id: applied.transaction.id,
            fee: applied.transaction.fee_amount,
            receipt_url: self.receipt_url(&applied.transaction),
            replayed: applied.replayed,
        })
    }

    pub async fn redeem(&self, code: &str, req: AmountRequest) -> Result<RedeemOutcome> {
        let amount = money::parse_amount(req.amount)?;
        let card = self.usable_card(code).await?;

        let change = self.change(TransactionType::Redemption, amount, req.idempotency_key);
        let applied = self.apply(&card.code, change, FeeBreakdown::none()).await?;
        Ok(RedeemOutcome {
            redeemed_amount: applied.transaction.amount,
            remaining_balance: applied.transaction.balance_after,
            transaction_id: applied.transaction.id,
            receipt_url: self.receipt_url(&applied.transaction),
            replayed: applied.replayed,
        })
    }

    /// Credit back part or all of an earlier redemption on the same card.
    pub async fn refund(&self, code: &str, req: RefundRequest) -> Result<RefundOutcome> {
        let amount = self.crediting_amount(req.amount)?;
        let card = self.usable_card(code).await?;

        let mut change = self.change(TransactionType::Refund, amount, req.idempotency_key);
        change.refund_of = Some(req.redemption_id);
        change.notes = Some(format!("refund of {}", req.redemption_id));

        let applied = self.apply(&card.code, change, FeeBreakdown::none()).await?;
        Ok(RefundOutcome {
            refunded_amount: applied.transaction.amount,
            new_balance: applied.transaction.balance_after,
            transaction_id: applied.transaction.id,
            receipt_url: self.receipt_url(&applied.transaction),
            replayed: applied.replayed,
        })
    }

    /// Early rejection for unknown or unusable cards; the store repeats the
    /// activity check under its per-card lock.
    async fn usable_card(&self, code: &str) -> Result<GiftCard> {
        let code = lookup_code(code)?;
        let card = self
            .store
            .find_card_by_code(&code)
            .await?
            .ok_or(LedgerError::CardNotFound)?;
        if !card.is_usable(Utc::now()) {
            return Err(LedgerError::CardInactive);
        }
        Ok(card)
    }

    /// Credits can never be larger than the balance ceiling they are checked against.
    fn crediting_amount(&self, amount: Decimal) -> Result<Decimal> {
        let amount = money::parse_amount(amount)?;
        let ceiling = self.config.max_card_balance;
        if amount > ceiling {
            return Err(LedgerError::invalid_amount(
                amount,
                format!("amount exceeds the maximum card balance of {ceiling}"),
            ));
        }
        Ok(amount)
    }

    fn change(&self, kind: TransactionType, amount: Decimal, idempotency_key: Option<String>) -> BalanceChange {
        let mut change = BalanceChange::new(
            kind,
            amount,
            self.codes.new_receipt_token(),
            self.config.max_card_balance,
        );
        change.idempotency_key = idempotency_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        change
    }

    async fn apply(&self, code: &str, change: BalanceChange, fee: FeeBreakdown) -> Result<AppliedChange> {
        let kind = change.kind;
        let applied = match self.store.apply_change(code, change).await {
            Ok(applied) => applied,
            Err(err) => {
                if err.is_retryable() {
                    tracing::error!("{kind:?} failed on storage: {err}");
                } else {
                    tracing::info!("{kind:?} rejected: {err}");
                }
                return Err(err);
            }
        };

        if applied.replayed {
            tracing::info!("Replayed {kind:?} {} for card {}", applied.transaction.id, applied.card.id);
        } else {
            tracing::info!(
                "{kind:?} of {} on card {}, balance now {}",
                applied.transaction.amount,
                applied.card.id,
                applied.transaction.balance_after
            );
            self.receipts.emit(&applied.card, &applied.transaction, fee);
        }
        Ok(applied)
    }
}
