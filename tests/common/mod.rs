#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use giftcard_ledger::config::LedgerConfig;
use giftcard_ledger::db::{
    CardDesign, CardMetadata, FeeConfiguration, FeeType, GiftCard, LedgerStore, MemoryLedgerStore, Receipt,
    Transaction, TransactionType,
};
use giftcard_ledger::ledger::{IssueCardRequest, IssuedCard};
use giftcard_ledger::GiftCardLedger;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

pub struct TestContext {
    pub store: Arc<MemoryLedgerStore>,
    pub ledger: GiftCardLedger,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let store = Arc::new(MemoryLedgerStore::with_fees(default_fees()));
        let ledger = GiftCardLedger::new(store.clone(), config);
        Self { store, ledger }
    }

    pub async fn issue(&self, amount: Decimal, design: &str) -> IssuedCard {
        self.ledger
            .issue_card(IssueCardRequest {
                amount,
                design: design.to_string(),
                ..IssueCardRequest::default()
            })
            .await
            .expect("issuance should succeed")
    }

    /// Receipts are written in the background; poll until one shows up.
    pub async fn wait_for_receipt(&self, token: &str) -> Option<Receipt> {
        for _ in 0..100 {
            if let Ok(Some(receipt)) = self.store.find_receipt(token).await {
                return Some(receipt);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }
}

pub fn default_fees() -> Vec<FeeConfiguration> {
    vec![
        FeeConfiguration::fixed(FeeType::Standard, "Service fee", dec!(0.99)),
        FeeConfiguration::percentage(FeeType::Premium, "Premium design", dec!(5)),
        FeeConfiguration::fixed(FeeType::Animation, "Animated card", dec!(1.50)),
    ]
}

/// A card and its opening purchase, for writing straight into a store.
pub fn seeded_card(code: &str, amount: Decimal, expires_at: Option<DateTime<Utc>>) -> (GiftCard, Transaction) {
    let created_at = Utc::now();
    let card = GiftCard {
        id: Uuid::new_v4(),
        code: code.to_string(),
        initial_amount: amount,
        balance: amount,
        design: CardDesign::Classic,
        is_active: true,
        metadata: CardMetadata::default(),
        created_at,
        expires_at,
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
        created_at,
    };
    (card, opening)
}
