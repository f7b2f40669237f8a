use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::types::Json;
use tokio::task::JoinHandle;

use super::{
    fee::FeeBreakdown,
    notify::{RecipientNotice, RecipientNotifier},
};
use crate::db::{GiftCard, LedgerStore, Receipt, ReceiptSnapshot, Transaction};

/// Persists receipts and notifies recipients off the request path.
///
/// Every failure here is logged and retried a bounded number of times; none
/// of it can undo or delay the balance mutation that triggered it.
#[derive(Clone)]
pub struct ReceiptEmitter {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn RecipientNotifier>,
    attempts: u32,
    backoff: Duration,
}

impl ReceiptEmitter {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn RecipientNotifier>, attempts: u32) -> Self {
        Self {
            store,
            notifier,
            attempts: attempts.max(1),
            backoff: Duration::from_millis(250),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn snapshot(card: &GiftCard, transaction: &Transaction, fee: FeeBreakdown) -> ReceiptSnapshot {
        ReceiptSnapshot {
            transaction: transaction.clone(),
            design: card.design,
            metadata: card.metadata.clone(),
            fee,
        }
    }

    /// Store the receipt for `transaction` in the background. Transactions
    /// without a receipt token produce nothing.
    pub fn emit(&self, card: &GiftCard, transaction: &Transaction, fee: FeeBreakdown) -> Option<JoinHandle<()>> {
        let token = transaction.receipt_token.clone()?;
        let receipt = Receipt {
            token,
            gift_card_id: card.id,
            transaction_id: transaction.id,
            snapshot: Json(Self::snapshot(card, transaction, fee)),
            created_at: Utc::now(),
        };

        let emitter = self.clone();
        Some(tokio::spawn(async move {
            for attempt in 1..=emitter.attempts {
                match emitter.store.insert_receipt(&receipt).await {
                    Ok(()) => {
                        tracing::info!("Receipt stored for transaction: {}", receipt.transaction_id);
                        return;
                    }
                    Err(err) => {
                        tracing::warn!("Receipt attempt {attempt} failed for transaction {}: {err}", receipt.transaction_id);
                        emitter.pause(attempt).await;
                    }
                }
            }
            tracing::error!(
                "Giving up on receipt for transaction {} after {} attempts",
                receipt.transaction_id,
                emitter.attempts
            );
        }))
    }

    pub fn notify(&self, notice: RecipientNotice) -> JoinHandle<()> {
        let emitter = self.clone();
        tokio::spawn(async move {
            for attempt in 1..=emitter.attempts {
                match emitter.notifier.notify(&notice).await {
                    Ok(()) => return,
                    Err(err) => {
                        tracing::warn!("Notification attempt {attempt} to {} failed: {err}", notice.recipient_email);
                        emitter.pause(attempt).await;
                    }
                }
            }
            tracing::error!("Giving up on notifying {}", notice.recipient_email);
        })
    }

    async fn pause(&self, attempt: u32) {
        if attempt < self.attempts {
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use testresult::TestResult;

    use super::*;
    use crate::db::{CardDesign, MemoryLedgerStore};
    use crate::ledger::notify::NotifyError;

    struct FlakyNotifier {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RecipientNotifier for FlakyNotifier {
        async fn notify(&self, _notice: &RecipientNotice) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(NotifyError("mailbox unavailable".to_string()));
            }
            Ok(())
        }
    }

    fn notice() -> RecipientNotice {
        RecipientNotice {
            recipient_email: "friend@example.com".to_string(),
            recipient_name: Some("Friend".to_string()),
            sender_name: None,
            custom_message: None,
            code: "GC-AAAA-BBBB-CCCC-DDDD".to_string(),
            amount: dec!(25.00),
            design: CardDesign::Love,
            receipt_url: "/v1/receipts/RCPT-x".to_string(),
        }
    }

    #[tokio::test]
    async fn notification_retries_until_success() -> TestResult {
        let notifier = Arc::new(FlakyNotifier {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let emitter = ReceiptEmitter::new(Arc::new(MemoryLedgerStore::new()), notifier.clone(), 3)
            .with_backoff(Duration::from_millis(1));

        emitter.notify(notice()).await?;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn notification_gives_up_after_bounded_attempts() -> TestResult {
        let notifier = Arc::new(FlakyNotifier {
            failures_left: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        });
        let emitter = ReceiptEmitter::new(Arc::new(MemoryLedgerStore::new()), notifier.clone(), 2)
            .with_backoff(Duration::from_millis(1));

        emitter.notify(notice()).await?;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
