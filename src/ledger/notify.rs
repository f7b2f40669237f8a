use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::db::CardDesign;

#[derive(Debug, Error)]
#[error("recipient notification failed: {0}")]
pub struct NotifyError(pub String);

/// What the delivery collaborator needs to tell a recipient about their card.
#[derive(Debug, Clone, Serialize)]
pub struct RecipientNotice {
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
    pub custom_message: Option<String>,
    pub code: String,
    pub amount: Decimal,
    pub design: CardDesign,
    pub receipt_url: String,
}

/// Outbound delivery (email, SMS, ...) owned by another service.
#[async_trait]
pub trait RecipientNotifier: Send + Sync {
    async fn notify(&self, notice: &RecipientNotice) -> Result<(), NotifyError>;
}

/// Records notices in the log; used when no delivery service is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl RecipientNotifier for LogNotifier {
    async fn notify(&self, notice: &RecipientNotice) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notice.recipient_email,
            design = %notice.design,
            amount = %notice.amount,
            "Recipient notice queued"
        );
        Ok(())
    }
}
