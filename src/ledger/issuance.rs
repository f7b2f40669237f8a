use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use uuid::Uuid;

use super::{compute_fee, money, parse_add_ons, FeeBreakdown, GiftCardLedger, RecipientNotice};
use crate::db::{CardDesign, CardMetadata, GiftCard, InsertOutcome, Transaction, TransactionType};
use crate::error::{LedgerError, Result};

const MAX_NAME_LEN: usize = 100;
const MAX_MESSAGE_LEN: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueCardRequest {
    pub amount: Decimal,
    pub design: String,
    #[serde(default)]
    pub add_ons: Vec<String>,
    pub recipient_email: Option<String>,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
    pub custom_message: Option<String>,
    /// Reference of the authorization from the payment processor.
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCard {
    pub card: GiftCard,
    pub opening: Transaction,
    pub fee: FeeBreakdown,
    pub receipt_url: Option<String>,
}

impl GiftCardLedger {
    /// Purchase flow: validate, price, mint a unique code and write the card
    /// with its opening transaction in one unit.
    pub async fn issue_card(&self, req: IssueCardRequest) -> Result<IssuedCard> {
        let amount = self.validate_issue_amount(req.amount)?;
        let design: CardDesign = req.design.parse()?;
        let add_ons = parse_add_ons(&req.add_ons)?;
        let metadata = validate_metadata(&req)?;

        let configs = self
            .store
            .list_fees()
            .await
            .map_err(|err| LedgerError::IssuanceFailed(err.to_string()))?;
        let fee = compute_fee(design, &add_ons, amount, &configs)?;

        let attempts = self.config.code_attempts;
        for attempt in 1..=attempts {
            let now = Utc::now();
            let expires_at = self.expiry_from(now)?;
            let card = GiftCard {
                id: Uuid::new_v4(),
                code: self.codes.new_card_code(),
                initial_amount: amount,
                balance: amount,
                design,
                is_active: true,
                metadata: metadata.clone(),
                created_at: now,
                expires_at,
            };
            let opening = Transaction {
                id: Uuid::new_v4(),
                gift_card_id: card.id,
                transaction_type: TransactionType::Purchase,
                amount,
                balance_after: amount,
                fee_amount: fee.total,
                notes: req.payment_reference.as_ref().map(|reference| format!("payment {reference}")),
                receipt_token: Some(self.codes.new_receipt_token()),
                idempotency_key: None,
                refund_of: None,
                created_at: now,
            };

            match self.store.insert_card(&card, &opening).await {
                Ok(InsertOutcome::Inserted) => {
                    tracing::info!("Gift card issued: {} ({design}, {amount})", card.id);
                    let receipt_url = self.receipt_url(&opening);
                    self.receipts.emit(&card, &opening, fee.clone());
                    if let (Some(email), Some(url)) = (&card.metadata.recipient_email, &receipt_url) {
                        self.receipts.notify(RecipientNotice {
                            recipient_email: email.clone(),
                            recipient_name: card.metadata.recipient_name.clone(),
                            sender_name: card.metadata.sender_name.clone(),
                            custom_message: card.metadata.custom_message.clone(),
                            code: card.code.clone(),
                            amount,
                            design,
                            receipt_url: url.clone(),
                        });
                    }
                    return Ok(IssuedCard {
                        card,
                        opening,
                        fee,
                        receipt_url,
                    });
                }
                Ok(InsertOutcome::CodeTaken) => {
                    tracing::warn!("Card code collision on attempt {attempt}, regenerating");
                }
                Err(err) => {
                    tracing::error!("Failed to persist gift card: {err}");
                    return Err(LedgerError::IssuanceFailed(err.to_string()));
                }
            }
        }

        tracing::error!("Exhausted {attempts} attempts to generate a unique card code");
        Err(LedgerError::CodeGenerationExhausted { attempts })
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        self.config
            .card_validity_days
            .map(|days| {
                Duration::try_days(days)
                    .and_then(|validity| now.checked_add_signed(validity))
                    .ok_or_else(|| LedgerError::IssuanceFailed(format!("card validity of {days} days is out of range")))
            })
            .transpose()
    }

    pub(super) fn validate_issue_amount(&self, amount: Decimal) -> Result<Decimal> {
        let amount = money::parse_amount(amount)?;
        let (min, max) = (self.config.min_card_amount, self.config.max_card_amount);
        if amount < min || amount > max {
            return Err(LedgerError::invalid_amount(
                amount,
                format!("card amount must be between {min} and {max}"),
            ));
        }
        Ok(amount)
    }
}

fn validate_metadata(req: &IssueCardRequest) -> Result<CardMetadata> {
    let recipient_email = match non_blank(&req.recipient_email) {
        Some(email) => {
            let email = Email::from_string(email.clone())
                .map_err(|_| LedgerError::InvalidMetadata(format!("invalid recipient email {email:?}")))?;
            Some(email.as_str().to_string())
        }
        None => None,
    };

    let recipient_name = bounded(&req.recipient_name, "recipient name", MAX_NAME_LEN)?;
    let sender_name = bounded(&req.sender_name, "sender name", MAX_NAME_LEN)?;
    let custom_message = bounded(&req.custom_message, "custom message", MAX_MESSAGE_LEN)?;

    Ok(CardMetadata {
        recipient_email,
        recipient_name,
        sender_name,
        custom_message,
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn bounded(value: &Option<String>, field: &str, max: usize) -> Result<Option<String>> {
    match non_blank(value) {
        Some(value) if value.chars().count() > max => Err(LedgerError::InvalidMetadata(format!(
            "{field} is longer than {max} characters"
        ))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_metadata_is_dropped() {
        let req = IssueCardRequest {
            recipient_name: Some("   ".to_string()),
            sender_name: Some(" Sam ".to_string()),
            ..IssueCardRequest::default()
        };
        let metadata = validate_metadata(&req).ok();
        assert_eq!(metadata.as_ref().and_then(|m| m.recipient_name.clone()), None);
        assert_eq!(metadata.and_then(|m| m.sender_name), Some("Sam".to_string()));
    }

    #[test]
    fn bad_email_and_long_message_are_rejected() {
        let req = IssueCardRequest {
            recipient_email: Some("not-an-email".to_string()),
            ..IssueCardRequest::default()
        };
        assert!(matches!(validate_metadata(&req), Err(LedgerError::InvalidMetadata(_))));

        let req = IssueCardRequest {
            custom_message: Some("x".repeat(MAX_MESSAGE_LEN + 1)),
            ..IssueCardRequest::default()
        };
        assert!(matches!(validate_metadata(&req), Err(LedgerError::InvalidMetadata(_))));
    }
}
