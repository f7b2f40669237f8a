use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use super::{
    card::{CardDesign, CardMetadata},
    tx::Transaction,
};
use crate::ledger::fee::FeeBreakdown;

/// Stored receipt, looked up by `token` only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Receipt {
    pub token: String,
    pub gift_card_id: Uuid,
    pub transaction_id: Uuid,
    pub snapshot: Json<ReceiptSnapshot>,
    pub created_at: DateTime<Utc>,
}

/// Everything a renderer needs, frozen at the moment of the transaction.
/// Never contains the card code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptSnapshot {
    pub transaction: Transaction,
    pub design: CardDesign,
    pub metadata: CardMetadata,
    pub fee: FeeBreakdown,
}
