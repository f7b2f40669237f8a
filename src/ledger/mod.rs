//! Gift-card ledger: issuance, balance operations and fee administration on
//! top of a [`LedgerStore`].

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::LedgerConfig;
use crate::db::{AddOn, CardDesign, FeeConfiguration, GiftCard, LedgerStore, Receipt, Transaction};
use crate::error::{LedgerError, Result};

pub mod balance;
pub mod codes;
pub mod fee;
pub mod issuance;
pub mod money;
pub mod notify;
pub mod receipt;

pub use balance::{AmountRequest, BalanceView, RechargeOutcome, RedeemOutcome, RefundOutcome, RefundRequest};
pub use fee::{compute_fee, FeeBreakdown, FeeItem};
pub use issuance::{IssueCardRequest, IssuedCard};
pub use notify::{LogNotifier, RecipientNotice, RecipientNotifier};
pub use receipt::ReceiptEmitter;

/// Source of card codes and receipt tokens.
pub trait CodeGenerator: Send + Sync {
    fn new_card_code(&self) -> String;
    fn new_receipt_token(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn new_card_code(&self) -> String {
        codes::new_card_code()
    }

    fn new_receipt_token(&self) -> String {
        codes::new_receipt_token()
    }
}

#[derive(Clone)]
pub struct GiftCardLedger {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
    codes: Arc<dyn CodeGenerator>,
    receipts: ReceiptEmitter,
}

impl GiftCardLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        let receipts = ReceiptEmitter::new(store.clone(), Arc::new(LogNotifier), config.receipt_retry_attempts);
        Self {
            store,
            config,
            codes: Arc::new(RandomCodes),
            receipts,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn RecipientNotifier>) -> Self {
        self.receipts = ReceiptEmitter::new(self.store.clone(), notifier, self.config.receipt_retry_attempts);
        self
    }

    pub fn with_codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_receipts(mut self, receipts: ReceiptEmitter) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Fee a customer would be charged for a purchase, without issuing anything.
    pub async fn quote_fee(&self, design: &str, add_ons: &[String], amount: Decimal) -> Result<FeeBreakdown> {
        let design: CardDesign = design.parse()?;
        let add_ons = parse_add_ons(add_ons)?;
        let amount = self.validate_issue_amount(amount)?;
        let configs = self.store.list_fees().await?;
        compute_fee(design, &add_ons, amount, &configs)
    }

    pub async fn receipt(&self, token: &str) -> Result<Receipt> {
        if !codes::is_well_formed_receipt_token(token) {
            return Err(LedgerError::ReceiptNotFound);
        }
        self.store
            .find_receipt(token)
            .await?
            .ok_or(LedgerError::ReceiptNotFound)
    }

    /// A card's full history, oldest first.
    pub async fn history(&self, code: &str) -> Result<Vec<Transaction>> {
        let code = lookup_code(code)?;
        self.store.list_transactions(&code).await
    }

    pub async fn list_fees(&self) -> Result<Vec<FeeConfiguration>> {
        self.store.list_fees().await
    }

    pub async fn save_fee(&self, fee: FeeConfiguration) -> Result<FeeConfiguration> {
        if fee.fee_amount < Decimal::ZERO {
            return Err(LedgerError::invalid_amount(fee.fee_amount, "fee may not be negative"));
        }
        if let (Some(min), Some(max)) = (fee.min_amount, fee.max_amount) {
            if min > max {
                return Err(LedgerError::invalid_amount(min, "fee minimum exceeds its maximum"));
            }
        }
        let saved = self.store.upsert_fee(&fee).await?;
        tracing::info!("Fee configuration saved: {} ({})", saved.fee_name, saved.fee_type);
        Ok(saved)
    }

    /// Administrative enable/disable. Remaining balance is kept either way.
    pub async fn set_card_active(&self, code: &str, active: bool) -> Result<GiftCard> {
        let code = lookup_code(code)?;
        let card = self.store.set_card_active(&code, active).await?;
        tracing::info!("Card {} active flag set to {active}", card.id);
        Ok(card)
    }

    fn receipt_url(&self, transaction: &Transaction) -> Option<String> {
        transaction
            .receipt_token
            .as_deref()
            .map(|token| self.config.receipt_url(token))
    }
}

/// Normalize a user-supplied code and reject it before any lookup if malformed.
fn lookup_code(input: &str) -> Result<String> {
    let code = codes::normalize_code(input);
    if codes::is_well_formed_code(&code) {
        Ok(code)
    } else {
        Err(LedgerError::CardNotFound)
    }
}

fn parse_add_ons(add_ons: &[String]) -> Result<Vec<AddOn>> {
    add_ons.iter().map(|add_on| add_on.parse()).collect()
}
