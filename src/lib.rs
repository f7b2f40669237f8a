//! Gift-card ledger and redemption engine.
//!
//! Cards are minted with an opening purchase transaction, then recharged,
//! redeemed and refunded through [`ledger::GiftCardLedger`]. Every balance
//! change is paired with exactly one append-only [`db::Transaction`] and is
//! serialized per card by the [`db::LedgerStore`] implementation.

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod routes;

pub use error::{LedgerError, Result};
pub use ledger::GiftCardLedger;
