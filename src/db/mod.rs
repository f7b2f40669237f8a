pub mod card;
pub mod fee;
pub mod memory;
pub mod pg;
pub mod receipt;
pub mod store;
pub mod tx;

pub use card::{AddOn, CardDesign, CardMetadata, CardStatus, GiftCard};
pub use fee::{FeeConfiguration, FeeType};
pub use memory::MemoryLedgerStore;
pub use pg::PgLedgerStore;
pub use receipt::{Receipt, ReceiptSnapshot};
pub use store::{InsertOutcome, LedgerStore};
pub use tx::{AppliedChange, BalanceChange, Transaction, TransactionType};
