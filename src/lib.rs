// ledger_cache/src/lib.rs
//
// Ledger Cache — binary cache codec for a double-entry accounting journal.
//
// Run the test suite: cargo test

pub mod amount;
pub mod codec;
pub mod config;
pub mod error;
pub mod journal;
pub mod pool;
pub mod primitive;
pub mod symbol_table;

pub use amount::Amount;
pub use codec::{JournalCache, JournalCodec, LoadOutcome};
pub use config::{CodecOptions, WordWidth};
pub use error::{CodecError, Result};
pub use journal::account::{Account, AccountId, AccountTable, TransactionRef};
pub use journal::commodity::{Commodity, CommodityId, CommodityTable};
pub use journal::entry::{Entry, EntryState, Transaction};
pub use journal::{Journal, SourceFile};
