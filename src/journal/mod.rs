//! The journal: the root object this whole crate exists to cache.

pub mod account;
pub mod commodity;
pub mod entry;

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use account::{AccountTable, TransactionRef};
use commodity::CommodityTable;
use entry::{Entry, Transaction};

/// A source file that fed the journal, with the modification time recorded
/// at the moment the cache was written. See [`crate::codec::LoadOutcome`]
/// for how this is used to detect a stale cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub mtime: DateTime<Utc>,
}

/// Root container of an accounting dataset: source provenance, the chart of
/// accounts, the commodity table, and the ordered list of entries.
#[derive(Debug, Clone)]
pub struct Journal {
    pub sources: Vec<SourceFile>,
    pub accounts: AccountTable,
    pub commodities: CommodityTable,
    pub entries: Vec<Entry>,
}

impl Journal {
    /// A fresh, empty journal with an unnamed master account.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            accounts: AccountTable::new(""),
            commodities: CommodityTable::new(),
            entries: Vec::new(),
        }
    }

    pub fn add_source(&mut self, path: PathBuf, mtime: DateTime<Utc>) {
        self.sources.push(SourceFile { path, mtime });
    }

    /// Append an entry, returning its index.
    pub fn add_entry(&mut self, entry: Entry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Append a transaction to `entry_index` and register the account's
    /// back-pointer to it, keeping [`AccountTable`] and the entry's own
    /// transaction list consistent with each other.
    pub fn add_transaction(&mut self, entry_index: usize, transaction: Transaction) {
        let account = transaction.account;
        let transaction_index = self.entries[entry_index].add_transaction(transaction);
        self.accounts.add_transaction(
            account,
            TransactionRef {
                entry_index,
                transaction_index,
            },
        );
    }

    pub fn transaction_count(&self) -> u64 {
        self.entries.iter().map(|e| e.transactions.len() as u64).sum()
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn bigint_count(&self) -> u64 {
        let mut count = 0u64;
        for entry in &self.entries {
            for txn in &entry.transactions {
                count += 1; // primary amount
                if txn.cost.is_some() {
                    count += 1;
                }
            }
        }
        count
    }

    /// Look up a posting by its non-owning [`TransactionRef`].
    pub fn transaction(&self, reference: TransactionRef) -> &Transaction {
        &self.entries[reference.entry_index].transactions[reference.transaction_index]
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use entry::Entry;
    use num_bigint::BigInt;

    #[test]
    fn add_transaction_links_account_back_pointer() {
        let mut journal = Journal::new();
        let cash = journal.accounts.find_or_create_path("Assets:Cash");
        let entry_index = journal.add_entry(Entry::new(chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
        journal.add_transaction(
            entry_index,
            Transaction::new(cash, Amount::new(None, BigInt::from(1000))),
        );

        let refs = &journal.accounts.get(cash).unwrap().transactions;
        assert_eq!(refs.len(), 1);
        assert_eq!(journal.transaction(refs[0]).account, cash);
    }
}
