//! Entries and the transactions (postings) they contain.

use chrono::NaiveDate;

use crate::amount::Amount;
use crate::journal::account::AccountId;

/// Cleared/pending state of an entry, carried through from the textual
/// source and preserved byte-for-byte across a cache round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Uncleared,
    Pending,
    Cleared,
}

impl EntryState {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            EntryState::Uncleared => 0,
            EntryState::Pending => 1,
            EntryState::Cleared => 2,
        }
    }

    pub(crate) fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(EntryState::Uncleared),
            1 => Some(EntryState::Pending),
            2 => Some(EntryState::Cleared),
            _ => None,
        }
    }
}

/// A single posting against an account.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub account: AccountId,
    pub amount: Amount,
    pub cost: Option<Amount>,
    pub flags: u32,
    pub note: String,
    /// Set by the arena loader on every transaction constructed from a
    /// cache file. Preserved for wire compatibility with the original's bit
    /// layout; this rewrite's storage is plain `Vec` ownership regardless of
    /// this flag's value.
    pub bulk_alloc: bool,
}

impl Transaction {
    pub fn new(account: AccountId, amount: Amount) -> Self {
        Self {
            account,
            amount,
            cost: None,
            flags: 0,
            note: String::new(),
            bulk_alloc: false,
        }
    }
}

/// A dated accounting event: a balanced set of postings.
///
/// Balancing (the sum of transaction amounts nets to zero per commodity) is
/// enforced by external domain logic, not by this codec.
#[derive(Debug, Clone)]
pub struct Entry {
    pub date: NaiveDate,
    pub state: EntryState,
    pub code: String,
    pub payee: String,
    pub transactions: Vec<Transaction>,
}

impl Entry {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            state: EntryState::Uncleared,
            code: String::new(),
            payee: String::new(),
            transactions: Vec::new(),
        }
    }

    /// Append a transaction, returning its index within this entry — used
    /// by callers that also need to register the account's back-pointer.
    pub fn add_transaction(&mut self, transaction: Transaction) -> usize {
        self.transactions.push(transaction);
        self.transactions.len() - 1
    }
}
