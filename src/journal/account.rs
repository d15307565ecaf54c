//! The chart of accounts: a tree of named nodes, stored flat and addressed
//! by a dense 1-based identifier rather than by nested ownership.
//!
//! Nested `Vec<Account>` ownership would make the "back-pointer" collection
//! of transactions (an account needs to know which transactions post to it,
//! without owning them) awkward to express without `Rc`/`RefCell` or
//! `unsafe`. A flat table indexed by [`AccountId`] — the same idea the
//! original's `accounts[ident - 1]` index array uses for the *reader* — is
//! used here for the live tree too, so a single, obvious representation
//! serves both construction and cache round-tripping.

use std::fmt;

/// A dense, 1-based account identifier. `NONE` is reserved by the wire
/// format as the "no parent" sentinel and never denotes a real account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub u32);

impl AccountId {
    pub const MASTER: AccountId = AccountId(1);

    pub(crate) fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-owning reference to a transaction: which entry it belongs to, and
/// its position within that entry's transaction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionRef {
    pub entry_index: usize,
    pub transaction_index: usize,
}

/// A single node in the chart of accounts.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub parent: Option<AccountId>,
    pub name: String,
    pub note: String,
    pub depth: u32,
    pub children: Vec<AccountId>,
    /// Back-pointers into the journal's entries, populated as transactions
    /// are constructed. Non-owning: the transactions themselves live in
    /// their entry's own `Vec<Transaction>`.
    pub transactions: Vec<TransactionRef>,
}

impl Account {
    fn new(id: AccountId, parent: Option<AccountId>, name: String, depth: u32) -> Self {
        Self {
            id,
            parent,
            name,
            note: String::new(),
            depth,
            children: Vec::new(),
            transactions: Vec::new(),
        }
    }
}

/// The flat storage for a chart of accounts. `accounts[0]` is always the
/// master (root) account, with [`AccountId::MASTER`].
#[derive(Debug, Clone)]
pub struct AccountTable {
    accounts: Vec<Account>,
}

impl AccountTable {
    /// Create a table containing only the master account.
    pub fn new(master_name: impl Into<String>) -> Self {
        Self {
            accounts: vec![Account::new(AccountId::MASTER, None, master_name.into(), 0)],
        }
    }

    pub fn master_id(&self) -> AccountId {
        AccountId::MASTER
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(id.index())
    }

    pub fn get_mut(&mut self, id: AccountId) -> Option<&mut Account> {
        self.accounts.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    /// Add a new child account under `parent`, returning its fresh id.
    pub fn add_account(&mut self, parent: AccountId, name: impl Into<String>) -> AccountId {
        let depth = self.get(parent).map(|a| a.depth + 1).unwrap_or(0);
        let id = AccountId((self.accounts.len() + 1) as u32);
        self.accounts.push(Account::new(id, Some(parent), name.into(), depth));
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        id
    }

    /// Record that a transaction posts to `account`.
    pub fn add_transaction(&mut self, account: AccountId, reference: TransactionRef) {
        if let Some(a) = self.get_mut(account) {
            a.transactions.push(reference);
        }
    }

    /// Find (or create) the account reachable from the master by a
    /// colon-separated path, e.g. `"Assets:Cash"`. Intermediate segments
    /// are created as needed, matching the way a textual parser would
    /// intern chart-of-accounts paths incrementally.
    pub fn find_or_create_path(&mut self, path: &str) -> AccountId {
        let mut current = self.master_id();
        for segment in path.split(':') {
            let existing = self
                .get(current)
                .and_then(|a| a.children.iter().find(|&&c| self.get(c).map(|x| x.name.as_str()) == Some(segment)).copied());
            current = match existing {
                Some(id) => id,
                None => self.add_account(current, segment),
            };
        }
        current
    }

    /// Depth-first pre-order traversal starting at `root`, yielding ids in
    /// the exact order the symbol table codec writes and reads them.
    pub fn pre_order(&self, root: AccountId) -> Vec<AccountId> {
        let mut out = Vec::with_capacity(self.accounts.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(account) = self.get(id) {
                // Push in reverse so children are visited in declaration order.
                for &child in account.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_create_path_interns_segments() {
        let mut table = AccountTable::new("");
        let cash = table.find_or_create_path("Assets:Cash");
        let cash_again = table.find_or_create_path("Assets:Cash");
        assert_eq!(cash, cash_again);
        assert_eq!(table.get(cash).unwrap().name, "Cash");
        assert_eq!(table.get(cash).unwrap().depth, 2);
    }

    #[test]
    fn pre_order_visits_master_first() {
        let mut table = AccountTable::new("");
        let assets = table.add_account(table.master_id(), "Assets");
        let cash = table.add_account(assets, "Cash");
        let expenses = table.add_account(table.master_id(), "Expenses");
        let order = table.pre_order(table.master_id());
        assert_eq!(order, vec![table.master_id(), assets, cash, expenses]);
    }
}
