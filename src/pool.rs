//! The arena loader: writing the pooled-string span and the entry/transaction
//! records that reference it, and rebuilding both on read.
//!
//! There is no raw byte arena with placement construction here. The "pools"
//! are three plain `Vec`s
//! (`Journal::entries`, each `Entry::transactions`, and each `Amount`'s own
//! `BigInt`) pre-sized with `Vec::with_capacity` from the header's declared
//! counts, exactly as the teacher's own loaders pre-size a `Vec` from a
//! length read off the wire before pushing into it.

use std::io::{Cursor, Read, Write};

use crate::amount::{read_amount, read_option_amount, write_amount, write_option_amount};
use crate::config::CodecOptions;
use crate::error::{CodecError, Result};
use crate::journal::account::{AccountId, AccountTable, TransactionRef};
use crate::journal::entry::{Entry, EntryState, Transaction};
use crate::journal::Journal;
use crate::primitive::{read_len_string, read_u32, read_u8, write_len_string, write_u32, write_u8};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Write the pooled `code`/`payee`/note strings for every entry, in entry
/// and transaction order, into `pool`. Returns the total transaction count
/// tallied along the way.
pub fn write_string_pool_phase(pool: &mut impl Write, journal: &Journal, opts: &CodecOptions) -> Result<u64> {
    let mut xact_count = 0u64;
    for entry in &journal.entries {
        write_len_string(pool, &entry.code, opts)?;
        write_len_string(pool, &entry.payee, opts)?;
        for txn in &entry.transactions {
            write_len_string(pool, &txn.note, opts)?;
            xact_count += 1;
        }
    }
    Ok(xact_count)
}

/// Write the entry records that follow the string pool and commodity table:
/// date, state, transaction count, and each transaction's account
/// identifier, amount, optional cost, and flags. `code`/`payee`/`note` are
/// never rewritten here — they already live in the string pool.
pub fn write_entries(
    w: &mut impl Write,
    journal: &Journal,
    wire_id: &HashMap<AccountId, u32>,
    bigints_count: &mut u64,
) -> Result<()> {
    for entry in &journal.entries {
        write_i64_date(w, entry.date)?;
        write_u8(w, entry.state.to_wire())?;
        write_u32(w, entry.transactions.len() as u32)?;
        for txn in &entry.transactions {
            let account_wire = *wire_id
                .get(&txn.account)
                .expect("every transaction's account came from this journal's own account table");
            write_u32(w, account_wire)?;
            write_amount(w, &txn.amount, bigints_count)?;
            write_option_amount(w, &txn.cost, bigints_count)?;
            write_u32(w, txn.flags)?;
        }
    }
    Ok(())
}

/// Read the entry records into a fresh [`Journal`]'s entry pool, consuming
/// pooled strings from `pool_cursor` in lockstep and resolving account wire
/// identifiers via `id_map` (as produced by
/// [`crate::symbol_table::read_account_tree`]).
///
/// Validates declared counts against what is actually read, surfacing a
/// mismatch as [`CodecError::CountMismatch`] rather than trusting the
/// header blindly.
#[allow(clippy::too_many_arguments)]
pub fn read_entries(
    r: &mut impl Read,
    pool_cursor: &mut Cursor<&[u8]>,
    opts: &CodecOptions,
    entry_count: u64,
    xact_count: u64,
    commodity_count: u32,
    id_map: &[AccountId],
    accounts: &mut AccountTable,
    bigints_read: &mut u64,
) -> Result<Vec<Entry>> {
    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut txns_read = 0u64;

    for entry_index in 0..entry_count as usize {
        let date = read_i64_date(r)?;
        let state = EntryState::from_wire(read_u8(r)?).ok_or_else(|| {
            CodecError::MalformedEntry(format!("entry {} has an unrecognized state byte", entry_index))
        })?;
        let code = read_len_string(pool_cursor, opts)?;
        let payee = read_len_string(pool_cursor, opts)?;

        let txn_count = read_u32(r)?;
        let mut transactions = Vec::with_capacity(txn_count as usize);
        for transaction_index in 0..txn_count as usize {
            let account_wire = read_u32(r)?;
            if account_wire == 0 || account_wire as usize > id_map.len() {
                return Err(CodecError::AccountIdOutOfRange(account_wire));
            }
            let account = id_map[(account_wire - 1) as usize];
            let amount = read_amount(r, commodity_count, bigints_read)?;
            let cost = read_option_amount(r, commodity_count, bigints_read)?;
            let flags = read_u32(r)?;
            let note = read_len_string(pool_cursor, opts)?;

            transactions.push(Transaction {
                account,
                amount,
                cost,
                flags,
                note,
                bulk_alloc: true,
            });
            accounts.add_transaction(
                account,
                TransactionRef {
                    entry_index,
                    transaction_index,
                },
            );
            txns_read += 1;
        }

        entries.push(Entry {
            date,
            state,
            code,
            payee,
            transactions,
        });
    }

    if txns_read != xact_count {
        return Err(CodecError::CountMismatch {
            what: "transactions",
            expected: xact_count,
            actual: txns_read,
        });
    }

    Ok(entries)
}

fn write_i64_date(w: &mut impl Write, date: NaiveDate) -> Result<()> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time of day");
    crate::primitive::write_i64(w, midnight.and_utc().timestamp())?;
    Ok(())
}

fn read_i64_date(r: &mut impl Read) -> Result<NaiveDate> {
    let secs = crate::primitive::read_i64(r)?;
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| CodecError::MalformedEntry(format!("entry date timestamp {} is out of range", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use num_bigint::BigInt;

    fn sample_journal() -> (Journal, HashMap<AccountId, u32>) {
        let mut journal = Journal::new();
        let cash = journal.accounts.find_or_create_path("Assets:Cash");
        let food = journal.accounts.find_or_create_path("Expenses:Food");

        let mut entry = Entry::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        entry.code = "100".into();
        entry.payee = "Corner Store".into();
        let entry_index = journal.add_entry(entry);

        journal.add_transaction(
            entry_index,
            {
                let mut t = Transaction::new(food, Amount::new(None, BigInt::from(500)));
                t.note = "groceries".into();
                t
            },
        );
        journal.add_transaction(
            entry_index,
            Transaction::new(cash, Amount::new(None, BigInt::from(-500))),
        );

        let mut wire_id = HashMap::new();
        for (i, id) in journal.accounts.pre_order(journal.accounts.master_id()).into_iter().enumerate() {
            wire_id.insert(id, (i + 1) as u32);
        }
        (journal, wire_id)
    }

    #[test]
    fn string_pool_phase_tallies_transaction_count() {
        let (journal, _) = sample_journal();
        let opts = CodecOptions::release();
        let mut pool = Vec::new();
        let xact_count = write_string_pool_phase(&mut pool, &journal, &opts).unwrap();
        assert_eq!(xact_count, 2);
        assert!(!pool.is_empty());
    }

    #[test]
    fn entries_roundtrip_through_pool_and_main_stream() {
        let (journal, wire_id) = sample_journal();
        let opts = CodecOptions::release();

        let mut pool = Vec::new();
        let xact_count = write_string_pool_phase(&mut pool, &journal, &opts).unwrap();

        let mut bigints_count = 0u64;
        let mut main = Vec::new();
        write_entries(&mut main, &journal, &wire_id, &mut bigints_count).unwrap();
        assert_eq!(bigints_count, journal.bigint_count());

        let order = journal.accounts.pre_order(journal.accounts.master_id());
        let id_map: Vec<AccountId> = order;

        let mut accounts = AccountTable::new("");
        for _ in 1..id_map.len() {
            accounts.add_account(accounts.master_id(), "placeholder");
        }

        let mut main_cursor = Cursor::new(main.as_slice());
        let pool_slice: &[u8] = &pool;
        let mut pool_cursor = Cursor::new(pool_slice);
        let mut bigints_read = 0u64;
        let loaded = read_entries(
            &mut main_cursor,
            &mut pool_cursor,
            &opts,
            journal.entry_count(),
            xact_count,
            0,
            &id_map,
            &mut accounts,
            &mut bigints_read,
        )
        .unwrap();

        assert_eq!(pool_cursor.position(), pool.len() as u64);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].code, "100");
        assert_eq!(loaded[0].payee, "Corner Store");
        assert_eq!(loaded[0].transactions.len(), 2);
        assert_eq!(loaded[0].transactions[0].note, "groceries");
        assert_eq!(bigints_read, bigints_count);
    }
}
