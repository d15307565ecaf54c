//! Linearizing and rebuilding the account tree and the commodity table, with
//! identifier fixups on read.

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::config::{CodecOptions, WordWidth};
use crate::error::{CodecError, Result};
use crate::journal::account::{AccountId, AccountTable};
use crate::journal::commodity::{Commodity, CommodityTable};
use crate::primitive::{
    read_count, read_len_string, read_u32, read_u8, write_count, write_len_string, write_u32,
    write_u8, NONE_ID,
};
use crate::amount::{read_amount, read_option_amount, write_amount, write_option_amount};
use crate::primitive::{read_i64, write_i64};
use chrono::{DateTime, TimeZone, Utc};

// ---------------------------------------------------------------------------
// Account tree
// ---------------------------------------------------------------------------

/// Write the full account tree reachable from `table`'s master, assigning
/// fresh pre-order identifiers — the writer never trusts an account's
/// in-memory id for wire ordering, because accounts may have been created in
/// an order that does not match a pre-order tree walk.
pub fn write_account_tree(
    w: &mut impl Write,
    table: &AccountTable,
    opts: &CodecOptions,
) -> Result<HashMap<AccountId, u32>> {
    let master = table.master_id();
    let order = table.pre_order(master);
    write_count(w, order.len() as u64)?;

    let mut wire_id = HashMap::with_capacity(order.len());
    for (i, &id) in order.iter().enumerate() {
        wire_id.insert(id, (i + 1) as u32);
    }

    write_account_node(w, table, master, &wire_id, opts)?;
    Ok(wire_id)
}

fn write_account_node(
    w: &mut impl Write,
    table: &AccountTable,
    id: AccountId,
    wire_id: &HashMap<AccountId, u32>,
    opts: &CodecOptions,
) -> Result<()> {
    let account = table.get(id).expect("id came from this table's own pre_order()");
    let this_wire = wire_id[&id];
    let parent_wire = account.parent.map(|p| wire_id[&p]).unwrap_or(NONE_ID);

    write_u32(w, this_wire)?;
    write_u32(w, parent_wire)?;
    write_len_string(w, &account.name, opts)?;
    write_len_string(w, &account.note, opts)?;
    write_u32(w, account.depth)?;
    write_u32(w, account.children.len() as u32)?;
    for &child in &account.children {
        write_account_node(w, table, child, wire_id, opts)?;
    }
    Ok(())
}

/// Read an account tree into `target`.
///
/// If `merge` is `false`, `target` is expected to be a fresh, single-node
/// table (just created via [`AccountTable::new`]) and is populated in
/// place; the returned `Vec` maps `wire_id - 1` to the resulting
/// [`AccountId`], which for this case is simply `AccountId(wire_id)`.
///
/// If `merge` is `true`, the bytes just read for the top-level account are
/// discarded and its children are re-parented onto `target`'s existing
/// master, for replacement-master support. The returned `Vec` still maps
/// every wire id to the id it now has inside `target`.
pub fn read_account_tree(
    r: &mut impl Read,
    opts: &CodecOptions,
    word_width: WordWidth,
    target: &mut AccountTable,
    merge: bool,
) -> Result<Vec<AccountId>> {
    let count = read_count(r, word_width)?;

    if !merge {
        let mut id_map = vec![AccountId(0); count as usize];
        let mut counter = 0u32;
        read_account_node(r, opts, target, None, &mut id_map, &mut counter)?;
        if counter as u64 != count {
            return Err(CodecError::CountMismatch {
                what: "accounts",
                expected: count,
                actual: counter as u64,
            });
        }
        Ok(id_map)
    } else {
        let mut temp = AccountTable::new("");
        let mut temp_id_map = vec![AccountId(0); count as usize];
        let mut counter = 0u32;
        read_account_node(r, opts, &mut temp, None, &mut temp_id_map, &mut counter)?;
        if counter as u64 != count {
            return Err(CodecError::CountMismatch {
                what: "accounts",
                expected: count,
                actual: counter as u64,
            });
        }

        let mut final_id_map = vec![target.master_id(); count as usize];
        let children: Vec<AccountId> = temp
            .get(temp.master_id())
            .expect("temp table always has a master")
            .children
            .clone();
        let onto = target.master_id();
        for child in children {
            graft_subtree(target, onto, &temp, child, &mut final_id_map);
        }
        Ok(final_id_map)
    }
}

/// Read one account record and its children. `parent` is `None` exactly
/// once, for the master account.
fn read_account_node(
    r: &mut impl Read,
    opts: &CodecOptions,
    table: &mut AccountTable,
    parent: Option<AccountId>,
    id_map: &mut [AccountId],
    counter: &mut u32,
) -> Result<AccountId> {
    let wire_id = read_u32(r)?;
    let parent_wire = read_u32(r)?;
    let name = read_len_string(r, opts)?;
    let note = read_len_string(r, opts)?;
    let depth = read_u32(r)?;
    let child_count = read_u32(r)?;

    *counter += 1;
    if wire_id != *counter {
        return Err(CodecError::AccountTreeCorrupt(format!(
            "expected pre-order ident {}, found {}",
            counter, wire_id
        )));
    }
    let expected_parent_wire = parent.map(|p| p.0).unwrap_or(NONE_ID);
    if parent_wire != expected_parent_wire {
        return Err(CodecError::AccountTreeCorrupt(format!(
            "account {} recorded parent {} but tree nesting implies {}",
            wire_id, parent_wire, expected_parent_wire
        )));
    }

    let this_id = match parent {
        None => {
            let master = table.master_id();
            let account = table.get_mut(master).expect("fresh table always has a master");
            account.name = name;
            account.note = note;
            account.depth = depth;
            master
        }
        Some(p) => {
            let id = table.add_account(p, name);
            let account = table.get_mut(id).expect("just inserted");
            account.note = note;
            if account.depth != depth {
                return Err(CodecError::AccountTreeCorrupt(format!(
                    "account {} recorded depth {} but tree nesting implies {}",
                    wire_id, depth, account.depth
                )));
            }
            id
        }
    };
    id_map[(wire_id - 1) as usize] = this_id;

    for _ in 0..child_count {
        read_account_node(r, opts, table, Some(this_id), id_map, counter)?;
    }
    Ok(this_id)
}

/// Copy a subtree of `source` (rooted at `node`) into `target` under
/// `onto`, recording each copied node's final id in `id_map` keyed by its
/// original wire id.
fn graft_subtree(
    target: &mut AccountTable,
    onto: AccountId,
    source: &AccountTable,
    node: AccountId,
    id_map: &mut [AccountId],
) {
    let account = source.get(node).expect("node came from source's own tree");
    let new_id = target.add_account(onto, account.name.clone());
    if let Some(a) = target.get_mut(new_id) {
        a.note = account.note.clone();
    }
    id_map[(node.0 - 1) as usize] = new_id;
    for &child in &account.children {
        graft_subtree(target, new_id, source, child, id_map);
    }
}

// ---------------------------------------------------------------------------
// Commodity table
// ---------------------------------------------------------------------------

/// Write every commodity in `table`. Unlike the account tree, commodities
/// need no write-time identifier side table: [`CommodityTable`] assigns
/// dense ids at creation (`get_or_create`), so the in-memory id already
/// matches the wire id — the original's in-band `commodity->ident =
/// ++commodity_index` mutation has no counterpart here at all.
pub fn write_commodity_table(
    w: &mut impl Write,
    table: &CommodityTable,
    opts: &CodecOptions,
    bigints_count: &mut u64,
) -> Result<()> {
    write_count(w, table.len() as u64)?;
    for commodity in table.iter() {
        write_u32(w, commodity.id.0)?;
        write_len_string(w, &commodity.symbol, opts)?;
        write_len_string(w, &commodity.name, opts)?;
        write_len_string(w, &commodity.note, opts)?;
        write_u8(w, commodity.precision)?;
        write_u32(w, commodity.flags)?;
        write_count(w, commodity.history.len() as u64)?;
        for (ts, amount) in &commodity.history {
            write_i64(w, ts.timestamp())?;
            write_amount(w, amount, bigints_count)?;
        }
        write_option_timestamp(w, commodity.last_lookup)?;
        write_option_amount(w, &commodity.conversion_amount, bigints_count)?;
    }
    Ok(())
}

/// Read `count` commodities into a fresh [`CommodityTable`]. Each record's
/// stored ident is validated against the insertion order but a symbol
/// collision is reported as [`CodecError::DuplicateCommoditySymbol`] rather
/// than asserted/panicked.
pub fn read_commodity_table(
    r: &mut impl Read,
    opts: &CodecOptions,
    word_width: WordWidth,
    bigints_read: &mut u64,
) -> Result<CommodityTable> {
    let count = read_count(r, word_width)?;
    let mut table = CommodityTable::new();
    for expected_id in 1..=count {
        let wire_id = read_u32(r)?;
        if wire_id as u64 != expected_id {
            return Err(CodecError::CountMismatch {
                what: "commodities",
                expected: expected_id,
                actual: wire_id as u64,
            });
        }
        let symbol = read_len_string(r, opts)?;
        let name = read_len_string(r, opts)?;
        let note = read_len_string(r, opts)?;
        let precision = read_u8(r)?;
        let flags = read_u32(r)?;
        let history_len = read_count(r, word_width)?;

        let commodity_count_so_far = (expected_id) as u32; // this commodity's own id is the current ceiling
        let mut history = std::collections::BTreeMap::new();
        for _ in 0..history_len {
            let ts = read_timestamp(r)?;
            let amount = read_amount(r, commodity_count_so_far, bigints_read)?;
            history.insert(ts, amount);
        }
        let last_lookup = read_option_timestamp(r)?;
        let conversion_amount = read_option_amount(r, commodity_count_so_far, bigints_read)?;

        let commodity = Commodity {
            id: crate::journal::commodity::CommodityId(wire_id),
            symbol,
            name,
            note,
            precision,
            flags,
            history,
            last_lookup,
            conversion_amount,
        };
        table.insert_loaded(commodity)?;
    }
    Ok(table)
}

fn read_timestamp(r: &mut impl Read) -> Result<DateTime<Utc>> {
    let secs = read_i64(r)?;
    Ok(Utc.timestamp_opt(secs, 0).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap()))
}

fn write_option_timestamp(w: &mut impl Write, ts: Option<DateTime<Utc>>) -> Result<()> {
    match ts {
        Some(ts) => {
            write_u8(w, 1)?;
            write_i64(w, ts.timestamp())?;
        }
        None => write_u8(w, 0)?,
    }
    Ok(())
}

fn read_option_timestamp(r: &mut impl Read) -> Result<Option<DateTime<Utc>>> {
    match read_u8(r)? {
        0 => Ok(None),
        _ => Ok(Some(read_timestamp(r)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn account_tree_roundtrip_fresh() {
        let mut table = AccountTable::new("");
        let assets = table.add_account(table.master_id(), "Assets");
        table.add_account(assets, "Cash");
        table.add_account(table.master_id(), "Expenses");

        let opts = CodecOptions::release();
        let mut buf = Vec::new();
        write_account_tree(&mut buf, &table, &opts).unwrap();

        let mut cursor = Cursor::new(buf);
        let mut fresh = AccountTable::new("");
        let id_map = read_account_tree(&mut cursor, &opts, WordWidth::Pinned64, &mut fresh, false).unwrap();
        assert_eq!(fresh.len(), table.len());
        assert_eq!(id_map.len(), table.len());
        assert_eq!(fresh.get(fresh.master_id()).unwrap().children.len(), 2);
    }

    #[test]
    fn account_tree_replacement_master_grafts_children() {
        let mut source = AccountTable::new("");
        let assets = source.add_account(source.master_id(), "Assets");
        source.add_account(assets, "Cash");

        let opts = CodecOptions::release();
        let mut buf = Vec::new();
        write_account_tree(&mut buf, &source, &opts).unwrap();

        let mut existing = AccountTable::new("");
        existing.add_account(existing.master_id(), "Extra");

        let mut cursor = Cursor::new(buf);
        read_account_tree(&mut cursor, &opts, WordWidth::Pinned64, &mut existing, true).unwrap();

        let master = existing.get(existing.master_id()).unwrap();
        assert_eq!(master.children.len(), 2);
        let names: Vec<&str> = master
            .children
            .iter()
            .map(|&id| existing.get(id).unwrap().name.as_str())
            .collect();
        assert!(names.contains(&"Extra"));
        assert!(names.contains(&"Assets"));
    }

    #[test]
    fn commodity_table_roundtrip() {
        let mut table = CommodityTable::new();
        let usd = table.get_or_create("$");
        table.get_mut(usd).unwrap().precision = 2;
        table.get_mut(usd).unwrap().name = "US Dollar".into();

        let opts = CodecOptions::release();
        let mut buf = Vec::new();
        let mut bigints_count = 0u64;
        write_commodity_table(&mut buf, &table, &opts, &mut bigints_count).unwrap();

        let mut cursor = Cursor::new(buf);
        let mut bigints_read = 0u64;
        let loaded = read_commodity_table(&mut cursor, &opts, WordWidth::Pinned64, &mut bigints_read).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get_by_symbol("$"), Some(usd));
        assert_eq!(loaded.get(usd).unwrap().name, "US Dollar");
        assert_eq!(bigints_read, bigints_count);
    }
}
