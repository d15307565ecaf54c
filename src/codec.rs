//! The journal codec driver: orchestrates the header, the account and
//! commodity tables, the string-pool back-patch, and the entry records into
//! a single cache file.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, trace, warn};

use crate::config::CodecOptions;
use crate::error::{CodecError, Result};
use crate::journal::account::AccountTable;
use crate::journal::Journal;
use crate::pool::{read_entries, write_entries, write_string_pool_phase};
use crate::primitive::{
    fill_u64, read_count, read_len_string, read_u16, reserve_u64, write_count, write_len_string,
    write_u16, write_u32, MAGIC,
};
use crate::symbol_table::{read_account_tree, read_commodity_table, write_account_tree, write_commodity_table};

/// Outcome of attempting to load a cache. Distinguishes "this cache cannot
/// be used right now" (not applicable, or stale) from genuine structural
/// failure, which is reported through `Result`'s `Err` arm instead.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Magic or version mismatch; this is not one of this crate's cache files.
    NotApplicable,
    /// The cache's recorded sources disagree with what is on disk now.
    Stale,
    /// The cache loaded successfully.
    Loaded { journal: Journal, entry_count: u64 },
}

/// Parser-registry contract: lets a caller register this codec alongside
/// other hypothetical cache formats without depending on its concrete type.
pub trait JournalCache {
    fn test(&self, r: &mut (impl Read + Seek)) -> io::Result<bool>;
    fn parse(
        &self,
        r: &mut (impl Read + Seek),
        master: Option<&mut AccountTable>,
        original_path: Option<&Path>,
    ) -> Result<LoadOutcome>;
}

/// Reads and writes the binary journal cache format.
#[derive(Debug, Default)]
pub struct JournalCodec {
    pub options: CodecOptions,
}

impl JournalCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    /// Check the magic and format version without disturbing a mismatched
    /// stream's position.
    pub fn test(&self, r: &mut (impl Read + Seek)) -> io::Result<bool> {
        let start = r.stream_position()?;
        let mut header = [0u8; 8];
        let ok = match r.read_exact(&mut header) {
            Ok(()) => {
                let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
                let version = u32::from_le_bytes(header[4..8].try_into().unwrap());
                magic == MAGIC && version == crate::primitive::FORMAT_VERSION
            }
            Err(_) => false,
        };
        if !ok {
            r.seek(SeekFrom::Start(start))?;
        }
        Ok(ok)
    }

    /// Load a journal from an arbitrary seekable stream.
    ///
    /// `expected_first_path`, when given, must equal the cache's first
    /// recorded source path or the cache is reported stale rather than
    /// mismatched outright (a cache built from a different file set should
    /// never be silently adopted).
    pub fn parse(
        &self,
        r: &mut (impl Read + Seek),
        target: Option<&mut AccountTable>,
        expected_first_path: Option<&Path>,
    ) -> Result<LoadOutcome> {
        if !self.test(r)? {
            return Ok(LoadOutcome::NotApplicable);
        }
        trace!("magic and format version matched, parsing cache body");

        let file_count = read_u16(r)?;
        let mut sources = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let path = PathBuf::from(read_len_string(r, &self.options)?);
            let mtime_secs = crate::primitive::read_i64(r)?;
            let mtime = DateTime::<Utc>::from_timestamp(mtime_secs, 0).unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
            sources.push((path, mtime));
        }

        if let (Some(expected), Some((first, _))) = (expected_first_path, sources.first()) {
            if expected != first.as_path() {
                debug!(?expected, recorded = ?first, "cache's recorded source set does not match caller's expectation");
                return Ok(LoadOutcome::Stale);
            }
        }
        for (path, recorded_mtime) in &sources {
            match std::fs::metadata(path) {
                Ok(meta) => {
                    let live: DateTime<Utc> = meta.modified()?.into();
                    if live.timestamp() > recorded_mtime.timestamp() {
                        debug!(?path, "source file is newer than the cache's recorded mtime");
                        return Ok(LoadOutcome::Stale);
                    }
                }
                Err(_) => {
                    warn!(?path, "cache's recorded source file is missing");
                    return Ok(LoadOutcome::Stale);
                }
            }
        }

        let mut journal = Journal::new();
        for (path, mtime) in sources {
            journal.add_source(path, mtime);
        }

        // When merging onto a caller-supplied target, the loaded journal's
        // own account table becomes a copy of the merged target so that the
        // `id_map` below (built against `existing`) resolves correctly
        // against whichever table `journal.accounts` ends up holding.
        let id_map = match target {
            Some(existing) => {
                let id_map = read_account_tree(r, &self.options, self.options.word_width, existing, true)?;
                journal.accounts = existing.clone();
                id_map
            }
            None => read_account_tree(r, &self.options, self.options.word_width, &mut journal.accounts, false)?,
        };

        let string_pool_size = read_count(r, self.options.word_width)?;
        let mut pool_bytes = vec![0u8; string_pool_size as usize];
        r.read_exact(&mut pool_bytes)?;
        let mut pool_cursor = Cursor::new(pool_bytes.as_slice());

        let entry_count = read_count(r, self.options.word_width)?;
        let xact_count = read_count(r, self.options.word_width)?;
        let bigint_count = read_count(r, self.options.word_width)?;

        let mut bigints_read = 0u64;
        let commodities = read_commodity_table(r, &self.options, self.options.word_width, &mut bigints_read)?;
        let commodity_count = commodities.len() as u32;
        journal.commodities = commodities;

        let entries = read_entries(
            r,
            &mut pool_cursor,
            &self.options,
            entry_count,
            xact_count,
            commodity_count,
            &id_map,
            &mut journal.accounts,
            &mut bigints_read,
        )?;
        journal.entries = entries;

        if pool_cursor.position() != string_pool_size {
            return Err(CodecError::StringPoolOverrun {
                expected: string_pool_size,
                actual: pool_cursor.position(),
            });
        }
        if bigints_read != bigint_count {
            return Err(CodecError::CountMismatch {
                what: "bigints",
                expected: bigint_count,
                actual: bigints_read,
            });
        }

        debug!(entry_count, xact_count, bigint_count, "journal cache loaded");
        Ok(LoadOutcome::Loaded { journal, entry_count })
    }

    /// Memory-map `path` and parse it without copying the file into a
    /// heap-allocated buffer first.
    pub fn load_path(&self, path: &Path, target: Option<&mut AccountTable>) -> Result<LoadOutcome> {
        let file = File::open(path)?;
        // SAFETY: mapping a file that may be concurrently modified by
        // another process is, in general, undefined behavior in the memmap2
        // crate's own contract; this crate accepts that risk exactly as its
        // teacher does for its own read-only mmap path, relying on the
        // caller not to mutate cache files while they are being read.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        let mut cursor = Cursor::new(mmap.as_ref());
        self.parse(&mut cursor, target, Some(path))
    }

    /// Write `journal` to a seekable sink.
    pub fn write(&self, w: &mut (impl Write + Seek), journal: &Journal) -> Result<()> {
        write_u32(w, MAGIC)?;
        write_u32(w, crate::primitive::FORMAT_VERSION)?;

        write_u16(w, journal.sources.len() as u16)?;
        for source in &journal.sources {
            write_len_string(w, &source.path.to_string_lossy(), &self.options)?;
            crate::primitive::write_i64(w, source.mtime.timestamp())?;
        }

        let wire_id = write_account_tree(w, &journal.accounts, &self.options)?;

        let pool_size_handle = reserve_u64(w)?;
        let pool_start = w.stream_position()?;
        let xact_count = write_string_pool_phase(w, journal, &self.options)?;
        let pool_end = w.stream_position()?;
        fill_u64(w, pool_size_handle, pool_end - pool_start)?;

        write_count(w, journal.entry_count())?;
        write_count(w, xact_count)?;

        let bigint_count_handle = reserve_u64(w)?;
        let mut bigints_count = 0u64;

        write_commodity_table(w, &journal.commodities, &self.options, &mut bigints_count)?;
        write_entries(w, journal, &wire_id, &mut bigints_count)?;

        fill_u64(w, bigint_count_handle, bigints_count)?;

        trace!(
            entry_count = journal.entry_count(),
            xact_count,
            bigints_count,
            "journal cache written"
        );
        Ok(())
    }

    pub fn write_to_path(&self, path: &Path, journal: &Journal) -> Result<()> {
        let mut file = File::create(path)?;
        self.write(&mut file, journal)
    }
}

impl JournalCache for JournalCodec {
    fn test(&self, r: &mut (impl Read + Seek)) -> io::Result<bool> {
        JournalCodec::test(self, r)
    }

    fn parse(
        &self,
        r: &mut (impl Read + Seek),
        master: Option<&mut AccountTable>,
        original_path: Option<&Path>,
    ) -> Result<LoadOutcome> {
        JournalCodec::parse(self, r, master, original_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::journal::entry::{Entry, Transaction};
    use num_bigint::BigInt;

    fn balanced_journal() -> Journal {
        let mut journal = Journal::new();
        let cash = journal.accounts.find_or_create_path("Assets:Cash");
        let food = journal.accounts.find_or_create_path("Expenses:Food");
        let usd = journal.commodities.get_or_create("$");

        let mut entry = Entry::new(chrono::NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        entry.payee = "Farmers Market".into();
        let idx = journal.add_entry(entry);
        journal.add_transaction(idx, Transaction::new(food, Amount::new(Some(usd), BigInt::from(1200))));
        journal.add_transaction(idx, Transaction::new(cash, Amount::new(Some(usd), BigInt::from(-1200))));
        journal
    }

    #[test]
    fn empty_journal_roundtrips() {
        let journal = Journal::new();
        let codec = JournalCodec::new(CodecOptions::release());
        let mut buf = Cursor::new(Vec::new());
        codec.write(&mut buf, &journal).unwrap();
        buf.set_position(0);

        match codec.parse(&mut buf, None, None).unwrap() {
            LoadOutcome::Loaded { journal: loaded, entry_count } => {
                assert_eq!(entry_count, 0);
                assert_eq!(loaded.entries.len(), 0);
                assert_eq!(loaded.accounts.len(), 1);
            }
            other => panic!("expected Loaded, got {:?}", other),
        }
    }

    #[test]
    fn single_entry_with_two_transactions_roundtrips() {
        let journal = balanced_journal();
        let codec = JournalCodec::new(CodecOptions::with_debug_guards());
        let mut buf = Cursor::new(Vec::new());
        codec.write(&mut buf, &journal).unwrap();
        buf.set_position(0);

        match codec.parse(&mut buf, None, None).unwrap() {
            LoadOutcome::Loaded { journal: loaded, entry_count } => {
                assert_eq!(entry_count, 1);
                assert_eq!(loaded.entries[0].payee, "Farmers Market");
                assert_eq!(loaded.entries[0].transactions.len(), 2);
                assert_eq!(loaded.commodities.len(), 1);
                assert_eq!(loaded.bigint_count(), journal.bigint_count());
            }
            other => panic!("expected Loaded, got {:?}", other),
        }
    }

    #[test]
    fn version_mismatch_is_not_applicable_and_rewinds() {
        let codec = JournalCodec::new(CodecOptions::release());
        let mut buf = Cursor::new(vec![0u8; 16]);
        let outcome = codec.parse(&mut buf, None, None).unwrap();
        assert!(matches!(outcome, LoadOutcome::NotApplicable));
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn staleness_detected_after_touching_a_source_file() {
        let dir = std::env::temp_dir().join(format!("ledger_cache_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("book.journal");
        std::fs::write(&source, b"2024/01/01 open\n").unwrap();

        let mut journal = balanced_journal();
        let old_mtime = Utc.timestamp_opt(0, 0).unwrap();
        journal.add_source(source.clone(), old_mtime);

        let codec = JournalCodec::new(CodecOptions::release());
        let mut buf = Cursor::new(Vec::new());
        codec.write(&mut buf, &journal).unwrap();
        buf.set_position(0);

        let outcome = codec.parse(&mut buf, None, None).unwrap();
        assert!(matches!(outcome, LoadOutcome::Stale));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn replacement_master_merge_via_parse() {
        let source_journal = balanced_journal();
        let codec = JournalCodec::new(CodecOptions::release());
        let mut buf = Cursor::new(Vec::new());
        codec.write(&mut buf, &source_journal).unwrap();
        buf.set_position(0);

        let mut existing = AccountTable::new("");
        existing.add_account(existing.master_id(), "PreExisting");

        let outcome = codec.parse(&mut buf, Some(&mut existing), None).unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
        let names: Vec<&str> = existing
            .get(existing.master_id())
            .unwrap()
            .children
            .iter()
            .map(|&id| existing.get(id).unwrap().name.as_str())
            .collect();
        assert!(names.contains(&"PreExisting"));
        assert!(names.contains(&"Assets") || names.contains(&"Expenses"));
    }
}
