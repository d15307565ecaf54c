//! Runtime configuration for the journal cache codec.
//!
//! There is no file-based configuration system here: the original format has
//! no configuration surface beyond a couple of compile-time flags, so the
//! only job of this module is to make those flags runtime-visible and
//! documented rather than to grow a settings subsystem nobody asked for.

/// Width used for the header's "count" fields (`entry_count`,
/// `transaction_count`, `bigint_count`, `account_count`, `commodity_count`,
/// and the back-patched `string_pool_size`).
///
/// `Pinned64` is the default and the only mode this crate's own writer ever
/// produces. `Legacy32` exists to read historical fixtures that used the
/// original's host `unsigned long` width when that happened to be 32 bits;
/// writing in `Legacy32` is intentionally not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordWidth {
    Pinned64,
    Legacy32,
}

impl Default for WordWidth {
    fn default() -> Self {
        WordWidth::Pinned64
    }
}

/// Options controlling the exact byte shape the codec reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Bracket every length-prefixed string with `0x3001`/`0x3002` guard
    /// words. Defaults to `cfg!(debug_assertions)`, matching the original's
    /// debug-build-only framing, but is a runtime flag here so both framed
    /// and unframed encodings can be exercised in one test binary.
    pub debug_guards: bool,
    /// Maximum length (in bytes) accepted for any length-prefixed string.
    /// The wire format caps this at `u16::MAX` by construction.
    pub max_string_len: u16,
    /// Width of the header's count fields. See [`WordWidth`].
    pub word_width: WordWidth,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            debug_guards: cfg!(debug_assertions),
            max_string_len: u16::MAX,
            word_width: WordWidth::default(),
        }
    }
}

impl CodecOptions {
    /// Options matching the original's debug build: guarded strings, pinned
    /// word width.
    pub fn with_debug_guards() -> Self {
        Self {
            debug_guards: true,
            ..Self::default()
        }
    }

    /// Options matching the original's release build: no guards.
    pub fn release() -> Self {
        Self {
            debug_guards: false,
            ..Self::default()
        }
    }
}
