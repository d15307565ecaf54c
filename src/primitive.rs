//! Primitive I/O: fixed-width integers, length-prefixed strings, debug
//! framing guards, and the back-patch abstraction used by the journal
//! driver's deferred counters.
//!
//! Everything here is little-endian by construction (`to_le_bytes` /
//! `from_le_bytes`), independent of host endianness, even though the format
//! itself does not declare endianness on the wire and assumes a matching
//! writer and reader.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::config::{CodecOptions, WordWidth};
use crate::error::{CodecError, Result};

/// File magic. The first four bytes of every cache file.
pub const MAGIC: u32 = 0xFFEE_D765;
/// Format version this crate writes and the default it expects to read.
pub const FORMAT_VERSION: u32 = 0x0002_0019;
/// Sentinel identifier meaning "no account" / "no commodity" / "no parent".
pub const NONE_ID: u32 = 0xFFFF_FFFF;

const GUARD_BEFORE: u16 = 0x3001;
const GUARD_AFTER: u16 = 0x3002;

const STRING_ESCAPE: u8 = 0xFF;
const STRING_MAX_SHORT: u8 = 254;

// ---------------------------------------------------------------------------
// Fixed-width integers
// ---------------------------------------------------------------------------

pub fn write_u8(w: &mut impl Write, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn read_u8(r: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_u16(w: &mut impl Write, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_u16(r: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn write_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn write_u64(w: &mut impl Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn write_i64(w: &mut impl Write, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_i64(r: &mut impl Read) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// A "count" field whose width is pinned to `u64` by this rewrite, but
/// which this crate can still read back in the original's 32-bit shape for
/// historical fixtures.
pub fn write_count(w: &mut impl Write, v: u64) -> io::Result<()> {
    write_u64(w, v)
}

pub fn read_count(r: &mut impl Read, word_width: WordWidth) -> io::Result<u64> {
    match word_width {
        WordWidth::Pinned64 => read_u64(r),
        WordWidth::Legacy32 => Ok(read_u32(r)? as u64),
    }
}

// ---------------------------------------------------------------------------
// Length-prefixed strings
// ---------------------------------------------------------------------------

/// Write a length-prefixed string, optionally bracketed by debug guards.
///
/// Prefix byte: `0x00` = empty, `1..=254` = byte length, `0xFF` = escape
/// followed by a `u16` length. Empty strings emit only the zero prefix (no
/// guards, matching the original).
pub fn write_len_string(w: &mut impl Write, s: &str, opts: &CodecOptions) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > opts.max_string_len as usize {
        return Err(CodecError::StringTooLong(bytes.len()));
    }

    if bytes.is_empty() {
        write_u8(w, 0)?;
        return Ok(());
    }

    if opts.debug_guards {
        write_u16(w, GUARD_BEFORE)?;
    }

    if bytes.len() <= STRING_MAX_SHORT as usize {
        write_u8(w, bytes.len() as u8)?;
    } else {
        write_u8(w, STRING_ESCAPE)?;
        write_u16(w, bytes.len() as u16)?;
    }
    w.write_all(bytes)?;

    if opts.debug_guards {
        write_u16(w, GUARD_AFTER)?;
    }
    Ok(())
}

/// Read a length-prefixed string written by [`write_len_string`].
pub fn read_len_string(r: &mut impl Read, opts: &CodecOptions) -> Result<String> {
    let prefix = read_u8(r)?;
    if prefix == 0 {
        return Ok(String::new());
    }

    if opts.debug_guards {
        let guard = read_u16(r)?;
        if guard != GUARD_BEFORE {
            return Err(CodecError::DebugGuardMismatch {
                expected: GUARD_BEFORE,
                found: guard,
            });
        }
    }

    let len = if prefix == STRING_ESCAPE {
        read_u16(r)? as usize
    } else {
        prefix as usize
    };
    if len > opts.max_string_len as usize {
        return Err(CodecError::StringTooLong(len));
    }

    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    let s = String::from_utf8(buf)?;

    if opts.debug_guards {
        let guard = read_u16(r)?;
        if guard != GUARD_AFTER {
            return Err(CodecError::DebugGuardMismatch {
                expected: GUARD_AFTER,
                found: guard,
            });
        }
    }

    Ok(s)
}

// ---------------------------------------------------------------------------
// Note: `write_len_string`/`read_len_string` are oblivious to whether the
// underlying reader/writer is the main stream or a pooled byte buffer — a
// `Vec<u8>` implements `Write` and `std::io::Cursor<&[u8]>` implements
// `Read`, so the "streamed vs. pooled" distinction is just a choice of
// which stream the caller passes in, not a second code path.
// ---------------------------------------------------------------------------

// ---------------------------------------------------------------------------
// Back-patching
// ---------------------------------------------------------------------------

/// A reserved, not-yet-filled `u64` slot in a seekable sink.
#[derive(Debug, Clone, Copy)]
pub struct BackpatchHandle(u64);

/// Reserve a placeholder `u64` at the sink's current position, to be filled
/// in later via [`fill_u64`] once the real value is known.
pub fn reserve_u64(w: &mut (impl Write + Seek)) -> io::Result<BackpatchHandle> {
    let pos = w.stream_position()?;
    write_u64(w, 0)?;
    Ok(BackpatchHandle(pos))
}

/// Seek back to a handle reserved by [`reserve_u64`] and write the final
/// value, then restore the sink's position to where it was before the seek.
pub fn fill_u64(w: &mut (impl Write + Seek), handle: BackpatchHandle, value: u64) -> io::Result<()> {
    let resume = w.stream_position()?;
    w.seek(SeekFrom::Start(handle.0))?;
    write_u64(w, value)?;
    w.seek(SeekFrom::Start(resume))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_short_string_no_guards() {
        let opts = CodecOptions::release();
        let mut buf = Vec::new();
        write_len_string(&mut buf, "Assets:Cash", &opts).unwrap();
        // 1 prefix byte + 11 bytes, no guards.
        assert_eq!(buf.len(), 12);
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_len_string(&mut cursor, &opts).unwrap(), "Assets:Cash");
    }

    #[test]
    fn roundtrip_empty_string() {
        let opts = CodecOptions::with_debug_guards();
        let mut buf = Vec::new();
        write_len_string(&mut buf, "", &opts).unwrap();
        assert_eq!(buf, vec![0u8]);
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_len_string(&mut cursor, &opts).unwrap(), "");
    }

    #[test]
    fn roundtrip_with_debug_guards() {
        let opts = CodecOptions::with_debug_guards();
        let mut buf = Vec::new();
        write_len_string(&mut buf, "Grocery", &opts).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_len_string(&mut cursor, &opts).unwrap(), "Grocery");
    }

    #[test]
    fn roundtrip_long_escaped_string() {
        let opts = CodecOptions::release();
        let long = "x".repeat(300);
        let mut buf = Vec::new();
        write_len_string(&mut buf, &long, &opts).unwrap();
        assert_eq!(buf[0], STRING_ESCAPE);
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_len_string(&mut cursor, &opts).unwrap(), long);
    }

    #[test]
    fn guard_mismatch_is_detected() {
        let opts = CodecOptions::with_debug_guards();
        let mut buf = Vec::new();
        write_len_string(&mut buf, "abc", &opts).unwrap();
        buf[1] = 0x00; // corrupt the guard-before low byte
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_len_string(&mut cursor, &opts),
            Err(CodecError::DebugGuardMismatch { .. })
        ));
    }

    #[test]
    fn backpatch_writes_final_value_and_restores_position() {
        let mut buf = Cursor::new(Vec::new());
        write_u32(&mut buf, 0xAAAA_AAAA).unwrap();
        let handle = reserve_u64(&mut buf).unwrap();
        write_u32(&mut buf, 0xBBBB_BBBB).unwrap();
        let resume_before = buf.stream_position().unwrap();
        fill_u64(&mut buf, handle, 42).unwrap();
        assert_eq!(buf.stream_position().unwrap(), resume_before);

        let bytes = buf.into_inner();
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0xAAAA_AAAA);
        assert_eq!(read_u64(&mut cursor).unwrap(), 42);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0xBBBB_BBBB);
    }
}
