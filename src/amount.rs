//! Amounts: a quantity paired with an optional commodity.
//!
//! The quantity is an arbitrary-precision signed integer (scaled by the
//! owning commodity's `precision`, exactly as the original treats its
//! bigint payload as opaque to the journal codec). This crate plays the
//! role of the original's external arithmetic library itself, using
//! `num_bigint::BigInt` and a small length-prefixed sign-magnitude wire
//! shape — grounded on `pallas-codec`'s optional `num-bigint` dependency in
//! the same retrieval pack, which exists for exactly this "arbitrary
//! precision payload" role.

use std::io::{Read, Write};

use num_bigint::BigInt;

use crate::error::{CodecError, Result};
use crate::journal::commodity::CommodityId;
use crate::primitive::{read_u32, read_u8, write_u32, write_u8, NONE_ID};

/// A quantity paired with an optional commodity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount {
    pub commodity: Option<CommodityId>,
    pub quantity: BigInt,
}

impl Amount {
    pub fn new(commodity: Option<CommodityId>, quantity: BigInt) -> Self {
        Self { commodity, quantity }
    }

    pub fn zero() -> Self {
        Self {
            commodity: None,
            quantity: BigInt::from(0),
        }
    }
}

/// Write the opaque bigint payload for `quantity`, advancing `bigints_count`
/// by one. This stands in for the original's `write_quantity`, whose
/// caller-provided counter lets the reader pre-size its bigint pool before
/// a single payload has been read.
pub fn write_quantity(w: &mut impl Write, quantity: &BigInt, bigints_count: &mut u64) -> Result<()> {
    let bytes = quantity.to_signed_bytes_le();
    write_u32(w, bytes.len() as u32)?;
    w.write_all(&bytes)?;
    *bigints_count += 1;
    Ok(())
}

/// Read a bigint payload written by [`write_quantity`], advancing
/// `bigints_count` by one so the caller can check it against the header's
/// declared `bigint_count` once the whole journal has been read.
pub fn read_quantity(r: &mut impl Read, bigints_count: &mut u64) -> Result<BigInt> {
    let len = read_u32(r)? as usize;
    // A payload claiming to be implausibly large is almost certainly a
    // structural corruption rather than a real quantity; bail out instead
    // of attempting a multi-gigabyte allocation on the reader's behalf.
    if len > 1 << 20 {
        return Err(CodecError::MalformedBigint);
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    *bigints_count += 1;
    Ok(BigInt::from_signed_bytes_le(&buf))
}

/// Serialize the commodity reference followed by the bigint payload.
pub fn write_amount(w: &mut impl Write, amount: &Amount, bigints_count: &mut u64) -> Result<()> {
    let id = amount.commodity.map(|c| c.0).unwrap_or(NONE_ID);
    write_u32(w, id)?;
    write_quantity(w, &amount.quantity, bigints_count)
}

/// Deserialize an amount. `commodity_count` bounds which identifiers are
/// valid (1-based, inclusive) so an out-of-range reference is reported as a
/// structural error instead of silently wrapping or panicking.
pub fn read_amount(r: &mut impl Read, commodity_count: u32, bigints_count: &mut u64) -> Result<Amount> {
    let id = read_u32(r)?;
    let commodity = if id == NONE_ID {
        None
    } else {
        if id == 0 || id > commodity_count {
            return Err(CodecError::CommodityIdOutOfRange(id));
        }
        Some(CommodityId(id))
    };
    let quantity = read_quantity(r, bigints_count)?;
    Ok(Amount::new(commodity, quantity))
}

/// Write `Some(amount)` as a one-byte presence flag followed by the amount,
/// or just a zero byte for `None` — used for transactions' optional cost
/// amount and commodities' optional conversion amount.
pub fn write_option_amount(w: &mut impl Write, amount: &Option<Amount>, bigints_count: &mut u64) -> Result<()> {
    match amount {
        Some(a) => {
            write_u8(w, 1)?;
            write_amount(w, a, bigints_count)
        }
        None => Ok(write_u8(w, 0)?),
    }
}

pub fn read_option_amount(
    r: &mut impl Read,
    commodity_count: u32,
    bigints_count: &mut u64,
) -> Result<Option<Amount>> {
    match read_u8(r)? {
        0 => Ok(None),
        _ => Ok(Some(read_amount(r, commodity_count, bigints_count)?)),
    }
}
