//! Bounds-checked big-endian decoding primitives.
//!
//! Every on-disk integer in XFS is big-endian; this crate exposes exactly one
//! decode path per width so callers can never accidentally read host-endian.
//! `#[derive(XfsDecode)]` generates a sequential, offset-accumulating decode
//! for plain-old-data structs out of those primitives, mirroring the manual
//! pattern used for hand-rolled records throughout this codebase.

mod numbers;

pub use xfs_decode_macros::XfsDecode;

use thiserror::Error;

/// Failure of a bounds-checked decode. Never panics; always returned.
#[derive(Debug, Clone, Copy, Error)]
pub enum DecodeError {
    #[error("buffer too small: needed {needed} bytes, had {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Decodes `Self` from the front of `input`, returning the value and the
/// number of bytes consumed. Implementors must never read past `input.len()`.
pub trait Decode: Sized {
    fn decode(input: &[u8]) -> Result<(Self, usize), DecodeError>;
}

/// Reads a big-endian `u16` at `input[0..2]`.
pub fn read_u16(input: &[u8]) -> Result<u16, DecodeError> {
    Ok(u16::decode(input)?.0)
}

/// Reads a big-endian `u32` at `input[0..4]`.
pub fn read_u32(input: &[u8]) -> Result<u32, DecodeError> {
    Ok(u32::decode(input)?.0)
}

/// Reads a big-endian `u64` at `input[0..8]`.
pub fn read_u64(input: &[u8]) -> Result<u64, DecodeError> {
    Ok(u64::decode(input)?.0)
}

/// Splits a 128-bit big-endian value stored as two consecutive `u64`s into
/// `(high, low)`, as used by the packed extent record.
pub fn read_u128_halves(input: &[u8]) -> Result<(u64, u64), DecodeError> {
    let (high, used) = u64::decode(input)?;
    let (low, _) = u64::decode(&input[used..])?;
    Ok((high, low))
}

/// Reads a 16-byte GUID verbatim (XFS stores these byte-for-byte, not as a
/// mixed-endian Microsoft GUID, so no field reordering is needed).
pub fn read_guid(input: &[u8]) -> Result<uuid::Uuid, DecodeError> {
    let (bytes, _) = <[u8; 16]>::decode(input)?;
    Ok(uuid::Uuid::from_bytes(bytes))
}

fn bounds_check(input: &[u8], needed: usize) -> Result<(), DecodeError> {
    if input.len() < needed {
        return Err(DecodeError::BufferTooSmall {
            needed,
            available: input.len(),
        });
    }
    Ok(())
}

pub(crate) use bounds_check as check;
