use crate::error::{Error, Result};

/// Positioned, synchronous, random-access read over the backing device or
/// image. The core never depends on a device cursor and never mutates the
/// source; multi-threaded wrapping (a readers-writer lock) is the caller's
/// responsibility, not this trait's.
pub trait IoHandle {
    /// Reads exactly `buffer.len()` bytes starting at `offset`. A short read
    /// is an error, not a partial success.
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<()>;

    /// Total addressable length of the backing source, if known. Used only
    /// for bounds sanity checks at mount time.
    fn len(&self) -> Option<u64> {
        None
    }
}

pub(crate) fn read_exact(io: &dyn IoHandle, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    io.read_at(offset, &mut buf)?;
    Ok(buf)
}

/// An `IoHandle` over an in-memory buffer, used by tests and by callers
/// that have already mapped or loaded the whole image.
pub struct SliceIoHandle<'a> {
    data: &'a [u8],
}

impl<'a> SliceIoHandle<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceIoHandle { data }
    }
}

impl IoHandle for SliceIoHandle<'_> {
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| Error::Io("offset exceeds addressable range".into()))?;
        let end = start
            .checked_add(buffer.len())
            .ok_or_else(|| Error::Io("offset overflow".into()))?;
        let src = self
            .data
            .get(start..end)
            .ok_or_else(|| Error::Io(format!("short read at {start}..{end}")))?;
        buffer.copy_from_slice(src);
        Ok(())
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}
