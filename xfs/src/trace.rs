//! Optional structured diagnostics for decode sites.
//!
//! Decoders never own a logging sink and never touch process-global state;
//! callers that want visibility into AG mirror mismatches, B+ tree descent,
//! or attribute block walking pass a `Trace` by reference. Everyone else
//! passes `None` and pays nothing.

/// A decode-site event, cheap to construct, borrowed for the lifetime of the
/// callback invocation only.
pub enum Event<'a> {
    SuperblockMirrorMismatch { ag_index: u32 },
    BtreeDescent { signature: &'a str, level: u16, block: u64 },
    ExtentSparseGap { logical_block: u64, block_count: u64 },
    AttributeBlockVisited { signature: u16, block: u64 },
    DirectoryEntrySkipped { reason: &'a str },
}

pub type Trace<'a> = &'a mut dyn FnMut(Event);

pub(crate) fn emit(trace: Option<&mut dyn FnMut(Event)>, event: Event) {
    if let Some(f) = trace {
        f(event);
    }
}
