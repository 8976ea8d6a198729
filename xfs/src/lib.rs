//! Read-only parser and navigator for XFS (v4/v5) volumes.
//!
//! This crate never writes to its backing device: every public operation
//! decodes on-disk structures into owned, bounds-checked values and hands
//! back an immutable view. It targets forensic and data-recovery contexts,
//! so hostile or corrupted input must fail with an [`error::Error`], never
//! panic or read out of bounds.
//!
//! The [`Volume`] façade owns the mount lifecycle; [`FileEntry`] is the
//! per-inode handle returned by path resolution, inode lookup, and
//! directory iteration.

pub mod ag;
pub mod attr;
pub mod btree;
pub mod cancel;
pub mod datastream;
pub mod dir;
pub mod error;
pub mod extent;
pub mod inobt;
pub mod inode;
pub mod io;
pub mod superblock;
pub mod trace;

use ag::{AgInodeInformation, AllocationGroup};
use cancel::CancelToken;
use error::{Error, Result};
use inode::{Fork, Inode};
use io::IoHandle;
use superblock::Superblock;
use trace::Trace;

/// One resolved directory child: a name paired with the inode number it
/// points to. Resolving it into a full [`FileEntry`] is a separate, lazy
/// step so enumerating a large directory need not decode every inode.
#[derive(Debug, Clone)]
pub struct ChildEntry {
    pub name: Vec<u8>,
    pub inode_number: u64,
}

/// An open XFS volume. Immutable after [`Volume::open`]: geometry and the
/// per-AG inode B+ tree roots are fixed for the lifetime of the mount.
pub struct Volume<'io> {
    io: &'io dyn IoHandle,
    superblock: Superblock,
    allocation_groups: Vec<AllocationGroup>,
    cancel: CancelToken,
}

impl<'io> Volume<'io> {
    /// Opens a volume: reads AG 0's superblock to establish geometry, then
    /// walks every AG's superblock mirror and inode-information sector.
    /// A geometry mismatch between mirrors does not fail the mount (tolerant
    /// mode); only AG 0 seeds the returned geometry.
    pub fn open(io: &'io dyn IoHandle) -> Result<Volume<'io>> {
        Self::open_with(io, CancelToken::new(), None)
    }

    /// As [`Volume::open`], but shares a [`CancelToken`] the caller can
    /// signal from elsewhere (e.g. a signal handler) to abort in-progress
    /// traversals, and accepts an optional diagnostic trace callback.
    pub fn open_with(
        io: &'io dyn IoHandle,
        cancel: CancelToken,
        mut trace: Option<Trace>,
    ) -> Result<Volume<'io>> {
        let sb0 = io::read_exact(io, 0, superblock::SUPERBLOCK_SIZE)?;
        let superblock = Superblock::decode(&sb0)?;

        if let Some(len) = io.len() {
            let minimum = superblock.allocation_group_size as u64 * superblock.block_size as u64;
            if len < minimum {
                return Err(Error::CorruptedMetadata(
                    "backing source shorter than one allocation group".into(),
                ));
            }
        }

        let mut allocation_groups = Vec::with_capacity(superblock.number_of_allocation_groups as usize);
        for ag_index in 0..superblock.number_of_allocation_groups {
            cancel.check()?;

            let sb_offset = superblock.ag_superblock_offset(ag_index);
            let mirror_bytes = io::read_exact(io, sb_offset, superblock::SUPERBLOCK_SIZE)?;
            let mirror_ok = match Superblock::decode(&mirror_bytes) {
                Ok(mirror) => {
                    mirror.block_size == superblock.block_size
                        && mirror.format_version == superblock.format_version
                }
                Err(_) => false,
            };
            if !mirror_ok {
                trace::emit(
                    trace.as_deref_mut(),
                    trace::Event::SuperblockMirrorMismatch { ag_index },
                );
            }

            let agi_offset = sb_offset + 2 * superblock.sector_size as u64;
            let agi_bytes = io::read_exact(io, agi_offset, ag::AGI_SIZE)?;
            let inode_information = AgInodeInformation::decode(&agi_bytes)?;

            allocation_groups.push(AllocationGroup {
                ag_index,
                inode_information,
            });
        }

        Ok(Volume {
            io,
            superblock,
            allocation_groups,
            cancel,
        })
    }

    /// Clones the [`CancelToken`] this volume checks, so a caller can signal
    /// cancellation of any in-flight traversal from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Trimmed UTF-8 volume label (the 12-byte on-disk field, NUL-trimmed).
    pub fn label(&self) -> String {
        self.superblock.label()
    }

    pub fn format_version(&self) -> u8 {
        self.superblock.format_version
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// The root directory's file entry.
    pub fn root(&self) -> Result<FileEntry<'_, 'io>> {
        self.file_entry_by_inode(self.superblock.root_directory_inode_number)
    }

    /// Resolves an absolute inode number to a decoded [`FileEntry`]. This is
    /// the cache-miss path: every call re-descends the inode B+ tree and
    /// re-decodes the inode image, since this crate caches nothing itself.
    pub fn file_entry_by_inode(&self, inode_number: u64) -> Result<FileEntry<'_, 'io>> {
        let (ag_index, relative_inode) = self.superblock.split_inode_number(inode_number);
        let ag = self
            .allocation_groups
            .get(ag_index as usize)
            .ok_or_else(|| {
                Error::CorruptedMetadata(format!(
                    "inode {inode_number} addresses AG {ag_index}, but volume has {} AGs",
                    self.allocation_groups.len()
                ))
            })?;

        let location = inobt::find_inode(
            self.io,
            &self.superblock,
            ag_index,
            ag.inode_information.inode_btree_root_block,
            relative_inode,
            None,
        )?
        .ok_or_else(|| Error::NotFound(format!("no inode B+ tree leaf covers inode {inode_number}")))?;

        let image = io::read_exact(self.io, location.device_offset, self.superblock.inode_size as usize)?;
        let inode = Inode::decode(self.io, &self.superblock, inode_number, &image, None)?;

        Ok(FileEntry {
            volume: self,
            inode,
            name: Vec::new(),
        })
    }

    /// Resolves a UTF-8 `/`-separated path from the root directory. An
    /// empty segment between separators (a doubled `/`) fails the lookup;
    /// `""` and `"/"` both resolve to the root. Name comparison is raw byte
    /// equality, matching the on-disk encoding (case and normalization are
    /// the caller's concern).
    pub fn file_entry_by_path(&self, path: &str) -> Result<Option<FileEntry<'_, 'io>>> {
        self.resolve_path(path.split('/'))
    }

    /// As [`Volume::file_entry_by_path`], but takes path segments already
    /// split from a wide (UTF-16) string; this crate does no encoding
    /// conversion itself; it only accepts code-point segments produced by
    /// the caller's own UTF-16 splitting.
    pub fn file_entry_by_path_wide(&self, segments: &[&[u16]]) -> Result<Option<FileEntry<'_, 'io>>> {
        let owned: Vec<String> = segments
            .iter()
            .map(|segment| {
                char::decode_utf16(segment.iter().copied())
                    .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            })
            .collect();
        self.resolve_path(owned.iter().map(String::as_str))
    }

    fn resolve_path<'a>(
        &self,
        segments: impl Iterator<Item = &'a str>,
    ) -> Result<Option<FileEntry<'_, 'io>>> {
        let mut segments: Vec<&str> = segments.collect();
        // A single leading or trailing slash produces one empty segment at
        // that end; trim exactly those, so only an empty segment strictly
        // between two others (a doubled `/`) is left to fail the lookup.
        if segments.first() == Some(&"") {
            segments.remove(0);
        }
        if segments.last() == Some(&"") {
            segments.pop();
        }

        let mut current = self.root()?;
        for segment in segments {
            if segment.is_empty() {
                return Ok(None);
            }
            match current.child(segment)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

/// A decoded filesystem object: an inode paired with the name that the
/// directory entry producing it carried (empty for the root or for entries
/// reached directly by inode number).
pub struct FileEntry<'v, 'io> {
    volume: &'v Volume<'io>,
    inode: Inode,
    name: Vec<u8>,
}

impl<'v, 'io> FileEntry<'v, 'io> {
    pub fn inode_number(&self) -> u64 {
        self.inode.inode_number
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn file_mode(&self) -> u16 {
        self.inode.file_mode
    }

    pub fn owner_id(&self) -> u32 {
        self.inode.owner_id
    }

    pub fn group_id(&self) -> u32 {
        self.inode.group_id
    }

    pub fn number_of_links(&self) -> u32 {
        self.inode.number_of_links
    }

    pub fn size(&self) -> u64 {
        self.inode.size
    }

    pub fn is_directory(&self) -> bool {
        self.inode.is_directory()
    }

    pub fn is_regular_file(&self) -> bool {
        self.inode.is_regular_file()
    }

    pub fn is_symlink(&self) -> bool {
        self.inode.is_symlink()
    }

    pub fn access_time_ns(&self) -> i64 {
        self.inode.timestamps.access_time_ns
    }

    pub fn modification_time_ns(&self) -> i64 {
        self.inode.timestamps.modification_time_ns
    }

    pub fn inode_change_time_ns(&self) -> i64 {
        self.inode.timestamps.inode_change_time_ns
    }

    /// `None` on v1/v2 inodes, which carry no creation time.
    pub fn creation_time_ns(&self) -> Option<i64> {
        self.inode.timestamps.creation_time_ns
    }

    /// `Some((major, minor))` for character/block device nodes, `None`
    /// otherwise.
    pub fn device_major_minor(&self) -> Option<(u32, u32)> {
        match self.inode.data_fork {
            Fork::Device { major, minor } => Some((major, minor)),
            _ => None,
        }
    }

    /// Enumerates this entry's children. Directory data is re-decoded on
    /// every call; this crate caches nothing. Fails if this entry is not a
    /// directory.
    pub fn children(&self) -> Result<Vec<ChildEntry>> {
        self.directory_entries()?
            .into_iter()
            .map(|e| {
                self.volume.cancel.check()?;
                Ok(ChildEntry {
                    name: e.name,
                    inode_number: e.inode_number,
                })
            })
            .collect()
    }

    /// Looks up one child by raw byte-equal name match and resolves it into
    /// a [`FileEntry`]. Returns `Ok(None)` if no entry has that name (not an
    /// error: a missing path segment is expected, recoverable input).
    pub fn child(&self, name: &str) -> Result<Option<FileEntry<'v, 'io>>> {
        let name_bytes = name.as_bytes();
        for entry in self.directory_entries()? {
            self.volume.cancel.check()?;
            if entry.name == name_bytes {
                let mut child = self.volume.file_entry_by_inode(entry.inode_number)?;
                child.name = entry.name;
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    fn directory_entries(&self) -> Result<Vec<dir::DirEntry>> {
        if !self.inode.is_directory() {
            return Err(Error::UnsupportedFormat(
                "children() called on a non-directory inode".into(),
            ));
        }
        // The ftype hint is only ever present when the superblock's
        // secondary feature flags enable it (v5 always carries it); the
        // inline/block decoders are told whether to expect the trailing byte.
        let file_type_flag_enabled = self.volume.superblock.secondary_feature_flags & 0x0200 != 0
            || self.volume.superblock.format_version >= 5;
        match &self.inode.data_fork {
            Fork::Inline(bytes) => {
                dir::decode_short_form(bytes, self.inode.inode_number, file_type_flag_enabled)
            }
            Fork::Extents(_) | Fork::Btree(_) => dir::decode_block_form(
                self.volume.io,
                &self.volume.superblock,
                &self.inode.data_fork,
                file_type_flag_enabled,
            ),
            Fork::Device { .. } => Err(Error::UnsupportedFormat(
                "device-node data fork cannot be a directory".into(),
            )),
        }
    }

    /// Enumerates this entry's extended attributes, across both the inline
    /// short-form and extent-backed block-form attribute storage. Returns an
    /// empty list if the inode has no attribute fork.
    pub fn attributes(&self) -> Result<Vec<attr::Attribute>> {
        match &self.inode.attr_fork {
            None => Ok(Vec::new()),
            Some(Fork::Inline(bytes)) => attr::decode_inline(bytes),
            Some(fork @ (Fork::Extents(_) | Fork::Btree(_))) => {
                attr::decode_block_form(self.volume.io, &self.volume.superblock, fork)
            }
            Some(Fork::Device { .. }) => Ok(Vec::new()),
        }
    }

    /// Reads the full value of a remote-stored attribute, given the
    /// `(block_number, size)` descriptor from [`attr::AttributeValue::Remote`].
    pub fn read_remote_attribute_value(&self, block_number: u32, size: u32) -> Result<Vec<u8>> {
        let fork = self
            .inode
            .attr_fork
            .as_ref()
            .ok_or_else(|| Error::NotFound("entry has no attribute fork".into()))?;
        attr::read_remote_value(self.volume.io, &self.volume.superblock, fork, block_number, size)
    }

    /// Per-extent `(device_offset, length, sparse)` enumeration of the data
    /// fork. Empty for inline and device forks.
    pub fn extents(&self) -> Vec<(u64, u64, bool)> {
        match self.inode.data_fork.as_extents() {
            Some(extents) => datastream::enumerate_extents(extents, &self.volume.superblock),
            None => Vec::new(),
        }
    }

    /// Reads up to `buffer.len()` bytes starting at `offset`, streaming
    /// through extents (or the inline buffer) as needed, zero-filling across
    /// sparse holes. Returns the number of bytes actually read, clamped to
    /// the file's logical size.
    pub fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        if offset >= self.inode.size {
            return Ok(0);
        }
        let available = (self.inode.size - offset).min(buffer.len() as u64) as usize;
        datastream::read_at(
            self.volume.io,
            &self.inode.data_fork,
            &self.volume.superblock,
            self.inode.size,
            offset,
            &mut buffer[..available],
        )?;
        Ok(available)
    }

    /// Reads the symbolic link's raw target bytes via the data stream. This
    /// crate does not interpret or resolve the target; it hands back exactly
    /// the bytes the filesystem stored.
    pub fn symlink_target(&self) -> Result<Vec<u8>> {
        if !self.is_symlink() {
            return Err(Error::UnsupportedFormat(
                "symlink_target() called on a non-symlink inode".into(),
            ));
        }
        let mut buffer = vec![0u8; self.inode.size as usize];
        let n = self.read_at(0, &mut buffer)?;
        buffer.truncate(n);
        Ok(buffer)
    }
}
