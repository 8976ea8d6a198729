use xfs_decode::read_u32;

use crate::error::{Error, Result};

pub const AGI_SIGNATURE: [u8; 4] = *b"XAGI";
pub const AGI_SIZE: usize = 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 64 * 4;

/// Per-AG inode-information record ("AGI"). Carries the inode B+ tree root
/// pointer and depth for this allocation group; the unlinked-inode hash
/// table is decoded but unused (recovery metadata, not exposed).
#[derive(Debug, Clone)]
pub struct AgInodeInformation {
    pub sequence_number: u32,
    pub number_of_inodes: u32,
    pub inode_btree_root_block: u32,
    pub inode_btree_depth: u32,
    pub number_of_unused_inodes: u32,
    pub last_allocated_chunk: u32,
    pub unlinked_hash_table: [u32; 64],
}

impl AgInodeInformation {
    pub fn decode(data: &[u8]) -> Result<AgInodeInformation> {
        if data.len() < AGI_SIZE {
            return Err(Error::CorruptedMetadata(format!(
                "AGI record too short: {} bytes",
                data.len()
            )));
        }
        if data[0..4] != AGI_SIGNATURE {
            return Err(Error::UnsupportedFormat("bad AGI signature".into()));
        }
        let format_version = read_u32(&data[4..8])?;
        if format_version != 1 {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported AGI format version: {format_version}"
            )));
        }
        let sequence_number = read_u32(&data[8..12])?;
        let number_of_inodes = read_u32(&data[16..20])?;
        let inode_btree_root_block = read_u32(&data[20..24])?;
        let inode_btree_depth = read_u32(&data[24..28])?;
        let number_of_unused_inodes = read_u32(&data[28..32])?;
        let last_allocated_chunk = read_u32(&data[32..36])?;

        let mut unlinked_hash_table = [0u32; 64];
        let table_start = 40;
        for (i, slot) in unlinked_hash_table.iter_mut().enumerate() {
            let off = table_start + i * 4;
            *slot = read_u32(&data[off..off + 4])?;
        }

        Ok(AgInodeInformation {
            sequence_number,
            number_of_inodes,
            inode_btree_root_block,
            inode_btree_depth,
            number_of_unused_inodes,
            last_allocated_chunk,
            unlinked_hash_table,
        })
    }
}

/// Immutable per-AG descriptor built at mount time.
#[derive(Debug, Clone)]
pub struct AllocationGroup {
    pub ag_index: u32,
    pub inode_information: AgInodeInformation,
}
