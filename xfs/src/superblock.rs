use uuid::Uuid;
use xfs_decode::{read_guid, read_u16, read_u32, read_u64};

use crate::error::{Error, Result};

pub const SUPERBLOCK_SIGNATURE: [u8; 4] = *b"XFSB";
pub const SUPERBLOCK_SIZE: usize = 512;

const SUPPORTED_FEATURE_FLAGS: u16 =
    0x0010 | 0x0020 | 0x0080 | 0x0400 | 0x0800 | 0x1000 | 0x2000 | 0x4000 | 0x8000;

// sb_features2: lazy superblock counters, attr2, 32-bit project IDs, CRCs,
// and the directory-entry file-type hint. Everything else is rejected.
const SUPPORTED_SECONDARY_FEATURE_FLAGS: u32 =
    0x0000_0002 | 0x0000_0008 | 0x0000_0080 | 0x0000_0100 | 0x0000_0200;

/// Immutable geometry descriptor decoded from AG 0's superblock. Every
/// derived quantity here is fixed for the lifetime of a mounted `Volume`.
#[derive(Debug, Clone)]
pub struct Superblock {
    pub format_version: u8,
    pub feature_flags: u16,
    pub secondary_feature_flags: u32,
    pub block_size: u32,
    pub sector_size: u16,
    pub inode_size: u16,
    pub inodes_per_block: u16,
    pub directory_block_size: u32,
    pub allocation_group_size: u32,
    pub number_of_allocation_groups: u32,
    pub number_of_inodes: u64,
    pub number_of_free_inodes: u64,
    pub number_of_blocks: u64,
    pub number_of_free_data_blocks: u64,
    pub root_directory_inode_number: u64,
    pub file_system_identifier: Uuid,
    pub volume_label: [u8; 12],
    pub relative_block_bits: u8,
    pub relative_inode_bits: u8,
}

impl Superblock {
    /// Decodes a 512-byte superblock record. Verifies signature, format
    /// version, feature-flag whitelist, and the geometry bounds the rest of
    /// the crate assumes hold.
    pub fn decode(data: &[u8]) -> Result<Superblock> {
        if data.len() < SUPERBLOCK_SIZE {
            return Err(Error::CorruptedMetadata(format!(
                "superblock record too short: {} bytes",
                data.len()
            )));
        }
        if data[0..4] != SUPERBLOCK_SIGNATURE {
            return Err(Error::UnsupportedFormat("bad superblock signature".into()));
        }

        let block_size = read_u32(&data[4..8])?;
        let number_of_blocks = read_u64(&data[8..16])?;
        let file_system_identifier = read_guid(&data[32..48])?;
        let root_directory_inode_number = read_u64(&data[56..64])?;
        let allocation_group_size = read_u32(&data[84..88])?;
        let number_of_allocation_groups = read_u32(&data[88..92])?;
        let version_and_feature_flags = read_u16(&data[100..102])?;
        let sector_size = read_u16(&data[102..104])?;
        let inode_size = read_u16(&data[104..106])?;
        let inodes_per_block = read_u16(&data[106..108])?;
        let volume_label: [u8; 12] = data[108..120].try_into().unwrap();
        let block_size_log2 = data[120];
        let sector_size_log2 = data[121];
        let inode_size_log2 = data[122];
        let inodes_per_block_log2 = data[123];
        let allocation_group_size_log2 = data[124];
        let number_of_inodes = read_u64(&data[128..136])?;
        let number_of_free_inodes = read_u64(&data[136..144])?;
        let number_of_free_data_blocks = read_u64(&data[144..152])?;
        let directory_block_size_log2 = data[192];
        let secondary_feature_flags = read_u32(&data[200..204])?;

        let _ = (block_size_log2, sector_size_log2, inode_size_log2);

        let format_version = (version_and_feature_flags & 0x000f) as u8;
        let feature_flags = version_and_feature_flags & 0xfff0;

        if format_version != 4 && format_version != 5 {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported format version: {format_version}"
            )));
        }
        if feature_flags & !SUPPORTED_FEATURE_FLAGS != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported feature flags: {feature_flags:#06x}"
            )));
        }
        if secondary_feature_flags & !SUPPORTED_SECONDARY_FEATURE_FLAGS != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported secondary feature flags: {secondary_feature_flags:#010x}"
            )));
        }
        if !(512..=65536).contains(&block_size) {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported block size: {block_size}"
            )));
        }
        if !matches!(sector_size, 512 | 1024 | 2048 | 4096 | 8192 | 16384) {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported sector size: {sector_size}"
            )));
        }
        if !(256..=2048).contains(&inode_size) {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported inode size: {inode_size}"
            )));
        }

        let directory_block_size = if directory_block_size_log2 == 0 {
            block_size
        } else {
            if directory_block_size_log2 >= 32 {
                return Err(Error::CorruptedMetadata(
                    "directory block size log2 out of bounds".into(),
                ));
            }
            let multiplier = 1u32
                .checked_shl(directory_block_size_log2 as u32)
                .ok_or_else(|| {
                    Error::CorruptedMetadata("directory block size log2 overflow".into())
                })?;
            if multiplier as u64 > (u32::MAX as u64) / (block_size as u64) {
                return Err(Error::CorruptedMetadata(
                    "directory block size overflows u32".into(),
                ));
            }
            multiplier * block_size
        };

        if !(5..=i32::MAX as u32).contains(&allocation_group_size) {
            return Err(Error::CorruptedMetadata(
                "allocation group size out of bounds".into(),
            ));
        }
        if allocation_group_size_log2 == 0 || allocation_group_size_log2 > 31 {
            return Err(Error::CorruptedMetadata(
                "allocation group size log2 out of bounds".into(),
            ));
        }
        let relative_block_bits = allocation_group_size_log2;

        if inodes_per_block_log2 == 0
            || inodes_per_block_log2 > (32 - relative_block_bits)
        {
            return Err(Error::CorruptedMetadata(
                "inodes per block log2 out of bounds".into(),
            ));
        }
        let relative_inode_bits = relative_block_bits + inodes_per_block_log2;
        if relative_inode_bits == 0 || relative_inode_bits >= 32 {
            return Err(Error::CorruptedMetadata(
                "relative inode number bits out of bounds".into(),
            ));
        }
        if 1u64
            .checked_shl(inodes_per_block_log2 as u32)
            .map(|v| v as u16)
            != Some(inodes_per_block)
        {
            return Err(Error::CorruptedMetadata(
                "inodes per block does not match its log2 field".into(),
            ));
        }

        Ok(Superblock {
            format_version,
            feature_flags,
            secondary_feature_flags,
            block_size,
            sector_size,
            inode_size,
            inodes_per_block,
            directory_block_size,
            allocation_group_size,
            number_of_allocation_groups,
            number_of_inodes,
            number_of_free_inodes,
            number_of_blocks,
            number_of_free_data_blocks,
            root_directory_inode_number,
            file_system_identifier,
            volume_label,
            relative_block_bits,
            relative_inode_bits,
        })
    }

    /// Trimmed UTF-8 volume label; trailing NUL bytes are dropped.
    pub fn label(&self) -> String {
        let trimmed = self
            .volume_label
            .split(|&b| b == 0)
            .next()
            .unwrap_or(&[]);
        String::from_utf8_lossy(trimmed).into_owned()
    }

    /// Splits an absolute inode number into `(ag_index, relative_inode)`.
    pub fn split_inode_number(&self, inode_number: u64) -> (u32, u32) {
        let ag_index = (inode_number >> self.relative_inode_bits) as u32;
        let mask = (1u64 << self.relative_inode_bits) - 1;
        let relative_inode = (inode_number & mask) as u32;
        (ag_index, relative_inode)
    }

    /// Splits an absolute block number into `(ag_index, relative_block)`.
    pub fn split_block_number(&self, block_number: u64) -> (u32, u32) {
        let ag_index = (block_number >> self.relative_block_bits) as u32;
        let mask = (1u64 << self.relative_block_bits) - 1;
        let relative_block = (block_number & mask) as u32;
        (ag_index, relative_block)
    }

    /// Byte offset of an AG's superblock mirror.
    pub fn ag_superblock_offset(&self, ag_index: u32) -> u64 {
        ag_index as u64 * self.allocation_group_size as u64 * self.block_size as u64
    }

    /// Device byte offset of an absolute block number.
    pub fn block_device_offset(&self, block_number: u64) -> u64 {
        block_number * self.block_size as u64
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Builds a minimal valid v4 superblock: 512-byte block, 512-byte
    /// sector, 256-byte inode, 16-block (2^4) allocation groups, one AG.
    pub fn minimal_v4_superblock(
        number_of_allocation_groups: u32,
        allocation_group_size_blocks: u32,
        root_directory_inode_number: u64,
        label: &[u8],
    ) -> Vec<u8> {
        let mut sb = vec![0u8; 512];
        sb[0..4].copy_from_slice(b"XFSB");
        sb[4..8].copy_from_slice(&512u32.to_be_bytes()); // block_size
        let number_of_blocks = allocation_group_size_blocks as u64 * number_of_allocation_groups as u64;
        sb[8..16].copy_from_slice(&number_of_blocks.to_be_bytes());
        sb[56..64].copy_from_slice(&root_directory_inode_number.to_be_bytes());
        sb[84..88].copy_from_slice(&allocation_group_size_blocks.to_be_bytes());
        sb[88..92].copy_from_slice(&number_of_allocation_groups.to_be_bytes());
        sb[100..102].copy_from_slice(&4u16.to_be_bytes()); // format_version=4, no feature flags
        sb[102..104].copy_from_slice(&512u16.to_be_bytes()); // sector_size
        sb[104..106].copy_from_slice(&256u16.to_be_bytes()); // inode_size
        sb[106..108].copy_from_slice(&2u16.to_be_bytes()); // inodes_per_block
        let n = label.len().min(12);
        sb[108..108 + n].copy_from_slice(&label[..n]);
        sb[120] = 9; // block_size_log2 (unused by decode but plausible)
        sb[121] = 9; // sector_size_log2
        sb[122] = 8; // inode_size_log2
        sb[123] = 1; // inodes_per_block_log2
        sb[124] = allocation_group_size_blocks.trailing_zeros() as u8; // ag_size_log2
        sb
    }
}
