use xfs_decode::{read_u32, read_u64};

use crate::error::{Error, Result};
use crate::inode::Fork;
use crate::io::IoHandle;
use crate::superblock::Superblock;

/// One directory entry. `.` and `..` are synthesized by the decoder, never
/// stored on disk in short form and represented specially in block form.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub inode_number: u64,
    pub name: Vec<u8>,
    pub file_type: Option<u8>,
}

const DATA_BLOCK_MAGIC_V4: u32 = 0x58443244; // "XD2D"
const DATA_BLOCK_MAGIC_V5: u32 = 0x58444433; // "XDD3"
// xfs_dir2_data_hdr: magic(4) + bestfree[3]{offset:2,length:2}(12) = 16 bytes.
const DATA_BLOCK_HEADER_SIZE_V4: usize = 4 + 12;
// xfs_dir3_data_hdr: xfs_dir3_blk_hdr(48) + bestfree[3](12) + pad(4) = 64 bytes.
const DATA_BLOCK_HEADER_SIZE_V5: usize = 48 + 12 + 4;
const UNUSED_ENTRY_FREETAG: u16 = 0xffff;

/// Decodes a short-form directory: the data fork is inline and begins with
/// a 2-byte entry-count pair, a parent inode number, and a flat run of
/// variable-width entries.
pub fn decode_short_form(
    data: &[u8],
    own_inode_number: u64,
    file_type_flag_enabled: bool,
) -> Result<Vec<DirEntry>> {
    if data.len() < 2 {
        return Err(Error::CorruptedMetadata(
            "short-form directory shorter than its count header".into(),
        ));
    }
    let count32 = data[0];
    let count64 = data[1];

    if (count32 != 0) == (count64 != 0) && count32 != 0 {
        return Err(Error::CorruptedMetadata(
            "short-form directory has both 32-bit and 64-bit counts set".into(),
        ));
    }

    let (count, inode_width) = if count64 != 0 {
        (count64 as usize, 8usize)
    } else {
        (count32 as usize, 4usize)
    };

    if data.len() < 2 + inode_width {
        return Err(Error::CorruptedMetadata(
            "short-form directory shorter than its parent pointer".into(),
        ));
    }
    let parent_inode_number = if inode_width == 8 {
        read_u64(&data[2..10])?
    } else {
        read_u32(&data[2..6])? as u64
    };

    let mut entries = Vec::with_capacity(count + 2);
    entries.push(DirEntry {
        inode_number: own_inode_number,
        name: b".".to_vec(),
        file_type: None,
    });
    entries.push(DirEntry {
        inode_number: parent_inode_number,
        name: b"..".to_vec(),
        file_type: None,
    });

    let mut offset = 2 + inode_width;
    for _ in 0..count {
        if offset + 1 > data.len() {
            return Err(Error::CorruptedMetadata(
                "short-form directory entry truncated".into(),
            ));
        }
        let name_length = data[offset] as usize;
        offset += 1;
        offset += 2; // hash offset, unused for lookup

        if offset + name_length > data.len() {
            return Err(Error::CorruptedMetadata(
                "short-form directory entry name truncated".into(),
            ));
        }
        let name = data[offset..offset + name_length].to_vec();
        offset += name_length;

        let file_type = if file_type_flag_enabled {
            if offset >= data.len() {
                return Err(Error::CorruptedMetadata(
                    "short-form directory entry missing file-type byte".into(),
                ));
            }
            let ft = data[offset];
            offset += 1;
            Some(ft)
        } else {
            None
        };

        if offset + inode_width > data.len() {
            return Err(Error::CorruptedMetadata(
                "short-form directory entry missing inode number".into(),
            ));
        }
        let inode_number = if inode_width == 8 {
            read_u64(&data[offset..offset + 8])?
        } else {
            read_u32(&data[offset..offset + 4])? as u64
        };
        offset += inode_width;

        entries.push(DirEntry {
            inode_number,
            name,
            file_type,
        });
    }

    Ok(entries)
}

/// Decodes a block-form directory: the data fork is an extent sequence of
/// `directory_block_size`-byte blocks, each holding a magic-stamped header
/// followed by a run of active entries interleaved with unused-space
/// markers and a trailing leaf/tag region. Multi-block leaf/node directory
/// indices beyond the data blocks themselves are not walked; entries are
/// recovered by scanning every data block's active-entry run directly.
/// Unlike short form, `.` and `..` are not synthesized here: block-form
/// directories store them as ordinary entries in the first data block.
pub fn decode_block_form(
    io: &dyn IoHandle,
    sb: &Superblock,
    fork: &Fork,
    file_type_flag_enabled: bool,
) -> Result<Vec<DirEntry>> {
    let extents = fork
        .as_extents()
        .ok_or_else(|| Error::UnsupportedFormat("block-form directory fork is not extent-backed".into()))?;

    let mut entries = Vec::new();
    let dir_block_size = sb.directory_block_size as u64;
    let blocks_per_dir_block = (dir_block_size / sb.block_size as u64).max(1);

    for e in extents {
        if e.sparse {
            continue;
        }
        let mut remaining_blocks = e.block_count;
        let mut cursor = e.physical_block;
        while remaining_blocks >= blocks_per_dir_block {
            let (ag_index, relative_block) = sb.split_block_number(cursor);
            let device_block =
                ag_index as u64 * sb.allocation_group_size as u64 + relative_block as u64;
            let offset = device_block * sb.block_size as u64;
            let block = crate::io::read_exact(io, offset, dir_block_size as usize)?;
            decode_data_block(&block, sb.format_version, file_type_flag_enabled, &mut entries)?;

            cursor += blocks_per_dir_block;
            remaining_blocks -= blocks_per_dir_block;
        }
    }

    Ok(entries)
}

fn decode_data_block(
    block: &[u8],
    format_version: u8,
    file_type_flag_enabled: bool,
    out: &mut Vec<DirEntry>,
) -> Result<()> {
    if block.len() < 4 {
        return Err(Error::CorruptedMetadata(
            "directory data block shorter than its magic".into(),
        ));
    }
    let magic = read_u32(&block[0..4])?;

    let header_size = if format_version >= 5 {
        if magic != DATA_BLOCK_MAGIC_V5 {
            return Err(Error::UnsupportedFormat(
                "bad v5 directory data block magic".into(),
            ));
        }
        DATA_BLOCK_HEADER_SIZE_V5
    } else {
        if magic != DATA_BLOCK_MAGIC_V4 {
            return Err(Error::UnsupportedFormat(
                "bad v4 directory data block magic".into(),
            ));
        }
        DATA_BLOCK_HEADER_SIZE_V4
    };

    if block.len() < header_size {
        return Err(Error::CorruptedMetadata(
            "directory data block shorter than its header".into(),
        ));
    }

    let mut offset = header_size;
    while offset + 8 + 2 <= block.len() {
        let candidate_inode = read_u64(&block[offset..offset + 8])?;
        let freetag = u16::from_be_bytes([block[offset + 8], block[offset + 9]]);

        if freetag == UNUSED_ENTRY_FREETAG {
            if offset + 8 + 2 + 2 > block.len() {
                break;
            }
            let length = u16::from_be_bytes([block[offset + 10], block[offset + 11]]) as usize;
            if length == 0 || offset + length > block.len() {
                break;
            }
            offset += length;
            continue;
        }

        let name_length = block[offset + 8] as usize;
        let mut entry_offset = offset + 9;
        if entry_offset + name_length > block.len() {
            break;
        }
        let name = block[entry_offset..entry_offset + name_length].to_vec();
        entry_offset += name_length;

        let file_type = if file_type_flag_enabled {
            if entry_offset >= block.len() {
                break;
            }
            let ft = block[entry_offset];
            entry_offset += 1;
            Some(ft)
        } else {
            None
        };

        // Entries are padded to an 8-byte boundary and end with a 2-byte tag.
        let unpadded_end = entry_offset + 2;
        let padded_end = unpadded_end.div_ceil(8) * 8;
        if padded_end > block.len() {
            break;
        }

        out.push(DirEntry {
            inode_number: candidate_inode,
            name,
            file_type,
        });

        offset = padded_end;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_synthesizes_dot_entries_first() {
        // count32=2, count64=0, parent=0x80, then "foo"->0x80, "bar"->0x81.
        let mut data = vec![2u8, 0u8];
        data.extend_from_slice(&0x80u32.to_be_bytes());
        for (name, inode) in [("foo", 0x80u32), ("bar", 0x81u32)] {
            data.push(name.len() as u8);
            data.extend_from_slice(&[0u8, 0u8]); // hash offset, unused
            data.extend_from_slice(name.as_bytes());
            data.extend_from_slice(&inode.to_be_bytes());
        }

        let entries = decode_short_form(&data, 0x7f, false).unwrap();
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name.as_slice()).collect();
        assert_eq!(names, vec![b".".as_slice(), b"..", b"foo", b"bar"]);
        assert_eq!(entries[0].inode_number, 0x7f);
        assert_eq!(entries[1].inode_number, 0x80);
        assert_eq!(entries[3].inode_number, 0x81);
    }

    #[test]
    fn short_form_rejects_both_counts_set() {
        let mut data = vec![1u8, 1u8];
        data.extend_from_slice(&[0u8; 8]);
        assert!(decode_short_form(&data, 0, false).is_err());
    }

    #[test]
    fn short_form_reads_64_bit_inode_width_when_count64_is_used() {
        let mut data = vec![0u8, 1u8];
        data.extend_from_slice(&0x80u64.to_be_bytes());
        data.push(3);
        data.extend_from_slice(&[0u8, 0u8]);
        data.extend_from_slice(b"foo");
        data.extend_from_slice(&0x99u64.to_be_bytes());

        let entries = decode_short_form(&data, 1, false).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].inode_number, 0x99);
    }

    #[test]
    fn block_form_decodes_dot_entries_stored_as_regular_records() {
        let mut block = vec![0u8; 512];
        block[0..4].copy_from_slice(b"XD2D");
        let mut offset = DATA_BLOCK_HEADER_SIZE_V4;
        for (inode, name) in [(7u64, "."), (1u64, ".."), (8u64, "foo")] {
            block[offset..offset + 8].copy_from_slice(&inode.to_be_bytes());
            block[offset + 8] = name.len() as u8;
            let mut entry_end = offset + 9;
            block[entry_end..entry_end + name.len()].copy_from_slice(name.as_bytes());
            entry_end += name.len();
            let unpadded_end = entry_end + 2;
            let padded_end = unpadded_end.div_ceil(8) * 8;
            offset = padded_end;
        }

        let mut out = Vec::new();
        decode_data_block(&block, 4, false, &mut out).unwrap();
        let names: Vec<&[u8]> = out.iter().map(|e| e.name.as_slice()).collect();
        assert_eq!(names, vec![b".".as_slice(), b"..", b"foo"]);
        assert_eq!(out[2].inode_number, 8);
    }
}
