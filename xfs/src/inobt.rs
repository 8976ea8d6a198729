use xfs_decode::{read_u32, read_u64};

use crate::btree::{check_depth, BtreeHeader, PointerWidth};
use crate::error::{Error, Result};
use crate::io::IoHandle;
use crate::superblock::Superblock;
use crate::trace::{self, Event, Trace};

const SIGNATURE_V4: [u8; 4] = *b"IABT";
const SIGNATURE_V5: [u8; 4] = *b"IAB3";

const LEAF_RECORD_SIZE: usize = 16;
const BRANCH_ENTRY_SIZE: usize = 4;

/// Result of a successful inode B+ tree lookup: the device byte offset at
/// which the `inode_size`-byte inode image begins.
#[derive(Debug, Clone, Copy)]
pub struct InodeLocation {
    pub device_offset: u64,
}

fn ag_block_offset(sb: &Superblock, ag_index: u32, relative_block: u64) -> u64 {
    (ag_index as u64 * sb.allocation_group_size as u64 + relative_block) * sb.block_size as u64
}

/// Descends the inode B+ tree of one AG, locating the on-disk inode image
/// for `relative_inode`. Returns `Ok(None)` if no leaf record covers it.
pub fn find_inode(
    io: &dyn IoHandle,
    sb: &Superblock,
    ag_index: u32,
    root_block: u32,
    relative_inode: u32,
    mut trace: Option<Trace>,
) -> Result<Option<InodeLocation>> {
    descend(
        io,
        sb,
        ag_index,
        root_block as u64,
        relative_inode,
        0,
        &mut trace,
    )
}

fn descend(
    io: &dyn IoHandle,
    sb: &Superblock,
    ag_index: u32,
    relative_block: u64,
    relative_inode: u32,
    depth: u32,
    trace: &mut Option<Trace>,
) -> Result<Option<InodeLocation>> {
    check_depth(depth)?;

    let offset = ag_block_offset(sb, ag_index, relative_block);
    let block = crate::io::read_exact(io, offset, sb.block_size as usize)?;

    let header = BtreeHeader::decode(&block, sb.format_version, PointerWidth::Narrow)?;
    if header.signature != SIGNATURE_V4 && header.signature != SIGNATURE_V5 {
        return Err(Error::UnsupportedFormat(
            "bad inode B+ tree block signature".into(),
        ));
    }

    trace::emit(
        trace.as_deref_mut(),
        Event::BtreeDescent {
            signature: "IABT/IAB3",
            level: header.level,
            block: relative_block,
        },
    );

    let records = header.records_region(&block)?;

    if header.level == 0 {
        find_in_leaf(records, header.number_of_records, relative_inode, sb, ag_index)
    } else {
        let child = find_branch_child(records, header.number_of_records, relative_inode)?;
        match child {
            Some(next_block) => descend(
                io,
                sb,
                ag_index,
                next_block as u64,
                relative_inode,
                depth + 1,
                trace,
            ),
            None => Ok(None),
        }
    }
}

fn find_in_leaf(
    records: &[u8],
    number_of_records: u16,
    relative_inode: u32,
    sb: &Superblock,
    ag_index: u32,
) -> Result<Option<InodeLocation>> {
    let count = number_of_records as usize;
    if records.len() < count * LEAF_RECORD_SIZE {
        return Err(Error::CorruptedMetadata(
            "inode B+ tree leaf shorter than declared record count".into(),
        ));
    }
    for i in 0..count {
        let rec = &records[i * LEAF_RECORD_SIZE..(i + 1) * LEAF_RECORD_SIZE];
        let first_inode_number = read_u32(&rec[0..4])?;
        let _free_count = read_u32(&rec[4..8])?;
        let _allocation_bitmap = read_u64(&rec[8..16])?;

        if relative_inode >= first_inode_number && relative_inode < first_inode_number + 64 {
            let ag_base = ag_index as u64 * sb.allocation_group_size as u64 * sb.block_size as u64;
            let device_offset = ag_base
                + first_inode_number as u64 * sb.inode_size as u64
                + (relative_inode - first_inode_number) as u64 * sb.inode_size as u64;
            return Ok(Some(InodeLocation { device_offset }));
        }
    }
    Ok(None)
}

fn find_branch_child(
    records: &[u8],
    number_of_records: u16,
    relative_inode: u32,
) -> Result<Option<u32>> {
    let count = number_of_records as usize;
    let keys_size = count * BRANCH_ENTRY_SIZE;
    let pointers_size = count * BRANCH_ENTRY_SIZE;
    if records.len() < keys_size + pointers_size {
        return Err(Error::CorruptedMetadata(
            "inode B+ tree branch shorter than declared record count".into(),
        ));
    }
    let keys = &records[..keys_size];
    let pointers = &records[keys_size..keys_size + pointers_size];

    let mut chosen: Option<u32> = None;
    for i in 0..count {
        let key = read_u32(&keys[i * 4..i * 4 + 4])?;
        if key <= relative_inode {
            chosen = Some(read_u32(&pointers[i * 4..i * 4 + 4])?);
        } else {
            break;
        }
    }
    Ok(chosen)
}
