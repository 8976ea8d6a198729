use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::inode::Fork;
use crate::io::IoHandle;
use crate::superblock::Superblock;

#[cfg(test)]
use crate::superblock::test_support::minimal_v4_superblock;

/// One resolved run of a data (or attribute) stream: either a contiguous
/// on-device byte range, or a sparse hole of `length` zero bytes.
#[derive(Debug, Clone, Copy)]
pub enum Run {
    Device { offset: u64, length: u64 },
    Sparse { length: u64 },
}

/// Maps a logical byte offset within a fork to the device run that covers
/// it, by linear scan of the sorted extent sequence (the source does linear
/// too; a sorted sequence would equally support binary search).
pub fn resolve(
    fork: &Fork,
    sb: &Superblock,
    logical_offset: u64,
    size: u64,
    max_len: u64,
) -> Result<Run> {
    if logical_offset >= size {
        return Err(Error::CorruptedMetadata(
            "data stream offset past end of file".into(),
        ));
    }

    match fork {
        Fork::Inline(_) => Err(Error::Io(
            "inline forks are read directly, not through resolve()".into(),
        )),
        Fork::Device { .. } => Err(Error::UnsupportedFormat(
            "device nodes have no data stream".into(),
        )),
        Fork::Extents(extents) | Fork::Btree(extents) => {
            resolve_in_extents(extents, sb, logical_offset, size, max_len)
        }
    }
}

fn resolve_in_extents(
    extents: &[Extent],
    sb: &Superblock,
    logical_offset: u64,
    size: u64,
    max_len: u64,
) -> Result<Run> {
    let block_size = sb.block_size as u64;
    let logical_block = logical_offset / block_size;
    let in_block_offset = logical_offset % block_size;

    for e in extents {
        if logical_block >= e.logical_block && logical_block < e.logical_block + e.block_count {
            let extent_remaining_blocks = e.logical_block + e.block_count - logical_block;
            let extent_remaining_bytes = extent_remaining_blocks * block_size - in_block_offset;
            let file_remaining = size - logical_offset;
            let run_length = extent_remaining_bytes.min(file_remaining).min(max_len);

            if e.sparse {
                return Ok(Run::Sparse { length: run_length });
            }

            let (ag_index, relative_block) = sb.split_block_number(e.physical_block);
            if relative_block as u64 >= sb.allocation_group_size as u64 {
                return Err(Error::InconsistentExtents(
                    "extent physical block outside its allocation group".into(),
                ));
            }
            let device_block =
                ag_index as u64 * sb.allocation_group_size as u64 + relative_block as u64;
            let device_offset = device_block * block_size
                + (logical_block - e.logical_block) * block_size
                + in_block_offset;

            return Ok(Run::Device {
                offset: device_offset,
                length: run_length,
            });
        }
    }

    Err(Error::CorruptedMetadata(
        "no extent covers the requested offset".into(),
    ))
}

/// Reads `buffer.len()` bytes starting at `offset` from a fork, streaming
/// across as many extents (or the inline buffer) as necessary. Sparse runs
/// are zero-filled without touching the device.
pub fn read_at(
    io: &dyn IoHandle,
    fork: &Fork,
    sb: &Superblock,
    size: u64,
    offset: u64,
    buffer: &mut [u8],
) -> Result<()> {
    if let Fork::Inline(bytes) = fork {
        let start = offset as usize;
        let end = start
            .checked_add(buffer.len())
            .ok_or_else(|| Error::CorruptedMetadata("inline read overflow".into()))?;
        let src = bytes
            .get(start..end)
            .ok_or_else(|| Error::CorruptedMetadata("inline read past buffer end".into()))?;
        buffer.copy_from_slice(src);
        return Ok(());
    }

    let mut done = 0usize;
    while done < buffer.len() {
        let want = (buffer.len() - done) as u64;
        let run = resolve(fork, sb, offset + done as u64, size, want)?;
        match run {
            Run::Sparse { length } => {
                let n = length.min(want) as usize;
                buffer[done..done + n].fill(0);
                done += n;
            }
            Run::Device {
                offset: dev_offset,
                length,
            } => {
                let n = length.min(want) as usize;
                io.read_at(dev_offset, &mut buffer[done..done + n])?;
                done += n;
            }
        }
    }
    Ok(())
}

/// Per-extent `(device_offset, length, sparse)` enumeration for the public
/// façade's extent listing accessor.
pub fn enumerate_extents(extents: &[Extent], sb: &Superblock) -> Vec<(u64, u64, bool)> {
    extents
        .iter()
        .map(|e| {
            if e.sparse {
                (0, e.block_count * sb.block_size as u64, true)
            } else {
                let (ag_index, relative_block) = sb.split_block_number(e.physical_block);
                let device_block =
                    ag_index as u64 * sb.allocation_group_size as u64 + relative_block as u64;
                (
                    device_block * sb.block_size as u64,
                    e.block_count * sb.block_size as u64,
                    false,
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceIoHandle;

    fn sb() -> Superblock {
        let bytes = minimal_v4_superblock(1, 16, 2, b"x");
        Superblock::decode(&bytes).unwrap()
    }

    #[test]
    fn resolves_offset_into_a_single_device_extent() {
        let sb = sb();
        let extents = vec![Extent {
            logical_block: 0,
            physical_block: 2,
            block_count: 1,
            sparse: false,
        }];
        let run = resolve_in_extents(&extents, &sb, 10, 512, 1024).unwrap();
        match run {
            Run::Device { offset, length } => {
                assert_eq!(offset, 2 * 512 + 10);
                assert_eq!(length, 512 - 10);
            }
            Run::Sparse { .. } => panic!("expected a device run"),
        }
    }

    #[test]
    fn resolves_a_sparse_extent_without_touching_physical_block() {
        let sb = sb();
        let extents = vec![Extent {
            logical_block: 0,
            physical_block: 0,
            block_count: 2,
            sparse: true,
        }];
        let run = resolve_in_extents(&extents, &sb, 0, 1024, 4096).unwrap();
        match run {
            Run::Sparse { length } => assert_eq!(length, 1024),
            Run::Device { .. } => panic!("expected a sparse run"),
        }
    }

    #[test]
    fn resolve_rejects_offset_past_end_of_file() {
        let sb = sb();
        let fork = Fork::Extents(vec![Extent {
            logical_block: 0,
            physical_block: 2,
            block_count: 1,
            sparse: false,
        }]);
        assert!(resolve(&fork, &sb, 512, 512, 64).is_err());
    }

    #[test]
    fn read_at_streams_across_a_device_extent_and_a_sparse_hole() {
        let sb = sb();
        let mut image = vec![0u8; 4096];
        // Physical block 2 (device offset 1024) holds the first 512 bytes.
        image[1024..1024 + 512].copy_from_slice(&[0xab; 512]);
        let io = SliceIoHandle::new(&image);

        let fork = Fork::Extents(vec![
            Extent {
                logical_block: 0,
                physical_block: 2,
                block_count: 1,
                sparse: false,
            },
            Extent {
                logical_block: 1,
                physical_block: 0,
                block_count: 1,
                sparse: true,
            },
        ]);

        let mut buffer = vec![0u8; 1024];
        read_at(&io, &fork, &sb, 1024, 0, &mut buffer).unwrap();
        assert_eq!(&buffer[0..512], &[0xab; 512][..]);
        assert_eq!(&buffer[512..1024], &[0u8; 512][..]);
    }

    #[test]
    fn enumerate_extents_reports_device_offsets_and_sparse_flags() {
        let sb = sb();
        let extents = vec![
            Extent {
                logical_block: 0,
                physical_block: 3,
                block_count: 2,
                sparse: false,
            },
            Extent {
                logical_block: 2,
                physical_block: 0,
                block_count: 1,
                sparse: true,
            },
        ];
        let runs = enumerate_extents(&extents, &sb);
        assert_eq!(runs, vec![(3 * 512, 2 * 512, false), (0, 512, true)]);
    }
}
