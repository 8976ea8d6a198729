//! End-to-end mount of a hand-built single-AG image: superblock, AGI, a
//! one-record inode B+ tree leaf, and two inline-fork inodes (a directory
//! and a regular file).

use xfs::cancel::CancelToken;
use xfs::io::SliceIoHandle;
use xfs::Volume;

const BLOCK_SIZE: usize = 512;
const ROOT_INODE: u64 = 10;
const FOO_INODE: u64 = 12;
const LINK_INODE: u64 = 14;

fn put_timestamp(buf: &mut [u8]) {
    buf[0..4].copy_from_slice(&0i32.to_be_bytes());
    buf[4..8].copy_from_slice(&0u32.to_be_bytes());
}

fn build_v2_inode(file_mode: u16, number_of_links: u32, size: u64, inline: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 256];
    data[0..2].copy_from_slice(b"IN");
    data[2..4].copy_from_slice(&file_mode.to_be_bytes());
    data[4] = 2; // format_version
    data[5] = 1; // FORK_TYPE_INLINE
    data[8..12].copy_from_slice(&0u32.to_be_bytes()); // owner_id
    data[12..16].copy_from_slice(&0u32.to_be_bytes()); // group_id
    data[16..20].copy_from_slice(&number_of_links.to_be_bytes());
    put_timestamp(&mut data[32..40]); // access
    put_timestamp(&mut data[40..48]); // modification
    put_timestamp(&mut data[48..56]); // change
    data[56..64].copy_from_slice(&size.to_be_bytes());
    // number_of_blocks, number_of_data_extents, number_of_attribute_extents,
    // attr_fork_offset and attr_fork_type are all left zero: no attr fork.
    assert!(inline.len() <= 256 - 100);
    data[100..100 + inline.len()].copy_from_slice(inline);
    data
}

fn short_form_dir(parent_inode: u32, entries: &[(&str, u32)]) -> Vec<u8> {
    let mut data = vec![entries.len() as u8, 0u8];
    data.extend_from_slice(&parent_inode.to_be_bytes());
    for (name, inode) in entries {
        data.push(name.len() as u8);
        data.extend_from_slice(&[0u8, 0u8]); // hash offset, unused
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&inode.to_be_bytes());
    }
    data
}

fn build_image() -> Vec<u8> {
    let mut image = vec![0u8; 16 * BLOCK_SIZE];

    // Primary superblock: 1 AG of 16 blocks, 512-byte blocks/sectors,
    // 256-byte inodes (2 per block), root directory inode 10.
    let mut sb = vec![0u8; 512];
    sb[0..4].copy_from_slice(b"XFSB");
    sb[4..8].copy_from_slice(&(BLOCK_SIZE as u32).to_be_bytes());
    sb[8..16].copy_from_slice(&16u64.to_be_bytes());
    sb[56..64].copy_from_slice(&ROOT_INODE.to_be_bytes());
    sb[84..88].copy_from_slice(&16u32.to_be_bytes()); // allocation_group_size
    sb[88..92].copy_from_slice(&1u32.to_be_bytes()); // number_of_allocation_groups
    sb[100..102].copy_from_slice(&4u16.to_be_bytes()); // format_version=4
    sb[102..104].copy_from_slice(&512u16.to_be_bytes()); // sector_size
    sb[104..106].copy_from_slice(&256u16.to_be_bytes()); // inode_size
    sb[106..108].copy_from_slice(&2u16.to_be_bytes()); // inodes_per_block
    sb[108..116].copy_from_slice(b"testvol\0");
    sb[123] = 1; // inodes_per_block_log2
    sb[124] = 4; // allocation_group_size_log2
    image[0..512].copy_from_slice(&sb);

    // AGI at block 2 (offset 1024 = sb_offset + 2*sector_size).
    let mut agi = vec![0u8; 296];
    agi[0..4].copy_from_slice(b"XAGI");
    agi[4..8].copy_from_slice(&1u32.to_be_bytes()); // format_version
    agi[20..24].copy_from_slice(&4u32.to_be_bytes()); // inode_btree_root_block
    agi[24..28].copy_from_slice(&1u32.to_be_bytes()); // inode_btree_depth
    image[1024..1024 + agi.len()].copy_from_slice(&agi);

    // Inode B+ tree leaf at block 4 (offset 2048): one record covering
    // relative inodes 0..64.
    let mut iabt = vec![0u8; 32];
    iabt[0..4].copy_from_slice(b"IABT");
    iabt[4..6].copy_from_slice(&0u16.to_be_bytes()); // level
    iabt[6..8].copy_from_slice(&1u16.to_be_bytes()); // number_of_records
    iabt[16..20].copy_from_slice(&0u32.to_be_bytes()); // first_inode_number
    image[2048..2048 + iabt.len()].copy_from_slice(&iabt);

    // Root directory inode at block 5 (relative inode 10, offset 10*256=2560).
    let dir_data = short_form_dir(
        ROOT_INODE as u32,
        &[("foo", FOO_INODE as u32), ("link", LINK_INODE as u32)],
    );
    let root_inode = build_v2_inode(0x4000 | 0o755, 2, dir_data.len() as u64, &dir_data);
    image[2560..2560 + 256].copy_from_slice(&root_inode);

    // "foo" regular file inode at block 6 (relative inode 12, offset 3072).
    let foo_inode = build_v2_inode(0x8000 | 0o644, 1, 11, b"hello world");
    image[3072..3072 + 256].copy_from_slice(&foo_inode);

    // "link" symlink inode at relative inode 14, offset 14*256=3584.
    let link_inode = build_v2_inode(0xa000 | 0o777, 1, 6, b"target");
    image[3584..3584 + 256].copy_from_slice(&link_inode);

    image
}

#[test]
fn mounts_and_resolves_the_root_directory() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let volume = Volume::open(&io).unwrap();

    assert_eq!(volume.label(), "testvol");
    assert_eq!(volume.format_version(), 4);

    let root = volume.root().unwrap();
    assert!(root.is_directory());
    assert_eq!(root.inode_number(), ROOT_INODE);

    let children = root.children().unwrap();
    let names: Vec<&[u8]> = children.iter().map(|c| c.name.as_slice()).collect();
    assert_eq!(names, vec![b".".as_slice(), b"..", b"foo", b"link"]);
}

#[test]
fn reads_an_inline_regular_file_by_path() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let volume = Volume::open(&io).unwrap();

    let foo = volume.file_entry_by_path("foo").unwrap().expect("foo exists");
    assert!(foo.is_regular_file());
    assert_eq!(foo.size(), 11);

    let mut buffer = vec![0u8; 11];
    let n = foo.read_at(0, &mut buffer).unwrap();
    assert_eq!(n, 11);
    assert_eq!(&buffer, b"hello world");
}

#[test]
fn leading_and_trailing_slashes_are_tolerated() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let volume = Volume::open(&io).unwrap();

    assert!(volume.file_entry_by_path("/foo").unwrap().is_some());
    assert!(volume.file_entry_by_path("/foo/").unwrap().is_some());
    assert!(volume.file_entry_by_path("").unwrap().is_some());
    assert!(volume.file_entry_by_path("/").unwrap().is_some());
}

#[test]
fn a_doubled_slash_between_segments_fails_the_lookup() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let volume = Volume::open(&io).unwrap();

    assert!(volume.file_entry_by_path("foo//").unwrap().is_none());
    // A second leading slash is itself an empty segment once the first is
    // trimmed, so it fails the lookup the same way a doubled interior slash
    // does.
    assert!(volume.file_entry_by_path("//foo").unwrap().is_none());
}

#[test]
fn missing_path_segment_resolves_to_none_not_an_error() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let volume = Volume::open(&io).unwrap();

    assert!(volume.file_entry_by_path("missing").unwrap().is_none());
}

#[test]
fn file_entry_by_inode_matches_path_lookup() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let volume = Volume::open(&io).unwrap();

    let by_inode = volume.file_entry_by_inode(FOO_INODE).unwrap();
    assert!(by_inode.is_regular_file());
    assert_eq!(by_inode.size(), 11);
}

#[test]
fn reads_a_symlink_target_via_the_inline_data_stream() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let volume = Volume::open(&io).unwrap();

    let link = volume
        .file_entry_by_path("link")
        .unwrap()
        .expect("link exists");
    assert!(link.is_symlink());
    assert_eq!(link.symlink_target().unwrap(), b"target");
}

#[test]
fn a_cancelled_token_aborts_the_mount_before_any_ag_is_walked() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = Volume::open_with(&io, cancel, None);
    assert!(matches!(result, Err(xfs::error::Error::Cancelled)));
}

#[test]
fn cancelling_a_cloned_token_aborts_a_later_children_enumeration() {
    let image = build_image();
    let io = SliceIoHandle::new(&image);
    let volume = Volume::open(&io).unwrap();

    let root = volume.root().unwrap();
    volume.cancel_token().cancel();
    assert!(matches!(root.children(), Err(xfs::error::Error::Cancelled)));
}
