//! End-to-end exercises against both mounted engines through the syscall
//! surface: file lifecycle, FAT long names and short-name collisions,
//! cluster reclamation, cross-engine copy, and directory-destination move.

mod common;

use std::sync::Arc;

use duofs::config::{BootFs, MountConfig};
use duofs::devsw::NullDeviceSwitch;
use duofs::fcntl::OpenFlags;
use duofs::fs::Vfs;
use duofs::proc::Process;
use duofs::stat::FsKind;
use duofs::syscall::file as sys;

fn mount_both() -> (Arc<Vfs>, Process) {
    let sfs_dev = common::format_sfs();
    let fat_dev = common::format_fat32();
    let config = MountConfig {
        boot_fs: BootFs::Sfs,
        ..MountConfig::default()
    };
    let vfs = Vfs::mount(&config, Some(sfs_dev), Some(fat_dev), Arc::new(NullDeviceSwitch));
    let cwd = vfs.get_root(FsKind::Sfs);
    let proc = Process::new(cwd);
    (vfs, proc)
}

#[test]
fn sfs_file_create_write_read_unlink() {
    let (vfs, mut proc) = mount_both();

    let fd = sys::open(&vfs, &mut proc, "/greeting.txt", OpenFlags::new(OpenFlags::O_CREATE | OpenFlags::O_RDWR)).unwrap();
    let written = sys::write(&vfs, &proc, fd, b"hello, sfs").unwrap();
    assert_eq!(written, 10);
    sys::close(&mut proc, fd).unwrap();

    let fd = sys::open(&vfs, &mut proc, "/greeting.txt", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let mut buf = [0u8; 32];
    let n = sys::read(&vfs, &proc, fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello, sfs");

    let st = sys::fstat(&proc, fd).unwrap();
    assert_eq!(st.nlink, 1);
    assert_eq!(st.size, 10);
    sys::close(&mut proc, fd).unwrap();

    sys::unlink(&vfs, &proc, "/greeting.txt").unwrap();
    let err = sys::open(&vfs, &mut proc, "/greeting.txt", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap_err();
    assert_eq!(err, duofs::error::FsError::NotFound);
}

#[test]
fn sfs_mkdir_and_nested_file() {
    let (vfs, mut proc) = mount_both();

    sys::mkdir(&vfs, &proc, "/sub").unwrap();
    sys::chdir(&vfs, &mut proc, "/sub").unwrap();
    sys::touch(&vfs, &proc, "inner.txt").unwrap();

    let cwd = sys::getcwd(&vfs, &proc).unwrap();
    assert!(cwd.starts_with("sfs:/sub"), "unexpected cwd: {cwd}");

    let fd = sys::open(&vfs, &mut proc, "/sub/inner.txt", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    sys::close(&mut proc, fd).unwrap();
}

#[test]
fn fat_long_name_round_trips() {
    let (vfs, mut proc) = mount_both();

    let long_name = "fat:/a reasonably long file name that exceeds 8.3.txt";
    let fd = sys::open(&vfs, &mut proc, long_name, OpenFlags::new(OpenFlags::O_CREATE | OpenFlags::O_RDWR)).unwrap();
    sys::write(&vfs, &proc, fd, b"long name payload").unwrap();
    sys::close(&mut proc, fd).unwrap();

    let fd = sys::open(&vfs, &mut proc, long_name, OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let mut buf = [0u8; 64];
    let n = sys::read(&vfs, &proc, fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"long name payload");
    sys::close(&mut proc, fd).unwrap();
}

#[test]
fn fat_short_name_collision_keeps_both_files_distinct() {
    let (vfs, mut proc) = mount_both();

    // Both synthesize the same six-character short-name base ("REPORT"),
    // forcing the second file to bump its numeric tail.
    let a = "fat:/report one.txt";
    let b = "fat:/report two.txt";

    let fd_a = sys::open(&vfs, &mut proc, a, OpenFlags::new(OpenFlags::O_CREATE | OpenFlags::O_RDWR)).unwrap();
    sys::write(&vfs, &proc, fd_a, b"first").unwrap();
    sys::close(&mut proc, fd_a).unwrap();

    let fd_b = sys::open(&vfs, &mut proc, b, OpenFlags::new(OpenFlags::O_CREATE | OpenFlags::O_RDWR)).unwrap();
    sys::write(&vfs, &proc, fd_b, b"second").unwrap();
    sys::close(&mut proc, fd_b).unwrap();

    let fd_a = sys::open(&vfs, &mut proc, a, OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let mut buf = [0u8; 16];
    let n = sys::read(&vfs, &proc, fd_a, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"first");
    sys::close(&mut proc, fd_a).unwrap();

    let fd_b = sys::open(&vfs, &mut proc, b, OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let mut buf = [0u8; 16];
    let n = sys::read(&vfs, &proc, fd_b, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"second");
    sys::close(&mut proc, fd_b).unwrap();
}

/// Forces the FAT allocator to wrap past a just-freed run of clusters:
/// a 3-cluster file is created then unlinked, then a second file is grown
/// past the forward-free supply so its last cluster can only come from the
/// chain `free_chain` just returned.
#[test]
fn fat_unlink_reclaims_clusters_for_reuse() {
    let (vfs, mut proc) = mount_both();
    let bpc = common::FAT_BYTES_PER_CLUSTER as usize;

    let fd = sys::open(&vfs, &mut proc, "fat:/big.bin", OpenFlags::new(OpenFlags::O_CREATE | OpenFlags::O_RDWR)).unwrap();
    let payload = vec![0xAAu8; 2 * bpc + 1]; // spans 3 clusters (root file cluster + 2 extensions)
    sys::write(&vfs, &proc, fd, &payload).unwrap();
    sys::close(&mut proc, fd).unwrap();
    sys::unlink(&vfs, &proc, "fat:/big.bin").unwrap();

    let fd = sys::open(&vfs, &mut proc, "fat:/bigger.bin", OpenFlags::new(OpenFlags::O_CREATE | OpenFlags::O_RDWR)).unwrap();
    let payload: Vec<u8> = (0..4 * bpc + 1).map(|i| (i % 251) as u8).collect();
    sys::write(&vfs, &proc, fd, &payload).unwrap();
    sys::close(&mut proc, fd).unwrap();

    let fd = sys::open(&vfs, &mut proc, "fat:/bigger.bin", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let mut buf = vec![0u8; payload.len()];
    let mut total = 0;
    while total < buf.len() {
        let n = sys::read(&vfs, &proc, fd, &mut buf[total..]).unwrap();
        assert!(n > 0, "read stalled before reaching the reused cluster");
        total += n;
    }
    assert_eq!(buf, payload);
}

#[test]
fn copy_crosses_engines() {
    let (vfs, mut proc) = mount_both();

    sys::touch(&vfs, &proc, "/source.txt").unwrap();
    let fd = sys::open(&vfs, &mut proc, "/source.txt", OpenFlags::new(OpenFlags::O_RDWR)).unwrap();
    sys::write(&vfs, &proc, fd, b"cross-engine payload").unwrap();
    sys::close(&mut proc, fd).unwrap();

    sys::copy(&vfs, &proc, "/source.txt", "fat:/dest.txt").unwrap();

    let fd = sys::open(&vfs, &mut proc, "fat:/dest.txt", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let mut buf = [0u8; 32];
    let n = sys::read(&vfs, &proc, fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"cross-engine payload");
    sys::close(&mut proc, fd).unwrap();
}

#[test]
fn move_into_existing_directory_appends_basename() {
    let (vfs, mut proc) = mount_both();

    sys::touch(&vfs, &proc, "/f").unwrap();
    sys::mkdir(&vfs, &proc, "/d").unwrap();

    let fd = sys::open(&vfs, &mut proc, "/f", OpenFlags::new(OpenFlags::O_RDWR)).unwrap();
    sys::write(&vfs, &proc, fd, b"payload").unwrap();
    sys::close(&mut proc, fd).unwrap();

    sys::move_(&vfs, &proc, "/f", "/d").unwrap();

    let err = sys::open(&vfs, &mut proc, "/f", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap_err();
    assert_eq!(err, duofs::error::FsError::NotFound);

    let fd = sys::open(&vfs, &mut proc, "/d/f", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let mut buf = [0u8; 16];
    let n = sys::read(&vfs, &proc, fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"payload");
    sys::close(&mut proc, fd).unwrap();
}

#[test]
fn remove_recursively_deletes_a_directory_tree() {
    let (vfs, mut proc) = mount_both();

    sys::mkdir(&vfs, &proc, "/tree").unwrap();
    sys::mkdir(&vfs, &proc, "/tree/child").unwrap();
    sys::touch(&vfs, &proc, "/tree/a.txt").unwrap();
    sys::touch(&vfs, &proc, "/tree/child/b.txt").unwrap();

    sys::remove(&vfs, &proc, "/tree").unwrap();

    let err = sys::open(&vfs, &mut proc, "/tree", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap_err();
    assert_eq!(err, duofs::error::FsError::NotFound);
}

#[test]
fn sfs_link_then_unlink_conserves_size_and_nlink() {
    let (vfs, mut proc) = mount_both();

    sys::touch(&vfs, &proc, "/p").unwrap();
    let fd = sys::open(&vfs, &mut proc, "/p", OpenFlags::new(OpenFlags::O_RDWR)).unwrap();
    sys::write(&vfs, &proc, fd, b"linked payload").unwrap();
    sys::close(&mut proc, fd).unwrap();

    let fd = sys::open(&vfs, &mut proc, "/p", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let size_before = sys::fstat(&proc, fd).unwrap().size;
    sys::close(&mut proc, fd).unwrap();

    sys::link(&vfs, &proc, "/p", "/q").unwrap();
    sys::unlink(&vfs, &proc, "/p").unwrap();

    let fd = sys::open(&vfs, &mut proc, "/q", OpenFlags::new(OpenFlags::O_RDONLY)).unwrap();
    let st = sys::fstat(&proc, fd).unwrap();
    assert_eq!(st.size, size_before);
    assert_eq!(st.nlink, 1);
    let mut buf = [0u8; 32];
    let n = sys::read(&vfs, &proc, fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"linked payload");
    sys::close(&mut proc, fd).unwrap();
}

#[test]
fn isdirempty_tracks_directory_contents() {
    let (vfs, proc) = mount_both();

    sys::mkdir(&vfs, &proc, "/d").unwrap();
    let dir = vfs.lookup("/d", proc.cwd()).unwrap();
    assert!(vfs.isdirempty(&dir));

    sys::touch(&vfs, &proc, "/d/f").unwrap();
    assert!(!vfs.isdirempty(&dir));
}

#[test]
fn pipe_round_trips_bytes_between_fds() {
    let (vfs, mut proc) = mount_both();
    let (read_fd, write_fd) = sys::pipe(&mut proc).unwrap();

    let written = sys::write(&vfs, &proc, write_fd, b"piped").unwrap();
    assert_eq!(written, 5);

    let mut buf = [0u8; 8];
    let n = sys::read(&vfs, &proc, read_fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"piped");

    sys::close(&mut proc, read_fd).unwrap();
    sys::close(&mut proc, write_fd).unwrap();
}
