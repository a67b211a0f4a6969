// SPDX-License-Identifier: GPL-2.0

//! Virtual filesystem — spec.md 3, 4.4, 4.5, 4.6.
//!
//! A vnode-based VFS (BSD/Zeke-OS lineage, not Linux's inode/dentry split):
//! [`vnode`] is the abstract file handle, [`super_block`] registers and
//! mounts filesystem types, [`mount`] stitches a mounted root into a parent
//! vnode's mount-point chain, [`namei`] walks paths through both, and
//! [`perm`] gates access against a process's credentials. [`ramfs`] and
//! [`fat`] are the two concrete filesystems this kernel ships.

pub mod fat;
pub mod fd;
pub mod mode;
pub mod mount;
pub mod namei;
pub mod operations;
pub mod perm;
pub mod ramfs;
pub mod super_block;
pub mod vnode;

pub use fd::{FdTable, File, FileStatusFlags};
pub use namei::{fs_namei_proc, lookup_vnode, split_last_component, StartPoint};
pub use operations::{chroot, fs_chdir, fs_chflags, fs_chmod, fs_chown, fs_creat, fs_link, fs_mkdir, fs_rmdir, fs_unlink};
pub use perm::chkperm;
pub use vnode::{AccessMode, DirEntry, Vnode, VnodeOps, VnodeRef, VnodeType};

/// Open-flag bits (spec.md 4.4), the subset `fs_namei_proc`/`open` callers
/// actually branch on.
pub mod flags {
	pub const O_RDONLY: u32 = 0o0;
	pub const O_WRONLY: u32 = 0o1;
	pub const O_RDWR: u32 = 0o2;
	pub const O_ACCMODE: u32 = 0o3;
	pub const O_CREAT: u32 = 0o100;
	pub const O_EXCL: u32 = 0o200;
	pub const O_TRUNC: u32 = 0o1000;
	pub const O_APPEND: u32 = 0o2000;
	pub const O_NONBLOCK: u32 = 0o4000;
	pub const O_DIRECTORY: u32 = 0o200000;
	pub const O_CLOEXEC: u32 = 0o2000000;
}

/// Register every filesystem type this kernel ships. Called once from
/// kernel init before the first `fs_mount`.
pub fn register_filesystems() -> crate::error::Result<()> {
	ramfs::register()?;
	fat::register()?;
	Ok(())
}
