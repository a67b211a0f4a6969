// SPDX-License-Identifier: GPL-2.0

//! Vnode — spec.md 3, 4.4.
//!
//! Linux models files as `inode`/`dentry` pairs; spec.md names the
//! BSD/Zeke-OS `vnode` directly, with filesystem payload reached through a
//! `vnode_ops` table rather than `container_of` on an embedded struct
//! (spec.md 9 Design Notes: trait-object indirection is one of the three
//! acceptable readings, and is what Rust makes natural).

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicI64, Ordering};

use crate::error::{Error, Result};
use crate::fs::mode::S_IFMT;
use crate::fs::super_block::SuperBlock;
use crate::types::{Gid, Uid};

pub type VnodeRef = Arc<Vnode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnodeType {
	Regular,
	Directory,
	CharDevice,
	BlockDevice,
	Fifo,
	Symlink,
}

impl VnodeType {
	pub fn from_mode(mode: u32) -> Self {
		use crate::fs::mode::*;
		match mode & S_IFMT {
			S_IFDIR => VnodeType::Directory,
			S_IFCHR => VnodeType::CharDevice,
			S_IFBLK => VnodeType::BlockDevice,
			S_IFIFO => VnodeType::Fifo,
			S_IFLNK => VnodeType::Symlink,
			_ => VnodeType::Regular,
		}
	}
}

/// A directory entry read back by `readdir`.
pub struct DirEntry {
	pub name: String,
	pub ino: u64,
	pub kind: VnodeType,
}

/// Access mode requested by `chkperm` (spec.md 4.4).
bitflags::bitflags! {
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct AccessMode: u32 {
		const READ = 1 << 0;
		const WRITE = 1 << 1;
		const EXECUTE = 1 << 2;
	}
}

/// `chflags` file flags (spec.md 4.4: "fs_chflags requires SYSFLAGS
/// privilege"), independent of the permission bits `chmod` sets.
bitflags::bitflags! {
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct FileFlags: u32 {
		/// May not be written, truncated, renamed, or removed.
		const IMMUTABLE = 1 << 0;
		/// May only be appended to.
		const APPEND_ONLY = 1 << 1;
	}
}

/// Filesystem-specific behavior reached through the vnode's `ops` pointer.
/// One implementation is shared by every vnode a given filesystem creates;
/// it dispatches on `node`'s own type as needed.
pub trait VnodeOps: Send + Sync {
	fn lookup(&self, dir: &VnodeRef, name: &str) -> Result<VnodeRef>;
	fn create(&self, dir: &VnodeRef, name: &str, mode: u32) -> Result<VnodeRef>;
	fn mkdir(&self, dir: &VnodeRef, name: &str, mode: u32) -> Result<VnodeRef>;
	fn rmdir(&self, dir: &VnodeRef, name: &str) -> Result<()>;
	fn unlink(&self, dir: &VnodeRef, name: &str) -> Result<()>;
	fn link(&self, dir: &VnodeRef, name: &str, target: &VnodeRef) -> Result<()>;
	fn readdir(&self, dir: &VnodeRef, index: usize) -> Result<Option<DirEntry>>;
	fn read(&self, node: &VnodeRef, offset: u64, buf: &mut [u8]) -> Result<usize>;
	fn write(&self, node: &VnodeRef, offset: u64, buf: &[u8]) -> Result<usize>;
	fn truncate(&self, node: &VnodeRef, size: u64) -> Result<()>;
	fn owner(&self, node: &VnodeRef) -> (Uid, Gid);
	fn set_owner(&self, node: &VnodeRef, uid: Uid, gid: Gid) -> Result<()>;
	/// `chmod` (spec.md 4.4): store the new mode and, for filesystems that
	/// keep an on-disk representation of permission bits (FAT's RDO
	/// attribute), persist it. The default is adequate for filesystems whose
	/// vnode `mode` field is the only copy of this state (ramfs).
	fn set_mode(&self, node: &VnodeRef, mode: u32) -> Result<()> {
		*node.mode.lock() = mode;
		Ok(())
	}
	/// Called by [`Vnode::vrele`] at refcount 1 (spec.md 3 invariants).
	fn delete_vnode(&self, node: &VnodeRef);
}

struct MountLinks {
	prev: Weak<Vnode>,
	next: Weak<Vnode>,
}

/// An abstract filesystem-level file or directory handle (spec.md 3,
/// GLOSSARY).
pub struct Vnode {
	pub ino: u64,
	pub mode: crate::sync::Mutex<u32>,
	pub len: crate::sync::Mutex<u64>,
	pub flags: crate::sync::Mutex<FileFlags>,
	refcount: AtomicI64,
	pub sb: Weak<SuperBlock>,
	pub ops: Arc<dyn VnodeOps>,
	pub vlock: crate::sync::Mutex<()>,
	mountpoints: crate::sync::Mutex<MountLinks>,
}

impl Vnode {
	/// Construct a vnode with no filesystem mounted above or below it
	/// (`prev`/`next` both point to itself, per spec.md 4.4's sentinel rule).
	pub fn new(ino: u64, mode: u32, ops: Arc<dyn VnodeOps>, sb: Weak<SuperBlock>) -> VnodeRef {
		Arc::new_cyclic(|weak| Vnode {
			ino,
			mode: crate::sync::Mutex::new(mode),
			len: crate::sync::Mutex::new(0),
			flags: crate::sync::Mutex::new(FileFlags::empty()),
			refcount: AtomicI64::new(1),
			sb,
			ops,
			vlock: crate::sync::Mutex::new(()),
			mountpoints: crate::sync::Mutex::new(MountLinks {
				prev: weak.clone(),
				next: weak.clone(),
			}),
		})
	}

	pub fn vtype(&self) -> VnodeType {
		VnodeType::from_mode(*self.mode.lock())
	}

	pub fn refcount(&self) -> i64 {
		self.refcount.load(Ordering::Acquire)
	}

	/// `vref`: fails if the vnode is already being freed (count <= 0).
	pub fn vref(&self) -> Result<()> {
		loop {
			let cur = self.refcount.load(Ordering::Acquire);
			if cur <= 0 {
				return Err(Error::EINVAL);
			}
			if self
				.refcount
				.compare_exchange(cur, cur + 1, Ordering::AcqRel, Ordering::Acquire)
				.is_ok()
			{
				return Ok(());
			}
		}
	}

	/// `vrele`: at refcount 1, invokes the superblock's `delete_vnode`.
	pub fn vrele(self: &Arc<Self>) {
		if self.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
			self.ops.delete_vnode(self);
		}
	}

	/// `vrele_nunlink`: decrements without ever triggering delete (used
	/// while other references are known to remain live).
	pub fn vrele_nunlink(&self) {
		self.refcount.fetch_sub(1, Ordering::AcqRel);
	}

	/// `vput`: `vrele` on an already-locked vnode; this model's lock is a
	/// plain mutex guard the caller drops before calling, so `vput` and
	/// `vrele` share an implementation.
	pub fn vput(self: &Arc<Self>) {
		self.vrele();
	}

	pub fn is_bottom_of_mount_stack(self: &Arc<Self>) -> bool {
		let links = self.mountpoints.lock();
		links.prev.upgrade().map(|p| Arc::ptr_eq(&p, self)).unwrap_or(true)
	}

	pub fn is_top_of_mount_stack(self: &Arc<Self>) -> bool {
		let links = self.mountpoints.lock();
		links.next.upgrade().map(|n| Arc::ptr_eq(&n, self)).unwrap_or(true)
	}

	pub fn mount_next(self: &Arc<Self>) -> VnodeRef {
		self.mountpoints.lock().next.upgrade().unwrap_or_else(|| self.clone())
	}

	pub fn mount_prev(self: &Arc<Self>) -> VnodeRef {
		self.mountpoints.lock().prev.upgrade().unwrap_or_else(|| self.clone())
	}

	pub fn set_mount_next(self: &Arc<Self>, next: &VnodeRef) {
		self.mountpoints.lock().next = Arc::downgrade(next);
	}

	pub fn set_mount_prev(self: &Arc<Self>, prev: &VnodeRef) {
		self.mountpoints.lock().prev = Arc::downgrade(prev);
	}

	pub fn reset_mount_next_to_self(self: &Arc<Self>) {
		self.mountpoints.lock().next = Arc::downgrade(self);
	}
}

/// `get_top_vnode`: follow `next_mountpoint` to the topmost mounted root.
pub fn get_top_vnode(start: &VnodeRef) -> VnodeRef {
	let mut current = start.clone();
	loop {
		if current.is_top_of_mount_stack() {
			return current;
		}
		current = current.mount_next();
	}
}

/// `get_base_vnode`: follow `prev_mountpoint` to escape upward through
/// mount points.
pub fn get_base_vnode(start: &VnodeRef) -> VnodeRef {
	let mut current = start.clone();
	loop {
		if current.is_bottom_of_mount_stack() {
			return current;
		}
		current = current.mount_prev();
	}
}
