// SPDX-License-Identifier: GPL-2.0

//! Superblock and filesystem registry — spec.md 3, 4.4.
//!
//! Linux models a `super_block`/`file_system_type` pair with a per-instance
//! `mount` function pointer. spec.md 4.4's filesystems are mounted from an
//! already-open block device (or nothing, for ramfs), so the registry here
//! keys on name and hands back a `SuperBlockOps` implementation that already
//! owns its storage.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fs::vnode::VnodeRef;
use crate::sync::Spinlock;

/// Per-filesystem-instance operations (spec.md 4.4 "statfs, get_vnode,
/// delete_vnode, umount").
pub trait SuperBlockOps: Send + Sync {
	fn statfs(&self) -> StatFs;
	fn get_vnode(&self, ino: u64) -> Result<VnodeRef>;
	fn delete_vnode(&self, node: &VnodeRef);
	fn umount(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatFs {
	pub block_size: u32,
	pub total_blocks: u64,
	pub free_blocks: u64,
	pub total_inodes: u64,
	pub free_inodes: u64,
}

/// A mounted filesystem instance (spec.md 3 `superblock`).
pub struct SuperBlock {
	pub fs_name: String,
	pub root: VnodeRef,
	pub ops: Arc<dyn SuperBlockOps>,
}

impl SuperBlock {
	pub fn new(fs_name: &str, root: VnodeRef, ops: Arc<dyn SuperBlockOps>) -> Arc<Self> {
		Arc::new(Self {
			fs_name: String::from(fs_name),
			root,
			ops,
		})
	}
}

/// A registered filesystem type, capable of producing new superblock
/// instances (spec.md 4.4 `fs_register`/`fs_iterate`).
pub trait FileSystem: Send + Sync {
	fn name(&self) -> &str;
	/// Mount a fresh instance. `source` names the backing block device, or
	/// is empty for filesystems with no backing store (ramfs).
	fn mount(&self, source: &str) -> Result<Arc<SuperBlock>>;
}

struct Registry {
	filesystems: Vec<Arc<dyn FileSystem>>,
}

static REGISTRY: Spinlock<Registry> = Spinlock::new(Registry { filesystems: Vec::new() });

/// `fs_register`: registers a filesystem type by name. Idempotent within a
/// name (spec.md 4.4) — registering the same name twice is a no-op, not an
/// error.
pub fn fs_register(fs: Arc<dyn FileSystem>) -> Result<()> {
	let mut reg = REGISTRY.lock();
	if reg.filesystems.iter().any(|existing| existing.name() == fs.name()) {
		return Ok(());
	}
	reg.filesystems.push(fs);
	Ok(())
}

/// `fs_iterate`: look up a registered filesystem type by name.
pub fn fs_iterate(name: &str) -> Option<Arc<dyn FileSystem>> {
	REGISTRY.lock().filesystems.iter().find(|fs| fs.name() == name).cloned()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::mode::{DEFAULT_DIR_MODE, S_IFDIR};
	use crate::fs::vnode::{DirEntry, Vnode, VnodeOps};
	use crate::types::{Gid, Uid};
	use alloc::sync::Weak;

	struct NullOps;
	impl VnodeOps for NullOps {
		fn lookup(&self, _: &VnodeRef, _: &str) -> Result<VnodeRef> {
			Err(Error::ENOENT)
		}
		fn create(&self, _: &VnodeRef, _: &str, _: u32) -> Result<VnodeRef> {
			Err(Error::ENOTSUP)
		}
		fn mkdir(&self, _: &VnodeRef, _: &str, _: u32) -> Result<VnodeRef> {
			Err(Error::ENOTSUP)
		}
		fn rmdir(&self, _: &VnodeRef, _: &str) -> Result<()> {
			Err(Error::ENOTSUP)
		}
		fn unlink(&self, _: &VnodeRef, _: &str) -> Result<()> {
			Err(Error::ENOTSUP)
		}
		fn link(&self, _: &VnodeRef, _: &str, _: &VnodeRef) -> Result<()> {
			Err(Error::ENOTSUP)
		}
		fn readdir(&self, _: &VnodeRef, _: usize) -> Result<Option<DirEntry>> {
			Ok(None)
		}
		fn read(&self, _: &VnodeRef, _: u64, _: &mut [u8]) -> Result<usize> {
			Ok(0)
		}
		fn write(&self, _: &VnodeRef, _: u64, _: &[u8]) -> Result<usize> {
			Ok(0)
		}
		fn truncate(&self, _: &VnodeRef, _: u64) -> Result<()> {
			Ok(())
		}
		fn owner(&self, _: &VnodeRef) -> (Uid, Gid) {
			(crate::types::ROOT_UID, crate::types::ROOT_GID)
		}
		fn set_owner(&self, _: &VnodeRef, _: Uid, _: Gid) -> Result<()> {
			Ok(())
		}
		fn delete_vnode(&self, _: &VnodeRef) {}
	}

	struct NullSb;
	impl SuperBlockOps for NullSb {
		fn statfs(&self) -> StatFs {
			StatFs::default()
		}
		fn get_vnode(&self, _ino: u64) -> Result<VnodeRef> {
			Err(Error::ENOENT)
		}
		fn delete_vnode(&self, _node: &VnodeRef) {}
		fn umount(&self) -> Result<()> {
			Ok(())
		}
	}

	struct NullFs;
	impl FileSystem for NullFs {
		fn name(&self) -> &str {
			"nullfs"
		}
		fn mount(&self, _source: &str) -> Result<Arc<SuperBlock>> {
			let root = Vnode::new(1, S_IFDIR | DEFAULT_DIR_MODE, Arc::new(NullOps), Weak::new());
			Ok(SuperBlock::new("nullfs", root, Arc::new(NullSb)))
		}
	}

	#[test]
	fn register_then_iterate_round_trips() {
		fs_register(Arc::new(NullFs)).unwrap();
		let fs = fs_iterate("nullfs").expect("registered");
		let sb = fs.mount("").unwrap();
		assert_eq!(sb.fs_name, "nullfs");
	}

	#[test]
	fn duplicate_registration_is_idempotent() {
		fs_register(Arc::new(NullFs)).ok();
		assert!(fs_register(Arc::new(NullFs)).is_ok());
	}
}
