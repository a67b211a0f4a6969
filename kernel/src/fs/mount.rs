// SPDX-License-Identifier: GPL-2.0

//! Mount table — spec.md 3, 4.4.
//!
//! Mounting splices a new superblock's root vnode into the mount-point
//! vnode's `next_mountpoint` chain; unmounting reverses it. `get_top_vnode`/
//! `get_base_vnode` (fs/vnode.rs) walk the chain to cross mount boundaries
//! during path resolution.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fs::super_block::{fs_iterate, SuperBlock};
use crate::fs::vnode::{get_top_vnode, VnodeRef};
use crate::sync::Spinlock;

struct MountEntry {
	mountpoint: VnodeRef,
	sb: Arc<SuperBlock>,
}

struct MountTable {
	entries: Vec<MountEntry>,
	root: Option<Arc<SuperBlock>>,
}

static MOUNTS: Spinlock<MountTable> = Spinlock::new(MountTable {
	entries: Vec::new(),
	root: None,
});

/// `fs_mount`: mount filesystem `fstype` from `source` at `mountpoint`.
/// `mountpoint` is `None` only for the very first mount (the system root).
pub fn fs_mount(fstype: &str, source: &str, mountpoint: Option<VnodeRef>) -> Result<Arc<SuperBlock>> {
	let fs = fs_iterate(fstype).ok_or(Error::ENODEV)?;
	let sb = fs.mount(source)?;

	let mut table = MOUNTS.lock();
	match mountpoint {
		None => {
			if table.root.is_some() {
				return Err(Error::EEXIST);
			}
			table.root = Some(sb.clone());
		}
		Some(mp) => {
			if !mp.is_top_of_mount_stack() {
				return Err(Error::EEXIST);
			}
			mp.set_mount_next(&sb.root);
			sb.root.set_mount_prev(&mp);
			table.entries.push(MountEntry { mountpoint: mp, sb: sb.clone() });
		}
	}
	Ok(sb)
}

/// `fs_umount`: the mounted root must be its own top of stack (nothing
/// stacked above it) and carry no other references beyond the mount table's
/// own and the superblock's internal root reference.
pub fn fs_umount(mountpoint: &VnodeRef) -> Result<()> {
	let mut table = MOUNTS.lock();
	let pos = table
		.entries
		.iter()
		.position(|e| Arc::ptr_eq(&e.mountpoint, mountpoint))
		.ok_or(Error::EINVAL)?;
	let entry = &table.entries[pos];
	if !entry.sb.root.is_top_of_mount_stack() {
		return Err(Error::Busy);
	}
	entry.sb.ops.umount()?;
	entry.mountpoint.reset_mount_next_to_self();
	table.entries.remove(pos);
	Ok(())
}

pub fn system_root() -> Option<VnodeRef> {
	MOUNTS.lock().root.as_ref().map(|sb| get_top_vnode(&sb.root))
}

pub fn mounted_filesystems() -> Vec<String> {
	let table = MOUNTS.lock();
	table.entries.iter().map(|e| e.sb.fs_name.clone()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::mode::{DEFAULT_DIR_MODE, S_IFDIR};
	use crate::fs::super_block::{fs_register, FileSystem, StatFs, SuperBlockOps};
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

	struct CountingFs {
		name: &'static str,
	}
	impl FileSystem for CountingFs {
		fn name(&self) -> &str {
			self.name
		}
		fn mount(&self, _source: &str) -> Result<Arc<SuperBlock>> {
			let root = Vnode::new(1, S_IFDIR | DEFAULT_DIR_MODE, Arc::new(NullOps), Weak::new());
			Ok(SuperBlock::new(self.name, root, Arc::new(NullSb)))
		}
	}

	#[test]
	fn mount_over_leaf_splices_into_stack_and_umount_restores_it() {
		fs_register(Arc::new(CountingFs { name: "mtfs_base" })).ok();
		fs_register(Arc::new(CountingFs { name: "mtfs_over" })).ok();

		let base_sb = fs_mount("mtfs_base", "", None).unwrap();
		let leaf = base_sb.root.clone();
		assert!(leaf.is_top_of_mount_stack());

		let over_sb = fs_mount("mtfs_over", "", Some(leaf.clone())).unwrap();
		assert!(!leaf.is_top_of_mount_stack());
		assert!(Arc::ptr_eq(&get_top_vnode(&leaf), &over_sb.root));

		fs_umount(&leaf).unwrap();
		assert!(leaf.is_top_of_mount_stack());
	}
}
