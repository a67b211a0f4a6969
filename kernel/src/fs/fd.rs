// SPDX-License-Identifier: GPL-2.0

//! Per-process file descriptor table — spec.md 3, 4.4.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fs::vnode::VnodeRef;
use crate::sync::Mutex;

bitflags::bitflags! {
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct FileStatusFlags: u32 {
		const READ = 1 << 0;
		const WRITE = 1 << 1;
		const APPEND = 1 << 2;
		const NONBLOCK = 1 << 3;
	}
}

/// An open-file description (spec.md GLOSSARY: "open file description" is
/// distinct from the per-process descriptor number that refers to it).
pub struct File {
	pub vnode: VnodeRef,
	pub offset: Mutex<u64>,
	pub status: FileStatusFlags,
}

impl File {
	pub fn new(vnode: VnodeRef, status: FileStatusFlags) -> Arc<Self> {
		Arc::new(Self {
			vnode,
			offset: Mutex::new(0),
			status,
		})
	}
}

struct Descriptor {
	file: Arc<File>,
	close_on_exec: bool,
}

/// `fs_fildes_*` — per-process descriptor table (spec.md 3, 4.4).
pub struct FdTable {
	slots: Vec<Option<Descriptor>>,
}

impl FdTable {
	pub fn new(capacity: usize) -> Self {
		let mut slots = Vec::with_capacity(capacity);
		slots.resize_with(capacity, || None);
		Self { slots }
	}

	/// `fs_fildes_curproc_next`: allocate the lowest-numbered free slot.
	pub fn fs_fildes_curproc_next(&mut self, file: Arc<File>, close_on_exec: bool) -> Result<i32> {
		let slot = self.slots.iter().position(Option::is_none).ok_or(Error::ENFILE)?;
		self.slots[slot] = Some(Descriptor { file, close_on_exec });
		Ok(slot as i32)
	}

	/// `fs_fildes_ref`: look up the open-file description behind `fd`.
	pub fn fs_fildes_ref(&self, fd: i32) -> Result<Arc<File>> {
		let slot = self.slot_index(fd)?;
		self.slots[slot].as_ref().map(|d| d.file.clone()).ok_or(Error::EBADF)
	}

	pub fn install_at(&mut self, fd: i32, file: Arc<File>, close_on_exec: bool) -> Result<()> {
		let slot = self.slot_index(fd)?;
		self.slots[slot] = Some(Descriptor { file, close_on_exec });
		Ok(())
	}

	pub fn close(&mut self, fd: i32) -> Result<()> {
		let slot = self.slot_index(fd)?;
		self.slots[slot].take().ok_or(Error::EBADF)?;
		Ok(())
	}

	pub fn set_close_on_exec(&mut self, fd: i32, value: bool) -> Result<()> {
		let slot = self.slot_index(fd)?;
		let descriptor = self.slots[slot].as_mut().ok_or(Error::EBADF)?;
		descriptor.close_on_exec = value;
		Ok(())
	}

	/// `fs_fildes_close_all`: drop every open descriptor (process exit).
	pub fn close_all(&mut self) {
		for slot in self.slots.iter_mut() {
			*slot = None;
		}
	}

	/// `fork()`'s fd-table duplication (spec.md 4.2): every open descriptor
	/// is installed at the same slot in a fresh table, sharing (not
	/// copying) the open-file description — this is what gives a forked
	/// child the parent's current seek offset, and why closing one side
	/// never affects the other's remaining descriptor.
	pub fn fork(&self) -> FdTable {
		let slots = self
			.slots
			.iter()
			.map(|slot| {
				slot.as_ref().map(|d| Descriptor {
					file: d.file.clone(),
					close_on_exec: d.close_on_exec,
				})
			})
			.collect();
		FdTable { slots }
	}

	/// `fs_fildes_close_exec`: drop descriptors marked FD_CLOEXEC (exec).
	pub fn close_exec(&mut self) {
		for slot in self.slots.iter_mut() {
			if slot.as_ref().is_some_and(|d| d.close_on_exec) {
				*slot = None;
			}
		}
	}

	fn slot_index(&self, fd: i32) -> Result<usize> {
		if fd < 0 || fd as usize >= self.slots.len() {
			return Err(Error::EBADF);
		}
		Ok(fd as usize)
	}
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

	fn some_file() -> Arc<File> {
		let v = Vnode::new(1, S_IFDIR | DEFAULT_DIR_MODE, Arc::new(NullOps), Weak::new());
		File::new(v, FileStatusFlags::READ)
	}

	#[test]
	fn alloc_picks_lowest_free_slot() {
		let mut table = FdTable::new(4);
		let a = table.fs_fildes_curproc_next(some_file(), false).unwrap();
		let b = table.fs_fildes_curproc_next(some_file(), false).unwrap();
		assert_eq!((a, b), (0, 1));
		table.close(0).unwrap();
		let c = table.fs_fildes_curproc_next(some_file(), false).unwrap();
		assert_eq!(c, 0);
	}

	#[test]
	fn close_exec_drops_only_marked_descriptors() {
		let mut table = FdTable::new(4);
		let keep = table.fs_fildes_curproc_next(some_file(), false).unwrap();
		let drop_fd = table.fs_fildes_curproc_next(some_file(), true).unwrap();
		table.close_exec();
		assert!(table.fs_fildes_ref(keep).is_ok());
		assert_eq!(table.fs_fildes_ref(drop_fd).err(), Some(Error::EBADF));
	}

	#[test]
	fn exhausted_table_returns_enfile() {
		let mut table = FdTable::new(1);
		table.fs_fildes_curproc_next(some_file(), false).unwrap();
		assert_eq!(table.fs_fildes_curproc_next(some_file(), false).err(), Some(Error::ENFILE));
	}
}
