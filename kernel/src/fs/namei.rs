// SPDX-License-Identifier: GPL-2.0

//! Path resolution — `lookup_vnode` / `fs_namei_proc` (spec.md 4.4).
//!
//! Linux resolves `Dentry`/`VfsMount` pairs against a path cache; spec.md
//! 4.4's vnode model has no dentry cache, so resolution walks straight
//! through `VnodeOps::lookup` and the mount-stack helpers on every call.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fs::vnode::{get_base_vnode, get_top_vnode, VnodeRef, VnodeType};

/// Where resolution starts (spec.md 4.4: "process root if absolute, process
/// cwd if relative and no AT_FDARG, or the directory vnode referenced by the
/// given fd if AT_FDARG"). Callers resolve "cwd" to a concrete vnode before
/// reaching here (see [`fs_namei_proc`]) — `lookup_vnode` itself only needs
/// to know whether to anchor at the process root or at an arbitrary
/// directory vnode.
pub enum StartPoint {
	Root,
	Fd(VnodeRef),
}

fn tokenize(path: &str) -> Vec<&str> {
	path.split(|c| c == '/' || c == '\\').filter(|s| !s.is_empty()).collect()
}

/// `lookup_vnode`: resolve `path` to a vnode starting from `root` or the
/// directory `start` selects. An absolute path always re-anchors at `root`
/// regardless of `start`. Trailing `/` enforces `O_DIRECTORY`.
pub fn lookup_vnode(path: &str, root: &VnodeRef, start: StartPoint) -> Result<VnodeRef> {
	if path == "/" {
		return Ok(get_top_vnode(root));
	}

	let absolute = path.starts_with('/') || path.starts_with('\\');
	let mut current = if absolute {
		root.clone()
	} else {
		match start {
			StartPoint::Root => root.clone(),
			StartPoint::Fd(v) => v,
		}
	};

	let trailing_slash = path.ends_with('/') || path.ends_with('\\');
	let components = tokenize(path);

	if components.is_empty() {
		return Ok(get_top_vnode(&current));
	}

	let last = components.len() - 1;
	for (idx, component) in components.iter().enumerate() {
		if *component == "." {
			continue;
		}

		loop {
			match current.ops.lookup(&current, component) {
				Ok(next) => {
					current = get_top_vnode(&next);
					break;
				}
				Err(Error::EDOM) if *component == ".." && current.is_top_of_mount_stack() => {
					current = get_base_vnode(&current);
				}
				Err(e) => return Err(e),
			}
		}

		if idx == last && trailing_slash && current.vtype() != VnodeType::Directory {
			return Err(Error::ENOTDIR);
		}
	}

	Ok(current)
}

/// `fs_namei_proc`: resolve `path` using a process's root/cwd, selecting the
/// start point per spec.md 4.4's AT_FDARG rule.
pub fn fs_namei_proc(path: &str, root: &VnodeRef, cwd: &VnodeRef, at_fd: Option<VnodeRef>) -> Result<VnodeRef> {
	let absolute = path.starts_with('/') || path.starts_with('\\');
	let start = if absolute {
		StartPoint::Root
	} else if let Some(fd_vnode) = at_fd {
		StartPoint::Fd(fd_vnode)
	} else {
		StartPoint::Fd(cwd.clone())
	};
	lookup_vnode(path, root, start)
}

/// Split `path` into its parent directory path and final component, for
/// operations (create/mkdir/unlink) that need to resolve the parent
/// separately from the leaf they are about to create or remove.
pub fn split_last_component(path: &str) -> (String, String) {
	let trimmed = path.trim_end_matches(['/', '\\']);
	match trimmed.rfind(['/', '\\']) {
		Some(idx) => {
			let parent = if idx == 0 { "/" } else { &trimmed[..idx] };
			(String::from(parent), String::from(&trimmed[idx + 1..]))
		}
		None => (String::from("."), String::from(trimmed)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::mode::{DEFAULT_DIR_MODE, S_IFDIR};
	use crate::fs::vnode::{DirEntry, Vnode, VnodeOps};
	use crate::types::{Gid, Uid};
	use alloc::sync::{Arc, Weak};
	use alloc::collections::BTreeMap;

	struct DirOps {
		children: crate::sync::Mutex<BTreeMap<String, VnodeRef>>,
	}

	impl VnodeOps for DirOps {
		fn lookup(&self, _dir: &VnodeRef, name: &str) -> Result<VnodeRef> {
			self.children.lock().get(name).cloned().ok_or(Error::ENOENT)
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

	fn dir(ino: u64) -> VnodeRef {
		Vnode::new(ino, S_IFDIR | DEFAULT_DIR_MODE, Arc::new(DirOps { children: crate::sync::Mutex::new(BTreeMap::new()) }), Weak::new())
	}

	#[test]
	fn root_alone_resolves_to_top_of_stack() {
		let root = dir(1);
		let resolved = lookup_vnode("/", &root, StartPoint::Root).unwrap();
		assert!(Arc::ptr_eq(&resolved, &root));
	}

	#[test]
	fn missing_component_is_enoent() {
		let root = dir(1);
		assert_eq!(lookup_vnode("/missing", &root, StartPoint::Root).err(), Some(Error::ENOENT));
	}

	#[test]
	fn split_last_component_handles_root_level_entries() {
		assert_eq!(split_last_component("/a"), (String::from("/"), String::from("a")));
		assert_eq!(split_last_component("/a/b"), (String::from("/a"), String::from("b")));
		assert_eq!(split_last_component("rel"), (String::from("."), String::from("rel")));
	}

	#[test]
	fn trailing_slash_on_non_directory_is_rejected() {
		// A lookup op that returns a regular file for any name, to exercise
		// the O_DIRECTORY trailing-slash enforcement.
		struct FileOps;
		impl VnodeOps for FileOps {
			fn lookup(&self, _: &VnodeRef, _: &str) -> Result<VnodeRef> {
				Ok(Vnode::new(2, crate::fs::mode::S_IFREG | 0o644, Arc::new(FileOps), Weak::new()))
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
		let root = Vnode::new(1, S_IFDIR | DEFAULT_DIR_MODE, Arc::new(FileOps), Weak::new());
		assert_eq!(lookup_vnode("/file/", &root, StartPoint::Root).err(), Some(Error::ENOTDIR));
	}
}
