// SPDX-License-Identifier: GPL-2.0

//! Top-level VFS syscalls — spec.md 4.4.
//!
//! Each resolves the parent directory through [`fs_namei_proc`], checks
//! permission with [`chkperm`], then delegates to the matching
//! [`VnodeOps`] method — the same shape Linux's VFS syscalls apply against
//! `Dentry`/`Inode` pairs, walking vnodes here instead.

use alloc::sync::Arc;

use crate::error::{Error, Result};
use crate::fs::mode::S_IFMT;
use crate::fs::namei::{fs_namei_proc, split_last_component};
use crate::fs::perm::chkperm;
use crate::fs::vnode::{AccessMode, FileFlags, VnodeRef, VnodeType};
use crate::proc::cred::{priv_check, Credentials, Privilege};

fn resolve_parent(path: &str, root: &VnodeRef, cwd: &VnodeRef) -> Result<(VnodeRef, alloc::string::String)> {
	let (parent_path, name) = split_last_component(path);
	if name.is_empty() || name == "." || name == ".." {
		return Err(Error::EINVAL);
	}
	let parent = fs_namei_proc(&parent_path, root, cwd, None)?;
	if parent.vtype() != VnodeType::Directory {
		return Err(Error::ENOTDIR);
	}
	Ok((parent, name))
}

fn check_write_access(parent: &VnodeRef, cred: &Credentials) -> Result<()> {
	let (owner_uid, owner_gid) = parent.ops.owner(parent);
	chkperm(*parent.mode.lock(), owner_uid, owner_gid, cred, AccessMode::WRITE)
}

/// `fs_creat`: create a regular file, `mode & !S_IFMT` permission bits.
pub fn fs_creat(path: &str, mode: u32, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<VnodeRef> {
	let (parent, name) = resolve_parent(path, root, cwd)?;
	check_write_access(&parent, cred)?;
	parent.ops.create(&parent, &name, mode & !S_IFMT)
}

/// `fs_mkdir`: create a directory.
pub fn fs_mkdir(path: &str, mode: u32, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<VnodeRef> {
	let (parent, name) = resolve_parent(path, root, cwd)?;
	check_write_access(&parent, cred)?;
	parent.ops.mkdir(&parent, &name, mode & !S_IFMT)
}

/// `fs_rmdir`: remove an empty directory.
pub fn fs_rmdir(path: &str, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<()> {
	let (parent, name) = resolve_parent(path, root, cwd)?;
	check_write_access(&parent, cred)?;
	parent.ops.rmdir(&parent, &name)
}

/// `fs_unlink`: remove a non-directory entry. Unlinking a directory entry
/// is permitted only to uid 0 (spec.md 4.4).
pub fn fs_unlink(path: &str, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<()> {
	let (parent, name) = resolve_parent(path, root, cwd)?;
	check_write_access(&parent, cred)?;
	let target = parent.ops.lookup(&parent, &name)?;
	if target.vtype() == VnodeType::Directory && !cred.is_root() {
		return Err(Error::EACCES);
	}
	let flags = *target.flags.lock();
	if flags.contains(FileFlags::IMMUTABLE) {
		return Err(Error::EACCES);
	}
	parent.ops.unlink(&parent, &name)
}

/// `fs_link`: create a hard link. Both directory and target must belong to
/// the same superblock (spec.md 4.4: "a filesystem-spanning link returns
/// -EXDEV").
pub fn fs_link(oldpath: &str, newpath: &str, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<()> {
	let target = fs_namei_proc(oldpath, root, cwd, None)?;
	let (parent, name) = resolve_parent(newpath, root, cwd)?;
	check_write_access(&parent, cred)?;

	let same_fs = match (parent.sb.upgrade(), target.sb.upgrade()) {
		(Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
		(None, None) => true,
		_ => false,
	};
	if !same_fs {
		return Err(Error::EXDEV);
	}

	parent.ops.link(&parent, &name, &target)
}

/// `fs_chmod`: change the permission bits. The file type bits in `mode` are
/// ignored.
pub fn fs_chmod(path: &str, mode: u32, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<()> {
	let node = fs_namei_proc(path, root, cwd, None)?;
	let (owner_uid, _) = node.ops.owner(&node);
	if !cred.is_root() && cred.euid != owner_uid {
		return Err(Error::EPERM);
	}
	let current = *node.mode.lock() & S_IFMT;
	node.ops.set_mode(&node, current | (mode & !S_IFMT))
}

/// `fs_chown`: change owner and/or group. Passing `None` for either leaves
/// it unchanged.
pub fn fs_chown(
	path: &str,
	uid: Option<crate::types::Uid>,
	gid: Option<crate::types::Gid>,
	root: &VnodeRef,
	cwd: &VnodeRef,
	cred: &Credentials,
) -> Result<()> {
	let node = fs_namei_proc(path, root, cwd, None)?;
	let (owner_uid, owner_gid) = node.ops.owner(&node);
	if !cred.is_root() && cred.euid != owner_uid {
		return Err(Error::EPERM);
	}
	node.ops.set_owner(&node, uid.unwrap_or(owner_uid), gid.unwrap_or(owner_gid))
}

/// `fs_chflags`: change `chflags`-style flags. Requires `VFS_SYSFLAGS`
/// (spec.md 4.4).
pub fn fs_chflags(path: &str, flags: FileFlags, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<()> {
	priv_check(cred, Privilege::VFS_SYSFLAGS)?;
	let node = fs_namei_proc(path, root, cwd, None)?;
	*node.flags.lock() = flags;
	Ok(())
}

/// `fs_chdir`: resolve `path` to a directory vnode the caller installs as
/// its new cwd.
pub fn fs_chdir(path: &str, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<VnodeRef> {
	let node = fs_namei_proc(path, root, cwd, None)?;
	if node.vtype() != VnodeType::Directory {
		return Err(Error::ENOTDIR);
	}
	let (owner_uid, owner_gid) = node.ops.owner(&node);
	chkperm(*node.mode.lock(), owner_uid, owner_gid, cred, AccessMode::EXECUTE)?;
	Ok(node)
}

/// `chroot`: resolve `path` to a directory vnode the caller installs as its
/// new root. Requires `VFS_CHROOT` (spec.md 4.4).
pub fn chroot(path: &str, root: &VnodeRef, cwd: &VnodeRef, cred: &Credentials) -> Result<VnodeRef> {
	priv_check(cred, Privilege::VFS_CHROOT)?;
	let node = fs_namei_proc(path, root, cwd, None)?;
	if node.vtype() != VnodeType::Directory {
		return Err(Error::ENOTDIR);
	}
	Ok(node)
}
