// SPDX-License-Identifier: GPL-2.0

//! Permission checks — `chkperm` (spec.md 4.4).

use crate::error::{Error, Result};
use crate::fs::mode::{s_isdir, S_IRGRP, S_IROTH, S_IRUSR, S_IWGRP, S_IWOTH, S_IWUSR, S_IXGRP, S_IXOTH, S_IXUSR};
use crate::fs::vnode::AccessMode;
use crate::proc::cred::Credentials;
use crate::types::{Gid, Uid};

/// `chkperm`: given a vnode's `st_mode`/owner/group, a credential, and a
/// requested access mode, choose OWNER/GROUP/OTHER and check the resulting
/// mask against `st_mode`. A directory additionally requires execute. Root's
/// effective uid bypasses the check entirely, matching `priv_check`'s rule
/// elsewhere (spec.md 4.4's "relevant VFS privilege" gate collapses to the
/// same root bypass since no distinct READ/WRITE/EXEC capability exists in
/// the bounding set — every other privilege in it gates a distinct syscall).
pub fn chkperm(
	mode: u32,
	owner_uid: Uid,
	owner_gid: Gid,
	cred: &Credentials,
	access: AccessMode,
) -> Result<()> {
	let is_owner = cred.euid == owner_uid;
	let is_group = cred.euid != owner_uid && (cred.egid == owner_gid || cred.in_group(owner_gid));

	let (r, w, x) = if is_owner {
		(S_IRUSR, S_IWUSR, S_IXUSR)
	} else if is_group {
		(S_IRGRP, S_IWGRP, S_IXGRP)
	} else {
		(S_IROTH, S_IWOTH, S_IXOTH)
	};

	let mut required = 0u32;
	if access.contains(AccessMode::READ) {
		required |= r;
	}
	if access.contains(AccessMode::WRITE) {
		required |= w;
	}
	if access.contains(AccessMode::EXECUTE) || s_isdir(mode) {
		required |= x;
	}

	if (mode & required) == required || cred.is_root() {
		return Ok(());
	}

	Err(Error::EACCES)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::mode::{DEFAULT_FILE_MODE, S_IWUSR};
	use crate::types::{ROOT_GID, ROOT_UID};

	#[test]
	fn owner_can_read_default_mode() {
		let cred = Credentials::unprivileged(Uid(10), Gid(10));
		assert!(chkperm(DEFAULT_FILE_MODE, Uid(10), Gid(10), &cred, AccessMode::READ).is_ok());
	}

	#[test]
	fn other_cannot_write_default_mode() {
		let cred = Credentials::unprivileged(Uid(99), Gid(99));
		assert_eq!(
			chkperm(DEFAULT_FILE_MODE, Uid(10), Gid(10), &cred, AccessMode::WRITE),
			Err(Error::EACCES)
		);
	}

	#[test]
	fn group_member_can_write_when_group_writable() {
		let mut cred = Credentials::unprivileged(Uid(20), Gid(10));
		cred.groups.push(Gid(10));
		let mode = DEFAULT_FILE_MODE | S_IWGRP;
		assert!(chkperm(mode, Uid(10), Gid(10), &cred, AccessMode::WRITE).is_ok());
	}

	#[test]
	fn root_bypasses_denied_permission() {
		let cred = Credentials::root();
		let mode = DEFAULT_FILE_MODE & !S_IWUSR;
		assert!(chkperm(mode, ROOT_UID, ROOT_GID, &cred, AccessMode::WRITE).is_ok());
	}

	#[test]
	fn directory_access_requires_execute() {
		let cred = Credentials::unprivileged(Uid(10), Gid(10));
		let mode = crate::fs::mode::S_IFDIR | S_IRUSR;
		assert_eq!(
			chkperm(mode, Uid(10), Gid(10), &cred, AccessMode::EXECUTE),
			Err(Error::EACCES)
		);
	}
}
