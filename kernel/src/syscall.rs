// SPDX-License-Identifier: GPL-2.0

//! System call dispatch — spec.md 6.
//!
//! A numeric syscall id dispatches to a handler; per-subsystem jump tables
//! group them (`PROC_*`, `SCHED_*`, `FS_*`, `SYSCTL_*`). Marshalling a raw
//! user-space argument pointer into owned kernel values (the `copyin` step
//! spec.md 6 describes) is arch/trap-frame work this crate doesn't build
//! (spec.md 1 Non-goals); [`Syscall`] models what's left over the wire once
//! that's done — a decoded request `dispatch` matches against and forwards
//! into [`crate::proc`], [`crate::sched`], [`crate::fs`], or
//! [`crate::sysctl`].

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fs::vnode::{FileFlags, VnodeRef};
use crate::proc::cred::{Credentials, Privilege};
use crate::proc::process::{CpuTimes, Process, Rlimit, RlimitResource, SchedPolicy, Thread};
use crate::proc::{self, CredTriple, WaitOptions, WaitOutcome};
use crate::types::{Gid, Pid, Tid, Uid};

/// Jump-table group ids (spec.md 6): the high nibble of a syscall number
/// names its subsystem.
pub mod group {
	pub const PROC: u32 = 0x1000;
	pub const SCHED: u32 = 0x2000;
	pub const FS: u32 = 0x3000;
	pub const SYSCTL: u32 = 0x4000;
}

macro_rules! ids {
	($($name:ident = $val:expr),* $(,)?) => {
		$(pub const $name: u32 = $val;)*
	};
}

ids! {
	PROC_FORK = group::PROC, PROC_WAIT = group::PROC + 1, PROC_EXIT = group::PROC + 2,
	PROC_CRED = group::PROC + 3, PROC_GETGROUPS = group::PROC + 4, PROC_SETGROUPS = group::PROC + 5,
	PROC_GETSID = group::PROC + 6, PROC_SETSID = group::PROC + 7, PROC_GETPGRP = group::PROC + 8,
	PROC_SETPGID = group::PROC + 9, PROC_GETLOGIN = group::PROC + 10, PROC_SETLOGIN = group::PROC + 11,
	PROC_GETPID = group::PROC + 12, PROC_GETPPID = group::PROC + 13, PROC_CHDIR = group::PROC + 14,
	PROC_CHROOT = group::PROC + 15, PROC_GETRLIM = group::PROC + 16, PROC_SETRLIM = group::PROC + 17,
	PROC_TIMES = group::PROC + 18, PROC_GETBREAK = group::PROC + 19,
	SCHED_SETPOLICY = group::SCHED, SCHED_GETPOLICY = group::SCHED + 1,
	SCHED_SETPRIORITY = group::SCHED + 2, SCHED_GETPRIORITY = group::SCHED + 3,
	FS_CREAT = group::FS, FS_LINK = group::FS + 1, FS_UNLINK = group::FS + 2, FS_MKDIR = group::FS + 3,
	FS_RMDIR = group::FS + 4, FS_CHMOD = group::FS + 5, FS_CHFLAGS = group::FS + 6, FS_CHOWN = group::FS + 7,
	SYSCTL_CALL = group::SYSCTL,
}

/// A decoded syscall request (spec.md 6's PROC/SCHED/FS/SYSCTL groups).
pub enum Syscall {
	ProcFork,
	ProcWait { pid: i32, options: WaitOptions },
	ProcGetCred,
	ProcSetCred(CredTriple),
	ProcGetGroups,
	ProcSetGroups(Vec<Gid>),
	ProcGetSid,
	ProcSetSid,
	ProcGetPgrp,
	ProcSetPgid { pgid: Pid },
	ProcGetLogin,
	ProcSetLogin(String),
	ProcGetPid,
	ProcGetPpid,
	ProcChdir(String),
	ProcChroot(String),
	ProcGetRlimit(RlimitResource),
	ProcSetRlimit { resource: RlimitResource, limit: Rlimit },
	ProcTimes,
	ProcGetBreak,
	SchedSetPolicy { thread: Arc<Thread>, target_euid: Uid, policy: SchedPolicy },
	SchedGetPolicy { thread: Arc<Thread> },
	SchedSetPriority { tid: Tid, priority: i32 },
	SchedGetPriority { tid: Tid },
	FsCreat { path: String, mode: u32 },
	FsLink { old: String, new: String },
	FsUnlink(String),
	FsMkdir { path: String, mode: u32 },
	FsRmdir(String),
	FsChmod { path: String, mode: u32 },
	FsChflags { path: String, flags: FileFlags },
	FsChown { path: String, uid: Option<Uid>, gid: Option<Gid> },
	Sysctl { name: Vec<i32>, read: bool, new: Option<Vec<u8>> },
}

/// The result of a dispatched syscall. `dispatch` never encodes a POSIX
/// `-errno` return itself — callers translate `Err(Error)` via
/// [`Error::to_errno`] the same way every other entry point does.
pub enum SyscallValue {
	None,
	Int(i64),
	Pid(Pid),
	OptPid(Option<Pid>),
	Bool(bool),
	String(String),
	OptString(Option<String>),
	Groups(Vec<Gid>),
	Cred(CredTriple),
	Policy(SchedPolicy),
	Rlimit(Rlimit),
	Times(CpuTimes),
	Vnode(VnodeRef),
	SysctlOld(Option<Vec<u8>>),
}

fn root_and_cwd(proc: &Process) -> Result<(VnodeRef, VnodeRef)> {
	let root = proc.root.lock().clone().ok_or(Error::ENODEV)?;
	let cwd = proc.cwd.lock().clone().ok_or(Error::ENODEV)?;
	Ok((root, cwd))
}

/// Dispatch a decoded syscall against `proc`, the calling process.
pub fn dispatch(proc: &Arc<Process>, call: Syscall) -> Result<SyscallValue> {
	match call {
		Syscall::ProcFork => proc::fork(proc).map(|child| SyscallValue::Pid(child.pid)),
		Syscall::ProcWait { pid, options } => match proc::wait(proc, pid, options)? {
			WaitOutcome::Reaped { pid, status } => Ok(SyscallValue::Int(((pid.0 as i64) << 32) | status as i64)),
			WaitOutcome::NoHang => Ok(SyscallValue::OptPid(None)),
		},
		Syscall::ProcGetCred => Ok(SyscallValue::Cred(proc::get_cred(proc))),
		Syscall::ProcSetCred(triple) => proc::set_cred(proc, triple).map(|_| SyscallValue::None),
		Syscall::ProcGetGroups => Ok(SyscallValue::Groups(proc::get_groups(proc))),
		Syscall::ProcSetGroups(groups) => proc::set_groups(proc, groups).map(|_| SyscallValue::None),
		Syscall::ProcGetSid => Ok(SyscallValue::OptPid(proc::getsid(proc))),
		Syscall::ProcSetSid => proc::do_setsid(proc).map(SyscallValue::Pid),
		Syscall::ProcGetPgrp => Ok(SyscallValue::OptPid(proc::getpgrp(proc))),
		Syscall::ProcSetPgid { pgid } => proc::do_setpgid(proc, pgid).map(|_| SyscallValue::None),
		Syscall::ProcGetLogin => Ok(SyscallValue::OptString(proc::getlogin(proc))),
		Syscall::ProcSetLogin(name) => proc::do_setlogin(proc, &name).map(|_| SyscallValue::None),
		Syscall::ProcGetPid => Ok(SyscallValue::Pid(proc::getpid(proc))),
		Syscall::ProcGetPpid => Ok(SyscallValue::OptPid(proc::getppid(proc))),
		Syscall::ProcChdir(path) => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			let node = crate::fs::fs_chdir(&path, &root, &cwd, &cred)?;
			drop(cred);
			*proc.cwd.lock() = Some(node.clone());
			Ok(SyscallValue::Vnode(node))
		}
		Syscall::ProcChroot(path) => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			let node = crate::fs::chroot(&path, &root, &cwd, &cred)?;
			drop(cred);
			*proc.root.lock() = Some(node.clone());
			Ok(SyscallValue::Vnode(node))
		}
		Syscall::ProcGetRlimit(resource) => Ok(SyscallValue::Rlimit(proc.rlimits.lock()[resource as usize])),
		Syscall::ProcSetRlimit { resource, limit } => proc::do_setrlimit(proc, resource, limit).map(|_| SyscallValue::None),
		Syscall::ProcTimes => Ok(SyscallValue::Times(proc.times())),
		Syscall::ProcGetBreak => {
			let region = proc.vm_mm.region_at(crate::memory::mm::SLOT_HEAP).ok_or(Error::ENOMEM)?;
			let d = region.descriptor();
			Ok(SyscallValue::Int((d.vaddr.as_usize() + d.size) as i64))
		}
		Syscall::SchedSetPolicy { thread, target_euid, policy } => {
			let cred = proc.cred.lock();
			proc::do_setpolicy(&cred, target_euid, &thread, policy).map(|_| SyscallValue::None)
		}
		Syscall::SchedGetPolicy { thread } => Ok(SyscallValue::Policy(proc::get_policy(&thread))),
		Syscall::SchedSetPriority { tid, priority } => {
			let has_privilege = crate::proc::cred::priv_check(&proc.cred.lock(), Privilege::SCHED_SETPRIORITY).is_ok();
			crate::sched::set_priority(tid, priority, has_privilege).map(|_| SyscallValue::None)
		}
		Syscall::SchedGetPriority { tid } => crate::sched::get_priority(tid).map(|p| SyscallValue::Int(p as i64)),
		Syscall::FsCreat { path, mode } => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			crate::fs::fs_creat(&path, mode, &root, &cwd, &cred).map(SyscallValue::Vnode)
		}
		Syscall::FsLink { old, new } => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			crate::fs::fs_link(&old, &new, &root, &cwd, &cred).map(|_| SyscallValue::None)
		}
		Syscall::FsUnlink(path) => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			crate::fs::fs_unlink(&path, &root, &cwd, &cred).map(|_| SyscallValue::None)
		}
		Syscall::FsMkdir { path, mode } => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			crate::fs::fs_mkdir(&path, mode, &root, &cwd, &cred).map(SyscallValue::Vnode)
		}
		Syscall::FsRmdir(path) => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			crate::fs::fs_rmdir(&path, &root, &cwd, &cred).map(|_| SyscallValue::None)
		}
		Syscall::FsChmod { path, mode } => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			crate::fs::fs_chmod(&path, mode, &root, &cwd, &cred).map(|_| SyscallValue::None)
		}
		Syscall::FsChflags { path, flags } => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			crate::fs::fs_chflags(&path, flags, &root, &cwd, &cred).map(|_| SyscallValue::None)
		}
		Syscall::FsChown { path, uid, gid } => {
			let (root, cwd) = root_and_cwd(proc)?;
			let cred = proc.cred.lock();
			crate::fs::fs_chown(&path, uid, gid, &root, &cwd, &cred).map(|_| SyscallValue::None)
		}
		Syscall::Sysctl { name, read, new } => {
			let cred = proc.cred.lock();
			let mut old = read.then(Vec::new);
			crate::sysctl::sysctl(&cred, &name, old.as_mut(), new.as_deref())?;
			Ok(SyscallValue::SysctlOld(old))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::proc::cred::Credentials;
	use crate::proc::process::ExitInfo;
	use crate::types::{Pid, INIT_PID};
	use alloc::string::String;

	fn process(pid: Pid, cred: Credentials) -> Arc<Process> {
		Arc::new(Process::new(pid, None, String::from("p"), cred))
	}

	#[test]
	fn fork_dispatch_returns_child_pid() {
		let parent = process(Pid(300), Credentials::root());
		crate::proc::find_process(Pid(300));
		let result = dispatch(&parent, Syscall::ProcFork);
		assert!(matches!(result, Ok(SyscallValue::Pid(_)) | Err(Error::EWOULDBLOCK)));
	}

	#[test]
	fn getpid_dispatch_round_trips() {
		let p = process(Pid(301), Credentials::root());
		match dispatch(&p, Syscall::ProcGetPid) {
			Ok(SyscallValue::Pid(pid)) => assert_eq!(pid, Pid(301)),
			_ => panic!("expected Pid"),
		}
	}

	#[test]
	fn wait_without_children_is_echild() {
		let p = process(Pid(302), Credentials::root());
		assert_eq!(
			dispatch(&p, Syscall::ProcWait { pid: -1, options: WaitOptions::empty() }).err(),
			Some(Error::ECHILD)
		);
	}

	#[test]
	fn times_dispatch_reflects_process_state() {
		let p = process(Pid(303), Credentials::root());
		match dispatch(&p, Syscall::ProcTimes) {
			Ok(SyscallValue::Times(times)) => assert_eq!(times.self_user, 0),
			_ => panic!("expected Times"),
		}
		let _ = ExitInfo::exited(0);
		let _ = INIT_PID;
	}

	#[test]
	fn getbreak_without_heap_region_is_enomem() {
		let p = process(Pid(304), Credentials::root());
		assert_eq!(dispatch(&p, Syscall::ProcGetBreak).err(), Some(Error::ENOMEM));
	}
}
