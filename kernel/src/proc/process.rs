// SPDX-License-Identifier: GPL-2.0

//! Process and thread control blocks — spec.md 3, 4.2.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::fs::vnode::VnodeRef;
use crate::fs::FdTable;
use crate::memory::mm::VmMm;
use crate::proc::cred::Credentials;
use crate::proc::pgrp::ProcessGroup;
use crate::sync::Mutex;
use crate::types::{Pid, Tid};

/// Process state (spec.md 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
	Initial,
	Running,
	Ready,
	Waiting,
	Stopped,
	Zombie,
	Defunct,
}

/// `rlimit[i]` resources (spec.md 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlimitResource {
	Core = 0,
	Cpu = 1,
	Data = 2,
	Fsize = 3,
	Nofile = 4,
	Stack = 5,
	As = 6,
}

pub const RLIMIT_COUNT: usize = 7;
pub const RLIM_INFINITY: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rlimit {
	pub cur: u64,
	pub max: u64,
}

impl Rlimit {
	pub const fn unlimited() -> Self {
		Self {
			cur: RLIM_INFINITY,
			max: RLIM_INFINITY,
		}
	}
}

fn default_rlimits() -> [Rlimit; RLIMIT_COUNT] {
	let mut limits = [Rlimit::unlimited(); RLIMIT_COUNT];
	limits[RlimitResource::Nofile as usize] = Rlimit { cur: 256, max: 1024 };
	limits
}

/// `setrlimit` (spec.md 4.2): unprivileged callers may only lower `rlim_cur`
/// and `rlim_max` toward the current `rlim_max` ceiling; the SETRLIMIT
/// privilege bypasses this.
pub fn apply_setrlimit(current: Rlimit, requested: Rlimit, has_privilege: bool) -> Result<Rlimit> {
	if has_privilege {
		return Ok(requested);
	}
	if requested.max > current.max || requested.cur > requested.max {
		return Err(Error::EPERM);
	}
	Ok(requested)
}

/// Accumulated CPU time accounting (spec.md 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuTimes {
	pub self_user: u64,
	pub self_system: u64,
	pub children_user: u64,
	pub children_system: u64,
}

/// Exit status (spec.md 4.2): encoded into the high 8 bits (exit code) and
/// low 7 bits (signal number) plus a core-dump bit, of the wait status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
	pub code: u8,
	pub signal: Option<u8>,
	pub core_dumped: bool,
}

impl ExitInfo {
	pub fn exited(code: u8) -> Self {
		Self {
			code,
			signal: None,
			core_dumped: false,
		}
	}

	/// Encode to the wait(2) status word.
	pub fn to_wait_status(self) -> i32 {
		let mut status = (self.code as i32) << 8;
		if let Some(sig) = self.signal {
			status |= (sig as i32) & 0x7f;
			if self.core_dumped {
				status |= 0x80;
			}
		}
		status
	}
}

#[derive(Default)]
struct Inheritance {
	first_child: Option<Pid>,
	next_sibling: Option<Pid>,
}

/// A process control block (spec.md 3).
pub struct Process {
	pub pid: Pid,
	pub parent: Mutex<Option<Pid>>,
	pub state: Mutex<ProcessState>,
	pub name: String,
	pub cred: Mutex<Credentials>,
	pub cwd: Mutex<Option<VnodeRef>>,
	pub root: Mutex<Option<VnodeRef>>,
	pub fds: Mutex<FdTable>,
	pub pgrp: Mutex<Option<Arc<Mutex<ProcessGroup>>>>,
	inheritance: Mutex<Inheritance>,
	pub vm_mm: Arc<VmMm>,
	pub rlimits: Mutex<[Rlimit; RLIMIT_COUNT]>,
	pub times: Mutex<CpuTimes>,
	pub exit: Mutex<Option<ExitInfo>>,
	pub main_thread: Mutex<Option<Tid>>,
}

impl Process {
	pub fn new(pid: Pid, parent: Option<Pid>, name: String, cred: Credentials) -> Self {
		Self {
			pid,
			parent: Mutex::new(parent),
			state: Mutex::new(ProcessState::Initial),
			name,
			cred: Mutex::new(cred),
			cwd: Mutex::new(None),
			root: Mutex::new(None),
			fds: Mutex::new(FdTable::new(256)),
			pgrp: Mutex::new(None),
			inheritance: Mutex::new(Inheritance::default()),
			vm_mm: Arc::new(VmMm::new()),
			rlimits: Mutex::new(default_rlimits()),
			times: Mutex::new(CpuTimes::default()),
			exit: Mutex::new(None),
			main_thread: Mutex::new(None),
		}
	}

	pub fn is_zombie(&self) -> bool {
		*self.state.lock() == ProcessState::Zombie
	}

	/// `times()` (`getrusage`-style accounting): the four accumulated
	/// self/children user/system CPU time fields, as returned by the `TIMES`
	/// syscall (spec.md 6).
	pub fn times(&self) -> CpuTimes {
		*self.times.lock()
	}

	/// Transition to ZOMBIE when the main thread is cleared (spec.md 3):
	/// releases fds and marks exit status, the caller is responsible for
	/// sending SIGCHLD to the parent.
	pub fn clear_main_thread(&self, exit: ExitInfo) {
		*self.main_thread.lock() = None;
		*self.state.lock() = ProcessState::Zombie;
		self.fds.lock().close_all();
		*self.exit.lock() = Some(exit);
	}

	/// `fork()`'s child construction (spec.md 4.2): duplicate, never share,
	/// the parent's mm (COW), fd table, credentials, rlimits, and cwd/root —
	/// the caller still owns linking the result into the parent's child
	/// list and registering it in the process table.
	pub fn fork_from(child_pid: Pid, parent: &Process) -> Result<Self> {
		let vm_mm = parent.vm_mm.fork()?;
		let cred = parent.cred.lock().clone();
		let fds = parent.fds.lock().fork();
		let rlimits = *parent.rlimits.lock();

		let cwd = parent.cwd.lock().clone();
		if let Some(v) = &cwd {
			v.vref()?;
		}
		let root = parent.root.lock().clone();
		if let Some(v) = &root {
			v.vref()?;
		}

		Ok(Self {
			pid: child_pid,
			parent: Mutex::new(Some(parent.pid)),
			state: Mutex::new(ProcessState::Initial),
			name: parent.name.clone(),
			cred: Mutex::new(cred),
			cwd: Mutex::new(cwd),
			root: Mutex::new(root),
			fds: Mutex::new(fds),
			pgrp: Mutex::new(parent.pgrp.lock().clone()),
			inheritance: Mutex::new(Inheritance::default()),
			vm_mm: Arc::new(vm_mm),
			rlimits: Mutex::new(rlimits),
			times: Mutex::new(CpuTimes::default()),
			exit: Mutex::new(None),
			main_thread: Mutex::new(None),
		})
	}
}

/// Thread flags referenced from `sched` as the owning authority on
/// scheduling state; `Thread` carries what's specific to the thread's own
/// identity and kernel-worker inheritance (spec.md 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
	Other,
	Fifo,
	RoundRobin,
	Idle,
}

pub struct Thread {
	pub tid: Tid,
	pub pid_owner: Pid,
	pub policy: Mutex<SchedPolicy>,
	pub errno: Mutex<i32>,
	pub wait_timer: Mutex<Option<Tid>>,
	first_child: Mutex<Option<Tid>>,
	next_sibling: Mutex<Option<Tid>>,
}

impl Thread {
	pub fn new(tid: Tid, pid_owner: Pid) -> Self {
		Self {
			tid,
			pid_owner,
			policy: Mutex::new(SchedPolicy::Other),
			errno: Mutex::new(0),
			wait_timer: Mutex::new(None),
			first_child: Mutex::new(None),
			next_sibling: Mutex::new(None),
		}
	}

	pub fn link_child_thread(&self, child: Tid) {
		let mut first = self.first_child.lock();
		let previous = first.replace(child);
		*self.next_sibling.lock() = previous;
	}
}

/// Child-creation link used by `fork`: attach `child` as `parent`'s new
/// first child under the inheritance lock (spec.md 4.2), chaining the
/// previous first child in as `child`'s next sibling.
pub fn link_child_process(parent: &Process, child: &Process) {
	let mut parent_inh = parent.inheritance.lock();
	let previous_first = parent_inh.first_child.replace(child.pid);
	drop(parent_inh);
	child.inheritance.lock().next_sibling = previous_first;
}

pub fn first_child(parent: &Process) -> Option<Pid> {
	parent.inheritance.lock().first_child
}

pub fn next_sibling(proc: &Process) -> Option<Pid> {
	proc.inheritance.lock().next_sibling
}

/// Splice `child_pid` out of `parent`'s child list (reaping path): patches
/// whichever predecessor pointed at it — `parent`'s own `first_child` if
/// `child_pid` was the head, otherwise that sibling's `next_sibling` — to
/// skip over it. `lookup` resolves a pid to its `Process` via the process
/// table, which this module has no access to itself.
pub fn unlink_child(parent: &Process, child_pid: Pid, lookup: impl Fn(Pid) -> Option<Arc<Process>>) {
	let mut parent_inh = parent.inheritance.lock();
	if parent_inh.first_child == Some(child_pid) {
		parent_inh.first_child = lookup(child_pid).and_then(|c| c.inheritance.lock().next_sibling);
		return;
	}
	let mut cur = parent_inh.first_child;
	drop(parent_inh);
	while let Some(cur_pid) = cur {
		let Some(cur_proc) = lookup(cur_pid) else { return };
		let next = cur_proc.inheritance.lock().next_sibling;
		if next == Some(child_pid) {
			cur_proc.inheritance.lock().next_sibling = lookup(child_pid).and_then(|c| c.inheritance.lock().next_sibling);
			return;
		}
		cur = next;
	}
}

pub fn children_of<'a>(proc_table: &'a [Arc<Process>], parent_pid: Pid) -> Vec<Arc<Process>> {
	proc_table
		.iter()
		.filter(|p| *p.parent.lock() == Some(parent_pid))
		.cloned()
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::proc::cred::Credentials;

	#[test]
	fn exit_info_encodes_wait_status() {
		let exit = ExitInfo::exited(42);
		assert_eq!(exit.to_wait_status(), 42 << 8);
	}

	#[test]
	fn exit_info_encodes_signal_and_core_dump() {
		let exit = ExitInfo {
			code: 0,
			signal: Some(11),
			core_dumped: true,
		};
		let status = exit.to_wait_status();
		assert_eq!(status & 0x7f, 11);
		assert_eq!(status & 0x80, 0x80);
	}

	#[test]
	fn setrlimit_unprivileged_cannot_raise_ceiling() {
		let current = Rlimit { cur: 10, max: 10 };
		let requested = Rlimit { cur: 20, max: 20 };
		assert_eq!(apply_setrlimit(current, requested, false), Err(Error::EPERM));
	}

	#[test]
	fn setrlimit_privileged_may_raise_ceiling() {
		let current = Rlimit { cur: 10, max: 10 };
		let requested = Rlimit { cur: 20, max: 20 };
		assert_eq!(apply_setrlimit(current, requested, true), Ok(requested));
	}

	#[test]
	fn clear_main_thread_zombifies_process() {
		let p = Process::new(Pid(5), Some(Pid(1)), String::from("child"), Credentials::root());
		p.clear_main_thread(ExitInfo::exited(7));
		assert!(p.is_zombie());
		assert_eq!(p.exit.lock().unwrap().code, 7);
	}
}
