// SPDX-License-Identifier: GPL-2.0

//! The process table: pid allocation, the current-process pointer, and the
//! `fork`/`wait`/`exit` primitives built on [`process`], [`pgrp`], and
//! [`cred`] (spec.md 3, 4.2).
//!
//! There's no signal-delivery subsystem here (it isn't one of the named
//! components): a parent discovers a child's death by polling
//! [`Process::is_zombie`] through [`wait`] rather than through a queued
//! SIGCHLD. A blocking `wait` call is modeled by `wait` returning
//! [`Error::EWOULDBLOCK`] when the target isn't ready yet; the scheduler's
//! syscall dispatch loop is expected to re-arm a one-second
//! [`crate::time::WaitTimer`] and retry, the same shape as the "timed
//! sigtimedwait, then recheck" loop described for a blocking wait.

pub mod cred;
pub mod pgrp;
pub mod process;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::proc::cred::{priv_check, Credentials, Privilege};
use crate::proc::pgrp::Session;
use crate::proc::process::{
	first_child, link_child_process, next_sibling, unlink_child, ExitInfo, Process, Rlimit, RlimitResource,
	SchedPolicy, Thread,
};
use crate::sync::{Mutex, Spinlock};
use crate::types::{Gid, Pid, Uid, INIT_PID, MAXPROC};

struct Table {
	processes: BTreeMap<Pid, Arc<Process>>,
	next_pid: u32,
}

impl Table {
	const fn new() -> Self {
		Self {
			processes: BTreeMap::new(),
			next_pid: INIT_PID.0 + 1,
		}
	}
}

static TABLE: Spinlock<Table> = Spinlock::new(Table::new());
static CURRENT: Spinlock<Option<Pid>> = Spinlock::new(None);

/// Allocate the next unused pid, wrapping past `MAXPROC` back to the first
/// id above `INIT_PID` and skipping anything still live.
pub fn allocate_pid() -> Result<Pid> {
	let mut table = TABLE.lock();
	if table.processes.len() as u32 >= MAXPROC {
		return Err(Error::EWOULDBLOCK);
	}
	let start = table.next_pid;
	loop {
		let candidate = Pid(table.next_pid);
		table.next_pid = table.next_pid.wrapping_add(1);
		if table.next_pid == 0 || table.next_pid <= INIT_PID.0 {
			table.next_pid = INIT_PID.0 + 1;
		}
		if !table.processes.contains_key(&candidate) {
			return Ok(candidate);
		}
		if table.next_pid == start {
			return Err(Error::EWOULDBLOCK);
		}
	}
}

fn register_process(proc: Arc<Process>) {
	TABLE.lock().processes.insert(proc.pid, proc);
}

pub fn find_process(pid: Pid) -> Option<Arc<Process>> {
	TABLE.lock().processes.get(&pid).cloned()
}

fn remove_process(pid: Pid) -> Option<Arc<Process>> {
	TABLE.lock().processes.remove(&pid)
}

/// A point-in-time copy of every live process, for scans that can't hold
/// the table lock across per-process locking (child-list walks, `wait`).
pub fn snapshot() -> Vec<Arc<Process>> {
	TABLE.lock().processes.values().cloned().collect()
}

pub fn current_process_pid() -> Option<Pid> {
	*CURRENT.lock()
}

pub fn current_process() -> Option<Arc<Process>> {
	current_process_pid().and_then(find_process)
}

/// Called by the scheduler's context switch when it installs a new running
/// thread's owning process as the current one.
pub fn set_current_process(pid: Option<Pid>) {
	*CURRENT.lock() = pid;
}

/// Construct and register a parentless process (used once, for `init` at
/// boot). Anything else reaches the table through [`fork`].
pub fn spawn_init(cred: Credentials) -> Result<Arc<Process>> {
	let pid = allocate_pid()?;
	let proc = Arc::new(Process::new(pid, None, alloc::string::String::from("init"), cred));
	register_process(proc.clone());
	Ok(proc)
}

/// Walk `parent`'s intrusive child list (threaded through each child's own
/// `next_sibling`), head first — this is the order a `pid == -1` wait scans.
fn child_pids(parent: &Process) -> Vec<Pid> {
	let mut out = Vec::new();
	let mut cur = first_child(parent);
	while let Some(pid) = cur {
		out.push(pid);
		cur = find_process(pid).and_then(|p| next_sibling(&p));
	}
	out
}

/// `fork()` (spec.md 4.2): gated on `PROC_FORK`, duplicates the calling
/// process's mm/fds/credentials/rlimits/cwd/root, links the result into the
/// parent's child list, and registers it. Returns the child to the caller;
/// the syscall layer decides what each side's return value looks like (pid
/// to the parent, 0 to the child) once it resumes the child thread.
pub fn fork(parent: &Arc<Process>) -> Result<Arc<Process>> {
	{
		let cred = parent.cred.lock();
		priv_check(&cred, Privilege::PROC_FORK)?;
	}
	let child_pid = allocate_pid()?;
	let child = Arc::new(Process::fork_from(child_pid, parent)?);
	link_child_process(parent, &child);
	register_process(child.clone());
	Ok(child)
}

bitflags::bitflags! {
	/// `wait(2)` option bits (spec.md 4.2).
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct WaitOptions: u32 {
		const WNOHANG = 1 << 0;
		const WNOWAIT = 1 << 1;
	}
}

/// Result of a `wait()` call that didn't error out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
	/// A zombie child was found and (unless `WNOWAIT`) reaped.
	Reaped { pid: Pid, status: i32 },
	/// `WNOHANG` was set and no eligible child has exited yet.
	NoHang,
}

/// `wait(options, pid)` (spec.md 4.2). `pid > 0` targets a specific child;
/// `pid == -1` takes the first zombie found walking the child list; `pid ==
/// 0` and `pid < -1` (process-group targeting) are left unimplemented and
/// always fail `ENOTSUP`, which spec.md 4.2 permits.
pub fn wait(parent: &Arc<Process>, pid: i32, options: WaitOptions) -> Result<WaitOutcome> {
	if pid == 0 || pid < -1 {
		return Err(Error::ENOTSUP);
	}

	let kids = child_pids(parent);
	if kids.is_empty() {
		return Err(Error::ECHILD);
	}

	let target = if pid > 0 {
		let want = Pid(pid as u32);
		if !kids.contains(&want) {
			return Err(Error::ECHILD);
		}
		find_process(want).ok_or(Error::ECHILD)?
	} else {
		let zombie = kids.iter().filter_map(|p| find_process(*p)).find(|c| c.is_zombie());
		match zombie {
			Some(z) => z,
			None => {
				return if options.contains(WaitOptions::WNOHANG) {
					Ok(WaitOutcome::NoHang)
				} else {
					Err(Error::EWOULDBLOCK)
				};
			}
		}
	};

	if !target.is_zombie() {
		return if options.contains(WaitOptions::WNOHANG) {
			Ok(WaitOutcome::NoHang)
		} else {
			Err(Error::EWOULDBLOCK)
		};
	}

	let status = (*target.exit.lock()).map(|e| e.to_wait_status()).unwrap_or(0);

	if !options.contains(WaitOptions::WNOWAIT) {
		let child_times = *target.times.lock();
		let mut parent_times = parent.times.lock();
		parent_times.children_user += child_times.self_user + child_times.children_user;
		parent_times.children_system += child_times.self_system + child_times.children_system;
		drop(parent_times);
		unlink_child(parent, target.pid, find_process);
		remove_process(target.pid);
	}

	Ok(WaitOutcome::Reaped { pid: target.pid, status })
}

/// `exit()` (spec.md 4.2): zombifies `proc` (closing its fd table and
/// recording `info`) and reparents every surviving child to `init`. The
/// process itself stays in the table as a zombie until its parent reaps it
/// through [`wait`].
pub fn exit_process(proc: &Arc<Process>, info: ExitInfo) {
	proc.clear_main_thread(info);
	reparent_children_to_init(proc.pid);
}

/// Orphan adoption (spec.md 4.2): every child of `dying_pid` is reparented
/// to pid 1, under both the child's own parent-pointer lock and `init`'s
/// child-list lock.
fn reparent_children_to_init(dying_pid: Pid) {
	let Some(init) = find_process(INIT_PID) else { return };
	for child in snapshot().into_iter().filter(|p| *p.parent.lock() == Some(dying_pid)) {
		*child.parent.lock() = Some(INIT_PID);
		link_child_process(&init, &child);
	}
}

/// `setrlimit` (spec.md 4.2): unprivileged callers may only lower the
/// ceiling; `SETRLIMIT` bypasses the check.
pub fn do_setrlimit(proc: &Process, resource: RlimitResource, requested: Rlimit) -> Result<()> {
	let has_privilege = priv_check(&proc.cred.lock(), Privilege::SETRLIMIT).is_ok();
	let mut limits = proc.rlimits.lock();
	let idx = resource as usize;
	let applied = process::apply_setrlimit(limits[idx], requested, has_privilege)?;
	limits[idx] = applied;
	Ok(())
}

pub fn getpid(proc: &Process) -> Pid {
	proc.pid
}

pub fn getppid(proc: &Process) -> Option<Pid> {
	*proc.parent.lock()
}

/// `setsid()` (spec.md 4.2): creates a new session/group with `proc` as
/// leader, copying the login name of whatever session it's leaving.
pub fn do_setsid(proc: &Process) -> Result<Pid> {
	let previous_login = proc
		.pgrp
		.lock()
		.as_ref()
		.map(|g| g.lock().session.lock().login_name.clone())
		.unwrap_or_default();
	let (group, _session) = pgrp::setsid(proc.pid, &previous_login)?;
	*proc.pgrp.lock() = Some(group);
	Ok(proc.pid)
}

/// `setpgid(pid, pgid)` (spec.md 4.2): `target` must be the caller or an
/// un-exec'd child in the same session (enforced by the caller, which holds
/// the process table) and must not be a session leader.
pub fn do_setpgid(target: &Process, pgid: Pid) -> Result<()> {
	let current_group = target.pgrp.lock().clone().ok_or(Error::EINVAL)?;
	let session = current_group.lock().session.clone();
	let is_leader = session.lock().leader == target.pid;
	let group = pgrp::setpgid(target.pid, pgid, &session, is_leader)?;
	*target.pgrp.lock() = Some(group);
	Ok(())
}

pub fn getpgrp(proc: &Process) -> Option<Pid> {
	proc.pgrp.lock().as_ref().map(|g| g.lock().pgid)
}

pub fn getsid(proc: &Process) -> Option<Pid> {
	proc.pgrp.lock().as_ref().map(|g| g.lock().session.lock().sid)
}

pub fn getlogin(proc: &Process) -> Option<alloc::string::String> {
	proc.pgrp.lock().as_ref().map(|g| g.lock().session.lock().login_name.clone())
}

/// `setlogin` (spec.md 4.2): privileged (`PROC_SETLOGIN`); sets the login
/// name on the caller's whole session, not just the caller.
pub fn do_setlogin(proc: &Process, name: &str) -> Result<()> {
	priv_check(&proc.cred.lock(), Privilege::PROC_SETLOGIN)?;
	let group = proc.pgrp.lock().clone().ok_or(Error::EINVAL)?;
	let session: Arc<Mutex<Session>> = group.lock().session.clone();
	session.lock().login_name = pgrp::truncate_login(name);
	Ok(())
}

/// Child uid/gid used when a process's credentials aren't yet known to the
/// caller (e.g. `chkperm` fallbacks outside any process context).
pub fn anonymous_credentials() -> Credentials {
	Credentials::unprivileged(Uid(0), Gid(0))
}

/// The real/effective/saved uid and gid, as a single value (spec.md 6
/// `CRED`, "combined get/set uid/gid triples").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredTriple {
	pub uid: Uid,
	pub euid: Uid,
	pub suid: Uid,
	pub gid: Gid,
	pub egid: Gid,
	pub sgid: Gid,
}

pub fn get_cred(proc: &Process) -> CredTriple {
	let cred = proc.cred.lock();
	CredTriple {
		uid: cred.uid,
		euid: cred.euid,
		suid: cred.suid,
		gid: cred.gid,
		egid: cred.egid,
		sgid: cred.sgid,
	}
}

/// `CRED` (set half): an unprivileged caller may only rotate its own
/// existing real/effective/saved values among themselves (BSD `setresuid`
/// rule); root may set any triple.
pub fn set_cred(proc: &Process, requested: CredTriple) -> Result<()> {
	let mut cred = proc.cred.lock();
	if !cred.is_root() {
		let uid_allowed = |v: Uid| v == cred.uid || v == cred.euid || v == cred.suid;
		let gid_allowed = |v: Gid| v == cred.gid || v == cred.egid || v == cred.sgid;
		if !(uid_allowed(requested.uid) && uid_allowed(requested.euid) && uid_allowed(requested.suid)) {
			return Err(Error::EPERM);
		}
		if !(gid_allowed(requested.gid) && gid_allowed(requested.egid) && gid_allowed(requested.sgid)) {
			return Err(Error::EPERM);
		}
	}
	cred.uid = requested.uid;
	cred.euid = requested.euid;
	cred.suid = requested.suid;
	cred.gid = requested.gid;
	cred.egid = requested.egid;
	cred.sgid = requested.sgid;
	Ok(())
}

/// `GETGROUPS` (spec.md 6).
pub fn get_groups(proc: &Process) -> Vec<Gid> {
	proc.cred.lock().groups.clone()
}

/// `SETGROUPS` (spec.md 6): only root may replace the supplementary group
/// list.
pub fn set_groups(proc: &Process, groups: Vec<Gid>) -> Result<()> {
	let mut cred = proc.cred.lock();
	if !cred.is_root() {
		return Err(Error::EPERM);
	}
	cred.groups = groups;
	Ok(())
}

/// `SETPOLICY` (spec.md 4.1): the caller must hold the target thread's
/// effective uid or the `SCHED_SETPOLICY` privilege.
pub fn do_setpolicy(cred: &Credentials, target_euid: Uid, target: &Thread, policy: SchedPolicy) -> Result<()> {
	if cred.euid != target_euid {
		priv_check(cred, Privilege::SCHED_SETPOLICY)?;
	}
	*target.policy.lock() = policy;
	Ok(())
}

/// `GETPOLICY` (spec.md 4.1).
pub fn get_policy(target: &Thread) -> SchedPolicy {
	*target.policy.lock()
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloc::string::String;

	fn reset_table() {
		let mut table = TABLE.lock();
		table.processes.clear();
		table.next_pid = INIT_PID.0 + 1;
		drop(table);
		*CURRENT.lock() = None;
	}

	#[test]
	fn allocate_pid_skips_reserved_ids_and_increments() {
		reset_table();
		let a = allocate_pid().unwrap();
		let b = allocate_pid().unwrap();
		assert!(a.0 > INIT_PID.0);
		assert_ne!(a, b);
	}

	#[test]
	fn fork_requires_proc_fork_privilege() {
		reset_table();
		let parent = Arc::new(Process::new(allocate_pid().unwrap(), None, String::from("p"), Credentials::unprivileged(Uid(1000), Gid(1000))));
		register_process(parent.clone());
		assert_eq!(fork(&parent).err(), Some(Error::EPERM));
	}

	#[test]
	fn fork_links_child_and_wait_reaps_it() {
		reset_table();
		let parent = Arc::new(Process::new(allocate_pid().unwrap(), None, String::from("p"), Credentials::root()));
		register_process(parent.clone());

		let child = fork(&parent).unwrap();
		assert_eq!(*child.parent.lock(), Some(parent.pid));
		assert_eq!(wait(&parent, -1, WaitOptions::WNOHANG).unwrap(), WaitOutcome::NoHang);

		exit_process(&child, ExitInfo::exited(3));
		match wait(&parent, child.pid.0 as i32, WaitOptions::empty()).unwrap() {
			WaitOutcome::Reaped { pid, status } => {
				assert_eq!(pid, child.pid);
				assert_eq!(status, 3 << 8);
			}
			other => panic!("expected Reaped, got {other:?}"),
		}
		assert!(find_process(child.pid).is_none());
	}

	#[test]
	fn wait_on_non_child_pid_is_echild() {
		reset_table();
		let parent = Arc::new(Process::new(allocate_pid().unwrap(), None, String::from("p"), Credentials::root()));
		register_process(parent.clone());
		let stranger = Arc::new(Process::new(allocate_pid().unwrap(), None, String::from("s"), Credentials::root()));
		register_process(stranger.clone());
		assert_eq!(wait(&parent, stranger.pid.0 as i32, WaitOptions::empty()).err(), Some(Error::ECHILD));
	}

	#[test]
	fn wait_with_pgid_target_is_not_supported() {
		reset_table();
		let parent = Arc::new(Process::new(allocate_pid().unwrap(), None, String::from("p"), Credentials::root()));
		register_process(parent.clone());
		assert_eq!(wait(&parent, 0, WaitOptions::empty()).err(), Some(Error::ENOTSUP));
		assert_eq!(wait(&parent, -2, WaitOptions::empty()).err(), Some(Error::ENOTSUP));
	}

	#[test]
	fn exit_reparents_surviving_grandchildren_to_init() {
		reset_table();
		let init = Arc::new(Process::new(INIT_PID, None, String::from("init"), Credentials::root()));
		register_process(init.clone());
		let parent = Arc::new(Process::new(allocate_pid().unwrap(), Some(INIT_PID), String::from("p"), Credentials::root()));
		register_process(parent.clone());
		link_child_process(&init, &parent);

		let child = fork(&parent).unwrap();
		exit_process(&parent, ExitInfo::exited(0));

		assert_eq!(*child.parent.lock(), Some(INIT_PID));
		assert!(child_pids(&init).contains(&child.pid));
	}

	#[test]
	fn unprivileged_cred_may_only_rotate_existing_values() {
		let p = Process::new(Pid(9), None, String::from("p"), Credentials::unprivileged(Uid(10), Gid(10)));
		let swapped = CredTriple {
			uid: Uid(10),
			euid: Uid(10),
			suid: Uid(10),
			gid: Gid(10),
			egid: Gid(10),
			sgid: Gid(10),
		};
		assert!(set_cred(&p, swapped).is_ok());
		let foreign = CredTriple { uid: Uid(99), ..swapped };
		assert_eq!(set_cred(&p, foreign).err(), Some(Error::EPERM));
	}

	#[test]
	fn setgroups_requires_root() {
		let p = Process::new(Pid(9), None, String::from("p"), Credentials::unprivileged(Uid(10), Gid(10)));
		assert_eq!(set_groups(&p, alloc::vec![Gid(1)]).err(), Some(Error::EPERM));
		let root_proc = Process::new(Pid(10), None, String::from("r"), Credentials::root());
		assert!(set_groups(&root_proc, alloc::vec![Gid(1)]).is_ok());
		assert_eq!(get_groups(&root_proc), alloc::vec![Gid(1)]);
	}

	#[test]
	fn setpolicy_requires_ownership_or_privilege() {
		let thread = Thread::new(crate::types::Tid(1), Pid(9));
		let owner = Credentials::unprivileged(Uid(10), Gid(10));
		let stranger = Credentials::unprivileged(Uid(20), Gid(20));
		assert_eq!(do_setpolicy(&stranger, Uid(10), &thread, SchedPolicy::Fifo).err(), Some(Error::EPERM));
		assert!(do_setpolicy(&owner, Uid(10), &thread, SchedPolicy::Fifo).is_ok());
		assert_eq!(get_policy(&thread), SchedPolicy::Fifo);
	}
}
