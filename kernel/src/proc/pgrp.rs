// SPDX-License-Identifier: GPL-2.0

//! Process groups and sessions — spec.md 3, 4.2.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::sync::{Mutex, Spinlock};
use crate::types::Pid;

/// Bounded login-name length (spec.md 3: "a login name (bounded length)").
pub const LOGIN_NAME_MAX: usize = 32;

pub struct Session {
	pub sid: Pid,
	pub leader: Pid,
	pub controlling_tty: Option<i32>,
	pub login_name: String,
}

pub struct ProcessGroup {
	pub pgid: Pid,
	pub session: Arc<Mutex<Session>>,
	pub members: Vec<Pid>,
}

struct Registry {
	groups: BTreeMap<Pid, Arc<Mutex<ProcessGroup>>>,
	sessions: BTreeMap<Pid, Arc<Mutex<Session>>>,
}

impl Registry {
	const fn new() -> Self {
		Self {
			groups: BTreeMap::new(),
			sessions: BTreeMap::new(),
		}
	}
}

static REGISTRY: Spinlock<Registry> = Spinlock::new(Registry::new());

pub(crate) fn truncate_login(name: &str) -> String {
	let mut s = String::with_capacity(LOGIN_NAME_MAX);
	for ch in name.chars().take(LOGIN_NAME_MAX) {
		s.push(ch);
	}
	s
}

/// `setsid()` (spec.md 4.2): the caller must not already be a process-group
/// leader (best-effort: the caller supplies its current pgid to check
/// against). Creates a new session and group with the caller as leader,
/// copying the previous login name.
pub fn setsid(pid: Pid, previous_login: &str) -> Result<(Arc<Mutex<ProcessGroup>>, Arc<Mutex<Session>>)> {
	let mut reg = REGISTRY.lock();
	if reg.groups.contains_key(&pid) {
		return Err(Error::EPERM);
	}
	let session = Arc::new(Mutex::new(Session {
		sid: pid,
		leader: pid,
		controlling_tty: None,
		login_name: truncate_login(previous_login),
	}));
	let group = Arc::new(Mutex::new(ProcessGroup {
		pgid: pid,
		session: session.clone(),
		members: alloc::vec![pid],
	}));
	reg.sessions.insert(pid, session.clone());
	reg.groups.insert(pid, group.clone());
	Ok((group, session))
}

/// `setpgid(pid, pgid)` (spec.md 4.2). `target_pid` must be the caller or an
/// un-exec'd child in the same session (enforced by the caller, which holds
/// the process table); this function only handles group creation/lookup
/// once that check has passed. `session_of_target` must be the session the
/// target currently belongs to. A session leader cannot be moved.
pub fn setpgid(
	target_pid: Pid,
	pgid: Pid,
	session_of_target: &Arc<Mutex<Session>>,
	target_is_session_leader: bool,
) -> Result<Arc<Mutex<ProcessGroup>>> {
	if target_is_session_leader {
		return Err(Error::EPERM);
	}
	let mut reg = REGISTRY.lock();
	let effective_pgid = if pgid.0 == 0 { target_pid } else { pgid };

	if let Some(existing) = reg.groups.get(&effective_pgid) {
		let same_session = Arc::ptr_eq(&existing.lock().session, session_of_target);
		if !same_session {
			return Err(Error::EPERM);
		}
		existing.lock().members.push(target_pid);
		return Ok(existing.clone());
	}

	if pgid.0 != 0 && pgid != target_pid {
		// A new group may only be created with id == target pid.
		return Err(Error::EPERM);
	}

	let group = Arc::new(Mutex::new(ProcessGroup {
		pgid: effective_pgid,
		session: session_of_target.clone(),
		members: alloc::vec![target_pid],
	}));
	reg.groups.insert(effective_pgid, group.clone());
	Ok(group)
}

pub fn group(pgid: Pid) -> Option<Arc<Mutex<ProcessGroup>>> {
	REGISTRY.lock().groups.get(&pgid).cloned()
}

pub fn session(sid: Pid) -> Option<Arc<Mutex<Session>>> {
	REGISTRY.lock().sessions.get(&sid).cloned()
}

pub fn remove_group(pgid: Pid) {
	REGISTRY.lock().groups.remove(&pgid);
}

pub fn remove_session(sid: Pid) {
	REGISTRY.lock().sessions.remove(&sid);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn setsid_makes_caller_leader_of_new_session_and_group() {
		let (group, session) = setsid(Pid(10), "alice").unwrap();
		assert_eq!(group.lock().pgid, Pid(10));
		assert_eq!(session.lock().leader, Pid(10));
		assert_eq!(session.lock().login_name, "alice");
	}

	#[test]
	fn setsid_twice_for_existing_group_leader_fails() {
		setsid(Pid(20), "bob").unwrap();
		assert_eq!(setsid(Pid(20), "bob").err(), Some(Error::EPERM));
	}

	#[test]
	fn setpgid_zero_creates_group_named_after_target() {
		let (_, session) = setsid(Pid(30), "carol").unwrap();
		let group = setpgid(Pid(31), Pid(0), &session, false).unwrap();
		assert_eq!(group.lock().pgid, Pid(31));
	}

	#[test]
	fn setpgid_on_session_leader_is_rejected() {
		let (_, session) = setsid(Pid(40), "dave").unwrap();
		assert_eq!(setpgid(Pid(40), Pid(0), &session, true).err(), Some(Error::EPERM));
	}
}
