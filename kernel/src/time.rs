// SPDX-License-Identifier: GPL-2.0

//! Jiffies, wall-clock time and the per-thread wait-timer list the
//! scheduler's `sleep`/`wake` and `wait(2)`'s timeout rely on.
//!
//! TSC/PIT/RTC calibration and a general-purpose multi-level timer wheel are
//! CPU bring-up concerns (spec.md Non-goals): a hosted kernel has no
//! hardware clock to calibrate against, so `jiffies` only advances when
//! `update_jiffies()` is called (by the scheduler tick in a real build, or
//! directly by tests).

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::sync::Spinlock;
use crate::types::{Jiffies, Tid};

/// Scheduler tick frequency in Hz (spec.md 4.3 load-average windows are
/// expressed in seconds against this).
pub const HZ: u64 = 1000;

pub const NSEC_PER_SEC: u64 = 1_000_000_000;
pub const NSEC_PER_MSEC: u64 = 1_000_000;
pub const NSEC_PER_USEC: u64 = 1_000;
pub const NSEC_PER_JIFFY: u64 = NSEC_PER_SEC / HZ;

static JIFFIES_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Wall-clock time, Linux `timespec`-compatible in shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSpec {
	pub tv_sec: i64,
	pub tv_nsec: i64,
}

impl TimeSpec {
	pub const fn new(sec: i64, nsec: i64) -> Self {
		Self {
			tv_sec: sec,
			tv_nsec: nsec,
		}
	}

	pub const fn zero() -> Self {
		Self::new(0, 0)
	}

	pub fn to_ns(&self) -> u64 {
		(self.tv_sec as u64 * NSEC_PER_SEC) + self.tv_nsec as u64
	}

	pub fn from_ns(ns: u64) -> Self {
		Self::new((ns / NSEC_PER_SEC) as i64, (ns % NSEC_PER_SEC) as i64)
	}
}

/// Current jiffies count.
pub fn get_jiffies() -> Jiffies {
	Jiffies(JIFFIES_COUNTER.load(Ordering::Relaxed))
}

/// Advance jiffies by one tick. Called from the scheduler tick.
pub fn update_jiffies() {
	JIFFIES_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Monotonic time since the jiffies counter started.
pub fn monotonic_time() -> TimeSpec {
	TimeSpec::from_ns(get_jiffies().0 * NSEC_PER_JIFFY)
}

pub fn ns_to_jiffies(ns: u64) -> Jiffies {
	Jiffies(ns / NSEC_PER_JIFFY)
}

pub fn jiffies_to_ns(jiffies: Jiffies) -> u64 {
	jiffies.0 * NSEC_PER_JIFFY
}

pub fn msecs_to_jiffies(ms: u64) -> Jiffies {
	ns_to_jiffies(ms * NSEC_PER_MSEC)
}

pub fn jiffies_to_msecs(jiffies: Jiffies) -> u64 {
	jiffies_to_ns(jiffies) / NSEC_PER_MSEC
}

pub fn secs_to_jiffies(s: u64) -> Jiffies {
	Jiffies(s * HZ)
}

/// A thread parked on a timeout: `wait(2)`'s child-reaping poll loop
/// (spec.md 4.2, "wait with a 1-second timer") and the scheduler's sleep
/// queue both register one of these and get woken on expiry.
#[derive(Debug, Clone, Copy)]
pub struct WaitTimer {
	pub tid: Tid,
	pub expires: Jiffies,
}

struct WaitTimerList {
	timers: Vec<WaitTimer>,
}

impl WaitTimerList {
	const fn new() -> Self {
		Self { timers: Vec::new() }
	}
}

static WAIT_TIMERS: Spinlock<WaitTimerList> = Spinlock::new(WaitTimerList::new());

/// Register a wait timer for `tid` expiring `jiffies_from_now` ticks in the
/// future.
pub fn arm_wait_timer(tid: Tid, jiffies_from_now: u64) {
	let expires = get_jiffies() + jiffies_from_now;
	WAIT_TIMERS.lock().timers.push(WaitTimer { tid, expires });
}

/// Cancel any wait timer registered for `tid` (called when the thread is
/// woken by something other than the timeout).
pub fn disarm_wait_timer(tid: Tid) {
	WAIT_TIMERS.lock().timers.retain(|t| t.tid != tid);
}

/// Drain and return the timers that have expired as of the current
/// jiffies value. Called from the scheduler tick.
pub fn expire_wait_timers() -> Vec<WaitTimer> {
	let now = get_jiffies();
	let mut list = WAIT_TIMERS.lock();
	let mut expired = Vec::new();
	list.timers.retain(|t| {
		if t.expires <= now {
			expired.push(*t);
			false
		} else {
			true
		}
	});
	expired
}
