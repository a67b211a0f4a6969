// SPDX-License-Identifier: GPL-2.0

//! Kernel subsystem bring-up, in dependency order: console before anything
//! that might log, the VFS registry and its filesystem drivers before the
//! first mount, the scheduler's idle thread before the first context
//! switch, sysctl last since its static tree wants the other subsystems'
//! nodes already registered.
//!
//! There's no `kernel_main`/main loop here: driving the tick handler and
//! the context switcher from a real timer interrupt is CPU bring-up
//! (spec.md 1 Non-goals). [`boot`] is the entry point a freestanding
//! caller (arch-specific bootstrap, or a test harness) invokes once; the
//! periodic side (`sched::tick`, abort delivery) is driven by that caller,
//! not by this crate.

use crate::error::Result;

/// Bring up every kernel subsystem in the order later stages depend on.
/// Idempotent: re-running it before a fresh test or simulated boot just
/// re-registers the same filesystems and resets the scheduler's idle
/// thread.
pub fn boot() -> Result<()> {
	crate::console::init()?;
	crate::console::write_str("[*] Initializing kernel subsystems...\n");

	crate::fs::register_filesystems()?;
	crate::console::write_str("    - VFS + ramfs + FAT registered\n");

	crate::sched::init();
	crate::console::write_str("    - Scheduler idle thread ready\n");

	crate::sysctl::init()?;
	crate::console::write_str("    - sysctl tree ready\n");

	crate::console::write_str("[+] Kernel initialization complete\n");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn boot_is_idempotent() {
		boot().unwrap();
		boot().unwrap();
	}
}
