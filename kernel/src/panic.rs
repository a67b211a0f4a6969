// SPDX-License-Identifier: GPL-2.0

//! Kernel panic handler.
//!
//! Disabling interrupts, walking the call stack through a frame pointer,
//! and writing to a VGA/serial sink are all CPU bring-up (spec.md 1
//! Non-goals read together with `console.rs`'s text-sink reduction): the
//! handler below logs through [`crate::console`] and halts with a portable
//! spin loop instead. It only compiles for non-test builds — the test
//! harness links `std` and supplies its own panic handler, and defining a
//! second one would conflict with it.

#![cfg(not(test))]

use core::panic::PanicInfo;

#[panic_handler]
fn panic_handler(info: &PanicInfo) -> ! {
	crate::console::write_str("\n\n=== KERNEL PANIC ===\n");

	if let Some(location) = info.location() {
		crate::kprintln!("panic at {}:{}:{}", location.file(), location.line(), location.column());
	}
	crate::kprintln!("{}", info.message());

	loop {
		core::hint::spin_loop();
	}
}
