// SPDX-License-Identifier: GPL-2.0

//! Kernel console output sink.
//!
//! CPU/peripheral bring-up (VGA text mode, serial UART) is out of scope
//! (spec.md Non-goals): this module is reduced to the minimal text sink
//! `kernel::logging` and the `print!`/`kprintln!` macros need. It keeps the
//! last `CAPTURE_LINES` lines in a ring buffer so host tests can assert on
//! what the kernel printed without a real display attached.

use alloc::collections::VecDeque;
use alloc::string::String;
use core::fmt::{self, Write};

use crate::error::Result;
use crate::sync::Spinlock;

const CAPTURE_LINES: usize = 256;

struct Console {
	initialized: bool,
	line: String,
	history: VecDeque<String>,
}

impl Console {
	const fn new() -> Self {
		Self {
			initialized: false,
			line: String::new(),
			history: VecDeque::new(),
		}
	}

	fn write_str(&mut self, s: &str) {
		for ch in s.chars() {
			if ch == '\n' {
				self.flush_line();
			} else {
				self.line.push(ch);
			}
		}
	}

	fn flush_line(&mut self) {
		let finished = core::mem::take(&mut self.line);
		#[cfg(test)]
		std::println!("{finished}");
		if self.history.len() >= CAPTURE_LINES {
			self.history.pop_front();
		}
		self.history.push_back(finished);
	}
}

static CONSOLE: Spinlock<Console> = Spinlock::new(Console::new());

/// Mark the console ready for output. Idempotent.
pub fn init() -> Result<()> {
	CONSOLE.lock().initialized = true;
	Ok(())
}

struct ConsoleWriter<'a>(&'a mut Console);

impl Write for ConsoleWriter<'_> {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		self.0.write_str(s);
		Ok(())
	}
}

pub fn _print(args: fmt::Arguments) {
	let mut console = CONSOLE.lock();
	let mut writer = ConsoleWriter(&mut console);
	let _ = writer.write_fmt(args);
}

pub fn _kprint(args: fmt::Arguments) {
	_print(args);
}

/// Write a complete string directly, bypassing formatting.
pub fn write_str(s: &str) {
	CONSOLE.lock().write_str(s);
}

/// Snapshot of the most recent captured output lines, oldest first. Used by
/// tests that need to assert a log line was emitted.
pub fn history_snapshot() -> alloc::vec::Vec<String> {
	CONSOLE.lock().history.iter().cloned().collect()
}

/// Discard any buffered output. Used between test cases.
pub fn clear() {
	let mut console = CONSOLE.lock();
	console.line.clear();
	console.history.clear();
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloc::string::ToString;

	#[test]
	fn write_str_splits_on_newline() {
		clear();
		write_str("hello\nworld\n");
		let lines = history_snapshot();
		assert_eq!(lines, alloc::vec!["hello".to_string(), "world".to_string()]);
	}

	#[test]
	fn partial_line_not_captured_until_newline() {
		clear();
		write_str("partial");
		assert!(history_snapshot().is_empty());
		write_str("\n");
		assert_eq!(history_snapshot(), alloc::vec!["partial".to_string()]);
	}
}
