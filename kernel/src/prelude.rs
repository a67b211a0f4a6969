// SPDX-License-Identifier: GPL-2.0

//! Kernel prelude - commonly used types and traits

pub use alloc::vec;
pub use alloc::{
	boxed::Box,
	collections::{BTreeMap, BTreeSet},
	format,
	string::{String, ToString},
	sync::Arc,
	vec::Vec,
};
pub use core::{
	fmt, mem,
	option::Option::{self, None, Some},
	ptr,
	result::Result as CoreResult,
	slice, str,
};

pub use crate::device::{BlockDevice, DeviceNumber};
pub use crate::error::{Error, Result};
pub use crate::memory::{PhysAddr, VirtAddr};
pub use crate::proc::process::{Process, Thread};
pub use crate::sync::{Mutex, RwLock, Spinlock};
pub use crate::types::*;

/// Print macros for kernel logging
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ($crate::console::_kprint(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("[KERNEL] {}\n", format_args!($($arg)*)));
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "debug")]
        $crate::kprintln!("[DEBUG] {}", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ($crate::kprintln!("[INFO] {}", format_args!($($arg)*)));
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ($crate::kprintln!("[WARN] {}", format_args!($($arg)*)));
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ($crate::kprintln!("[ERROR] {}", format_args!($($arg)*)));
}
