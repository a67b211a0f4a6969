// SPDX-License-Identifier: GPL-2.0

//! Block device backing the FAT and ramfs filesystems (spec.md 4.6).
//!
//! Keyboard/serial/network peripheral drivers are CPU bring-up concerns
//! (spec.md 1 Non-goals); this crate carries only the one device type the
//! kernel's filesystems actually mount against: a block device, here
//! backed by RAM rather than real storage hardware.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod ramdisk;

pub use ramdisk::RamDisk;
