// SPDX-License-Identifier: GPL-2.0

//! MMU abstraction (spec.md 2, "MMU abstraction"; 4.3 "Access-permission
//! translation").
//!
//! A real MMU page-table format (ARM short-descriptor, x86_64 4-level, ...)
//! is CPU bring-up (spec.md Non-goals). What the rest of the kernel needs
//! from "the MMU" is: a per-process table translating virtual to physical
//! pages, and an access-permission lattice that `vm_updateusr_ap` walks.
//! Both are modeled here in software, over a `BTreeMap` keyed by page
//! number, which keeps `memory::mm`/`memory::fault`/`memory::copy` fully
//! testable on the host while preserving the shape (descriptor carries
//! vaddr/paddr/size/AP/execute-never/page-table link) spec.md 3 describes
//! for the `buf` region.

use alloc::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{PhysAddr, VirtAddr, PAGE_SIZE};

/// Access-permission state. Exhaustive over the six states spec.md 4.3
/// requires `vm_updateusr_ap` to reproduce faithfully, modeled after the
/// classic kernel-rw/kernel-ro x user-{none,ro,rw} lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ap {
	/// Neither kernel nor user may access the page.
	NoAccess,
	/// Kernel read-write, user has no access.
	KernelRw,
	/// Kernel read-write, user read-only.
	KernelRwUserRo,
	/// Kernel read-write, user read-write.
	KernelRwUserRw,
	/// Kernel read-only, user has no access.
	KernelRo,
	/// Kernel read-only, user read-only.
	KernelRoUserRo,
}

impl Ap {
	pub fn user_writable(self) -> bool {
		matches!(self, Ap::KernelRwUserRw)
	}

	pub fn user_readable(self) -> bool {
		matches!(self, Ap::KernelRwUserRo | Ap::KernelRwUserRw | Ap::KernelRoUserRo)
	}
}

bitflags::bitflags! {
	/// User-visible region protection flags (spec.md 3, `buf.prot`).
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct Prot: u32 {
		const READ = 1 << 0;
		const WRITE = 1 << 1;
		const EXECUTE = 1 << 2;
		const COW = 1 << 3;
	}
}

/// Access-permission translation (spec.md 4.3 `vm_updateusr_ap`): given the
/// region's user protection flags and the access permission currently
/// installed, compute the next state.
///
/// Rule table, applied in order:
/// - `WRITE` implies full user read-write.
/// - `COW` together with `READ` forces kernel-ro/user-ro: the page must
///   fault on the next write so copy-on-write can intercept it.
/// - `READ` alone widens a kernel-rw/kernel-ro page to also grant user
///   read-only access, but never loosens an already-writable user mapping.
/// - No access flags at all downgrades the user-visible column, leaving
///   the kernel's own access untouched.
pub fn vm_updateusr_ap(prot: Prot, current: Ap) -> Ap {
	if prot.contains(Prot::WRITE) {
		return Ap::KernelRwUserRw;
	}
	if prot.contains(Prot::COW) && prot.contains(Prot::READ) {
		return Ap::KernelRoUserRo;
	}
	if prot.contains(Prot::READ) {
		return match current {
			Ap::KernelRwUserRw => Ap::KernelRwUserRw, // never loosen
			Ap::KernelRw | Ap::KernelRwUserRo => Ap::KernelRwUserRo,
			Ap::KernelRo | Ap::KernelRoUserRo | Ap::NoAccess => Ap::KernelRoUserRo,
		};
	}
	match current {
		Ap::KernelRwUserRo | Ap::KernelRwUserRw => Ap::KernelRw,
		Ap::KernelRoUserRo => Ap::KernelRo,
		other => other,
	}
}

/// MMU descriptor embedded in each region (spec.md 3, `buf`): virtual
/// address, physical address, size, access permission, and the
/// execute-never control bit.
#[derive(Debug, Clone, Copy)]
pub struct MmuDescriptor {
	pub vaddr: VirtAddr,
	pub paddr: PhysAddr,
	pub size: usize,
	pub ap: Ap,
	pub execute_never: bool,
}

/// A process's page-table abstraction: the master table plus any
/// secondary tables `vm_mm` tracks (spec.md 3).
pub struct PageTable {
	mappings: BTreeMap<usize, (PhysAddr, Ap)>,
}

impl PageTable {
	pub const fn new() -> Self {
		Self {
			mappings: BTreeMap::new(),
		}
	}

	fn page_of(addr: VirtAddr) -> usize {
		addr.as_usize() / PAGE_SIZE
	}

	/// Install a mapping for the page containing `vaddr`.
	pub fn map(&mut self, vaddr: VirtAddr, paddr: PhysAddr, ap: Ap) {
		self.mappings.insert(Self::page_of(vaddr), (paddr, ap));
	}

	/// Map every page a region of `size` bytes starting at `vaddr` covers.
	pub fn map_range(&mut self, vaddr: VirtAddr, paddr: PhysAddr, size: usize, ap: Ap) {
		let pages = size.div_ceil(PAGE_SIZE);
		for i in 0..pages {
			self.map(vaddr + i * PAGE_SIZE, paddr + i * PAGE_SIZE, ap);
		}
	}

	/// Remove the mapping for the page containing `vaddr`, if present.
	pub fn unmap(&mut self, vaddr: VirtAddr) {
		self.mappings.remove(&Self::page_of(vaddr));
	}

	pub fn unmap_range(&mut self, vaddr: VirtAddr, size: usize) {
		let pages = size.div_ceil(PAGE_SIZE);
		for i in 0..pages {
			self.unmap(vaddr + i * PAGE_SIZE);
		}
	}

	/// Translate a virtual address to its physical address and current AP,
	/// or `None` if the page is unmapped.
	pub fn translate(&self, vaddr: VirtAddr) -> Option<(PhysAddr, Ap)> {
		let (base, ap) = *self.mappings.get(&Self::page_of(vaddr))?;
		let offset = vaddr.as_usize() % PAGE_SIZE;
		Some((base + offset, ap))
	}

	pub fn is_mapped(&self, vaddr: VirtAddr) -> bool {
		self.mappings.contains_key(&Self::page_of(vaddr))
	}
}

impl Default for PageTable {
	fn default() -> Self {
		Self::new()
	}
}

/// Convert an `Ap`/access-kind mismatch into the errno the caller should
/// propagate: `EFAULT` for an unmapped page, `EINVAL` otherwise.
pub fn translate_or_fault(table: &PageTable, vaddr: VirtAddr) -> Result<PhysAddr> {
	table.translate(vaddr).map(|(p, _)| p).ok_or(Error::EFAULT)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn write_always_grants_user_rw() {
		assert_eq!(vm_updateusr_ap(Prot::WRITE, Ap::NoAccess), Ap::KernelRwUserRw);
		assert_eq!(vm_updateusr_ap(Prot::WRITE | Prot::READ, Ap::KernelRo), Ap::KernelRwUserRw);
	}

	#[test]
	fn cow_read_forces_readonly_both_sides() {
		assert_eq!(vm_updateusr_ap(Prot::COW | Prot::READ, Ap::KernelRwUserRw), Ap::KernelRoUserRo);
	}

	#[test]
	fn read_only_never_loosens_existing_user_rw() {
		assert_eq!(vm_updateusr_ap(Prot::READ, Ap::KernelRwUserRw), Ap::KernelRwUserRw);
	}

	#[test]
	fn read_only_widens_kernel_rw_to_user_ro() {
		assert_eq!(vm_updateusr_ap(Prot::READ, Ap::KernelRw), Ap::KernelRwUserRo);
	}

	#[test]
	fn no_access_downgrades_user_column_only() {
		assert_eq!(vm_updateusr_ap(Prot::empty(), Ap::KernelRwUserRw), Ap::KernelRw);
		assert_eq!(vm_updateusr_ap(Prot::empty(), Ap::KernelRoUserRo), Ap::KernelRo);
	}

	#[test]
	fn page_table_round_trip() {
		let mut pt = PageTable::new();
		pt.map_range(VirtAddr::new(0x1000), PhysAddr::new(0x8000), PAGE_SIZE * 2, Ap::KernelRwUserRw);
		let (phys, ap) = pt.translate(VirtAddr::new(0x1010)).unwrap();
		assert_eq!(phys, PhysAddr::new(0x8010));
		assert_eq!(ap, Ap::KernelRwUserRw);
		pt.unmap_range(VirtAddr::new(0x1000), PAGE_SIZE * 2);
		assert!(pt.translate(VirtAddr::new(0x1010)).is_none());
	}
}
