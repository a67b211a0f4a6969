// SPDX-License-Identifier: GPL-2.0

//! Abort (page-fault) handler — spec.md 4.2.
//!
//! On a data/prefetch abort the handler walks, in order:
//! 1. Find the region covering the faulting address; no region is an
//!    unmapped-address fault, delivered to the process as a signal.
//! 2. If the page table has no translation installed for the address but
//!    the region does cover it, this is a lazily-unmapped page: re-install
//!    the region's current descriptor and retry (`remap`).
//! 3. If the region is marked copy-on-write and the fault was a write,
//!    duplicate the backing storage (`Region::rclone`), install the
//!    writable copy in the region's slot, and retry.
//! 4. Otherwise the access genuinely violates the region's permissions:
//!    report it to the caller as a delivery-worthy fault.

use alloc::sync::Arc;

use crate::error::{Error, Result};
use crate::memory::mm::{InsOp, VmMm};
use crate::memory::mmu::Prot;
use crate::memory::region::Region;
use crate::types::VirtAddr;

/// Why the process-visible fault is happening, so the caller can build the
/// right `siginfo` (spec.md 4.2: SIGSEGV for no region / permission
/// violation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
	/// No region covers the faulting address at all.
	Unmapped,
	/// A region covers the address but the access violates its permissions.
	Permission,
}

/// Outcome of handling one abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
	/// The fault was resolved transparently to the process; re-execute the
	/// faulting instruction.
	Resolved,
	/// The process must be signaled; kernel callers translate this into
	/// SIGSEGV/SIGBUS delivery.
	Deliver(FaultKind),
}

/// Handle one data/prefetch abort against `mm` at `addr`. `is_write`
/// indicates whether the faulting access was a store.
pub fn handle_abort(mm: &VmMm, addr: VirtAddr, is_write: bool) -> Result<FaultOutcome> {
	let Some((_, region)) = mm.find_region(addr) else {
		return Ok(FaultOutcome::Deliver(FaultKind::Unmapped));
	};

	if !mm.page_table_is_mapped(addr) {
		mm.remap(&region);
		return Ok(FaultOutcome::Resolved);
	}

	if is_write && region.is_cow() {
		return resolve_cow_write(mm, &region);
	}

	// Reaching here means the page table already has a translation and this
	// wasn't a COW write, so the abort can only be a genuine permission
	// violation — the MMU wouldn't have faulted on an access the region
	// actually permits.
	let required = if is_write { Prot::WRITE } else { Prot::READ };
	debug_assert!(!region.prot.contains(required));
	Ok(FaultOutcome::Deliver(FaultKind::Permission))
}

fn resolve_cow_write(mm: &VmMm, region: &Arc<Region>) -> Result<FaultOutcome> {
	let clone = region.rclone()?;
	let (slot, _) = mm
		.find_region(region.vaddr())
		.ok_or(Error::EFAULT)?;
	mm.vm_replace_region(slot, clone, InsOp::MAP_REG)?;
	Ok(FaultOutcome::Resolved)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::mm::{InsOp, VmMm};
	use crate::memory::region::vm_newsect;
	use crate::types::PAGE_SIZE;

	#[test]
	fn unmapped_address_delivers_fault() {
		let mm = VmMm::new();
		let outcome = handle_abort(&mm, VirtAddr::new(0x1000), false).unwrap();
		assert_eq!(outcome, FaultOutcome::Deliver(FaultKind::Unmapped));
	}

	#[test]
	fn lazily_unmapped_page_is_remapped() {
		let mm = VmMm::new();
		let region = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ | Prot::WRITE).unwrap();
		// Install without MAP_REG: region is tracked but page table is empty.
		mm.vm_insert_region(region, InsOp::empty()).unwrap();
		let outcome = handle_abort(&mm, VirtAddr::new(0), false).unwrap();
		assert_eq!(outcome, FaultOutcome::Resolved);
		assert!(mm.page_table_is_mapped(VirtAddr::new(0)));
	}

	#[test]
	fn cow_write_clones_region_and_resolves() {
		let mm = VmMm::new();
		let region = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ | Prot::WRITE | Prot::COW).unwrap();
		mm.vm_insert_region(region, InsOp::MAP_REG).unwrap();
		let before = mm.region_at(0).unwrap();
		let before_paddr = before.descriptor().paddr;
		let outcome = handle_abort(&mm, VirtAddr::new(4), true).unwrap();
		assert_eq!(outcome, FaultOutcome::Resolved);
		let after = mm.region_at(0).unwrap();
		assert_ne!(after.descriptor().paddr, before_paddr);
	}

	#[test]
	fn fork_shared_region_resolves_cow_independently_per_process() {
		let parent = VmMm::new();
		let region = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ | Prot::WRITE).unwrap();
		parent.vm_insert_region(region, InsOp::MAP_REG).unwrap();
		let child = parent.fork().unwrap();

		let shared = parent.region_at(0).unwrap();
		assert!(shared.is_cow());
		let shared_paddr = shared.descriptor().paddr;

		// A write fault in the child clones the shared backing; the parent's
		// slot still points at the original, now-unique region.
		let outcome = handle_abort(&child, VirtAddr::new(4), true).unwrap();
		assert_eq!(outcome, FaultOutcome::Resolved);
		let child_region = child.region_at(0).unwrap();
		assert_ne!(child_region.descriptor().paddr, shared_paddr);
		assert_eq!(parent.region_at(0).unwrap().descriptor().paddr, shared_paddr);
		assert!(parent.region_at(0).unwrap().is_uniquely_owned());
	}

	#[test]
	fn write_to_read_only_region_delivers_permission_fault() {
		let mm = VmMm::new();
		let region = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ).unwrap();
		mm.vm_insert_region(region, InsOp::MAP_REG).unwrap();
		let outcome = handle_abort(&mm, VirtAddr::new(4), true).unwrap();
		assert_eq!(outcome, FaultOutcome::Deliver(FaultKind::Permission));
	}
}
