// SPDX-License-Identifier: GPL-2.0

//! Region (`buf`) — spec.md 3 and 4.3.
//!
//! A region is the unit `vm_mm` maps and COW-shares. Physical backing is a
//! kmalloc'd buffer rather than a real page-frame allocation (spec.md
//! Non-goals exclude demand paging and real physical memory discovery);
//! what matters for the rest of the kernel is that the region's address
//! range is page-aligned, non-overlapping with its siblings, and owns an
//! `rclone`/`rfree` pair that COW and `vm_mm::destroy` call through.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::memory::kmalloc::{kfree, kzalloc};
use crate::memory::mmu::{Ap, MmuDescriptor, Prot};
use crate::sync::Mutex;
use crate::types::{PhysAddr, VirtAddr, PAGE_SIZE};

/// Operations a region's backing implementation provides. Anonymous memory
/// (the only backing this crate implements; file-backed mmap is out of
/// scope) clones by copying the physical bytes and frees by returning them
/// to kmalloc.
pub trait RegionOps: Send + Sync {
	/// Physically duplicate the region's backing storage for COW.
	fn rclone(&self, region: &Region) -> Result<Arc<Region>>;
	/// Release the region's backing storage.
	fn rfree(&self, region: &Region);
}

struct RegionState {
	descriptor: MmuDescriptor,
}

/// A mapped region of a process's address space.
pub struct Region {
	state: Mutex<RegionState>,
	pub size: usize,
	pub prot: Prot,
	ops: Arc<dyn RegionOps>,
	/// Set when `fork` shares this region's backing storage between parent
	/// and child instead of eagerly duplicating it (spec.md 4.2 COW fork).
	/// Independent of `prot`'s `COW` bit, which marks regions built COW from
	/// the start (none currently are — this crate only produces shared
	/// regions via fork).
	shared_cow: AtomicBool,
}

impl Region {
	pub fn descriptor(&self) -> MmuDescriptor {
		self.state.lock().descriptor
	}

	pub fn is_cow(&self) -> bool {
		self.prot.contains(Prot::COW) || self.shared_cow.load(Ordering::Acquire)
	}

	/// Mark this region copy-on-write and downgrade its descriptor to
	/// read-only for both the sharing processes (`fork`, spec.md 4.2). The
	/// caller is responsible for re-installing the downgraded descriptor
	/// into every page table that already mapped this region writably.
	pub fn mark_shared_cow(&self) {
		self.shared_cow.store(true, Ordering::Release);
		let mut state = self.state.lock();
		state.descriptor.ap = Ap::KernelRoUserRo;
	}

	/// True once no other `Arc<Region>` (sibling process sharing it via
	/// fork) remains; only then is it safe to free the backing storage.
	pub fn is_uniquely_owned(self: &Arc<Self>) -> bool {
		Arc::strong_count(self) == 1
	}

	pub fn set_descriptor(&self, descriptor: MmuDescriptor) {
		self.state.lock().descriptor = descriptor;
	}

	pub fn vaddr(&self) -> VirtAddr {
		self.state.lock().descriptor.vaddr
	}

	pub fn contains(&self, addr: VirtAddr) -> bool {
		let d = self.state.lock().descriptor;
		addr.as_usize() >= d.vaddr.as_usize() && addr.as_usize() < d.vaddr.as_usize() + d.size
	}

	pub fn overlaps(&self, start: VirtAddr, size: usize) -> bool {
		let d = self.state.lock().descriptor;
		let a0 = d.vaddr.as_usize();
		let a1 = a0 + d.size;
		let b0 = start.as_usize();
		let b1 = b0 + size;
		a0 < b1 && b0 < a1
	}

	pub fn rclone(self: &Arc<Self>) -> Result<Arc<Region>> {
		self.ops.clone().rclone(self)
	}

	pub fn rfree(&self) {
		self.ops.rfree(self);
	}
}

/// Anonymous, zero-filled backing storage (the only region kind this
/// kernel needs: stacks, heap, and COW-duplicated code/data pages).
pub struct AnonOps;

impl RegionOps for AnonOps {
	fn rclone(&self, region: &Region) -> Result<Arc<Region>> {
		let d = region.descriptor();
		let new_ptr = kzalloc(d.size)?;
		unsafe {
			core::ptr::copy_nonoverlapping(
				d.paddr.as_usize() as *const u8,
				new_ptr,
				d.size,
			);
		}
		// The clone is this process's own private copy: COW is resolved, so
		// its access permission is recomputed from `prot` rather than
		// inherited from the (possibly read-only, shared) source descriptor.
		let ap = crate::memory::mmu::vm_updateusr_ap(region.prot, Ap::KernelRw);
		Ok(Arc::new(Region {
			state: Mutex::new(RegionState {
				descriptor: MmuDescriptor {
					paddr: PhysAddr::new(new_ptr as usize),
					ap,
					..d
				},
			}),
			size: region.size,
			prot: region.prot,
			ops: Arc::new(AnonOps),
			shared_cow: AtomicBool::new(false),
		}))
	}

	fn rfree(&self, region: &Region) {
		let d = region.descriptor();
		kfree(d.paddr.as_usize() as *mut u8);
	}
}

/// `vm_newsect(vaddr, size, prot)` (spec.md 4.3): round the range to page
/// boundaries, allocate zeroed backing storage, and build the region's MMU
/// descriptor with the access permission the protection flags imply.
pub fn vm_newsect(vaddr: VirtAddr, size: usize, prot: Prot) -> Result<Arc<Region>> {
	if size == 0 {
		return Err(Error::EINVAL);
	}
	let start = vaddr.page_floor(PAGE_SIZE);
	let end = (vaddr + size).page_ceil(PAGE_SIZE);
	let rounded_size = end.as_usize() - start.as_usize();

	let ptr = kzalloc(rounded_size)?;
	let ap = crate::memory::mmu::vm_updateusr_ap(prot, Ap::KernelRw);
	let descriptor = MmuDescriptor {
		vaddr: start,
		paddr: PhysAddr::new(ptr as usize),
		size: rounded_size,
		ap,
		execute_never: !prot.contains(Prot::EXECUTE),
	};

	Ok(Arc::new(Region {
		state: Mutex::new(RegionState { descriptor }),
		shared_cow: AtomicBool::new(false),
		size: rounded_size,
		prot,
		ops: Arc::new(AnonOps),
	}))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vm_newsect_rounds_to_page_boundaries() {
		let region = vm_newsect(VirtAddr::new(100), 10, Prot::READ | Prot::WRITE).unwrap();
		let d = region.descriptor();
		assert_eq!(d.vaddr, VirtAddr::new(0));
		assert_eq!(d.size, PAGE_SIZE);
	}

	#[test]
	fn regions_overlap_detection() {
		let region = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ).unwrap();
		assert!(region.overlaps(VirtAddr::new(0), PAGE_SIZE));
		assert!(!region.overlaps(VirtAddr::new(PAGE_SIZE), PAGE_SIZE));
	}

	#[test]
	fn rclone_copies_bytes_independently() {
		let region = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ | Prot::WRITE | Prot::COW).unwrap();
		let d = region.descriptor();
		unsafe {
			*(d.paddr.as_usize() as *mut u8) = 0xAA;
		}
		let clone = region.rclone().unwrap();
		let clone_d = clone.descriptor();
		unsafe {
			assert_eq!(*(clone_d.paddr.as_usize() as *const u8), 0xAA);
			*(clone_d.paddr.as_usize() as *mut u8) = 0x55;
			assert_eq!(*(d.paddr.as_usize() as *const u8), 0xAA);
		}
		region.rfree();
		clone.rfree();
	}
}
