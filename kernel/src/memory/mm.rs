// SPDX-License-Identifier: GPL-2.0

//! `vm_mm` — spec.md 3 and 4.3: `vm_insert_region`, `vm_replace_region`,
//! `vm_rndsect`, mm init/destroy.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::memory::mmu::{PageTable, Prot};
use crate::memory::region::{vm_newsect, Region};
use crate::sync::Mutex;
use crate::types::{VirtAddr, PAGE_SIZE};

/// Semantic region slots (spec.md 3): index 0 is code, 1 is stack, 2 is
/// heap; anything beyond is a free slot used for additional mmap regions.
pub const SLOT_CODE: usize = 0;
pub const SLOT_STACK: usize = 1;
pub const SLOT_HEAP: usize = 2;

bitflags::bitflags! {
	/// Region-install options for `vm_insert_region`/`vm_replace_region`.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct InsOp: u32 {
		/// Install the translation into the page table immediately.
		const MAP_REG = 1 << 0;
		/// Replacing a region: skip calling the previous occupant's `rfree`.
		const NOFREE = 1 << 1;
	}
}

/// Default range `vm_rndsect` picks random mmap addresses from. Chosen
/// comfortably above any stack/heap slot this crate allocates.
pub const MMAP_RANGE_START: usize = 0x5000_0000;
pub const MMAP_RANGE_END: usize = 0x6000_0000;

struct MmInner {
	regions: Vec<Option<Arc<Region>>>,
	page_table: PageTable,
}

/// A process's memory-management struct.
pub struct VmMm {
	inner: Mutex<MmInner>,
}

impl VmMm {
	/// `vm_mm` init: a fresh page table and an empty region array.
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(MmInner {
				regions: Vec::new(),
				page_table: PageTable::new(),
			}),
		}
	}

	pub fn region_count(&self) -> usize {
		self.inner.lock().regions.iter().filter(|r| r.is_some()).count()
	}

	pub fn region_at(&self, slot: usize) -> Option<Arc<Region>> {
		self.inner.lock().regions.get(slot).cloned().flatten()
	}

	/// Find the region containing `addr`, if any (used by the abort
	/// handler's linear scan, spec.md 4.2).
	pub fn find_region(&self, addr: VirtAddr) -> Option<(usize, Arc<Region>)> {
		let inner = self.inner.lock();
		inner
			.regions
			.iter()
			.enumerate()
			.find_map(|(i, slot)| slot.as_ref().filter(|r| r.contains(addr)).map(|r| (i, r.clone())))
	}

	/// `vm_insert_region(proc, region, insop)`: find a free slot, growing
	/// the array if needed, and install the translation if `MAP_REG` is set.
	pub fn vm_insert_region(&self, region: Arc<Region>, insop: InsOp) -> Result<usize> {
		let mut inner = self.inner.lock();
		let d = region.descriptor();
		for existing in inner.regions.iter().flatten() {
			if existing.overlaps(d.vaddr, d.size) {
				return Err(Error::EINVAL);
			}
		}

		let slot = match inner.regions.iter().position(|r| r.is_none()) {
			Some(i) => i,
			None => {
				inner.regions.push(None);
				inner.regions.len() - 1
			}
		};

		if insop.contains(InsOp::MAP_REG) {
			inner.page_table.map_range(d.vaddr, d.paddr, d.size, d.ap);
		}
		inner.regions[slot] = Some(region);
		Ok(slot)
	}

	/// `vm_replace_region(proc, region, slot, insop)`: unmap and (unless
	/// `NOFREE`) free the previous occupant, then install the new region.
	pub fn vm_replace_region(&self, slot: usize, region: Arc<Region>, insop: InsOp) -> Result<()> {
		let mut inner = self.inner.lock();
		if slot >= inner.regions.len() {
			inner.regions.resize_with(slot + 1, || None);
		}
		if let Some(prev) = inner.regions[slot].take() {
			let prev_d = prev.descriptor();
			inner.page_table.unmap_range(prev_d.vaddr, prev_d.size);
			if !insop.contains(InsOp::NOFREE) && prev.is_uniquely_owned() {
				prev.rfree();
			}
		}
		let d = region.descriptor();
		if insop.contains(InsOp::MAP_REG) {
			inner.page_table.map_range(d.vaddr, d.paddr, d.size, d.ap);
		}
		inner.regions[slot] = Some(region);
		Ok(())
	}

	/// Map `vaddr`'s page to the physical address it currently has
	/// installed in `region`'s MMU descriptor, re-validating under the
	/// lock (used after the abort handler remaps a region).
	pub fn remap(&self, region: &Arc<Region>) {
		let mut inner = self.inner.lock();
		let d = region.descriptor();
		inner.page_table.map_range(d.vaddr, d.paddr, d.size, d.ap);
	}

	pub fn translate(&self, addr: VirtAddr) -> Option<crate::types::PhysAddr> {
		self.inner.lock().page_table.translate(addr).map(|(p, _)| p)
	}

	pub fn page_table_is_mapped(&self, addr: VirtAddr) -> bool {
		self.inner.lock().page_table.is_mapped(addr)
	}

	/// mm destroy: free every region via its `rfree`. Not safe to call
	/// while any other thread can still reach this `vm_mm` (spec.md 4.3).
	pub fn destroy(&self) {
		let mut inner = self.inner.lock();
		for region in inner.regions.drain(..).flatten() {
			if region.is_uniquely_owned() {
				region.rfree();
			}
		}
	}

	/// `fork`: build a child `vm_mm` sharing every occupied slot's backing
	/// region with the parent (spec.md 4.2). A writable region is downgraded
	/// to copy-on-write in both page tables so either side's next write
	/// triggers [`crate::memory::fault::handle_abort`]'s COW branch, which
	/// clones the region and replaces that side's slot; a read-only region
	/// (code, already-COW) is shared unchanged since neither side can dirty
	/// it without faulting into the same clone path.
	pub fn fork(&self) -> Result<VmMm> {
		let mut inner = self.inner.lock();
		let mut child_table = PageTable::new();
		let mut child_regions = Vec::with_capacity(inner.regions.len());
		for slot in inner.regions.iter_mut() {
			match slot {
				None => child_regions.push(None),
				Some(region) => {
					if region.prot.contains(Prot::WRITE) {
						region.mark_shared_cow();
					}
					let d = region.descriptor();
					inner.page_table.map_range(d.vaddr, d.paddr, d.size, d.ap);
					child_table.map_range(d.vaddr, d.paddr, d.size, d.ap);
					child_regions.push(Some(Arc::clone(region)));
				}
			}
		}
		Ok(VmMm {
			inner: Mutex::new(MmInner {
				regions: child_regions,
				page_table: child_table,
			}),
		})
	}
}

impl Default for VmMm {
	fn default() -> Self {
		Self::new()
	}
}

/// `vm_rndsect(size, prot)` (spec.md 4.3): pick a free, page-aligned
/// virtual address in `MMAP_RANGE_START..MMAP_RANGE_END` by probing
/// candidates and rejecting overlaps, then eagerly build the region there.
/// `rand_u32` is injected so the search is deterministic under test; a real
/// caller seeds it from a per-boot PRNG.
pub fn vm_rndsect(mm: &VmMm, size: usize, prot: crate::memory::mmu::Prot, mut rand_u32: impl FnMut() -> u32) -> Result<Arc<Region>> {
	let span = MMAP_RANGE_END - MMAP_RANGE_START;
	let pages = span / PAGE_SIZE;
	if pages == 0 {
		return Err(Error::ENOMEM);
	}
	for _ in 0..1024 {
		let page = (rand_u32() as usize) % pages;
		let candidate = VirtAddr::new(MMAP_RANGE_START + page * PAGE_SIZE);
		if mm.find_region(candidate).is_none() {
			let end = candidate + size;
			let overlaps_tail = mm
				.inner
				.lock()
				.regions
				.iter()
				.flatten()
				.any(|r| r.overlaps(candidate, size));
			if !overlaps_tail && end.as_usize() <= MMAP_RANGE_END {
				return vm_newsect(candidate, size, prot);
			}
		}
	}
	Err(Error::ENOMEM)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::mmu::Prot;

	#[test]
	fn insert_region_rejects_overlap() {
		let mm = VmMm::new();
		let r1 = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ | Prot::WRITE).unwrap();
		mm.vm_insert_region(r1, InsOp::MAP_REG).unwrap();
		let r2 = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ).unwrap();
		assert!(mm.vm_insert_region(r2, InsOp::empty()).is_err());
	}

	#[test]
	fn replace_region_frees_previous() {
		let mm = VmMm::new();
		let r1 = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ | Prot::WRITE).unwrap();
		let slot = mm.vm_insert_region(r1, InsOp::MAP_REG).unwrap();
		let r2 = vm_newsect(VirtAddr::new(PAGE_SIZE * 4), PAGE_SIZE, Prot::READ).unwrap();
		mm.vm_replace_region(slot, r2, InsOp::MAP_REG).unwrap();
		assert!(!mm.page_table_is_mapped(VirtAddr::new(0)));
	}

	#[test]
	fn fork_shares_writable_region_until_first_write() {
		let parent = VmMm::new();
		let r1 = vm_newsect(VirtAddr::new(0), PAGE_SIZE, Prot::READ | Prot::WRITE).unwrap();
		parent.vm_insert_region(r1, InsOp::MAP_REG).unwrap();

		let child = parent.fork().unwrap();
		let parent_region = parent.region_at(SLOT_CODE).unwrap();
		let child_region = child.region_at(SLOT_CODE).unwrap();
		assert!(Arc::ptr_eq(&parent_region, &child_region));
		assert!(parent_region.is_cow());
		assert!(!parent_region.is_uniquely_owned());

		// Replacing the child's slot with its own clone drops the child's
		// reference; the parent then holds the only remaining reference.
		let clone = parent_region.rclone().unwrap();
		child.vm_replace_region(SLOT_CODE, clone, InsOp::MAP_REG | InsOp::NOFREE).unwrap();
		assert!(parent_region.is_uniquely_owned());
	}

	#[test]
	fn rndsect_picks_distinct_non_overlapping_regions() {
		let mm = VmMm::new();
		let mut counter = 0u32;
		let r1 = vm_rndsect(&mm, PAGE_SIZE, Prot::READ | Prot::WRITE, || {
			counter += 1;
			counter
		})
		.unwrap();
		mm.vm_insert_region(r1.clone(), InsOp::MAP_REG).unwrap();
		let r2 = vm_rndsect(&mm, PAGE_SIZE, Prot::READ | Prot::WRITE, || {
			counter += 1;
			counter
		})
		.unwrap();
		assert!(!r1.overlaps(r2.vaddr(), r2.size));
	}
}
