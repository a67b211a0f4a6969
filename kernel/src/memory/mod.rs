// SPDX-License-Identifier: GPL-2.0

//! Virtual memory manager (spec.md 2, 3, 4.3).
//!
//! A full buddy/zone/slab hierarchy plus a `page_table`/`vmalloc` layer
//! assuming real discovered physical memory and a hardware page-table format
//! would require CPU bring-up this crate doesn't do (spec.md Non-goals).
//! This module keeps only what's still needed — a heap allocator, an MMU
//! abstraction, COW-capable regions, a per-process `vm_mm`, user/kernel copy
//! primitives and the abort handler — and re-exports them as a flat surface
//! for the rest of the kernel.

pub mod copy;
pub mod fault;
pub mod kmalloc;
pub mod mm;
pub mod mmu;
pub mod region;

pub use copy::{copyin, copyinstr, copyout, copyoutstr, useracc};
pub use fault::{handle_abort, FaultKind, FaultOutcome};
pub use kmalloc::{gfp, kfree, kmalloc, kzalloc, krealloc};
pub use mm::{vm_rndsect, InsOp, VmMm, MMAP_RANGE_END, MMAP_RANGE_START, SLOT_CODE, SLOT_HEAP, SLOT_STACK};
pub use mmu::{vm_updateusr_ap, Ap, MmuDescriptor, PageTable, Prot};
pub use region::{vm_newsect, AnonOps, Region, RegionOps};

pub use crate::types::{PhysAddr, VirtAddr, PAGE_SHIFT, PAGE_SIZE};
