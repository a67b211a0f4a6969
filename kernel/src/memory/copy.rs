// SPDX-License-Identifier: GPL-2.0

//! User/kernel copy primitives (spec.md 4.3): `useracc`, `copyin`,
//! `copyout`, `copyinstr`, `copyoutstr`.

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::memory::mm::VmMm;
use crate::memory::mmu::Prot;
use crate::types::{VirtAddr, PAGE_SIZE};

/// `useracc(addr, len, prot)`: verify that `[addr, addr+len)` lies entirely
/// inside a single region with user access permissions covering `prot`.
pub fn useracc(mm: &VmMm, addr: VirtAddr, len: usize, prot: Prot) -> Result<()> {
	if len == 0 {
		return Ok(());
	}
	let (_, region) = mm.find_region(addr).ok_or(Error::EFAULT)?;
	if !region.overlaps(addr, len) {
		return Err(Error::EFAULT);
	}
	let d = region.descriptor();
	let end = addr.as_usize() + len;
	if end > d.vaddr.as_usize() + d.size {
		return Err(Error::EFAULT);
	}
	if prot.contains(Prot::WRITE) && !d.ap.user_writable() {
		return Err(Error::EFAULT);
	}
	if prot.contains(Prot::READ) && !d.ap.user_readable() && !d.ap.user_writable() {
		return Err(Error::EFAULT);
	}
	Ok(())
}

fn translate(mm: &VmMm, addr: VirtAddr) -> Result<*const u8> {
	mm.translate(addr).map(|p| p.as_usize() as *const u8).ok_or(Error::EFAULT)
}

/// Copy `len` bytes from user address `src` into `dst`.
pub fn copyin(mm: &VmMm, src: VirtAddr, dst: &mut [u8]) -> Result<()> {
	useracc(mm, src, dst.len(), Prot::READ)?;
	let kernel_ptr = translate(mm, src)?;
	unsafe {
		core::ptr::copy_nonoverlapping(kernel_ptr, dst.as_mut_ptr(), dst.len());
	}
	Ok(())
}

/// Copy `src` into user address `dst`.
pub fn copyout(mm: &VmMm, src: &[u8], dst: VirtAddr) -> Result<()> {
	useracc(mm, dst, src.len(), Prot::WRITE)?;
	let kernel_ptr = translate(mm, dst)?;
	unsafe {
		core::ptr::copy_nonoverlapping(src.as_ptr(), kernel_ptr as *mut u8, src.len());
	}
	Ok(())
}

/// Copy a NUL-terminated string from user address `src`, walking
/// page-by-page and re-validating on each crossing. Returns
/// `ENAMETOOLONG` if no NUL is found within `max_len` bytes; unlike a plain
/// `Result<Vec<u8>>`, the error case still hands back the bytes read so far
/// (NUL-terminated at `max_len - 1`) rather than dropping them, matching
/// spec.md's "truncate with a terminating NUL written to the destination".
pub fn copyinstr(mm: &VmMm, src: VirtAddr, max_len: usize) -> core::result::Result<Vec<u8>, (Vec<u8>, Error)> {
	let mut out = Vec::with_capacity(max_len.min(64));
	let mut cursor = src;
	while out.len() < max_len {
		let page_end = cursor.page_ceil(PAGE_SIZE);
		let chunk = core::cmp::min(page_end.as_usize() - cursor.as_usize(), max_len - out.len());
		let chunk = if chunk == 0 { PAGE_SIZE.min(max_len - out.len()) } else { chunk };
		if let Err(e) = useracc(mm, cursor, chunk, Prot::READ) {
			return Err((out, e));
		}
		let kernel_ptr = match translate(mm, cursor) {
			Ok(p) => p,
			Err(e) => return Err((out, e)),
		};
		let slice = unsafe { core::slice::from_raw_parts(kernel_ptr, chunk) };
		for &byte in slice {
			if byte == 0 {
				return Ok(out);
			}
			out.push(byte);
			if out.len() == max_len {
				break;
			}
		}
		cursor = cursor + chunk;
	}
	out.push(0);
	Err((out, Error::ENAMETOOLONG))
}

/// Copy a NUL-terminated string to user address `dst`, truncating to
/// `max_len - 1` bytes plus a terminating NUL if `src` is longer.
pub fn copyoutstr(mm: &VmMm, src: &[u8], dst: VirtAddr, max_len: usize) -> Result<usize> {
	if max_len == 0 {
		return Err(Error::EINVAL);
	}
	let copy_len = core::cmp::min(src.len(), max_len - 1);
	let mut cursor = dst;
	let mut remaining = copy_len;
	let mut offset = 0usize;
	while remaining > 0 {
		let page_end = cursor.page_ceil(PAGE_SIZE);
		let chunk = core::cmp::min(page_end.as_usize() - cursor.as_usize(), remaining);
		let chunk = if chunk == 0 { remaining } else { chunk };
		useracc(mm, cursor, chunk, Prot::WRITE)?;
		let kernel_ptr = translate(mm, cursor)? as *mut u8;
		unsafe {
			core::ptr::copy_nonoverlapping(src[offset..offset + chunk].as_ptr(), kernel_ptr, chunk);
		}
		cursor = cursor + chunk;
		offset += chunk;
		remaining -= chunk;
	}
	// Terminating NUL.
	useracc(mm, cursor, 1, Prot::WRITE)?;
	let nul_ptr = translate(mm, cursor)? as *mut u8;
	unsafe {
		*nul_ptr = 0;
	}
	Ok(copy_len)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::mm::{InsOp, VmMm};
	use crate::memory::region::vm_newsect;

	fn mapped_mm(size: usize) -> VmMm {
		let mm = VmMm::new();
		let region = vm_newsect(VirtAddr::new(0), size, Prot::READ | Prot::WRITE).unwrap();
		mm.vm_insert_region(region, InsOp::MAP_REG).unwrap();
		mm
	}

	#[test]
	fn copyin_copyout_round_trip() {
		let mm = mapped_mm(PAGE_SIZE);
		let payload = [1u8, 2, 3, 4];
		copyout(&mm, &payload, VirtAddr::new(16)).unwrap();
		let mut back = [0u8; 4];
		copyin(&mm, VirtAddr::new(16), &mut back).unwrap();
		assert_eq!(back, payload);
	}

	#[test]
	fn copyoutstr_then_copyinstr_round_trip() {
		let mm = mapped_mm(PAGE_SIZE);
		copyoutstr(&mm, b"hello", VirtAddr::new(0), 64).unwrap();
		let s = copyinstr(&mm, VirtAddr::new(0), 64).unwrap();
		assert_eq!(s, b"hello");
	}

	#[test]
	fn copyinstr_without_nul_returns_enametoolong_with_truncated_bytes() {
		let mm = mapped_mm(PAGE_SIZE);
		let long = [b'x'; 8];
		copyout(&mm, &long, VirtAddr::new(0)).unwrap();
		let (truncated, err) = copyinstr(&mm, VirtAddr::new(0), 4).unwrap_err();
		assert_eq!(err, Error::ENAMETOOLONG);
		assert_eq!(truncated, b"xxx\0");
	}

	#[test]
	fn useracc_rejects_out_of_region_access() {
		let mm = mapped_mm(PAGE_SIZE);
		assert!(useracc(&mm, VirtAddr::new(PAGE_SIZE), 1, Prot::READ).is_err());
	}
}
