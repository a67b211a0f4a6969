// SPDX-License-Identifier: GPL-2.0

//! RAM-backed block device.
//!
//! Modeled on Linux `drivers/block/brd.c`, minus the gendisk/request-queue
//! plumbing: there's no real storage hardware to drive (spec.md 1
//! Non-goals), so [`RamDisk`] just implements [`kernel::device::BlockDevice`]
//! over a lock-protected `Vec<u8>` and registers itself by name the same way
//! any other block device would.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use kernel::device::{self, BlockDevice};
use kernel::error::{Error, Result};
use kernel::sync::Spinlock;

/// A block device backed entirely by heap memory.
pub struct RamDisk {
	block_size: u32,
	block_count: u64,
	data: Spinlock<Vec<u8>>,
}

impl RamDisk {
	/// Creates a `size`-byte disk divided into `block_size`-byte blocks.
	/// `size` need not be a multiple of `block_size`; the remainder is
	/// inaccessible, mirroring how a real device's last partial block is
	/// dropped rather than rounded up.
	pub fn new(size: u64, block_size: u32) -> Self {
		assert!(block_size > 0, "block_size must be nonzero");
		let block_count = size / block_size as u64;
		let data = vec![0u8; (block_count * block_size as u64) as usize];
		Self {
			block_size,
			block_count,
			data: Spinlock::new(data),
		}
	}

	/// Builds a disk and registers it under `name` in the block device
	/// registry, returning the shared handle the caller can also mount
	/// against directly.
	pub fn register(name: &str, size: u64, block_size: u32) -> Result<Arc<Self>> {
		let disk = Arc::new(Self::new(size, block_size));
		device::register_block_device(name, disk.clone())?;
		Ok(disk)
	}
}

impl BlockDevice for RamDisk {
	fn block_size(&self) -> usize {
		self.block_size as usize
	}

	fn block_count(&self) -> u64 {
		self.block_count
	}

	fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<()> {
		if block >= self.block_count {
			return Err(Error::EINVAL);
		}
		if buf.len() != self.block_size as usize {
			return Err(Error::EINVAL);
		}

		let offset = (block * self.block_size as u64) as usize;
		let data = self.data.lock();
		buf.copy_from_slice(&data[offset..offset + self.block_size as usize]);
		Ok(())
	}

	fn write_block(&self, block: u64, buf: &[u8]) -> Result<()> {
		if block >= self.block_count {
			return Err(Error::EINVAL);
		}
		if buf.len() != self.block_size as usize {
			return Err(Error::EINVAL);
		}

		let offset = (block * self.block_size as u64) as usize;
		let mut data = self.data.lock();
		data[offset..offset + self.block_size as usize].copy_from_slice(buf);
		Ok(())
	}

	fn flush(&self) -> Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_out_of_range_block() {
		let disk = RamDisk::new(4096, 512);
		let mut buf = [0u8; 512];
		assert_eq!(disk.read_block(8, &mut buf), Err(Error::EINVAL));
	}

	#[test]
	fn rejects_wrong_sized_buffer() {
		let disk = RamDisk::new(4096, 512);
		let mut buf = [0u8; 256];
		assert_eq!(disk.read_block(0, &mut buf), Err(Error::EINVAL));
	}

	#[test]
	fn write_then_read_round_trips() {
		let disk = RamDisk::new(4096, 512);
		let block = [0x5au8; 512];
		disk.write_block(3, &block).unwrap();

		let mut out = [0u8; 512];
		disk.read_block(3, &mut out).unwrap();
		assert_eq!(out, block);
	}

	#[test]
	fn blocks_are_independent() {
		let disk = RamDisk::new(4096, 512);
		disk.write_block(0, &[1u8; 512]).unwrap();
		disk.write_block(1, &[2u8; 512]).unwrap();

		let mut buf = [0u8; 512];
		disk.read_block(0, &mut buf).unwrap();
		assert_eq!(buf, [1u8; 512]);
		disk.read_block(1, &mut buf).unwrap();
		assert_eq!(buf, [2u8; 512]);
	}

	#[test]
	fn register_makes_disk_lookupable() {
		let disk = RamDisk::register("ram-test-0", 16 * 1024, 512).unwrap();
		let found = device::lookup_block_device("ram-test-0").unwrap();
		assert_eq!(found.block_count(), disk.block_count());
	}

	#[test]
	fn partial_last_block_is_dropped() {
		let disk = RamDisk::new(1000, 512);
		assert_eq!(disk.block_count(), 1);
	}
}
