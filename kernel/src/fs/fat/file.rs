// SPDX-License-Identifier: GPL-2.0

//! File data read/write — spec.md 4.6 "Read/write path".
//!
//! At each cluster boundary, look up the backing sector by following the
//! chain (`cluster_for_offset`); on writes, extend the chain past the
//! current end as needed. Whole-cluster chunks are copied with
//! `device::{read_at, write_at}` once the absolute device offset for that
//! chunk is known.

use crate::device::{read_at, write_at, BlockDevice};
use crate::error::Result;
use crate::fs::fat::boot_sector::BootSector;
use crate::fs::fat::cluster::{chain_clusters, cluster_for_offset, remove_chain, FREE_CLUSTER};

fn cluster_byte_offset(bs: &BootSector, cluster: u32) -> u64 {
	bs.cluster_to_sector(cluster) as u64 * bs.bytes_per_sector as u64
}

/// Read up to `buf.len()` bytes starting at `offset` within the chain
/// rooted at `first_cluster`. Returns the number of bytes actually read
/// (short of `buf.len()` at end-of-chain).
pub fn read(dev: &dyn BlockDevice, bs: &BootSector, first_cluster: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
	if first_cluster < 2 {
		return Ok(0);
	}
	let cluster_size = bs.cluster_size() as u64;
	let mut done = 0usize;
	let mut pos = offset;
	while done < buf.len() {
		let Some(cluster) = cluster_for_offset(dev, bs, first_cluster, pos, false)? else {
			break;
		};
		let within = pos % cluster_size;
		let chunk = core::cmp::min(buf.len() - done, (cluster_size - within) as usize);
		let dev_off = cluster_byte_offset(bs, cluster) + within;
		read_at(dev, dev_off, &mut buf[done..done + chunk])?;
		done += chunk;
		pos += chunk as u64;
	}
	Ok(done)
}

/// Write `buf` at `offset`, extending the chain as needed. `first_cluster`
/// is `0` for a brand new, still-empty file; the returned cluster number
/// must be written back into the directory entry by the caller.
pub fn write(dev: &dyn BlockDevice, bs: &BootSector, first_cluster: u32, offset: u64, buf: &[u8]) -> Result<(u32, usize)> {
	let cluster_size = bs.cluster_size() as u64;
	let mut chain_head = first_cluster;
	if chain_head < 2 {
		chain_head = super::cluster::create_chain(dev, bs, 2, None)?;
		if chain_head == 0 {
			return Err(crate::error::Error::ENOSPC);
		}
	}

	let mut done = 0usize;
	let mut pos = offset;
	while done < buf.len() {
		let Some(cluster) = cluster_for_offset(dev, bs, chain_head, pos, true)? else {
			return Err(crate::error::Error::ENOSPC);
		};
		let within = pos % cluster_size;
		let chunk = core::cmp::min(buf.len() - done, (cluster_size - within) as usize);
		let dev_off = cluster_byte_offset(bs, cluster) + within;
		write_at(dev, dev_off, &buf[done..done + chunk])?;
		done += chunk;
		pos += chunk as u64;
	}
	Ok((chain_head, done))
}

/// Shrink or grow the chain rooted at `first_cluster` to back exactly
/// `new_size` bytes, freeing any trailing clusters no longer needed.
/// Returns the (possibly changed, possibly now `0` for an emptied file)
/// first cluster.
pub fn truncate(dev: &dyn BlockDevice, bs: &BootSector, first_cluster: u32, new_size: u64) -> Result<u32> {
	if new_size == 0 {
		if first_cluster >= 2 {
			remove_chain(dev, bs, first_cluster)?;
		}
		return Ok(FREE_CLUSTER);
	}

	let clusters = if first_cluster >= 2 { chain_clusters(dev, bs, first_cluster)? } else { alloc::vec::Vec::new() };
	let cluster_size = bs.cluster_size() as u64;
	let needed = new_size.div_ceil(cluster_size) as usize;

	if needed <= clusters.len() {
		if needed < clusters.len() {
			super::cluster::write_entry(dev, bs, clusters[needed - 1], 0x0FFF_FFFF)?;
			remove_chain(dev, bs, clusters[needed])?;
		}
		return Ok(if clusters.is_empty() { FREE_CLUSTER } else { clusters[0] });
	}

	// Growing via truncate (e.g. ftruncate past EOF): extend the chain and
	// zero the newly backed bytes.
	let mut head = first_cluster;
	let pad_offset = clusters.len() as u64 * cluster_size;
	let pad_len = (needed as u64 * cluster_size) - pad_offset;
	let zeros = alloc::vec![0u8; pad_len as usize];
	let (new_head, _) = write(dev, bs, head, pad_offset, &zeros)?;
	head = new_head;
	Ok(head)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::MemoryBlockDevice;
	use crate::fs::fat::boot_sector::build_fat32;

	fn fresh_volume() -> (MemoryBlockDevice, BootSector) {
		let dev = MemoryBlockDevice::new(512, 8192);
		let mut sector = [0u8; 512];
		build_fat32(&mut sector, 8192, 2, 64);
		dev.write_block(0, &sector).unwrap();
		let bs = BootSector::parse(&sector).unwrap();
		(dev, bs)
	}

	#[test]
	fn write_then_read_round_trips_across_cluster_boundary() {
		let (dev, bs) = fresh_volume();
		let payload: alloc::vec::Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
		let (head, written) = write(&dev, &bs, 0, 0, &payload).unwrap();
		assert_eq!(written, payload.len());
		let mut out = alloc::vec![0u8; payload.len()];
		let read_n = read(&dev, &bs, head, 0, &mut out).unwrap();
		assert_eq!(read_n, payload.len());
		assert_eq!(out, payload);
	}

	#[test]
	fn truncate_to_zero_frees_chain() {
		let (dev, bs) = fresh_volume();
		let (head, _) = write(&dev, &bs, 0, 0, &[1u8; 2000]).unwrap();
		let new_head = truncate(&dev, &bs, head, 0).unwrap();
		assert_eq!(new_head, FREE_CLUSTER);
	}

	#[test]
	fn truncate_shrink_drops_trailing_clusters() {
		let (dev, bs) = fresh_volume();
		let cluster_size = bs.cluster_size() as u64;
		let (head, _) = write(&dev, &bs, 0, 0, &alloc::vec![7u8; (cluster_size * 3) as usize]).unwrap();
		let before = chain_clusters(&dev, &bs, head).unwrap();
		assert_eq!(before.len(), 3);
		let new_head = truncate(&dev, &bs, head, cluster_size).unwrap();
		let after = chain_clusters(&dev, &bs, new_head).unwrap();
		assert_eq!(after.len(), 1);
	}
}
