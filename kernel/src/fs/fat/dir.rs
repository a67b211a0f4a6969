// SPDX-License-Identifier: GPL-2.0

//! Directory entry layout and directory walking — spec.md 4.6 "Directory
//! walking", 6.
//!
//! A directory is a sequence of 32-byte slots, either the fixed root
//! region (FAT12/16) or an ordinary cluster chain (FAT32 root and every
//! subdirectory). `dir_sdi` positions an iterator at a linear index;
//! `dir_next` advances, allocating a new cluster when a writable mount
//! walks past the current end; `dir_alloc` reserves `n` consecutive free
//! slots for a new entry (a short entry plus however many LFN entries its
//! name needs).

use alloc::string::String;
use alloc::vec::Vec;

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::fs::fat::boot_sector::BootSector;
use crate::fs::fat::cluster::cluster_for_offset;
use crate::fs::fat::name::{self, ShortName, DELETED_MARKER, LFN_ATTR};

pub const ATTR_RDO: u8 = 0x01;
pub const ATTR_HID: u8 = 0x02;
pub const ATTR_SYS: u8 = 0x04;
pub const ATTR_VOL: u8 = 0x08;
pub const ATTR_LFN: u8 = 0x0F;
pub const ATTR_DIR: u8 = 0x10;
pub const ATTR_ARC: u8 = 0x20;

const ENTRY_SIZE: u64 = 32;

/// Where a directory's slots live.
#[derive(Debug, Clone, Copy)]
pub enum DirLocation {
	/// FAT12/16's fixed root region: `start_sector` for `entry_count` slots.
	FixedRoot { start_sector: u32, entry_count: u32 },
	/// An ordinary cluster chain (FAT32 root, or any subdirectory).
	Cluster { start_cluster: u32 },
}

/// A raw 32-byte slot, parsed into the fields the driver cares about. Both
/// LFN continuation entries and ordinary short entries use this shape; the
/// caller distinguishes on `attr`.
#[derive(Debug, Clone)]
pub struct RawEntry {
	pub raw: [u8; 32],
}

impl RawEntry {
	pub fn attr(&self) -> u8 {
		self.raw[11]
	}

	pub fn is_free(&self) -> bool {
		self.raw[0] == 0x00 || self.raw[0] == DELETED_MARKER
	}

	pub fn is_end_marker(&self) -> bool {
		self.raw[0] == 0x00
	}

	pub fn is_lfn(&self) -> bool {
		self.attr() == LFN_ATTR
	}

	pub fn short_name(&self) -> ShortName {
		let mut name_bytes = [0u8; 11];
		name_bytes.copy_from_slice(&self.raw[0..11]);
		ShortName::from_raw(&name_bytes)
	}

	pub fn first_cluster(&self) -> u32 {
		let hi = u16::from_le_bytes([self.raw[20], self.raw[21]]) as u32;
		let lo = u16::from_le_bytes([self.raw[26], self.raw[27]]) as u32;
		(hi << 16) | lo
	}

	pub fn set_first_cluster(&mut self, cluster: u32) {
		self.raw[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
		self.raw[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
	}

	pub fn file_size(&self) -> u32 {
		u32::from_le_bytes([self.raw[28], self.raw[29], self.raw[30], self.raw[31]])
	}

	pub fn set_file_size(&mut self, size: u32) {
		self.raw[28..32].copy_from_slice(&size.to_le_bytes());
	}

	pub fn set_attr(&mut self, attr: u8) {
		self.raw[11] = attr;
	}

	pub fn mark_deleted(&mut self) {
		self.raw[0] = DELETED_MARKER;
	}

	pub fn new_short(short: &ShortName, attr: u8, cluster: u32, size: u32) -> RawEntry {
		let mut raw = [0u8; 32];
		raw[0..11].copy_from_slice(&short.to_raw());
		raw[11] = attr;
		let mut entry = RawEntry { raw };
		entry.set_first_cluster(cluster);
		entry.set_file_size(size);
		entry
	}
}

/// A logical directory entry, reassembled from one short entry plus any
/// LFN continuation entries that precede it.
#[derive(Debug, Clone)]
pub struct LogicalEntry {
	pub name: String,
	pub short_name: ShortName,
	pub attr: u8,
	pub first_cluster: u32,
	pub size: u32,
	/// Index of the short entry (last physical slot of the group); the LFN
	/// entries, if any, occupy the `lfn_count` slots immediately before it.
	pub index: u32,
	pub lfn_count: u32,
}

impl LogicalEntry {
	pub fn is_dir(&self) -> bool {
		self.attr & ATTR_DIR != 0
	}
}

fn sector_for_index(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, index: u32, extend: bool) -> Result<Option<(u64, usize)>> {
	let bps = bs.bytes_per_sector as u64;
	match loc {
		DirLocation::FixedRoot { start_sector, entry_count } => {
			if index >= entry_count {
				return Ok(None);
			}
			let byte_off = index as u64 * ENTRY_SIZE;
			Ok(Some((start_sector as u64 + byte_off / bps, (byte_off % bps) as usize)))
		}
		DirLocation::Cluster { start_cluster } => {
			let byte_off = index as u64 * ENTRY_SIZE;
			let cluster_size = bs.cluster_size() as u64;
			let cluster_index_off = byte_off % cluster_size;
			let cluster = cluster_for_offset(dev, bs, start_cluster, byte_off, extend)?;
			let Some(cluster) = cluster else { return Ok(None) };
			let sector_in_cluster = cluster_index_off / bps;
			let sector = bs.cluster_to_sector(cluster) as u64 + sector_in_cluster;
			Ok(Some((sector, (cluster_index_off % bps) as usize)))
		}
	}
}

/// `dir_sdi` + a single-slot read: fetch the raw entry at linear `index`,
/// or `None` past the directory's current extent.
pub fn read_raw(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, index: u32) -> Result<Option<RawEntry>> {
	let Some((sector, within)) = sector_for_index(dev, bs, loc, index, false)? else {
		return Ok(None);
	};
	let mut buf = alloc::vec![0u8; bs.bytes_per_sector as usize];
	dev.read_block(sector, &mut buf).map_err(|_| Error::EIO)?;
	let mut raw = [0u8; 32];
	raw.copy_from_slice(&buf[within..within + 32]);
	Ok(Some(RawEntry { raw }))
}

/// `dir_next`'s write counterpart: store `entry` at linear `index`,
/// allocating a new cluster if this walks past the chain's current end
/// (writable mounts only).
pub fn write_raw(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, index: u32, entry: &RawEntry) -> Result<()> {
	let Some((sector, within)) = sector_for_index(dev, bs, loc, index, true)? else {
		return Err(Error::ENOSPC);
	};
	let mut buf = alloc::vec![0u8; bs.bytes_per_sector as usize];
	dev.read_block(sector, &mut buf).map_err(|_| Error::EIO)?;
	buf[within..within + 32].copy_from_slice(&entry.raw);
	dev.write_block(sector, &buf).map_err(|_| Error::EIO)
}

/// `dir_alloc(n)`: scan for `n` consecutive free (blank or deleted) slots
/// starting from the top, returning the index of the first. Extends the
/// chain (or fails with `ENOSPC` for a full fixed root) when no run of `n`
/// existing slots is free.
pub fn dir_alloc(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, n: u32) -> Result<u32> {
	let mut run_start = 0u32;
	let mut run_len = 0u32;
	let mut index = 0u32;
	loop {
		let mut existing = read_raw(dev, bs, loc, index)?;
		if existing.is_none() {
			match loc {
				DirLocation::FixedRoot { .. } => return Err(Error::ENOSPC),
				DirLocation::Cluster { .. } => {
					// Past the chain's current end: extending writes a new,
					// zero-filled cluster whose slots all read back free.
					let blank = RawEntry { raw: [0u8; 32] };
					write_raw(dev, bs, loc, index, &blank)?;
					existing = Some(blank);
				}
			}
		}
		let free = existing.as_ref().map(|e| e.is_free()).unwrap_or(true);
		if free {
			if run_len == 0 {
				run_start = index;
			}
			run_len += 1;
			if run_len == n {
				return Ok(run_start);
			}
		} else {
			run_len = 0;
		}
		index += 1;
		if index > 1 << 20 {
			return Err(Error::ENOSPC);
		}
	}
}

/// List every logical entry in the directory starting at `from_logical_index`
/// (0-based count of non-LFN, non-volume-label entries seen so far), one
/// at a time (used by `readdir`).
pub fn nth_logical_entry(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, from_logical_index: usize) -> Result<Option<LogicalEntry>> {
	let mut seen = 0usize;
	let mut pending_lfn: Vec<[u8; 32]> = Vec::new();
	let mut index = 0u32;
	loop {
		let Some(entry) = read_raw(dev, bs, loc, index)? else {
			return Ok(None);
		};
		if entry.is_end_marker() {
			return Ok(None);
		}
		if entry.raw[0] == DELETED_MARKER {
			pending_lfn.clear();
			index += 1;
			continue;
		}
		if entry.is_lfn() {
			pending_lfn.push(entry.raw);
			index += 1;
			continue;
		}
		if entry.attr() & ATTR_VOL != 0 {
			pending_lfn.clear();
			index += 1;
			continue;
		}

		let short = entry.short_name();
		let long_name = if pending_lfn.is_empty() {
			short.display()
		} else {
			name::decode_lfn_entries(&pending_lfn)
		};
		let lfn_count = pending_lfn.len() as u32;
		pending_lfn.clear();

		if seen == from_logical_index {
			return Ok(Some(LogicalEntry {
				name: long_name,
				short_name: short,
				attr: entry.attr(),
				first_cluster: entry.first_cluster(),
				size: entry.file_size(),
				index,
				lfn_count,
			}));
		}
		seen += 1;
		index += 1;
	}
}

/// Find a logical entry by exact long (or bare short) name. Case-sensitive
/// on the long name, case-insensitive on a short-only comparison (FAT's
/// 8.3 names carry no case).
pub fn find_entry(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, name: &str) -> Result<Option<LogicalEntry>> {
	let mut i = 0usize;
	while let Some(entry) = nth_logical_entry(dev, bs, loc, i)? {
		if entry.name == name || entry.short_name.display().eq_ignore_ascii_case(name) {
			return Ok(Some(entry));
		}
		i += 1;
	}
	Ok(None)
}

/// Insert a new logical entry named `name` with `attr`/`first_cluster`/
/// `size`, generating and reserving LFN entries as needed, and placing the
/// short entry last in the allocated run.
pub fn insert_entry(
	dev: &dyn BlockDevice,
	bs: &BootSector,
	loc: DirLocation,
	long_name: &str,
	attr: u8,
	first_cluster: u32,
	size: u32,
) -> Result<LogicalEntry> {
	if find_entry(dev, bs, loc, long_name)?.is_some() {
		return Err(Error::EEXIST);
	}

	let existing_shorts: Vec<ShortName> = {
		let mut shorts = Vec::new();
		let mut i = 0usize;
		while let Some(e) = nth_logical_entry(dev, bs, loc, i)? {
			shorts.push(e.short_name);
			i += 1;
		}
		shorts
	};
	let short = name::generate_short_name(long_name, |candidate| existing_shorts.contains(candidate));

	let needs_lfn = short.display() != long_name;
	let lfn_entries = if needs_lfn {
		name::build_lfn_entries(long_name, short.checksum())
	} else {
		Vec::new()
	};
	let total = lfn_entries.len() as u32 + 1;
	let base_index = dir_alloc(dev, bs, loc, total)?;

	for (i, raw) in lfn_entries.iter().enumerate() {
		write_raw(dev, bs, loc, base_index + i as u32, &RawEntry { raw: *raw })?;
	}
	let short_index = base_index + lfn_entries.len() as u32;
	let short_entry = RawEntry::new_short(&short, attr, first_cluster, size);
	write_raw(dev, bs, loc, short_index, &short_entry)?;

	Ok(LogicalEntry {
		name: String::from(long_name),
		short_name: short,
		attr,
		first_cluster,
		size,
		index: short_index,
		lfn_count: lfn_entries.len() as u32,
	})
}

/// Mark a logical entry's short entry and every LFN entry preceding it as
/// deleted (spec.md 6: 0xE5 marker).
pub fn delete_entry(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, entry: &LogicalEntry) -> Result<()> {
	for i in 0..=entry.lfn_count {
		let idx = entry.index - i;
		if let Some(mut raw) = read_raw(dev, bs, loc, idx)? {
			raw.mark_deleted();
			write_raw(dev, bs, loc, idx, &raw)?;
		}
	}
	Ok(())
}

/// Update the short entry's attr/size/first_cluster fields in place (used
/// by `chmod`, `truncate`, and write-induced chain extension).
pub fn update_entry(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, entry: &LogicalEntry, attr: u8, first_cluster: u32, size: u32) -> Result<()> {
	let mut raw = read_raw(dev, bs, loc, entry.index)?.ok_or(Error::ENOENT)?;
	raw.set_attr(attr);
	raw.set_first_cluster(first_cluster);
	raw.set_file_size(size);
	write_raw(dev, bs, loc, entry.index, &raw)
}

pub fn is_empty_dir(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation) -> Result<bool> {
	// "." and ".." are the only entries an empty directory carries.
	Ok(nth_logical_entry(dev, bs, loc, 2)?.is_none())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::MemoryBlockDevice;
	use crate::fs::fat::boot_sector::build_fat32;
	use crate::fs::fat::cluster::create_chain;

	fn fresh_dir() -> (MemoryBlockDevice, BootSector, DirLocation) {
		let dev = MemoryBlockDevice::new(512, 4096);
		let mut sector = [0u8; 512];
		build_fat32(&mut sector, 4096, 1, 32);
		dev.write_block(0, &sector).unwrap();
		let bs = BootSector::parse(&sector).unwrap();
		let root = create_chain(&dev, &bs, 2, None).unwrap();
		(dev, bs, DirLocation::Cluster { start_cluster: root })
	}

	#[test]
	fn insert_then_find_short_name_round_trips() {
		let (dev, bs, loc) = fresh_dir();
		let entry = insert_entry(&dev, &bs, loc, "README", ATTR_ARC, 5, 100).unwrap();
		assert_eq!(entry.short_name.display(), "README");
		let found = find_entry(&dev, &bs, loc, "README").unwrap().unwrap();
		assert_eq!(found.first_cluster, 5);
		assert_eq!(found.size, 100);
	}

	#[test]
	fn long_name_gets_lfn_entries_and_tilde_short_name() {
		let (dev, bs, loc) = fresh_dir();
		let entry = insert_entry(&dev, &bs, loc, "Long File Name.txt", ATTR_ARC, 9, 0).unwrap();
		assert_eq!(entry.short_name.display(), "LONGFI~1.TXT");
		assert!(entry.lfn_count > 0);
		let found = find_entry(&dev, &bs, loc, "Long File Name.txt").unwrap().unwrap();
		assert_eq!(found.name, "Long File Name.txt");
	}

	#[test]
	fn duplicate_insert_is_rejected() {
		let (dev, bs, loc) = fresh_dir();
		insert_entry(&dev, &bs, loc, "a.txt", ATTR_ARC, 3, 0).unwrap();
		assert_eq!(insert_entry(&dev, &bs, loc, "a.txt", ATTR_ARC, 4, 0).err(), Some(Error::EEXIST));
	}

	#[test]
	fn delete_entry_frees_slots_for_reuse() {
		let (dev, bs, loc) = fresh_dir();
		let entry = insert_entry(&dev, &bs, loc, "Long File Name.txt", ATTR_ARC, 9, 0).unwrap();
		delete_entry(&dev, &bs, loc, &entry).unwrap();
		assert!(find_entry(&dev, &bs, loc, "Long File Name.txt").unwrap().is_none());
	}

	#[test]
	fn update_entry_changes_attr_and_size() {
		let (dev, bs, loc) = fresh_dir();
		let entry = insert_entry(&dev, &bs, loc, "a.txt", ATTR_ARC, 3, 0).unwrap();
		update_entry(&dev, &bs, loc, &entry, ATTR_ARC | ATTR_RDO, 3, 42).unwrap();
		let found = find_entry(&dev, &bs, loc, "a.txt").unwrap().unwrap();
		assert_eq!(found.attr, ATTR_ARC | ATTR_RDO);
		assert_eq!(found.size, 42);
	}
}
