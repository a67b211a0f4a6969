// SPDX-License-Identifier: GPL-2.0

//! FAT12/16/32 filesystem driver — spec.md 4.6.
//!
//! Wires the boot-sector/FAT-table/directory/name/file-data submodules into
//! the [`FileSystem`]/[`SuperBlockOps`]/[`VnodeOps`] triad `ramfs` also
//! implements. Unlike ramfs, a vnode's payload isn't kept in memory: every
//! call re-reads or re-writes the backing [`BlockDevice`] directly, and the
//! `nodes`/`vnodes` tables here only cache enough to find a vnode's parent
//! directory entry again (to write size/first-cluster back) and to hand the
//! same `Arc<Vnode>` to repeat lookups of the same directory slot.
//!
//! Hard links aren't supported (`link` always fails `ENOTSUP`), which keeps
//! one invariant simple: a directory entry is the only thing that can name a
//! cluster chain, so freeing that chain at the vnode's last release
//! (`delete_vnode`) can never orphan a second name still pointing at it.

pub mod boot_sector;
pub mod cluster;
pub mod dir;
pub mod file;
pub mod name;

use alloc::string::String;
use alloc::sync::{Arc, Weak};

use crate::device::{self, BlockDevice};
use crate::error::{Error, Result};
use crate::fs::fat::boot_sector::{BootSector, FatKind};
use crate::fs::fat::dir::{DirLocation, LogicalEntry, RawEntry};
use crate::fs::fat::name::ShortName;
use crate::fs::mode::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, S_IFDIR, S_IFREG, S_IWGRP, S_IWOTH, S_IWUSR};
use crate::fs::super_block::{fs_register, FileSystem, StatFs, SuperBlock, SuperBlockOps};
use crate::fs::vnode::{DirEntry, Vnode, VnodeOps, VnodeRef, VnodeType};
use crate::sync::Mutex;
use crate::types::{Gid, Uid, ROOT_GID, ROOT_UID};

/// Reserved inode number for the volume root. Every other vnode's inode
/// packs `(directory-identifying cluster << 32) | entry index`, and cluster
/// numbers start at 2 (FAT12/16's fixed root uses the sentinel key 1), so
/// this value can never collide with one.
const ROOT_INO: u64 = 0;
/// Key used in the packed-inode scheme for FAT12/16's fixed root region,
/// which has no cluster number of its own.
const FIXED_ROOT_KEY: u64 = 1;

fn dir_key(loc: DirLocation) -> u64 {
	match loc {
		DirLocation::FixedRoot { .. } => FIXED_ROOT_KEY,
		DirLocation::Cluster { start_cluster } => start_cluster as u64,
	}
}

fn packed_ino(loc: DirLocation, entry_index: u32) -> u64 {
	(dir_key(loc) << 32) | entry_index as u64
}

/// What this driver remembers about one open vnode, enough to re-locate and
/// rewrite its directory entry without keeping the entry's bytes resident.
struct ParentRef {
	dir_loc: DirLocation,
	entry_index: u32,
	lfn_count: u32,
	attr: u8,
}

struct FatNodeInfo {
	/// `Some` (the directory's own slot location) if this node is a
	/// directory; `None` for a regular file.
	self_loc: Option<DirLocation>,
	first_cluster: Mutex<u32>,
	uid: Mutex<Uid>,
	gid: Mutex<Gid>,
	/// `None` only for the root, which has no entry naming it.
	parent: Option<ParentRef>,
}

struct FatFsState {
	dev: Arc<dyn BlockDevice>,
	bs: BootSector,
	nodes: Mutex<alloc::collections::BTreeMap<u64, FatNodeInfo>>,
	vnodes: Mutex<alloc::collections::BTreeMap<u64, VnodeRef>>,
	sb: Mutex<Weak<SuperBlock>>,
}

impl FatFsState {
	fn root_loc(&self) -> DirLocation {
		match self.bs.kind {
			FatKind::Fat32 => DirLocation::Cluster { start_cluster: self.bs.root_cluster },
			FatKind::Fat16 | FatKind::Fat12 => DirLocation::FixedRoot {
				start_sector: self.bs.root_dir_start_sector(),
				entry_count: self.bs.root_entry_count as u32,
			},
		}
	}
}

fn dot_short_name() -> ShortName {
	let mut base = [b' '; 8];
	base[0] = b'.';
	ShortName { base, ext: [b' '; 3] }
}

fn dotdot_short_name() -> ShortName {
	let mut base = [b' '; 8];
	base[0] = b'.';
	base[1] = b'.';
	ShortName { base, ext: [b' '; 3] }
}

/// Write the "." and ".." entries a freshly allocated directory cluster
/// needs at slots 0 and 1 (spec.md 6). `parent_cluster` is `0` when the new
/// directory's parent is the root (FAT's convention for ".." pointing at a
/// fixed or cluster-2 root).
fn write_dot_entries(dev: &dyn BlockDevice, bs: &BootSector, loc: DirLocation, self_cluster: u32, parent_cluster: u32) -> Result<()> {
	let dot = RawEntry::new_short(&dot_short_name(), dir::ATTR_DIR, self_cluster, 0);
	dir::write_raw(dev, bs, loc, 0, &dot)?;
	let dotdot = RawEntry::new_short(&dotdot_short_name(), dir::ATTR_DIR, parent_cluster, 0);
	dir::write_raw(dev, bs, loc, 1, &dotdot)
}

/// Shared `VnodeOps` implementation for every vnode this mounted volume
/// hands out.
struct FatOps {
	state: Arc<FatFsState>,
}

impl FatOps {
	fn self_loc_of(&self, dir: &VnodeRef) -> Result<DirLocation> {
		let nodes = self.state.nodes.lock();
		let info = nodes.get(&dir.ino).ok_or(Error::ENOENT)?;
		info.self_loc.ok_or(Error::ENOTDIR)
	}

	fn first_cluster_of(&self, node: &VnodeRef) -> Result<u32> {
		let nodes = self.state.nodes.lock();
		let info = nodes.get(&node.ino).ok_or(Error::ENOENT)?;
		if info.self_loc.is_some() {
			return Err(Error::EISDIR);
		}
		Ok(*info.first_cluster.lock())
	}

	/// Find-or-create the vnode naming the slot at `entry.index` within
	/// `parent_loc`.
	fn vnode_for_entry(&self, parent_loc: DirLocation, entry: &LogicalEntry) -> VnodeRef {
		let ino = packed_ino(parent_loc, entry.index);
		if let Some(existing) = self.state.vnodes.lock().get(&ino) {
			return existing.clone();
		}

		let is_dir = entry.is_dir();
		let self_loc = is_dir.then_some(DirLocation::Cluster { start_cluster: entry.first_cluster });
		let mut mode = if is_dir { S_IFDIR | DEFAULT_DIR_MODE } else { S_IFREG | DEFAULT_FILE_MODE };
		if entry.attr & dir::ATTR_RDO != 0 {
			mode &= !(S_IWUSR | S_IWGRP | S_IWOTH);
		}

		let info = FatNodeInfo {
			self_loc,
			first_cluster: Mutex::new(entry.first_cluster),
			uid: Mutex::new(ROOT_UID),
			gid: Mutex::new(ROOT_GID),
			parent: Some(ParentRef {
				dir_loc: parent_loc,
				entry_index: entry.index,
				lfn_count: entry.lfn_count,
				attr: entry.attr,
			}),
		};
		self.state.nodes.lock().insert(ino, info);

		let ops: Arc<dyn VnodeOps> = Arc::new(FatOps { state: self.state.clone() });
		let vnode = Vnode::new(ino, mode, ops, self.state.sb.lock().clone());
		*vnode.len.lock() = entry.size as u64;
		self.state.vnodes.lock().insert(ino, vnode.clone());
		vnode
	}

	/// Write a file's new first cluster and size back to its directory
	/// entry and to the cached node info, after a write or truncate.
	fn sync_entry(&self, node: &VnodeRef, new_first: u32, new_size: u64) -> Result<()> {
		let nodes = self.state.nodes.lock();
		let info = nodes.get(&node.ino).ok_or(Error::ENOENT)?;
		*info.first_cluster.lock() = new_first;
		let parent = info.parent.as_ref().ok_or(Error::EINVAL)?;
		let stub = LogicalEntry {
			name: String::new(),
			short_name: ShortName { base: [0u8; 8], ext: [0u8; 3] },
			attr: parent.attr,
			first_cluster: new_first,
			size: new_size as u32,
			index: parent.entry_index,
			lfn_count: parent.lfn_count,
		};
		dir::update_entry(&*self.state.dev, &self.state.bs, parent.dir_loc, &stub, parent.attr, new_first, new_size as u32)?;
		drop(nodes);
		*node.len.lock() = new_size;
		Ok(())
	}
}

impl VnodeOps for FatOps {
	fn lookup(&self, dir: &VnodeRef, name: &str) -> Result<VnodeRef> {
		if dir.ino == ROOT_INO && (name == "." || name == "..") {
			return Ok(dir.clone());
		}
		let loc = self.self_loc_of(dir)?;
		let entry = dir::find_entry(&*self.state.dev, &self.state.bs, loc, name)?.ok_or(Error::ENOENT)?;
		Ok(self.vnode_for_entry(loc, &entry))
	}

	fn create(&self, dir: &VnodeRef, name: &str, mode: u32) -> Result<VnodeRef> {
		let loc = self.self_loc_of(dir)?;
		let dev = &*self.state.dev;
		let bs = &self.state.bs;
		let mut attr = dir::ATTR_ARC;
		if mode & (S_IWUSR | S_IWGRP | S_IWOTH) == 0 {
			attr |= dir::ATTR_RDO;
		}
		let entry = dir::insert_entry(dev, bs, loc, name, attr, cluster::FREE_CLUSTER, 0)?;
		Ok(self.vnode_for_entry(loc, &entry))
	}

	fn mkdir(&self, dir: &VnodeRef, name: &str, _mode: u32) -> Result<VnodeRef> {
		let parent_loc = self.self_loc_of(dir)?;
		let dev = &*self.state.dev;
		let bs = &self.state.bs;
		if dir::find_entry(dev, bs, parent_loc, name)?.is_some() {
			return Err(Error::EEXIST);
		}
		let new_cluster = cluster::create_chain(dev, bs, 2, None)?;
		if new_cluster == 0 {
			return Err(Error::ENOSPC);
		}
		let self_loc = DirLocation::Cluster { start_cluster: new_cluster };
		let parent_cluster = match parent_loc {
			DirLocation::FixedRoot { .. } => 0,
			DirLocation::Cluster { start_cluster } => start_cluster,
		};
		write_dot_entries(dev, bs, self_loc, new_cluster, parent_cluster)?;
		let entry = dir::insert_entry(dev, bs, parent_loc, name, dir::ATTR_DIR, new_cluster, 0)?;
		Ok(self.vnode_for_entry(parent_loc, &entry))
	}

	fn rmdir(&self, dir: &VnodeRef, name: &str) -> Result<()> {
		let parent_loc = self.self_loc_of(dir)?;
		let dev = &*self.state.dev;
		let bs = &self.state.bs;
		let entry = dir::find_entry(dev, bs, parent_loc, name)?.ok_or(Error::ENOENT)?;
		if !entry.is_dir() {
			return Err(Error::ENOTDIR);
		}
		let child_loc = DirLocation::Cluster { start_cluster: entry.first_cluster };
		if !dir::is_empty_dir(dev, bs, child_loc)? {
			return Err(Error::ENOTEMPTY);
		}
		dir::delete_entry(dev, bs, parent_loc, &entry)
	}

	fn unlink(&self, dir: &VnodeRef, name: &str) -> Result<()> {
		let parent_loc = self.self_loc_of(dir)?;
		let dev = &*self.state.dev;
		let bs = &self.state.bs;
		let entry = dir::find_entry(dev, bs, parent_loc, name)?.ok_or(Error::ENOENT)?;
		if entry.is_dir() {
			return Err(Error::EISDIR);
		}
		// Only the directory entry goes away here; the cluster chain is
		// freed in `delete_vnode` once nothing still holds the vnode (an
		// open file descriptor can keep reading an unlinked file).
		dir::delete_entry(dev, bs, parent_loc, &entry)
	}

	fn link(&self, _dir: &VnodeRef, _name: &str, _target: &VnodeRef) -> Result<()> {
		Err(Error::ENOTSUP)
	}

	fn readdir(&self, dir: &VnodeRef, index: usize) -> Result<Option<DirEntry>> {
		let loc = self.self_loc_of(dir)?;
		let Some(entry) = dir::nth_logical_entry(&*self.state.dev, &self.state.bs, loc, index)? else {
			return Ok(None);
		};
		let kind = if entry.is_dir() { VnodeType::Directory } else { VnodeType::Regular };
		Ok(Some(DirEntry {
			name: entry.name.clone(),
			ino: packed_ino(loc, entry.index),
			kind,
		}))
	}

	fn read(&self, node: &VnodeRef, offset: u64, buf: &mut [u8]) -> Result<usize> {
		let first = self.first_cluster_of(node)?;
		file::read(&*self.state.dev, &self.state.bs, first, offset, buf)
	}

	fn write(&self, node: &VnodeRef, offset: u64, buf: &[u8]) -> Result<usize> {
		if *node.mode.lock() & (S_IWUSR | S_IWGRP | S_IWOTH) == 0 {
			return Err(Error::EPERM);
		}
		let first = self.first_cluster_of(node)?;
		let (new_first, written) = file::write(&*self.state.dev, &self.state.bs, first, offset, buf)?;
		let new_len = core::cmp::max(*node.len.lock(), offset + written as u64);
		self.sync_entry(node, new_first, new_len)?;
		Ok(written)
	}

	fn truncate(&self, node: &VnodeRef, size: u64) -> Result<()> {
		let first = self.first_cluster_of(node)?;
		let new_first = file::truncate(&*self.state.dev, &self.state.bs, first, size)?;
		self.sync_entry(node, new_first, size)
	}

	fn owner(&self, node: &VnodeRef) -> (Uid, Gid) {
		let nodes = self.state.nodes.lock();
		nodes.get(&node.ino).map(|i| (*i.uid.lock(), *i.gid.lock())).unwrap_or((ROOT_UID, ROOT_GID))
	}

	fn set_owner(&self, node: &VnodeRef, uid: Uid, gid: Gid) -> Result<()> {
		let nodes = self.state.nodes.lock();
		let info = nodes.get(&node.ino).ok_or(Error::ENOENT)?;
		*info.uid.lock() = uid;
		*info.gid.lock() = gid;
		Ok(())
	}

	/// Unlike the default `set_mode`, FAT has an on-disk copy of the write
	/// permission (the RDO attribute byte), so `chmod` needs to flip it there
	/// too, not just in the in-memory `node.mode` the default updates. The
	/// root has no directory entry of its own to persist into.
	fn set_mode(&self, node: &VnodeRef, mode: u32) -> Result<()> {
		let mut nodes = self.state.nodes.lock();
		let info = nodes.get_mut(&node.ino).ok_or(Error::ENOENT)?;
		if let Some(parent) = info.parent.as_mut() {
			let mut attr = parent.attr & !dir::ATTR_RDO;
			if mode & (S_IWUSR | S_IWGRP | S_IWOTH) == 0 {
				attr |= dir::ATTR_RDO;
			}
			let first_cluster = *info.first_cluster.lock();
			let size = *node.len.lock() as u32;
			let stub = LogicalEntry {
				name: String::new(),
				short_name: ShortName { base: [0u8; 8], ext: [0u8; 3] },
				attr,
				first_cluster,
				size,
				index: parent.entry_index,
				lfn_count: parent.lfn_count,
			};
			dir::update_entry(&*self.state.dev, &self.state.bs, parent.dir_loc, &stub, attr, first_cluster, size)?;
			parent.attr = attr;
		}
		drop(nodes);
		*node.mode.lock() = mode;
		Ok(())
	}

	fn delete_vnode(&self, node: &VnodeRef) {
		free_node(&self.state, node);
	}
}

/// Shared by `FatOps::delete_vnode` and `FatSuperBlockOps::delete_vnode`:
/// drop the cached node/vnode entries and, for a file, free its cluster
/// chain now that nothing names it anymore.
fn free_node(state: &Arc<FatFsState>, node: &VnodeRef) {
	let info = state.nodes.lock().remove(&node.ino);
	state.vnodes.lock().remove(&node.ino);
	if let Some(info) = info {
		// A directory's own cluster chain (holding its "." / ".." and
		// children slots) is just as much an orphaned chain once `rmdir`
		// has removed the only entry that named it, so both cases free
		// through the same first_cluster the node was tracking.
		let first = *info.first_cluster.lock();
		if first >= 2 {
			let _ = cluster::remove_chain(&*state.dev, &state.bs, first);
		}
	}
}

struct FatSuperBlockOps {
	state: Arc<FatFsState>,
}

impl SuperBlockOps for FatSuperBlockOps {
	fn statfs(&self) -> StatFs {
		let bs = &self.state.bs;
		let dev = &*self.state.dev;
		let data_sectors = bs.total_sectors.saturating_sub(bs.data_start_sector());
		let max_cluster = data_sectors / bs.sectors_per_cluster as u32 + 2;
		let mut free_clusters = 0u64;
		let mut total_clusters = 0u64;
		for c in 2..max_cluster {
			total_clusters += 1;
			if cluster::read_entry(dev, bs, c).unwrap_or(1) == cluster::FREE_CLUSTER {
				free_clusters += 1;
			}
		}
		StatFs {
			block_size: bs.bytes_per_sector as u32,
			total_blocks: total_clusters * bs.sectors_per_cluster as u64,
			free_blocks: free_clusters * bs.sectors_per_cluster as u64,
			total_inodes: u64::MAX,
			free_inodes: u64::MAX,
		}
	}

	fn get_vnode(&self, ino: u64) -> Result<VnodeRef> {
		self.state.vnodes.lock().get(&ino).cloned().ok_or(Error::ENOENT)
	}

	fn delete_vnode(&self, node: &VnodeRef) {
		free_node(&self.state, node);
	}

	fn umount(&self) -> Result<()> {
		self.state.dev.flush()
	}
}

fn mount_device(dev: Arc<dyn BlockDevice>) -> Result<Arc<SuperBlock>> {
	let mut sector = [0u8; boot_sector::SECTOR_SIZE];
	device::read_at(&*dev, 0, &mut sector)?;
	let bs = BootSector::parse(&sector)?;

	let state = Arc::new(FatFsState {
		dev,
		bs,
		nodes: Mutex::new(alloc::collections::BTreeMap::new()),
		vnodes: Mutex::new(alloc::collections::BTreeMap::new()),
		sb: Mutex::new(Weak::new()),
	});

	let root_loc = state.root_loc();
	let root_first_cluster = match bs.kind {
		FatKind::Fat32 => bs.root_cluster,
		FatKind::Fat16 | FatKind::Fat12 => 0,
	};
	state.nodes.lock().insert(
		ROOT_INO,
		FatNodeInfo {
			self_loc: Some(root_loc),
			first_cluster: Mutex::new(root_first_cluster),
			uid: Mutex::new(ROOT_UID),
			gid: Mutex::new(ROOT_GID),
			parent: None,
		},
	);

	let ops: Arc<dyn VnodeOps> = Arc::new(FatOps { state: state.clone() });
	let root = Vnode::new(ROOT_INO, S_IFDIR | DEFAULT_DIR_MODE, ops, Weak::new());
	state.vnodes.lock().insert(ROOT_INO, root.clone());

	let sb = SuperBlock::new("fat", root, Arc::new(FatSuperBlockOps { state: state.clone() }));
	*state.sb.lock() = Arc::downgrade(&sb);
	Ok(sb)
}

pub struct FatFsType;

impl FileSystem for FatFsType {
	fn name(&self) -> &str {
		"fat"
	}

	fn mount(&self, source: &str) -> Result<Arc<SuperBlock>> {
		let dev = device::lookup_block_device(source).ok_or(Error::ENODEV)?;
		mount_device(dev)
	}
}

/// Register the `fat` filesystem type (called once from kernel init).
pub fn register() -> Result<()> {
	fs_register(Arc::new(FatFsType))
}

/// Format `dev` as a fresh FAT32 volume (spec.md 4.6 "Format"): a blank boot
/// sector, a zeroed FAT region, and the root directory's single cluster
/// marked end-of-chain.
pub fn format(dev: &dyn BlockDevice, sectors_per_cluster: u8) -> Result<()> {
	let bps = boot_sector::SECTOR_SIZE as u32;
	let total_sectors = (dev.block_count() * dev.block_size() as u64 / bps as u64) as u32;
	let approx_clusters = total_sectors / sectors_per_cluster as u32;
	let fat_size = (approx_clusters.saturating_mul(4)).div_ceil(bps).max(1);

	let mut sector = [0u8; boot_sector::SECTOR_SIZE];
	boot_sector::build_fat32(&mut sector, total_sectors, sectors_per_cluster, fat_size);
	device::write_at(dev, 0, &sector)?;

	let bs = BootSector::parse(&sector)?;
	let zero = alloc::vec![0u8; bs.bytes_per_sector as usize];
	for s in bs.fat_start_sector()..bs.data_start_sector() {
		dev.write_block(s as u64, &zero).map_err(|_| Error::EIO)?;
	}
	cluster::write_entry(dev, &bs, 0, 0x0FFF_FFF8)?;
	cluster::write_entry(dev, &bs, 1, cluster::EOC_FAT32)?;
	cluster::write_entry(dev, &bs, bs.root_cluster, cluster::EOC_FAT32)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::MemoryBlockDevice;
	use crate::fs::mode::DEFAULT_FILE_MODE as FILE_MODE;

	fn fresh_mount() -> Arc<SuperBlock> {
		let dev: Arc<dyn BlockDevice> = Arc::new(MemoryBlockDevice::new(512, 8192));
		format(&*dev, 4).unwrap();
		mount_device(dev).unwrap()
	}

	#[test]
	fn format_then_mount_yields_empty_root() {
		let sb = fresh_mount();
		let root = sb.root.clone();
		assert_eq!(root.vtype(), VnodeType::Directory);
		assert_eq!(root.ops.readdir(&root, 0).unwrap().map(|e| e.name), None);
	}

	#[test]
	fn create_write_read_round_trips() {
		let sb = fresh_mount();
		let root = sb.root.clone();
		let file = root.ops.create(&root, "hello.txt", FILE_MODE).unwrap();
		file.ops.write(&file, 0, b"hello, fat").unwrap();
		let mut buf = [0u8; 10];
		let n = file.ops.read(&file, 0, &mut buf).unwrap();
		assert_eq!(n, 10);
		assert_eq!(&buf, b"hello, fat");

		let again = root.ops.lookup(&root, "hello.txt").unwrap();
		assert!(Arc::ptr_eq(&again, &file));
	}

	#[test]
	fn mkdir_then_dot_entries_resolve() {
		let sb = fresh_mount();
		let root = sb.root.clone();
		let sub = root.ops.mkdir(&root, "sub", DEFAULT_DIR_MODE).unwrap();
		let dot = sub.ops.lookup(&sub, ".").unwrap();
		assert!(Arc::ptr_eq(&dot, &sub));
		let dotdot = sub.ops.lookup(&sub, "..").unwrap();
		assert!(Arc::ptr_eq(&dotdot, &root));
	}

	#[test]
	fn rmdir_non_empty_is_rejected_then_succeeds_once_emptied() {
		let sb = fresh_mount();
		let root = sb.root.clone();
		let sub = root.ops.mkdir(&root, "sub", DEFAULT_DIR_MODE).unwrap();
		sub.ops.create(&sub, "f", FILE_MODE).unwrap();
		assert_eq!(root.ops.rmdir(&root, "sub").err(), Some(Error::ENOTEMPTY));
		sub.ops.unlink(&sub, "f").unwrap();
		assert!(root.ops.rmdir(&root, "sub").is_ok());
		assert_eq!(root.ops.lookup(&root, "sub").err(), Some(Error::ENOENT));
	}

	#[test]
	fn unlink_then_last_release_frees_chain_for_reuse() {
		let sb = fresh_mount();
		let root = sb.root.clone();
		let file = root.ops.create(&root, "big", FILE_MODE).unwrap();
		file.ops.write(&file, 0, &[7u8; 4096 * 3]).unwrap();
		root.ops.unlink(&root, "big").unwrap();
		assert_eq!(root.ops.lookup(&root, "big").err(), Some(Error::ENOENT));
		let free_before = sb.ops.statfs().free_blocks;
		// The directory entry is already gone; freeing the chain itself
		// waits for the vnode's last logical reference to go away, same as
		// an open file descriptor keeping an unlinked file's data alive.
		file.vrele();
		let free_after = sb.ops.statfs().free_blocks;
		assert!(free_after > free_before);
	}

	#[test]
	fn hard_link_is_not_supported() {
		let sb = fresh_mount();
		let root = sb.root.clone();
		let file = root.ops.create(&root, "a", FILE_MODE).unwrap();
		assert_eq!(root.ops.link(&root, "b", &file).err(), Some(Error::ENOTSUP));
	}

	#[test]
	fn chmod_persists_rdo_attr_on_disk() {
		let dev: Arc<dyn BlockDevice> = Arc::new(MemoryBlockDevice::new(512, 8192));
		format(&*dev, 4).unwrap();
		let sb = mount_device(dev.clone()).unwrap();
		let root = sb.root.clone();
		let file = root.ops.create(&root, "ro.txt", FILE_MODE).unwrap();

		file.ops.set_mode(&file, FILE_MODE & !(S_IWUSR | S_IWGRP | S_IWOTH)).unwrap();
		assert_eq!(file.ops.write(&file, 0, b"x").err(), Some(Error::EPERM));

		let mut sector = [0u8; boot_sector::SECTOR_SIZE];
		device::read_at(&*dev, 0, &mut sector).unwrap();
		let bs = BootSector::parse(&sector).unwrap();
		let root_loc = DirLocation::Cluster { start_cluster: bs.root_cluster };
		let entry = dir::find_entry(&*dev, &bs, root_loc, "ro.txt").unwrap().unwrap();
		assert!(entry.attr & dir::ATTR_RDO != 0, "RDO bit must be persisted on disk, not just in node.mode");

		// Restoring write permission must clear the on-disk bit too, not just
		// let it linger until some other field happens to rewrite the entry.
		file.ops.set_mode(&file, FILE_MODE).unwrap();
		assert!(file.ops.write(&file, 0, b"x").is_ok());
		let entry = dir::find_entry(&*dev, &bs, root_loc, "ro.txt").unwrap().unwrap();
		assert!(entry.attr & dir::ATTR_RDO == 0);
	}

	#[test]
	fn truncate_shrinks_reported_length() {
		let sb = fresh_mount();
		let root = sb.root.clone();
		let file = root.ops.create(&root, "f", FILE_MODE).unwrap();
		file.ops.write(&file, 0, &[1u8; 9000]).unwrap();
		file.ops.truncate(&file, 10).unwrap();
		assert_eq!(*file.len.lock(), 10);
		let mut buf = [0u8; 9000];
		let n = file.ops.read(&file, 0, &mut buf).unwrap();
		assert_eq!(n, 10);
	}
}
