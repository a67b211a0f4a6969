// SPDX-License-Identifier: GPL-2.0

//! Hierarchical sysctl MIB — spec.md 3, 4.7, 6.
//!
//! Mirrors `kern/sysctl.c`'s shape: a tree of [`Oid`] nodes reachable either
//! by walking integer ids level by level (the wire format, spec.md 6) or by
//! dotted name (`name2oid`, used by the in-kernel/CLI convenience path).
//! FreeBSD's link-set registration (`SET_DECLARE(sysctl_set, ...)`) becomes
//! plain `sysctl::register` calls from each subsystem's init function — the
//! "inventory/plugin registry" pattern spec.md 9 calls out for rewriting
//! macro-based linker sets.
//!
//! Nodes are kept in an `Arc<Mutex<Node>>` tree rather than an intrusive
//! list-with-parent-pointer (the original's `SLIST`/`TAILQ` shape) since
//! `container_of`-style back-pointers aren't idiomatic here (spec.md 9).

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::proc::cred::{priv_check, Credentials, Privilege};
use crate::sync::Mutex;

bitflags::bitflags! {
	/// CTLTYPE (low nibble) and CTLFLAG bits (spec.md 6), packed into one
	/// field the way the original's `oid_kind` does.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct Kind: u32 {
		const NODE = 1;
		const INT = 2;
		const STRING = 3;
		const OPAQUE = 4;
		const S64 = 5;
		const UINT = 6;
		const LONG = 7;
		const ULONG = 8;
		const U64 = 9;

		const RD = 0x1000_0000;
		const WR = 0x2000_0000;
		const KERWR = 0x4000_0000;
		const ANYBODY = 0x8000_0000;
		const SECURE = 0x0200_0000;
		const SKIP = 0x0100_0000;
		const DYN = 0x0400_0000;
		const DYING = 0x0001_0000;
	}
}

impl Kind {
	/// The CTLTYPE bits in the low nibble, matching `CTLTYPE = 0xf`.
	pub fn ctl_type(self) -> u32 {
		self.bits() & 0xf
	}
}

/// `OID_AUTO`: request dynamic id assignment (spec.md 6).
pub const OID_AUTO: i32 = -1;
/// First id handed out to a dynamically registered node (spec.md 6).
pub const CTL_AUTO_START: i32 = 0x100;
/// `CTL_MAXNAME` (spec.md 6): longest dotted-name id path the wire format
/// supports.
pub const CTL_MAXNAME: usize = 24;

/// Request buffer passed to a handler (spec.md 3 "two handler arguments").
/// `old`/`new` play the role of the original's `oldptr`/`newptr` pair; a
/// handler reads `new` (if present) and, for a read, fills `old`.
pub struct SysctlReq<'a> {
	pub cred: &'a Credentials,
	pub old: Option<&'a mut Vec<u8>>,
	pub new: Option<&'a [u8]>,
}

impl<'a> SysctlReq<'a> {
	pub fn read_only(cred: &'a Credentials, old: &'a mut Vec<u8>) -> Self {
		Self {
			cred,
			old: Some(old),
			new: None,
		}
	}

	pub fn write_only(cred: &'a Credentials, new: &'a [u8]) -> Self {
		Self { cred, old: None, new: Some(new) }
	}
}

/// A node's handler (spec.md 3 "handler function"). `arg1`/`arg2` are the
/// node's "two handler arguments" — for the generic handlers below, `arg1`
/// points at backing storage and `arg2` is unused (or a length, for
/// strings).
pub trait Handler: Send + Sync {
	fn handle(&self, node: &Oid, req: &mut SysctlReq<'_>) -> Result<()>;
}

/// One level of the MIB tree (spec.md 3 `sysctl oid node`).
pub struct Oid {
	pub id: i32,
	pub name: String,
	pub kind: Kind,
	pub description: String,
	pub format: String,
	handler: Arc<dyn Handler>,
	children: Mutex<BTreeMap<i32, Arc<Oid>>>,
	/// Handlers currently executing (spec.md 4.7 "running count").
	running: AtomicU32,
	dying: AtomicBool,
}

impl Oid {
	fn leaf(id: i32, name: &str, kind: Kind, format: &str, description: &str, handler: Arc<dyn Handler>) -> Arc<Self> {
		Arc::new(Self {
			id,
			name: name.to_string(),
			kind,
			description: description.to_string(),
			format: format.to_string(),
			handler,
			children: Mutex::new(BTreeMap::new()),
			running: AtomicU32::new(0),
			dying: AtomicBool::new(false),
		})
	}

	fn node(id: i32, name: &str, description: &str) -> Arc<Self> {
		Self::leaf(id, name, Kind::NODE | Kind::RD, "N", description, Arc::new(NodeHandler))
	}

	pub fn is_node(&self) -> bool {
		self.kind.ctl_type() == Kind::NODE.bits()
	}
}

/// A node that exists only to hold children (`CTLTYPE_NODE`); reading it
/// directly is a no-op, matching the original's `sysctl_handle_*` family
/// not being invoked on pure nodes.
struct NodeHandler;
impl Handler for NodeHandler {
	fn handle(&self, _node: &Oid, _req: &mut SysctlReq<'_>) -> Result<()> {
		Err(Error::EISDIR)
	}
}

/// `handle_int` (spec.md 4.7): reads/writes a `Mutex<i32>`.
pub struct IntHandler(pub Mutex<i32>);
impl Handler for IntHandler {
	fn handle(&self, _node: &Oid, req: &mut SysctlReq<'_>) -> Result<()> {
		if let Some(new) = req.new {
			let bytes: [u8; 4] = new.try_into().map_err(|_| Error::EINVAL)?;
			*self.0.lock() = i32::from_ne_bytes(bytes);
		}
		if let Some(old) = req.old.as_deref_mut() {
			old.clear();
			old.extend_from_slice(&self.0.lock().to_ne_bytes());
		}
		Ok(())
	}
}

/// `handle_string` (spec.md 4.7): reads/writes a bounded `Mutex<String>`.
pub struct StringHandler {
	pub value: Mutex<String>,
	pub max_len: usize,
}
impl Handler for StringHandler {
	fn handle(&self, _node: &Oid, req: &mut SysctlReq<'_>) -> Result<()> {
		if let Some(new) = req.new {
			if new.len() > self.max_len {
				return Err(Error::ENAMETOOLONG);
			}
			let s = core::str::from_utf8(new).map_err(|_| Error::EINVAL)?;
			*self.value.lock() = s.to_string();
		}
		if let Some(old) = req.old.as_deref_mut() {
			old.clear();
			old.extend_from_slice(self.value.lock().as_bytes());
		}
		Ok(())
	}
}

/// `handle_opaque` (spec.md 4.7): an immutable blob, read-only by
/// construction (no `new` branch — an opaque struct isn't writable through
/// this handler, matching `sysctl_handle_opaque`'s typical use for stats).
pub struct OpaqueHandler(pub Vec<u8>);
impl Handler for OpaqueHandler {
	fn handle(&self, _node: &Oid, req: &mut SysctlReq<'_>) -> Result<()> {
		if let Some(old) = req.old.as_deref_mut() {
			old.clear();
			old.extend_from_slice(&self.0);
		}
		Ok(())
	}
}

struct Tree {
	root: Arc<Oid>,
	next_auto_id: i32,
}

fn new_root() -> Arc<Oid> {
	Oid::node(0, "sysctl", "root of the MIB tree")
}

static TREE: Mutex<Option<Tree>> = Mutex::new(None);
/// Process security level (spec.md 4.7 "security level below a per-node
/// threshold"); `-1` means "insecure", matching the original's default.
static SECURELEVEL: AtomicU32 = AtomicU32::new(0);

fn with_tree<R>(f: impl FnOnce(&mut Tree) -> R) -> R {
	let mut guard = TREE.lock();
	if guard.is_none() {
		*guard = Some(Tree {
			root: new_root(),
			next_auto_id: CTL_AUTO_START,
		});
	}
	f(guard.as_mut().unwrap())
}

/// Reset the tree to an empty root. Exposed for tests; a real boot calls
/// this implicitly via `with_tree`'s lazy init.
#[cfg(test)]
fn reset() {
	*TREE.lock() = Some(Tree {
		root: new_root(),
		next_auto_id: CTL_AUTO_START,
	});
}

fn root() -> Arc<Oid> {
	with_tree(|t| t.root.clone())
}

/// Register a node under `parent` (empty path for the root's direct
/// children). `id == OID_AUTO` assigns the next free id starting at
/// `CTL_AUTO_START` (spec.md 6), matching static registrations staying
/// below that boundary by construction (callers never pass a literal id
/// >= `CTL_AUTO_START` for a "static" node by convention).
pub fn sysctl_add_oid(
	parent_path: &[&str],
	id: i32,
	name: &str,
	kind: Kind,
	format: &str,
	description: &str,
	handler: Arc<dyn Handler>,
) -> Result<Arc<Oid>> {
	let parent = find_by_name_path(parent_path)?;
	if !parent.is_node() {
		return Err(Error::ENOTDIR);
	}
	let assigned_id = if id == OID_AUTO {
		with_tree(|t| {
			let next = t.next_auto_id;
			t.next_auto_id += 1;
			next
		})
	} else {
		id
	};

	let node = Oid::leaf(assigned_id, name, kind | Kind::DYN, format, description, handler);
	let mut children = parent.children.lock();
	if children.contains_key(&assigned_id) {
		return Err(Error::EEXIST);
	}
	children.insert(assigned_id, node.clone());
	Ok(node)
}

/// Register a static subtree node (not `CTLFLAG_DYN`), used for the
/// top-level categories (`kern`, `vm`, `vfs`, ...) set up at init.
pub fn sysctl_add_node(parent_path: &[&str], id: i32, name: &str, description: &str) -> Result<Arc<Oid>> {
	let parent = find_by_name_path(parent_path)?;
	let mut children = parent.children.lock();
	if let Some(existing) = children.values().find(|c| c.name == name) {
		return Ok(existing.clone());
	}
	let assigned_id = if id == OID_AUTO {
		with_tree(|t| {
			let next = t.next_auto_id;
			t.next_auto_id += 1;
			next
		})
	} else {
		id
	};
	if children.contains_key(&assigned_id) {
		return Err(Error::EEXIST);
	}
	let node = Oid::node(assigned_id, name, description);
	children.insert(assigned_id, node.clone());
	Ok(node)
}

/// `sysctl_remove_oid(del, recurse)` (spec.md 4.7): marks the node dying,
/// waits for its running count to drain, then unlinks it from its parent.
/// `recurse` additionally requires the node have no children of its own.
pub fn sysctl_remove_oid(parent_path: &[&str], id: i32, recurse: bool) -> Result<()> {
	let parent = find_by_name_path(parent_path)?;
	let mut children = parent.children.lock();
	let node = children.get(&id).cloned().ok_or(Error::ENOENT)?;
	if !recurse && !node.children.lock().is_empty() {
		return Err(Error::ENOTEMPTY);
	}
	node.dying.store(true, Ordering::SeqCst);
	// Busy-wait for in-flight handler calls to drain (spec.md 4.7). Bounded
	// in practice because handlers never block indefinitely; a no_std
	// kernel build would yield to the scheduler here instead of spinning.
	while node.running.load(Ordering::SeqCst) > 0 {
		core::hint::spin_loop();
	}
	children.remove(&id);
	Ok(())
}

fn find_by_name_path(path: &[&str]) -> Result<Arc<Oid>> {
	let mut cur = root();
	for component in path {
		let children = cur.children.lock();
		let next = children
			.values()
			.find(|c| c.name == *component)
			.cloned()
			.ok_or(Error::ENOENT)?;
		drop(children);
		cur = next;
	}
	Ok(cur)
}

/// `name2oid` (spec.md 4.7): translate a dotted name to its list of integer
/// ids, per component, validating each step resolves to a child of the
/// previous node.
pub fn name2oid(name: &str) -> Result<Vec<i32>> {
	if name.is_empty() {
		return Ok(Vec::new());
	}
	let mut ids = Vec::new();
	let mut cur = root();
	for component in name.split('.') {
		let children = cur.children.lock();
		let next = children.values().find(|c| c.name == component).cloned().ok_or(Error::ENOENT)?;
		drop(children);
		ids.push(next.id);
		cur = next;
	}
	if ids.len() > CTL_MAXNAME {
		return Err(Error::ENAMETOOLONG);
	}
	Ok(ids)
}

/// `oid2name` (the reverse direction spec.md 4.7 names as "NAME"): render a
/// dotted name from a leaf found by walking `oid` ids one level at a time.
pub fn oid2name(ids: &[i32]) -> Result<String> {
	let mut cur = root();
	let mut parts = Vec::new();
	for id in ids {
		let children = cur.children.lock();
		let next = children.get(id).cloned().ok_or(Error::ENOENT)?;
		drop(children);
		parts.push(next.name.clone());
		cur = next;
	}
	Ok(parts.join("."))
}

fn find_by_ids(ids: &[i32]) -> Result<Arc<Oid>> {
	let mut cur = root();
	for id in ids {
		let children = cur.children.lock();
		let next = children.get(id).cloned().ok_or(Error::ENOENT)?;
		drop(children);
		cur = next;
	}
	Ok(cur)
}

/// `NEXT` (spec.md 4.7): the next sibling-or-descendant id path after
/// `ids` in tree order, or `None` at the end of the tree. An empty `ids`
/// starts the walk at the root's first child.
pub fn next_oid(ids: &[i32]) -> Result<Option<Vec<i32>>> {
	fn first_child_path(node: &Arc<Oid>) -> Option<Vec<i32>> {
		let children = node.children.lock();
		children.keys().next().map(|id| alloc::vec![*id])
	}

	if ids.is_empty() {
		return Ok(first_child_path(&root()));
	}

	let parent_ids = &ids[..ids.len() - 1];
	let parent = find_by_ids(parent_ids)?;
	let node = find_by_ids(ids)?;

	if let Some(mut child_path) = first_child_path(&node) {
		let mut full = parent_ids.to_vec();
		full.push(node.id);
		full.append(&mut child_path);
		return Ok(Some(full));
	}

	// No children: advance to the next sibling at this level, walking back
	// up through ancestors (and their remaining siblings) if this was the
	// last child.
	let mut walk_parent_ids = parent_ids.to_vec();
	let mut walk_parent = parent;
	let mut cur_id = node.id;
	loop {
		let children = walk_parent.children.lock();
		let sibling = children.range((cur_id + 1)..).next().map(|(id, n)| (*id, n.clone()));
		drop(children);
		if let Some((sib_id, _)) = sibling {
			let mut full = walk_parent_ids.clone();
			full.push(sib_id);
			return Ok(Some(full));
		}
		if walk_parent_ids.is_empty() {
			return Ok(None);
		}
		cur_id = walk_parent_ids.pop().unwrap();
		walk_parent = find_by_ids(&walk_parent_ids)?;
	}
}

/// `OIDFMT`: `(kind, format)` pair for a node (spec.md 4.7).
pub fn oidfmt(ids: &[i32]) -> Result<(Kind, String)> {
	let node = find_by_ids(ids)?;
	Ok((node.kind, node.format.clone()))
}

/// `OIDDESCR`: a node's description string (spec.md 4.7).
pub fn oiddescr(ids: &[i32]) -> Result<String> {
	Ok(find_by_ids(ids)?.description.clone())
}

/// Reserved id of the `sysctl` subtree itself (spec.md 4.7), sibling to
/// `kern`/`vm`/`vfs` at the root. The introspection handlers below live
/// under it at the fixed ids FreeBSD's `CTL_SYSCTL_*` family uses.
pub const CTL_SYSCTL: i32 = 0;
pub const CTL_SYSCTL_NAME: i32 = 1;
pub const CTL_SYSCTL_NEXT: i32 = 2;
pub const CTL_SYSCTL_NAME2OID: i32 = 3;
pub const CTL_SYSCTL_OIDFMT: i32 = 4;
pub const CTL_SYSCTL_OIDDESCR: i32 = 5;

fn decode_ids(bytes: &[u8]) -> Result<Vec<i32>> {
	if bytes.len() % 4 != 0 {
		return Err(Error::EINVAL);
	}
	Ok(bytes.chunks_exact(4).map(|c| i32::from_ne_bytes(c.try_into().unwrap())).collect())
}

fn encode_ids(ids: &[i32]) -> Vec<u8> {
	let mut out = Vec::with_capacity(ids.len() * 4);
	for id in ids {
		out.extend_from_slice(&id.to_ne_bytes());
	}
	out
}

/// `NAME` (spec.md 4.7): reverse lookup from an oid id path (`req.new`,
/// native-endian `i32`s) to its dotted name, written into `req.old`. Thin
/// `Handler` wrapper around [`oid2name`] so the operation is reachable
/// through [`sysctl`]'s real dispatch path, not just as a bare function.
struct NameHandler;
impl Handler for NameHandler {
	fn handle(&self, _node: &Oid, req: &mut SysctlReq<'_>) -> Result<()> {
		let ids = decode_ids(req.new.ok_or(Error::EINVAL)?)?;
		let name = oid2name(&ids)?;
		if let Some(old) = req.old.as_deref_mut() {
			old.clear();
			old.extend_from_slice(name.as_bytes());
		}
		Ok(())
	}
}

/// `NEXT` (spec.md 4.7): the id path immediately after `req.new`'s ids in
/// tree order, packed the same way into `req.old`; an empty `req.old` means
/// "end of tree". Wraps [`next_oid`].
struct NextHandler;
impl Handler for NextHandler {
	fn handle(&self, _node: &Oid, req: &mut SysctlReq<'_>) -> Result<()> {
		let ids = decode_ids(req.new.unwrap_or(&[]))?;
		let next = next_oid(&ids)?;
		if let Some(old) = req.old.as_deref_mut() {
			old.clear();
			if let Some(ids) = next {
				old.extend_from_slice(&encode_ids(&ids));
			}
		}
		Ok(())
	}
}

/// `NAME2OID` (spec.md 4.7): forward lookup from a dotted name (`req.new`,
/// UTF-8) to its id path, packed into `req.old`. Wraps [`name2oid`].
struct Name2OidHandler;
impl Handler for Name2OidHandler {
	fn handle(&self, _node: &Oid, req: &mut SysctlReq<'_>) -> Result<()> {
		let name = core::str::from_utf8(req.new.ok_or(Error::EINVAL)?).map_err(|_| Error::EINVAL)?;
		let ids = name2oid(name)?;
		if let Some(old) = req.old.as_deref_mut() {
			old.clear();
			old.extend_from_slice(&encode_ids(&ids));
		}
		Ok(())
	}
}

/// `OIDFMT` (spec.md 4.7): a node's `(kind, format)` pair, packed as the
/// kind bits followed by the format string. Wraps [`oidfmt`].
struct OidFmtHandler;
impl Handler for OidFmtHandler {
	fn handle(&self, _node: &Oid, req: &mut SysctlReq<'_>) -> Result<()> {
		let ids = decode_ids(req.new.ok_or(Error::EINVAL)?)?;
		let (kind, format) = oidfmt(&ids)?;
		if let Some(old) = req.old.as_deref_mut() {
			old.clear();
			old.extend_from_slice(&kind.bits().to_ne_bytes());
			old.extend_from_slice(format.as_bytes());
		}
		Ok(())
	}
}

/// `OIDDESCR` (spec.md 4.7): a node's description string. Wraps [`oiddescr`].
struct OidDescrHandler;
impl Handler for OidDescrHandler {
	fn handle(&self, _node: &Oid, req: &mut SysctlReq<'_>) -> Result<()> {
		let ids = decode_ids(req.new.ok_or(Error::EINVAL)?)?;
		let description = oiddescr(&ids)?;
		if let Some(old) = req.old.as_deref_mut() {
			old.clear();
			old.extend_from_slice(description.as_bytes());
		}
		Ok(())
	}
}

/// Register a permanent (non-`DYN`) leaf under `parent_path`, idempotent by
/// name the same way [`sysctl_add_node`] is. Used for the reserved
/// introspection nodes, which aren't user/subsystem registrations and
/// shouldn't carry [`Kind::DYN`].
fn register_static_leaf(parent_path: &[&str], id: i32, name: &str, kind: Kind, format: &str, description: &str, handler: Arc<dyn Handler>) -> Result<Arc<Oid>> {
	let parent = find_by_name_path(parent_path)?;
	let mut children = parent.children.lock();
	if let Some(existing) = children.values().find(|c| c.name == name) {
		return Ok(existing.clone());
	}
	if children.contains_key(&id) {
		return Err(Error::EEXIST);
	}
	let node = Oid::leaf(id, name, kind, format, description, handler);
	children.insert(id, node.clone());
	Ok(node)
}

/// The user-facing `sysctl` syscall entry point (spec.md 6): resolves
/// `ids`, gates writes behind `SECURE`/`ANYBODY`/`PRIV_SYSCTL_WRITE`, and
/// invokes the node's handler with `old`/`new` buffers.
///
/// `is_write` lets a caller request an old-value read alongside a write in
/// one call (`sysctl(2)`'s usual "read old value, then write new value"
/// shape) by supplying both `old` and `new`.
pub fn sysctl(cred: &Credentials, ids: &[i32], old: Option<&mut Vec<u8>>, new: Option<&[u8]>) -> Result<()> {
	let node = find_by_ids(ids)?;
	if node.dying.load(Ordering::SeqCst) {
		return Err(Error::ENOENT);
	}

	if new.is_some() {
		if !node.kind.contains(Kind::WR) {
			return Err(Error::EPERM);
		}
		if node.kind.contains(Kind::SECURE) && SECURELEVEL.load(Ordering::SeqCst) > 0 {
			return Err(Error::EPERM);
		}
		if !node.kind.contains(Kind::ANYBODY) {
			priv_check(cred, Privilege::SYSCTL_WRITE)?;
		}
	} else if !node.kind.contains(Kind::RD) {
		return Err(Error::EPERM);
	}

	node.running.fetch_add(1, Ordering::SeqCst);
	let mut req = SysctlReq { cred, old, new };
	let result = node.handler.handle(&node, &mut req);
	node.running.fetch_sub(1, Ordering::SeqCst);
	result
}

/// Convenience wrapper for in-kernel callers reading a plain `i32` node by
/// dotted name (e.g. `kern.hz`).
pub fn get_int(cred: &Credentials, name: &str) -> Result<i32> {
	let ids = name2oid(name)?;
	let mut buf = Vec::new();
	sysctl(cred, &ids, Some(&mut buf), None)?;
	let bytes: [u8; 4] = buf.as_slice().try_into().map_err(|_| Error::EIO)?;
	Ok(i32::from_ne_bytes(bytes))
}

pub fn set_int(cred: &Credentials, name: &str, value: i32) -> Result<()> {
	let ids = name2oid(name)?;
	sysctl(cred, &ids, None, Some(&value.to_ne_bytes()))
}

/// Register the reserved introspection nodes under the tree's root
/// (`_NAME`, `_NEXT`, `_NAME2OID`, `_OIDFMT`, `_OIDDESCR`, spec.md 4.7) plus
/// the top-level category nodes (`kern`, `vm`, `vfs`) the rest of the
/// kernel's init registers its tunables under. Idempotent: safe to call
/// more than once (matches `fs_register`'s idempotence convention).
pub fn init() -> Result<()> {
	sysctl_add_node(&[], CTL_SYSCTL, "sysctl", "Sysctl internals")?;
	register_static_leaf(
		&["sysctl"],
		CTL_SYSCTL_NAME,
		"name",
		Kind::OPAQUE | Kind::RD | Kind::WR | Kind::ANYBODY,
		"A",
		"Dotted name for an oid id path",
		Arc::new(NameHandler),
	)?;
	register_static_leaf(
		&["sysctl"],
		CTL_SYSCTL_NEXT,
		"next",
		Kind::OPAQUE | Kind::RD | Kind::WR | Kind::ANYBODY,
		"I",
		"Next oid id path in tree order",
		Arc::new(NextHandler),
	)?;
	register_static_leaf(
		&["sysctl"],
		CTL_SYSCTL_NAME2OID,
		"name2oid",
		Kind::OPAQUE | Kind::RD | Kind::WR | Kind::ANYBODY,
		"I",
		"Oid id path for a dotted name",
		Arc::new(Name2OidHandler),
	)?;
	register_static_leaf(
		&["sysctl"],
		CTL_SYSCTL_OIDFMT,
		"oidfmt",
		Kind::OPAQUE | Kind::RD | Kind::WR | Kind::ANYBODY,
		"A",
		"Kind and format string for an oid",
		Arc::new(OidFmtHandler),
	)?;
	register_static_leaf(
		&["sysctl"],
		CTL_SYSCTL_OIDDESCR,
		"oiddescr",
		Kind::OPAQUE | Kind::RD | Kind::WR | Kind::ANYBODY,
		"A",
		"Description string for an oid",
		Arc::new(OidDescrHandler),
	)?;

	let _ = sysctl_add_node(&[], 1, "kern", "High kernel limits and information");
	let _ = sysctl_add_node(&[], 2, "vm", "Virtual memory");
	let _ = sysctl_add_node(&[], 3, "vfs", "File systems");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{Gid, Uid};

	fn root_cred() -> Credentials {
		Credentials::root()
	}

	fn unprivileged() -> Credentials {
		Credentials::unprivileged(Uid(1000), Gid(1000))
	}

	#[test]
	fn round_trip_int_node_read_write_unregister() {
		reset();
		init().unwrap();
		sysctl_add_node(&[], 1, "kern", "").ok();
		let handler = Arc::new(IntHandler(Mutex::new(7)));
		sysctl_add_oid(
			&["kern"],
			OID_AUTO,
			"test_value",
			Kind::INT | Kind::RD | Kind::WR | Kind::ANYBODY,
			"I",
			"",
			handler,
		)
		.unwrap();

		let cred = root_cred();
		assert_eq!(get_int(&cred, "kern.test_value").unwrap(), 7);
		set_int(&cred, "kern.test_value", 42).unwrap();
		assert_eq!(get_int(&cred, "kern.test_value").unwrap(), 42);

		let ids = name2oid("kern.test_value").unwrap();
		sysctl_remove_oid(&["kern"], *ids.last().unwrap(), false).unwrap();
		assert_eq!(get_int(&cred, "kern.test_value").err(), Some(Error::ENOENT));
	}

	#[test]
	fn write_without_anybody_requires_privilege() {
		reset();
		init().unwrap();
		let handler = Arc::new(IntHandler(Mutex::new(0)));
		sysctl_add_oid(&["kern"], OID_AUTO, "guarded", Kind::INT | Kind::RD | Kind::WR, "I", "", handler).unwrap();

		let cred = unprivileged();
		assert_eq!(set_int(&cred, "kern.guarded", 1).err(), Some(Error::EPERM));
		assert!(set_int(&root_cred(), "kern.guarded", 1).is_ok());
	}

	#[test]
	fn secure_node_rejects_write_above_securelevel_zero_threshold() {
		reset();
		init().unwrap();
		let handler = Arc::new(IntHandler(Mutex::new(0)));
		sysctl_add_oid(
			&["kern"],
			OID_AUTO,
			"secure_val",
			Kind::INT | Kind::RD | Kind::WR | Kind::ANYBODY | Kind::SECURE,
			"I",
			"",
			handler,
		)
		.unwrap();
		SECURELEVEL.store(1, Ordering::SeqCst);
		assert_eq!(set_int(&root_cred(), "kern.secure_val", 1).err(), Some(Error::EPERM));
		SECURELEVEL.store(0, Ordering::SeqCst);
		assert!(set_int(&root_cred(), "kern.secure_val", 1).is_ok());
	}

	#[test]
	fn name2oid_and_oid2name_round_trip() {
		reset();
		init().unwrap();
		let handler = Arc::new(IntHandler(Mutex::new(0)));
		sysctl_add_oid(&["kern"], OID_AUTO, "hz", Kind::INT | Kind::RD, "I", "", handler).unwrap();
		let ids = name2oid("kern.hz").unwrap();
		assert_eq!(oid2name(&ids).unwrap(), "kern.hz");
	}

	#[test]
	fn next_walks_siblings_then_descends() {
		reset();
		init().unwrap();
		let h1 = Arc::new(IntHandler(Mutex::new(0)));
		let h2 = Arc::new(IntHandler(Mutex::new(0)));
		sysctl_add_oid(&["kern"], OID_AUTO, "a", Kind::INT | Kind::RD, "I", "", h1).unwrap();
		sysctl_add_oid(&["kern"], OID_AUTO, "b", Kind::INT | Kind::RD, "I", "", h2).unwrap();

		let first = next_oid(&[]).unwrap().unwrap();
		assert_eq!(first, alloc::vec![1]); // kern
		let second = next_oid(&first).unwrap().unwrap();
		assert_eq!(second.len(), 2); // kern.a
		let third = next_oid(&second).unwrap().unwrap();
		assert_eq!(third.len(), 2); // kern.b
		assert_ne!(second, third);
	}

	#[test]
	fn reserved_introspection_nodes_are_reachable_via_sysctl_dispatch() {
		reset();
		init().unwrap();
		let handler = Arc::new(IntHandler(Mutex::new(0)));
		sysctl_add_oid(&["kern"], OID_AUTO, "hz", Kind::INT | Kind::RD, "I", "", handler).unwrap();

		let cred = root_cred();
		let hz_ids = name2oid("kern.hz").unwrap();

		// NAME2OID: "kern.hz" -> its id path, through the real dispatch path.
		let name2oid_ids = name2oid("sysctl.name2oid").unwrap();
		let mut old = Vec::new();
		sysctl(&cred, &name2oid_ids, Some(&mut old), Some(b"kern.hz")).unwrap();
		assert_eq!(decode_ids(&old).unwrap(), hz_ids);

		// NAME: the id path back to "kern.hz".
		let name_ids = name2oid("sysctl.name").unwrap();
		let mut old = Vec::new();
		sysctl(&cred, &name_ids, Some(&mut old), Some(&encode_ids(&hz_ids))).unwrap();
		assert_eq!(old, b"kern.hz");

		// OIDFMT: kind bits followed by the format string.
		let oidfmt_ids = name2oid("sysctl.oidfmt").unwrap();
		let mut old = Vec::new();
		sysctl(&cred, &oidfmt_ids, Some(&mut old), Some(&encode_ids(&hz_ids))).unwrap();
		assert!(old.len() > 4);

		// OIDDESCR.
		let oiddescr_ids = name2oid("sysctl.oiddescr").unwrap();
		let mut old = Vec::new();
		sysctl(&cred, &oiddescr_ids, Some(&mut old), Some(&encode_ids(&hz_ids))).unwrap();

		// NEXT starting at the root: the lowest top-level id is "sysctl"
		// itself (CTL_SYSCTL == 0).
		let next_ids = name2oid("sysctl.next").unwrap();
		let mut old = Vec::new();
		sysctl(&cred, &next_ids, Some(&mut old), Some(&[])).unwrap();
		assert_eq!(decode_ids(&old).unwrap(), alloc::vec![CTL_SYSCTL]);
	}

	#[test]
	fn remove_non_recursive_refuses_node_with_children() {
		reset();
		init().unwrap();
		sysctl_add_node(&["kern"], OID_AUTO, "sub", "").unwrap();
		let handler = Arc::new(IntHandler(Mutex::new(0)));
		sysctl_add_oid(&["kern", "sub"], OID_AUTO, "leaf", Kind::INT | Kind::RD, "I", "", handler).unwrap();
		let ids = name2oid("kern.sub").unwrap();
		assert_eq!(sysctl_remove_oid(&["kern"], *ids.last().unwrap(), false).err(), Some(Error::ENOTEMPTY));
		assert!(sysctl_remove_oid(&["kern"], *ids.last().unwrap(), true).is_ok());
	}
}
