//! Byte-granular radix trie over a paged, write-back cache.
//!
//! The trie is an arena of tagged nodes addressed by 64-bit byte offsets
//! into the cache. Internal nodes carry a sorted array of `{discriminant
//! byte, child pointer}` entries plus an optional "link-to-value" child
//! for keys that terminate exactly at that node's depth. Leaves store a
//! key suffix and a value, each with trailing slack for in-place growth.
//! Every mutating traversal returns the (possibly relocated) pointer for
//! the subtree it touched, so a parent rewrites its own pointer field
//! without needing an explicit path stack: pointer fields are fixed
//! width, so a child's relocation never changes its parent's footprint.

pub mod node;


use buffer::Cache;
use common::{CacheConfig, DbError, DbResult, Pointer, TrieConfig};
use node::{Child, InternalNode, LeafNode};
use storage::Storage;

const ROOT_RECORD_LEN: u64 = node::ROOT_RECORD_LEN;

/// A small pool of reusable scratch buffers for node reads, avoiding a
/// fresh allocation on every traversal step.
#[derive(Default)]
pub struct MemoryPool {
    free: Vec<Vec<u8>>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self { free: Vec::new() }
    }

    pub fn acquire(&mut self, len: usize) -> Vec<u8> {
        match self.free.pop() {
            Some(mut buf) => {
                buf.clear();
                buf.resize(len, 0);
                buf
            }
            None => vec![0u8; len],
        }
    }

    pub fn release(&mut self, buf: Vec<u8>) {
        self.free.push(buf);
    }
}

/// A resolved record: its own node pointer, and the pointer/length of its
/// value region within that node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub key: Vec<u8>,
    pub pointer: Pointer,
    pub value_pointer: Pointer,
    pub value_length: u32,
}

/// Result of [`Trie::find_best_match`]: how far the needle's byte path
/// was followed, and whether a value-bearing position was passed along
/// the way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BestMatch {
    pub depth: usize,
    pub has_link: bool,
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// The trie engine: root/generation bookkeeping plus the mutation and
/// traversal algorithms, all addressed through a [`Cache`].
pub struct Trie<S: Storage> {
    cache: Cache<S>,
    config: TrieConfig,
    root_node_ptr: Pointer,
    generation_ptr: Pointer,
    record_count: u64,
    pool: MemoryPool,
}

impl<S: Storage> Trie<S> {
    /// Open a trie over `storage`, initializing a fresh root record and
    /// empty root node if none exists yet.
    pub fn open(storage: S, cache_config: CacheConfig, trie_config: TrieConfig) -> DbResult<Self> {
        let mut cache = Cache::new(storage, cache_config)?;
        if cache.length() < ROOT_RECORD_LEN {
            cache.reserve(ROOT_RECORD_LEN - cache.length())?;
        }
        let mut header = [0u8; ROOT_RECORD_LEN as usize];
        cache.read(0, &mut header)?;
        let root_raw = u64::from_le_bytes(header[0..8].try_into().unwrap());
        let pool = MemoryPool::new();

        if root_raw == 0 {
            let root_node = InternalNode {
                link_to_value: None,
                children: Vec::new(),
                capacity: trie_config.initial_child_capacity.max(1),
            };
            let root_ptr = Pointer(cache.write_to_end(&root_node.encode())?);
            let gen_ptr = Pointer(cache.write_to_end(&node::encode_generation(0))?);
            cache.write(0, &root_ptr.0.to_le_bytes())?;
            cache.write(8, &gen_ptr.0.to_le_bytes())?;
            cache.write(16, &0u64.to_le_bytes())?;
            Ok(Self {
                cache,
                config: trie_config,
                root_node_ptr: root_ptr,
                generation_ptr: gen_ptr,
                record_count: 0,
                pool,
            })
        } else {
            let gen_raw = u64::from_le_bytes(header[8..16].try_into().unwrap());
            let record_count = u64::from_le_bytes(header[16..24].try_into().unwrap());
            Ok(Self {
                cache,
                config: trie_config,
                root_node_ptr: Pointer(root_raw),
                generation_ptr: Pointer(gen_raw),
                record_count,
                pool,
            })
        }
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn flush(&mut self) -> DbResult<()> {
        self.cache.flush()
    }

    pub fn read_generation_node(&mut self) -> DbResult<u64> {
        let mut buf = [0u8; 8];
        self.cache.read(self.generation_ptr.0 + 1, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn bump_generation(&mut self) -> DbResult<()> {
        let current = self.read_generation_node()?;
        self.cache.write(self.generation_ptr.0 + 1, &(current + 1).to_le_bytes())
    }

    fn write_root_pointer(&mut self) -> DbResult<()> {
        let ptr = self.root_node_ptr.0;
        self.cache.write(0, &ptr.to_le_bytes())
    }

    fn write_record_count(&mut self) -> DbResult<()> {
        let count = self.record_count;
        self.cache.write(16, &count.to_le_bytes())
    }

    fn peek_tag(&mut self, ptr: Pointer) -> DbResult<u8> {
        let mut b = [0u8; 1];
        self.cache.read(ptr.0, &mut b)?;
        node::peek_tag(&b)
    }

    fn read_internal(&mut self, ptr: Pointer) -> DbResult<InternalNode> {
        let mut head = self.pool.acquire(node::INTERNAL_HEADER_LEN);
        self.cache.read(ptr.0, &mut head)?;
        let capacity = InternalNode::peek_capacity(&head)?;
        self.pool.release(head);

        let full_len = node::INTERNAL_HEADER_LEN + capacity as usize * node::CHILD_ENTRY_LEN;
        let mut full = self.pool.acquire(full_len);
        self.cache.read(ptr.0, &mut full)?;
        let result = InternalNode::decode(&full);
        self.pool.release(full);
        result
    }

    fn read_leaf(&mut self, ptr: Pointer) -> DbResult<LeafNode> {
        let mut head = self.pool.acquire(9);
        self.cache.read(ptr.0, &mut head)?;
        if head[0] != node::TAG_LEAF {
            return Err(DbError::Corruption("expected leaf node".into()));
        }
        let key_len = u64::from_le_bytes(head[1..9].try_into().unwrap()) as usize;
        self.pool.release(head);

        let mut cap_buf = [0u8; 4];
        self.cache.read(ptr.0 + 9 + key_len as u64 + 4, &mut cap_buf)?;
        let value_capacity = u32::from_le_bytes(cap_buf);

        let full_len = 9 + key_len + 8 + value_capacity as usize;
        let mut full = self.pool.acquire(full_len);
        self.cache.read(ptr.0, &mut full)?;
        let result = LeafNode::decode(&full);
        self.pool.release(full);
        result
    }

    fn write_internal(&mut self, ptr: Pointer, node: &InternalNode) -> DbResult<()> {
        self.cache.write(ptr.0, &node.encode())
    }

    fn write_internal_link(&mut self, ptr: Pointer, link: Pointer) -> DbResult<()> {
        self.cache.write(ptr.0 + 1, &link.0.to_le_bytes())
    }

    fn write_internal_child_pointer(&mut self, ptr: Pointer, idx: usize, child: Pointer) -> DbResult<()> {
        let offset = ptr.0 + node::INTERNAL_HEADER_LEN as u64 + idx as u64 * node::CHILD_ENTRY_LEN as u64 + 1;
        self.cache.write(offset, &child.0.to_le_bytes())
    }

    fn leaf_value_slack(&self, value_len: usize) -> u32 {
        let proportional = (value_len as u64 * self.config.initial_value_slack_permille as u64) / 1000;
        (proportional as u32).max(self.config.min_value_slack)
    }

    fn create_leaf(&mut self, key: &[u8], value: &[u8]) -> DbResult<Pointer> {
        let capacity = value.len() as u32 + self.leaf_value_slack(value.len());
        let leaf = LeafNode { key: key.to_vec(), value: value.to_vec(), value_capacity: capacity };
        Ok(Pointer(self.cache.write_to_end(&leaf.encode())?))
    }

    fn relocate_leaf_with_new_key(&mut self, old: &LeafNode, new_key: &[u8]) -> DbResult<Pointer> {
        let leaf = LeafNode { key: new_key.to_vec(), value: old.value.clone(), value_capacity: old.value_capacity };
        Ok(Pointer(self.cache.write_to_end(&leaf.encode())?))
    }

    /// Overwrite `ptr`'s value in place if it fits in the existing value
    /// slack, else relocate with doubled capacity. Returns the pointer
    /// callers should install in the parent slot.
    fn overwrite_or_relocate_leaf_value(&mut self, ptr: Pointer, new_value: &[u8]) -> DbResult<Pointer> {
        let leaf = self.read_leaf(ptr)?;
        if new_value.len() <= leaf.value_capacity as usize {
            let value_len_offset = ptr.0 + 1 + 8 + leaf.key.len() as u64;
            self.cache.write(value_len_offset, &(new_value.len() as u32).to_le_bytes())?;
            self.cache.write(value_len_offset + 8, new_value)?;
            Ok(ptr)
        } else {
            let new_capacity = (new_value.len() as u32 + self.leaf_value_slack(new_value.len()))
                .max(leaf.value_capacity.saturating_mul(2));
            let new_leaf = LeafNode { key: leaf.key, value: new_value.to_vec(), value_capacity: new_capacity };
            Ok(Pointer(self.cache.write_to_end(&new_leaf.encode())?))
        }
    }

    fn leaf_to_row(&self, leaf_ptr: Pointer, key: Vec<u8>, leaf: &LeafNode) -> Row {
        let value_pointer = Pointer(leaf_ptr.0 + 1 + 8 + leaf.key.len() as u64 + 8);
        Row { key, pointer: leaf_ptr, value_pointer, value_length: leaf.value.len() as u32 }
    }

    fn leaf_row_at(&mut self, leaf_ptr: Pointer, mut path: Vec<u8>) -> DbResult<Row> {
        let leaf = self.read_leaf(leaf_ptr)?;
        path.extend_from_slice(&leaf.key);
        Ok(self.leaf_to_row(leaf_ptr, path, &leaf))
    }

    // ---- point lookup ----

    fn lookup(&mut self, key: &[u8]) -> DbResult<Option<(Row, Vec<u8>)>> {
        self.lookup_at(self.root_node_ptr, key, 0)
    }

    fn lookup_at(&mut self, node_ptr: Pointer, key: &[u8], depth: usize) -> DbResult<Option<(Row, Vec<u8>)>> {
        let node = self.read_internal(node_ptr)?;
        if depth == key.len() {
            return match node.link_to_value {
                Some(leaf_ptr) => {
                    let leaf = self.read_leaf(leaf_ptr)?;
                    let row = self.leaf_to_row(leaf_ptr, key.to_vec(), &leaf);
                    Ok(Some((row, leaf.value)))
                }
                None => Ok(None),
            };
        }
        let b = key[depth];
        match node.find_child(b) {
            None => Ok(None),
            Some((_, child_ptr)) => {
                if self.peek_tag(child_ptr)? == node::TAG_LEAF {
                    let leaf = self.read_leaf(child_ptr)?;
                    if leaf.key == key[depth + 1..] {
                        let row = self.leaf_to_row(child_ptr, key.to_vec(), &leaf);
                        Ok(Some((row, leaf.value)))
                    } else {
                        Ok(None)
                    }
                } else {
                    self.lookup_at(child_ptr, key, depth + 1)
                }
            }
        }
    }

    pub fn get_row(&mut self, key: &[u8]) -> DbResult<Option<Row>> {
        Ok(self.lookup(key)?.map(|(row, _)| row))
    }

    pub fn get_value(&mut self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.lookup(key)?.map(|(_, value)| value))
    }

    // ---- best-match ----

    /// Walk `needle` byte by byte and report whether some stored key is
    /// a prefix of it (the path from the root to a value-bearing
    /// position following `needle`'s bytes exactly).
    pub fn find_best_match(&mut self, needle: &[u8]) -> DbResult<BestMatch> {
        let mut node_ptr = self.root_node_ptr;
        let mut depth = 0usize;
        let mut has_link = false;
        loop {
            let node = self.read_internal(node_ptr)?;
            if node.link_to_value.is_some() {
                has_link = true;
            }
            if depth == needle.len() {
                break;
            }
            let b = needle[depth];
            match node.find_child(b) {
                None => break,
                Some((_, child_ptr)) => {
                    if self.peek_tag(child_ptr)? == node::TAG_LEAF {
                        let leaf = self.read_leaf(child_ptr)?;
                        let rem = &needle[depth + 1..];
                        let common = common_prefix_len(&leaf.key, rem);
                        if common == leaf.key.len() {
                            has_link = true;
                        }
                        depth = depth + 1 + common;
                        break;
                    } else {
                        node_ptr = child_ptr;
                        depth += 1;
                    }
                }
            }
        }
        Ok(BestMatch { depth, has_link })
    }

    // ---- insert/update ----

    pub fn set_key(&mut self, key: &[u8], value: &[u8]) -> DbResult<()> {
        let new_root = self.set_key_at(self.root_node_ptr, key, 0, value)?;
        if new_root != self.root_node_ptr {
            self.root_node_ptr = new_root;
            self.write_root_pointer()?;
        }
        self.write_record_count()?;
        self.bump_generation()?;

        if self.config.consistency_check {
            let got = self.get_value(key)?;
            if got.as_deref() != Some(value) {
                return Err(DbError::Corruption(
                    "consistency check failed: just-written record unreadable".into(),
                ));
            }
        }
        Ok(())
    }

    fn set_key_at(&mut self, node_ptr: Pointer, key: &[u8], depth: usize, value: &[u8]) -> DbResult<Pointer> {
        let mut node = self.read_internal(node_ptr)?;

        if depth == key.len() {
            match node.link_to_value {
                Some(leaf_ptr) => {
                    let new_leaf_ptr = self.overwrite_or_relocate_leaf_value(leaf_ptr, value)?;
                    if new_leaf_ptr != leaf_ptr {
                        self.write_internal_link(node_ptr, new_leaf_ptr)?;
                    }
                }
                None => {
                    let leaf_ptr = self.create_leaf(&[], value)?;
                    self.record_count += 1;
                    self.write_internal_link(node_ptr, leaf_ptr)?;
                }
            }
            return Ok(node_ptr);
        }

        let b = key[depth];
        match node.find_child(b) {
            Some((idx, child_ptr)) => {
                let new_child_ptr = if self.peek_tag(child_ptr)? == node::TAG_LEAF {
                    self.set_key_into_leaf_child(child_ptr, &key[depth + 1..], value)?
                } else {
                    self.set_key_at(child_ptr, key, depth + 1, value)?
                };
                if new_child_ptr != child_ptr {
                    self.write_internal_child_pointer(node_ptr, idx, new_child_ptr)?;
                }
                Ok(node_ptr)
            }
            None => {
                let leaf_ptr = self.create_leaf(&key[depth + 1..], value)?;
                self.record_count += 1;
                self.add_child_entry(node_ptr, &mut node, b, leaf_ptr)
            }
        }
    }

    fn set_key_into_leaf_child(&mut self, leaf_ptr: Pointer, remaining_key: &[u8], value: &[u8]) -> DbResult<Pointer> {
        let leaf = self.read_leaf(leaf_ptr)?;
        if leaf.key == remaining_key {
            self.overwrite_or_relocate_leaf_value(leaf_ptr, value)
        } else {
            self.split_leaf(&leaf, remaining_key, value)
        }
    }

    /// Split a leaf whose stored suffix diverges from `new_suffix` at
    /// byte `common`, producing a branch node with one or two children
    /// (and an optional link-to-value, if one of the two keys ends
    /// exactly at the divergence point), preceded by a chain of
    /// single-child internal nodes consuming the `common` shared bytes
    /// that come before the divergence — every internal-node hop
    /// consumes exactly one discriminant byte, so a shared prefix longer
    /// than one byte needs one hop per byte, not a single wide node.
    fn split_leaf(&mut self, old_leaf: &LeafNode, new_suffix: &[u8], value: &[u8]) -> DbResult<Pointer> {
        let old_suffix = &old_leaf.key;
        let common = common_prefix_len(old_suffix, new_suffix);

        let mut link_to_value = None;
        let mut children = Vec::with_capacity(2);

        if common == old_suffix.len() {
            let ptr = self.relocate_leaf_with_new_key(old_leaf, &[])?;
            link_to_value = Some(ptr);
        } else {
            let byte = old_suffix[common];
            let ptr = self.relocate_leaf_with_new_key(old_leaf, &old_suffix[common + 1..])?;
            children.push(Child { discriminant: byte, pointer: ptr });
        }

        if common == new_suffix.len() {
            let ptr = self.create_leaf(&[], value)?;
            link_to_value = Some(ptr);
        } else {
            let byte = new_suffix[common];
            let ptr = self.create_leaf(&new_suffix[common + 1..], value)?;
            children.push(Child { discriminant: byte, pointer: ptr });
        }

        self.record_count += 1;
        children.sort_by_key(|c| c.discriminant);
        let capacity = self.config.initial_child_capacity.max(children.len() as u16);
        let node = InternalNode { link_to_value, children, capacity };
        let mut chain_ptr = Pointer(self.cache.write_to_end(&node.encode())?);

        for i in (0..common).rev() {
            let wrapper = InternalNode {
                link_to_value: None,
                children: vec![Child { discriminant: old_suffix[i], pointer: chain_ptr }],
                capacity: self.config.initial_child_capacity.max(1),
            };
            chain_ptr = Pointer(self.cache.write_to_end(&wrapper.encode())?);
        }
        Ok(chain_ptr)
    }

    /// Insert a new child into `node` (already decoded from `node_ptr`),
    /// keeping children sorted by discriminant byte. Writes in place if
    /// slack allows it, else relocates with doubled capacity.
    fn add_child_entry(
        &mut self,
        node_ptr: Pointer,
        node: &mut InternalNode,
        byte: u8,
        leaf_ptr: Pointer,
    ) -> DbResult<Pointer> {
        let idx = node.insertion_index(byte);
        if (node.children.len() as u16) < node.capacity {
            node.children.insert(idx, Child { discriminant: byte, pointer: leaf_ptr });
            self.write_internal(node_ptr, node)?;
            Ok(node_ptr)
        } else {
            let mut children = node.children.clone();
            children.insert(idx, Child { discriminant: byte, pointer: leaf_ptr });
            let new_capacity = node.capacity.max(1).saturating_mul(2);
            let relocated = InternalNode { link_to_value: node.link_to_value, children, capacity: new_capacity };
            Ok(Pointer(self.cache.write_to_end(&relocated.encode())?))
        }
    }

    // ---- deletion ----

    /// Remove `key` if present. Non-compacting: internal nodes are never
    /// pruned even if they become childless, and no bytes are reclaimed.
    pub fn delete_key(&mut self, key: &[u8]) -> DbResult<bool> {
        let deleted = self.delete_key_at(self.root_node_ptr, key, 0)?;
        if deleted {
            self.record_count -= 1;
            self.write_record_count()?;
            self.bump_generation()?;
        }
        Ok(deleted)
    }

    fn delete_key_at(&mut self, node_ptr: Pointer, key: &[u8], depth: usize) -> DbResult<bool> {
        let mut node = self.read_internal(node_ptr)?;

        if depth == key.len() {
            return match node.link_to_value {
                Some(_) => {
                    self.write_internal_link(node_ptr, Pointer::NULL)?;
                    Ok(true)
                }
                None => Ok(false),
            };
        }

        let b = key[depth];
        match node.find_child(b) {
            None => Ok(false),
            Some((idx, child_ptr)) => {
                if self.peek_tag(child_ptr)? == node::TAG_LEAF {
                    let leaf = self.read_leaf(child_ptr)?;
                    if leaf.key == key[depth + 1..] {
                        node.children.remove(idx);
                        self.write_internal(node_ptr, &node)?;
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                } else {
                    self.delete_key_at(child_ptr, key, depth + 1)
                }
            }
        }
    }

    // ---- enumeration ----

    /// Start a lazy, ordered enumeration of every key beginning with
    /// `prefix`. The returned iterator borrows the trie mutably and is
    /// invalidated by any subsequent mutating call.
    pub fn enumerate_start_with(&mut self, prefix: &[u8]) -> DbResult<Enumerator<'_, S>> {
        let stack = self.walk_to_prefix(prefix)?;
        Ok(Enumerator { trie: self, stack })
    }

    fn walk_to_prefix(&mut self, prefix: &[u8]) -> DbResult<Vec<Frame>> {
        let mut node_ptr = self.root_node_ptr;
        let mut depth = 0usize;
        let mut path = Vec::new();

        loop {
            if depth == prefix.len() {
                let node = self.read_internal(node_ptr)?;
                return Ok(vec![Frame {
                    path,
                    link: node.link_to_value,
                    link_emitted: false,
                    children: node.children,
                    next_child: 0,
                }]);
            }
            let node = self.read_internal(node_ptr)?;
            let b = prefix[depth];
            match node.find_child(b) {
                None => return Ok(Vec::new()),
                Some((_, child_ptr)) => {
                    if self.peek_tag(child_ptr)? == node::TAG_LEAF {
                        let leaf = self.read_leaf(child_ptr)?;
                        let rem = &prefix[depth + 1..];
                        let common = common_prefix_len(&leaf.key, rem);
                        if common == rem.len() {
                            let mut leaf_path = path.clone();
                            leaf_path.push(b);
                            return Ok(vec![Frame {
                                path: leaf_path,
                                link: Some(child_ptr),
                                link_emitted: false,
                                children: Vec::new(),
                                next_child: 0,
                            }]);
                        }
                        return Ok(Vec::new());
                    }
                    path.push(b);
                    node_ptr = child_ptr;
                    depth += 1;
                }
            }
        }
    }
}

struct Frame {
    path: Vec<u8>,
    link: Option<Pointer>,
    link_emitted: bool,
    children: Vec<Child>,
    next_child: usize,
}

/// Lazy in-order enumerator produced by [`Trie::enumerate_start_with`].
pub struct Enumerator<'a, S: Storage> {
    trie: &'a mut Trie<S>,
    stack: Vec<Frame>,
}

impl<'a, S: Storage> Iterator for Enumerator<'a, S> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.len().checked_sub(1)?;

            if !self.stack[top].link_emitted {
                self.stack[top].link_emitted = true;
                if let Some(link_ptr) = self.stack[top].link {
                    let path = self.stack[top].path.clone();
                    return Some(self.trie.leaf_row_at(link_ptr, path));
                }
                continue;
            }

            if self.stack[top].next_child < self.stack[top].children.len() {
                let child = self.stack[top].children[self.stack[top].next_child];
                self.stack[top].next_child += 1;
                let mut child_path = self.stack[top].path.clone();
                child_path.push(child.discriminant);

                match self.trie.peek_tag(child.pointer) {
                    Ok(tag) if tag == node::TAG_LEAF => {
                        return Some(self.trie.leaf_row_at(child.pointer, child_path));
                    }
                    Ok(_) => match self.trie.read_internal(child.pointer) {
                        Ok(inner) => {
                            self.stack.push(Frame {
                                path: child_path,
                                link: inner.link_to_value,
                                link_emitted: false,
                                children: inner.children,
                                next_child: 0,
                            });
                            continue;
                        }
                        Err(e) => return Some(Err(e)),
                    },
                    Err(e) => return Some(Err(e)),
                }
            } else {
                self.stack.pop();
                continue;
            }
        }
    }
}
