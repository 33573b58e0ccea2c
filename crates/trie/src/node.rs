//! On-disk tagged node layout for the LTrie: internal nodes, leaves, the
//! root record, and the generation counter.
//!
//! Every node is a self-contained byte run addressed by the offset of its
//! first (tag) byte. Internal nodes carry trailing slack so a handful of
//! new children fit without relocation; leaves carry value slack for the
//! same reason on the value side. Nothing here touches the cache — these
//! are pure encode/decode functions over `&[u8]` / `Vec<u8>`.

use common::{DbError, DbResult, Pointer};

pub const TAG_INTERNAL: u8 = 1;
pub const TAG_LEAF: u8 = 2;
pub const TAG_GENERATION: u8 = 3;

/// Fixed root record: root pointer, generation pointer, record count.
pub const ROOT_RECORD_LEN: u64 = 24;
/// Tag byte + 8-byte counter.
pub const GENERATION_NODE_LEN: u64 = 9;

pub const INTERNAL_HEADER_LEN: usize = 1 + 8 + 2 + 2; // tag + link + count + capacity
pub const CHILD_ENTRY_LEN: usize = 1 + 8; // discriminant byte + pointer

fn read_u64(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(buf[at..at + 8].try_into().unwrap())
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(buf[at..at + 2].try_into().unwrap())
}

/// One child of an internal node: the byte that selects it, and the
/// pointer to the node (leaf or internal) it leads to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Child {
    pub discriminant: u8,
    pub pointer: Pointer,
}

/// A decoded internal node. `capacity` is the number of child slots the
/// node's on-disk footprint reserves; `children.len() <= capacity`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InternalNode {
    pub link_to_value: Option<Pointer>,
    pub children: Vec<Child>,
    pub capacity: u16,
}

impl InternalNode {
    pub fn encoded_len(&self) -> usize {
        INTERNAL_HEADER_LEN + self.capacity as usize * CHILD_ENTRY_LEN
    }

    /// Encode at full on-disk width, zero-padding unused child slots.
    pub fn encode(&self) -> Vec<u8> {
        assert!(self.children.len() <= self.capacity as usize);
        let mut buf = vec![0u8; self.encoded_len()];
        buf[0] = TAG_INTERNAL;
        buf[1..9].copy_from_slice(&self.link_to_value.unwrap_or(Pointer::NULL).0.to_le_bytes());
        buf[9..11].copy_from_slice(&(self.children.len() as u16).to_le_bytes());
        buf[11..13].copy_from_slice(&self.capacity.to_le_bytes());
        let mut at = INTERNAL_HEADER_LEN;
        for child in &self.children {
            buf[at] = child.discriminant;
            buf[at + 1..at + 9].copy_from_slice(&child.pointer.0.to_le_bytes());
            at += CHILD_ENTRY_LEN;
        }
        buf
    }

    /// Decode from a buffer that holds at least the node's full footprint
    /// (header + capacity * entry width) starting at index 0.
    pub fn decode(buf: &[u8]) -> DbResult<Self> {
        if buf.len() < INTERNAL_HEADER_LEN || buf[0] != TAG_INTERNAL {
            return Err(DbError::Corruption("bad internal node tag".into()));
        }
        let link_raw = read_u64(buf, 1);
        let count = read_u16(buf, 9) as usize;
        let capacity = read_u16(buf, 11);
        if count > capacity as usize {
            return Err(DbError::Corruption("internal node count exceeds capacity".into()));
        }
        let needed = INTERNAL_HEADER_LEN + capacity as usize * CHILD_ENTRY_LEN;
        if buf.len() < needed {
            return Err(DbError::Corruption("internal node buffer truncated".into()));
        }
        let mut children = Vec::with_capacity(count);
        let mut at = INTERNAL_HEADER_LEN;
        let mut prev: Option<u8> = None;
        for _ in 0..count {
            let discriminant = buf[at];
            let pointer = Pointer(read_u64(buf, at + 1));
            if let Some(p) = prev
                && discriminant <= p
            {
                return Err(DbError::Corruption("child discriminants not sorted".into()));
            }
            prev = Some(discriminant);
            children.push(Child { discriminant, pointer });
            at += CHILD_ENTRY_LEN;
        }
        Ok(Self {
            link_to_value: if link_raw == 0 { None } else { Some(Pointer(link_raw)) },
            children,
            capacity,
        })
    }

    /// Index of the child entry for `byte`, via binary search over the
    /// sorted discriminant array.
    pub fn find_child(&self, byte: u8) -> Option<(usize, Pointer)> {
        self.children
            .binary_search_by_key(&byte, |c| c.discriminant)
            .ok()
            .map(|idx| (idx, self.children[idx].pointer))
    }

    /// Insertion index that keeps `children` sorted if `byte` is added.
    pub fn insertion_index(&self, byte: u8) -> usize {
        self.children.partition_point(|c| c.discriminant < byte)
    }

    /// Read just the capacity field out of a buffer holding at least the
    /// fixed header, without decoding the child array.
    pub fn peek_capacity(buf: &[u8]) -> DbResult<u16> {
        if buf.len() < INTERNAL_HEADER_LEN || buf[0] != TAG_INTERNAL {
            return Err(DbError::Corruption("bad internal node tag".into()));
        }
        Ok(read_u16(buf, 11))
    }
}

/// A decoded leaf (value record). `key` is the *suffix* not already
/// consumed by the path of discriminant bytes leading to this leaf.
/// `value_capacity` is the reserved value-region width; `value.len() <=
/// value_capacity`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafNode {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub value_capacity: u32,
}

impl LeafNode {
    fn value_offset(key_len: usize) -> usize {
        1 + 8 + key_len + 4 + 4
    }

    pub fn encoded_len(&self) -> usize {
        Self::value_offset(self.key.len()) + self.value_capacity as usize
    }

    pub fn encode(&self) -> Vec<u8> {
        assert!(self.value.len() <= self.value_capacity as usize);
        let mut buf = vec![0u8; self.encoded_len()];
        buf[0] = TAG_LEAF;
        buf[1..9].copy_from_slice(&(self.key.len() as u64).to_le_bytes());
        let key_end = 9 + self.key.len();
        buf[9..key_end].copy_from_slice(&self.key);
        buf[key_end..key_end + 4].copy_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf[key_end + 4..key_end + 8].copy_from_slice(&self.value_capacity.to_le_bytes());
        let value_start = key_end + 8;
        buf[value_start..value_start + self.value.len()].copy_from_slice(&self.value);
        buf
    }

    /// Decode header + value from a buffer holding the node's full
    /// footprint starting at index 0.
    pub fn decode(buf: &[u8]) -> DbResult<Self> {
        if buf.len() < 9 || buf[0] != TAG_LEAF {
            return Err(DbError::Corruption("bad leaf node tag".into()));
        }
        let key_len = read_u64(buf, 1) as usize;
        let key_end = 9 + key_len;
        if buf.len() < key_end + 8 {
            return Err(DbError::Corruption("leaf node buffer truncated".into()));
        }
        let key = buf[9..key_end].to_vec();
        let value_len = read_u32(buf, key_end) as usize;
        let value_capacity = read_u32(buf, key_end + 4);
        let value_start = key_end + 8;
        let value_end = value_start + value_len;
        if buf.len() < value_start + value_capacity as usize || value_len > value_capacity as usize {
            return Err(DbError::Corruption("leaf value region truncated".into()));
        }
        let value = buf[value_start..value_end].to_vec();
        Ok(Self { key, value, value_capacity })
    }

    /// Just enough bytes to learn `key_len` and `value_capacity` without
    /// decoding the value: callers use this to size the follow-up read.
    pub fn peek_header_len(buf: &[u8]) -> DbResult<usize> {
        if buf.len() < 9 || buf[0] != TAG_LEAF {
            return Err(DbError::Corruption("bad leaf node tag".into()));
        }
        let key_len = read_u64(buf, 1) as usize;
        Ok(9 + key_len + 8)
    }
}

/// Decode just the generation counter from a 9-byte buffer.
pub fn decode_generation(buf: &[u8]) -> DbResult<u64> {
    if buf.len() < GENERATION_NODE_LEN as usize || buf[0] != TAG_GENERATION {
        return Err(DbError::Corruption("bad generation node tag".into()));
    }
    Ok(read_u64(buf, 1))
}

pub fn encode_generation(value: u64) -> Vec<u8> {
    let mut buf = vec![0u8; GENERATION_NODE_LEN as usize];
    buf[0] = TAG_GENERATION;
    buf[1..9].copy_from_slice(&value.to_le_bytes());
    buf
}

/// Peek the tag byte at the front of a buffer already read from storage.
pub fn peek_tag(buf: &[u8]) -> DbResult<u8> {
    buf.first().copied().ok_or_else(|| DbError::Corruption("empty node buffer".into()))
}

#[cfg(test)]
mod tests;
