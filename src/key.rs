//! Flow key: a packet fingerprint or a subtable mask.
//!
//! A [`FlowKey`] bundles a 32-bit hash derived from the packed values, the
//! byte length of the packed miniflow, and the miniflow itself. The same
//! type plays two roles: a *packet key* carries every field
//! present on the wire; a *mask key* carries, at each position its
//! flowmap constrains, the bitmask applied to that field.

use crate::hash::hash_words;
use crate::miniflow::{FlowMap, Miniflow};

/// A flow key: opaque hash + packed-length + miniflow. Used both as a
/// per-packet fingerprint and as a subtable's mask.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FlowKey {
    hash: u32,
    mf: Miniflow,
}

impl FlowKey {
    /// Build a flow key from a miniflow, hashing its packed values with the
    /// classifier's fixed hash function.
    pub fn new(mf: Miniflow) -> Self {
        let hash = hash_words(mf.values());
        Self { hash, mf }
    }

    /// The stored hash. Opaque to callers outside this crate; used as the
    /// probe key into a subtable's rule map.
    #[inline(always)]
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Byte length of the packed miniflow.
    #[inline(always)]
    pub fn len_bytes(&self) -> usize {
        self.mf.packed_len_bytes()
    }

    /// The underlying miniflow.
    #[inline(always)]
    pub fn miniflow(&self) -> &Miniflow {
        &self.mf
    }

    /// This key's flowmap.
    #[inline(always)]
    pub fn flowmap(&self) -> &FlowMap {
        self.mf.flowmap()
    }
}

/// Equality-under-mask: for every block `b` in `mask`'s
/// flowmap, `packet[b] & mask[b] == expected[b]`. A block present in
/// `mask` but absent from `packet` is a miss (the packet must present
/// every field the mask constrains); blocks absent from `mask` are
/// unconstrained.
pub fn matches_under_mask(packet: &FlowKey, mask: &FlowKey, expected: &FlowKey) -> bool {
    for (block, mask_value) in mask.mf.iter() {
        let Some(packet_value) = packet.mf.get(block) else {
            return false;
        };
        let expected_value = expected.mf.get(block).unwrap_or(0);
        if packet_value & mask_value != expected_value {
            return false;
        }
    }
    true
}
