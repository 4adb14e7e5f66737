//! Sparse, fixed-schema flow record.
//!
//! A [`Miniflow`] encodes a flow record as a two-unit bitmap ("flowmap")
//! marking which of up to [`MAX_BLOCKS`] 64-bit "blocks" are present, plus
//! the packed values themselves in ascending block-index order. The packed
//! array length always equals `flowmap.popcount()`.

use std::fmt;

/// Maximum number of 64-bit blocks a flow schema can address (two 64-bit
/// bitmap units, one bit per block).
pub const MAX_BLOCKS: usize = 128;

/// Two-unit bitmap of populated blocks, split so popcount is two 64-bit
/// operations rather than one on a wider integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlowMap {
    units: [u64; 2],
}

impl FlowMap {
    /// The empty flowmap.
    pub const fn empty() -> Self {
        Self { units: [0, 0] }
    }

    /// Set the bit for `block`.
    ///
    /// # Panics
    /// Panics if `block >= MAX_BLOCKS`.
    pub fn set(&mut self, block: usize) {
        assert!(block < MAX_BLOCKS, "block index out of range");
        let (unit, bit) = Self::split(block);
        self.units[unit] |= 1u64 << bit;
    }

    /// True if `block` is populated.
    #[inline(always)]
    pub fn is_set(&self, block: usize) -> bool {
        if block >= MAX_BLOCKS {
            return false;
        }
        let (unit, bit) = Self::split(block);
        self.units[unit] & (1u64 << bit) != 0
    }

    /// Number of populated blocks in unit 0 (indices < 64).
    #[inline(always)]
    pub fn bits_unit0(&self) -> u32 {
        self.units[0].count_ones()
    }

    /// Number of populated blocks in unit 1 (indices >= 64).
    #[inline(always)]
    pub fn bits_unit1(&self) -> u32 {
        self.units[1].count_ones()
    }

    /// Total number of populated blocks.
    #[inline(always)]
    pub fn popcount(&self) -> u32 {
        self.bits_unit0() + self.bits_unit1()
    }

    /// Position (0-based, among populated blocks) that `block` would occupy
    /// in the packed values array, or `None` if `block` is not populated.
    #[inline(always)]
    pub fn position_of(&self, block: usize) -> Option<usize> {
        if !self.is_set(block) {
            return None;
        }
        let (unit, bit) = Self::split(block);
        let below = self.units[unit] & ((1u64 << bit) - 1);
        let in_unit = below.count_ones() as usize;
        let prior_units = if unit == 1 {
            self.units[0].count_ones() as usize
        } else {
            0
        };
        Some(prior_units + in_unit)
    }

    /// Union of two flowmaps.
    pub fn union(&self, other: &FlowMap) -> FlowMap {
        FlowMap {
            units: [self.units[0] | other.units[0], self.units[1] | other.units[1]],
        }
    }

    /// Iterate populated block indices in ascending order, restricted to
    /// the bits also set in `subset`.
    pub fn iter_in(&self, subset: &FlowMap) -> impl Iterator<Item = usize> + '_ {
        let mask = [self.units[0] & subset.units[0], self.units[1] & subset.units[1]];
        FlowMapIter { units: mask, unit: 0 }
    }

    /// Iterate all populated block indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        FlowMapIter { units: self.units, unit: 0 }
    }

    #[inline(always)]
    fn split(block: usize) -> (usize, usize) {
        (block / 64, block % 64)
    }
}

struct FlowMapIter {
    units: [u64; 2],
    unit: usize,
}

impl Iterator for FlowMapIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.unit >= 2 {
                return None;
            }
            if self.units[self.unit] == 0 {
                self.unit += 1;
                continue;
            }
            let bit = self.units[self.unit].trailing_zeros() as usize;
            self.units[self.unit] &= self.units[self.unit] - 1; // clear lowest set bit
            return Some(self.unit * 64 + bit);
        }
    }
}

/// Sparse flow record: a flowmap plus exactly `flowmap.popcount()` packed
/// 64-bit values, in ascending block-index order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Miniflow {
    map: FlowMap,
    values: Vec<u64>,
}

impl Miniflow {
    /// Build a miniflow from explicit `(block, value)` pairs. Pairs must be
    /// supplied in ascending block order with no duplicate blocks.
    pub fn from_blocks<I: IntoIterator<Item = (usize, u64)>>(blocks: I) -> Self {
        let mut map = FlowMap::empty();
        let mut values = Vec::new();
        let mut last: Option<usize> = None;
        for (block, value) in blocks {
            if let Some(prev) = last {
                assert!(block > prev, "blocks must be strictly ascending");
            }
            map.set(block);
            values.push(value);
            last = Some(block);
        }
        Self { map, values }
    }

    /// The flowmap.
    #[inline(always)]
    pub fn flowmap(&self) -> &FlowMap {
        &self.map
    }

    /// The packed values, in ascending block-index order.
    #[inline(always)]
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Byte length of the packed values (what `FlowKey::len` reports).
    #[inline(always)]
    pub fn packed_len_bytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<u64>()
    }

    /// Value at `block`, if populated.
    #[inline(always)]
    pub fn get(&self, block: usize) -> Option<u64> {
        self.map.position_of(block).map(|pos| self.values[pos])
    }

    /// Iterate `(block_index, value)` pairs restricted to blocks also
    /// present in `flowmap`, in ascending order. O(popcount(flowmap)).
    pub fn iter_in<'a>(&'a self, flowmap: &'a FlowMap) -> impl Iterator<Item = (usize, u64)> + 'a {
        self.map.iter_in(flowmap).map(move |b| (b, self.get(b).expect("flowmap subset of self")))
    }

    /// Iterate all `(block_index, value)` pairs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.values.iter().copied().enumerate().map(|(pos, v)| (self.position_to_block(pos), v))
    }

    fn position_to_block(&self, pos: usize) -> usize {
        self.map.iter().nth(pos).expect("position within popcount")
    }
}

impl fmt::Debug for Miniflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Miniflow")
            .field("popcount", &self.map.popcount())
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flowmap_popcount_matches_values() {
        let mf = Miniflow::from_blocks([(0, 1), (3, 2), (70, 3)]);
        assert_eq!(mf.flowmap().popcount(), 3);
        assert_eq!(mf.values().len(), 3);
        assert_eq!(mf.flowmap().bits_unit0(), 2);
        assert_eq!(mf.flowmap().bits_unit1(), 1);
    }

    #[test]
    fn test_position_of_tracks_unit_boundary() {
        let mf = Miniflow::from_blocks([(1, 10), (2, 20), (64, 30), (65, 40)]);
        assert_eq!(mf.flowmap().position_of(1), Some(0));
        assert_eq!(mf.flowmap().position_of(2), Some(1));
        assert_eq!(mf.flowmap().position_of(64), Some(2));
        assert_eq!(mf.flowmap().position_of(65), Some(3));
        assert_eq!(mf.flowmap().position_of(3), None);
    }

    #[test]
    fn test_position_of_last_bit_of_unit0() {
        // Block 63 is the top bit of unit 0; `(1 << 63) - 1` must not be
        // special-cased away (it doesn't overflow) or every lower bit in
        // unit 0 goes uncounted.
        let mf = Miniflow::from_blocks([(1, 10), (2, 20), (63, 30)]);
        assert_eq!(mf.flowmap().position_of(63), Some(2));
        assert_eq!(mf.get(63), Some(30));
    }

    #[test]
    fn test_get_and_iter_in_are_consistent() {
        let mf = Miniflow::from_blocks([(0, 10), (5, 20), (9, 30)]);
        assert_eq!(mf.get(5), Some(20));
        assert_eq!(mf.get(4), None);

        let mut subset = FlowMap::empty();
        subset.set(0);
        subset.set(9);
        let collected: Vec<_> = mf.iter_in(&subset).collect();
        assert_eq!(collected, vec![(0, 10), (9, 30)]);
    }

    #[test]
    fn test_iter_visits_ascending_order() {
        let mf = Miniflow::from_blocks([(2, 1), (3, 2), (100, 3)]);
        let collected: Vec<_> = mf.iter().collect();
        assert_eq!(collected, vec![(2, 1), (3, 2), (100, 3)]);
    }

    #[test]
    fn test_union_combines_bits() {
        let a = Miniflow::from_blocks([(1, 0)]).flowmap().clone();
        let b = Miniflow::from_blocks([(2, 0)]).flowmap().clone();
        let u = a.union(&b);
        assert!(u.is_set(1));
        assert!(u.is_set(2));
        assert_eq!(u.popcount(), 2);
    }
}
