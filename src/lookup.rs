//! Lookup specialization selection.
//!
//! The generic lookup is defined for any mask shape. Specialized variants
//! unroll the mask-apply/compare loop for a closed, enumerable set of
//! popular `(bits_unit0, bits_unit1)` shapes. Selection never changes the
//! set of matches returned (testable property 3) — it only changes how
//! fast the match is found.

use bitflags::bitflags;

bitflags! {
    /// Runtime capability hint: which specialized lookup
    /// variants are compiled in and may be selected by `optimize()`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// 5 blocks in unit 0, 1 in unit 1 (e.g. 5-tuple + metadata word).
        const FIXED_5_1 = 0b0001;
        /// 4 blocks in unit 0, 1 in unit 1.
        const FIXED_4_1 = 0b0010;
        /// 4 blocks in unit 0, none in unit 1.
        const FIXED_4_0 = 0b0100;
    }
}

impl Capabilities {
    /// All specializations compiled into this build. The generic lookup
    /// is always available and is not represented as a flag.
    pub const ALL: Self = Self::FIXED_5_1.union(Self::FIXED_4_1).union(Self::FIXED_4_0);
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::ALL
    }
}

/// Which concrete lookup implementation a subtable currently dispatches
/// to. A closed, enumerable set so specialization-equivalence
/// tests (property 3) can pin and iterate every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupVariant {
    /// Works for any mask shape.
    Generic,
    /// Unrolled for 6 total populated blocks, split 5/1.
    Fixed5_1,
    /// Unrolled for 5 total populated blocks, split 4/1.
    Fixed4_1,
    /// Unrolled for 4 total populated blocks, split 4/0.
    Fixed4_0,
}

impl LookupVariant {
    /// Total number of populated mask blocks this variant is unrolled for,
    /// or `None` for the generic (any-shape) variant.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            LookupVariant::Generic => None,
            LookupVariant::Fixed5_1 => Some(6),
            LookupVariant::Fixed4_1 => Some(5),
            LookupVariant::Fixed4_0 => Some(4),
        }
    }

    /// All specialized variants, for exhaustive equivalence testing.
    pub fn specialized() -> [LookupVariant; 3] {
        [LookupVariant::Fixed5_1, LookupVariant::Fixed4_1, LookupVariant::Fixed4_0]
    }
}

/// Select the best lookup variant for a subtable whose mask has
/// `bits_unit0`/`bits_unit1` populated blocks, given the capabilities the
/// caller says are compiled in. Always falls back to [`LookupVariant::Generic`].
pub fn select_variant(bits_unit0: u32, bits_unit1: u32, caps: Capabilities) -> LookupVariant {
    match (bits_unit0, bits_unit1) {
        (5, 1) if caps.contains(Capabilities::FIXED_5_1) => LookupVariant::Fixed5_1,
        (4, 1) if caps.contains(Capabilities::FIXED_4_1) => LookupVariant::Fixed4_1,
        (4, 0) if caps.contains(Capabilities::FIXED_4_0) => LookupVariant::Fixed4_0,
        _ => LookupVariant::Generic,
    }
}
