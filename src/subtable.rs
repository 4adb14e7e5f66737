//! A set of rules sharing one wildcard mask.
//!
//! The subtable owns its mask, a concurrent hash map from masked-key hash
//! to colliding rules, the precomputed mask-expansion cache, and a
//! lookup-function selector. Rule lookup never blocks: the rule map is a
//! [`flurry::HashMap`], which reclaims retired buckets only after its own
//! epoch-based quiescence, giving readers wait-free, use-after-free-free
//! traversal while the control thread mutates structure underneath them.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{ClassifierError, ClassifierResult};
use crate::hash::hash_words;
use crate::key::{matches_under_mask, FlowKey};
use crate::lookup::{select_variant, Capabilities, LookupVariant};
use crate::mask::{build_masked_key, expand_masks, MaskExpansion};
use crate::rule::DpclsRule;

/// Hash-indexed set of rules that all wildcard the same fields.
pub struct Subtable {
    mask: Arc<FlowKey>,
    masks: Box<[MaskExpansion]>,
    bits_unit0: u32,
    bits_unit1: u32,
    rules: flurry::HashMap<u32, Vec<Arc<DpclsRule>>>,
    rule_count: AtomicU64,
    /// Hits in the current optimization interval (relaxed, advisory;
    /// spec.md §4.4).
    hit_cnt: AtomicU64,
    variant: AtomicU8,
}

impl Subtable {
    /// Create an empty subtable for `mask`, selecting an initial lookup
    /// variant from `caps`.
    pub fn new(mask: FlowKey, caps: Capabilities) -> Self {
        let masks = expand_masks(&mask);
        let bits_unit0 = mask.flowmap().bits_unit0();
        let bits_unit1 = mask.flowmap().bits_unit1();
        let variant = select_variant(bits_unit0, bits_unit1, caps);
        tracing::debug!(
            bits_unit0,
            bits_unit1,
            ?variant,
            "created subtable"
        );
        Self {
            mask: Arc::new(mask),
            masks,
            bits_unit0,
            bits_unit1,
            rules: flurry::HashMap::new(),
            rule_count: AtomicU64::new(0),
            hit_cnt: AtomicU64::new(0),
            variant: AtomicU8::new(variant_to_u8(variant)),
        }
    }

    /// This subtable's immutable mask.
    #[inline(always)]
    pub fn mask(&self) -> &Arc<FlowKey> {
        &self.mask
    }

    #[inline(always)]
    pub fn bits_unit0(&self) -> u32 {
        self.bits_unit0
    }

    #[inline(always)]
    pub fn bits_unit1(&self) -> u32 {
        self.bits_unit1
    }

    /// Number of mask-expansion-cache entries (`popcount(mask.flowmap)`).
    #[inline(always)]
    pub fn scratch_len(&self) -> usize {
        self.masks.len()
    }

    /// Current lookup variant in effect.
    pub fn variant(&self) -> LookupVariant {
        u8_to_variant(self.variant.load(Ordering::Relaxed))
    }

    /// Re-select the lookup variant from the capability token. Called by
    /// `optimize()`; falls back to generic and reports
    /// `CapabilityUnavailable` if the caller asked to pin a specialization
    /// that doesn't match this subtable's shape.
    pub fn reselect_variant(&self, caps: Capabilities) -> ClassifierResult<()> {
        let chosen = select_variant(self.bits_unit0, self.bits_unit1, caps);
        self.variant.store(variant_to_u8(chosen), Ordering::Relaxed);
        let has_specialized_shape =
            matches!((self.bits_unit0, self.bits_unit1), (5, 1) | (4, 1) | (4, 0));
        if chosen == LookupVariant::Generic && has_specialized_shape {
            tracing::debug!(
                bits_unit0 = self.bits_unit0,
                bits_unit1 = self.bits_unit1,
                "requested specialization unavailable, using generic lookup"
            );
            return Err(ClassifierError::CapabilityUnavailable);
        }
        Ok(())
    }

    /// Hits recorded in the current optimization interval.
    #[inline(always)]
    pub fn hit_count(&self) -> u64 {
        self.hit_cnt.load(Ordering::Relaxed)
    }

    /// Reset the hit counter (called by `optimize()` under the writer
    /// mutex).
    pub fn reset_hit_count(&self) -> u64 {
        self.hit_cnt.swap(0, Ordering::Relaxed)
    }

    /// Number of rules currently installed.
    pub fn len(&self) -> u64 {
        self.rule_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `flow` as a new rule. The caller does not deduplicate
    /// (spec.md §9 open question): behavior on a duplicate (mask, key) is
    /// unspecified but never unsafe.
    pub fn insert(&self, flow: FlowKey) -> ClassifierResult<Arc<DpclsRule>> {
        let rule = Arc::new(DpclsRule::new(self.mask.clone(), flow));
        let hash = self.hash_of_rule(&rule);

        let pin = self.rules.pin();
        let mut chain = pin.get(&hash).cloned().unwrap_or_default();
        chain
            .try_reserve(1)
            .map_err(|_| ClassifierError::AllocationFailure)?;
        chain.push(rule.clone());
        pin.insert(hash, chain);
        self.rule_count.fetch_add(1, Ordering::Relaxed);
        Ok(rule)
    }

    /// Remove a previously-inserted rule. Removing a rule not present in
    /// this subtable is a programmer error (spec.md §7 `MissingRemove`)
    /// and aborts in debug builds.
    pub fn remove(&self, rule: &Arc<DpclsRule>) {
        let hash = self.hash_of_rule(rule);
        let pin = self.rules.pin();
        let Some(chain) = pin.get(&hash) else {
            debug_assert!(false, "MissingRemove: rule not present in subtable");
            return;
        };
        let mut remaining = chain.clone();
        let before = remaining.len();
        remaining.retain(|r| !Arc::ptr_eq(r, rule));
        debug_assert!(
            remaining.len() < before,
            "MissingRemove: rule not present in hash chain"
        );
        if remaining.is_empty() {
            pin.remove(&hash);
        } else {
            pin.insert(hash, remaining);
        }
        self.rule_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Snapshot every rule currently installed in this subtable, for
    /// diagnostic tooling (spec.md §6 "iteration over rules"). Not used on
    /// any lookup path.
    pub fn rules(&self) -> Vec<Arc<DpclsRule>> {
        let pin = self.rules.pin();
        pin.values().flatten().cloned().collect()
    }

    fn hash_of_rule(&self, rule: &DpclsRule) -> u32 {
        let mut scratch = vec![0u64; self.masks.len()];
        let ok = build_masked_key(rule.flow(), &self.masks, &mut scratch);
        debug_assert!(ok, "rule flow must present every field the mask constrains");
        hash_words(&scratch)
    }

    /// Run this subtable's currently-selected lookup over the packets
    /// whose bit is set in `keys_map`. Clears bits for packets matched,
    /// writing the winning rule into `rules_out`; returns the updated
    /// bitmap. `scratch` is caller-owned, reused across subtables, and
    /// must have length `>= self.scratch_len()`.
    pub fn lookup(
        &self,
        scratch: &mut [u64],
        keys_map: u64,
        keys: &[&FlowKey],
        rules_out: &mut [Option<Arc<DpclsRule>>],
    ) -> u64 {
        match self.variant() {
            LookupVariant::Generic => self.lookup_generic(scratch, keys_map, keys, rules_out),
            LookupVariant::Fixed5_1 => self.lookup_fixed::<6>(keys_map, keys, rules_out),
            LookupVariant::Fixed4_1 => self.lookup_fixed::<5>(keys_map, keys, rules_out),
            LookupVariant::Fixed4_0 => self.lookup_fixed::<4>(keys_map, keys, rules_out),
        }
    }

    /// Lookup using the generic (any mask shape) path. Exposed for
    /// specialization-equivalence testing (testable property 3).
    pub fn lookup_generic(
        &self,
        scratch: &mut [u64],
        mut keys_map: u64,
        keys: &[&FlowKey],
        rules_out: &mut [Option<Arc<DpclsRule>>],
    ) -> u64 {
        let pin = self.rules.pin();
        let mut remaining = keys_map;
        while remaining != 0 {
            let i = remaining.trailing_zeros() as usize;
            remaining &= remaining - 1;
            let packet = keys[i];
            if !build_masked_key(packet, &self.masks, scratch) {
                continue;
            }
            let hash = hash_words(&scratch[..self.masks.len()]);
            if let Some(winner) = self.find_in_chain(&pin, hash, packet) {
                rules_out[i] = Some(winner);
                keys_map &= !(1u64 << i);
                self.hit_cnt.fetch_add(1, Ordering::Relaxed);
            }
        }
        keys_map
    }

    /// Lookup unrolled for subtables with exactly `N` populated mask
    /// blocks. Must return results byte-identical to `lookup_generic`
    /// (testable property 3); it differs only in using a fixed-size
    /// scratch array, giving the compiler a constant trip count to unroll.
    pub fn lookup_fixed<const N: usize>(
        &self,
        mut keys_map: u64,
        keys: &[&FlowKey],
        rules_out: &mut [Option<Arc<DpclsRule>>],
    ) -> u64 {
        debug_assert_eq!(self.masks.len(), N, "fixed lookup variant/mask shape mismatch");
        let masks: [MaskExpansion; N] = self.masks.as_ref().try_into().unwrap();
        let pin = self.rules.pin();
        let mut remaining = keys_map;
        while remaining != 0 {
            let i = remaining.trailing_zeros() as usize;
            remaining &= remaining - 1;
            let packet = keys[i];

            let mut scratch = [0u64; N];
            let mut complete = true;
            for (slot, entry) in scratch.iter_mut().zip(masks.iter()) {
                match packet.miniflow().get(entry.block as usize) {
                    Some(value) => *slot = value & entry.mask,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }

            let hash = hash_words(&scratch);
            if let Some(winner) = self.find_in_chain(&pin, hash, packet) {
                rules_out[i] = Some(winner);
                keys_map &= !(1u64 << i);
                self.hit_cnt.fetch_add(1, Ordering::Relaxed);
            }
        }
        keys_map
    }

    fn find_in_chain(
        &self,
        pin: &flurry::HashMapRef<'_, u32, Vec<Arc<DpclsRule>>>,
        hash: u32,
        packet: &FlowKey,
    ) -> Option<Arc<DpclsRule>> {
        let chain = pin.get(&hash)?;
        chain
            .iter()
            .find(|candidate| matches_under_mask(packet, &self.mask, candidate.flow()))
            .cloned()
    }
}

fn variant_to_u8(v: LookupVariant) -> u8 {
    match v {
        LookupVariant::Generic => 0,
        LookupVariant::Fixed5_1 => 1,
        LookupVariant::Fixed4_1 => 2,
        LookupVariant::Fixed4_0 => 3,
    }
}

fn u8_to_variant(v: u8) -> LookupVariant {
    match v {
        1 => LookupVariant::Fixed5_1,
        2 => LookupVariant::Fixed4_1,
        3 => LookupVariant::Fixed4_0,
        _ => LookupVariant::Generic,
    }
}
