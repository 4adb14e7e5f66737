//! The classifier (dpcls): an MRU-ordered collection of
//! subtables with a writer-mutex-guarded insert/remove API and a
//! wait-free, mutex-free lookup path.
//!
//! Structural changes (creating/retiring a subtable, publishing a new MRU
//! order) are serialized through `subtables` (a [`parking_lot::Mutex`]) and
//! published to readers by swapping in a new `Arc<Vec<Arc<Subtable>>>` via
//! [`arc_swap::ArcSwap`] — the lock-free-RCU substrate the teacher crate's
//! `sase-common` already depends on. A reader's single `load()` at the
//! start of a lookup batch pins the subtable snapshot it walks for the
//! rest of that call, regardless of what the writer does concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, ClassifierResult};
use crate::key::FlowKey;
use crate::lookup::Capabilities;
use crate::rule::DpclsRule;
use crate::subtable::Subtable;

/// Userspace datapath packet classifier: maps flow keys to installed rules
/// via tuple-space search over subtables.
pub struct Classifier {
    subtables: Mutex<HashMap<FlowKey, Arc<Subtable>>>,
    mru: ArcSwap<Vec<Arc<Subtable>>>,
    capabilities: Capabilities,
}

impl Classifier {
    /// Create an empty classifier.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            subtables: Mutex::new(HashMap::with_capacity(config.initial_subtable_capacity)),
            mru: ArcSwap::from_pointee(Vec::new()),
            capabilities: config.capabilities,
        }
    }

    /// Insert `flow` into the subtable whose mask equals `mask`, creating
    /// the subtable (and publishing it to readers) if none exists yet.
    ///
    /// Duplicate insertion of an already-present (mask, key) pair is not
    /// rejected by the classifier — the caller is responsible for not
    /// doing it.
    pub fn insert(&self, mask: FlowKey, flow: FlowKey) -> ClassifierResult<Arc<DpclsRule>> {
        let mut subtables = self.subtables.lock();
        let subtable = match subtables.get(&mask) {
            Some(existing) => existing.clone(),
            None => {
                subtables
                    .try_reserve(1)
                    .map_err(|_| ClassifierError::AllocationFailure)?;
                let created = Arc::new(Subtable::new(mask.clone(), self.capabilities));
                subtables.insert(mask, created.clone());
                self.publish_mru(&subtables);
                created
            }
        };
        subtable.insert(flow)
    }

    /// Remove `rule` from its subtable. If the subtable becomes empty it
    /// is itself removed and, once the last reader snapshot referencing it
    /// is dropped, reclaimed (spec.md §3 lifecycle).
    ///
    /// Removing a rule that is not present is a programmer error and
    /// aborts in debug builds (spec.md §7 `MissingRemove`).
    pub fn remove(&self, rule: &Arc<DpclsRule>) {
        let mut subtables = self.subtables.lock();
        let Some(subtable) = subtables.get(rule.mask().as_ref()).cloned() else {
            debug_assert!(false, "MissingRemove: no subtable for rule's mask");
            return;
        };
        subtable.remove(rule);
        if subtable.is_empty() {
            subtables.remove(rule.mask().as_ref());
            self.publish_mru(&subtables);
            tracing::debug!("retired empty subtable");
        }
    }

    /// Reorder the MRU view by descending hit count and reset counters
    ///, re-selecting each subtable's lookup variant from
    /// `caps`. Call periodically from a single thread.
    pub fn optimize(&self, caps: Capabilities) {
        let subtables = self.subtables.lock();
        let mut ranked: Vec<(u64, Arc<Subtable>)> = subtables
            .values()
            .map(|st| (st.reset_hit_count(), st.clone()))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, st) in &ranked {
            if let Err(err) = st.reselect_variant(caps) {
                tracing::warn!(%err, "optimize: specialization unavailable for subtable");
            }
        }

        let ordered: Vec<Arc<Subtable>> = ranked.into_iter().map(|(_, st)| st).collect();
        self.mru.store(Arc::new(ordered));
        tracing::info!(subtables = self.mru.load().len(), "optimize: MRU order republished");
    }

    /// Look up `keys.len()` packets (at most 64 per batch). Iterates
    /// subtables in MRU order; the first subtable that matches a packet
    /// wins (spec.md §4.2 "first subtable in MRU order wins"). Returns the
    /// final `keys_map`: bits still set mark misses, for which the
    /// corresponding `rules_out` entry is left untouched.
    ///
    /// Total and non-blocking: never acquires the writer mutex, never
    /// allocates on a path that can't fail loudly (the per-batch scratch
    /// buffer is the one exception, sized once up front).
    pub fn lookup(&self, keys: &[&FlowKey], rules_out: &mut [Option<Arc<DpclsRule>>]) -> u64 {
        assert_eq!(keys.len(), rules_out.len(), "keys and rules_out must be the same length");
        let n = keys.len();
        assert!(n <= 64, "batch size exceeds the 64-packet keys_map capacity");

        let mut keys_map: u64 = if n == 0 {
            0
        } else if n == 64 {
            u64::MAX
        } else {
            (1u64 << n) - 1
        };

        let view = self.mru.load();
        if view.is_empty() || keys_map == 0 {
            return keys_map;
        }

        let scratch_len = view.iter().map(|st| st.scratch_len()).max().unwrap_or(0);
        let mut scratch = vec![0u64; scratch_len];

        for subtable in view.iter() {
            if keys_map == 0 {
                break;
            }
            let len = subtable.scratch_len();
            keys_map = subtable.lookup(&mut scratch[..len], keys_map, keys, rules_out);
        }
        keys_map
    }

    /// Number of subtables currently installed (diagnostic introspection,
    /// spec.md §6).
    pub fn subtable_count(&self) -> usize {
        self.subtables.lock().len()
    }

    /// Total number of rules across all subtables (diagnostic
    /// introspection).
    pub fn rule_count(&self) -> u64 {
        self.subtables.lock().values().map(|st| st.len()).sum()
    }

    /// Snapshot the current MRU-ordered subtable list, for diagnostic
    /// tooling that wants to iterate rules.
    pub fn subtables_mru(&self) -> Arc<Vec<Arc<Subtable>>> {
        self.mru.load_full()
    }

    fn publish_mru(&self, subtables: &HashMap<FlowKey, Arc<Subtable>>) {
        let current = self.mru.load();
        let mut ordered: Vec<Arc<Subtable>> = current
            .iter()
            .filter(|st| subtables.values().any(|s| Arc::ptr_eq(s, st)))
            .cloned()
            .collect();
        for st in subtables.values() {
            if !ordered.iter().any(|o| Arc::ptr_eq(o, st)) {
                ordered.push(st.clone());
            }
        }
        self.mru.store(Arc::new(ordered));
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
