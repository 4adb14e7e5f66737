//! Userspace datapath packet classifier ("dpcls").
//!
//! Maps compressed flow keys to previously installed flow rules using a
//! tuple-space search: a collection of [`Subtable`]s, each holding rules
//! that share one wildcard mask, tried in most-recently-used order until
//! one matches or all are exhausted.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Classifier                              │
//! │                                                                  │
//! │   MRU view (ArcSwap<Vec<Arc<Subtable>>>) ── lock-free reads ──►  │
//! │        │                                                         │
//! │        ├── Subtable (mask A)                                    │
//! │        │     └── flurry::HashMap<hash, Vec<Arc<DpclsRule>>>      │
//! │        ├── Subtable (mask B)                                    │
//! │        │     └── ...                                            │
//! │        └── ...                                                  │
//! │                                                                  │
//! │   writer mutex (parking_lot) ── insert / remove / optimize ──►   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Concurrency model
//!
//! Many forwarding workers call [`Classifier::lookup`] concurrently from
//! their own threads; a single control thread calls
//! [`Classifier::insert`], [`Classifier::remove`], and
//! [`Classifier::optimize`]. Lookup never blocks and never allocates more
//! than one scratch buffer per batch; writers serialize through a mutex
//! whose contention is bounded by there being exactly one writer.
//!
//! # Module map
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`miniflow`] | Sparse fixed-schema flow record |
//! | [`key`] | Flow key (hash + miniflow), equality-under-mask |
//! | [`mask`] | Mask-expansion cache (`mf_masks`) |
//! | [`rule`] | Installed rule type |
//! | [`subtable`] | Per-mask rule index, lookup dispatch |
//! | [`lookup`] | Specialization selection, capability token |
//! | [`classifier`] | The classifier itself: insert/remove/lookup/optimize |
//! | [`config`] | Caller-supplied classifier configuration |
//! | [`error`] | Error taxonomy |

#![warn(missing_docs)]

pub mod classifier;
pub mod config;
pub mod error;
mod hash;
pub mod key;
pub mod lookup;
pub mod mask;
pub mod miniflow;
pub mod rule;
pub mod subtable;

pub use classifier::Classifier;
pub use config::ClassifierConfig;
pub use error::{ClassifierError, ClassifierResult};
pub use key::FlowKey;
pub use lookup::{Capabilities, LookupVariant};
pub use mask::MaskExpansion;
pub use miniflow::{FlowMap, Miniflow, MAX_BLOCKS};
pub use rule::DpclsRule;
pub use subtable::Subtable;

/// Maximum packets per lookup batch (the `keys_map` bitmap is a single
/// `u64`).
pub const MAX_BATCH: usize = 64;
