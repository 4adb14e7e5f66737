//! A rule installed in the classifier.
//!
//! A rule owns its match pattern (a [`FlowKey`]) and a back-pointer to the
//! mask key of the subtable that holds it. Rules are
//! immutable after publication; an update is modeled as remove-then-insert.

use std::sync::Arc;

use crate::key::FlowKey;

/// A single installed flow rule.
#[derive(Debug)]
pub struct DpclsRule {
    /// Back-pointer to the owning subtable's mask. Shared, not duplicated
    /// per rule: avoids copying the mask bytes into every rule.
    mask: Arc<FlowKey>,
    /// This rule's match pattern.
    flow: FlowKey,
}

impl DpclsRule {
    pub(crate) fn new(mask: Arc<FlowKey>, flow: FlowKey) -> Self {
        Self { mask, flow }
    }

    /// The subtable mask this rule belongs to.
    #[inline(always)]
    pub fn mask(&self) -> &Arc<FlowKey> {
        &self.mask
    }

    /// This rule's match pattern.
    #[inline(always)]
    pub fn flow(&self) -> &FlowKey {
        &self.flow
    }
}
