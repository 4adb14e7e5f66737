//! Caller-supplied, in-process configuration.
//!
//! The classifier persists nothing (non-goal); what little
//! configuration it does take mirrors the teacher crate's `EngineConfig`
//! pattern (`sase-dataplane::core::EngineConfig`).

use crate::lookup::Capabilities;

/// Configuration for a new [`crate::classifier::Classifier`].
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Which specialized lookup variants this build may select. Defaults
    /// to every variant compiled in ([`Capabilities::ALL`]).
    pub capabilities: Capabilities,
    /// Capacity hint for the subtable-set map, to avoid reallocation churn
    /// while a ruleset is first being populated.
    pub initial_subtable_capacity: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            initial_subtable_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_enables_all_capabilities() {
        let cfg = ClassifierConfig::default();
        assert_eq!(cfg.capabilities, Capabilities::ALL);
        assert_eq!(cfg.initial_subtable_capacity, 16);
    }
}
