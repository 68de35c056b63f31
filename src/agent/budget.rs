//! Per-run accounting for delegation edges.

use std::collections::HashMap;

/// Counts tool invocations within a single run so capped edges can be
/// refused once their limit is reached. The refusal happens before the
/// handler executes; a refused call never reaches the child agent.
#[derive(Debug, Default)]
pub struct DelegationLedger {
    counts: HashMap<String, u32>,
}

impl DelegationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or refuse one call against `name`. Admitted calls are counted;
    /// refused calls leave the count untouched. Tools without a limit are
    /// always admitted.
    pub fn try_charge(&mut self, name: &str, limit: Option<u32>) -> bool {
        let used = self.counts.get(name).copied().unwrap_or(0);
        if let Some(limit) = limit {
            if used >= limit {
                return false;
            }
        }
        self.counts.insert(name.to_string(), used + 1);
        true
    }

    pub fn used(&self, name: &str) -> u32 {
        self.counts.get(name).copied().unwrap_or(0)
    }
}
