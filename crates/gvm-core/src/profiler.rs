//! Execution counters
//!
//! Opcode counts are lock-free atomics bumped on every dispatch; method
//! invocation counts go through a mutex-guarded map since they are keyed by
//! name.

use crate::class::Method;
use gvm_classfile::opcode;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters for one runtime
pub struct Profiler {
    opcodes: [AtomicU64; 256],
    methods: Mutex<FxHashMap<String, u64>>,
}

impl Profiler {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            opcodes: std::array::from_fn(|_| AtomicU64::new(0)),
            methods: Mutex::new(FxHashMap::default()),
        }
    }

    /// Count one executed instruction
    #[inline]
    pub fn record_opcode(&self, op: u8) {
        self.opcodes[op as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Count one method invocation
    pub fn record_call(&self, method: &Method) {
        *self.methods.lock().entry(method.qualified_name()).or_insert(0) += 1;
    }

    /// Snapshot of the counters
    pub fn snapshot(&self) -> Profile {
        let mut opcodes = BTreeMap::new();
        let mut instructions = 0;
        for (byte, counter) in self.opcodes.iter().enumerate() {
            let count = counter.load(Ordering::Relaxed);
            if count > 0 {
                instructions += count;
                opcodes.insert(opcode::name(byte as u8).to_string(), count);
            }
        }
        let methods = self
            .methods
            .lock()
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        Profile {
            instructions,
            opcodes,
            methods,
        }
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profiler").finish_non_exhaustive()
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    /// Total executed instructions
    pub instructions: u64,
    /// Executed instructions per mnemonic
    pub opcodes: BTreeMap<String, u64>,
    /// Invocations per `class.name(descriptor)`
    pub methods: BTreeMap<String, u64>,
}

impl Profile {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvm_classfile::Opcode;

    #[test]
    fn test_counts_and_json() {
        let profiler = Profiler::new();
        profiler.record_opcode(Opcode::Iadd as u8);
        profiler.record_opcode(Opcode::Iadd as u8);
        profiler.record_opcode(Opcode::Return as u8);

        let profile = profiler.snapshot();
        assert_eq!(profile.instructions, 3);
        assert_eq!(profile.opcodes["iadd"], 2);

        let json: serde_json::Value = serde_json::from_str(&profile.to_json().unwrap()).unwrap();
        assert_eq!(json["opcodes"]["return"], 1);
        assert_eq!(json["instructions"], 3);
    }
}
