//! Explicit VM configuration (SPEC_FULL.md §2.3), replacing process-global
//! tunables.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Addressable byte memory size (spec §4.3: "configurable size").
    pub memory_size: u32,
    /// Max instructions executed by a single `Run()` or `ExecuteCtie` call
    /// (spec §4.3: "an execution budget... aborts runaway compile-time
    /// computation"; spec §8 "CTIE interpreter fuel": default 1e5 for CTIE).
    pub instruction_budget: u64,
}

impl VmConfig {
    /// Budget sized for a full program `Run()`: generous, since this drives
    /// the standalone MIR runner rather than compile-time folding.
    pub fn for_run() -> Self {
        VmConfig { memory_size: 65536, instruction_budget: 10_000_000 }
    }

    /// Budget sized for `ExecuteCtie` per spec §8's stated default.
    pub fn for_ctie() -> Self {
        VmConfig { memory_size: 65536, instruction_budget: 100_000 }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig::for_run()
    }
}
