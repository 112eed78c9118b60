//! Explicit optimizer configuration (SPEC_FULL.md §2.3), replacing any
//! process-global "which passes are enabled" switch.

/// Which passes run and with what tunables. All passes are on by default
/// (spec §4.4 lists a fixed pass order with no opt-out described, but a
/// config struct is still worth having: it is how a test isolates one pass
/// from the rest, and how a future `-O0` driver flag would plug in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptConfig {
    pub const_fold: bool,
    pub dead_code_elim: bool,
    pub peephole: bool,
    pub ctie: bool,
    pub smc: bool,
    /// CTIE's own execution budget, independent of `minz_interp::VmConfig`'s
    /// default (spec §8 "CTIE interpreter fuel": default `100_000`).
    pub ctie_fuel: u64,
}

impl OptConfig {
    pub fn all_passes() -> Self {
        OptConfig {
            const_fold: true,
            dead_code_elim: true,
            peephole: true,
            ctie: true,
            smc: true,
            ctie_fuel: 100_000,
        }
    }
}

impl Default for OptConfig {
    fn default() -> Self {
        OptConfig::all_passes()
    }
}
