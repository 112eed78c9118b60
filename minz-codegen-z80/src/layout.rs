//! Platform layout checks (spec §4.5, §3.6 `TargetConfig`).
//!
//! The backend lays code out starting at `target.origin` and never
//! computes data addresses itself (sjasmplus assigns those at assemble
//! time from label order), so this can only warn about the one thing it
//! does know up front: whether the chosen origin itself lands inside a
//! reserved range (e.g. the ZX Spectrum's screen memory or system
//! variables).
use minz_ir::TargetConfig;

pub fn check_origin(target: &TargetConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let end = target.origin.saturating_add(1);
    if target.overlaps_reserved(target.origin..end) {
        let msg = format!("origin {:#06x} falls inside a reserved range for this target", target.origin);
        log::warn!("{msg}");
        warnings.push(msg);
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zx_spectrum_origin_is_clear_of_reserved_ranges() {
        assert!(check_origin(&TargetConfig::zx_spectrum_48k()).is_empty());
    }

    #[test]
    fn origin_inside_screen_memory_warns() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut t = TargetConfig::generic();
        t.origin = 0x4500;
        t.reserved_ranges.push(0x4000..0x5B00);
        assert_eq!(check_origin(&t).len(), 1);
    }
}
