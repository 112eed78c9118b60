//! Calling convention selection (spec §4.5).

use minz_ir::{CallConvHint, Function, TargetConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    Traditional,
    TrueSmc,
    Interrupt,
}

/// Picks a calling convention for `f`, honoring an explicit `@callconv`
/// hint if the function carries one (spec §3.3: "an optional calling
/// convention descriptor"), and otherwise defaulting to TRUE SMC when the
/// optimizer marked the function SMC-eligible and the target supports it,
/// traditional stack/register passing otherwise.
pub fn choose(f: &Function, target: &TargetConfig) -> CallConv {
    if let Some(hint) = f.call_conv {
        return match hint {
            CallConvHint::Traditional => CallConv::Traditional,
            CallConvHint::TrueSmc => CallConv::TrueSmc,
            CallConvHint::Interrupt => CallConv::Interrupt,
        };
    }
    if f.attrs.interrupt {
        return CallConv::Interrupt;
    }
    if f.attrs.smc_enabled && target.smc_supported && !f.smc_params.is_empty() {
        return CallConv::TrueSmc;
    }
    CallConv::Traditional
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{SmcParam, Type};

    #[test]
    fn defaults_to_traditional_without_smc() {
        let f = Function::new("m_f", Type::Void);
        assert_eq!(choose(&f, &TargetConfig::generic()), CallConv::Traditional);
    }

    #[test]
    fn smc_enabled_with_anchors_selects_true_smc() {
        let mut f = Function::new("m_f$u8", Type::Void);
        let a = f.add_param("a", Type::UInt(8));
        f.attrs.smc_enabled = true;
        f.smc_params = vec![SmcParam { name: "a".into(), reg: a, anchor_inst: None }];
        assert_eq!(choose(&f, &TargetConfig::generic()), CallConv::TrueSmc);
    }

    #[test]
    fn explicit_hint_overrides_defaults() {
        let mut f = Function::new("m_f", Type::Void);
        f.call_conv = Some(CallConvHint::Interrupt);
        assert_eq!(choose(&f, &TargetConfig::generic()), CallConv::Interrupt);
    }
}
