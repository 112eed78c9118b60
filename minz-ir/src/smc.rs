//! Self-modifying-code metadata (spec §3.5).
//!
//! The optimizer's SMC pass (spec §4.4 step 5) decides *which* parameter
//! registers become immediate-patched values; the concrete anchor label and
//! patch-site address are a backend concern (Design Notes §9: "the anchor
//! label and patch-site address are determined by the backend, not the
//! optimizer"). This module defines the shared vocabulary both sides use.

use crate::entities::{InstId, Reg};
use std::fmt;

/// Records that a given parameter register is patched-in-place at a
/// specific instruction, once the optimizer's SMC pass has picked the
/// anchor site (spec §4.4 step 5: "the first use of each parameter").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmcParam {
    pub name: String,
    pub reg: Reg,
    /// The instruction where this parameter's value is consumed as an
    /// immediate operand. `None` if the parameter is never used in the
    /// function body (an anchor is still reserved for it, see
    /// SPEC_FULL.md §3).
    pub anchor_inst: Option<InstId>,
}

/// The anchor label for a patched parameter: `<func>_param_<name>` (spec
/// §3.5). The backend is the only component that turns this into a concrete
/// byte offset; this type exists so both `minz-opt` and `minz-codegen-z80`
/// agree on the label's spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnchorLabel {
    pub function: String,
    pub param: String,
}

impl fmt::Display for AnchorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_param_{}", self.function, self.param)
    }
}

impl AnchorLabel {
    pub fn new(function: impl Into<String>, param: impl Into<String>) -> Self {
        AnchorLabel { function: function.into(), param: param.into() }
    }

    /// The companion `_op` label marking the opcode byte itself (spec
    /// §4.5: "SMC anchor emission").
    pub fn op_label(&self) -> String {
        format!("{self}_op")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_label_spelling_matches_spec() {
        let a = AnchorLabel::new("add2", "a");
        assert_eq!(a.to_string(), "add2_param_a");
        assert_eq!(a.op_label(), "add2_param_a_op");
    }
}
