//! Overload resolution (spec §4.1: "two declarations with the same base
//! name but different parameter-type lists are both kept; a call site
//! resolves by matching argument types against each candidate").

use crate::types::can_widen;
use minz_ir::Type;

#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub mangled_name: &'a str,
    pub param_types: &'a [Type],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one candidate matches (possibly via widening).
    Unique(usize),
    /// No candidate's parameter list matches the call's argument types.
    NoMatch,
    /// More than one candidate matches; ambiguous per spec §4.1.
    Ambiguous(Vec<usize>),
}

/// Resolve a call's argument types against a set of same-named candidates.
/// A candidate matches if every argument type equals, or implicitly widens
/// to, the corresponding parameter type (spec §4.1's widening rule; see
/// `types::can_widen`). Exact-arity matches are required: MinZ has no
/// variadics or default arguments.
pub fn resolve<'a>(candidates: &[Candidate<'a>], arg_types: &[Type]) -> Resolution {
    let matches: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.param_types.len() == arg_types.len()
                && c.param_types
                    .iter()
                    .zip(arg_types.iter())
                    .all(|(p, a)| a == p || can_widen(a, p))
        })
        .map(|(i, _)| i)
        .collect();

    match matches.len() {
        0 => Resolution::NoMatch,
        1 => Resolution::Unique(matches[0]),
        _ => {
            // An exact (non-widened) match always wins over widened ones,
            // mirroring the overload-resolution intuition that the most
            // specific candidate is preferred.
            let exact: Vec<usize> = matches
                .iter()
                .copied()
                .filter(|&i| candidates[i].param_types == arg_types)
                .collect();
            match exact.len() {
                1 => Resolution::Unique(exact[0]),
                0 => Resolution::Ambiguous(matches),
                _ => Resolution::Ambiguous(exact),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_exact_match_wins() {
        let a = [Type::UInt(8)];
        let b = [Type::UInt(16)];
        let candidates = [
            Candidate { mangled_name: "f$u8", param_types: &a },
            Candidate { mangled_name: "f$u16", param_types: &b },
        ];
        let args = [Type::UInt(16)];
        assert_eq!(resolve(&candidates, &args), Resolution::Unique(1));
    }

    #[test]
    fn exact_beats_widened_candidate() {
        let a = [Type::UInt(8)];
        let b = [Type::UInt(16)];
        let candidates = [
            Candidate { mangled_name: "f$u8", param_types: &a },
            Candidate { mangled_name: "f$u16", param_types: &b },
        ];
        // a u8 argument widens to match f$u16, and matches f$u8 exactly.
        let args = [Type::UInt(8)];
        assert_eq!(resolve(&candidates, &args), Resolution::Unique(0));
    }

    #[test]
    fn no_candidate_matches_arity() {
        let a = [Type::UInt(8), Type::UInt(8)];
        let candidates = [Candidate { mangled_name: "f$u8$u8", param_types: &a }];
        let args = [Type::UInt(8)];
        assert_eq!(resolve(&candidates, &args), Resolution::NoMatch);
    }
}
