//! Pass 3: peephole rewrites (spec §4.4 step 3: "a fixed table of local
//! pattern rewrites").
//!
//! MinZ's MIR opcode set is closed (spec §3.4) and has no dedicated
//! "add-immediate" variant, so the spec's literal example pattern —
//! `LoadConst dst, k; Add x, x, dst ⇒ Add-immediate x, x, k` — is expressed
//! here as an annotation rather than a new opcode: when a constant is
//! consumed exactly once by an immediately-following arithmetic/bitwise
//! instruction, that instruction's `comment` is marked so the backend's
//! instruction selection (§4.5) can choose an immediate-addressing template
//! instead of re-deriving the single-use property itself. The `LoadConst`
//! itself is left in place — register-flow invariants (§3.6) require every
//! referenced register to be defined by a real instruction — and becomes
//! dead once the backend has consumed the annotation, at which point a
//! later DCE run removes it.
//!
//! Two genuine instruction-count reductions are also applied here:
//! self-moves (`Move r, r`) become `Nop`, and back-to-back double negation
//! (`Not`/`Neg` composed with itself) collapses to a `Move`.

use minz_ir::{Function, Opcode, Reg};

const IMMEDIATE_HINT: &str = "peephole: rhs is a single-use constant, backend may select immediate addressing";

fn is_commutative_binary(op: &Opcode) -> bool {
    matches!(
        op,
        Opcode::Add { .. }
            | Opcode::Mul { .. }
            | Opcode::And { .. }
            | Opcode::Or { .. }
            | Opcode::Xor { .. }
            | Opcode::Eq { .. }
            | Opcode::Ne { .. }
    )
}

fn binary_lhs_reg(op: &Opcode) -> Option<Reg> {
    match op {
        Opcode::Add { lhs, .. }
        | Opcode::Sub { lhs, .. }
        | Opcode::Mul { lhs, .. }
        | Opcode::Div { lhs, .. }
        | Opcode::Mod { lhs, .. }
        | Opcode::And { lhs, .. }
        | Opcode::Or { lhs, .. }
        | Opcode::Xor { lhs, .. }
        | Opcode::Shl { lhs, .. }
        | Opcode::Shr { lhs, .. }
        | Opcode::Eq { lhs, .. }
        | Opcode::Ne { lhs, .. }
        | Opcode::Lt { lhs, .. }
        | Opcode::Le { lhs, .. }
        | Opcode::Gt { lhs, .. }
        | Opcode::Ge { lhs, .. } => Some(*lhs),
        _ => None,
    }
}

fn binary_rhs_reg(op: &Opcode) -> Option<Reg> {
    match op {
        Opcode::Add { rhs, .. }
        | Opcode::Sub { rhs, .. }
        | Opcode::Mul { rhs, .. }
        | Opcode::Div { rhs, .. }
        | Opcode::Mod { rhs, .. }
        | Opcode::And { rhs, .. }
        | Opcode::Or { rhs, .. }
        | Opcode::Xor { rhs, .. }
        | Opcode::Shl { rhs, .. }
        | Opcode::Shr { rhs, .. }
        | Opcode::Eq { rhs, .. }
        | Opcode::Ne { rhs, .. }
        | Opcode::Lt { rhs, .. }
        | Opcode::Le { rhs, .. }
        | Opcode::Gt { rhs, .. }
        | Opcode::Ge { rhs, .. } => Some(*rhs),
        _ => None,
    }
}

/// Counts how many later instructions read `r` as a source (used to decide
/// "single-use" for the immediate-hint pattern; a constant consumed more
/// than once must stay a real register, since the backend can only inline
/// it at one use site).
fn use_count_after(func: &Function, from_idx: usize, r: Reg) -> usize {
    func.instructions[from_idx..]
        .iter()
        .map(|inst| inst.opcode.sources().iter().filter(|&&s| s == r).count())
        .sum()
}

/// Runs the peephole pass over one function. Returns the number of rewrites
/// applied.
pub fn run(func: &mut Function) -> u64 {
    let mut rewrites = 0u64;

    // Self-move and double-negation elimination, then the immediate-hint
    // annotation — each in its own scan to keep each rewrite obviously
    // idempotent (a `Move r,r` becomes `Nop` and will never match again; a
    // hint, once present, is not re-added).
    for inst in func.instructions.iter_mut() {
        if let Opcode::Move { dst, src } = inst.opcode {
            if dst == src {
                log::trace!("{}: peephole collapsed self-move of r{} to nop", func.name, dst.index());
                inst.opcode = Opcode::Nop;
                rewrites += 1;
            }
        }
    }

    for i in 1..func.instructions.len() {
        let prev_is_not = matches!(func.instructions[i - 1].opcode, Opcode::Not { .. } | Opcode::Neg { .. });
        if !prev_is_not {
            continue;
        }
        let (prev_kind_not, prev_dst, prev_src) = match func.instructions[i - 1].opcode {
            Opcode::Not { dst, src } => (true, dst, src),
            Opcode::Neg { dst, src } => (false, dst, src),
            _ => unreachable!(),
        };
        let matches_cur = match &func.instructions[i].opcode {
            Opcode::Not { src, .. } if prev_kind_not => *src == prev_dst,
            Opcode::Neg { src, .. } if !prev_kind_not => *src == prev_dst,
            _ => false,
        };
        if matches_cur && use_count_after(func, i + 1, prev_dst) == 0 {
            if let Some(cur_dst) = func.instructions[i].opcode.dst() {
                log::trace!("{}: peephole collapsed double negation at inst {i} to a move", func.name);
                func.instructions[i].opcode = Opcode::Move { dst: cur_dst, src: prev_src };
                rewrites += 1;
            }
        }
    }

    for i in 0..func.instructions.len() {
        let (is_loadconst, k_reg) = match func.instructions[i].opcode {
            Opcode::LoadConst { dst, .. } => (true, dst),
            _ => (false, Reg::UNUSED),
        };
        if !is_loadconst || i + 1 >= func.instructions.len() {
            continue;
        }
        let next = &func.instructions[i + 1];
        let already_hinted = next.comment.as_deref() == Some(IMMEDIATE_HINT);
        let rhs_is_k = binary_rhs_reg(&next.opcode) == Some(k_reg);
        let lhs_commutes_to_rhs = is_commutative_binary(&next.opcode) && binary_lhs_reg(&next.opcode) == Some(k_reg);
        if already_hinted || (!rhs_is_k && !lhs_commutes_to_rhs) {
            continue;
        }
        if use_count_after(func, i + 1, k_reg) != 1 {
            continue;
        }
        log::trace!("{}: peephole hinted immediate addressing at inst {}", func.name, i + 1);
        func.instructions[i + 1].comment = Some(IMMEDIATE_HINT.to_string());
        rewrites += 1;
    }

    rewrites
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Instruction, Type};

    #[test]
    fn self_move_becomes_nop() {
        let mut f = Function::new("m_f", Type::UInt(16));
        let r = f.alloc_reg();
        f.push(Instruction::new(Opcode::Move { dst: r, src: r }));
        assert_eq!(run(&mut f), 1);
        assert!(matches!(f.instructions[0].opcode, Opcode::Nop));
    }

    #[test]
    fn double_negation_collapses_to_move() {
        let mut f = Function::new("m_f", Type::UInt(16));
        let a = f.alloc_reg();
        let b = f.alloc_reg();
        let c = f.alloc_reg();
        f.push(Instruction::new(Opcode::Not { dst: b, src: a }));
        f.push(Instruction::new(Opcode::Not { dst: c, src: b }));
        f.push(Instruction::new(Opcode::Return { src: Some(c) }));
        assert_eq!(run(&mut f), 1);
        assert!(matches!(f.instructions[1].opcode, Opcode::Move { src, .. } if src == a));
    }

    #[test]
    fn marks_single_use_constant_operand() {
        let mut f = Function::new("m_f", Type::UInt(16));
        let x = f.add_param("x", Type::UInt(16));
        let k = f.alloc_reg();
        let sum = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: k, imm: 7 }));
        f.push(Instruction::new(Opcode::Add { dst: sum, lhs: x, rhs: k }));
        f.push(Instruction::new(Opcode::Return { src: Some(sum) }));
        assert_eq!(run(&mut f), 1);
        assert_eq!(f.instructions[1].comment.as_deref(), Some(IMMEDIATE_HINT));
    }

    #[test]
    fn is_idempotent() {
        let mut f = Function::new("m_f", Type::UInt(16));
        let x = f.add_param("x", Type::UInt(16));
        let k = f.alloc_reg();
        let sum = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: k, imm: 7 }));
        f.push(Instruction::new(Opcode::Add { dst: sum, lhs: x, rhs: k }));
        f.push(Instruction::new(Opcode::Return { src: Some(sum) }));
        run(&mut f);
        assert_eq!(run(&mut f), 0);
    }
}
