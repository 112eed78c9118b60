//! Pass 1: constant folding & copy propagation (spec §4.4 step 1).
//!
//! This is a single forward pass per function, not a full dataflow fixpoint
//! over a control-flow graph — MinZ's `Function` is a flat instruction list
//! with no explicit CFG (spec §3.3), so "standard per-function rewrites" is
//! read here as block-local: known register values are discarded at every
//! `Label`, since a label may be reached from more than one predecessor and
//! this pass does not attempt to merge facts across them. This is
//! conservative (it folds less than a full SSA-based constant propagation
//! would) but never wrong, and it is idempotent, which is the property
//! spec §4.4's closing sentence requires.

use minz_ir::{Function, Opcode, Reg};
use std::collections::HashMap;

/// Resolves `r` to the register it is ultimately copied from, chasing a
/// `Move` chain to its root. Registers absent from `copy_src` are already
/// canonical.
fn resolve(copy_src: &HashMap<Reg, Reg>, mut r: Reg) -> Reg {
    let mut hops = 0;
    while let Some(&next) = copy_src.get(&r) {
        r = next;
        hops += 1;
        if hops > 64 {
            break; // defensive: a cycle should never occur, but never hang on one.
        }
    }
    r
}

fn rewrite_sources(op: &mut Opcode, copy_src: &HashMap<Reg, Reg>) {
    let rs = |r: &mut Reg| *r = resolve(copy_src, *r);
    match op {
        Opcode::Move { src, .. }
        | Opcode::StoreVar { src, .. }
        | Opcode::LoadPtr { src_addr: src, .. }
        | Opcode::Neg { src, .. }
        | Opcode::Inc { src, .. }
        | Opcode::Dec { src, .. }
        | Opcode::Not { src, .. }
        | Opcode::LoadBitField { src, .. }
        | Opcode::Print { src }
        | Opcode::PrintU8 { src }
        | Opcode::PrintU16 { src } => rs(src),
        Opcode::StorePtr { src_addr, src_value, .. } => {
            rs(src_addr);
            rs(src_value);
        }
        Opcode::Add { lhs, rhs, .. }
        | Opcode::Sub { lhs, rhs, .. }
        | Opcode::Mul { lhs, rhs, .. }
        | Opcode::Div { lhs, rhs, .. }
        | Opcode::Mod { lhs, rhs, .. }
        | Opcode::And { lhs, rhs, .. }
        | Opcode::Or { lhs, rhs, .. }
        | Opcode::Xor { lhs, rhs, .. }
        | Opcode::Shl { lhs, rhs, .. }
        | Opcode::Shr { lhs, rhs, .. }
        | Opcode::Eq { lhs, rhs, .. }
        | Opcode::Ne { lhs, rhs, .. }
        | Opcode::Lt { lhs, rhs, .. }
        | Opcode::Le { lhs, rhs, .. }
        | Opcode::Gt { lhs, rhs, .. }
        | Opcode::Ge { lhs, rhs, .. } => {
            rs(lhs);
            rs(rhs);
        }
        Opcode::JumpIf { cond, .. } | Opcode::JumpIfNot { cond, .. } => rs(cond),
        Opcode::Return { src: Some(src) } => rs(src),
        Opcode::Call { args, .. } => {
            for a in args.iter_mut() {
                rs(a);
            }
        }
        Opcode::CallIndirect { fptr, args, .. } => {
            rs(fptr);
            for a in args.iter_mut() {
                rs(a);
            }
        }
        Opcode::StoreBitField { src_value, .. } => rs(src_value),
        _ => {}
    }
}

/// Evaluates a pure binary opcode given two known-constant operands,
/// mirroring `minz_interp::Vm`'s own arithmetic exactly (wrapping 64-bit
/// semantics; division/modulo by a constant zero is left unfolded so the
/// runtime error is still raised where the original instruction runs).
fn fold_binary(op: &Opcode, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match op {
        Opcode::Add { .. } => lhs.wrapping_add(rhs),
        Opcode::Sub { .. } => lhs.wrapping_sub(rhs),
        Opcode::Mul { .. } => lhs.wrapping_mul(rhs),
        Opcode::Div { .. } if rhs != 0 => lhs.wrapping_div(rhs),
        Opcode::Mod { .. } if rhs != 0 => lhs.wrapping_rem(rhs),
        Opcode::And { .. } => lhs & rhs,
        Opcode::Or { .. } => lhs | rhs,
        Opcode::Xor { .. } => lhs ^ rhs,
        Opcode::Shl { .. } => lhs.wrapping_shl(rhs as u32),
        Opcode::Shr { .. } => lhs.wrapping_shr(rhs as u32),
        Opcode::Eq { .. } => (lhs == rhs) as i64,
        Opcode::Ne { .. } => (lhs != rhs) as i64,
        Opcode::Lt { .. } => (lhs < rhs) as i64,
        Opcode::Le { .. } => (lhs <= rhs) as i64,
        Opcode::Gt { .. } => (lhs > rhs) as i64,
        Opcode::Ge { .. } => (lhs >= rhs) as i64,
        _ => return None,
    })
}

fn fold_unary(op: &Opcode, src: i64) -> Option<i64> {
    Some(match op {
        Opcode::Neg { .. } => -src,
        Opcode::Not { .. } => !src,
        Opcode::Inc { .. } => src.wrapping_add(1),
        Opcode::Dec { .. } => src.wrapping_sub(1),
        _ => return None,
    })
}

fn binary_operands(op: &Opcode) -> Option<(Reg, Reg)> {
    match op {
        Opcode::Add { lhs, rhs, .. }
        | Opcode::Sub { lhs, rhs, .. }
        | Opcode::Mul { lhs, rhs, .. }
        | Opcode::Div { lhs, rhs, .. }
        | Opcode::Mod { lhs, rhs, .. }
        | Opcode::And { lhs, rhs, .. }
        | Opcode::Or { lhs, rhs, .. }
        | Opcode::Xor { lhs, rhs, .. }
        | Opcode::Shl { lhs, rhs, .. }
        | Opcode::Shr { lhs, rhs, .. }
        | Opcode::Eq { lhs, rhs, .. }
        | Opcode::Ne { lhs, rhs, .. }
        | Opcode::Lt { lhs, rhs, .. }
        | Opcode::Le { lhs, rhs, .. }
        | Opcode::Gt { lhs, rhs, .. }
        | Opcode::Ge { lhs, rhs, .. } => Some((*lhs, *rhs)),
        _ => None,
    }
}

fn unary_operand(op: &Opcode) -> Option<Reg> {
    match op {
        Opcode::Neg { src, .. } | Opcode::Not { src, .. } | Opcode::Inc { src, .. } | Opcode::Dec { src, .. } => {
            Some(*src)
        }
        _ => None,
    }
}

/// Runs constant folding & copy propagation over one function's body.
/// Returns the number of instructions folded to a constant and the number
/// of copies propagated away.
pub fn run(func: &mut Function) -> (u64, u64) {
    let mut known: HashMap<Reg, i64> = HashMap::new();
    let mut copy_src: HashMap<Reg, Reg> = HashMap::new();
    let mut folded = 0u64;
    let mut propagated = 0u64;

    for inst in func.instructions.iter_mut() {
        if matches!(inst.opcode, Opcode::Label { .. }) {
            known.clear();
            copy_src.clear();
            continue;
        }

        rewrite_sources(&mut inst.opcode, &copy_src);

        if let Opcode::LoadConst { dst, imm } = inst.opcode {
            known.insert(dst, imm);
            copy_src.remove(&dst);
            continue;
        }

        if let Opcode::Move { dst, src } = inst.opcode {
            if let Some(&v) = known.get(&src) {
                log::trace!("{}: folded known move into r{} to {v}", func.name, dst.index());
                inst.opcode = Opcode::LoadConst { dst, imm: v };
                known.insert(dst, v);
                copy_src.remove(&dst);
                folded += 1;
            } else {
                copy_src.insert(dst, src);
                known.remove(&dst);
                propagated += 1;
            }
            continue;
        }

        if let Some((lhs, rhs)) = binary_operands(&inst.opcode) {
            if let (Some(&a), Some(&b)) = (known.get(&lhs), known.get(&rhs)) {
                if let Some(v) = fold_binary(&inst.opcode, a, b) {
                    let dst = inst.opcode.dst().unwrap_or(Reg::UNUSED);
                    log::trace!("{}: folded {:?} to {v}", func.name, inst.opcode);
                    inst.opcode = Opcode::LoadConst { dst, imm: v };
                    known.insert(dst, v);
                    copy_src.remove(&dst);
                    folded += 1;
                    continue;
                }
            }
        } else if let Some(src) = unary_operand(&inst.opcode) {
            if let Some(&a) = known.get(&src) {
                if let Some(v) = fold_unary(&inst.opcode, a) {
                    let dst = inst.opcode.dst().unwrap_or(Reg::UNUSED);
                    log::trace!("{}: folded {:?} to {v}", func.name, inst.opcode);
                    inst.opcode = Opcode::LoadConst { dst, imm: v };
                    known.insert(dst, v);
                    copy_src.remove(&dst);
                    folded += 1;
                    continue;
                }
            }
        }

        if let Some(dst) = inst.opcode.dst() {
            known.remove(&dst);
            copy_src.remove(&dst);
        }
    }

    (folded, propagated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Instruction, Type};

    #[test]
    fn folds_constant_arithmetic() {
        let mut f = Function::new("m_f", Type::UInt(16));
        let a = f.alloc_reg();
        let b = f.alloc_reg();
        let c = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: a, imm: 2 }));
        f.push(Instruction::new(Opcode::LoadConst { dst: b, imm: 3 }));
        f.push(Instruction::new(Opcode::Add { dst: c, lhs: a, rhs: b }));
        f.push(Instruction::new(Opcode::Return { src: Some(c) }));

        let (folded, _) = run(&mut f);
        assert_eq!(folded, 1);
        assert!(matches!(f.instructions[2].opcode, Opcode::LoadConst { imm: 5, .. }));
    }

    #[test]
    fn propagates_copies_through_move() {
        let mut f = Function::new("m_g", Type::UInt(16));
        let a = f.add_param("a", Type::UInt(16));
        let b = f.alloc_reg();
        f.push(Instruction::new(Opcode::Move { dst: b, src: a }));
        f.push(Instruction::new(Opcode::Return { src: Some(b) }));

        run(&mut f);
        assert!(matches!(f.instructions[1].opcode, Opcode::Return { src: Some(r) } if r == a));
    }

    #[test]
    fn does_not_fold_division_by_constant_zero() {
        let mut f = Function::new("m_h", Type::UInt(16));
        let a = f.alloc_reg();
        let z = f.alloc_reg();
        let c = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: a, imm: 10 }));
        f.push(Instruction::new(Opcode::LoadConst { dst: z, imm: 0 }));
        f.push(Instruction::new(Opcode::Div { dst: c, lhs: a, rhs: z }));
        f.push(Instruction::new(Opcode::Return { src: Some(c) }));

        run(&mut f);
        assert!(matches!(f.instructions[2].opcode, Opcode::Div { .. }));
    }

    #[test]
    fn is_idempotent() {
        let mut f = Function::new("m_i", Type::UInt(16));
        let a = f.alloc_reg();
        let b = f.alloc_reg();
        let c = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: a, imm: 2 }));
        f.push(Instruction::new(Opcode::LoadConst { dst: b, imm: 3 }));
        f.push(Instruction::new(Opcode::Add { dst: c, lhs: a, rhs: b }));
        f.push(Instruction::new(Opcode::Return { src: Some(c) }));

        run(&mut f);
        let once = format!("{:?}", f.instructions);
        run(&mut f);
        let twice = format!("{:?}", f.instructions);
        assert_eq!(once, twice);
    }
}
