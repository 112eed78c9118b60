//! Pass 2: dead instruction elimination via conservative liveness (spec
//! §4.4 step 2: "registers are function-local").
//!
//! A backward scan over the flat instruction list: a pure instruction whose
//! destination register is never subsequently read is dropped; everything
//! else (impure instructions, and any instruction with no destination —
//! labels, jumps, stores, calls, I/O) is always kept, since the IR gives no
//! cheaper way to prove a label or a store is unreachable.

use minz_ir::{Function, Reg};
use std::collections::HashSet;

/// Removes dead instructions from `func`. Returns the number removed.
pub fn run(func: &mut Function) -> u64 {
    let mut live: HashSet<Reg> = HashSet::new();
    let mut keep = vec![true; func.instructions.len()];

    for (idx, inst) in func.instructions.iter().enumerate().rev() {
        let dst = inst.opcode.dst();
        let removable = matches!(dst, Some(d) if inst.opcode.is_pure() && !live.contains(&d));
        if removable {
            log::trace!("{}: dce dropped dead {:?} at inst {idx}", func.name, inst.opcode);
            keep[idx] = false;
            continue;
        }
        if let Some(d) = dst {
            live.remove(&d);
        }
        for src in inst.opcode.sources() {
            live.insert(src);
        }
    }

    let removed = keep.iter().filter(|k| !**k).count() as u64;
    let mut i = 0;
    func.instructions.retain(|_| {
        let k = keep[i];
        i += 1;
        k
    });
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Instruction, Opcode, Type};

    #[test]
    fn removes_unused_pure_computation() {
        let mut f = Function::new("m_f", Type::UInt(16));
        let a = f.alloc_reg();
        let dead = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: a, imm: 1 }));
        f.push(Instruction::new(Opcode::LoadConst { dst: dead, imm: 99 }));
        f.push(Instruction::new(Opcode::Return { src: Some(a) }));

        let removed = run(&mut f);
        assert_eq!(removed, 1);
        assert_eq!(f.instructions.len(), 2);
    }

    #[test]
    fn keeps_impure_instructions_even_if_dst_unused() {
        let mut f = Function::new("m_g", Type::Void);
        let r = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: r, imm: 5 }));
        f.push(Instruction::new(Opcode::Call {
            dst: Reg::UNUSED,
            sym: minz_ir::Symbol::Function("m_h".into()),
            args: smallvec::smallvec![r],
        }));
        f.push(Instruction::new(Opcode::Return { src: None }));

        let removed = run(&mut f);
        assert_eq!(removed, 0);
    }

    #[test]
    fn is_idempotent() {
        let mut f = Function::new("m_f", Type::UInt(16));
        let a = f.alloc_reg();
        let dead = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: a, imm: 1 }));
        f.push(Instruction::new(Opcode::LoadConst { dst: dead, imm: 99 }));
        f.push(Instruction::new(Opcode::Return { src: Some(a) }));

        run(&mut f);
        assert_eq!(run(&mut f), 0);
    }
}
