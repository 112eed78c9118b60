//! Pass 4: compile-time interface execution (spec §4.4 step 4, §4.6).
//!
//! For each `Call` whose arguments are all known compile-time constants and
//! whose callee is a function in the same module, this pass attempts
//! `minz_interp::Vm::execute_ctie`. The VM itself enforces the purity
//! contract dynamically (no `StoreVar` to a global, no `Asm`, no external or
//! indirect `Call`, no I/O opcode — see `minz-interp`'s interpreter) by
//! returning `Unresolvable` the moment it would need one of those; this
//! pass does not duplicate that check statically, it just trusts the VM's
//! refusal and leaves the call unfolded on `Err`.
//!
//! The planning scan and the mutation are split into two phases because
//! `Vm<'m>` borrows the `Module` for its whole lifetime: the scan runs with
//! the module borrowed immutably (compatible with the VM's own immutable
//! borrow), producing a plan of `(FuncId, instruction index, folded value)`
//! triples; the module is only mutated after the `Vm` — and the scan's
//! borrow of it — has gone out of scope.

use minz_interp::{Unresolvable, Vm, VmConfig};
use minz_ir::{FuncId, Module, Opcode, Reg, Symbol};
use std::collections::HashMap;

struct Fold {
    func: FuncId,
    inst_index: usize,
    dst: Reg,
    value: i64,
}

/// Runs CTIE over every function in `module`. `fuel` sets the per-call
/// instruction budget (spec §8's CTIE fuel, `OptConfig::ctie_fuel`).
/// Returns the number of calls folded.
pub fn run(module: &mut Module, fuel: u64) -> u64 {
    let config = VmConfig { memory_size: 65536, instruction_budget: fuel };
    let plan = {
        let vm = match Vm::new(module, config) {
            Ok(vm) => vm,
            Err(_) => return 0, // module doesn't even lay out; nothing CTIE can do here.
        };
        plan_folds(module, vm)
    };

    let folded = plan.len() as u64;
    for fold in plan {
        let f = module.function_mut(fold.func);
        log::trace!("{}: ctie folded call at inst {} to {}", f.name, fold.inst_index, fold.value);
        f.instructions[fold.inst_index].opcode = Opcode::LoadConst { dst: fold.dst, imm: fold.value };
    }
    folded
}

fn plan_folds(module: &Module, mut vm: Vm<'_>) -> Vec<Fold> {
    let mut plan = Vec::new();

    for (fid, f) in module.functions() {
        let mut known: HashMap<Reg, i64> = HashMap::new();

        for (idx, inst) in f.instructions.iter().enumerate() {
            if matches!(inst.opcode, Opcode::Label { .. }) {
                known.clear();
                continue;
            }

            if let Opcode::LoadConst { dst, imm } = inst.opcode {
                known.insert(dst, imm);
                continue;
            }

            if let Opcode::Call { dst, sym: Symbol::Function(name), args } = &inst.opcode {
                if !dst.is_unused() {
                    if let Some(callee) = module.function_by_name(name) {
                        let arg_values: Option<Vec<i64>> =
                            args.iter().map(|r| known.get(r).copied()).collect();
                        if let Some(arg_values) = arg_values {
                            match vm.execute_ctie(callee, &arg_values) {
                                Ok(value) => {
                                    plan.push(Fold { func: fid, inst_index: idx, dst: *dst, value });
                                    known.insert(*dst, value);
                                    continue;
                                }
                                Err(Unresolvable::Budget) => {
                                    // Fuel exhausted for this call specifically; other
                                    // call sites in the module are unaffected.
                                }
                                Err(_) => {}
                            }
                        }
                    }
                }
            }

            if let Some(d) = inst.opcode.dst() {
                known.remove(&d);
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Function, Instruction, Type};

    fn pure_double() -> Function {
        let mut f = Function::new("m_double$u16", Type::UInt(16));
        let n = f.add_param("n", Type::UInt(16));
        let two = f.alloc_reg();
        let r = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: two, imm: 2 }));
        f.push(Instruction::new(Opcode::Mul { dst: r, lhs: n, rhs: two }));
        f.push(Instruction::new(Opcode::Return { src: Some(r) }));
        f
    }

    #[test]
    fn folds_a_pure_call_with_constant_args() {
        let mut m = Module::new("m");
        m.declare_function(pure_double());

        let mut main = Function::new("main", Type::UInt(16));
        let arg = main.alloc_reg();
        let result = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadConst { dst: arg, imm: 21 }));
        main.push(Instruction::new(Opcode::Call {
            dst: result,
            sym: Symbol::Function("m_double$u16".into()),
            args: smallvec::smallvec![arg],
        }));
        main.push(Instruction::new(Opcode::Return { src: Some(result) }));
        m.declare_function(main);

        let folded = run(&mut m, 100_000);
        assert_eq!(folded, 1);

        let main_id = m.function_by_name("main").unwrap();
        let main = m.function(main_id);
        assert!(matches!(main.instructions[1].opcode, Opcode::LoadConst { imm: 42, .. }));
    }

    #[test]
    fn leaves_impure_call_unfolded() {
        let mut m = Module::new("m");
        let mut f = Function::new("m_p$u16", Type::UInt(16));
        let n = f.add_param("n", Type::UInt(16));
        f.push(Instruction::new(Opcode::PrintU16 { src: n }));
        f.push(Instruction::new(Opcode::Return { src: Some(n) }));
        m.declare_function(f);

        let mut main = Function::new("main", Type::UInt(16));
        let arg = main.alloc_reg();
        let result = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadConst { dst: arg, imm: 5 }));
        main.push(Instruction::new(Opcode::Call {
            dst: result,
            sym: Symbol::Function("m_p$u16".into()),
            args: smallvec::smallvec![arg],
        }));
        main.push(Instruction::new(Opcode::Return { src: Some(result) }));
        m.declare_function(main);

        assert_eq!(run(&mut m, 100_000), 0);
    }

    #[test]
    fn is_idempotent() {
        let mut m = Module::new("m");
        m.declare_function(pure_double());
        let mut main = Function::new("main", Type::UInt(16));
        let arg = main.alloc_reg();
        let result = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadConst { dst: arg, imm: 21 }));
        main.push(Instruction::new(Opcode::Call {
            dst: result,
            sym: Symbol::Function("m_double$u16".into()),
            args: smallvec::smallvec![arg],
        }));
        main.push(Instruction::new(Opcode::Return { src: Some(result) }));
        m.declare_function(main);

        run(&mut m, 100_000);
        assert_eq!(run(&mut m, 100_000), 0);
    }
}
