//! MIR-to-MIR optimizer (spec component D, §4.4): five passes run in a
//! fixed order over every function in a module, each idempotent when
//! re-run on its own output.

pub mod config;
pub mod const_fold;
pub mod ctie;
pub mod dce;
pub mod error;
pub mod peephole;
pub mod smc;
pub mod stats;

pub use config::OptConfig;
pub use error::{OptError, OptResult};
pub use stats::OptStats;

use minz_ir::{verify_module, Module};

/// Runs the fixed pass pipeline of spec §4.4 over `module` in place:
/// constant folding & copy propagation, dead instruction elimination,
/// peephole, CTIE, then the SMC transformation. Verifies the module's
/// structural invariants (§3.6) after the pipeline completes.
pub fn optimize(module: &mut Module, config: &OptConfig) -> OptResult<OptStats> {
    let mut stats = OptStats::default();

    if config.const_fold {
        for (_, f) in module.functions_mut() {
            let (folded, propagated) = const_fold::run(f);
            log::debug!("{}: const_fold folded {folded}, propagated {propagated}", f.name);
            stats.const_folded += folded;
            stats.copies_propagated += propagated;
        }
    }

    if config.dead_code_elim {
        for (_, f) in module.functions_mut() {
            let removed = dce::run(f);
            log::debug!("{}: dce removed {removed} dead instructions", f.name);
            stats.dead_instructions_removed += removed;
        }
    }

    if config.peephole {
        for (_, f) in module.functions_mut() {
            let rewrites = peephole::run(f);
            log::debug!("{}: peephole rewrote {rewrites} instructions", f.name);
            stats.peephole_rewrites += rewrites;
        }
    }

    // The CTIE pass must see the module after constant folding but before
    // SMC transformation (spec §5's ordering note), hence its position here.
    if config.ctie {
        let folded = ctie::run(module, config.ctie_fuel);
        log::debug!("ctie folded {folded} calls module-wide");
        stats.ctie_folded_calls += folded;

        // A successful fold turns a `Call` into a `LoadConst`; re-running
        // DCE/peephole lets those follow-on simplifications happen in the
        // same optimize() call rather than requiring a second driver pass.
        if config.dead_code_elim {
            for (_, f) in module.functions_mut() {
                stats.dead_instructions_removed += dce::run(f);
            }
        }
    }

    if config.smc {
        let anchors = smc::run(module);
        log::debug!("smc reserved {anchors} anchor slots module-wide");
        stats.smc_anchors_reserved += anchors;
    }

    verify_module(module, "minz-opt")?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Function, Instruction, Opcode, Symbol, Type};

    fn try_init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn full_pipeline_folds_a_pure_call_and_is_idempotent() {
        try_init_logger();
        let mut m = Module::new("prog");

        let mut double = Function::new("prog_double$u16", Type::UInt(16));
        let n = double.add_param("n", Type::UInt(16));
        let two = double.alloc_reg();
        let r = double.alloc_reg();
        double.push(Instruction::new(Opcode::LoadConst { dst: two, imm: 2 }));
        double.push(Instruction::new(Opcode::Mul { dst: r, lhs: n, rhs: two }));
        double.push(Instruction::new(Opcode::Return { src: Some(r) }));
        m.declare_function(double);

        let mut main = Function::new("main", Type::UInt(16));
        let a = main.alloc_reg();
        let b = main.alloc_reg();
        let arg = main.alloc_reg();
        let result = main.alloc_reg();
        let dead = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadConst { dst: a, imm: 20 }));
        main.push(Instruction::new(Opcode::LoadConst { dst: b, imm: 1 }));
        main.push(Instruction::new(Opcode::Add { dst: arg, lhs: a, rhs: b }));
        main.push(Instruction::new(Opcode::LoadConst { dst: dead, imm: 999 }));
        main.push(Instruction::new(Opcode::Call {
            dst: result,
            sym: Symbol::Function("prog_double$u16".into()),
            args: smallvec::smallvec![arg],
        }));
        main.push(Instruction::new(Opcode::Return { src: Some(result) }));
        m.declare_function(main);

        let config = OptConfig::default();
        let stats = optimize(&mut m, &config).expect("optimize should succeed");
        assert_eq!(stats.const_folded, 1); // arg = 20 + 1
        assert_eq!(stats.ctie_folded_calls, 1); // double(21) = 42
        assert!(stats.dead_instructions_removed >= 1); // the dead LoadConst

        let main_id = m.function_by_name("main").unwrap();
        let main = m.function(main_id);
        let has_const_42 = main.instructions.iter().any(|i| matches!(i.opcode, Opcode::LoadConst { imm: 42, .. }));
        assert!(has_const_42);
        assert!(!main.instructions.iter().any(|i| matches!(i.opcode, Opcode::Call { .. })));

        let stats2 = optimize(&mut m, &config).expect("second pass should succeed");
        assert_eq!(stats2.const_folded, 0);
        assert_eq!(stats2.ctie_folded_calls, 0);
        assert_eq!(stats2.dead_instructions_removed, 0);
        assert_eq!(stats2.peephole_rewrites, 0);
    }

    #[test]
    fn smc_anchors_are_reserved_for_eligible_functions() {
        let mut m = Module::new("prog");
        let mut f = Function::new("prog_add$u16$u16", Type::UInt(16));
        let a = f.add_param("a", Type::UInt(16));
        let b = f.add_param("b", Type::UInt(16));
        let r = f.alloc_reg();
        f.push(Instruction::new(Opcode::Add { dst: r, lhs: a, rhs: b }));
        f.push(Instruction::new(Opcode::Return { src: Some(r) }));
        f.attrs.smc_enabled = true;
        m.declare_function(f);

        let stats = optimize(&mut m, &OptConfig::default()).unwrap();
        assert_eq!(stats.smc_anchors_reserved, 2);
    }
}
