//! Checks the structural invariants of spec §3.6 against a built `Module`.
//!
//! Every MIR-producing or MIR-transforming pass is expected to leave the
//! module in a state that passes `verify_module`; passes that call this in
//! their own tests are demonstrating the "idempotent, sound transformation"
//! requirement of spec §4.4's closing sentence.

use crate::entities::{AnyEntity, Reg};
use crate::error::{IrError, IrResult};
use crate::instruction::{Opcode, Symbol};
use crate::module::Module;
use std::collections::HashSet;

pub fn verify_module(module: &Module, pass: &'static str) -> IrResult<()> {
    log::debug!("{pass}: verifying {} functions", module.functions().count());
    for (func_id, func) in module.functions() {
        let mut defined: HashSet<Reg> = func.params.iter().map(|p| p.reg).collect();
        let mut labels: HashSet<_> = HashSet::new();
        let mut referenced_labels = HashSet::new();

        for inst in &func.instructions {
            if let Opcode::Label { label } = inst.opcode {
                if !labels.insert(label) {
                    return Err(IrError::new(
                        pass,
                        AnyEntity::Label(func_id, label),
                        format!("label {label} defined more than once in {}", func.name),
                    ));
                }
            }
        }

        for inst in &func.instructions {
            for src in inst.opcode.sources() {
                if src.is_unused() {
                    continue;
                }
                if !defined.contains(&src) {
                    return Err(IrError::new(
                        pass,
                        AnyEntity::Reg(func_id, src),
                        format!(
                            "register {src} used before definition in function {}",
                            func.name
                        ),
                    ));
                }
            }
            if let Some(dst) = inst.opcode.dst() {
                defined.insert(dst);
            }

            match &inst.opcode {
                Opcode::Jump { target } | Opcode::JumpIf { target, .. } | Opcode::JumpIfNot { target, .. } => {
                    referenced_labels.insert(*target);
                }
                Opcode::LoadVar { sym, .. }
                | Opcode::StoreVar { sym, .. }
                | Opcode::LoadAddr { sym, .. }
                | Opcode::Call { sym, .. }
                | Opcode::PrintStringDirect { sym } => {
                    verify_symbol(module, func_id, sym, pass)?;
                }
                _ => {}
            }
        }

        for target in &referenced_labels {
            if !labels.contains(target) {
                return Err(IrError::new(
                    pass,
                    AnyEntity::Label(func_id, *target),
                    format!("branch to undefined label {target} in function {}", func.name),
                ));
            }
        }

        if func.attrs.smc_enabled && func.attrs.recursive {
            return Err(IrError::new(
                pass,
                AnyEntity::Function(func_id),
                format!("function {} is both smc_enabled and recursive", func.name),
            ));
        }
    }

    for (func_id, func) in module.functions() {
        if func.attrs.interrupt {
            for (_, other) in module.functions() {
                for inst in &other.instructions {
                    if let Opcode::Call { sym: Symbol::Function(name), .. } = &inst.opcode {
                        if *name == func.name {
                            return Err(IrError::new(
                                pass,
                                AnyEntity::Function(func_id),
                                format!(
                                    "interrupt function {} referenced by a Call instruction",
                                    func.name
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn verify_symbol(
    module: &Module,
    func_id: crate::entities::FuncId,
    sym: &Symbol,
    pass: &'static str,
) -> IrResult<()> {
    match sym {
        Symbol::Global(g) => {
            if (g.index()) >= module.globals().count() {
                return Err(IrError::new(
                    pass,
                    AnyEntity::Function(func_id),
                    format!("reference to unknown global {g}"),
                ));
            }
            Ok(())
        }
        Symbol::String(s) => {
            if s.index() >= module.strings().count() {
                return Err(IrError::new(
                    pass,
                    AnyEntity::Function(func_id),
                    format!("reference to unknown string {s}"),
                ));
            }
            Ok(())
        }
        Symbol::Function(name) => {
            if module.function_by_name(name).is_none() {
                return Err(IrError::new(
                    pass,
                    AnyEntity::Function(func_id),
                    format!("reference to unknown function {name}"),
                ));
            }
            Ok(())
        }
        Symbol::Label(_) => Ok(()),
    }
}

use cranelift_entity::EntityRef;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Reg;
    use crate::function::Function;
    use crate::instruction::Instruction;
    use crate::types::Type;

    fn try_init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn catches_use_before_def() {
        try_init_logger();
        let mut m = Module::new("p");
        let mut f = Function::new("m_main", Type::Void);
        f.push(Instruction::new(Opcode::Return { src: Some(Reg::new(9)) }));
        m.declare_function(f);
        assert!(verify_module(&m, "test").is_err());
    }

    #[test]
    fn accepts_well_formed_function() {
        let mut m = Module::new("p");
        let mut f = Function::new("m_main", Type::UInt(16));
        let r1 = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: r1, imm: 42 }));
        f.push(Instruction::new(Opcode::Return { src: Some(r1) }));
        m.declare_function(f);
        assert!(verify_module(&m, "test").is_ok());
    }

    #[test]
    fn catches_duplicate_labels() {
        let mut m = Module::new("p");
        let mut f = Function::new("m_main", Type::Void);
        let l = f.alloc_label();
        f.push(Instruction::new(Opcode::Label { label: l }));
        f.push(Instruction::new(Opcode::Label { label: l }));
        m.declare_function(f);
        assert!(verify_module(&m, "test").is_err());
    }

    #[test]
    fn catches_smc_recursive_conflict() {
        let mut m = Module::new("p");
        let mut f = Function::new("m_fact$u8", Type::UInt(16));
        f.add_param("n", Type::UInt(8));
        f.attrs.smc_enabled = true;
        f.attrs.recursive = true;
        f.push(Instruction::new(Opcode::Return { src: None }));
        m.declare_function(f);
        assert!(verify_module(&m, "test").is_err());
    }
}
