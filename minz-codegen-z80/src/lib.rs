//! Z80 backend (spec §4.5): lowers an optimized MIR `Module` to a single
//! sjasmplus-dialect assembly listing.
//!
//! The output is one `ORG`-anchored file: platform-reserved-range warnings
//! first (as comments, so `sjasmplus -w` output stays readable), then a
//! data section for globals and interned strings, then one label per
//! function. Each function's own calling convention decides its prologue;
//! instruction selection (`select.rs`) is otherwise convention-agnostic.
//!
//! Alongside the assembly text, `compile_module` also renders the same
//! module through [`minz_mir_text::emit`] — the spec's "Output" section
//! (§4.5) asks for the MIR the backend actually consumed, not just the
//! final bytes, so a point release can diff what changed between the
//! optimizer and the assembler.

mod callconv;
mod error;
mod layout;
mod regalloc;
mod select;

pub use callconv::CallConv;
pub use error::{BackendError, BackendResult};
pub use regalloc::{RegAlloc, RegSlot, Width};

use minz_ir::{InstId, Module, TargetConfig};
use select::FuncCtx;
use std::collections::HashMap;

/// Turns a MIR name into a valid assembly label (spec §4.1's mangling
/// scheme already avoids most illegal characters; this is the backend's
/// own last-mile guarantee).
pub(crate) fn sanitized_name(name: &str) -> String {
    minz_analyzer::mangle::sanitize_for_assembly(name)
}

pub struct CompiledModule {
    pub assembly: String,
    pub mir_text: String,
}

pub fn compile_module(module: &Module, target: &TargetConfig) -> BackendResult<CompiledModule> {
    let call_convs: HashMap<String, CallConv> =
        module.functions().map(|(_, f)| (f.name.clone(), callconv::choose(f, target))).collect();

    for f in module.functions().map(|(_, f)| f) {
        if f.attrs.interrupt && matches!(f.call_conv, Some(minz_ir::CallConvHint::TrueSmc)) {
            return Err(BackendError::InterruptAndSmc(f.name.clone()));
        }
    }

    let mut lines = Vec::new();
    for warning in layout::check_origin(target) {
        lines.push(format!("; warning: {warning}"));
    }
    lines.push(format!("    ORG {:#06X}", target.origin));
    lines.push(String::new());

    lines.push("; --- globals ---".to_string());
    for (_, g) in module.globals() {
        let label = sanitized_name(&g.name);
        match g.ty.byte_size() {
            1 => lines.push(format!("{label}: DB {}", g.init.unwrap_or(0))),
            2 => lines.push(format!("{label}: DW {}", g.init.unwrap_or(0))),
            n => lines.push(format!("{label}: DS {n}")),
        }
    }
    lines.push(String::new());

    lines.push("; --- string literals ---".to_string());
    for (_, s) in module.strings() {
        let escaped = s.value.replace('\\', "\\\\").replace('"', "\\\"");
        lines.push(format!("{}: DB {}, \"{}\"", s.label, s.value.len().min(255), escaped));
    }
    lines.push(String::new());

    for (_, f) in module.functions() {
        let conv = *call_convs.get(&f.name).expect("every function has a chosen calling convention");
        let ctx = FuncCtx::new(module, f, &call_convs);
        let mangled = sanitized_name(&f.name);

        log::debug!("{}: lowering {} registers, calling convention {:?}", f.name, f.register_count(), conv);

        lines.push(format!("; --- function {} ---", f.name));
        lines.push(format!("{mangled}:"));

        for p in &f.smc_params {
            if p.anchor_inst.is_some() {
                let anchor = minz_ir::AnchorLabel::new(&mangled, &p.name);
                lines.push(format!("{anchor}: EQU {} + 1", anchor.op_label()));
            }
        }

        for line in select::emit_prologue(&ctx, conv) {
            lines.push(line);
        }

        for (i, inst) in f.instructions.iter().enumerate() {
            let inst_id = InstId::new(i);
            for line in select::emit_instruction(&ctx, inst_id, inst)? {
                lines.push(line);
            }
        }
        lines.push(String::new());
    }

    lines.push("    END".to_string());

    let assembly = lines.join("\n") + "\n";
    let mir_text = minz_mir_text::emit(module).map_err(|e| BackendError::Emit(e.to_string()))?;
    Ok(CompiledModule { assembly, mir_text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;
    use minz_ir::{Function, Instruction, Opcode, Reg, Type};

    fn try_init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn compiles_a_trivial_function_to_assembly_containing_its_label() {
        try_init_logger();
        let mut module = Module::new("prog");
        let mut f = Function::new("m_main", Type::Void);
        let t = f.alloc_reg();
        f.push(Instruction::new(Opcode::LoadConst { dst: t, imm: 5 }));
        f.push(Instruction::new(Opcode::Return { src: None }));
        module.declare_function(f);

        let out = compile_module(&module, &TargetConfig::generic()).unwrap();
        assert!(out.assembly.contains("m_main:"));
        assert!(out.assembly.contains("ORG"));
        assert!(out.mir_text.contains("func m_main"));
    }

    #[test]
    fn true_smc_function_gets_anchor_equ_lines() {
        let mut module = Module::new("prog");
        let mut f = Function::new("m_add2$u8", Type::UInt(8));
        let a = f.add_param("a", Type::UInt(8));
        f.attrs.smc_enabled = true;
        let dst = Reg::new(a.index() as u32 + 10);
        f.push(Instruction::new(Opcode::Move { dst, src: a }));
        f.push(Instruction::new(Opcode::Return { src: Some(dst) }));
        f.smc_params = vec![minz_ir::SmcParam { name: "a".into(), reg: a, anchor_inst: Some(InstId::new(0)) }];
        module.declare_function(f);

        let out = compile_module(&module, &TargetConfig::zx_spectrum_48k()).unwrap();
        // Anchor labels are built from the sanitized function name, never
        // the raw `$`-bearing mangled name — `$` means "current PC" to
        // sjasmplus and would make every SMC function unassembleable.
        assert!(!out.assembly.contains('$'));
        assert!(out.assembly.contains("m_add2_u8_param_a: EQU m_add2_u8_param_a_op + 1"));
        assert!(out.assembly.contains("m_add2_u8_param_a_op:"));
    }

    #[test]
    fn interrupt_and_true_smc_hint_together_is_rejected() {
        let mut module = Module::new("prog");
        let mut f = Function::new("m_isr", Type::Void);
        f.attrs.interrupt = true;
        f.call_conv = Some(minz_ir::CallConvHint::TrueSmc);
        f.push(Instruction::new(Opcode::Return { src: None }));
        module.declare_function(f);

        assert!(matches!(compile_module(&module, &TargetConfig::generic()), Err(BackendError::InterruptAndSmc(_))));
    }
}
