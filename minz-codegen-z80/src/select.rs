//! Instruction selection (spec §4.5): one fixed assembly template per MIR
//! opcode. Every virtual register lives in a fixed memory cell (see
//! `regalloc.rs`), so a template's job is "load operands from their cells
//! into real registers, compute, store the result back."
//!
//! Z80 has no native multiply, divide, or variable-count shift; those
//! opcodes lower to a `CALL` to a small named runtime routine
//! (`rt_mul8`/`rt_mul16`/`rt_div8`/`rt_div16`/`rt_shl*`/`rt_shr*`) that this
//! backend expects to be linked in separately, the same way a real cross
//! compiler ships a tiny runtime support library alongside generated code
//! — writing that library is an assembler-level concern, not MIR codegen.
//! Bit-struct containers are assumed to fit in one byte (true of every
//! bit-struct in spec §3.1's own worked example); wider containers are a
//! `BackendError`.

use crate::callconv::CallConv;
use crate::error::{BackendError, BackendResult};
use crate::regalloc::{RegAlloc, Width};
use cranelift_entity::EntityRef;
use minz_ir::{Function, InstId, Instruction, Module, Opcode, Reg, Symbol};
use std::collections::HashMap;

pub struct FuncCtx<'m> {
    pub module: &'m Module,
    pub func: &'m Function,
    pub mangled: String,
    pub alloc: RegAlloc,
    /// `(anchor instruction, parameter register) -> anchor label`, for
    /// TRUE SMC functions (spec §4.5's anchor emission).
    pub anchors: HashMap<(InstId, Reg), minz_ir::AnchorLabel>,
    /// Calling convention chosen for every function in the module, so a
    /// `Call` site knows how its callee expects arguments.
    pub call_convs: &'m HashMap<String, CallConv>,
}

impl<'m> FuncCtx<'m> {
    pub fn new(module: &'m Module, func: &'m Function, call_convs: &'m HashMap<String, CallConv>) -> Self {
        let mangled = crate::sanitized_name(&func.name);
        let alloc = RegAlloc::build(func);
        let mut anchors = HashMap::new();
        for p in &func.smc_params {
            if let Some(inst) = p.anchor_inst {
                anchors.insert((inst, p.reg), minz_ir::AnchorLabel::new(&mangled, &p.name));
            }
        }
        FuncCtx { module, func, mangled, alloc, anchors, call_convs }
    }

    fn slot_label(&self, r: Reg) -> String {
        self.alloc.slot(r).label.clone()
    }

    fn width(&self, r: Reg) -> Width {
        self.alloc.slot(r).width
    }

    fn symbol_label(&self, sym: &Symbol) -> String {
        match sym {
            Symbol::Global(id) => crate::sanitized_name(&self.module.global(*id).name),
            Symbol::String(id) => self.module.string(*id).label.clone(),
            Symbol::Function(name) => crate::sanitized_name(name),
            Symbol::Label(l) => format!("{}_L{}", self.mangled, l.index()),
        }
    }

    fn label_line(&self, l: minz_ir::LabelId) -> String {
        format!("{}_L{}", self.mangled, l.index())
    }

    /// Loads `r`'s value into A (8-bit) or HL (16-bit), substituting the
    /// TRUE SMC immediate-patch template if `inst_id` is this register's
    /// anchor use (spec §4.5: "the callee body refers to parameters as if
    /// they were immediate constants"). When patched, the value is also
    /// written back to the register's normal memory cell so any later,
    /// non-anchor use of the same parameter still reads correctly.
    fn load_operand(&self, inst_id: InstId, r: Reg, out: &mut Vec<String>) {
        if let Some(anchor) = self.anchors.get(&(inst_id, r)) {
            let op_label = anchor.op_label();
            match self.width(r) {
                Width::Bits8 => {
                    out.push(format!("{op_label}:"));
                    out.push("    LD A, 0".to_string());
                    out.push(format!("    LD ({}), A", self.slot_label(r)));
                }
                Width::Bits16 => {
                    out.push(format!("{op_label}:"));
                    out.push("    LD HL, 0000".to_string());
                    out.push(format!("    LD ({}), HL", self.slot_label(r)));
                }
            }
            return;
        }
        match self.width(r) {
            Width::Bits8 => out.push(format!("    LD A, ({})", self.slot_label(r))),
            Width::Bits16 => out.push(format!("    LD HL, ({})", self.slot_label(r))),
        }
    }

    fn store_from_a(&self, dst: Reg, out: &mut Vec<String>) {
        out.push(format!("    LD ({}), A", self.slot_label(dst)));
    }

    fn store_from_hl(&self, dst: Reg, out: &mut Vec<String>) {
        out.push(format!("    LD ({}), HL", self.slot_label(dst)));
    }
}

/// Emits the assembly lines for one instruction. `inst_id` is this
/// instruction's position within `func.instructions`, needed to look up
/// TRUE SMC anchor sites.
pub fn emit_instruction(ctx: &FuncCtx, inst_id: InstId, inst: &Instruction) -> BackendResult<Vec<String>> {
    let mut out = Vec::new();
    match &inst.opcode {
        Opcode::LoadConst { dst, imm } => match ctx.width(*dst) {
            Width::Bits8 => {
                out.push(format!("    LD A, {}", (*imm as i64) & 0xFF));
                ctx.store_from_a(*dst, &mut out);
            }
            Width::Bits16 => {
                out.push(format!("    LD HL, {}", (*imm as i64) & 0xFFFF));
                ctx.store_from_hl(*dst, &mut out);
            }
        },
        Opcode::Move { dst, src } => {
            ctx.load_operand(inst_id, *src, &mut out);
            match ctx.width(*dst) {
                Width::Bits8 => ctx.store_from_a(*dst, &mut out),
                Width::Bits16 => ctx.store_from_hl(*dst, &mut out),
            }
        }
        Opcode::LoadVar { dst, sym } => {
            let label = ctx.symbol_label(sym);
            match ctx.width(*dst) {
                Width::Bits8 => {
                    out.push(format!("    LD A, ({label})"));
                    ctx.store_from_a(*dst, &mut out);
                }
                Width::Bits16 => {
                    out.push(format!("    LD HL, ({label})"));
                    ctx.store_from_hl(*dst, &mut out);
                }
            }
        }
        Opcode::StoreVar { sym, src } => {
            let label = ctx.symbol_label(sym);
            match ctx.width(*src) {
                Width::Bits8 => {
                    out.push(format!("    LD A, ({})", ctx.slot_label(*src)));
                    out.push(format!("    LD ({label}), A"));
                }
                Width::Bits16 => {
                    out.push(format!("    LD HL, ({})", ctx.slot_label(*src)));
                    out.push(format!("    LD ({label}), HL"));
                }
            }
        }
        Opcode::LoadAddr { dst, sym } => {
            let label = ctx.symbol_label(sym);
            out.push(format!("    LD HL, {label}"));
            ctx.store_from_hl(*dst, &mut out);
        }
        Opcode::LoadParam { dst, index } => {
            let src = ctx.func.params[*index as usize].reg;
            ctx.load_operand(inst_id, src, &mut out);
            match ctx.width(*dst) {
                Width::Bits8 => ctx.store_from_a(*dst, &mut out),
                Width::Bits16 => ctx.store_from_hl(*dst, &mut out),
            }
        }
        Opcode::LoadPtr { dst, src_addr, size } => {
            out.push(format!("    LD HL, ({})", ctx.slot_label(*src_addr)));
            if *size <= 1 {
                out.push("    LD A, (HL)".to_string());
                ctx.store_from_a(*dst, &mut out);
            } else {
                out.push("    LD E, (HL)".to_string());
                out.push("    INC HL".to_string());
                out.push("    LD D, (HL)".to_string());
                out.push(format!("    LD ({}), DE", ctx.slot_label(*dst)));
            }
        }
        Opcode::StorePtr { src_addr, src_value, size } => {
            out.push(format!("    LD HL, ({})", ctx.slot_label(*src_addr)));
            if *size <= 1 {
                out.push(format!("    LD A, ({})", ctx.slot_label(*src_value)));
                out.push("    LD (HL), A".to_string());
            } else {
                out.push(format!("    LD DE, ({})", ctx.slot_label(*src_value)));
                out.push("    LD (HL), E".to_string());
                out.push("    INC HL".to_string());
                out.push("    LD (HL), D".to_string());
            }
        }
        Opcode::Add { dst, lhs, rhs } => emit_binary(ctx, inst_id, *dst, *lhs, *rhs, BinOp::Add, &mut out),
        Opcode::Sub { dst, lhs, rhs } => emit_binary(ctx, inst_id, *dst, *lhs, *rhs, BinOp::Sub, &mut out),
        Opcode::And { dst, lhs, rhs } => emit_binary(ctx, inst_id, *dst, *lhs, *rhs, BinOp::And, &mut out),
        Opcode::Or { dst, lhs, rhs } => emit_binary(ctx, inst_id, *dst, *lhs, *rhs, BinOp::Or, &mut out),
        Opcode::Xor { dst, lhs, rhs } => emit_binary(ctx, inst_id, *dst, *lhs, *rhs, BinOp::Xor, &mut out),
        Opcode::Mul { dst, lhs, rhs } => emit_runtime_binary(ctx, inst_id, *dst, *lhs, *rhs, "mul", &mut out),
        Opcode::Div { dst, lhs, rhs } => emit_runtime_binary(ctx, inst_id, *dst, *lhs, *rhs, "div", &mut out),
        Opcode::Mod { dst, lhs, rhs } => emit_runtime_binary(ctx, inst_id, *dst, *lhs, *rhs, "mod", &mut out),
        Opcode::Shl { dst, lhs, rhs } => emit_runtime_binary(ctx, inst_id, *dst, *lhs, *rhs, "shl", &mut out),
        Opcode::Shr { dst, lhs, rhs } => emit_runtime_binary(ctx, inst_id, *dst, *lhs, *rhs, "shr", &mut out),
        Opcode::Neg { dst, src } => emit_neg(ctx, inst_id, *dst, *src, &mut out),
        Opcode::Not { dst, src } => emit_not(ctx, inst_id, *dst, *src, &mut out),
        Opcode::Inc { dst, src } => emit_incdec(ctx, inst_id, *dst, *src, "INC", &mut out),
        Opcode::Dec { dst, src } => emit_incdec(ctx, inst_id, *dst, *src, "DEC", &mut out),
        Opcode::Eq { dst, lhs, rhs } => emit_compare(ctx, inst_id, *dst, *lhs, *rhs, Cmp::Eq, &mut out),
        Opcode::Ne { dst, lhs, rhs } => emit_compare(ctx, inst_id, *dst, *lhs, *rhs, Cmp::Ne, &mut out),
        Opcode::Lt { dst, lhs, rhs } => emit_compare(ctx, inst_id, *dst, *lhs, *rhs, Cmp::Lt, &mut out),
        Opcode::Ge { dst, lhs, rhs } => emit_compare(ctx, inst_id, *dst, *lhs, *rhs, Cmp::Ge, &mut out),
        Opcode::Gt { dst, lhs, rhs } => emit_compare(ctx, inst_id, *dst, *lhs, *rhs, Cmp::Gt, &mut out),
        Opcode::Le { dst, lhs, rhs } => emit_compare(ctx, inst_id, *dst, *lhs, *rhs, Cmp::Le, &mut out),
        Opcode::Jump { target } => out.push(format!("    JP {}", ctx.label_line(*target))),
        Opcode::JumpIf { cond, target } => {
            out.push(format!("    LD A, ({})", ctx.slot_label(*cond)));
            out.push("    OR A".to_string());
            out.push(format!("    JP NZ, {}", ctx.label_line(*target)));
        }
        Opcode::JumpIfNot { cond, target } => {
            out.push(format!("    LD A, ({})", ctx.slot_label(*cond)));
            out.push("    OR A".to_string());
            out.push(format!("    JP Z, {}", ctx.label_line(*target)));
        }
        Opcode::Label { label } => out.push(format!("{}:", ctx.label_line(*label))),
        Opcode::Return { src } => {
            if let Some(src) = src {
                out.push(format!("    LD HL, ({})", ctx.slot_label(*src)));
            }
            let conv = *ctx.call_convs.get(&ctx.func.name).unwrap_or(&CallConv::Traditional);
            out.extend(return_sequence(conv));
        }
        Opcode::Call { dst, sym, args } => emit_call(ctx, *dst, sym, args, &mut out)?,
        Opcode::CallIndirect { dst, fptr, args } => emit_call_indirect(ctx, inst_id, *dst, *fptr, args, &mut out)?,
        Opcode::LoadBitField { dst, src, offset, width } => emit_load_bitfield(ctx, *dst, *src, *offset, *width, &mut out)?,
        Opcode::StoreBitField { dst_container, src_value, offset, width } => {
            emit_store_bitfield(ctx, *dst_container, *src_value, *offset, *width, &mut out)?
        }
        Opcode::Print { src } => {
            out.push(format!("    LD HL, ({})", ctx.slot_label(*src)));
            out.push("    CALL rt_print_u16".to_string());
        }
        Opcode::PrintU8 { src } => {
            out.push(format!("    LD A, ({})", ctx.slot_label(*src)));
            out.push("    CALL rt_print_u8".to_string());
        }
        Opcode::PrintU16 { src } => {
            out.push(format!("    LD HL, ({})", ctx.slot_label(*src)));
            out.push("    CALL rt_print_u16".to_string());
        }
        Opcode::PrintStringDirect { sym } => {
            out.push(format!("    LD HL, {}", ctx.symbol_label(sym)));
            out.push("    CALL rt_print_string".to_string());
        }
        Opcode::Halt => out.push("    HALT".to_string()),
        Opcode::Nop => out.push("    NOP".to_string()),
        Opcode::Asm { text } => out.push(format!("    {text}")),
        Opcode::Emit { text } => out.push(text.clone()),
    }
    Ok(out)
}

/// Function-entry code: TRUE SMC functions need none (their parameters
/// arrive already patched into the body as immediates); an interrupt
/// handler banks into the shadow register set so it never has to save the
/// interrupted code's main registers individually; a traditional function
/// copies its incoming HL/DE/scratch-area arguments into their normal
/// memory slots so the rest of the body can read them like any other
/// register.
pub(crate) fn emit_prologue(ctx: &FuncCtx, conv: CallConv) -> Vec<String> {
    let mut out = Vec::new();
    match conv {
        CallConv::TrueSmc => {}
        CallConv::Interrupt => {
            out.push("    PUSH AF".to_string());
            out.push("    EXX".to_string());
            out.push("    EX AF, AF'".to_string());
        }
        CallConv::Traditional => {
            if let Some(p0) = ctx.func.params.first() {
                match ctx.width(p0.reg) {
                    Width::Bits8 => {
                        out.push("    LD A, L".to_string());
                        out.push(format!("    LD ({}), A", ctx.slot_label(p0.reg)));
                    }
                    Width::Bits16 => ctx.store_from_hl(p0.reg, &mut out),
                }
            }
            if let Some(p1) = ctx.func.params.get(1) {
                match ctx.width(p1.reg) {
                    Width::Bits8 => {
                        out.push("    LD A, E".to_string());
                        out.push(format!("    LD ({}), A", ctx.slot_label(p1.reg)));
                    }
                    Width::Bits16 => out.push(format!("    LD ({}), DE", ctx.slot_label(p1.reg))),
                }
            }
            for (i, p) in ctx.func.params.iter().enumerate().skip(2) {
                match ctx.width(p.reg) {
                    Width::Bits8 => {
                        out.push(format!("    LD A, ({}_arg{i})", ctx.mangled));
                        out.push(format!("    LD ({}), A", ctx.slot_label(p.reg)));
                    }
                    Width::Bits16 => {
                        out.push(format!("    LD HL, ({}_arg{i})", ctx.mangled));
                        ctx.store_from_hl(p.reg, &mut out);
                    }
                }
            }
        }
    }
    out
}

pub(crate) fn return_sequence(conv: CallConv) -> Vec<String> {
    match conv {
        CallConv::Traditional | CallConv::TrueSmc => vec!["    RET".to_string()],
        CallConv::Interrupt => vec![
            "    EX AF, AF'".to_string(),
            "    EXX".to_string(),
            "    POP AF".to_string(),
            "    EI".to_string(),
            "    RETI".to_string(),
        ],
    }
}

enum BinOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

fn emit_binary(ctx: &FuncCtx, inst_id: InstId, dst: Reg, lhs: Reg, rhs: Reg, op: BinOp, out: &mut Vec<String>) {
    match ctx.width(dst) {
        Width::Bits8 => {
            ctx.load_operand(inst_id, lhs, out);
            out.push(format!("    LD HL, {}", ctx.slot_label(rhs)));
            match op {
                BinOp::Add => out.push("    ADD A, (HL)".to_string()),
                BinOp::Sub => out.push("    SUB (HL)".to_string()),
                BinOp::And => out.push("    AND (HL)".to_string()),
                BinOp::Or => out.push("    OR (HL)".to_string()),
                BinOp::Xor => out.push("    XOR (HL)".to_string()),
            }
            ctx.store_from_a(dst, out);
        }
        Width::Bits16 => {
            ctx.load_operand(inst_id, lhs, out);
            out.push(format!("    LD DE, ({})", ctx.slot_label(rhs)));
            match op {
                BinOp::Add => out.push("    ADD HL, DE".to_string()),
                BinOp::Sub => {
                    out.push("    OR A".to_string());
                    out.push("    SBC HL, DE".to_string());
                }
                BinOp::And | BinOp::Or | BinOp::Xor => {
                    let mnemonic = match op {
                        BinOp::And => "AND",
                        BinOp::Or => "OR",
                        _ => "XOR",
                    };
                    out.push("    LD A, H".to_string());
                    out.push(format!("    {mnemonic} D"));
                    out.push("    LD H, A".to_string());
                    out.push("    LD A, L".to_string());
                    out.push(format!("    {mnemonic} E"));
                    out.push("    LD L, A".to_string());
                }
            }
            ctx.store_from_hl(dst, out);
        }
    }
}

fn emit_runtime_binary(ctx: &FuncCtx, inst_id: InstId, dst: Reg, lhs: Reg, rhs: Reg, helper: &str, out: &mut Vec<String>) {
    match ctx.width(dst) {
        Width::Bits8 => {
            ctx.load_operand(inst_id, lhs, out);
            out.push(format!("    LD HL, ({})", ctx.slot_label(rhs)));
            out.push("    LD E, L".to_string());
            out.push(format!("    CALL rt_{helper}8"));
            ctx.store_from_a(dst, out);
        }
        Width::Bits16 => {
            ctx.load_operand(inst_id, lhs, out);
            out.push(format!("    LD DE, ({})", ctx.slot_label(rhs)));
            out.push(format!("    CALL rt_{helper}16"));
            ctx.store_from_hl(dst, out);
        }
    }
}

fn emit_neg(ctx: &FuncCtx, inst_id: InstId, dst: Reg, src: Reg, out: &mut Vec<String>) {
    match ctx.width(dst) {
        Width::Bits8 => {
            ctx.load_operand(inst_id, src, out);
            out.push("    NEG".to_string());
            ctx.store_from_a(dst, out);
        }
        Width::Bits16 => {
            ctx.load_operand(inst_id, src, out);
            out.push("    XOR A".to_string());
            out.push("    SUB L".to_string());
            out.push("    LD L, A".to_string());
            out.push("    LD A, 0".to_string());
            out.push("    SBC A, H".to_string());
            out.push("    LD H, A".to_string());
            ctx.store_from_hl(dst, out);
        }
    }
}

fn emit_not(ctx: &FuncCtx, inst_id: InstId, dst: Reg, src: Reg, out: &mut Vec<String>) {
    match ctx.width(dst) {
        Width::Bits8 => {
            ctx.load_operand(inst_id, src, out);
            out.push("    CPL".to_string());
            ctx.store_from_a(dst, out);
        }
        Width::Bits16 => {
            ctx.load_operand(inst_id, src, out);
            out.push("    LD A, H".to_string());
            out.push("    CPL".to_string());
            out.push("    LD H, A".to_string());
            out.push("    LD A, L".to_string());
            out.push("    CPL".to_string());
            out.push("    LD L, A".to_string());
            ctx.store_from_hl(dst, out);
        }
    }
}

fn emit_incdec(ctx: &FuncCtx, inst_id: InstId, dst: Reg, src: Reg, mnemonic: &str, out: &mut Vec<String>) {
    match ctx.width(dst) {
        Width::Bits8 => {
            ctx.load_operand(inst_id, src, out);
            out.push(format!("    {mnemonic} A"));
            ctx.store_from_a(dst, out);
        }
        Width::Bits16 => {
            ctx.load_operand(inst_id, src, out);
            out.push(format!("    {mnemonic} HL"));
            ctx.store_from_hl(dst, out);
        }
    }
}

enum Cmp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// `condition`, `swap` and unsigned-comparison assumption: see the
/// module doc comment for why signed ordering isn't modeled.
fn emit_compare(ctx: &FuncCtx, inst_id: InstId, dst: Reg, lhs: Reg, rhs: Reg, cmp: Cmp, out: &mut Vec<String>) {
    let (cc, swap) = match cmp {
        Cmp::Eq => ("Z", false),
        Cmp::Ne => ("NZ", false),
        Cmp::Lt => ("C", false),
        Cmp::Ge => ("NC", false),
        Cmp::Gt => ("C", true),
        Cmp::Le => ("NC", true),
    };
    let (a_reg, b_reg) = if swap { (rhs, lhs) } else { (lhs, rhs) };

    match ctx.width(dst) {
        Width::Bits8 => {
            ctx.load_operand(inst_id, a_reg, out);
            out.push(format!("    LD HL, {}", ctx.slot_label(b_reg)));
            out.push("    CP (HL)".to_string());
        }
        Width::Bits16 => {
            ctx.load_operand(inst_id, a_reg, out);
            out.push(format!("    LD DE, ({})", ctx.slot_label(b_reg)));
            out.push("    OR A".to_string());
            out.push("    SBC HL, DE".to_string());
        }
    }

    let end_label = format!("{}_cmp{}", ctx.mangled, inst_id.index());
    out.push("    LD A, 1".to_string());
    out.push(format!("    JR {cc}, {end_label}"));
    out.push("    DEC A".to_string());
    out.push(format!("{end_label}:"));
    ctx.store_from_a(dst, out);
}

fn emit_load_bitfield(ctx: &FuncCtx, dst: Reg, src: Reg, offset: u32, width: u32, out: &mut Vec<String>) -> BackendResult<()> {
    if offset + width > 8 {
        return Err(BackendError::Emit(format!("bit field at offset {offset} width {width} does not fit in one byte")));
    }
    let mask = ((1u32 << width) - 1) as u8;
    out.push(format!("    LD A, ({})", ctx.slot_label(src)));
    for _ in 0..offset {
        out.push("    SRL A".to_string());
    }
    out.push(format!("    AND {mask}"));
    ctx.store_from_a(dst, out);
    Ok(())
}

fn emit_store_bitfield(
    ctx: &FuncCtx,
    dst_container: Reg,
    src_value: Reg,
    offset: u32,
    width: u32,
    out: &mut Vec<String>,
) -> BackendResult<()> {
    if offset + width > 8 {
        return Err(BackendError::Emit(format!("bit field at offset {offset} width {width} does not fit in one byte")));
    }
    let mask = ((1u32 << width) - 1) as u8;
    let shifted_mask = (mask as u32) << offset;
    let clear_mask = (!shifted_mask) & 0xFF;
    out.push(format!("    LD A, ({})", ctx.slot_label(src_value)));
    out.push(format!("    AND {mask}"));
    for _ in 0..offset {
        out.push("    SLA A".to_string());
    }
    out.push("    LD B, A".to_string());
    out.push(format!("    LD A, ({})", ctx.slot_label(dst_container)));
    out.push(format!("    AND {clear_mask}"));
    out.push("    OR B".to_string());
    ctx.store_from_a(dst_container, out);
    Ok(())
}

fn emit_call(ctx: &FuncCtx, dst: Reg, sym: &Symbol, args: &[Reg], out: &mut Vec<String>) -> BackendResult<()> {
    let Symbol::Function(name) = sym else {
        return Err(BackendError::Emit("indirect symbol in a direct Call instruction".into()));
    };
    let callee = ctx
        .module
        .function_by_name(name)
        .map(|id| ctx.module.function(id))
        .ok_or_else(|| BackendError::Emit(format!("call to undeclared function {name}")))?;
    let conv = *ctx.call_convs.get(name).unwrap_or(&CallConv::Traditional);
    let callee_label = crate::sanitized_name(name);

    match conv {
        CallConv::TrueSmc => {
            for (i, param) in callee.smc_params.iter().enumerate() {
                let Some(&arg) = args.get(i) else { continue };
                let anchor = minz_ir::AnchorLabel::new(&callee_label, &param.name);
                match ctx.width(arg) {
                    Width::Bits8 => {
                        out.push(format!("    LD A, ({})", ctx.slot_label(arg)));
                        out.push(format!("    LD ({anchor}), A"));
                    }
                    Width::Bits16 => {
                        out.push(format!("    LD HL, ({})", ctx.slot_label(arg)));
                        out.push(format!("    LD ({anchor}), HL"));
                    }
                }
            }
            out.push(format!("    CALL {callee_label}"));
        }
        CallConv::Traditional => {
            for (i, &arg) in args.iter().enumerate().skip(2) {
                match ctx.width(arg) {
                    Width::Bits8 => {
                        out.push(format!("    LD A, ({})", ctx.slot_label(arg)));
                        out.push(format!("    LD ({callee_label}_arg{i}), A"));
                    }
                    Width::Bits16 => {
                        out.push(format!("    LD HL, ({})", ctx.slot_label(arg)));
                        out.push(format!("    LD ({callee_label}_arg{i}), HL"));
                    }
                }
            }
            // args 0/1 always transport through HL/DE in full, even when the
            // underlying value is 8-bit (the high byte is simply ignored by
            // the callee's prologue in that case).
            if let Some(&a0) = args.first() {
                match ctx.width(a0) {
                    Width::Bits8 => {
                        out.push(format!("    LD A, ({})", ctx.slot_label(a0)));
                        out.push("    LD L, A".to_string());
                    }
                    Width::Bits16 => out.push(format!("    LD HL, ({})", ctx.slot_label(a0))),
                }
            }
            if let Some(&a1) = args.get(1) {
                match ctx.width(a1) {
                    Width::Bits8 => {
                        out.push(format!("    LD A, ({})", ctx.slot_label(a1)));
                        out.push("    LD E, A".to_string());
                    }
                    Width::Bits16 => out.push(format!("    LD DE, ({})", ctx.slot_label(a1))),
                }
            }
            out.push(format!("    CALL {callee_label}"));
        }
        CallConv::Interrupt => {
            return Err(BackendError::Emit(format!("function {name} is @interrupt and cannot be called directly")));
        }
    }

    if !dst.is_unused() {
        ctx.store_from_hl(dst, out);
    }
    Ok(())
}

/// Indirect calls always use the Traditional argument protocol and are
/// capped at two arguments (HL, DE); the Z80 has no `CALL (HL)`, so this
/// synthesizes one using `IX` to hold the target (freed up since this
/// backend keeps no frame pointer there) and a manual return-address push.
fn emit_call_indirect(ctx: &FuncCtx, inst_id: InstId, dst: Reg, fptr: Reg, args: &[Reg], out: &mut Vec<String>) -> BackendResult<()> {
    if args.len() > 2 {
        return Err(BackendError::Emit("indirect calls support at most two arguments".into()));
    }
    out.push(format!("    LD IX, ({})", ctx.slot_label(fptr)));
    if let Some(&a0) = args.first() {
        out.push(format!("    LD HL, ({})", ctx.slot_label(a0)));
    }
    if let Some(&a1) = args.get(1) {
        out.push(format!("    LD DE, ({})", ctx.slot_label(a1)));
    }
    let ret_label = format!("{}_ind{}_ret", ctx.mangled, inst_id.index());
    out.push(format!("    LD BC, {ret_label}"));
    out.push("    PUSH BC".to_string());
    out.push("    JP (IX)".to_string());
    out.push(format!("{ret_label}:"));
    if !dst.is_unused() {
        ctx.store_from_hl(dst, out);
    }
    Ok(())
}
