//! Emits the canonical text form described in `parser.rs`'s module doc
//! comment. `emit(parse(text)) == text` modulo whitespace/comment placement;
//! `parse(emit(m))` reproduces `m`'s `Debug` output exactly (see
//! `lib.rs`'s round-trip tests), which is the fidelity guarantee spec §6.3
//! actually needs of a debugging/golden-test codec.

use crate::error::{Location, ParseError, ParseResult};
use minz_ir::{Function, Instruction, Module, Opcode, Symbol, Type};
use std::fmt::Write as _;

fn here() -> ParseError {
    ParseError { location: Location::default(), message: String::new() }
}

fn unsupported_type(ty: &Type) -> ParseError {
    ParseError { location: Location::default(), message: format!("type '{ty}' has no textual MIR representation") }
}

pub fn emit(module: &Module) -> ParseResult<String> {
    let mut out = String::new();
    writeln!(out, "module {}", module.name).map_err(|_| here())?;

    for (_, g) in module.globals() {
        write!(out, "\nglobal {}: {}", g.name, emit_type(&g.ty)?).map_err(|_| here())?;
        if let Some(init) = g.init {
            write!(out, " = {init}").map_err(|_| here())?;
        }
        writeln!(out).map_err(|_| here())?;
    }

    for (_, s) in module.strings() {
        writeln!(out, "\nstr {} = {}", s.label, emit_str(&s.value)).map_err(|_| here())?;
    }

    for (_, f) in module.functions() {
        write!(out, "\n").map_err(|_| here())?;
        emit_function(&mut out, module, f)?;
    }

    Ok(out)
}

fn emit_type(ty: &Type) -> ParseResult<String> {
    use minz_ir::FixedFormat::*;
    Ok(match ty {
        Type::UInt(8) => "u8".into(),
        Type::UInt(16) => "u16".into(),
        Type::UInt(24) => "u24".into(),
        Type::UInt(32) => "u32".into(),
        Type::Int(8) => "i8".into(),
        Type::Int(16) => "i16".into(),
        Type::Int(24) => "i24".into(),
        Type::Int(32) => "i32".into(),
        Type::Bool => "bool".into(),
        Type::Void => "void".into(),
        Type::Fixed(Q8_8) => "fix8_8".into(),
        Type::Fixed(Q0_8) => "fix0_8".into(),
        Type::Fixed(Q0_16) => "fix0_16".into(),
        Type::Fixed(Q16_8) => "fix16_8".into(),
        Type::Fixed(Q8_16) => "fix8_16".into(),
        Type::Ptr(inner) => format!("*{}", emit_type(inner)?),
        Type::MutPtr(inner) => format!("*mut {}", emit_type(inner)?),
        other => return Err(unsupported_type(other)),
    })
}

fn emit_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn emit_symbol(sym: &Symbol, module: &Module) -> String {
    match sym {
        Symbol::Global(id) => format!("g:{}", module.global(*id).name),
        Symbol::String(id) => format!("s:{}", module.string(*id).label),
        Symbol::Function(name) => format!("f:{name}"),
        Symbol::Label(l) => format!(".{l}"),
    }
}

fn emit_function(out: &mut String, module: &Module, f: &Function) -> ParseResult<()> {
    let params = f
        .params
        .iter()
        .map(|p| Ok(format!("{}: {}", p.name, emit_type(&p.ty)?)))
        .collect::<ParseResult<Vec<_>>>()?
        .join(", ");
    writeln!(out, "func {}({params}) -> {}", f.name, emit_type(&f.ret_type)?).map_err(|_| here())?;

    if f.attrs.smc_enabled {
        writeln!(out, "  @smc").map_err(|_| here())?;
    }
    if f.attrs.recursive {
        writeln!(out, "  @recursive").map_err(|_| here())?;
    }
    if f.attrs.interrupt {
        writeln!(out, "  @interrupt").map_err(|_| here())?;
    }
    if f.attrs.abi_explicit {
        writeln!(out, "  @abi").map_err(|_| here())?;
    }
    if let Some(cc) = f.call_conv {
        writeln!(out, "  @callconv {cc}").map_err(|_| here())?;
    }
    for p in &f.smc_params {
        match p.anchor_inst {
            Some(inst) => writeln!(out, "  @smcparam {} {} @ {}", p.name, p.reg, inst).map_err(|_| here())?,
            None => writeln!(out, "  @smcparam {} {}", p.name, p.reg).map_err(|_| here())?,
        }
    }

    if !f.locals.is_empty() {
        writeln!(out, "locals:").map_err(|_| here())?;
        for l in &f.locals {
            writeln!(out, "  local {}: {} = {}", l.name, emit_type(&l.ty)?, l.reg).map_err(|_| here())?;
        }
    }

    writeln!(out, "instructions:").map_err(|_| here())?;
    for inst in &f.instructions {
        writeln!(out, "  {}", emit_instruction(inst, module)?).map_err(|_| here())?;
    }

    Ok(())
}

fn emit_instruction(inst: &Instruction, module: &Module) -> ParseResult<String> {
    let mut line = match &inst.opcode {
        Opcode::LoadConst { dst, imm } => format!("{dst} = const {imm}"),
        Opcode::Move { dst, src } => format!("{dst} = move {src}"),
        Opcode::LoadVar { dst, sym } => format!("{dst} = load {}", emit_symbol(sym, module)),
        Opcode::StoreVar { sym, src } => format!("store {}, {src}", emit_symbol(sym, module)),
        Opcode::LoadAddr { dst, sym } => format!("{dst} = addr {}", emit_symbol(sym, module)),
        Opcode::LoadParam { dst, index } => format!("{dst} = param {index}"),
        Opcode::LoadPtr { dst, src_addr, size } => format!("{dst} = loadptr {src_addr}, {size}"),
        Opcode::StorePtr { src_addr, src_value, size } => format!("storeptr {src_addr}, {src_value}, {size}"),
        Opcode::Add { dst, lhs, rhs } => format!("{dst} = {lhs} + {rhs}"),
        Opcode::Sub { dst, lhs, rhs } => format!("{dst} = {lhs} - {rhs}"),
        Opcode::Mul { dst, lhs, rhs } => format!("{dst} = {lhs} * {rhs}"),
        Opcode::Div { dst, lhs, rhs } => format!("{dst} = {lhs} / {rhs}"),
        Opcode::Mod { dst, lhs, rhs } => format!("{dst} = {lhs} % {rhs}"),
        Opcode::Neg { dst, src } => format!("{dst} = neg {src}"),
        Opcode::Inc { dst, src } => format!("{dst} = inc {src}"),
        Opcode::Dec { dst, src } => format!("{dst} = dec {src}"),
        Opcode::And { dst, lhs, rhs } => format!("{dst} = {lhs} & {rhs}"),
        Opcode::Or { dst, lhs, rhs } => format!("{dst} = {lhs} | {rhs}"),
        Opcode::Xor { dst, lhs, rhs } => format!("{dst} = {lhs} ^ {rhs}"),
        Opcode::Not { dst, src } => format!("{dst} = not {src}"),
        Opcode::Shl { dst, lhs, rhs } => format!("{dst} = {lhs} << {rhs}"),
        Opcode::Shr { dst, lhs, rhs } => format!("{dst} = {lhs} >> {rhs}"),
        Opcode::Eq { dst, lhs, rhs } => format!("{dst} = {lhs} == {rhs}"),
        Opcode::Ne { dst, lhs, rhs } => format!("{dst} = {lhs} != {rhs}"),
        Opcode::Lt { dst, lhs, rhs } => format!("{dst} = {lhs} < {rhs}"),
        Opcode::Le { dst, lhs, rhs } => format!("{dst} = {lhs} <= {rhs}"),
        Opcode::Gt { dst, lhs, rhs } => format!("{dst} = {lhs} > {rhs}"),
        Opcode::Ge { dst, lhs, rhs } => format!("{dst} = {lhs} >= {rhs}"),
        Opcode::Jump { target } => format!("jump .{target}"),
        Opcode::JumpIf { cond, target } => format!("jumpif {cond}, .{target}"),
        Opcode::JumpIfNot { cond, target } => format!("jumpifnot {cond}, .{target}"),
        Opcode::Label { label } => format!(".{label}:"),
        Opcode::Return { src: None } => "return".to_string(),
        Opcode::Return { src: Some(src) } => format!("return {src}"),
        Opcode::Call { dst, sym, args } => {
            let args = args.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
            format!("{dst} = call {}({args})", emit_symbol(sym, module))
        }
        Opcode::CallIndirect { dst, fptr, args } => {
            let args = args.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
            format!("{dst} = callind {fptr}({args})")
        }
        Opcode::LoadBitField { dst, src, offset, width } => format!("{dst} = loadbits {src}, {offset}, {width}"),
        Opcode::StoreBitField { dst_container, src_value, offset, width } => {
            format!("{dst_container} = storebits {src_value}, {offset}, {width}")
        }
        Opcode::Print { src } => format!("print {src}"),
        Opcode::PrintU8 { src } => format!("printu8 {src}"),
        Opcode::PrintU16 { src } => format!("printu16 {src}"),
        Opcode::PrintStringDirect { sym } => format!("printstr {}", emit_symbol(sym, module)),
        Opcode::Halt => "halt".to_string(),
        Opcode::Nop => "nop".to_string(),
        Opcode::Asm { text } => format!("asm {}", emit_str(text)),
        Opcode::Emit { text } => format!("emit {}", emit_str(text)),
    };

    if let Some(size) = inst.size {
        write!(line, " size {size}").map_err(|_| here())?;
    }
    if let Some(comment) = &inst.comment {
        write!(line, " ; {comment}").map_err(|_| here())?;
    }
    Ok(line)
}
