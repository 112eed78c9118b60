//! Recursive-descent parser for the canonical MIR text form (spec §4.2, §6.3).
//!
//! Grammar (one declaration/instruction per line; blank lines and `;`
//! comments are already removed by the lexer):
//!
//! ```text
//! module <name>
//!
//! global <name>: <type> [= <int>]
//! str <label> = "<text>"
//!
//! func <name>(<name>: <type>, ...) -> <type>
//!   @smc
//!   @recursive
//!   @interrupt
//!   @abi
//!   @callconv <traditional|true_smc|interrupt>
//!   @smcparam <name> <reg> [@ <inst>]
//! locals:
//!   local <name>: <type>
//! instructions:
//!   <reg> = const <int>
//!   <reg> = <reg> <op> <reg>
//!   jump .L<n>
//!   ...
//! ```
//!
//! Only the scalar/pointer corner of spec §3.1's type universe round-trips
//! through text (`u8..u32`, `i8..i32`, `bool`, `void`, fixed-point, `*T`,
//! `*mut T`); aggregate types (struct/enum/bit-struct/function/array/
//! errorable) are out of scope for this codec, matching the already-scoped
//! decision to leave `Global.bytes` (byte-blob initializers) unrepresented.
//! A module built by `minz-analyzer::lower` never gives a register a
//! non-scalar type (see that crate's own scope note), so this restriction
//! costs nothing in practice.

use crate::error::{err, Location, ParseError, ParseResult};
use crate::lexer::{lex, Tok};
use minz_ir::{
    ArgList, CallConvHint, FixedFormat, Function, FunctionAttrs, Global, InstId, LabelId, Local,
    Module, Opcode, Param, Reg, SmcParam, Symbol, Type,
};
use std::collections::HashMap;

struct Parser<'a> {
    toks: &'a [Tok],
    locs: &'a [Location],
    line_comments: &'a HashMap<usize, String>,
    pos: usize,
    string_labels: HashMap<String, minz_ir::StringId>,
    module: Module,
}

pub fn parse(text: &str) -> ParseResult<Module> {
    let lexed = lex(text)?;
    let mut p = Parser {
        toks: &lexed.toks,
        locs: &lexed.locs,
        line_comments: &lexed.line_comments,
        pos: 0,
        string_labels: HashMap::new(),
        module: Module::default(),
    };
    p.parse_module()
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.toks.get(self.pos + offset).unwrap_or(&Tok::Eof)
    }

    fn loc(&self) -> Location {
        self.locs[self.pos]
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Tok) -> ParseResult<()> {
        if self.peek() == want {
            self.bump();
            Ok(())
        } else {
            err!(self.loc(), "expected {:?}, found {:?}", want, self.peek())
        }
    }

    fn expect_newline(&mut self) -> ParseResult<()> {
        self.expect(&Tok::Newline)
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.bump() {
            Tok::Ident(s) => Ok(s),
            other => err!(self.loc(), "expected an identifier, found {:?}", other),
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> ParseResult<()> {
        match self.peek() {
            Tok::Ident(s) if s == kw => {
                self.bump();
                Ok(())
            }
            other => err!(self.loc(), "expected '{kw}', found {:?}", other),
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Ident(s) if s == kw)
    }

    fn expect_reg(&mut self) -> ParseResult<Reg> {
        match self.bump() {
            Tok::Reg(n) => Ok(Reg::new(n as usize)),
            other => err!(self.loc(), "expected a register, found {:?}", other),
        }
    }

    fn expect_label(&mut self) -> ParseResult<LabelId> {
        match self.bump() {
            Tok::Label(n) => Ok(LabelId::new(n as usize)),
            other => err!(self.loc(), "expected a label, found {:?}", other),
        }
    }

    fn expect_int(&mut self) -> ParseResult<i64> {
        match self.bump() {
            Tok::Int(n) => Ok(n),
            other => err!(self.loc(), "expected an integer literal, found {:?}", other),
        }
    }

    fn expect_u32(&mut self) -> ParseResult<u32> {
        let loc = self.loc();
        let n = self.expect_int()?;
        u32::try_from(n).map_err(|_| ParseError { location: loc, message: format!("{n} out of range for u32") })
    }

    fn expect_u16(&mut self) -> ParseResult<u16> {
        let loc = self.loc();
        let n = self.expect_int()?;
        u16::try_from(n).map_err(|_| ParseError { location: loc, message: format!("{n} out of range for u16") })
    }

    fn expect_str(&mut self) -> ParseResult<String> {
        match self.bump() {
            Tok::Str(s) => Ok(s),
            other => err!(self.loc(), "expected a string literal, found {:?}", other),
        }
    }

    fn parse_type(&mut self) -> ParseResult<Type> {
        match self.peek().clone() {
            Tok::Star => {
                self.bump();
                if self.at_keyword("mut") {
                    self.bump();
                    Ok(Type::MutPtr(Box::new(self.parse_type()?)))
                } else {
                    Ok(Type::Ptr(Box::new(self.parse_type()?)))
                }
            }
            Tok::Ident(s) => {
                self.bump();
                match s.as_str() {
                    "u8" => Ok(Type::UInt(8)),
                    "u16" => Ok(Type::UInt(16)),
                    "u24" => Ok(Type::UInt(24)),
                    "u32" => Ok(Type::UInt(32)),
                    "i8" => Ok(Type::Int(8)),
                    "i16" => Ok(Type::Int(16)),
                    "i24" => Ok(Type::Int(24)),
                    "i32" => Ok(Type::Int(32)),
                    "bool" => Ok(Type::Bool),
                    "void" => Ok(Type::Void),
                    "fix8_8" => Ok(Type::Fixed(FixedFormat::Q8_8)),
                    "fix0_8" => Ok(Type::Fixed(FixedFormat::Q0_8)),
                    "fix0_16" => Ok(Type::Fixed(FixedFormat::Q0_16)),
                    "fix16_8" => Ok(Type::Fixed(FixedFormat::Q16_8)),
                    "fix8_16" => Ok(Type::Fixed(FixedFormat::Q8_16)),
                    other => err!(self.loc(), "unsupported type '{other}' in textual MIR form"),
                }
            }
            other => err!(self.loc(), "expected a type, found {:?}", other),
        }
    }

    fn parse_symbol(&mut self) -> ParseResult<Symbol> {
        if let Tok::Label(_) = self.peek() {
            return Ok(Symbol::Label(self.expect_label()?));
        }
        let prefix = self.expect_ident()?;
        self.expect(&Tok::Colon)?;
        match prefix.as_str() {
            "g" => {
                let name = self.expect_ident()?;
                self.module_global_id(&name)
            }
            "s" => {
                let label = self.expect_ident()?;
                self.string_labels
                    .get(&label)
                    .copied()
                    .map(Symbol::String)
                    .ok_or_else(|| ParseError { location: self.loc(), message: format!("undeclared string '{label}'") })
            }
            "f" => Ok(Symbol::Function(self.expect_ident()?)),
            other => err!(self.loc(), "unknown symbol prefix '{other}'"),
        }
    }

    fn module_global_id(&mut self, name: &str) -> ParseResult<Symbol> {
        self.module
            .global_by_name(name)
            .map(Symbol::Global)
            .ok_or_else(|| ParseError { location: self.loc(), message: format!("undeclared global '{name}'") })
    }

    fn parse_reg_list(&mut self) -> ParseResult<ArgList> {
        let mut args = ArgList::new();
        if self.peek() != &Tok::RParen {
            loop {
                args.push(self.expect_reg()?);
                if self.peek() == &Tok::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        Ok(args)
    }

    fn parse_module(&mut self) -> ParseResult<Module> {
        self.expect_keyword("module")?;
        let name = self.expect_ident()?;
        self.expect_newline()?;
        self.module = Module::new(name);

        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Ident(s) if s == "global" => self.parse_global()?,
                Tok::Ident(s) if s == "str" => self.parse_string()?,
                Tok::Ident(s) if s == "func" => self.parse_function()?,
                other => return err!(self.loc(), "expected 'global', 'str', or 'func', found {:?}", other),
            }
        }

        Ok(std::mem::take(&mut self.module))
    }

    fn parse_global(&mut self) -> ParseResult<()> {
        self.bump(); // "global"
        let name = self.expect_ident()?;
        self.expect(&Tok::Colon)?;
        let ty = self.parse_type()?;
        let init = if self.peek() == &Tok::Eq {
            self.bump();
            Some(self.expect_int()?)
        } else {
            None
        };
        self.expect_newline()?;
        self.module.declare_global(Global { name, ty, init, bytes: Vec::new() });
        Ok(())
    }

    fn parse_string(&mut self) -> ParseResult<()> {
        self.bump(); // "str"
        let written_label = self.expect_ident()?;
        self.expect(&Tok::Eq)?;
        let value = self.expect_str()?;
        self.expect_newline()?;
        let id = self.module.intern_string(value);
        self.string_labels.insert(written_label, id);
        Ok(())
    }

    fn parse_function(&mut self) -> ParseResult<()> {
        self.bump(); // "func"
        let name = self.expect_ident()?;
        self.expect(&Tok::LParen)?;
        let mut params = Vec::new();
        if self.peek() != &Tok::RParen {
            loop {
                let pname = self.expect_ident()?;
                self.expect(&Tok::Colon)?;
                let pty = self.parse_type()?;
                params.push((pname, pty));
                if self.peek() == &Tok::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&Tok::RParen)?;
        self.expect(&Tok::Arrow)?;
        let ret_type = self.parse_type()?;
        self.expect_newline()?;

        let mut f = Function::new(name, ret_type);
        for (pname, pty) in params {
            let reg = Reg::new(f.params.len() + 1);
            f.params.push(Param { name: pname, ty: pty, reg });
        }

        let mut attrs = FunctionAttrs::default();
        let mut call_conv = None;
        let mut smc_params = Vec::new();
        while self.peek() == &Tok::At {
            self.bump();
            let attr = self.expect_ident()?;
            match attr.as_str() {
                "smc" => attrs.smc_enabled = true,
                "recursive" => attrs.recursive = true,
                "interrupt" => attrs.interrupt = true,
                "abi" => attrs.abi_explicit = true,
                "callconv" => {
                    let value = self.expect_ident()?;
                    call_conv = Some(match value.as_str() {
                        "traditional" => CallConvHint::Traditional,
                        "true_smc" => CallConvHint::TrueSmc,
                        "interrupt" => CallConvHint::Interrupt,
                        other => return err!(self.loc(), "unknown calling convention '{other}'"),
                    });
                }
                "smcparam" => {
                    let pname = self.expect_ident()?;
                    let reg = self.expect_reg()?;
                    let anchor_inst = if self.at_ident_inst() {
                        let idx = self.expect_ident()?;
                        Some(InstId::new(idx.trim_start_matches("inst").parse().map_err(|_| ParseError {
                            location: self.loc(),
                            message: format!("malformed instruction reference '{idx}'"),
                        })?))
                    } else {
                        None
                    };
                    smc_params.push(SmcParam { name: pname, reg, anchor_inst });
                }
                other => return err!(self.loc(), "unknown attribute '@{other}'"),
            }
            self.expect_newline()?;
        }
        f.attrs = attrs;
        f.call_conv = call_conv;
        f.smc_params = smc_params;

        if self.at_keyword("locals") {
            self.bump();
            self.expect(&Tok::Colon)?;
            self.expect_newline()?;
            while self.at_keyword("local") {
                self.bump();
                let lname = self.expect_ident()?;
                self.expect(&Tok::Colon)?;
                let lty = self.parse_type()?;
                self.expect(&Tok::Eq)?;
                let reg = self.expect_reg()?;
                self.expect_newline()?;
                f.locals.push(Local { name: lname, ty: lty, reg, source_loc: None });
            }
        }

        if self.at_keyword("instructions") {
            self.bump();
            self.expect(&Tok::Colon)?;
            self.expect_newline()?;
            while !matches!(self.peek(), Tok::Eof)
                && !self.at_keyword("func")
                && !self.at_keyword("global")
                && !self.at_keyword("str")
            {
                f.instructions.push(self.parse_instruction_line()?);
            }
        }

        self.module.declare_function(f);
        Ok(())
    }

    fn at_ident_inst(&self) -> bool {
        matches!(self.peek(), Tok::Ident(s) if s.starts_with("inst"))
    }

    fn parse_instruction_line(&mut self) -> ParseResult<minz_ir::Instruction> {
        let line_number = self.loc().line_number;

        // A bare `.L<n>:` line defines a label.
        if let Tok::Label(n) = self.peek().clone() {
            if self.peek_at(1) == &Tok::Colon {
                self.bump();
                self.bump();
                self.expect_newline()?;
                let mut inst = minz_ir::Instruction::new(Opcode::Label { label: LabelId::new(n as usize) });
                self.attach_comment(&mut inst, line_number);
                return Ok(inst);
            }
        }

        let dst = if matches!(self.peek(), Tok::Reg(_)) && self.peek_at(1) == &Tok::Eq {
            let r = self.expect_reg()?;
            self.bump(); // '='
            Some(r)
        } else {
            None
        };

        let opcode = if let Some(dst) = dst {
            self.parse_dst_opcode(dst)?
        } else {
            self.parse_no_dst_opcode()?
        };

        let mut inst = minz_ir::Instruction::new(opcode);
        if self.at_keyword("size") {
            self.bump();
            inst.size = Some(self.expect_u32()?);
        }
        self.expect_newline()?;
        self.attach_comment(&mut inst, line_number);
        Ok(inst)
    }

    fn attach_comment(&self, inst: &mut minz_ir::Instruction, line_number: usize) {
        if let Some(c) = self.line_comments.get(&line_number) {
            inst.comment = Some(c.clone());
        }
    }

    fn parse_dst_opcode(&mut self, dst: Reg) -> ParseResult<Opcode> {
        if let Tok::Ident(kw) = self.peek().clone() {
            match kw.as_str() {
                "const" => {
                    self.bump();
                    return Ok(Opcode::LoadConst { dst, imm: self.expect_int()? });
                }
                "move" => {
                    self.bump();
                    return Ok(Opcode::Move { dst, src: self.expect_reg()? });
                }
                "load" => {
                    self.bump();
                    return Ok(Opcode::LoadVar { dst, sym: self.parse_symbol()? });
                }
                "addr" => {
                    self.bump();
                    return Ok(Opcode::LoadAddr { dst, sym: self.parse_symbol()? });
                }
                "param" => {
                    self.bump();
                    return Ok(Opcode::LoadParam { dst, index: self.expect_u16()? });
                }
                "loadptr" => {
                    self.bump();
                    let src_addr = self.expect_reg()?;
                    self.expect(&Tok::Comma)?;
                    let size = self.expect_u32()?;
                    return Ok(Opcode::LoadPtr { dst, src_addr, size });
                }
                "neg" => {
                    self.bump();
                    return Ok(Opcode::Neg { dst, src: self.expect_reg()? });
                }
                "not" => {
                    self.bump();
                    return Ok(Opcode::Not { dst, src: self.expect_reg()? });
                }
                "inc" => {
                    self.bump();
                    return Ok(Opcode::Inc { dst, src: self.expect_reg()? });
                }
                "dec" => {
                    self.bump();
                    return Ok(Opcode::Dec { dst, src: self.expect_reg()? });
                }
                "call" => {
                    self.bump();
                    let sym = self.parse_symbol()?;
                    self.expect(&Tok::LParen)?;
                    let args = self.parse_reg_list()?;
                    self.expect(&Tok::RParen)?;
                    return Ok(Opcode::Call { dst, sym, args });
                }
                "callind" => {
                    self.bump();
                    let fptr = self.expect_reg()?;
                    self.expect(&Tok::LParen)?;
                    let args = self.parse_reg_list()?;
                    self.expect(&Tok::RParen)?;
                    return Ok(Opcode::CallIndirect { dst, fptr, args });
                }
                "loadbits" => {
                    self.bump();
                    let src = self.expect_reg()?;
                    self.expect(&Tok::Comma)?;
                    let offset = self.expect_u32()?;
                    self.expect(&Tok::Comma)?;
                    let width = self.expect_u32()?;
                    return Ok(Opcode::LoadBitField { dst, src, offset, width });
                }
                "storebits" => {
                    self.bump();
                    let src_value = self.expect_reg()?;
                    self.expect(&Tok::Comma)?;
                    let offset = self.expect_u32()?;
                    self.expect(&Tok::Comma)?;
                    let width = self.expect_u32()?;
                    return Ok(Opcode::StoreBitField { dst_container: dst, src_value, offset, width });
                }
                _ => {}
            }
        }

        // Otherwise: `<reg> = <reg> <op> <reg>` binary infix form.
        let lhs = self.expect_reg()?;
        let op = self.bump();
        let rhs = self.expect_reg()?;
        let opcode = match op {
            Tok::Plus => Opcode::Add { dst, lhs, rhs },
            Tok::Minus => Opcode::Sub { dst, lhs, rhs },
            Tok::Star => Opcode::Mul { dst, lhs, rhs },
            Tok::Slash => Opcode::Div { dst, lhs, rhs },
            Tok::Percent => Opcode::Mod { dst, lhs, rhs },
            Tok::Amp => Opcode::And { dst, lhs, rhs },
            Tok::Pipe => Opcode::Or { dst, lhs, rhs },
            Tok::Caret => Opcode::Xor { dst, lhs, rhs },
            Tok::Shl => Opcode::Shl { dst, lhs, rhs },
            Tok::Shr => Opcode::Shr { dst, lhs, rhs },
            Tok::EqEq => Opcode::Eq { dst, lhs, rhs },
            Tok::Ne => Opcode::Ne { dst, lhs, rhs },
            Tok::Lt => Opcode::Lt { dst, lhs, rhs },
            Tok::Le => Opcode::Le { dst, lhs, rhs },
            Tok::Gt => Opcode::Gt { dst, lhs, rhs },
            Tok::Ge => Opcode::Ge { dst, lhs, rhs },
            other => return err!(self.loc(), "expected a binary operator, found {:?}", other),
        };
        Ok(opcode)
    }

    fn parse_no_dst_opcode(&mut self) -> ParseResult<Opcode> {
        let kw = self.expect_ident()?;
        match kw.as_str() {
            "store" => {
                let sym = self.parse_symbol()?;
                self.expect(&Tok::Comma)?;
                let src = self.expect_reg()?;
                Ok(Opcode::StoreVar { sym, src })
            }
            "storeptr" => {
                let src_addr = self.expect_reg()?;
                self.expect(&Tok::Comma)?;
                let src_value = self.expect_reg()?;
                self.expect(&Tok::Comma)?;
                let size = self.expect_u32()?;
                Ok(Opcode::StorePtr { src_addr, src_value, size })
            }
            "jump" => Ok(Opcode::Jump { target: self.expect_label()? }),
            "jumpif" => {
                let cond = self.expect_reg()?;
                self.expect(&Tok::Comma)?;
                Ok(Opcode::JumpIf { cond, target: self.expect_label()? })
            }
            "jumpifnot" => {
                let cond = self.expect_reg()?;
                self.expect(&Tok::Comma)?;
                Ok(Opcode::JumpIfNot { cond, target: self.expect_label()? })
            }
            "return" => {
                if self.peek() == &Tok::Newline {
                    Ok(Opcode::Return { src: None })
                } else {
                    Ok(Opcode::Return { src: Some(self.expect_reg()?) })
                }
            }
            "print" => Ok(Opcode::Print { src: self.expect_reg()? }),
            "printu8" => Ok(Opcode::PrintU8 { src: self.expect_reg()? }),
            "printu16" => Ok(Opcode::PrintU16 { src: self.expect_reg()? }),
            "printstr" => Ok(Opcode::PrintStringDirect { sym: self.parse_symbol()? }),
            "halt" => Ok(Opcode::Halt),
            "nop" => Ok(Opcode::Nop),
            "asm" => Ok(Opcode::Asm { text: self.expect_str()? }),
            "emit" => Ok(Opcode::Emit { text: self.expect_str()? }),
            other => err!(self.loc(), "unknown instruction '{other}'"),
        }
    }
}
