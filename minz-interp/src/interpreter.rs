//! The MIR interpreter (spec §4.3): `Run()` and `ExecuteCtie()` over a
//! built `Module`.
//!
//! Frames are modeled with native Rust call recursion rather than an
//! explicit stack of frame structs: each `call_function` invocation owns
//! an isolated register map, the return address is implicit in the Rust
//! call stack, and the destination register is bound by the caller after
//! the callee returns. This gives the same save/restore contract spec §4.3
//! describes with far less bookkeeping, at the cost of recursion depth
//! being bounded by the host stack rather than a configurable MIR-level
//! limit — acceptable since the instruction budget already bounds runaway
//! recursion long before the host stack would.

use crate::config::VmConfig;
use crate::error::{Unresolvable, VmError, VmResult};
use minz_ir::{FuncId, GlobalId, Module, Opcode, Reg, StringId, Symbol, Type};
use std::collections::HashMap;

/// A fault raised mid-execution. `Hard` always propagates out of `run()`.
/// `Soft` is only ever produced in CTIE mode (purity violation or a
/// runtime error demoted to "recovered locally" per spec §7).
enum Fault {
    Hard(VmError),
    Soft(Unresolvable),
}

impl From<VmError> for Fault {
    fn from(e: VmError) -> Self {
        Fault::Hard(e)
    }
}

pub struct RunResult {
    pub exit_code: i64,
    pub output: String,
}

/// Per-call register file. Backed by a `HashMap` rather than a `Vec`
/// because MIR register numbers are dense but a function's max register is
/// only known after the whole body is lowered; a map avoids a separate
/// bookkeeping pass just to size a vector.
#[derive(Default)]
struct RegisterFile(HashMap<Reg, i64>);

impl RegisterFile {
    fn get(&self, r: Reg) -> i64 {
        if r.is_unused() {
            0
        } else {
            self.0.get(&r).copied().unwrap_or(0)
        }
    }

    fn set(&mut self, r: Reg, v: i64) {
        if !r.is_unused() {
            self.0.insert(r, v);
        }
    }
}

pub struct Vm<'m> {
    module: &'m Module,
    config: VmConfig,
    memory: Vec<u8>,
    global_addr: HashMap<GlobalId, u32>,
    string_addr: HashMap<StringId, u32>,
    /// Synthetic, deterministic addresses for functions so `LoadAddr` on a
    /// function symbol yields a stable integer even though the VM has no
    /// real machine-code layout (spec §4.3 models data memory, not code).
    func_addr: HashMap<FuncId, u32>,
    addr_to_func: HashMap<u32, FuncId>,
    output: String,
    breakpoints: std::collections::HashSet<(FuncId, usize)>,
    trace: bool,
}

impl<'m> Vm<'m> {
    pub fn new(module: &'m Module, config: VmConfig) -> VmResult<Self> {
        let mut memory = vec![0u8; config.memory_size as usize];
        let mut global_addr = HashMap::new();
        let mut cursor: u32 = 0;

        for (id, g) in module.globals() {
            let size = g.ty.byte_size().max(1);
            if cursor as usize + size as usize > memory.len() {
                return Err(VmError::MemoryOutOfRange { addr: cursor, size });
            }
            let bytes = if !g.bytes.is_empty() {
                g.bytes.clone()
            } else {
                let v = g.init.unwrap_or(0);
                v.to_le_bytes()[..size as usize].to_vec()
            };
            memory[cursor as usize..cursor as usize + bytes.len().min(size as usize)]
                .copy_from_slice(&bytes[..bytes.len().min(size as usize)]);
            global_addr.insert(id, cursor);
            cursor += size;
        }

        let mut string_addr = HashMap::new();
        for (id, s) in module.strings() {
            let bytes = s.value.as_bytes();
            let len = bytes.len() + 1;
            if cursor as usize + len > memory.len() {
                return Err(VmError::MemoryOutOfRange { addr: cursor, size: len as u32 });
            }
            memory[cursor as usize..cursor as usize + bytes.len()].copy_from_slice(bytes);
            memory[cursor as usize + bytes.len()] = 0;
            string_addr.insert(id, cursor);
            cursor += len as u32;
        }

        let mut func_addr = HashMap::new();
        let mut addr_to_func = HashMap::new();
        for (i, id) in module.function_ids().into_iter().enumerate() {
            let addr = 0xF000u32.wrapping_add(i as u32);
            func_addr.insert(id, addr);
            addr_to_func.insert(addr, id);
        }

        Ok(Vm {
            module,
            config,
            memory,
            global_addr,
            string_addr,
            func_addr,
            addr_to_func,
            output: String::new(),
            breakpoints: std::collections::HashSet::new(),
            trace: false,
        })
    }

    pub fn set_trace(&mut self, on: bool) {
        self.trace = on;
    }

    pub fn add_breakpoint(&mut self, func: FuncId, instruction_index: usize) {
        self.breakpoints.insert((func, instruction_index));
    }

    /// Dumps the live byte range `[addr, addr+len)` for debugging (spec
    /// §4.3: "memory dump").
    pub fn memory_dump(&self, addr: u32, len: u32) -> &[u8] {
        let start = addr as usize;
        let end = (start + len as usize).min(self.memory.len());
        &self.memory[start..end]
    }

    /// Starts execution at `main`, returning its return value as an exit
    /// code plus everything written via `Print*`/`Emit`.
    pub fn run(&mut self) -> VmResult<RunResult> {
        let main_id = self
            .module
            .function_by_name("main")
            .ok_or_else(|| VmError::ExternalSymbolRequired("main".into()))?;
        let mut budget = self.config.instruction_budget;
        match self.call_function(main_id, &[], &mut budget, false) {
            Ok(v) => Ok(RunResult { exit_code: v.unwrap_or(0), output: std::mem::take(&mut self.output) }),
            Err(Fault::Hard(e)) => Err(e),
            Err(Fault::Soft(_)) => unreachable!("purity checks are only active in CTIE mode"),
        }
    }

    /// Runs a single function with caller-supplied constant arguments
    /// (spec §4.3). Uses its own, smaller instruction budget regardless of
    /// `self.config`, matching spec §8's stated CTIE fuel default.
    pub fn execute_ctie(&mut self, func: FuncId, args: &[i64]) -> Result<i64, Unresolvable> {
        let mut budget = crate::config::VmConfig::for_ctie().instruction_budget;
        let saved_output_len = self.output.len();
        match self.call_function(func, args, &mut budget, true) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => {
                self.output.truncate(saved_output_len);
                Err(Unresolvable::NoReturnValue)
            }
            Err(Fault::Soft(u)) => {
                self.output.truncate(saved_output_len);
                Err(u)
            }
            Err(Fault::Hard(e)) => {
                self.output.truncate(saved_output_len);
                Err(Unresolvable::Error(e))
            }
        }
    }

    fn call_function(
        &mut self,
        id: FuncId,
        args: &[i64],
        budget: &mut u64,
        ctie: bool,
    ) -> Result<Option<i64>, Fault> {
        let func = self.module.function(id);
        let mut regs = RegisterFile::default();
        for (param, arg) in func.params.iter().zip(args.iter()) {
            regs.set(param.reg, *arg);
        }

        // Precompute label -> instruction-index for this call; cheap
        // relative to the instruction budget and keeps `Function` itself
        // free of cached derived state.
        let mut label_index = HashMap::new();
        for (i, inst) in func.instructions.iter().enumerate() {
            if let Opcode::Label { label } = inst.opcode {
                label_index.insert(label, i);
            }
        }

        let mut pc: usize = 0;
        loop {
            let inst = func.instructions.get(pc).ok_or_else(|| {
                Fault::Hard(VmError::CallStackUnderflow(func.name.clone()))
            })?;

            if self.breakpoints.contains(&(id, pc)) && self.trace {
                log::trace!("breakpoint hit: {}@{}", func.name, pc);
            }
            if self.trace {
                log::trace!("{}@{}: {:?}", func.name, pc, inst.opcode);
            }

            if *budget == 0 {
                if !ctie {
                    log::warn!("{}: instruction budget of {} exhausted", func.name, self.config.instruction_budget);
                }
                return Err(if ctie {
                    Fault::Soft(Unresolvable::Budget)
                } else {
                    Fault::Hard(VmError::BudgetExceeded { func: func.name.clone(), budget: self.config.instruction_budget })
                });
            }
            *budget -= 1;

            match &inst.opcode {
                Opcode::LoadConst { dst, imm } => regs.set(*dst, *imm),
                Opcode::Move { dst, src } => regs.set(*dst, regs.get(*src)),

                Opcode::LoadVar { dst, sym } => {
                    let v = self.load_symbol(sym, &func.name, ctie)?;
                    regs.set(*dst, v);
                }
                Opcode::StoreVar { sym, src } => {
                    self.store_symbol(sym, regs.get(*src), ctie)?;
                }
                Opcode::LoadAddr { dst, sym } => {
                    let addr = self.symbol_address(sym, &func.name, ctie)?;
                    regs.set(*dst, addr as i64);
                }
                Opcode::LoadParam { dst, index } => {
                    let v = args.get(*index as usize).copied().unwrap_or(0);
                    regs.set(*dst, v);
                }
                Opcode::LoadPtr { dst, src_addr, size } => {
                    let addr = regs.get(*src_addr) as u32;
                    let v = self.read_mem(addr, *size)?;
                    regs.set(*dst, v);
                }
                Opcode::StorePtr { src_addr, src_value, size } => {
                    let addr = regs.get(*src_addr) as u32;
                    self.write_mem(addr, *size, regs.get(*src_value))?;
                }

                Opcode::Add { dst, lhs, rhs } => regs.set(*dst, regs.get(*lhs).wrapping_add(regs.get(*rhs))),
                Opcode::Sub { dst, lhs, rhs } => regs.set(*dst, regs.get(*lhs).wrapping_sub(regs.get(*rhs))),
                Opcode::Mul { dst, lhs, rhs } => regs.set(*dst, regs.get(*lhs).wrapping_mul(regs.get(*rhs))),
                Opcode::Div { dst, lhs, rhs } => {
                    let rv = regs.get(*rhs);
                    if rv == 0 {
                        return Err(divzero(ctie, VmError::DivisionByZero(func.name.clone())));
                    }
                    regs.set(*dst, regs.get(*lhs).wrapping_div(rv));
                }
                Opcode::Mod { dst, lhs, rhs } => {
                    let rv = regs.get(*rhs);
                    if rv == 0 {
                        return Err(divzero(ctie, VmError::ModuloByZero(func.name.clone())));
                    }
                    regs.set(*dst, regs.get(*lhs).wrapping_rem(rv));
                }
                Opcode::Neg { dst, src } => regs.set(*dst, -regs.get(*src)),
                Opcode::Inc { dst, src } => regs.set(*dst, regs.get(*src).wrapping_add(1)),
                Opcode::Dec { dst, src } => regs.set(*dst, regs.get(*src).wrapping_sub(1)),

                Opcode::And { dst, lhs, rhs } => regs.set(*dst, regs.get(*lhs) & regs.get(*rhs)),
                Opcode::Or { dst, lhs, rhs } => regs.set(*dst, regs.get(*lhs) | regs.get(*rhs)),
                Opcode::Xor { dst, lhs, rhs } => regs.set(*dst, regs.get(*lhs) ^ regs.get(*rhs)),
                Opcode::Not { dst, src } => regs.set(*dst, !regs.get(*src)),
                Opcode::Shl { dst, lhs, rhs } => regs.set(*dst, regs.get(*lhs).wrapping_shl(regs.get(*rhs) as u32)),
                Opcode::Shr { dst, lhs, rhs } => regs.set(*dst, regs.get(*lhs).wrapping_shr(regs.get(*rhs) as u32)),

                Opcode::Eq { dst, lhs, rhs } => regs.set(*dst, (regs.get(*lhs) == regs.get(*rhs)) as i64),
                Opcode::Ne { dst, lhs, rhs } => regs.set(*dst, (regs.get(*lhs) != regs.get(*rhs)) as i64),
                Opcode::Lt { dst, lhs, rhs } => regs.set(*dst, (regs.get(*lhs) < regs.get(*rhs)) as i64),
                Opcode::Le { dst, lhs, rhs } => regs.set(*dst, (regs.get(*lhs) <= regs.get(*rhs)) as i64),
                Opcode::Gt { dst, lhs, rhs } => regs.set(*dst, (regs.get(*lhs) > regs.get(*rhs)) as i64),
                Opcode::Ge { dst, lhs, rhs } => regs.set(*dst, (regs.get(*lhs) >= regs.get(*rhs)) as i64),

                Opcode::Jump { target } => {
                    pc = *label_index.get(target).expect("verified module: target exists");
                    continue;
                }
                Opcode::JumpIf { cond, target } => {
                    if regs.get(*cond) != 0 {
                        pc = *label_index.get(target).expect("verified module: target exists");
                        continue;
                    }
                }
                Opcode::JumpIfNot { cond, target } => {
                    if regs.get(*cond) == 0 {
                        pc = *label_index.get(target).expect("verified module: target exists");
                        continue;
                    }
                }
                Opcode::Label { .. } => {}
                Opcode::Return { src } => {
                    return Ok(src.map(|r| regs.get(r)));
                }

                Opcode::Call { dst, sym, args: call_args } => {
                    let Symbol::Function(name) = sym else {
                        unreachable!("Call always carries Symbol::Function");
                    };
                    let callee = self.module.function_by_name(name);
                    let Some(callee_id) = callee else {
                        return Err(if ctie {
                            Fault::Soft(Unresolvable::ExternalCall(name.clone()))
                        } else {
                            Fault::Hard(VmError::ExternalSymbolRequired(name.clone()))
                        });
                    };
                    let arg_vals: Vec<i64> = call_args.iter().map(|r| regs.get(*r)).collect();
                    let result = self.call_function(callee_id, &arg_vals, budget, ctie)?;
                    regs.set(*dst, result.unwrap_or(0));
                }
                Opcode::CallIndirect { dst, fptr, args: call_args } => {
                    let addr = regs.get(*fptr) as u32;
                    let Some(callee_id) = self.addr_to_func.get(&addr).copied() else {
                        return Err(if ctie {
                            Fault::Soft(Unresolvable::ExternalCall("<indirect>".into()))
                        } else {
                            Fault::Hard(VmError::ExternalSymbolRequired("<indirect>".into()))
                        });
                    };
                    if ctie {
                        // An indirect call's target is not known to be pure
                        // at optimization time; CTIE never follows it.
                        return Err(Fault::Soft(Unresolvable::ExternalCall("<indirect>".into())));
                    }
                    let arg_vals: Vec<i64> = call_args.iter().map(|r| regs.get(*r)).collect();
                    let result = self.call_function(callee_id, &arg_vals, budget, ctie)?;
                    regs.set(*dst, result.unwrap_or(0));
                }

                Opcode::LoadBitField { dst, src, offset, width } => {
                    let v = regs.get(*src);
                    let mask = (1i64 << *width) - 1;
                    regs.set(*dst, (v >> *offset) & mask);
                }
                Opcode::StoreBitField { dst_container, src_value, offset, width } => {
                    let mask = (1i64 << *width) - 1;
                    let container = regs.get(*dst_container);
                    let cleared = container & !(mask << *offset);
                    regs.set(*dst_container, cleared | ((regs.get(*src_value) & mask) << *offset));
                }

                Opcode::Print { src } => {
                    if ctie {
                        return Err(Fault::Soft(Unresolvable::IoOperation));
                    }
                    self.output.push_str(&regs.get(*src).to_string());
                }
                Opcode::PrintU8 { src } => {
                    if ctie {
                        return Err(Fault::Soft(Unresolvable::IoOperation));
                    }
                    self.output.push_str(&((regs.get(*src) as u8).to_string()));
                }
                Opcode::PrintU16 { src } => {
                    if ctie {
                        return Err(Fault::Soft(Unresolvable::IoOperation));
                    }
                    self.output.push_str(&((regs.get(*src) as u16).to_string()));
                }
                Opcode::PrintStringDirect { sym } => {
                    if ctie {
                        return Err(Fault::Soft(Unresolvable::IoOperation));
                    }
                    if let Symbol::String(id) = sym {
                        self.output.push_str(&self.module.string(*id).value);
                    }
                }
                Opcode::Halt => {
                    if ctie {
                        return Err(Fault::Soft(Unresolvable::IoOperation));
                    }
                    return Ok(None);
                }
                Opcode::Nop => {}
                Opcode::Asm { .. } => {
                    if ctie {
                        return Err(Fault::Soft(Unresolvable::AssemblyBlock));
                    }
                    // The VM has no assembler backend; `Asm` is a no-op at
                    // the MIR level outside compile-time evaluation.
                }
                Opcode::Emit { text } => {
                    // Allowed under CTIE: spec §3.4 describes `Emit` as
                    // accumulating output during CTIE/@minz specifically.
                    self.output.push_str(text);
                }
            }

            pc += 1;
        }
    }

    fn load_symbol(&self, sym: &Symbol, func_name: &str, ctie: bool) -> Result<i64, Fault> {
        match sym {
            Symbol::Global(id) => {
                let g = self.module.global(*id);
                let addr = *self.global_addr.get(id).expect("global laid out at construction");
                let size = g.ty.byte_size().max(1);
                let raw = self.read_mem(addr, size).map_err(Fault::Hard)?;
                Ok(if g.ty.is_signed() { sign_extend(raw, size) } else { raw })
            }
            Symbol::String(id) => Ok(*self.string_addr.get(id).expect("string laid out at construction") as i64),
            Symbol::Function(name) => {
                let id = self.module.function_by_name(name).ok_or_else(|| {
                    let e = VmError::ExternalSymbolRequired(name.clone());
                    if ctie { Fault::Soft(Unresolvable::UnknownGlobal(name.clone())) } else { Fault::Hard(e) }
                })?;
                Ok(*self.func_addr.get(&id).unwrap() as i64)
            }
            Symbol::Label(_) => Err(Fault::Hard(VmError::ExternalSymbolRequired(format!(
                "label symbol used as a value in {func_name}"
            )))),
        }
    }

    fn store_symbol(&mut self, sym: &Symbol, value: i64, ctie: bool) -> Result<(), Fault> {
        match sym {
            Symbol::Global(id) => {
                if ctie {
                    return Err(Fault::Soft(Unresolvable::UnknownGlobal(
                        self.module.global(*id).name.clone(),
                    )));
                }
                let g = self.module.global(*id);
                let addr = *self.global_addr.get(id).expect("global laid out at construction");
                let size = g.ty.byte_size().max(1);
                self.write_mem(addr, size, value).map_err(Fault::Hard)
            }
            _ => Err(Fault::Hard(VmError::ExternalSymbolRequired(
                "StoreVar target must be a global".into(),
            ))),
        }
    }

    fn symbol_address(&self, sym: &Symbol, func_name: &str, ctie: bool) -> Result<u32, Fault> {
        match sym {
            Symbol::Global(id) => Ok(*self.global_addr.get(id).expect("laid out")),
            Symbol::String(id) => Ok(*self.string_addr.get(id).expect("laid out")),
            Symbol::Function(name) => {
                let id = self.module.function_by_name(name).ok_or_else(|| {
                    let e = VmError::ExternalSymbolRequired(name.clone());
                    if ctie { Fault::Soft(Unresolvable::UnknownGlobal(name.clone())) } else { Fault::Hard(e) }
                })?;
                Ok(*self.func_addr.get(&id).unwrap())
            }
            Symbol::Label(_) => Err(Fault::Hard(VmError::ExternalSymbolRequired(format!(
                "label symbol used as an address in {func_name}"
            )))),
        }
    }

    fn read_mem(&self, addr: u32, size: u32) -> VmResult<i64> {
        let start = addr as usize;
        let end = start + size as usize;
        if end > self.memory.len() {
            return Err(VmError::MemoryOutOfRange { addr, size });
        }
        let mut buf = [0u8; 8];
        buf[..size as usize].copy_from_slice(&self.memory[start..end]);
        Ok(i64::from_le_bytes(buf))
    }

    fn write_mem(&mut self, addr: u32, size: u32, value: i64) -> VmResult<()> {
        let start = addr as usize;
        let end = start + size as usize;
        if end > self.memory.len() {
            return Err(VmError::MemoryOutOfRange { addr, size });
        }
        let bytes = value.to_le_bytes();
        self.memory[start..end].copy_from_slice(&bytes[..size as usize]);
        Ok(())
    }
}

fn divzero(ctie: bool, e: VmError) -> Fault {
    if ctie {
        Fault::Soft(Unresolvable::Error(e))
    } else {
        Fault::Hard(e)
    }
}

fn sign_extend(raw: i64, size: u32) -> i64 {
    let bits = size * 8;
    if bits >= 64 {
        return raw;
    }
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Function, Instruction, Module, Opcode};

    fn try_init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn make_add_module() -> (Module, FuncId) {
        let mut m = Module::new("p");
        let mut f = Function::new("m_add2$u16$u16", Type::UInt(16));
        let a = f.add_param("a", Type::UInt(16));
        let b = f.add_param("b", Type::UInt(16));
        let r = f.alloc_reg();
        f.push(Instruction::new(Opcode::Add { dst: r, lhs: a, rhs: b }));
        f.push(Instruction::new(Opcode::Return { src: Some(r) }));
        let id = m.declare_function(f);
        (m, id)
    }

    #[test]
    fn ctie_folds_pure_function() {
        let (m, id) = make_add_module();
        let mut vm = Vm::new(&m, VmConfig::for_ctie()).unwrap();
        assert_eq!(vm.execute_ctie(id, &[2, 3]), Ok(5));
    }

    #[test]
    fn run_executes_main_and_returns_exit_code() {
        try_init_logger();
        let mut m = Module::new("p");
        let mut main = Function::new("main", Type::UInt(16));
        let r = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadConst { dst: r, imm: 42 }));
        main.push(Instruction::new(Opcode::Return { src: Some(r) }));
        m.declare_function(main);
        let mut vm = Vm::new(&m, VmConfig::for_run()).unwrap();
        let result = vm.run().unwrap();
        assert_eq!(result.exit_code, 42);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error_in_run_mode() {
        let mut m = Module::new("p");
        let mut main = Function::new("main", Type::UInt(16));
        let zero = main.alloc_reg();
        let one = main.alloc_reg();
        let r = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadConst { dst: zero, imm: 0 }));
        main.push(Instruction::new(Opcode::LoadConst { dst: one, imm: 1 }));
        main.push(Instruction::new(Opcode::Div { dst: r, lhs: one, rhs: zero }));
        main.push(Instruction::new(Opcode::Return { src: Some(r) }));
        m.declare_function(main);
        let mut vm = Vm::new(&m, VmConfig::for_run()).unwrap();
        assert!(vm.run().is_err());
    }

    #[test]
    fn ctie_refuses_functions_that_store_to_globals() {
        let mut m = Module::new("p");
        let g = m.declare_global(minz_ir::Global { name: "counter".into(), ty: Type::UInt(16), init: Some(0), bytes: vec![] });
        let mut f = Function::new("m_bump$u16", Type::UInt(16));
        let a = f.add_param("a", Type::UInt(16));
        f.push(Instruction::new(Opcode::StoreVar { sym: Symbol::Global(g), src: a }));
        f.push(Instruction::new(Opcode::Return { src: Some(a) }));
        let id = m.declare_function(f);
        let mut vm = Vm::new(&m, VmConfig::for_ctie()).unwrap();
        assert_eq!(vm.execute_ctie(id, &[7]), Err(Unresolvable::UnknownGlobal("counter".into())));
    }

    #[test]
    fn infinite_loop_in_run_mode_reports_budget_exceeded() {
        try_init_logger();
        let mut m = Module::new("p");
        let mut main = Function::new("main", Type::Void);
        let label = main.alloc_label();
        main.push(Instruction::new(Opcode::Label { label }));
        main.push(Instruction::new(Opcode::Jump { target: label }));
        m.declare_function(main);
        let mut vm = Vm::new(&m, VmConfig { memory_size: 65536, instruction_budget: 100 }).unwrap();
        assert!(matches!(vm.run(), Err(VmError::BudgetExceeded { .. })));
    }

    #[test]
    fn ctie_refuses_external_calls() {
        let mut m = Module::new("p");
        let mut f = Function::new("m_wraps$u16", Type::UInt(16));
        let a = f.add_param("a", Type::UInt(16));
        let r = f.alloc_reg();
        f.push(Instruction::new(Opcode::Call {
            dst: r,
            sym: Symbol::Function("does_not_exist".into()),
            args: smallvec::smallvec![a],
        }));
        f.push(Instruction::new(Opcode::Return { src: Some(r) }));
        let id = m.declare_function(f);
        let mut vm = Vm::new(&m, VmConfig::for_ctie()).unwrap();
        assert_eq!(
            vm.execute_ctie(id, &[1]),
            Err(Unresolvable::ExternalCall("does_not_exist".into()))
        );
    }
}

/// VM determinism (spec §8 Testable Property 2): `Run(M)` on the same
/// module and the same inputs must produce the same output and exit code
/// across repeated executions. Each iteration builds and runs a fresh
/// `Vm`, matching how two independent runs of the same program would be
/// compared in practice.
#[cfg(test)]
mod determinism_proptests {
    use super::*;
    use minz_ir::{Function, Instruction, Module, Opcode, Reg};
    use proptest::prelude::*;

    fn binary_opcode(tag: u8, dst: Reg, lhs: Reg, rhs: Reg) -> Opcode {
        match tag % 5 {
            0 => Opcode::Add { dst, lhs, rhs },
            1 => Opcode::Sub { dst, lhs, rhs },
            2 => Opcode::Mul { dst, lhs, rhs },
            3 => Opcode::And { dst, lhs, rhs },
            _ => Opcode::Xor { dst, lhs, rhs },
        }
    }

    fn build_module(seed: i64, ops: &[(u8, u8, u8)]) -> Module {
        let mut m = Module::new("p");
        let mut main = Function::new("main", Type::UInt(16));
        let first = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadConst { dst: first, imm: seed }));
        let mut available = vec![first];

        for &(tag, lhs_pick, rhs_pick) in ops {
            let lhs = available[lhs_pick as usize % available.len()];
            let rhs = available[rhs_pick as usize % available.len()];
            let dst = main.alloc_reg();
            main.push(Instruction::new(binary_opcode(tag, dst, lhs, rhs)));
            available.push(dst);
        }

        main.push(Instruction::new(Opcode::Return { src: available.last().copied() }));
        m.declare_function(main);
        m
    }

    proptest! {
        #[test]
        fn repeated_runs_of_the_same_module_agree(
            seed in -1000i64..1000,
            ops in prop::collection::vec((any::<u8>(), any::<u8>(), any::<u8>()), 0..12),
        ) {
            let m = build_module(seed, &ops);

            let first = Vm::new(&m, VmConfig::for_run()).unwrap().run().unwrap();
            let second = Vm::new(&m, VmConfig::for_run()).unwrap().run().unwrap();

            prop_assert_eq!(first.exit_code, second.exit_code);
            prop_assert_eq!(first.output, second.output);
        }
    }
}
