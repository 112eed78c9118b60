//! VM runtime errors (spec §4.3, §7 "VM runtime" dimension).

use minz_ir::{FuncId, Reg};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("division by zero in function {0}")]
    DivisionByZero(String),

    #[error("modulo by zero in function {0}")]
    ModuloByZero(String),

    #[error("memory access out of range: address {addr} (memory size {size})")]
    MemoryOutOfRange { addr: u32, size: u32 },

    #[error("instruction budget of {budget} exceeded in function {func}")]
    BudgetExceeded { func: String, budget: u64 },

    #[error("external symbol required: {0}")]
    ExternalSymbolRequired(String),

    #[error("register {0} read before it was written in function {1}")]
    UninitializedRegister(Reg, String),

    #[error("call stack underflow returning from function {0}")]
    CallStackUnderflow(String),

    #[error("unknown function id {0:?}")]
    UnknownFunction(FuncId),
}

pub type VmResult<T> = Result<T, VmError>;

/// The outcome of `ExecuteCtie` (spec §4.3): either a folded constant or a
/// reason the call could not be resolved at compile time. Unlike `VmError`,
/// this is not itself an error — CTIE recovers from it locally (spec §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolvable {
    ExternalCall(String),
    AssemblyBlock,
    UnknownGlobal(String),
    IoOperation,
    Budget,
    NoReturnValue,
    Error(VmError),
}
