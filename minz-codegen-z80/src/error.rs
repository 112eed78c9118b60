//! Backend errors (spec §4.5, §7 "backend codegen" dimension).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error(transparent)]
    Ir(#[from] minz_ir::IrError),

    #[error("function {0} is marked @interrupt and @smc at once, which has no calling convention")]
    InterruptAndSmc(String),

    #[error("function {function} has an SMC anchor for parameter '{param}' with no recorded use site, but the parameter is read by instruction {inst}")]
    AnchorMismatch { function: String, param: String, inst: String },

    #[error("emit error: {0}")]
    Emit(String),
}

pub type BackendResult<T> = Result<T, BackendError>;
