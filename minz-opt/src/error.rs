//! Optimizer-level errors (spec §7: "IR structural" dimension, raised by
//! any pass). Individual passes in this crate are designed not to produce
//! these in normal operation — CTIE failures are recovered locally per
//! spec §4.6 — but a structural check is run after the full pipeline to
//! catch a pass that broke an invariant it was supposed to preserve.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptError {
    #[error(transparent)]
    Ir(#[from] minz_ir::IrError),
}

pub type OptResult<T> = Result<T, OptError>;
