//! IR-structural errors (spec §3.6 invariants, §7 "IR structural" dimension).

use crate::entities::AnyEntity;
use thiserror::Error;

/// A broken invariant from spec §3.6, reported with the offending pass name
/// and entity, matching the teacher's `VerifierError` (treated as an
/// internal assertion; compilation aborts — spec §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("[{pass}] invariant violated at {location}: {message}")]
pub struct IrError {
    pub pass: &'static str,
    pub location: AnyEntity,
    pub message: String,
}

impl IrError {
    pub fn new(pass: &'static str, location: AnyEntity, message: impl Into<String>) -> Self {
        IrError { pass, location, message: message.into() }
    }
}

pub type IrResult<T> = Result<T, IrError>;
