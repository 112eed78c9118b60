//! Semantic diagnostics (spec §4.1 "Error conditions", §7).

use minz_frontend::Span;
use minz_ir::Type;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SemanticError {
    #[error("{0:?}: unknown name `{1}`")]
    UnknownName(Span, String),

    #[error("{0:?}: type mismatch: expected {1}, found {2}")]
    TypeMismatch(Span, Type, Type),

    #[error("{0:?}: ambiguous call to `{1}`: {2} overloads match")]
    AmbiguousOverload(Span, String, usize),

    #[error("{0:?}: no overload of `{1}` accepts the given argument types")]
    NoMatchingOverload(Span, String),

    #[error("{0:?}: duplicate definition of `{1}`")]
    DuplicateDefinition(Span, String),

    #[error("{0:?}: function `{1}` cannot be both recursive and self-modifying")]
    SmcRecursiveConflict(Span, String),

    #[error("{0:?}: interrupt function `{1}` cannot be called directly")]
    InterruptReferenced(Span, String),

    #[error("{0:?}: invalid cast from {1} to {2}")]
    InvalidCast(Span, Type, Type),

    #[error("{0:?}: arity mismatch calling `{1}`: expected {2} arguments, found {3}")]
    ArityMismatch(Span, String, usize, usize),

    #[error("{0:?}: bit-struct `{1}` exceeds the 16-bit width limit ({2} bits)")]
    BitStructOverflow(Span, String, u32),

    #[error("{0:?}: constant {1} does not fit in {2}")]
    ConstantOverflow(Span, i64, Type),

    #[error("{0:?}: unknown type `{1}`")]
    UnknownType(Span, String),

    #[error("{0:?}: {1}")]
    UserError(Span, String),

    #[error("{0:?}: compile-time assertion failed: {1}")]
    AssertionFailed(Span, String),

    #[error("{0:?}: unsupported in this build: {1}")]
    Unsupported(Span, &'static str),
}

pub type SemanticResult<T> = Result<T, SemanticError>;

/// A collection of diagnostics accumulated while analyzing one module,
/// matching spec §7's policy: a pass surfaces as many diagnostics as it can
/// rather than stopping at the first.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    pub errors: Vec<SemanticError>,
}

impl Diagnostics {
    pub fn push(&mut self, err: SemanticError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} semantic error(s)", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n  - {e}")?;
        }
        Ok(())
    }
}
