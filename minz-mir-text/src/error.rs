//! `Location`, `ParseError`, `ParseResult`, and the `err!` macro, in the
//! same shape as the teacher's own textual-IR reader crate.

#![macro_use]

use std::fmt;

/// The location of a token or error: a 1-based line number within the
/// source text (line 0 is reserved for "not from source text" errors,
/// matching the teacher's convention for command-line-supplied input).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.line_number == 0 {
            write!(f, "mir text: {}", self.message)
        } else {
            write!(f, "line {}: {}", self.location.line_number, self.message)
        }
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

macro_rules! err {
    ( $loc:expr, $msg:expr ) => {
        Err($crate::error::ParseError { location: $loc, message: $msg.to_string() })
    };
    ( $loc:expr, $fmt:expr, $( $arg:expr ),+ ) => {
        Err($crate::error::ParseError { location: $loc, message: format!( $fmt, $( $arg ),+ ) })
    };
}

pub(crate) use err;
