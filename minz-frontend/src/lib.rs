//! The typed-AST contract the frontend (an external, incremental-parser-based
//! collaborator — spec §1, §6.1) hands to the semantic analyzer. This crate
//! defines the shape of that contract only; it contains no parser.

pub mod ast;

pub use ast::*;
