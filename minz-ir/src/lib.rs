//! The MinZ intermediate representation: the typed, register-based IR that
//! every other component in this workspace consumes or produces (spec §3).

pub mod config;
pub mod entities;
pub mod error;
pub mod function;
pub mod instruction;
pub mod module;
pub mod smc;
pub mod types;
pub mod verify;

pub use config::TargetConfig;
pub use entities::{AnyEntity, FuncId, GlobalId, LabelId, Reg, StringId};
pub use error::{IrError, IrResult};
pub use function::{CallConvHint, Function, FunctionAttrs, Local, Param, SourceLoc};
pub use instruction::{ArgList, Instruction, Opcode, Symbol};
pub use module::{Global, InternedString, Module};
pub use smc::{AnchorLabel, SmcParam};
pub use types::{BitField, BitStructDef, EnumDef, EnumVariant, FixedFormat, FunctionSig, StructDef, StructField, Type};
pub use verify::verify_module;
