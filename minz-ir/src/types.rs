//! The closed type universe of spec.md §3.1.

use std::fmt;
use std::sync::Arc;

/// Fixed-point formats supported alongside the plain integer types. The name
/// encodes the split between integer and fractional bits; storage width is
/// the sum (rounded to a supported integer width).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedFormat {
    /// 8 integer bits, 8 fractional bits (16-bit storage).
    Q8_8,
    /// 0 integer bits, 8 fractional bits (8-bit storage).
    Q0_8,
    /// 0 integer bits, 16 fractional bits (16-bit storage).
    Q0_16,
    /// 16 integer bits, 8 fractional bits (24-bit storage).
    Q16_8,
    /// 8 integer bits, 16 fractional bits (24-bit storage).
    Q8_16,
}

impl FixedFormat {
    pub fn storage_bits(self) -> u32 {
        match self {
            FixedFormat::Q8_8 => 16,
            FixedFormat::Q0_8 => 8,
            FixedFormat::Q0_16 => 16,
            FixedFormat::Q16_8 => 24,
            FixedFormat::Q8_16 => 24,
        }
    }
}

impl fmt::Display for FixedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixedFormat::Q8_8 => "f8.8",
            FixedFormat::Q0_8 => "f.8",
            FixedFormat::Q0_16 => "f.16",
            FixedFormat::Q16_8 => "f16.8",
            FixedFormat::Q8_16 => "f8.16",
        };
        f.write_str(s)
    }
}

/// A named field of a `Struct` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

/// A named, optionally value-carrying enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: String,
    pub value: i64,
}

/// A single field within a bit-struct: a name and a bit width. Fields are
/// packed low-to-high in declaration order; total width must not exceed 16
/// bits (spec §3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
    pub name: String,
    pub width: u8,
}

/// The full closed type universe (spec §3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    UInt(u8),
    Int(u8),
    Fixed(FixedFormat),
    Bool,
    Void,
    Array(Box<Type>, u32),
    Ptr(Box<Type>),
    MutPtr(Box<Type>),
    Struct(Arc<StructDef>),
    Enum(Arc<EnumDef>),
    BitStruct(Arc<BitStructDef>),
    Function(Arc<FunctionSig>),
    /// `T?`: returns `T`, or signals failure via the carry-flag error
    /// channel (spec §3.1).
    Errorable(Box<Type>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub discriminant_width: u8,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitStructDef {
    pub name: String,
    pub fields: Vec<BitField>,
}

impl BitStructDef {
    /// Total width in bits of all fields; invariant-checked to be <= 16 at
    /// construction time by the analyzer (spec §3.1).
    pub fn total_width(&self) -> u32 {
        self.fields.iter().map(|f| f.width as u32).sum()
    }

    /// The bit offset of `name`, counting from the low bit, or `None` if no
    /// such field exists.
    pub fn field_offset(&self, name: &str) -> Option<(u32, u8)> {
        let mut offset = 0u32;
        for field in &self.fields {
            if field.name == name {
                return Some((offset, field.width));
            }
            offset += field.width as u32;
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Type {
    /// Byte size of the type's in-memory representation (spec §3.1: "every
    /// type has a known byte size").
    pub fn byte_size(&self) -> u32 {
        match self {
            Type::UInt(bits) | Type::Int(bits) => (*bits as u32).div_ceil(8).max(1),
            Type::Fixed(f) => f.storage_bits().div_ceil(8),
            Type::Bool => 1,
            Type::Void => 0,
            Type::Array(elem, n) => elem.byte_size() * n,
            Type::Ptr(_) | Type::MutPtr(_) => 2,
            Type::Struct(def) => def.fields.iter().map(|fld| fld.ty.byte_size()).sum(),
            Type::Enum(def) => (def.discriminant_width as u32).div_ceil(8).max(1),
            Type::BitStruct(def) => (def.total_width()).div_ceil(8).max(1),
            Type::Function(_) => 2,
            Type::Errorable(inner) => inner.byte_size(),
        }
    }

    /// Natural alignment, which on the Z80 target is always 1 byte except
    /// that the backend prefers 2-byte alignment for 16-bit scalars; the IR
    /// itself only ever reports byte alignment (no over-alignment concept
    /// in spec §3.1).
    pub fn align(&self) -> u32 {
        match self {
            Type::UInt(bits) | Type::Int(bits) if *bits > 8 => 1,
            _ => 1,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::UInt(_) | Type::Int(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Type::Fixed(_))
    }

    pub fn bit_width(&self) -> Option<u8> {
        match self {
            Type::UInt(w) | Type::Int(w) => Some(*w),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::UInt(bits) => write!(f, "u{bits}"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Fixed(fmt_) => write!(f, "{fmt_}"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Array(elem, n) => write!(f, "[{elem}; {n}]"),
            Type::Ptr(inner) => write!(f, "*{inner}"),
            Type::MutPtr(inner) => write!(f, "*mut {inner}"),
            Type::Struct(def) => write!(f, "{}", def.name),
            Type::Enum(def) => write!(f, "{}", def.name),
            Type::BitStruct(def) => write!(f, "{}", def.name),
            Type::Function(sig) => {
                write!(f, "fn(")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {}", sig.ret)
            }
            Type::Errorable(inner) => write!(f, "{inner}?"),
        }
    }
}
