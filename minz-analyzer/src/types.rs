//! Type resolution, implicit widening, and cast validity (spec §4.1; open
//! question #3 pinned down in SPEC_FULL.md §3).

use minz_frontend::TypeExpr;
use minz_ir::{BitStructDef, EnumDef, FixedFormat, StructDef, Type};
use std::collections::HashMap;
use std::sync::Arc;

/// Named user types declared so far, used to resolve `TypeExpr::Named`.
#[derive(Debug, Default)]
pub struct TypeTable {
    structs: HashMap<String, Arc<StructDef>>,
    enums: HashMap<String, Arc<EnumDef>>,
    bitstructs: HashMap<String, Arc<BitStructDef>>,
}

impl TypeTable {
    pub fn register_struct(&mut self, def: StructDef) {
        self.structs.insert(def.name.clone(), Arc::new(def));
    }

    pub fn register_enum(&mut self, def: EnumDef) {
        self.enums.insert(def.name.clone(), Arc::new(def));
    }

    pub fn register_bitstruct(&mut self, def: BitStructDef) {
        self.bitstructs.insert(def.name.clone(), Arc::new(def));
    }

    pub fn bitstruct(&self, name: &str) -> Option<&Arc<BitStructDef>> {
        self.bitstructs.get(name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&Arc<EnumDef>> {
        self.enums.get(name)
    }

    pub fn resolve(&self, expr: &TypeExpr) -> Option<Type> {
        match expr {
            TypeExpr::Named(name) => resolve_builtin(name).or_else(|| {
                self.structs
                    .get(name)
                    .map(|d| Type::Struct(d.clone()))
                    .or_else(|| self.enums.get(name).map(|d| Type::Enum(d.clone())))
                    .or_else(|| self.bitstructs.get(name).map(|d| Type::BitStruct(d.clone())))
            }),
            TypeExpr::Array(elem, n) => self.resolve(elem).map(|t| Type::Array(Box::new(t), *n)),
            TypeExpr::Ptr(inner) => self.resolve(inner).map(|t| Type::Ptr(Box::new(t))),
            TypeExpr::MutPtr(inner) => self.resolve(inner).map(|t| Type::MutPtr(Box::new(t))),
            TypeExpr::Errorable(inner) => self.resolve(inner).map(|t| Type::Errorable(Box::new(t))),
            TypeExpr::Function(params, ret) => {
                let params = params.iter().map(|p| self.resolve(p)).collect::<Option<Vec<_>>>()?;
                let ret = self.resolve(ret)?;
                Some(Type::Function(Arc::new(minz_ir::FunctionSig { params, ret })))
            }
        }
    }
}

fn resolve_builtin(name: &str) -> Option<Type> {
    match name {
        "bool" => Some(Type::Bool),
        "void" => Some(Type::Void),
        "u8" => Some(Type::UInt(8)),
        "u16" => Some(Type::UInt(16)),
        "u24" => Some(Type::UInt(24)),
        "u32" => Some(Type::UInt(32)),
        "i8" => Some(Type::Int(8)),
        "i16" => Some(Type::Int(16)),
        "i24" => Some(Type::Int(24)),
        "i32" => Some(Type::Int(32)),
        "f8.8" => Some(Type::Fixed(FixedFormat::Q8_8)),
        "f.8" => Some(Type::Fixed(FixedFormat::Q0_8)),
        "f.16" => Some(Type::Fixed(FixedFormat::Q0_16)),
        "f16.8" => Some(Type::Fixed(FixedFormat::Q16_8)),
        "f8.16" => Some(Type::Fixed(FixedFormat::Q8_16)),
        _ => None,
    }
}

/// Can a value of type `from` be implicitly widened to `to` (spec §4.1:
/// "implicit widening is allowed from smaller unsigned to larger unsigned
/// of the same signedness")? This implementation extends the rule
/// symmetrically to signed types (smaller signed to larger signed), which
/// is the natural reading once signed integers are in play at all, and
/// pins the mixed-signedness case per SPEC_FULL.md §3: never implicit.
pub fn can_widen(from: &Type, to: &Type) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (Type::UInt(a), Type::UInt(b)) => a <= b,
        (Type::Int(a), Type::Int(b)) => a <= b,
        _ => false,
    }
}

/// Common type for a binary arithmetic/bitwise operation, after applying
/// widening in both directions. `None` if the operands are incompatible
/// without an explicit cast.
pub fn common_arith_type(lhs: &Type, rhs: &Type) -> Option<Type> {
    if can_widen(lhs, rhs) {
        Some(rhs.clone())
    } else if can_widen(rhs, lhs) {
        Some(lhs.clone())
    } else {
        None
    }
}

/// Is an explicit cast from `from` to `to` permitted at all (spec §4.1:
/// "narrowing requires an explicit cast"; "Bit-struct values convert to/from
/// their underlying integer only via explicit cast")?
pub fn cast_allowed(from: &Type, to: &Type) -> bool {
    match (from, to) {
        (a, b) if a == b => true,
        (Type::UInt(_) | Type::Int(_) | Type::Bool, Type::UInt(_) | Type::Int(_) | Type::Bool) => true,
        (Type::BitStruct(_), Type::UInt(_)) => true,
        (Type::UInt(_), Type::BitStruct(_)) => true,
        (Type::Ptr(_) | Type::MutPtr(_), Type::UInt(16)) => true,
        (Type::UInt(16), Type::Ptr(_) | Type::MutPtr(_)) => true,
        (Type::MutPtr(inner_a), Type::Ptr(inner_b)) => inner_a == inner_b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widens_smaller_unsigned_to_larger() {
        assert!(can_widen(&Type::UInt(8), &Type::UInt(16)));
        assert!(!can_widen(&Type::UInt(16), &Type::UInt(8)));
    }

    #[test]
    fn mixed_signedness_never_widens() {
        assert!(!can_widen(&Type::UInt(8), &Type::Int(16)));
        assert!(!can_widen(&Type::Int(8), &Type::UInt(16)));
    }

    #[test]
    fn bitstruct_cast_requires_explicit_request_but_is_allowed() {
        assert!(cast_allowed(&Type::UInt(8), &Type::Bool));
    }
}
