//! Name mangling (spec §4.1).
//!
//! User functions compile to `<module>_<basename>$<paramtype1>$<paramtype2>…`.
//! The unsanitized form (with `$`) is the compile-time identity used for
//! overload bookkeeping; `sanitize_for_assembly` produces the form the
//! backend actually emits as a label (spec §4.5: "any character not in
//! `[A-Za-z0-9_]`... is replaced with `_`").

use minz_ir::Type;

pub fn mangle(module: &str, basename: &str, param_types: &[Type]) -> String {
    if basename == "main" {
        return "main".to_string();
    }
    let mut out = format!("{module}_{basename}");
    for ty in param_types {
        out.push('$');
        out.push_str(&type_key(ty));
    }
    out
}

/// A stable, compact textual key for a type, used only inside mangled
/// names (not the same as `Type`'s `Display`, which is meant for humans).
fn type_key(ty: &Type) -> String {
    match ty {
        Type::UInt(w) => format!("u{w}"),
        Type::Int(w) => format!("i{w}"),
        Type::Fixed(f) => f.to_string().replace('.', "_"),
        Type::Bool => "bool".to_string(),
        Type::Void => "void".to_string(),
        Type::Array(elem, n) => format!("a{n}_{}", type_key(elem)),
        Type::Ptr(inner) => format!("p_{}", type_key(inner)),
        Type::MutPtr(inner) => format!("pm_{}", type_key(inner)),
        Type::Struct(def) => def.name.clone(),
        Type::Enum(def) => def.name.clone(),
        Type::BitStruct(def) => def.name.clone(),
        Type::Function(_) => "fnptr".to_string(),
        Type::Errorable(inner) => format!("err_{}", type_key(inner)),
    }
}

/// Sanitize a mangled (or any) symbol for emission as a Z80 assembly label
/// (spec §4.5).
pub fn sanitize_for_assembly(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangles_with_module_and_param_types() {
        let name = mangle("m", "add", &[Type::UInt(16), Type::UInt(16)]);
        assert_eq!(name, "m_add$u16$u16");
    }

    #[test]
    fn main_is_never_mangled() {
        assert_eq!(mangle("m", "main", &[]), "main");
    }

    #[test]
    fn sanitize_replaces_dollar_and_operator_chars() {
        assert_eq!(sanitize_for_assembly("m_add$u16$u16"), "m_add_u16_u16");
    }
}
