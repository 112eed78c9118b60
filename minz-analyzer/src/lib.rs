//! Semantic analyzer (spec component B, §4.1): typed AST in, a verified
//! `minz_ir::Module` out.

pub mod constfold;
pub mod diagnostics;
pub mod lower;
pub mod mangle;
pub mod overload;
pub mod types;

use diagnostics::Diagnostics;
use lower::Lowerer;
use minz_frontend::SourceFile;
use minz_ir::{verify_module, IrError, Module};
use thiserror::Error;
use types::TypeTable;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("{0}")]
    Semantic(Diagnostics),
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Registers every `struct`/`enum`/bit-struct declaration in `file` into a
/// fresh `TypeTable`, checking the bit-struct 16-bit width invariant (spec
/// §3.1) along the way.
fn build_type_table(file: &SourceFile, diagnostics: &mut Diagnostics) -> TypeTable {
    use diagnostics::SemanticError;
    use minz_ir::{BitField, BitStructDef, EnumDef, EnumVariant, StructDef, StructField};
    use minz_frontend::Decl;

    let mut table = TypeTable::default();
    // Structs and enums first (bit-structs never reference them, and
    // structs could in principle reference each other by name in field
    // types — registering before resolving field types keeps forward
    // references working, matching how functions are declared in two
    // passes in `Lowerer`).
    for decl in &file.decls {
        match decl {
            Decl::BitStruct(bs) => {
                let fields: Vec<BitField> =
                    bs.fields.iter().map(|f| BitField { name: f.name.clone(), width: f.width }).collect();
                let def = BitStructDef { name: bs.name.clone(), fields };
                let total = def.total_width();
                if total > 16 {
                    diagnostics.push(SemanticError::BitStructOverflow(bs.span, bs.name.clone(), total));
                }
                table.register_bitstruct(def);
            }
            Decl::Enum(e) => {
                let mut next = 0i64;
                let variants: Vec<EnumVariant> = e
                    .variants
                    .iter()
                    .map(|v| {
                        let value = v.value.unwrap_or(next);
                        next = value + 1;
                        EnumVariant { name: v.name.clone(), value }
                    })
                    .collect();
                table.register_enum(EnumDef { name: e.name.clone(), discriminant_width: 8, variants });
            }
            _ => {}
        }
    }
    for decl in &file.decls {
        if let Decl::Struct(s) = decl {
            let fields: Vec<StructField> = s
                .fields
                .iter()
                .filter_map(|f| {
                    table.resolve(&f.ty).map(|ty| StructField { name: f.name.clone(), ty }).or_else(|| {
                        diagnostics.push(SemanticError::UnknownType(f.span, format!("{:?}", f.ty)));
                        None
                    })
                })
                .collect();
            table.register_struct(StructDef { name: s.name.clone(), fields });
        }
    }
    table
}

/// Lowers a parsed, module-scoped `SourceFile` into a MIR `Module`, running
/// the structural verifier (spec §3.6) as the final step.
pub fn analyze(file: &SourceFile) -> Result<Module, AnalyzeError> {
    let module_name = file.module_name.clone().unwrap_or_else(|| "m".to_string());
    let mut diagnostics = Diagnostics::default();
    let types = build_type_table(file, &mut diagnostics);

    let mut lowerer = Lowerer::new(&types, module_name);
    lowerer.declare_decls(file);
    lowerer.lower_decls(file);
    diagnostics.errors.extend(lowerer.diagnostics.errors);

    if !diagnostics.is_empty() {
        return Err(AnalyzeError::Semantic(diagnostics));
    }

    verify_module(&lowerer.module, "analyzer")?;
    Ok(lowerer.module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_frontend::{BinOp, Block, Decl, Expr, FunctionDecl, Param, Span, Stmt, TypeExpr};

    fn try_init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn analyzes_a_minimal_program() {
        try_init_logger();
        let mut file = SourceFile { module_name: Some("prog".into()), ..Default::default() };
        file.decls.push(Decl::Function(FunctionDecl {
            name: "main".into(),
            generics: vec![],
            params: vec![],
            ret_type: TypeExpr::Named("u16".into()),
            errorable: false,
            body: Some(Block {
                stmts: vec![Stmt::Return(
                    Some(Expr::Literal(minz_frontend::Literal::Int(42), Span::default())),
                    Span::default(),
                )],
            }),
            is_interrupt: false,
            is_abi_explicit: false,
            span: Span::default(),
        }));

        let module = analyze(&file).expect("analysis should succeed");
        assert!(module.function_by_name("main").is_some());
    }

    #[test]
    fn unknown_name_is_reported_as_a_diagnostic() {
        let mut file = SourceFile { module_name: Some("prog".into()), ..Default::default() };
        file.decls.push(Decl::Function(FunctionDecl {
            name: "main".into(),
            generics: vec![],
            params: vec![],
            ret_type: TypeExpr::Named("u16".into()),
            errorable: false,
            body: Some(Block {
                stmts: vec![Stmt::Return(Some(Expr::Ident("nope".into(), Span::default())), Span::default())],
            }),
            is_interrupt: false,
            is_abi_explicit: false,
            span: Span::default(),
        }));

        match analyze(&file) {
            Err(AnalyzeError::Semantic(d)) => assert!(!d.is_empty()),
            other => panic!("expected a semantic error, got {other:?}"),
        }
    }

    #[test]
    fn recursive_factorial_is_not_smc_eligible() {
        let mut file = SourceFile { module_name: Some("prog".into()), ..Default::default() };
        file.decls.push(Decl::Function(FunctionDecl {
            name: "fact".into(),
            generics: vec![],
            params: vec![Param { name: "n".into(), ty: TypeExpr::Named("u8".into()), span: Span::default() }],
            ret_type: TypeExpr::Named("u16".into()),
            errorable: false,
            body: Some(Block {
                stmts: vec![Stmt::Return(
                    Some(Expr::Call {
                        callee: Box::new(Expr::Ident("fact".into(), Span::default())),
                        args: vec![Expr::Binary {
                            op: BinOp::Sub,
                            lhs: Box::new(Expr::Ident("n".into(), Span::default())),
                            rhs: Box::new(Expr::Literal(minz_frontend::Literal::Int(1), Span::default())),
                            span: Span::default(),
                        }],
                        span: Span::default(),
                    }),
                    Span::default(),
                )],
            }),
            is_interrupt: false,
            is_abi_explicit: false,
            span: Span::default(),
        }));

        let module = analyze(&file).expect("analysis should succeed");
        let id = module.function_by_name("prog_fact$u8").expect("fact should be lowered");
        assert!(!module.function(id).attrs.smc_enabled);
        assert!(module.function(id).attrs.recursive);
    }

    #[test]
    fn abi_explicit_function_is_not_smc_eligible() {
        try_init_logger();
        let mut file = SourceFile { module_name: Some("prog".into()), ..Default::default() };
        file.decls.push(Decl::Function(FunctionDecl {
            name: "poke".into(),
            generics: vec![],
            params: vec![Param { name: "v".into(), ty: TypeExpr::Named("u8".into()), span: Span::default() }],
            ret_type: TypeExpr::Named("void".into()),
            errorable: false,
            body: Some(Block { stmts: vec![Stmt::Return(None, Span::default())] }),
            is_interrupt: false,
            is_abi_explicit: true,
            span: Span::default(),
        }));

        let module = analyze(&file).expect("analysis should succeed");
        let id = module.function_by_name("prog_poke$u8").expect("poke should be lowered");
        assert!(!module.function(id).attrs.smc_enabled);
        assert!(module.function(id).attrs.abi_explicit);
    }
}
