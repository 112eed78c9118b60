//! Pipeline-level integration tests covering the executable scenarios spec
//! §8 names, driven through `minz::compile` + `minz::run` (the reference
//! interpreter). Every scenario here checks a value/attribute outcome that
//! is observable without lowering to Z80 and executing on the emulator;
//! the T-state counts, SMC patch-pair counts, and hook dispatch that some
//! of those scenarios also describe require compiled bytes running on
//! `minz_z80emu`, which this build has no assembler to produce (see
//! DESIGN.md's deferred-scope note) and so aren't asserted here.
//!
//! Since `minz-frontend` defines AST node shapes only (no textual parser
//! lives in this workspace), every program below is a hand-built
//! `SourceFile` rather than source text.

use minz::{compile, run, OptConfig, VmConfig};
use minz_frontend::{
    BinOp, Block, BitFieldDecl, BitStructDecl, Decl, Expr, FunctionDecl, Literal, Param, SourceFile, Span, Stmt,
    TypeExpr,
};

fn sp() -> Span {
    Span::default()
}

fn ident(name: &str) -> Expr {
    Expr::Ident(name.into(), sp())
}

fn lit(v: i64) -> Expr {
    Expr::Literal(Literal::Int(v), sp())
}

fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span: sp() }
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call { callee: Box::new(ident(name)), args, span: sp() }
}

fn param(name: &str, ty: &str) -> Param {
    Param { name: name.into(), ty: TypeExpr::Named(ty.into()), span: sp() }
}

fn func(name: &str, params: Vec<Param>, ret: &str, body: Block) -> FunctionDecl {
    FunctionDecl {
        name: name.into(),
        generics: vec![],
        params,
        ret_type: TypeExpr::Named(ret.into()),
        errorable: false,
        body: Some(body),
        is_interrupt: false,
        is_abi_explicit: false,
        span: sp(),
    }
}

fn block(stmts: Vec<Stmt>) -> Block {
    Block { stmts }
}

fn ret(e: Expr) -> Stmt {
    Stmt::Return(Some(e), sp())
}

/// S1: a non-recursive two-parameter function is TRUE-SMC eligible, and
/// `add(3, 5)` evaluates to 8.
#[test]
fn scenario_add_is_smc_eligible_and_evaluates_correctly() {
    let file = SourceFile {
        module_name: Some("s1".into()),
        imports: vec![],
        decls: vec![
            Decl::Function(func(
                "add",
                vec![param("a", "i32"), param("b", "i32")],
                "i32",
                block(vec![ret(bin(BinOp::Add, ident("a"), ident("b")))]),
            )),
            Decl::Function(func(
                "main",
                vec![],
                "i32",
                block(vec![ret(call("add", vec![lit(3), lit(5)]))]),
            )),
        ],
    };

    let module = compile(&file, &OptConfig::all_passes()).expect("s1 compiles");
    let add_id = module.function_by_name("s1_add$i32$i32").expect("add is lowered");
    let add = module.function(add_id);
    assert!(add.attrs.smc_enabled, "non-recursive function with params should be TRUE-SMC eligible");
    assert!(!add.attrs.recursive);

    let result = run(&module, VmConfig::default()).expect("s1 runs");
    assert_eq!(result.exit_code, 8);
}

/// S2: recursive factorial disqualifies TRUE SMC (spec §4.1's "recursive
/// functions never qualify"), and `fact(5)` still evaluates to 120 via
/// CTIE-independent interpretation.
#[test]
fn scenario_recursive_factorial_disqualifies_smc() {
    let file = SourceFile {
        module_name: Some("s2".into()),
        imports: vec![],
        decls: vec![
            Decl::Function(func(
                "fact",
                vec![param("n", "i32")],
                "i32",
                block(vec![
                    Stmt::If {
                        cond: bin(BinOp::Le, ident("n"), lit(1)),
                        then_branch: block(vec![ret(lit(1))]),
                        else_branch: None,
                        span: sp(),
                    },
                    ret(bin(BinOp::Mul, ident("n"), call("fact", vec![bin(BinOp::Sub, ident("n"), lit(1))]))),
                ]),
            )),
            Decl::Function(func("main", vec![], "i32", block(vec![ret(call("fact", vec![lit(5)]))]))),
        ],
    };

    let module = compile(&file, &OptConfig::all_passes()).expect("s2 compiles");
    let fact_id = module.function_by_name("s2_fact$i32").expect("fact is lowered");
    let fact = module.function(fact_id);
    assert!(fact.attrs.recursive);
    assert!(!fact.attrs.smc_enabled);

    let result = run(&module, VmConfig::default()).expect("s2 runs");
    assert_eq!(result.exit_code, 120);
}

/// S3: a tail-recursive accumulator-passing Fibonacci, `fib(10, 0, 1)`,
/// evaluates to 55. The spec's T-state ceiling for this scenario is an
/// emulator-level property this test cannot check without compiled bytes.
#[test]
fn scenario_tail_recursive_fib_evaluates_to_55() {
    let file = SourceFile {
        module_name: Some("s3".into()),
        imports: vec![],
        decls: vec![
            Decl::Function(func(
                "fib",
                vec![param("n", "i32"), param("a", "i32"), param("b", "i32")],
                "i32",
                block(vec![
                    Stmt::If {
                        cond: bin(BinOp::Eq, ident("n"), lit(0)),
                        then_branch: block(vec![ret(ident("a"))]),
                        else_branch: None,
                        span: sp(),
                    },
                    ret(call(
                        "fib",
                        vec![bin(BinOp::Sub, ident("n"), lit(1)), ident("b"), bin(BinOp::Add, ident("a"), ident("b"))],
                    )),
                ]),
            )),
            Decl::Function(
                func("main", vec![], "i32", block(vec![ret(call("fib", vec![lit(10), lit(0), lit(1)]))])),
            ),
        ],
    };

    let module = compile(&file, &OptConfig::all_passes()).expect("s3 compiles");
    let result = run(&module, VmConfig::default()).expect("s3 runs");
    assert_eq!(result.exit_code, 55);
}

/// S6: a bit-struct field extracts the bits its declaration order assigns
/// it (spec §3.1: fields packed low-to-high in declaration order).
/// `Attr { ink: 5, paper: 3, bright: 1, flash: 0 }` packs to 93; reading
/// back `.paper` must recover 3.
#[test]
fn scenario_bitstruct_field_extraction() {
    let attr = BitStructDecl {
        name: "Attr".into(),
        fields: vec![
            BitFieldDecl { name: "ink".into(), width: 3 },
            BitFieldDecl { name: "paper".into(), width: 3 },
            BitFieldDecl { name: "bright".into(), width: 1 },
            BitFieldDecl { name: "flash".into(), width: 1 },
        ],
        span: sp(),
    };

    let raw_as_attr = Expr::Cast {
        expr: Box::new(Expr::Cast { expr: Box::new(lit(93)), ty: TypeExpr::Named("u8".into()), span: sp() }),
        ty: TypeExpr::Named("Attr".into()),
        span: sp(),
    };
    let paper = Expr::Field { base: Box::new(raw_as_attr), name: "paper".into(), span: sp() };

    let file = SourceFile {
        module_name: Some("s6".into()),
        imports: vec![],
        decls: vec![Decl::BitStruct(attr), Decl::Function(func("main", vec![], "i32", block(vec![ret(paper)])))],
    };

    let module = compile(&file, &OptConfig::all_passes()).expect("s6 compiles");
    let result = run(&module, VmConfig::default()).expect("s6 runs");
    assert_eq!(result.exit_code, 3);
}
