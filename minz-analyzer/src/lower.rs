//! AST-to-MIR lowering (spec §4.1): the driver that turns a typed
//! `SourceFile` into a `minz_ir::Module`.
//!
//! Scope note (recorded in full in `DESIGN.md`): locals and parameters of
//! scalar type (integers, `bool`, pointers, bit-structs represented as a
//! packed integer) get full register-based codegen, matching spec §3.3's
//! register model directly. Aggregate locals (arrays, structs) would need a
//! stack-slot or synthesized-global concept that spec §3.6 does not define
//! for `LoadVar`/`StoreVar` (those only resolve to globals, strings, or
//! functions) — lowering them is out of scope for this build and reported
//! via `SemanticError::Unsupported` rather than silently miscompiled.

use crate::constfold::eval_const_bool;
use crate::diagnostics::{Diagnostics, SemanticError};
use crate::mangle::mangle;
use crate::overload::{self, Candidate};
use crate::types::{cast_allowed, common_arith_type, TypeTable};
use minz_frontend::{
    BinOp, Block, Decl, Expr, FunctionDecl, Literal, MetaCall, SourceFile, Span, Stmt, TypeExpr, UnOp,
};
use minz_ir::{
    CallConvHint, Function, Global, Instruction, LabelId, Module, Opcode, Reg, Symbol, Type,
};
use std::collections::HashMap;

/// One overload candidate as recorded for call-site resolution.
#[derive(Debug, Clone)]
struct FnEntry {
    mangled: String,
    params: Vec<Type>,
    ret: Type,
    is_interrupt: bool,
}

pub struct Lowerer<'a> {
    pub module: Module,
    pub diagnostics: Diagnostics,
    types: &'a TypeTable,
    globals: HashMap<String, (minz_ir::GlobalId, Type)>,
    functions: HashMap<String, Vec<FnEntry>>,
    module_name: String,
}

struct FnCtx<'a, 'b, 'c> {
    func: Function,
    types: &'a TypeTable,
    globals: &'a HashMap<String, (minz_ir::GlobalId, Type)>,
    functions: &'a HashMap<String, Vec<FnEntry>>,
    module: &'c mut Module,
    scopes: Vec<HashMap<String, (Reg, Type)>>,
    loop_stack: Vec<(LabelId, LabelId)>,
    diagnostics: &'b mut Diagnostics,
}

impl<'a, 'b, 'c> FnCtx<'a, 'b, 'c> {
    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_var(&mut self, name: &str, reg: Reg, ty: Type) {
        self.scopes.last_mut().expect("at least one scope").insert(name.to_string(), (reg, ty));
    }

    fn lookup_var(&self, name: &str) -> Option<(Reg, Type)> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v.clone());
            }
        }
        None
    }
}

impl<'a> Lowerer<'a> {
    pub fn new(types: &'a TypeTable, module_name: impl Into<String>) -> Self {
        let module_name = module_name.into();
        Lowerer {
            module: Module::new(module_name.clone()),
            diagnostics: Diagnostics::default(),
            types,
            globals: HashMap::new(),
            functions: HashMap::new(),
            module_name,
        }
    }

    /// Pass 1: register globals and every function's signature (so forward
    /// and mutually recursive calls resolve regardless of declaration
    /// order), without lowering any bodies yet.
    pub fn declare_decls(&mut self, file: &SourceFile) {
        for decl in &file.decls {
            if let Decl::Global(g) = decl {
                let ty = match self.types.resolve(&g.ty) {
                    Some(t) => t,
                    None => {
                        self.diagnostics.push(SemanticError::UnknownType(g.span, type_expr_name(&g.ty)));
                        continue;
                    }
                };
                let init = g.value.as_ref().and_then(eval_const_bool_or_int);
                let id = self.module.declare_global(Global {
                    name: g.name.clone(),
                    ty: ty.clone(),
                    init,
                    bytes: Vec::new(),
                });
                self.globals.insert(g.name.clone(), (id, ty));
            }
        }

        for decl in &file.decls {
            if let Decl::Function(f) = decl {
                self.declare_function_signature(f);
            }
        }
    }

    fn declare_function_signature(&mut self, decl: &FunctionDecl) {
        let params: Vec<Type> = decl
            .params
            .iter()
            .filter_map(|p| {
                self.types.resolve(&p.ty).or_else(|| {
                    self.diagnostics
                        .push(SemanticError::UnknownType(p.span, type_expr_name(&p.ty)));
                    None
                })
            })
            .collect();
        if params.len() != decl.params.len() {
            return;
        }
        let ret = match self.types.resolve(&decl.ret_type) {
            Some(t) => t,
            None => {
                self.diagnostics
                    .push(SemanticError::UnknownType(decl.span, type_expr_name(&decl.ret_type)));
                return;
            }
        };
        let mangled = mangle(&self.module_name, &decl.name, &params);
        let entry = self.functions.entry(decl.name.clone()).or_default();
        if entry.iter().any(|e| e.params == params) {
            self.diagnostics
                .push(SemanticError::DuplicateDefinition(decl.span, decl.name.clone()));
            return;
        }
        entry.push(FnEntry { mangled, params, ret, is_interrupt: decl.is_interrupt });
    }

    /// Pass 2: lower every function body now that all signatures are known.
    pub fn lower_decls(&mut self, file: &SourceFile) {
        for decl in &file.decls {
            if let Decl::Function(f) = decl {
                self.lower_function(f);
            }
        }
    }

    fn lower_function(&mut self, decl: &FunctionDecl) {
        let Some(params): Option<Vec<Type>> = decl.params.iter().map(|p| self.types.resolve(&p.ty)).collect()
        else {
            return;
        };
        let Some(ret) = self.types.resolve(&decl.ret_type) else {
            return;
        };
        let mangled = mangle(&self.module_name, &decl.name, &params);
        let mut func = Function::new(mangled, ret.clone());
        func.attrs.interrupt = decl.is_interrupt;
        func.attrs.abi_explicit = decl.is_abi_explicit;
        if decl.is_interrupt {
            func.call_conv = Some(CallConvHint::Interrupt);
        }

        // Scoped so every borrow `ctx` holds of `self` (module, diagnostics)
        // is released before `self.module.declare_function` runs below.
        let lowered = {
            let mut ctx = FnCtx {
                func,
                types: self.types,
                globals: &self.globals,
                functions: &self.functions,
                module: &mut self.module,
                scopes: vec![HashMap::new()],
                loop_stack: Vec::new(),
                diagnostics: &mut self.diagnostics,
            };

            for (param, ty) in decl.params.iter().zip(params.iter()) {
                let reg = ctx.func.add_param(&param.name, ty.clone());
                ctx.declare_var(&param.name, reg, ty.clone());
            }

            let recursive = decl
                .body
                .as_ref()
                .map(|b| block_calls_name(b, &decl.name))
                .unwrap_or(false);
            ctx.func.attrs.recursive = recursive;
            ctx.func.attrs.smc_enabled = ctx.func.is_smc_eligible();

            if ctx.func.attrs.abi_explicit
                && !ctx.func.attrs.recursive
                && !ctx.func.attrs.interrupt
                && !ctx.func.params.is_empty()
            {
                log::warn!(
                    "{}: @abi function would otherwise qualify for TRUE SMC parameter passing",
                    ctx.func.name
                );
            }

            if let Some(body) = &decl.body {
                lower_block(&mut ctx, body);
            }

            if !matches!(ctx.func.instructions.last().map(|i| &i.opcode), Some(Opcode::Return { .. }) | Some(Opcode::Halt)) {
                let default_ret = if matches!(ret, Type::Void) { None } else { Some(zero_reg(&mut ctx)) };
                ctx.func.push(Instruction::new(Opcode::Return { src: default_ret }));
            }

            log::debug!(
                "{}: {} registers, smc_eligible={}",
                ctx.func.name,
                ctx.func.register_count(),
                ctx.func.attrs.smc_enabled
            );

            ctx.func
        };

        self.module.declare_function(lowered);
    }
}

fn zero_reg(ctx: &mut FnCtx) -> Reg {
    let r = ctx.func.alloc_reg();
    ctx.func.push(Instruction::new(Opcode::LoadConst { dst: r, imm: 0 }));
    r
}

fn eval_const_bool_or_int(e: &Expr) -> Option<i64> {
    crate::constfold::eval_const_int(e)
}

fn type_expr_name(t: &TypeExpr) -> String {
    match t {
        TypeExpr::Named(n) => n.clone(),
        TypeExpr::Array(inner, n) => format!("[{}; {n}]", type_expr_name(inner)),
        TypeExpr::Ptr(inner) => format!("*{}", type_expr_name(inner)),
        TypeExpr::MutPtr(inner) => format!("*mut {}", type_expr_name(inner)),
        TypeExpr::Errorable(inner) => format!("{}?", type_expr_name(inner)),
        TypeExpr::Function(..) => "fn(..)".to_string(),
    }
}

fn block_calls_name(block: &Block, name: &str) -> bool {
    block.stmts.iter().any(|s| stmt_calls_name(s, name))
}

fn stmt_calls_name(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::Let { value, .. } => expr_calls_name(value, name),
        Stmt::Assign { target, value, .. } => expr_calls_name(target, name) || expr_calls_name(value, name),
        Stmt::Expr(e) => expr_calls_name(e, name),
        Stmt::Return(e, _) => e.as_ref().is_some_and(|e| expr_calls_name(e, name)),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            expr_calls_name(cond, name)
                || block_calls_name(then_branch, name)
                || else_branch.as_ref().is_some_and(|b| block_calls_name(b, name))
        }
        Stmt::While { cond, body, .. } => expr_calls_name(cond, name) || block_calls_name(body, name),
        Stmt::Loop { body, .. } => block_calls_name(body, name),
        Stmt::Break(_) | Stmt::Continue(_) => false,
        Stmt::Meta(m) => m.args.iter().any(|a| expr_calls_name(a, name)),
    }
}

fn expr_calls_name(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Call { callee, args, .. } => {
            matches!(callee.as_ref(), Expr::Ident(n, _) if n == name) || args.iter().any(|a| expr_calls_name(a, name))
        }
        Expr::Binary { lhs, rhs, .. } => expr_calls_name(lhs, name) || expr_calls_name(rhs, name),
        Expr::Unary { operand, .. } => expr_calls_name(operand, name),
        Expr::Field { base, .. } => expr_calls_name(base, name),
        Expr::Index { base, index, .. } => expr_calls_name(base, name) || expr_calls_name(index, name),
        Expr::Cast { expr, .. } => expr_calls_name(expr, name),
        Expr::If { cond, then_branch, else_branch, .. } => {
            expr_calls_name(cond, name)
                || block_calls_name(then_branch, name)
                || else_branch.as_ref().is_some_and(|b| block_calls_name(b, name))
        }
        Expr::Ternary { cond, then_expr, else_expr, .. } => {
            expr_calls_name(cond, name) || expr_calls_name(then_expr, name) || expr_calls_name(else_expr, name)
        }
        Expr::Try { expr, .. } => expr_calls_name(expr, name),
        Expr::NilCoalesce { lhs, rhs, .. } => expr_calls_name(lhs, name) || expr_calls_name(rhs, name),
        _ => false,
    }
}

fn lower_block(ctx: &mut FnCtx, block: &Block) {
    ctx.push_scope();
    for stmt in &block.stmts {
        lower_stmt(ctx, stmt);
    }
    ctx.pop_scope();
}

fn lower_stmt(ctx: &mut FnCtx, stmt: &Stmt) {
    match stmt {
        Stmt::Let { name, ty, value, span } => {
            let Some((reg, val_ty)) = lower_expr(ctx, value) else { return };
            let declared_ty = ty.as_ref().and_then(|t| ctx.types.resolve(t));
            let final_ty = match declared_ty {
                Some(t) if t != val_ty && !common_arith_type(&val_ty, &t).is_some_and(|c| c == t) => {
                    ctx.diagnostics.push(SemanticError::TypeMismatch(*span, t.clone(), val_ty));
                    t
                }
                Some(t) => t,
                None => val_ty,
            };
            ctx.declare_var(name, reg, final_ty);
        }
        Stmt::Assign { target, value, span } => {
            let Some((val_reg, _val_ty)) = lower_expr(ctx, value) else { return };
            match target {
                Expr::Ident(name, _) => {
                    if let Some((dst, _)) = ctx.lookup_var(name) {
                        ctx.func.push(Instruction::new(Opcode::Move { dst, src: val_reg }));
                    } else if let Some((gid, gty)) = ctx.globals.get(name).cloned() {
                        ctx.func
                            .push(Instruction::new(Opcode::StoreVar { sym: Symbol::Global(gid), src: val_reg }).with_size(gty.byte_size()));
                    } else {
                        ctx.diagnostics.push(SemanticError::UnknownName(*span, name.clone()));
                    }
                }
                Expr::Unary { op: UnOp::Deref, operand, .. } => {
                    let Some((addr_reg, ptr_ty)) = lower_expr(ctx, operand) else { return };
                    let size = pointee_size(&ptr_ty);
                    ctx.func.push(Instruction::new(Opcode::StorePtr { src_addr: addr_reg, src_value: val_reg, size }));
                }
                Expr::Field { base, name, .. } => {
                    if let Some((container, Type::BitStruct(def))) = lower_expr(ctx, base) {
                        if let Some((offset, width)) = def.field_offset(name) {
                            ctx.func.push(Instruction::new(Opcode::StoreBitField {
                                dst_container: container,
                                src_value: val_reg,
                                offset,
                                width: width as u32,
                            }));
                        } else {
                            ctx.diagnostics.push(SemanticError::UnknownName(*span, name.clone()));
                        }
                    } else {
                        ctx.diagnostics.push(SemanticError::Unsupported(*span, "field assignment on a non-bit-struct value"));
                    }
                }
                _ => ctx.diagnostics.push(SemanticError::Unsupported(*span, "unsupported assignment target")),
            }
        }
        Stmt::Expr(e) => {
            lower_expr(ctx, e);
        }
        Stmt::Return(e, _span) => {
            let src = e.as_ref().and_then(|e| lower_expr(ctx, e)).map(|(r, _)| r);
            ctx.func.push(Instruction::new(Opcode::Return { src }));
        }
        Stmt::If { cond, then_branch, else_branch, span: _ } => {
            let Some((cond_reg, _)) = lower_expr(ctx, cond) else { return };
            let else_label = ctx.func.alloc_label();
            let end_label = ctx.func.alloc_label();
            ctx.func.push(Instruction::new(Opcode::JumpIfNot { cond: cond_reg, target: else_label }));
            lower_block(ctx, then_branch);
            ctx.func.push(Instruction::new(Opcode::Jump { target: end_label }));
            ctx.func.push(Instruction::new(Opcode::Label { label: else_label }));
            if let Some(else_b) = else_branch {
                lower_block(ctx, else_b);
            }
            ctx.func.push(Instruction::new(Opcode::Label { label: end_label }));
        }
        Stmt::While { cond, body, span: _ } => {
            let top = ctx.func.alloc_label();
            let end = ctx.func.alloc_label();
            ctx.func.push(Instruction::new(Opcode::Label { label: top }));
            let Some((cond_reg, _)) = lower_expr(ctx, cond) else { return };
            ctx.func.push(Instruction::new(Opcode::JumpIfNot { cond: cond_reg, target: end }));
            ctx.loop_stack.push((end, top));
            lower_block(ctx, body);
            ctx.loop_stack.pop();
            ctx.func.push(Instruction::new(Opcode::Jump { target: top }));
            ctx.func.push(Instruction::new(Opcode::Label { label: end }));
        }
        Stmt::Loop { body, span: _ } => {
            let top = ctx.func.alloc_label();
            let end = ctx.func.alloc_label();
            ctx.func.push(Instruction::new(Opcode::Label { label: top }));
            ctx.loop_stack.push((end, top));
            lower_block(ctx, body);
            ctx.loop_stack.pop();
            ctx.func.push(Instruction::new(Opcode::Jump { target: top }));
            ctx.func.push(Instruction::new(Opcode::Label { label: end }));
        }
        Stmt::Break(span) => match ctx.loop_stack.last() {
            Some((brk, _)) => {
                let brk = *brk;
                ctx.func.push(Instruction::new(Opcode::Jump { target: brk }));
            }
            None => ctx.diagnostics.push(SemanticError::Unsupported(*span, "`break` outside a loop")),
        },
        Stmt::Continue(span) => match ctx.loop_stack.last() {
            Some((_, cont)) => {
                let cont = *cont;
                ctx.func.push(Instruction::new(Opcode::Jump { target: cont }));
            }
            None => ctx.diagnostics.push(SemanticError::Unsupported(*span, "`continue` outside a loop")),
        },
        Stmt::Meta(m) => {
            lower_meta(ctx, m, true);
        }
    }
}

fn pointee_size(ptr_ty: &Type) -> u32 {
    match ptr_ty {
        Type::Ptr(inner) | Type::MutPtr(inner) => inner.byte_size(),
        _ => 2,
    }
}

/// Lowers a `@name(args)` metafunction call. `as_stmt` distinguishes
/// statement position (where `@assert`/`@error` are meaningful) from
/// expression position (where only `@print` yields a value-less result).
fn lower_meta(ctx: &mut FnCtx, call: &MetaCall, _as_stmt: bool) -> Option<(Reg, Type)> {
    match call.name.as_str() {
        "print" => {
            for arg in &call.args {
                if let Expr::Literal(Literal::Str(s), _) = arg {
                    let id = ctx.module.intern_string(s.clone());
                    ctx.func.push(Instruction::new(Opcode::PrintStringDirect { sym: Symbol::String(id) }));
                    continue;
                }
                let Some((reg, ty)) = lower_expr(ctx, arg) else { continue };
                let opcode = match ty.byte_size() {
                    1 => Opcode::PrintU8 { src: reg },
                    2 => Opcode::PrintU16 { src: reg },
                    _ => Opcode::Print { src: reg },
                };
                ctx.func.push(Instruction::new(opcode));
            }
            None
        }
        "assert" => {
            if let Some(cond_expr) = call.args.first() {
                match eval_const_bool(cond_expr) {
                    Some(true) => {}
                    Some(false) => ctx.diagnostics.push(SemanticError::AssertionFailed(call.span, "condition is false".into())),
                    None => ctx.diagnostics.push(SemanticError::Unsupported(call.span, "non-constant @assert condition")),
                }
            }
            None
        }
        "error" => {
            let msg = call
                .args
                .first()
                .and_then(|a| if let Expr::Literal(Literal::Str(s), _) = a { Some(s.clone()) } else { None })
                .unwrap_or_default();
            ctx.diagnostics.push(SemanticError::UserError(call.span, msg));
            None
        }
        _ => {
            ctx.diagnostics.push(SemanticError::Unsupported(call.span, "unknown metafunction"));
            None
        }
    }
}

fn lower_expr(ctx: &mut FnCtx, expr: &Expr) -> Option<(Reg, Type)> {
    match expr {
        Expr::Literal(Literal::Int(v), _) => {
            let r = ctx.func.alloc_reg();
            ctx.func.push(Instruction::new(Opcode::LoadConst { dst: r, imm: *v }));
            Some((r, Type::Int(32)))
        }
        Expr::Literal(Literal::Bool(b), _) => {
            let r = ctx.func.alloc_reg();
            ctx.func.push(Instruction::new(Opcode::LoadConst { dst: r, imm: *b as i64 }));
            Some((r, Type::Bool))
        }
        Expr::Literal(Literal::Char(c), _) => {
            let r = ctx.func.alloc_reg();
            ctx.func.push(Instruction::new(Opcode::LoadConst { dst: r, imm: *c as i64 }));
            Some((r, Type::UInt(8)))
        }
        Expr::Literal(Literal::Str(_), span) => {
            ctx.diagnostics.push(SemanticError::Unsupported(*span, "string literal outside @print"));
            None
        }
        Expr::Ident(name, span) => {
            if let Some((reg, ty)) = ctx.lookup_var(name) {
                Some((reg, ty))
            } else if let Some((gid, ty)) = ctx.globals.get(name).cloned() {
                let dst = ctx.func.alloc_reg();
                ctx.func
                    .push(Instruction::new(Opcode::LoadVar { dst, sym: Symbol::Global(gid) }).with_size(ty.byte_size()));
                Some((dst, ty))
            } else {
                ctx.diagnostics.push(SemanticError::UnknownName(*span, name.clone()));
                None
            }
        }
        Expr::Binary { op: BinOp::LogicalAnd, lhs, rhs, .. } => {
            let (lhs_reg, _) = lower_expr(ctx, lhs)?;
            let result = ctx.func.alloc_reg();
            let end = ctx.func.alloc_label();
            ctx.func.push(Instruction::new(Opcode::Move { dst: result, src: lhs_reg }));
            ctx.func.push(Instruction::new(Opcode::JumpIfNot { cond: lhs_reg, target: end }));
            let (rhs_reg, _) = lower_expr(ctx, rhs)?;
            ctx.func.push(Instruction::new(Opcode::Move { dst: result, src: rhs_reg }));
            ctx.func.push(Instruction::new(Opcode::Label { label: end }));
            Some((result, Type::Bool))
        }
        Expr::Binary { op: BinOp::LogicalOr, lhs, rhs, .. } => {
            let (lhs_reg, _) = lower_expr(ctx, lhs)?;
            let result = ctx.func.alloc_reg();
            let end = ctx.func.alloc_label();
            ctx.func.push(Instruction::new(Opcode::Move { dst: result, src: lhs_reg }));
            ctx.func.push(Instruction::new(Opcode::JumpIf { cond: lhs_reg, target: end }));
            let (rhs_reg, _) = lower_expr(ctx, rhs)?;
            ctx.func.push(Instruction::new(Opcode::Move { dst: result, src: rhs_reg }));
            ctx.func.push(Instruction::new(Opcode::Label { label: end }));
            Some((result, Type::Bool))
        }
        Expr::Binary { op, lhs, rhs, span } => {
            let (lhs_reg, lhs_ty) = lower_expr(ctx, lhs)?;
            let (rhs_reg, rhs_ty) = lower_expr(ctx, rhs)?;
            let is_cmp = matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge);
            let common = match common_arith_type(&lhs_ty, &rhs_ty) {
                Some(t) => t,
                None => {
                    ctx.diagnostics.push(SemanticError::TypeMismatch(*span, lhs_ty.clone(), rhs_ty.clone()));
                    lhs_ty.clone()
                }
            };
            let dst = ctx.func.alloc_reg();
            let opcode = match op {
                BinOp::Add => Opcode::Add { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Sub => Opcode::Sub { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Mul => Opcode::Mul { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Div => Opcode::Div { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Mod => Opcode::Mod { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::And => Opcode::And { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Or => Opcode::Or { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Xor => Opcode::Xor { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Shl => Opcode::Shl { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Shr => Opcode::Shr { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Eq => Opcode::Eq { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Ne => Opcode::Ne { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Lt => Opcode::Lt { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Le => Opcode::Le { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Gt => Opcode::Gt { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::Ge => Opcode::Ge { dst, lhs: lhs_reg, rhs: rhs_reg },
                BinOp::LogicalAnd | BinOp::LogicalOr => unreachable!("handled above"),
            };
            ctx.func.push(Instruction::new(opcode));
            Some((dst, if is_cmp { Type::Bool } else { common }))
        }
        Expr::Unary { op: UnOp::AddressOf, operand, span } => match operand.as_ref() {
            Expr::Ident(name, _) => {
                if let Some((gid, gty)) = ctx.globals.get(name).cloned() {
                    let dst = ctx.func.alloc_reg();
                    ctx.func.push(Instruction::new(Opcode::LoadAddr { dst, sym: Symbol::Global(gid) }));
                    Some((dst, Type::Ptr(Box::new(gty))))
                } else {
                    ctx.diagnostics.push(SemanticError::Unsupported(*span, "address-of a local (locals have no memory address in this build)"));
                    None
                }
            }
            _ => {
                ctx.diagnostics.push(SemanticError::Unsupported(*span, "address-of a non-identifier"));
                None
            }
        },
        Expr::Unary { op: UnOp::Deref, operand, .. } => {
            let (addr_reg, ptr_ty) = lower_expr(ctx, operand)?;
            let pointee = match &ptr_ty {
                Type::Ptr(inner) | Type::MutPtr(inner) => (**inner).clone(),
                _ => Type::UInt(16),
            };
            let dst = ctx.func.alloc_reg();
            ctx.func
                .push(Instruction::new(Opcode::LoadPtr { dst, src_addr: addr_reg, size: pointee.byte_size() }));
            Some((dst, pointee))
        }
        Expr::Unary { op, operand, .. } => {
            let (src, ty) = lower_expr(ctx, operand)?;
            let dst = ctx.func.alloc_reg();
            let opcode = match op {
                UnOp::Neg => Opcode::Neg { dst, src },
                UnOp::BitNot => Opcode::Not { dst, src },
                UnOp::Not => {
                    let one = ctx.func.alloc_reg();
                    ctx.func.push(Instruction::new(Opcode::LoadConst { dst: one, imm: 1 }));
                    Opcode::Xor { dst, lhs: src, rhs: one }
                }
                UnOp::AddressOf | UnOp::Deref => unreachable!("handled above"),
            };
            ctx.func.push(Instruction::new(opcode));
            Some((dst, ty))
        }
        Expr::Cast { expr: inner, ty, span } => {
            let (src, from_ty) = lower_expr(ctx, inner)?;
            let to_ty = match ctx.types.resolve(ty) {
                Some(t) => t,
                None => {
                    ctx.diagnostics.push(SemanticError::UnknownType(*span, type_expr_name(ty)));
                    return None;
                }
            };
            if !cast_allowed(&from_ty, &to_ty) {
                ctx.diagnostics.push(SemanticError::InvalidCast(*span, from_ty, to_ty));
                return None;
            }
            let dst = ctx.func.alloc_reg();
            if let Some(width) = to_ty.bit_width() {
                if width < 64 {
                    let mask_val: i64 = if width >= 63 { -1 } else { (1i64 << width) - 1 };
                    let mask = ctx.func.alloc_reg();
                    ctx.func.push(Instruction::new(Opcode::LoadConst { dst: mask, imm: mask_val }));
                    ctx.func.push(Instruction::new(Opcode::And { dst, lhs: src, rhs: mask }));
                    return Some((dst, to_ty));
                }
            }
            ctx.func.push(Instruction::new(Opcode::Move { dst, src }));
            Some((dst, to_ty))
        }
        Expr::Field { base, name, span } => {
            if let Expr::Ident(enum_name, _) = base.as_ref() {
                if let Some(def) = enum_variant_value(ctx, enum_name, name) {
                    let r = ctx.func.alloc_reg();
                    ctx.func.push(Instruction::new(Opcode::LoadConst { dst: r, imm: def.0 }));
                    return Some((r, def.1));
                }
            }
            let (base_reg, base_ty) = lower_expr(ctx, base)?;
            match &base_ty {
                Type::BitStruct(def) => match def.field_offset(name) {
                    Some((offset, width)) => {
                        let dst = ctx.func.alloc_reg();
                        ctx.func.push(Instruction::new(Opcode::LoadBitField {
                            dst,
                            src: base_reg,
                            offset,
                            width: width as u32,
                        }));
                        Some((dst, Type::UInt(width.max(1))))
                    }
                    None => {
                        ctx.diagnostics.push(SemanticError::UnknownName(*span, name.clone()));
                        None
                    }
                },
                _ => {
                    ctx.diagnostics.push(SemanticError::Unsupported(*span, "field access on a non-bit-struct value"));
                    None
                }
            }
        }
        Expr::Call { callee, args, span } => {
            let Expr::Ident(basename, _) = callee.as_ref() else {
                ctx.diagnostics.push(SemanticError::Unsupported(*span, "indirect calls"));
                return None;
            };
            let lowered_args: Vec<(Reg, Type)> = args.iter().filter_map(|a| lower_expr(ctx, a)).collect();
            if lowered_args.len() != args.len() {
                return None;
            }
            let Some(candidates) = ctx.functions.get(basename) else {
                ctx.diagnostics.push(SemanticError::UnknownName(*span, basename.clone()));
                return None;
            };
            let arg_types: Vec<Type> = lowered_args.iter().map(|(_, t)| t.clone()).collect();
            let list: Vec<Candidate> = candidates
                .iter()
                .map(|c| Candidate { mangled_name: &c.mangled, param_types: &c.params })
                .collect();
            match overload::resolve(&list, &arg_types) {
                overload::Resolution::Unique(i) => {
                    let entry = &candidates[i];
                    if entry.is_interrupt {
                        ctx.diagnostics.push(SemanticError::InterruptReferenced(*span, basename.clone()));
                        return None;
                    }
                    let dst = ctx.func.alloc_reg();
                    let call_args: minz_ir::ArgList = lowered_args.iter().map(|(r, _)| *r).collect();
                    ctx.func.push(Instruction::new(Opcode::Call {
                        dst,
                        sym: Symbol::Function(entry.mangled.clone()),
                        args: call_args,
                    }));
                    Some((dst, entry.ret.clone()))
                }
                overload::Resolution::NoMatch => {
                    ctx.diagnostics.push(SemanticError::NoMatchingOverload(*span, basename.clone()));
                    None
                }
                overload::Resolution::Ambiguous(matches) => {
                    ctx.diagnostics
                        .push(SemanticError::AmbiguousOverload(*span, basename.clone(), matches.len()));
                    None
                }
            }
        }
        Expr::InlineAsm { text, .. } => {
            ctx.func.push(Instruction::new(Opcode::Asm { text: text.clone() }));
            None
        }
        Expr::Meta(m) => lower_meta(ctx, m, false),
        Expr::If { cond, then_branch, else_branch, span } => {
            let Some(else_b) = else_branch else {
                ctx.diagnostics.push(SemanticError::Unsupported(*span, "`if` expression without an `else` branch"));
                return None;
            };
            let Some((cond_reg, _)) = lower_expr(ctx, cond) else { return None };
            let result = ctx.func.alloc_reg();
            let else_label = ctx.func.alloc_label();
            let end_label = ctx.func.alloc_label();
            ctx.func.push(Instruction::new(Opcode::JumpIfNot { cond: cond_reg, target: else_label }));
            let then_val = lower_tail_block(ctx, then_branch);
            if let Some((r, _)) = then_val {
                ctx.func.push(Instruction::new(Opcode::Move { dst: result, src: r }));
            }
            ctx.func.push(Instruction::new(Opcode::Jump { target: end_label }));
            ctx.func.push(Instruction::new(Opcode::Label { label: else_label }));
            let else_val = lower_tail_block(ctx, else_b);
            if let Some((r, _)) = else_val {
                ctx.func.push(Instruction::new(Opcode::Move { dst: result, src: r }));
            }
            ctx.func.push(Instruction::new(Opcode::Label { label: end_label }));
            let ty = then_val.map(|(_, t)| t).or_else(|| else_val.map(|(_, t)| t)).unwrap_or(Type::Void);
            Some((result, ty))
        }
        Expr::Ternary { cond, then_expr, else_expr, .. } => {
            let (cond_reg, _) = lower_expr(ctx, cond)?;
            let result = ctx.func.alloc_reg();
            let else_label = ctx.func.alloc_label();
            let end_label = ctx.func.alloc_label();
            ctx.func.push(Instruction::new(Opcode::JumpIfNot { cond: cond_reg, target: else_label }));
            let (then_reg, ty) = lower_expr(ctx, then_expr)?;
            ctx.func.push(Instruction::new(Opcode::Move { dst: result, src: then_reg }));
            ctx.func.push(Instruction::new(Opcode::Jump { target: end_label }));
            ctx.func.push(Instruction::new(Opcode::Label { label: else_label }));
            let (else_reg, _) = lower_expr(ctx, else_expr)?;
            ctx.func.push(Instruction::new(Opcode::Move { dst: result, src: else_reg }));
            ctx.func.push(Instruction::new(Opcode::Label { label: end_label }));
            Some((result, ty))
        }
        Expr::StructLiteral { span, .. } | Expr::ArrayLiteral { span, .. } | Expr::Lambda { span, .. } => {
            ctx.diagnostics
                .push(SemanticError::Unsupported(*span, "aggregate/lambda values (scalars only in this build)"));
            None
        }
        Expr::Index { span, .. } => {
            ctx.diagnostics.push(SemanticError::Unsupported(*span, "indexing (no array locals in this build)"));
            None
        }
        Expr::Try { span, .. } | Expr::NilCoalesce { span, .. } | Expr::When { span, .. } => {
            ctx.diagnostics
                .push(SemanticError::Unsupported(*span, "error-propagation/pattern-matching expressions"));
            None
        }
    }
}

/// Lowers a block used in tail (value-producing) position: `if`-as-expression
/// arms. The value is whatever the last statement's bare expression
/// evaluates to, if any.
fn lower_tail_block(ctx: &mut FnCtx, block: &Block) -> Option<(Reg, Type)> {
    ctx.push_scope();
    let mut last_val = None;
    for (i, stmt) in block.stmts.iter().enumerate() {
        if i + 1 == block.stmts.len() {
            if let Stmt::Expr(e) = stmt {
                last_val = lower_expr(ctx, e);
                continue;
            }
        }
        lower_stmt(ctx, stmt);
    }
    ctx.pop_scope();
    last_val
}

fn enum_variant_value(ctx: &FnCtx, enum_name: &str, variant: &str) -> Option<(i64, Type)> {
    let def = ctx.types.enum_def(enum_name)?;
    let value = def.variants.iter().find(|v| v.name == variant)?.value;
    Some((value, Type::Enum(def.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_frontend::Param as AstParam;

    #[test]
    fn lowers_trivial_add_function() {
        let types = TypeTable::default();
        let mut file = SourceFile::default();
        file.decls.push(Decl::Function(FunctionDecl {
            name: "add2".into(),
            generics: vec![],
            params: vec![
                AstParam { name: "a".into(), ty: TypeExpr::Named("u16".into()), span: Span::default() },
                AstParam { name: "b".into(), ty: TypeExpr::Named("u16".into()), span: Span::default() },
            ],
            ret_type: TypeExpr::Named("u16".into()),
            errorable: false,
            body: Some(Block {
                stmts: vec![Stmt::Return(
                    Some(Expr::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(Expr::Ident("a".into(), Span::default())),
                        rhs: Box::new(Expr::Ident("b".into(), Span::default())),
                        span: Span::default(),
                    }),
                    Span::default(),
                )],
            }),
            is_interrupt: false,
            is_abi_explicit: false,
            span: Span::default(),
        }));

        let mut lowerer = Lowerer::new(&types, "m");
        lowerer.declare_decls(&file);
        lowerer.lower_decls(&file);
        assert!(lowerer.diagnostics.is_empty(), "{:?}", lowerer.diagnostics.errors);
        assert!(lowerer.module.function_by_name("m_add2$u16$u16").is_some());
    }
}
