//! Compile-time constant evaluation for `@assert`/`@minz` conditions.
//!
//! Rather than hand-rolling a second evaluator, a constant expression is
//! lowered into a throwaway single-function module and handed to the same
//! `minz-interp` VM the optimizer's CTIE pass uses (spec §4.6): one
//! evaluator, one set of semantics, exercised from two call sites.

use minz_frontend::{BinOp, Expr, Literal, UnOp};
use minz_ir::{Function, Instruction, Module, Opcode, Type};
use minz_interp::{Vm, VmConfig};

/// Evaluates `expr` as a compile-time integer constant, or `None` if it
/// is not reducible to one in this build (names, calls, and anything
/// else a plain constant-folder can't see through).
pub fn eval_const_int(expr: &Expr) -> Option<i64> {
    let mut f = Function::new("__const", Type::Int(32));
    let dst = lower_const_expr(&mut f, expr)?;
    f.push(Instruction::new(Opcode::Return { src: Some(dst) }));
    let mut m = Module::new("__const");
    let main = rename_to_main(f);
    let id = m.declare_function(main);
    let mut vm = Vm::new(&m, VmConfig::for_ctie()).ok()?;
    vm.run().ok().map(|r| r.exit_code)
}

fn rename_to_main(mut f: Function) -> Function {
    f.name = "main".to_string();
    f
}

fn lower_const_expr(f: &mut Function, expr: &Expr) -> Option<minz_ir::Reg> {
    match expr {
        Expr::Literal(Literal::Int(v), _) => {
            let r = f.alloc_reg();
            f.push(Instruction::new(Opcode::LoadConst { dst: r, imm: *v }));
            Some(r)
        }
        Expr::Literal(Literal::Bool(b), _) => {
            let r = f.alloc_reg();
            f.push(Instruction::new(Opcode::LoadConst { dst: r, imm: *b as i64 }));
            Some(r)
        }
        Expr::Unary { op, operand, .. } => {
            let src = lower_const_expr(f, operand)?;
            let dst = f.alloc_reg();
            let opcode = match op {
                UnOp::Neg => Opcode::Neg { dst, src },
                UnOp::BitNot => Opcode::Not { dst, src },
                UnOp::Not => Opcode::Not { dst, src },
                UnOp::AddressOf | UnOp::Deref => return None,
            };
            f.push(Instruction::new(opcode));
            Some(dst)
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let l = lower_const_expr(f, lhs)?;
            let r = lower_const_expr(f, rhs)?;
            let dst = f.alloc_reg();
            let opcode = match op {
                BinOp::Add => Opcode::Add { dst, lhs: l, rhs: r },
                BinOp::Sub => Opcode::Sub { dst, lhs: l, rhs: r },
                BinOp::Mul => Opcode::Mul { dst, lhs: l, rhs: r },
                BinOp::Div => Opcode::Div { dst, lhs: l, rhs: r },
                BinOp::Mod => Opcode::Mod { dst, lhs: l, rhs: r },
                BinOp::And => Opcode::And { dst, lhs: l, rhs: r },
                BinOp::Or => Opcode::Or { dst, lhs: l, rhs: r },
                BinOp::Xor => Opcode::Xor { dst, lhs: l, rhs: r },
                BinOp::Shl => Opcode::Shl { dst, lhs: l, rhs: r },
                BinOp::Shr => Opcode::Shr { dst, lhs: l, rhs: r },
                BinOp::Eq => Opcode::Eq { dst, lhs: l, rhs: r },
                BinOp::Ne => Opcode::Ne { dst, lhs: l, rhs: r },
                BinOp::Lt => Opcode::Lt { dst, lhs: l, rhs: r },
                BinOp::Le => Opcode::Le { dst, lhs: l, rhs: r },
                BinOp::Gt => Opcode::Gt { dst, lhs: l, rhs: r },
                BinOp::Ge => Opcode::Ge { dst, lhs: l, rhs: r },
                BinOp::LogicalAnd => Opcode::And { dst, lhs: l, rhs: r },
                BinOp::LogicalOr => Opcode::Or { dst, lhs: l, rhs: r },
            };
            f.push(Instruction::new(opcode));
            Some(dst)
        }
        _ => None,
    }
}

pub fn eval_const_bool(expr: &Expr) -> Option<bool> {
    eval_const_int(expr).map(|v| v != 0)
}
