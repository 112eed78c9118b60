//! The canonical human-readable MIR text form (spec component G, §4.2,
//! §6.3): a debugging/golden-test codec, not a production serialization
//! format — the binary/in-memory `Module` is what every other component
//! actually consumes.

mod emitter;
mod error;
mod lexer;
mod parser;

pub use emitter::emit;
pub use error::{Location, ParseError, ParseResult};
pub use parser::parse;

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Function, Instruction, Module, Opcode, Symbol, Type};

    fn sample_module() -> Module {
        let mut m = Module::new("prog");
        m.declare_global(minz_ir::Global { name: "counter".into(), ty: Type::UInt(16), init: Some(0), bytes: Vec::new() });
        let greeting = m.intern_string("Hello");

        let mut double = Function::new("prog_double$u16", Type::UInt(16));
        let n = double.add_param("n", Type::UInt(16));
        let two = double.alloc_reg();
        let r = double.alloc_reg();
        double.push(Instruction::new(Opcode::LoadConst { dst: two, imm: 2 }));
        double.push(Instruction::new(Opcode::Mul { dst: r, lhs: n, rhs: two }).with_comment("doubling"));
        double.push(Instruction::new(Opcode::Return { src: Some(r) }));
        m.declare_function(double);

        let mut main = Function::new("main", Type::Void);
        let msg = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadAddr { dst: msg, sym: Symbol::String(greeting) }));
        main.push(Instruction::new(Opcode::PrintStringDirect { sym: Symbol::String(greeting) }));
        let a = main.alloc_reg();
        let b = main.alloc_reg();
        let arg = main.alloc_reg();
        let result = main.alloc_reg();
        main.push(Instruction::new(Opcode::LoadConst { dst: a, imm: 20 }).with_size(16));
        main.push(Instruction::new(Opcode::LoadConst { dst: b, imm: 1 }));
        main.push(Instruction::new(Opcode::Add { dst: arg, lhs: a, rhs: b }));
        main.push(Instruction::new(Opcode::Call {
            dst: result,
            sym: Symbol::Function("prog_double$u16".into()),
            args: smallvec::smallvec![arg],
        }));
        let l0 = main.alloc_label();
        main.push(Instruction::new(Opcode::JumpIfNot { cond: result, target: l0 }));
        main.push(Instruction::new(Opcode::Halt));
        main.push(Instruction::new(Opcode::Label { label: l0 }));
        main.push(Instruction::new(Opcode::Return { src: None }));
        m.declare_function(main);

        m
    }

    fn try_init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn round_trips_through_text() {
        try_init_logger();
        let m = sample_module();
        let text = emit(&m).expect("emit should succeed");
        let reparsed = parse(&text).expect("parse should succeed");
        assert_eq!(format!("{m:?}"), format!("{reparsed:?}"));
    }

    #[test]
    fn emitting_twice_is_stable() {
        let m = sample_module();
        let text1 = emit(&m).unwrap();
        let reparsed = parse(&text1).unwrap();
        let text2 = emit(&reparsed).unwrap();
        assert_eq!(text1, text2);
    }

    #[test]
    fn unsupported_type_refuses_to_emit() {
        let mut m = Module::new("prog");
        let def = std::sync::Arc::new(minz_ir::StructDef { name: "Point".into(), fields: Vec::new() });
        let f = Function::new("m_f", Type::Struct(def));
        m.declare_function(f);
        assert!(emit(&m).is_err());
    }

    #[test]
    fn parse_error_reports_line_number() {
        let err = parse("module prog\ngarbage line here\n").unwrap_err();
        assert_eq!(err.location.line_number, 2);
    }

    #[test]
    fn comment_round_trips_on_the_instruction_it_annotates() {
        let m = sample_module();
        let text = emit(&m).unwrap();
        assert!(text.contains("; doubling"));
        let reparsed = parse(&text).unwrap();
        let id = reparsed.function_by_name("prog_double$u16").unwrap();
        let f = reparsed.function(id);
        let mul = f.instructions.iter().find(|i| matches!(i.opcode, Opcode::Mul { .. })).unwrap();
        assert_eq!(mul.comment.as_deref(), Some("doubling"));
    }
}

/// Generates a single straight-line function whose instructions form a
/// valid def-use chain (one parameter, a short sequence of binary ops each
/// consuming only already-defined registers, ending in a `Return`), then
/// checks `parse(emit(m)) == m` (spec §8 Testable Property 1).
#[cfg(test)]
mod roundtrip_proptests {
    use super::*;
    use minz_ir::{Function, Instruction, Module, Opcode, Reg, Type};
    use proptest::prelude::*;

    fn binary_opcode(tag: u8, dst: Reg, lhs: Reg, rhs: Reg) -> Opcode {
        match tag % 6 {
            0 => Opcode::Add { dst, lhs, rhs },
            1 => Opcode::Sub { dst, lhs, rhs },
            2 => Opcode::Mul { dst, lhs, rhs },
            3 => Opcode::And { dst, lhs, rhs },
            4 => Opcode::Or { dst, lhs, rhs },
            _ => Opcode::Xor { dst, lhs, rhs },
        }
    }

    fn build_module(ops: &[(u8, u8, u8)]) -> Module {
        let mut m = Module::new("prog");
        let mut f = Function::new("prog_f$u16", Type::UInt(16));
        let a = f.add_param("a", Type::UInt(16));
        let mut available = vec![a];

        for &(tag, lhs_pick, rhs_pick) in ops {
            let lhs = available[lhs_pick as usize % available.len()];
            let rhs = available[rhs_pick as usize % available.len()];
            let dst = f.alloc_reg();
            f.push(Instruction::new(binary_opcode(tag, dst, lhs, rhs)));
            available.push(dst);
        }

        f.push(Instruction::new(Opcode::Return { src: available.last().copied() }));
        m.declare_function(f);
        m
    }

    proptest! {
        #[test]
        fn parse_of_emit_reconstructs_the_module(ops in prop::collection::vec((any::<u8>(), any::<u8>(), any::<u8>()), 0..12)) {
            let m = build_module(&ops);
            let text = emit(&m).expect("a module built only from binary ops always emits");
            let reparsed = parse(&text).expect("emitter output always re-parses");
            prop_assert_eq!(format!("{m:?}"), format!("{reparsed:?}"));
        }
    }
}
