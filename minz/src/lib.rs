//! Wires the MinZ pipeline together (SPEC_FULL.md §2 control flow): a typed
//! AST goes in, a [`minz_ir::Module`] comes out of the front half
//! (`analyze` + `optimize`), and the back half either runs it on
//! [`minz_interp::Vm`] or lowers it to Z80 assembly via
//! [`minz_codegen_z80::compile_module`]. Mirrors the teacher's
//! `cranelift-umbrella` role: no logic of its own beyond sequencing the
//! component crates, all of which this crate re-exports for a host driver
//! (out of scope here, spec §1) to depend on a single crate.

pub use minz_analyzer::{analyze, AnalyzeError};
pub use minz_codegen_z80::{compile_module, BackendError, CompiledModule};
pub use minz_frontend::SourceFile;
pub use minz_interp::{RunResult, Vm, VmConfig, VmError};
pub use minz_ir::{IrError, Module, TargetConfig};
pub use minz_mir_text as mir_text;
pub use minz_opt::{optimize, OptConfig, OptError, OptStats};
pub use minz_z80emu as z80emu;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
    #[error(transparent)]
    Optimize(#[from] OptError),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Runs a source file through semantic analysis and optimization, producing
/// the `Module` every backend (VM, Z80 codegen) consumes.
///
/// Matches the pipeline order implied by spec §2: parse (external,
/// `minz-frontend`'s concern) → analyze (`minz-analyzer`) → optimize
/// (`minz-opt`) → {interpret, lower}.
pub fn compile(file: &SourceFile, opt_config: &OptConfig) -> PipelineResult<Module> {
    log::debug!("analyzing module {:?}", file.module_name);
    let mut module = analyze(file)?;
    optimize(&mut module, opt_config)?;
    Ok(module)
}

/// Runs `module`'s `main` function on the reference interpreter.
pub fn run(module: &Module, vm_config: VmConfig) -> PipelineResult<RunResult> {
    let mut vm = Vm::new(module, vm_config)?;
    Ok(vm.run()?)
}

/// Lowers `module` to Z80 assembly for `target`.
pub fn lower_to_z80(module: &Module, target: &TargetConfig) -> PipelineResult<CompiledModule> {
    Ok(compile_module(module, target)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_frontend::{Block, Decl, FunctionDecl, Span, Stmt, TypeExpr};

    fn try_init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn dummy_span() -> Span {
        Span { line: 1, column: 1, byte_offset: 0 }
    }

    fn trivial_main_source() -> SourceFile {
        SourceFile {
            module_name: Some("pipeline_smoke".into()),
            imports: vec![],
            decls: vec![Decl::Function(FunctionDecl {
                name: "main".into(),
                generics: vec![],
                params: vec![],
                ret_type: TypeExpr::Named("void".into()),
                errorable: false,
                body: Some(Block { stmts: vec![Stmt::Return(None, dummy_span())] }),
                is_interrupt: false,
                is_abi_explicit: false,
                span: dummy_span(),
            })],
        }
    }

    #[test]
    fn compile_then_run_a_trivial_main() {
        try_init_logger();
        let file = trivial_main_source();
        let module = compile(&file, &OptConfig::all_passes()).expect("analysis+optimize succeeds");
        let result = run(&module, VmConfig::default()).expect("vm run succeeds");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn compile_then_lower_to_zx_spectrum() {
        try_init_logger();
        let file = trivial_main_source();
        let module = compile(&file, &OptConfig::all_passes()).expect("analysis+optimize succeeds");
        let compiled = lower_to_z80(&module, &TargetConfig::zx_spectrum_48k()).expect("lowering succeeds");
        assert!(compiled.assembly.contains("main"));
    }
}
