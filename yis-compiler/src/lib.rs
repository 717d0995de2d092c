// Yis compiler core: environment construction, lowering, type checking,
// the control-flow lint pass, and the C code generator.
// The driver, lexer and parser live outside this crate; callers hand us
// a `yis_ast::Program` and a `TyArena`.

pub mod codegen;
pub mod env;
pub mod lint;
pub mod lower;
pub mod typecheck;
pub mod types;

// Re-export diagnostics from yis-diagnostics crate
pub use yis_diagnostics as diagnostics;

pub use codegen::emit_c;
pub use diagnostics::{Diag, Level};
pub use env::{build_global_env, GlobalEnv};
pub use lint::{lint_program, LintMode, LintReport};
pub use lower::lower_program;
pub use typecheck::typecheck_program;
pub use types::{Prim, Subst, Ty, TyArena};

use thiserror::Error;
use yis_ast::Program;

/// Failure of the whole-pipeline convenience entry point, keeping the
/// failing stage visible to the driver.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("type error: {0}")]
    Typecheck(Diag),
    #[error("codegen failed: {0}")]
    Codegen(Diag),
}

impl CompileError {
    pub fn diag(&self) -> &Diag {
        match self {
            CompileError::Typecheck(d) | CompileError::Codegen(d) => d,
        }
    }
}

/// Lower, type-check and emit a single C translation unit for `prog`.
/// The arena and environment live only for the duration of the call;
/// the returned string is the complete TU (runtime prelude included).
pub fn compile_to_c(prog: &Program) -> Result<String, CompileError> {
    let lowered = lower_program(prog);
    let arena = TyArena::new();
    typecheck_program(&lowered, &arena).map_err(CompileError::Typecheck)?;
    emit_c(&lowered, &arena).map_err(CompileError::Codegen)
}
