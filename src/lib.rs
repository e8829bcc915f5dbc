//! A small JIT that turns slot-based vector instruction text into AVX code.
//!
//! ```no_run
//! let exe = vexjit::assemble("const 0 2.0\nldp 0 0\nldl 1 0\nmul 2 0 1\nstl 2 0\n")?;
//! let mut locals = vec![3.0f32; exe.locals_len()];
//! exe.run(&mut locals)?;
//! assert!(locals.iter().all(|x| *x == 6.0));
//! # Ok::<(), vexjit::Error>(())
//! ```

pub mod arch;
pub mod asm_parse;
pub mod compiler;
pub mod error;
pub mod executable;
pub mod functable;
pub mod stmt;
pub mod stmt_parse;

#[cfg(test)]
mod disasm_tests;

pub use arch::SimdKind;
pub use compiler::AssembleOptions;
pub use error::{Error, Result};
pub use executable::{CodePage, Executable, assemble, assemble_with};
pub use functable::{FUNC_NAMES, FunctionTable};
pub use stmt::{StmtGraph, StmtId, StmtKind, StmtNode};
pub use stmt_parse::parse_graph;
