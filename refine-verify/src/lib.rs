#![forbid(unsafe_code)]

//! Refinement contract checking against an external SMT solver.
//!
//! [`prove`] walks a typed expression, proves every precondition and cast
//! contract it meets (the negated goal must be `unsat`) and assumes every callee
//! postcondition, all inside one solver [`Session`].

pub mod config;
pub mod error;
pub mod fresh;
pub mod smt;
pub mod solver;
pub mod sort;
pub mod verify;

pub use config::SolverConf;
pub use error::{ErrorKind, Res, VerifyError};
pub use fresh::FreshNames;
pub use smt::{Bindings, Translator};
pub use solver::{ExitReport, Session, Transport, Z3Process};
pub use sort::Sort;
pub use verify::{prove, Checker, Mode, Summary, Verifier};
