#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use miette::Diagnostic;
use refine_ast::{Env, TypedExpr};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("input error: {message}")]
#[diagnostic(code(refine::input))]
pub struct InputError {
    pub message: String,
}

/// A typed expression as produced by the elaborator, plus the signatures it
/// needs beyond the prelude.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct Program {
    /// Source text the spans point into, for diagnostics.
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub signatures: Env,

    pub expr: TypedExpr,
}

impl Program {
    /// Prelude extended (and possibly overridden) by the program's signatures.
    pub fn env(&self) -> Env {
        let mut env = refine_stdlib::prelude();
        env.extend(self.signatures.clone());
        env
    }
}

pub fn parse_program(raw: &str) -> Result<Program, String> {
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

pub fn load_program(path: &Path) -> Result<Program, InputError> {
    let raw = fs::read_to_string(path).map_err(|e| InputError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_program(&raw).map_err(|e| InputError {
        message: format!("failed to parse {}: {e}", path.display()),
    })
}
