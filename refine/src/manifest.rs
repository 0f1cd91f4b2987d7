#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use refine_verify::SolverConf;
use thiserror::Error;

pub const MANIFEST_NAME: &str = "refine.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("manifest error: {message}")]
#[diagnostic(code(refine::manifest))]
pub struct ManifestError {
    pub message: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Manifest {
    #[serde(default)]
    solver: Option<Solver>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Solver {
    #[serde(default)]
    command: Option<String>,

    #[serde(default)]
    args: Option<Vec<String>>,

    // Relative to the manifest's directory.
    #[serde(default)]
    tee: Option<String>,
}

pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(MANIFEST_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        let parent = cur.parent().map(|p| p.to_path_buf());
        match parent {
            Some(p) => cur = p,
            None => return None,
        }
    }
}

/// Solver configuration from the nearest `refine.toml`, defaults otherwise.
pub fn load_solver_conf(start: &Path) -> Result<SolverConf, ManifestError> {
    let Some(manifest_path) = find_manifest(start) else {
        return Ok(SolverConf::default());
    };
    let raw = fs::read_to_string(&manifest_path).map_err(|e| ManifestError {
        message: format!("failed to read {}: {e}", manifest_path.display()),
    })?;
    let manifest_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    log::debug!("using {}", manifest_path.display());
    parse_solver_conf(&raw, manifest_dir).map_err(|message| ManifestError {
        message: format!("failed to parse {}: {message}", manifest_path.display()),
    })
}

pub fn parse_solver_conf(raw: &str, manifest_dir: &Path) -> Result<SolverConf, String> {
    let parsed: Manifest = toml::from_str(raw).map_err(|e| e.to_string())?;
    let mut conf = SolverConf::default();
    if let Some(solver) = parsed.solver {
        if let Some(command) = solver.command {
            conf.command = command;
        }
        if let Some(args) = solver.args {
            conf.args = args;
        }
        conf.tee = solver.tee.map(|t| manifest_dir.join(t));
    }
    Ok(conf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_keeps_defaults() {
        let conf = parse_solver_conf("", Path::new("/proj")).expect("parse");
        assert_eq!(conf, SolverConf::default());
    }

    #[test]
    fn solver_table_overrides_defaults() {
        let raw = r#"
[solver]
command = "cvc5"
args = ["--lang=smt2", "--incremental"]
tee = "out/run.smt2"
"#;
        let conf = parse_solver_conf(raw, Path::new("/proj")).expect("parse");
        assert_eq!(conf.command, "cvc5");
        assert_eq!(conf.args, ["--lang=smt2", "--incremental"]);
        assert_eq!(conf.tee, Some(PathBuf::from("/proj/out/run.smt2")));
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        assert!(parse_solver_conf("[solver]\nargs = 3", Path::new(".")).is_err());
    }
}
