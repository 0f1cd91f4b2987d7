#![forbid(unsafe_code)]

use std::path::PathBuf;

use serde::Deserialize;

/// How to launch the external solver.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SolverConf {
    /// Solver executable, looked up on `PATH` when relative.
    pub command: String,
    /// Arguments putting the solver in interactive SMT-LIB 2 mode.
    pub args: Vec<String>,
    /// Mirror every command sent to the solver into this file.
    pub tee: Option<PathBuf>,
}

impl Default for SolverConf {
    fn default() -> Self {
        Self::z3()
    }
}

impl SolverConf {
    pub fn z3() -> Self {
        Self {
            command: "z3".to_string(),
            args: vec!["-in".to_string(), "-smt2".to_string()],
            tee: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_tee(mut self, path: impl Into<PathBuf>) -> Self {
        self.tee = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_interactive_z3() {
        let conf = SolverConf::default();
        assert_eq!(conf.command, "z3");
        assert_eq!(conf.args, ["-in", "-smt2"]);
        assert!(conf.tee.is_none());
    }

    #[test]
    fn builders_override_fields() {
        let conf = SolverConf::z3()
            .with_command("cvc5")
            .with_args(vec!["--lang=smt2".to_string(), "--incremental".to_string()])
            .with_tee("run.smt2");
        assert_eq!(conf.command, "cvc5");
        assert_eq!(conf.args.len(), 2);
        assert_eq!(conf.tee, Some(PathBuf::from("run.smt2")));
    }
}
