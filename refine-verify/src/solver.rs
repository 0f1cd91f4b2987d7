#![forbid(unsafe_code)]

//! Line-oriented session with an external SMT-LIB 2 solver.
//!
//! A [`Session`] is generic over its [`Transport`], so the checker can be driven
//! by the real solver process ([`Z3Process`]) or by a scripted stand-in in tests.
//! Every command written goes to the session transcript.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::config::SolverConf;
use crate::error::{Res, VerifyError};

/// Disables global declarations so `pop` also forgets declarations.
pub const SCOPED_DECLARATIONS: &str = "(set-option :global-declarations false)";

/// Echoed back by the solver once everything sent before it was processed.
pub const SYNC_MARKER: &str = "refine-sync";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExitReport {
    pub success: bool,
    /// Exit status plus whatever the solver left on stderr.
    pub status: String,
}

/// Two-way line channel to a solver.
pub trait Transport: Sized {
    type Conf;

    fn launch(conf: &Self::Conf) -> Res<Self>;

    /// Fire-and-forget: nothing is read back.
    fn send_line(&mut self, line: &str) -> Res<()>;

    /// Blocks until the solver answers one line.
    fn recv_line(&mut self) -> Res<String>;

    /// Closes the channel and waits for the solver to exit.
    fn shutdown(&mut self) -> Res<ExitReport>;
}

/// Solver running as a child process, `z3 -in -smt2` by default.
pub struct Z3Process {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    tee: Option<File>,
}

impl Transport for Z3Process {
    type Conf = SolverConf;

    fn launch(conf: &SolverConf) -> Res<Self> {
        log::debug!("spawning solver `{} {}`", conf.command, conf.args.join(" "));
        let mut child = Command::new(&conf.command)
            .args(&conf.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VerifyError::from(e).with_context(&format!("failed to spawn `{}`", conf.command)))?;

        let stdin = child.stdin.take();
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(VerifyError::protocol("failed to open the solver's stdout pipe"));
        };
        let tee = match &conf.tee {
            Some(path) => Some(File::create(path).map_err(|e| {
                VerifyError::from(e).with_context(&format!("failed to create {}", path.display()))
            })?),
            None => None,
        };
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            tee,
        })
    }

    fn send_line(&mut self, line: &str) -> Res<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VerifyError::protocol("solver stdin already closed"))?;
        writeln!(stdin, "{line}")?;
        stdin.flush()?;
        if let Some(tee) = self.tee.as_mut() {
            writeln!(tee, "{line}")?;
        }
        Ok(())
    }

    fn recv_line(&mut self) -> Res<String> {
        let mut line = String::new();
        let read = self.stdout.read_line(&mut line)?;
        if read == 0 {
            return Err(VerifyError::protocol("solver closed its output"));
        }
        Ok(line.trim_end().to_string())
    }

    fn shutdown(&mut self) -> Res<ExitReport> {
        // Closing stdin lets the solver exit even if `(exit)` was lost.
        drop(self.stdin.take());
        let status = self.child.wait()?;
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let mut status_s = status.to_string();
        if !stderr.trim().is_empty() {
            status_s.push_str(": ");
            status_s.push_str(stderr.trim());
        }
        Ok(ExitReport {
            success: status.success(),
            status: status_s,
        })
    }
}

impl Drop for Z3Process {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Owns the solver, its assertion-scope depth and the transcript of commands.
pub struct Session<T: Transport> {
    conf: T::Conf,
    transport: Option<T>,
    depth: usize,
    transcript: Vec<String>,
    /// Global declaration key to the scope depth it was sent at.
    declared: BTreeMap<String, usize>,
}

impl Session<Z3Process> {
    pub fn z3(conf: SolverConf) -> Self {
        Self::new(conf)
    }
}

impl<T: Transport> Session<T> {
    /// Not started yet: nothing is launched until [`Session::start`].
    pub fn new(conf: T::Conf) -> Self {
        Self {
            conf,
            transport: None,
            depth: 0,
            transcript: Vec::new(),
            declared: BTreeMap::new(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.transport.is_some()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Launches the solver once; later calls are no-ops.
    pub fn start(&mut self) -> Res<()> {
        if self.transport.is_some() {
            return Ok(());
        }
        self.transport = Some(T::launch(&self.conf)?);
        self.depth = 0;
        self.write(SCOPED_DECLARATIONS)
    }

    /// Terminates the solver and checks it left cleanly at depth zero.
    pub fn stop(&mut self) -> Res<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        self.transcript.push("(exit)".to_string());
        let sent = transport.send_line("(exit)");
        let report = transport.shutdown();
        let depth = std::mem::replace(&mut self.depth, 0);
        self.declared.clear();

        sent?;
        let report = report?;
        if !report.success {
            log::error!("solver transcript:\n{}", self.transcript.join("\n"));
            return Err(VerifyError::protocol(format!(
                "solver exited abnormally ({})",
                report.status
            )));
        }
        log::debug!("solver transcript:\n{}", self.transcript.join("\n"));
        if depth != 0 {
            return Err(VerifyError::protocol(format!(
                "scope depth is {depth} at solver shutdown, expected 0"
            )));
        }
        Ok(())
    }

    pub fn write(&mut self, line: impl Into<String>) -> Res<()> {
        let line = line.into();
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| VerifyError::misuse(format!("write before start: `{line}`")))?;
        log::trace!("> {line}");
        transport.send_line(&line)?;
        self.transcript.push(line);
        Ok(())
    }

    /// One response line. A solver `(error ...)` line is a protocol failure,
    /// never an answer.
    pub fn read(&mut self) -> Res<String> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| VerifyError::misuse("read before start"))?;
        let line = transport.recv_line()?;
        log::trace!("< {line}");
        if line.starts_with("(error") {
            return Err(VerifyError::protocol(format!("solver rejected a command: {line}")));
        }
        Ok(line)
    }

    pub fn push(&mut self) -> Res<()> {
        self.write("(push 1)")?;
        self.depth += 1;
        Ok(())
    }

    /// The depth drops even if the command cannot be sent. Globals declared
    /// inside the popped scope are forgotten along with it.
    pub fn pop(&mut self) -> Res<()> {
        self.depth = self.depth.saturating_sub(1);
        let depth = self.depth;
        self.declared.retain(|_, at| *at <= depth);
        self.write("(pop 1)")
    }

    /// Runs `body` inside a fresh assertion scope. The scope is popped whatever
    /// `body` returns, and the body's error wins over the pop's.
    pub fn push_pop<R>(&mut self, body: impl FnOnce(&mut Self) -> Res<R>) -> Res<R> {
        self.push()?;
        let res = body(self);
        let popped = self.pop();
        settle(res, popped)
    }

    /// `(check-sat)` and its one-line answer.
    pub fn check_sat(&mut self) -> Res<String> {
        self.write("(check-sat)")?;
        self.read()
    }

    /// Waits until the solver has processed every command sent so far. Commands
    /// without a response only report errors this way.
    pub fn sync(&mut self) -> Res<()> {
        self.write(format!("(echo \"{SYNC_MARKER}\")"))?;
        let line = self.read()?;
        if line.trim_matches('"') != SYNC_MARKER {
            return Err(VerifyError::protocol(format!(
                "unexpected solver output `{line}`"
            )));
        }
        Ok(())
    }

    /// Sends `line` unless a declaration keyed `key` is still in scope.
    pub fn declare_global(&mut self, key: &str, line: impl Into<String>) -> Res<()> {
        if self.declared.contains_key(key) {
            return Ok(());
        }
        self.write(line)?;
        self.declared.insert(key.to_string(), self.depth);
        Ok(())
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("while stopping solver: {e}");
        }
    }
}

/// Result of a scoped operation: the body's error first, then the pop's.
pub(crate) fn settle<R>(res: Res<R>, popped: Res<()>) -> Res<R> {
    match (res, popped) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(r), Ok(())) => Ok(r),
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::cell::RefCell;
    use std::collections::{BTreeSet, VecDeque};
    use std::rc::Rc;

    use super::*;

    /// Stands in for a solver: answers `(check-sat)` from a script, echoes, and
    /// rejects redeclarations the way z3 does.
    pub struct Scripted {
        answers: Rc<RefCell<VecDeque<String>>>,
        output: VecDeque<String>,
        scopes: Vec<BTreeSet<String>>,
        pub exit_ok: bool,
    }

    /// Answers are shared by every launch, so a relaunched solver continues the
    /// script.
    #[derive(Clone, Debug, Default)]
    pub struct Script {
        pub answers: Rc<RefCell<VecDeque<String>>>,
        pub fail_launch: bool,
        pub abnormal_exit: bool,
    }

    impl Script {
        pub fn answering(answers: &[&str]) -> Self {
            Self {
                answers: Rc::new(RefCell::new(answers.iter().map(|a| a.to_string()).collect())),
                ..Self::default()
            }
        }
    }

    fn declared_name(line: &str) -> Option<&str> {
        ["(declare-const ", "(declare-fun ", "(declare-sort "]
            .iter()
            .find_map(|p| line.strip_prefix(*p))
            .and_then(|rest| rest.split_whitespace().next())
    }

    impl Transport for Scripted {
        type Conf = Script;

        fn launch(conf: &Script) -> Res<Self> {
            if conf.fail_launch {
                return Err(VerifyError::protocol("no solver"));
            }
            Ok(Self {
                answers: Rc::clone(&conf.answers),
                output: VecDeque::new(),
                scopes: vec![BTreeSet::new()],
                exit_ok: !conf.abnormal_exit,
            })
        }

        fn send_line(&mut self, line: &str) -> Res<()> {
            if line == "(check-sat)" {
                if let Some(answer) = self.answers.borrow_mut().pop_front() {
                    self.output.push_back(answer);
                }
            } else if line == "(push 1)" {
                self.scopes.push(BTreeSet::new());
            } else if line == "(pop 1)" {
                if self.scopes.len() > 1 {
                    self.scopes.pop();
                }
            } else if let Some(text) = line.strip_prefix("(echo ").and_then(|r| r.strip_suffix(')')) {
                self.output.push_back(text.trim_matches('"').to_string());
            } else if let Some(name) = declared_name(line) {
                if self.scopes.iter().any(|scope| scope.contains(name)) {
                    self.output
                        .push_back(format!("(error \"invalid declaration, `{name}` already declared\")"));
                } else if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.to_string());
                }
            }
            Ok(())
        }

        fn recv_line(&mut self) -> Res<String> {
            self.output
                .pop_front()
                .ok_or_else(|| VerifyError::protocol("script exhausted"))
        }

        fn shutdown(&mut self) -> Res<ExitReport> {
            Ok(ExitReport {
                success: self.exit_ok,
                status: if self.exit_ok { "exit status: 0" } else { "exit status: 1" }.to_string(),
            })
        }
    }

    pub fn session(answers: &[&str]) -> Session<Scripted> {
        Session::new(Script::answering(answers))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::scripted::{session, Script, Scripted};
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn write_before_start_is_misuse() {
        let mut s = session(&[]);
        let err = s.write("(check-sat)").expect_err("not started");
        assert_eq!(err.kind, ErrorKind::SessionMisuse);
        let err = s.read().expect_err("not started");
        assert_eq!(err.kind, ErrorKind::SessionMisuse);
    }

    #[test]
    fn start_is_idempotent_and_configures_scoping() {
        let mut s = session(&[]);
        s.start().expect("start");
        s.start().expect("start again");
        assert_eq!(s.transcript(), [SCOPED_DECLARATIONS]);
        s.stop().expect("stop");
    }

    #[test]
    fn push_pop_pops_on_failure() {
        let mut s = session(&[]);
        s.start().expect("start");
        let err = s
            .push_pop(|s| {
                s.write("(assert false)")?;
                Err::<(), _>(VerifyError::unsupported("boom"))
            })
            .expect_err("body failed");
        assert_eq!(err.message, "boom");
        assert_eq!(s.depth(), 0);
        assert_eq!(
            s.transcript(),
            [SCOPED_DECLARATIONS, "(push 1)", "(assert false)", "(pop 1)"]
        );
        s.stop().expect("stop");
    }

    #[test]
    fn check_sat_reads_one_line() {
        let mut s = session(&["unsat", "sat"]);
        s.start().expect("start");
        assert_eq!(s.check_sat().expect("first"), "unsat");
        assert_eq!(s.check_sat().expect("second"), "sat");
        assert!(s.check_sat().is_err());
    }

    #[test]
    fn stop_reports_unbalanced_scopes() {
        let mut s = session(&[]);
        s.start().expect("start");
        s.push().expect("push");
        let err = s.stop().expect_err("depth 1 at shutdown");
        assert_eq!(err.kind, ErrorKind::Protocol);
        assert!(!s.is_started());
    }

    #[test]
    fn stop_reports_abnormal_exit() {
        let mut s: Session<Scripted> = Session::new(Script {
            abnormal_exit: true,
            ..Script::default()
        });
        s.start().expect("start");
        let err = s.stop().expect_err("abnormal exit");
        assert!(err.message.contains("abnormally"), "{}", err.message);
    }

    #[test]
    fn failed_launch_leaves_session_stopped() {
        let mut s: Session<Scripted> = Session::new(Script {
            fail_launch: true,
            ..Script::default()
        });
        assert!(s.start().is_err());
        assert!(!s.is_started());
    }

    #[test]
    fn globals_are_declared_once() {
        let mut s = session(&[]);
        s.start().expect("start");
        s.declare_global("n", "(declare-const n Int)").expect("first");
        s.declare_global("n", "(declare-const n Int)").expect("second");
        assert_eq!(s.transcript().len(), 2);
    }

    #[test]
    fn globals_declared_in_a_scope_are_forgotten_by_its_pop() {
        let mut s = session(&[]);
        s.start().expect("start");
        s.push().expect("push");
        s.declare_global("n", "(declare-const n Int)").expect("inside a scope");
        s.pop().expect("pop");
        s.declare_global("n", "(declare-const n Int)").expect("after the pop");
        assert_eq!(
            s.transcript(),
            [
                SCOPED_DECLARATIONS,
                "(push 1)",
                "(declare-const n Int)",
                "(pop 1)",
                "(declare-const n Int)",
            ]
        );
        s.sync().expect("no redeclaration reported");
        s.stop().expect("stop");
    }

    #[test]
    fn error_line_is_not_an_answer() {
        let mut s = session(&["unsat"]);
        s.start().expect("start");
        s.write("(declare-const x Int)").expect("declare");
        s.write("(declare-const x Int)").expect("redeclare");
        let err = s.check_sat().expect_err("the error line comes first");
        assert_eq!(err.kind, ErrorKind::Protocol);
        assert!(err.message.contains("already declared"), "{}", err.message);
    }

    #[test]
    fn sync_reports_errors_of_silent_commands() {
        let mut s = session(&[]);
        s.start().expect("start");
        s.write("(declare-const x Int)").expect("declare");
        s.sync().expect("clean so far");
        s.write("(declare-const x Int)").expect("redeclare");
        let err = s.sync().expect_err("redeclaration");
        assert_eq!(err.kind, ErrorKind::Protocol);
    }

    #[test]
    fn sync_rejects_stray_output() {
        let mut s = session(&["sat"]);
        s.start().expect("start");
        // An answer nobody read.
        s.write("(check-sat)").expect("check-sat");
        let err = s.sync().expect_err("stray answer");
        assert!(err.message.contains("`sat`"), "{}", err.message);
    }

    /// Nested scopes, each body failing or not.
    #[derive(Clone, Debug)]
    enum Scope {
        Ok(Vec<Scope>),
        Fail(Vec<Scope>),
    }

    fn scope() -> impl Strategy<Value = Scope> {
        let leaf = prop_oneof![Just(Scope::Ok(vec![])), Just(Scope::Fail(vec![]))];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Scope::Ok),
                prop::collection::vec(inner, 0..4).prop_map(Scope::Fail),
            ]
        })
    }

    fn run(s: &mut Session<Scripted>, scope: &Scope) -> Res<()> {
        s.push_pop(|s| {
            let (children, fail) = match scope {
                Scope::Ok(c) => (c, false),
                Scope::Fail(c) => (c, true),
            };
            for child in children {
                // Sibling failures are swallowed so later siblings still run.
                let _ = run(s, child);
            }
            if fail {
                Err(VerifyError::unsupported("scripted failure"))
            } else {
                Ok(())
            }
        })
    }

    proptest! {
        #[test]
        fn push_pop_restores_depth(scopes in prop::collection::vec(scope(), 1..4)) {
            let mut s = session(&[]);
            s.start().expect("start");
            s.push().expect("outer push");
            for sc in &scopes {
                let before = s.depth();
                let _ = run(&mut s, sc);
                prop_assert_eq!(s.depth(), before);
            }
            s.pop().expect("outer pop");
            prop_assert!(s.stop().is_ok());
        }
    }
}
