#![forbid(unsafe_code)]

use std::fmt;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Session used before `start`.
    SessionMisuse,
    /// Channel to the solver failed.
    Io,
    /// Solver protocol broken (scope depth at shutdown, abnormal exit...).
    Protocol,
    /// An obligation could not be proved; carries the solver's answer.
    Refuted { answer: String },
    /// Expression or type shape the checker does not handle.
    Unsupported,
    /// Callee resolved to a non-function signature.
    NotAFunction,
    /// Name missing from the environment.
    Unbound,
    /// Contract predicate, or type, without a usable solver sort.
    NotScalar,
    /// Call with the wrong number of arguments.
    Arity,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::SessionMisuse => write!(f, "session misuse"),
            ErrorKind::Io => write!(f, "solver io"),
            ErrorKind::Protocol => write!(f, "solver protocol"),
            ErrorKind::Refuted { answer } => write!(f, "solver returned {answer}"),
            ErrorKind::Unsupported => write!(f, "unsupported"),
            ErrorKind::NotAFunction => write!(f, "not a function"),
            ErrorKind::Unbound => write!(f, "unbound"),
            ErrorKind::NotScalar => write!(f, "not scalar"),
            ErrorKind::Arity => write!(f, "arity"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("verification error: {message}")]
#[diagnostic(code(refine::verify))]
pub struct VerifyError {
    pub kind: ErrorKind,
    pub message: String,
    #[label("{kind}")]
    pub span: Option<SourceSpan>,
}

impl VerifyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    /// Attaches `span` unless a more precise one is already set.
    pub fn at(mut self, span: Option<refine_ast::Span>) -> Self {
        if self.span.is_none() {
            self.span = span.map(Into::into);
        }
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }

    pub fn misuse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionMisuse, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn refuted(answer: impl Into<String>, obligation: &str) -> Self {
        let answer = answer.into();
        Self {
            message: format!("solver returned {answer} while proving `{obligation}`"),
            kind: ErrorKind::Refuted { answer },
            span: None,
        }
    }

    pub fn is_refuted(&self) -> bool {
        matches!(self.kind, ErrorKind::Refuted { .. })
    }
}

impl From<std::io::Error> for VerifyError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

pub type Res<T> = Result<T, VerifyError>;
