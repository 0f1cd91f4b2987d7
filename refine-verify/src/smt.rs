#![forbid(unsafe_code)]

//! SMT-LIB 2 text for scalar expressions.

use std::collections::BTreeMap;

use refine_ast::{ExprKind, TypedExpr};

use crate::error::{ErrorKind, Res, VerifyError};

/// Refinement binder → solver term currently standing for it.
pub type Bindings = BTreeMap<String, String>;

/// Source operator → solver symbol.
const BUILTINS: &[(&str, &str)] = &[
    ("+", "+"),
    ("-", "-"),
    ("*", "*"),
    ("/", "div"),
    ("%", "mod"),
    ("<", "<"),
    ("<=", "<="),
    (">", ">"),
    (">=", ">="),
    ("==", "="),
    // Negated by `apply_builtin`.
    ("!=", "="),
    ("&&", "and"),
    ("||", "or"),
    ("=>", "=>"),
    ("!", "not"),
    ("unary-", "-"),
];

pub fn builtin_symbol(name: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(source, _)| *source == name)
        .map(|(_, smt)| *smt)
}

pub fn is_builtin(name: &str) -> bool {
    builtin_symbol(name).is_some()
}

/// Builtins carrying a precondition; only the contract checker may apply them.
pub fn is_guarded(name: &str) -> bool {
    name == "/" || name == "%"
}

/// Applies builtin `op` to already translated arguments.
pub fn apply_builtin(op: &str, args: &[String]) -> Res<String> {
    let symbol = builtin_symbol(op)
        .ok_or_else(|| VerifyError::unsupported(format!("`{op}` is not a builtin")))?;
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(VerifyError::new(
                ErrorKind::Arity,
                format!("`{op}` expects {n} argument(s), got {}", args.len()),
            ))
        }
    };
    match op {
        "unary-" => {
            arity(1)?;
            Ok(format!("(- {})", args[0]))
        }
        "!=" => {
            arity(2)?;
            Ok(not(&format!("({symbol} {} {})", args[0], args[1])))
        }
        _ => {
            if args.is_empty() {
                return Err(VerifyError::new(
                    ErrorKind::Arity,
                    format!("`{op}` applied to no arguments"),
                ));
            }
            Ok(format!("({symbol} {})", args.join(" ")))
        }
    }
}

pub fn int_literal(n: i64) -> String {
    if n < 0 {
        format!("(- {})", n.unsigned_abs())
    } else {
        n.to_string()
    }
}

pub fn not(term: &str) -> String {
    format!("(not {term})")
}

pub fn eq(lhs: &str, rhs: &str) -> String {
    format!("(= {lhs} {rhs})")
}

pub fn assert(term: &str) -> String {
    format!("(assert {term})")
}

/// Scalar expression → solver term, resolving binders through `locals`.
pub struct Translator<'b> {
    locals: &'b Bindings,
}

impl<'b> Translator<'b> {
    pub fn new(locals: &'b Bindings) -> Self {
        Self { locals }
    }

    /// A bound name resolves to its term; any other name refers to a global
    /// declaration and is used verbatim.
    pub fn name(&self, name: &str) -> String {
        self.locals
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Variables and literals; `None` for anything else.
    pub fn leaf(&self, expr: &TypedExpr) -> Option<String> {
        match &expr.kind {
            ExprKind::Var(name) => Some(self.name(name)),
            ExprKind::Bool(b) => Some(b.to_string()),
            ExprKind::Int(n) => Some(int_literal(*n)),
            _ => None,
        }
    }

    pub fn term(&self, expr: &TypedExpr) -> Res<String> {
        if let Some(leaf) = self.leaf(expr) {
            return Ok(leaf);
        }
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                let ExprKind::Var(op) = &callee.kind else {
                    return Err(VerifyError::unsupported(format!(
                        "cannot translate call of `{callee}`"
                    ))
                    .at(expr.span));
                };
                if !is_builtin(op) {
                    return Err(VerifyError::unsupported(format!(
                        "`{op}` is not a builtin and cannot be translated directly"
                    ))
                    .at(expr.span));
                }
                if is_guarded(op) {
                    return Err(VerifyError::unsupported(format!(
                        "`{op}` has a precondition and must go through the contract checker"
                    ))
                    .at(expr.span));
                }
                let args = args.iter().map(|a| self.term(a)).collect::<Res<Vec<_>>>()?;
                apply_builtin(op, &args).map_err(|e| e.at(expr.span))
            }
            _ => Err(VerifyError::unsupported(format!("cannot translate `{expr}`")).at(expr.span)),
        }
    }
}
