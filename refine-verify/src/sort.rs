#![forbid(unsafe_code)]

//! Solver sorts of source types.

use std::collections::BTreeSet;
use std::fmt;

use refine_ast::{Clause, ExprKind, RefinedType, Type, TypedExpr};

use crate::error::{ErrorKind, Res, VerifyError};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Sort {
    Int,
    Bool,
    /// Uninterpreted sort standing for a structured type.
    Opaque(String),
}

impl Sort {
    pub fn of(ty: &Type) -> Res<Sort> {
        if ty.is_int() {
            return Ok(Sort::Int);
        }
        if ty.is_bool() {
            return Ok(Sort::Bool);
        }
        match ty {
            Type::Con(_) | Type::App { .. } => Ok(Sort::Opaque(mangle(ty))),
            Type::Arrow { .. } | Type::Var(_) => Err(VerifyError::new(
                ErrorKind::NotScalar,
                format!("type `{ty}` has no solver sort"),
            )),
        }
    }

    /// One-character tag used in fresh variable names.
    pub fn tag(&self) -> char {
        match self {
            Sort::Int => 'i',
            Sort::Bool => 'b',
            Sort::Opaque(name) => name
                .chars()
                .next()
                .filter(char::is_ascii_alphabetic)
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or('o'),
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Int => write!(f, "Int"),
            Sort::Bool => write!(f, "Bool"),
            Sort::Opaque(name) => write!(f, "{name}"),
        }
    }
}

/// `array<int>` → `array_int`. Lowercase names never clash with theory sorts.
fn mangle(ty: &Type) -> String {
    fn go(ty: &Type, out: &mut String) {
        match ty {
            Type::Con(name) => push_ident(name, out),
            Type::App { name, args } => {
                push_ident(name, out);
                for arg in args {
                    out.push('_');
                    go(arg, out);
                }
            }
            Type::Arrow { .. } => out.push_str("fun"),
            Type::Var(id) => out.push_str(&format!("t{id}")),
        }
    }
    let mut out = String::new();
    go(ty, &mut out);
    out
}

fn push_ident(name: &str, out: &mut String) {
    out.extend(name.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' {
            c.to_ascii_lowercase()
        } else {
            '_'
        }
    }));
}

/// Opaque sorts mentioned anywhere in `ty`, including inside its refinements.
pub fn opaque_sorts_of_type(ty: &Type, out: &mut BTreeSet<String>) {
    match ty {
        Type::Arrow { params, ret } => {
            for p in params {
                opaque_sorts_of_refined(p, out);
            }
            opaque_sorts_of_refined(ret, out);
        }
        Type::Var(_) => {}
        Type::Con(_) | Type::App { .. } => {
            if let Ok(Sort::Opaque(name)) = Sort::of(ty) {
                out.insert(name);
            }
        }
    }
}

pub fn opaque_sorts_of_refined(rt: &RefinedType, out: &mut BTreeSet<String>) {
    opaque_sorts_of_type(&rt.ty, out);
    if let Some(clause) = rt.refinement.as_ref().and_then(|r| r.clause.as_ref()) {
        opaque_sorts_of_clause(clause, out);
    }
}

fn opaque_sorts_of_clause(clause: &Clause, out: &mut BTreeSet<String>) {
    opaque_sorts_of_expr(clause.expr(), out);
}

pub fn opaque_sorts_of_expr(expr: &TypedExpr, out: &mut BTreeSet<String>) {
    opaque_sorts_of_type(&expr.ty, out);
    match &expr.kind {
        ExprKind::Var(_) | ExprKind::Bool(_) | ExprKind::Int(_) => {}
        ExprKind::Call { callee, args } => {
            opaque_sorts_of_expr(callee, out);
            for a in args {
                opaque_sorts_of_expr(a, out);
            }
        }
        ExprKind::Let { value, body, .. } => {
            opaque_sorts_of_expr(value, out);
            opaque_sorts_of_expr(body, out);
        }
        ExprKind::If { cond, then, els } => {
            opaque_sorts_of_expr(cond, out);
            opaque_sorts_of_expr(then, out);
            opaque_sorts_of_expr(els, out);
        }
        ExprKind::Lambda { body, .. } => opaque_sorts_of_expr(body, out),
        ExprKind::Cast { expr, ty, contract } => {
            opaque_sorts_of_expr(expr, out);
            opaque_sorts_of_type(ty, out);
            if let Some(clause) = contract.as_ref().and_then(|r| r.clause.as_ref()) {
                opaque_sorts_of_clause(clause, out);
            }
        }
    }
}
