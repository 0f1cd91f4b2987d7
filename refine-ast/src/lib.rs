#![forbid(unsafe_code)]

//! Typed, refinement-annotated expressions and the signature environment they
//! are checked against.
//!
//! Everything here is produced upstream (by inference) and is read-only for the
//! verifier. All types (de)serialize with serde so trees can be exchanged as JSON.

use std::collections::BTreeMap;
use std::fmt;

use miette::SourceSpan;
use serde::{Deserialize, Serialize};

/// Byte range in the source the expression was elaborated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.len)
    }
}

pub fn span(start: usize, len: usize) -> Span {
    Span { start, len }
}

pub const INT: &str = "int";
pub const BOOL: &str = "bool";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    /// Named constant (`int`, `bool`, `array`...).
    Con(String),

    /// Parametric application (e.g. `array<int>`).
    App { name: String, args: Vec<Type> },

    /// Function arrow. Parameter refinements may mention earlier binders.
    Arrow {
        params: Vec<RefinedType>,
        ret: Box<RefinedType>,
    },

    /// Unresolved inference variable.
    Var(u32),
}

impl Type {
    pub fn con(name: impl Into<String>) -> Self {
        Type::Con(name.into())
    }

    pub fn int() -> Self {
        Type::con(INT)
    }

    pub fn bool() -> Self {
        Type::con(BOOL)
    }

    pub fn app(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::App {
            name: name.into(),
            args,
        }
    }

    pub fn arrow(params: Vec<RefinedType>, ret: RefinedType) -> Self {
        Type::Arrow {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Con(n) if n == INT)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Con(n) if n == BOOL)
    }

    pub fn as_arrow(&self) -> Option<(&[RefinedType], &RefinedType)> {
        match self {
            Type::Arrow { params, ret } => Some((params, ret)),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Con(name) => write!(f, "{name}"),
            Type::App { name, args } => {
                if args.is_empty() {
                    return write!(f, "{name}");
                }
                let args_s = args
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{name}<{args_s}>")
            }
            Type::Arrow { params, ret } => {
                let params_s = params
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({params_s}) -> {ret}")
            }
            Type::Var(id) => write!(f, "'t{id}"),
        }
    }
}

/// What a refinement says about its binder.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    /// Boolean predicate over the binder and earlier binders.
    Holds(Box<TypedExpr>),
    /// Defining expression: the binder equals this value.
    Equals(Box<TypedExpr>),
}

impl Clause {
    pub fn expr(&self) -> &TypedExpr {
        match self {
            Clause::Holds(e) | Clause::Equals(e) => &**e,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Refinement {
    pub binder: String,
    #[serde(default)]
    pub clause: Option<Clause>,
}

impl Refinement {
    /// A binder with no constraint, only visible to later clauses.
    pub fn bind(binder: impl Into<String>) -> Self {
        Self {
            binder: binder.into(),
            clause: None,
        }
    }

    pub fn holds(binder: impl Into<String>, pred: TypedExpr) -> Self {
        Self {
            binder: binder.into(),
            clause: Some(Clause::Holds(Box::new(pred))),
        }
    }

    pub fn equals(binder: impl Into<String>, def: TypedExpr) -> Self {
        Self {
            binder: binder.into(),
            clause: Some(Clause::Equals(Box::new(def))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RefinedType {
    pub ty: Type,
    #[serde(default)]
    pub refinement: Option<Refinement>,
}

impl RefinedType {
    pub fn plain(ty: Type) -> Self {
        Self {
            ty,
            refinement: None,
        }
    }

    pub fn refined(ty: Type, refinement: Refinement) -> Self {
        Self {
            ty,
            refinement: Some(refinement),
        }
    }
}

impl fmt::Display for RefinedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.refinement {
            None => write!(f, "{}", self.ty),
            Some(Refinement {
                binder,
                clause: None,
            }) => write!(f, "{binder}: {}", self.ty),
            Some(Refinement {
                binder,
                clause: Some(Clause::Holds(p)),
            }) => write!(f, "{{{binder}: {} | {p}}}", self.ty),
            Some(Refinement {
                binder,
                clause: Some(Clause::Equals(e)),
            }) => write!(f, "{{{binder}: {} = {e}}}", self.ty),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TypedExpr {
    pub ty: Type,
    pub kind: ExprKind,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Var(String),
    Bool(bool),
    Int(i64),
    Call {
        callee: Box<TypedExpr>,
        args: Vec<TypedExpr>,
    },
    Let {
        name: String,
        value: Box<TypedExpr>,
        body: Box<TypedExpr>,
    },
    If {
        cond: Box<TypedExpr>,
        then: Box<TypedExpr>,
        els: Box<TypedExpr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<TypedExpr>,
    },
    /// Type ascription, optionally carrying a contract to prove.
    Cast {
        expr: Box<TypedExpr>,
        ty: Type,
        #[serde(default)]
        contract: Option<Refinement>,
    },
}

impl TypedExpr {
    pub fn new(ty: Type, kind: ExprKind) -> Self {
        Self {
            ty,
            kind,
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Self::new(ty, ExprKind::Var(name.into()))
    }

    pub fn int(value: i64) -> Self {
        Self::new(Type::int(), ExprKind::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Type::bool(), ExprKind::Bool(value))
    }

    /// Call of a named function; the callee gets the plain arrow of its arguments.
    pub fn call(callee: impl Into<String>, args: Vec<TypedExpr>, ty: Type) -> Self {
        let callee_ty = Type::arrow(
            args.iter().map(|a| RefinedType::plain(a.ty.clone())).collect(),
            RefinedType::plain(ty.clone()),
        );
        Self::new(
            ty,
            ExprKind::Call {
                callee: Box::new(Self::var(callee, callee_ty)),
                args,
            },
        )
    }

    pub fn let_in(name: impl Into<String>, value: TypedExpr, body: TypedExpr) -> Self {
        Self::new(
            body.ty.clone(),
            ExprKind::Let {
                name: name.into(),
                value: Box::new(value),
                body: Box::new(body),
            },
        )
    }

    pub fn cast(expr: TypedExpr, ty: Type, contract: Option<Refinement>) -> Self {
        Self::new(
            ty.clone(),
            ExprKind::Cast {
                expr: Box::new(expr),
                ty,
                contract,
            },
        )
    }

    /// Name of the callee when this is a call of a plain variable.
    pub fn callee_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Call { callee, .. } => match &callee.kind {
                ExprKind::Var(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

fn is_operator(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| !c.is_alphanumeric() && c != '_')
}

impl fmt::Display for TypedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Var(name) => write!(f, "{name}"),
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Int(n) => write!(f, "{n}"),
            ExprKind::Call { callee, args } => {
                if let ExprKind::Var(name) = &callee.kind {
                    match (name.as_str(), args.as_slice()) {
                        ("unary-", [x]) => return write!(f, "-{x}"),
                        ("!", [x]) => return write!(f, "!{x}"),
                        (op, [a, b]) if is_operator(op) => return write!(f, "({a} {op} {b})"),
                        _ => {}
                    }
                }
                let args_s = args
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{callee}({args_s})")
            }
            ExprKind::Let { name, value, body } => write!(f, "let {name} = {value} in {body}"),
            ExprKind::If { cond, then, els } => write!(f, "if {cond} then {then} else {els}"),
            ExprKind::Lambda { params, body } => write!(f, "fun ({}) -> {body}", params.join(", ")),
            ExprKind::Cast { expr, ty, contract } => match contract {
                None => write!(f, "({expr} : {ty})"),
                Some(r) => write!(
                    f,
                    "({expr} : {})",
                    RefinedType::refined(ty.clone(), r.clone())
                ),
            },
        }
    }
}

/// Where a signature comes from; decides how calls to it are modelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Operator with a fixed solver translation.
    Builtin,
    /// Opaque function declared to the solver; only its contracts are known.
    Uninterpreted,
    /// Opaque library operation (allocation, access...), modelled by its contracts.
    Primitive,
    /// Global value declared as a solver constant.
    Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Signature {
    pub origin: Origin,
    pub ty: RefinedType,
}

impl Signature {
    pub fn new(origin: Origin, params: Vec<RefinedType>, ret: RefinedType) -> Self {
        Self {
            origin,
            ty: RefinedType::plain(Type::arrow(params, ret)),
        }
    }

    pub fn value(ty: Type) -> Self {
        Self {
            origin: Origin::Value,
            ty: RefinedType::plain(ty),
        }
    }
}

/// Immutable name → signature lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Env {
    entries: BTreeMap<String, Signature>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, sig: Signature) -> Self {
        self.entries.insert(name.into(), sig);
        self
    }

    /// Adds (or overrides) every entry of `other`.
    pub fn extend(&mut self, other: Env) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Signature)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_display_like_source() {
        let arr = Type::app("array", vec![Type::int()]);
        assert_eq!(arr.to_string(), "array<int>");

        let div = Type::arrow(
            vec![
                RefinedType::plain(Type::int()),
                RefinedType::refined(
                    Type::int(),
                    Refinement::holds(
                        "y",
                        TypedExpr::call(
                            "!=",
                            vec![TypedExpr::var("y", Type::int()), TypedExpr::int(0)],
                            Type::bool(),
                        ),
                    ),
                ),
            ],
            RefinedType::plain(Type::int()),
        );
        assert_eq!(div.to_string(), "(int, {y: int | (y != 0)}) -> int");
    }

    #[test]
    fn scalar_predicates() {
        assert!(Type::int().is_int());
        assert!(Type::bool().is_bool());
        assert!(!Type::app("array", vec![Type::int()]).is_int());
        assert!(Type::Var(3).as_arrow().is_none());
    }

    #[test]
    fn contracts_nest_inside_casts() {
        // A cast whose contract mentions another cast.
        let inner = TypedExpr::cast(
            TypedExpr::int(1),
            Type::int(),
            Some(Refinement::holds(
                "w",
                TypedExpr::call(">", vec![TypedExpr::var("w", Type::int()), TypedExpr::int(0)], Type::bool()),
            )),
        );
        let outer = TypedExpr::cast(
            TypedExpr::int(2),
            Type::int(),
            Some(Refinement::equals("v", inner.clone())),
        );
        let ExprKind::Cast { contract: Some(r), .. } = &outer.kind else {
            panic!("expected a contracted cast");
        };
        assert_eq!(r.clause.as_ref().map(Clause::expr), Some(&inner));
        assert_eq!(outer.to_string(), "(2 : {v: int = (1 : {w: int | (w > 0)})})");

        let json = serde_json::to_string(&outer).expect("serialize");
        let back: TypedExpr = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, outer);
    }

    #[test]
    fn call_builder_names_callee() {
        let e = TypedExpr::call("get", vec![TypedExpr::var("a", Type::con("array")), TypedExpr::int(3)], Type::int());
        assert_eq!(e.callee_name(), Some("get"));
        assert_eq!(e.to_string(), "get(a, 3)");
    }

    #[test]
    fn expressions_round_trip_through_json() {
        let e = TypedExpr::let_in(
            "a",
            TypedExpr::call("alloc", vec![TypedExpr::int(5)], Type::con("array")),
            TypedExpr::call("get", vec![TypedExpr::var("a", Type::con("array")), TypedExpr::int(3)], Type::int()),
        )
        .with_span(span(0, 30));
        let json = serde_json::to_string(&e).expect("serialize");
        let back: TypedExpr = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, e);
    }

    #[test]
    fn env_lookup_and_override() {
        let mut env = Env::new().with("n", Signature::value(Type::int()));
        env.extend(Env::new().with("n", Signature::value(Type::bool())));
        assert_eq!(env.iter().count(), 1);
        assert!(env.get("n").expect("n").ty.ty.is_bool());
        assert!(env.get("m").is_none());
    }
}
