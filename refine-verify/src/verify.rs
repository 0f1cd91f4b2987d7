#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use refine_ast::{Clause, Env, ExprKind, Origin, Refinement, Span, Type, TypedExpr};

use crate::error::{ErrorKind, Res, VerifyError};
use crate::fresh::FreshNames;
use crate::smt::{self, Bindings, Translator};
use crate::solver::{settle, Session, Transport};
use crate::sort::{self, Sort};

/// How much a call result may stay an inline term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Call results are named by a fresh variable, so binders can refer to them.
    Simple,
    /// Builtin applications are returned as terms.
    Full,
}

/// What one successful run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Preconditions and cast contracts proved.
    pub obligations: usize,
    /// Fresh variables declared.
    pub fresh: usize,
}

/// Walks a typed expression, proving every precondition and cast contract it
/// meets and assuming every callee postcondition.
pub struct Checker<'s, 'e, T: Transport> {
    session: &'s mut Session<T>,
    env: &'e Env,
    names: FreshNames,
    summary: Summary,
}

impl<'s, 'e, T: Transport> Checker<'s, 'e, T> {
    pub fn new(session: &'s mut Session<T>, env: &'e Env) -> Self {
        Self {
            session,
            env,
            names: FreshNames::new(),
            summary: Summary::default(),
        }
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Declares a new solver variable of `ty`'s sort and returns its name.
    pub fn fresh(&mut self, ty: &Type) -> Res<String> {
        let sort = Sort::of(ty)?;
        let name = self.names.next(sort.tag());
        self.session.write(format!("(declare-const {name} {sort})"))?;
        self.summary.fresh += 1;
        Ok(name)
    }

    fn assert(&mut self, term: &str) -> Res<()> {
        self.session.write(smt::assert(term))
    }

    /// Same contract as [`Session::push_pop`], with the checker available to `body`.
    fn scoped<R>(&mut self, body: impl FnOnce(&mut Self) -> Res<R>) -> Res<R> {
        self.session.push()?;
        let res = body(self);
        let popped = self.session.pop();
        settle(res, popped)
    }

    /// Proves `clause` about `binder` by refuting its negation in a scope of its own.
    fn prove(&mut self, locals: &Bindings, binder: &str, clause: &Clause, span: Option<Span>) -> Res<()> {
        let (obligation, goal_expr): (String, &TypedExpr) = match clause {
            Clause::Holds(pred) => {
                if !pred.ty.is_bool() {
                    return Err(VerifyError::new(
                        ErrorKind::NotScalar,
                        format!("refinement `{pred}` is not scalar: has type `{}`", pred.ty),
                    )
                    .at(pred.span.or(span)));
                }
                (pred.to_string(), &**pred)
            }
            Clause::Equals(def) => (format!("{binder} == {def}"), &**def),
        };
        log::debug!("proving `{obligation}`");

        self.scoped(|c| {
            let goal = match clause {
                Clause::Holds(_) => c.check(Mode::Full, locals, goal_expr)?,
                Clause::Equals(_) => {
                    Sort::of(&goal_expr.ty).map_err(|e| e.at(goal_expr.span.or(span)))?;
                    let def = c.check(Mode::Full, locals, goal_expr)?;
                    smt::eq(&Translator::new(locals).name(binder), &def)
                }
            };
            c.assert(&smt::not(&goal))?;
            let answer = c.session.check_sat()?;
            log::debug!("`{obligation}`: {answer}");
            if answer == "unsat" {
                c.summary.obligations += 1;
                Ok(())
            } else {
                Err(VerifyError::refuted(answer, &obligation).at(span))
            }
        })
    }

    /// Assumes `clause` about `binder`, already bound to `result` in `locals`.
    fn assume(&mut self, locals: &Bindings, result: &str, clause: &Clause, span: Option<Span>) -> Res<()> {
        match clause {
            Clause::Equals(def) => {
                let def = self.check(Mode::Full, locals, def)?;
                self.assert(&smt::eq(result, &def))
            }
            Clause::Holds(pred) => {
                if !pred.ty.is_bool() {
                    return Err(VerifyError::new(
                        ErrorKind::NotScalar,
                        format!("refinement `{pred}` is not scalar: has type `{}`", pred.ty),
                    )
                    .at(pred.span.or(span)));
                }
                let fact = self.check(Mode::Full, locals, pred)?;
                self.assert(&fact)
            }
        }
    }

    /// Solver term (or fresh variable name) for `expr`, discharging every
    /// obligation met on the way.
    pub fn check(&mut self, mode: Mode, locals: &Bindings, expr: &TypedExpr) -> Res<String> {
        match &expr.kind {
            ExprKind::Var(_) | ExprKind::Bool(_) | ExprKind::Int(_) => {
                Translator::new(locals).term(expr)
            }

            ExprKind::Cast { expr: inner, contract, .. } => {
                let term = self.check(mode, locals, inner)?;
                if let Some(Refinement {
                    binder,
                    clause: Some(clause),
                }) = contract
                {
                    let mut scope = locals.clone();
                    scope.insert(binder.clone(), term.clone());
                    self.prove(&scope, binder, clause, expr.span)?;
                }
                Ok(term)
            }

            ExprKind::Let { name, value, body } => {
                let sort = Sort::of(&value.ty).map_err(|e| e.at(value.span.or(expr.span)))?;
                self.session.write(format!("(declare-const {name} {sort})"))?;
                let term = self.check(Mode::Full, locals, value)?;
                self.assert(&smt::eq(name, &term))?;
                self.check(mode, locals, body)
            }

            ExprKind::Call { callee, args } => self.check_call(mode, locals, expr, callee, args),

            ExprKind::If { .. } => Err(VerifyError::unsupported(
                "unsupported expression shape: conditional",
            )
            .at(expr.span)),

            ExprKind::Lambda { .. } => Err(VerifyError::unsupported(
                "unsupported expression shape: function literal",
            )
            .at(expr.span)),
        }
    }

    fn check_call(
        &mut self,
        mode: Mode,
        locals: &Bindings,
        expr: &TypedExpr,
        callee: &TypedExpr,
        args: &[TypedExpr],
    ) -> Res<String> {
        let ExprKind::Var(name) = &callee.kind else {
            return Err(VerifyError::unsupported(format!(
                "unsupported callee `{callee}`: only named functions can be called"
            ))
            .at(callee.span.or(expr.span)));
        };
        let env = self.env;
        let sig = env.get(name).ok_or_else(|| {
            VerifyError::new(ErrorKind::Unbound, format!("unbound symbol `{name}`"))
                .at(callee.span.or(expr.span))
        })?;
        let Some((params, ret)) = sig.ty.ty.as_arrow() else {
            return Err(VerifyError::new(
                ErrorKind::NotAFunction,
                format!("symbol `{name}` is not a function: has type `{}`", sig.ty),
            )
            .at(callee.span.or(expr.span)));
        };
        if params.len() != args.len() {
            return Err(VerifyError::new(
                ErrorKind::Arity,
                format!(
                    "`{name}` expects {} argument(s), got {}",
                    params.len(),
                    args.len()
                ),
            )
            .at(expr.span));
        }

        // Arguments live in the caller's scope, clauses in the callee's.
        let mut callee_locals = Bindings::new();
        let mut terms = Vec::with_capacity(args.len());
        for (param, arg) in params.iter().zip(args) {
            match &param.refinement {
                None => terms.push(self.check(Mode::Full, locals, arg)?),
                Some(Refinement { binder, clause }) => {
                    let term = self.check(Mode::Simple, locals, arg)?;
                    callee_locals.insert(binder.clone(), term.clone());
                    if let Some(clause) = clause {
                        self.prove(&callee_locals, binder, clause, arg.span.or(expr.span))
                            .map_err(|e| e.with_context(&format!("precondition of `{name}`")))?;
                    }
                    terms.push(term);
                }
            }
        }

        if sig.origin == Origin::Builtin {
            let term = smt::apply_builtin(name, &terms).map_err(|e| e.at(expr.span))?;
            return match mode {
                Mode::Full => Ok(term),
                Mode::Simple => {
                    let var = self.fresh(&ret.ty).map_err(|e| e.at(expr.span))?;
                    self.assert(&smt::eq(&var, &term))?;
                    Ok(var)
                }
            };
        }

        let result = self.fresh(&ret.ty).map_err(|e| e.at(expr.span))?;
        if sig.origin == Origin::Uninterpreted {
            let app = if terms.is_empty() {
                name.clone()
            } else {
                format!("({name} {})", terms.join(" "))
            };
            self.assert(&smt::eq(&result, &app))?;
        }
        if let Some(Refinement {
            binder,
            clause: Some(clause),
        }) = &ret.refinement
        {
            let mut post = callee_locals;
            post.insert(binder.clone(), result.clone());
            self.assume(&post, &result, clause, expr.span)
                .map_err(|e| e.with_context(&format!("postcondition of `{name}`")))?;
        }
        Ok(result)
    }
}

/// Declares, once per solver instance, the opaque sorts, uninterpreted
/// functions and global values the run may mention.
fn declare_globals<T: Transport>(session: &mut Session<T>, env: &Env, expr: &TypedExpr) -> Res<()> {
    let mut sorts = BTreeSet::new();
    for (_, sig) in env.iter() {
        sort::opaque_sorts_of_refined(&sig.ty, &mut sorts);
    }
    sort::opaque_sorts_of_expr(expr, &mut sorts);
    for name in &sorts {
        session.declare_global(&format!("sort {name}"), format!("(declare-sort {name} 0)"))?;
    }

    for (name, sig) in env.iter() {
        match sig.origin {
            Origin::Uninterpreted => {
                let Some((params, ret)) = sig.ty.ty.as_arrow() else {
                    return Err(VerifyError::new(
                        ErrorKind::NotAFunction,
                        format!("uninterpreted symbol `{name}` is not a function"),
                    ));
                };
                let domain = params
                    .iter()
                    .map(|p| Sort::of(&p.ty).map(|s| s.to_string()))
                    .collect::<Res<Vec<_>>>()
                    .map_err(|e| e.with_context(&format!("while declaring `{name}`")))?;
                let range = Sort::of(&ret.ty).map_err(|e| e.with_context(&format!("while declaring `{name}`")))?;
                session.declare_global(
                    &format!("fun {name}"),
                    format!("(declare-fun {name} ({}) {range})", domain.join(" ")),
                )?;
            }
            Origin::Value => match Sort::of(&sig.ty.ty) {
                Ok(sort) => session.declare_global(
                    &format!("const {name}"),
                    format!("(declare-const {name} {sort})"),
                )?,
                Err(_) => log::debug!("`{name}` has no solver sort, not declared"),
            },
            Origin::Builtin | Origin::Primitive => {}
        }
    }
    Ok(())
}

/// Verifies `expr` against `env`: one top-level scope, popped whatever happens.
/// Succeeds only once the solver has accepted every command of the run.
pub fn prove<T: Transport>(session: &mut Session<T>, env: &Env, expr: &TypedExpr) -> Res<Summary> {
    session.start()?;
    declare_globals(session, env, expr)?;
    let mut checker = Checker::new(session, env);
    checker.scoped(|c| c.check(Mode::Full, &Bindings::new(), expr).map(drop))?;
    let summary = checker.summary();
    session.sync()?;
    Ok(summary)
}

/// A solver session bound to one environment, for hosts verifying many
/// expressions in a row. Fresh names restart with every expression.
pub struct Verifier<T: Transport> {
    session: Session<T>,
    env: Env,
}

impl<T: Transport> Verifier<T> {
    pub fn new(conf: T::Conf, env: Env) -> Self {
        Self {
            session: Session::new(conf),
            env,
        }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// A failed run stops the solver, so the next one starts a fresh process.
    pub fn verify(&mut self, expr: &TypedExpr) -> Res<Summary> {
        let res = prove(&mut self.session, &self.env, expr);
        if res.is_err() {
            if let Err(e) = self.session.stop() {
                log::warn!("while stopping solver after a failed run: {e}");
            }
        }
        res
    }

    /// Stops the solver, reporting an abnormal exit or unbalanced scopes.
    pub fn finish(mut self) -> Res<()> {
        self.session.stop()
    }
}
