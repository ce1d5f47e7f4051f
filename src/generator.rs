//! Generator objects produced by invoking a generator function.
//!
//! A from-scratch state machine or reified continuation would need either a
//! bytecode layer or unsafe lifetime games this tree-walker doesn't have. A
//! dedicated OS thread per generator is ruled out because `Value` is built
//! on `Rc`/`RefCell` and is not `Send`. Instead each `next()` call *replays*
//! the function body from its start, muting host output for the segment
//! that already ran on a previous call and stopping at the first `yield`
//! this call hasn't passed yet. This only supports the basic yield/next
//! contract (no value sent back in through `next(x)`).
//!
//! Replaying is only sound when the body's side effects are a pure function
//! of its own locals and arguments: a local `let`/`var` recomputes to the
//! same value on every replay, so it behaves correctly even though the
//! whole function reruns. It is NOT sound once the body reaches outside
//! itself: assigning to a variable captured from an enclosing scope,
//! mutating an object/array that isn't a fresh local, or firing an
//! `observe` handler would redo that effect once per already-passed `yield`
//! on every subsequent call, corrupting state rather than just replaying
//! it. `check_replay_safe` rejects those bodies up front with an error
//! instead of silently corrupting them; console output is the one outside
//! effect this module actually knows how to mute, so it's exempted.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{CatchClause, Expr, ForInit, ForTarget, FunctionNode, Stmt, WhenCond};
use crate::value::{UserFunction, Value};

#[derive(Debug)]
pub struct GeneratorState {
    pub func: Rc<UserFunction>,
    pub this_value: Value,
    pub args: Vec<Value>,
    /// How many `yield` points this generator has already produced a value
    /// for, across all `next()` calls so far.
    pub yields_consumed: usize,
    pub done: bool,
}

impl GeneratorState {
    pub fn new(func: Rc<UserFunction>, this_value: Value, args: Vec<Value>) -> Self {
        Self { func, this_value, args, yields_consumed: 0, done: false }
    }
}

/// `{value, done}`.
#[derive(Debug, Clone)]
pub struct GeneratorResult {
    pub value: Value,
    pub done: bool,
}

/// Tracks progress through one `next()` call's replay (owned by the
/// evaluator for the duration of that call).
#[derive(Debug, Clone, Copy)]
pub struct ReplayCursor {
    /// The 1-based yield number this call should stop at.
    pub target: usize,
    /// How many `yield` expressions have been evaluated so far this replay.
    pub count: usize,
}

impl ReplayCursor {
    pub fn new(target: usize) -> Self {
        Self { target, count: 0 }
    }

    /// Whether output should be suppressed right now: true while replaying
    /// a segment whose side effects already happened on an earlier call.
    pub fn initially_muted(&self) -> bool {
        self.target > 1
    }
}

const MUTATING_ARRAY_METHODS: &[&str] =
    &["push", "pop", "shift", "unshift", "splice", "reverse", "sort"];

/// Rejects a generator body the replay strategy can't safely re-run:
/// assignment or mutation reaching a name not declared inside the body
/// itself, or an `observe` registration (which would re-fire on replay).
/// Returns the offending construct's description on failure.
pub fn check_replay_safe(node: &FunctionNode) -> Result<(), String> {
    let mut locals: HashSet<String> = node.params.iter().cloned().collect();
    collect_locals(&node.body, &mut locals);
    let mut checker = ReplaySafety { locals: &locals };
    checker.check_stmt(&node.body)
}

fn collect_locals(stmt: &Stmt, locals: &mut HashSet<String>) {
    match stmt {
        Stmt::VarDecl { name, .. } => {
            locals.insert(name.clone());
        }
        Stmt::Block(stmts) => {
            for s in stmts {
                collect_locals(s, locals);
            }
        }
        Stmt::If { consequent, alternate, .. } => {
            collect_locals(consequent, locals);
            if let Some(a) = alternate {
                collect_locals(a, locals);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_locals(body, locals),
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Decl(_, name, _)) = init {
                locals.insert(name.clone());
            }
            collect_locals(body, locals);
        }
        Stmt::ForIn { left, body, .. } | Stmt::ForOf { left, body, .. } => {
            if let ForTarget::Decl(_, name) = left {
                locals.insert(name.clone());
            }
            collect_locals(body, locals);
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                for s in &case.body {
                    collect_locals(s, locals);
                }
            }
        }
        Stmt::Try { block, handler, finalizer } => {
            collect_locals(block, locals);
            if let Some(CatchClause { param, body }) = handler {
                if let Some(p) = param {
                    locals.insert(p.clone());
                }
                collect_locals(body, locals);
            }
            if let Some(f) = finalizer {
                collect_locals(f, locals);
            }
        }
        Stmt::FunctionDecl(inner) => {
            if let Some(name) = &inner.name {
                locals.insert(name.clone());
            }
        }
        Stmt::When { body, .. } => collect_locals(body, locals),
        _ => {}
    }
}

struct ReplaySafety<'a> {
    locals: &'a HashSet<String>,
}

impl<'a> ReplaySafety<'a> {
    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), String> {
        match stmt {
            Stmt::VarDecl { init, .. } => self.check_opt_expr(init),
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.check_stmt(s)?;
                }
                Ok(())
            }
            Stmt::ExprStmt(e) => self.check_expr(e),
            Stmt::If { test, consequent, alternate } => {
                self.check_expr(test)?;
                self.check_stmt(consequent)?;
                if let Some(a) = alternate {
                    self.check_stmt(a)?;
                }
                Ok(())
            }
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.check_expr(test)?;
                self.check_stmt(body)
            }
            Stmt::For { init, test, update, body } => {
                if let Some(ForInit::Expr(e)) = init {
                    self.check_expr(e)?;
                }
                self.check_opt_expr(test)?;
                self.check_opt_expr(update)?;
                self.check_stmt(body)
            }
            Stmt::ForIn { right, body, .. } | Stmt::ForOf { right, body, .. } => {
                self.check_expr(right)?;
                self.check_stmt(body)
            }
            Stmt::Switch { discriminant, cases } => {
                self.check_expr(discriminant)?;
                for case in cases {
                    if let Some(t) = &case.test {
                        self.check_expr(t)?;
                    }
                    for s in &case.body {
                        self.check_stmt(s)?;
                    }
                }
                Ok(())
            }
            Stmt::Try { block, handler, finalizer } => {
                self.check_stmt(block)?;
                if let Some(h) = handler {
                    self.check_stmt(&h.body)?;
                }
                if let Some(f) = finalizer {
                    self.check_stmt(f)?;
                }
                Ok(())
            }
            Stmt::Throw(e, _) => self.check_expr(e),
            Stmt::Return(e) => self.check_opt_expr(e),
            Stmt::Break | Stmt::Continue | Stmt::FunctionDecl(_) | Stmt::Import(_) | Stmt::Export(_) => Ok(()),
            Stmt::Observe { .. } => {
                Err("an 'observe' registration inside a generator body would re-fire on replay".to_string())
            }
            Stmt::When { cond, body } => {
                if let WhenCond::Expr(e) = cond {
                    self.check_expr(e)?;
                }
                self.check_stmt(body)
            }
        }
    }

    fn check_opt_expr(&mut self, e: &Option<Rc<Expr>>) -> Result<(), String> {
        match e {
            Some(e) => self.check_expr(e),
            None => Ok(()),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<(), String> {
        match expr {
            Expr::Number(_) | Expr::StringLit(_) | Expr::Boolean(_) | Expr::Null | Expr::This | Expr::Identifier(_) => Ok(()),
            Expr::TemplateLiteral { exprs, .. } => {
                for e in exprs {
                    self.check_expr(e)?;
                }
                Ok(())
            }
            Expr::RegexLiteral { .. } => Ok(()),
            Expr::ArrayLiteral(items) => {
                for e in items {
                    self.check_expr(e)?;
                }
                Ok(())
            }
            Expr::ObjectLiteral(entries) => {
                for (_, e) in entries {
                    self.check_expr(e)?;
                }
                Ok(())
            }
            Expr::Binary { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Logical { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Unary { expr, .. } => self.check_expr(expr),
            Expr::Update { target, .. } => self.check_assignment_target(target),
            Expr::Conditional { test, consequent, alternate } => {
                self.check_expr(test)?;
                self.check_expr(consequent)?;
                self.check_expr(alternate)
            }
            Expr::Assignment { target, value, .. } => {
                self.check_assignment_target(target)?;
                self.check_expr(value)
            }
            Expr::Pipeline { left, right } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Member { object, .. } => self.check_expr(object),
            Expr::Index { object, index, .. } => {
                self.check_expr(object)?;
                self.check_expr(index)
            }
            Expr::Call { callee, args, .. } => {
                if let Expr::Member { object, property, .. } = callee.as_ref() {
                    if MUTATING_ARRAY_METHODS.contains(&property.as_str()) && !self.is_local_root(object) {
                        return Err(format!(
                            "calling '.{property}()' on a variable captured from outside the generator would re-apply the mutation on every replay"
                        ));
                    }
                }
                self.check_expr(callee)?;
                for a in args {
                    self.check_expr(a)?;
                }
                Ok(())
            }
            Expr::New { callee, args, .. } => {
                self.check_expr(callee)?;
                for a in args {
                    self.check_expr(a)?;
                }
                Ok(())
            }
            Expr::Function(_) | Expr::Arrow(_) => Ok(()),
            Expr::DynamicImport { specifier, .. } => self.check_expr(specifier),
            Expr::Yield { argument, .. } => self.check_opt_expr(argument),
        }
    }

    fn check_assignment_target(&mut self, target: &Expr) -> Result<(), String> {
        match target {
            Expr::Identifier(name) => {
                if self.locals.contains(name) {
                    Ok(())
                } else {
                    Err(format!(
                        "assigning to '{name}', which is captured from outside the generator, would redo the assignment on every replay"
                    ))
                }
            }
            Expr::Member { object, .. } | Expr::Index { object, .. } => {
                if self.is_local_root(object) {
                    Ok(())
                } else {
                    Err("assigning into a property of a variable captured from outside the generator would redo the mutation on every replay".to_string())
                }
            }
            _ => Ok(()),
        }
    }

    /// Walks down a `object.prop`/`object[index]` chain to its root
    /// identifier and reports whether that root is local to this body.
    fn is_local_root(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Identifier(name) => self.locals.contains(name),
            Expr::Member { object, .. } => self.is_local_root(object),
            Expr::Index { object, .. } => self.is_local_root(object),
            _ => true,
        }
    }
}
