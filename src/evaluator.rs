//! Tree-walking evaluator: statement execution, expression evaluation,
//! function calls, and the observer/`when` fan-out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{
    AssignOp, BinaryOp, CatchClause, DeclKind, Expr, ExprRef, ForInit, ForTarget, FunctionKind,
    FunctionNode, LogicalOp, PropertyKey, Stmt, StmtRef, SwitchCase, UnaryOp, UpdateOp,
};
use crate::environment::{EnvError, Frame};
use crate::error::{EcError, HostError, RuntimeError};
use crate::event_loop::EventLoop;
use crate::generator::{check_replay_safe, GeneratorResult, GeneratorState, ReplayCursor};
use crate::token::Span;
use crate::value::{Callable, NativeFunction, RegexFlags, RegexValue, UserFunction, Value};

/// How deep a call chain may nest before it is treated as unbounded
/// recursion.
const MAX_CALL_DEPTH: usize = 1200;

/// How a statement finished: fell through normally, or is unwinding toward
/// an enclosing loop/switch/function.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Owns the global frame, the event loop, and the bits of per-call state
/// (current `this`, recursion depth, generator replay context) that thread
/// through every statement and expression evaluation.
pub struct Evaluator {
    pub global: Rc<RefCell<Frame>>,
    pub event_loop: Rc<RefCell<EventLoop>>,
    current_this: Option<Value>,
    call_depth: usize,
    /// Names of bindings currently firing their observer callbacks, used by
    /// `when triggeredBy(name)` guards.
    trigger_stack: Vec<String>,
    /// Active generator replays, innermost last.
    gen_stack: Vec<ReplayCursor>,
    /// Whether host output (e.g. `console.log`) should be suppressed right
    /// now because this segment of a generator body already ran, visibly,
    /// on an earlier `next()` call.
    pub output_muted: bool,
    /// A halt signal set by `Expr::Yield` once replay reaches the yield
    /// this `next()` call is supposed to stop at; checked after every
    /// nested statement/expression evaluation so the body stops exactly
    /// there without unwinding through `Result`.
    pending_yield: Option<Value>,
    /// Lines written by `console.*`; the host facade pushes here rather
    /// than writing to stdout directly, so `main.rs` controls where a run's
    /// output actually goes (and tests can assert on it without capturing
    /// process stdout).
    pub output: Vec<String>,
    /// Directory of the script currently executing, used to resolve
    /// relative module specifiers.
    pub module_base: Option<std::path::PathBuf>,
    /// Cache of resolved module canonical-path → exports map, shared across
    /// every `import`/`require`/dynamic `import()` call so a given path is
    /// evaluated at most once and circular imports observe the partial
    /// exports map in progress.
    pub(crate) module_cache: Rc<RefCell<HashMap<String, crate::modules::ModuleRecord>>>,
    /// Set by `process.exit`; checked between top-level statements and event
    /// loop ticks so the host can stop the run and report this as the exit
    /// code.
    pub exit_code: Option<i32>,
    /// Handlers registered via `observe (a, b, …) fn` (more than one
    /// target), keyed by the handler's `Rc` identity, mapping to the full
    /// set of names it watches. Used at fan-out time to decide whether a
    /// binding's observer should receive the single-variable
    /// `(old, new, name)` argument list or the multi-variable `changes`
    /// record.
    multi_observers: HashMap<usize, Vec<String>>,
}

/// An assignment target resolved to a concrete place: either a named binding,
/// or an object/key pair already evaluated once. Compound assignment and
/// `++`/`--` both read then write through the same `AssignPlace` so a
/// side-effecting object or key expression only runs once.
enum AssignPlace {
    Identifier(String),
    Property { obj: Value, key: String, span: Span },
}

impl Evaluator {
    pub fn new() -> Self {
        let global = Frame::new_global();
        let mut evaluator = Self {
            global: global.clone(),
            event_loop: Rc::new(RefCell::new(EventLoop::new())),
            current_this: None,
            call_depth: 0,
            trigger_stack: Vec::new(),
            gen_stack: Vec::new(),
            output_muted: false,
            pending_yield: None,
            output: Vec::new(),
            module_base: None,
            module_cache: Rc::new(RefCell::new(HashMap::new())),
            exit_code: None,
            multi_observers: HashMap::new(),
        };
        crate::host::install_globals(&mut evaluator);
        evaluator
    }

    fn yielding(&self) -> bool {
        self.pending_yield.is_some()
    }

    pub fn write_output(&mut self, line: String) {
        if !self.output_muted {
            self.output.push(line);
        }
    }

    // ---- Program / body execution -----------------------------------

    /// Runs top-level statements, then drains the event loop, returning
    /// the value of the final expression statement.
    pub fn run_program(&mut self, program: &[StmtRef]) -> Result<Value, EcError> {
        let global = self.global.clone();
        self.hoist(program, &global)?;
        let mut last = Value::Undefined;
        for stmt in program {
            if let Stmt::ExprStmt(e) = stmt.as_ref() {
                last = self.eval_expr(e, &global)?;
            } else {
                let flow = self.exec_stmt(stmt, &global)?;
                if let Flow::Return(v) = flow {
                    last = v;
                    break;
                }
            }
            if self.exit_code.is_some() {
                return Ok(last);
            }
        }
        self.run_event_loop_to_completion()?;
        Ok(last)
    }

    pub fn run_event_loop_to_completion(&mut self) -> Result<(), EcError> {
        loop {
            if self.exit_code.is_some() {
                return Ok(());
            }
            loop {
                let task = self.event_loop.borrow_mut().pop_micro_task();
                match task {
                    Some(t) => {
                        self.call_value(t.callback, Value::Undefined, t.args, None)?;
                    }
                    None => break,
                }
            }
            let macro_task = self.event_loop.borrow_mut().pop_ready_macro_task();
            if let Some(t) = macro_task {
                self.call_value(t.callback, Value::Undefined, t.args, None)?;
                continue;
            }
            let advanced = self.event_loop.borrow_mut().advance_to_next_timer();
            if advanced {
                continue;
            }
            break;
        }
        Ok(())
    }

    /// Executes a function body (always a `Stmt::Block`), hoisting `var`s
    /// and function declarations directly into `frame` rather than opening
    /// another nested block scope for the body itself.
    fn exec_body(&mut self, body: &Stmt, frame: &Rc<RefCell<Frame>>) -> Result<Flow, EcError> {
        match body {
            Stmt::Block(stmts) => {
                self.hoist(stmts, frame)?;
                self.exec_stmts(stmts, frame)
            }
            other => self.exec_stmt(other, frame),
        }
    }

    fn exec_stmts(&mut self, stmts: &[StmtRef], frame: &Rc<RefCell<Frame>>) -> Result<Flow, EcError> {
        for stmt in stmts {
            let flow = self.exec_stmt(stmt, frame)?;
            if self.yielding() {
                return Ok(Flow::Normal);
            }
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    // ---- var / function hoisting --------------------------------------

    fn hoist(&mut self, stmts: &[StmtRef], frame: &Rc<RefCell<Frame>>) -> Result<(), EcError> {
        for stmt in stmts {
            self.hoist_vars(stmt, frame)?;
        }
        for stmt in stmts {
            if let Stmt::FunctionDecl(node) = stmt.as_ref() {
                let name = node.name.clone().unwrap_or_default();
                let func = self.make_function_value(node.clone(), frame, None);
                let _ = Frame::declare_var(frame, &name, Some(func));
            }
        }
        Ok(())
    }

    fn hoist_vars(&mut self, stmt: &Stmt, frame: &Rc<RefCell<Frame>>) -> Result<(), EcError> {
        match stmt {
            Stmt::VarDecl { kind: DeclKind::Var, name, .. } => {
                let _ = Frame::declare_var(frame, name, None);
            }
            Stmt::Block(inner) => {
                for s in inner {
                    self.hoist_vars(s, frame)?;
                }
            }
            Stmt::If { consequent, alternate, .. } => {
                self.hoist_vars(consequent, frame)?;
                if let Some(alt) = alternate {
                    self.hoist_vars(alt, frame)?;
                }
            }
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => self.hoist_vars(body, frame)?,
            Stmt::For { init, body, .. } => {
                if let Some(ForInit::Decl(DeclKind::Var, name, _)) = init {
                    let _ = Frame::declare_var(frame, name, None);
                }
                self.hoist_vars(body, frame)?;
            }
            Stmt::ForIn { left, body, .. } | Stmt::ForOf { left, body, .. } => {
                if let ForTarget::Decl(DeclKind::Var, name) = left {
                    let _ = Frame::declare_var(frame, name, None);
                }
                self.hoist_vars(body, frame)?;
            }
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    for s in &case.body {
                        self.hoist_vars(s, frame)?;
                    }
                }
            }
            Stmt::Try { block, handler, finalizer } => {
                self.hoist_vars(block, frame)?;
                if let Some(h) = handler {
                    self.hoist_vars(&h.body, frame)?;
                }
                if let Some(f) = finalizer {
                    self.hoist_vars(f, frame)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ---- Statement execution -------------------------------------------

    fn exec_stmt(&mut self, stmt: &Stmt, frame: &Rc<RefCell<Frame>>) -> Result<Flow, EcError> {
        match stmt {
            Stmt::VarDecl { kind, name, init, span } => {
                let value = match init {
                    Some(e) => Some(self.eval_expr(e, frame)?),
                    None => None,
                };
                if self.yielding() {
                    return Ok(Flow::Normal);
                }
                let result = match kind {
                    DeclKind::Var => Frame::declare_var(frame, name, value),
                    DeclKind::Let | DeclKind::Const => Frame::declare_lexical(frame, *kind, name, value),
                };
                result.map_err(|e| self.env_error(e, Some(*span)))?;
                Ok(Flow::Normal)
            }

            Stmt::Block(stmts) => {
                let child = Frame::child_block(frame);
                self.hoist(stmts, &child)?;
                self.exec_stmts(stmts, &child)
            }

            Stmt::ExprStmt(e) => {
                self.eval_expr(e, frame)?;
                Ok(Flow::Normal)
            }

            Stmt::If { test, consequent, alternate } => {
                let cond = self.eval_expr(test, frame)?;
                if self.yielding() {
                    return Ok(Flow::Normal);
                }
                if cond.is_truthy() {
                    self.exec_stmt(consequent, frame)
                } else if let Some(alt) = alternate {
                    self.exec_stmt(alt, frame)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Stmt::While { test, body } => {
                loop {
                    let cond = self.eval_expr(test, frame)?;
                    if self.yielding() || !cond.is_truthy() {
                        break;
                    }
                    let flow = self.exec_stmt(body, frame)?;
                    if self.yielding() {
                        break;
                    }
                    match flow {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::DoWhile { body, test } => {
                loop {
                    let flow = self.exec_stmt(body, frame)?;
                    if self.yielding() {
                        break;
                    }
                    match flow {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Continue | Flow::Normal => {}
                    }
                    let cond = self.eval_expr(test, frame)?;
                    if self.yielding() || !cond.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::For { init, test, update, body } => {
                let head = Frame::child_block(frame);
                if let Some(init) = init {
                    match init {
                        ForInit::Decl(kind, name, expr) => {
                            let value = match expr {
                                Some(e) => Some(self.eval_expr(e, &head)?),
                                None => None,
                            };
                            match kind {
                                DeclKind::Var => Frame::declare_var(&head, name, value),
                                DeclKind::Let | DeclKind::Const => {
                                    Frame::declare_lexical(&head, *kind, name, value)
                                }
                            }
                            .map_err(|e| self.env_error(e, None))?;
                        }
                        ForInit::Expr(e) => {
                            self.eval_expr(e, &head)?;
                        }
                    }
                }
                loop {
                    if let Some(test) = test {
                        let cond = self.eval_expr(test, &head)?;
                        if self.yielding() || !cond.is_truthy() {
                            break;
                        }
                    }
                    let flow = self.exec_stmt(body, &head)?;
                    if self.yielding() {
                        break;
                    }
                    match flow {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Continue | Flow::Normal => {}
                    }
                    if let Some(update) = update {
                        self.eval_expr(update, &head)?;
                        if self.yielding() {
                            break;
                        }
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::ForIn { left, right, body } => {
                let right_val = self.eval_expr(right, frame)?;
                let keys = self.own_keys(&right_val);
                for key in keys {
                    let iter_frame = Frame::child_block(frame);
                    self.bind_for_target(left, Value::string(key), &iter_frame, frame)?;
                    let flow = self.exec_stmt(body, &iter_frame)?;
                    if self.yielding() {
                        return Ok(Flow::Normal);
                    }
                    match flow {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::ForOf { left, right, body } => {
                let right_val = self.eval_expr(right, frame)?;
                let items = self.iterate(right_val)?;
                for item in items {
                    let iter_frame = Frame::child_block(frame);
                    self.bind_for_target(left, item, &iter_frame, frame)?;
                    let flow = self.exec_stmt(body, &iter_frame)?;
                    if self.yielding() {
                        return Ok(Flow::Normal);
                    }
                    match flow {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Switch { discriminant, cases } => self.exec_switch(discriminant, cases, frame),

            Stmt::Try { block, handler, finalizer } => self.exec_try(block, handler.as_ref(), finalizer.as_deref(), frame),

            Stmt::Throw(e, span) => {
                let v = self.eval_expr(e, frame)?;
                Err(RuntimeError::thrown(v, Some(*span)).into())
            }

            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Return(opt) => {
                let v = match opt {
                    Some(e) => self.eval_expr(e, frame)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(v))
            }

            Stmt::FunctionDecl(_) => Ok(Flow::Normal),

            Stmt::Import(decl) => {
                let exports = crate::modules::import(self, &decl.source)?;
                for spec in &decl.specifiers {
                    self.bind_import_specifier(spec, &exports, &decl.source, frame)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Export(decl) => self.exec_export(decl, frame),

            Stmt::Observe { targets, handler, span } => {
                let handler_val = self.eval_expr(handler, frame)?;
                if targets.len() > 1 {
                    if let Value::Function(c) = &handler_val {
                        self.multi_observers.insert(Rc::as_ptr(c) as usize, targets.clone());
                    }
                }
                for target in targets {
                    Frame::add_observer(frame, target, handler_val.clone())
                        .map_err(|e| self.env_error(e, Some(*span)))?;
                }
                Ok(Flow::Normal)
            }

            Stmt::When { cond, body } => {
                let matches = match cond {
                    crate::ast::WhenCond::Expr(e) => self.eval_expr(e, frame)?.is_truthy(),
                    crate::ast::WhenCond::TriggeredBy(name) => {
                        self.trigger_stack.last().map(|t| t == name).unwrap_or(false)
                    }
                };
                if matches {
                    self.exec_stmt(body, frame)
                } else {
                    Ok(Flow::Normal)
                }
            }
        }
    }

    fn bind_for_target(
        &mut self,
        target: &ForTarget,
        value: Value,
        iter_frame: &Rc<RefCell<Frame>>,
        outer_frame: &Rc<RefCell<Frame>>,
    ) -> Result<(), EcError> {
        match target {
            ForTarget::Decl(kind, name) => {
                Frame::declare_lexical(iter_frame, *kind, name, Some(value)).map_err(|e| self.env_error(e, None))
            }
            ForTarget::Target(expr) => self.assign_to_target(expr, value, outer_frame),
        }
    }

    fn own_keys(&self, value: &Value) -> Vec<String> {
        match value {
            Value::Object(entries) => entries.borrow().keys().cloned().collect(),
            Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Materializes the elements a `for...of` walks.
    /// Generators are driven eagerly to exhaustion here rather than lazily,
    /// a simplification of the replay-based generator model.
    fn iterate(&mut self, value: Value) -> Result<Vec<Value>, EcError> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            Value::Generator(g) => {
                let mut out = Vec::new();
                loop {
                    let result = self.generator_next(g.clone())?;
                    if result.done {
                        break;
                    }
                    out.push(result.value);
                }
                Ok(out)
            }
            other => Err(RuntimeError::new(
                format!("{} is not iterable", other.to_coerced_string()),
                None,
            )
            .into()),
        }
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], frame: &Rc<RefCell<Frame>>) -> Result<Flow, EcError> {
        let disc = self.eval_expr(discriminant, frame)?;
        if self.yielding() {
            return Ok(Flow::Normal);
        }
        let switch_frame = Frame::child_block(frame);
        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let test_val = self.eval_expr(test, &switch_frame)?;
                if test_val.strict_eq(&disc) {
                    start = Some(i);
                    break;
                }
            }
        }
        if start.is_none() {
            start = cases.iter().position(|c| c.test.is_none());
        }
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };
        for case in &cases[start..] {
            let flow = self.exec_stmts(&case.body, &switch_frame)?;
            if self.yielding() {
                return Ok(Flow::Normal);
            }
            match flow {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Normal => continue,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        block: &Stmt,
        handler: Option<&CatchClause>,
        finalizer: Option<&Stmt>,
        frame: &Rc<RefCell<Frame>>,
    ) -> Result<Flow, EcError> {
        let mut outcome = self.exec_stmt(block, frame);
        if let Err(e) = outcome {
            outcome = if let Some(h) = handler {
                let catch_frame = Frame::child_block(frame);
                if let Some(param) = &h.param {
                    Frame::declare_lexical(&catch_frame, DeclKind::Let, param, Some(e.as_thrown_value()))
                        .map_err(|e| self.env_error(e, None))?;
                }
                self.exec_stmt(&h.body, &catch_frame)
            } else {
                Err(e)
            };
        }
        if let Some(fin) = finalizer {
            let fin_flow = self.exec_stmt(fin, frame)?;
            if !matches!(fin_flow, Flow::Normal) {
                outcome = Ok(fin_flow);
            }
        }
        outcome
    }

    fn bind_import_specifier(
        &mut self,
        spec: &crate::ast::ImportSpecifier,
        exports: &IndexMap<String, Value>,
        source: &str,
        frame: &Rc<RefCell<Frame>>,
    ) -> Result<(), EcError> {
        use crate::ast::ImportSpecifier::*;
        match spec {
            Named { imported, local } => {
                let value = exports.get(imported).cloned().ok_or_else(|| {
                    crate::error::ModuleError::new(
                        format!("module '{source}' has no export named '{imported}'"),
                        source.to_string(),
                    )
                })?;
                Frame::declare_lexical(frame, DeclKind::Const, local, Some(value)).map_err(|e| self.env_error(e, None))
            }
            Default { local } => {
                let value = exports.get("default").cloned().unwrap_or(Value::Undefined);
                Frame::declare_lexical(frame, DeclKind::Const, local, Some(value)).map_err(|e| self.env_error(e, None))
            }
            Namespace { local } => {
                let value = Value::object(exports.clone());
                Frame::declare_lexical(frame, DeclKind::Const, local, Some(value)).map_err(|e| self.env_error(e, None))
            }
        }
    }

    fn exec_export(&mut self, decl: &crate::ast::ExportDecl, frame: &Rc<RefCell<Frame>>) -> Result<Flow, EcError> {
        use crate::ast::ExportDecl::*;
        match decl {
            Declaration(stmt) => self.exec_stmt(stmt, frame),
            Default(e) => {
                let value = self.eval_expr(e, frame)?;
                let _ = Frame::declare_lexical(frame, DeclKind::Const, "default", Some(value));
                Ok(Flow::Normal)
            }
            Named(_) | ReExport { .. } => Ok(Flow::Normal),
        }
    }

    // ---- Module top-level evaluation ------------------------------------

    /// Runs a module's top-level statements in `frame`, writing its exports
    /// into `live_exports` as each `export` statement executes — so a
    /// circular re-entrant import sees the partial exports map observable
    /// at that point. CommonJS
    /// modules (no top-level `export`, but `module.exports`/`exports.*`
    /// assignment) are detected by the absence of any `Stmt::Export` and
    /// their final `module.exports` value is read back instead.
    pub(crate) fn run_module_body(
        &mut self,
        program: &[StmtRef],
        frame: &Rc<RefCell<Frame>>,
        live_exports: &Rc<RefCell<IndexMap<String, Value>>>,
    ) -> Result<(), EcError> {
        let cjs_exports = Value::empty_object();
        let cjs_module = Value::empty_object();
        if let Value::Object(m) = &cjs_module {
            m.borrow_mut().insert("exports".to_string(), cjs_exports.clone());
        }
        let _ = Frame::declare_lexical(frame, DeclKind::Let, "module", Some(cjs_module));
        let _ = Frame::declare_lexical(frame, DeclKind::Let, "exports", Some(cjs_exports));

        self.hoist(program, frame)?;
        let mut has_esm_export = false;
        for stmt in program {
            self.exec_stmt(stmt, frame)?;
            if let Stmt::Export(decl) = stmt.as_ref() {
                has_esm_export = true;
                self.collect_export(decl, frame, &mut live_exports.borrow_mut())?;
            }
        }

        if !has_esm_export {
            if let Ok(Value::Object(module_obj)) = Frame::lookup(frame, "module") {
                let current = module_obj.borrow().get("exports").cloned();
                match current {
                    Some(Value::Object(entries)) => {
                        for (k, v) in entries.borrow().iter() {
                            live_exports.borrow_mut().insert(k.clone(), v.clone());
                        }
                    }
                    Some(other) => {
                        live_exports.borrow_mut().insert("default".to_string(), other);
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    fn collect_export(
        &mut self,
        decl: &crate::ast::ExportDecl,
        frame: &Rc<RefCell<Frame>>,
        exports: &mut IndexMap<String, Value>,
    ) -> Result<(), EcError> {
        use crate::ast::ExportDecl::*;
        match decl {
            Declaration(stmt) => {
                for name in exported_names(stmt) {
                    let value = Frame::lookup(frame, &name).unwrap_or(Value::Undefined);
                    exports.insert(name, value);
                }
            }
            Default(_) => {
                let value = Frame::lookup(frame, "default").unwrap_or(Value::Undefined);
                exports.insert("default".to_string(), value);
            }
            Named(list) => {
                for (local, exported) in list {
                    let value = Frame::lookup(frame, local).unwrap_or(Value::Undefined);
                    exports.insert(exported.clone(), value);
                }
            }
            ReExport { specifiers, source } => {
                let source_exports = crate::modules::import(self, source)?;
                for (imported, exported) in specifiers {
                    let value = source_exports.get(imported).cloned().unwrap_or(Value::Undefined);
                    exports.insert(exported.clone(), value);
                }
            }
        }
        Ok(())
    }

    // ---- Expression evaluation ------------------------------------------

    pub fn eval_expr(&mut self, expr: &Expr, frame: &Rc<RefCell<Frame>>) -> Result<Value, EcError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::StringLit(s) => Ok(Value::string(s.clone())),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::This => Ok(self.current_this.clone().unwrap_or(Value::Undefined)),

            Expr::TemplateLiteral { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(e) = exprs.get(i) {
                        let v = self.eval_expr(e, frame)?;
                        out.push_str(&v.to_coerced_string());
                    }
                }
                Ok(Value::string(out))
            }

            Expr::RegexLiteral { pattern, flags } => self.build_regex(pattern, flags),

            Expr::ArrayLiteral(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item, frame)?);
                }
                Ok(Value::array(values))
            }

            Expr::ObjectLiteral(props) => {
                let mut map = IndexMap::new();
                for (key, value_expr) in props {
                    let key_str = match key {
                        PropertyKey::Identifier(s) | PropertyKey::String(s) => s.clone(),
                        PropertyKey::Number(n) => Value::format_number(*n),
                    };
                    let value = self.eval_expr(value_expr, frame)?;
                    map.insert(key_str, value);
                }
                Ok(Value::object(map))
            }

            Expr::Identifier(name) => Frame::lookup(frame, name).map_err(|e| self.env_error(e, None)),

            Expr::Binary { op, left, right, span } => {
                let l = self.eval_expr(left, frame)?;
                if self.yielding() {
                    return Ok(Value::Undefined);
                }
                let r = self.eval_expr(right, frame)?;
                self.apply_binary(*op, l, r, *span)
            }

            Expr::Logical { op, left, right } => {
                let l = self.eval_expr(left, frame)?;
                match op {
                    LogicalOp::And => {
                        if l.is_truthy() {
                            self.eval_expr(right, frame)
                        } else {
                            Ok(l)
                        }
                    }
                    LogicalOp::Or => {
                        if l.is_truthy() {
                            Ok(l)
                        } else {
                            self.eval_expr(right, frame)
                        }
                    }
                }
            }

            Expr::Unary { op, expr: inner, span } => self.apply_unary(*op, inner, frame, *span),

            Expr::Update { op, prefix, target, span } => self.apply_update(*op, *prefix, target, frame, *span),

            Expr::Conditional { test, consequent, alternate } => {
                let cond = self.eval_expr(test, frame)?;
                if cond.is_truthy() {
                    self.eval_expr(consequent, frame)
                } else {
                    self.eval_expr(alternate, frame)
                }
            }

            Expr::Assignment { op, target, value, span } => self.apply_assignment(*op, target, value, frame, *span),

            Expr::Pipeline { left, right } => self.apply_pipeline(left, right, frame),

            Expr::Member { object, property, span } => {
                let obj = self.eval_expr(object, frame)?;
                self.get_property(&obj, property, *span)
            }

            Expr::Index { object, index, span } => {
                let obj = self.eval_expr(object, frame)?;
                let key = self.eval_expr(index, frame)?;
                self.get_property(&obj, &key.to_coerced_string(), *span)
            }

            Expr::Call { callee, args, span } => self.eval_call(callee, args, frame, *span),

            Expr::New { callee, args, span } => self.eval_new(callee, args, frame, *span),

            Expr::Function(node) => Ok(self.make_function_value(node.clone(), frame, None)),
            Expr::Arrow(node) => {
                let captured = self.current_this.clone().unwrap_or(Value::Undefined);
                Ok(self.make_function_value(node.clone(), frame, Some(captured)))
            }

            Expr::DynamicImport { specifier, span } => {
                let spec_val = self.eval_expr(specifier, frame)?;
                let specifier_str = spec_val.to_coerced_string();
                let exports = crate::modules::import(self, &specifier_str)
                    .map_err(|_| RuntimeError::new(format!("cannot resolve module '{specifier_str}'"), Some(*span)))?;
                Ok(Value::object(exports))
            }

            Expr::Yield { argument, span } => {
                let value = match argument {
                    Some(e) => self.eval_expr(e, frame)?,
                    None => Value::Undefined,
                };
                let Some(cursor) = self.gen_stack.last_mut() else {
                    return Err(RuntimeError::new("yield is only valid inside a generator function", Some(*span)).into());
                };
                cursor.count += 1;
                if cursor.count == cursor.target.saturating_sub(1) {
                    self.output_muted = false;
                }
                if cursor.count == cursor.target {
                    self.pending_yield = Some(value.clone());
                }
                Ok(value)
            }
        }
    }

    fn build_regex(&self, pattern: &str, flags: &[crate::token::RegexFlag]) -> Result<Value, EcError> {
        use crate::token::RegexFlag;
        let mut global = false;
        let mut ignore_case = false;
        let mut multiline = false;
        for f in flags {
            match f {
                RegexFlag::Global => global = true,
                RegexFlag::IgnoreCase => ignore_case = true,
                RegexFlag::Multiline => multiline = true,
            }
        }
        let mut inline = String::new();
        if ignore_case {
            inline.push('i');
        }
        if multiline {
            inline.push('m');
        }
        let full_pattern = if inline.is_empty() { pattern.to_string() } else { format!("(?{inline}){pattern}") };
        let compiled = regex::Regex::new(&full_pattern)
            .map_err(|e| RuntimeError::new(format!("invalid regular expression: {e}"), None))?;
        Ok(Value::Regex(Rc::new(RegexValue {
            source: pattern.to_string(),
            flags: RegexFlags { global, ignore_case, multiline },
            compiled,
        })))
    }

    fn apply_binary(&self, op: BinaryOp, l: Value, r: Value, _span: Span) -> Result<Value, EcError> {
        use BinaryOp::*;
        Ok(match op {
            Add => {
                if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                    Value::string(format!("{}{}", l.to_coerced_string(), r.to_coerced_string()))
                } else {
                    Value::Number(l.to_number() + r.to_number())
                }
            }
            Sub => Value::Number(l.to_number() - r.to_number()),
            Mul => Value::Number(l.to_number() * r.to_number()),
            Div => Value::Number(l.to_number() / r.to_number()),
            Mod => Value::Number(l.to_number() % r.to_number()),
            Eq => Value::Boolean(l.loose_eq(&r)),
            EqStrict => Value::Boolean(l.strict_eq(&r)),
            NotEq => Value::Boolean(!l.loose_eq(&r)),
            NotEqStrict => Value::Boolean(!l.strict_eq(&r)),
            Lt | LtEq | Gt | GtEq => self.compare(op, &l, &r),
            BitAnd => Value::Number((to_int32(l.to_number()) & to_int32(r.to_number())) as f64),
            BitOr => Value::Number((to_int32(l.to_number()) | to_int32(r.to_number())) as f64),
            BitXor => Value::Number((to_int32(l.to_number()) ^ to_int32(r.to_number())) as f64),
            Shl => Value::Number(((to_int32(l.to_number())) << (to_int32(r.to_number()) & 31)) as f64),
            Shr => Value::Number(((to_int32(l.to_number())) >> (to_int32(r.to_number()) & 31)) as f64),
            UShr => {
                let lv = to_int32(l.to_number()) as u32;
                let shift = (to_int32(r.to_number()) & 31) as u32;
                Value::Number((lv >> shift) as f64)
            }
        })
    }

    fn compare(&self, op: BinaryOp, l: &Value, r: &Value) -> Value {
        use BinaryOp::*;
        if let (Value::String(a), Value::String(b)) = (l, r) {
            return Value::Boolean(match op {
                Lt => a < b,
                LtEq => a <= b,
                Gt => a > b,
                GtEq => a >= b,
                _ => unreachable!(),
            });
        }
        let a = l.to_number();
        let b = r.to_number();
        if a.is_nan() || b.is_nan() {
            return Value::Boolean(false);
        }
        Value::Boolean(match op {
            Lt => a < b,
            LtEq => a <= b,
            Gt => a > b,
            GtEq => a >= b,
            _ => unreachable!(),
        })
    }

    fn apply_unary(&mut self, op: UnaryOp, inner: &Expr, frame: &Rc<RefCell<Frame>>, span: Span) -> Result<Value, EcError> {
        if op == UnaryOp::Typeof {
            if let Expr::Identifier(name) = inner {
                if !Frame::is_declared(frame, name) {
                    return Ok(Value::string("undefined"));
                }
            }
        }
        let v = self.eval_expr(inner, frame)?;
        let _ = span;
        Ok(match op {
            UnaryOp::Not => Value::Boolean(!v.is_truthy()),
            UnaryOp::Plus => Value::Number(v.to_number()),
            UnaryOp::Minus => Value::Number(-v.to_number()),
            UnaryOp::Typeof => Value::string(v.type_of()),
        })
    }

    fn apply_update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        target: &ExprRef,
        frame: &Rc<RefCell<Frame>>,
        span: Span,
    ) -> Result<Value, EcError> {
        let place = self.resolve_place(target, frame)?;
        let old = self.read_place(&place, frame)?;
        let old_num = old.to_number();
        let new_num = match op {
            UpdateOp::Increment => old_num + 1.0,
            UpdateOp::Decrement => old_num - 1.0,
        };
        let new_val = Value::Number(new_num);
        self.write_place(&place, new_val.clone(), frame)
            .map_err(|e| self.rewrap_span(e, span))?;
        Ok(if prefix { new_val } else { Value::Number(old_num) })
    }

    fn rewrap_span(&self, e: EcError, span: Span) -> EcError {
        match e {
            EcError::Runtime(mut re) => {
                if re.span.is_none() {
                    re.span = Some(span);
                }
                EcError::Runtime(re)
            }
            other => other,
        }
    }

    fn apply_assignment(
        &mut self,
        op: AssignOp,
        target: &ExprRef,
        value_expr: &ExprRef,
        frame: &Rc<RefCell<Frame>>,
        span: Span,
    ) -> Result<Value, EcError> {
        if op == AssignOp::Assign {
            let new_value = self.eval_expr(value_expr, frame)?;
            if self.yielding() {
                return Ok(new_value);
            }
            self.assign_to_target(target, new_value.clone(), frame)
                .map_err(|e| self.rewrap_span(e, span))?;
            return Ok(new_value);
        }

        // Resolve the target's object/key once, up front, so a side-effecting
        // sub-expression in the target (a getter-like call, an index with a
        // `++`) runs exactly once rather than once for the read and again for
        // the write-back.
        let place = self.resolve_place(target, frame)?;
        let old = self.read_place(&place, frame)?;
        let rhs = self.eval_expr(value_expr, frame)?;
        let new_value = match op {
            AssignOp::Add => {
                if matches!(old, Value::String(_)) || matches!(rhs, Value::String(_)) {
                    Value::string(format!("{}{}", old.to_coerced_string(), rhs.to_coerced_string()))
                } else {
                    Value::Number(old.to_number() + rhs.to_number())
                }
            }
            AssignOp::Sub => Value::Number(old.to_number() - rhs.to_number()),
            AssignOp::Mul => Value::Number(old.to_number() * rhs.to_number()),
            AssignOp::Div => Value::Number(old.to_number() / rhs.to_number()),
            AssignOp::Assign => unreachable!(),
        };
        if self.yielding() {
            return Ok(new_value);
        }
        self.write_place(&place, new_value.clone(), frame)
            .map_err(|e| self.rewrap_span(e, span))?;
        Ok(new_value)
    }

    fn resolve_place(&mut self, target: &Expr, frame: &Rc<RefCell<Frame>>) -> Result<AssignPlace, EcError> {
        match target {
            Expr::Identifier(name) => Ok(AssignPlace::Identifier(name.clone())),
            Expr::Member { object, property, span } => {
                let obj = self.eval_expr(object, frame)?;
                Ok(AssignPlace::Property { obj, key: property.clone(), span: *span })
            }
            Expr::Index { object, index, span } => {
                let obj = self.eval_expr(object, frame)?;
                let key_val = self.eval_expr(index, frame)?;
                Ok(AssignPlace::Property { obj, key: key_val.to_coerced_string(), span: *span })
            }
            _ => Err(RuntimeError::new("invalid assignment target", None).into()),
        }
    }

    fn read_place(&mut self, place: &AssignPlace, frame: &Rc<RefCell<Frame>>) -> Result<Value, EcError> {
        match place {
            AssignPlace::Identifier(name) => Frame::lookup(frame, name).map_err(|e| self.env_error(e, None)),
            AssignPlace::Property { obj, key, span } => self.get_property(obj, key, *span),
        }
    }

    fn write_place(&mut self, place: &AssignPlace, new_value: Value, frame: &Rc<RefCell<Frame>>) -> Result<(), EcError> {
        match place {
            AssignPlace::Identifier(name) => {
                let (old, observers) =
                    Frame::assign(frame, name, new_value.clone()).map_err(|e| self.env_error(e, None))?;
                self.fire_observers(name, old, new_value, observers, frame)
            }
            AssignPlace::Property { obj, key, span } => self.set_property(obj, key, new_value, *span),
        }
    }

    fn assign_to_target(&mut self, target: &Expr, new_value: Value, frame: &Rc<RefCell<Frame>>) -> Result<(), EcError> {
        let place = self.resolve_place(target, frame)?;
        self.write_place(&place, new_value, frame)
    }

    /// Fans out to every observer attached to `name` in registration order
    ///. A single-variable observer is
    /// called as `(oldValue, newValue, name)`; an observer shared across
    /// multiple `observe (a, b, …)` targets instead receives one `changes`
    /// record.
    fn fire_observers(
        &mut self,
        name: &str,
        old_value: Value,
        new_value: Value,
        observers: Vec<Value>,
        frame: &Rc<RefCell<Frame>>,
    ) -> Result<(), EcError> {
        for observer in observers {
            let multi_targets = match &observer {
                Value::Function(c) => self.multi_observers.get(&(Rc::as_ptr(c) as usize)).cloned(),
                _ => None,
            };
            let call_args = match multi_targets {
                Some(targets) => vec![self.build_changes_record(&targets, name, &old_value, &new_value, frame)],
                None => vec![old_value.clone(), new_value.clone(), Value::string(name.to_string())],
            };
            self.trigger_stack.push(name.to_string());
            let result = self.call_value(observer, Value::Undefined, call_args, None);
            self.trigger_stack.pop();
            result?;
        }
        Ok(())
    }

    /// Builds the `{triggered, values, <name>: {old, new}}` record passed to
    /// a multi-variable observer. `values` reflects the
    /// post-change state of every watched binding; the per-name `old`/`new`
    /// entry is only populated for the binding that actually changed.
    fn build_changes_record(
        &self,
        targets: &[String],
        changed_name: &str,
        old_value: &Value,
        new_value: &Value,
        frame: &Rc<RefCell<Frame>>,
    ) -> Value {
        let mut values = IndexMap::new();
        for target in targets {
            let current = if target == changed_name {
                new_value.clone()
            } else {
                Frame::lookup(frame, target).unwrap_or(Value::Undefined)
            };
            values.insert(target.clone(), current);
        }
        let mut changes = IndexMap::new();
        changes.insert("triggered".to_string(), Value::array(vec![Value::string(changed_name.to_string())]));
        changes.insert("values".to_string(), Value::object(values));
        let mut entry = IndexMap::new();
        entry.insert("old".to_string(), old_value.clone());
        entry.insert("new".to_string(), new_value.clone());
        changes.insert(changed_name.to_string(), Value::object(entry));
        Value::object(changes)
    }

    fn get_property(&mut self, obj: &Value, name: &str, span: Span) -> Result<Value, EcError> {
        match obj {
            Value::Array(items) => {
                if name == "length" {
                    Ok(Value::Number(items.borrow().len() as f64))
                } else if let Ok(idx) = name.parse::<usize>() {
                    Ok(items.borrow().get(idx).cloned().unwrap_or(Value::Undefined))
                } else {
                    Ok(self.bind_method(obj.clone(), name))
                }
            }
            Value::String(s) => {
                if name == "length" {
                    Ok(Value::Number(s.chars().count() as f64))
                } else if let Ok(idx) = name.parse::<usize>() {
                    Ok(s.chars().nth(idx).map(|c| Value::string(c.to_string())).unwrap_or(Value::Undefined))
                } else {
                    Ok(self.bind_method(obj.clone(), name))
                }
            }
            Value::Object(entries) => {
                if let Some(v) = entries.borrow().get(name) {
                    Ok(v.clone())
                } else {
                    Ok(self.bind_method(obj.clone(), name))
                }
            }
            Value::Host(h) => Ok(h.data.borrow().get(name).cloned().unwrap_or(Value::Undefined)),
            Value::Function(c) if name == "name" => Ok(Value::string(c.name().unwrap_or("").to_string())),
            Value::Undefined | Value::Null => Err(RuntimeError::new(
                format!("cannot read properties of {} (reading '{}')", obj.to_coerced_string(), name),
                Some(span),
            )
            .into()),
            _ => Ok(self.bind_method(obj.clone(), name)),
        }
    }

    /// Wraps a built-in method name into a callable bound to `receiver`, so
    /// plain property reads (`const f = arr.push`) and calls both resolve
    /// through the same host dispatch table.
    fn bind_method(&self, receiver: Value, name: &str) -> Value {
        let name_owned = name.to_string();
        let func: crate::value::NativeFn = Rc::new(move |ev, _this, args| {
            crate::host::dispatch_method(ev, &receiver, &name_owned, args)
                .unwrap_or(Ok(Value::Undefined))
        });
        Value::Function(Rc::new(Callable::Native(NativeFunction { name: "bound", func })))
    }

    fn set_property(&mut self, obj: &Value, key: &str, value: Value, span: Span) -> Result<(), EcError> {
        match obj {
            Value::Object(entries) => {
                entries.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let new_len = value.to_number().max(0.0) as usize;
                    items.borrow_mut().resize(new_len, Value::Undefined);
                } else if let Ok(idx) = key.parse::<usize>() {
                    let mut vec = items.borrow_mut();
                    if idx >= vec.len() {
                        vec.resize(idx + 1, Value::Undefined);
                    }
                    vec[idx] = value;
                }
                Ok(())
            }
            Value::Host(h) => {
                h.data.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            _ => Err(HostError::new(format!("cannot set property '{key}' on {}", obj.to_coerced_string())).into())
                .map_err(|e: EcError| self.rewrap_span(e, span)),
        }
    }

    fn apply_pipeline(&mut self, left: &ExprRef, right: &ExprRef, frame: &Rc<RefCell<Frame>>) -> Result<Value, EcError> {
        let left_val = self.eval_expr(left, frame)?;
        if let Expr::Call { callee, args, span } = right.as_ref() {
            let callee_val = self.eval_expr(callee, frame)?;
            let mut arg_vals = vec![left_val];
            for a in args {
                arg_vals.push(self.eval_expr(a, frame)?);
            }
            self.call_value(callee_val, Value::Undefined, arg_vals, Some(*span))
        } else {
            let func = self.eval_expr(right, frame)?;
            self.call_value(func, Value::Undefined, vec![left_val], None)
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[ExprRef], frame: &Rc<RefCell<Frame>>, span: Span) -> Result<Value, EcError> {
        match callee {
            Expr::Member { object, property, .. } => {
                let this_value = self.eval_expr(object, frame)?;
                let arg_vals = self.eval_args(args, frame)?;
                self.call_method(this_value, property, arg_vals, span)
            }
            Expr::Index { object, index, .. } => {
                let this_value = self.eval_expr(object, frame)?;
                let key = self.eval_expr(index, frame)?;
                let arg_vals = self.eval_args(args, frame)?;
                self.call_method(this_value, &key.to_coerced_string(), arg_vals, span)
            }
            _ => {
                let callee_val = self.eval_expr(callee, frame)?;
                let arg_vals = self.eval_args(args, frame)?;
                self.call_value(callee_val, Value::Undefined, arg_vals, Some(span))
            }
        }
    }

    fn eval_args(&mut self, args: &[ExprRef], frame: &Rc<RefCell<Frame>>) -> Result<Vec<Value>, EcError> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            out.push(self.eval_expr(a, frame)?);
            if self.yielding() {
                break;
            }
        }
        Ok(out)
    }

    fn call_method(&mut self, this_value: Value, name: &str, args: Vec<Value>, span: Span) -> Result<Value, EcError> {
        if let Value::Object(entries) = &this_value {
            let stored = entries.borrow().get(name).cloned();
            if let Some(v) = stored {
                return self.call_value(v, this_value.clone(), args, Some(span));
            }
        }
        if let Value::Generator(g) = &this_value {
            if name == "next" {
                let result = self.generator_next(g.clone())?;
                let mut map = IndexMap::new();
                map.insert("value".to_string(), result.value);
                map.insert("done".to_string(), Value::Boolean(result.done));
                return Ok(Value::object(map));
            }
        }
        match crate::host::dispatch_method(self, &this_value, name, args) {
            Some(result) => result,
            None => Err(RuntimeError::new(
                format!("{}.{} is not a function", this_value.to_coerced_string(), name),
                Some(span),
            )
            .into()),
        }
    }

    pub fn call_value(&mut self, callee: Value, this_value: Value, args: Vec<Value>, span: Option<Span>) -> Result<Value, EcError> {
        match &callee {
            Value::Function(callable) => match callable.as_ref() {
                Callable::Native(nf) => (nf.func)(self, this_value, args),
                Callable::User(uf) => {
                    if uf.kind == FunctionKind::Generator {
                        if let Err(reason) = check_replay_safe(&uf.node) {
                            return Err(RuntimeError::new(
                                format!("unsupported generator body: {reason}"),
                                span,
                            )
                            .into());
                        }
                        let state = GeneratorState::new(uf.clone(), this_value, args);
                        Ok(Value::Generator(Rc::new(RefCell::new(state))))
                    } else {
                        self.call_user_function(uf.clone(), this_value, args, span)
                    }
                }
            },
            _ => Err(RuntimeError::new(format!("{} is not a function", callee.to_coerced_string()), span).into()),
        }
    }

    fn call_user_function(
        &mut self,
        uf: Rc<UserFunction>,
        this_value: Value,
        args: Vec<Value>,
        span: Option<Span>,
    ) -> Result<Value, EcError> {
        self.call_depth += 1;
        if self.call_depth > MAX_CALL_DEPTH {
            self.call_depth -= 1;
            return Err(RuntimeError::new("Maximum call stack size exceeded", span).into());
        }
        let frame = Frame::child_function(&uf.closure);
        self.bind_params(&frame, &uf.node.params, &args);
        let this_for_body = if uf.kind == FunctionKind::Arrow {
            uf.captured_this.clone().unwrap_or(Value::Undefined)
        } else {
            this_value
        };
        let prev_this = std::mem::replace(&mut self.current_this, Some(this_for_body));
        let flow = self.exec_body(&uf.node.body, &frame);
        self.current_this = prev_this;
        self.call_depth -= 1;
        match flow? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::Undefined),
        }
    }

    fn bind_params(&self, frame: &Rc<RefCell<Frame>>, params: &[String], args: &[Value]) {
        for (i, name) in params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Undefined);
            let _ = Frame::declare_lexical(frame, DeclKind::Let, name, Some(value));
        }
    }

    fn make_function_value(&self, node: Rc<FunctionNode>, frame: &Rc<RefCell<Frame>>, captured_this: Option<Value>) -> Value {
        let kind = node.kind;
        let uf = UserFunction {
            name: node.name.clone(),
            node,
            closure: frame.clone(),
            kind,
            captured_this,
        };
        Value::Function(Rc::new(Callable::User(Rc::new(uf))))
    }

    fn eval_new(&mut self, callee: &Expr, args: &[ExprRef], frame: &Rc<RefCell<Frame>>, span: Span) -> Result<Value, EcError> {
        let arg_vals = self.eval_args(args, frame)?;
        if let Expr::Identifier(name) = callee {
            if let Some(result) = crate::host::construct_builtin(self, name, &arg_vals)? {
                return Ok(result);
            }
        }
        let callee_val = self.eval_expr(callee, frame)?;
        match &callee_val {
            Value::Function(_) => {
                let new_obj = Value::empty_object();
                let result = self.call_value(callee_val, new_obj.clone(), arg_vals, Some(span))?;
                match result {
                    Value::Object(_) => Ok(result),
                    _ => Ok(new_obj),
                }
            }
            _ => Err(RuntimeError::new(format!("{} is not a constructor", callee_val.to_coerced_string()), Some(span)).into()),
        }
    }

    // ---- Generators -----------------------------------------------------

    /// Drives one `next()` call by replaying the generator's body from the
    /// start, muting output already shown on earlier calls, and stopping at
    /// the first `yield` this call hasn't produced a value for yet
    ///.
    pub fn generator_next(&mut self, gen: Rc<RefCell<GeneratorState>>) -> Result<GeneratorResult, EcError> {
        let (func, this_value, args, yields_consumed, already_done) = {
            let g = gen.borrow();
            (g.func.clone(), g.this_value.clone(), g.args.clone(), g.yields_consumed, g.done)
        };
        if already_done {
            return Ok(GeneratorResult { value: Value::Undefined, done: true });
        }

        let target = yields_consumed + 1;
        let cursor = ReplayCursor::new(target);
        let prev_muted = self.output_muted;
        self.output_muted = cursor.initially_muted();
        self.gen_stack.push(cursor);

        let frame = Frame::child_function(&func.closure);
        self.bind_params(&frame, &func.node.params, &args);
        let prev_this = std::mem::replace(&mut self.current_this, Some(this_value));
        self.call_depth += 1;
        let flow = self.exec_body(&func.node.body, &frame);
        self.call_depth -= 1;
        self.current_this = prev_this;
        self.gen_stack.pop();
        self.output_muted = prev_muted;

        let produced = self.pending_yield.take();
        match produced {
            Some(value) => {
                gen.borrow_mut().yields_consumed += 1;
                Ok(GeneratorResult { value, done: false })
            }
            None => match flow? {
                _ => {
                    gen.borrow_mut().done = true;
                    Ok(GeneratorResult { value: Value::Undefined, done: true })
                }
            },
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Names bound by a top-level declaration wrapped in `export`; only
/// `var`/`let`/`const` and function declarations can be re-exported by
/// name this way.
fn exported_names(stmt: &Stmt) -> Vec<String> {
    match stmt {
        Stmt::VarDecl { name, .. } => vec![name.clone()],
        Stmt::FunctionDecl(node) => node.name.clone().into_iter().collect(),
        _ => Vec::new(),
    }
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let truncated = n.trunc();
    let modulo = truncated.rem_euclid(4294967296.0);
    if modulo >= 2147483648.0 {
        (modulo - 4294967296.0) as i32
    } else {
        modulo as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn run(source: &str) -> Result<Value, EcError> {
        let tokens = crate::lexer::tokenize(source)?;
        let program = Parser::new(tokens).parse_program()?;
        let mut ev = Evaluator::new();
        ev.run_program(&program)
    }

    #[test]
    fn arithmetic_and_string_concat() {
        assert_eq!(run("1 + 2 * 3;").unwrap(), Value::Number(7.0));
        assert_eq!(run("'a' + 1;").unwrap(), Value::string("a1"));
    }

    #[test]
    fn var_hoists_above_its_declaration() {
        let result = run("function f() { var x = typeof y; var y = 1; return x; } f();").unwrap();
        assert_eq!(result, Value::string("undefined"));
    }

    #[test]
    fn closures_capture_their_defining_scope() {
        let result = run(
            "function makeCounter() { let n = 0; return function() { n = n + 1; return n; }; } \
             let c = makeCounter(); c(); c(); c();",
        )
        .unwrap();
        assert_eq!(result, Value::Number(3.0));
    }

    #[test]
    fn arrow_functions_do_not_rebind_this() {
        let result = run(
            "function Counter() { this.n = 0; this.inc = () => { this.n = this.n + 1; return this.n; }; } \
             let c = new Counter(); c.inc(); c.inc();",
        )
        .unwrap();
        assert_eq!(result, Value::Number(2.0));
    }

    #[test]
    fn observe_fires_handler_with_old_new_and_name() {
        let result = run(
            "let total = 0; let log = ''; \
             observe total (function(o, n, name) { log = log + 'from ' + o + ' to ' + n + ' (' + name + '); '; }); \
             total = 5; total = 7; log;",
        )
        .unwrap();
        assert_eq!(
            result,
            Value::string("from 0 to 5 (total); from 5 to 7 (total); ")
        );
    }

    #[test]
    fn observe_reassigning_same_value_still_triggers() {
        let result = run(
            "let c = 1; let hits = 0; observe c (function(o, n) { hits = hits + 1; }); c = 1; hits;",
        )
        .unwrap();
        assert_eq!(result, Value::Number(1.0));
    }

    #[test]
    fn multi_variable_observe_receives_changes_record() {
        let result = run(
            "let a = 1; let b = 2; let seenTriggered = ''; let seenValues = 0; \
             observe (a, b) (function(changes) { \
                 seenTriggered = changes.triggered[0]; \
                 seenValues = changes.values.a + changes.values.b; \
             }); \
             a = 10; seenTriggered + ':' + seenValues;",
        )
        .unwrap();
        assert_eq!(result, Value::string("a:12"));
    }

    #[test]
    fn const_reassignment_is_a_runtime_error() {
        assert!(run("const x = 1; x = 2;").is_err());
    }

    #[test]
    fn try_catch_binds_thrown_value() {
        let result = run("let out = 0; try { throw 42; } catch (e) { out = e; } out;").unwrap();
        assert_eq!(result, Value::Number(42.0));
    }

    #[test]
    fn generator_replay_yields_in_order() {
        let result = run(
            "function* gen() { yield 1; yield 2; yield 3; } \
             let g = gen(); let a = g.next().value; let b = g.next().value; let c = g.next().value; \
             a + b + c;",
        )
        .unwrap();
        assert_eq!(result, Value::Number(6.0));
    }

    #[test]
    fn pipeline_prepends_left_operand_to_call() {
        let result = run("function double(x) { return x * 2; } 5 |> double;").unwrap();
        assert_eq!(result, Value::Number(10.0));
    }
}
