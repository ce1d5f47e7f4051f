use std::rc::Rc;

use super::{ExprRef, FunctionNode, NodeSpan};

pub type StmtRef = Rc<Stmt>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Decl(DeclKind, String, Option<ExprRef>),
    Expr(ExprRef),
}

/// The left-hand side of a `for…in`/`for…of` head: either a fresh
/// declaration or an existing assignable target.
#[derive(Debug, Clone)]
pub enum ForTarget {
    Decl(DeclKind, String),
    Target(ExprRef),
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` marks the `default:` label.
    pub test: Option<ExprRef>,
    pub body: Vec<StmtRef>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: StmtRef,
}

#[derive(Debug, Clone)]
pub enum ImportSpecifier {
    /// `import { area } from "./m"` / `import { area as a } from "./m"`.
    Named { imported: String, local: String },
    /// `import area from "./m"`.
    Default { local: String },
    /// `import * as m from "./m"`.
    Namespace { local: String },
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub specifiers: Vec<ImportSpecifier>,
    pub source: String,
}

#[derive(Debug, Clone)]
pub enum ExportDecl {
    /// `export const PI = 3.14;` / `export function area(...) {...}`.
    Declaration(StmtRef),
    /// `export default expr;`.
    Default(ExprRef),
    /// `export { a, b as c };`.
    Named(Vec<(String, String)>),
    /// `export { a, b as c } from "./m";`.
    ReExport { specifiers: Vec<(String, String)>, source: String },
}

/// The guard condition of a `when` block inside an observer body: an
/// ordinary expression, or a bare variable name meaning "triggered by this
/// variable".
#[derive(Debug, Clone)]
pub enum WhenCond {
    Expr(ExprRef),
    TriggeredBy(String),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    VarDecl { kind: DeclKind, name: String, init: Option<ExprRef>, span: NodeSpan },
    Block(Vec<StmtRef>),
    ExprStmt(ExprRef),

    If { test: ExprRef, consequent: StmtRef, alternate: Option<StmtRef> },
    While { test: ExprRef, body: StmtRef },
    DoWhile { body: StmtRef, test: ExprRef },
    For { init: Option<ForInit>, test: Option<ExprRef>, update: Option<ExprRef>, body: StmtRef },
    ForIn { left: ForTarget, right: ExprRef, body: StmtRef },
    ForOf { left: ForTarget, right: ExprRef, body: StmtRef },

    Switch { discriminant: ExprRef, cases: Vec<SwitchCase> },
    Try { block: StmtRef, handler: Option<CatchClause>, finalizer: Option<StmtRef> },

    Throw(ExprRef, NodeSpan),
    Break,
    Continue,
    Return(Option<ExprRef>),

    FunctionDecl(Rc<FunctionNode>),

    Import(ImportDecl),
    Export(ExportDecl),

    /// `observe name fn` (single target) or `observe (a, b) fn` (multiple)
    ///.
    Observe { targets: Vec<String>, handler: ExprRef, span: NodeSpan },
    When { cond: WhenCond, body: StmtRef },
}
