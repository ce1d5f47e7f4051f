//! Recursive-descent parser with Pratt-style precedence climbing for
//! expressions.

use std::rc::Rc;

use crate::ast::*;
use crate::error::SyntaxError;
use crate::lexer::tokenize;
use crate::token::{RegexFlag, Span, TemplatePart, Token, TokenKind};

pub(super) type ParseResult<T> = Result<T, SyntaxError>;

/// Binding power for the Pratt climber, low to high. Comma is not exposed
/// as a binary expression (it only separates lists), so it has no entry
/// here.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Prec {
    None,
    Assignment,
    Ternary,
    Pipeline,
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Equality,
    Relational,
    Shift,
    Additive,
    Multiplicative,
    Unary,
    Call,
}

fn infix_prec(kind: &TokenKind) -> Prec {
    use TokenKind::*;
    match kind {
        Pipeline => Prec::Pipeline,
        OrOr => Prec::LogicalOr,
        AndAnd => Prec::LogicalAnd,
        Pipe => Prec::BitOr,
        Caret => Prec::BitXor,
        Amp => Prec::BitAnd,
        EqEq | EqEqEq | NotEq | NotEqEq => Prec::Equality,
        Lt | LtEq | Gt | GtEq => Prec::Relational,
        Shl | Shr | UShr => Prec::Shift,
        Plus | Minus => Prec::Additive,
        Star | Slash | Percent => Prec::Multiplicative,
        LParen | Dot | LBracket => Prec::Call,
        _ => Prec::None,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn from_source(source: &str) -> Result<Self, SyntaxError> {
        let tokens = tokenize(source).map_err(|e| SyntaxError::new(e.message, e.span))?;
        Ok(Self::new(tokens))
    }

    /// Parses a whole program: a sequence of statements up to end-of-input
    ///. Statement-level errors are recovered from by discarding
    /// tokens until the next `;` or `}` so later errors can also surface.
    pub fn parse_program(&mut self) -> Result<Vec<StmtRef>, Vec<SyntaxError>> {
        let mut stmts = Vec::new();
        let mut errors = Vec::new();
        while !self.is_at_end() {
            match self.top_level_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) => {
                    errors.push(e);
                    self.synchronize();
                }
            }
        }
        if errors.is_empty() {
            Ok(stmts)
        } else {
            Err(errors)
        }
    }

    // ---- token stream plumbing ----------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.current + offset).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.current].clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_tok(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!("expected {} {}", kind, context)))
        }
    }

    fn error(&self, message: &str) -> SyntaxError {
        let span = self.peek().span;
        SyntaxError::new(
            format!("{} but found '{}'", message, self.peek().lexeme),
            span,
        )
    }

    /// Recovery: discard tokens until the next `;` or `}`.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            let kind = self.peek().kind.clone();
            self.advance();
            if matches!(kind, TokenKind::Semicolon | TokenKind::RBrace) {
                return;
            }
        }
    }

    fn identifier_name(&mut self, context: &str) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&format!("expected identifier {}", context))),
        }
    }

    // ---- statements -----------------------------------------------------

    /// Parses one statement nested inside a block, loop body, arm, etc.
    /// `import`/`export` are rejected here — they're only legal at
    /// top-level statement position.
    fn statement(&mut self) -> ParseResult<StmtRef> {
        self.statement_in_context(false)
    }

    /// Parses one statement at program top level, where `import`/`export`
    /// are additionally legal.
    fn top_level_statement(&mut self) -> ParseResult<StmtRef> {
        self.statement_in_context(true)
    }

    fn statement_in_context(&mut self, top_level: bool) -> ParseResult<StmtRef> {
        match &self.peek().kind {
            TokenKind::Var | TokenKind::Let | TokenKind::Const => self.var_decl_statement(),
            TokenKind::LBrace => self.block_statement(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Do => self.do_while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Switch => self.switch_statement(),
            TokenKind::Try => self.try_statement(),
            TokenKind::Throw => self.throw_statement(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "after 'break'")?;
                Ok(Rc::new(Stmt::Break))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "after 'continue'")?;
                Ok(Rc::new(Stmt::Continue))
            }
            TokenKind::Return => self.return_statement(),
            TokenKind::Function => self.function_decl_statement(),
            TokenKind::Import => {
                if !top_level {
                    let span = self.peek().span;
                    return Err(SyntaxError::new(
                        "'import' declarations are only allowed at the top level, not nested inside a block",
                        span,
                    ));
                }
                self.import_statement()
            }
            TokenKind::Export => {
                if !top_level {
                    let span = self.peek().span;
                    return Err(SyntaxError::new(
                        "'export' declarations are only allowed at the top level, not nested inside a block",
                        span,
                    ));
                }
                self.export_statement()
            }
            TokenKind::Observe => self.observe_statement(),
            TokenKind::When => self.when_statement(),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Rc::new(Stmt::Block(Vec::new())))
            }
            _ => self.expr_statement(),
        }
    }

    fn decl_kind(&mut self) -> DeclKind {
        match self.advance().kind {
            TokenKind::Var => DeclKind::Var,
            TokenKind::Let => DeclKind::Let,
            TokenKind::Const => DeclKind::Const,
            _ => unreachable!("caller checked token kind"),
        }
    }

    fn var_decl_statement(&mut self) -> ParseResult<StmtRef> {
        let span = self.peek().span;
        let kind = self.decl_kind();
        let name = self.identifier_name("after declaration keyword")?;
        let init = if self.match_tok(&TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        if kind == DeclKind::Const && init.is_none() {
            return Err(SyntaxError::new("'const' declarations require an initializer", span));
        }
        self.expect(TokenKind::Semicolon, "after variable declaration")?;
        Ok(Rc::new(Stmt::VarDecl { kind, name, init, span }))
    }

    fn block_statement(&mut self) -> ParseResult<StmtRef> {
        self.expect(TokenKind::LBrace, "to start block")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.statement()?);
        }
        self.expect(TokenKind::RBrace, "to close block")?;
        Ok(Rc::new(Stmt::Block(stmts)))
    }

    /// `if`/`else` attaches `else` to the nearest unmatched `if` by virtue
    /// of recursive descent always consuming the immediately following
    /// `else`.
    fn if_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        self.expect(TokenKind::LParen, "after 'if'")?;
        let test = self.expression()?;
        self.expect(TokenKind::RParen, "after if condition")?;
        let consequent = self.statement()?;
        let alternate = if self.match_tok(&TokenKind::Else) {
            Some(self.statement()?)
        } else {
            None
        };
        Ok(Rc::new(Stmt::If { test, consequent, alternate }))
    }

    fn while_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        self.expect(TokenKind::LParen, "after 'while'")?;
        let test = self.expression()?;
        self.expect(TokenKind::RParen, "after while condition")?;
        let body = self.statement()?;
        Ok(Rc::new(Stmt::While { test, body }))
    }

    fn do_while_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        let body = self.statement()?;
        self.expect(TokenKind::While, "after do-while body")?;
        self.expect(TokenKind::LParen, "after 'while'")?;
        let test = self.expression()?;
        self.expect(TokenKind::RParen, "after do-while condition")?;
        self.expect(TokenKind::Semicolon, "after do-while statement")?;
        Ok(Rc::new(Stmt::DoWhile { body, test }))
    }

    fn for_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        self.expect(TokenKind::LParen, "after 'for'")?;

        // `for (lhs in expr)` / `for (lhs of expr)`: a declaration head with
        // no initializer, or a bare assignable target, followed by `in`/`of`
        // rather than `;`.
        if let Some(target) = self.try_for_in_of_target()? {
            if self.match_tok(&TokenKind::In) {
                let right = self.expression()?;
                self.expect(TokenKind::RParen, "after for-in header")?;
                let body = self.statement()?;
                return Ok(Rc::new(Stmt::ForIn { left: target, right, body }));
            }
            if self.match_tok(&TokenKind::Of) {
                let right = self.expression()?;
                self.expect(TokenKind::RParen, "after for-of header")?;
                let body = self.statement()?;
                return Ok(Rc::new(Stmt::ForOf { left: target, right, body }));
            }
            return self.finish_classic_for(Some(target.into_classic_init(self)?));
        }

        self.finish_classic_for(None)
    }

    /// Attempts to parse a `for`-head left-hand side as a `for…in`/`for…of`
    /// target, backtracking if it turns out to be a classic `for` init.
    fn try_for_in_of_target(&mut self) -> ParseResult<Option<ForTarget>> {
        let checkpoint = self.current;
        if matches!(self.peek().kind, TokenKind::Var | TokenKind::Let | TokenKind::Const) {
            let kind = self.decl_kind();
            if let TokenKind::Identifier(_) = &self.peek().kind {
                let name = self.identifier_name("in for-in/for-of head")?;
                if matches!(self.peek().kind, TokenKind::In | TokenKind::Of) {
                    return Ok(Some(ForTarget::Decl(kind, name)));
                }
            }
            self.current = checkpoint;
            return Ok(None);
        }
        if let TokenKind::Identifier(_) = &self.peek().kind {
            if matches!(self.peek_at(1).kind, TokenKind::In | TokenKind::Of) {
                let name = self.identifier_name("in for-in/for-of head")?;
                return Ok(Some(ForTarget::Target(Rc::new(Expr::Identifier(name)))));
            }
        }
        Ok(None)
    }

    fn finish_classic_for(&mut self, leftover_init: Option<ForInit>) -> ParseResult<StmtRef> {
        let init = if let Some(init) = leftover_init {
            self.expect(TokenKind::Semicolon, "after for-loop initializer")?;
            Some(init)
        } else if self.match_tok(&TokenKind::Semicolon) {
            None
        } else if matches!(self.peek().kind, TokenKind::Var | TokenKind::Let | TokenKind::Const) {
            let kind = self.decl_kind();
            let name = self.identifier_name("in for-loop initializer")?;
            let init_expr = if self.match_tok(&TokenKind::Assign) { Some(self.expression()?) } else { None };
            self.expect(TokenKind::Semicolon, "after for-loop initializer")?;
            Some(ForInit::Decl(kind, name, init_expr))
        } else {
            let expr = self.expression()?;
            self.expect(TokenKind::Semicolon, "after for-loop initializer")?;
            Some(ForInit::Expr(expr))
        };

        let test = if self.check(&TokenKind::Semicolon) { None } else { Some(self.expression()?) };
        self.expect(TokenKind::Semicolon, "after for-loop condition")?;

        let update = if self.check(&TokenKind::RParen) { None } else { Some(self.expression()?) };
        self.expect(TokenKind::RParen, "after for-loop header")?;

        let body = self.statement()?;
        Ok(Rc::new(Stmt::For { init, test, update, body }))
    }

    fn switch_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        self.expect(TokenKind::LParen, "after 'switch'")?;
        let discriminant = self.expression()?;
        self.expect(TokenKind::RParen, "after switch discriminant")?;
        self.expect(TokenKind::LBrace, "to start switch body")?;

        let mut cases = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let test = if self.match_tok(&TokenKind::Case) {
                let e = self.expression()?;
                self.expect(TokenKind::Colon, "after case label")?;
                Some(e)
            } else {
                self.expect(TokenKind::Default, "or 'case' in switch body")?;
                self.expect(TokenKind::Colon, "after 'default'")?;
                None
            };
            let mut body = Vec::new();
            while !matches!(self.peek().kind, TokenKind::Case | TokenKind::Default | TokenKind::RBrace) {
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect(TokenKind::RBrace, "to close switch body")?;
        Ok(Rc::new(Stmt::Switch { discriminant, cases }))
    }

    fn try_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        let block = self.block_statement()?;
        let handler = if self.match_tok(&TokenKind::Catch) {
            let param = if self.match_tok(&TokenKind::LParen) {
                let name = self.identifier_name("in catch clause")?;
                self.expect(TokenKind::RParen, "after catch parameter")?;
                Some(name)
            } else {
                None
            };
            let body = self.block_statement()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.match_tok(&TokenKind::Finally) {
            Some(self.block_statement()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("expected 'catch' or 'finally' after 'try' block"));
        }
        Ok(Rc::new(Stmt::Try { block, handler, finalizer }))
    }

    fn throw_statement(&mut self) -> ParseResult<StmtRef> {
        let span = self.peek().span;
        self.advance();
        let expr = self.expression()?;
        self.expect(TokenKind::Semicolon, "after throw statement")?;
        Ok(Rc::new(Stmt::Throw(expr, span)))
    }

    fn return_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        let value = if self.check(&TokenKind::Semicolon) { None } else { Some(self.expression()?) };
        self.expect(TokenKind::Semicolon, "after return statement")?;
        Ok(Rc::new(Stmt::Return(value)))
    }

    fn function_decl_statement(&mut self) -> ParseResult<StmtRef> {
        let node = self.function_node(FunctionKind::Function, true)?;
        // A semicolon after a function declaration is optional.
        self.match_tok(&TokenKind::Semicolon);
        Ok(Rc::new(Stmt::FunctionDecl(node)))
    }

    /// Parses `function [name] ( params ) { body }`. `require_name`
    /// distinguishes a declaration (name mandatory) from an expression
    /// (name optional). Leading `function` must already be un-consumed.
    fn function_node(&mut self, mut kind: FunctionKind, require_name: bool) -> ParseResult<Rc<FunctionNode>> {
        let span = self.peek().span;
        self.expect(TokenKind::Function, "to start function")?;
        if self.match_tok(&TokenKind::Star) {
            kind = FunctionKind::Generator;
        }
        let name = if let TokenKind::Identifier(_) = &self.peek().kind {
            Some(self.identifier_name("as function name")?)
        } else if require_name {
            return Err(self.error("expected function name"));
        } else {
            None
        };
        let params = self.parameter_list()?;
        let body = self.block_statement()?;
        Ok(Rc::new(FunctionNode { name, params, body, kind, span }))
    }

    fn parameter_list(&mut self) -> ParseResult<Vec<String>> {
        self.expect(TokenKind::LParen, "before parameter list")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.identifier_name("as parameter name")?);
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "after parameter list")?;
        Ok(params)
    }

    // ---- modules --------------------------------------------------------

    fn import_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        let mut specifiers = Vec::new();

        if self.match_tok(&TokenKind::Star) {
            self.expect(TokenKind::As, "after '*' in namespace import")?;
            let local = self.identifier_name("as namespace binding")?;
            specifiers.push(ImportSpecifier::Namespace { local });
        } else if let TokenKind::Identifier(_) = &self.peek().kind {
            let local = self.identifier_name("as default import binding")?;
            specifiers.push(ImportSpecifier::Default { local });
            if self.match_tok(&TokenKind::Comma) {
                self.parse_named_import_specifiers(&mut specifiers)?;
            }
        } else {
            self.parse_named_import_specifiers(&mut specifiers)?;
        }

        self.expect(TokenKind::From, "before import specifier")?;
        let source = self.string_literal_value("as import source")?;
        self.expect(TokenKind::Semicolon, "after import declaration")?;
        Ok(Rc::new(Stmt::Import(ImportDecl { specifiers, source })))
    }

    fn parse_named_import_specifiers(&mut self, out: &mut Vec<ImportSpecifier>) -> ParseResult<()> {
        self.expect(TokenKind::LBrace, "to start named imports")?;
        if !self.check(&TokenKind::RBrace) {
            loop {
                let imported = self.identifier_name("as imported name")?;
                let local = if self.match_tok(&TokenKind::As) {
                    self.identifier_name("after 'as' in import rename")?
                } else {
                    imported.clone()
                };
                out.push(ImportSpecifier::Named { imported, local });
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "to close named imports")?;
        Ok(())
    }

    fn string_literal_value(&mut self, context: &str) -> ParseResult<String> {
        match self.peek().kind.clone() {
            TokenKind::String(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.error(&format!("expected string literal {}", context))),
        }
    }

    fn export_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        if self.match_tok(&TokenKind::Default) {
            let expr = self.assignment()?;
            self.match_tok(&TokenKind::Semicolon);
            return Ok(Rc::new(Stmt::Export(ExportDecl::Default(expr))));
        }
        if self.check(&TokenKind::LBrace) {
            self.advance();
            let mut names = Vec::new();
            if !self.check(&TokenKind::RBrace) {
                loop {
                    let name = self.identifier_name("in export list")?;
                    let alias = if self.match_tok(&TokenKind::As) {
                        self.identifier_name("after 'as' in export rename")?
                    } else {
                        name.clone()
                    };
                    names.push((name, alias));
                    if !self.match_tok(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RBrace, "to close export list")?;
            if self.match_tok(&TokenKind::From) {
                let source = self.string_literal_value("as re-export source")?;
                self.expect(TokenKind::Semicolon, "after re-export declaration")?;
                return Ok(Rc::new(Stmt::Export(ExportDecl::ReExport { specifiers: names, source })));
            }
            self.expect(TokenKind::Semicolon, "after export declaration")?;
            return Ok(Rc::new(Stmt::Export(ExportDecl::Named(names))));
        }
        let decl = self.statement()?;
        Ok(Rc::new(Stmt::Export(ExportDecl::Declaration(decl))))
    }

    // ---- reactive -------------------------------------------------------

    fn observe_statement(&mut self) -> ParseResult<StmtRef> {
        let span = self.peek().span;
        self.advance();
        let mut targets = Vec::new();
        if self.match_tok(&TokenKind::LParen) {
            loop {
                targets.push(self.identifier_name("in observe target list")?);
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "after observe target list")?;
        } else {
            targets.push(self.identifier_name("after 'observe'")?);
        }
        let handler = self.assignment()?;
        self.match_tok(&TokenKind::Semicolon);
        Ok(Rc::new(Stmt::Observe { targets, handler, span }))
    }

    /// `when (cond) block` or `when name block`.
    fn when_statement(&mut self) -> ParseResult<StmtRef> {
        self.advance();
        let cond = if self.match_tok(&TokenKind::LParen) {
            let expr = self.expression()?;
            self.expect(TokenKind::RParen, "after when condition")?;
            WhenCond::Expr(expr)
        } else {
            WhenCond::TriggeredBy(self.identifier_name("after 'when'")?)
        };
        let body = self.block_statement()?;
        Ok(Rc::new(Stmt::When { cond, body }))
    }

    fn expr_statement(&mut self) -> ParseResult<StmtRef> {
        let expr = self.expression()?;
        self.expect(TokenKind::Semicolon, "after expression statement")?;
        Ok(Rc::new(Stmt::ExprStmt(expr)))
    }

    // ---- expressions ------------------------------------------------------

    fn expression(&mut self) -> ParseResult<ExprRef> {
        self.assignment()
    }

    /// Whether the next token could begin an expression, used by `yield`
    /// to tell `yield;` (no argument) from `yield expr;`.
    fn starts_expression(&self) -> bool {
        !matches!(
            self.peek().kind,
            TokenKind::Semicolon
                | TokenKind::RParen
                | TokenKind::RBrace
                | TokenKind::RBracket
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::Eof
        )
    }

    /// Assignment is right-associative.
    /// `yield` binds at the same low precedence, right-associative, and is
    /// only meaningful inside a generator body.
    fn assignment(&mut self) -> ParseResult<ExprRef> {
        if matches!(self.peek().kind, TokenKind::Yield) {
            let span = self.peek().span;
            self.advance();
            let argument = if self.starts_expression() { Some(self.assignment()?) } else { None };
            return Ok(Rc::new(Expr::Yield { argument, span }));
        }
        let target = self.ternary()?;

        let op = match &self.peek().kind {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::Add),
            TokenKind::MinusAssign => Some(AssignOp::Sub),
            TokenKind::StarAssign => Some(AssignOp::Mul),
            TokenKind::SlashAssign => Some(AssignOp::Div),
            _ => None,
        };
        let Some(op) = op else { return Ok(target) };

        if !is_assignable(&target) {
            return Err(self.error("invalid assignment target"));
        }
        let span = self.peek().span;
        self.advance();
        let value = self.assignment()?;
        Ok(Rc::new(Expr::Assignment { op, target, value, span }))
    }

    /// Ternary `? :` is right-associative.
    fn ternary(&mut self) -> ParseResult<ExprRef> {
        let test = self.pipeline_and_below(Prec::None)?;
        if self.match_tok(&TokenKind::QuestionMark) {
            let consequent = self.assignment()?;
            self.expect(TokenKind::Colon, "in ternary expression")?;
            let alternate = self.assignment()?;
            return Ok(Rc::new(Expr::Conditional { test, consequent, alternate }));
        }
        Ok(test)
    }

    /// Pratt climbing for the binary-operator precedence levels 4-14
    ///. `&&`/`||` build `Expr::Logical` nodes so the evaluator
    /// can short-circuit without evaluating the right operand; every other
    /// level builds `Expr::Binary`.
    fn pipeline_and_below(&mut self, min_prec: Prec) -> ParseResult<ExprRef> {
        let mut left = self.unary()?;
        loop {
            let prec = infix_prec(&self.peek().kind);
            if prec == Prec::None || prec < min_prec {
                break;
            }
            let op_token = self.advance();
            // left-associative: the recursive call demands one level tighter
            let next_min = bump(prec);
            let right = self.pipeline_and_below(next_min)?;

            left = match &op_token.kind {
                TokenKind::Pipeline => Rc::new(Expr::Pipeline { left, right }),
                TokenKind::OrOr => Rc::new(Expr::Logical { op: LogicalOp::Or, left, right }),
                TokenKind::AndAnd => Rc::new(Expr::Logical { op: LogicalOp::And, left, right }),
                other => {
                    let op = binary_op(other).ok_or_else(|| SyntaxError::new("unexpected operator", op_token.span))?;
                    Rc::new(Expr::Binary { op, left, right, span: op_token.span })
                }
            };
        }
        Ok(left)
    }

    /// Unary prefix operators, including prefix
    /// `++`/`--`.
    fn unary(&mut self) -> ParseResult<ExprRef> {
        let span = self.peek().span;
        let op = match &self.peek().kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary()?;
            return Ok(Rc::new(Expr::Unary { op, expr, span }));
        }
        if matches!(self.peek().kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if matches!(self.peek().kind, TokenKind::PlusPlus) {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance();
            let target = self.unary()?;
            if !is_assignable(&target) {
                return Err(SyntaxError::new("invalid update target", span));
            }
            return Ok(Rc::new(Expr::Update { op, prefix: true, target, span }));
        }
        self.postfix()
    }

    /// Postfix `++`/`--`, then call/member/index/new
    /// chains (level 17).
    fn postfix(&mut self) -> ParseResult<ExprRef> {
        let mut expr = self.call_member_chain()?;
        if matches!(self.peek().kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let span = self.peek().span;
            if !is_assignable(&expr) {
                return Err(SyntaxError::new("invalid update target", span));
            }
            let op = if matches!(self.peek().kind, TokenKind::PlusPlus) {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance();
            expr = Rc::new(Expr::Update { op, prefix: false, target: expr, span });
        }
        Ok(expr)
    }

    fn call_member_chain(&mut self) -> ParseResult<ExprRef> {
        let mut expr = if self.match_tok(&TokenKind::New) {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            match &self.peek().kind {
                TokenKind::Dot => {
                    let span = self.peek().span;
                    self.advance();
                    let property = self.identifier_name("after '.'")?;
                    expr = Rc::new(Expr::Member { object: expr, property, span });
                }
                TokenKind::LBracket => {
                    let span = self.peek().span;
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "after indexed member")?;
                    expr = Rc::new(Expr::Index { object: expr, index, span });
                }
                TokenKind::LParen => {
                    let span = self.peek().span;
                    let args = self.argument_list()?;
                    expr = Rc::new(Expr::Call { callee: expr, args, span });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn new_expression(&mut self) -> ParseResult<ExprRef> {
        let span = self.previous().span;
        let mut callee = self.primary()?;
        loop {
            match &self.peek().kind {
                TokenKind::Dot => {
                    let dot_span = self.peek().span;
                    self.advance();
                    let property = self.identifier_name("after '.'")?;
                    callee = Rc::new(Expr::Member { object: callee, property, span: dot_span });
                }
                TokenKind::LBracket => {
                    let idx_span = self.peek().span;
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "after indexed member")?;
                    callee = Rc::new(Expr::Index { object: callee, index, span: idx_span });
                }
                _ => break,
            }
        }
        let args = if self.check(&TokenKind::LParen) { self.argument_list()? } else { Vec::new() };
        Ok(Rc::new(Expr::New { callee, args, span }))
    }

    fn argument_list(&mut self) -> ParseResult<Vec<ExprRef>> {
        self.expect(TokenKind::LParen, "before argument list")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.assignment()?);
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "after argument list")?;
        Ok(args)
    }

    // ---- primary / arrow detection ---------------------------------------

    fn primary(&mut self) -> ParseResult<ExprRef> {
        let span = self.peek().span;
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Rc::new(Expr::Number(n)))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Rc::new(Expr::StringLit(s)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Rc::new(Expr::Boolean(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Rc::new(Expr::Boolean(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Rc::new(Expr::Null))
            }
            TokenKind::This => {
                self.advance();
                Ok(Rc::new(Expr::This))
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                Ok(Rc::new(Expr::RegexLiteral { pattern, flags }))
            }
            TokenKind::Template { .. } => self.template_literal(),
            TokenKind::Identifier(name) => {
                // `ident => expr-or-block`: a single-parameter arrow
                //.
                if matches!(self.peek_at(1).kind, TokenKind::Arrow) {
                    self.advance();
                    self.advance();
                    return self.finish_arrow(vec![name], span);
                }
                self.advance();
                Ok(Rc::new(Expr::Identifier(name)))
            }
            TokenKind::LBracket => self.array_literal(),
            TokenKind::LBrace => self.object_literal(),
            TokenKind::Function => {
                let node = self.function_node(FunctionKind::Function, false)?;
                Ok(Rc::new(Expr::Function(node)))
            }
            TokenKind::Import => {
                self.advance();
                let span = self.peek().span;
                self.expect(TokenKind::LParen, "after 'import' in dynamic import")?;
                let specifier = self.assignment()?;
                self.expect(TokenKind::RParen, "after dynamic import specifier")?;
                Ok(Rc::new(Expr::DynamicImport { specifier, span }))
            }
            TokenKind::LParen => self.paren_or_arrow(),
            _ => Err(self.error("expected expression")),
        }
    }

    /// On `(`, tentatively parses a parameter list; if `=>` follows,
    /// commits to arrow form, otherwise re-parses as a parenthesized
    /// expression. Arrow-function detection requires this lookahead.
    fn paren_or_arrow(&mut self) -> ParseResult<ExprRef> {
        let span = self.peek().span;
        let checkpoint = self.current;
        if let Some(params) = self.try_arrow_param_list() {
            if self.match_tok(&TokenKind::Arrow) {
                return self.finish_arrow(params, span);
            }
        }
        self.current = checkpoint;

        self.expect(TokenKind::LParen, "to start parenthesized expression")?;
        let expr = self.expression()?;
        self.expect(TokenKind::RParen, "to close parenthesized expression")?;
        Ok(expr)
    }

    fn try_arrow_param_list(&mut self) -> Option<Vec<String>> {
        if !self.match_tok(&TokenKind::LParen) {
            return None;
        }
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                match &self.peek().kind {
                    TokenKind::Identifier(name) => {
                        params.push(name.clone());
                        self.advance();
                    }
                    _ => return None,
                }
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
            }
        }
        if !self.match_tok(&TokenKind::RParen) {
            return None;
        }
        Some(params)
    }

    fn finish_arrow(&mut self, params: Vec<String>, span: Span) -> ParseResult<ExprRef> {
        let body = if self.check(&TokenKind::LBrace) {
            self.block_statement()?
        } else {
            // Expression-bodied arrow: implicitly returns the expression
            //, modeled as a single-statement body.
            let expr = self.assignment()?;
            Rc::new(Stmt::Return(Some(expr)))
        };
        let node = Rc::new(FunctionNode { name: None, params, body, kind: FunctionKind::Arrow, span });
        Ok(Rc::new(Expr::Arrow(node)))
    }

    /// Reassembles a template literal from the lexer's Head/Middle/Tail (or
    /// standalone Full) token sequence, re-entering the expression parser
    /// for each `${…}` region.
    fn template_literal(&mut self) -> ParseResult<ExprRef> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        loop {
            match self.peek().kind.clone() {
                TokenKind::Template { text, part } => {
                    self.advance();
                    quasis.push(text);
                    if matches!(part, TemplatePart::Full | TemplatePart::Tail) {
                        break;
                    }
                    exprs.push(self.expression()?);
                    if !matches!(self.peek().kind, TokenKind::Template { .. }) {
                        return Err(self.error("expected template continuation after interpolated expression"));
                    }
                }
                _ => return Err(self.error("expected template literal")),
            }
        }
        Ok(Rc::new(Expr::TemplateLiteral { quasis, exprs }))
    }

    fn array_literal(&mut self) -> ParseResult<ExprRef> {
        self.expect(TokenKind::LBracket, "to start array literal")?;
        let mut items = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                items.push(self.assignment()?);
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "to close array literal")?;
        Ok(Rc::new(Expr::ArrayLiteral(items)))
    }

    /// Object literal keys: identifier, string, or number; computed keys
    /// are disallowed.
    fn object_literal(&mut self) -> ParseResult<ExprRef> {
        self.expect(TokenKind::LBrace, "to start object literal")?;
        let mut entries = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = match self.peek().kind.clone() {
                    TokenKind::Identifier(name) => {
                        self.advance();
                        PropertyKey::Identifier(name)
                    }
                    TokenKind::String(s) => {
                        self.advance();
                        PropertyKey::String(s)
                    }
                    TokenKind::Number(n) => {
                        self.advance();
                        PropertyKey::Number(n)
                    }
                    _ => return Err(self.error("expected property key")),
                };
                // `{ name }` shorthand: an identifier key with no `:` binds
                // to the identically-named variable.
                let value = if self.match_tok(&TokenKind::Colon) {
                    self.assignment()?
                } else if let PropertyKey::Identifier(name) = &key {
                    Rc::new(Expr::Identifier(name.clone()))
                } else {
                    return Err(self.error("expected ':' after object property key"));
                };
                entries.push((key, value));
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "to close object literal")?;
        Ok(Rc::new(Expr::ObjectLiteral(entries)))
    }
}

fn bump(prec: Prec) -> Prec {
    use Prec::*;
    match prec {
        None => Assignment,
        Assignment => Ternary,
        Ternary => Pipeline,
        Pipeline => LogicalOr,
        LogicalOr => LogicalAnd,
        LogicalAnd => BitOr,
        BitOr => BitXor,
        BitXor => BitAnd,
        BitAnd => Equality,
        Equality => Relational,
        Relational => Shift,
        Shift => Additive,
        Additive => Multiplicative,
        Multiplicative => Unary,
        Unary => Call,
        Call => Call,
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    use TokenKind::*;
    Some(match kind {
        Plus => BinaryOp::Add,
        Minus => BinaryOp::Sub,
        Star => BinaryOp::Mul,
        Slash => BinaryOp::Div,
        Percent => BinaryOp::Mod,
        EqEq => BinaryOp::Eq,
        EqEqEq => BinaryOp::EqStrict,
        NotEq => BinaryOp::NotEq,
        NotEqEq => BinaryOp::NotEqStrict,
        Lt => BinaryOp::Lt,
        LtEq => BinaryOp::LtEq,
        Gt => BinaryOp::Gt,
        GtEq => BinaryOp::GtEq,
        Amp => BinaryOp::BitAnd,
        Pipe => BinaryOp::BitOr,
        Caret => BinaryOp::BitXor,
        Shl => BinaryOp::Shl,
        Shr => BinaryOp::Shr,
        UShr => BinaryOp::UShr,
        _ => return None,
    })
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr, Expr::Identifier(_) | Expr::Member { .. } | Expr::Index { .. })
}

/// Lets `for`-head parsing reuse the classic-`for` initializer grammar when
/// the tentative for-in/for-of parse turns out not to be followed by
/// `in`/`of`.
impl ForTarget {
    fn into_classic_init(self, parser: &mut Parser) -> ParseResult<ForInit> {
        match self {
            ForTarget::Decl(kind, name) => {
                let init = if parser.match_tok(&TokenKind::Assign) {
                    Some(parser.expression()?)
                } else {
                    None
                };
                Ok(ForInit::Decl(kind, name, init))
            }
            ForTarget::Target(expr) => Ok(ForInit::Expr(expr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> StmtRef {
        let mut parser = Parser::from_source(source).unwrap();
        let mut stmts = parser.parse_program().unwrap();
        assert_eq!(stmts.len(), 1, "expected exactly one statement");
        stmts.remove(0)
    }

    #[test]
    fn parses_var_decl_with_initializer() {
        let stmt = parse_one("var x = 10;");
        match &*stmt {
            Stmt::VarDecl { kind, name, init, .. } => {
                assert_eq!(*kind, DeclKind::Var);
                assert_eq!(name, "x");
                assert!(init.is_some());
            }
            other => panic!("expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn const_without_initializer_is_error() {
        let mut parser = Parser::from_source("const x;").unwrap();
        assert!(parser.parse_program().is_err());
    }

    #[test]
    fn binary_precedence_multiplies_before_adds() {
        let stmt = parse_one("1 + 2 * 3;");
        match &*stmt {
            Stmt::ExprStmt(expr) => match &**expr {
                Expr::Binary { op: BinaryOp::Add, right, .. } => {
                    assert!(matches!(&**right, Expr::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("expected top-level Add, got {:?}", other),
            },
            other => panic!("expected ExprStmt, got {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let stmt = parse_one("a = b = 1;");
        match &*stmt {
            Stmt::ExprStmt(expr) => match &**expr {
                Expr::Assignment { value, .. } => {
                    assert!(matches!(&**value, Expr::Assignment { .. }));
                }
                other => panic!("expected Assignment, got {:?}", other),
            },
            other => panic!("expected ExprStmt, got {:?}", other),
        }
    }

    #[test]
    fn pipeline_prepends_argument_to_call_form() {
        let stmt = parse_one("5 |> add(3);");
        match &*stmt {
            Stmt::ExprStmt(expr) => assert!(matches!(&**expr, Expr::Pipeline { .. })),
            other => panic!("expected ExprStmt, got {:?}", other),
        }
    }

    #[test]
    fn identifier_arrow_single_param() {
        let stmt = parse_one("var f = x => x + 1;");
        match &*stmt {
            Stmt::VarDecl { init: Some(init), .. } => {
                assert!(matches!(&**init, Expr::Arrow(_)));
            }
            other => panic!("expected VarDecl with arrow, got {:?}", other),
        }
    }

    #[test]
    fn paren_arrow_with_multiple_params() {
        let stmt = parse_one("var f = (a, b) => a + b;");
        match &*stmt {
            Stmt::VarDecl { init: Some(init), .. } => match &**init {
                Expr::Arrow(node) => assert_eq!(node.params, vec!["a".to_string(), "b".to_string()]),
                other => panic!("expected Arrow, got {:?}", other),
            },
            other => panic!("expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn parenthesized_expression_is_not_mistaken_for_arrow() {
        let stmt = parse_one("var x = (1 + 2) * 3;");
        match &*stmt {
            Stmt::VarDecl { init: Some(init), .. } => {
                assert!(matches!(&**init, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn dangling_else_attaches_to_nearest_if() {
        let stmt = parse_one("if (a) if (b) c(); else d();");
        match &*stmt {
            Stmt::If { alternate: None, consequent, .. } => {
                assert!(matches!(&**consequent, Stmt::If { alternate: Some(_), .. }));
            }
            other => panic!("expected outer If with no alternate, got {:?}", other),
        }
    }

    #[test]
    fn for_in_and_for_of_parse_distinct_targets() {
        let stmt = parse_one("for (var k in obj) { x(); }");
        assert!(matches!(&*stmt, Stmt::ForIn { .. }));
        let stmt = parse_one("for (var v of list) { x(); }");
        assert!(matches!(&*stmt, Stmt::ForOf { .. }));
    }

    #[test]
    fn classic_for_with_all_three_clauses() {
        let stmt = parse_one("for (var i = 0; i < 10; i = i + 1) { x(); }");
        assert!(matches!(&*stmt, Stmt::For { init: Some(_), test: Some(_), update: Some(_), .. }));
    }

    #[test]
    fn template_literal_with_embedded_expression() {
        let stmt = parse_one("`a${1+2}b`;");
        match &*stmt {
            Stmt::ExprStmt(expr) => match &**expr {
                Expr::TemplateLiteral { quasis, exprs } => {
                    assert_eq!(quasis, &vec!["a".to_string(), "b".to_string()]);
                    assert_eq!(exprs.len(), 1);
                }
                other => panic!("expected TemplateLiteral, got {:?}", other),
            },
            other => panic!("expected ExprStmt, got {:?}", other),
        }
    }

    #[test]
    fn object_literal_with_nested_braces_inside_template() {
        let mut parser = Parser::from_source("var x = `${ {a: 1} }`;").unwrap();
        let stmts = parser.parse_program().unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn import_named_with_rename() {
        let stmt = parse_one("import { area as a } from \"./m\";");
        match &*stmt {
            Stmt::Import(decl) => {
                assert_eq!(decl.source, "./m");
                assert!(matches!(&decl.specifiers[0], ImportSpecifier::Named { imported, local } if imported == "area" && local == "a"));
            }
            other => panic!("expected Import, got {:?}", other),
        }
    }

    #[test]
    fn export_named_declaration() {
        let stmt = parse_one("export const PI = 3.14;");
        assert!(matches!(&*stmt, Stmt::Export(ExportDecl::Declaration(_))));
    }

    #[test]
    fn observe_single_variable() {
        let stmt = parse_one("observe c function(o, n) { x(); }");
        match &*stmt {
            Stmt::Observe { targets, .. } => assert_eq!(targets, &vec!["c".to_string()]),
            other => panic!("expected Observe, got {:?}", other),
        }
    }

    #[test]
    fn observe_multi_variable() {
        let stmt = parse_one("observe (a, b) function(changes) { x(); }");
        match &*stmt {
            Stmt::Observe { targets, .. } => assert_eq!(targets, &vec!["a".to_string(), "b".to_string()]),
            other => panic!("expected Observe, got {:?}", other),
        }
    }

    #[test]
    fn when_guard_with_condition() {
        let stmt = parse_one("when (x) { y(); }");
        assert!(matches!(&*stmt, Stmt::When { cond: WhenCond::Expr(_), .. }));
    }

    #[test]
    fn when_guard_triggered_by_name() {
        let stmt = parse_one("when a { y(); }");
        assert!(matches!(&*stmt, Stmt::When { cond: WhenCond::TriggeredBy(_), .. }));
    }

    #[test]
    fn try_catch_finally() {
        let stmt = parse_one("try { a(); } catch (e) { b(); } finally { c(); }");
        match &*stmt {
            Stmt::Try { handler: Some(_), finalizer: Some(_), .. } => {}
            other => panic!("expected Try with both clauses, got {:?}", other),
        }
    }

    #[test]
    fn try_without_catch_or_finally_is_error() {
        let mut parser = Parser::from_source("try { a(); }").unwrap();
        assert!(parser.parse_program().is_err());
    }

    #[test]
    fn switch_with_fallthrough_and_default() {
        let stmt = parse_one("switch (x) { case 1: a(); case 2: b(); break; default: c(); }");
        match &*stmt {
            Stmt::Switch { cases, .. } => assert_eq!(cases.len(), 3),
            other => panic!("expected Switch, got {:?}", other),
        }
    }

    #[test]
    fn new_expression_with_arguments() {
        let stmt = parse_one("new Date(2020, 1);");
        match &*stmt {
            Stmt::ExprStmt(expr) => assert!(matches!(&**expr, Expr::New { .. })),
            other => panic!("expected ExprStmt, got {:?}", other),
        }
    }

    #[test]
    fn member_and_index_chain() {
        let stmt = parse_one("a.b[0].c;");
        match &*stmt {
            Stmt::ExprStmt(expr) => assert!(matches!(&**expr, Expr::Member { .. })),
            other => panic!("expected ExprStmt, got {:?}", other),
        }
    }

    #[test]
    fn generator_function_declaration() {
        let stmt = parse_one("function* gen() { yield 1; }");
        match &*stmt {
            Stmt::FunctionDecl(node) => assert_eq!(node.kind, FunctionKind::Generator),
            other => panic!("expected FunctionDecl, got {:?}", other),
        }
    }

    #[test]
    fn syntax_error_recovers_to_next_statement() {
        let mut parser = Parser::from_source("var = ; var y = 1;").unwrap();
        let errors = parser.parse_program().unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
