//! Recursive-descent parser for ALM.
//!
//! One method per grammar rule. Inside a rule, failures propagate as
//! `Err(Diagnostic)` with `?`, abandoning the construct being built. At
//! statement and declaration level the error is recorded in the
//! compilation's diagnostics, the construct becomes an error placeholder
//! and the parser resynchronises, so unrelated statements in the same file
//! are still checked.
//!
//! Imports are resolved while parsing: each imported file is lexed and
//! parsed by a nested parser sharing the same [`CompilationContext`], and
//! its module root is spliced into the import node.

use std::path::{Path, PathBuf};

use crate::ast::*;
use crate::context::{CompilationContext, ImportCheck};
use crate::diagnostic::Diagnostic;
use crate::lexer::{Token, TokenKind, TokenStream, lex};
use crate::library::resolve_import;
use crate::span::{FileId, Span};
use crate::types::{Primitive, Type};

type PResult<T> = Result<T, Diagnostic>;

/// Lex and parse the file `file`, recursively parsing its imports.
///
/// The caller is responsible for registering the file in the import graph
/// (see [`ImportGraph::enter`](crate::context::ImportGraph::enter)).
pub fn parse_module(ctx: &mut CompilationContext, file: FileId) -> Module {
    let (path, tokens) = match ctx.sources.get(file) {
        Some(source) => (source.path.clone(), lex(file, &source.text)),
        None => (PathBuf::new(), lex(file, "")),
    };
    tracing::debug!(path = %path.display(), tokens = tokens.len(), "parsing module");
    let parser = Parser {
        tokens,
        file,
        path,
        ctx,
    };
    parser.module()
}

struct Parser<'ctx> {
    tokens: TokenStream,
    file: FileId,
    path: PathBuf,
    ctx: &'ctx mut CompilationContext,
}

impl<'ctx> Parser<'ctx> {
    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn kind(&self) -> TokenKind {
        self.tokens.kind()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.tokens.kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.tokens.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.tokens.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn current_span(&self) -> Span {
        self.tokens.current().span
    }

    /// Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: Span) -> Span {
        match self.tokens.previous() {
            Some(prev) if prev.span.end.offset >= start.start.offset => start.to(prev.span),
            _ => start,
        }
    }

    /// Diagnostic for the current token when `what` was expected.
    fn unexpected(&self, what: &str) -> Diagnostic {
        let token = self.tokens.current();
        match token.kind {
            TokenKind::Invalid => Diagnostic::syntax(token.lexeme.clone(), token.span),
            TokenKind::Eof => {
                Diagnostic::syntax(format!("expected {what}, found end of file"), token.span)
            }
            _ => Diagnostic::syntax(
                format!("expected {what}, found '{}'", token.lexeme),
                token.span,
            ),
        }
    }

    fn record(&mut self, diagnostic: &Diagnostic) {
        self.ctx.diagnostics.push(diagnostic.clone());
    }

    /// Skip to a plausible statement boundary: past the next `;`, or up to
    /// a `}` or the start of a top-level declaration.
    fn synchronize(&mut self, start: usize) {
        loop {
            match self.kind() {
                TokenKind::Eof | TokenKind::RBrace | TokenKind::Func | TokenKind::External => break,
                TokenKind::Semi => {
                    self.tokens.advance();
                    return;
                }
                _ => {
                    self.tokens.advance();
                }
            }
        }
        let stuck = self.tokens.position() == start;
        if stuck && !matches!(
            self.kind(),
            TokenKind::Eof | TokenKind::RBrace | TokenKind::Func | TokenKind::External
        ) {
            self.tokens.advance();
        }
    }

    /// Skip to the start of the next top-level declaration.
    fn synchronize_item(&mut self, start: usize) {
        if self.tokens.position() == start {
            self.tokens.advance();
        }
        while !matches!(
            self.kind(),
            TokenKind::Eof | TokenKind::Func | TokenKind::External | TokenKind::Import
        ) {
            self.tokens.advance();
        }
    }

    // ------------------------------------------------------------------
    // Module level
    // ------------------------------------------------------------------

    fn module(mut self) -> Module {
        let start = self.current_span();
        let mut imports = Vec::new();
        let mut items = Vec::new();

        while self.check(TokenKind::Import) {
            let position = self.tokens.position();
            match self.import_statement() {
                Ok(resolved) => imports.extend(resolved),
                Err(diag) => {
                    self.record(&diag);
                    self.synchronize(position);
                }
            }
        }

        while !self.tokens.at_eof() {
            let position = self.tokens.position();
            let result = match self.kind() {
                TokenKind::Func => self.func_decl().map(Item::Function),
                TokenKind::External => self.external_decl().map(Item::Function),
                TokenKind::Type(_) => self.var_decl().map(Item::Global),
                TokenKind::Import => Err(Diagnostic::syntax(
                    "imports must precede all declarations",
                    self.current_span(),
                )),
                _ => Err(self.unexpected("a function or global declaration")),
            };
            match result {
                Ok(item) => items.push(item),
                Err(diag) => {
                    self.record(&diag);
                    items.push(Item::Error(diag));
                    self.synchronize_item(position);
                }
            }
        }

        let span = self.span_from(start);
        Module {
            file: self.file,
            path: self.path,
            imports,
            items,
            span,
        }
    }

    /// `import "file.alm", name;`
    fn import_statement(&mut self) -> PResult<Vec<Import>> {
        self.expect(TokenKind::Import, "'import'")?;
        let mut targets = Vec::new();
        loop {
            let token = self.tokens.current().clone();
            let target = match token.kind {
                TokenKind::StringLiteral => ImportTarget::Path(token.lexeme.clone()),
                TokenKind::Ident => ImportTarget::Library(token.lexeme.clone()),
                _ => return Err(self.unexpected("a module path or library name")),
            };
            self.tokens.advance();
            targets.push((target, token.span));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semi, "';' after import")?;

        Ok(targets
            .into_iter()
            .map(|(target, span)| self.resolve(target, span))
            .collect())
    }

    /// Resolve one import target and parse it if it is new.
    fn resolve(&mut self, target: ImportTarget, span: Span) -> Import {
        let importer_dir = self.path.parent().map(Path::to_path_buf).unwrap_or_default();
        let resolved = resolve_import(&target, &importer_dir, &self.ctx.options.lib_dir);
        let module = match resolved {
            Ok(path) => self.import_file(&path, span),
            Err(message) => {
                self.ctx.diagnostics.syntax_error(message, span);
                None
            }
        };
        Import {
            target,
            span,
            module,
        }
    }

    fn import_file(&mut self, path: &Path, span: Span) -> Option<Box<Module>> {
        let shown = path.display().to_string();
        match self.ctx.imports.check(&self.path, path) {
            ImportCheck::Fresh => {}
            ImportCheck::AlreadyLoaded => {
                tracing::debug!(module = %shown, "module already loaded, not parsing again");
                self.ctx.imports.add_edge(&self.path, path);
                return None;
            }
            ImportCheck::SelfImport => {
                self.ctx.diagnostics.syntax_error("a module cannot import itself", span);
                return None;
            }
            ImportCheck::Duplicate => {
                self.ctx
                    .diagnostics
                    .syntax_error(format!("module '{shown}' is already imported"), span);
                return None;
            }
            ImportCheck::Cycle => {
                self.ctx.diagnostics.syntax_error(
                    format!("cannot import '{shown}': it already imports this module"),
                    span,
                );
                return None;
            }
        }

        self.ctx.imports.add_edge(&self.path, path);
        let file = match self.ctx.load_source(path) {
            Ok(file) => file,
            Err(err) => {
                self.ctx.diagnostics.syntax_error(err.to_string(), span);
                return None;
            }
        };
        tracing::debug!(module = %shown, "importing module");
        self.ctx.imports.enter(path);
        let module = parse_module(self.ctx, file);
        self.ctx.imports.exit();
        Some(Box::new(module))
    }

    /// `func name(params): type { ... }`
    fn func_decl(&mut self) -> PResult<FuncDecl> {
        let start = self.current_span();
        self.expect(TokenKind::Func, "'func'")?;
        let (name, params, ret) = self.signature()?;
        let body = self.block()?;
        Ok(FuncDecl {
            name,
            params,
            ret,
            body: FuncBody::Block(body),
            span: self.span_from(start),
        })
    }

    /// `@external "library" func name(params): type;`
    fn external_decl(&mut self) -> PResult<FuncDecl> {
        let start = self.current_span();
        self.expect(TokenKind::External, "'@external'")?;
        let library = self
            .expect(TokenKind::StringLiteral, "a library name string")?
            .lexeme;
        self.expect(TokenKind::Func, "'func'")?;
        let (name, params, ret) = self.signature()?;
        self.expect(TokenKind::Semi, "';' after external declaration")?;
        Ok(FuncDecl {
            name,
            params,
            ret,
            body: FuncBody::External { library },
            span: self.span_from(start),
        })
    }

    /// `name(params): type`
    fn signature(&mut self) -> PResult<(Ident, Vec<Param>, TypeRef)> {
        let name = self.ident("a function name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let ty = self.type_ref()?;
                let name = self.ident("a parameter name")?;
                params.push(Param { ty, name });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Colon, "':' before the return type")?;
        let ret = self.type_ref()?;
        Ok((name, params, ret))
    }

    fn ident(&mut self, what: &str) -> PResult<Ident> {
        let token = self.expect(TokenKind::Ident, what)?;
        Ok(Ident {
            name: token.lexeme,
            span: token.span,
        })
    }

    /// A primitive type optionally followed by `[` commas `]`.
    fn type_ref(&mut self) -> PResult<TypeRef> {
        let start = self.current_span();
        let TokenKind::Type(primitive) = self.kind() else {
            return Err(self.unexpected("a type"));
        };
        self.tokens.advance();
        if !self.eat(TokenKind::LBracket) {
            return Ok(TypeRef {
                ty: Type::Primitive(primitive),
                span: start,
            });
        }
        let mut dims: u8 = 1;
        while self.eat(TokenKind::Comma) {
            dims = dims.checked_add(1).ok_or_else(|| {
                Diagnostic::syntax("too many array dimensions", self.current_span())
            })?;
        }
        self.expect(TokenKind::RBracket, "']' to close the array type")?;
        let span = self.span_from(start);
        if primitive == Primitive::Void {
            return Err(Diagnostic::syntax("arrays of void are not allowed", span));
        }
        Ok(TypeRef {
            ty: Type::array(primitive, dims),
            span,
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self) -> PResult<Block> {
        let start = self.current_span();
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if matches!(self.kind(), TokenKind::Eof | TokenKind::Func | TokenKind::External) {
                return Err(self.unexpected("'}' to close the block"));
            }
            let position = self.tokens.position();
            match self.statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(diag) => {
                    self.record(&diag);
                    let span = diag.span;
                    stmts.push(Stmt {
                        kind: StmtKind::Error(diag),
                        span,
                    });
                    self.synchronize(position);
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Block {
            stmts,
            simple: false,
            span: self.span_from(start),
        })
    }

    /// A braced block, or a single statement wrapped as a simple block.
    fn body(&mut self) -> PResult<Block> {
        if self.check(TokenKind::LBrace) {
            return self.block();
        }
        let stmt = self.statement()?;
        let span = stmt.span;
        Ok(Block {
            stmts: vec![stmt],
            simple: true,
            span,
        })
    }

    fn statement(&mut self) -> PResult<Stmt> {
        let start = self.current_span();
        let kind = match self.kind() {
            TokenKind::LBrace => StmtKind::Block(self.block()?),
            TokenKind::If => self.if_statement()?,
            TokenKind::While => self.while_statement()?,
            TokenKind::Do => self.do_while_statement()?,
            TokenKind::For => self.for_statement()?,
            TokenKind::Return => {
                self.tokens.advance();
                let value = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(TokenKind::Semi, "';' after return")?;
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.tokens.advance();
                self.expect(TokenKind::Semi, "';' after break")?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.tokens.advance();
                self.expect(TokenKind::Semi, "';' after continue")?;
                StmtKind::Continue
            }
            TokenKind::Type(_) | TokenKind::Ident => {
                let stmt = self.simple_statement()?;
                self.expect(TokenKind::Semi, "';'")?;
                return Ok(Stmt {
                    kind: stmt.kind,
                    span: self.span_from(start),
                });
            }
            _ => return Err(self.unexpected("a statement")),
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    /// Declaration, assignment or call without the trailing `;`.
    ///
    /// A leading identifier is disambiguated by the next token: `(` starts
    /// a call, anything else an assignment (to an element if `[` follows).
    fn simple_statement(&mut self) -> PResult<Stmt> {
        let start = self.current_span();
        let kind = match self.kind() {
            TokenKind::Type(_) => {
                let decl = self.var_decl_no_semi()?;
                StmtKind::VarDecl(decl)
            }
            TokenKind::Ident => match self.tokens.kind_at(1) {
                Some(TokenKind::LParen) => StmtKind::Call(self.call()?),
                Some(TokenKind::LBracket) => {
                    let target = self.array_element()?;
                    self.assignment(target)?
                }
                _ => {
                    let target = self.ident_use()?;
                    self.assignment(target)?
                }
            },
            _ => return Err(self.unexpected("a declaration, assignment or call")),
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn assignment(&mut self, target: Expr) -> PResult<StmtKind> {
        let op = match self.kind() {
            TokenKind::Assign => AssignOp::Set,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            TokenKind::PercentAssign => AssignOp::IntDiv,
            TokenKind::AmpAssign => AssignOp::BitAnd,
            TokenKind::PipeAssign => AssignOp::BitOr,
            TokenKind::CaretAssign => AssignOp::BitXor,
            TokenKind::ShlAssign => AssignOp::Shl,
            TokenKind::ShrAssign => AssignOp::Shr,
            _ => return Err(self.unexpected("an assignment operator")),
        };
        self.tokens.advance();
        let value = self.expression()?;
        Ok(StmtKind::Assign(Assign { target, op, value }))
    }

    /// `type name [= expr];`
    fn var_decl(&mut self) -> PResult<VarDecl> {
        let decl = self.var_decl_no_semi()?;
        self.expect(TokenKind::Semi, "';' after declaration")?;
        Ok(decl)
    }

    fn var_decl_no_semi(&mut self) -> PResult<VarDecl> {
        let start = self.current_span();
        let ty = self.type_ref()?;
        let name = self.ident("a variable name")?;
        let init = if self.eat(TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(VarDecl {
            ty,
            name,
            init,
            span: self.span_from(start),
        })
    }

    fn condition(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::LParen, "'(' before the condition")?;
        let cond = self.expression()?;
        self.expect(TokenKind::RParen, "')' after the condition")?;
        Ok(cond)
    }

    fn if_statement(&mut self) -> PResult<StmtKind> {
        self.expect(TokenKind::If, "'if'")?;
        let cond = self.condition()?;
        let then_branch = self.body()?;
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.body()?)
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> PResult<StmtKind> {
        self.expect(TokenKind::While, "'while'")?;
        let cond = self.condition()?;
        let body = self.body()?;
        Ok(StmtKind::While { cond, body })
    }

    fn do_while_statement(&mut self) -> PResult<StmtKind> {
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.body()?;
        self.expect(TokenKind::While, "'while' after the do body")?;
        let cond = self.condition()?;
        self.expect(TokenKind::Semi, "';' after do-while")?;
        Ok(StmtKind::DoWhile { body, cond })
    }

    /// `for (init; cond; step) body`, every header part optional.
    fn for_statement(&mut self) -> PResult<StmtKind> {
        self.expect(TokenKind::For, "'for'")?;
        self.expect(TokenKind::LParen, "'(' after 'for'")?;
        let init = if self.check(TokenKind::Semi) {
            None
        } else {
            Some(Box::new(self.simple_statement()?))
        };
        self.expect(TokenKind::Semi, "';' after the loop initializer")?;
        let cond = if self.check(TokenKind::Semi) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semi, "';' after the loop condition")?;
        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.simple_statement()?))
        };
        self.expect(TokenKind::RParen, "')' after the loop header")?;
        let body = self.body()?;
        Ok(StmtKind::For {
            init,
            cond,
            step,
            body,
        })
    }

    // ------------------------------------------------------------------
    // Expressions, lowest precedence first
    // ------------------------------------------------------------------

    fn expression(&mut self) -> PResult<Expr> {
        self.disjunction()
    }

    fn bool_binary(&mut self, op: BoolOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.to(rhs.span);
        Expr::new(
            ExprKind::BoolBinary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    fn arith_binary(&mut self, op: ArithOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.to(rhs.span);
        Expr::new(
            ExprKind::ArithBinary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    fn disjunction(&mut self) -> PResult<Expr> {
        let mut lhs = self.strict_disjunction()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.strict_disjunction()?;
            lhs = self.bool_binary(BoolOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn strict_disjunction(&mut self) -> PResult<Expr> {
        let mut lhs = self.conjunction()?;
        while self.eat(TokenKind::CaretCaret) {
            let rhs = self.conjunction()?;
            lhs = self.bool_binary(BoolOp::Xor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn conjunction(&mut self) -> PResult<Expr> {
        let mut lhs = self.negation()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.negation()?;
            lhs = self.bool_binary(BoolOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn negation(&mut self) -> PResult<Expr> {
        if self.check(TokenKind::Bang) {
            let start = self.tokens.advance().span;
            let operand = self.negation()?;
            let span = start.to(operand.span);
            return Ok(Expr::new(ExprKind::Not(Box::new(operand)), span));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let lhs = self.arithmetic()?;
        let op = match self.kind() {
            TokenKind::EqEq => BoolOp::Eq,
            TokenKind::NotEq => BoolOp::NotEq,
            TokenKind::Less => BoolOp::Less,
            TokenKind::LessEq => BoolOp::LessEq,
            TokenKind::Greater => BoolOp::Greater,
            TokenKind::GreaterEq => BoolOp::GreaterEq,
            _ => return Ok(lhs),
        };
        self.tokens.advance();
        let rhs = self.arithmetic()?;
        Ok(self.bool_binary(op, lhs, rhs))
    }

    fn arithmetic(&mut self) -> PResult<Expr> {
        self.bit_or()
    }

    fn bit_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.bit_xor()?;
        while self.eat(TokenKind::Pipe) {
            let rhs = self.bit_xor()?;
            lhs = self.arith_binary(ArithOp::BitOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn bit_xor(&mut self) -> PResult<Expr> {
        let mut lhs = self.bit_and()?;
        while self.eat(TokenKind::Caret) {
            let rhs = self.bit_and()?;
            lhs = self.arith_binary(ArithOp::BitXor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn bit_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.shift()?;
        while self.eat(TokenKind::Amp) {
            let rhs = self.shift()?;
            lhs = self.arith_binary(ArithOp::BitAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    fn shift(&mut self) -> PResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Shl => ArithOp::Shl,
                TokenKind::Shr => ArithOp::Shr,
                _ => return Ok(lhs),
            };
            self.tokens.advance();
            let rhs = self.additive()?;
            lhs = self.arith_binary(op, lhs, rhs);
        }
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.tokens.advance();
            let rhs = self.multiplicative()?;
            lhs = self.arith_binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.exponent()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                TokenKind::Percent => ArithOp::IntDiv,
                _ => return Ok(lhs),
            };
            self.tokens.advance();
            let rhs = self.exponent()?;
            lhs = self.arith_binary(op, lhs, rhs);
        }
    }

    /// Right associative: `a ** b ** c` is `a ** (b ** c)`.
    fn exponent(&mut self) -> PResult<Expr> {
        let base = self.unary()?;
        if self.eat(TokenKind::StarStar) {
            let power = self.exponent()?;
            return Ok(self.arith_binary(ArithOp::Pow, base, power));
        }
        Ok(base)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.kind() {
            TokenKind::Minus => ArithUnaryOp::Neg,
            TokenKind::Tilde => ArithUnaryOp::BitNot,
            _ => return self.primary(),
        };
        let start = self.tokens.advance().span;
        let operand = self.unary()?;
        let span = start.to(operand.span);
        Ok(Expr::new(
            ExprKind::ArithUnary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn primary(&mut self) -> PResult<Expr> {
        let token = self.tokens.current().clone();
        let literal = match token.kind {
            TokenKind::IntLiteral => {
                let value = token.lexeme.parse::<i64>().map_err(|_| {
                    Diagnostic::syntax(
                        format!("integer literal '{}' is too large", token.lexeme),
                        token.span,
                    )
                })?;
                Literal::Int(value)
            }
            TokenKind::RealLiteral => {
                let value = token.lexeme.parse::<f32>().map_err(|_| {
                    Diagnostic::syntax(format!("invalid real literal '{}'", token.lexeme), token.span)
                })?;
                Literal::Real(value)
            }
            TokenKind::BoolLiteral => Literal::Bool(token.lexeme == "true"),
            TokenKind::CharLiteral => Literal::Char(token.lexeme.chars().next().unwrap_or('\0')),
            TokenKind::StringLiteral => Literal::Str(token.lexeme.clone()),
            TokenKind::Ident => {
                return match self.tokens.kind_at(1) {
                    Some(TokenKind::LParen) => self.call(),
                    Some(TokenKind::LBracket) => self.array_element(),
                    _ => self.ident_use(),
                };
            }
            TokenKind::New => return self.array_instance(),
            TokenKind::LParen => {
                self.tokens.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.tokens.advance();
        Ok(Expr::new(ExprKind::Literal(literal), token.span))
    }

    fn ident_use(&mut self) -> PResult<Expr> {
        let ident = self.ident("an identifier")?;
        Ok(Expr::new(
            ExprKind::Ident { name: ident.name },
            ident.span,
        ))
    }

    /// `name(args)`
    fn call(&mut self) -> PResult<Expr> {
        let callee = self.ident("a function name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after the arguments")?;
        let span = self.span_from(callee.span);
        Ok(Expr::new(ExprKind::Call { callee, args }, span))
    }

    /// `name[i, j]`
    fn array_element(&mut self) -> PResult<Expr> {
        let array = self.ident_use()?;
        let start = array.span;
        let indices = self.bracketed_list()?;
        Ok(Expr::new(
            ExprKind::ArrayElement {
                array: Box::new(array),
                indices,
            },
            self.span_from(start),
        ))
    }

    /// `new type[size, size]`
    fn array_instance(&mut self) -> PResult<Expr> {
        let start = self.expect(TokenKind::New, "'new'")?.span;
        let TokenKind::Type(element) = self.kind() else {
            return Err(self.unexpected("an element type after 'new'"));
        };
        if element == Primitive::Void {
            return Err(Diagnostic::syntax("arrays of void are not allowed", self.current_span()));
        }
        self.tokens.advance();
        let sizes = self.bracketed_list()?;
        if sizes.len() > u8::MAX as usize {
            return Err(Diagnostic::syntax("too many array dimensions", self.span_from(start)));
        }
        Ok(Expr::new(
            ExprKind::ArrayInstance { element, sizes },
            self.span_from(start),
        ))
    }

    /// `[expr, expr, ...]` with at least one expression.
    fn bracketed_list(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LBracket, "'['")?;
        let mut items = vec![self.expression()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.expression()?);
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompileOptions;
    use std::fs;
    use tempfile::tempdir;

    fn parse_source(source: &str) -> (Module, CompilationContext) {
        let mut ctx = CompilationContext::default();
        let file = ctx.add_source("test.alm", source);
        let module = parse_module(&mut ctx, file);
        (module, ctx)
    }

    fn body_of(module: &Module, index: usize) -> &Block {
        match &module.items[index] {
            Item::Function(FuncDecl {
                body: FuncBody::Block(block),
                ..
            }) => block,
            other => panic!("expected function, got {other:?}"),
        }
    }

    fn first_expr(module: &Module) -> &Expr {
        match &body_of(module, 0).stmts[0].kind {
            StmtKind::Return(Some(expr)) => expr,
            other => panic!("expected return, got {other:?}"),
        }
    }

    #[test]
    fn parses_minimal_main() {
        let (module, ctx) = parse_source("func main(): integer { return 0; }");
        assert!(ctx.diagnostics.is_empty());
        let main = module.functions().next().expect("main");
        assert_eq!(main.name.name, "main");
        assert!(main.params.is_empty());
        assert_eq!(main.ret.ty, Type::INTEGER);
    }

    #[test]
    fn respects_arithmetic_precedence() {
        let (module, ctx) = parse_source("func f(): integer { return 1 + 2 * 3 ** 2 ** 1; }");
        assert!(ctx.diagnostics.is_empty());
        let ExprKind::ArithBinary { op, rhs, .. } = &first_expr(&module).kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, ArithOp::Add);
        let ExprKind::ArithBinary { op, rhs, .. } = &rhs.kind else {
            panic!("expected product");
        };
        assert_eq!(*op, ArithOp::Mul);
        let ExprKind::ArithBinary { op, rhs, .. } = &rhs.kind else {
            panic!("expected power");
        };
        assert_eq!(*op, ArithOp::Pow);
        assert!(matches!(rhs.kind, ExprKind::ArithBinary { op: ArithOp::Pow, .. }));
    }

    #[test]
    fn boolean_chain_binds_comparisons_tightest() {
        let (module, _) = parse_source("func f(): boolean { return a < 1 || b ^^ !c && d == 2; }");
        let ExprKind::BoolBinary { op, rhs, .. } = &first_expr(&module).kind else {
            panic!("expected disjunction");
        };
        assert_eq!(*op, BoolOp::Or);
        let ExprKind::BoolBinary { op, rhs, .. } = &rhs.kind else {
            panic!("expected xor");
        };
        assert_eq!(*op, BoolOp::Xor);
        let ExprKind::BoolBinary { op, lhs, rhs } = &rhs.kind else {
            panic!("expected conjunction");
        };
        assert_eq!(*op, BoolOp::And);
        assert!(matches!(lhs.kind, ExprKind::Not(_)));
        assert!(matches!(rhs.kind, ExprKind::BoolBinary { op: BoolOp::Eq, .. }));
    }

    #[test]
    fn disambiguates_identifier_statements() {
        let source = "func f(): void { g(1); a[1, 2] = 3; b += 4; }";
        let (module, ctx) = parse_source(source);
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        let stmts = &body_of(&module, 0).stmts;
        assert!(matches!(stmts[0].kind, StmtKind::Call(_)));
        let StmtKind::Assign(assign) = &stmts[1].kind else {
            panic!("expected element assignment");
        };
        assert!(matches!(assign.target.kind, ExprKind::ArrayElement { ref indices, .. } if indices.len() == 2));
        let StmtKind::Assign(assign) = &stmts[2].kind else {
            panic!("expected compound assignment");
        };
        assert_eq!(assign.op, AssignOp::Add);
    }

    #[test]
    fn parses_control_flow_and_simple_blocks() {
        let source = r#"
func f(integer n): integer {
    integer total = 0;
    for (integer i = 0; i < n; i += 1) total += i;
    while (total > 100) { total -= 1; }
    do total += 1; while (total < 10);
    if (total == 5) return 1; else { return 2; }
}
"#;
        let (module, ctx) = parse_source(source);
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        let stmts = &body_of(&module, 0).stmts;
        assert_eq!(stmts.len(), 5);
        let StmtKind::For { init, cond, step, body } = &stmts[1].kind else {
            panic!("expected for");
        };
        assert!(init.is_some() && cond.is_some() && step.is_some());
        assert!(body.simple);
        assert!(matches!(stmts[3].kind, StmtKind::DoWhile { .. }));
        let StmtKind::If { then_branch, else_branch, .. } = &stmts[4].kind else {
            panic!("expected if");
        };
        assert!(then_branch.simple);
        assert!(!else_branch.as_ref().expect("else").simple);
    }

    #[test]
    fn parses_array_types_and_instances() {
        let source = "func f(): void { integer[,] grid = new integer[3, 4]; }";
        let (module, ctx) = parse_source(source);
        assert!(ctx.diagnostics.is_empty());
        let StmtKind::VarDecl(decl) = &body_of(&module, 0).stmts[0].kind else {
            panic!("expected declaration");
        };
        assert_eq!(decl.ty.ty, Type::array(Primitive::Integer, 2));
        let Some(Expr { kind: ExprKind::ArrayInstance { element, sizes }, .. }) = &decl.init else {
            panic!("expected array instance");
        };
        assert_eq!(*element, Primitive::Integer);
        assert_eq!(sizes.len(), 2);
    }

    #[test]
    fn parses_external_declarations_and_globals() {
        let source = r#"
@external "libc" func puts(string s): integer;
integer counter = 1;
func main(): integer { return 0; }
"#;
        let (module, ctx) = parse_source(source);
        assert!(ctx.diagnostics.is_empty());
        let Item::Function(puts) = &module.items[0] else {
            panic!("expected external function");
        };
        assert!(matches!(&puts.body, FuncBody::External { library } if library == "libc"));
        assert!(matches!(module.items[1], Item::Global(_)));
    }

    #[test]
    fn recovers_and_reports_independent_errors() {
        let source = r#"
func f(): void {
    integer a = ;
    a = 1;
    b = (2;
    c = 3;
}
func g(): void { return; }
"#;
        let (module, ctx) = parse_source(source);
        assert_eq!(ctx.diagnostics.syntax().len(), 2);
        let stmts = &body_of(&module, 0).stmts;
        assert_eq!(stmts.len(), 4);
        assert!(matches!(stmts[0].kind, StmtKind::Error(_)));
        assert!(matches!(stmts[1].kind, StmtKind::Assign(_)));
        assert!(matches!(stmts[2].kind, StmtKind::Error(_)));
        assert!(matches!(module.items[1], Item::Function(_)));
    }

    #[test]
    fn reports_invalid_tokens_where_used() {
        let (_, ctx) = parse_source("func f(): void { a = 1 $ 2; }");
        let diags = ctx.diagnostics.syntax();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("unexpected character '$'"));

        let (_, ctx) = parse_source("func f(): void { a = $; }");
        assert!(ctx.diagnostics.syntax()[0].message.contains("unexpected character '$'"));
    }

    #[test]
    fn missing_closing_brace_is_reported_once() {
        let (module, ctx) = parse_source("func f(): void { return;\nfunc main(): integer { return 0; }");
        assert_eq!(ctx.diagnostics.syntax().len(), 1);
        assert!(matches!(module.items[0], Item::Error(_)));
        assert!(matches!(module.items[1], Item::Function(_)));
    }

    #[test]
    fn splices_imported_modules_depth_first() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("b.alm"), "import \"c.alm\";\nfunc b(): void { return; }")
            .expect("write b");
        fs::write(dir.path().join("c.alm"), "func c(): void { return; }").expect("write c");
        let main = dir.path().join("main.alm");
        fs::write(&main, "import \"b.alm\";\nfunc main(): integer { return 0; }").expect("write main");

        let mut ctx = CompilationContext::new(CompileOptions::with_lib_dir(dir.path()));
        let path = main.canonicalize().expect("canonical");
        let file = ctx.load_source(&path).expect("load");
        ctx.imports.enter(&path);
        let module = parse_module(&mut ctx, file);

        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        let names: Vec<_> = module
            .modules()
            .iter()
            .flat_map(|m| m.functions().map(|f| f.name.name.clone()))
            .collect();
        assert_eq!(names, ["c", "b", "main"]);
    }

    #[test]
    fn mutual_imports_report_one_cycle() {
        let dir = tempdir().expect("tempdir");
        let a = dir.path().join("a.alm");
        fs::write(&a, "import \"b.alm\";\nfunc main(): integer { return 0; }").expect("write a");
        fs::write(dir.path().join("b.alm"), "import \"a.alm\";\nfunc b(): void { return; }")
            .expect("write b");

        let mut ctx = CompilationContext::new(CompileOptions::with_lib_dir(dir.path()));
        let path = a.canonicalize().expect("canonical");
        let file = ctx.load_source(&path).expect("load");
        ctx.imports.enter(&path);
        parse_module(&mut ctx, file);

        let diags = ctx.diagnostics.syntax();
        assert_eq!(diags.len(), 1, "{diags:?}");
        assert!(diags[0].message.contains("cannot import"));
    }

    #[test]
    fn rejects_duplicate_and_self_imports() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("b.alm"), "func b(): void { return; }").expect("write b");
        let a = dir.path().join("a.alm");
        fs::write(&a, "import \"b.alm\", \"b.alm\", \"a.alm\";").expect("write a");

        let mut ctx = CompilationContext::new(CompileOptions::with_lib_dir(dir.path()));
        let path = a.canonicalize().expect("canonical");
        let file = ctx.load_source(&path).expect("load");
        ctx.imports.enter(&path);
        let module = parse_module(&mut ctx, file);

        let messages: Vec<_> = ctx.diagnostics.syntax().iter().map(|d| d.message.clone()).collect();
        assert_eq!(messages.len(), 2, "{messages:?}");
        assert!(messages[0].contains("already imported"));
        assert!(messages[1].contains("cannot import itself"));
        assert!(module.imports[0].module.is_some());
        assert!(module.imports[1].module.is_none());
    }
}
