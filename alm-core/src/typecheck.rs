//! Type checking and implicit widening.
//!
//! The checker consumes the label-checked tree and produces a new one in
//! which every expression carries its type. Where an operand, initializer,
//! return value or call argument has a narrower numeric type than its
//! context expects, the value is wrapped in an [`ExprKind::Cast`] node
//! instead of being reported. Only mismatches that no widening can repair
//! become diagnostics.
//!
//! Expressions that failed to check get `Type::Undefined`, which every
//! enclosing rule accepts silently, so one bad leaf yields one diagnostic.

use crate::ast::*;
use crate::context::CompilationContext;
use crate::diagnostic::Diagnostics;
use crate::error::CoreError;
use crate::span::Span;
use crate::symbols::{FunctionSymbol, SymbolTable};
use crate::types::{ArgMatch, ParamType, Primitive, Type};

/// Type-check `module` against the global scope left in `ctx.globals`.
///
/// Returns the annotated tree. An `Err` means the tree violated an
/// invariant earlier phases guarantee and the unit must not be compiled
/// further.
pub fn check_types(module: Module, ctx: &mut CompilationContext) -> Result<Module, CoreError> {
    let globals = ctx
        .globals
        .take()
        .ok_or_else(|| CoreError::Internal("type checking requires label-checked globals".into()))?;
    let mut checker = TypeChecker {
        diagnostics: &mut ctx.diagnostics,
        table: SymbolTable::with_globals(globals),
        function: String::new(),
        ret: Type::VOID,
        arith_reported: false,
        bool_reported: false,
    };
    let result = checker.module(module);
    let globals = checker.table.into_globals();
    ctx.globals = Some(globals);
    let module = result?;
    tracing::debug!(errors = ctx.diagnostics.semantic().len(), "type checking finished");
    Ok(module)
}

/// Implicitly convert `expr` to `target` if that is a widening.
///
/// Casts are pushed through `+ - * **` and negation down to the operands,
/// so `long l = a * b;` multiplies in `long`. Integer literals that fit
/// are retyped in place for `byte` and `short` targets. Anything that
/// cannot be widened is returned unchanged for the caller to report.
pub fn coerce(expr: Expr, target: Type) -> Expr {
    if expr.ty == target || target.is_undefined() {
        return expr;
    }
    if int_constant(&expr).is_some_and(|value| literal_fits(value, target)) {
        return retype_constant(expr, target);
    }
    if !expr.ty.can_widen_to(target) {
        return expr;
    }
    let Expr { kind, span, ty } = expr;
    match kind {
        ExprKind::ArithBinary { op, lhs, rhs }
            if matches!(op, ArithOp::Add | ArithOp::Sub | ArithOp::Mul | ArithOp::Pow) =>
        {
            Expr {
                kind: ExprKind::ArithBinary {
                    op,
                    lhs: Box::new(coerce(*lhs, target)),
                    rhs: Box::new(coerce(*rhs, target)),
                },
                span,
                ty: target,
            }
        }
        ExprKind::ArithUnary {
            op: ArithUnaryOp::Neg,
            operand,
        } => Expr {
            kind: ExprKind::ArithUnary {
                op: ArithUnaryOp::Neg,
                operand: Box::new(coerce(*operand, target)),
            },
            span,
            ty: target,
        },
        kind => {
            tracing::trace!(from = %ty, to = %target, "inserting widening cast");
            Expr {
                kind: ExprKind::Cast {
                    target,
                    expr: Box::new(Expr { kind, span, ty }),
                },
                span,
                ty: target,
            }
        }
    }
}

/// Value of an integer literal, possibly negated.
fn int_constant(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(value)) => Some(*value),
        ExprKind::ArithUnary {
            op: ArithUnaryOp::Neg,
            operand,
        } => int_constant(operand).and_then(i64::checked_neg),
        _ => None,
    }
}

fn retype_constant(expr: Expr, target: Type) -> Expr {
    let Expr { kind, span, .. } = expr;
    let kind = match kind {
        ExprKind::ArithUnary { op, operand } => ExprKind::ArithUnary {
            op,
            operand: Box::new(retype_constant(*operand, target)),
        },
        kind => kind,
    };
    Expr::new(kind, span).with_type(target)
}

fn literal_fits(value: i64, target: Type) -> bool {
    match target.primitive() {
        Some(Primitive::Byte) => i8::try_from(value).is_ok(),
        Some(Primitive::Short) => i16::try_from(value).is_ok(),
        _ => false,
    }
}

/// Operand and result types of an arithmetic operator, or `None` if the
/// operator does not apply to these operand types.
///
/// Both operands are widened to the first type; the second is the type of
/// the whole expression.
pub fn arith_types(op: ArithOp, lhs: Type, rhs: Type) -> Option<(Type, Type)> {
    let numeric = lhs.is_numeric() && rhs.is_numeric();
    match op {
        ArithOp::Add if lhs == Type::STRING && rhs == Type::STRING => Some((Type::STRING, Type::STRING)),
        ArithOp::Add | ArithOp::Sub => {
            let numeric_or_char = |t: Type| t.is_numeric() || t == Type::CHAR;
            if !(numeric_or_char(lhs) && numeric_or_char(rhs)) {
                return None;
            }
            let ty = match common_operand(lhs, rhs) {
                Type::CHAR => Type::INTEGER,
                ty => ty,
            };
            Some((ty, ty))
        }
        ArithOp::Mul | ArithOp::Pow if numeric => {
            let ty = lhs.higher(rhs);
            Some((ty, ty))
        }
        ArithOp::Div if numeric => Some((Type::FLOAT, Type::FLOAT)),
        ArithOp::IntDiv
            if numeric && lhs.can_widen_to(Type::INTEGER) && rhs.can_widen_to(Type::INTEGER) =>
        {
            Some((Type::INTEGER, Type::INTEGER))
        }
        op if op.is_bitwise() && lhs.is_integral() && rhs.is_integral() => {
            let ty = lhs.higher(rhs);
            Some((ty, ty))
        }
        _ => None,
    }
}

/// Common operand type of a comparison, or `None` if it is ill-typed.
pub fn comparison_operand(op: BoolOp, lhs: Type, rhs: Type) -> Option<Type> {
    if op.is_equality() && lhs == rhs && !lhs.is_void() && !lhs.is_array() {
        return Some(lhs);
    }
    let ordered = lhs.cast_priority().is_some() && rhs.cast_priority().is_some();
    ordered.then(|| common_operand(lhs, rhs))
}

/// Nothing widens into `char`, so mixed operands meet in `integer`.
fn common_operand(lhs: Type, rhs: Type) -> Type {
    match lhs.higher(rhs) {
        Type::CHAR if lhs != rhs => Type::INTEGER,
        ty => ty,
    }
}

struct TypeChecker<'a> {
    diagnostics: &'a mut Diagnostics,
    table: SymbolTable,
    /// Name and return type of the function being checked.
    function: String,
    ret: Type,
    arith_reported: bool,
    bool_reported: bool,
}

type TResult<T> = Result<T, CoreError>;

impl<'a> TypeChecker<'a> {
    fn error(&mut self, message: String, span: Span) {
        self.diagnostics.semantic_error(message, span);
    }

    /// Label checking already rejected redeclarations.
    fn declare(&mut self, name: &Ident, ty: Type) -> TResult<()> {
        self.table
            .declare_variable(&name.name, ty, name.span)
            .map_err(|existing| {
                CoreError::Internal(format!(
                    "'{}' redeclared at {} after label checking",
                    existing.name, name.span
                ))
            })
    }

    fn arith_error(&mut self, message: String, span: Span) {
        if !self.arith_reported {
            self.arith_reported = true;
            self.error(message, span);
        }
    }

    fn bool_error(&mut self, message: String, span: Span) {
        if !self.bool_reported {
            self.bool_reported = true;
            self.error(message, span);
        }
    }

    /// Resolve one top-level expression (initializer, condition, argument
    /// list, return value) with fresh error latches.
    fn resolve_root(&mut self, expr: Expr) -> TResult<Expr> {
        self.arith_reported = false;
        self.bool_reported = false;
        self.resolve(expr)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn module(&mut self, module: Module) -> TResult<Module> {
        let Module {
            file,
            path,
            imports,
            items,
            span,
        } = module;
        let imports = imports
            .into_iter()
            .map(|import| {
                let module = match import.module {
                    Some(module) => Some(Box::new(self.module(*module)?)),
                    None => None,
                };
                Ok(Import { module, ..import })
            })
            .collect::<TResult<Vec<_>>>()?;
        let items = items
            .into_iter()
            .map(|item| self.item(item))
            .collect::<TResult<Vec<_>>>()?;
        Ok(Module {
            file,
            path,
            imports,
            items,
            span,
        })
    }

    fn item(&mut self, item: Item) -> TResult<Item> {
        match item {
            Item::Function(function) => self.function(function).map(Item::Function),
            Item::Global(decl) => {
                let init = match decl.init {
                    Some(init) => Some(self.assigned_value(init, decl.ty.ty)?),
                    None => None,
                };
                Ok(Item::Global(VarDecl { init, ..decl }))
            }
            Item::Error(diag) => Err(CoreError::Internal(format!(
                "declaration error placeholder reached the type checker: {}",
                diag.message
            ))),
        }
    }

    fn function(&mut self, function: FuncDecl) -> TResult<FuncDecl> {
        let body = match function.body {
            FuncBody::Block(body) => body,
            external => {
                return Ok(FuncDecl {
                    body: external,
                    ..function
                });
            }
        };
        self.function = function.name.name.clone();
        self.ret = function.ret.ty;

        self.table.push_scope();
        let declared = function
            .params
            .iter()
            .try_for_each(|param| self.declare(&param.name, param.ty.ty));
        let stmts = declared.and_then(|()| self.stmts(body.stmts));
        self.table.pop_scope();

        Ok(FuncDecl {
            body: FuncBody::Block(Block {
                stmts: stmts?,
                ..body
            }),
            ..function
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self, block: Block) -> TResult<Block> {
        self.table.push_scope();
        let stmts = self.stmts(block.stmts);
        self.table.pop_scope();
        Ok(Block {
            stmts: stmts?,
            ..block
        })
    }

    fn stmts(&mut self, stmts: Vec<Stmt>) -> TResult<Vec<Stmt>> {
        stmts.into_iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn stmt(&mut self, stmt: Stmt) -> TResult<Stmt> {
        let Stmt { kind, span } = stmt;
        let kind = match kind {
            StmtKind::VarDecl(decl) => {
                let init = match decl.init {
                    Some(init) => Some(self.assigned_value(init, decl.ty.ty)?),
                    None => None,
                };
                self.declare(&decl.name, decl.ty.ty)?;
                StmtKind::VarDecl(VarDecl { init, ..decl })
            }
            StmtKind::Assign(assign) => StmtKind::Assign(self.assign(assign)?),
            StmtKind::Block(block) => StmtKind::Block(self.block(block)?),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => StmtKind::If {
                cond: self.condition(cond)?,
                then_branch: self.block(then_branch)?,
                else_branch: match else_branch {
                    Some(block) => Some(self.block(block)?),
                    None => None,
                },
            },
            StmtKind::While { cond, body } => StmtKind::While {
                cond: self.condition(cond)?,
                body: self.block(body)?,
            },
            StmtKind::DoWhile { body, cond } => StmtKind::DoWhile {
                body: self.block(body)?,
                cond: self.condition(cond)?,
            },
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.table.push_scope();
                let result = self.for_parts(init, cond, step, body);
                self.table.pop_scope();
                result?
            }
            StmtKind::Return(value) => StmtKind::Return(self.return_value(value, span)?),
            StmtKind::Break => StmtKind::Break,
            StmtKind::Continue => StmtKind::Continue,
            StmtKind::Call(call) => StmtKind::Call(self.resolve_root(call)?),
            StmtKind::Error(diag) => {
                return Err(CoreError::Internal(format!(
                    "statement error placeholder reached the type checker: {}",
                    diag.message
                )));
            }
        };
        Ok(Stmt { kind, span })
    }

    fn for_parts(
        &mut self,
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Block,
    ) -> TResult<StmtKind> {
        let init = match init {
            Some(init) => Some(Box::new(self.stmt(*init)?)),
            None => None,
        };
        let cond = match cond {
            Some(cond) => Some(self.condition(cond)?),
            None => None,
        };
        let body = self.block(body)?;
        let step = match step {
            Some(step) => Some(Box::new(self.stmt(*step)?)),
            None => None,
        };
        Ok(StmtKind::For {
            init,
            cond,
            step,
            body,
        })
    }

    /// Resolve `value` and widen it to the declared type `target`.
    fn assigned_value(&mut self, value: Expr, target: Type) -> TResult<Expr> {
        let value = self.resolve_root(value)?;
        Ok(self.convert(value, target))
    }

    /// Widen `value` to `target`, reporting what cannot be widened.
    fn convert(&mut self, value: Expr, target: Type) -> Expr {
        let found = value.ty;
        let value = coerce(value, target);
        if value.ty != target && !value.ty.is_undefined() && !target.is_undefined() {
            self.error(
                format!("incompatible assignment type: cannot assign '{found}' to '{target}'"),
                value.span,
            );
        }
        value
    }

    fn assign(&mut self, assign: Assign) -> TResult<Assign> {
        let Assign { target, op, value } = assign;
        let target = self.resolve_root(target)?;
        let value = self.resolve(value)?;
        let Some(arith) = op.arith() else {
            let value = self.convert(value, target.ty);
            return Ok(Assign { target, op, value });
        };

        if target.ty.is_undefined() || value.ty.is_undefined() {
            return Ok(Assign { target, op, value });
        }
        match arith_types(arith, target.ty, value.ty) {
            Some((operand, result)) => {
                if result != target.ty {
                    self.error(
                        format!(
                            "incompatible assignment type: cannot assign '{result}' to '{}'",
                            target.ty
                        ),
                        value.span,
                    );
                }
                let value = coerce(value, operand);
                Ok(Assign { target, op, value })
            }
            None => {
                self.arith_error(
                    format!(
                        "operator '{}' cannot be applied to '{}' and '{}'",
                        arith.symbol(),
                        target.ty,
                        value.ty
                    ),
                    value.span,
                );
                Ok(Assign { target, op, value })
            }
        }
    }

    fn condition(&mut self, cond: Expr) -> TResult<Expr> {
        let cond = self.resolve_root(cond)?;
        if cond.ty != Type::BOOLEAN && !cond.ty.is_undefined() {
            self.error(
                format!("condition must be 'boolean', found '{}'", cond.ty),
                cond.span,
            );
        }
        Ok(cond)
    }

    fn return_value(&mut self, value: Option<Expr>, span: Span) -> TResult<Option<Expr>> {
        let Some(value) = value else {
            if !self.ret.is_void() {
                let message = format!(
                    "function '{}' must return a value of type '{}'",
                    self.function, self.ret
                );
                self.error(message, span);
            }
            return Ok(None);
        };
        let value = self.resolve_root(value)?;
        if self.ret.is_void() {
            let message = format!("function '{}' returns void but a value is returned", self.function);
            self.error(message, value.span);
            return Ok(Some(value));
        }
        let found = value.ty;
        let value = coerce(value, self.ret);
        if value.ty != self.ret && !value.ty.is_undefined() {
            self.error(
                format!(
                    "incompatible return type: expected '{}', found '{found}'",
                    self.ret
                ),
                value.span,
            );
        }
        Ok(Some(value))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn resolve(&mut self, expr: Expr) -> TResult<Expr> {
        let Expr { kind, span, .. } = expr;
        let typed = match kind {
            ExprKind::Ident { name } => {
                let ty = self
                    .table
                    .lookup_variable(&name)
                    .map(|symbol| symbol.ty)
                    .unwrap_or_default();
                Expr::new(ExprKind::Ident { name }, span).with_type(ty)
            }
            ExprKind::Literal(literal) => {
                let ty = match &literal {
                    Literal::Int(value) if i32::try_from(*value).is_ok() => Type::INTEGER,
                    Literal::Int(_) => Type::LONG,
                    Literal::Real(_) => Type::FLOAT,
                    Literal::Bool(_) => Type::BOOLEAN,
                    Literal::Char(_) => Type::CHAR,
                    Literal::Str(_) => Type::STRING,
                };
                Expr::new(ExprKind::Literal(literal), span).with_type(ty)
            }
            ExprKind::ArrayInstance { element, sizes } => {
                let sizes = self.indices(sizes, "array size")?;
                let dims = sizes.len() as u8;
                Expr::new(ExprKind::ArrayInstance { element, sizes }, span)
                    .with_type(Type::array(element, dims))
            }
            ExprKind::ArrayElement { array, indices } => self.array_element(*array, indices, span)?,
            ExprKind::ArithUnary { op, operand } => {
                let operand = self.resolve(*operand)?;
                let ok = match op {
                    ArithUnaryOp::Neg => operand.ty.is_numeric(),
                    ArithUnaryOp::BitNot => operand.ty.is_integral(),
                };
                let ty = if ok || operand.ty.is_undefined() {
                    operand.ty
                } else {
                    let symbol = if op == ArithUnaryOp::Neg { "-" } else { "~" };
                    self.arith_error(
                        format!("operator '{symbol}' cannot be applied to '{}'", operand.ty),
                        span,
                    );
                    Type::Undefined
                };
                Expr::new(
                    ExprKind::ArithUnary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                )
                .with_type(ty)
            }
            ExprKind::Not(operand) => {
                let operand = self.resolve(*operand)?;
                let ty = if operand.ty == Type::BOOLEAN || operand.ty.is_undefined() {
                    operand.ty
                } else {
                    self.bool_error(
                        format!("operator '!' cannot be applied to '{}'", operand.ty),
                        span,
                    );
                    Type::Undefined
                };
                Expr::new(ExprKind::Not(Box::new(operand)), span).with_type(ty)
            }
            ExprKind::ArithBinary { op, lhs, rhs } => {
                let lhs = self.resolve(*lhs)?;
                let rhs = self.resolve(*rhs)?;
                self.arith_binary(op, lhs, rhs, span)
            }
            ExprKind::BoolBinary { op, lhs, rhs } => {
                let lhs = self.resolve(*lhs)?;
                let rhs = self.resolve(*rhs)?;
                self.bool_binary(op, lhs, rhs, span)
            }
            ExprKind::Call { callee, args } => self.call(callee, args, span)?,
            ExprKind::Cast { target, .. } => {
                return Err(CoreError::Internal(format!(
                    "cast to '{target}' present before type checking"
                )));
            }
        };
        Ok(typed)
    }

    /// Resolve index or size expressions and widen each to `integer`.
    fn indices(&mut self, exprs: Vec<Expr>, what: &str) -> TResult<Vec<Expr>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let expr = self.resolve(expr)?;
            let found = expr.ty;
            let expr = coerce(expr, Type::INTEGER);
            if expr.ty != Type::INTEGER && !expr.ty.is_undefined() {
                self.arith_error(format!("{what} must be an integer, found '{found}'"), expr.span);
            }
            out.push(expr);
        }
        Ok(out)
    }

    fn array_element(&mut self, array: Expr, indices: Vec<Expr>, span: Span) -> TResult<Expr> {
        let array = self.resolve(array)?;
        let indices = self.indices(indices, "array index")?;
        let ty = match array.ty {
            Type::Array(array_ty) => {
                let count = indices.len();
                let dims = usize::from(array_ty.dims);
                if count > dims {
                    self.arith_error(
                        format!("too many indices: '{}' has {dims} dimension(s), found {count}", array.ty),
                        span,
                    );
                    Type::Undefined
                } else if count == dims {
                    Type::Primitive(array_ty.element)
                } else {
                    Type::array(array_ty.element, array_ty.dims - count as u8)
                }
            }
            Type::Undefined => Type::Undefined,
            other => {
                let name = array.target_name().unwrap_or_default().to_string();
                self.arith_error(format!("'{name}' of type '{other}' is not an array"), array.span);
                Type::Undefined
            }
        };
        Ok(Expr::new(
            ExprKind::ArrayElement {
                array: Box::new(array),
                indices,
            },
            span,
        )
        .with_type(ty))
    }

    fn arith_binary(&mut self, op: ArithOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
        let (lhs, rhs, ty) = if lhs.ty.is_undefined() || rhs.ty.is_undefined() {
            (lhs, rhs, Type::Undefined)
        } else {
            match arith_types(op, lhs.ty, rhs.ty) {
                Some((operand, result)) => (coerce(lhs, operand), coerce(rhs, operand), result),
                None => {
                    self.arith_error(
                        format!(
                            "operator '{}' cannot be applied to '{}' and '{}'",
                            op.symbol(),
                            lhs.ty,
                            rhs.ty
                        ),
                        span,
                    );
                    (lhs, rhs, Type::Undefined)
                }
            }
        };
        Expr::new(
            ExprKind::ArithBinary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
        .with_type(ty)
    }

    fn bool_binary(&mut self, op: BoolOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
        let (lhs, rhs, ty) = if lhs.ty.is_undefined() || rhs.ty.is_undefined() {
            (lhs, rhs, Type::Undefined)
        } else if op.is_logical() {
            if lhs.ty == Type::BOOLEAN && rhs.ty == Type::BOOLEAN {
                (lhs, rhs, Type::BOOLEAN)
            } else {
                self.bool_error(
                    format!(
                        "operator '{}' requires 'boolean' operands, found '{}' and '{}'",
                        op.symbol(),
                        lhs.ty,
                        rhs.ty
                    ),
                    span,
                );
                (lhs, rhs, Type::Undefined)
            }
        } else {
            match comparison_operand(op, lhs.ty, rhs.ty) {
                Some(operand) => (coerce(lhs, operand), coerce(rhs, operand), Type::BOOLEAN),
                None => {
                    self.bool_error(
                        format!(
                            "cannot compare '{}' and '{}' with '{}'",
                            lhs.ty,
                            rhs.ty,
                            op.symbol()
                        ),
                        span,
                    );
                    (lhs, rhs, Type::Undefined)
                }
            }
        };
        Expr::new(
            ExprKind::BoolBinary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
        .with_type(ty)
    }

    fn call(&mut self, callee: Ident, args: Vec<Expr>, span: Span) -> TResult<Expr> {
        let args = args
            .into_iter()
            .map(|arg| self.resolve(arg))
            .collect::<TResult<Vec<_>>>()?;
        let arg_types: Vec<Type> = args.iter().map(|arg| arg.ty).collect();
        let undefined = arg_types.iter().any(|ty| ty.is_undefined());

        let candidates = self.table.functions_named(&callee.name);
        if candidates.is_empty() {
            self.error(format!("function '{}' is not declared", callee.name), callee.span);
            return Ok(Expr::new(ExprKind::Call { callee, args }, span));
        }
        let chosen = if undefined {
            None
        } else {
            select_overload(&candidates, &args).cloned()
        };

        let Some(chosen) = chosen else {
            if !undefined {
                let shown: Vec<String> = arg_types.iter().map(Type::to_string).collect();
                self.error(
                    format!(
                        "no overload of '{}' accepts ({})",
                        callee.name,
                        shown.join(", ")
                    ),
                    span,
                );
            }
            return Ok(Expr::new(ExprKind::Call { callee, args }, span));
        };

        let args = args
            .into_iter()
            .zip(&chosen.params)
            .map(|(arg, param)| match param {
                ParamType::Exact(ty) => coerce(arg, *ty),
                ParamType::AnyArray => arg,
            })
            .collect();
        Ok(Expr::new(ExprKind::Call { callee, args }, span).with_type(chosen.ret))
    }
}

/// Pick the overload for `args`: an exact match if there is one, else the
/// accepting overload needing the fewest widenings. Ties go to the
/// earliest declaration.
fn select_overload<'f>(candidates: &[&'f FunctionSymbol], args: &[Expr]) -> Option<&'f FunctionSymbol> {
    if let Some(exact) = candidates
        .iter()
        .find(|f| signature_match(f, args) == ArgMatch::Exact)
    {
        return Some(*exact);
    }
    candidates
        .iter()
        .filter(|f| signature_match(f, args) == ArgMatch::Widening)
        .min_by_key(|f| {
            f.params
                .iter()
                .zip(args)
                .filter(|(param, arg)| argument_match(**param, arg) == ArgMatch::Widening)
                .count()
        })
        .copied()
}

fn signature_match(function: &FunctionSymbol, args: &[Expr]) -> ArgMatch {
    function.match_args(args, argument_match)
}

/// Like [`ParamType::accepts`], but an integer literal that fits a `byte`
/// or `short` parameter counts as a widening; `coerce` retypes it.
fn argument_match(param: ParamType, arg: &Expr) -> ArgMatch {
    match (param.accepts(arg.ty), param.exact()) {
        (ArgMatch::Mismatch, Some(ty)) if int_constant(arg).is_some_and(|value| literal_fits(value, ty)) => {
            ArgMatch::Widening
        }
        (found, _) => found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label_check::check_labels;
    use crate::parser::parse_module;

    fn check(source: &str) -> (Module, Vec<String>) {
        let mut ctx = CompilationContext::default();
        let file = ctx.add_source("test.alm", source);
        let module = parse_module(&mut ctx, file);
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        check_labels(&module, &mut ctx);
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        let module = check_types(module, &mut ctx).expect("no internal errors");
        let messages = ctx.diagnostics.semantic().iter().map(|d| d.message.clone()).collect();
        (module, messages)
    }

    fn stmts(module: &Module) -> &[Stmt] {
        match &module.functions().next().expect("function").body {
            FuncBody::Block(block) => &block.stmts,
            FuncBody::External { .. } => panic!("expected a body"),
        }
    }

    fn init_of(stmt: &Stmt) -> &Expr {
        match &stmt.kind {
            StmtKind::VarDecl(VarDecl { init: Some(init), .. }) => init,
            other => panic!("expected initialized declaration, got {other:?}"),
        }
    }

    #[test]
    fn widening_assignment_inserts_a_cast() {
        let (module, messages) = check("func f(): void { integer i = 1; float x; x = i; }");
        assert!(messages.is_empty(), "{messages:?}");
        let StmtKind::Assign(assign) = &stmts(&module)[2].kind else {
            panic!("expected assignment");
        };
        assert_eq!(assign.value.ty, Type::FLOAT);
        let ExprKind::Cast { target, expr } = &assign.value.kind else {
            panic!("expected cast, got {:?}", assign.value.kind);
        };
        assert_eq!(*target, Type::FLOAT);
        assert_eq!(expr.ty, Type::INTEGER);
    }

    #[test]
    fn narrowing_assignment_is_one_error() {
        let (_, messages) = check("func f(): void { float x = 1.5; integer i; i = x; }");
        assert_eq!(
            messages,
            ["incompatible assignment type: cannot assign 'float' to 'integer'"]
        );
    }

    #[test]
    fn casts_are_pushed_to_arithmetic_operands() {
        let (module, messages) = check("func f(integer a, integer b): void { long l = a * b; }");
        assert!(messages.is_empty(), "{messages:?}");
        let init = init_of(&stmts(&module)[0]);
        let ExprKind::ArithBinary { lhs, rhs, .. } = &init.kind else {
            panic!("expected product, got {:?}", init.kind);
        };
        assert_eq!(init.ty, Type::LONG);
        assert!(matches!(lhs.kind, ExprKind::Cast { target: Type::LONG, .. }));
        assert!(matches!(rhs.kind, ExprKind::Cast { target: Type::LONG, .. }));
    }

    #[test]
    fn mixed_operands_take_the_higher_priority() {
        let (module, messages) = check("func f(short s, long l): void { long r = s + l; }");
        assert!(messages.is_empty(), "{messages:?}");
        let init = init_of(&stmts(&module)[0]);
        let ExprKind::ArithBinary { lhs, rhs, .. } = &init.kind else {
            panic!("expected sum");
        };
        assert!(matches!(lhs.kind, ExprKind::Cast { target: Type::LONG, .. }));
        assert_eq!(rhs.ty, Type::LONG);
        assert!(matches!(rhs.kind, ExprKind::Ident { .. }));
    }

    #[test]
    fn division_operators_fix_their_result_type() {
        let (module, messages) = check("func f(integer a): void { float q = a / 2; integer r = a % 2; }");
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(init_of(&stmts(&module)[0]).ty, Type::FLOAT);
        assert_eq!(init_of(&stmts(&module)[1]).ty, Type::INTEGER);

        let (_, messages) = check("func f(integer a): void { integer q = a / 2; }");
        assert_eq!(
            messages,
            ["incompatible assignment type: cannot assign 'float' to 'integer'"]
        );
    }

    #[test]
    fn char_arithmetic_degrades_to_integer() {
        let (module, messages) = check("func f(char c): void { integer n = c + 1; }");
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(init_of(&stmts(&module)[0]).ty, Type::INTEGER);

        let (_, messages) = check("func f(char c): void { char d = c + 1; }");
        assert_eq!(
            messages,
            ["incompatible assignment type: cannot assign 'integer' to 'char'"]
        );
    }

    #[test]
    fn strings_concatenate_but_do_not_mix() {
        let (_, messages) = check(r#"func f(): void { string s = "a" + "b"; }"#);
        assert!(messages.is_empty(), "{messages:?}");
        let (_, messages) = check(r#"func f(): void { string s = "a" + 1; }"#);
        assert_eq!(messages, ["operator '+' cannot be applied to 'string' and 'integer'"]);
    }

    #[test]
    fn one_bad_leaf_reports_once() {
        let (_, messages) = check(r#"func f(): void { integer n = 1 + true + 2 * 3 - false; }"#);
        assert_eq!(messages.len(), 1, "{messages:?}");
    }

    #[test]
    fn bitwise_requires_integral_operands() {
        let (_, messages) = check("func f(float x): void { integer n = 1 & 2 | 3 << 1; float y = x & 1; }");
        assert_eq!(messages, ["operator '&' cannot be applied to 'float' and 'integer'"]);
    }

    #[test]
    fn conditions_must_be_boolean() {
        let (_, messages) = check("func f(integer a): void { if (a) { } while (a > 1 && a < 3) { } }");
        assert_eq!(messages, ["condition must be 'boolean', found 'integer'"]);
    }

    #[test]
    fn comparisons_widen_mixed_numbers() {
        let (module, messages) = check("func f(integer a, float b): void { boolean c = a < b; }");
        assert!(messages.is_empty(), "{messages:?}");
        let init = init_of(&stmts(&module)[0]);
        let ExprKind::BoolBinary { lhs, .. } = &init.kind else {
            panic!("expected comparison");
        };
        assert!(matches!(lhs.kind, ExprKind::Cast { target: Type::FLOAT, .. }));

        let (_, messages) = check(r#"func f(): void { boolean c = "a" < "b"; }"#);
        assert_eq!(messages, ["cannot compare 'string' and 'string' with '<'"]);
        let (_, messages) = check(r#"func f(): void { boolean c = "a" == "b"; }"#);
        assert!(messages.is_empty(), "{messages:?}");
    }

    #[test]
    fn small_integers_compared_with_char_meet_in_integer() {
        let (module, messages) = check("func f(byte b, char c): void { boolean r = b < c; boolean e = c == b; }");
        assert!(messages.is_empty(), "{messages:?}");
        for stmt in stmts(&module) {
            let ExprKind::BoolBinary { lhs, rhs, .. } = &init_of(stmt).kind else {
                panic!("expected comparison");
            };
            assert_eq!(lhs.ty, Type::INTEGER);
            assert_eq!(rhs.ty, Type::INTEGER);
            assert!(matches!(lhs.kind, ExprKind::Cast { .. }));
            assert!(matches!(rhs.kind, ExprKind::Cast { .. }));
        }

        let (module, messages) = check("func f(char a, char b): void { boolean r = a < b; }");
        assert!(messages.is_empty(), "{messages:?}");
        let ExprKind::BoolBinary { lhs, .. } = &init_of(&stmts(&module)[0]).kind else {
            panic!("expected comparison");
        };
        assert_eq!(lhs.ty, Type::CHAR);
    }

    #[test]
    fn return_values_are_checked_against_the_signature() {
        let (module, messages) = check("func f(short s): long { return s; }");
        assert!(messages.is_empty(), "{messages:?}");
        let StmtKind::Return(Some(value)) = &stmts(&module)[0].kind else {
            panic!("expected return");
        };
        assert!(matches!(value.kind, ExprKind::Cast { target: Type::LONG, .. }));

        let (_, messages) = check("func f(): integer { return 1.5; }");
        assert_eq!(messages, ["incompatible return type: expected 'integer', found 'float'"]);
        let (_, messages) = check("func f(): void { return 1; }");
        assert_eq!(messages, ["function 'f' returns void but a value is returned"]);
        let (_, messages) = check("func f(): integer { return; }");
        assert_eq!(messages, ["function 'f' must return a value of type 'integer'"]);
    }

    #[test]
    fn calls_prefer_exact_overloads_then_widening() {
        let source = r#"
func g(long x): integer { return 1; }
func g(float x): integer { return 2; }
func f(integer i, long l): void { integer a = g(l); integer b = g(i); println(i); }
"#;
        let (module, messages) = check(source);
        assert!(messages.is_empty(), "{messages:?}");
        let f = module.functions().nth(2).expect("f");
        let FuncBody::Block(body) = &f.body else {
            panic!("expected body");
        };
        let ExprKind::Call { args, .. } = &init_of(&body.stmts[0]).kind else {
            panic!("expected call");
        };
        assert!(matches!(args[0].kind, ExprKind::Ident { .. }));
        let ExprKind::Call { args, .. } = &init_of(&body.stmts[1]).kind else {
            panic!("expected call");
        };
        assert!(matches!(args[0].kind, ExprKind::Cast { target: Type::LONG, .. }));
    }

    #[test]
    fn calls_without_a_matching_overload_are_reported() {
        let (_, messages) = check(r#"func f(): void { println(1, 2); toInteger("x"); }"#);
        assert_eq!(
            messages,
            [
                "no overload of 'println' accepts (integer, integer)",
                "no overload of 'toInteger' accepts (string)"
            ]
        );
    }

    #[test]
    fn length_accepts_arrays_of_any_shape() {
        let source = "func f(): integer { float[,] m = new float[2, 3]; return length(m) + length(new char[4]); }";
        let (_, messages) = check(source);
        assert!(messages.is_empty(), "{messages:?}");
        let (_, messages) = check("func f(): integer { return length(3); }");
        assert_eq!(messages, ["no overload of 'length' accepts (integer)"]);
    }

    #[test]
    fn array_indexing_rules() {
        let source = r#"
func f(): void {
    integer[,] grid = new integer[2, 2];
    byte row = 1;
    grid[row, 0] = 5;
    integer[] line = grid[1];
    integer bad = grid[0, 0, 0];
    integer worse = grid[1.5, 0];
}
"#;
        let (_, messages) = check(source);
        assert_eq!(
            messages,
            [
                "too many indices: 'integer[,]' has 2 dimension(s), found 3",
                "array index must be an integer, found 'float'"
            ]
        );
    }

    #[test]
    fn small_integer_literals_fit_narrow_types() {
        let (module, messages) = check("func f(): void { byte b = 100; short s = -5; }");
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(init_of(&stmts(&module)[0]).ty, Type::BYTE);

        let (_, messages) = check("func f(): void { byte b = 300; }");
        assert_eq!(
            messages,
            ["incompatible assignment type: cannot assign 'integer' to 'byte'"]
        );
    }

    #[test]
    fn small_integer_literals_are_passed_to_narrow_parameters() {
        let source = "func g(byte x): void { }\nfunc f(): void { g(1); g(-128); g(300); }";
        let (module, messages) = check(source);
        assert_eq!(messages, ["no overload of 'g' accepts (integer)"]);
        let f = module.functions().nth(1).expect("f");
        let FuncBody::Block(body) = &f.body else {
            panic!("expected body");
        };
        let StmtKind::Call(call) = &body.stmts[0].kind else {
            panic!("expected call");
        };
        let ExprKind::Call { args, .. } = &call.kind else {
            panic!("expected call");
        };
        assert!(matches!(args[0].kind, ExprKind::Literal(Literal::Int(1))));
        assert_eq!(args[0].ty, Type::BYTE);
    }

    #[test]
    fn literal_arguments_still_prefer_exact_overloads() {
        let source = "func g(short x): integer { return 1; }\nfunc g(integer x): integer { return 2; }\nfunc f(): void { integer a = g(7); }";
        let (module, messages) = check(source);
        assert!(messages.is_empty(), "{messages:?}");
        let f = module.functions().nth(2).expect("f");
        let FuncBody::Block(body) = &f.body else {
            panic!("expected body");
        };
        let ExprKind::Call { args, .. } = &init_of(&body.stmts[0]).kind else {
            panic!("expected call");
        };
        assert_eq!(args[0].ty, Type::INTEGER);
    }

    #[test]
    fn large_literals_are_long() {
        let (_, messages) = check("func f(): void { long l = 5000000000; integer i = 5000000000; }");
        assert_eq!(
            messages,
            ["incompatible assignment type: cannot assign 'long' to 'integer'"]
        );
    }

    #[test]
    fn compound_assignment_checks_the_result_type() {
        let (_, messages) = check("func f(): void { float x = 1.0; x += 1; integer i = 1; i /= 2; }");
        assert_eq!(
            messages,
            ["incompatible assignment type: cannot assign 'float' to 'integer'"]
        );
    }

    #[test]
    fn globals_are_typed_with_their_initializers() {
        let source = "float ratio = 2;\nfunc f(): float { return ratio * 2; }";
        let (module, messages) = check(source);
        assert!(messages.is_empty(), "{messages:?}");
        let Item::Global(decl) = &module.items[0] else {
            panic!("expected global");
        };
        assert!(matches!(
            decl.init.as_ref().map(|init| &init.kind),
            Some(ExprKind::Cast { target: Type::FLOAT, .. })
        ));
    }

    #[test]
    fn placeholders_are_internal_errors() {
        let mut ctx = CompilationContext::default();
        let file = ctx.add_source("broken.alm", "func f(): void { integer = ; }");
        let module = parse_module(&mut ctx, file);
        ctx.globals = Some(SymbolTable::new().into_globals());
        let err = check_types(module, &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
    }

    #[test]
    fn redeclaration_after_label_checking_is_an_internal_error() {
        let mut ctx = CompilationContext::default();
        let file = ctx.add_source("dup.alm", "func f(): void { integer a = 1; integer a = 2; }");
        let module = parse_module(&mut ctx, file);
        check_labels(&module, &mut ctx);
        assert_eq!(ctx.diagnostics.semantic().len(), 1);
        let err = check_types(module, &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::Internal(message) if message.contains("'a' redeclared")));
    }
}
