//! Scope and initialization checking.
//!
//! Runs in two passes over the entry module and every spliced import:
//!
//! 1. Register every function signature, then every global variable, in
//!    the global scope, so calls may refer to functions declared later or
//!    in other modules.
//! 2. Walk each function body with a fresh scope per block, resolving
//!    identifiers, tracking in which blocks each variable has been assigned,
//!    and checking `break`/`continue` placement and return completeness.
//!
//! A local may be read only if it was assigned in the current block or in
//! an enclosing block of the same function. Globals only need to be
//! assigned somewhere in the unit; because functions are checked one after
//! another, reads of unassigned globals are collected and reported once
//! pass 2 is over.

use crate::ast::*;
use crate::context::CompilationContext;
use crate::span::Span;
use crate::symbols::{FunctionSymbol, SymbolTable};
use crate::types::{ParamType, Type};

/// Check `module` and store the populated global scope in `ctx.globals`.
pub fn check_labels(module: &Module, ctx: &mut CompilationContext) {
    let mut checker = LabelChecker {
        ctx,
        table: SymbolTable::new(),
        loop_depth: 0,
        pending_global_reads: Vec::new(),
    };
    let modules = module.modules();
    checker.register_functions(&modules);
    checker.register_globals(&modules);
    for module in &modules {
        for function in module.functions() {
            checker.check_function(function);
        }
    }
    checker.report_pending_global_reads();

    let globals = checker.table.into_globals();
    tracing::debug!(
        functions = globals.functions.len(),
        variables = globals.variables.len(),
        "label checking finished"
    );
    ctx.globals = Some(globals);
}

struct LabelChecker<'a> {
    ctx: &'a mut CompilationContext,
    table: SymbolTable,
    loop_depth: u32,
    pending_global_reads: Vec<(String, Span)>,
}

impl<'a> LabelChecker<'a> {
    fn error(&mut self, message: String, span: Span) {
        self.ctx.diagnostics.semantic_error(message, span);
    }

    // ------------------------------------------------------------------
    // Pass 1
    // ------------------------------------------------------------------

    fn register_functions(&mut self, modules: &[&Module]) {
        for module in modules {
            for function in module.functions() {
                let symbol = FunctionSymbol {
                    name: function.name.name.clone(),
                    ret: function.ret.ty,
                    params: function
                        .params
                        .iter()
                        .map(|p| ParamType::Exact(p.ty.ty))
                        .collect(),
                    external: match &function.body {
                        FuncBody::External { library } => Some(library.clone()),
                        FuncBody::Block(_) => None,
                    },
                    span: Some(function.name.span),
                };
                let described = symbol.describe();
                if self.table.declare_function(symbol).is_err() {
                    self.error(
                        format!("function '{described}' is already declared"),
                        function.name.span,
                    );
                }
            }
        }
    }

    fn register_globals(&mut self, modules: &[&Module]) {
        for module in modules {
            for item in &module.items {
                if let Item::Global(decl) = item {
                    self.declare(decl);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 2
    // ------------------------------------------------------------------

    fn check_function(&mut self, function: &FuncDecl) {
        let FuncBody::Block(body) = &function.body else {
            return;
        };

        self.table.push_scope();
        for param in &function.params {
            self.declare_name(&param.name, param.ty.ty);
            self.table.mark_assigned(&param.name.name);
        }
        self.loop_depth = 0;
        self.check_stmts(&body.stmts);
        self.table.pop_scope();

        if !function.ret.ty.is_void() && !block_returns(body) {
            self.error(
                format!(
                    "not all code paths in function '{}' return a value",
                    function.name.name
                ),
                function.name.span,
            );
        }
    }

    /// Check `block` in a scope of its own.
    fn check_block(&mut self, block: &Block) {
        self.table.push_scope();
        self.check_stmts(&block.stmts);
        self.table.pop_scope();
    }

    fn check_loop_body(&mut self, block: &Block) {
        self.loop_depth += 1;
        self.check_block(block);
        self.loop_depth -= 1;
    }

    fn check_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl(decl) => self.declare(decl),
            StmtKind::Assign(assign) => self.check_assign(assign),
            StmtKind::Block(block) => self.check_block(block),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond);
                self.check_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_block(else_branch);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_expr(cond);
                self.check_loop_body(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.check_loop_body(body);
                self.check_expr(cond);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.table.push_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_expr(cond);
                }
                self.check_loop_body(body);
                if let Some(step) = step {
                    self.check_stmt(step);
                }
                self.table.pop_scope();
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }
            StmtKind::Break => self.check_jump("break", stmt.span),
            StmtKind::Continue => self.check_jump("continue", stmt.span),
            StmtKind::Call(call) => self.check_expr(call),
            StmtKind::Error(_) => {}
        }
    }

    fn check_jump(&mut self, keyword: &str, span: Span) {
        if self.loop_depth == 0 {
            self.error(format!("'{keyword}' is only allowed inside a loop"), span);
        }
    }

    /// Check the initializer, then declare the variable in the current scope.
    fn declare(&mut self, decl: &VarDecl) {
        if let Some(init) = &decl.init {
            self.check_expr(init);
        }
        if self.declare_name(&decl.name, decl.ty.ty) && decl.init.is_some() {
            self.table.mark_assigned(&decl.name.name);
        }
    }

    fn declare_name(&mut self, name: &Ident, ty: Type) -> bool {
        if self.table.declare_variable(&name.name, ty, name.span).is_err() {
            self.error(format!("'{}' is already declared", name.name), name.span);
            return false;
        }
        true
    }

    fn check_assign(&mut self, assign: &Assign) {
        self.check_expr(&assign.value);
        match &assign.target.kind {
            ExprKind::Ident { name, .. } => {
                if self.table.lookup_variable(name).is_none() {
                    self.error(format!("'{name}' is not declared"), assign.target.span);
                    return;
                }
                if assign.op != AssignOp::Set {
                    self.check_read(name, assign.target.span);
                }
                self.table.mark_assigned(name);
            }
            _ => self.check_expr(&assign.target),
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident { name, .. } => {
                if self.table.lookup_variable(name).is_none() {
                    self.error(format!("'{name}' is not declared"), expr.span);
                } else {
                    self.check_read(name, expr.span);
                }
            }
            ExprKind::Literal(_) => {}
            ExprKind::ArrayInstance { sizes, .. } => {
                for size in sizes {
                    self.check_expr(size);
                }
            }
            ExprKind::ArrayElement { array, indices } => {
                self.check_expr(array);
                for index in indices {
                    self.check_expr(index);
                }
            }
            ExprKind::ArithUnary { operand, .. } | ExprKind::Not(operand) => self.check_expr(operand),
            ExprKind::ArithBinary { lhs, rhs, .. } | ExprKind::BoolBinary { lhs, rhs, .. } => {
                self.check_expr(lhs);
                self.check_expr(rhs);
            }
            ExprKind::Call { callee, args } => {
                if self.table.functions_named(&callee.name).is_empty() {
                    self.error(format!("function '{}' is not declared", callee.name), callee.span);
                }
                for arg in args {
                    self.check_expr(arg);
                }
            }
            ExprKind::Cast { expr, .. } => self.check_expr(expr),
        }
    }

    /// `name` is declared; check that reading it here is legal.
    fn check_read(&mut self, name: &str, span: Span) {
        if self.table.is_initialized(name) {
            return;
        }
        let is_global = self
            .table
            .lookup_variable(name)
            .is_some_and(|symbol| symbol.is_global());
        if is_global {
            self.pending_global_reads.push((name.to_string(), span));
        } else {
            self.error(format!("'{name}' is not initialized"), span);
        }
    }

    fn report_pending_global_reads(&mut self) {
        let pending = std::mem::take(&mut self.pending_global_reads);
        for (name, span) in pending {
            let assigned = self
                .table
                .globals()
                .variable(&name)
                .is_some_and(|symbol| symbol.assigned_anywhere());
            if !assigned {
                self.error(format!("'{name}' is not initialized"), span);
            }
        }
    }
}

/// True if every path through `block` ends in a `return`.
///
/// A block qualifies if it contains a `return` directly, or ends in an
/// `if` whose branches both qualify, or ends in a nested block that does.
pub fn block_returns(block: &Block) -> bool {
    if block
        .stmts
        .iter()
        .any(|stmt| matches!(stmt.kind, StmtKind::Return(_)))
    {
        return true;
    }
    match block.stmts.last().map(|stmt| &stmt.kind) {
        Some(StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        }) => block_returns(then_branch) && block_returns(else_branch),
        Some(StmtKind::Block(inner)) => block_returns(inner),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    fn check(source: &str) -> (CompilationContext, Vec<String>) {
        let mut ctx = CompilationContext::default();
        let file = ctx.add_source("test.alm", source);
        let module = parse_module(&mut ctx, file);
        assert!(!ctx.diagnostics.has_syntax_errors(), "{:?}", ctx.diagnostics);
        check_labels(&module, &mut ctx);
        let messages = ctx.diagnostics.semantic().iter().map(|d| d.message.clone()).collect();
        (ctx, messages)
    }

    #[test]
    fn redeclaration_is_reported_once_and_keeps_the_first() {
        let (ctx, messages) = check("func f(): void { integer a; string a; a = 1; }");
        assert_eq!(messages, ["'a' is already declared"]);
        assert!(ctx.globals.is_some());
    }

    #[test]
    fn reading_before_assignment_is_an_error() {
        let (_, messages) = check("func f(): integer { integer a; return a; }");
        assert_eq!(messages, ["'a' is not initialized"]);

        let (_, messages) = check("func f(): integer { integer a; a = 1; return a; }");
        assert!(messages.is_empty(), "{messages:?}");
    }

    #[test]
    fn assignment_in_a_nested_block_does_not_leak_out() {
        let source = r#"
func f(boolean c): integer {
    integer a;
    if (c) { a = 1; } else { a = 2; }
    return a;
}
"#;
        let (_, messages) = check(source);
        assert_eq!(messages, ["'a' is not initialized"]);
    }

    #[test]
    fn assignment_in_an_enclosing_block_is_visible_inside() {
        let source = r#"
func f(boolean c): integer {
    integer a = 0;
    while (c) { integer b; b = a; a = b; }
    return a;
}
"#;
        let (_, messages) = check(source);
        assert!(messages.is_empty(), "{messages:?}");
    }

    #[test]
    fn reports_undeclared_identifiers_and_functions() {
        let (_, messages) = check("func f(): void { x = 1; print(y); missing(); }");
        assert_eq!(
            messages,
            [
                "'x' is not declared",
                "'y' is not declared",
                "function 'missing' is not declared"
            ]
        );
    }

    #[test]
    fn compound_assignment_reads_its_target() {
        let (_, messages) = check("func f(): void { integer a; a += 1; }");
        assert_eq!(messages, ["'a' is not initialized"]);
    }

    #[test]
    fn jumps_must_be_inside_loops() {
        let source = r#"
func f(): void {
    break;
    while (true) { if (true) continue; break; }
    for (;;) { break; }
    do { continue; } while (false);
    continue;
}
"#;
        let (_, messages) = check(source);
        assert_eq!(
            messages,
            [
                "'break' is only allowed inside a loop",
                "'continue' is only allowed inside a loop"
            ]
        );
    }

    #[test]
    fn for_initializer_is_scoped_to_the_loop() {
        let source = r#"
func f(): integer {
    for (integer i = 0; i < 3; i += 1) { print(i); }
    return i;
}
"#;
        let (_, messages) = check(source);
        assert_eq!(messages, ["'i' is not declared"]);
    }

    #[test]
    fn return_completeness_requires_both_branches() {
        let (_, messages) = check("func f(boolean c): integer { if (c) { return 1; } }");
        assert_eq!(messages, ["not all code paths in function 'f' return a value"]);

        let (_, messages) =
            check("func f(boolean c): integer { if (c) { return 1; } else { return 2; } }");
        assert!(messages.is_empty(), "{messages:?}");

        let (_, messages) = check("func f(): void { }");
        assert!(messages.is_empty());
    }

    #[test]
    fn functions_resolve_regardless_of_declaration_order() {
        let source = r#"
func a(): integer { return b(); }
func b(): integer { return a(); }
"#;
        let (_, messages) = check(source);
        assert!(messages.is_empty(), "{messages:?}");
    }

    #[test]
    fn duplicate_signatures_are_reported() {
        let source = r#"
func f(integer x): void { }
func f(integer y): void { }
func f(float x): void { }
"#;
        let (ctx, messages) = check(source);
        assert_eq!(messages, ["function 'f(integer): void' is already declared"]);
        let globals = ctx.globals.expect("globals");
        assert_eq!(globals.function_overloads("f").count(), 2);
    }

    #[test]
    fn externals_are_registered_without_body_checks() {
        let source = r#"
@external "libm" func cbrt(float x): float;
func f(): float { return cbrt(8.0); }
"#;
        let (ctx, messages) = check(source);
        assert!(messages.is_empty(), "{messages:?}");
        let globals = ctx.globals.expect("globals");
        let cbrt = globals.function_overloads("cbrt").next().expect("cbrt");
        assert_eq!(cbrt.external.as_deref(), Some("libm"));
    }

    #[test]
    fn globals_need_an_assignment_somewhere() {
        let source = r#"
integer counter;
integer limit = 10;
string never;
func read(): integer { return counter + limit; }
func bump(): void { counter = 1; }
func show(): string { return never; }
"#;
        let (_, messages) = check(source);
        assert_eq!(messages, ["'never' is not initialized"]);
    }

    #[test]
    fn shadowing_a_parameter_is_a_redeclaration() {
        let (_, messages) = check("func f(integer a): void { integer a = 2; }");
        assert_eq!(messages, ["'a' is already declared"]);
    }
}
