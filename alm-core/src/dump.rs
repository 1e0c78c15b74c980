//! Indented text rendering of the annotated tree.
//!
//! [`TreeDump`] is the simplest [`Emitter`]: instead of generating code it
//! prints every node with its resolved type, which makes inserted casts
//! visible.

use std::fmt::Write;

use crate::ast::*;
use crate::compiler::{EmitUnit, Emitter};
use crate::error::CoreError;

#[derive(Debug, Default)]
pub struct TreeDump {
    out: String,
    depth: usize,
}

impl Emitter for TreeDump {
    type Output = String;

    fn emit(&mut self, unit: EmitUnit<'_>) -> Result<String, CoreError> {
        self.out.clear();
        self.depth = 0;
        self.line(format_args!("entry {}", unit.entry.describe()));
        self.module(unit.module);
        Ok(std::mem::take(&mut self.out))
    }
}

impl TreeDump {
    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        // Writing into a String cannot fail.
        let _ = self.out.write_fmt(text);
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    fn module(&mut self, module: &Module) {
        self.line(format_args!("module {}", module.path.display()));
        self.nested(|this| {
            for import in &module.imports {
                if let Some(imported) = &import.module {
                    this.module(imported);
                }
            }
            for item in &module.items {
                this.item(item);
            }
        });
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::Function(function) => {
                let params: Vec<String> = function
                    .params
                    .iter()
                    .map(|p| format!("{} {}", p.ty.ty, p.name.name))
                    .collect();
                match &function.body {
                    FuncBody::External { library } => self.line(format_args!(
                        "external \"{library}\" func {}({}): {}",
                        function.name.name,
                        params.join(", "),
                        function.ret.ty
                    )),
                    FuncBody::Block(body) => {
                        self.line(format_args!(
                            "func {}({}): {}",
                            function.name.name,
                            params.join(", "),
                            function.ret.ty
                        ));
                        self.nested(|this| this.stmts(&body.stmts));
                    }
                }
            }
            Item::Global(decl) => self.var_decl("global", decl),
            Item::Error(diag) => self.line(format_args!("error {}", diag.message)),
        }
    }

    fn var_decl(&mut self, label: &str, decl: &VarDecl) {
        self.line(format_args!("{label} {} {}", decl.ty.ty, decl.name.name));
        if let Some(init) = &decl.init {
            self.nested(|this| this.expr(init));
        }
    }

    fn block(&mut self, label: &str, block: &Block) {
        self.line(format_args!("{label}"));
        self.nested(|this| this.stmts(&block.stmts));
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl(decl) => self.var_decl("var", decl),
            StmtKind::Assign(assign) => {
                let op = match assign.op.arith() {
                    Some(op) => format!("{}=", op.symbol()),
                    None => "=".to_string(),
                };
                self.line(format_args!("assign {op}"));
                self.nested(|this| {
                    this.expr(&assign.target);
                    this.expr(&assign.value);
                });
            }
            StmtKind::Block(block) => self.block("block", block),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.line(format_args!("if"));
                self.nested(|this| {
                    this.expr(cond);
                    this.block("then", then_branch);
                    if let Some(else_branch) = else_branch {
                        this.block("else", else_branch);
                    }
                });
            }
            StmtKind::While { cond, body } => {
                self.line(format_args!("while"));
                self.nested(|this| {
                    this.expr(cond);
                    this.block("do", body);
                });
            }
            StmtKind::DoWhile { body, cond } => {
                self.line(format_args!("do-while"));
                self.nested(|this| {
                    this.block("do", body);
                    this.expr(cond);
                });
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.line(format_args!("for"));
                self.nested(|this| {
                    if let Some(init) = init {
                        this.stmt(init);
                    }
                    if let Some(cond) = cond {
                        this.expr(cond);
                    }
                    if let Some(step) = step {
                        this.stmt(step);
                    }
                    this.block("do", body);
                });
            }
            StmtKind::Return(value) => {
                self.line(format_args!("return"));
                if let Some(value) = value {
                    self.nested(|this| this.expr(value));
                }
            }
            StmtKind::Break => self.line(format_args!("break")),
            StmtKind::Continue => self.line(format_args!("continue")),
            StmtKind::Call(call) => self.expr(call),
            StmtKind::Error(diag) => self.line(format_args!("error {}", diag.message)),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        let ty = expr.ty;
        match &expr.kind {
            ExprKind::Ident { name, .. } => self.line(format_args!("{name}: {ty}")),
            ExprKind::Literal(literal) => {
                let text = match literal {
                    Literal::Int(value) => value.to_string(),
                    Literal::Real(value) => format!("{value:?}"),
                    Literal::Bool(value) => value.to_string(),
                    Literal::Char(value) => format!("{value:?}"),
                    Literal::Str(value) => format!("{value:?}"),
                };
                self.line(format_args!("{text}: {ty}"));
            }
            ExprKind::ArrayInstance { sizes, .. } => {
                self.line(format_args!("new: {ty}"));
                self.nested(|this| sizes.iter().for_each(|size| this.expr(size)));
            }
            ExprKind::ArrayElement { array, indices } => {
                self.line(format_args!("index: {ty}"));
                self.nested(|this| {
                    this.expr(array);
                    indices.iter().for_each(|index| this.expr(index));
                });
            }
            ExprKind::ArithUnary { op, operand } => {
                let symbol = match op {
                    ArithUnaryOp::Neg => "-",
                    ArithUnaryOp::BitNot => "~",
                };
                self.line(format_args!("{symbol}: {ty}"));
                self.nested(|this| this.expr(operand));
            }
            ExprKind::Not(operand) => {
                self.line(format_args!("!: {ty}"));
                self.nested(|this| this.expr(operand));
            }
            ExprKind::ArithBinary { op, lhs, rhs } => {
                self.line(format_args!("{}: {ty}", op.symbol()));
                self.nested(|this| {
                    this.expr(lhs);
                    this.expr(rhs);
                });
            }
            ExprKind::BoolBinary { op, lhs, rhs } => {
                self.line(format_args!("{}: {ty}", op.symbol()));
                self.nested(|this| {
                    this.expr(lhs);
                    this.expr(rhs);
                });
            }
            ExprKind::Call { callee, args } => {
                self.line(format_args!("call {}: {ty}", callee.name));
                self.nested(|this| args.iter().for_each(|arg| this.expr(arg)));
            }
            ExprKind::Cast { target, expr } => {
                self.line(format_args!("cast {target}"));
                self.nested(|this| this.expr(expr));
            }
        }
    }
}
