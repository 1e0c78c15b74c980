//! Syntax tree for ALM.
//!
//! The tree is a strict ownership hierarchy: every node owns its children.
//! Passes that need to know about enclosing constructs (scopes, loops,
//! the current function) carry that information down while walking
//! instead of following parent pointers.
//!
//! Every expression has a `ty` slot, `Type::Undefined` after parsing and
//! filled in by the type checker.

use std::path::PathBuf;

use crate::diagnostic::Diagnostic;
use crate::span::{FileId, Span};
use crate::types::{Primitive, Type};

/// Root of one parsed file, with the roots of its imports spliced in.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub file: FileId,
    pub path: PathBuf,
    pub imports: Vec<Import>,
    pub items: Vec<Item>,
    pub span: Span,
}

impl Module {
    /// This module and all transitively imported modules, imports first.
    pub fn modules(&self) -> Vec<&Module> {
        let mut out = Vec::new();
        self.collect_modules(&mut out);
        out
    }

    fn collect_modules<'a>(&'a self, out: &mut Vec<&'a Module>) {
        for import in &self.imports {
            if let Some(module) = &import.module {
                module.collect_modules(out);
            }
        }
        out.push(self);
    }

    pub fn functions(&self) -> impl Iterator<Item = &FuncDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(func) => Some(func),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// `import "path/to/file.alm";`
    Path(String),
    /// `import math;` resolved against the library directory.
    Library(String),
}

/// One entry of an import statement.
///
/// `module` is `None` when the import was rejected or skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub target: ImportTarget,
    pub span: Span,
    pub module: Option<Box<Module>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(FuncDecl),
    Global(VarDecl),
    /// A top-level declaration that failed to parse.
    Error(Diagnostic),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// A written type, e.g. `integer` or `float[,]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef {
    pub ty: Type,
    pub span: Span,
}

/// Argument declaration in a function header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ty: TypeRef,
    pub name: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: TypeRef,
    pub body: FuncBody,
    pub span: Span,
}

impl FuncDecl {
    pub fn is_external(&self) -> bool {
        matches!(self.body, FuncBody::External { .. })
    }

    pub fn param_types(&self) -> Vec<Type> {
        self.params.iter().map(|p| p.ty.ty).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FuncBody {
    Block(Block),
    /// `@external "library" func ...;` bound to a foreign library.
    External { library: String },
}

/// A sequence of statements.
///
/// `simple` marks the brace-less single-statement form allowed after
/// `if`, `else`, `while`, `do` and `for`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub simple: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    VarDecl(VarDecl),
    Assign(Assign),
    Block(Block),
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    DoWhile {
        body: Block,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Block,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    /// A call evaluated for its side effects.
    Call(Expr),
    /// A statement that failed to parse.
    Error(Diagnostic),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub ty: TypeRef,
    pub name: Ident,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    /// An identifier use or an array element.
    pub target: Expr,
    pub op: AssignOp,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment applies.
    pub fn arith(self) -> Option<ArithOp> {
        let op = match self {
            AssignOp::Set => return None,
            AssignOp::Add => ArithOp::Add,
            AssignOp::Sub => ArithOp::Sub,
            AssignOp::Mul => ArithOp::Mul,
            AssignOp::Div => ArithOp::Div,
            AssignOp::IntDiv => ArithOp::IntDiv,
            AssignOp::BitAnd => ArithOp::BitAnd,
            AssignOp::BitOr => ArithOp::BitOr,
            AssignOp::BitXor => ArithOp::BitXor,
            AssignOp::Shl => ArithOp::Shl,
            AssignOp::Shr => ArithOp::Shr,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Type,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            span,
            ty: Type::Undefined,
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = ty;
        self
    }

    /// The identifier name for `Ident` and `ArrayElement` nodes.
    pub fn target_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident { name, .. } => Some(name),
            ExprKind::ArrayElement { array, .. } => array.target_name(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Real(f32),
    Bool(bool),
    Char(char),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident {
        name: String,
    },
    Literal(Literal),
    /// `new integer[n, m]`
    ArrayInstance {
        element: Primitive,
        sizes: Vec<Expr>,
    },
    /// `a[i, j]`
    ArrayElement {
        array: Box<Expr>,
        indices: Vec<Expr>,
    },
    ArithUnary {
        op: ArithUnaryOp,
        operand: Box<Expr>,
    },
    /// `!operand`
    Not(Box<Expr>),
    ArithBinary {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    BoolBinary {
        op: BoolOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    /// Implicit widening inserted by the type checker.
    Cast {
        target: Type,
        expr: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithUnaryOp {
    Neg,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// `/`, always real division.
    Div,
    /// `%`, always integer division.
    IntDiv,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::IntDiv => "%",
            ArithOp::Pow => "**",
            ArithOp::BitAnd => "&",
            ArithOp::BitOr => "|",
            ArithOp::BitXor => "^",
            ArithOp::Shl => "<<",
            ArithOp::Shr => ">>",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor | ArithOp::Shl | ArithOp::Shr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    Or,
    Xor,
    And,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl BoolOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BoolOp::Or => "||",
            BoolOp::Xor => "^^",
            BoolOp::And => "&&",
            BoolOp::Eq => "==",
            BoolOp::NotEq => "!=",
            BoolOp::Less => "<",
            BoolOp::LessEq => "<=",
            BoolOp::Greater => ">",
            BoolOp::GreaterEq => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BoolOp::Eq | BoolOp::NotEq)
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            BoolOp::Less | BoolOp::LessEq | BoolOp::Greater | BoolOp::GreaterEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BoolOp::Or | BoolOp::Xor | BoolOp::And)
    }
}
