//! Symbol table and scope management.
//!
//! Scopes form a chain from the innermost block out to the global scope
//! (level 1). The chain is kept as a stack: entering a block pushes a
//! scope, leaving it pops and drops the scope. The global scope stays at
//! the bottom for the whole compilation unit and is shared by every
//! imported module.
//!
//! Each block gets a fresh [`BlockId`] that is never reused, so the set of
//! blocks in which a variable was assigned stays meaningful after those
//! blocks have been left.

use std::collections::BTreeSet;

use crate::builtins::builtins;
use crate::span::Span;
use crate::types::{ArgMatch, ParamType, Type};

/// Unique identifier of a lexical block.
pub type BlockId = u32;

/// Level of the global scope.
pub const GLOBAL_LEVEL: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSymbol {
    pub name: String,
    pub ty: Type,
    pub level: u32,
    /// Blocks in which the variable was the target of an assignment.
    pub assigned_in: BTreeSet<BlockId>,
    pub span: Span,
}

impl VariableSymbol {
    pub fn is_global(&self) -> bool {
        self.level == GLOBAL_LEVEL
    }

    pub fn assigned_anywhere(&self) -> bool {
        !self.assigned_in.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSymbol {
    pub name: String,
    pub ret: Type,
    pub params: Vec<ParamType>,
    /// Foreign library for `@external` declarations.
    pub external: Option<String>,
    /// `None` for builtins.
    pub span: Option<Span>,
}

impl FunctionSymbol {
    pub fn new(name: impl Into<String>, ret: Type, params: Vec<ParamType>) -> Self {
        FunctionSymbol {
            name: name.into(),
            ret,
            params,
            external: None,
            span: None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.span.is_none()
    }

    /// How well `args` fit this signature: the worst per-argument match.
    pub fn accepts(&self, args: &[Type]) -> ArgMatch {
        self.match_args(args, |param, arg| param.accepts(*arg))
    }

    /// Worst of `fit(param, arg)` over the arguments, or `Mismatch` on an
    /// arity difference.
    pub fn match_args<A>(&self, args: &[A], fit: impl Fn(ParamType, &A) -> ArgMatch) -> ArgMatch {
        if args.len() != self.params.len() {
            return ArgMatch::Mismatch;
        }
        self.params
            .iter()
            .zip(args)
            .map(|(param, arg)| fit(*param, arg))
            .max()
            .unwrap_or(ArgMatch::Exact)
    }

    /// `name(t1, t2): ret`
    pub fn describe(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        format!("{}({}): {}", self.name, params.join(", "), self.ret)
    }
}

/// One lexical block's declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub level: u32,
    pub block: BlockId,
    pub variables: Vec<VariableSymbol>,
    pub functions: Vec<FunctionSymbol>,
}

impl Scope {
    fn new(level: u32, block: BlockId) -> Self {
        Scope {
            level,
            block,
            variables: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSymbol> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn function_overloads<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a FunctionSymbol> + use<'a, 'n> {
        self.functions.iter().filter(move |f| f.name == name)
    }

    /// The designated entry point: `main(): integer` without arguments.
    pub fn entry_point(&self) -> Option<&FunctionSymbol> {
        self.functions
            .iter()
            .find(|f| f.name == "main" && f.params.is_empty() && f.ret == Type::INTEGER)
    }
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    next_block: BlockId,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table holding only the global scope, seeded with the builtins.
    pub fn new() -> Self {
        let mut global = Scope::new(GLOBAL_LEVEL, 0);
        for builtin in builtins() {
            global
                .functions
                .push(FunctionSymbol::new(builtin.name, builtin.ret, builtin.params.to_vec()));
        }
        SymbolTable {
            scopes: vec![global],
            next_block: 1,
        }
    }

    /// A table continuing from an already populated global scope.
    pub fn with_globals(global: Scope) -> Self {
        SymbolTable {
            scopes: vec![global],
            next_block: 1,
        }
    }

    pub fn level(&self) -> u32 {
        self.scopes.len() as u32
    }

    pub fn current_block(&self) -> BlockId {
        self.scopes.last().map(|s| s.block).unwrap_or_default()
    }

    pub fn push_scope(&mut self) -> BlockId {
        let block = self.next_block;
        self.next_block += 1;
        let level = self.level() + 1;
        self.scopes.push(Scope::new(level, block));
        block
    }

    /// Leave the innermost block. The global scope is never popped.
    pub fn pop_scope(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    pub fn globals(&self) -> &Scope {
        &self.scopes[0]
    }

    pub fn globals_mut(&mut self) -> &mut Scope {
        &mut self.scopes[0]
    }

    pub fn into_globals(mut self) -> Scope {
        self.scopes.swap_remove(0)
    }

    /// Declare a variable in the innermost scope.
    ///
    /// Fails with the existing symbol if the name is visible at any level.
    pub fn declare_variable(
        &mut self,
        name: &str,
        ty: Type,
        span: Span,
    ) -> Result<(), &VariableSymbol> {
        let visible = self.scopes.iter().enumerate().rev().find_map(|(depth, scope)| {
            scope
                .variables
                .iter()
                .position(|v| v.name == name)
                .map(|index| (depth, index))
        });
        if let Some((depth, index)) = visible {
            return Err(&self.scopes[depth].variables[index]);
        }
        let level = self.level();
        let innermost = self.scopes.len() - 1;
        self.scopes[innermost].variables.push(VariableSymbol {
            name: name.to_string(),
            ty,
            level,
            assigned_in: BTreeSet::new(),
            span,
        });
        Ok(())
    }

    /// Innermost visible variable named `name`.
    pub fn lookup_variable(&self, name: &str) -> Option<&VariableSymbol> {
        self.scopes.iter().rev().find_map(|scope| scope.variable(name))
    }

    fn lookup_variable_mut(&mut self, name: &str) -> Option<&mut VariableSymbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.variables.iter_mut().find(|v| v.name == name))
    }

    /// Record an assignment to `name` in the current block.
    ///
    /// Returns the level of the assigned variable, or `None` if undeclared.
    pub fn mark_assigned(&mut self, name: &str) -> Option<u32> {
        let block = self.current_block();
        let symbol = self.lookup_variable_mut(name)?;
        symbol.assigned_in.insert(block);
        Some(symbol.level)
    }

    /// True if `name` was assigned in the current block or an enclosing one.
    pub fn is_initialized(&self, name: &str) -> bool {
        let Some(symbol) = self.lookup_variable(name) else {
            return false;
        };
        if symbol.is_global() {
            return symbol.assigned_anywhere();
        }
        self.scopes
            .iter()
            .any(|scope| symbol.assigned_in.contains(&scope.block))
    }

    /// Register a function signature in the global scope.
    ///
    /// Fails with the existing symbol if a function with the same name and
    /// parameter types is already registered.
    pub fn declare_function(&mut self, function: FunctionSymbol) -> Result<(), &FunctionSymbol> {
        let global = &self.scopes[0];
        if let Some(index) = global
            .functions
            .iter()
            .position(|f| f.name == function.name && f.params == function.params)
        {
            return Err(&self.scopes[0].functions[index]);
        }
        self.scopes[0].functions.push(function);
        Ok(())
    }

    /// Every visible overload named `name`, innermost scope first.
    pub fn functions_named(&self, name: &str) -> Vec<&FunctionSymbol> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.function_overloads(name))
            .collect()
    }
}
