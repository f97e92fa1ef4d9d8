//! Statements.

use crate::error::SourceLoc;
use crate::value::Rstr;

use super::expr::{Expr, FunctionExpr};

/// A binding pattern on the left of `var`/`const`
/// bindings": `var x`, `var [x, y, z]`, or `var {a, b}`.
#[derive(Debug, Clone)]
pub enum BindingPattern {
    Simple(Rstr),
    Array(Vec<BindingPattern>),
    Object(Vec<(Rstr, BindingPattern)>),
}

#[derive(Debug, Clone)]
pub struct VarBinding {
    pub pattern: BindingPattern,
    pub init: Option<Expr>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub name: Rstr,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct SwitchArm {
    /// `None` marks the `default:` arm.
    pub label: Option<Expr>,
    pub body: Vec<Stmt>,
}

pub type Block = Vec<Stmt>;

/// One statement. Each form maps to an AIR-level construct the
/// same way upstream Asteria maps `Statement` to `AIR_Node`: a
/// handful of node kinds (`push_literal`, `jump_if`, `function_call`, ...)
/// compose every surface-level statement form.
#[derive(Debug, Clone)]
pub enum Stmt {
    VarDecl { immutable: bool, bindings: Vec<VarBinding> },
    FuncDecl { func: FunctionExpr },
    Expr(Expr),
    Block(Block),
    If { condition: Expr, then_branch: Block, else_branch: Option<Block>, loc: SourceLoc },
    Switch { subject: Expr, arms: Vec<SwitchArm>, loc: SourceLoc },
    While { condition: Expr, body: Block, loc: SourceLoc },
    DoWhile { body: Block, condition: Expr, loc: SourceLoc },
    For { init: Box<Option<Stmt>>, condition: Option<Expr>, step: Option<Expr>, body: Block, loc: SourceLoc },
    ForEach { key_name: Option<Rstr>, value_name: Rstr, range: Expr, body: Block, loc: SourceLoc },
    Try { body: Block, catch: CatchClause, loc: SourceLoc },
    Defer { body: Block, loc: SourceLoc },
    Break { loc: SourceLoc },
    Continue { loc: SourceLoc },
    Return { value: Option<Expr>, loc: SourceLoc },
    Throw { value: Expr, loc: SourceLoc },
    Assert { condition: Expr, message: Option<Expr>, loc: SourceLoc },
}
