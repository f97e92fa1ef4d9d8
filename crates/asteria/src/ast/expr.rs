//! Expressions, stored as a flat reverse-Polish sequence of [`Xpnode`]s.
//!
//! Mirrors upstream Asteria's `Expression_Unit`: rather than
//! a recursive tree, an expression is a `Vec<Xpnode>` that an iterative
//! evaluator (or, here, the AIR compiler) walks left to right using a small
//! operand stack. This keeps deeply nested expressions from recursing the
//! Rust call stack during parsing or lowering.

use crate::{error::SourceLoc, lexer::token::Punct, value::Rstr};

use super::stmt::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    Lengthof,
    Typeof,
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Cmp3,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    LogicAnd,
    LogicOr,
    Coalesce,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    CoalesceAssign,
}

impl BinaryOp {
    /// The plain operator a compound-assignment form reduces to when the
    /// engine computes `lhs <op> rhs` before storing back into `lhs`.
    /// `None` for `=` (store only) and for ops that are never compound.
    #[must_use]
    pub fn compound_base(self) -> Option<Self> {
        match self {
            Self::AddAssign => Some(Self::Add),
            Self::SubAssign => Some(Self::Sub),
            Self::MulAssign => Some(Self::Mul),
            Self::DivAssign => Some(Self::Div),
            Self::ModAssign => Some(Self::Mod),
            Self::AndAssign => Some(Self::BitAnd),
            Self::OrAssign => Some(Self::BitOr),
            Self::XorAssign => Some(Self::BitXor),
            Self::ShlAssign => Some(Self::Shl),
            Self::ShrAssign => Some(Self::Shr),
            Self::CoalesceAssign => Some(Self::Coalesce),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            Self::Assign
                | Self::AddAssign
                | Self::SubAssign
                | Self::MulAssign
                | Self::DivAssign
                | Self::ModAssign
                | Self::AndAssign
                | Self::OrAssign
                | Self::XorAssign
                | Self::ShlAssign
                | Self::ShrAssign
                | Self::CoalesceAssign
        )
    }

    #[must_use]
    pub fn from_punct(p: Punct) -> Option<Self> {
        Some(match p {
            Punct::Add => Self::Add,
            Punct::Sub => Self::Sub,
            Punct::Mul => Self::Mul,
            Punct::Div => Self::Div,
            Punct::Mod => Self::Mod,
            Punct::Eq => Self::Eq,
            Punct::Ne => Self::Ne,
            Punct::Lt => Self::Lt,
            Punct::Gt => Self::Gt,
            Punct::Le => Self::Le,
            Punct::Ge => Self::Ge,
            Punct::Spaceship => Self::Cmp3,
            Punct::BitAnd => Self::BitAnd,
            Punct::BitOr => Self::BitOr,
            Punct::BitXor => Self::BitXor,
            Punct::Shl => Self::Shl,
            Punct::Shr => Self::Shr,
            Punct::Coalesce => Self::Coalesce,
            Punct::Assign => Self::Assign,
            Punct::AddAssign => Self::AddAssign,
            Punct::SubAssign => Self::SubAssign,
            Punct::MulAssign => Self::MulAssign,
            Punct::DivAssign => Self::DivAssign,
            Punct::ModAssign => Self::ModAssign,
            Punct::AndAssign => Self::AndAssign,
            Punct::OrAssign => Self::OrAssign,
            Punct::XorAssign => Self::XorAssign,
            Punct::ShlAssign => Self::ShlAssign,
            Punct::ShrAssign => Self::ShrAssign,
            Punct::CoalesceAssign => Self::CoalesceAssign,
            _ => return None,
        })
    }
}

/// A wrapping/saturating arithmetic intrinsic (`__addm`, `__subs`, ...):
/// unlike `+`/`-`/`*`, these never throw on 64-bit signed overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapOp {
    AddWrap,
    SubWrap,
    MulWrap,
    AddSat,
    SubSat,
    MulSat,
}

/// Modifiers applied to an lvalue/rvalue base during expression evaluation,
/// lowered directly to [`crate::reference::Modifier`] by the AIR compiler.
#[derive(Debug, Clone)]
pub enum SubscriptKind {
    Index,
    Key(Rstr),
    Head,
    Tail,
    Random(u32),
}

/// A single RPN unit. An expression is `Vec<Xpnode>`; evaluating it left to
/// right with a small value/reference operand stack reproduces the original
/// tree's semantics without ever recursing per-subexpression.
#[derive(Debug, Clone)]
pub enum Xpnode {
    Literal(Literal),
    /// A bare identifier, resolved against the analytic context at compile
    /// time to a local slot, a captured closure slot, or a global lookup.
    Named(Rstr, SourceLoc),
    Unary(UnaryOp, SourceLoc),
    Binary(BinaryOp, SourceLoc),
    /// Pops 3 operands: condition, true-branch count marker, false-branch.
    /// Branch bodies are themselves sub-expressions (`Vec<Xpnode>`), kept
    /// nested here rather than flattened so short-circuiting is trivial for
    /// the AIR compiler to lower as a conditional jump.
    Conditional { then_branch: Box<[Xpnode]>, else_branch: Box<[Xpnode]>, loc: SourceLoc },
    Subscript(SubscriptKind, SourceLoc),
    /// `f(a, b, ...)`. Argument sub-expressions are evaluated left to right
    /// immediately before this unit executes.
    FunctionCall { arg_count: usize, loc: SourceLoc },
    /// An array literal; the `len` preceding elements were just pushed.
    ArrayLiteral { len: usize },
    /// An object literal; `len` key/value pairs, keys are compile-time
    /// constant strings supplied directly rather than via the stack.
    ObjectLiteral { keys: Box<[Rstr]> },
    /// An anonymous function expression.
    Closure(Box<FunctionExpr>),
    /// `catch (expr)`: evaluates `expr`, swallowing any exception and
    /// producing the exception's message string, or `null` on success.
    Catch(Box<[Xpnode]>),
    /// Variadic argument pack expansion inside a call argument list.
    Spread(Box<[Xpnode]>),
    /// `__fma(a, b, c)`: fused multiply-add, computed at `f64` precision
    /// regardless of its arguments' types and rounded once.
    Fma(SourceLoc),
    /// `__addm`/`__subm`/`__mulm`/`__adds`/`__subs`/`__muls`: wrapping or
    /// saturating integer arithmetic that never throws on overflow.
    WrapBinary(WrapOp, SourceLoc),
    /// `__vcall(target, args)`: calls `target` with the elements of the
    /// array `args` as its argument list.
    VariadicCall(SourceLoc),
}

#[derive(Debug, Clone)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(Rstr),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Rstr,
    pub loc: SourceLoc,
}

/// An anonymous or named function definition.
#[derive(Debug, Clone)]
pub struct FunctionExpr {
    pub name: Rstr,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub body: Block,
    pub loc: SourceLoc,
}

pub type Expr = Vec<Xpnode>;
