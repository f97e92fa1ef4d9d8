//! The abstract syntax tree produced by the parser.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, FunctionExpr, Literal, Param, SubscriptKind, UnaryOp, WrapOp, Xpnode};
pub use stmt::{Block, BindingPattern, CatchClause, Stmt, SwitchArm, VarBinding};
