//! Compiled intermediate nodes.
//!
//! Mirrors upstream Asteria's `AIR_Node`: rather than a flat
//! byte-offset bytecode, a compiled function body is a small tree of nodes
//! where control-flow forms (`If`, `While`, `Try`, ...) hold their branches
//! as nested, reference-counted node slices. The engine walks this tree
//! directly; there is no separate "linking" pass that resolves jump
//! offsets.

use std::rc::Rc;

use crate::{
    ast::{BinaryOp, UnaryOp, WrapOp},
    error::SourceLoc,
    value::{Rstr, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuitKind {
    And,
    Or,
    Coalesce,
}

/// Where a closure's captured variable is fetched from in the *enclosing*
/// activation at the moment the closure is created.
#[derive(Debug, Clone, Copy)]
pub enum CaptureSource {
    Local(usize),
    Captured(usize),
}

/// Everything needed to instantiate a [`crate::function::CompiledFunction`]
/// when its defining `func` expression or statement executes.
#[derive(Debug)]
pub struct ClosureTemplate {
    pub name: Rstr,
    pub file: Rstr,
    pub line: u32,
    pub param_names: Rc<[Rstr]>,
    pub variadic: bool,
    pub namespace_size: usize,
    pub captures: Vec<(Rstr, CaptureSource)>,
    pub body: Rc<[AirNode]>,
}

#[derive(Debug)]
pub struct SwitchArmAir {
    /// `None` marks the `default:` arm.
    pub label: Option<Rc<[AirNode]>>,
    pub body: Rc<[AirNode]>,
}

/// A single compiled node. Statement-shaped variants (`If`, `While`, ...)
/// are executed for effect; expression-shaped variants push exactly one
/// [`crate::reference::Reference`] onto the evaluation stack.
#[derive(Debug)]
pub enum AirNode {
    // -- statements --------------------------------------------------
    Eval(Rc<[AirNode]>),
    DeclareLocal { slot: usize, immutable: bool, init: Option<Rc<[AirNode]>>, loc: SourceLoc },
    Block(Rc<[AirNode]>),
    If { cond: Rc<[AirNode]>, then_branch: Rc<[AirNode]>, else_branch: Rc<[AirNode]> },
    Switch { subject: Rc<[AirNode]>, arms: Vec<SwitchArmAir> },
    While { cond: Rc<[AirNode]>, body: Rc<[AirNode]> },
    DoWhile { body: Rc<[AirNode]>, cond: Rc<[AirNode]> },
    For { init: Rc<[AirNode]>, cond: Option<Rc<[AirNode]>>, step: Rc<[AirNode]>, body: Rc<[AirNode]> },
    ForEach { key_slot: Option<usize>, value_slot: usize, range: Rc<[AirNode]>, body: Rc<[AirNode]>, loc: SourceLoc },
    Try { body: Rc<[AirNode]>, catch_slot: usize, catch_body: Rc<[AirNode]>, loc: SourceLoc },
    Defer { body: Rc<[AirNode]>, loc: SourceLoc },
    Break,
    Continue,
    Return { value: Option<Rc<[AirNode]>> },
    /// A `return` whose value is a bare function call: the engine reuses the
    /// current frame instead of recursing the native call stack.
    TailCall { value: Rc<[AirNode]> },
    /// A `return` whose value is an and/or/coalescence expression with a call
    /// in tail position on the right-hand side (`return a && f();`). `lhs` is
    /// evaluated exactly once; `rhs` is a one-node statement sequence
    /// (`TailCall`/`Return`/a further `If`/`TailShortCircuit`) run only when
    /// the short circuit doesn't stop at `lhs`.
    TailShortCircuit { kind: ShortCircuitKind, lhs: Rc<[AirNode]>, rhs: Rc<[AirNode]> },
    Throw { value: Rc<[AirNode]>, loc: SourceLoc },
    Assert { cond: Rc<[AirNode]>, message: Option<Rc<[AirNode]>>, loc: SourceLoc },

    // -- expressions ---------------------------------------------------
    PushLiteral(Value),
    PushLocal(usize),
    PushCaptured(usize),
    PushGlobal(Rstr, SourceLoc),
    ApplyIndex(SourceLoc),
    ApplyKey(Rstr),
    ApplyHead,
    ApplyTail,
    ApplyRandom(SourceLoc),
    Unary(UnaryOp, SourceLoc),
    Binary(BinaryOp, SourceLoc),
    Assign(SourceLoc),
    CompoundAssign(BinaryOp, SourceLoc),
    ShortCircuit { kind: ShortCircuitKind, lhs: Rc<[AirNode]>, rhs: Rc<[AirNode]> },
    Conditional { cond: Rc<[AirNode]>, then_branch: Rc<[AirNode]>, else_branch: Rc<[AirNode]> },
    /// Each element is its own sub-program so that a `...expr` spread
    /// element can contribute a variable number of values at runtime
    /// while plain elements always
    /// contribute exactly one.
    MakeArray(Vec<Rc<[AirNode]>>),
    MakeObject { keys: Box<[Rstr]>, values: Vec<Rc<[AirNode]>> },
    MakeClosure(Rc<ClosureTemplate>),
    Call { callee: Rc<[AirNode]>, args: Vec<Rc<[AirNode]>>, loc: SourceLoc },
    CatchExpr(Rc<[AirNode]>),
    /// `...expr`: at runtime, evaluates `expr` (expected to be an array)
    /// and contributes each element as a separate value rather than the
    /// array itself.
    Spread(Rc<[AirNode]>),
    /// `__fma(a, b, c)`. Pops 3 operands (`a`, `b`, `c` in that order),
    /// pushes one.
    Fma(SourceLoc),
    /// `__addm`/`__subm`/`__mulm`/`__adds`/`__subs`/`__muls`. Pops 2
    /// operands (`lhs`, `rhs`), pushes one.
    WrapBinary(WrapOp, SourceLoc),
    /// `__vcall(target, args)`. Pops 2 operands (`target`, `args`),
    /// pushes the call's result.
    VariadicCall(SourceLoc),
}
