//! Callable values.
//!
//! A [`Value::Function`](crate::value::Value::Function) is either a
//! [`CompiledFunction`] — compiled AIR plus its captured closure — or a
//! [`HostFunction`] wrapping a Rust closure registered by the embedder. Both
//! implement [`FunctionValue`], so the engine dispatches a call the same way
//! regardless of which kind it is looking at, mirroring upstream Asteria's
//! single `Abstract_Function` call boundary.

use std::{fmt, rc::Rc};

use crate::{
    air::AirNode,
    error::RunResult,
    gc::GcId,
    global::GlobalContext,
    reference::Reference,
    value::Rstr,
};

/// Everything the engine needs to invoke a callable value.
pub trait FunctionValue: fmt::Debug {
    fn name(&self) -> &str;

    /// Number of named parameters (excludes a trailing variadic catch-all).
    fn param_count(&self) -> usize;

    fn is_variadic(&self) -> bool {
        false
    }

    /// GC trace hook: visits every variable captured by this callable's
    /// closure.
    fn collect_variables(&self, _visit: &mut dyn FnMut(GcId)) {}

    /// Invokes the callable. `self_ref` is the reference the call expression
    /// was made through (used by member-function-style calls that want to
    /// observe their receiver); `args` is the argument list, already
    /// evaluated left to right.
    fn invoke(&self, globals: &mut GlobalContext, self_ref: &Reference, args: Vec<Reference>) -> RunResult<Reference>;

    /// Lets the engine recognize a tail-called target as a [`CompiledFunction`]
    /// without a general-purpose downcast: the trampoline in
    /// `crate::engine::call_compiled` reuses its own stack frame only when it
    /// can reach the callee's AIR body directly through this.
    fn as_compiled(&self) -> Option<&CompiledFunction> {
        None
    }
}

/// A script function compiled to AIR.
///
/// `captured` holds the [`GcId`]s of every enclosing variable the function
/// body refers to, snapshotted at closure-creation time — this is what makes
/// a nested function definition a genuine closure rather than a fresh lookup
/// against whatever happens to be live when it is later called.
pub struct CompiledFunction {
    pub name: Rstr,
    pub file: Rstr,
    pub line: u32,
    pub param_names: Rc<[Rstr]>,
    pub variadic: bool,
    /// Size of the function's own local namespace (parameters plus
    /// top-level locals), used to presize the executive context.
    pub namespace_size: usize,
    pub captured: Vec<(Rstr, GcId)>,
    pub body: Rc<[AirNode]>,
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledFunction({})", self.name)
    }
}

impl FunctionValue for CompiledFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_count(&self) -> usize {
        self.param_names.len()
    }

    fn is_variadic(&self) -> bool {
        self.variadic
    }

    fn collect_variables(&self, visit: &mut dyn FnMut(GcId)) {
        for (_, id) in &self.captured {
            visit(*id);
        }
    }

    fn invoke(&self, globals: &mut GlobalContext, self_ref: &Reference, args: Vec<Reference>) -> RunResult<Reference> {
        crate::engine::call_compiled(self, globals, self_ref, args)
    }

    fn as_compiled(&self) -> Option<&CompiledFunction> {
        Some(self)
    }
}

/// The signature a host (embedder-provided) function must implement,
/// grounded on this "host function registration ABI":
/// `(self_ref, globals, arg_stack) -> void`, adapted to return the result by
/// value rather than through an out-parameter.
pub type HostHandler = dyn Fn(&mut GlobalContext, &Reference, &mut Vec<Reference>) -> RunResult<Reference>;

/// A native function registered into a [`GlobalContext`] by the embedding
/// host.
pub struct HostFunction {
    pub name: Rstr,
    pub param_count: usize,
    pub variadic: bool,
    handler: Rc<HostHandler>,
}

impl HostFunction {
    pub fn new(
        name: impl Into<Rstr>,
        param_count: usize,
        variadic: bool,
        handler: impl Fn(&mut GlobalContext, &Reference, &mut Vec<Reference>) -> RunResult<Reference> + 'static,
    ) -> Self {
        Self { name: name.into(), param_count, variadic, handler: Rc::new(handler) }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self.name)
    }
}

impl FunctionValue for HostFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_count(&self) -> usize {
        self.param_count
    }

    fn is_variadic(&self) -> bool {
        self.variadic
    }

    fn invoke(&self, globals: &mut GlobalContext, self_ref: &Reference, args: Vec<Reference>) -> RunResult<Reference> {
        let mut stack = args;
        (self.handler)(globals, self_ref, &mut stack)
    }
}
