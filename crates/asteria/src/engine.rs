//! The AIR executor.
//!
//! Walks a compiled function body against three pieces of runtime state:
//! an [`ExecutiveContext`] (the current activation's locals/captures/defer
//! list), a [`GlobalContext`] (heap, globals, PRNG), and an [`EvalStack`]
//! (the scratch stack every expression-shaped [`AirNode`] pushes its result
//! onto). Statement-shaped nodes additionally thread a [`Signal`] that
//! carries `break`/`continue`/`return`/tail-call intent out through nested
//! blocks, mirroring how upstream Asteria's `AIR_Status`
//! propagates out of a `Vector<AIR_Node>` branch.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    air::node::{AirNode, CaptureSource, ShortCircuitKind},
    ast::{BinaryOp, UnaryOp, WrapOp},
    context::ExecutiveContext,
    error::{Exception, FrameKind, RunResult, SourceLoc},
    function::{CompiledFunction, FunctionValue},
    gc::{GcId, Variable},
    global::GlobalContext,
    reference::{Modifier, Reference},
    stack::EvalStack,
    value::{Compare, Value},
};

/// What a statement-shaped node handed back to its caller
/// control-flow forms.
pub enum Signal {
    Normal,
    Break,
    Continue,
    Return(Reference),
    /// A `return` of a bare call resolved to its callee and already-evaluated
    /// arguments, for [`call_compiled`]'s trampoline to pick up without
    /// recursing. The trailing `Reference` is the callee reference the call
    /// was made through, carried along so the next activation can still bind
    /// `__this` to it.
    TailCall(Rc<dyn FunctionValue>, Vec<Reference>, Reference),
}

fn raise(message: impl Into<String>, loc: &SourceLoc) -> Exception {
    let mut exc = Exception::new(Value::from(message.into()));
    exc.push_frame(loc.clone(), FrameKind::Native);
    exc
}

/// Used by the handful of nodes (`Spread`, the implicit reads backing
/// `if`/`while`/`switch` conditions) that have no source location of their
/// own to attach to a raised exception; a surrounding `Call` or `Throw`
/// frame supplies real position information once the error propagates out.
fn raise_here(message: impl Into<String>) -> Exception {
    Exception::new(Value::from(message.into()))
}

fn engine_loc() -> SourceLoc {
    SourceLoc::new(Rc::from("<engine>"), 0, 0)
}

/// One link in the chain of ancestor call frames currently live on the
/// native Rust stack, threaded through every nested (non-tail) call so a
/// collection triggered deep inside one call still traces every frame's
/// locals, not just the innermost one. A tail call never needs to extend
/// this chain: it discards its own frame rather than nesting one.
struct FrameChain<'a> {
    ctx: &'a ExecutiveContext,
    stack: &'a EvalStack,
    parent: Option<&'a FrameChain<'a>>,
}

impl FrameChain<'_> {
    fn trace_roots(&self, roots: &mut Vec<GcId>) {
        self.ctx.trace_roots(&mut |id| roots.push(id));
        self.stack.trace(&mut |id| roots.push(id));
        if let Some(parent) = self.parent {
            parent.trace_roots(roots);
        }
    }
}

fn collect_roots(ctx: &ExecutiveContext, stack: &EvalStack, ancestors: Option<&FrameChain<'_>>) -> Vec<GcId> {
    let mut roots = Vec::new();
    ctx.trace_roots(&mut |id| roots.push(id));
    stack.trace(&mut |id| roots.push(id));
    if let Some(chain) = ancestors {
        chain.trace_roots(&mut roots);
    }
    roots
}

/// The location a statement-shaped node would report to a single-step hook
///, for the nodes that carry one.
fn node_loc(node: &AirNode) -> Option<&SourceLoc> {
    match node {
        AirNode::DeclareLocal { loc, .. }
        | AirNode::ForEach { loc, .. }
        | AirNode::Try { loc, .. }
        | AirNode::Defer { loc, .. }
        | AirNode::Throw { loc, .. }
        | AirNode::Assert { loc, .. } => Some(loc),
        AirNode::TailCall { value } => match &**value {
            [AirNode::Call { loc, .. }] => Some(loc),
            _ => None,
        },
        _ => None,
    }
}

/// Executes a sequence of nodes, stopping and returning early as soon as one
/// of them yields a non-[`Signal::Normal`] outcome.
fn exec_seq(
    nodes: &[AirNode],
    ctx: &mut ExecutiveContext,
    globals: &mut GlobalContext,
    stack: &mut EvalStack,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<Signal> {
    for node in nodes {
        if let Some(loc) = node_loc(node) {
            globals.fire_hooks(loc);
        }
        match exec_node(node, ctx, globals, stack, ancestors)? {
            Signal::Normal => {}
            other => return Ok(other),
        }
        if globals.needs_collection() {
            globals.collect_if_needed(collect_roots(ctx, stack, ancestors));
        }
    }
    Ok(Signal::Normal)
}

/// Runs an expression sub-program that is known to push exactly one value.
fn eval_expr(
    nodes: &[AirNode],
    ctx: &mut ExecutiveContext,
    globals: &mut GlobalContext,
    stack: &mut EvalStack,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<Reference> {
    let before = stack.len();
    exec_seq(nodes, ctx, globals, stack, ancestors)?;
    debug_assert_eq!(stack.len(), before + 1, "expression sub-program did not leave exactly one value");
    Ok(stack.pop())
}

/// Runs an expression sub-program that may push any number of values (a
/// plain element pushes one, a `...expr` spread pushes however many the
/// spread array holds).
fn eval_multi(
    nodes: &[AirNode],
    ctx: &mut ExecutiveContext,
    globals: &mut GlobalContext,
    stack: &mut EvalStack,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<Vec<Reference>> {
    let before = stack.len();
    exec_seq(nodes, ctx, globals, stack, ancestors)?;
    Ok(stack.pop_n(stack.len() - before))
}

fn exec_node(
    node: &AirNode,
    ctx: &mut ExecutiveContext,
    globals: &mut GlobalContext,
    stack: &mut EvalStack,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<Signal> {
    match node {
        // -- statements --------------------------------------------------
        AirNode::Eval(body) => {
            eval_expr(body, ctx, globals, stack, ancestors)?;
            Ok(Signal::Normal)
        }
        AirNode::DeclareLocal { slot, immutable, init, loc } => {
            // Predeclared before the initializer runs, so a closure created
            // inside the initializer can capture this very slot.
            let id = globals.heap_mut().allocate(Variable::uninitialized(*immutable));
            ctx.bind_local(*slot, id);
            let value = match init {
                Some(nodes) => eval_expr(nodes, ctx, globals, stack, ancestors)?.read(globals.heap(), loc)?,
                None => Value::Null,
            };
            let var = globals.heap_mut().get_mut(id);
            var.value = value;
            var.initialized = true;
            Ok(Signal::Normal)
        }
        AirNode::Block(body) => exec_seq(body, ctx, globals, stack, ancestors),
        AirNode::If { cond, then_branch, else_branch } => {
            let truthy = eval_expr(cond, ctx, globals, stack, ancestors)?.read(globals.heap(), &engine_loc())?.is_truthy();
            exec_seq(if truthy { then_branch } else { else_branch }, ctx, globals, stack, ancestors)
        }
        AirNode::Switch { subject, arms } => {
            let subject_val = eval_expr(subject, ctx, globals, stack, ancestors)?.read(globals.heap(), &engine_loc())?;
            let mut start = None;
            let mut default = None;
            for (i, arm) in arms.iter().enumerate() {
                match &arm.label {
                    Some(label) => {
                        let label_val = eval_expr(label, ctx, globals, stack, ancestors)?.read(globals.heap(), &engine_loc())?;
                        if label_val.compare(&subject_val).is_equal() {
                            start = Some(i);
                            break;
                        }
                    }
                    None => default = Some(i),
                }
            }
            let Some(start) = start.or(default) else { return Ok(Signal::Normal) };
            for arm in &arms[start..] {
                match exec_seq(&arm.body, ctx, globals, stack, ancestors)? {
                    Signal::Normal => {}
                    Signal::Break => break,
                    other => return Ok(other),
                }
            }
            Ok(Signal::Normal)
        }
        AirNode::While { cond, body } => {
            loop {
                if !eval_expr(cond, ctx, globals, stack, ancestors)?.read(globals.heap(), &engine_loc())?.is_truthy() {
                    return Ok(Signal::Normal);
                }
                match exec_seq(body, ctx, globals, stack, ancestors)? {
                    Signal::Normal | Signal::Continue => {}
                    Signal::Break => return Ok(Signal::Normal),
                    other => return Ok(other),
                }
            }
        }
        AirNode::DoWhile { body, cond } => {
            loop {
                match exec_seq(body, ctx, globals, stack, ancestors)? {
                    Signal::Normal | Signal::Continue => {}
                    Signal::Break => return Ok(Signal::Normal),
                    other => return Ok(other),
                }
                if !eval_expr(cond, ctx, globals, stack, ancestors)?.read(globals.heap(), &engine_loc())?.is_truthy() {
                    return Ok(Signal::Normal);
                }
            }
        }
        AirNode::For { init, cond, step, body } => {
            exec_seq(init, ctx, globals, stack, ancestors)?;
            loop {
                if let Some(cond) = cond {
                    if !eval_expr(cond, ctx, globals, stack, ancestors)?.read(globals.heap(), &engine_loc())?.is_truthy() {
                        return Ok(Signal::Normal);
                    }
                }
                match exec_seq(body, ctx, globals, stack, ancestors)? {
                    Signal::Normal | Signal::Continue => {}
                    Signal::Break => return Ok(Signal::Normal),
                    other => return Ok(other),
                }
                eval_expr(step, ctx, globals, stack, ancestors)?;
            }
        }
        AirNode::ForEach { key_slot, value_slot, range, body, loc } => {
            let range_val = eval_expr(range, ctx, globals, stack, ancestors)?.read(globals.heap(), loc)?;
            match range_val {
                Value::Array(arr) => {
                    for (i, elem) in arr.iter().enumerate() {
                        if let Some(key_slot) = key_slot {
                            let id = globals.heap_mut().allocate(Variable::new(Value::Integer(i as i64), true));
                            ctx.bind_local(*key_slot, id);
                        }
                        let id = globals.heap_mut().allocate(Variable::new(elem.clone(), true));
                        ctx.bind_local(*value_slot, id);
                        match exec_seq(body, ctx, globals, stack, ancestors)? {
                            Signal::Normal | Signal::Continue => {}
                            Signal::Break => break,
                            other => return Ok(other),
                        }
                    }
                    Ok(Signal::Normal)
                }
                Value::Object(obj) => {
                    for (key, elem) in obj.iter() {
                        if let Some(key_slot) = key_slot {
                            let id = globals.heap_mut().allocate(Variable::new(Value::String(key.clone()), true));
                            ctx.bind_local(*key_slot, id);
                        }
                        let id = globals.heap_mut().allocate(Variable::new(elem.clone(), true));
                        ctx.bind_local(*value_slot, id);
                        match exec_seq(body, ctx, globals, stack, ancestors)? {
                            Signal::Normal | Signal::Continue => {}
                            Signal::Break => break,
                            other => return Ok(other),
                        }
                    }
                    Ok(Signal::Normal)
                }
                other => Err(raise(format!("cannot iterate a value of type `{}`", other.type_name()), loc)),
            }
        }
        AirNode::Try { body, catch_slot, catch_body, .. } => match exec_seq(body, ctx, globals, stack, ancestors) {
            Err(exc) => {
                let id = globals.heap_mut().allocate(Variable::new(exc.value, true));
                ctx.bind_local(*catch_slot, id);
                exec_seq(catch_body, ctx, globals, stack, ancestors)
            }
            ok => ok,
        },
        AirNode::Defer { body, loc } => {
            ctx.push_defer(body.clone(), loc.clone());
            Ok(Signal::Normal)
        }
        AirNode::Break => Ok(Signal::Break),
        AirNode::Continue => Ok(Signal::Continue),
        AirNode::Return { value } => match value {
            Some(nodes) => Ok(Signal::Return(eval_expr(nodes, ctx, globals, stack, ancestors)?)),
            None => Ok(Signal::Return(Reference::void())),
        },
        AirNode::TailCall { value } => exec_tail_call(value, ctx, globals, stack, ancestors),
        AirNode::TailShortCircuit { kind, lhs, rhs } => {
            let lhs_ref = eval_expr(lhs, ctx, globals, stack, ancestors)?;
            let lhs_val = lhs_ref.read(globals.heap(), &engine_loc())?;
            let stops = match kind {
                ShortCircuitKind::And => !lhs_val.is_truthy(),
                ShortCircuitKind::Or => lhs_val.is_truthy(),
                ShortCircuitKind::Coalesce => !matches!(lhs_val, Value::Null),
            };
            if stops {
                Ok(Signal::Return(lhs_ref))
            } else {
                exec_seq(rhs, ctx, globals, stack, ancestors)
            }
        }
        AirNode::Throw { value, loc } => {
            let thrown = eval_expr(value, ctx, globals, stack, ancestors)?.read(globals.heap(), loc)?;
            let mut exc = Exception::new(thrown);
            exc.push_frame(loc.clone(), FrameKind::Throw);
            Err(exc)
        }
        AirNode::Assert { cond, message, loc } => {
            let truthy = eval_expr(cond, ctx, globals, stack, ancestors)?.read(globals.heap(), loc)?.is_truthy();
            if truthy {
                return Ok(Signal::Normal);
            }
            let msg = match message {
                Some(nodes) => eval_expr(nodes, ctx, globals, stack, ancestors)?.read(globals.heap(), loc)?,
                None => Value::from("assertion failed"),
            };
            let mut exc = Exception::new(msg);
            exc.push_frame(loc.clone(), FrameKind::Assert);
            Err(exc)
        }

        // -- expressions ---------------------------------------------------
        AirNode::PushLiteral(value) => {
            stack.push(Reference::temporary(value.clone()));
            Ok(Signal::Normal)
        }
        AirNode::PushLocal(slot) => {
            let r = match ctx.local(*slot) {
                Some(id) => Reference::variable(id),
                None => Reference::uninit(),
            };
            stack.push(r);
            Ok(Signal::Normal)
        }
        AirNode::PushCaptured(idx) => {
            stack.push(Reference::variable(ctx.captured(*idx)));
            Ok(Signal::Normal)
        }
        AirNode::PushGlobal(name, loc) => match globals.lookup(name) {
            Some(id) => {
                stack.push(Reference::variable(id));
                Ok(Signal::Normal)
            }
            None => Err(raise(format!("undeclared identifier `{name}`"), loc)),
        },
        AirNode::ApplyIndex(loc) => {
            let index_ref = stack.pop();
            let mut base = stack.pop();
            let index_val = index_ref.read(globals.heap(), loc)?;
            let Value::Integer(i) = index_val else {
                return Err(raise(format!("array index must be an integer, got `{}`", index_val.type_name()), loc));
            };
            base.push_modifier(Modifier::ArrayIndex(i));
            stack.push(base);
            Ok(Signal::Normal)
        }
        AirNode::ApplyKey(key) => {
            let mut base = stack.pop();
            base.push_modifier(Modifier::ObjectKey(key.clone()));
            stack.push(base);
            Ok(Signal::Normal)
        }
        AirNode::ApplyHead => {
            let mut base = stack.pop();
            base.push_modifier(Modifier::ArrayHead);
            stack.push(base);
            Ok(Signal::Normal)
        }
        AirNode::ApplyTail => {
            let mut base = stack.pop();
            base.push_modifier(Modifier::ArrayTail);
            stack.push(base);
            Ok(Signal::Normal)
        }
        AirNode::ApplyRandom(_loc) => {
            let mut base = stack.pop();
            let seed = globals.random_u32();
            base.push_modifier(Modifier::ArrayRandom(seed));
            stack.push(base);
            Ok(Signal::Normal)
        }
        AirNode::Unary(op, loc) => {
            let operand = stack.pop();
            stack.push(exec_unary(*op, operand, globals, loc)?);
            Ok(Signal::Normal)
        }
        AirNode::Binary(op, loc) => {
            let rhs = stack.pop();
            let lhs = stack.pop();
            let rhs_val = rhs.read(globals.heap(), loc)?;
            let lhs_val = lhs.read(globals.heap(), loc)?;
            stack.push(Reference::temporary(exec_binary(*op, lhs_val, rhs_val, loc)?));
            Ok(Signal::Normal)
        }
        AirNode::Assign(loc) => {
            let rhs = stack.pop();
            let lhs = stack.pop();
            let rhs_val = rhs.read(globals.heap(), loc)?;
            if lhs.is_root_immutable(globals.heap()) {
                return Err(raise("cannot assign to an immutable variable", loc));
            }
            *lhs.open(globals.heap_mut(), loc)? = rhs_val.clone();
            stack.push(Reference::temporary(rhs_val));
            Ok(Signal::Normal)
        }
        AirNode::CompoundAssign(base_op, loc) => {
            let rhs = stack.pop();
            let lhs = stack.pop();
            let lhs_val = lhs.read(globals.heap(), loc)?;
            let rhs_val = rhs.read(globals.heap(), loc)?;
            let new_val = exec_binary(*base_op, lhs_val, rhs_val, loc)?;
            if lhs.is_root_immutable(globals.heap()) {
                return Err(raise("cannot assign to an immutable variable", loc));
            }
            *lhs.open(globals.heap_mut(), loc)? = new_val.clone();
            stack.push(Reference::temporary(new_val));
            Ok(Signal::Normal)
        }
        AirNode::ShortCircuit { kind, lhs, rhs } => {
            let lhs_ref = eval_expr(lhs, ctx, globals, stack, ancestors)?;
            let lhs_val = lhs_ref.read(globals.heap(), &engine_loc())?;
            let result = match kind {
                ShortCircuitKind::And => {
                    if lhs_val.is_truthy() {
                        eval_expr(rhs, ctx, globals, stack, ancestors)?
                    } else {
                        lhs_ref
                    }
                }
                ShortCircuitKind::Or => {
                    if lhs_val.is_truthy() {
                        lhs_ref
                    } else {
                        eval_expr(rhs, ctx, globals, stack, ancestors)?
                    }
                }
                ShortCircuitKind::Coalesce => {
                    if matches!(lhs_val, Value::Null) {
                        eval_expr(rhs, ctx, globals, stack, ancestors)?
                    } else {
                        lhs_ref
                    }
                }
            };
            stack.push(result);
            Ok(Signal::Normal)
        }
        AirNode::Conditional { cond, then_branch, else_branch } => {
            let cond_ref = eval_expr(cond, ctx, globals, stack, ancestors)?;
            let truthy = cond_ref.read(globals.heap(), &engine_loc())?.is_truthy();
            let result = eval_expr(if truthy { then_branch } else { else_branch }, ctx, globals, stack, ancestors)?;
            stack.push(result);
            Ok(Signal::Normal)
        }
        AirNode::MakeArray(elems) => {
            let mut values = Vec::with_capacity(elems.len());
            for elem in elems {
                for r in eval_multi(elem, ctx, globals, stack, ancestors)? {
                    values.push(r.read(globals.heap(), &engine_loc())?);
                }
            }
            stack.push(Reference::temporary(Value::from(values)));
            Ok(Signal::Normal)
        }
        AirNode::MakeObject { keys, values } => {
            let mut map = IndexMap::with_capacity(keys.len());
            for (key, value_nodes) in keys.iter().zip(values.iter()) {
                let v = eval_expr(value_nodes, ctx, globals, stack, ancestors)?.read(globals.heap(), &engine_loc())?;
                map.insert(key.clone(), v);
            }
            stack.push(Reference::temporary(Value::Object(Rc::new(map))));
            Ok(Signal::Normal)
        }
        AirNode::MakeClosure(template) => {
            let captured = template
                .captures
                .iter()
                .map(|(name, source)| {
                    let id = match source {
                        CaptureSource::Local(slot) => {
                            ctx.local(*slot).expect("capture source local slot not yet declared")
                        }
                        CaptureSource::Captured(idx) => ctx.captured(*idx),
                    };
                    (name.clone(), id)
                })
                .collect();
            let func = CompiledFunction {
                name: template.name.clone(),
                file: template.file.clone(),
                line: template.line,
                param_names: template.param_names.clone(),
                variadic: template.variadic,
                namespace_size: template.namespace_size,
                captured,
                body: template.body.clone(),
            };
            stack.push(Reference::temporary(Value::Function(Rc::new(func))));
            Ok(Signal::Normal)
        }
        AirNode::Call { callee, args, loc } => {
            let (callee_ref, f) = resolve_callee(callee, ctx, globals, stack, loc, ancestors)?;
            let mut evaluated_args = Vec::new();
            for arg in args {
                evaluated_args.extend(eval_multi(arg, ctx, globals, stack, ancestors)?);
            }
            let result = perform_call(f, callee_ref, evaluated_args, loc, ctx, stack, globals, ancestors)?;
            stack.push(result);
            Ok(Signal::Normal)
        }
        AirNode::CatchExpr(inner) => {
            let saved = stack.len();
            match eval_expr(inner, ctx, globals, stack, ancestors) {
                Ok(_) => stack.push(Reference::temporary(Value::Null)),
                Err(exc) => {
                    stack.truncate(saved);
                    let msg = match exc.value {
                        Value::String(s) => Value::String(s),
                        other => Value::from(other.describe()),
                    };
                    stack.push(Reference::temporary(msg));
                }
            }
            Ok(Signal::Normal)
        }
        AirNode::Spread(inner) => {
            let value = eval_expr(inner, ctx, globals, stack, ancestors)?.read(globals.heap(), &engine_loc())?;
            let Value::Array(arr) = value else {
                return Err(raise_here(format!("cannot spread a value of type `{}`", value.type_name())));
            };
            for item in arr.iter() {
                stack.push(Reference::temporary(item.clone()));
            }
            Ok(Signal::Normal)
        }
        AirNode::Fma(loc) => {
            let c = stack.pop().read(globals.heap(), loc)?;
            let b = stack.pop().read(globals.heap(), loc)?;
            let a = stack.pop().read(globals.heap(), loc)?;
            let as_f64 = |v: &Value| match v {
                Value::Integer(i) => Some(*i as f64),
                Value::Real(r) => Some(*r),
                _ => None,
            };
            let (a, b, c) = match (as_f64(&a), as_f64(&b), as_f64(&c)) {
                (Some(a), Some(b), Some(c)) => (a, b, c),
                _ => {
                    return Err(raise(
                        format!("__fma does not accept values of type `{}`, `{}`, `{}`", a.type_name(), b.type_name(), c.type_name()),
                        loc,
                    ));
                }
            };
            stack.push(Reference::temporary(Value::Real(a.mul_add(b, c))));
            Ok(Signal::Normal)
        }
        AirNode::WrapBinary(op, loc) => {
            let rhs = stack.pop().read(globals.heap(), loc)?;
            let lhs = stack.pop().read(globals.heap(), loc)?;
            let (Value::Integer(a), Value::Integer(b)) = (&lhs, &rhs) else {
                return Err(raise(format!("operator does not accept values of type `{}` and `{}`", lhs.type_name(), rhs.type_name()), loc));
            };
            let result = match op {
                WrapOp::AddWrap => a.wrapping_add(*b),
                WrapOp::SubWrap => a.wrapping_sub(*b),
                WrapOp::MulWrap => a.wrapping_mul(*b),
                WrapOp::AddSat => a.saturating_add(*b),
                WrapOp::SubSat => a.saturating_sub(*b),
                WrapOp::MulSat => a.saturating_mul(*b),
            };
            stack.push(Reference::temporary(Value::Integer(result)));
            Ok(Signal::Normal)
        }
        AirNode::VariadicCall(loc) => {
            let args_ref = stack.pop();
            let target_ref = stack.pop();
            let target_val = target_ref.read(globals.heap(), loc)?;
            let Value::Function(f) = target_val else {
                return Err(raise(format!("value of type `{}` is not callable", target_val.type_name()), loc));
            };
            let args_val = args_ref.read(globals.heap(), loc)?;
            let Value::Array(arr) = args_val else {
                return Err(raise(format!("__vcall argument list must be an array, got `{}`", args_val.type_name()), loc));
            };
            let args = arr.iter().map(|v| Reference::temporary(v.clone())).collect();
            let result = perform_call(f, Reference::void(), args, loc, ctx, stack, globals, ancestors)?;
            stack.push(result);
            Ok(Signal::Normal)
        }
    }
}

/// Invokes `f`, dispatching to the trampoline for a compiled function or a
/// direct call for a host function, and attaching a `Call` backtrace frame
/// to any exception that escapes.
fn perform_call(
    f: Rc<dyn FunctionValue>,
    callee_ref: Reference,
    args: Vec<Reference>,
    loc: &SourceLoc,
    ctx: &ExecutiveContext,
    stack: &EvalStack,
    globals: &mut GlobalContext,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<Reference> {
    match f.as_compiled() {
        Some(cf) => {
            let frame = FrameChain { ctx, stack, parent: ancestors };
            call_compiled_with_ancestors(cf, globals, &callee_ref, args, Some(&frame))
        }
        None => f.invoke(globals, &callee_ref, args),
    }
    .map_err(|mut exc| {
        exc.push_frame(loc.clone(), FrameKind::Call);
        exc
    })
}

/// Evaluates the callee of a `Call`/`TailCall` node, resolving it down to
/// the function value it names.
fn resolve_callee(
    callee: &[AirNode],
    ctx: &mut ExecutiveContext,
    globals: &mut GlobalContext,
    stack: &mut EvalStack,
    loc: &SourceLoc,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<(Reference, Rc<dyn FunctionValue>)> {
    let callee_ref = eval_expr(callee, ctx, globals, stack, ancestors)?;
    let callee_val = callee_ref.read(globals.heap(), loc)?;
    match callee_val {
        Value::Function(f) => Ok((callee_ref, f)),
        other => Err(raise(format!("value of type `{}` is not callable", other.type_name()), loc)),
    }
}

/// A `return` whose value was compiled as a bare call: evaluates the callee and arguments but does not invoke, so
/// [`call_compiled`] can reuse its own frame instead of recursing.
fn exec_tail_call(
    value: &[AirNode],
    ctx: &mut ExecutiveContext,
    globals: &mut GlobalContext,
    stack: &mut EvalStack,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<Signal> {
    if let [AirNode::Call { callee, args, loc }] = value {
        let (callee_ref, f) = resolve_callee(callee, ctx, globals, stack, loc, ancestors)?;
        let mut evaluated_args = Vec::new();
        for arg in args {
            evaluated_args.extend(eval_multi(arg, ctx, globals, stack, ancestors)?);
        }
        return Ok(Signal::TailCall(f, evaluated_args, callee_ref));
    }
    // The compiler only ever emits `TailCall` around a bare call expression;
    // fall back to plain evaluation for anything else rather than panicking.
    Ok(Signal::Return(eval_expr(value, ctx, globals, stack, ancestors)?))
}

fn exec_unary(op: UnaryOp, operand: Reference, globals: &mut GlobalContext, loc: &SourceLoc) -> RunResult<Reference> {
    match op {
        UnaryOp::Unset => Ok(Reference::temporary(operand.unset(globals.heap_mut(), loc)?)),
        UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
            if operand.is_root_immutable(globals.heap()) {
                return Err(raise("cannot modify an immutable variable", loc));
            }
            let old = operand.read(globals.heap(), loc)?;
            let increment = matches!(op, UnaryOp::PreInc | UnaryOp::PostInc);
            let new = match &old {
                Value::Integer(i) => {
                    let stepped = if increment { i.checked_add(1) } else { i.checked_sub(1) };
                    Value::Integer(stepped.ok_or_else(|| raise("integer overflow", loc))?)
                }
                Value::Real(r) => Value::Real(if increment { r + 1.0 } else { r - 1.0 }),
                other => return Err(raise(format!("cannot increment/decrement a value of type `{}`", other.type_name()), loc)),
            };
            *operand.open(globals.heap_mut(), loc)? = new.clone();
            Ok(Reference::temporary(if matches!(op, UnaryOp::PreInc | UnaryOp::PreDec) { new } else { old }))
        }
        UnaryOp::Neg => {
            let value = operand.read(globals.heap(), loc)?;
            let result = match value {
                Value::Integer(i) => Value::Integer(i.checked_neg().ok_or_else(|| raise("integer overflow", loc))?),
                Value::Real(r) => Value::Real(-r),
                other => return Err(raise(format!("cannot negate a value of type `{}`", other.type_name()), loc)),
            };
            Ok(Reference::temporary(result))
        }
        UnaryOp::Pos => {
            let value = operand.read(globals.heap(), loc)?;
            match value {
                Value::Integer(_) | Value::Real(_) => Ok(Reference::temporary(value)),
                other => Err(raise(format!("unary `+` does not accept a value of type `{}`", other.type_name()), loc)),
            }
        }
        UnaryOp::Not => {
            let value = operand.read(globals.heap(), loc)?;
            Ok(Reference::temporary(Value::Boolean(!value.is_truthy())))
        }
        UnaryOp::BitNot => {
            let value = operand.read(globals.heap(), loc)?;
            match value {
                Value::Integer(i) => Ok(Reference::temporary(Value::Integer(!i))),
                other => Err(raise(format!("cannot bitwise-complement a value of type `{}`", other.type_name()), loc)),
            }
        }
        UnaryOp::Lengthof => {
            let value = operand.read(globals.heap(), loc)?;
            let len = match value {
                Value::String(s) => s.len(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                other => return Err(raise(format!("value of type `{}` has no length", other.type_name()), loc)),
            };
            Ok(Reference::temporary(Value::Integer(len as i64)))
        }
        UnaryOp::Typeof => {
            let value = operand.read(globals.heap(), loc)?;
            Ok(Reference::temporary(Value::from(value.type_name())))
        }
    }
}

fn exec_binary(op: BinaryOp, lhs: Value, rhs: Value, loc: &SourceLoc) -> RunResult<Value> {
    use BinaryOp::{
        Add, BitAnd, BitOr, BitXor, Cmp3, Div, Eq, Ge, Gt, Le, Lt, Mod, Mul, Ne, Shl, Shr, Sub,
    };

    let overflow = || raise("integer overflow", loc);
    let type_mismatch = |lhs: &Value, rhs: &Value| {
        raise(format!("operator does not accept values of type `{}` and `{}`", lhs.type_name(), rhs.type_name()), loc)
    };

    match op {
        Add => match (&lhs, &rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.checked_add(*b).ok_or_else(overflow)?)),
            (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(*a as f64 + b)),
            (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(a + *b as f64)),
            (Value::Real(a), Value::Real(b)) => Ok(Value::Real(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::from(format!("{a}{b}"))),
            _ => Err(type_mismatch(&lhs, &rhs)),
        },
        Sub => match (&lhs, &rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.checked_sub(*b).ok_or_else(overflow)?)),
            (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(*a as f64 - b)),
            (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(a - *b as f64)),
            (Value::Real(a), Value::Real(b)) => Ok(Value::Real(a - b)),
            _ => Err(type_mismatch(&lhs, &rhs)),
        },
        Mul => match (&lhs, &rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.checked_mul(*b).ok_or_else(overflow)?)),
            (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(*a as f64 * b)),
            (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(a * *b as f64)),
            (Value::Real(a), Value::Real(b)) => Ok(Value::Real(a * b)),
            _ => Err(type_mismatch(&lhs, &rhs)),
        },
        Div => match (&lhs, &rhs) {
            (Value::Integer(_), Value::Integer(0)) => Err(raise("integer division by zero", loc)),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.checked_div(*b).ok_or_else(overflow)?)),
            (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(*a as f64 / b)),
            (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(a / *b as f64)),
            (Value::Real(a), Value::Real(b)) => Ok(Value::Real(a / b)),
            _ => Err(type_mismatch(&lhs, &rhs)),
        },
        Mod => match (&lhs, &rhs) {
            (Value::Integer(_), Value::Integer(0)) => Err(raise("integer modulo by zero", loc)),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.checked_rem(*b).ok_or_else(overflow)?)),
            (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(*a as f64 % b)),
            (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(a % *b as f64)),
            (Value::Real(a), Value::Real(b)) => Ok(Value::Real(a % b)),
            _ => Err(type_mismatch(&lhs, &rhs)),
        },
        Eq => Ok(Value::Boolean(lhs.compare(&rhs).is_equal())),
        Ne => Ok(Value::Boolean(!lhs.compare(&rhs).is_equal())),
        Lt | Gt | Le | Ge | Cmp3 => match lhs.compare(&rhs) {
            Compare::Unordered => Err(raise(format!("values of type `{}` and `{}` are not comparable", lhs.type_name(), rhs.type_name()), loc)),
            ord => Ok(match op {
                Lt => Value::Boolean(ord == Compare::Less),
                Gt => Value::Boolean(ord == Compare::Greater),
                Le => Value::Boolean(ord != Compare::Greater),
                Ge => Value::Boolean(ord != Compare::Less),
                Cmp3 => Value::Integer(match ord {
                    Compare::Less => -1,
                    Compare::Equal => 0,
                    Compare::Greater => 1,
                    Compare::Unordered => unreachable!("handled by the outer match"),
                }),
                _ => unreachable!("matched by the outer arm"),
            }),
        },
        BitAnd | BitOr | BitXor | Shl | Shr => match (&lhs, &rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(match op {
                BitAnd => a & b,
                BitOr => a | b,
                BitXor => a ^ b,
                Shl | Shr if !(0..64).contains(b) => return Err(raise("shift amount out of range", loc)),
                Shl => a.wrapping_shl(*b as u32),
                Shr => a.wrapping_shr(*b as u32),
                _ => unreachable!("matched by the outer arm"),
            })),
            _ => Err(type_mismatch(&lhs, &rhs)),
        },
        BinaryOp::LogicAnd | BinaryOp::LogicOr | BinaryOp::Coalesce => {
            unreachable!("lowered to AirNode::ShortCircuit by the compiler, never reaches AirNode::Binary")
        }
        _ if op.is_assignment() => {
            unreachable!("lowered to AirNode::Assign/CompoundAssign by the compiler, never reaches AirNode::Binary")
        }
        _ => unreachable!("every BinaryOp variant is handled above"),
    }
}

fn bind_params(func: &CompiledFunction, args: Vec<Reference>, self_ref: &Reference, globals: &mut GlobalContext) -> RunResult<ExecutiveContext> {
    let mut ctx = ExecutiveContext::new(func.namespace_size, func.captured.clone());
    let param_count = func.param_names.len();
    let loc = SourceLoc::new(func.file.clone(), func.line, 1);
    let mut args = args.into_iter();
    for slot in 0..param_count {
        let value = match args.next() {
            Some(r) => r.read(globals.heap(), &loc)?,
            None => Value::Null,
        };
        let id = globals.heap_mut().allocate(Variable::new(value, false));
        ctx.bind_local(slot, id);
    }
    if func.variadic {
        let mut rest = Vec::new();
        for r in args {
            rest.push(r.read(globals.heap(), &loc)?);
        }
        let id = globals.heap_mut().allocate(Variable::new(Value::from(rest), true));
        ctx.bind_local(param_count, id);
    }
    let this_value = if self_ref.is_void() { Value::Null } else { self_ref.read(globals.heap(), &loc)? };
    let this_slot = param_count + usize::from(func.variadic);
    let this_id = globals.heap_mut().allocate(Variable::new(this_value, true));
    ctx.bind_local(this_slot, this_id);
    Ok(ctx)
}

enum StepResult {
    Done(Reference),
    Tail(Rc<dyn FunctionValue>, Vec<Reference>, Reference),
}

/// Runs one activation of `func` to completion: binds parameters, executes
/// the body, and runs deferred actions in reverse order regardless of how
/// the body exited. Returns either the activation's
/// result or an unresolved tail call for [`call_compiled`] to continue with.
fn run_activation(
    func: &CompiledFunction,
    globals: &mut GlobalContext,
    args: Vec<Reference>,
    self_ref: &Reference,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<StepResult> {
    let mut ctx = bind_params(func, args, self_ref, globals)?;
    let mut stack = EvalStack::new();
    let outcome = exec_seq(&func.body, &mut ctx, globals, &mut stack, ancestors);
    let deferred = ctx.take_deferred_reversed();

    let mut result = match outcome {
        Ok(Signal::Return(r)) => Ok(StepResult::Done(r)),
        Ok(Signal::TailCall(f, a, next_self)) => Ok(StepResult::Tail(f, a, next_self)),
        Ok(Signal::Normal | Signal::Break | Signal::Continue) => Ok(StepResult::Done(Reference::void())),
        Err(exc) => Err(exc),
    };

    for action in deferred {
        let mut defer_stack = EvalStack::new();
        if let Err(mut exc) = exec_seq(&action.body, &mut ctx, globals, &mut defer_stack, ancestors) {
            exc.push_frame(action.loc, FrameKind::Defer);
            result = Err(exc);
        }
    }

    result
}

/// Invokes a compiled script function.
///
/// Implements proper tail calls as a trampoline: when an activation ends in
/// a tail-positioned call to another [`CompiledFunction`], this loops rather
/// than recursing, so a chain of tail calls runs in bounded Rust stack
/// space. A tail call into a [`crate::function::HostFunction`] (or any other
/// callable that cannot expose its AIR body) falls back to one ordinary
/// recursive invocation.
pub fn call_compiled(func: &CompiledFunction, globals: &mut GlobalContext, self_ref: &Reference, args: Vec<Reference>) -> RunResult<Reference> {
    call_compiled_with_ancestors(func, globals, self_ref, args, None)
}

/// Inner implementation of [`call_compiled`] that also threads the chain of
/// ancestor frames still live on the native call stack, so a collection
/// triggered by this activation (or one it tail-calls into) traces every
/// caller's locals, not just its own. The chain is held fixed across
/// trampoline iterations: a tail call genuinely discards its own frame
/// rather than nesting a new one onto `ancestors`.
fn call_compiled_with_ancestors(
    func: &CompiledFunction,
    globals: &mut GlobalContext,
    self_ref: &Reference,
    args: Vec<Reference>,
    ancestors: Option<&FrameChain<'_>>,
) -> RunResult<Reference> {
    let mut step = run_activation(func, globals, args, self_ref, ancestors)?;
    loop {
        match step {
            StepResult::Done(r) => return Ok(r),
            StepResult::Tail(f, next_args, next_self) => match f.as_compiled() {
                Some(cf) => step = run_activation(cf, globals, next_args, &next_self, ancestors)?,
                None => return f.invoke(globals, &next_self, next_args),
            },
        }
    }
}

/// Runs a top-level script body (crate::Program) against an already-seeded
/// executive context. Unlike [`call_compiled`],
/// there is no caller frame to trampoline back into, so a tail call in a
/// top-level script is simply invoked like an ordinary call.
///
/// Returns `Ok(None)` for a script that never hands back a value — falling
/// off the end of the body, or a bare `return;` — distinct from an explicit
/// `return null;`, which reads out as `Ok(Some(Value::Null))`.
pub fn exec_program(
    body: &[AirNode],
    ctx: &mut ExecutiveContext,
    globals: &mut GlobalContext,
    stack: &mut EvalStack,
    file: &Rc<str>,
) -> RunResult<Option<Value>> {
    let loc = SourceLoc::new(file.clone(), 1, 1);
    let outcome = exec_seq(body, ctx, globals, stack, None);
    let deferred = ctx.take_deferred_reversed();

    let resolve = |r: Reference, globals: &GlobalContext| -> RunResult<Option<Value>> {
        if r.is_void() { Ok(None) } else { r.read(globals.heap(), &loc).map(Some) }
    };

    let mut result = match outcome {
        Ok(Signal::Return(r)) => resolve(r, globals),
        Ok(Signal::TailCall(f, args, self_ref)) => match f.as_compiled() {
            Some(cf) => call_compiled_with_ancestors(cf, globals, &self_ref, args, None).and_then(|r| resolve(r, globals)),
            None => f.invoke(globals, &self_ref, args).and_then(|r| resolve(r, globals)),
        },
        Ok(Signal::Normal | Signal::Break | Signal::Continue) => Ok(None),
        Err(exc) => Err(exc),
    };

    for action in deferred {
        let mut defer_stack = EvalStack::new();
        if let Err(mut exc) = exec_seq(&action.body, ctx, globals, &mut defer_stack, None) {
            exc.push_frame(action.loc, FrameKind::Defer);
            result = Err(exc);
        }
    }

    result
}
