//! Lowers the AST to AIR.
//!
//! Mirrors upstream Asteria's `Statement::generate_code` /
//! `Expression_Unit::generate_code`: each surface form is lowered
//! independently, consulting the [`AnalyticContext`] only for name
//! resolution. The expression lowering in particular walks the RPN
//! [`Xpnode`] sequence with a compile-time operand stack of already-lowered
//! sub-programs, the mirror image of how the engine will later walk AIR
//! with a runtime stack of [`crate::reference::Reference`]s.

use std::rc::Rc;

use crate::{
    air::node::{AirNode, CaptureSource, ClosureTemplate, ShortCircuitKind, SwitchArmAir},
    ast::{BinaryOp, BindingPattern, Block, FunctionExpr, Literal, Stmt, SubscriptKind, VarBinding, WrapOp, Xpnode},
    context::{analytic::Resolution, AnalyticContext},
    error::SourceLoc,
    value::{Rstr, Value},
};

pub struct Compiler;

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compiles a top-level script body. Returns the body and the size of
    /// its flattened namespace.
    pub fn compile_program(&self, block: &Block) -> (Rc<[AirNode]>, usize) {
        let mut ctx = AnalyticContext::new_toplevel();
        let body = self.compile_stmts(block, &mut ctx);
        (body, ctx.namespace_size())
    }

    fn compile_stmts(&self, block: &Block, ctx: &mut AnalyticContext<'_>) -> Rc<[AirNode]> {
        let mut out = Vec::new();
        for stmt in block {
            self.compile_stmt(stmt, ctx, &mut out);
        }
        out.into()
    }

    fn compile_block_scoped(&self, block: &Block, ctx: &mut AnalyticContext<'_>) -> Rc<[AirNode]> {
        ctx.push_block();
        let body = self.compile_stmts(block, ctx);
        ctx.pop_block();
        body
    }

    fn compile_stmt(&self, stmt: &Stmt, ctx: &mut AnalyticContext<'_>, out: &mut Vec<AirNode>) {
        match stmt {
            Stmt::VarDecl { immutable, bindings } => {
                for binding in bindings {
                    self.compile_binding(binding, *immutable, ctx, out);
                }
            }
            Stmt::FuncDecl { func } => {
                let slot = ctx.declare(func.name.clone());
                let template = self.compile_closure(func, ctx);
                out.push(AirNode::DeclareLocal {
                    slot,
                    immutable: true,
                    init: Some(Rc::from(vec![AirNode::MakeClosure(Rc::new(template))])),
                    loc: func.loc.clone(),
                });
            }
            Stmt::Expr(expr) => out.push(AirNode::Eval(self.lower_expr(expr, ctx))),
            Stmt::Block(block) => out.push(AirNode::Block(self.compile_block_scoped(block, ctx))),
            Stmt::If { condition, then_branch, else_branch, .. } => {
                let cond = self.lower_expr(condition, ctx);
                let then_air = self.compile_block_scoped(then_branch, ctx);
                let else_air = else_branch.as_ref().map_or_else(|| Rc::from(Vec::new()), |b| self.compile_block_scoped(b, ctx));
                out.push(AirNode::If { cond, then_branch: then_air, else_branch: else_air });
            }
            Stmt::Switch { subject, arms, .. } => {
                let subject_air = self.lower_expr(subject, ctx);
                ctx.push_block();
                let arms_air = arms
                    .iter()
                    .map(|arm| SwitchArmAir {
                        label: arm.label.as_ref().map(|e| self.lower_expr(e, ctx)),
                        body: self.compile_stmts(&arm.body, ctx),
                    })
                    .collect();
                ctx.pop_block();
                out.push(AirNode::Switch { subject: subject_air, arms: arms_air });
            }
            Stmt::While { condition, body, .. } => {
                let cond = self.lower_expr(condition, ctx);
                let body_air = self.compile_block_scoped(body, ctx);
                out.push(AirNode::While { cond, body: body_air });
            }
            Stmt::DoWhile { body, condition, .. } => {
                let body_air = self.compile_block_scoped(body, ctx);
                let cond = self.lower_expr(condition, ctx);
                out.push(AirNode::DoWhile { body: body_air, cond });
            }
            Stmt::For { init, condition, step, body, .. } => {
                ctx.push_block();
                let mut init_air = Vec::new();
                if let Some(init_stmt) = init.as_ref() {
                    self.compile_stmt(init_stmt, ctx, &mut init_air);
                }
                let cond = condition.as_ref().map(|e| self.lower_expr(e, ctx));
                let step_air = step.as_ref().map_or_else(|| Rc::from(Vec::new()), |e| self.lower_expr(e, ctx));
                let body_air = self.compile_stmts(body, ctx);
                ctx.pop_block();
                out.push(AirNode::For { init: init_air.into(), cond, step: step_air, body: body_air });
            }
            Stmt::ForEach { key_name, value_name, range, body, loc } => {
                let range_air = self.lower_expr(range, ctx);
                ctx.push_block();
                let key_slot = key_name.as_ref().map(|n| ctx.declare(n.clone()));
                let value_slot = ctx.declare(value_name.clone());
                let body_air = self.compile_stmts(body, ctx);
                ctx.pop_block();
                out.push(AirNode::ForEach { key_slot, value_slot, range: range_air, body: body_air, loc: loc.clone() });
            }
            Stmt::Try { body, catch, loc } => {
                let body_air = self.compile_block_scoped(body, ctx);
                ctx.push_block();
                let catch_slot = ctx.declare(catch.name.clone());
                let catch_air = self.compile_stmts(&catch.body, ctx);
                ctx.pop_block();
                out.push(AirNode::Try { body: body_air, catch_slot, catch_body: catch_air, loc: loc.clone() });
            }
            Stmt::Defer { body, loc } => {
                let body_air = self.compile_block_scoped(body, ctx);
                out.push(AirNode::Defer { body: body_air, loc: loc.clone() });
            }
            Stmt::Break { .. } => out.push(AirNode::Break),
            Stmt::Continue { .. } => out.push(AirNode::Continue),
            Stmt::Return { value, .. } => match value {
                Some(expr) => out.push(self.lower_tail_expr(expr, ctx)),
                None => out.push(AirNode::Return { value: None }),
            },
            Stmt::Throw { value, loc } => out.push(AirNode::Throw { value: self.lower_expr(value, ctx), loc: loc.clone() }),
            Stmt::Assert { condition, message, loc } => out.push(AirNode::Assert {
                cond: self.lower_expr(condition, ctx),
                message: message.as_ref().map(|e| self.lower_expr(e, ctx)),
                loc: loc.clone(),
            }),
        }
    }

    fn compile_binding(&self, binding: &VarBinding, immutable: bool, ctx: &mut AnalyticContext<'_>, out: &mut Vec<AirNode>) {
        match &binding.pattern {
            BindingPattern::Simple(name) => {
                let slot = ctx.declare(name.clone());
                let init = binding.init.as_ref().map(|e| self.lower_expr(e, ctx));
                out.push(AirNode::DeclareLocal { slot, immutable, init, loc: binding.loc.clone() });
            }
            pattern @ (BindingPattern::Array(_) | BindingPattern::Object(_)) => {
                let Some(init) = &binding.init else {
                    // Structured bindings always require an initializer; the
                    // parser only ever accepts one, but a host embedding a
                    // hand-built AST could still hit this.
                    return;
                };
                let tmp_name: Rstr = Rc::from(format!("#tmp{}", ctx.namespace_size()));
                let hidden = ctx.declare(tmp_name);
                out.push(AirNode::DeclareLocal {
                    slot: hidden,
                    immutable: true,
                    init: Some(self.lower_expr(init, ctx)),
                    loc: binding.loc.clone(),
                });
                self.destructure(pattern, hidden, immutable, ctx, out, &binding.loc);
            }
        }
    }

    fn destructure(
        &self,
        pattern: &BindingPattern,
        source_slot: usize,
        immutable: bool,
        ctx: &mut AnalyticContext<'_>,
        out: &mut Vec<AirNode>,
        loc: &SourceLoc,
    ) {
        match pattern {
            BindingPattern::Simple(name) => {
                let slot = ctx.declare(name.clone());
                let init = vec![AirNode::PushLocal(source_slot)];
                out.push(AirNode::DeclareLocal { slot, immutable, init: Some(init.into()), loc: loc.clone() });
            }
            BindingPattern::Array(elems) => {
                for (i, elem) in elems.iter().enumerate() {
                    let tmp_name: Rstr = Rc::from(format!("#tmp{}", ctx.namespace_size()));
                    let sub_slot = ctx.declare(tmp_name);
                    let init = vec![
                        AirNode::PushLocal(source_slot),
                        AirNode::PushLiteral(Value::Integer(i as i64)),
                        AirNode::ApplyIndex(loc.clone()),
                    ];
                    out.push(AirNode::DeclareLocal { slot: sub_slot, immutable: true, init: Some(init.into()), loc: loc.clone() });
                    self.destructure(elem, sub_slot, immutable, ctx, out, loc);
                }
            }
            BindingPattern::Object(fields) => {
                for (key, sub_pattern) in fields {
                    let tmp_name: Rstr = Rc::from(format!("#tmp{}", ctx.namespace_size()));
                    let sub_slot = ctx.declare(tmp_name);
                    let init = vec![AirNode::PushLocal(source_slot), AirNode::ApplyKey(key.clone())];
                    out.push(AirNode::DeclareLocal { slot: sub_slot, immutable: true, init: Some(init.into()), loc: loc.clone() });
                    self.destructure(sub_pattern, sub_slot, immutable, ctx, out, loc);
                }
            }
        }
    }

    fn compile_closure(&self, func: &FunctionExpr, ctx: &mut AnalyticContext<'_>) -> ClosureTemplate {
        let param_names: Rc<[Rstr]> = func.params.iter().map(|p| p.name.clone()).collect();
        let variadic = func.variadic;

        // Build the nested scope in a limited borrow so `ctx` is free again
        // once we need to read its captures back out. `__varg` and `__this`
        // always occupy the two slots immediately after the named
        // parameters, in that order, so the engine can bind them by slot
        // arithmetic alone without threading their names through `AIR`.
        let (body, namespace_size, capture_names) = {
            let mut nested = AnalyticContext::new_nested(ctx);
            for name in param_names.iter().cloned() {
                nested.declare(name);
            }
            if variadic {
                nested.declare(Rc::from("__varg"));
            }
            nested.declare(Rc::from("__this"));
            let body = self.compile_stmts(&func.body, &mut nested);
            (body, nested.namespace_size(), nested.captures().to_vec())
        };

        let captures = capture_names
            .into_iter()
            .map(|name| {
                let source = match ctx.resolve(&name) {
                    Resolution::Local(slot) => CaptureSource::Local(slot),
                    Resolution::Captured(idx) => CaptureSource::Captured(idx),
                    Resolution::Global => CaptureSource::Local(0),
                };
                (name, source)
            })
            .collect();

        ClosureTemplate {
            name: func.name.clone(),
            file: func.loc.file.clone(),
            line: func.loc.line,
            param_names,
            variadic,
            namespace_size,
            captures,
            body,
        }
    }

    /// Lowers an expression known to be in tail position (a `return` value, or
    /// either branch of a tail-positioned ternary/and/or/coalescence chain)
    /// to a single statement-shaped [`AirNode`]. A proper tail call is a
    /// language guarantee, not an optimization, so this always recognizes a
    /// bare call, a ternary tail, a coalescence tail, and an and/or tail —
    /// whichever of those the trailing [`Xpnode`] turns out to be.
    fn lower_tail_expr(&self, expr: &[Xpnode], ctx: &mut AnalyticContext<'_>) -> AirNode {
        if let Some(Xpnode::Conditional { then_branch, else_branch, .. }) = expr.last() {
            let cond = self.lower_expr(&expr[..expr.len() - 1], ctx);
            let then_air = vec![self.lower_tail_expr(then_branch, ctx)].into();
            let else_air = vec![self.lower_tail_expr(else_branch, ctx)].into();
            return AirNode::If { cond, then_branch: then_air, else_branch: else_air };
        }
        if let Some(Xpnode::Binary(op, _)) = expr.last() {
            let kind = match op {
                BinaryOp::LogicAnd => Some(ShortCircuitKind::And),
                BinaryOp::LogicOr => Some(ShortCircuitKind::Or),
                BinaryOp::Coalesce => Some(ShortCircuitKind::Coalesce),
                _ => None,
            };
            if let Some(kind) = kind {
                let prefix = &expr[..expr.len() - 1];
                let spans = operand_spans(prefix);
                let rhs_start = spans.last().expect("binary has an rhs operand").start;
                let lhs = self.lower_expr(&prefix[..rhs_start], ctx);
                let rhs = vec![self.lower_tail_expr(&prefix[rhs_start..], ctx)].into();
                return AirNode::TailShortCircuit { kind, lhs, rhs };
            }
        }
        let value = self.lower_expr(expr, ctx);
        if let [AirNode::Call { .. }] = &value[..] {
            AirNode::TailCall { value }
        } else {
            AirNode::Return { value: Some(value) }
        }
    }

    fn lower_expr(&self, nodes: &[Xpnode], ctx: &mut AnalyticContext<'_>) -> Rc<[AirNode]> {
        let mut stack: Vec<Vec<AirNode>> = Vec::new();
        for node in nodes {
            match node {
                Xpnode::Literal(lit) => stack.push(vec![AirNode::PushLiteral(literal_value(lit))]),
                Xpnode::Named(name, loc) => stack.push(vec![resolve_push(ctx, name, loc)]),
                Xpnode::Unary(op, loc) => {
                    let mut operand = stack.pop().expect("unary operand");
                    operand.push(AirNode::Unary(*op, loc.clone()));
                    stack.push(operand);
                }
                Xpnode::Binary(op, loc) => {
                    let rhs = stack.pop().expect("binary rhs");
                    let lhs = stack.pop().expect("binary lhs");
                    let combined = match op {
                        BinaryOp::LogicAnd => vec![AirNode::ShortCircuit { kind: ShortCircuitKind::And, lhs: lhs.into(), rhs: rhs.into() }],
                        BinaryOp::LogicOr => vec![AirNode::ShortCircuit { kind: ShortCircuitKind::Or, lhs: lhs.into(), rhs: rhs.into() }],
                        BinaryOp::Coalesce => {
                            vec![AirNode::ShortCircuit { kind: ShortCircuitKind::Coalesce, lhs: lhs.into(), rhs: rhs.into() }]
                        }
                        _ if op.is_assignment() => {
                            let mut combined = lhs;
                            combined.extend(rhs);
                            match op.compound_base() {
                                Some(base) => combined.push(AirNode::CompoundAssign(base, loc.clone())),
                                None => combined.push(AirNode::Assign(loc.clone())),
                            }
                            combined
                        }
                        _ => {
                            let mut combined = lhs;
                            combined.extend(rhs);
                            combined.push(AirNode::Binary(*op, loc.clone()));
                            combined
                        }
                    };
                    stack.push(combined);
                }
                Xpnode::Conditional { then_branch, else_branch, loc: _ } => {
                    let cond = stack.pop().expect("conditional subject");
                    let then_air = self.lower_expr(then_branch, ctx);
                    let else_air = self.lower_expr(else_branch, ctx);
                    stack.push(vec![AirNode::Conditional { cond: cond.into(), then_branch: then_air, else_branch: else_air }]);
                }
                Xpnode::Subscript(kind, loc) => match kind {
                    SubscriptKind::Index => {
                        let index = stack.pop().expect("index");
                        let mut base = stack.pop().expect("subscript base");
                        base.extend(index);
                        base.push(AirNode::ApplyIndex(loc.clone()));
                        stack.push(base);
                    }
                    SubscriptKind::Key(key) => {
                        let mut base = stack.pop().expect("member base");
                        base.push(AirNode::ApplyKey(key.clone()));
                        stack.push(base);
                    }
                    SubscriptKind::Head => {
                        let mut base = stack.pop().expect("head base");
                        base.push(AirNode::ApplyHead);
                        stack.push(base);
                    }
                    SubscriptKind::Tail => {
                        let mut base = stack.pop().expect("tail base");
                        base.push(AirNode::ApplyTail);
                        stack.push(base);
                    }
                    SubscriptKind::Random(_) => {
                        let mut base = stack.pop().expect("random base");
                        base.push(AirNode::ApplyRandom(loc.clone()));
                        stack.push(base);
                    }
                },
                Xpnode::FunctionCall { arg_count, loc } => {
                    let mut args: Vec<Rc<[AirNode]>> = Vec::with_capacity(*arg_count);
                    for _ in 0..*arg_count {
                        args.push(stack.pop().expect("call argument").into());
                    }
                    args.reverse();
                    let callee = stack.pop().expect("callee");
                    stack.push(vec![AirNode::Call { callee: callee.into(), args, loc: loc.clone() }]);
                }
                Xpnode::ArrayLiteral { len } => {
                    let mut elems: Vec<Rc<[AirNode]>> = Vec::with_capacity(*len);
                    for _ in 0..*len {
                        elems.push(stack.pop().expect("array element").into());
                    }
                    elems.reverse();
                    stack.push(vec![AirNode::MakeArray(elems)]);
                }
                Xpnode::ObjectLiteral { keys } => {
                    let mut values: Vec<Rc<[AirNode]>> = Vec::with_capacity(keys.len());
                    for _ in 0..keys.len() {
                        values.push(stack.pop().expect("object value").into());
                    }
                    values.reverse();
                    stack.push(vec![AirNode::MakeObject { keys: keys.clone(), values }]);
                }
                Xpnode::Closure(func) => {
                    let template = self.compile_closure(func, ctx);
                    stack.push(vec![AirNode::MakeClosure(Rc::new(template))]);
                }
                Xpnode::Catch(inner) => {
                    let inner_air = self.lower_expr(inner, ctx);
                    stack.push(vec![AirNode::CatchExpr(inner_air)]);
                }
                Xpnode::Spread(inner) => {
                    let inner_air = self.lower_expr(inner, ctx);
                    stack.push(vec![AirNode::Spread(inner_air)]);
                }
                Xpnode::Fma(loc) => {
                    let c = stack.pop().expect("fma third operand");
                    let b = stack.pop().expect("fma second operand");
                    let mut a = stack.pop().expect("fma first operand");
                    a.extend(b);
                    a.extend(c);
                    a.push(AirNode::Fma(loc.clone()));
                    stack.push(a);
                }
                Xpnode::WrapBinary(op, loc) => {
                    let rhs = stack.pop().expect("wrapping binary rhs");
                    let mut lhs = stack.pop().expect("wrapping binary lhs");
                    lhs.extend(rhs);
                    lhs.push(AirNode::WrapBinary(*op, loc.clone()));
                    stack.push(lhs);
                }
                Xpnode::VariadicCall(loc) => {
                    let args = stack.pop().expect("vcall argument array");
                    let mut target = stack.pop().expect("vcall target");
                    target.extend(args);
                    target.push(AirNode::VariadicCall(loc.clone()));
                    stack.push(target);
                }
            }
        }
        let result = stack.pop().expect("expression leaves exactly one value");
        debug_assert!(stack.is_empty(), "expression RPN left extra operands on the compile-time stack");
        result.into()
    }
}

/// Simulates [`Compiler::lower_expr`]'s compile-time operand stack, tracking
/// only each entry's index span rather than its lowered content, so a
/// trailing and/or/coalescence node's flattened lhs/rhs can be split back
/// apart without re-lowering anything. Mirrors every arm's pop/push count
/// exactly: a node that pops `k` entries and pushes one spans from the
/// smallest popped start to its own index.
fn operand_spans(expr: &[Xpnode]) -> Vec<std::ops::Range<usize>> {
    let mut stack: Vec<std::ops::Range<usize>> = Vec::new();
    for (i, node) in expr.iter().enumerate() {
        let start = match node {
            Xpnode::Literal(_) | Xpnode::Named(..) => i,
            Xpnode::Unary(..) => stack.pop().expect("unary operand").start,
            Xpnode::Binary(..) => {
                let rhs = stack.pop().expect("binary rhs");
                let lhs = stack.pop().expect("binary lhs");
                lhs.start.min(rhs.start)
            }
            Xpnode::Conditional { .. } => stack.pop().expect("conditional subject").start,
            Xpnode::Subscript(SubscriptKind::Index, _) => {
                let index = stack.pop().expect("subscript index");
                let base = stack.pop().expect("subscript base");
                base.start.min(index.start)
            }
            Xpnode::Subscript(..) => stack.pop().expect("subscript base").start,
            Xpnode::FunctionCall { arg_count, .. } => {
                let mut start = i;
                for _ in 0..*arg_count {
                    start = start.min(stack.pop().expect("call argument").start);
                }
                start.min(stack.pop().expect("callee").start)
            }
            Xpnode::ArrayLiteral { len } => {
                let mut start = i;
                for _ in 0..*len {
                    start = start.min(stack.pop().expect("array element").start);
                }
                start
            }
            Xpnode::ObjectLiteral { keys } => {
                let mut start = i;
                for _ in 0..keys.len() {
                    start = start.min(stack.pop().expect("object value").start);
                }
                start
            }
            Xpnode::Closure(_) | Xpnode::Catch(_) | Xpnode::Spread(_) => i,
            Xpnode::Fma(_) => {
                let c = stack.pop().expect("fma third operand");
                let b = stack.pop().expect("fma second operand");
                let a = stack.pop().expect("fma first operand");
                a.start.min(b.start).min(c.start)
            }
            Xpnode::WrapBinary(..) => {
                let rhs = stack.pop().expect("wrapping binary rhs");
                let lhs = stack.pop().expect("wrapping binary lhs");
                lhs.start.min(rhs.start)
            }
            Xpnode::VariadicCall(_) => {
                let args = stack.pop().expect("vcall argument array");
                let target = stack.pop().expect("vcall target");
                target.start.min(args.start)
            }
        };
        stack.push(start..i + 1);
    }
    stack
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Real(r) => Value::Real(*r),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn resolve_push(ctx: &mut AnalyticContext<'_>, name: &Rstr, loc: &SourceLoc) -> AirNode {
    match ctx.resolve(name) {
        Resolution::Local(slot) => AirNode::PushLocal(slot),
        Resolution::Captured(idx) => AirNode::PushCaptured(idx),
        Resolution::Global => AirNode::PushGlobal(name.clone(), loc.clone()),
    }
}
