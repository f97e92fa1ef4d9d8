//! Runtime scope.
//!
//! A function's entire namespace (parameters plus every `var`/`const`
//! declared anywhere in its body) is flattened into one slot array sized by
//! [`crate::context::analytic::AnalyticContext::namespace_size`] at compile
//! time — nested blocks don't need their own runtime scope stack because
//! the analytic pass already gave each declaration a unique slot. Captured
//! variables from an enclosing closure sit in a separate, immutable-length
//! array snapshotted at closure-creation time.

use crate::{
    error::FrameKind,
    gc::GcId,
    value::Rstr,
};

/// A pending `defer` thunk, recorded in declaration order and run in
/// reverse at scope exit.
pub struct DeferredAction {
    pub body: std::rc::Rc<[crate::air::AirNode]>,
    pub loc: crate::error::SourceLoc,
}

/// Runtime scope for one function activation.
pub struct ExecutiveContext {
    locals: Vec<Option<GcId>>,
    captured: Vec<(Rstr, GcId)>,
    deferred: Vec<DeferredAction>,
}

impl ExecutiveContext {
    #[must_use]
    pub fn new(namespace_size: usize, captured: Vec<(Rstr, GcId)>) -> Self {
        Self { locals: vec![None; namespace_size], captured, deferred: Vec::new() }
    }

    #[must_use]
    pub fn local(&self, slot: usize) -> Option<GcId> {
        self.locals[slot]
    }

    pub fn bind_local(&mut self, slot: usize, id: GcId) {
        self.locals[slot] = Some(id);
    }

    #[must_use]
    pub fn captured(&self, index: usize) -> GcId {
        self.captured[index].1
    }

    /// GC trace hook: every variable this activation can currently reach
    /// directly — part of the collector's root set alongside the eval
    /// stack and global bindings.
    pub fn trace_roots(&self, visit: &mut dyn FnMut(GcId)) {
        for slot in self.locals.iter().flatten() {
            visit(*slot);
        }
        for (_, id) in &self.captured {
            visit(*id);
        }
    }

    pub fn push_defer(&mut self, body: std::rc::Rc<[crate::air::AirNode]>, loc: crate::error::SourceLoc) {
        self.deferred.push(DeferredAction { body, loc });
    }

    /// Drains pending `defer` thunks in reverse registration order: thunks
    /// run in reverse registration order at scope exit (normal, return, or
    /// exception).
    pub fn take_deferred_reversed(&mut self) -> Vec<DeferredAction> {
        let mut actions = std::mem::take(&mut self.deferred);
        actions.reverse();
        actions
    }

    pub const DEFER_FRAME_KIND: FrameKind = FrameKind::Defer;
}
