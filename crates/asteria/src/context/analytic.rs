//! Compile-time scope.
//!
//! Tracks which names are visible at a point in the program and how each
//! resolves: a local slot in the function currently being compiled, a
//! captured slot pulled in from an enclosing function's closure, or a
//! global (resolved at runtime against the [`crate::global::GlobalContext`]).
//! Mirrors the `Scope`/`Analytic_Context` split: a stack of
//! block-scoped name tables plus one function-level table for captures.

use ahash::AHashMap;

use crate::value::Rstr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Local(usize),
    Captured(usize),
    Global,
}

struct BlockScope {
    names: AHashMap<Rstr, usize>,
}

/// One function's worth of compile-time scope: a stack of nested block
/// scopes, plus the set of outer names this function has already captured.
pub struct AnalyticContext<'p> {
    parent: Option<&'p AnalyticContext<'p>>,
    blocks: Vec<BlockScope>,
    next_local: usize,
    captures: Vec<Rstr>,
}

impl<'p> AnalyticContext<'p> {
    #[must_use]
    pub fn new_toplevel() -> Self {
        Self { parent: None, blocks: vec![BlockScope { names: AHashMap::new() }], next_local: 0, captures: Vec::new() }
    }

    #[must_use]
    pub fn new_nested(parent: &'p AnalyticContext<'p>) -> Self {
        Self { parent: Some(parent), blocks: vec![BlockScope { names: AHashMap::new() }], next_local: 0, captures: Vec::new() }
    }

    pub fn push_block(&mut self) {
        self.blocks.push(BlockScope { names: AHashMap::new() });
    }

    pub fn pop_block(&mut self) {
        self.blocks.pop();
    }

    /// Declares `name` as a new local in the innermost block, returning its
    /// slot index within the current function's namespace.
    pub fn declare(&mut self, name: Rstr) -> usize {
        let slot = self.next_local;
        self.next_local += 1;
        self.blocks.last_mut().expect("at least one block").names.insert(name, slot);
        slot
    }

    /// Resolves `name` against this function's own scopes, then the
    /// capture list, recursing into the parent function's scope on a
    /// first-time capture and recording it so the closure knows to grab it.
    pub fn resolve(&mut self, name: &str) -> Resolution {
        for block in self.blocks.iter().rev() {
            if let Some(&slot) = block.names.get(name) {
                return Resolution::Local(slot);
            }
        }
        if let Some(pos) = self.captures.iter().position(|n| &**n == name) {
            return Resolution::Captured(pos);
        }
        if let Some(parent) = self.parent {
            // Parents are immutable from here (we only hold `&`), so we
            // cannot update the parent's own capture bookkeeping; a capture
            // only needs to prove the name resolves *somewhere* outward.
            if parent.resolve_readonly(name) {
                let idx = self.captures.len();
                self.captures.push(name.into());
                return Resolution::Captured(idx);
            }
        }
        Resolution::Global
    }

    fn resolve_readonly(&self, name: &str) -> bool {
        self.blocks.iter().rev().any(|b| b.names.contains_key(name))
            || self.captures.iter().any(|n| &**n == name)
            || self.parent.is_some_and(|p| p.resolve_readonly(name))
    }

    #[must_use]
    pub fn namespace_size(&self) -> usize {
        self.next_local
    }

    #[must_use]
    pub fn captures(&self) -> &[Rstr] {
        &self.captures
    }
}
