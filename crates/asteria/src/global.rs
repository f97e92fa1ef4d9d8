//! The global context.
//!
//! Owns everything that is shared across every executive context in a
//! single embedding session: the GC heap, host-registered bindings, the
//! seeded PRNG backing `[?]` random-element access, and a small set of
//! execution hooks a host can register for single-step tracing. Narrowed
//! to what an embeddable core needs rather than a whole module/import
//! system.

use ahash::AHashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    error::SourceLoc,
    function::HostFunction,
    gc::{Generation, GcId, Heap, Variable},
    value::{Rstr, Value},
};

/// A host-registered callback fired before each statement executes, used
/// by interactive front-ends for single-stepping. The core never implements a debugger
/// protocol itself; this is the only hook it exposes.
pub type StepHook = dyn Fn(&SourceLoc);

pub struct GlobalContext {
    heap: Heap,
    bindings: AHashMap<Rstr, GcId>,
    rng: ChaCha8Rng,
    hooks: Vec<std::rc::Rc<StepHook>>,
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalContext {
    #[must_use]
    pub fn new() -> Self {
        Self { heap: Heap::new(), bindings: AHashMap::new(), rng: ChaCha8Rng::from_entropy(), hooks: Vec::new() }
    }

    /// Deterministic construction, primarily for tests: same seed, same
    /// sequence of `[?]` picks.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { heap: Heap::new(), bindings: AHashMap::new(), rng: ChaCha8Rng::seed_from_u64(seed), hooks: Vec::new() }
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Registers a host value into the global namespace. Overwrites any
    /// existing binding of the same name.
    pub fn bind(&mut self, name: impl Into<Rstr>, value: Value, immutable: bool) {
        let id = self.heap.allocate(Variable::new(value, immutable));
        self.bindings.insert(name.into(), id);
    }

    pub fn bind_function(&mut self, func: HostFunction) {
        let name = func.name.clone();
        self.bind(name, Value::Function(std::rc::Rc::new(func)), true);
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<GcId> {
        self.bindings.get(name).copied()
    }

    pub fn register_hook(&mut self, hook: impl Fn(&SourceLoc) + 'static) {
        self.hooks.push(std::rc::Rc::new(hook));
    }

    pub(crate) fn fire_hooks(&self, loc: &SourceLoc) {
        for hook in &self.hooks {
            hook(loc);
        }
    }

    #[must_use]
    pub fn random_u32(&mut self) -> u32 {
        self.rng.gen()
    }

    /// Roots used by a collection: every global binding, plus whatever the
    /// running engine currently has live (passed in by the caller) — the
    /// eval stack and executive contexts.
    pub fn collect_garbage(&mut self, extra_roots: impl IntoIterator<Item = GcId>, up_to: Generation) {
        let roots: Vec<GcId> = self.bindings.values().copied().chain(extra_roots).collect();
        self.heap.collect(roots.iter(), up_to);
    }

    /// Whether any generation is due for a collection, cheap enough to call
    /// before a caller bothers assembling `extra_roots` for
    /// [`Self::collect_if_needed`].
    #[must_use]
    pub fn needs_collection(&self) -> bool {
        self.heap.should_collect(Generation::Oldest)
            || self.heap.should_collect(Generation::Middle)
            || self.heap.should_collect(Generation::Newest)
    }

    pub fn collect_if_needed(&mut self, extra_roots: impl IntoIterator<Item = GcId>) {
        if self.heap.should_collect(Generation::Oldest) {
            self.collect_garbage(extra_roots, Generation::Oldest);
        } else if self.heap.should_collect(Generation::Middle) {
            self.collect_garbage(extra_roots, Generation::Middle);
        } else if self.heap.should_collect(Generation::Newest) {
            self.collect_garbage(extra_roots, Generation::Newest);
        }
    }
}
