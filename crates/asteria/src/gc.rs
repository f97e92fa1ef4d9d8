//! The generational, cycle-collecting garbage collector.
//!
//! Every [`Variable`] lives in a slot owned by the [`Heap`], addressed by a
//! [`GcId`] rather than by `Rc` — unlike the COW containers in [`crate::value`],
//! variables can form cycles (a closure captured in an array element can
//! capture the variable holding that same array), so reference counting
//! alone cannot reclaim them. "Deletion of a variable's last strong
//! reference is merely a hint; actual reclamation happens on collection"
//! is realized literally: dropping a `GcId` does nothing at
//! all, and a slot is only ever freed by [`Heap::collect`].
//!
//! Built on the arena-of-handles idiom
//! (an `ahash`-keyed arena addressed by small integer ids), adapted from
//! manual reference counting to generational mark-and-sweep tracing since
//! variables can form reference cycles that plain `Rc` counting cannot
//! reclaim.

use ahash::{AHashMap, AHashSet};

use crate::value::Value;

/// Handle to a GC-tracked variable. Stable across collections that do not
/// reclaim the referenced slot; never reused while any live reference to
/// the old occupant could still observe it, because an occupant is only
/// removed from its slot when the collector proves it unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcId {
    index: u32,
    epoch: u32,
}

/// The generation a variable currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Generation {
    Newest,
    Middle,
    Oldest,
}

impl Generation {
    fn next(self) -> Option<Self> {
        match self {
            Self::Newest => Some(Self::Middle),
            Self::Middle => Some(Self::Oldest),
            Self::Oldest => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Newest => 0,
            Self::Middle => 1,
            Self::Oldest => 2,
        }
    }
}

/// A GC-tracked heap cell.
#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub initialized: bool,
    pub immutable: bool,
}

impl Variable {
    #[must_use]
    pub fn uninitialized(immutable: bool) -> Self {
        Self { value: Value::Null, initialized: false, immutable }
    }

    #[must_use]
    pub fn new(value: Value, immutable: bool) -> Self {
        Self { value, initialized: true, immutable }
    }
}

/// Trace hook: visits every [`GcId`] transitively reachable through a
/// value's `collect_variables` hook.
pub trait Traceable {
    fn trace(&self, visit: &mut dyn FnMut(GcId));
}

impl Traceable for Value {
    fn trace(&self, visit: &mut dyn FnMut(GcId)) {
        match self {
            Self::Null | Self::Boolean(_) | Self::Integer(_) | Self::Real(_) | Self::String(_) => {}
            Self::Array(items) => {
                for item in items.iter() {
                    item.trace(visit);
                }
            }
            Self::Object(map) => {
                for item in map.values() {
                    item.trace(visit);
                }
            }
            Self::Opaque(o) => o.collect_variables(visit),
            Self::Function(f) => f.collect_variables(visit),
        }
    }
}

struct Slot {
    occupant: Option<Variable>,
    epoch: u32,
    generation: Generation,
    marked: bool,
}

/// Per-generation bookkeeping: how many allocations have landed in this
/// generation since its last sweep, and the threshold that triggers one.
#[derive(Debug, Clone, Copy)]
struct GenCounter {
    allocated: usize,
    threshold: usize,
}

impl GenCounter {
    fn new(threshold: usize) -> Self {
        Self { allocated: 0, threshold }
    }
}

/// The three-generation heap: newest, middle, and oldest allocations are
/// traced and promoted independently so a full mark pass over everything
/// is rare.
pub struct Heap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    counters: [GenCounter; 3],
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Default allocation threshold before a generation's first collection.
    /// Chosen small enough that unit tests can exercise promotion and
    /// collection without allocating thousands of variables.
    pub const DEFAULT_THRESHOLD: usize = 4096;

    #[must_use]
    pub fn new() -> Self {
        Self::with_thresholds(Self::DEFAULT_THRESHOLD, Self::DEFAULT_THRESHOLD * 4, Self::DEFAULT_THRESHOLD * 16)
    }

    #[must_use]
    pub fn with_thresholds(newest: usize, middle: usize, oldest: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            counters: [GenCounter::new(newest), GenCounter::new(middle), GenCounter::new(oldest)],
        }
    }

    /// Allocates a new variable in generation "newest".
    pub fn allocate(&mut self, var: Variable) -> GcId {
        self.counters[Generation::Newest.index()].allocated += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.occupant = Some(var);
            slot.generation = Generation::Newest;
            slot.marked = false;
            GcId { index, epoch: slot.epoch }
        } else {
            let index = u32::try_from(self.slots.len()).expect("heap exceeds u32 slot capacity");
            self.slots.push(Slot { occupant: Some(var), epoch: 0, generation: Generation::Newest, marked: false });
            GcId { index, epoch: 0 }
        }
    }

    fn slot(&self, id: GcId) -> &Slot {
        let slot = &self.slots[id.index as usize];
        assert!(slot.epoch == id.epoch && slot.occupant.is_some(), "dereferenced a collected GcId");
        slot
    }

    fn slot_mut(&mut self, id: GcId) -> &mut Slot {
        let slot = &mut self.slots[id.index as usize];
        assert!(slot.epoch == id.epoch && slot.occupant.is_some(), "dereferenced a collected GcId");
        slot
    }

    #[must_use]
    pub fn get(&self, id: GcId) -> &Variable {
        self.slot(id).occupant.as_ref().expect("checked by slot()")
    }

    pub fn get_mut(&mut self, id: GcId) -> &mut Variable {
        self.slot_mut(id).occupant.as_mut().expect("checked by slot_mut()")
    }

    /// Whether the generation(s) up to and including `up_to` should be
    /// collected right now, per their allocation counters.
    #[must_use]
    pub fn should_collect(&self, up_to: Generation) -> bool {
        (0..=up_to.index()).any(|i| self.counters[i].allocated >= self.counters[i].threshold)
    }

    /// Traces from `roots`, sweeps unreached variables in generations
    /// `<= up_to`, and promotes survivors one generation.
    ///
    /// Tracing uses two `ahash`-backed sets — one tracking ids already
    /// queued, one tracking ids already visited, avoiding re-visiting shared
    /// substructure.
    pub fn collect<'a>(&mut self, roots: impl IntoIterator<Item = &'a GcId>, up_to: Generation) {
        let mut visited: AHashSet<GcId> = AHashSet::new();
        let mut staged: Vec<GcId> = roots.into_iter().copied().collect();
        let mut queued: AHashSet<GcId> = staged.iter().copied().collect();

        while let Some(id) = staged.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(slot) = self.slots.get_mut(id.index as usize) {
                if slot.epoch == id.epoch {
                    slot.marked = true;
                }
            }
            let mut successors = Vec::new();
            if let Some(var) = self.slots.get(id.index as usize).and_then(|s| s.occupant.as_ref()) {
                var.value.trace(&mut |succ| successors.push(succ));
            }
            for succ in successors {
                if queued.insert(succ) {
                    staged.push(succ);
                }
            }
        }

        let mut promotions: AHashMap<Generation, usize> = AHashMap::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.occupant.is_none() || slot.generation.index() > up_to.index() {
                continue;
            }
            if slot.marked {
                if let Some(next) = slot.generation.next() {
                    slot.generation = next;
                    *promotions.entry(next).or_default() += 1;
                }
            } else {
                slot.occupant = None;
                slot.epoch = slot.epoch.wrapping_add(1);
                self.free_list.push(u32::try_from(index).expect("index fits u32"));
            }
            slot.marked = false;
        }

        for i in 0..=up_to.index() {
            self.counters[i].allocated = 0;
        }
        for (gen, count) in promotions {
            self.counters[gen.index()].allocated += count;
        }
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupant.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_read_back() {
        let mut heap = Heap::new();
        let id = heap.allocate(Variable::new(Value::Integer(42), false));
        assert_eq!(heap.get(id).value.type_name(), "integer");
    }

    #[test]
    fn unreachable_variable_is_reclaimed() {
        let mut heap = Heap::new();
        let kept = heap.allocate(Variable::new(Value::Integer(1), false));
        let _dropped = heap.allocate(Variable::new(Value::Integer(2), false));
        assert_eq!(heap.live_count(), 2);
        heap.collect([&kept], Generation::Newest);
        assert_eq!(heap.live_count(), 1);
        assert_eq!(heap.get(kept).value.type_name(), "integer");
    }

    #[test]
    fn slot_is_recycled_after_collection() {
        let mut heap = Heap::new();
        let a = heap.allocate(Variable::new(Value::Integer(1), false));
        heap.collect([], Generation::Newest);
        let b = heap.allocate(Variable::new(Value::Integer(2), false));
        assert_eq!(a.index, b.index);
        assert_ne!(a.epoch, b.epoch);
    }
}
