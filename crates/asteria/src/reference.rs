//! Addressable locations.
//!
//! Grounded on `original_source/asteria/runtime/reference_modifier.{hpp,cpp}`:
//! a [`Reference`] is a root (uninitialized, void, a temporary value, a
//! GC-tracked variable, or a call-frame stack slot) plus a small inline
//! stack of [`Modifier`]s that is walked lazily whenever the reference is
//! dereferenced. The four dereference operations — read, read (absent-aware),
//! open, unset — mirror `apply_read_opt`/`apply_write_opt`/`apply_open`/
//! `apply_unset` in the original exactly.

use smallvec::SmallVec;

use crate::{
    error::{BacktraceFrame, Exception, FrameKind, RunResult, SourceLoc},
    gc::{GcId, Heap, Traceable},
    value::{Rstr, Value},
};

/// A modifier selecting a sub-location of a referent.
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    ArrayIndex(i64),
    ObjectKey(Rstr),
    ArrayHead,
    ArrayTail,
    /// A seeded pick, resolved to a concrete index once the parent's
    /// length is known (the `[?]` suffix form).
    ArrayRandom(u32),
}

/// What a [`Reference`] is rooted at, before any modifiers are applied.
#[derive(Debug, Clone)]
pub enum RefRoot {
    /// Dereference is always an error.
    Uninit,
    /// Call-result sentinel; dereference is always an error.
    Void,
    /// An rvalue holding a value by itself.
    Temporary(Value),
    /// An lvalue bound to a GC-tracked variable.
    Variable(GcId),
    /// A slot in the current call frame's argument area, used while
    /// binding parameters.
    StackSlot(usize),
    /// A tail-call placeholder: the callee has not run yet, so
    /// dereferencing it is only valid after the engine resolves it at a
    /// frame boundary.
    TailCall,
}

/// An addressable location: a root plus a chain of modifiers.
#[derive(Debug, Clone)]
pub struct Reference {
    root: RefRoot,
    modifiers: SmallVec<[Modifier; 4]>,
}

fn type_error(message: String, loc: &SourceLoc) -> Exception {
    let mut exc = Exception::new(Value::from(message));
    exc.push_frame(loc.clone(), FrameKind::Native);
    exc
}

impl Reference {
    #[must_use]
    pub fn uninit() -> Self {
        Self { root: RefRoot::Uninit, modifiers: SmallVec::new() }
    }

    #[must_use]
    pub fn void() -> Self {
        Self { root: RefRoot::Void, modifiers: SmallVec::new() }
    }

    #[must_use]
    pub fn temporary(value: Value) -> Self {
        Self { root: RefRoot::Temporary(value), modifiers: SmallVec::new() }
    }

    #[must_use]
    pub fn variable(id: GcId) -> Self {
        Self { root: RefRoot::Variable(id), modifiers: SmallVec::new() }
    }

    #[must_use]
    pub fn stack_slot(index: usize) -> Self {
        Self { root: RefRoot::StackSlot(index), modifiers: SmallVec::new() }
    }

    #[must_use]
    pub fn tail_call() -> Self {
        Self { root: RefRoot::TailCall, modifiers: SmallVec::new() }
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self.root, RefRoot::Void)
    }

    #[must_use]
    pub fn is_tail_call(&self) -> bool {
        matches!(self.root, RefRoot::TailCall)
    }

    pub fn push_modifier(&mut self, modifier: Modifier) {
        self.modifiers.push(modifier);
    }

    /// GC trace hook: a reference keeps its root variable (if
    /// any) alive, plus whatever the root variable transitively reaches. A
    /// temporary holds a value directly rather than through the heap, so it
    /// is traced the same way a heap variable's payload would be.
    pub fn trace(&self, visit: &mut dyn FnMut(GcId)) {
        match &self.root {
            RefRoot::Variable(id) => visit(*id),
            RefRoot::Temporary(value) => value.trace(visit),
            RefRoot::Uninit | RefRoot::Void | RefRoot::StackSlot(_) | RefRoot::TailCall => {}
        }
    }

    /// Root-only access, used by the engine when assigning to a bare
    /// variable (no modifiers) without cloning the existing value first.
    #[must_use]
    pub fn variable_id(&self) -> Option<GcId> {
        match self.root {
            RefRoot::Variable(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the root variable was declared `const`:
    /// assigning through such a reference is always an error. A reference
    /// with no variable root (e.g. a temporary) is never immutable in this
    /// sense — writes through it are rejected elsewhere for other reasons.
    #[must_use]
    pub fn is_root_immutable(&self, heap: &Heap) -> bool {
        match self.root {
            RefRoot::Variable(id) => heap.get(id).immutable,
            _ => false,
        }
    }

    fn root_read<'h>(&self, heap: &'h Heap, loc: &SourceLoc) -> RunResult<std::borrow::Cow<'h, Value>> {
        match &self.root {
            RefRoot::Uninit => Err(type_error("dereferenced an uninitialized reference".into(), loc)),
            RefRoot::Void => Err(type_error("dereferenced a void reference".into(), loc)),
            RefRoot::Temporary(value) => Ok(std::borrow::Cow::Owned(value.clone())),
            RefRoot::Variable(id) => Ok(std::borrow::Cow::Borrowed(&heap.get(*id).value)),
            RefRoot::StackSlot(_) => Err(type_error("dereferenced an unresolved stack slot".into(), loc)),
            RefRoot::TailCall => Err(type_error("dereferenced an unresolved tail call".into(), loc)),
        }
    }

    /// Read-only dereference: null while traversing through a
    /// `null` intermediate, an error when the parent type cannot accept
    /// the modifier.
    pub fn read(&self, heap: &Heap, loc: &SourceLoc) -> RunResult<Value> {
        let root = self.root_read(heap, loc)?;
        let mut current = root.into_owned();
        for modifier in &self.modifiers {
            current = apply_read(&current, modifier, loc)?;
        }
        Ok(current)
    }

    /// Like [`Reference::read`], but traversal through `null` yields
    /// `Ok(None)` rather than `Value::Null`, since a mutable dereference that
    /// passes through an absent intermediate has nothing to mutate.
    pub fn read_mut_view(&self, heap: &Heap, loc: &SourceLoc) -> RunResult<Option<Value>> {
        let root = self.root_read(heap, loc)?;
        let mut current = root.into_owned();
        for modifier in &self.modifiers {
            if matches!(current, Value::Null) {
                return Ok(None);
            }
            current = apply_read(&current, modifier, loc)?;
        }
        Ok(Some(current))
    }

    /// Creates missing intermediates and returns a mutable handle to the
    /// addressed slot.
    pub fn open<'h>(&self, heap: &'h mut Heap, loc: &SourceLoc) -> RunResult<&'h mut Value> {
        let mut cursor: &mut Value = match &self.root {
            RefRoot::Variable(id) => &mut heap.get_mut(*id).value,
            RefRoot::Uninit => return Err(type_error("cannot open an uninitialized reference".into(), loc)),
            RefRoot::Void => return Err(type_error("cannot open a void reference".into(), loc)),
            RefRoot::Temporary(_) => return Err(type_error("cannot open a temporary reference".into(), loc)),
            RefRoot::StackSlot(_) => return Err(type_error("cannot open an unresolved stack slot".into(), loc)),
            RefRoot::TailCall => return Err(type_error("cannot open an unresolved tail call".into(), loc)),
        };
        for modifier in &self.modifiers {
            cursor = apply_open(cursor, modifier, loc)?;
        }
        Ok(cursor)
    }

    /// Removes the addressed element and returns its previous value, or
    /// `Value::Null` if absent.
    pub fn unset(&self, heap: &mut Heap, loc: &SourceLoc) -> RunResult<Value> {
        let Some((last, init)) = self.modifiers.split_last() else {
            return Err(type_error("cannot unset a reference with no modifiers".into(), loc));
        };
        let mut cursor: &mut Value = match &self.root {
            RefRoot::Variable(id) => &mut heap.get_mut(*id).value,
            _ => return Err(type_error("cannot unset a non-variable reference".into(), loc)),
        };
        for modifier in init {
            if matches!(cursor, Value::Null) {
                return Ok(Value::Null);
            }
            cursor = apply_open(cursor, modifier, loc)?;
        }
        apply_unset(cursor, last, loc)
    }
}

fn wrap_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        usize::try_from(index).ok().filter(|i| *i < len)
    } else {
        let wrapped = len as i64 + index;
        if wrapped < 0 { None } else { usize::try_from(wrapped).ok().filter(|i| *i < len) }
    }
}

fn apply_read(parent: &Value, modifier: &Modifier, loc: &SourceLoc) -> RunResult<Value> {
    match (parent, modifier) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Array(arr), Modifier::ArrayIndex(i)) => {
            Ok(wrap_index(*i, arr.len()).map_or(Value::Null, |i| arr[i].clone()))
        }
        (Value::Array(arr), Modifier::ArrayHead) => Ok(arr.first().cloned().unwrap_or(Value::Null)),
        (Value::Array(arr), Modifier::ArrayTail) => Ok(arr.last().cloned().unwrap_or(Value::Null)),
        (Value::Array(arr), Modifier::ArrayRandom(seed)) => {
            Ok(if arr.is_empty() { Value::Null } else { arr[(*seed as usize) % arr.len()].clone() })
        }
        (Value::String(s), Modifier::ArrayIndex(i)) => {
            Ok(wrap_index(*i, s.len()).map_or(Value::Null, |i| Value::from(&s[i..=i])))
        }
        (Value::Object(obj), Modifier::ObjectKey(key)) => Ok(obj.get(key.as_ref()).cloned().unwrap_or(Value::Null)),
        (other, modifier) => Err(type_error(
            format!("value of type `{}` cannot accept modifier {modifier:?}", other.type_name()),
            loc,
        )),
    }
}

fn apply_open<'v>(parent: &'v mut Value, modifier: &Modifier, loc: &SourceLoc) -> RunResult<&'v mut Value> {
    if matches!(parent, Value::Null) {
        *parent = match modifier {
            Modifier::ObjectKey(_) => Value::Object(std::rc::Rc::new(indexmap::IndexMap::new())),
            _ => Value::Array(std::rc::Rc::new(Vec::new())),
        };
    }
    match (parent, modifier) {
        (Value::Array(arr), Modifier::ArrayIndex(i)) => {
            let vec = std::rc::Rc::make_mut(arr);
            let idx = if *i >= 0 {
                usize::try_from(*i).expect("non-negative")
            } else {
                let wrapped = vec.len() as i64 + i;
                if wrapped < 0 {
                    return Err(type_error("array index out of range when opening a reference".into(), loc));
                }
                usize::try_from(wrapped).expect("checked non-negative above")
            };
            if idx >= vec.len() {
                vec.resize(idx + 1, Value::Null);
            }
            Ok(&mut vec[idx])
        }
        (Value::Array(arr), Modifier::ArrayHead) => {
            let vec = std::rc::Rc::make_mut(arr);
            if vec.is_empty() {
                vec.push(Value::Null);
            }
            Ok(&mut vec[0])
        }
        (Value::Array(arr), Modifier::ArrayTail) => {
            let vec = std::rc::Rc::make_mut(arr);
            if vec.is_empty() {
                vec.push(Value::Null);
            }
            let last = vec.len() - 1;
            Ok(&mut vec[last])
        }
        (Value::Array(arr), Modifier::ArrayRandom(seed)) => {
            let vec = std::rc::Rc::make_mut(arr);
            if vec.is_empty() {
                vec.push(Value::Null);
            }
            let idx = (*seed as usize) % vec.len();
            Ok(&mut vec[idx])
        }
        (Value::Object(obj), Modifier::ObjectKey(key)) => {
            let map = std::rc::Rc::make_mut(obj);
            Ok(map.entry(key.clone()).or_insert(Value::Null))
        }
        (other, modifier) => Err(type_error(
            format!("value of type `{}` cannot accept modifier {modifier:?}", other.type_name()),
            loc,
        )),
    }
}

fn apply_unset(parent: &mut Value, modifier: &Modifier, loc: &SourceLoc) -> RunResult<Value> {
    match (parent, modifier) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Array(arr), Modifier::ArrayIndex(i)) => match wrap_index(*i, arr.len()) {
            Some(idx) => {
                let vec = std::rc::Rc::make_mut(arr);
                Ok(vec.remove(idx))
            }
            None => Ok(Value::Null),
        },
        (Value::Array(arr), Modifier::ArrayHead) => {
            if arr.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(std::rc::Rc::make_mut(arr).remove(0))
            }
        }
        (Value::Array(arr), Modifier::ArrayTail) => {
            if arr.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(std::rc::Rc::make_mut(arr).pop().expect("checked non-empty"))
            }
        }
        (Value::Array(arr), Modifier::ArrayRandom(seed)) => {
            if arr.is_empty() {
                Ok(Value::Null)
            } else {
                let idx = (*seed as usize) % arr.len();
                Ok(std::rc::Rc::make_mut(arr).remove(idx))
            }
        }
        (Value::Object(obj), Modifier::ObjectKey(key)) => {
            let map = std::rc::Rc::make_mut(obj);
            Ok(map.shift_remove(key.as_ref()).unwrap_or(Value::Null))
        }
        (other, modifier) => Err(type_error(
            format!("value of type `{}` cannot accept modifier {modifier:?}", other.type_name()),
            loc,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Variable;

    fn loc() -> SourceLoc {
        SourceLoc::new(std::rc::Rc::from("test"), 1, 1)
    }

    #[test]
    fn negative_index_wraps() {
        let arr = Value::from(vec![Value::Integer(10), Value::Integer(20), Value::Integer(30)]);
        let mut heap = Heap::new();
        let id = heap.allocate(Variable::new(arr, false));
        let mut r = Reference::variable(id);
        r.push_modifier(Modifier::ArrayIndex(-1));
        assert!(matches!(r.read(&heap, &loc()).unwrap(), Value::Integer(30)));
    }

    #[test]
    fn out_of_range_negative_index_is_absent() {
        let arr = Value::from(vec![Value::Integer(10)]);
        let mut heap = Heap::new();
        let id = heap.allocate(Variable::new(arr, false));
        let mut r = Reference::variable(id);
        r.push_modifier(Modifier::ArrayIndex(-5));
        assert!(matches!(r.read(&heap, &loc()).unwrap(), Value::Null));
    }

    #[test]
    fn open_extends_array_and_inserts_object_key() {
        let mut heap = Heap::new();
        let id = heap.allocate(Variable::new(Value::Null, false));
        let mut r = Reference::variable(id);
        r.push_modifier(Modifier::ArrayIndex(2));
        *r.open(&mut heap, &loc()).unwrap() = Value::Integer(7);
        let Value::Array(arr) = &heap.get(id).value else { panic!("expected array") };
        assert_eq!(arr.len(), 3);
        assert!(matches!(arr[2], Value::Integer(7)));
    }

    #[test]
    fn unset_removes_and_returns_previous_value() {
        let obj = Value::Object(std::rc::Rc::new(indexmap::indexmap! { std::rc::Rc::from("x") => Value::Integer(5) }));
        let mut heap = Heap::new();
        let id = heap.allocate(Variable::new(obj, false));
        let mut r = Reference::variable(id);
        r.push_modifier(Modifier::ObjectKey(std::rc::Rc::from("x")));
        let prev = r.unset(&mut heap, &loc()).unwrap();
        assert!(matches!(prev, Value::Integer(5)));
        let Value::Object(obj) = &heap.get(id).value else { panic!("expected object") };
        assert!(obj.is_empty());
    }
}
