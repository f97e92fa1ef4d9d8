//! Overload resolution for host functions.
//!
//! Mirrors `original_source/src/runtime/argument_reader.{hpp,cpp}` closely:
//! a host function tries each of its overloads in turn by calling
//! [`ArgumentReader::start_overload`], pulling arguments off with
//! `optional`/`required`, and checking [`ArgumentReader::end_overload`] to
//! confirm every argument was consumed and every required slot was filled.
//! If no overload matches, [`ArgumentReader::throw_no_matching_function_call`]
//! raises a catchable exception describing what was actually passed.

use crate::{
    error::{Exception, FrameKind, SourceLoc},
    gc::Heap,
    reference::Reference,
    value::{Rstr, Value},
};

/// A type a host function argument can be read as.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }
}

impl FromValue for Rstr {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

pub struct ArgumentReader<'a> {
    func_name: &'a str,
    values: Vec<Value>,
    loc: SourceLoc,
    pos: usize,
    matched: bool,
}

impl<'a> ArgumentReader<'a> {
    pub fn new(func_name: &'a str, args: &[Reference], heap: &Heap, loc: SourceLoc) -> Result<Self, Exception> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(arg.read(heap, &loc)?);
        }
        Ok(Self { func_name, values, loc, pos: 0, matched: true })
    }

    /// Begins a fresh overload attempt: rewinds to the first argument and
    /// clears the failure flag set by a previous unsuccessful attempt.
    pub fn start_overload(&mut self) -> &mut Self {
        self.pos = 0;
        self.matched = true;
        self
    }

    /// Reads an optional trailing argument: leaves `out` untouched (at its
    /// caller-supplied default) if there are no more arguments, fails the
    /// overload if one is present but of the wrong type.
    pub fn optional<T: FromValue>(&mut self, out: &mut Option<T>) -> &mut Self {
        if !self.matched || self.pos >= self.values.len() {
            return self;
        }
        match T::from_value(&self.values[self.pos]) {
            Some(v) => {
                *out = Some(v);
                self.pos += 1;
            }
            None => self.matched = false,
        }
        self
    }

    /// Reads a required argument, failing the overload if it is missing or
    /// of the wrong type.
    pub fn required<T: FromValue>(&mut self, out: &mut T) -> &mut Self {
        if !self.matched {
            return self;
        }
        let Some(value) = self.values.get(self.pos) else {
            self.matched = false;
            return self;
        };
        match T::from_value(value) {
            Some(v) => {
                *out = v;
                self.pos += 1;
            }
            None => self.matched = false,
        }
        self
    }

    /// Confirms this overload consumed every supplied argument. Must be
    /// called after the last `optional`/`required` in an overload attempt.
    #[must_use]
    pub fn end_overload(&self) -> bool {
        self.matched && self.pos == self.values.len()
    }

    #[must_use]
    pub fn throw_no_matching_function_call(&self) -> Exception {
        let message = format!(
            "no matching overload for `{}` with {} argument(s) of type(s) [{}]",
            self.func_name,
            self.values.len(),
            self.values.iter().map(Value::type_name).collect::<Vec<_>>().join(", ")
        );
        let mut exc = Exception::new(Value::from(message));
        exc.push_frame(self.loc.clone(), FrameKind::Native);
        exc
    }
}
