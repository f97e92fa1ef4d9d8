//! Error taxonomy for the interpreter core.
//!
//! There are exactly two kinds of error a caller of the [`compile`](crate::compile)
//! and [`execute`](crate::execute) APIs can observe: a [`CompileError`], raised
//! while turning source text into a [`Program`](crate::Program), and an
//! [`Exception`], raised while executing one. The two never mix: a compile
//! error aborts compilation outright, surfacing the first error encountered,
//! while an exception is a normal, catchable runtime value accompanied by a
//! backtrace.

use std::fmt;

use crate::value::Value;

/// A location in source text: file name, 1-based line, 1-based column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceLoc {
    pub file: std::rc::Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    #[must_use]
    pub fn new(file: std::rc::Rc<str>, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Status codes for [`CompileError`].
///
/// Named after the condition that was expected but not found, mirroring
/// upstream Asteria's status enumeration (`asteria::Compiler_Error::Error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompileStatus {
    UnrecognizedToken,
    UnterminatedStringLiteral,
    InvalidEscapeSequence,
    IntegerOverflow,
    InvalidIntegerOrRealLiteral,
    SemicolonExpected,
    IdentifierExpected,
    OpenBraceExpected,
    ClosedBraceExpected,
    OpenParenthesisExpected,
    ClosedParenthesisExpected,
    OpenBracketExpected,
    ClosedBracketExpected,
    EqualsSignExpected,
    ColonExpected,
    CommaExpected,
    StatementExpected,
    ExpressionExpected,
    KeywordWhileExpected,
    KeywordCatchExpected,
    DuplicateKeyInObject,
    ReservedIdentifierNotDeclarable,
    BreakOutsideLoopOrSwitch,
    ContinueOutsideLoop,
    ExpressionNestingTooDeep,
    StatementNestingTooDeep,
    VariadicParameterNotLast,
}

impl CompileStatus {
    #[must_use]
    pub fn describe(self) -> &'static str {
        use CompileStatus::{
            BreakOutsideLoopOrSwitch, ClosedBraceExpected, ClosedBracketExpected, ClosedParenthesisExpected,
            ColonExpected, CommaExpected, ContinueOutsideLoop, DuplicateKeyInObject, EqualsSignExpected, ExpressionExpected,
            ExpressionNestingTooDeep, IdentifierExpected, IntegerOverflow, InvalidEscapeSequence,
            InvalidIntegerOrRealLiteral, KeywordCatchExpected, KeywordWhileExpected, OpenBraceExpected,
            OpenBracketExpected, OpenParenthesisExpected, ReservedIdentifierNotDeclarable, SemicolonExpected,
            StatementExpected, StatementNestingTooDeep, UnrecognizedToken, UnterminatedStringLiteral,
            VariadicParameterNotLast,
        };
        match self {
            UnrecognizedToken => "an unrecognized token was encountered",
            UnterminatedStringLiteral => "a string literal was not terminated before end of input",
            InvalidEscapeSequence => "an invalid escape sequence was encountered in a string literal",
            IntegerOverflow => "an integer literal does not fit in a 64-bit signed integer",
            InvalidIntegerOrRealLiteral => "an integer or real-number literal could not be parsed",
            SemicolonExpected => "a semicolon was expected",
            IdentifierExpected => "an identifier was expected",
            OpenBraceExpected => "an open brace was expected",
            ClosedBraceExpected => "a closed brace was expected",
            OpenParenthesisExpected => "an open parenthesis was expected",
            ClosedParenthesisExpected => "a closed parenthesis was expected",
            OpenBracketExpected => "an open bracket was expected",
            ClosedBracketExpected => "a closed bracket was expected",
            EqualsSignExpected => "an equals sign was expected",
            ColonExpected => "a colon was expected",
            CommaExpected => "a comma was expected",
            StatementExpected => "a statement was expected",
            ExpressionExpected => "an expression was expected",
            KeywordWhileExpected => "the keyword `while` was expected",
            KeywordCatchExpected => "the keyword `catch` was expected",
            DuplicateKeyInObject => "a duplicate key was found in an object literal",
            ReservedIdentifierNotDeclarable => "an identifier beginning with `__` is reserved and cannot be declared",
            BreakOutsideLoopOrSwitch => "a `break` statement was found outside any loop or switch",
            ContinueOutsideLoop => "a `continue` statement was found outside any loop",
            ExpressionNestingTooDeep => "an expression is nested too deeply",
            StatementNestingTooDeep => "a statement is nested too deeply",
            VariadicParameterNotLast => "a variadic parameter `...` must be the last parameter",
        }
    }
}

/// An error raised while compiling source text.
///
/// `Display` renders the two-line (optionally three-line) format used by
/// upstream Asteria's CLI:
///
/// ```text
/// compiler error: <description>
/// [status N at 'file:line']
/// [unmatched '<punct>' at 'file:line']
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub struct CompileError {
    pub status: CompileStatus,
    pub loc: SourceLoc,
    pub unmatched: Option<SourceLoc>,
}

impl CompileError {
    #[must_use]
    pub fn new(status: CompileStatus, loc: SourceLoc) -> Self {
        Self { status, loc, unmatched: None }
    }

    #[must_use]
    pub fn with_unmatched(mut self, unmatched: SourceLoc) -> Self {
        self.unmatched = Some(unmatched);
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "compiler error: {}", self.status.describe())?;
        write!(f, "[status {} at '{}']", self.status as i32, self.loc)?;
        if let Some(unmatched) = &self.unmatched {
            write!(f, "\n[unmatched at '{unmatched}']")?;
        }
        Ok(())
    }
}

/// One frame of an exception backtrace.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BacktraceFrame {
    pub loc: SourceLoc,
    pub kind: FrameKind,
}

/// The kind of propagation boundary a backtrace frame was recorded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FrameKind {
    Call,
    Throw,
    Catch,
    Assert,
    Native,
    Defer,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Call => "call",
            Self::Throw => "throw",
            Self::Catch => "catch",
            Self::Assert => "assert",
            Self::Native => "native",
            Self::Defer => "defer",
        };
        f.write_str(s)
    }
}

/// A runtime error: the thrown value plus its backtrace.
///
/// Unlike [`CompileError`], an `Exception` is not necessarily fatal — it is
/// caught by `try`/`catch` or the `catch(expr)` operator, and only escapes
/// the [`execute`](crate::execute) API if nothing along the call chain
/// handles it.
#[derive(Debug, Clone)]
pub struct Exception {
    pub value: Value,
    pub backtrace: Vec<BacktraceFrame>,
}

impl Exception {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value, backtrace: Vec::new() }
    }

    /// Appends a backtrace frame at a propagation boundary.
    pub fn push_frame(&mut self, loc: SourceLoc, kind: FrameKind) {
        self.backtrace.push(BacktraceFrame { loc, kind });
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unhandled exception: {}", self.value.describe())?;
        for frame in &self.backtrace {
            write!(f, "\n  [{} at '{}']", frame.kind, frame.loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

/// Shorthand used throughout the engine for fallible operations that, on
/// failure, propagate as a catchable runtime exception rather than a Rust
/// panic or a compile-time error.
pub type RunResult<T> = Result<T, Exception>;
