//! Compile-time configuration.

/// Options accepted by [`compile`](crate::compile).
///
/// All fields have conservative defaults; a caller embedding Asteria in a
/// larger host typically only ever sets `optimization_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Optimization level, 0 through 9. Currently only 0 (no constant
    /// folding in the AIR compiler) and non-zero (fold constant-only
    /// expression units at compile time) are distinguished; the remaining
    /// levels are accepted for forward compatibility with a future
    /// optimizer and behave identically to a non-zero level.
    pub optimization_level: u8,

    /// Allow `\'` inside single-quoted-equivalent contexts where the base
    /// grammar would otherwise treat the backslash as a literal character.
    pub escapable_single_quotes: bool,

    /// Permit keywords to be used as plain identifiers outside of a
    /// declaration context (e.g. `obj.if`).
    pub keywords_as_identifiers: bool,

    /// Fold every integer literal into a real-number literal at parse
    /// time. Used by JSON5-flavored embeddings where the grammar is reused
    /// but the target language has no distinct integer type.
    pub integers_as_reals: bool,

    /// Emit a single-step trap before every statement, for interactive
    /// debugging front-ends. The core does not itself implement a debugger
    /// protocol; this only controls whether the
    /// AIR compiler emits the trap nodes a host-side hook can observe.
    pub verbose_single_step_traps: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimization_level: 0,
            escapable_single_quotes: false,
            keywords_as_identifiers: false,
            integers_as_reals: false,
            verbose_single_step_traps: false,
        }
    }
}

impl CompileOptions {
    #[must_use]
    pub fn optimize(mut self, level: u8) -> Self {
        self.optimization_level = level.min(9);
        self
    }

    #[must_use]
    pub fn is_optimizing(self) -> bool {
        self.optimization_level > 0
    }
}
