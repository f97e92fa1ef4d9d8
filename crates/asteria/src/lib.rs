//! Asteria: an embeddable, dynamically-typed scripting language core.
//!
//! The crate exposes two entry points, mirroring the original
//! implementation's compile/execute split: [`compile`] turns source text
//! into a [`Program`] (a compiled top-level script body plus its namespace
//! size), and [`execute`] runs that program's statements against a
//! [`GlobalContext`] the embedder owns across calls. Everything else —
//! the value model, the GC, the reference/modifier system, the AIR tree,
//! and the engine that walks it — is reachable through the modules below
//! for an embedder that wants finer control (e.g. registering host
//! functions before running a script, or reusing one `GlobalContext`
//! across many `execute` calls the way a REPL does).

pub mod air;
pub mod ast;
pub mod context;
pub mod engine;
pub mod error;
pub mod function;
pub mod gc;
pub mod global;
pub mod host;
pub mod intern;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod reference;
pub mod stack;
pub mod value;

use std::rc::Rc;

pub use error::{CompileError, CompileStatus, Exception, RunResult, SourceLoc};
pub use function::{CompiledFunction, FunctionValue, HostFunction};
pub use gc::{GcId, Heap};
pub use global::GlobalContext;
pub use options::CompileOptions;
pub use reference::Reference;
pub use value::Value;

use air::{compiler::Compiler, node::AirNode};
use context::ExecutiveContext;
use stack::EvalStack;

/// A compiled, host-independent script body.
///
/// Holds no GC state of its own — a `Program` can be compiled once and
/// executed any number of times, against any number of [`GlobalContext`]s,
/// the way upstream Asteria's `Statement_Sequence` is reused across REPL
/// turns.
pub struct Program {
    body: Rc<[AirNode]>,
    namespace_size: usize,
    file: Rc<str>,
}

impl Program {
    #[must_use]
    pub fn namespace_size(&self) -> usize {
        self.namespace_size
    }
}

/// Compiles source text into a [`Program`].
///
/// Aborts at the first error encountered, rather than collecting a list —
/// upstream Asteria's compiler does the same, surfacing one
/// [`CompileError`] per call.
pub fn compile(source: &str, file_name: &str, options: &CompileOptions) -> Result<Program, CompileError> {
    let file: Rc<str> = Rc::from(file_name);
    let block = parser::Parser::parse_program(source, &file, options)?;
    let compiler = Compiler::new();
    let (body, namespace_size) = compiler.compile_program(&block);
    Ok(Program { body, namespace_size, file })
}

/// The outcome of running a [`Program`]: a value reference, `void` (the
/// script fell off the end of its body or executed a bare `return;` rather
/// than returning a value), or an exception that nothing inside the script
/// caught.
pub enum ExecutionResult {
    Value(Value),
    Void,
    Exception(Exception),
}

/// Executes a compiled [`Program`]'s top-level statements against `globals`,
///.
///
/// `args` is exposed to the script the same way a function's parameters
/// are: bound into the namespace's leading slots before the body runs, so
/// a top-level script can reference its invocation arguments the way a
/// REPL line can reference values left over from a previous turn (an
/// embedder seeding bindings into `globals` beforehand achieves the latter;
/// `args` only covers positional arguments passed to this particular run).
#[must_use]
pub fn execute(program: &Program, args: &[Value], globals: &mut GlobalContext) -> ExecutionResult {
    let mut ctx = ExecutiveContext::new(program.namespace_size, Vec::new());
    for (slot, value) in args.iter().enumerate() {
        if slot >= program.namespace_size {
            break;
        }
        let id = globals.heap_mut().allocate(gc::Variable::new(value.clone(), false));
        ctx.bind_local(slot, id);
    }
    let mut stack = EvalStack::new();
    match engine::exec_program(&program.body, &mut ctx, globals, &mut stack, &program.file) {
        Ok(Some(value)) => ExecutionResult::Value(value),
        Ok(None) => ExecutionResult::Void,
        Err(exc) => ExecutionResult::Exception(exc),
    }
}
