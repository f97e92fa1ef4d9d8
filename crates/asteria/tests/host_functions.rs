//! End-to-end tests for registering host (Rust-native) functions into a
//! `GlobalContext` and calling them from a script, including overload
//! resolution via `ArgumentReader`.

use std::rc::Rc;

use asteria::{
    compile, execute, host::ArgumentReader, CompileError, CompileOptions, ExecutionResult, GlobalContext, HostFunction,
    Reference, RunResult, SourceLoc, Value,
};

fn native_loc() -> SourceLoc {
    SourceLoc::new(Rc::from("<native>"), 0, 0)
}

fn run_with(globals: &mut GlobalContext, src: &str) -> Result<ExecutionResult, CompileError> {
    let program = compile(src, "<test>", &CompileOptions::default())?;
    Ok(execute(&program, &[], globals))
}

// =============================================================================
// 1. a single-overload host function
// =============================================================================

fn double_handler(globals: &mut GlobalContext, _self_ref: &Reference, args: &mut Vec<Reference>) -> RunResult<Reference> {
    let mut n = 0_i64;
    let mut reader = ArgumentReader::new("double", &args[..], globals.heap(), native_loc())?;
    reader.start_overload().required(&mut n);
    if reader.end_overload() {
        return Ok(Reference::temporary(Value::Integer(n * 2)));
    }
    Err(reader.throw_no_matching_function_call())
}

/// A script can call a host function registered by name, and see its
/// return value.
#[test]
fn script_calls_registered_host_function() {
    let mut globals = GlobalContext::with_seed(0);
    globals.bind_function(HostFunction::new("double", 1, false, double_handler));

    match run_with(&mut globals, "return double(21);").expect("compile error") {
        ExecutionResult::Value(Value::Integer(i)) => assert_eq!(i, 42),
        other => panic!("unexpected result: {}", describe(other)),
    }
}

/// Calling a registered host function with the wrong argument type raises
/// a catchable "no matching overload" exception rather than panicking.
#[test]
fn host_function_rejects_wrong_argument_type() {
    let mut globals = GlobalContext::with_seed(0);
    globals.bind_function(HostFunction::new("double", 1, false, double_handler));

    match run_with(&mut globals, r#"return double("not a number");"#).expect("compile error") {
        ExecutionResult::Exception(exc) => assert!(exc.value.describe().contains("no matching overload")),
        ExecutionResult::Value(v) => panic!("expected exception, got {v:?}"),
        ExecutionResult::Void => panic!("expected exception, got void"),
    }
}

// =============================================================================
// 2. overload resolution
// =============================================================================

fn describe_handler(globals: &mut GlobalContext, _self_ref: &Reference, args: &mut Vec<Reference>) -> RunResult<Reference> {
    let mut n = 0_i64;
    let mut reader = ArgumentReader::new("describe", &args[..], globals.heap(), native_loc())?;
    reader.start_overload().required(&mut n);
    if reader.end_overload() {
        return Ok(Reference::temporary(Value::from(format!("int:{n}"))));
    }

    let mut s: asteria::value::Rstr = Rc::from("");
    let mut reader = ArgumentReader::new("describe", &args[..], globals.heap(), native_loc())?;
    reader.start_overload().required(&mut s);
    if reader.end_overload() {
        return Ok(Reference::temporary(Value::from(format!("str:{s}"))));
    }

    Err(reader.throw_no_matching_function_call())
}

/// A host function with two candidate overloads dispatches on argument
/// type, the way the original `argument_reader` pattern does.
#[test]
fn host_function_dispatches_by_overload() {
    let mut globals = GlobalContext::with_seed(0);
    globals.bind_function(HostFunction::new("describe", 1, false, describe_handler));

    match run_with(&mut globals, "return describe(7);").expect("compile error") {
        ExecutionResult::Value(Value::String(s)) => assert_eq!(&*s, "int:7"),
        other => panic!("unexpected result: {}", describe(other)),
    }
    match run_with(&mut globals, r#"return describe("hi");"#).expect("compile error") {
        ExecutionResult::Value(Value::String(s)) => assert_eq!(&*s, "str:hi"),
        other => panic!("unexpected result: {}", describe(other)),
    }
}

fn describe(result: ExecutionResult) -> String {
    match result {
        ExecutionResult::Value(v) => v.describe(),
        ExecutionResult::Void => "void".to_string(),
        ExecutionResult::Exception(exc) => exc.to_string(),
    }
}
