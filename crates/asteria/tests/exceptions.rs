//! End-to-end tests for `throw`/`try`/`catch`, the `catch(expr)` operator,
//! `assert`, and backtrace accumulation.

use asteria::{compile, execute, CompileOptions, ExecutionResult, GlobalContext, Value};

fn run(src: &str) -> ExecutionResult {
    let program = compile(src, "<test>", &CompileOptions::default()).expect("compile error");
    let mut globals = GlobalContext::with_seed(0);
    execute(&program, &[], &mut globals)
}

fn run_int(src: &str) -> i64 {
    match run(src) {
        ExecutionResult::Value(Value::Integer(i)) => i,
        ExecutionResult::Value(other) => panic!("expected integer, got {other:?}"),
        ExecutionResult::Void => panic!("expected integer, got void"),
        ExecutionResult::Exception(exc) => panic!("unexpected exception: {exc}"),
    }
}

// =============================================================================
// 1. throw / try / catch
// =============================================================================

/// A thrown value is bound to the catch clause's variable.
#[test]
fn catch_binds_thrown_value() {
    let src = r#"
        try {
            throw "oops";
        } catch (e) {
            return e;
        }
    "#;
    match run(src) {
        ExecutionResult::Value(Value::String(s)) => assert_eq!(&*s, "oops"),
        ExecutionResult::Value(other) => panic!("expected string value, got {other:?}"),
        ExecutionResult::Void => panic!("expected string value, got void"),
        ExecutionResult::Exception(exc) => panic!("unexpected exception: {exc}"),
    }
}

/// An exception thrown inside a called function propagates up to a `try`
/// in the caller.
#[test]
fn exception_propagates_across_call_boundary() {
    let src = r#"
        func boom() {
            throw 42;
        }
        try {
            boom();
            return 0;
        } catch (e) {
            return e;
        }
    "#;
    assert_eq!(run_int(src), 42);
}

/// A script that throws without any enclosing `try` surfaces as an
/// `ExecutionResult::Exception` from `execute`, not a panic.
#[test]
fn uncaught_exception_surfaces_from_execute() {
    match run(r#"throw "fatal";"#) {
        ExecutionResult::Exception(exc) => assert_eq!(exc.value.describe(), "\"fatal\""),
        ExecutionResult::Value(v) => panic!("expected exception, got {v:?}"),
        ExecutionResult::Void => panic!("expected exception, got void"),
    }
}

/// An uncaught exception's backtrace records the call frame it passed
/// through.
#[test]
fn uncaught_exception_has_a_backtrace_frame() {
    let src = r#"
        func inner() {
            throw "deep";
        }
        inner();
    "#;
    match run(src) {
        ExecutionResult::Exception(exc) => assert!(!exc.backtrace.is_empty()),
        ExecutionResult::Value(v) => panic!("expected exception, got {v:?}"),
        ExecutionResult::Void => panic!("expected exception, got void"),
    }
}

// =============================================================================
// 2. catch(expr) operator
// =============================================================================

/// `catch(expr)` swallows an exception from `expr` and yields its message
/// as a string instead of propagating it.
#[test]
fn catch_expr_swallows_exception() {
    assert_eq!(run_int("return lengthof catch(1 / 0) > 0 ? 1 : 0;"), 1);
}

/// `catch(expr)` yields `null` when `expr` does not throw.
#[test]
fn catch_expr_yields_null_without_exception() {
    match run("return catch(1 + 1);") {
        ExecutionResult::Value(Value::Null) => {}
        ExecutionResult::Value(other) => panic!("expected null, got {other:?}"),
        ExecutionResult::Void => panic!("expected null, got void"),
        ExecutionResult::Exception(exc) => panic!("unexpected exception: {exc}"),
    }
}

// =============================================================================
// 3. assert
// =============================================================================

/// A passing `assert` has no effect.
#[test]
fn assert_true_does_not_throw() {
    assert_eq!(run_int("assert true; return 1;"), 1);
}

/// A failing `assert` raises a catchable exception carrying its message.
#[test]
fn assert_false_raises_with_message() {
    let src = r#"
        try {
            assert false : "should not happen";
            return 0;
        } catch (e) {
            return lengthof e > 0 ? 1 : 0;
        }
    "#;
    assert_eq!(run_int(src), 1);
}
