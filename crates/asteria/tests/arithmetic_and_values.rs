//! End-to-end tests for literal, arithmetic, and container expressions.
//!
//! Each test compiles and runs one small script through the public
//! `compile`/`execute` API and checks the value it returns, exercising the
//! full pipeline (lexer, parser, AIR compiler, engine) rather than any one
//! layer in isolation.

use asteria::{compile, execute, CompileOptions, ExecutionResult, GlobalContext, Value};

fn run(src: &str) -> Value {
    let program = compile(src, "<test>", &CompileOptions::default()).expect("compile error");
    let mut globals = GlobalContext::with_seed(0);
    match execute(&program, &[], &mut globals) {
        ExecutionResult::Value(v) => v,
        ExecutionResult::Void => panic!("unexpected void"),
        ExecutionResult::Exception(exc) => panic!("unexpected exception: {exc}"),
    }
}

// =============================================================================
// 1. integer and real arithmetic
// =============================================================================

/// Integer addition returns an integer.
#[test]
fn integer_addition() {
    assert!(matches!(run("return 2 + 3;"), Value::Integer(5)));
}

/// Mixing an integer and a real promotes the result to real.
#[test]
fn mixed_integer_real_promotes_to_real() {
    match run("return 1 + 2.5;") {
        Value::Real(r) => assert!((r - 3.5).abs() < f64::EPSILON),
        other => panic!("expected real, got {other:?}"),
    }
}

/// Integer overflow on addition raises a catchable exception rather than
/// wrapping or panicking.
#[test]
fn integer_overflow_is_an_exception() {
    let program = compile(
        "return 9223372036854775807 + 1;",
        "<test>",
        &CompileOptions::default(),
    )
    .expect("compile error");
    let mut globals = GlobalContext::with_seed(0);
    match execute(&program, &[], &mut globals) {
        ExecutionResult::Exception(exc) => assert!(exc.value.describe().contains("overflow")),
        ExecutionResult::Value(v) => panic!("expected overflow exception, got {v:?}"),
        ExecutionResult::Void => panic!("expected overflow exception, got void"),
    }
}

/// Division by zero raises a catchable exception.
#[test]
fn integer_division_by_zero_is_an_exception() {
    let program = compile("return 1 / 0;", "<test>", &CompileOptions::default()).expect("compile error");
    let mut globals = GlobalContext::with_seed(0);
    assert!(matches!(execute(&program, &[], &mut globals), ExecutionResult::Exception(_)));
}

// =============================================================================
// 2. strings
// =============================================================================

/// `+` concatenates two strings.
#[test]
fn string_concatenation() {
    match run(r#"return "hello, " + "world";"#) {
        Value::String(s) => assert_eq!(&*s, "hello, world"),
        other => panic!("expected string, got {other:?}"),
    }
}

/// `lengthof` reports a string's byte length.
#[test]
fn lengthof_string() {
    assert!(matches!(run(r#"return lengthof "abcde";"#), Value::Integer(5)));
}

// =============================================================================
// 3. arrays and objects
// =============================================================================

/// An array literal round-trips through indexing.
#[test]
fn array_literal_and_index() {
    assert!(matches!(run("return [10, 20, 30][1];"), Value::Integer(20)));
}

/// `[^]`/`[$]` read the head and tail elements of an array.
#[test]
fn array_head_and_tail() {
    assert!(matches!(run("return [1, 2, 3][^];"), Value::Integer(1)));
    assert!(matches!(run("return [1, 2, 3][$];"), Value::Integer(3)));
}

/// An object literal's field is readable by key.
#[test]
fn object_literal_and_key() {
    match run(r#"return { name: "ada", age: 36 }.name;"#) {
        Value::String(s) => assert_eq!(&*s, "ada"),
        other => panic!("expected string, got {other:?}"),
    }
}

/// Arrays compare lexicographically, matching `Value::compare`.
#[test]
fn array_ordering_in_script() {
    assert!(matches!(run("return [1, 2] < [1, 3];"), Value::Boolean(true)));
}

// =============================================================================
// 4. typeof / truthiness
// =============================================================================

/// `typeof` names each of the dynamic types.
#[test]
fn typeof_reports_type_names() {
    match run(r#"return typeof 1.5;"#) {
        Value::String(s) => assert_eq!(&*s, "real"),
        other => panic!("expected string, got {other:?}"),
    }
}

/// A script with no `return` yields no value at all, distinct from one
/// that explicitly returns `null`.
#[test]
fn falling_off_the_end_yields_void() {
    let program = compile("var x = 1;", "<test>", &CompileOptions::default()).expect("compile error");
    let mut globals = GlobalContext::with_seed(0);
    assert!(matches!(execute(&program, &[], &mut globals), ExecutionResult::Void));
}

/// An explicit `return null;` is a value, not void.
#[test]
fn explicit_return_null_is_a_value() {
    assert!(matches!(run("return null;"), Value::Null));
}

// =============================================================================
// 5. fused and wrapping/saturating arithmetic intrinsics
// =============================================================================

/// `__fma(a, b, c)` computes a fused multiply-add at real precision.
#[test]
fn fma_computes_fused_multiply_add() {
    match run("return __fma(2, 3, 1);") {
        Value::Real(r) => assert!((r - 7.0).abs() < f64::EPSILON),
        other => panic!("expected real, got {other:?}"),
    }
}

/// `__addm` wraps on overflow instead of throwing.
#[test]
fn addm_wraps_on_overflow() {
    assert!(matches!(run("return __addm(9223372036854775807, 1);"), Value::Integer(i64::MIN)));
}

/// `__adds` saturates on overflow instead of throwing.
#[test]
fn adds_saturates_on_overflow() {
    assert!(matches!(run("return __adds(9223372036854775807, 1);"), Value::Integer(i64::MAX)));
}

/// `__vcall(target, args)` calls `target` with the elements of `args`.
#[test]
fn vcall_invokes_with_spread_arguments() {
    let src = r#"
        func add(a, b) { return a + b; }
        return __vcall(add, [3, 4]);
    "#;
    assert!(matches!(run(src), Value::Integer(7)));
}
