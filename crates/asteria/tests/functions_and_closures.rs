//! End-to-end tests for function declarations, closures, recursion, proper
//! tail calls, and `defer`.

use asteria::{compile, execute, CompileOptions, CompileStatus, ExecutionResult, GlobalContext, Value};

fn run_int(src: &str) -> i64 {
    let program = compile(src, "<test>", &CompileOptions::default()).expect("compile error");
    let mut globals = GlobalContext::with_seed(0);
    match execute(&program, &[], &mut globals) {
        ExecutionResult::Value(Value::Integer(i)) => i,
        ExecutionResult::Value(other) => panic!("expected integer, got {other:?}"),
        ExecutionResult::Void => panic!("expected integer, got void"),
        ExecutionResult::Exception(exc) => panic!("unexpected exception: {exc}"),
    }
}

// =============================================================================
// 1. basic declarations and recursion
// =============================================================================

/// A named function can call itself, via the predeclare-before-init binding
/// that makes the function's own name visible inside its body.
#[test]
fn named_function_is_self_recursive() {
    let src = r#"
        func fact(n) {
            if (n <= 1) { return 1; }
            return n * fact(n - 1);
        }
        return fact(5);
    "#;
    assert_eq!(run_int(src), 120);
}

/// A closure captures a variable from its enclosing scope by value at
/// creation time, not by live reference to the outer slot.
#[test]
fn closure_captures_enclosing_variable() {
    let src = r#"
        func make_adder(n) {
            return func(x) { return x + n; };
        }
        var add5 = make_adder(5);
        return add5(10);
    "#;
    assert_eq!(run_int(src), 15);
}

/// A variadic parameter collects the trailing arguments into the fixed
/// array `__varg`; `...` itself binds no name of its own.
#[test]
fn variadic_parameter_collects_extra_args() {
    let src = r#"
        func sum(...) {
            var total = 0;
            for (each v in __varg) { total += v; }
            return total;
        }
        return sum(1, 2, 3, 4);
    "#;
    assert_eq!(run_int(src), 10);
}

/// A variadic function can still take named leading parameters; `__varg`
/// collects only what's left over.
#[test]
fn variadic_parameter_follows_named_params() {
    let src = r#"
        func f(a, b, ...) {
            return a + b + lengthof __varg;
        }
        return f(1, 2, 10, 20, 30);
    "#;
    assert_eq!(run_int(src), 6);
}

/// `this` desugars to `__this`, bound from the reference a call was made
/// through; a plain (non-method) call binds it to `null`.
#[test]
fn this_binds_to_null_outside_a_method_call() {
    let src = r#"
        func whoami() {
            return this == null ? 1 : 0;
        }
        return whoami();
    "#;
    assert_eq!(run_int(src), 1);
}

/// A name beginning with `__` is reserved for the engine's own bindings and
/// cannot be declared by a script, whether as a variable, a parameter, or a
/// function name.
#[test]
fn reserved_identifier_rejected_in_declarations() {
    let err = compile("var __x = 1;", "<test>", &CompileOptions::default()).unwrap_err();
    assert_eq!(err.status, CompileStatus::ReservedIdentifierNotDeclarable);

    let err = compile("func __f() {}", "<test>", &CompileOptions::default()).unwrap_err();
    assert_eq!(err.status, CompileStatus::ReservedIdentifierNotDeclarable);

    let err = compile("func f(__a) {}", "<test>", &CompileOptions::default()).unwrap_err();
    assert_eq!(err.status, CompileStatus::ReservedIdentifierNotDeclarable);
}

/// A reference to a reserved name (not a declaration of one) is unaffected;
/// `__varg`/`__this` are ordinary reads once bound.
#[test]
fn reserved_identifier_reference_is_not_rejected() {
    let src = r#"
        func f(...) {
            return lengthof __varg;
        }
        return f(1, 2, 3);
    "#;
    assert_eq!(run_int(src), 3);
}

// =============================================================================
// 2. proper tail calls
// =============================================================================

/// A self-recursive tail call does not grow the Rust call stack: this
/// would overflow a naive recursive interpreter long before a million
/// iterations, but the tail-call trampoline in `call_compiled` keeps the
/// native stack depth constant.
#[test]
fn deep_tail_recursion_does_not_overflow() {
    let src = r#"
        func count(n, acc) {
            if (n == 0) { return acc; }
            return count(n - 1, acc + 1);
        }
        return count(200000, 0);
    "#;
    assert_eq!(run_int(src), 200_000);
}

/// Mutual tail recursion between two functions also stays within a
/// constant native stack depth.
#[test]
fn mutual_tail_recursion_does_not_overflow() {
    let src = r#"
        func is_even(n) {
            if (n == 0) { return true; }
            return is_odd(n - 1);
        }
        func is_odd(n) {
            if (n == 0) { return false; }
            return is_even(n - 1);
        }
        return is_even(100000) ? 1 : 0;
    "#;
    assert_eq!(run_int(src), 1);
}

/// A tail call inside a ternary's branch (`return cond ? f() : g();`) still
/// trampolines: only the non-tail branch's condition is evaluated eagerly,
/// while the call in either arm reuses the current frame.
#[test]
fn ternary_tail_recursion_does_not_overflow() {
    let src = r#"
        func count(n, acc) {
            return n == 0 ? acc : count(n - 1, acc + 1);
        }
        return count(200000, 0);
    "#;
    assert_eq!(run_int(src), 200_000);
}

/// A tail call on the right-hand side of `??` also trampolines: the base
/// case produces a non-null left-hand side, short-circuiting before the
/// call is ever reached.
#[test]
fn coalescence_tail_recursion_does_not_overflow() {
    let src = r#"
        func count(n, acc) {
            return (n == 0 ? acc : null) ?? count(n - 1, acc + 1);
        }
        return count(200000, 0);
    "#;
    assert_eq!(run_int(src), 200_000);
}

// =============================================================================
// 3. defer
// =============================================================================

/// Deferred actions run in reverse order of registration, after the
/// function body completes, the way a `Drop` stack would.
#[test]
fn defer_runs_in_reverse_order() {
    let src = r#"
        func trace() {
            var log = [];
            defer { log[lengthof log] = 1; }
            defer { log[lengthof log] = 2; }
            defer { log[lengthof log] = 3; }
            return log;
        }
        var log = trace();
        return log[0] * 100 + log[1] * 10 + log[2];
    "#;
    assert_eq!(run_int(src), 321);
}

/// A deferred action still runs when the function returns through an
/// exception raised further down the call chain, once the exception is
/// caught higher up.
#[test]
fn defer_runs_even_when_body_throws() {
    let src = r#"
        var ran = false;
        func risky() {
            defer { ran = true; }
            throw "boom";
        }
        try {
            risky();
        } catch (e) {
        }
        return ran ? 1 : 0;
    "#;
    assert_eq!(run_int(src), 1);
}
