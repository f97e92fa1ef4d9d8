//! End-to-end tests for statement-level control flow: `if`, `while`,
//! `for`, `for each`, `switch`, and `break`/`continue`.

use asteria::{compile, execute, CompileOptions, ExecutionResult, GlobalContext, Value};

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
// 1. if / else
// =============================================================================

/// The `else` branch runs when the condition is false.
#[test]
fn if_else_picks_the_right_branch() {
    assert_eq!(run_int("if (1 > 2) { return 1; } else { return 2; }"), 2);
}

/// `else if` chains correctly.
#[test]
fn else_if_chain() {
    let src = r#"
        var x = 2;
        if (x == 1) { return 10; }
        else if (x == 2) { return 20; }
        else { return 30; }
    "#;
    assert_eq!(run_int(src), 20);
}

// =============================================================================
// 2. while / do-while
// =============================================================================

/// `while` accumulates across iterations and stops once the condition fails.
#[test]
fn while_loop_accumulates() {
    let src = r#"
        var i = 0;
        var sum = 0;
        while (i < 5) {
            sum += i;
            ++i;
        }
        return sum;
    "#;
    assert_eq!(run_int(src), 10);
}

/// `do`/`while` runs its body at least once even if the condition is false.
#[test]
fn do_while_runs_at_least_once() {
    let src = r#"
        var i = 0;
        do {
            ++i;
        } while (false);
        return i;
    "#;
    assert_eq!(run_int(src), 1);
}

// =============================================================================
// 3. for / for each
// =============================================================================

/// A classic three-clause `for` loop's step runs exactly once per iteration.
#[test]
fn for_loop_step_runs_once_per_iteration() {
    let src = r#"
        var sum = 0;
        for (var i = 0; i < 4; ++i) {
            sum += 1;
        }
        return sum;
    "#;
    assert_eq!(run_int(src), 4);
}

/// `for (each v in array)` visits every element exactly once, in order.
#[test]
fn for_each_over_array_sums_elements() {
    let src = r#"
        var total = 0;
        for (each v in [1, 2, 3, 4]) {
            total += v;
        }
        return total;
    "#;
    assert_eq!(run_int(src), 10);
}

/// `for (each k, v in object)` exposes both the key and the value.
#[test]
fn for_each_over_object_counts_entries() {
    let src = r#"
        var count = 0;
        for (each k, v in { a: 1, b: 2, c: 3 }) {
            count += v;
        }
        return count;
    "#;
    assert_eq!(run_int(src), 6);
}

// =============================================================================
// 4. break / continue
// =============================================================================

/// `break` exits the innermost loop immediately.
#[test]
fn break_stops_the_loop_early() {
    let src = r#"
        var i = 0;
        while (true) {
            if (i == 3) { break; }
            ++i;
        }
        return i;
    "#;
    assert_eq!(run_int(src), 3);
}

/// `continue` skips the remainder of the current iteration only.
#[test]
fn continue_skips_even_numbers() {
    let src = r#"
        var sum = 0;
        for (var i = 0; i < 6; ++i) {
            if (i % 2 == 0) { continue; }
            sum += i;
        }
        return sum;
    "#;
    assert_eq!(run_int(src), 9);
}

// =============================================================================
// 5. switch
// =============================================================================

/// A matching `case` runs and falls through to the next arm without a
/// `break`, per the original C-like fallthrough semantics.
#[test]
fn switch_falls_through_without_break() {
    let src = r#"
        var out = 0;
        switch (1) {
            case 1:
                out += 1;
            case 2:
                out += 10;
                break;
            case 3:
                out += 100;
        }
        return out;
    "#;
    assert_eq!(run_int(src), 11);
}

/// `default` runs when no `case` label matches.
#[test]
fn switch_default_runs_when_nothing_matches() {
    let src = r#"
        switch (99) {
            case 1:
                return 1;
            default:
                return 2;
        }
    "#;
    assert_eq!(run_int(src), 2);
}
