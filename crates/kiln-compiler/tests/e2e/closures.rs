//! Closure and environment record tests

use super::harness::*;

// ============================================================================
// Captured Bindings
// ============================================================================

#[test]
fn test_closure_reads_outer_binding() {
    expect_output(
        "let n = 1;
         const read = () => n;
         n = 2;
         log(read());",
        &["2"],
    );
}

#[test]
fn test_closure_writes_outer_binding() {
    expect_output(
        "function counter() { let c = 0; return () => { c = c + 1; return c; }; }
         const next = counter();
         next();
         next();
         log(next());",
        &["3"],
    );
}

#[test]
fn test_counters_are_independent() {
    expect_output(
        "function counter() { let c = 0; return () => { c = c + 1; return c; }; }
         const a = counter();
         const b = counter();
         a();
         a();
         log(a(), b());",
        &["3 1"],
    );
}

#[test]
fn test_nested_capture_across_functions() {
    expect_output(
        "function outer(x) { return function middle(y) { return () => x + y; }; }
         log(outer(1)(2)());",
        &["3"],
    );
}

#[test]
fn test_parameter_captured() {
    expect_output(
        "function adder(a) { return (b) => a + b; }
         log(adder(40)(2));",
        &["42"],
    );
}

#[test]
fn test_function_declarations_are_hoisted() {
    expect_output(
        "log(twice(4));
         function twice(x) { return x * 2; }",
        &["8"],
    );
}

#[test]
fn test_mutual_recursion() {
    expect_output(
        "function isEven(n) { return n === 0 ? true : isOdd(n - 1); }
         function isOdd(n) { return n === 0 ? false : isEven(n - 1); }
         log(isEven(10), isOdd(7));",
        &["true true"],
    );
}

// ============================================================================
// Classes
// ============================================================================

#[test]
fn test_class_methods_and_this() {
    expect_output(
        "class Point { constructor(x, y) { this.x = x; this.y = y; } sum() { return this.x + this.y; } }
         const p = new Point(3, 4);
         log(p.sum());",
        &["7"],
    );
}

#[test]
fn test_method_captures_module_binding() {
    expect_output(
        "let scale = 10;
         class Scaler { apply(v) { return v * scale; } }
         scale = 3;
         log(new Scaler().apply(2));",
        &["6"],
    );
}

#[test]
fn test_class_called_without_new_throws() {
    expect_output(
        "class K {}
         try { K(); } catch (e) { log(e.name); }",
        &["TypeError"],
    );
}
