//! Destructuring tests
//!
//! Array patterns go through the iterator protocol, object patterns through property
//! reads; defaults are evaluated only for undefined values.

use super::harness::*;

// ============================================================================
// Array Patterns
// ============================================================================

#[test]
fn test_array_pattern_with_rest() {
    expect_output(
        "const [a, b, ...c] = [1, 2, 3, 4];
         log(a, b, c, c.length);",
        &["1 2 3,4 2"],
    );
}

#[test]
fn test_short_iterable_fills_undefined_and_defaults() {
    expect_output(
        "const [p, q = 7, r] = [1];
         log(p, q, r);",
        &["1 7 undefined"],
    );
}

#[test]
fn test_elision_skips_elements() {
    expect_output(
        "const [, second, , fourth] = [1, 2, 3, 4];
         log(second, fourth);",
        &["2 4"],
    );
}

#[test]
fn test_nested_array_pattern() {
    expect_output(
        "const [x, [y, z]] = [1, [2, 3]];
         log(x + y + z);",
        &["6"],
    );
}

#[test]
fn test_string_is_iterable() {
    expect_output(
        "const [h, ...tail] = \"hey\";
         log(h, tail);",
        &["h e,y"],
    );
}

#[test]
fn test_non_iterable_throws_type_error() {
    expect_output(
        "try { const [a] = 5; } catch (e) { log(e.name); }",
        &["TypeError"],
    );
}

#[test]
fn test_generator_source_is_closed_early() {
    expect_output(
        "function* g() { try { yield 1; yield 2; } finally { sideEffect(\"closed\"); } }
         const [first] = g();
         log(first);",
        &["sideEffect closed", "1"],
    );
}

#[test]
fn test_exhausted_generator_is_not_closed() {
    expect_output(
        "function* g() { try { yield 1; } finally { sideEffect(\"finished\"); } }
         const [first, second] = g();
         log(first, second);",
        &["sideEffect finished", "1 undefined"],
    );
}

// ============================================================================
// Object Patterns
// ============================================================================

#[test]
fn test_object_pattern_with_nesting_and_rest() {
    expect_output(
        "const { x, y: { z }, ...rest } = { x: 1, y: { z: 2 }, w: 3 };
         log(x, z, rest.w, rest.x);",
        &["1 2 3 undefined"],
    );
}

#[test]
fn test_default_is_lazy() {
    expect_output(
        "const { m = sideEffect(\"default\") } = { m: 1 };
         const { n = sideEffect(\"default\") } = {};
         log(m, n);",
        &["sideEffect default", "1 undefined"],
    );
}

#[test]
fn test_null_default_is_not_applied() {
    expect_output(
        "const { v = 5 } = { v: null };
         log(v);",
        &["null"],
    );
}

#[test]
fn test_destructuring_null_throws_type_error() {
    expect_output(
        "try { const { a } = null; } catch (e) { log(e.name); }",
        &["TypeError"],
    );
}

#[test]
fn test_computed_key() {
    expect_output(
        "const key = \"k\";
         const { [key]: found } = { k: 9 };
         log(found);",
        &["9"],
    );
}

// ============================================================================
// Assignment and Parameters
// ============================================================================

#[test]
fn test_swap_by_assignment() {
    expect_output(
        "let s = 1;
         let t = 2;
         [s, t] = [t, s];
         log(s, t);",
        &["2 1"],
    );
}

#[test]
fn test_assignment_to_member_targets() {
    expect_output(
        "const o = {};
         ({ a: o.first, b: o.second } = { a: 1, b: 2 });
         log(o.first, o.second);",
        &["1 2"],
    );
}

#[test]
fn test_parameter_patterns() {
    expect_output(
        "function f({ a, b = 2 }, [c]) { return a + b + c; }
         log(f({ a: 1 }, [3]));",
        &["6"],
    );
}

#[test]
fn test_for_of_with_pattern() {
    expect_output(
        "for (const [k, v] of [[\"a\", 1], [\"b\", 2]]) { log(k, v); }",
        &["a 1", "b 2"],
    );
}
