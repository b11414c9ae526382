//! Generator tests
//!
//! Generators lower to a factory plus a resumable state machine; these tests drive
//! the machine through `next`, `throw` and `return`.

use super::harness::*;

// ============================================================================
// Basic Iteration
// ============================================================================

#[test]
fn test_yields_then_returns() {
    expect_output(
        "function* g() { yield 1; yield 2; return 3; }
         const it = g();
         const a = it.next();
         const b = it.next();
         const c = it.next();
         const d = it.next();
         log(a.value, b.value, c.value, c.done, d.value, d.done);",
        &["1 2 3 true undefined true"],
    );
}

#[test]
fn test_body_does_not_run_until_first_next() {
    expect_output(
        "function* g() { sideEffect(\"body\"); yield 1; }
         const it = g();
         log(\"created\");
         it.next();",
        &["created", "sideEffect body"],
    );
}

#[test]
fn test_next_argument_becomes_yield_value() {
    expect_output(
        "function* g() { const x = yield 1; log(\"got\", x); const y = yield x + 1; return y; }
         const it = g();
         it.next(\"ignored\");
         log(it.next(41).value);
         log(it.next(\"end\").value);",
        &["got 41", "42", "end"],
    );
}

#[test]
fn test_arguments_are_bound_before_first_next() {
    expect_output(
        "function* count(from, to) { for (let i = from; i < to; i++) { yield i; } }
         const out = [];
         for (const n of count(2, 5)) { out[out.length] = n; }
         log(out);",
        &["2,3,4"],
    );
}

#[test]
fn test_locals_survive_suspension() {
    expect_output(
        "function* acc() { let total = 0; while (true) { total = total + (yield total); } }
         const it = acc();
         it.next();
         it.next(2);
         it.next(3);
         log(it.next(4).value);",
        &["9"],
    );
}

#[test]
fn test_repeated_drives_reproduce_sequence() {
    expect_output(
        "function* fib() { let a = 0; let b = 1; while (true) { yield a; const t = a + b; a = b; b = t; } }
         function take(n) { const it = fib(); const out = []; for (let i = 0; i < n; i++) { out[i] = it.next().value; } return out; }
         log(take(7));
         log(take(7));",
        &["0,1,1,2,3,5,8", "0,1,1,2,3,5,8"],
    );
}

#[test]
fn test_closures_capture_generator_locals() {
    expect_output(
        "function* g() { let n = 1; const get = () => n; yield get; n = 2; yield get; }
         const it = g();
         const f = it.next().value;
         log(f());
         it.next();
         log(f());",
        &["1", "2"],
    );
}

#[test]
fn test_spread_of_generator() {
    expect_output(
        "function* g() { yield 1; yield 2; yield 3; }
         log([0, ...g()]);",
        &["0,1,2,3"],
    );
}

// ============================================================================
// Return and Throw
// ============================================================================

#[test]
fn test_return_runs_finally_before_completing() {
    expect_output(
        "function* g() { try { yield 1; } finally { sideEffect(); } }
         const it = g();
         it.next();
         const r = it.return(5);
         log(r.value, r.done);
         log(it.next().done);",
        &["sideEffect", "5 true", "true"],
    );
}

#[test]
fn test_return_before_start_skips_body() {
    expect_output(
        "function* g() { sideEffect(\"body\"); yield 1; }
         const it = g();
         const r = it.return(7);
         log(r.value, r.done, it.next().done);",
        &["7 true true"],
    );
}

#[test]
fn test_throw_caught_inside_generator() {
    expect_output(
        "function* g() { try { yield 1; } catch (e) { log(\"caught\", e); yield 2; } }
         const it = g();
         it.next();
         log(it.throw(\"boom\").value);",
        &["caught boom", "2"],
    );
}

#[test]
fn test_throw_uncaught_completes_generator() {
    expect_output(
        "function* g() { yield 1; sideEffect(\"unreachable\"); }
         const it = g();
         it.next();
         try { it.throw(\"bad\"); } catch (e) { log(\"outer\", e); }
         log(it.next().done);",
        &["outer bad", "true"],
    );
}

#[test]
fn test_throw_before_start_rethrows() {
    expect_output(
        "function* g() { sideEffect(\"body\"); yield 1; }
         const it = g();
         try { it.throw(\"x\"); } catch (e) { log(e); }
         log(it.next().done);",
        &["x", "true"],
    );
}

#[test]
fn test_side_effects_not_repeated_on_return() {
    expect_output(
        "function* g() { sideEffect(\"a\"); yield 1; sideEffect(\"b\"); yield 2; }
         const it = g();
         it.next();
         it.return(0);
         it.next();",
        &["sideEffect a"],
    );
}

#[test]
fn test_reentrant_next_is_type_error() {
    expect_output(
        "function* g() { it.next(); yield 1; }
         const it = g();
         try { it.next(); } catch (e) { log(e.name, e.message); }",
        &["TypeError Generator is already running"],
    );
}

#[test]
fn test_exception_inside_body_propagates() {
    expect_output(
        "function* g() { yield 1; throw \"oops\"; }
         const it = g();
         it.next();
         try { it.next(); } catch (e) { log(e); }
         log(it.next().done);",
        &["oops", "true"],
    );
}

// ============================================================================
// Delegation
// ============================================================================

#[test]
fn test_delegation_forwards_values_and_result() {
    expect_output(
        "function* inner() { yield 1; yield 2; return \"r\"; }
         function* outer() { const v = yield* inner(); yield v; }
         log([...outer()]);",
        &["1,2,r"],
    );
}

#[test]
fn test_delegation_to_array() {
    expect_output(
        "function* g() { yield* [1, 2]; yield 3; }
         log([...g()]);",
        &["1,2,3"],
    );
}

#[test]
fn test_delegation_forwards_next_arguments() {
    expect_output(
        "function* inner() { const a = yield 1; log(\"inner got\", a); }
         function* outer() { yield* inner(); }
         const it = outer();
         it.next();
         it.next(\"hi\");",
        &["inner got hi"],
    );
}

#[test]
fn test_delegation_forwards_return() {
    expect_output(
        "function* inner() { try { yield 1; } finally { sideEffect(\"inner\"); } }
         function* outer() { try { yield* inner(); } finally { sideEffect(\"outer\"); } }
         const it = outer();
         it.next();
         const r = it.return(9);
         log(r.value, r.done);",
        &["sideEffect inner", "sideEffect outer", "9 true"],
    );
}

#[test]
fn test_delegation_forwards_throw() {
    expect_output(
        "function* inner() { try { yield 1; } catch (e) { yield \"handled \" + e; } }
         function* outer() { yield* inner(); }
         const it = outer();
         it.next();
         log(it.throw(\"x\").value);",
        &["handled x"],
    );
}

// ============================================================================
// Generator Methods
// ============================================================================

#[test]
fn test_generator_method_in_class() {
    expect_output(
        "class Range { constructor(n) { this.n = n; } *values() { for (let i = 0; i < this.n; i++) { yield i; } } }
         log([...new Range(3).values()]);",
        &["0,1,2"],
    );
}

#[test]
fn test_yield_inside_for_in() {
    expect_output(
        "function* keys(o) { for (const k in o) { yield k + o[k]; } }
         for (const entry of keys({ a: 1, b: 2 })) { log(entry); }",
        &["a1", "b2"],
    );
}
