//! Async function tests
//!
//! Async functions run synchronously up to their first `await`; continuations run
//! from the microtask queue after the module body.

use super::harness::*;

#[test]
fn test_await_suspends_until_module_body_finishes() {
    expect_output(
        "async function f() { log(\"in\"); const v = await resolved(1); log(\"after\", v); return v + 1; }
         f();
         log(\"sync\");",
        &["in", "sync", "after 1"],
    );
}

#[test]
fn test_await_non_promise_value() {
    expect_output(
        "async function f() { const x = await 5; log(x); }
         f();
         log(\"first\");",
        &["first", "5"],
    );
}

#[test]
fn test_rejection_is_thrown_at_await() {
    expect_output(
        "async function f() { try { await rejected(\"bad\"); } catch (e) { log(\"caught\", e); } }
         f();",
        &["caught bad"],
    );
}

#[test]
fn test_awaiting_another_async_function() {
    expect_output(
        "async function a() { return 1; }
         async function b() { const x = await a(); log(\"b got\", x); }
         b();",
        &["b got 1"],
    );
}

#[test]
fn test_throw_rejects_promise() {
    expect_output(
        "async function fail() { throw \"nope\"; }
         async function main() { try { await fail(); } catch (e) { log(\"main caught\", e); } }
         main();
         log(\"scheduled\");",
        &["scheduled", "main caught nope"],
    );
}

#[test]
fn test_awaiting_pending_promise() {
    expect_output(
        "async function slow() { await 0; log(\"slow done\"); return \"v\"; }
         async function main() { const v = await slow(); log(\"main got\", v); }
         main();",
        &["slow done", "main got v"],
    );
}

#[test]
fn test_sequential_awaits_keep_locals() {
    expect_output(
        "async function sum() { let total = 0; for (const p of [1, 2, 3]) { total = total + await resolved(p); } return total; }
         async function main() { log(await sum()); }
         main();",
        &["6"],
    );
}

#[test]
fn test_async_arrow() {
    expect_output(
        "const f = async (x) => { const y = await x; log(y * 2); };
         f(resolved(21));",
        &["42"],
    );
}
