//! Loop and per-iteration environment tests

use super::harness::*;

// ============================================================================
// Per-iteration bindings
// ============================================================================

#[test]
fn test_for_let_gets_fresh_binding_per_iteration() {
    expect_output(
        "const fs = [];
         for (let i = 0; i < 3; i++) { fs[i] = () => i; }
         log(fs[0](), fs[1](), fs[2]());",
        &["0 1 2"],
    );
}

#[test]
fn test_for_var_shares_one_binding() {
    expect_output(
        "const fs = [];
         for (var i = 0; i < 3; i++) { fs[i] = () => i; }
         log(fs[0](), fs[1](), fs[2]());",
        &["3 3 3"],
    );
}

#[test]
fn test_update_after_capture_affects_next_copy_only() {
    expect_output(
        "const fs = [];
         for (let i = 0; i < 4; i++) { fs[fs.length] = () => i; i++; }
         log(fs[0](), fs[1]());",
        &["1 3"],
    );
}

#[test]
fn test_for_of_const_per_iteration() {
    expect_output(
        "const fs = [];
         for (const x of [\"a\", \"b\"]) { fs[fs.length] = () => x; }
         log(fs[0](), fs[1]());",
        &["a b"],
    );
}

#[test]
fn test_block_in_loop_body_per_iteration() {
    expect_output(
        "const fs = [];
         let n = 0;
         while (n < 2) { let m = n * 10; fs[n] = () => m; n++; }
         log(fs[0](), fs[1]());",
        &["0 10"],
    );
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_break_and_continue() {
    expect_output(
        "let out = \"\";
         for (let i = 0; i < 10; i++) { if (i % 2 === 1) { continue; } if (i > 6) { break; } out = out + i; }
         log(out);",
        &["0246"],
    );
}

#[test]
fn test_labeled_break() {
    expect_output(
        "let hits = 0;
         outer: for (let i = 0; i < 3; i++) { for (let j = 0; j < 3; j++) { if (j === 1) { continue outer; } if (i === 2) { break outer; } hits++; } }
         log(hits);",
        &["2"],
    );
}

#[test]
fn test_do_while_runs_once() {
    expect_output(
        "let k = 10;
         do { log(k); k++; } while (k < 5);",
        &["10"],
    );
}

#[test]
fn test_switch_fallthrough_and_default() {
    expect_output(
        "function sw(v) { let s = \"\"; switch (v) { case 1: s = s + \"one\"; case 2: s = s + \"two\"; break; default: s = s + \"other\"; } return s; }
         log(sw(1), sw(2), sw(3));",
        &["onetwo two other"],
    );
}

#[test]
fn test_for_of_break_closes_iterator() {
    expect_output(
        "function* g() { try { yield 1; yield 2; } finally { sideEffect(\"closed\"); } }
         for (const v of g()) { log(v); break; }",
        &["1", "sideEffect closed"],
    );
}

#[test]
fn test_logical_operators_short_circuit() {
    expect_output(
        "const a = null ?? \"d\";
         const b = 0 || sideEffect(\"or\");
         const c = 0 && sideEffect(\"and\");
         log(a, b, c);",
        &["sideEffect or", "d undefined 0"],
    );
}

#[test]
fn test_for_in_visits_own_keys_in_order() {
    expect_output(
        "const o = { b: 1, a: 2, c: 3 };
         let keys = \"\";
         for (const k in o) { keys = keys + k + \"=\" + o[k] + \";\"; }
         log(keys);",
        &["b=1;a=2;c=3;"],
    );
}

#[test]
fn test_for_in_const_per_iteration() {
    expect_output(
        "const fs = [];
         for (const k in { x: 1, y: 2 }) { fs[fs.length] = () => k; }
         log(fs[0](), fs[1]());",
        &["x y"],
    );
}

#[test]
fn test_for_in_over_array_and_nullish() {
    expect_output(
        "let out = \"\";
         for (const i in [\"a\", \"b\"]) { out = out + i; }
         for (const k in null) { out = out + \"!\"; }
         for (const k in undefined) { out = out + \"!\"; }
         log(out);",
        &["01"],
    );
}

#[test]
fn test_for_in_assigns_existing_binding_and_breaks() {
    expect_output(
        "let last;
         outer: for (last in { p: 1, q: 2, r: 3 }) { if (last === \"q\") { break outer; } }
         log(last);",
        &["q"],
    );
}

#[test]
fn test_for_in_var_shares_one_binding() {
    expect_output(
        "const fs = [];
         for (var k in { x: 1, y: 2 }) { fs[fs.length] = () => k; }
         log(fs[0](), fs[1](), k);",
        &["y y y"],
    );
}
