//! Exception handling tests

use super::harness::*;

#[test]
fn test_catch_binding_receives_thrown_value() {
    expect_output(
        "try { throw \"x\"; } catch (e) { log(\"caught\", e); }",
        &["caught x"],
    );
}

#[test]
fn test_finally_runs_on_normal_exit() {
    expect_output(
        "try { log(\"body\"); } finally { log(\"finally\"); }",
        &["body", "finally"],
    );
}

#[test]
fn test_finally_runs_on_return() {
    expect_output(
        "function f() { try { return \"r\"; } finally { sideEffect(\"cleanup\"); } }
         log(f());",
        &["sideEffect cleanup", "r"],
    );
}

#[test]
fn test_finally_runs_on_break() {
    expect_output(
        "for (let i = 0; i < 3; i++) { try { if (i === 1) { break; } } finally { log(\"f\", i); } }",
        &["f 0", "f 1"],
    );
}

#[test]
fn test_rethrow_from_catch_runs_finally() {
    expect_output(
        "try { try { throw 1; } catch (e) { throw e + 1; } finally { log(\"inner finally\"); } } catch (e) { log(\"outer\", e); }",
        &["inner finally", "outer 2"],
    );
}

#[test]
fn test_values_assigned_in_try_visible_in_catch() {
    expect_output(
        "let stage = 0;
         try { stage = 1; throw \"x\"; } catch (e) { log(stage); }",
        &["1"],
    );
}

#[test]
fn test_exception_from_callee_is_caught() {
    expect_output(
        "function boom() { throw \"deep\"; }
         function mid() { boom(); log(\"unreachable\"); }
         try { mid(); } catch (e) { log(e); }",
        &["deep"],
    );
}

#[test]
fn test_uncaught_exception_escapes_module() {
    let output = expect_throw("log(\"start\"); null.x;", "TypeError");
    assert_eq!(output, vec!["start"]);
}

#[test]
fn test_assignment_to_const_throws() {
    expect_output(
        "const c = 1;
         try { c = 2; } catch (e) { log(e.name); }
         log(c);",
        &["TypeError", "1"],
    );
}

#[test]
fn test_undefined_global_is_reference_error() {
    expect_output(
        "try { missing; } catch (e) { log(e.name, e.message); }",
        &["ReferenceError missing is not defined"],
    );
}
