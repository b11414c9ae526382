//! Temporal dead zone tests
//!
//! Reads and writes of `let`, `const` and `class` bindings before their declaration
//! runs must raise a ReferenceError on the executed path only.

use super::harness::*;

// ============================================================================
// Direct reads
// ============================================================================

#[test]
fn test_read_before_declaration_throws() {
    let output = expect_throw(
        "log(\"before\");
         log(x);
         let x = 1;
         log(\"after\");",
        "ReferenceError",
    );
    assert_eq!(output, vec!["before"]);
}

#[test]
fn test_read_before_declaration_caught() {
    expect_output(
        "try { log(x); } catch (e) { log(e.name, e.message); }
         let x = 1;
         log(x);",
        &["ReferenceError Cannot access 'x' before initialization", "1"],
    );
}

#[test]
fn test_const_read_before_declaration() {
    expect_output(
        "try { log(k); } catch (e) { log(e.name); }
         const k = 3;
         log(k);",
        &["ReferenceError", "3"],
    );
}

#[test]
fn test_write_before_declaration_throws() {
    expect_output(
        "try { y = 2; } catch (e) { log(e.name); }
         let y = 1;
         log(y);",
        &["ReferenceError", "1"],
    );
}

#[test]
fn test_unexecuted_read_does_not_throw() {
    expect_output(
        "if (false) { log(x); }
         let x = 5;
         log(x);",
        &["5"],
    );
}

#[test]
fn test_var_has_no_dead_zone() {
    expect_output(
        "log(v);
         var v = 1;
         log(v);",
        &["undefined", "1"],
    );
}

// ============================================================================
// Reads through closures
// ============================================================================

#[test]
fn test_closure_called_before_declaration() {
    expect_output(
        "function read() { return y; }
         try { read(); } catch (e) { log(e.message); }
         let y = 2;
         log(read());",
        &["Cannot access 'y' before initialization", "2"],
    );
}

#[test]
fn test_error_raised_once_and_execution_stops() {
    expect_output(
        "function touch() { sideEffect(\"enter\"); const v = z; sideEffect(\"unreachable\"); return v; }
         try { touch(); } catch (e) { log(e.name); }
         let z = 1;",
        &["sideEffect enter", "ReferenceError"],
    );
}

#[test]
fn test_class_binding_dead_zone() {
    expect_output(
        "try { new C(); } catch (e) { log(e.name); }
         class C { constructor() { this.ok = true; } }
         log(new C().ok);",
        &["ReferenceError", "true"],
    );
}

// ============================================================================
// Block scopes and self-reference
// ============================================================================

#[test]
fn test_shadowing_binding_in_inner_block() {
    expect_output(
        "let a = 1;
         {
             try { log(a); } catch (e) { log(e.name); }
             let a = 2;
             log(a);
         }
         log(a);",
        &["ReferenceError", "2", "1"],
    );
}

#[test]
fn test_self_reference_in_initializer() {
    expect_output(
        "try { let s = s + 1; } catch (e) { log(e.name); }",
        &["ReferenceError"],
    );
}
