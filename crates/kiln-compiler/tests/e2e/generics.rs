//! Generic specialization tests
//!
//! Each distinct instantiation of a generic function or class is lowered once; calls
//! with equivalent type arguments share the specialized body.

use super::harness::*;

fn functions_named(source: &str, name: &str) -> usize {
    lower(source).module.functions().filter(|f| f.name == name).count()
}

#[test]
fn test_identity_runs_for_each_instantiation() {
    expect_output(
        "function id<T>(x: T): T { return x; }
         log(id<number>(1), id<number>(2), id<string>(\"s\"));",
        &["1 2 s"],
    );
}

#[test]
fn test_equal_type_arguments_share_one_body() {
    let source = "function id<T>(x: T): T { return x; }
                  id<number>(1);
                  function later() { return id<number>(2); }
                  later();";
    assert_eq!(functions_named(source, "id<number>"), 1);
}

#[test]
fn test_distinct_type_arguments_get_distinct_bodies() {
    let output = lower(
        "function id<T>(x: T): T { return x; }
         id<number>(1);
         id<string>(\"a\");
         id<number[]>([1]);",
    );
    let names: Vec<&str> = output
        .module
        .functions()
        .filter(|f| f.name.starts_with("id<"))
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names.len(), 3, "{:?}", names);
}

#[test]
fn test_unannotated_call_infers_from_arguments() {
    let source = "function id<T>(x: T): T { return x; }
                  log(id(4));";
    expect_output(source, &["4"]);
    assert_eq!(functions_named(source, "id<number>"), 1);
    assert_eq!(functions_named(source, "id<any>"), 0);
}

#[test]
fn test_uninferable_type_argument_falls_back_to_any() {
    let source = "function id<T>(x: T): T { return x; }
                  function empty<T>(): T[] { return []; }
                  log(id({ a: 1 }).a, empty().length);";
    expect_output(source, &["1 0"]);
    assert_eq!(functions_named(source, "id<any>"), 1);
    assert_eq!(functions_named(source, "empty<any>"), 1);
}

#[test]
fn test_generic_not_lowered_without_reference() {
    let output = lower("function unused<T>(x: T): T { return x; }");
    assert!(output.module.functions().all(|f| !f.name.starts_with("unused")));
}

#[test]
fn test_generic_calling_itself_reuses_specialization() {
    let source = "function down<T>(n: number, v: T): T { return n === 0 ? v : down<T>(n - 1, v); }
                  log(down<string>(3, \"done\"));";
    expect_output(source, &["done"]);
    assert_eq!(functions_named(source, "down<string>"), 1);
}

#[test]
fn test_generic_class() {
    expect_output(
        "class Box<T> { value: T; constructor(v: T) { this.value = v; } get(): T { return this.value; } }
         const b = new Box<number>(3);
         const s = new Box<string>(\"x\");
         log(b.get(), s.get());",
        &["3 x"],
    );
}

#[test]
fn test_generic_closure_captures_outer_binding() {
    expect_output(
        "const prefix = \"p:\";
         function tag<T>(v: T): string { return prefix + v; }
         log(tag<number>(1));",
        &["p:1"],
    );
}

#[test]
fn test_generic_method_specialized_per_call() {
    let source = "class C { m<U>(x: U): U { return x; } }
                  const c = new C();
                  log(c.m<number>(1), c.m<string>(\"s\"));";
    expect_output(source, &["1 s"]);
    assert_eq!(functions_named(source, "C.m<number>"), 1);
    assert_eq!(functions_named(source, "C.m<string>"), 1);
}

#[test]
fn test_generic_method_looked_up_dynamically_uses_any() {
    let source = "class C { m<U>(x: U): U { return x; } }
                  const d: any = new C();
                  log(d.m(5));";
    expect_output(source, &["5"]);
    assert_eq!(functions_named(source, "C.m<any>"), 1);
}

#[test]
fn test_generic_method_of_generic_class() {
    let source = "class Box<T> {
                      value: T;
                      constructor(v: T) { this.value = v; }
                      pair<U>(u: U): string { return this.value + \":\" + u; }
                  }
                  const b = new Box<number>(1);
                  log(b.pair<string>(\"a\"), b.pair<number>(2));";
    expect_output(source, &["1:a 1:2"]);
    assert_eq!(functions_named(source, "Box<number>.pair<string>"), 1);
    assert_eq!(functions_named(source, "Box<number>.pair<number>"), 1);
}

#[test]
fn test_const_bound_generic_function_expression() {
    let source = "const f = function<T>(x: T): T { return x; };
                  log(f<number>(1), f<string>(\"a\"));";
    expect_output(source, &["1 a"]);
    assert_eq!(functions_named(source, "f<number>"), 1);
    assert_eq!(functions_named(source, "f<string>"), 1);
}

#[test]
fn test_const_bound_generic_read_before_declaration() {
    expect_output(
        "try { f<number>(1); } catch (e) { log(e.name); }
         const f = function<T>(x: T): T { return x; };
         log(f<number>(2));",
        &["ReferenceError", "2"],
    );
}
