//! Specialization cache tests across compilations

use kiln_compiler::ir::IrInstr;
use kiln_compiler::{
    compile_source, CompileError, Completion, EmitOutput, Interpreter, LocalSpecializationCache, LowerOptions,
    SharedSpecializationCache, SpecializationCache,
};

const SOURCE: &str = "function id<T>(x: T): T { return x; }
                      id<number>(1);
                      id<number>(2);";

fn loads_external(output: &EmitOutput) -> bool {
    output
        .module
        .functions()
        .flat_map(|f| f.blocks())
        .flat_map(|block| block.instructions.iter())
        .any(|instr| matches!(instr, IrInstr::LoadExternal { .. }))
}

fn run_output(output: &EmitOutput) -> Vec<String> {
    let mut interp = Interpreter::new(&output.module);
    let completion = interp.run().unwrap();
    assert!(matches!(completion, Completion::Normal(_)));
    interp.output().to_vec()
}

#[test]
fn test_cache_records_each_instantiation_once() {
    let mut cache = LocalSpecializationCache::new();
    compile_source(SOURCE, LowerOptions::default(), &mut cache).unwrap();
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_independent_caches_do_not_interfere() {
    let mut first = LocalSpecializationCache::new();
    let mut second = LocalSpecializationCache::new();
    let a = compile_source(SOURCE, LowerOptions::default(), &mut first).unwrap();
    let b = compile_source(SOURCE, LowerOptions::default(), &mut second).unwrap();
    assert!(a.module.get_function_by_name("id<number>").is_some());
    assert!(b.module.get_function_by_name("id<number>").is_some());
}

#[test]
fn test_second_unit_loads_published_body() {
    let mut cache = SharedSpecializationCache::new();
    let owner = LowerOptions {
        unit_name: Some("unit-a".to_string()),
        ..LowerOptions::default()
    };
    let user = LowerOptions {
        unit_name: Some("unit-b".to_string()),
        ..LowerOptions::default()
    };

    let a = compile_source(SOURCE, owner, &mut cache.clone()).unwrap();
    assert!(a.module.get_function_by_name("id<number>").is_some());

    let b = compile_source(SOURCE, user, &mut cache).unwrap();
    assert!(b.module.get_function_by_name("id<number>").is_none());
    assert!(loads_external(&b));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_shared_cache_across_threads_agrees_on_one_entry() {
    let cache = SharedSpecializationCache::new();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mut cache = cache.clone();
            std::thread::spawn(move || {
                let options = LowerOptions {
                    unit_name: Some(format!("unit-{}", i)),
                    ..LowerOptions::default()
                };
                compile_source(SOURCE, options, &mut cache).map(|_| ())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_recompiling_a_unit_into_a_used_cache_is_rejected() {
    let mut cache = LocalSpecializationCache::new();
    compile_source(SOURCE, LowerOptions::default(), &mut cache).unwrap();
    let err = compile_source(SOURCE, LowerOptions::default(), &mut cache).unwrap_err();
    assert!(
        matches!(&err, CompileError::StaleSpecialization { unit, name } if unit == "main" && name == "id<number>"),
        "{}",
        err
    );
}

#[test]
fn test_other_source_of_same_unit_gets_its_own_bodies() {
    let mut cache = LocalSpecializationCache::new();
    compile_source(
        "function id<T>(x: T): T { return x; } id<number>(1);",
        LowerOptions::default(),
        &mut cache,
    )
    .unwrap();

    let second = compile_source(
        "function id<T>(x: T): T { return x; }
         const f = () => \"other body\";
         log(f(), id<number>(2));",
        LowerOptions::default(),
        &mut cache,
    )
    .unwrap();
    assert!(second.module.get_function_by_name("id<number>").is_some());
    assert_eq!(run_output(&second), vec!["other body 2"]);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_units_with_different_sources_do_not_share_declarations() {
    let mut cache = SharedSpecializationCache::new();
    let first = LowerOptions {
        unit_name: Some("unit-a".to_string()),
        ..LowerOptions::default()
    };
    let second = LowerOptions {
        unit_name: Some("unit-b".to_string()),
        ..LowerOptions::default()
    };

    compile_source(
        "function id<T>(x: T): T { return x; } id<number>(1);",
        first,
        &mut cache.clone(),
    )
    .unwrap();
    let b = compile_source(
        "function neg<T>(x: T): T { return x; } log(neg<number>(1));",
        second,
        &mut cache,
    )
    .unwrap();

    assert!(b.module.get_function_by_name("neg<number>").is_some());
    assert!(!loads_external(&b));
    assert_eq!(run_output(&b), vec!["1"]);
    assert_eq!(cache.len(), 2);
}
