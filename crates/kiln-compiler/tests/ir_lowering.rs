//! IR shape tests
//!
//! Structural checks on lowered modules: verifier acceptance, function kinds,
//! diagnostics and the effect of lowering options.

use kiln_compiler::diagnostics::diagnostics_to_json;
use kiln_compiler::ir::{verify_function, IrInstr, Terminator};
use kiln_compiler::{
    compile_source, DiagnosticCode, EmitOutput, IrFunctionKind, LocalSpecializationCache, LowerOptions,
    PrettyPrint, Severity,
};

fn lower_with(source: &str, options: LowerOptions) -> EmitOutput {
    let mut cache = LocalSpecializationCache::new();
    compile_source(source, options, &mut cache).expect("lowering failed")
}

fn lower(source: &str) -> EmitOutput {
    lower_with(source, LowerOptions::default())
}

fn count_instrs(output: &EmitOutput, pred: impl Fn(&IrInstr) -> bool) -> usize {
    output
        .module
        .functions()
        .flat_map(|f| f.blocks())
        .flat_map(|b| b.instructions.iter())
        .filter(|i| pred(i))
        .count()
}

// ============================================================================
// SSA well-formedness
// ============================================================================

mod well_formedness {
    use super::*;

    const FIXTURES: &[&str] = &[
        "let s = 0; for (let i = 0; i < 10; i++) { if (i % 3 === 0) { continue; } s = s + i; } log(s);",
        "let n = 0; while (n < 5) { n++; if (n === 3) { break; } } do { n--; } while (n > 0);",
        "try { throw 1; } catch (e) { log(e); } finally { log(\"f\"); }",
        "function f(x) { let r = 0; switch (x) { case 1: r = 1; case 2: r = r + 2; break; default: r = -1; } return r; }",
        "function* g(a) { let t = 0; try { t = yield a; } finally { log(t); } return t; }",
        "async function h(p) { let v = 0; for (const x of [1, 2]) { v = v + await p; } return v; }",
        "const { a, b: [c, ...d], ...e } = { a: 1, b: [2, 3] }; let [x = 1, y] = d;",
        "function* outer() { const r = yield* [1, 2]; return r; }",
        "class A { constructor(v) { this.v = v; } m() { return () => this.v; } }",
        "let k = 0; label: for (const q of [1, 2]) { for (;;) { k++; if (k > 3) { break label; } continue label; } }",
    ];

    #[test]
    fn test_every_function_verifies() {
        for source in FIXTURES {
            let output = lower_with(source, LowerOptions::default().with_verify(false));
            for func in output.module.functions() {
                if let Err(e) = verify_function(func) {
                    panic!("{}\nsource: {}\n{}", e, source, func.pretty_print());
                }
            }
        }
    }

    #[test]
    fn test_every_block_has_terminator() {
        for source in FIXTURES {
            let output = lower(source);
            for func in output.module.functions() {
                for block in func.blocks() {
                    assert!(block.terminator.is_some(), "{} {} in {}", func.name, block.id, source);
                }
            }
        }
    }

    #[test]
    fn test_phis_lead_their_blocks() {
        for source in FIXTURES {
            let output = lower(source);
            for func in output.module.functions() {
                for block in func.blocks() {
                    let first_non_phi = block
                        .instructions
                        .iter()
                        .position(|i| !matches!(i, IrInstr::Phi { .. }))
                        .unwrap_or(block.instructions.len());
                    assert!(block.instructions[first_non_phi..]
                        .iter()
                        .all(|i| !matches!(i, IrInstr::Phi { .. })));
                }
            }
        }
    }
}

// ============================================================================
// Function kinds
// ============================================================================

mod function_kinds {
    use super::*;

    #[test]
    fn test_module_init_is_entry() {
        let output = lower("log(1);");
        let entry = output.module.get_function(output.module.entry).unwrap();
        assert_eq!(entry.kind, IrFunctionKind::ModuleInit);
        assert_eq!(entry.name, "main");
    }

    #[test]
    fn test_generator_splits_into_factory_and_machine() {
        let output = lower("function* g() { yield 1; }");
        let factory = output.module.get_function_by_name("g").unwrap();
        let machine = output.module.get_function_by_name("g$machine").unwrap();
        assert_eq!(factory.kind, IrFunctionKind::GeneratorFactory);
        assert_eq!(machine.kind, IrFunctionKind::GeneratorMachine);
        assert_eq!(machine.params.len(), 3);
    }

    #[test]
    fn test_async_splits_into_factory_and_machine() {
        let output = lower("async function f() { await 1; }");
        assert_eq!(
            output.module.get_function_by_name("f").unwrap().kind,
            IrFunctionKind::AsyncFactory
        );
        assert_eq!(
            output.module.get_function_by_name("f$machine").unwrap().kind,
            IrFunctionKind::AsyncMachine
        );
        assert_eq!(count_instrs(&output, |i| matches!(i, IrInstr::RunAsync { .. })), 1);
    }

    #[test]
    fn test_arrow_and_method_kinds() {
        let output = lower("const f = () => 1; class C { constructor() {} m() {} }");
        let kinds: Vec<IrFunctionKind> = output.module.functions().map(|f| f.kind).collect();
        assert!(kinds.contains(&IrFunctionKind::Arrow));
        assert!(kinds.contains(&IrFunctionKind::ClassConstructor));
        assert!(kinds.contains(&IrFunctionKind::Method));
    }

    #[test]
    fn test_machine_dispatches_on_state() {
        let output = lower("function* g() { yield 1; yield 2; }");
        let machine = output.module.get_function_by_name("g$machine").unwrap();
        let entry = machine.get_block(machine.entry_block).unwrap();
        match &entry.terminator {
            Some(Terminator::Switch { cases, .. }) => assert!(cases.len() >= 6),
            other => panic!("expected a state switch, got {:?}", other),
        }
    }

    #[test]
    fn test_async_generator_is_unsupported() {
        let mut cache = LocalSpecializationCache::new();
        let result = compile_source("async function* ag() { yield 1; }", LowerOptions::default(), &mut cache);
        assert!(result.is_err());
    }
}

// ============================================================================
// Environments and TDZ checks
// ============================================================================

mod environments {
    use super::*;

    #[test]
    fn test_uncaptured_bindings_stay_in_registers() {
        let output = lower("function f() { let a = 1; let b = a + 1; return b; }");
        let f = output.module.get_function_by_name("f").unwrap();
        assert!(f.env_layouts.is_empty());
    }

    #[test]
    fn test_captured_binding_gets_environment_slot() {
        let output = lower("function f() { let a = 1; return () => a; }");
        let f = output.module.get_function_by_name("f").unwrap();
        assert!(f.env_layouts.iter().any(|l| l.slots.iter().any(|s| s.name == "a")));
    }

    #[test]
    fn test_tdz_checks_can_be_disabled() {
        let source = "function f() { return x; } let x = 1;";
        let checked = lower(source);
        let unchecked = lower_with(source, LowerOptions::default().with_tdz_checks(false));
        assert!(count_instrs(&checked, |i| matches!(i, IrInstr::ThrowIfEmpty { .. })) > 0);
        assert_eq!(count_instrs(&unchecked, |i| matches!(i, IrInstr::ThrowIfEmpty { .. })), 0);
    }

    #[test]
    fn test_per_iteration_copy_emitted_for_captured_loop_binding() {
        let output = lower("for (let i = 0; i < 2; i++) { log(() => i); }");
        assert!(count_instrs(&output, |i| matches!(i, IrInstr::CopyEnvironment { .. })) > 0);
    }

    #[test]
    fn test_no_per_iteration_copy_without_capture() {
        let output = lower("let s = 0; for (let i = 0; i < 2; i++) { s = s + i; }");
        assert_eq!(count_instrs(&output, |i| matches!(i, IrInstr::CopyEnvironment { .. })), 0);
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

mod diagnostics {
    use super::*;

    #[test]
    fn test_always_failing_tdz_read_warns() {
        let output = lower("log(x); let x = 1;");
        let warning = output
            .diagnostics
            .iter()
            .find(|d| d.code == DiagnosticCode::TdzAlwaysThrows)
            .expect("expected a TDZ warning");
        assert_eq!(warning.severity, Severity::Warning);
    }

    #[test]
    fn test_read_inside_closure_does_not_warn() {
        let output = lower("function f() { return x; } let x = 1;");
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_warnings_can_be_disabled() {
        let output = lower_with("log(x); let x = 1;", LowerOptions::default().with_warnings(false));
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_const_assignment_reported() {
        let output = lower("const c = 1; c = 2;");
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::ConstAssignment && d.severity == Severity::Error));
    }

    #[test]
    fn test_let_and_var_conflict_reported() {
        let output = lower("let a = 1; var a = 2;");
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::DuplicateDeclaration));
    }

    #[test]
    fn test_diagnostics_serialize_to_json() {
        let output = lower("log(x); let x = 1;");
        let json = diagnostics_to_json(&output.diagnostics).unwrap();
        assert!(json.contains("TdzAlwaysThrows"));
        assert!(json.contains("main"));
    }
}

// ============================================================================
// Determinism
// ============================================================================

mod determinism {
    use super::*;

    const PROGRAM: &str = "function* g(n) { for (let i = 0; i < n; i++) { const [a, b] = yield i; log(a, b); } }
                           async function h() { try { await g; } catch (e) {} }
                           function id<T>(x: T): T { return x; }
                           const fs = []; for (let k = 0; k < 3; k++) { fs[k] = () => id<number>(k); }";

    #[test]
    fn test_lowering_is_repeatable() {
        let first = lower(PROGRAM).module.pretty_print();
        let second = lower(PROGRAM).module.pretty_print();
        assert_eq!(first, second);
    }

    #[test]
    fn test_block_and_instruction_counts_match() {
        let a = lower(PROGRAM);
        let b = lower(PROGRAM);
        let shape = |o: &EmitOutput| {
            o.module
                .functions()
                .map(|f| (f.name.clone(), f.block_count(), f.instruction_count()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&a), shape(&b));
    }

    #[test]
    fn test_module_serializes() {
        let output = lower("let x = 1; log(x);");
        let json = serde_json::to_string(&output.module).unwrap();
        assert!(json.contains("\"main\""));
    }
}
