//! Test harness for end-to-end lowering and execution

use kiln_compiler::{
    compile_source, Completion, EmitOutput, Interpreter, LocalSpecializationCache, LowerOptions,
};

/// Lower `source` with default options
pub fn lower(source: &str) -> EmitOutput {
    lower_with(source, LowerOptions::default())
}

pub fn lower_with(source: &str, options: LowerOptions) -> EmitOutput {
    let mut cache = LocalSpecializationCache::new();
    match compile_source(source, options, &mut cache) {
        Ok(output) => output,
        Err(e) => panic!("lowering failed: {}\nsource:\n{}", e, source),
    }
}

/// Lower and run `source`, returning how it completed and what it logged
pub fn run(source: &str) -> (Completion, Vec<String>) {
    let output = lower(source);
    let mut interp = Interpreter::new(&output.module);
    let completion = match interp.run() {
        Ok(completion) => completion,
        Err(e) => panic!("interpreter failed: {}\nsource:\n{}", e, source),
    };
    (completion, interp.output().to_vec())
}

/// Expect `source` to complete normally with exactly these output lines
pub fn expect_output(source: &str, expected: &[&str]) {
    let (completion, output) = run(source);
    if let Completion::Throw(value) = &completion {
        panic!("uncaught exception: {}\noutput: {:?}\nsource:\n{}", value, output, source);
    }
    assert_eq!(output, expected, "source:\n{}", source);
}

/// Expect an exception of class `name` to escape, returning the output logged first
pub fn expect_throw(source: &str, name: &str) -> Vec<String> {
    let (completion, output) = run(source);
    match completion {
        Completion::Throw(value) => {
            let text = value.to_string();
            assert!(
                text.starts_with(&format!("{}:", name)),
                "expected {}, got {}\nsource:\n{}",
                name,
                text,
                source
            );
        }
        Completion::Normal(_) => panic!("expected {} to be thrown\noutput: {:?}\nsource:\n{}", name, output, source),
    }
    output
}
