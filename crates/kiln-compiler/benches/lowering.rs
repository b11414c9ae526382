use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kiln_compiler::{IrEmitter, LocalSpecializationCache, LowerOptions};
use kiln_syntax::parse_and_resolve;

const CLOSURES: &str = "function counter() { let c = 0; return () => { c = c + 1; return c; }; }
    const fs = [];
    for (let i = 0; i < 10; i++) { fs[i] = () => i; }";

const GENERATORS: &str = "function* range(n) { for (let i = 0; i < n; i++) { try { yield i; } finally { log(i); } } }
    function* outer() { const r = yield* range(3); return r; }
    async function main() { for (const x of range(2)) { await x; } }";

const DESTRUCTURING: &str = "const { a, b: [c, d = 2, ...e], ...rest } = { a: 1, b: [3], z: 4 };
    function f({ x, y = 1 }, [p, q]) { return x + y + p + q; }
    let m = 0; let n = 0; [m, n] = [n, m];";

const GENERICS: &str = "function id<T>(x: T): T { return x; }
    class Box<T> { value: T; constructor(v: T) { this.value = v; } get(): T { return this.value; } }
    id<number>(1); id<string>(\"s\"); new Box<number>(1); new Box<boolean>(true);";

fn bench_lowering(c: &mut Criterion) {
    let mut group = c.benchmark_group("lower_module");

    for (name, source) in [
        ("closures", CLOSURES),
        ("generators", GENERATORS),
        ("destructuring", DESTRUCTURING),
        ("generics", GENERICS),
    ] {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("emit", name), &source, |b, source| {
            let (module, tree, types) = parse_and_resolve(source).unwrap();
            b.iter(|| {
                let mut types = types.clone();
                let mut cache = LocalSpecializationCache::new();
                let mut emitter = IrEmitter::new(source, &tree, &mut types, LowerOptions::default(), &mut cache);
                emitter.emit_module(black_box(&module)).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_verification_overhead(c: &mut Criterion) {
    let (module, tree, types) = parse_and_resolve(GENERATORS).unwrap();
    let mut group = c.benchmark_group("verify");
    for verify in [false, true] {
        group.bench_with_input(BenchmarkId::new("generators", verify), &verify, |b, &verify| {
            b.iter(|| {
                let mut types = types.clone();
                let mut cache = LocalSpecializationCache::new();
                let options = LowerOptions::default().with_verify(verify);
                let mut emitter = IrEmitter::new(GENERATORS, &tree, &mut types, options, &mut cache);
                emitter.emit_module(black_box(&module)).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lowering, bench_verification_overhead);
criterion_main!(benches);
