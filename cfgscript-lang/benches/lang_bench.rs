use cfgscript_core::{load, CancellationToken, ExecOptions, LoadOptions, MemoryFileReader};
use cfgscript_lang::{parse, tokenize, Engine};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

const SERVICE_CONFIG: &str = r#"
load("lib/defaults.cfg", "DEFAULT_PORT", "labels")

Service = records.type("app.v1.Service")

def service(name, port = DEFAULT_PORT, replicas = 1):
    return Service(
        name = name,
        port = port,
        replicas = replicas,
        labels = dict(labels, app = name),
    )

def main(ctx):
    names = ["web", "api", "worker", "cron"]
    return [service(n, replicas = i + 1) for i, n in enumerate(names)]
"#;

const DEFAULTS: &str = r#"
DEFAULT_PORT = 8080
labels = {"team": "platform", "tier": "backend"}
"#;

fn parse_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("lang");

    group.throughput(Throughput::Bytes(SERVICE_CONFIG.len() as u64));
    group.bench_function("tokenize", |b| {
        b.iter(|| {
            let _ = black_box(tokenize(black_box(SERVICE_CONFIG)));
        });
    });

    group.bench_function("parse", |b| {
        b.iter(|| {
            let _ = black_box(parse(black_box(SERVICE_CONFIG)));
        });
    });

    group.finish();
}

fn load_benchmarks(c: &mut Criterion) {
    let reader = Arc::new(
        MemoryFileReader::new()
            .with_file("main.cfg", SERVICE_CONFIG)
            .with_file("lib/defaults.cfg", DEFAULTS),
    );
    let engine = Arc::new(Engine::new());
    let cancel = CancellationToken::new();

    c.bench_function("load_and_main", |b| {
        b.iter(|| {
            let config = load(
                engine.clone(),
                &cancel,
                "main.cfg",
                LoadOptions::new().with_file_reader(reader.clone()),
            )
            .unwrap();
            black_box(config.main(&cancel, ExecOptions::new()).unwrap())
        });
    });
}

fn scaling_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_scaling");

    for size in [10, 100, 1000].iter() {
        let source = generate_assignments(*size);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| {
                let _ = black_box(parse(black_box(source)));
            });
        });
    }

    group.finish();
}

fn generate_assignments(count: usize) -> String {
    (0..count)
        .map(|i| format!("value_{} = [{}, \"item-{}\", {{\"key\": {} * 2}}]\n", i, i, i, i))
        .collect()
}

criterion_group!(benches, parse_benchmarks, load_benchmarks, scaling_benchmarks);
criterion_main!(benches);
