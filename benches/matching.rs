//! Benchmarks for the combining matcher.
//!
//! Measures one matching pass over a few hundred registered modules:
//! - Known-type hits served from the index
//! - Hierarchy matches behind a loader hint
//! - Misses, the common case during startup
//! - Per-module passes as the legacy strategy runs them

extern crate classweave;

use std::{hint::black_box, sync::Arc};

use classweave::{
    installer::{CombiningPipeline, CombiningTransformerBuilder},
    prelude::*,
};
use criterion::{criterion_group, criterion_main, Criterion};

const MODULES: usize = 300;

fn pipeline() -> CombiningPipeline {
    let modules: Vec<ModuleDescriptor> = (0..MODULES)
        .map(|i| match i % 3 {
            0 => ModuleDescriptor::new(
                format!("known-{i}"),
                MatchStrategy::KnownTypes(vec![format!("com.lib{i}.Client")]),
            ),
            1 => ModuleDescriptor::new(
                format!("hierarchy-{i}"),
                MatchStrategy::Hierarchy {
                    marker: Some(format!("com.lib{i}.Marker")),
                    matcher: TypeMatcher::has_super_type(format!("com.lib{i}.Handler")),
                },
            )
            .structure(TypeMatcher::IsInterface.not()),
            _ => ModuleDescriptor::new(
                format!("callsite-{i}"),
                MatchStrategy::CallSite(TypeMatcher::NameStartsWith(format!("com.lib{i}."))),
            )
            .loader(LoaderMatcher::loader_named("AppClassLoader")),
        })
        .collect();

    let index = Arc::new(ModuleIndex::build(&modules).unwrap());
    let mut builder = CombiningTransformerBuilder::new(index);
    for module in &modules {
        builder.register(module).unwrap();
    }
    builder.build()
}

fn app_loader() -> LoaderRef {
    Arc::new(
        SimpleLoader::new(LoaderId(1), "AppClassLoader")
            .with_classes(["com.lib1.Marker", "com.lib4.Marker"]),
    )
}

/// Benchmark a class selected by name through the known-types index.
fn bench_known_type_hit(c: &mut Criterion) {
    let pipeline = pipeline();
    let loader = app_loader();
    let class = ClassDescriptor::new("com.lib0.Client");
    let mut set = MatchSet::new();

    c.bench_function("match_known_type_hit", |b| {
        b.iter(|| {
            let ctx = MatchContext::define(black_box(&class), Some(&loader));
            black_box(pipeline.matcher().match_class(&ctx, &mut set))
        });
    });
}

/// Benchmark a class matched through a hinted hierarchy walk.
fn bench_hierarchy_hit(c: &mut Criterion) {
    let pipeline = pipeline();
    let loader = app_loader();
    let class = ClassDescriptor::new("com.acme.Impl").implements("com.lib4.Handler");
    let mut set = MatchSet::new();

    c.bench_function("match_hierarchy_hit", |b| {
        b.iter(|| {
            let ctx = MatchContext::define(black_box(&class), Some(&loader));
            black_box(pipeline.matcher().match_class(&ctx, &mut set))
        });
    });
}

/// Benchmark a class no module applies to.
fn bench_miss(c: &mut Criterion) {
    let pipeline = pipeline();
    let loader = app_loader();
    let class = ClassDescriptor::new("org.unrelated.Thing").extends("java.lang.Object");
    let mut set = MatchSet::new();

    c.bench_function("match_miss", |b| {
        b.iter(|| {
            let ctx = MatchContext::define(black_box(&class), Some(&loader));
            black_box(pipeline.matcher().match_class(&ctx, &mut set))
        });
    });
}

/// Benchmark the same miss evaluated one module at a time.
fn bench_miss_per_module(c: &mut Criterion) {
    let pipeline = pipeline();
    let loader = app_loader();
    let class = ClassDescriptor::new("org.unrelated.Thing").extends("java.lang.Object");
    let matchers: Vec<CombiningMatcher> = pipeline
        .modules()
        .iter()
        .map(|m| pipeline.matcher().for_module(m.id))
        .collect();
    let mut set = MatchSet::new();

    c.bench_function("match_miss_per_module", |b| {
        b.iter(|| {
            let ctx = MatchContext::define(black_box(&class), Some(&loader));
            for matcher in &matchers {
                black_box(matcher.match_class(&ctx, &mut set));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_known_type_hit,
    bench_hierarchy_hit,
    bench_miss,
    bench_miss_per_module,
);
criterion_main!(benches);
