//! Benchmarks for preference resolution, decision cycles, and reclamation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use decide_kernel::config::EngineConfig;
use decide_kernel::engine::Engine;
use decide_kernel::graph::{InstantiationSpec, PreferenceSpec, PreferenceType};
use decide_kernel::resolve::ResolveMode;

fn proposals(engine: &mut Engine, count: usize) {
    let s1 = engine.create_top_goal().unwrap();
    let mut spec = InstantiationSpec::new("propose", s1);
    for i in 0..count {
        let value = format!("o{i}");
        spec = spec
            .with_preference(PreferenceSpec::acceptable(s1, "operator", value.as_str()))
            .with_preference(PreferenceSpec::binary(
                PreferenceType::NumericIndifferent,
                s1,
                "operator",
                value.as_str(),
                i as f64 / count as f64,
            ));
    }
    engine.add_instantiation(spec).unwrap();
    engine.run_wm_phase().unwrap();
}

fn bench_resolve(c: &mut Criterion) {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    proposals(&mut engine, 64);
    let s1 = engine.top_goal().unwrap();
    let slot = engine.graph().operator_slot(s1).unwrap();

    c.bench_function("resolve_64_indifferent", |bench| {
        bench.iter(|| black_box(engine.resolve_slot(slot, ResolveMode::Commit).unwrap()))
    });
}

fn bench_decision_cycle(c: &mut Criterion) {
    c.bench_function("select_then_impasse", |bench| {
        bench.iter(|| {
            let mut engine = Engine::new(EngineConfig::default()).unwrap();
            proposals(&mut engine, 16);
            black_box(engine.run_decision_phase().unwrap());
            black_box(engine.run_decision_phase().unwrap());
        })
    });
}

fn bench_reclaim_chain(c: &mut Criterion) {
    c.bench_function("reclaim_chain_256", |bench| {
        bench.iter(|| {
            let mut engine = Engine::new(EngineConfig::default()).unwrap();
            let s1 = engine.create_top_goal().unwrap();
            let head = engine.make_identifier('C', 1);
            let anchor = engine.add_input_wme(s1, "chain", head).unwrap();
            let mut prev = head;
            for _ in 0..256 {
                let next = engine.make_identifier('C', 1);
                engine.add_input_wme(prev, "next", next).unwrap();
                prev = next;
            }
            engine.do_buffered_wm_and_ownership_changes().unwrap();
            engine.remove_input_wme(anchor).unwrap();
            engine.do_buffered_wm_and_ownership_changes().unwrap();
            black_box(engine.stats().identifiers_reclaimed)
        })
    });
}

criterion_group!(benches, bench_resolve, bench_decision_cycle, bench_reclaim_chain);
criterion_main!(benches);
