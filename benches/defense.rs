use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use qora_guard::config::{DefenseConfig, PrivacyConfig};
use qora_guard::defense::krum::multi_krum;
use qora_guard::{ClientUpdate, DifferentialPrivacyEngine, Layer, RobustAggregationEngine, TrainingMetrics};

fn make_update(i: usize, n_params: usize) -> ClientUpdate {
    let layer = Array1::from_shape_fn(n_params, |j| ((i * n_params + j) as f32).sin());
    ClientUpdate::new(format!("client_{}", i), 1, vec![layer], TrainingMetrics::default())
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");

    for &n_params in &[1_000usize, 100_000] {
        let global: Vec<Layer> = vec![Array1::zeros(n_params)];
        let engine = RobustAggregationEngine::new(DefenseConfig::default()).unwrap();
        for i in 0..10 {
            engine.validate(&make_update(i, n_params), &global).unwrap();
        }
        let update = make_update(10, n_params);

        group.bench_with_input(BenchmarkId::new("warm", n_params), &update, |b, update| {
            b.iter(|| engine.validate(update, &global).unwrap())
        });
    }
    group.finish();
}

fn bench_multi_krum(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_krum");

    for &n_clients in &[10, 50] {
        for &n_params in &[1_000usize, 100_000] {
            let updates: Vec<Vec<Layer>> = (0..n_clients)
                .map(|i| make_update(i, n_params).weights)
                .collect();
            let refs: Vec<&[Layer]> = updates.iter().map(|w| w.as_slice()).collect();
            let id = format!("{}c_{}p", n_clients, n_params);

            group.bench_with_input(BenchmarkId::new("select", &id), &refs, |b, refs| {
                b.iter(|| multi_krum(refs))
            });
        }
    }
    group.finish();
}

fn bench_privacy(c: &mut Criterion) {
    let mut group = c.benchmark_group("privacy");

    for &n_params in &[1_000usize, 100_000, 1_000_000] {
        let mut config = PrivacyConfig::default();
        config.differential_privacy.seed = Some(0);
        let engine = DifferentialPrivacyEngine::initialize(config).unwrap();
        let update = make_update(0, n_params);

        group.bench_with_input(BenchmarkId::new("process", n_params), &update, |b, update| {
            b.iter(|| engine.process(update.clone()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_validate, bench_multi_krum, bench_privacy);
criterion_main!(benches);
