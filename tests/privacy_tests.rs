//! Integration tests for the differential privacy engine

use ndarray::{array, Array1};
use qora_guard::config::{BudgetPolicy, PrivacyConfig};
use qora_guard::error::GuardError;
use qora_guard::privacy::mechanism::{clip_layer, gaussian_noise_scale};
use qora_guard::privacy::DifferentialPrivacyEngine;
use qora_guard::{ClientUpdate, TrainingMetrics};

fn seeded_config(seed: u64) -> PrivacyConfig {
    let mut config = PrivacyConfig::default();
    config.differential_privacy.seed = Some(seed);
    config
}

fn update(id: &str, round: u64, weights: Vec<Array1<f32>>) -> ClientUpdate {
    ClientUpdate::new(id, round, weights, TrainingMetrics::default())
}

#[test]
fn test_noise_matches_gaussian_calibration() {
    let engine = DifferentialPrivacyEngine::initialize(seeded_config(42)).unwrap();
    let n = 20_000;
    let processed = engine
        .process(update("c", 1, vec![Array1::zeros(n)]))
        .unwrap();

    let sigma = gaussian_noise_scale(1.0, 1e-5);
    assert!((processed.metrics.noise_scale - sigma).abs() < 1e-12);
    // sqrt(2 ln(125000)) ~= 4.845
    assert!((sigma - 4.845).abs() < 1e-3);

    let values: Vec<f64> = processed.update.weights[0].iter().map(|&x| x as f64).collect();
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    // Standard error of the mean is sigma / sqrt(n) ~= 0.034
    assert!(mean.abs() < 0.15, "sample mean {} too far from 0", mean);
    assert!(
        (var.sqrt() / sigma - 1.0).abs() < 0.03,
        "sample std {} vs sigma {}",
        var.sqrt(),
        sigma
    );
}

#[test]
fn test_seeded_engines_are_reproducible() {
    let a = DifferentialPrivacyEngine::initialize(seeded_config(9)).unwrap();
    let b = DifferentialPrivacyEngine::initialize(seeded_config(9)).unwrap();
    let pa = a.process(update("c", 1, vec![array![0.1, 0.2, 0.3]])).unwrap();
    let pb = b.process(update("c", 1, vec![array![0.1, 0.2, 0.3]])).unwrap();
    assert_eq!(pa.update.weights, pb.update.weights);
}

#[test]
fn test_clipping_is_idempotent() {
    let mut layer = array![3.0f32, -4.0, 12.0];
    let before = clip_layer(&mut layer, 1.0);
    assert!((before - 13.0).abs() < 1e-5);

    let once = layer.clone();
    let after = clip_layer(&mut layer, 1.0);
    assert!(after <= 1.0 + 1e-6);
    for (a, b) in layer.iter().zip(once.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_budget_is_monotone_and_sums_exactly() {
    let engine = DifferentialPrivacyEngine::initialize(seeded_config(1)).unwrap();
    let mut last = 0.0;
    for round in 1..=5u64 {
        let processed = engine.process(update("c", round, vec![array![0.5, 0.5]])).unwrap();
        let budget = processed.budget.unwrap();
        assert!(budget.epsilon > last);
        last = budget.epsilon;
        assert_eq!(budget.epsilon, round as f64);
        assert!((budget.delta - round as f64 * 1e-5).abs() < 1e-15);
        assert_eq!(budget.rounds, round);
        // Ceiling defaults to one round's spend, so every later round exceeds it
        assert_eq!(processed.budget_exceeded, round > 1);
    }
    assert_eq!(engine.remaining_budget("c"), (0.0, 0.0));
}

#[test]
fn test_hard_stop_rejects_before_spending() {
    let mut config = seeded_config(3);
    config.differential_privacy.total_epsilon = Some(2.0);
    config.differential_privacy.total_delta = Some(1.0e-3);
    config.differential_privacy.budget_policy = BudgetPolicy::HardStop;
    let engine = DifferentialPrivacyEngine::initialize(config).unwrap();

    engine.process(update("c", 1, vec![array![1.0]])).unwrap();
    engine.process(update("c", 2, vec![array![1.0]])).unwrap();
    let err = engine.process(update("c", 3, vec![array![1.0]])).unwrap_err();
    assert!(matches!(err, GuardError::BudgetExhausted { .. }));
    assert_eq!(engine.get_privacy_budget("c").unwrap().epsilon, 2.0);

    // Other clients keep their own budget
    assert!(engine.process(update("d", 3, vec![array![1.0]])).is_ok());
}

#[test]
fn test_hard_stop_checks_first_charge() {
    let mut config = seeded_config(4);
    config.differential_privacy.total_epsilon = Some(0.5);
    config.differential_privacy.budget_policy = BudgetPolicy::HardStop;
    let engine = DifferentialPrivacyEngine::initialize(config).unwrap();

    let err = engine.process(update("c", 1, vec![array![1.0]])).unwrap_err();
    match err {
        GuardError::BudgetExhausted { client_id, epsilon, delta } => {
            assert_eq!(client_id, "c");
            assert_eq!((epsilon, delta), (0.0, 0.0));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(engine.get_privacy_budget("c").is_none());
    assert_eq!(engine.remaining_budget("c").0, 0.5);
}

#[test]
fn test_hard_stop_checks_first_delta_charge() {
    let mut config = seeded_config(6);
    config.differential_privacy.total_delta = Some(1e-6);
    config.differential_privacy.budget_policy = BudgetPolicy::HardStop;
    let engine = DifferentialPrivacyEngine::initialize(config).unwrap();

    assert!(matches!(
        engine.process(update("c", 1, vec![array![1.0]])),
        Err(GuardError::BudgetExhausted { .. })
    ));
}

#[test]
fn test_shape_pinned_by_first_update() {
    let engine = DifferentialPrivacyEngine::initialize(seeded_config(5)).unwrap();
    engine.process(update("a", 1, vec![array![1.0, 2.0]])).unwrap();
    let err = engine
        .process(update("b", 1, vec![array![1.0, 2.0, 3.0]]))
        .unwrap_err();
    assert!(matches!(err, GuardError::ShapeMismatch { .. }));
    assert!(engine.get_privacy_budget("b").is_none());
}

#[test]
fn test_process_batch_preserves_order() {
    let engine = DifferentialPrivacyEngine::initialize(seeded_config(11)).unwrap();
    let updates: Vec<ClientUpdate> = (0..16)
        .map(|i| update(&format!("c{}", i), 1, vec![Array1::from_elem(4, i as f32)]))
        .collect();
    let results = engine.process_batch(updates);
    for (i, result) in results.iter().enumerate() {
        let processed = result.as_ref().unwrap();
        assert_eq!(processed.update.client_id, format!("c{}", i));
    }
    assert_eq!(engine.ledger().len(), 16);
}
