//! Multi-Krum filtering a batch with colluding attackers

use ndarray::array;
use qora_guard::config::DefenseConfig;
use qora_guard::defense::krum::multi_krum;
use qora_guard::verification::krum_condition::krum_tolerance;
use qora_guard::{ClientUpdate, Layer, RobustAggregationEngine, TrainingMetrics};

fn main() {
    println!("Qora-Guard multi-Krum demo\n");

    // 7 honest clients around [1, 2, 3], 3 colluding attackers at [100, 200, 300]
    let mut weights: Vec<Vec<Layer>> = (0..7)
        .map(|i| {
            let d = i as f32 * 0.05;
            vec![array![1.0 + d, 2.0 - d, 3.0 + d]]
        })
        .collect();
    weights.extend(vec![vec![array![100.0, 200.0, 300.0]]; 3]);

    println!(
        "n = {}, tolerates f = {} Byzantine clients",
        weights.len(),
        krum_tolerance(weights.len())
    );

    let refs: Vec<&[Layer]> = weights.iter().map(|w| w.as_slice()).collect();
    println!("Kept indices: {:?}", multi_krum(&refs));

    let engine = RobustAggregationEngine::new(DefenseConfig::default()).expect("default config is valid");
    let global = vec![array![0.0f32, 0.0, 0.0]];
    let updates: Vec<ClientUpdate> = weights
        .into_iter()
        .enumerate()
        .map(|(i, w)| ClientUpdate::new(format!("client_{}", i), 1, w, TrainingMetrics::default()))
        .collect();
    for update in &updates {
        engine.validate(update, &global).expect("shapes match");
    }

    let kept = engine.aggregate_defense(updates, &global).expect("non-empty batch");
    let ids: Vec<&str> = kept.iter().map(|u| u.client_id.as_str()).collect();
    println!("Surviving clients: {:?}", ids);
    let audit = engine.audit_log();
    println!(
        "Audit: {} submitted, {} dropped",
        audit.total_submitted(),
        audit.total_dropped()
    );
}
