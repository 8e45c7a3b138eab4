//! Several federated rounds through the guard pipeline with one attacker

use ndarray::Array1;
use qora_guard::{ClientUpdate, GuardConfig, GuardPipeline, Layer, TrainingMetrics};
use tracing_subscriber::EnvFilter;

const N_HONEST: usize = 7;
const N_PARAMS: usize = 32;

fn honest_update(i: usize, round: u64) -> ClientUpdate {
    let jitter = ((i as u64 * 7 + round * 3) % 10) as f32 * 0.002;
    ClientUpdate::new(
        format!("honest_{}", i),
        round,
        vec![Array1::from_elem(N_PARAMS, 0.05 + jitter)],
        TrainingMetrics {
            loss: 0.4 - jitter,
            accuracy: 0.85 + jitter,
            training_duration: 12.0,
        },
    )
}

fn sign_flip_update(round: u64) -> ClientUpdate {
    ClientUpdate::new(
        "attacker",
        round,
        vec![Array1::from_elem(N_PARAMS, -0.5)],
        TrainingMetrics {
            loss: 0.35,
            accuracy: 0.88,
            training_duration: 1.0,
        },
    )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GuardConfig::from_json(
        r#"{
            "differential_privacy": { "epsilon": 2.0, "delta": 1e-5, "clip_norm": 1.0, "total_epsilon": 10.0 },
            "min_updates_for_detection": 8,
            "use_krum": false
        }"#,
    )
    .expect("demo config is valid");
    let pipeline = GuardPipeline::new(config).expect("demo config is valid");
    let global: Vec<Layer> = vec![Array1::zeros(N_PARAMS)];

    println!("Qora-Guard round simulation\n");

    for round in 1..=4 {
        let mut updates: Vec<ClientUpdate> = (0..N_HONEST).map(|i| honest_update(i, round)).collect();
        if round >= 3 {
            updates.push(sign_flip_update(round));
        }

        let outcome = pipeline.run_round(updates, &global).expect("round succeeds");
        println!(
            "Round {}: {} submitted, {} rejected, {} privatised",
            round,
            outcome.validations.len(),
            outcome.rejected(),
            outcome.processed.len()
        );
        for (client_id, verdict) in outcome.validations.iter().filter(|(_, v)| !v.is_valid) {
            println!("   rejected {}: {:?}", client_id, verdict.anomalies);
        }
    }

    let defense = pipeline.defense();
    println!("\nFinal scores:");
    for id in ["honest_0", "attacker"] {
        let (eps_left, _) = pipeline.privacy().remaining_budget(id);
        println!(
            "   {:<10} client {:.3}  byzantine {:.3}  epsilon left {:.1}",
            id,
            defense.get_client_score(id),
            defense.get_byzantine_score(id),
            eps_left
        );
    }
}
