//! The convergence loop: multi-sample, multi-round damping of LLM variance.
//!
//! Each attempt draws independent samples (default three) and intersects
//! them; the running intersection across attempts must stay non-empty to
//! return early. When no stable intersection emerges within the attempt
//! budget, the most frequent code across every sample wins (ties to the
//! smallest code integer). A wall-clock budget bounds the whole invocation
//! so a slow endpoint cannot wedge a contract.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::refiner::{Refiner, RefinerInputs};
use swc_taxonomy::SwcId;

#[derive(Debug, Clone)]
pub struct ConvergenceConfig {
    pub max_attempts: u32,
    pub samples_per_round: u32,
    /// Wall-clock budget for the whole invocation.
    pub budget: Duration,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            samples_per_round: 3,
            budget: Duration::from_secs(600),
        }
    }
}

/// Run the loop for one `(contract, analyzer)` pair.
pub async fn converge(
    refiner: &Refiner<'_>,
    inputs: &RefinerInputs,
    config: &ConvergenceConfig,
) -> BTreeSet<SwcId> {
    let started = Instant::now();
    let mut running: Option<BTreeSet<SwcId>> = None;
    let mut all_codes: Vec<SwcId> = Vec::new();

    for attempt in 1..=config.max_attempts {
        if started.elapsed() >= config.budget {
            info!(
                analyzer = %refiner.analyzer(),
                attempt,
                "convergence budget exhausted; returning partial state"
            );
            break;
        }

        let mut round: Option<BTreeSet<SwcId>> = None;
        for _ in 0..config.samples_per_round {
            let sample = refiner.run_round(inputs).await;
            all_codes.extend(sample.iter().copied());
            round = Some(match round {
                None => sample,
                Some(acc) => acc.intersection(&sample).copied().collect(),
            });
        }
        let round = round.unwrap_or_default();

        running = Some(match running {
            None => round,
            Some(acc) => acc.intersection(&round).copied().collect(),
        });

        if let Some(stable) = running.as_ref().filter(|s| !s.is_empty()) {
            debug!(
                analyzer = %refiner.analyzer(),
                attempt,
                codes = %swc_taxonomy::render(stable),
                "stable intersection reached"
            );
            return stable.clone();
        }
    }

    majority(&all_codes)
}

/// Most frequent code; ties broken by the smallest integer. Empty input
/// yields the empty set.
fn majority(all_codes: &[SwcId]) -> BTreeSet<SwcId> {
    let mut counts: BTreeMap<SwcId, usize> = BTreeMap::new();
    for &code in all_codes {
        *counts.entry(code).or_insert(0) += 1;
    }
    let mut best: Option<(SwcId, usize)> = None;
    for (code, count) in counts {
        // strictly-greater keeps the smallest code on ties (ascending walk)
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((code, count));
        }
    }
    best.map(|(code, _)| code).into_iter().collect()
}
