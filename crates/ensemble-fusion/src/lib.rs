//! # Ensemble Fusion
//!
//! Combines the converged per-analyzer verdicts for one contract into a
//! single weakness code. Analyzers that produced no evidence are excluded
//! and the remaining base weights renormalized, so silent tools never
//! dilute vocal ones; codes confirmed by two or more analyzers earn a 1.5x
//! agreement bonus; ties break to the smallest code integer. The result is
//! a pure function of its inputs.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use swc_taxonomy::{render, AnalyzerId, ContractRef, SwcId};

/// Multiplier applied when >= 2 analyzers report the same code.
pub const AGREEMENT_BONUS: f64 = 1.5;

/// How the final verdict is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsembleStrategy {
    /// Adaptive weighted voting across every analyzer.
    WeightedIntegration,
    /// Trust a single designated analyzer's converged verdict.
    OptimalSelection(AnalyzerId),
}

impl EnsembleStrategy {
    /// Directory tag for the ensemble artifact.
    pub fn tag(self) -> String {
        match self {
            EnsembleStrategy::WeightedIntegration => "Weighted_Integration".to_string(),
            EnsembleStrategy::OptimalSelection(a) => format!("Optimal_Selection_{a}"),
        }
    }
}

/// The fused verdict for one contract.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleVerdict {
    pub contract: ContractRef,
    /// `None` is the explicit null marker: no clear vulnerability.
    pub code: Option<SwcId>,
    pub score: f64,
    /// What each non-silent analyzer contributed.
    pub contributions: BTreeMap<AnalyzerId, BTreeSet<SwcId>>,
}

impl EnsembleVerdict {
    /// Human-readable artifact body.
    pub fn render(&self) -> String {
        let mut out = format!("Ensemble verdict for contract {}\n", self.contract);
        match self.code {
            Some(code) => {
                out.push_str(&format!("Final code: {code} (score {:.3})\n", self.score));
            }
            None => {
                out.push_str(
                    "No clear vulnerability detected after weighted fusion.\n\
                     This is not a proof of safety.\n",
                );
            }
        }
        out.push_str("Per-analyzer contributions:\n");
        if self.contributions.is_empty() {
            out.push_str("  (all analyzers silent)\n");
        }
        for (analyzer, codes) in &self.contributions {
            out.push_str(&format!("  {analyzer}: {}\n", render(codes)));
        }
        out
    }
}

/// Fuse per-analyzer verdicts under the base weight table. Weights are
/// configuration (upstream empirical calibration); only analyzers present
/// in `verdicts` participate, and empty verdicts are excluded before
/// renormalization.
pub fn fuse(
    contract: &ContractRef,
    verdicts: &BTreeMap<AnalyzerId, BTreeSet<SwcId>>,
    base_weights: &BTreeMap<AnalyzerId, f64>,
) -> EnsembleVerdict {
    let vocal: BTreeMap<AnalyzerId, &BTreeSet<SwcId>> = verdicts
        .iter()
        .filter(|(_, codes)| !codes.is_empty())
        .map(|(&a, codes)| (a, codes))
        .collect();

    if vocal.is_empty() {
        return EnsembleVerdict {
            contract: contract.clone(),
            code: None,
            score: 0.0,
            contributions: BTreeMap::new(),
        };
    }

    let total_base: f64 = vocal
        .keys()
        .map(|a| base_weights.get(a).copied().unwrap_or(0.0))
        .sum();

    let mut scores: BTreeMap<SwcId, (f64, u32)> = BTreeMap::new();
    for (analyzer, codes) in &vocal {
        let adjusted = if total_base > 0.0 {
            base_weights.get(analyzer).copied().unwrap_or(0.0) / total_base
        } else {
            1.0 / vocal.len() as f64
        };
        for &code in codes.iter() {
            let entry = scores.entry(code).or_insert((0.0, 0));
            entry.0 += adjusted;
            entry.1 += 1;
        }
    }

    // argmax with smallest-integer tie-break: the ascending walk keeps the
    // first code seen at any given score
    let mut best: Option<(SwcId, f64)> = None;
    for (code, (raw, reporters)) in &scores {
        let score = if *reporters >= 2 {
            raw * AGREEMENT_BONUS
        } else {
            *raw
        };
        debug!(%code, score, reporters, "fused score");
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((*code, score));
        }
    }

    let (code, score) = best.expect("vocal verdicts imply at least one code");
    EnsembleVerdict {
        contract: contract.clone(),
        code: Some(code),
        score,
        contributions: vocal
            .into_iter()
            .map(|(a, codes)| (a, codes.clone()))
            .collect(),
    }
}

/// The Optimal_Selection strategy: the chosen analyzer's verdict stands
/// alone (smallest code when several converged).
pub fn select_optimal(
    contract: &ContractRef,
    verdicts: &BTreeMap<AnalyzerId, BTreeSet<SwcId>>,
    technique: AnalyzerId,
) -> EnsembleVerdict {
    let codes = verdicts.get(&technique).cloned().unwrap_or_default();
    let code = codes.iter().next().copied();
    EnsembleVerdict {
        contract: contract.clone(),
        code,
        score: if code.is_some() { 1.0 } else { 0.0 },
        contributions: if codes.is_empty() {
            BTreeMap::new()
        } else {
            BTreeMap::from([(technique, codes)])
        },
    }
}
