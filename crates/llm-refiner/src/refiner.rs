//! Per-analyzer LLM refinement: one sampling round.
//!
//! The CoT strategy runs the inspiration → analysis → symbolic-replay
//! chain; the one_shot strategy asks once. Either way a round yields the
//! set of weakness codes extracted from the final response, restricted to
//! the dataset's closed set. LLM failures degrade to the empty set — the
//! convergence loop owns variance, the refiner never aborts a contract.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::client::ChatCompletion;
use crate::prompts;
use swc_taxonomy::{normalize, AnalyzerId, ContractRef, SwcId};

/// Which prompt chain a round uses. The CLI token forms (`CoT`,
/// `one_shot`) double as artifact directory tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStrategy {
    CoT,
    OneShot,
}

impl AnalysisStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStrategy::CoT => "CoT",
            AnalysisStrategy::OneShot => "one_shot",
        }
    }
}

/// Everything one refinement round reads. Assembled once per
/// `(contract, analyzer)` by the orchestrator; the effective source has
/// already been through the context-budget policy.
#[derive(Debug, Clone)]
pub struct RefinerInputs {
    pub contract: ContractRef,
    pub source: String,
    pub report: String,
    pub combined_hint: String,
    pub zkp_hint: Option<String>,
    pub key_features: Option<String>,
    pub structure: Option<String>,
}

pub struct Refiner<'a> {
    client: &'a dyn ChatCompletion,
    analyzer: AnalyzerId,
    allowed: &'a BTreeSet<SwcId>,
    strategy: AnalysisStrategy,
}

impl<'a> Refiner<'a> {
    pub fn new(
        client: &'a dyn ChatCompletion,
        analyzer: AnalyzerId,
        allowed: &'a BTreeSet<SwcId>,
        strategy: AnalysisStrategy,
    ) -> Self {
        Self {
            client,
            analyzer,
            allowed,
            strategy,
        }
    }

    pub fn analyzer(&self) -> AnalyzerId {
        self.analyzer
    }

    /// One independent sampling round.
    pub async fn run_round(&self, inputs: &RefinerInputs) -> BTreeSet<SwcId> {
        let response = match self.strategy {
            AnalysisStrategy::OneShot => {
                let prompt = prompts::one_shot(
                    &inputs.contract,
                    &inputs.source,
                    self.analyzer,
                    &inputs.report,
                    &inputs.combined_hint,
                    self.allowed,
                );
                self.ask(&prompt).await
            }
            AnalysisStrategy::CoT => self.run_chain(inputs).await,
        };
        self.restrict(normalize(&response))
    }

    async fn run_chain(&self, inputs: &RefinerInputs) -> String {
        let inspiration = self
            .ask(&prompts::inspiration(
                &inputs.contract,
                &inputs.source,
                &inputs.combined_hint,
                inputs.zkp_hint.as_deref(),
                inputs.key_features.as_deref(),
                inputs.structure.as_deref(),
            ))
            .await;

        let analysis_response = self
            .ask(&prompts::analysis(
                &inputs.contract,
                &inputs.source,
                self.analyzer,
                &inputs.report,
                &inspiration,
                self.allowed,
            ))
            .await;

        let candidates = self.restrict(normalize(&analysis_response));
        if candidates.is_empty() {
            debug!(
                contract = %inputs.contract,
                analyzer = %self.analyzer,
                "analysis phase produced no candidates; skipping replay"
            );
            return String::new();
        }

        self.ask(&prompts::symbolic_replay(
            &inputs.contract,
            &inputs.source,
            &candidates,
            &analysis_response,
        ))
        .await
    }

    /// A failed call is an empty response; the round simply carries fewer
    /// tokens.
    async fn ask(&self, prompt: &str) -> String {
        match self.client.complete(prompt).await {
            Ok(text) => text,
            Err(err) => {
                warn!(analyzer = %self.analyzer, %err, "LLM round returned no tokens");
                String::new()
            }
        }
    }

    fn restrict(&self, codes: BTreeSet<SwcId>) -> BTreeSet<SwcId> {
        codes
            .into_iter()
            .filter(|c| self.allowed.contains(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fakes::{DownClient, ScriptedClient};

    fn allowed() -> BTreeSet<SwcId> {
        [101, 104, 107].into_iter().map(SwcId).collect()
    }

    fn inputs() -> RefinerInputs {
        RefinerInputs {
            contract: ContractRef::new("C1"),
            source: "contract C1 {}".into(),
            report: "SWC-107 reentrancy at line 9".into(),
            combined_hint: "no heuristic findings".into(),
            zkp_hint: None,
            key_features: None,
            structure: None,
        }
    }

    #[tokio::test]
    async fn cot_round_extracts_from_replay_response() {
        let client = ScriptedClient::new([
            "1. look at withdraw",          // inspiration
            "SWC-107 applies, SWC-104 too", // analysis
            "confirmed: SWC-107 only",      // replay
        ]);
        let set = allowed();
        let refiner = Refiner::new(&client, AnalyzerId::Mythril, &set, AnalysisStrategy::CoT);
        let got = refiner.run_round(&inputs()).await;
        assert_eq!(got, [SwcId(107)].into_iter().collect());
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn one_shot_round_is_a_single_call() {
        let client = ScriptedClient::constant("SWC-101 and SWC-104");
        let set = allowed();
        let refiner = Refiner::new(&client, AnalyzerId::Slither, &set, AnalysisStrategy::OneShot);
        let got = refiner.run_round(&inputs()).await;
        assert_eq!(got, [SwcId(101), SwcId(104)].into_iter().collect());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn out_of_set_codes_are_filtered() {
        let client = ScriptedClient::constant("SWC-107, SWC-999, SWC-136");
        let set = allowed();
        let refiner = Refiner::new(&client, AnalyzerId::Mythril, &set, AnalysisStrategy::OneShot);
        let got = refiner.run_round(&inputs()).await;
        assert_eq!(got, [SwcId(107)].into_iter().collect());
    }

    #[tokio::test]
    async fn empty_analysis_skips_replay() {
        let client = ScriptedClient::new(["heuristics", "no applicable codes"]);
        let set = allowed();
        let refiner = Refiner::new(&client, AnalyzerId::Oyente, &set, AnalysisStrategy::CoT);
        let got = refiner.run_round(&inputs()).await;
        assert!(got.is_empty());
        assert_eq!(client.calls(), 2, "replay must be skipped");
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_empty_set() {
        let set = allowed();
        let refiner = Refiner::new(&DownClient, AnalyzerId::Mythril, &set, AnalysisStrategy::CoT);
        assert!(refiner.run_round(&inputs()).await.is_empty());
    }
}
