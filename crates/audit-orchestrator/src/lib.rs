//! Dataset orchestration: walk a contract corpus and drive each contract
//! through heuristic scanning, per-analyzer LLM refinement, and weighted
//! fusion, persisting every stage so interrupted runs resume where they
//! stopped.
//!
//! One contract failing never aborts the run; the failure is logged and
//! counted, and the walk moves on.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use ensemble_fusion::{fuse, select_optimal, EnsembleStrategy};
use hint_engine::{aggregate::combine_hints, scan_all};
use llm_refiner::client::ChatCompletion;
use llm_refiner::context::SourceProvider;
use llm_refiner::convergence::{converge, ConvergenceConfig};
use llm_refiner::refiner::{AnalysisStrategy, Refiner, RefinerInputs};
use llm_refiner::prompts;
use result_store::{ResultStore, Stage};
use swc_taxonomy::{normalize, parse_report_text, render, ContractRef, DatasetConfig, DatasetPaths};

/// Everything one run needs, resolved by the CLI before work starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub paths: DatasetPaths,
    pub analysis_strategy: AnalysisStrategy,
    pub ensemble_strategy: EnsembleStrategy,
    /// Model identifier, embedded in per-analyzer artifact directories.
    pub model: String,
    /// Concurrent contracts. 1 keeps the run strictly sequential.
    pub jobs: usize,
    /// Generate the zkp auxiliary hint when its file is absent.
    pub zkp_model: bool,
    pub convergence: ConvergenceConfig,
    /// Character budget shared by source plus surrounding prompt.
    pub char_budget: usize,
}

/// What happened across the whole walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Contracts whose final verdict was produced this run.
    pub processed: usize,
    /// Contracts whose final verdict already existed.
    pub skipped: usize,
    /// Contracts that errored; their artifacts stay partial.
    pub failed: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} already complete, {} failed",
            self.processed, self.skipped, self.failed
        )
    }
}

enum ContractOutcome {
    Completed,
    AlreadyDone,
}

pub struct Orchestrator {
    config: PipelineConfig,
    store: ResultStore,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        let store = ResultStore::new(config.paths.results_root.clone());
        Self { config, store }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Walk the dataset directory and process every `.sol` file found.
    pub async fn run(&self, client: Arc<dyn ChatCompletion>) -> Result<RunSummary> {
        let contracts = enumerate_contracts(&self.config.paths.dataset_dir)?;
        info!(
            dataset = %self.config.dataset.id.as_str(),
            contracts = contracts.len(),
            jobs = self.config.jobs,
            "starting run"
        );

        let jobs = self.config.jobs.max(1);
        let outcomes: Vec<(ContractRef, Result<ContractOutcome>)> = stream::iter(contracts)
            .map(|(contract, path)| {
                let client = Arc::clone(&client);
                async move {
                    let outcome = self.process_contract(&*client, &contract, &path).await;
                    (contract, outcome)
                }
            })
            .buffer_unordered(jobs)
            .collect()
            .await;

        let mut summary = RunSummary::default();
        for (contract, outcome) in outcomes {
            match outcome {
                Ok(ContractOutcome::Completed) => summary.processed += 1,
                Ok(ContractOutcome::AlreadyDone) => summary.skipped += 1,
                Err(err) => {
                    error!(%contract, err = %format!("{err:#}"), "contract failed");
                    summary.failed += 1;
                }
            }
        }
        info!(%summary, "run finished");
        Ok(summary)
    }

    async fn process_contract(
        &self,
        client: &dyn ChatCompletion,
        contract: &ContractRef,
        source_path: &Path,
    ) -> Result<ContractOutcome> {
        let tag = self.config.ensemble_strategy.tag();
        let final_stage = Stage::EnsembleVerdict { tag: &tag };
        if self.store.exists(&final_stage, contract) {
            info!(%contract, "final verdict present; skipping");
            return Ok(ContractOutcome::AlreadyDone);
        }

        let source = fs::read_to_string(source_path)
            .with_context(|| format!("reading source {}", source_path.display()))?;

        // Heuristic stage. Scanning is cheap and deterministic, so records
        // are recomputed in memory even when their artifacts exist; store()
        // never rewrites a present file.
        let records = scan_all(&source, self.config.dataset.swc_set.iter().copied());
        for record in &records {
            self.store
                .store(&Stage::HintRecord { swc: record.swc }, contract, &record.render())?;
        }
        let combined = match self.store.load(&Stage::CombinedHint, contract)? {
            Some(existing) => existing,
            None => {
                let built = combine_hints(contract.as_str(), &records);
                self.store.store(&Stage::CombinedHint, contract, &built)?;
                built
            }
        };

        let zkp_hint = self.zkp_hint(client, contract, &source).await;
        let key_features = self.store.load_auxiliary(&Stage::KeyFeatureHint, contract);
        let structure = self.store.load_auxiliary(&Stage::StructureSummary, contract);

        // Raw analyzer reports. A missing report degrades to an empty text;
        // the LLM still sees the heuristic hints. The parsed code set is
        // persisted as its own stage and reloaded on resume.
        let mut reports: BTreeMap<_, String> = BTreeMap::new();
        for &analyzer in &self.config.dataset.analyzers {
            let raw = match self
                .store
                .load_auxiliary(&Stage::AnalyzerReport { analyzer }, contract)
            {
                Some(text) => text,
                None => {
                    warn!(%contract, %analyzer, "analyzer report missing; refining without it");
                    String::new()
                }
            };

            let norm_stage = Stage::NormalizedReport { analyzer };
            let report_codes = match self.store.load(&norm_stage, contract)? {
                Some(text) => parse_detection_line(&text),
                None => {
                    let parsed = parse_report_text(&raw);
                    self.store.store(&norm_stage, contract, &codes_line(&parsed))?;
                    parsed
                }
            };

            let presented = if raw.trim().is_empty() {
                String::new()
            } else {
                format!("{raw}\n\nCodes parsed from this report: {}", codes_line(&report_codes))
            };
            reports.insert(analyzer, presented);
        }

        let overhead = combined.len()
            + reports.values().map(|r| r.len()).max().unwrap_or(0)
            + zkp_hint.as_deref().map_or(0, str::len)
            + key_features.as_deref().map_or(0, str::len)
            + structure.as_deref().map_or(0, str::len)
            + 2_000;
        let compress_path = self
            .config
            .paths
            .compress_dir()
            .join(format!("{contract}.sol"));
        let provider = SourceProvider::new(
            contract.clone(),
            source.clone(),
            compress_path,
            self.config.char_budget,
        );
        let (effective_source, compressed) = provider.effective_source(overhead, client).await;
        if compressed {
            info!(%contract, "source over budget; using compressed form");
        }

        let strategy_tag = self.config.analysis_strategy.as_str();
        let mut verdicts: BTreeMap<_, BTreeSet<_>> = BTreeMap::new();
        for &analyzer in &self.config.dataset.analyzers {
            let stage = Stage::PerAnalyzerVerdict {
                analyzer,
                strategy: strategy_tag,
                model: &self.config.model,
            };
            if let Some(text) = self.store.load(&stage, contract)? {
                verdicts.insert(analyzer, parse_detection_line(&text));
                continue;
            }

            let inputs = RefinerInputs {
                contract: contract.clone(),
                source: effective_source.clone(),
                report: reports.get(&analyzer).cloned().unwrap_or_default(),
                combined_hint: combined.clone(),
                zkp_hint: zkp_hint.clone(),
                key_features: key_features.clone(),
                structure: structure.clone(),
            };
            let refiner = Refiner::new(
                client,
                analyzer,
                &self.config.dataset.swc_set,
                self.config.analysis_strategy,
            );
            let codes = converge(&refiner, &inputs, &self.config.convergence).await;
            self.store
                .store(&stage, contract, &verdict_body(contract, &codes))?;
            verdicts.insert(analyzer, codes);
        }

        let verdict = match self.config.ensemble_strategy {
            EnsembleStrategy::WeightedIntegration => {
                fuse(contract, &verdicts, &self.config.dataset.base_weights)
            }
            EnsembleStrategy::OptimalSelection(technique) => {
                select_optimal(contract, &verdicts, technique)
            }
        };
        self.store.store(&final_stage, contract, &verdict.render())?;
        info!(%contract, code = ?verdict.code, "fused verdict written");
        Ok(ContractOutcome::Completed)
    }

    /// Load the zkp auxiliary hint, generating and caching it when the run
    /// was asked to and the file is absent. Generation failures degrade to
    /// `None`; the hint is optional input.
    async fn zkp_hint(
        &self,
        client: &dyn ChatCompletion,
        contract: &ContractRef,
        source: &str,
    ) -> Option<String> {
        if let Some(existing) = self.store.load_auxiliary(&Stage::ZkpHint, contract) {
            return Some(existing);
        }
        if !self.config.zkp_model {
            return None;
        }
        match client.complete(&prompts::zkp_analysis(contract, source)).await {
            Ok(text) if !text.trim().is_empty() => {
                if let Err(err) = self.store.store(&Stage::ZkpHint, contract, &text) {
                    warn!(%contract, %err, "could not cache zkp hint");
                }
                Some(text)
            }
            Ok(_) => {
                warn!(%contract, "zkp hint generation returned empty text");
                None
            }
            Err(err) => {
                warn!(%contract, %err, "zkp hint generation failed; continuing without it");
                None
            }
        }
    }
}

/// Recover a code set from a stored artifact. Only the text after the
/// detection marker is scanned, so a contract stem that itself contains an
/// `swc<n>` token cannot leak into the reloaded set.
fn parse_detection_line(text: &str) -> BTreeSet<swc_taxonomy::SwcId> {
    match text.split_once("detected the following SWC codes:") {
        Some((_, tail)) => normalize(tail),
        None => normalize(text),
    }
}

fn codes_line(codes: &BTreeSet<swc_taxonomy::SwcId>) -> String {
    if codes.is_empty() {
        "none".to_string()
    } else {
        render(codes)
    }
}

/// The per-analyzer verdict artifact body. The detection line is the
/// machine-readable part; reloading a previous run's file recovers the
/// code set from it.
fn verdict_body(contract: &ContractRef, codes: &BTreeSet<swc_taxonomy::SwcId>) -> String {
    format!(
        "Contract {contract} detected the following SWC codes: {}\n",
        codes_line(codes)
    )
}

/// Every `.sol` file under the dataset directory, sorted by contract name
/// so runs visit contracts in a stable order.
fn enumerate_contracts(dataset_dir: &Path) -> Result<Vec<(ContractRef, PathBuf)>> {
    if !dataset_dir.is_dir() {
        anyhow::bail!("dataset directory not found: {}", dataset_dir.display());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(dataset_dir).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", dataset_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(contract) = ContractRef::from_source_path(entry.path()) {
            found.push((contract, entry.into_path()));
        }
    }
    found.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_taxonomy::SwcId;

    #[test]
    fn verdict_body_lists_codes_ascending() {
        let codes: BTreeSet<SwcId> = [SwcId(107), SwcId(101)].into_iter().collect();
        let body = verdict_body(&ContractRef::new("token"), &codes);
        assert_eq!(
            body,
            "Contract token detected the following SWC codes: SWC-101, SWC-107\n"
        );
    }

    #[test]
    fn verdict_body_round_trips_through_the_reload_parser() {
        let empty = verdict_body(&ContractRef::new("token"), &BTreeSet::new());
        assert!(empty.contains("none"));
        assert!(parse_detection_line(&empty).is_empty());

        let codes: BTreeSet<SwcId> = [SwcId(110)].into_iter().collect();
        let body = verdict_body(&ContractRef::new("token"), &codes);
        assert_eq!(parse_detection_line(&body), codes);
    }

    #[test]
    fn reload_ignores_codes_embedded_in_the_contract_name() {
        let name = ContractRef::new("buggy-swc101");
        let empty = verdict_body(&name, &BTreeSet::new());
        assert!(parse_detection_line(&empty).is_empty(), "{empty}");

        let codes: BTreeSet<SwcId> = [SwcId(107)].into_iter().collect();
        let body = verdict_body(&name, &codes);
        assert_eq!(parse_detection_line(&body), codes);
    }

    #[test]
    fn enumerate_rejects_missing_directory() {
        assert!(enumerate_contracts(Path::new("/nonexistent/corpus")).is_err());
    }
}
