//! `solfuse` — drive the ensemble vulnerability pipeline over a dataset.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use tracing::info;

use audit_orchestrator::{Orchestrator, PipelineConfig};
use ensemble_fusion::EnsembleStrategy;
use llm_refiner::client::{HttpLlmClient, LlmConfig};
use llm_refiner::convergence::ConvergenceConfig;
use llm_refiner::refiner::AnalysisStrategy;
use swc_taxonomy::{AnalyzerId, DatasetConfig, DatasetId, DatasetPaths};

#[derive(Parser)]
#[command(
    name = "solfuse",
    version,
    about = "Ensemble fusion of static-analyzer reports and LLM judgment for Solidity contracts",
    long_about = "solfuse walks a dataset of Solidity contracts, refines each static \
        analyzer's report through multi-round LLM convergence, and fuses the \
        per-analyzer verdicts into one weighted SWC classification per contract.\n\n\
        Every stage persists to the results root; interrupted runs resume \
        where they stopped."
)]
struct Cli {
    /// Dataset preset: zkp_contracts, curated, or injected
    #[arg(long)]
    dataset: String,

    /// Directory holding the .sol contract sources
    #[arg(long)]
    dataset_dir: PathBuf,

    /// Root directory for analyzer reports and pipeline artifacts
    #[arg(long)]
    results_root: PathBuf,

    /// Refinement prompt chain: CoT or one_shot
    #[arg(long = "analysis-strategy", default_value = "CoT")]
    analysis_strategy: String,

    /// Final fusion: Weighted_Integration or Optimal_Selection
    #[arg(long = "ensemble-strategy", default_value = "Weighted_Integration")]
    ensemble_strategy: String,

    /// Analyzer to trust under Optimal_Selection (e.g. mythril)
    #[arg(long)]
    technique: Option<String>,

    /// Model identifier sent to the chat-completions endpoint
    #[arg(long = "LLM", default_value = "moonshotai/kimi-k2.5")]
    llm: String,

    /// Generate the zkp auxiliary hint for contracts that lack one
    #[arg(long = "ZKP-model")]
    zkp_model: bool,

    /// TOML file overriding per-analyzer base weights
    #[arg(long)]
    weights_file: Option<PathBuf>,

    /// Concurrent contracts
    #[arg(long, default_value = "1")]
    jobs: usize,

    /// API key for the LLM endpoint
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Debug-level logging (RUST_LOG still takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn parse_dataset(name: &str) -> Option<DatasetId> {
    [
        DatasetId::ZkpContracts,
        DatasetId::Curated,
        DatasetId::Injected,
    ]
    .into_iter()
    .find(|id| id.as_str() == name)
}

/// Config-level mistakes exit with code 2; the run itself exits 1 only on
/// failures that stop the whole walk.
fn resolve(cli: &Cli) -> Result<(PipelineConfig, LlmConfig, String), String> {
    let id = parse_dataset(&cli.dataset)
        .ok_or_else(|| format!("unknown dataset '{}' (expected zkp_contracts, curated, or injected)", cli.dataset))?;
    let mut dataset = DatasetConfig::preset(id);
    if let Some(path) = &cli.weights_file {
        dataset
            .apply_weights_file(path)
            .map_err(|e| e.to_string())?;
    }

    let analysis_strategy = match cli.analysis_strategy.as_str() {
        "CoT" => AnalysisStrategy::CoT,
        "one_shot" => AnalysisStrategy::OneShot,
        other => return Err(format!("unknown analysis strategy '{other}' (expected CoT or one_shot)")),
    };

    let ensemble_strategy = match cli.ensemble_strategy.as_str() {
        "Weighted_Integration" => {
            if cli.technique.is_some() {
                return Err("--technique only applies to Optimal_Selection".to_string());
            }
            EnsembleStrategy::WeightedIntegration
        }
        "Optimal_Selection" => {
            let name = cli
                .technique
                .as_deref()
                .ok_or_else(|| "Optimal_Selection requires --technique <analyzer>".to_string())?;
            let analyzer: AnalyzerId = name.parse().map_err(|e| format!("{e}"))?;
            if !dataset.analyzers.contains(&analyzer) {
                return Err(format!(
                    "analyzer '{analyzer}' is not part of dataset '{}'",
                    dataset.id.as_str()
                ));
            }
            EnsembleStrategy::OptimalSelection(analyzer)
        }
        other => {
            return Err(format!(
                "unknown ensemble strategy '{other}' (expected Weighted_Integration or Optimal_Selection)"
            ))
        }
    };

    let api_key = match &cli.api_key {
        Some(key) if !key.is_empty() => key.clone(),
        _ => {
            return Err(
                "no API key: use --api-key <KEY> or set OPENROUTER_API_KEY".to_string(),
            )
        }
    };

    let llm = LlmConfig {
        model: cli.llm.clone(),
        ..LlmConfig::default()
    };
    let config = PipelineConfig {
        dataset,
        paths: DatasetPaths {
            dataset_dir: cli.dataset_dir.clone(),
            results_root: cli.results_root.clone(),
        },
        analysis_strategy,
        ensemble_strategy,
        model: llm.model.clone(),
        jobs: cli.jobs,
        zkp_model: cli.zkp_model,
        convergence: ConvergenceConfig::default(),
        char_budget: llm.char_budget,
    };
    Ok((config, llm, api_key))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let (config, llm, api_key) = match resolve(&cli) {
        Ok(resolved) => resolved,
        Err(msg) => {
            eprintln!("  {} {}", "✗".red(), msg);
            return ExitCode::from(2);
        }
    };

    let client = match HttpLlmClient::new(api_key, llm) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("  {} LLM client init failed: {err}", "✗".red());
            return ExitCode::from(2);
        }
    };

    info!(
        dataset = %config.dataset.id.as_str(),
        model = %config.model,
        strategy = config.analysis_strategy.as_str(),
        ensemble = %config.ensemble_strategy.tag(),
        "configuration resolved"
    );

    let summary = match Orchestrator::new(config).run(client).await {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("  {} run aborted: {err:#}", "✗".red());
            return ExitCode::FAILURE;
        }
    };

    println!(
        "\n  {} {} contracts processed, {} already complete",
        "✓".green().bold(),
        summary.processed,
        summary.skipped
    );
    if summary.failed > 0 {
        println!(
            "  {} {} contracts failed; re-run to retry them",
            "⚠".yellow(),
            summary.failed
        );
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn base_args() -> Vec<&'static str> {
        vec![
            "solfuse",
            "--dataset",
            "curated",
            "--dataset-dir",
            "/data/contracts",
            "--results-root",
            "/data/results",
            "--api-key",
            "k",
        ]
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_resolve_to_weighted_cot() {
        let cli = Cli::parse_from(base_args());
        let (config, llm, _) = resolve(&cli).expect("resolves");
        assert_eq!(config.analysis_strategy, AnalysisStrategy::CoT);
        assert_eq!(
            config.ensemble_strategy,
            EnsembleStrategy::WeightedIntegration
        );
        assert_eq!(config.model, "moonshotai/kimi-k2.5");
        assert_eq!(llm.model, config.model);
        assert_eq!(config.char_budget, llm.char_budget);
        assert_eq!(config.dataset.id, DatasetId::Curated);
    }

    #[test]
    fn optimal_selection_requires_technique() {
        let mut args = base_args();
        args.extend(["--ensemble-strategy", "Optimal_Selection"]);
        let cli = Cli::parse_from(args);
        let err = resolve(&cli).expect_err("missing technique");
        assert!(err.contains("--technique"));
    }

    #[test]
    fn technique_must_belong_to_the_dataset() {
        let mut args = base_args();
        // manticore is not part of the zkp_contracts preset
        args[2] = "zkp_contracts";
        args.extend([
            "--ensemble-strategy",
            "Optimal_Selection",
            "--technique",
            "manticore",
        ]);
        let cli = Cli::parse_from(args);
        let err = resolve(&cli).expect_err("analyzer outside dataset");
        assert!(err.contains("not part of dataset"));
    }

    #[test]
    fn unknown_dataset_is_rejected() {
        let mut args = base_args();
        args[2] = "mystery";
        let cli = Cli::parse_from(args);
        assert!(resolve(&cli).is_err());
    }
}
