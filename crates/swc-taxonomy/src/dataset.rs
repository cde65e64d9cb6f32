//! Per-dataset configuration: the closed weakness-code set, the analyzer
//! set, and the base fusion weights.
//!
//! Base weights are *empirical values carried over from the upstream
//! benchmark authors*, not derived quantities; they are deliberately plain
//! configuration so a weights file can override them per run. Only their
//! ratios matter — fusion renormalizes over the analyzers that actually
//! produced evidence.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::{AnalyzerId, ConfigError, SwcId};

/// The three benchmark datasets the pipeline ships presets for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetId {
    /// Dataset A: zkp-related contracts.
    ZkpContracts,
    /// Dataset B: the curated benchmark (SWC 100..109).
    Curated,
    /// Dataset C: contracts with injected vulnerabilities.
    Injected,
}

impl DatasetId {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetId::ZkpContracts => "zkp_contracts",
            DatasetId::Curated => "curated",
            DatasetId::Injected => "injected",
        }
    }
}

/// Filesystem roots for one run. A single typed value, threaded through the
/// orchestrator, so path construction cannot drift between stages.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    /// Directory holding the `.sol` contract sources.
    pub dataset_dir: PathBuf,
    /// Root under which analyzer reports live and artifacts are written.
    pub results_root: PathBuf,
}

impl DatasetPaths {
    /// Sibling directory holding pre-compressed contract sources, consulted
    /// when a contract exceeds the LLM context budget.
    pub fn compress_dir(&self) -> PathBuf {
        let name = self
            .dataset_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        self.dataset_dir
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!("{name}_compress"))
    }
}

/// The resolved configuration for one dataset run.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub id: DatasetId,
    pub swc_set: BTreeSet<SwcId>,
    pub analyzers: Vec<AnalyzerId>,
    pub base_weights: BTreeMap<AnalyzerId, f64>,
}

impl DatasetConfig {
    pub fn preset(id: DatasetId) -> Self {
        let (codes, analyzers): (&[u32], &[AnalyzerId]) = match id {
            DatasetId::ZkpContracts => (
                &[101, 105, 107, 110, 121, 124, 128],
                &[AnalyzerId::Mythril, AnalyzerId::Slither, AnalyzerId::Smartcheck],
            ),
            DatasetId::Curated => (
                &[100, 101, 102, 103, 104, 105, 106, 107, 108, 109],
                &[
                    AnalyzerId::Honeybadger,
                    AnalyzerId::Manticore,
                    AnalyzerId::Mythril,
                    AnalyzerId::Osiris,
                    AnalyzerId::Oyente,
                    AnalyzerId::Slither,
                    AnalyzerId::Smartcheck,
                ],
            ),
            DatasetId::Injected => (
                &[101, 104, 105, 107, 115, 116, 136],
                &[
                    AnalyzerId::Manticore,
                    AnalyzerId::Mythril,
                    AnalyzerId::Securify,
                    AnalyzerId::Oyente,
                    AnalyzerId::Slither,
                    AnalyzerId::Smartcheck,
                ],
            ),
        };

        let base_weights = analyzers
            .iter()
            .map(|&a| (a, default_weight(a)))
            .collect();

        Self {
            id,
            swc_set: codes.iter().copied().map(SwcId).collect(),
            analyzers: analyzers.to_vec(),
            base_weights,
        }
    }

    /// Overlay weights from a TOML file of the shape
    /// `mythril = 0.1` / `manticore = 0.25` / ...
    pub fn apply_weights_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let parsed: WeightsFile =
            toml::from_str(&text).map_err(|e| ConfigError::MalformedWeights {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        for (name, weight) in parsed.0 {
            let analyzer: AnalyzerId = name.parse()?;
            if weight < 0.0 {
                return Err(ConfigError::MalformedWeights {
                    path: path.display().to_string(),
                    reason: format!("negative weight {weight} for {analyzer}"),
                });
            }
            self.base_weights.insert(analyzer, weight);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct WeightsFile(BTreeMap<String, f64>);

/// Upstream empirical base weights (dataset-B calibration, reused as the
/// default for all presets; only ratios survive renormalization).
fn default_weight(analyzer: AnalyzerId) -> f64 {
    match analyzer {
        AnalyzerId::Manticore => 0.25,
        AnalyzerId::Honeybadger => 0.20,
        AnalyzerId::Mythril
        | AnalyzerId::Slither
        | AnalyzerId::Smartcheck
        | AnalyzerId::Securify
        | AnalyzerId::Oyente
        | AnalyzerId::Osiris => 0.10,
    }
}
