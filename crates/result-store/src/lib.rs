//! # Result Store
//!
//! Artifact persistence for the pipeline, addressed by `(contract, stage)`.
//! Writes are atomic (temp sibling then rename) and every stage obeys
//! skip-if-present: an artifact that already exists is never recomputed or
//! rewritten, which is what makes interrupted runs resumable and repeated
//! runs byte-identical.
//!
//! All artifacts are human-readable text. Directory layout follows the
//! upstream benchmark conventions, so externally produced inputs (analyzer
//! reports, zkp analyses, key-feature extracts, solc structure summaries)
//! are found where their generators put them.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use swc_taxonomy::{AnalyzerId, ContractRef, SwcId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A pipeline stage, carrying whatever tags its directory name needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage<'a> {
    /// Input: raw analyzer report (written by the external tool wrapper).
    AnalyzerReport { analyzer: AnalyzerId },
    /// The code set parsed out of one analyzer's report.
    NormalizedReport { analyzer: AnalyzerId },
    /// Per-weakness heuristic findings.
    HintRecord { swc: SwcId },
    /// Combined hint document for one contract.
    CombinedHint,
    /// Converged per-analyzer verdict, tagged by strategy and model.
    PerAnalyzerVerdict {
        analyzer: AnalyzerId,
        strategy: &'a str,
        model: &'a str,
    },
    /// Final fused verdict, tagged by the ensemble configuration.
    EnsembleVerdict { tag: &'a str },
    /// LLM-generated zkp auxiliary analysis.
    ZkpHint,
    /// Input: key-feature extract (external collaborator).
    KeyFeatureHint,
    /// Input: contract-structure summary from solc processing (external).
    StructureSummary,
}

impl Stage<'_> {
    fn relative_path(&self, contract: &ContractRef) -> PathBuf {
        match self {
            Stage::AnalyzerReport { analyzer } => {
                PathBuf::from(format!("{analyzer}_tool_analysis_filter"))
                    .join(format!("{contract}.sol.txt"))
            }
            Stage::NormalizedReport { analyzer } => {
                PathBuf::from(format!("{analyzer}_report_codes"))
                    .join(format!("{contract}.sol.txt"))
            }
            Stage::HintRecord { swc } => PathBuf::from("heuristic_hints")
                .join(swc.to_string())
                .join(format!("{contract}.sol.txt")),
            Stage::CombinedHint => PathBuf::from("heuristic_hints")
                .join("combine")
                .join(format!("{contract}.sol.txt")),
            Stage::PerAnalyzerVerdict {
                analyzer,
                strategy,
                model,
            } => PathBuf::from(format!(
                "{analyzer}_{strategy}_{}",
                sanitize_component(model)
            ))
            .join(format!("{contract}_analysis.txt")),
            Stage::EnsembleVerdict { tag } => {
                PathBuf::from(sanitize_component(tag)).join(format!("{contract}_result.txt"))
            }
            Stage::ZkpHint => {
                PathBuf::from("ZKP_LLAMA_filter").join(format!("{contract}.sol_analysis.txt"))
            }
            Stage::KeyFeatureHint => PathBuf::from("key_feature_extract")
                .join("combine")
                .join(format!("{contract}.sol.txt")),
            Stage::StructureSummary => {
                PathBuf::from("solc-process").join(format!("{contract}.txt"))
            }
        }
    }
}

/// Model names like `moonshotai/kimi-k2.5` must not introduce path
/// separators into directory names.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect()
}

pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, stage: &Stage<'_>, contract: &ContractRef) -> PathBuf {
        self.root.join(stage.relative_path(contract))
    }

    pub fn exists(&self, stage: &Stage<'_>, contract: &ContractRef) -> bool {
        self.path(stage, contract).is_file()
    }

    /// Load an artifact if present. Unreadable-but-present files surface an
    /// error; absence is `None`.
    pub fn load(
        &self,
        stage: &Stage<'_>,
        contract: &ContractRef,
    ) -> Result<Option<String>, StoreError> {
        let path = self.path(stage, contract);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| StoreError::Io { path, source })
    }

    /// Load an optional external input, degrading absence (or unreadable
    /// content) to `None` with a warning. Used for the auxiliary hint files
    /// whose generators are outside this pipeline.
    pub fn load_auxiliary(&self, stage: &Stage<'_>, contract: &ContractRef) -> Option<String> {
        match self.load(stage, contract) {
            Ok(found) => found,
            Err(err) => {
                warn!(%contract, %err, "auxiliary input unreadable; continuing without it");
                None
            }
        }
    }

    /// Write an artifact unless it already exists. Returns whether a write
    /// happened. Skip-if-present keeps re-runs byte-identical.
    pub fn store(
        &self,
        stage: &Stage<'_>,
        contract: &ContractRef,
        content: &str,
    ) -> Result<bool, StoreError> {
        let path = self.path(stage, contract);
        if path.is_file() {
            debug!(path = %path.display(), "artifact present; skipping");
            return Ok(false);
        }
        write_atomic(&path, content)?;
        Ok(true)
    }
}

/// Atomic text write: temp sibling in the same directory, then rename.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let io = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(io)?;

    let tmp = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".into()),
        std::process::id()
    ));
    fs::write(&tmp, content).map_err(io)?;
    fs::rename(&tmp, path).map_err(io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_taxonomy::AnalyzerId;

    fn store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn stage_paths_follow_layout() {
        let (_dir, store) = store();
        let c = ContractRef::new("C1");

        let report = store.path(
            &Stage::AnalyzerReport {
                analyzer: AnalyzerId::Mythril,
            },
            &c,
        );
        assert!(report.ends_with("mythril_tool_analysis_filter/C1.sol.txt"));

        let normalized = store.path(
            &Stage::NormalizedReport {
                analyzer: AnalyzerId::Mythril,
            },
            &c,
        );
        assert!(normalized.ends_with("mythril_report_codes/C1.sol.txt"));

        let verdict = store.path(
            &Stage::PerAnalyzerVerdict {
                analyzer: AnalyzerId::Slither,
                strategy: "CoT",
                model: "vendor/model-1",
            },
            &c,
        );
        assert!(
            verdict.ends_with("slither_CoT_vendor_model-1/C1_analysis.txt"),
            "{verdict:?}"
        );

        let ensemble = store.path(&Stage::EnsembleVerdict { tag: "ensemble" }, &c);
        assert!(ensemble.ends_with("ensemble/C1_result.txt"));

        let zkp = store.path(&Stage::ZkpHint, &c);
        assert!(zkp.ends_with("ZKP_LLAMA_filter/C1.sol_analysis.txt"));
    }

    #[test]
    fn store_then_load_round_trips() {
        let (_dir, store) = store();
        let c = ContractRef::new("Token");
        let stage = Stage::CombinedHint;

        assert!(!store.exists(&stage, &c));
        assert!(store.store(&stage, &c, "hints\n").unwrap());
        assert!(store.exists(&stage, &c));
        assert_eq!(store.load(&stage, &c).unwrap().as_deref(), Some("hints\n"));
    }

    #[test]
    fn skip_if_present_never_rewrites() {
        let (_dir, store) = store();
        let c = ContractRef::new("Token");
        let stage = Stage::HintRecord { swc: SwcId(107) };

        assert!(store.store(&stage, &c, "first\n").unwrap());
        assert!(!store.store(&stage, &c, "second\n").unwrap());
        assert_eq!(store.load(&stage, &c).unwrap().as_deref(), Some("first\n"));
    }

    #[test]
    fn missing_artifact_loads_as_none() {
        let (_dir, store) = store();
        let c = ContractRef::new("Ghost");
        assert_eq!(store.load(&Stage::CombinedHint, &c).unwrap(), None);
        assert_eq!(store.load_auxiliary(&Stage::ZkpHint, &c), None);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        write_atomic(&path, "data").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "data");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
