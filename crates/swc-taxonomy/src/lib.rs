//! # SWC Taxonomy
//!
//! The shared vocabulary of the ensemble pipeline: canonical `SWC-<n>`
//! weakness codes, the analyzer identifiers whose reports we consume, the
//! free-text normalizer that recovers codes from noisy analyzer and LLM
//! output, and the per-dataset configuration (closed code set, analyzer
//! set, base fusion weights).

pub mod analyzer;
pub mod contract;
pub mod dataset;
pub mod normalize;
pub mod swc;

pub use analyzer::AnalyzerId;
pub use contract::ContractRef;
pub use dataset::{DatasetConfig, DatasetId, DatasetPaths};
pub use normalize::{normalize, parse_report_file, parse_report_text, render};
pub use swc::SwcId;

/// Configuration-level failures: bad weight files, unknown analyzer names.
/// Per-contract failures never use this type; they are logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed weights file {path}: {reason}")]
    MalformedWeights { path: String, reason: String },
    #[error("unknown analyzer name: {0}")]
    UnknownAnalyzer(String),
}
