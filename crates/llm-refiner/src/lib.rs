//! # LLM Refiner
//!
//! Turns one analyzer's noisy report into a converged set of weakness
//! codes via repeated LLM sampling: a retrying chat-completion client, the
//! two-phase (inspiration + analysis + symbolic-replay) prompt chain, a
//! context-budget policy with source compression, and the
//! intersection/majority convergence loop.

pub mod client;
pub mod context;
pub mod convergence;
pub mod prompts;
pub mod refiner;

pub use client::{ChatCompletion, HttpLlmClient, LlmConfig, LlmError};
pub use context::SourceProvider;
pub use convergence::{converge, ConvergenceConfig};
pub use refiner::{AnalysisStrategy, Refiner, RefinerInputs};
