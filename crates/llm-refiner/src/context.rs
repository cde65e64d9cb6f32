//! Context-budget handling for contract sources.
//!
//! When the assembled prompt would exceed the character budget, the raw
//! source is replaced by a compressed representation: a pre-computed file
//! from the sibling compress store when one exists, otherwise a one-shot
//! LLM compression which is cached back to that store so later rounds and
//! runs skip the extra call.

use std::path::PathBuf;
use tracing::{debug, warn};

use crate::client::ChatCompletion;
use crate::prompts;
use swc_taxonomy::ContractRef;

pub struct SourceProvider {
    contract: ContractRef,
    raw: String,
    compress_path: PathBuf,
    char_budget: usize,
}

impl SourceProvider {
    pub fn new(
        contract: ContractRef,
        raw: String,
        compress_path: PathBuf,
        char_budget: usize,
    ) -> Self {
        Self {
            contract,
            raw,
            compress_path,
            char_budget,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The source to embed given `overhead` characters of surrounding
    /// prompt. Returns the text and whether compression was substituted.
    pub async fn effective_source(
        &self,
        overhead: usize,
        client: &dyn ChatCompletion,
    ) -> (String, bool) {
        if self.raw.len() + overhead <= self.char_budget {
            return (self.raw.clone(), false);
        }

        if let Ok(precomputed) = std::fs::read_to_string(&self.compress_path) {
            debug!(contract = %self.contract, "using precomputed compressed source");
            return (precomputed, true);
        }

        let prompt = prompts::compression(&self.contract, &self.raw);
        match client.complete(&prompt).await {
            Ok(compressed) if !compressed.trim().is_empty() => {
                if let Err(err) = result_store::write_atomic(&self.compress_path, &compressed) {
                    warn!(contract = %self.contract, %err, "could not cache compressed source");
                }
                (compressed, true)
            }
            Ok(_) | Err(_) => {
                warn!(
                    contract = %self.contract,
                    "compression unavailable; truncating source to fit budget"
                );
                let keep = self.char_budget.saturating_sub(overhead).max(512);
                let mut truncated = self.raw.clone();
                truncated.truncate(floor_char_boundary(&truncated, keep));
                (truncated, true)
            }
        }
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fakes::{DownClient, ScriptedClient};

    fn provider(raw: &str, budget: usize, dir: &tempfile::TempDir) -> SourceProvider {
        SourceProvider::new(
            ContractRef::new("Big"),
            raw.to_string(),
            dir.path().join("Big.sol"),
            budget,
        )
    }

    #[tokio::test]
    async fn small_source_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider("contract Big {}", 13_000, &dir);
        let (text, compressed) = p.effective_source(100, &DownClient).await;
        assert_eq!(text, "contract Big {}");
        assert!(!compressed);
    }

    #[tokio::test]
    async fn oversized_source_uses_precomputed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Big.sol"), "compressed form").unwrap();
        let p = provider(&"x".repeat(200), 100, &dir);
        let (text, compressed) = p.effective_source(10, &DownClient).await;
        assert_eq!(text, "compressed form");
        assert!(compressed);
    }

    #[tokio::test]
    async fn oversized_source_falls_back_to_llm_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::constant("contract Big { key bits }");
        let p = provider(&"y".repeat(200), 100, &dir);

        let (text, compressed) = p.effective_source(10, &client).await;
        assert!(compressed);
        assert_eq!(text, "contract Big { key bits }");
        assert_eq!(client.calls(), 1);

        // cached: a second request reads the file, no extra LLM call
        let (text2, _) = p.effective_source(10, &client).await;
        assert_eq!(text2, "contract Big { key bits }");
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn compression_failure_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&"z".repeat(2000), 1000, &dir);
        let (text, compressed) = p.effective_source(100, &DownClient).await;
        assert!(compressed);
        assert!(text.len() <= 900);
    }
}
