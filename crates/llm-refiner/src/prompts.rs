//! Prompt construction for the refinement chain.
//!
//! Prompts reference SWC semantics and the specific analyzer's strengths so
//! the LLM weighs the report as a noisy witness, not ground truth. Every
//! prompt that expects codes back names the closed candidate set; anything
//! outside it is filtered after extraction anyway.

use std::collections::BTreeSet;

use swc_taxonomy::{AnalyzerId, ContractRef, SwcId};

fn describe_codes(allowed: &BTreeSet<SwcId>) -> String {
    allowed
        .iter()
        .map(|c| match c.title() {
            Some(title) => format!("- {c}: {title}"),
            None => format!("- {c}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn optional_section(label: &str, content: Option<&str>) -> String {
    match content {
        Some(text) if !text.trim().is_empty() => {
            format!("\n## {label}\n{text}\n")
        }
        _ => String::new(),
    }
}

/// Phase 1: file-specific heuristics about where vulnerabilities likely
/// live. Free-text output, fed into the analysis phase.
#[allow(clippy::too_many_arguments)]
pub fn inspiration(
    contract: &ContractRef,
    source: &str,
    combined_hint: &str,
    zkp_hint: Option<&str>,
    key_features: Option<&str>,
    structure: Option<&str>,
) -> String {
    format!(
        r#"You are an experienced Solidity auditor. Before any verdict, produce short,
file-specific heuristics for the contract below: which functions are high-risk
and why, which state variables guard value, and which call patterns deserve a
close look. Reference function names from this file only.

## Contract {contract}
```solidity
{source}
```

## Heuristic scanner findings (auxiliary hints, not verdicts)
{combined_hint}
{zkp}{features}{structure}
Respond with 3-6 numbered heuristics, one line each."#,
        zkp = optional_section("ZKP-oriented analysis", zkp_hint),
        features = optional_section("Key features", key_features),
        structure = optional_section("Contract structure summary", structure),
    )
}

/// Phase 2: enumerate applicable codes from the closed set, citing lines.
pub fn analysis(
    contract: &ContractRef,
    source: &str,
    analyzer: AnalyzerId,
    report: &str,
    inspiration: &str,
    allowed: &BTreeSet<SwcId>,
) -> String {
    format!(
        r#"You are a Solidity security expert. Decide which SWC weakness codes apply to
the contract below, using the static-analyzer report as a noisy witness.

The report comes from {analyzer} ({strengths}). Treat its findings as
candidates to confirm or reject against the source, not as ground truth.

## Candidate codes (closed set — answer only from this list)
{codes}

## Contract {contract}
```solidity
{source}
```

## {analyzer} report
{report}

## Auditor heuristics from a prior pass
{inspiration}

For each code that applies, state it as SWC-<n> and cite the line numbers
that support it. If none apply, say "no applicable codes"."#,
        strengths = analyzer.strengths(),
        codes = describe_codes(allowed),
    )
}

/// Phase 3: eliminate false positives by simulating execution paths over
/// the phase-2 candidates.
pub fn symbolic_replay(
    contract: &ContractRef,
    source: &str,
    candidates: &BTreeSet<SwcId>,
    analysis_response: &str,
) -> String {
    let listed = candidates
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"Act as a symbolic executor for contract {contract}. The candidate weakness
codes from the previous pass are: {listed}.

For each candidate, simulate concrete execution paths with adversarial inputs
(zero values, max values, reentrant callers, non-owner senders) and decide
whether the weakness is actually reachable. Eliminate candidates that require
an impossible state.

## Contract
```solidity
{source}
```

## Previous analysis
{analysis_response}

Respond with the final list of confirmed codes as SWC-<n> tokens, or
"no applicable codes" if every candidate was eliminated."#,
    )
}

/// Single-prompt variant used by the one_shot strategy.
pub fn one_shot(
    contract: &ContractRef,
    source: &str,
    analyzer: AnalyzerId,
    report: &str,
    combined_hint: &str,
    allowed: &BTreeSet<SwcId>,
) -> String {
    format!(
        r#"You are a Solidity security expert. Based on the {analyzer} report and the
heuristic hints, list every SWC weakness code from the closed set below that
applies to this contract. Cite supporting line numbers.

## Candidate codes (closed set)
{codes}

## Contract {contract}
```solidity
{source}
```

## {analyzer} report
{report}

## Heuristic scanner findings (auxiliary hints, not verdicts)
{combined_hint}

Answer with SWC-<n> tokens only, or "no applicable codes"."#,
        codes = describe_codes(allowed),
    )
}

/// One-shot source compression for contracts over the context budget.
pub fn compression(contract: &ContractRef, source: &str) -> String {
    format!(
        r#"Compress the Solidity contract {contract} below into the shortest faithful
representation that preserves: all function signatures with visibility and
modifiers, all state variable declarations, every external call, every state
write, and the control flow around them. Drop comments, events, and getter
boilerplate. Output Solidity-like pseudocode only, no commentary.

```solidity
{source}
```"#,
    )
}

/// Auxiliary zkp-oriented analysis, generated when `--ZKP-model` is set and
/// no externally produced file exists.
pub fn zkp_analysis(contract: &ContractRef, source: &str) -> String {
    format!(
        r#"Analyze the contract {contract} below from a zero-knowledge-proof
application perspective: verifier assumptions, trusted setup artifacts,
nullifier/commitment bookkeeping, and any place where proof verification is
skipped, reordered, or replayable. Be concise and file-specific.

```solidity
{source}
```"#,
    )
}
