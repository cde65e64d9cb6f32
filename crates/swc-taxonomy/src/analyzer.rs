//! External static-analyzer identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// A third-party analyzer whose text report feeds the ensemble. The
/// lowercase token doubles as the report-directory prefix on disk
/// (`<results_root>/<analyzer>_tool_analysis_filter/`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerId {
    Mythril,
    Slither,
    Smartcheck,
    Manticore,
    Oyente,
    Securify,
    Osiris,
    Honeybadger,
}

impl AnalyzerId {
    pub const ALL: [AnalyzerId; 8] = [
        AnalyzerId::Mythril,
        AnalyzerId::Slither,
        AnalyzerId::Smartcheck,
        AnalyzerId::Manticore,
        AnalyzerId::Oyente,
        AnalyzerId::Securify,
        AnalyzerId::Osiris,
        AnalyzerId::Honeybadger,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalyzerId::Mythril => "mythril",
            AnalyzerId::Slither => "slither",
            AnalyzerId::Smartcheck => "smartcheck",
            AnalyzerId::Manticore => "manticore",
            AnalyzerId::Oyente => "oyente",
            AnalyzerId::Securify => "securify",
            AnalyzerId::Osiris => "osiris",
            AnalyzerId::Honeybadger => "honeybadger",
        }
    }

    /// One-line description of what the tool is good at. Injected into the
    /// per-analyzer prompt so the LLM weighs the report appropriately.
    pub fn strengths(self) -> &'static str {
        match self {
            AnalyzerId::Mythril => {
                "symbolic execution over EVM bytecode; strong on reentrancy, \
                 unchecked calls and integer overflow"
            }
            AnalyzerId::Slither => {
                "static analysis over the Solidity AST; strong on visibility, \
                 shadowing and dataflow issues, verbose on informational findings"
            }
            AnalyzerId::Smartcheck => {
                "lexical/XPath pattern matching; broad but shallow, prone to \
                 false positives on style-level findings"
            }
            AnalyzerId::Manticore => {
                "dynamic symbolic execution; precise path feasibility, weaker \
                 coverage on large contracts"
            }
            AnalyzerId::Oyente => {
                "early symbolic checker; timestamp dependence, reentrancy and \
                 transaction-ordering findings"
            }
            AnalyzerId::Securify => {
                "compliance/violation patterns over dataflow facts; explicit \
                 about unproven properties"
            }
            AnalyzerId::Osiris => {
                "Oyente derivative focused on integer bugs (overflow, \
                 truncation, signedness)"
            }
            AnalyzerId::Honeybadger => {
                "honeypot and trap detection; findings often indicate \
                 deliberately planted vulnerabilities"
            }
        }
    }
}

impl fmt::Display for AnalyzerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyzerId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalyzerId::ALL
            .into_iter()
            .find(|a| a.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnknownAnalyzer(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for analyzer in AnalyzerId::ALL {
            assert_eq!(analyzer.as_str().parse::<AnalyzerId>().unwrap(), analyzer);
        }
    }

    #[test]
    fn rejects_unknown_names() {
        assert!("echidna".parse::<AnalyzerId>().is_err());
    }
}
