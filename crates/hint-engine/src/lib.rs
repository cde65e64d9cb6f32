//! # Heuristic Hint Engine
//!
//! A single table-driven scanner over Solidity source. For each weakness
//! code it emits zero or more [`HintFinding`]s: a risk tier, a description,
//! an original-coordinate line number, and a snippet. Findings are
//! auxiliary context for the LLM refinement stage, never verdicts.

pub mod aggregate;
pub mod rules;
pub mod source;

use serde::{Deserialize, Serialize};
use std::fmt;

use swc_taxonomy::SwcId;

pub use aggregate::combine_hints;
pub use rules::SourceModel;

/// How much a finding should be trusted, combining pattern narrowness,
/// absent safety context, and external reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
            RiskTier::Critical => "Critical",
        };
        f.write_str(label)
    }
}

/// One heuristic finding inside a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintFinding {
    pub swc: SwcId,
    pub tier: RiskTier,
    pub description: String,
    /// 1-based line in the original source.
    pub line: usize,
    pub snippet: String,
}

/// All findings for one `(contract, weakness)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintRecord {
    pub swc: SwcId,
    pub findings: Vec<HintFinding>,
}

impl HintRecord {
    /// Text form persisted as the per-weakness hint artifact.
    pub fn render(&self) -> String {
        let title = self.swc.title().unwrap_or("(unregistered weakness)");
        let mut out = format!("[{}] {}\n", self.swc, title);
        if self.findings.is_empty() {
            out.push_str("  no heuristic findings\n");
            return out;
        }
        for finding in &self.findings {
            out.push_str(&format!(
                "  line {} [{}] {}\n    > {}\n",
                finding.line, finding.tier, finding.description, finding.snippet
            ));
        }
        out
    }
}

/// Scan one source for one weakness code.
pub fn scan(source: &str, swc: SwcId) -> HintRecord {
    let model = SourceModel::analyze(source);
    HintRecord {
        swc,
        findings: rules::scan(&model, swc),
    }
}

/// Scan one source for a whole closed code set, extracting spans once.
pub fn scan_all(source: &str, codes: impl IntoIterator<Item = SwcId>) -> Vec<HintRecord> {
    let model = SourceModel::analyze(source);
    codes
        .into_iter()
        .map(|swc| HintRecord {
            swc,
            findings: rules::scan(&model, swc),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VULNERABLE: &str = r#"
pragma solidity ^0.4.19;

contract Piggy {
    mapping(address => uint) public balances;
    address owner;
    string private secretPhrase;

    function Piggy() public {
        owner = msg.sender;
    }

    function deposit() public payable {
        balances[msg.sender] += msg.value;
    }

    function withdraw(uint amount) public {
        require(balances[msg.sender] >= amount);
        msg.sender.call.value(amount)("");
        balances[msg.sender] -= amount;
    }

    function drain() public {
        selfdestruct(msg.sender);
    }

    function login() public view returns (bool) {
        return tx.origin == owner;
    }

    function lucky() public view returns (bool) {
        return now > 1500000000;
    }
}
"#;

    fn lines_for(swc: u32) -> Vec<usize> {
        scan(VULNERABLE, SwcId(swc))
            .findings
            .iter()
            .map(|f| f.line)
            .collect()
    }

    #[test]
    fn detects_reentrancy_before_state_write() {
        let record = scan(VULNERABLE, SwcId(107));
        assert_eq!(record.findings.len(), 1, "{record:?}");
        let finding = &record.findings[0];
        assert_eq!(finding.line, 19);
        assert!(finding.snippet.contains("call.value"));
        assert!(finding.tier >= RiskTier::High);
    }

    #[test]
    fn detects_unprotected_selfdestruct() {
        let record = scan(VULNERABLE, SwcId(106));
        assert_eq!(record.findings.len(), 1, "{record:?}");
        assert_eq!(record.findings[0].tier, RiskTier::Critical);
        assert!(record.findings[0].snippet.contains("selfdestruct"));
    }

    #[test]
    fn detects_tx_origin_auth() {
        assert_eq!(lines_for(115).len(), 1);
    }

    #[test]
    fn detects_timestamp_dependence() {
        let record = scan(VULNERABLE, SwcId(116));
        assert_eq!(record.findings.len(), 1, "{record:?}");
        assert!(record.findings[0].snippet.contains("now"));
    }

    #[test]
    fn detects_pre_08_arithmetic() {
        // deposit's += and withdraw's -= both run under 0.4 wrap semantics
        assert!(!lines_for(101).is_empty());
    }

    #[test]
    fn detects_floating_and_outdated_pragma() {
        assert_eq!(lines_for(103), vec![2]);
        assert_eq!(lines_for(102), vec![2]);
    }

    #[test]
    fn detects_sensitive_private_state() {
        let record = scan(VULNERABLE, SwcId(136));
        assert_eq!(record.findings.len(), 1, "{record:?}");
        assert!(record.findings[0].snippet.contains("secretPhrase"));
    }

    #[test]
    fn authorized_withdrawal_is_not_flagged_as_swc_105() {
        let guarded = r#"
pragma solidity ^0.8.0;
contract Safe {
    address owner;
    modifier onlyOwner() { require(msg.sender == owner); _; }
    function payout(address payable to) public onlyOwner {
        to.transfer(address(this).balance);
    }
}
"#;
        assert!(scan(guarded, SwcId(105)).findings.is_empty());
    }

    #[test]
    fn reentrancy_guard_suppresses_swc_107() {
        let guarded = r#"
pragma solidity ^0.8.0;
contract Safe {
    mapping(address => uint) balances;
    function withdraw(uint amount) public nonReentrant {
        msg.sender.call{value: amount}("");
        balances[msg.sender] -= amount;
    }
}
"#;
        assert!(scan(guarded, SwcId(107)).findings.is_empty());
    }

    #[test]
    fn checked_arithmetic_suppresses_swc_101() {
        let modern = r#"
pragma solidity ^0.8.17;
contract Counter {
    uint total;
    function bump(uint by) public { total += by; }
}
"#;
        assert!(scan(modern, SwcId(101)).findings.is_empty());
    }

    #[test]
    fn unbounded_loop_is_flagged() {
        let looped = r#"
pragma solidity ^0.8.0;
contract Airdrop {
    address[] public recipients;
    mapping(address => uint) owed;
    function payAll() public {
        for (uint i = 0; i < recipients.length; i++) {
            owed[recipients[i]] = 1;
        }
    }
}
"#;
        let record = scan(looped, SwcId(128));
        assert_eq!(record.findings.len(), 1, "{record:?}");
    }

    #[test]
    fn empty_source_yields_no_findings() {
        for swc in [100, 101, 104, 107, 116, 128] {
            assert!(scan("", SwcId(swc)).findings.is_empty());
        }
    }

    #[test]
    fn scan_all_covers_every_requested_code() {
        let records = scan_all(VULNERABLE, (100..=110).map(SwcId));
        assert_eq!(records.len(), 11);
        assert!(records.iter().all(|r| r.findings.iter().all(|f| f.swc == r.swc)));
    }

    #[test]
    fn record_rendering_carries_provenance() {
        let record = scan(VULNERABLE, SwcId(107));
        let text = record.render();
        assert!(text.starts_with("[SWC-107] Reentrancy"));
        assert!(text.contains("line 19"));
    }
}
