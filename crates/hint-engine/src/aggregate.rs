//! Hint aggregation: one combined document per contract.
//!
//! Groups every per-weakness record under a provenance header, ordered by
//! weakness-code integer then by line, deduplicating findings that share
//! `(code, line, snippet)`. The combined document is what the LLM stage
//! receives.

use std::collections::BTreeSet;

use crate::HintRecord;

/// Merge all of a contract's records into the combined hint document.
pub fn combine_hints(contract: &str, records: &[HintRecord]) -> String {
    let mut out = format!("Heuristic findings for contract {contract}\n");
    let mut any = false;
    let mut seen: BTreeSet<(u32, usize, String)> = BTreeSet::new();

    let mut sorted: Vec<&HintRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.swc);

    for record in sorted {
        let mut findings: Vec<_> = record
            .findings
            .iter()
            .filter(|f| seen.insert((f.swc.number(), f.line, f.snippet.clone())))
            .collect();
        if findings.is_empty() {
            continue;
        }
        findings.sort_by_key(|f| f.line);
        any = true;

        let title = record.swc.title().unwrap_or("(unregistered weakness)");
        out.push_str(&format!("\n== {} ({title}) ==\n", record.swc));
        for finding in findings {
            out.push_str(&format!(
                "line {} [{}] {}\n  > {}\n",
                finding.line, finding.tier, finding.description, finding.snippet
            ));
        }
    }

    if !any {
        out.push_str("\nno heuristic findings\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HintFinding, RiskTier};
    use swc_taxonomy::SwcId;

    fn finding(swc: u32, line: usize, snippet: &str) -> HintFinding {
        HintFinding {
            swc: SwcId(swc),
            tier: RiskTier::Medium,
            description: "desc".into(),
            line,
            snippet: snippet.into(),
        }
    }

    #[test]
    fn groups_by_code_then_line() {
        let records = vec![
            HintRecord {
                swc: SwcId(116),
                findings: vec![finding(116, 9, "now > x")],
            },
            HintRecord {
                swc: SwcId(101),
                findings: vec![finding(101, 20, "b -= a"), finding(101, 5, "a += b")],
            },
        ];
        let doc = combine_hints("Wallet", &records);
        let pos_101 = doc.find("== SWC-101").unwrap();
        let pos_116 = doc.find("== SWC-116").unwrap();
        assert!(pos_101 < pos_116);
        let line5 = doc.find("line 5").unwrap();
        let line20 = doc.find("line 20").unwrap();
        assert!(line5 < line20);
    }

    #[test]
    fn dedupes_identical_findings() {
        let records = vec![
            HintRecord {
                swc: SwcId(107),
                findings: vec![finding(107, 3, "x.call()"), finding(107, 3, "x.call()")],
            },
        ];
        let doc = combine_hints("Wallet", &records);
        assert_eq!(doc.matches("x.call()").count(), 1);
    }

    #[test]
    fn empty_records_state_so() {
        let doc = combine_hints("Wallet", &[]);
        assert!(doc.contains("no heuristic findings"));
    }
}
