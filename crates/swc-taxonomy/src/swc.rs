//! Canonical `SWC-<n>` weakness codes.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A canonical weakness code. Two codes are equal iff their integer parts
/// match; ordering is numeric, which gives the deterministic tie-break used
/// throughout the pipeline (smallest integer wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwcId(pub u32);

impl SwcId {
    pub fn number(self) -> u32 {
        self.0
    }

    /// Human-readable title from the SWC registry, where we carry one.
    /// Used in hint provenance headers and LLM prompts.
    pub fn title(self) -> Option<&'static str> {
        let title = match self.0 {
            100 => "Function Default Visibility",
            101 => "Integer Overflow and Underflow",
            102 => "Outdated Compiler Version",
            103 => "Floating Pragma",
            104 => "Unchecked Call Return Value",
            105 => "Unprotected Ether Withdrawal",
            106 => "Unprotected SELFDESTRUCT Instruction",
            107 => "Reentrancy",
            108 => "State Variable Default Visibility",
            109 => "Uninitialized Storage Pointer",
            110 => "Assert Violation",
            115 => "Authorization through tx.origin",
            116 => "Block values as a proxy for time",
            121 => "Missing Protection against Signature Replay Attacks",
            124 => "Write to Arbitrary Storage Location",
            128 => "DoS With Block Gas Limit",
            136 => "Unencrypted Private Data On-Chain",
            _ => return None,
        };
        Some(title)
    }
}

impl fmt::Display for SwcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SWC-{}", self.0)
    }
}

impl FromStr for SwcId {
    type Err = ParseSwcError;

    /// Accepts `SWC-101`, `swc_101`, bare `101`, and the recurring
    /// duplicated-prefix artifact `SWC-SWC-101`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s.trim();
        loop {
            let lower = rest.to_ascii_lowercase();
            if let Some(tail) = lower.strip_prefix("swc") {
                let skipped = rest.len() - tail.len();
                rest = rest[skipped..].trim_start_matches(['-', '_', ' ']);
            } else {
                break;
            }
        }
        rest.parse::<u32>()
            .map(SwcId)
            .map_err(|_| ParseSwcError(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("not a recognizable SWC code: {0:?}")]
pub struct ParseSwcError(pub String);

impl Serialize for SwcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SwcId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_form() {
        assert_eq!("SWC-107".parse::<SwcId>().unwrap(), SwcId(107));
    }

    #[test]
    fn collapses_duplicated_prefix() {
        assert_eq!("SWC-SWC-101".parse::<SwcId>().unwrap(), SwcId(101));
        assert_eq!("SWC-SWC-SWC-101".parse::<SwcId>().unwrap(), SwcId(101));
    }

    #[test]
    fn tolerates_case_and_separators() {
        assert_eq!("swc_110".parse::<SwcId>().unwrap(), SwcId(110));
        assert_eq!(" SWC- 104 ".parse::<SwcId>().unwrap(), SwcId(104));
        assert_eq!("128".parse::<SwcId>().unwrap(), SwcId(128));
    }

    #[test]
    fn rejects_missing_digits() {
        assert!("SWC-".parse::<SwcId>().is_err());
        assert!("SWC-abc".parse::<SwcId>().is_err());
    }

    #[test]
    fn orders_numerically() {
        assert!(SwcId(104) < SwcId(116));
    }

    #[test]
    fn displays_canonically() {
        assert_eq!(SwcId(101).to_string(), "SWC-101");
    }
}
