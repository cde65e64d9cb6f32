//! The per-weakness rule table and its evaluation engine.
//!
//! Each weakness is data: trigger patterns over the cleaned source plus
//! context predicates evaluated against the extracted spans. One engine
//! runs every rule; no weakness has bespoke scanning code. Heuristics here
//! are hints for the LLM stage, never verdicts — the tier records how much
//! the pattern should be trusted.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::source::{
    self, ContractKind, ContractSpan, FunctionSpan, Mutability, StateVarSpan,
};
use crate::{HintFinding, RiskTier};
use swc_taxonomy::SwcId;

/// One table entry: when `triggers` match and every `context` predicate
/// holds at the match site, a finding is emitted.
pub struct Rule {
    pub swc: u32,
    pub tier: RiskTier,
    pub description: &'static str,
    pub triggers: &'static [&'static str],
    pub context: &'static [ContextCheck],
}

/// Context predicates. All listed predicates must hold for a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextCheck {
    /// Match lies in a public/external non-view function.
    ExternallyReachable,
    /// Enclosing function carries no authorization modifier or
    /// `msg.sender` equality check, and is not a constructor.
    NoAuthGuard,
    /// No reentrancy modifier or mutex require observed on the function.
    NoReentrancyGuard,
    /// A state variable is written after the match, inside the function.
    StateWriteAfterMatch,
    /// Pre-0.8 wrap semantics (or an `unchecked` block) with no SafeMath.
    UncheckedArithmetic,
    /// The matched call's statement neither assigns nor guards its result.
    ReturnValueUnused,
    PragmaFloating,
    PragmaOutdated,
    /// Loop bound depends on dynamic data, not a literal.
    UnboundedLoop,
    /// The written index is derived from a function parameter and the base
    /// is a state variable.
    IndexFromParameter,
    /// No nonce/consumed-hash bookkeeping near the signature check.
    NoReplayGuard,
    /// The matched statement references a function parameter.
    UsesFunctionParameter,
    /// The match sits in a comparison or branch condition.
    InComparison,
    /// Function at the match relies on implicit (public) visibility.
    ImplicitFunctionVisibility,
    /// State variable at the match has no explicit visibility keyword.
    ImplicitStateVarVisibility,
    /// A storage-located local declared without an initializer.
    UninitializedStorageLocal,
    /// Declaration name suggests secret data.
    SensitiveName,
}

pub static RULES: &[Rule] = &[
    Rule {
        swc: 100,
        tier: RiskTier::Medium,
        description: "Function relies on implicit public visibility; any account can call it.",
        triggers: &[r"\bfunction\s+[A-Za-z_$][\w$]*\s*\("],
        context: &[ContextCheck::ImplicitFunctionVisibility],
    },
    Rule {
        swc: 101,
        tier: RiskTier::Medium,
        description: "Arithmetic without overflow protection under wrapping semantics; \
                      no SafeMath or checked construct observed.",
        triggers: &[
            r"[\w$\]\)]\s*(\+=|-=|\*=)",
            r"=\s*[\w$\.\[\]]+\s*[\+\-\*]\s*[\w$\.\[\]]+",
        ],
        context: &[ContextCheck::UncheckedArithmetic],
    },
    Rule {
        swc: 102,
        tier: RiskTier::Low,
        description: "Compiler constraint admits outdated releases with known miscompilation bugs.",
        triggers: &[r"pragma\s+solidity"],
        context: &[ContextCheck::PragmaOutdated],
    },
    Rule {
        swc: 103,
        tier: RiskTier::Low,
        description: "Floating pragma; deployed bytecode may come from an untested compiler version.",
        triggers: &[r"pragma\s+solidity\s*[\^>]"],
        context: &[ContextCheck::PragmaFloating],
    },
    Rule {
        swc: 104,
        tier: RiskTier::Medium,
        description: "Low-level call return value is not checked; a failed call proceeds silently.",
        triggers: &[
            r"\.send\s*\(",
            r"\.call\s*\(",
            r"\.call\.value\s*\([^)]*\)\s*\(",
            r"\.call\s*\{[^}]*\}\s*\(",
            r"\.delegatecall\s*\(",
        ],
        context: &[ContextCheck::ReturnValueUnused],
    },
    Rule {
        swc: 105,
        tier: RiskTier::High,
        description: "Ether leaves the contract from an externally reachable function \
                      with no authorization guard.",
        triggers: &[
            r"\.transfer\s*\(",
            r"\.send\s*\(",
            r"\.call\.value\s*\(",
            r"\.call\s*\{\s*value\s*:",
        ],
        context: &[ContextCheck::ExternallyReachable, ContextCheck::NoAuthGuard],
    },
    Rule {
        swc: 106,
        tier: RiskTier::Critical,
        description: "Reachable SELFDESTRUCT without authorization; anyone can destroy the contract.",
        triggers: &[r"\bselfdestruct\s*\(", r"\bsuicide\s*\("],
        context: &[ContextCheck::ExternallyReachable, ContextCheck::NoAuthGuard],
    },
    Rule {
        swc: 107,
        tier: RiskTier::High,
        description: "External call precedes a state write in the same function and no \
                      reentrancy guard was observed.",
        triggers: &[
            r"\.call\.value\s*\(",
            r"\.call\s*\{\s*value\s*:",
            r"\.call\s*\(",
        ],
        context: &[
            ContextCheck::StateWriteAfterMatch,
            ContextCheck::NoReentrancyGuard,
        ],
    },
    Rule {
        swc: 108,
        tier: RiskTier::Low,
        description: "State variable visibility left implicit; intent is unreviewable.",
        triggers: &[
            r"(?m)^\s*(uint\d*|int\d*|address|bool|bytes\d*|string)\b[^;()=]*;",
            r"(?m)^\s*mapping\s*\([^;]*\)\s+[A-Za-z_$][\w$]*\s*;",
        ],
        context: &[ContextCheck::ImplicitStateVarVisibility],
    },
    Rule {
        swc: 109,
        tier: RiskTier::High,
        description: "Storage-located local declared without initialization; it aliases slot 0 \
                      on legacy compilers.",
        triggers: &[r"\b[A-Za-z_$][\w$]*(\s*\[\s*\])?\s+storage\s+[A-Za-z_$][\w$]*\s*;"],
        context: &[ContextCheck::UninitializedStorageLocal, ContextCheck::PragmaOutdated],
    },
    Rule {
        swc: 110,
        tier: RiskTier::Low,
        description: "assert() over externally influenced input; assert should guard \
                      invariants only, and its failure consumes all gas on legacy EVMs.",
        triggers: &[r"\bassert\s*\("],
        context: &[ContextCheck::UsesFunctionParameter],
    },
    Rule {
        swc: 115,
        tier: RiskTier::High,
        description: "tx.origin used for authorization; any contract the user calls can \
                      impersonate them.",
        triggers: &[r"tx\.origin"],
        context: &[ContextCheck::InComparison],
    },
    Rule {
        swc: 116,
        tier: RiskTier::Medium,
        description: "Block timestamp steers control flow; miners can skew it within \
                      consensus bounds.",
        triggers: &[r"\bblock\.timestamp\b", r"\bnow\b"],
        context: &[ContextCheck::InComparison],
    },
    Rule {
        swc: 121,
        tier: RiskTier::High,
        description: "Signature recovered without nonce or consumed-hash bookkeeping; \
                      signed messages can be replayed.",
        triggers: &[r"\becrecover\s*\("],
        context: &[ContextCheck::NoReplayGuard],
    },
    Rule {
        swc: 124,
        tier: RiskTier::High,
        description: "Storage written at an index derived from caller input without \
                      bounds validation.",
        triggers: &[r"\b[A-Za-z_$][\w$]*\s*\[[^\]]+\]\s*=[^=]"],
        context: &[
            ContextCheck::IndexFromParameter,
            ContextCheck::ExternallyReachable,
        ],
    },
    Rule {
        swc: 128,
        tier: RiskTier::Medium,
        description: "Loop bound grows with dynamic data; iteration can exceed the block \
                      gas limit and permanently brick the function.",
        triggers: &[r"\bfor\s*\(", r"\bwhile\s*\("],
        context: &[ContextCheck::UnboundedLoop],
    },
    Rule {
        swc: 136,
        tier: RiskTier::Low,
        description: "private only hides data from other contracts; the value is readable \
                      from chain data and transaction history.",
        triggers: &[r"\bprivate\b[^;{}]*;"],
        context: &[ContextCheck::SensitiveName],
    },
];

static COMPILED_TRIGGERS: Lazy<Vec<Vec<Regex>>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| {
            rule.triggers
                .iter()
                .map(|t| Regex::new(t).expect("static rule trigger"))
                .collect()
        })
        .collect()
});

static AUTH_REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"require\s*\([^;]*msg\.sender\s*==|msg\.sender\s*==\s*owner").expect("static regex")
});
static MUTEX_REQUIRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)require\s*\(\s*!\s*\w*lock").expect("static regex"));
static STATE_WRITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_$][\w$]*)\s*(?:\[[^\]]*\]\s*)?(?:=[^=]|\+=|-=|\*=)")
        .expect("static regex")
});
static REPLAY_GUARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)nonce|replay|used\s*\[|usedHash").expect("static regex"));
static SENSITIVE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)secret|password|passwd|privatekey|private_key|answer|hidden|seed")
        .expect("static regex")
});
static USING_SAFEMATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"using\s+SafeMath\s+for").expect("static regex"));
static PRAGMA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pragma\s+solidity\s*([^;]+);").expect("static regex")
});
static VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.(\d+)").expect("static regex"));

#[derive(Debug, Clone, Copy)]
pub struct PragmaInfo {
    pub present: bool,
    pub floating: bool,
    pub major: u32,
    pub minor: u32,
}

impl PragmaInfo {
    /// True when wrapping-arithmetic semantics apply (pre-0.8 or no pragma).
    pub fn wrapping_arithmetic(&self) -> bool {
        !self.present || (self.major == 0 && self.minor < 8)
    }

    pub fn pre_0_5(&self) -> bool {
        !self.present || (self.major == 0 && self.minor < 5)
    }
}

struct ContractModel {
    span: ContractSpan,
    functions: Vec<FunctionSpan>,
    state_vars: Vec<StateVarSpan>,
}

/// One pass of span extraction over a source file; shared by every rule.
pub struct SourceModel<'a> {
    original: &'a str,
    cleaned: String,
    contracts: Vec<ContractModel>,
    pragma: PragmaInfo,
}

impl<'a> SourceModel<'a> {
    pub fn analyze(original: &'a str) -> Self {
        let cleaned = source::strip_comments_and_strings(original);
        let contracts = source::extract_contracts(&cleaned)
            .into_iter()
            .map(|span| ContractModel {
                functions: source::extract_functions(&cleaned, &span),
                state_vars: source::extract_state_variables(&cleaned, &span),
                span,
            })
            .collect();

        let pragma = match PRAGMA.captures(&cleaned) {
            Some(cap) => {
                let constraint = cap[1].trim();
                let (major, minor) = VERSION
                    .captures(constraint)
                    .map(|v| (v[1].parse().unwrap_or(0), v[2].parse().unwrap_or(0)))
                    .unwrap_or((0, 0));
                PragmaInfo {
                    present: true,
                    floating: constraint.contains('^') || constraint.contains(">="),
                    major,
                    minor,
                }
            }
            None => PragmaInfo {
                present: false,
                floating: true,
                major: 0,
                minor: 0,
            },
        };

        Self {
            original,
            cleaned,
            contracts,
            pragma,
        }
    }

    pub fn pragma(&self) -> PragmaInfo {
        self.pragma
    }

    fn enclosing(&self, pos: usize) -> Option<(&ContractModel, &FunctionSpan)> {
        self.contracts.iter().find_map(|c| {
            c.functions
                .iter()
                .find(|f| f.contains(pos))
                .map(|f| (c, f))
        })
    }

    fn contract_at(&self, pos: usize) -> Option<&ContractModel> {
        self.contracts
            .iter()
            .find(|c| c.span.span.contains(&pos))
    }

    /// Statement slice around a match: previous `;`/`{`/`}` boundary to the
    /// next `;` (or a short window when none is found).
    fn statement_at(&self, start: usize, end: usize) -> &str {
        let stmt_start = self.cleaned[..start]
            .rfind([';', '{', '}'])
            .map_or(0, |i| i + 1);
        let stmt_end = self.cleaned[end..]
            .find(';')
            .map_or_else(|| (end + 120).min(self.cleaned.len()), |i| end + i);
        &self.cleaned[stmt_start..stmt_end]
    }
}

struct MatchSite<'m, 'a> {
    model: &'m SourceModel<'a>,
    start: usize,
    end: usize,
}

impl MatchSite<'_, '_> {
    fn check(&self, check: ContextCheck) -> bool {
        let model = self.model;
        let enclosing = model.enclosing(self.start);
        match check {
            ContextCheck::ExternallyReachable => enclosing.is_some_and(|(_, f)| {
                f.visibility.externally_reachable()
                    && !matches!(f.mutability, Mutability::View | Mutability::Pure)
            }),
            ContextCheck::NoAuthGuard => {
                let Some((_, f)) = enclosing else { return false };
                let has_auth_modifier = f
                    .modifiers
                    .iter()
                    .any(|m| m.to_ascii_lowercase().starts_with("only"));
                if f.name == "constructor" || has_auth_modifier {
                    return false;
                }
                let body = f
                    .body
                    .as_ref()
                    .map(|b| &model.cleaned[b.clone()])
                    .unwrap_or("");
                !AUTH_REQUIRE.is_match(body)
            }
            ContextCheck::NoReentrancyGuard => {
                let Some((_, f)) = enclosing else { return false };
                let guarded = f.modifiers.iter().any(|m| {
                    let m = m.to_ascii_lowercase();
                    m.contains("reentran") || m.contains("mutex") || m.contains("lock")
                });
                let body = f
                    .body
                    .as_ref()
                    .map(|b| &model.cleaned[b.clone()])
                    .unwrap_or("");
                !guarded && !MUTEX_REQUIRE.is_match(body)
            }
            ContextCheck::StateWriteAfterMatch => {
                let Some((contract, f)) = enclosing else { return false };
                let Some(body) = f.body.as_ref() else { return false };
                if self.end >= body.end {
                    return false;
                }
                let tail = &model.cleaned[self.end..body.end];
                STATE_WRITE.captures_iter(tail).any(|cap| {
                    contract.state_vars.iter().any(|v| v.name == cap[1])
                })
            }
            ContextCheck::UncheckedArithmetic => {
                let in_unchecked = enclosing
                    .and_then(|(_, f)| f.body.as_ref())
                    .map(|b| {
                        let before = &model.cleaned[b.start..self.start.max(b.start)];
                        before
                            .rfind("unchecked")
                            .and_then(|i| {
                                let open = before[i..].find('{').map(|j| b.start + i + j)?;
                                source::match_delimiter(&model.cleaned, open, '{', '}')
                            })
                            .is_some_and(|close| close > self.start)
                    })
                    .unwrap_or(false);
                if !model.pragma.wrapping_arithmetic() && !in_unchecked {
                    return false;
                }
                let scope = model
                    .contract_at(self.start)
                    .map(|c| &model.cleaned[c.span.span.clone()])
                    .unwrap_or(&model.cleaned);
                !USING_SAFEMATH.is_match(scope)
            }
            ContextCheck::ReturnValueUnused => {
                let stmt_start = model.cleaned[..self.start]
                    .rfind([';', '{', '}'])
                    .map_or(0, |i| i + 1);
                let before_match = &model.cleaned[stmt_start..self.start];
                !before_match.contains('=')
                    && !before_match.contains("require")
                    && !before_match.contains("assert")
                    && !before_match.contains("if")
                    && !before_match.contains("return")
            }
            ContextCheck::PragmaFloating => model.pragma.floating || !model.pragma.present,
            ContextCheck::PragmaOutdated => model.pragma.wrapping_arithmetic(),
            ContextCheck::UnboundedLoop => {
                let Some(open) = model.cleaned[self.start..self.end.min(self.start + 16)]
                    .rfind('(')
                    .map(|i| self.start + i)
                else {
                    return false;
                };
                let Some(close) = source::match_delimiter(&model.cleaned, open, '(', ')') else {
                    return false;
                };
                let cond = &model.cleaned[open + 1..close];
                if cond.contains(".length") {
                    return true;
                }
                // `< ident` with a non-literal bound
                cond.split(['<', '>'])
                    .nth(1)
                    .map(|bound| {
                        let bound = bound.trim_start_matches('=').trim();
                        let token: String = bound
                            .chars()
                            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
                            .collect();
                        !token.is_empty() && !token.chars().next().unwrap().is_ascii_digit()
                    })
                    .unwrap_or(false)
            }
            ContextCheck::IndexFromParameter => {
                let Some((contract, f)) = enclosing else { return false };
                let text = &model.cleaned[self.start..self.end];
                let Some(bracket) = text.find('[') else { return false };
                let base = text[..bracket].trim();
                let index = &text[bracket + 1..text.rfind(']').unwrap_or(text.len())];
                contract.state_vars.iter().any(|v| v.name == base)
                    && f.params
                        .iter()
                        .any(|p| !p.name.is_empty() && contains_token(index, &p.name))
            }
            ContextCheck::NoReplayGuard => {
                let scope = enclosing
                    .and_then(|(_, f)| f.body.as_ref())
                    .map(|b| &model.cleaned[b.clone()])
                    .unwrap_or(&model.cleaned);
                !REPLAY_GUARD.is_match(scope)
            }
            ContextCheck::UsesFunctionParameter => {
                let Some((_, f)) = enclosing else { return false };
                let stmt = model.statement_at(self.start, self.end);
                f.params
                    .iter()
                    .any(|p| !p.name.is_empty() && contains_token(stmt, &p.name))
            }
            ContextCheck::InComparison => {
                let stmt = model.statement_at(self.start, self.end);
                ["==", "!=", "<", ">", "require", "if (", "if("]
                    .iter()
                    .any(|needle| stmt.contains(needle))
            }
            ContextCheck::ImplicitFunctionVisibility => model.contracts.iter().any(|c| {
                c.span.kind != ContractKind::Interface
                    && c.functions
                        .iter()
                        .any(|f| f.head.start == self.start && !f.explicit_visibility)
            }),
            ContextCheck::ImplicitStateVarVisibility => self.state_var_in_match(
                |v| !v.explicit_visibility && !v.constant && !v.immutable,
            ),
            ContextCheck::UninitializedStorageLocal => enclosing
                .is_some_and(|(_, f)| f.body.as_ref().is_some_and(|b| b.contains(&self.start))),
            ContextCheck::SensitiveName => {
                self.state_var_in_match(|v| SENSITIVE_NAME.is_match(&v.name))
                    || SENSITIVE_NAME.is_match(&self.model.cleaned[self.start..self.end])
            }
        }
    }

    fn state_var_in_match(&self, pred: impl Fn(&StateVarSpan) -> bool) -> bool {
        self.model.contracts.iter().any(|c| {
            c.state_vars
                .iter()
                .any(|v| (self.start..self.end).contains(&v.pos) && pred(v))
        })
    }

}

fn contains_token(haystack: &str, token: &str) -> bool {
    haystack.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '$')
        .any(|t| t == token)
}

fn bump(tier: RiskTier) -> RiskTier {
    match tier {
        RiskTier::Low => RiskTier::Medium,
        RiskTier::Medium => RiskTier::High,
        RiskTier::High | RiskTier::Critical => RiskTier::Critical,
    }
}

/// Run every rule for `swc` over the analyzed source.
pub fn scan(model: &SourceModel<'_>, swc: SwcId) -> Vec<HintFinding> {
    let mut findings = Vec::new();
    let mut seen: BTreeSet<(u32, usize)> = BTreeSet::new();

    for (rule_idx, rule) in RULES.iter().enumerate() {
        if rule.swc != swc.number() {
            continue;
        }
        for trigger in &COMPILED_TRIGGERS[rule_idx] {
            for m in trigger.find_iter(&model.cleaned) {
                let site = MatchSite {
                    model,
                    start: m.start(),
                    end: m.end(),
                };
                if !rule.context.iter().all(|&c| site.check(c)) {
                    continue;
                }
                let line = source::line_of(model.original, m.start());
                if !seen.insert((rule.swc, line)) {
                    continue;
                }
                let reachable = model.enclosing(m.start()).is_some_and(|(_, f)| {
                    f.visibility.externally_reachable()
                });
                let tier = if reachable { bump(rule.tier) } else { rule.tier };
                findings.push(HintFinding {
                    swc,
                    tier,
                    description: rule.description.split_whitespace().collect::<Vec<_>>().join(" "),
                    line,
                    snippet: source::snippet_at(model.original, m.start()),
                });
            }
        }
    }
    findings.sort_by_key(|f| f.line);
    findings
}
