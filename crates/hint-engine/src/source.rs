//! Shared lexical primitives over Solidity source.
//!
//! One comment/string stripper, one delimiter matcher, one span extractor —
//! every rule in the table works against the same cleaned view, so byte
//! offsets (and therefore line numbers) always refer to the original file.
//! Masked bytes are replaced with spaces of equal UTF-8 width and newlines
//! are preserved, which keeps all offsets in original coordinates.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::warn;

/// Safety cap for the delimiter matcher and header scans so malformed
/// input always terminates.
const MAX_SCAN_BYTES: usize = 1_000_000;

/// Replace comments and string literals with spaces, preserving newlines
/// and byte offsets.
pub fn strip_comments_and_strings(src: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(char),
        StrEscape(char),
    }

    let mut out = String::with_capacity(src.len());
    let mut state = State::Code;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    state = State::LineComment;
                    out.push(' ');
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = State::BlockComment;
                    out.push(' ');
                }
                '"' | '\'' => {
                    state = State::Str(c);
                    out.push(' ');
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    mask(&mut out, c);
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    mask(&mut out, c);
                }
            }
            State::Str(q) => {
                if c == '\\' {
                    state = State::StrEscape(q);
                    out.push(' ');
                } else if c == q {
                    state = State::Code;
                    out.push(' ');
                } else if c == '\n' {
                    // unterminated literal; recover at line end
                    state = State::Code;
                    out.push('\n');
                } else {
                    mask(&mut out, c);
                }
            }
            State::StrEscape(q) => {
                state = State::Str(q);
                mask(&mut out, c);
            }
        }
    }
    out
}

fn mask(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

/// Position of the delimiter closing the one at `open_pos`, or `None` if
/// the input is malformed or the scan cap is hit.
pub fn match_delimiter(src: &str, open_pos: usize, open: char, close: char) -> Option<usize> {
    if !src.is_char_boundary(open_pos) || !src[open_pos..].starts_with(open) {
        return None;
    }
    let mut depth = 0usize;
    for (off, c) in src[open_pos..].char_indices().take(MAX_SCAN_BYTES) {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(open_pos + off);
            }
        }
    }
    None
}

/// 1-based line number of a byte position, in original coordinates.
pub fn line_of(src: &str, pos: usize) -> usize {
    src[..pos.min(src.len())].bytes().filter(|&b| b == b'\n').count() + 1
}

/// The full (trimmed, length-capped) original-source line containing `pos`.
pub fn snippet_at(original: &str, pos: usize) -> String {
    let pos = pos.min(original.len());
    let start = original[..pos].rfind('\n').map_or(0, |i| i + 1);
    let end = original[pos..]
        .find('\n')
        .map_or(original.len(), |i| pos + i);
    let mut line = original[start..end].trim().to_string();
    if line.len() > 160 {
        line.truncate(157);
        line.push_str("...");
    }
    line
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Contract,
    Library,
    Interface,
}

#[derive(Debug, Clone)]
pub struct ContractSpan {
    pub name: String,
    pub kind: ContractKind,
    pub inherits: Vec<String>,
    /// Full span including the header.
    pub span: Range<usize>,
    /// Span between the braces.
    pub body: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
}

impl Visibility {
    pub fn externally_reachable(self) -> bool {
        matches!(self, Visibility::Public | Visibility::External)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Nonpayable,
    View,
    Pure,
    Payable,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub ty: String,
    pub name: String,
    pub storage: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionSpan {
    pub name: String,
    pub visibility: Visibility,
    /// False when the source relied on the pre-0.5 implicit-public default.
    pub explicit_visibility: bool,
    pub mutability: Mutability,
    pub modifiers: Vec<String>,
    pub params: Vec<Param>,
    pub locals: Vec<Param>,
    /// Header span, from the `function` keyword.
    pub head: Range<usize>,
    /// Body span between braces; `None` for declarations ending in `;`.
    pub body: Option<Range<usize>>,
}

impl FunctionSpan {
    pub fn contains(&self, pos: usize) -> bool {
        let end = self.body.as_ref().map_or(self.head.end, |b| b.end);
        self.head.start <= pos && pos < end
    }
}

#[derive(Debug, Clone)]
pub struct StateVarSpan {
    pub name: String,
    pub ty: String,
    pub visibility: Visibility,
    pub explicit_visibility: bool,
    pub constant: bool,
    pub immutable: bool,
    pub initializer: Option<String>,
    pub pos: usize,
}

static CONTRACT_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(contract|library|interface)\s+([A-Za-z_$][\w$]*)").expect("static regex")
});

static FUNCTION_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:function\s+([A-Za-z_$][\w$]*)|(constructor)|(fallback)|(receive))\s*\(")
        .expect("static regex")
});

static MODIFIER_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bmodifier\s+([A-Za-z_$][\w$]*)").expect("static regex"));

static RETURNS_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"returns\s*\([^)]*\)").expect("static regex"));

static LOCAL_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(uint\d*|int\d*|address|bool|bytes\d*|string|[A-Z][\w$]*)((?:\s*\[\s*\w*\s*\])*)\s+(memory\s+|storage\s+|calldata\s+)?([A-Za-z_$][\w$]*)\s*(=|;)",
    )
    .expect("static regex")
});

static STATE_VAR_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(mapping\s*\([^;]+?\)|uint\d*|int\d*|address(?:\s+payable)?|bool|bytes\d*|string|[A-Z][\w$]*)((?:\s*\[\s*\w*\s*\])*)((?:\s+(?:public|private|internal|constant|immutable))*)\s+([A-Za-z_$][\w$]*)\s*(=\s*[^;]+)?;",
    )
    .expect("static regex")
});

/// Extract contract/library/interface spans from a cleaned source.
pub fn extract_contracts(cleaned: &str) -> Vec<ContractSpan> {
    let mut spans = Vec::new();
    for cap in CONTRACT_HEAD.captures_iter(cleaned) {
        let whole = cap.get(0).expect("match");
        let kind = match &cap[1] {
            "library" => ContractKind::Library,
            "interface" => ContractKind::Interface,
            _ => ContractKind::Contract,
        };
        let Some(open) = cleaned[whole.end()..].find('{').map(|i| whole.end() + i) else {
            continue;
        };
        // A `;` before the brace means this matched something else (e.g. a
        // `using ... for` import artifact); skip it.
        if cleaned[whole.end()..open].contains(';') {
            continue;
        }
        let Some(close) = match_delimiter(cleaned, open, '{', '}') else {
            warn!(contract = &cap[2], "unterminated contract body; skipping span");
            continue;
        };

        let header = &cleaned[whole.end()..open];
        let inherits = header
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .strip_prefix("is ")
            .map(|list| {
                list.split(',')
                    .filter_map(|p| {
                        let name = p.trim().split(['(', ' ']).next()?.trim();
                        (!name.is_empty()).then(|| name.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();

        spans.push(ContractSpan {
            name: cap[2].to_string(),
            kind,
            inherits,
            span: whole.start()..close + 1,
            body: open + 1..close,
        });
    }
    spans
}

/// Extract function spans (including constructor/fallback/receive) from one
/// contract's body.
pub fn extract_functions(cleaned: &str, contract: &ContractSpan) -> Vec<FunctionSpan> {
    let mut spans = Vec::new();
    let body = &cleaned[contract.body.clone()];

    for cap in FUNCTION_HEAD.captures_iter(body) {
        let whole = cap.get(0).expect("match");
        let head_start = contract.body.start + whole.start();
        let name = cap
            .get(1)
            .or(cap.get(2))
            .or(cap.get(3))
            .or(cap.get(4))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let paren = contract.body.start + whole.end() - 1;
        let Some(paren_close) = match_delimiter(cleaned, paren, '(', ')') else {
            continue;
        };

        // Header runs to the body brace or a terminating semicolon.
        let after = &cleaned[paren_close + 1..contract.body.end.min(paren_close + 1 + 2000)];
        let brace = after.find('{');
        let semi = after.find(';');
        let (head_end, body_range) = match (brace, semi) {
            (Some(b), Some(s)) if s < b => (paren_close + 1 + s, None),
            (Some(b), _) => {
                let open = paren_close + 1 + b;
                match match_delimiter(cleaned, open, '{', '}') {
                    Some(close) => (open, Some(open + 1..close)),
                    None => (open, Some(open + 1..contract.body.end)),
                }
            }
            (None, Some(s)) => (paren_close + 1 + s, None),
            (None, None) => continue,
        };

        let header = RETURNS_CLAUSE
            .replace_all(&cleaned[paren_close + 1..head_end], " ")
            .into_owned();

        let mut visibility = None;
        let mut mutability = Mutability::Nonpayable;
        let mut modifiers = Vec::new();
        for token in header
            .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '$')
            .filter(|t| !t.is_empty())
        {
            match token {
                "public" => visibility = Some(Visibility::Public),
                "external" => visibility = Some(Visibility::External),
                "internal" => visibility = Some(Visibility::Internal),
                "private" => visibility = Some(Visibility::Private),
                "view" | "constant" => mutability = Mutability::View,
                "pure" => mutability = Mutability::Pure,
                "payable" => mutability = Mutability::Payable,
                "virtual" | "override" | "memory" | "storage" | "calldata" | "returns" => {}
                other if other.chars().next().is_some_and(|c| c.is_ascii_digit()) => {}
                other => modifiers.push(other.to_string()),
            }
        }

        let params = parse_params(&cleaned[paren + 1..paren_close]);
        let locals = body_range
            .as_ref()
            .map(|r| parse_locals(&cleaned[r.clone()]))
            .unwrap_or_default();

        // Implicit public is the pre-0.5 default; receive/fallback are
        // always externally reachable.
        let explicit = visibility.is_some();
        let visibility = visibility.unwrap_or(Visibility::Public);

        spans.push(FunctionSpan {
            name,
            visibility,
            explicit_visibility: explicit,
            mutability,
            modifiers,
            params,
            locals,
            head: head_start..head_end,
            body: body_range,
        });
    }
    spans
}

fn parse_params(text: &str) -> Vec<Param> {
    text.split(',')
        .filter_map(|piece| {
            let tokens: Vec<&str> = piece.split_whitespace().collect();
            match tokens.as_slice() {
                [] => None,
                [ty] => Some(Param {
                    ty: ty.to_string(),
                    name: String::new(),
                    storage: false,
                }),
                [ty, .., name] => Some(Param {
                    ty: ty.to_string(),
                    name: name.to_string(),
                    storage: piece.contains(" storage "),
                }),
            }
        })
        .collect()
}

fn parse_locals(body: &str) -> Vec<Param> {
    LOCAL_DECL
        .captures_iter(body)
        .filter_map(|cap| {
            let ty = cap[1].to_string();
            // keywords the type pattern can false-match on
            if matches!(ty.as_str(), "return" | "if" | "for" | "while" | "new" | "emit") {
                return None;
            }
            Some(Param {
                ty,
                name: cap[4].to_string(),
                storage: cap.get(3).is_some_and(|m| m.as_str().trim() == "storage"),
            })
        })
        .collect()
}

/// Extract state variables from one contract, masking function and
/// modifier bodies first so locals never leak in.
pub fn extract_state_variables(cleaned: &str, contract: &ContractSpan) -> Vec<StateVarSpan> {
    let mut body: String = cleaned[contract.body.clone()].to_string();
    for func in extract_functions(cleaned, contract) {
        let start = func.head.start - contract.body.start;
        let end = func.body.as_ref().map_or(func.head.end, |b| b.end + 1) - contract.body.start;
        let limit = body.len();
        mask_range(&mut body, start, end.min(limit));
    }
    let body_start = contract.body.start;
    let modifier_heads: Vec<usize> = MODIFIER_HEAD
        .find_iter(&body)
        .map(|m| m.start())
        .collect();
    for start in modifier_heads {
        if let Some(open) = body[start..].find('{').map(|i| start + i) {
            let end = match_delimiter(&body, open, '{', '}').map_or(body.len(), |c| c + 1);
            mask_range(&mut body, start, end);
        }
    }

    STATE_VAR_DECL
        .captures_iter(&body)
        .filter_map(|cap| {
            let ty = cap[1].trim().to_string();
            if matches!(ty.as_str(), "return" | "emit" | "new") {
                return None;
            }
            let quals = cap.get(3).map_or("", |m| m.as_str());
            let visibility = if quals.contains("public") {
                Visibility::Public
            } else if quals.contains("private") {
                Visibility::Private
            } else {
                Visibility::Internal
            };
            Some(StateVarSpan {
                name: cap[4].to_string(),
                ty,
                visibility,
                explicit_visibility: quals.contains("public")
                    || quals.contains("private")
                    || quals.contains("internal"),
                constant: quals.contains("constant"),
                immutable: quals.contains("immutable"),
                initializer: cap.get(5).map(|m| m.as_str()[1..].trim().to_string()),
                pos: body_start + cap.get(4).expect("name group").start(),
            })
        })
        .collect()
}

// Byte-for-byte masking so every offset outside the range stays valid.
fn mask_range(s: &mut String, start: usize, end: usize) {
    let mut masked = String::with_capacity(end - start);
    for c in s[start..end].chars() {
        if c == '\n' {
            masked.push('\n');
        } else {
            mask(&mut masked, c);
        }
    }
    s.replace_range(start..end, &masked);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
pragma solidity ^0.4.24;

// a wallet
contract Wallet is Ownable, Pausable {
    address public owner;
    uint balance; // implicit internal
    mapping(address => uint) public deposits;
    bool private locked = false;

    modifier onlyOwner() {
        require(msg.sender == owner);
        _;
    }

    function deposit() public payable {
        deposits[msg.sender] += msg.value;
    }

    function withdraw(uint amount) public {
        require(deposits[msg.sender] >= amount, "insufficient");
        msg.sender.call.value(amount)("");
        deposits[msg.sender] -= amount;
    }

    function helper(uint x) internal pure returns (uint) {
        uint doubled = x * 2;
        return doubled;
    }
}

library SafeMath {
    function add(uint a, uint b) internal pure returns (uint) {
        return a + b;
    }
}
"#;

    #[test]
    fn stripping_preserves_length_and_lines() {
        let cleaned = strip_comments_and_strings(SAMPLE);
        assert_eq!(cleaned.len(), SAMPLE.len());
        assert_eq!(
            cleaned.matches('\n').count(),
            SAMPLE.matches('\n').count()
        );
        assert!(!cleaned.contains("a wallet"));
        assert!(!cleaned.contains("insufficient"));
        assert!(cleaned.contains("function withdraw"));
    }

    #[test]
    fn stripping_handles_block_comments_and_escapes() {
        let src = "a /* multi\nline */ b \"str \\\" quote\" c";
        let cleaned = strip_comments_and_strings(src);
        assert_eq!(cleaned.len(), src.len());
        assert!(!cleaned.contains("multi"));
        assert!(!cleaned.contains("quote"));
        assert!(cleaned.contains('a') && cleaned.contains('b') && cleaned.contains('c'));
    }

    #[test]
    fn delimiter_matcher_handles_nesting_and_garbage() {
        let src = "{ a { b } c }";
        assert_eq!(match_delimiter(src, 0, '{', '}'), Some(12));
        assert_eq!(match_delimiter("{ no close", 0, '{', '}'), None);
        assert_eq!(match_delimiter(src, 2, '{', '}'), None);
    }

    #[test]
    fn extracts_contracts_with_inheritance() {
        let cleaned = strip_comments_and_strings(SAMPLE);
        let contracts = extract_contracts(&cleaned);
        assert_eq!(contracts.len(), 2);
        assert_eq!(contracts[0].name, "Wallet");
        assert_eq!(contracts[0].kind, ContractKind::Contract);
        assert_eq!(contracts[0].inherits, vec!["Ownable", "Pausable"]);
        assert_eq!(contracts[1].name, "SafeMath");
        assert_eq!(contracts[1].kind, ContractKind::Library);
    }

    #[test]
    fn extracts_functions_with_visibility_and_modifiers() {
        let cleaned = strip_comments_and_strings(SAMPLE);
        let contracts = extract_contracts(&cleaned);
        let funcs = extract_functions(&cleaned, &contracts[0]);
        let names: Vec<&str> = funcs.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["deposit", "withdraw", "helper"]);

        let deposit = &funcs[0];
        assert_eq!(deposit.visibility, Visibility::Public);
        assert_eq!(deposit.mutability, Mutability::Payable);

        let withdraw = &funcs[1];
        assert!(withdraw.visibility.externally_reachable());
        assert_eq!(withdraw.params.len(), 1);
        assert_eq!(withdraw.params[0].ty, "uint");
        assert_eq!(withdraw.params[0].name, "amount");

        let helper = &funcs[2];
        assert_eq!(helper.visibility, Visibility::Internal);
        assert_eq!(helper.mutability, Mutability::Pure);
        assert_eq!(helper.locals.len(), 1);
        assert_eq!(helper.locals[0].name, "doubled");
    }

    #[test]
    fn implicit_visibility_is_flagged() {
        let src = "contract C { function open(uint x) { } }";
        let cleaned = strip_comments_and_strings(src);
        let contracts = extract_contracts(&cleaned);
        let funcs = extract_functions(&cleaned, &contracts[0]);
        assert_eq!(funcs.len(), 1);
        assert!(!funcs[0].explicit_visibility);
        assert_eq!(funcs[0].visibility, Visibility::Public);
    }

    #[test]
    fn extracts_state_variables_not_locals() {
        let cleaned = strip_comments_and_strings(SAMPLE);
        let contracts = extract_contracts(&cleaned);
        let vars = extract_state_variables(&cleaned, &contracts[0]);
        let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        assert!(names.contains(&"owner"));
        assert!(names.contains(&"balance"));
        assert!(names.contains(&"deposits"));
        assert!(names.contains(&"locked"));
        assert!(!names.contains(&"doubled"), "locals must not leak: {names:?}");

        let balance = vars.iter().find(|v| v.name == "balance").unwrap();
        assert!(!balance.explicit_visibility);
        let locked = vars.iter().find(|v| v.name == "locked").unwrap();
        assert_eq!(locked.visibility, Visibility::Private);
        assert_eq!(locked.initializer.as_deref(), Some("false"));
    }

    #[test]
    fn unterminated_contract_body_is_skipped() {
        let cleaned = strip_comments_and_strings("contract Broken {\n    function f() public {\n");
        assert!(extract_contracts(&cleaned).is_empty());
    }

    #[test]
    fn masking_multibyte_function_bodies_keeps_offsets() {
        let src = "contract Caisse {\n    \
             function débiter() public {\n        uint montanté = 1;\n    }\n    \
             uint stored;\n}\n";
        let cleaned = strip_comments_and_strings(src);
        let contracts = extract_contracts(&cleaned);
        let vars = extract_state_variables(&cleaned, &contracts[0]);
        assert_eq!(vars.len(), 1, "{vars:?}");
        assert_eq!(vars[0].name, "stored");
        // offsets must still index the original source
        assert_eq!(&src[vars[0].pos..vars[0].pos + 6], "stored");
    }

    #[test]
    fn line_numbers_are_original_coordinates() {
        let cleaned = strip_comments_and_strings(SAMPLE);
        let pos = cleaned.find("function withdraw").unwrap();
        assert_eq!(line_of(SAMPLE, pos), line_of(&cleaned, pos));
        let snippet = snippet_at(SAMPLE, pos);
        assert!(snippet.starts_with("function withdraw"));
    }
}
