//! Content rules for generated artifacts
//!
//! Each rule flags a pattern that marks output as unfinished or unsafe to
//! ship: placeholder markers, demo credentials, filler text. Matching is
//! case-insensitive except for the `any` type rule, which only applies to
//! TypeScript and matches the lowercase keyword.

use regex::Regex;
use std::sync::OnceLock;

/// Extra check run on a regex match; `true` means the match is allowed
type AllowFn = fn(content: &str, start: usize, end: usize) -> bool;

/// A single content rule
pub struct ContentRule {
    /// Stable rule name (used in logs and tests)
    pub name: &'static str,
    /// Human-readable message recorded on the artifact
    pub message: &'static str,
    pattern: Regex,
    allow: Option<AllowFn>,
}

impl ContentRule {
    fn new(name: &'static str, message: &'static str, pattern: &str) -> Self {
        Self {
            name,
            message,
            // Module literals only; see test_all_rules_compile.
            pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("rule {}: {}", name, e)),
            allow: None,
        }
    }

    fn with_allow(mut self, allow: AllowFn) -> Self {
        self.allow = Some(allow);
        self
    }

    /// Byte offset of the first disallowed match, if any
    pub fn first_match(&self, content: &str) -> Option<usize> {
        self.pattern
            .find_iter(content)
            .find(|m| match self.allow {
                Some(allow) => !allow(content, m.start(), m.end()),
                None => true,
            })
            .map(|m| m.start())
    }
}

/// `placeholder=` / `placeholder:` props and the `::placeholder` CSS
/// pseudo-element are legitimate UI code, not unfinished markers.
fn placeholder_is_attribute(content: &str, start: usize, end: usize) -> bool {
    let after = content[end..].trim_start();
    let before = &content[..start];
    after.starts_with('=') || after.starts_with(':') || before.ends_with("::")
}

/// Rules applied to every artifact
pub fn content_rules() -> &'static [ContentRule] {
    static RULES: OnceLock<Vec<ContentRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            ContentRule::new("todo", "Contains TODO comment (TODO:)", r"(?i)\btodo:"),
            ContentRule::new("fixme", "Contains FIXME comment (FIXME:)", r"(?i)\bfixme:"),
            ContentRule::new(
                "placeholder",
                "Contains PLACEHOLDER marker",
                r"(?i)\bplaceholder\b",
            )
            .with_allow(placeholder_is_attribute),
            ContentRule::new(
                "double-bracket",
                "Contains [[...]] template placeholder",
                r"\[\[\s*[A-Za-z_][\w .-]*\]\]",
            ),
            ContentRule::new(
                "double-brace",
                "Contains {{...}} template placeholder",
                r"\{\{\s*[A-Za-z_][\w .-]*\}\}",
            ),
            ContentRule::new(
                "your-placeholder",
                "Contains <your-...> placeholder",
                r"(?i)<your[-_][^>]*>",
            ),
            ContentRule::new("example-domain", "References example.com", r"(?i)example\.com"),
            ContentRule::new("test-key", "Contains test-key placeholder", r"(?i)\btest-key\b"),
            ContentRule::new(
                "mock-id",
                "Contains mock-*-id placeholder identifier",
                r"(?i)\bmock-[a-z0-9_-]+-id\b",
            ),
            ContentRule::new(
                "test-api-key",
                "Contains test-mode API key",
                r"(?i)\b(?:sk|pk|rk)_test_[a-z0-9]*",
            ),
            ContentRule::new(
                "demo-secret",
                "Contains hardcoded demo password or secret",
                r#"(?i)(?:password|passwd|secret|api_?key|token)["']?\s*[:=]\s*["'](?:password|password123|123456|12345678|admin|secret|changeme|demo|test|letmein|qwerty)["']"#,
            ),
            ContentRule::new("lorem-ipsum", "Contains lorem ipsum filler text", r"(?i)lorem\s+ipsum"),
        ]
    })
}

/// Rule applied only to statically-typed (TypeScript) artifacts
pub fn any_type_rule() -> &'static ContentRule {
    static RULE: OnceLock<ContentRule> = OnceLock::new();
    RULE.get_or_init(|| {
        ContentRule::new(
            "any-type",
            "Uses untyped 'any' type annotation",
            r"(?::\s*any\b|\bas\s+any\b|<any>|\bany\[\])",
        )
    })
}

/// Whether a language tag names the statically-typed variant
pub fn is_statically_typed(language: &str) -> bool {
    matches!(
        language.to_lowercase().as_str(),
        "typescript" | "ts" | "tsx"
    )
}
