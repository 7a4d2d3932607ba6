//! Static scanners used by the merge gates
//!
//! - build blockers: type-check suppressions and `any` in TypeScript
//! - intent anti-patterns: phrases an intent contract forbids
//! - UI styling: components that render markup without any styling

use hive_core::IntentContract;
use regex::Regex;
use std::sync::OnceLock;

use crate::rules::any_type_rule;

fn extension(path: &str) -> String {
    path.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

fn is_typescript_path(path: &str) -> bool {
    matches!(extension(path).as_str(), "ts" | "tsx" | "mts" | "cts")
}

fn is_script_path(path: &str) -> bool {
    is_typescript_path(path) || matches!(extension(path).as_str(), "js" | "jsx" | "mjs" | "cjs")
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

fn suppression_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("@ts-ignore suppression", r"@ts-ignore\b"),
            ("@ts-nocheck suppression", r"@ts-nocheck\b"),
            ("file-wide eslint-disable", r"/\*\s*eslint-disable\s*\*/"),
        ]
        .into_iter()
        .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (label, re)))
        .collect()
    })
}

/// Find constructs that would be rejected by the project's type check
///
/// Returns one message per finding kind per file, e.g.
/// `"src/a.ts: @ts-ignore suppression (line 4)"`. Non-script files are skipped.
pub fn scan_build_blockers(path: &str, content: &str) -> Vec<String> {
    if !is_script_path(path) {
        return Vec::new();
    }

    let mut findings: Vec<String> = suppression_patterns()
        .iter()
        .filter_map(|(label, re)| {
            re.find(content)
                .map(|m| format!("{}: {} (line {})", path, label, line_of(content, m.start())))
        })
        .collect();

    if is_typescript_path(path) {
        if let Some(offset) = any_type_rule().first_match(content) {
            findings.push(format!(
                "{}: untyped 'any' (line {})",
                path,
                line_of(content, offset)
            ));
        }
    }

    findings
}

/// Find contract anti-patterns present in any file (case-insensitive)
pub fn scan_anti_patterns<'a, I>(contract: &IntentContract, files: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let patterns: Vec<(String, &str)> = contract
        .anti_patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| (p.to_lowercase(), p))
        .collect();

    if patterns.is_empty() {
        return Vec::new();
    }

    let mut findings = Vec::new();
    for (path, content) in files {
        let haystack = content.to_lowercase();
        for (needle, original) in &patterns {
            if haystack.contains(needle.as_str()) {
                findings.push(format!("{}: contains anti-pattern '{}'", path, original));
            }
        }
    }
    findings
}

fn jsx_element() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<[A-Za-z][\w.]*(?:\s[^<>]*)?/?>").unwrap_or_else(|e| panic!("jsx: {}", e))
    })
}

const STYLE_MARKERS: &[&str] = &[
    "className=",
    "style=",
    "styled.",
    "styled(",
    "css`",
    "tw`",
    "sx=",
    ".css'",
    ".css\"",
    "@apply",
];

fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.contains(".test.") || lower.contains(".spec.") || lower.contains("__tests__/")
}

/// Whether a file is a UI component that renders markup without styling
pub fn is_unstyled_component(path: &str, content: &str) -> bool {
    if !matches!(extension(path).as_str(), "tsx" | "jsx") || is_test_path(path) {
        return false;
    }
    if !jsx_element().is_match(content) {
        return false;
    }
    !STYLE_MARKERS.iter().any(|marker| content.contains(marker))
}

/// Paths of UI components without styling
pub fn find_unstyled_components<'a, I>(files: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    files
        .into_iter()
        .filter(|(path, content)| is_unstyled_component(path, content))
        .map(|(path, _)| path.to_string())
        .collect()
}
