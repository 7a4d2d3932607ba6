//! Worker specializations and the keyword routing table

use serde::{Deserialize, Serialize};

/// Domain owned by one queen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueenDomain {
    Infrastructure,
    Development,
    Design,
    Quality,
}

impl QueenDomain {
    pub const ALL: [QueenDomain; 4] = [
        Self::Infrastructure,
        Self::Development,
        Self::Design,
        Self::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::Development => "development",
            Self::Design => "design",
            Self::Quality => "quality",
        }
    }

    /// Worker specializations in registration order
    pub fn specializations(&self) -> [Specialization; 4] {
        use Specialization::*;
        match self {
            Self::Infrastructure => [
                DatabaseArchitect,
                ApiEngineer,
                AuthSpecialist,
                IntegrationEngineer,
            ],
            Self::Development => [
                FrontendEngineer,
                BackendEngineer,
                StateManager,
                PerformanceOptimizer,
            ],
            Self::Design => [
                UiDesigner,
                UxSpecialist,
                AnimationEngineer,
                AccessibilityExpert,
            ],
            Self::Quality => [
                TestEngineer,
                CodeReviewer,
                SecurityAuditor,
                DocumentationWriter,
            ],
        }
    }
}

impl std::fmt::Display for QueenDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueenDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "infrastructure" | "infra" => Ok(Self::Infrastructure),
            "development" | "dev" => Ok(Self::Development),
            "design" => Ok(Self::Design),
            "quality" | "qa" => Ok(Self::Quality),
            _ => Err(format!("Invalid queen domain: {}", s)),
        }
    }
}

/// What a worker is specialized in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Specialization {
    DatabaseArchitect,
    ApiEngineer,
    AuthSpecialist,
    IntegrationEngineer,
    FrontendEngineer,
    BackendEngineer,
    StateManager,
    PerformanceOptimizer,
    UiDesigner,
    UxSpecialist,
    AnimationEngineer,
    AccessibilityExpert,
    TestEngineer,
    CodeReviewer,
    SecurityAuditor,
    DocumentationWriter,
}

impl Specialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseArchitect => "database-architect",
            Self::ApiEngineer => "api-engineer",
            Self::AuthSpecialist => "auth-specialist",
            Self::IntegrationEngineer => "integration-engineer",
            Self::FrontendEngineer => "frontend-engineer",
            Self::BackendEngineer => "backend-engineer",
            Self::StateManager => "state-manager",
            Self::PerformanceOptimizer => "performance-optimizer",
            Self::UiDesigner => "ui-designer",
            Self::UxSpecialist => "ux-specialist",
            Self::AnimationEngineer => "animation-engineer",
            Self::AccessibilityExpert => "accessibility-expert",
            Self::TestEngineer => "test-engineer",
            Self::CodeReviewer => "code-reviewer",
            Self::SecurityAuditor => "security-auditor",
            Self::DocumentationWriter => "documentation-writer",
        }
    }

    pub fn domain(&self) -> QueenDomain {
        QueenDomain::ALL
            .into_iter()
            .find(|d| d.specializations().contains(self))
            .unwrap_or(QueenDomain::Development)
    }

    /// Routing keywords; a task scores the summed length of those it contains
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::DatabaseArchitect => &[
                "database", "schema", "migration", "sql", "postgres", "index", "query", "table",
            ],
            Self::ApiEngineer => &["api", "endpoint", "rest", "graphql", "route", "http", "webhook"],
            Self::AuthSpecialist => &[
                "auth", "login", "oauth", "session", "jwt", "password", "permission", "token",
            ],
            Self::IntegrationEngineer => &[
                "integration", "third-party", "stripe", "sdk", "payment", "email", "queue",
            ],
            Self::FrontendEngineer => &[
                "frontend", "react", "component", "page", "form", "client-side", "render",
            ],
            Self::BackendEngineer => &[
                "backend", "server", "service", "business logic", "worker", "cron", "handler",
            ],
            Self::StateManager => &["state", "store", "redux", "zustand", "cache", "context", "sync"],
            Self::PerformanceOptimizer => &[
                "performance", "optimize", "latency", "memory", "bundle", "lazy", "profil",
            ],
            Self::UiDesigner => &[
                "design system", "visual", "color", "typography", "theme", "layout", "style",
                "tailwind",
            ],
            Self::UxSpecialist => &[
                "ux", "user flow", "onboarding", "navigation", "usability", "wireframe", "journey",
            ],
            Self::AnimationEngineer => &[
                "animation", "animate", "transition", "motion", "framer", "keyframe", "gesture",
            ],
            Self::AccessibilityExpert => &[
                "accessibility", "a11y", "aria", "screen reader", "contrast", "keyboard", "wcag",
            ],
            Self::TestEngineer => &[
                "test", "spec", "coverage", "e2e", "unit", "jest", "playwright", "fixture",
            ],
            Self::CodeReviewer => &[
                "review", "refactor", "lint", "code quality", "clean up", "readability",
            ],
            Self::SecurityAuditor => &[
                "security", "vulnerability", "xss", "csrf", "injection", "audit", "sanitize",
            ],
            Self::DocumentationWriter => &[
                "documentation", "docs", "readme", "guide", "changelog", "comment", "tutorial",
            ],
        }
    }

    /// Summed length of the keywords found in already-lowercased `text`
    pub fn score(&self, text: &str) -> usize {
        self.keywords()
            .iter()
            .filter(|keyword| text.contains(*keyword))
            .map(|keyword| keyword.len())
            .sum()
    }

    /// One-line role used in the system prompt
    pub fn role(&self) -> &'static str {
        match self {
            Self::DatabaseArchitect => "a database architect who designs schemas, migrations and queries",
            Self::ApiEngineer => "an API engineer who builds typed, validated HTTP endpoints",
            Self::AuthSpecialist => "an authentication specialist who implements sessions, OAuth and access control",
            Self::IntegrationEngineer => "an integration engineer who wires third-party services behind clean adapters",
            Self::FrontendEngineer => "a frontend engineer who builds React components and pages",
            Self::BackendEngineer => "a backend engineer who writes services, handlers and background jobs",
            Self::StateManager => "a state management engineer who designs stores, caching and synchronization",
            Self::PerformanceOptimizer => "a performance engineer who reduces latency, memory use and bundle size",
            Self::UiDesigner => "a UI designer who implements design systems, typography and themes in code",
            Self::UxSpecialist => "a UX specialist who implements navigation, onboarding and user flows",
            Self::AnimationEngineer => "an animation engineer who builds transitions and motion",
            Self::AccessibilityExpert => "an accessibility expert who makes interfaces WCAG compliant",
            Self::TestEngineer => "a test engineer who writes unit, integration and end-to-end tests",
            Self::CodeReviewer => "a code reviewer who refactors code for clarity and correctness",
            Self::SecurityAuditor => "a security auditor who fixes injection, XSS and CSRF vulnerabilities",
            Self::DocumentationWriter => "a documentation writer who produces READMEs, guides and API docs",
        }
    }
}

impl std::fmt::Display for Specialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Specialization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase();
        QueenDomain::ALL
            .iter()
            .flat_map(|d| d.specializations())
            .find(|spec| spec.as_str() == wanted)
            .ok_or_else(|| format!("Invalid specialization: {}", s))
    }
}

/// Pick the specialization with the strictly highest score
///
/// Returns `None` when nothing scores or the top score is shared.
pub fn select_specialization(domain: QueenDomain, text: &str) -> Option<(Specialization, usize)> {
    let scores: Vec<(Specialization, usize)> = domain
        .specializations()
        .into_iter()
        .map(|spec| (spec, spec.score(text)))
        .collect();

    let best = scores.iter().map(|(_, score)| *score).max().unwrap_or(0);
    if best == 0 {
        return None;
    }

    let mut leaders = scores.into_iter().filter(|(_, score)| *score == best);
    let leader = leaders.next()?;
    match leaders.next() {
        Some(_) => None,
        None => Some(leader),
    }
}
