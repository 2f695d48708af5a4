//! Domain knowledge tables: keyword lists, best-practice checklists, and
//! role labels used by the gap detector and the agent battery.

use promptforge_shared::Language;

/// Domains with dedicated keyword and best-practice tables.
pub const KNOWN_DOMAINS: &[&str] = &[
    "backend",
    "frontend",
    "ui-design",
    "architecture",
    "analysis",
    "testing",
    "image-video",
];

/// True for tags that carry no domain signal ("general", "auto", unset).
pub fn is_generic(domain: &str) -> bool {
    matches!(domain, "general" | "auto" | "")
}

/// Coverage keywords for the missing-context rule.
///
/// A known-domain prompt mentioning fewer than 20% of these is flagged.
pub fn domain_keywords(domain: &str) -> Option<&'static [&'static str]> {
    let list: &[&str] = match domain {
        "backend" => &[
            "api", "endpoint", "database", "schema", "server", "auth", "cache", "queue",
            "transaction", "latency",
        ],
        "frontend" => &[
            "component", "ui", "css", "state", "responsive", "accessibility", "render",
            "browser", "layout", "interaction",
        ],
        "ui-design" => &[
            "layout", "typography", "color", "spacing", "hierarchy", "contrast", "wireframe",
            "accessibility",
        ],
        "architecture" => &[
            "service", "boundary", "scalability", "coupling", "dependency", "deployment",
            "resilience", "tradeoff",
        ],
        "analysis" => &[
            "requirement", "stakeholder", "scope", "acceptance", "metric", "assumption",
            "constraint", "risk",
        ],
        "testing" => &[
            "test", "assertion", "coverage", "regression", "fixture", "mock", "edge case",
            "scenario",
        ],
        "image-video" => &[
            "resolution", "aspect", "style", "composition", "lighting", "camera", "frame",
            "palette",
        ],
        _ => return None,
    };
    Some(list)
}

/// Best-practice checklist for the missing-best-practice rule.
///
/// When 60% or more of these are absent from the text, one medium gap fires.
pub fn best_practices(domain: &str) -> Option<&'static [&'static str]> {
    let list: &[&str] = match domain {
        "backend" => &[
            "error handling", "validation", "idempoten", "pagination", "rate limit", "logging",
        ],
        "frontend" => &[
            "accessibility", "responsive", "loading state", "error state", "keyboard",
            "performance",
        ],
        "ui-design" => &["contrast", "consistency", "feedback", "affordance", "grid"],
        "architecture" => &[
            "single responsibility", "loose coupling", "observability", "failure mode",
            "versioning",
        ],
        "analysis" => &[
            "acceptance criteria", "edge case", "assumption", "traceability", "priorit",
        ],
        "testing" => &[
            "arrange", "edge case", "negative test", "determinis", "isolation", "coverage",
        ],
        "image-video" => &["negative prompt", "aspect ratio", "seed", "style reference"],
        _ => return None,
    };
    Some(list)
}

/// Expert role label injected by agent-mode auto-fixes.
pub fn role_label(domain: &str, language: Language) -> &'static str {
    match (domain, language) {
        ("backend", Language::En) => "backend developer and system architect",
        ("backend", Language::Tr) => "backend geliştirici ve sistem mimarı",
        ("frontend", Language::En) => "frontend developer and UI/UX specialist",
        ("frontend", Language::Tr) => "frontend geliştirici ve UI/UX uzmanı",
        ("ui-design", Language::En) => "UI/UX designer",
        ("ui-design", Language::Tr) => "UI/UX tasarımcısı",
        ("architecture", Language::En) => "software architect",
        ("architecture", Language::Tr) => "yazılım mimarı",
        ("analysis", Language::En) => "business analyst and requirements engineer",
        ("analysis", Language::Tr) => "iş analisti ve gereksinim mühendisi",
        ("testing", Language::En) => "QA engineer and security test specialist",
        ("testing", Language::Tr) => "QA mühendisi ve güvenlik test uzmanı",
        ("image-video", Language::En) => "visual/video AI prompt engineer",
        ("image-video", Language::Tr) => "görsel/video AI prompt mühendisi",
        (_, Language::En) => "AI assistant and consultant",
        (_, Language::Tr) => "yapay zeka asistanı ve danışman",
    }
}

/// Fraction of `keywords` that occur (case-insensitively) in `text`.
pub fn keyword_coverage(text: &str, keywords: &[&str]) -> f32 {
    if keywords.is_empty() {
        return 1.0;
    }
    let lower = text.to_lowercase();
    let found = keywords.iter().filter(|k| lower.contains(*k)).count();
    found as f32 / keywords.len() as f32
}
