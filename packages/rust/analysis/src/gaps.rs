//! Gap detector: a fixed battery of independent rules over parsed sections.
//!
//! Each rule is a pure function `(text, sections, domain) -> Vec<Gap>`.
//! The id counter is local to the detection call, so concurrent runs never
//! interfere; two runs on identical input differ only in assigned ids.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use promptforge_shared::{
    AmbiguityReport, Gap, GapKind, Language, PromptForgeError, Result, Section, SectionName,
    SectionScore, Severity,
};

use crate::domains;
use crate::sections::parse_sections;

// ---------------------------------------------------------------------------
// Rule patterns (compiled once)
// ---------------------------------------------------------------------------

/// Hedge/filler phrases that leave the actual requirement unstated (EN + TR).
static VAGUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:handle (?:it |this )?appropriately|as needed|as appropriate|as required|if necessary|and so on|somehow|do your best|make it work|make it better|improve the code|etc\.?|uygun şekilde|gerektiği gibi|bir şekilde|vesaire|vb\.)",
    )
    .expect("vague regex")
});

/// Unresolved placeholder syntaxes: `{{var}}`, `[TODO]`, `<INSERT ...>`.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\{\{[^{}]+\}\}|\[(?i:TODO|TBD|FIXME|PLACEHOLDER)[^\]]*\]|<(?i:INSERT)[^<>]*>)")
        .expect("placeholder regex")
});

/// Generic "you are an assistant"-style role statements.
static GENERIC_ROLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:you are (?:a|an) (?:helpful |friendly |general(?:-purpose)? )?(?:ai )?assistant|act as (?:a|an) assistant|sen bir (?:yapay zeka )?asistan(?:sın)?)",
    )
    .expect("generic role regex")
});

/// Seniority/expertise markers that make a role statement specific.
static SPECIFICITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:senior|expert|experienced|specialist|principal|staff|lead|architect|uzman|kıdemli|\d+\+?\s*years?)\b")
        .expect("specificity regex")
});

/// Guardrail concept classes; two or more absent fires the rule.
static GUARDRAIL_CLASSES: LazyLock<[(&'static str, Regex); 3]> = LazyLock::new(|| {
    [
        (
            "injection defense",
            Regex::new(r"(?i)prompt injection|injection attempt|ignore unauthorized|unauthorized instruction|yetkisiz talimat")
                .expect("injection regex"),
        ),
        (
            "personal-data protection",
            Regex::new(r"(?i)\bpii\b|personal data|sensitive data|kişisel veri|redact|anonymi[sz]e|maskele|masking")
                .expect("pii regex"),
        ),
        (
            "unauthorized-request rejection",
            Regex::new(r"(?i)\brefuse\b|\breject\b|\bdecline\b|do not comply|reddet")
                .expect("refusal regex"),
        ),
    ]
});

// ---------------------------------------------------------------------------
// Run-local id generation
// ---------------------------------------------------------------------------

/// Gap id counter scoped to a single detection run.
struct IdGen {
    next: usize,
}

impl IdGen {
    fn new() -> Self {
        Self { next: 0 }
    }

    fn next(&mut self) -> String {
        self.next += 1;
        format!("gap-{}", self.next)
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Detect ambiguities with English descriptions.
pub fn detect(text: &str, domain: Option<&str>) -> Result<AmbiguityReport> {
    detect_localized(text, domain, Language::En)
}

/// Run the full battery and build the report.
pub fn detect_localized(
    text: &str,
    domain: Option<&str>,
    language: Language,
) -> Result<AmbiguityReport> {
    if text.trim().is_empty() {
        return Err(PromptForgeError::input("text must be a non-empty string"));
    }

    let sections = parse_sections(text);
    let mut ids = IdGen::new();
    let mut gaps: Vec<Gap> = Vec::new();

    gaps.extend(vague_instructions(text, &mut ids, language));
    gaps.extend(missing_domain_context(text, domain, &mut ids, language));
    gaps.extend(undefined_variables(text, &mut ids, language));
    gaps.extend(thin_sections(&sections, &mut ids, language));
    gaps.extend(missing_best_practices(text, domain, &mut ids, language));
    gaps.extend(missing_guardrails(text, &mut ids, language));
    gaps.extend(generic_role(text, &mut ids, language));

    reattribute(&mut gaps, &sections);

    // Rank by severity; stable so same-severity gaps keep rule order.
    gaps.sort_by_key(|g| std::cmp::Reverse(g.severity.weight()));

    let section_scores = sections
        .iter()
        .map(|s| {
            let gap_count = gaps.iter().filter(|g| g.section == s.name).count();
            SectionScore::compute(s.name, s.word_count(), gap_count)
        })
        .collect();

    let ambiguity_score = AmbiguityReport::score_for(&gaps);
    debug!(
        gaps = gaps.len(),
        score = ambiguity_score,
        "gap detection complete"
    );

    Ok(AmbiguityReport {
        total_gaps: gaps.len(),
        ambiguity_score,
        section_scores,
        gaps,
    })
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn vague_instructions(text: &str, ids: &mut IdGen, language: Language) -> Vec<Gap> {
    VAGUE_RE
        .find_iter(text)
        .map(|m| {
            let excerpt = m.as_str().to_string();
            Gap {
                id: ids.next(),
                kind: GapKind::VagueInstruction,
                section: SectionName::Global,
                severity: Severity::Medium,
                description: match language {
                    Language::En => format!("vague instruction: \"{excerpt}\""),
                    Language::Tr => format!("belirsiz talimat: \"{excerpt}\""),
                },
                search_query: format!("concrete instructions instead of {excerpt}"),
                excerpt: Some(excerpt),
            }
        })
        .collect()
}

fn missing_domain_context(
    text: &str,
    domain: Option<&str>,
    ids: &mut IdGen,
    language: Language,
) -> Vec<Gap> {
    let Some(domain) = domain.filter(|d| !domains::is_generic(d)) else {
        return Vec::new();
    };
    let Some(keywords) = domains::domain_keywords(domain) else {
        return Vec::new();
    };

    let coverage = domains::keyword_coverage(text, keywords);
    if coverage >= 0.2 {
        return Vec::new();
    }

    vec![Gap {
        id: ids.next(),
        kind: GapKind::MissingContext,
        section: SectionName::Global,
        severity: Severity::High,
        description: match language {
            Language::En => format!(
                "prompt barely references the {domain} domain (keyword coverage {:.0}%)",
                coverage * 100.0
            ),
            Language::Tr => format!(
                "prompt {domain} alanına neredeyse hiç değinmiyor (kapsam %{:.0})",
                coverage * 100.0
            ),
        },
        excerpt: None,
        search_query: format!("{domain} domain context and requirements"),
    }]
}

fn undefined_variables(text: &str, ids: &mut IdGen, language: Language) -> Vec<Gap> {
    PLACEHOLDER_RE
        .find_iter(text)
        .map(|m| {
            let excerpt = m.as_str().to_string();
            Gap {
                id: ids.next(),
                kind: GapKind::UndefinedVariable,
                section: SectionName::Global,
                severity: Severity::High,
                description: match language {
                    Language::En => format!("unresolved placeholder: {excerpt}"),
                    Language::Tr => format!("çözülmemiş yer tutucu: {excerpt}"),
                },
                search_query: format!("definition for placeholder {excerpt}"),
                excerpt: Some(excerpt),
            }
        })
        .collect()
}

fn thin_sections(sections: &[Section], ids: &mut IdGen, language: Language) -> Vec<Gap> {
    sections
        .iter()
        .filter(|s| s.word_count() < s.name.min_words())
        .map(|s| Gap {
            id: ids.next(),
            kind: GapKind::ThinSection,
            section: s.name,
            severity: Severity::Medium,
            description: match language {
                Language::En => format!(
                    "{} section is thin ({} words, expected at least {})",
                    s.name,
                    s.word_count(),
                    s.name.min_words()
                ),
                Language::Tr => format!(
                    "{} bölümü zayıf ({} kelime, en az {} bekleniyor)",
                    s.name,
                    s.word_count(),
                    s.name.min_words()
                ),
            },
            excerpt: None,
            search_query: format!("{} section template content", s.name),
        })
        .collect()
}

fn missing_best_practices(
    text: &str,
    domain: Option<&str>,
    ids: &mut IdGen,
    language: Language,
) -> Vec<Gap> {
    let Some(domain) = domain.filter(|d| !domains::is_generic(d)) else {
        return Vec::new();
    };
    let Some(checklist) = domains::best_practices(domain) else {
        return Vec::new();
    };

    let absent = 1.0 - domains::keyword_coverage(text, checklist);
    if absent < 0.6 {
        return Vec::new();
    }

    vec![Gap {
        id: ids.next(),
        kind: GapKind::MissingBestPractice,
        section: SectionName::Global,
        severity: Severity::Medium,
        description: match language {
            Language::En => format!(
                "most {domain} best practices are absent ({:.0}% of checklist missing)",
                absent * 100.0
            ),
            Language::Tr => format!(
                "{domain} en iyi uygulamalarının çoğu eksik (listenin %{:.0}'i yok)",
                absent * 100.0
            ),
        },
        excerpt: None,
        search_query: format!("{domain} best practices checklist"),
    }]
}

fn missing_guardrails(text: &str, ids: &mut IdGen, language: Language) -> Vec<Gap> {
    let absent: Vec<&str> = GUARDRAIL_CLASSES
        .iter()
        .filter(|(_, re)| !re.is_match(text))
        .map(|(name, _)| *name)
        .collect();

    if absent.len() < 2 {
        return Vec::new();
    }

    vec![Gap {
        id: ids.next(),
        kind: GapKind::MissingGuardrails,
        section: SectionName::Global,
        severity: Severity::High,
        description: match language {
            Language::En => format!("missing guardrails: {}", absent.join(", ")),
            Language::Tr => format!("eksik güvenlik önlemleri: {}", absent.join(", ")),
        },
        excerpt: None,
        search_query: "security guardrails prompt injection defense".into(),
    }]
}

fn generic_role(text: &str, ids: &mut IdGen, language: Language) -> Vec<Gap> {
    let Some(m) = GENERIC_ROLE_RE.find(text) else {
        return Vec::new();
    };
    if SPECIFICITY_RE.is_match(text) {
        return Vec::new();
    }

    let excerpt = m.as_str().to_string();
    vec![Gap {
        id: ids.next(),
        kind: GapKind::GenericRole,
        section: SectionName::Global,
        severity: Severity::Medium,
        description: match language {
            Language::En => "role definition is generic; no seniority or expertise markers".into(),
            Language::Tr => "rol tanımı genel; kıdem veya uzmanlık belirteci yok".into(),
        },
        search_query: "expert role definition with seniority".into(),
        excerpt: Some(excerpt),
    }]
}

// ---------------------------------------------------------------------------
// Re-attribution
// ---------------------------------------------------------------------------

/// Move GLOBAL gaps into the named section that actually contains their
/// excerpt. Rules that scan the whole text report GLOBAL; this resolves them.
fn reattribute(gaps: &mut [Gap], sections: &[Section]) {
    for gap in gaps.iter_mut() {
        if gap.section != SectionName::Global {
            continue;
        }
        let Some(excerpt) = &gap.excerpt else {
            continue;
        };
        if let Some(section) = sections
            .iter()
            .find(|s| s.name != SectionName::Global && s.content.contains(excerpt.as_str()))
        {
            gap.section = section.name;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
