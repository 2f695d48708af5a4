//! Core domain types for the PromptForge enrichment pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline invocation (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// The fixed vocabulary of prompt section names.
///
/// `Global` holds pre-heading content, and the whole text when no headings
/// exist at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionName {
    System,
    Developer,
    User,
    Global,
}

impl SectionName {
    /// Canonical uppercase label, as written in headings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Developer => "DEVELOPER",
            Self::User => "USER",
            Self::Global => "GLOBAL",
        }
    }

    /// Match a heading title against the vocabulary (case-insensitive,
    /// substring match — `## SYSTEM PROMPT` still counts as SYSTEM).
    pub fn from_heading(title: &str) -> Option<Self> {
        let upper = title.to_uppercase();
        if upper.contains("SYSTEM") {
            Some(Self::System)
        } else if upper.contains("DEVELOPER") {
            Some(Self::Developer)
        } else if upper.contains("USER") {
            Some(Self::User)
        } else {
            None
        }
    }

    /// Minimum word count below which a section is considered thin.
    pub fn min_words(&self) -> usize {
        match self {
            Self::System => 30,
            Self::Developer => 50,
            Self::User => 20,
            Self::Global => 50,
        }
    }
}

impl std::fmt::Display for SectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, labeled region of the input text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Section label.
    pub name: SectionName,
    /// Section body (heading line excluded).
    pub content: String,
    /// Byte offset of the section start in the source text.
    pub start_offset: usize,
}

impl Section {
    /// Whitespace-separated word count of the section body.
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------
// Gaps
// ---------------------------------------------------------------------------

/// The category of deficiency a detection rule reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    VagueInstruction,
    MissingContext,
    UndefinedVariable,
    ThinSection,
    MissingBestPractice,
    MissingGuardrails,
    GenericRole,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VagueInstruction => "vague_instruction",
            Self::MissingContext => "missing_context",
            Self::UndefinedVariable => "undefined_variable",
            Self::ThinSection => "thin_section",
            Self::MissingBestPractice => "missing_best_practice",
            Self::MissingGuardrails => "missing_guardrails",
            Self::GenericRole => "generic_role",
        }
    }
}

/// Gap severity, weighted into the aggregate ambiguity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Contribution of one gap of this severity to the ambiguity score.
    pub fn weight(&self) -> u32 {
        match self {
            Self::High => 15,
            Self::Medium => 8,
            Self::Low => 3,
        }
    }
}

/// A detected deficiency in the input text.
///
/// Ids are unique within one detection run only; the counter resets at the
/// start of every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    /// Run-unique identifier (`gap-1`, `gap-2`, ...).
    pub id: String,
    /// Which rule fired.
    pub kind: GapKind,
    /// The section the gap is attributed to.
    pub section: SectionName,
    /// Severity class.
    pub severity: Severity,
    /// Human-readable description (localized).
    pub description: String,
    /// Literal matched substring, when the rule matched one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Query used by the retriever to find filling material.
    pub search_query: String,
}

/// Extended gap produced by the agent-mode battery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepGap {
    /// The underlying gap record.
    #[serde(flatten)]
    pub gap: Gap,
    /// Mechanical replacement text, applied without model involvement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fix: Option<String>,
    /// 1..=5; 1 is applied first.
    pub priority: u8,
    /// Query used for corpus enrichment (may differ from `search_query`).
    pub enrichment_query: String,
}

// ---------------------------------------------------------------------------
// Ambiguity report
// ---------------------------------------------------------------------------

/// Per-section quality score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionScore {
    pub section: SectionName,
    pub word_count: usize,
    pub gap_count: usize,
    /// `max(0, 100 - 15 * gap_count)`.
    pub score: u32,
}

impl SectionScore {
    pub fn compute(section: SectionName, word_count: usize, gap_count: usize) -> Self {
        let score = 100u32.saturating_sub(15 * gap_count as u32);
        Self {
            section,
            word_count,
            gap_count,
            score,
        }
    }
}

/// Output of the gap detector: ranked gaps plus aggregate scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguityReport {
    pub gaps: Vec<Gap>,
    /// `min(100, Σ severity weight)`; 0 iff `gaps` is empty.
    pub ambiguity_score: u32,
    pub section_scores: Vec<SectionScore>,
    pub total_gaps: usize,
}

impl AmbiguityReport {
    /// Severity-weighted aggregate score for a gap list.
    pub fn score_for(gaps: &[Gap]) -> u32 {
        let sum: u32 = gaps.iter().map(|g| g.severity.weight()).sum();
        sum.min(100)
    }

    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// A retrieved fragment from the reference corpus proposed for insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentCandidate {
    /// Corpus entry id. Deduplication key.
    pub prompt_id: String,
    pub name: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Normalized relevance in `[0, 1]`.
    pub relevance_score: f32,
    /// Section the candidate should be merged into.
    pub target_section: SectionName,
    /// Gap this candidate was retrieved for (None for broad-phase hits).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_gap_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Pipeline mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentMode {
    Off,
    Fast,
    Deep,
    Agent,
}

impl std::str::FromStr for EnrichmentMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "fast" => Ok(Self::Fast),
            "deep" => Ok(Self::Deep),
            "agent" => Ok(Self::Agent),
            other => Err(format!(
                "unknown mode '{other}': expected off, fast, deep, or agent"
            )),
        }
    }
}

impl std::fmt::Display for EnrichmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::Fast => "fast",
            Self::Deep => "deep",
            Self::Agent => "agent",
        };
        f.write_str(s)
    }
}

/// Output language for descriptions and injected scaffold blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Tr,
}

impl Default for Language {
    fn default() -> Self {
        Self::En
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" => Ok(Self::En),
            "tr" => Ok(Self::Tr),
            other => Err(format!("unknown language '{other}': expected en or tr")),
        }
    }
}

/// Tunables for one enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentOptions {
    pub mode: EnrichmentMode,
    pub max_candidates_per_gap: usize,
    pub max_total_candidates: usize,
    pub max_token_budget: usize,
    pub min_relevance_score: f32,
    pub language: Language,
    /// Domain tag (e.g., "backend", "frontend"); None for generic text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            mode: EnrichmentMode::Fast,
            max_candidates_per_gap: 3,
            max_total_candidates: 8,
            max_token_budget: 500,
            min_relevance_score: 0.65,
            language: Language::En,
            domain: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Final pipeline metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentMetrics {
    /// Estimated token difference between enriched and original text.
    pub token_delta: i64,
    /// Distinct sections that received merged content.
    pub sections_touched: Vec<SectionName>,
    /// Wall-clock duration of the whole call.
    pub elapsed_ms: u64,
}

/// Agent-mode loop metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub gaps_found: usize,
    pub auto_fixes_applied: usize,
    pub candidates_scanned: usize,
    /// Judge score of the text before the loop (None if judging failed).
    pub judge_score_before: Option<u32>,
    /// Judge score of the returned text.
    pub judge_score_after: Option<u32>,
    /// Ambiguity score of the original text.
    pub ambiguity_before: u32,
    /// Ambiguity score of the returned text.
    pub ambiguity_after: u32,
    pub iterations: usize,
    pub target_reached: bool,
}

/// Output of `enrich_master_prompt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub run_id: RunId,
    pub enriched_text: String,
    pub original_text: String,
    pub ambiguity_report: AmbiguityReport,
    pub candidates_found: usize,
    pub integrated_candidates: usize,
    pub metrics: EnrichmentMetrics,
    pub mode: EnrichmentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_metrics: Option<AgentMetrics>,
    pub finished_at: DateTime<Utc>,
}
