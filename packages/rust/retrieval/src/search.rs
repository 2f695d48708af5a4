//! Hybrid candidate retrieval.
//!
//! Two phases feed one candidate pool: a broad query built from the head of
//! the prompt, then one query per detected gap. Each query goes through the
//! vector index when it is usable and falls back to lexical substring
//! scoring otherwise. A three-rung threshold ladder picks the final set so
//! a sparse library still yields material.

use std::sync::Arc;

use tracing::{debug, instrument};

use promptforge_shared::{EnrichmentCandidate, EnrichmentOptions, Gap, SectionName};

use crate::corpus::Corpus;
use crate::embedding::{EmbeddingCache, EmbeddingProvider};
use crate::index::{VectorIndex, try_embed_query};

/// Character budget for the broad query.
const BROAD_QUERY_CHARS: usize = 500;

/// Candidate cap for the broad phase.
const BROAD_CANDIDATES: usize = 5;

/// Only this many gaps (in report order, most severe first) get queries.
const TOP_GAPS: usize = 8;

/// Raw lexical bonus when the domain name occurs in an entry.
const LEXICAL_DOMAIN_BONUS: f32 = 0.5;

/// Post-dedup boost for a category match on the run's domain.
const CATEGORY_BOOST: f32 = 0.10;

/// Post-dedup boost for a tag match on the run's domain.
const TAG_BOOST: f32 = 0.15;

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

/// Candidate retriever with injected collaborator handles.
///
/// The corpus, provider, index, and cache are constructed by the caller and
/// passed in; the retriever never reaches for process-global state. A
/// missing provider or index simply means every query scores lexically.
pub struct Retriever {
    corpus: Arc<Corpus>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
    cache: Arc<EmbeddingCache>,
}

impl Retriever {
    pub fn new(
        corpus: Arc<Corpus>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        index: Option<Arc<dyn VectorIndex>>,
        cache: Arc<EmbeddingCache>,
    ) -> Self {
        Self {
            corpus,
            provider,
            index,
            cache,
        }
    }

    /// A retriever with no embedding collaborators; every query is lexical.
    pub fn lexical_only(corpus: Arc<Corpus>) -> Self {
        Self::new(corpus, None, None, Arc::new(EmbeddingCache::new()))
    }

    /// Run both phases and the threshold ladder.
    #[instrument(skip_all, fields(gaps = gaps.len(), corpus = self.corpus.len()))]
    pub async fn search(
        &self,
        text: &str,
        gaps: &[Gap],
        options: &EnrichmentOptions,
    ) -> Vec<EnrichmentCandidate> {
        if self.corpus.is_empty() {
            debug!("empty library, nothing to retrieve");
            return Vec::new();
        }

        let mut pool: Vec<EnrichmentCandidate> = Vec::new();

        // Broad phase: head of the prompt, widened with the domain tag.
        let mut broad: String = text.chars().take(BROAD_QUERY_CHARS).collect();
        if let Some(domain) = options.domain.as_deref() {
            broad.push(' ');
            broad.push_str(domain);
        }
        pool.extend(
            self.score_query(&broad, BROAD_CANDIDATES, SectionName::Global, None, options)
                .await,
        );

        // Gap phase: one query per gap, most severe first.
        for gap in gaps.iter().take(TOP_GAPS) {
            pool.extend(
                self.score_query(
                    &gap.search_query,
                    options.max_candidates_per_gap,
                    gap.section,
                    Some(gap.id.clone()),
                    options,
                )
                .await,
            );
        }

        let deduped = dedup_by_prompt_id(pool);
        let boosted = apply_domain_boost(deduped, options.domain.as_deref());
        select_by_ladder(boosted, options)
    }

    /// Score one query against the whole library, vector-first.
    async fn score_query(
        &self,
        query: &str,
        limit: usize,
        target_section: SectionName,
        target_gap_id: Option<String>,
        options: &EnrichmentOptions,
    ) -> Vec<EnrichmentCandidate> {
        if let (Some(provider), Some(index)) = (&self.provider, &self.index) {
            if index.is_ready() && index.count() > 0 {
                if let Some(vector) = try_embed_query(provider.as_ref(), &self.cache, query).await {
                    let hits = index.search(&vector, limit);
                    return hits
                        .into_iter()
                        .filter_map(|(id, score)| {
                            self.corpus.get(&id).map(|entry| {
                                candidate(entry, score, target_section, target_gap_id.clone())
                            })
                        })
                        .collect();
                }
            }
        }

        // Lexical fallback.
        let mut scored: Vec<(f32, &crate::corpus::CorpusEntry)> = self
            .corpus
            .entries()
            .iter()
            .map(|entry| {
                (
                    lexical_score(query, &entry.haystack(), options.domain.as_deref()),
                    entry,
                )
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(limit)
            .map(|(score, entry)| candidate(entry, score, target_section, target_gap_id.clone()))
            .collect()
    }
}

fn candidate(
    entry: &crate::corpus::CorpusEntry,
    relevance_score: f32,
    target_section: SectionName,
    target_gap_id: Option<String>,
) -> EnrichmentCandidate {
    EnrichmentCandidate {
        prompt_id: entry.id.clone(),
        name: entry.name.clone(),
        content: entry.content.clone(),
        category: entry.category.clone(),
        tags: entry.tags.clone(),
        relevance_score,
        target_section,
        target_gap_id,
    }
}

// ---------------------------------------------------------------------------
// Lexical scoring
// ---------------------------------------------------------------------------

/// Token-hit ratio over the entry's searchable text.
///
/// Tokens shorter than 3 characters are noise and dropped. The domain bonus
/// is raw (pre-normalization), so a domain-matching entry beats an otherwise
/// equal one by half a token.
fn lexical_score(query: &str, haystack: &str, domain: Option<&str>) -> f32 {
    let lower = query.to_lowercase();
    let mut tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    if tokens.is_empty() {
        return 0.0;
    }

    let hits = tokens.iter().filter(|t| haystack.contains(**t)).count();
    let bonus = match domain {
        Some(d) if !d.is_empty() && haystack.contains(&d.to_lowercase()) => LEXICAL_DOMAIN_BONUS,
        _ => 0.0,
    };
    if hits == 0 && bonus == 0.0 {
        return 0.0;
    }
    (hits as f32 + bonus) / tokens.len() as f32
}

// ---------------------------------------------------------------------------
// Pool post-processing
// ---------------------------------------------------------------------------

/// Keep one candidate per prompt, at its best score. The gap attribution of
/// the best-scoring occurrence wins.
fn dedup_by_prompt_id(pool: Vec<EnrichmentCandidate>) -> Vec<EnrichmentCandidate> {
    let mut kept: Vec<EnrichmentCandidate> = Vec::with_capacity(pool.len());
    for cand in pool {
        match kept.iter_mut().find(|k| k.prompt_id == cand.prompt_id) {
            Some(existing) => {
                if cand.relevance_score > existing.relevance_score {
                    *existing = cand;
                }
            }
            None => kept.push(cand),
        }
    }
    kept
}

/// Reward candidates whose library metadata contains the run's domain,
/// case-insensitively, so `backend` also boosts a `backend-api` tag or a
/// `backend-engineering` category. A tag match is a stronger signal than a
/// category match; only one boost applies.
fn apply_domain_boost(
    mut pool: Vec<EnrichmentCandidate>,
    domain: Option<&str>,
) -> Vec<EnrichmentCandidate> {
    let Some(domain) = domain.filter(|d| !d.is_empty()) else {
        return pool;
    };
    let needle = domain.to_lowercase();
    for cand in &mut pool {
        let boost = if cand.tags.iter().any(|t| t.to_lowercase().contains(&needle)) {
            TAG_BOOST
        } else if cand.category.to_lowercase().contains(&needle) {
            CATEGORY_BOOST
        } else {
            0.0
        };
        cand.relevance_score = (cand.relevance_score + boost).min(1.0);
    }
    pool
}

/// Three-rung selection: strict threshold, relaxed threshold, last resort.
fn select_by_ladder(
    mut pool: Vec<EnrichmentCandidate>,
    options: &EnrichmentOptions,
) -> Vec<EnrichmentCandidate> {
    pool.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let total = options.max_total_candidates;

    let strict: Vec<&EnrichmentCandidate> = pool
        .iter()
        .filter(|c| c.relevance_score >= options.min_relevance_score)
        .collect();
    if !strict.is_empty() {
        debug!(rung = "strict", hits = strict.len(), "ladder selection");
        return strict.into_iter().take(total).cloned().collect();
    }

    let floor = (options.min_relevance_score - 0.35).max(0.2);
    let relaxed: Vec<&EnrichmentCandidate> = pool
        .iter()
        .filter(|c| c.relevance_score >= floor)
        .collect();
    if !relaxed.is_empty() {
        debug!(rung = "relaxed", floor, hits = relaxed.len(), "ladder selection");
        return relaxed.into_iter().take(total.min(5)).cloned().collect();
    }

    // No floor at all: whatever scored best goes out, even at zero. Vector
    // hits can carry a non-positive cosine and still be the only material.
    let last: Vec<EnrichmentCandidate> = pool.into_iter().take(total.min(3)).collect();
    debug!(rung = "last-resort", hits = last.len(), "ladder selection");
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptforge_shared::{GapKind, Severity};

    use crate::corpus::CorpusEntry;

    fn entry(id: &str, name: &str, content: &str, category: &str, tags: &[&str]) -> CorpusEntry {
        CorpusEntry {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            category: category.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn library() -> Arc<Corpus> {
        Arc::new(Corpus::from_entries(vec![
            entry(
                "p1",
                "API error handling",
                "Return structured error responses from every api endpoint with validation details.",
                "backend",
                &["api", "errors"],
            ),
            entry(
                "p2",
                "Responsive layout",
                "Component layout rules for responsive interfaces and accessibility.",
                "frontend",
                &["ui"],
            ),
            entry(
                "p3",
                "Security guardrails",
                "Reject prompt injection and mask personal data before responding.",
                "general",
                &["security"],
            ),
        ]))
    }

    fn gap(id: &str, query: &str) -> Gap {
        Gap {
            id: id.into(),
            kind: GapKind::VagueInstruction,
            section: SectionName::Developer,
            severity: Severity::High,
            description: "test".into(),
            excerpt: None,
            search_query: query.into(),
        }
    }

    fn opts() -> EnrichmentOptions {
        EnrichmentOptions::default()
    }

    #[test]
    fn lexical_score_counts_token_hits() {
        let score = lexical_score(
            "api error handling",
            "structured error responses from the api",
            None,
        );
        assert!(score > 0.5);
        assert_eq!(lexical_score("xyz", "nothing relevant", None), 0.0);
    }

    #[test]
    fn lexical_domain_bonus_breaks_ties() {
        let with = lexical_score("error handling", "error handling for backend work", Some("backend"));
        let without = lexical_score("error handling", "error handling for other work", Some("backend"));
        assert!(with > without);
    }

    #[test]
    fn short_tokens_are_dropped() {
        assert_eq!(lexical_score("a an to", "a an to everything", None), 0.0);
    }

    #[tokio::test]
    async fn empty_library_returns_nothing() {
        let retriever = Retriever::lexical_only(Arc::new(Corpus::default()));
        let found = retriever
            .search("anything", &[gap("gap-1", "api errors")], &opts())
            .await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn gap_candidates_carry_attribution() {
        let retriever = Retriever::lexical_only(library());
        let found = retriever
            .search("", &[gap("gap-1", "structured error responses api endpoint validation")], &opts())
            .await;
        assert!(!found.is_empty());
        let best = &found[0];
        assert_eq!(best.prompt_id, "p1");
        assert_eq!(best.target_gap_id.as_deref(), Some("gap-1"));
        assert_eq!(best.target_section, SectionName::Developer);
    }

    #[tokio::test]
    async fn dedup_keeps_best_score() {
        let retriever = Retriever::lexical_only(library());
        // Both the broad phase and the gap phase will hit p1.
        let found = retriever
            .search(
                "structured error responses api",
                &[gap("gap-1", "structured error responses api endpoint validation")],
                &opts(),
            )
            .await;
        let p1_count = found.iter().filter(|c| c.prompt_id == "p1").count();
        assert_eq!(p1_count, 1);
    }

    #[tokio::test]
    async fn weak_matches_survive_via_lower_rungs() {
        let retriever = Retriever::lexical_only(library());
        let mut options = opts();
        options.min_relevance_score = 0.99;
        // Single weak hit: only one token out of several matches.
        let found = retriever
            .search("", &[gap("gap-1", "responsive tables cobol zookeeper quine")], &options)
            .await;
        assert!(!found.is_empty(), "ladder must not starve a scoring pool");
        assert!(found.len() <= 3);
    }

    #[tokio::test]
    async fn domain_boost_prefers_matching_tags() {
        let retriever = Retriever::lexical_only(library());
        let mut options = opts();
        options.domain = Some("security".into());
        options.min_relevance_score = 0.0;
        let found = retriever
            .search("", &[gap("gap-1", "reject injection mask personal data responding")], &options)
            .await;
        assert_eq!(found[0].prompt_id, "p3");
    }

    #[tokio::test]
    async fn total_cap_is_respected() {
        let retriever = Retriever::lexical_only(library());
        let mut options = opts();
        options.max_total_candidates = 1;
        options.min_relevance_score = 0.0;
        let gaps = [
            gap("gap-1", "structured error responses api"),
            gap("gap-2", "responsive layout accessibility component"),
            gap("gap-3", "injection personal data security"),
        ];
        let found = retriever.search("api layout security", &gaps, &options).await;
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn domain_boost_matches_metadata_substrings() {
        let pool = vec![
            EnrichmentCandidate {
                prompt_id: "tagged".into(),
                name: String::new(),
                content: String::new(),
                category: "general".into(),
                tags: vec!["backend-api".into()],
                relevance_score: 0.5,
                target_section: SectionName::Global,
                target_gap_id: None,
            },
            EnrichmentCandidate {
                prompt_id: "categorized".into(),
                name: String::new(),
                content: String::new(),
                category: "Backend-Engineering".into(),
                tags: vec![],
                relevance_score: 0.5,
                target_section: SectionName::Global,
                target_gap_id: None,
            },
            EnrichmentCandidate {
                prompt_id: "unrelated".into(),
                name: String::new(),
                content: String::new(),
                category: "frontend".into(),
                tags: vec!["ui".into()],
                relevance_score: 0.5,
                target_section: SectionName::Global,
                target_gap_id: None,
            },
        ];
        let boosted = apply_domain_boost(pool, Some("backend"));
        assert!((boosted[0].relevance_score - 0.65).abs() < 1e-6);
        assert!((boosted[1].relevance_score - 0.60).abs() < 1e-6);
        assert!((boosted[2].relevance_score - 0.50).abs() < 1e-6);
    }

    #[test]
    fn last_resort_keeps_zero_score_candidates() {
        let pool = vec![EnrichmentCandidate {
            prompt_id: "p1".into(),
            name: String::new(),
            content: String::new(),
            category: String::new(),
            tags: vec![],
            relevance_score: 0.0,
            target_section: SectionName::Global,
            target_gap_id: None,
        }];
        let selected = select_by_ladder(pool, &opts()); // min 0.65
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].prompt_id, "p1");
    }

    #[test]
    fn ladder_relaxed_rung_caps_at_five() {
        let mut pool = Vec::new();
        for i in 0..10 {
            pool.push(EnrichmentCandidate {
                prompt_id: format!("p{i}"),
                name: String::new(),
                content: String::new(),
                category: String::new(),
                tags: vec![],
                relevance_score: 0.4,
                target_section: SectionName::Global,
                target_gap_id: None,
            });
        }
        let options = opts(); // min 0.65, relaxed floor 0.3
        let selected = select_by_ladder(pool, &options);
        assert_eq!(selected.len(), 5);
    }
}
