//! Model-assisted integration with deterministic fallback.
//!
//! The [`Rephraser`] collaborator rewrites the composed prompt so library
//! material reads as part of the original text. Its output is only trusted
//! when every integrated candidate's `[LIB:id]` marker survives; anything
//! else, including a collaborator error, falls back to the fast result.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use promptforge_shared::{CollaboratorResult, EnrichmentCandidate, Language};

use crate::fast::{Integration, integrate_fast};

// ---------------------------------------------------------------------------
// Rephraser trait
// ---------------------------------------------------------------------------

/// External rewriting service for deep integration.
#[async_trait]
pub trait Rephraser: Send + Sync {
    /// Rewrite the composed prompt, keeping every `[LIB:id]` marker intact.
    async fn rephrase(&self, composed: &str, language: Language) -> CollaboratorResult<String>;
}

// ---------------------------------------------------------------------------
// Deep integration
// ---------------------------------------------------------------------------

/// Compose with [`integrate_fast`], then hand the result to the rephraser.
///
/// The fast result is the floor: a failed call or a response missing any
/// marker returns it unchanged.
#[instrument(skip_all, fields(candidates = candidates.len(), budget = token_budget))]
pub async fn integrate_deep(
    text: &str,
    candidates: &[EnrichmentCandidate],
    token_budget: usize,
    language: Language,
    rephraser: &dyn Rephraser,
) -> Integration {
    let fast = integrate_fast(text, candidates, token_budget);
    if fast.integrated.is_empty() {
        return fast;
    }

    match rephraser.rephrase(&fast.text, language).await {
        Ok(rewritten) => {
            if markers_intact(&rewritten, &fast.integrated) {
                debug!("deep integration accepted");
                Integration {
                    text: rewritten,
                    integrated: fast.integrated,
                }
            } else {
                warn!("rephrased output dropped a marker, keeping fast result");
                fast
            }
        }
        Err(e) => {
            warn!(service = e.service(), error = %e, "rephraser failed, keeping fast result");
            fast
        }
    }
}

/// True when every integrated candidate's marker id appears in the text.
fn markers_intact(text: &str, integrated: &[EnrichmentCandidate]) -> bool {
    integrated
        .iter()
        .all(|c| text.contains(&format!("[LIB:{}]", c.prompt_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptforge_shared::{CollaboratorError, SectionName};

    fn cand(id: &str) -> EnrichmentCandidate {
        EnrichmentCandidate {
            prompt_id: id.into(),
            name: format!("entry {id}"),
            content: "Library material goes here.".into(),
            category: String::new(),
            tags: vec![],
            relevance_score: 0.9,
            target_section: SectionName::Developer,
            target_gap_id: None,
        }
    }

    struct Upper;

    #[async_trait]
    impl Rephraser for Upper {
        async fn rephrase(&self, composed: &str, _language: Language) -> CollaboratorResult<String> {
            // Rewrites the prose but keeps markers verbatim.
            Ok(composed.replace("Library material", "Rewritten material"))
        }
    }

    struct DropsMarkers;

    #[async_trait]
    impl Rephraser for DropsMarkers {
        async fn rephrase(&self, _composed: &str, _language: Language) -> CollaboratorResult<String> {
            Ok("a clean rewrite with no markers at all".into())
        }
    }

    struct Down;

    #[async_trait]
    impl Rephraser for Down {
        async fn rephrase(&self, _composed: &str, _language: Language) -> CollaboratorResult<String> {
            Err(CollaboratorError::unavailable("rephraser", "offline"))
        }
    }

    #[tokio::test]
    async fn accepts_rewrite_with_markers() {
        let result = integrate_deep("## DEVELOPER\nGoals.", &[cand("p1")], 500, Language::En, &Upper).await;
        assert!(result.text.contains("Rewritten material"));
        assert!(result.text.contains("[LIB:p1]"));
        assert_eq!(result.integrated.len(), 1);
    }

    #[tokio::test]
    async fn missing_marker_falls_back_to_fast() {
        let result =
            integrate_deep("## DEVELOPER\nGoals.", &[cand("p1")], 500, Language::En, &DropsMarkers)
                .await;
        assert!(result.text.contains("[LIB:p1]"));
        assert!(result.text.contains("Library material"));
    }

    #[tokio::test]
    async fn collaborator_error_falls_back_to_fast() {
        let result = integrate_deep("## DEVELOPER\nGoals.", &[cand("p1")], 500, Language::En, &Down).await;
        assert!(result.text.contains("[LIB:p1]"));
    }

    #[tokio::test]
    async fn nothing_integrated_skips_the_collaborator() {
        let result = integrate_deep("## DEVELOPER\nGoals.", &[cand("p1")], 0, Language::En, &Down).await;
        assert!(result.integrated.is_empty());
        assert_eq!(result.text, "## DEVELOPER\nGoals.");
    }
}
