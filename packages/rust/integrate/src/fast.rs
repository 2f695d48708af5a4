//! Deterministic marker-based integration.
//!
//! Candidates are grouped by target section and appended as marked blocks
//! (`<!-- [LIB:id] name -->` followed by the library content). One token
//! budget is shared across all sections and only ever decreases; a
//! candidate that does not fit is truncated with its marker kept, or
//! skipped entirely. Running out of budget is a normal outcome, not an
//! error.

use tracing::{debug, instrument};

use promptforge_analysis::parse_sections;
use promptforge_shared::{EnrichmentCandidate, SectionName};

/// Average tokens per word for budget estimation.
const TOKENS_PER_WORD: f32 = 1.3;

// ---------------------------------------------------------------------------
// Integration result
// ---------------------------------------------------------------------------

/// Output of an integration pass.
#[derive(Debug, Clone)]
pub struct Integration {
    /// The enriched prompt text.
    pub text: String,
    /// The candidates that actually made it in, in insertion order.
    pub integrated: Vec<EnrichmentCandidate>,
}

/// Estimate the token cost of a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f32 * TOKENS_PER_WORD).ceil() as usize
}

/// The HTML-comment marker that precedes every integrated block.
pub fn marker(candidate: &EnrichmentCandidate) -> String {
    format!("<!-- [LIB:{}] {} -->", candidate.prompt_id, candidate.name)
}

// ---------------------------------------------------------------------------
// Fast integration
// ---------------------------------------------------------------------------

/// Merge candidates into the prompt under a shared token budget.
///
/// Existing sections keep their position and receive their blocks at the
/// end of their body. Sections that do not exist yet are created at the end
/// of the document, in the order their first candidate appears. GLOBAL
/// candidates go to the end of the document without a heading.
#[instrument(skip_all, fields(candidates = candidates.len(), budget = token_budget))]
pub fn integrate_fast(
    text: &str,
    candidates: &[EnrichmentCandidate],
    token_budget: usize,
) -> Integration {
    let mut remaining = token_budget;
    let mut integrated: Vec<EnrichmentCandidate> = Vec::new();

    // Per-candidate rendered block, after budget admission.
    let mut blocks: Vec<(SectionName, String)> = Vec::new();
    for cand in candidates {
        let mark = marker(cand);
        let Some(body) = admit(&mark, &cand.content, &mut remaining) else {
            debug!(prompt_id = %cand.prompt_id, "skipped, budget exhausted");
            continue;
        };
        blocks.push((cand.target_section, body));
        integrated.push(cand.clone());
    }

    if blocks.is_empty() {
        return Integration {
            text: text.to_string(),
            integrated,
        };
    }

    let enriched = place_blocks(text, blocks);
    debug!(
        integrated = integrated.len(),
        budget_left = remaining,
        "fast integration complete"
    );
    Integration {
        text: enriched,
        integrated,
    }
}

/// Charge one block against the budget. Returns the rendered block, with the
/// payload truncated when only part of it fits, or `None` when not even the
/// marker plus one word fits.
fn admit(mark: &str, content: &str, remaining: &mut usize) -> Option<String> {
    let marker_cost = estimate_tokens(mark);
    let full_cost = marker_cost + estimate_tokens(content);
    if full_cost <= *remaining {
        *remaining -= full_cost;
        return Some(format!("{mark}\n{content}"));
    }
    if marker_cost >= *remaining {
        return None;
    }
    let word_budget = ((*remaining - marker_cost) as f32 / TOKENS_PER_WORD).floor() as usize;
    if word_budget == 0 {
        return None;
    }
    let truncated: String = content
        .split_whitespace()
        .take(word_budget)
        .collect::<Vec<_>>()
        .join(" ");
    let cost = marker_cost + estimate_tokens(&truncated);
    *remaining = remaining.saturating_sub(cost);
    Some(format!("{mark}\n{truncated}"))
}

/// Insert rendered blocks into the document.
fn place_blocks(text: &str, blocks: Vec<(SectionName, String)>) -> String {
    let sections = parse_sections(text);

    // End offset of each existing named section's body.
    let body_end = |name: SectionName| -> Option<usize> {
        let pos = sections.iter().rposition(|s| s.name == name)?;
        Some(
            sections
                .get(pos + 1)
                .map(|next| next.start_offset)
                .unwrap_or(text.len()),
        )
    };

    // (insert offset, block) for existing sections; the rest goes to the
    // tail, grouped under a new heading per section.
    let mut inline: Vec<(usize, String)> = Vec::new();
    let mut tail_sections: Vec<(SectionName, Vec<String>)> = Vec::new();
    let mut tail_global: Vec<String> = Vec::new();

    for (name, block) in blocks {
        if name == SectionName::Global {
            tail_global.push(block);
            continue;
        }
        match body_end(name) {
            Some(offset) => inline.push((offset, block)),
            None => match tail_sections.iter_mut().find(|(n, _)| *n == name) {
                Some((_, group)) => group.push(block),
                None => tail_sections.push((name, vec![block])),
            },
        }
    }

    // Insert back-to-front so earlier offsets stay valid. Blocks sharing an
    // offset target the same section; they go in as one insertion so their
    // relevance order survives. The sort is stable, which keeps that order
    // within each group.
    inline.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = text.to_string();
    let mut i = 0;
    while i < inline.len() {
        let offset = inline[i].0;
        let mut j = i;
        let mut insertion = String::new();
        while j < inline.len() && inline[j].0 == offset {
            insertion.push_str("\n\n");
            insertion.push_str(&inline[j].1);
            j += 1;
        }
        out.insert_str(offset, &insertion);
        i = j;
    }

    for (name, group) in tail_sections {
        out.push_str(&format!("\n\n## {name}\n"));
        for block in group {
            out.push_str(&format!("\n{block}"));
        }
    }
    for block in tail_global {
        out.push_str(&format!("\n\n{block}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, content: &str, section: SectionName) -> EnrichmentCandidate {
        EnrichmentCandidate {
            prompt_id: id.into(),
            name: format!("entry {id}"),
            content: content.into(),
            category: String::new(),
            tags: vec![],
            relevance_score: 0.9,
            target_section: section,
            target_gap_id: None,
        }
    }

    #[test]
    fn estimate_scales_words() {
        assert_eq!(estimate_tokens("one two three"), 4); // ceil(3 * 1.3)
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn block_lands_in_existing_section() {
        let text = "## SYSTEM\nRole text.\n## USER\nTask.";
        let result = integrate_fast(text, &[cand("p1", "Extra role rules.", SectionName::System)], 500);
        assert_eq!(result.integrated.len(), 1);
        let sys_end = result.text.find("## USER").unwrap();
        let marker_pos = result.text.find("<!-- [LIB:p1]").unwrap();
        assert!(marker_pos < sys_end, "block must sit inside SYSTEM");
        assert!(result.text.contains("Extra role rules."));
    }

    #[test]
    fn missing_section_created_at_end() {
        let text = "## SYSTEM\nRole.";
        let result = integrate_fast(text, &[cand("p1", "Dev goals.", SectionName::Developer)], 500);
        let heading_pos = result.text.find("## DEVELOPER").unwrap();
        assert!(heading_pos > result.text.find("## SYSTEM").unwrap());
        assert!(result.text.contains("<!-- [LIB:p1] entry p1 -->"));
    }

    #[test]
    fn global_blocks_append_without_heading() {
        let text = "plain prompt";
        let result = integrate_fast(text, &[cand("p1", "General advice.", SectionName::Global)], 500);
        assert!(result.text.starts_with("plain prompt"));
        assert!(result.text.contains("General advice."));
        assert!(!result.text.contains("## GLOBAL"));
    }

    #[test]
    fn budget_is_shared_and_monotonic() {
        let long = "word ".repeat(200);
        let candidates = [
            cand("p1", long.trim(), SectionName::System),
            cand("p2", long.trim(), SectionName::User),
        ];
        // ~260 tokens each plus markers; 300 fits one whole and part of none.
        let result = integrate_fast("## SYSTEM\nA.\n## USER\nB.", &candidates, 300);
        assert_eq!(result.integrated.len(), 2);
        let total: usize = estimate_tokens(&result.text) - estimate_tokens("## SYSTEM\nA.\n## USER\nB.");
        assert!(total <= 300 + 2, "inserted ~{total} tokens over budget");
    }

    #[test]
    fn truncation_keeps_marker() {
        let long = "word ".repeat(100);
        let result = integrate_fast(
            "## SYSTEM\nA.",
            &[cand("p1", long.trim(), SectionName::System)],
            40,
        );
        assert_eq!(result.integrated.len(), 1);
        assert!(result.text.contains("<!-- [LIB:p1]"));
        // Payload was cut down.
        assert!(result.text.split_whitespace().count() < 60);
    }

    #[test]
    fn zero_budget_integrates_nothing() {
        let result = integrate_fast(
            "## SYSTEM\nA.",
            &[cand("p1", "content", SectionName::System)],
            0,
        );
        assert!(result.integrated.is_empty());
        assert_eq!(result.text, "## SYSTEM\nA.");
    }

    #[test]
    fn same_section_blocks_keep_ranking_order() {
        let text = "## SYSTEM\nRole.\n## USER\nTask.";
        let candidates = [
            cand("p1", "Best match.", SectionName::System),
            cand("p2", "Second match.", SectionName::System),
        ];
        let result = integrate_fast(text, &candidates, 500);
        let first = result.text.find("<!-- [LIB:p1]").unwrap();
        let second = result.text.find("<!-- [LIB:p2]").unwrap();
        let user = result.text.find("## USER").unwrap();
        assert!(first < second, "higher-ranked block must come first");
        assert!(second < user, "both blocks stay inside SYSTEM");
    }

    #[test]
    fn original_section_order_preserved() {
        let text = "## SYSTEM\nRole.\n## DEVELOPER\nGoals.\n## USER\nTask.";
        let candidates = [
            cand("p1", "User note.", SectionName::User),
            cand("p2", "System note.", SectionName::System),
        ];
        let result = integrate_fast(text, &candidates, 500);
        let sys = result.text.find("## SYSTEM").unwrap();
        let dev = result.text.find("## DEVELOPER").unwrap();
        let user = result.text.find("## USER").unwrap();
        assert!(sys < dev && dev < user);
        let sys_note = result.text.find("System note.").unwrap();
        assert!(sys_note < dev, "system block stays in its section");
    }
}
