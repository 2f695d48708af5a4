//! Heading-based section parser.
//!
//! Splits raw prompt text into ordered [`Section`] records at `## NAME` /
//! `### NAME` headings whose title matches the fixed section vocabulary
//! (SYSTEM/DEVELOPER/USER). Leading text and text without any matching
//! heading fall into GLOBAL. Always returns at least one section.

use std::sync::LazyLock;

use regex::Regex;

use promptforge_shared::{Section, SectionName};

/// Matches `## Title` or `### Title` at the start of a line.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{2,3}\s*(.+)$").expect("heading regex"));

/// Parse raw text into ordered sections.
///
/// The concatenation of all returned section contents, in source order,
/// reconstructs the non-heading text modulo whitespace trimming. This never
/// fails: text with no recognized headings yields a single GLOBAL section.
pub fn parse_sections(text: &str) -> Vec<Section> {
    // Collect headings that belong to the section vocabulary.
    let boundaries: Vec<(usize, usize, SectionName)> = HEADING_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let m = caps.get(0).expect("whole match");
            let title = caps.get(1).expect("title group").as_str().trim();
            SectionName::from_heading(title).map(|name| (m.start(), m.end(), name))
        })
        .collect();

    if boundaries.is_empty() {
        return vec![Section {
            name: SectionName::Global,
            content: text.trim().to_string(),
            start_offset: 0,
        }];
    }

    let mut sections = Vec::with_capacity(boundaries.len() + 1);

    // Text before the first recognized heading is GLOBAL.
    let leading = &text[..boundaries[0].0];
    if !leading.trim().is_empty() {
        sections.push(Section {
            name: SectionName::Global,
            content: leading.trim().to_string(),
            start_offset: 0,
        });
    }

    for (i, &(start, end, name)) in boundaries.iter().enumerate() {
        let body_end = boundaries
            .get(i + 1)
            .map(|&(next_start, _, _)| next_start)
            .unwrap_or(text.len());
        sections.push(Section {
            name,
            content: text[end..body_end].trim().to_string(),
            start_offset: start,
        });
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_headings_yields_single_global() {
        let sections = parse_sections("just some instructions with no structure");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, SectionName::Global);
        assert_eq!(sections[0].start_offset, 0);
        assert!(sections[0].content.contains("no structure"));
    }

    #[test]
    fn splits_on_known_headings() {
        let text = "## SYSTEM\nYou are a reviewer.\n## USER\nReview this diff.";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, SectionName::System);
        assert_eq!(sections[0].content, "You are a reviewer.");
        assert_eq!(sections[1].name, SectionName::User);
        assert_eq!(sections[1].content, "Review this diff.");
    }

    #[test]
    fn leading_text_goes_to_global() {
        let text = "Some preamble here.\n\n## SYSTEM\nRole text.";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, SectionName::Global);
        assert_eq!(sections[0].content, "Some preamble here.");
        assert_eq!(sections[1].name, SectionName::System);
    }

    #[test]
    fn unknown_headings_stay_in_section_body() {
        let text = "## DEVELOPER\nGoals here.\n## Appendix\nExtra notes.";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, SectionName::Developer);
        assert!(sections[0].content.contains("Extra notes"));
    }

    #[test]
    fn h3_headings_recognized() {
        let text = "### SYSTEM\nRole.\n### USER\nTask.";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, SectionName::System);
        assert_eq!(sections[1].name, SectionName::User);
    }

    #[test]
    fn sections_ordered_by_offset() {
        let text = "intro\n## USER\ntask\n## SYSTEM\nrole";
        let sections = parse_sections(text);
        let offsets: Vec<usize> = sections.iter().map(|s| s.start_offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        assert_eq!(offsets, sorted);
        assert_eq!(sections[1].name, SectionName::User);
        assert_eq!(sections[2].name, SectionName::System);
    }

    #[test]
    fn body_text_reconstructs() {
        let text = "preamble\n## SYSTEM\nline one\nline two\n## USER\nline three";
        let sections = parse_sections(text);
        let joined: String = sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        for line in ["preamble", "line one", "line two", "line three"] {
            assert!(joined.contains(line), "missing line: {line}");
        }
    }
}
