//! Heading spacing and table-of-contents placement.

use crate::changes::{ChangeKind, ChangeLog};
use crate::fence::fenced_blocks;
use crate::heading::{is_heading_line, parse_heading};
use crate::protect::Protected;

/// Blank lines required before a heading.
const BLANKS_BEFORE_HEADING: usize = 2;
/// Blank lines required between a heading and the content after it.
const BLANKS_AFTER_HEADING: usize = 1;

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Enforce two blank lines before every heading and one after it.
///
/// Only gaps between two content lines are touched; blank lines at the very
/// start and end of the document stay as they are. Lines inside code blocks
/// and display math are never inspected.
///
/// ```
/// use pnpmd_core::normalize_heading_spacing;
///
/// assert_eq!(
///     normalize_heading_spacing("intro\n# Title\ntext\n"),
///     "intro\n\n\n# Title\n\ntext\n"
/// );
/// ```
#[must_use]
pub fn normalize_heading_spacing(input: &str) -> String {
    let protected = Protected::new(input);
    let lines: Vec<&str> = protected.masked().split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 8);
    let mut previous_content: Option<&str> = None;
    let mut i = 0;

    while i < lines.len() {
        if !is_blank(lines[i]) {
            previous_content = Some(lines[i]);
            out.push(lines[i]);
            i += 1;
            continue;
        }

        let run_start = i;
        while i < lines.len() && is_blank(lines[i]) {
            i += 1;
        }
        let run = &lines[run_start..i];
        let next_content = lines.get(i).copied();

        let wanted = match (previous_content, next_content) {
            (Some(_), Some(next)) if is_heading_line(next) => Some(BLANKS_BEFORE_HEADING),
            (Some(prev), Some(_)) if is_heading_line(prev) => Some(BLANKS_AFTER_HEADING),
            _ => None,
        };
        match wanted {
            Some(count) if count != run.len() => out.extend(std::iter::repeat_n("", count)),
            _ => out.extend_from_slice(run),
        }
    }

    // Heading directly followed or preceded by content, with no gap at all.
    let mut spaced: Vec<&str> = Vec::with_capacity(out.len() + 8);
    for (idx, line) in out.iter().enumerate() {
        if is_heading_line(line) && idx > 0 && !is_blank(out[idx - 1]) {
            spaced.extend(std::iter::repeat_n("", BLANKS_BEFORE_HEADING));
        }
        spaced.push(line);
        if is_heading_line(line)
            && out
                .get(idx + 1)
                .is_some_and(|next| !is_blank(next) && !is_heading_line(next))
        {
            spaced.extend(std::iter::repeat_n("", BLANKS_AFTER_HEADING));
        }
    }

    protected.restore(&spaced.join("\n"))
}

/// Table-of-contents settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocOptions {
    /// Insert and keep a table of contents.
    pub enabled: bool,
    /// Title prefix of the section after which the marker is inserted.
    pub section: String,
    /// Marker line authors use to place the table of contents.
    pub marker: String,
    /// Renderer directive that replaces the marker.
    pub directive: String,
}

impl Default for TocOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            section: "Abstract".to_owned(),
            marker: "[[TOC]]".to_owned(),
            directive: "\\tableofcontents".to_owned(),
        }
    }
}

/// Place the table of contents.
///
/// With TOC enabled and neither a marker nor a directive line present, a
/// marker is inserted after the content of the configured section. Every
/// marker line is then replaced with the directive. With TOC disabled,
/// marker lines are removed.
///
/// Returns the rewritten text and whether it contains a directive line.
pub fn apply_toc(input: &str, options: &TocOptions, log: &mut ChangeLog) -> (String, bool) {
    let protected = Protected::new(input);
    let masked = protected.masked();
    let mut locator = protected.locator(masked);

    let mut lines: Vec<String> = Vec::new();
    let mut starts: Vec<usize> = Vec::new();
    let mut offset = 0;
    for line in masked.split('\n') {
        starts.push(offset);
        lines.push(line.to_owned());
        offset += line.len() + 1;
    }

    let is_marker = |line: &str| line.trim() == options.marker;
    let is_directive = |line: &str| line.trim() == options.directive;

    if !options.enabled {
        let mut kept = Vec::with_capacity(lines.len());
        for (line, start) in lines.into_iter().zip(starts) {
            if is_marker(&line) {
                log.record(ChangeKind::Toc, locator.locate(start), line.trim(), "");
                continue;
            }
            kept.push(line);
        }
        let has_directive = kept.iter().any(|l| is_directive(l));
        return (protected.restore(&kept.join("\n")), has_directive);
    }

    let has_marker = lines.iter().any(|l| is_marker(l));
    let has_directive = lines.iter().any(|l| is_directive(l));

    if !has_marker && !has_directive {
        let open_fence_at_end = fenced_blocks(input).iter().any(|block| !block.terminated);
        match section_end(&lines, &protected, &options.section) {
            // An unterminated fence swallows the rest of the buffer, so a
            // marker placed after its last line would land inside it.
            Some(after) if open_fence_at_end && after + 1 == lines.len() => {
                tracing::debug!(
                    section = %options.section,
                    "Section ends inside an unterminated code fence, skipping table of contents"
                );
            }
            Some(after) => {
                let end_of_line = starts[after] + lines[after].len();
                log.record(
                    ChangeKind::Toc,
                    locator.locate(end_of_line),
                    "",
                    options.marker.as_str(),
                );
                let needs_gap_after = lines.get(after + 1).is_some_and(|l| !is_blank(l));
                let mut inserted = vec![String::new(), options.marker.clone()];
                if needs_gap_after {
                    inserted.push(String::new());
                }
                for (k, line) in inserted.into_iter().enumerate() {
                    lines.insert(after + 1 + k, line);
                    starts.insert(after + 1 + k, end_of_line);
                }
            }
            None => {
                tracing::debug!(section = %options.section, "No section for table of contents");
            }
        }
    }

    let mut directive_emitted = has_directive;
    for (line, &start) in lines.iter_mut().zip(&starts) {
        if is_marker(line) {
            log.record(
                ChangeKind::Toc,
                locator.locate(start),
                line.trim(),
                options.directive.as_str(),
            );
            line.clone_from(&options.directive);
            directive_emitted = true;
        }
    }

    (protected.restore(&lines.join("\n")), directive_emitted)
}

/// Index of the last non-blank line of the section whose heading title
/// starts with `section` (case-insensitive).
fn section_end(lines: &[String], protected: &Protected<'_>, section: &str) -> Option<usize> {
    let wanted = section.to_lowercase();
    let (start, level) = lines.iter().enumerate().find_map(|(i, line)| {
        let heading = parse_heading(line)?;
        let title = protected.restore(heading.title).to_lowercase();
        title.starts_with(&wanted).then_some((i, heading.level))
    })?;

    let end = lines[start + 1..]
        .iter()
        .position(|line| parse_heading(line).is_some_and(|h| h.level <= level))
        .map_or(lines.len(), |p| start + 1 + p);

    (start..end).rev().find(|&i| !is_blank(&lines[i]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spacing_adds_missing_blanks() {
        assert_eq!(
            normalize_heading_spacing("text\n## A\nbody\n"),
            "text\n\n\n## A\n\nbody\n"
        );
    }

    #[test]
    fn test_spacing_collapses_extra_blanks() {
        assert_eq!(
            normalize_heading_spacing("text\n\n\n\n## A\n\n\n\nbody"),
            "text\n\n\n## A\n\nbody"
        );
    }

    #[test]
    fn test_spacing_consecutive_headings() {
        assert_eq!(
            normalize_heading_spacing("# A\n## B\ntext"),
            "# A\n\n\n## B\n\ntext"
        );
    }

    #[test]
    fn test_spacing_keeps_document_edges() {
        assert_eq!(normalize_heading_spacing("\n\n# A\n\n\n"), "\n\n# A\n\n\n");
        assert_eq!(normalize_heading_spacing("# A"), "# A");
    }

    #[test]
    fn test_spacing_ignores_fenced_headings() {
        let input = "text\n```\n# not a heading\n```\nmore\n";
        assert_eq!(normalize_heading_spacing(input), input);
    }

    #[test]
    fn test_spacing_idempotent() {
        let once = normalize_heading_spacing("a\n# B\nc\n## D\n\n\n\ne\n");
        assert_eq!(normalize_heading_spacing(&once), once);
    }

    #[test]
    fn test_toc_inserted_after_abstract() {
        let input = "# Abstract\n\nShort summary.\n\n\n# Introduction\n\nText.\n";
        let mut log = ChangeLog::new();
        let (out, emitted) = apply_toc(input, &TocOptions::default(), &mut log);
        assert_eq!(
            out,
            "# Abstract\n\nShort summary.\n\n\\tableofcontents\n\n\n# Introduction\n\nText.\n"
        );
        assert!(emitted);
        assert_eq!(log.count(ChangeKind::Toc), 2);
    }

    #[test]
    fn test_toc_section_runs_over_subsections() {
        let input = "## Abstract\n\nA.\n\n\n### Detail\n\nB.\n\n\n## Next\n";
        let mut log = ChangeLog::new();
        let (out, _) = apply_toc(input, &TocOptions::default(), &mut log);
        assert_eq!(
            out,
            "## Abstract\n\nA.\n\n\n### Detail\n\nB.\n\n\\tableofcontents\n\n\n## Next\n"
        );
    }

    #[test]
    fn test_toc_configured_section() {
        let options = TocOptions {
            section: "Keywords".to_owned(),
            ..TocOptions::default()
        };
        let mut log = ChangeLog::new();
        let (out, _) = apply_toc("# Keywords: a, b\n\nx\n", &options, &mut log);
        assert_eq!(out, "# Keywords: a, b\n\nx\n\n\\tableofcontents\n");
    }

    #[test]
    fn test_existing_marker_is_sole_insertion_point() {
        let input = "[[TOC]]\n\n# Abstract\n\nA.\n";
        let mut log = ChangeLog::new();
        let (out, emitted) = apply_toc(input, &TocOptions::default(), &mut log);
        assert_eq!(out, "\\tableofcontents\n\n# Abstract\n\nA.\n");
        assert!(emitted);
        assert_eq!(log.count(ChangeKind::Toc), 1);
    }

    #[test]
    fn test_no_section_no_marker() {
        let mut log = ChangeLog::new();
        let (out, emitted) = apply_toc("# Intro\n\ntext\n", &TocOptions::default(), &mut log);
        assert_eq!(out, "# Intro\n\ntext\n");
        assert!(!emitted);
        assert!(log.is_empty());
    }

    #[test]
    fn test_disabled_toc_drops_markers() {
        let options = TocOptions {
            enabled: false,
            ..TocOptions::default()
        };
        let mut log = ChangeLog::new();
        let (out, emitted) = apply_toc("# Abstract\n\n[[TOC]]\n\ntext\n", &options, &mut log);
        assert_eq!(out, "# Abstract\n\n\ntext\n");
        assert!(!emitted);
    }

    #[test]
    fn test_toc_idempotent() {
        let mut log = ChangeLog::new();
        let (once, _) = apply_toc("# Abstract\n\nA.\n", &TocOptions::default(), &mut log);
        let (twice, emitted) = apply_toc(&once, &TocOptions::default(), &mut log);
        assert_eq!(once, twice);
        assert!(emitted);
    }

    #[test]
    fn test_fenced_marker_ignored() {
        let input = "```\n[[TOC]]\n```\n";
        let mut log = ChangeLog::new();
        let (out, emitted) = apply_toc(input, &TocOptions::default(), &mut log);
        assert_eq!(out, input);
        assert!(!emitted);
    }

    #[test]
    fn test_toc_skipped_when_section_ends_in_open_fence() {
        let input = "# Abstract\n\ntext\n\n~~~\ncode\n";
        let mut log = ChangeLog::new();
        let (out, emitted) = apply_toc(input, &TocOptions::default(), &mut log);
        assert_eq!(out, input);
        assert!(!emitted);
        assert!(log.is_empty());
    }

    #[test]
    fn test_toc_placed_before_later_open_fence() {
        let input = "# Abstract\n\nA.\n\n\n# Code\n\n~~~\nx\n";
        let mut log = ChangeLog::new();
        let (out, emitted) = apply_toc(input, &TocOptions::default(), &mut log);
        assert_eq!(
            out,
            "# Abstract\n\nA.\n\n\\tableofcontents\n\n\n# Code\n\n~~~\nx\n"
        );
        assert!(emitted);
    }
}
