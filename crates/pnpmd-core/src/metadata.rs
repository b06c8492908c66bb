//! Leading `%` metadata block.
//!
//! Up to three leading lines starting with `%` carry the title, the author
//! list and the date:
//!
//! ```text
//! % Interference as Polarization
//! % Ada Lovelace and Charles Babbage, Mary Somerville
//! % 2024-05-01
//! ```
//!
//! The block is handed to the renderer as metadata and is never rewritten.

use std::sync::LazyLock;

use regex::Regex;

static PERCENT_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*%\s*(.*?)\s*$").unwrap());

static AUTHOR_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\band\b|,").unwrap());

/// Maximum number of `%` lines read as metadata.
const MAX_HEADER_LINES: usize = 3;

/// Presentation metadata from the `%` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Metadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub date: Option<String>,
}

impl Metadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.authors.is_empty() && self.date.is_none()
    }
}

/// A document split into its `%` header and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split<'a> {
    pub metadata: Metadata,
    /// Header lines exactly as written.
    pub header: Vec<&'a str>,
    /// Everything after the header, leading blank lines removed.
    pub body: &'a str,
    /// Number of input lines before the body starts.
    pub body_line: usize,
}

impl Split<'_> {
    /// Re-attach the header above `body`, separated by one blank line.
    #[must_use]
    pub fn reattach(&self, body: &str) -> String {
        if self.header.is_empty() {
            return body.to_owned();
        }
        let mut out = self.header.join("\n");
        out.push_str("\n\n");
        out.push_str(body);
        out
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

/// Split the leading `%` block off `text`.
///
/// ```
/// use pnpmd_core::split_metadata;
///
/// let split = split_metadata("% Title\n% A and B, C\n%\n\nBody\n");
/// assert_eq!(split.metadata.title.as_deref(), Some("Title"));
/// assert_eq!(split.metadata.authors, ["A", "B", "C"]);
/// assert_eq!(split.metadata.date, None);
/// assert_eq!(split.body, "Body\n");
/// assert_eq!(split.body_line, 4);
/// ```
#[must_use]
pub fn split_metadata(text: &str) -> Split<'_> {
    let mut metadata = Metadata::default();
    let mut header = Vec::new();
    let mut consumed = 0;

    for (index, line) in text.split('\n').take(MAX_HEADER_LINES).enumerate() {
        let Some(value) = PERCENT_LINE_RE
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            break;
        };
        match index {
            0 => metadata.title = non_empty(value),
            1 => {
                metadata.authors = AUTHOR_SEPARATOR_RE
                    .split(value)
                    .map(str::trim)
                    .filter(|author| !author.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            _ => metadata.date = non_empty(value),
        }
        header.push(line);
        consumed += line.len() + 1;
    }

    if header.is_empty() {
        return Split {
            metadata,
            header,
            body: text,
            body_line: 0,
        };
    }

    let rest = text.get(consumed..).unwrap_or_default();
    let body = rest.trim_start_matches('\n');
    let skipped_blanks = rest.len() - body.len();

    Split {
        metadata,
        body_line: header.len() + skipped_blanks,
        header,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_header() {
        let split = split_metadata("# Title\n\ntext\n");
        assert!(split.metadata.is_empty());
        assert!(split.header.is_empty());
        assert_eq!(split.body, "# Title\n\ntext\n");
        assert_eq!(split.reattach(split.body), "# Title\n\ntext\n");
    }

    #[test]
    fn test_full_header() {
        let split = split_metadata("% My Paper\n% Ada and Bob\n% 2024\n\n\n# Intro\n");
        assert_eq!(split.metadata.title.as_deref(), Some("My Paper"));
        assert_eq!(split.metadata.authors, vec!["Ada", "Bob"]);
        assert_eq!(split.metadata.date.as_deref(), Some("2024"));
        assert_eq!(split.header, vec!["% My Paper", "% Ada and Bob", "% 2024"]);
        assert_eq!(split.body, "# Intro\n");
        assert_eq!(split.body_line, 5);
    }

    #[test]
    fn test_authors_split_on_word_and() {
        let split = split_metadata("% T\n% Alexandra Band, Sandy and Andy\n");
        assert_eq!(split.metadata.authors, vec!["Alexandra Band", "Sandy", "Andy"]);
    }

    #[test]
    fn test_only_three_lines_read() {
        let split = split_metadata("% a\n% b\n% c\n% d\n");
        assert_eq!(split.header.len(), 3);
        assert_eq!(split.body, "% d\n");
    }

    #[test]
    fn test_reattach_header() {
        let split = split_metadata("% Title\n\n\nBody");
        assert_eq!(split.reattach("Changed"), "% Title\n\nChanged");
    }

    #[test]
    fn test_header_only_document() {
        let split = split_metadata("% Title");
        assert_eq!(split.metadata.title.as_deref(), Some("Title"));
        assert_eq!(split.body, "");
    }
}
