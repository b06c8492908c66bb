//! Change log of rewrites performed by the pipeline.

use std::fmt;

/// Pass that produced a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "snake_case"))]
pub enum ChangeKind {
    /// Symbol map substitution.
    Mapping,
    /// Bare `{#id}` rewritten to `[]{#id}`.
    Anchor,
    /// `](@id)` rewritten to `](#id)`.
    LinkDestination,
    /// `@id` / `[@id]` expanded to a link.
    Reference,
    /// `@ns:id` rewritten to a named reference directive.
    NamedReference,
    /// Stray `#id` rewritten to `[](#id)`.
    BareHash,
    /// Table-of-contents marker inserted, replaced or dropped.
    Toc,
}

impl ChangeKind {
    /// Short lowercase name used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mapping => "mapping",
            Self::Anchor => "anchor",
            Self::LinkDestination => "link-destination",
            Self::Reference => "reference",
            Self::NamedReference => "named-reference",
            Self::BareHash => "bare-hash",
            Self::Toc => "toc",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 1-based position in a text buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// A single rewrite.
///
/// `line` and `column` are 1-based and refer to the buffer as it entered
/// the pass that made the change.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Change {
    pub kind: ChangeKind,
    pub line: usize,
    pub column: usize,
    pub original: String,
    pub replacement: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, col {}: {} -> {} ({})",
            self.line, self.column, self.original, self.replacement, self.kind
        )
    }
}

/// Ordered list of changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeLog {
    changes: Vec<Change>,
    line_offset: usize,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log whose recorded line numbers are shifted by `offset`.
    ///
    /// Used when a pass runs over a slice of the document that does not
    /// start at its first line.
    #[must_use]
    pub fn with_line_offset(offset: usize) -> Self {
        Self {
            changes: Vec::new(),
            line_offset: offset,
        }
    }

    /// Record a rewrite at `location`.
    pub fn record(
        &mut self,
        kind: ChangeKind,
        location: Location,
        original: impl Into<String>,
        replacement: impl Into<String>,
    ) {
        self.changes.push(Change {
            kind,
            line: location.line + self.line_offset,
            column: location.column,
            original: original.into(),
            replacement: replacement.into(),
        });
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes produced by one kind of pass.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }

    /// Consume the log, returning the changes in order.
    #[must_use]
    pub fn into_vec(self) -> Vec<Change> {
        self.changes
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_offset_applied() {
        let mut log = ChangeLog::with_line_offset(4);
        log.record(
            ChangeKind::Anchor,
            Location { line: 2, column: 11 },
            "{#a}",
            "[]{#a}",
        );

        let change = log.iter().next().unwrap();
        assert_eq!(change.line, 6);
        assert_eq!(change.column, 11);
    }

    #[test]
    fn test_count_by_kind() {
        let mut log = ChangeLog::new();
        let at = Location { line: 1, column: 1 };
        log.record(ChangeKind::Reference, at, "@a", "[A](#a)");
        log.record(ChangeKind::Reference, at, "@b", "[B](#b)");
        log.record(ChangeKind::BareHash, at, "#c", "[](#c)");

        assert_eq!(log.len(), 3);
        assert_eq!(log.count(ChangeKind::Reference), 2);
        assert_eq!(log.count(ChangeKind::Mapping), 0);
    }

    #[test]
    fn test_display() {
        let change = Change {
            kind: ChangeKind::Anchor,
            line: 3,
            column: 5,
            original: "{#x}".to_owned(),
            replacement: "[]{#x}".to_owned(),
        };
        assert_eq!(change.to_string(), "line 3, col 5: {#x} -> []{#x} (anchor)");
    }
}
