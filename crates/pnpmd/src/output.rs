//! Status lines for the `pnpmd` commands.
//!
//! Preprocessed documents, change reports, diffs and JSON go to stdout, so
//! every status line printed here goes to stderr. Colors are dropped when
//! stderr is not a terminal.

use std::fmt::Display;
use std::path::Path;

use console::{Style, Term};

/// Stderr reporter shared by the subcommands.
pub(crate) struct Output {
    term: Term,
    written: Style,
    warning: Style,
    failure: Style,
    heading: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            written: Style::new().green(),
            warning: Style::new().yellow(),
            failure: Style::new().red(),
            heading: Style::new().cyan().bold(),
        }
    }

    fn line(&self, style: Option<&Style>, msg: &str) {
        let _ = match style {
            Some(style) => self.term.write_line(&style.apply_to(msg).to_string()),
            None => self.term.write_line(msg),
        };
    }

    /// A document was written to `target`.
    pub(crate) fn written(&self, source: &Path, target: &Path) {
        self.line(Some(&self.written), &written_line(source, target));
    }

    /// A warning raised while preprocessing `source`.
    pub(crate) fn document_warning(&self, source: &Path, warning: &str) {
        self.line(Some(&self.warning), &document_warning_line(source, warning));
    }

    /// Closing line of a multi-document run.
    pub(crate) fn summary(&self, documents: usize) {
        self.line(None, &summary_line(documents));
    }

    /// Header printed before a rule listing.
    pub(crate) fn rules_header(&self, path: &Path, rules: usize) {
        self.line(Some(&self.heading), &rules_header_line(path, rules));
    }

    pub(crate) fn missing_rules(&self) {
        self.line(Some(&self.warning), "No symbol map found");
    }

    /// Fatal error; the caller exits right after.
    pub(crate) fn failure(&self, err: &dyn Display) {
        self.line(Some(&self.failure), &format!("Error: {err}"));
    }
}

fn written_line(source: &Path, target: &Path) -> String {
    format!("{} -> {}", source.display(), target.display())
}

fn document_warning_line(source: &Path, warning: &str) -> String {
    format!("{}: warning: {warning}", source.display())
}

fn summary_line(documents: usize) -> String {
    match documents {
        1 => "Preprocessed 1 document".to_owned(),
        n => format!("Preprocessed {n} documents"),
    }
}

fn rules_header_line(path: &Path, rules: usize) -> String {
    match rules {
        1 => format!("{} (1 rule)", path.display()),
        n => format!("{} ({n} rules)", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_written_line() {
        assert_eq!(
            written_line(Path::new("paper.md"), Path::new("paper.pnp.md")),
            "paper.md -> paper.pnp.md"
        );
    }

    #[test]
    fn test_document_warning_names_source() {
        assert_eq!(
            document_warning_line(Path::new("a/paper.md"), "unresolved reference `@x`"),
            "a/paper.md: warning: unresolved reference `@x`"
        );
    }

    #[test]
    fn test_counts_are_pluralized() {
        assert_eq!(summary_line(1), "Preprocessed 1 document");
        assert_eq!(summary_line(3), "Preprocessed 3 documents");
        assert_eq!(rules_header_line(Path::new("pnpmd.map"), 1), "pnpmd.map (1 rule)");
        assert_eq!(rules_header_line(Path::new("pnpmd.map"), 0), "pnpmd.map (0 rules)");
    }
}
