//! Pipeline driver.
//!
//! Runs the passes in a fixed order over one document:
//!
//! ```text
//! metadata split
//!   -> mapping -> anchors -> link destinations -> references
//!   -> named references -> bare hash -> heading spacing -> table of contents
//!   -> heading shift
//! ```

use crate::anchors::AnchorResolver;
use crate::changes::ChangeLog;
use crate::heading::heading_shift;
use crate::layout::{TocOptions, apply_toc, normalize_heading_spacing};
use crate::metadata::{Metadata, split_metadata};
use crate::references::{
    DEFAULT_NAMEREF_COMMAND, DEFAULT_NAMESPACES, NamedReferences, ReferenceExpander, bare_hash,
    normalize_link_destinations,
};
use crate::rules::RuleSet;

/// Options for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Table-of-contents placement.
    pub toc: TocOptions,
    /// Ask the renderer to number sections.
    pub number_sections: bool,
    /// Skip every rewriting pass; only metadata and hints are computed.
    pub bypass: bool,
    /// Namespaces handled by the named reference pass.
    pub namespaces: Vec<String>,
    /// Command emitted for named references (without the backslash).
    pub nameref_command: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            toc: TocOptions::default(),
            number_sections: true,
            bypass: false,
            namespaces: DEFAULT_NAMESPACES.iter().map(|&ns| ns.to_owned()).collect(),
            nameref_command: DEFAULT_NAMEREF_COMMAND.to_owned(),
        }
    }
}

/// Settings the renderer should apply to the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RenderHints {
    /// Heading level shift, `0` or negative.
    pub heading_shift: i8,
    /// Let the renderer generate its own table of contents.
    pub default_toc: bool,
    pub number_sections: bool,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Final document, `%` header included.
    pub markdown: String,
    /// Final document without the `%` header.
    pub body: String,
    pub metadata: Metadata,
    pub changes: ChangeLog,
    /// Recoverable problems (unresolved references, duplicate labels).
    pub warnings: Vec<String>,
    pub hints: RenderHints,
}

/// The preprocessing pipeline.
///
/// Holds only configuration; every run builds its own tables, so a pipeline
/// can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: PipelineOptions,
    rules: RuleSet,
}

impl Pipeline {
    #[must_use]
    pub fn new(options: PipelineOptions, rules: RuleSet) -> Self {
        Self { options, rules }
    }

    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Preprocess one document.
    #[must_use]
    pub fn run(&self, input: &str) -> Preprocessed {
        let normalized = input.replace("\r\n", "\n");
        let split = split_metadata(&normalized);
        let mut changes = ChangeLog::with_line_offset(split.body_line);
        let mut warnings = Vec::new();

        let (body, directive_present) = if self.options.bypass {
            tracing::debug!("Preprocessing bypassed");
            (split.body.to_owned(), false)
        } else {
            self.transform(split.body, &mut changes, &mut warnings)
        };

        let hints = RenderHints {
            heading_shift: heading_shift(&body),
            default_toc: self.options.toc.enabled && !directive_present,
            number_sections: self.options.number_sections,
        };
        tracing::debug!(
            changes = changes.len(),
            warnings = warnings.len(),
            heading_shift = hints.heading_shift,
            "Preprocessed document"
        );

        Preprocessed {
            markdown: split.reattach(&body),
            body,
            metadata: split.metadata,
            changes,
            warnings,
            hints,
        }
    }

    fn transform(
        &self,
        body: &str,
        changes: &mut ChangeLog,
        warnings: &mut Vec<String>,
    ) -> (String, bool) {
        let text = self.rules.apply(body, changes);
        tracing::debug!(rules = self.rules.len(), "Applied symbol map");

        let mut resolver = AnchorResolver::new();
        let text = resolver.process(&text, changes);
        warnings.extend_from_slice(resolver.warnings());
        let index = resolver.into_index();

        let text = normalize_link_destinations(&text, changes);

        let mut expander = ReferenceExpander::new(&index);
        let text = expander.process(&text, changes);
        warnings.extend(expander.into_warnings());

        let named = NamedReferences::new(
            self.options.namespaces.clone(),
            self.options.nameref_command.as_str(),
        );
        let text = named.process(&text, changes);
        let text = bare_hash(&text, changes);
        tracing::debug!(changes = changes.len(), "Expanded references");

        let text = normalize_heading_spacing(&text);
        let (text, directive_present) = apply_toc(&text, &self.options.toc, changes);
        tracing::debug!(directive_present, "Placed table of contents");

        (text, directive_present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_crlf_normalized() {
        let out = Pipeline::default().run("a {#b}\r\nc\r\n");
        assert_eq!(out.markdown, "a []{#b}\nc\n");
    }

    #[test]
    fn test_header_preserved_and_lines_offset() {
        let out = Pipeline::default().run("% Title\n% Ada\n\nnote {#n}\n");
        assert_eq!(out.markdown, "% Title\n% Ada\n\nnote []{#n}\n");
        assert_eq!(out.body, "note []{#n}\n");
        assert_eq!(out.metadata.authors, vec!["Ada"]);
        let change = out.changes.iter().next().unwrap();
        assert_eq!(change.kind, ChangeKind::Anchor);
        assert_eq!((change.line, change.column), (4, 6));
    }

    #[test]
    fn test_bypass_leaves_body_alone() {
        let options = PipelineOptions {
            bypass: true,
            ..PipelineOptions::default()
        };
        let out = Pipeline::new(options, RuleSet::new()).run("% T\n\n## A {#a}\ntext {#x} @a\n");
        assert_eq!(out.markdown, "% T\n\n## A {#a}\ntext {#x} @a\n");
        assert!(out.changes.is_empty());
        assert_eq!(out.metadata.title.as_deref(), Some("T"));
        assert_eq!(out.hints.heading_shift, -1);
        assert!(out.hints.default_toc);
    }

    #[test]
    fn test_hints() {
        let out = Pipeline::default().run("# Abstract\n\nA.\n\n# Body\n");
        assert_eq!(out.hints.heading_shift, 0);
        assert!(!out.hints.default_toc);
        assert!(out.hints.number_sections);

        let options = PipelineOptions {
            toc: TocOptions {
                enabled: false,
                ..TocOptions::default()
            },
            number_sections: false,
            ..PipelineOptions::default()
        };
        let out = Pipeline::new(options, RuleSet::new()).run("# Abstract\n\nA.\n");
        assert!(!out.hints.default_toc);
        assert!(!out.hints.number_sections);
    }

    #[test]
    fn test_warnings_collected() {
        let out = Pipeline::default().run("[A]{#a} [B]{#a} @missing\n");
        assert_eq!(out.warnings.len(), 2);
    }
}
