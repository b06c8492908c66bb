//! Anchor resolution.
//!
//! Walks the masked document line by line and classifies every `{#id}`:
//!
//! - `[label]{#id}` binds `id` to `label` in the [`LabelMap`];
//! - `[]{#id}` (or `[] {#id}`) is already an empty-span anchor;
//! - a bare `{#id}` in prose becomes `[]{#id}`;
//! - ids containing a colon belong to a cross-reference namespace and are
//!   left alone.
//!
//! Heading lines are never rewritten. Their identifiers (explicit attribute
//! id or automatic slug) join the set of known anchors.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::changes::{ChangeKind, ChangeLog};
use crate::heading::{SlugCounter, parse_heading};
use crate::protect::Protected;

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{#([A-Za-z0-9_:-]+)\}").unwrap());

/// Identifier to label bindings, in declaration order.
///
/// The first binding of an identifier wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl LabelMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `label` unless it is already bound.
    ///
    /// Returns `false` when an earlier binding was kept.
    pub fn insert(&mut self, id: impl Into<String>, label: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push((id, label.into()));
        true
    }

    /// Label bound to `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&str> {
        self.index
            .get(id)
            .and_then(|&i| self.entries.get(i))
            .map(|(_, label)| label.as_str())
    }

    /// Bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(id, label)| (id.as_str(), label.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Heading identifiers and empty-span anchors.
pub type KnownAnchors = BTreeSet<String>;

/// Everything the reference passes need to know about a document's anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorIndex {
    pub labels: LabelMap,
    pub known: KnownAnchors,
}

impl AnchorIndex {
    /// Label recorded for `id`.
    #[must_use]
    pub fn label(&self, id: &str) -> Option<&str> {
        self.labels.get(id)
    }

    /// Whether `id` is a heading identifier or an empty-span anchor.
    #[must_use]
    pub fn is_known(&self, id: &str) -> bool {
        self.known.contains(id)
    }
}

/// Normalizes bare anchors and builds the [`AnchorIndex`].
///
/// # Example
///
/// ```
/// use pnpmd_core::{AnchorResolver, ChangeLog};
///
/// let mut resolver = AnchorResolver::new();
/// let mut log = ChangeLog::new();
/// let out = resolver.process("# Intro\n\n[Foo]{#foo} and a note {#n1}.\n", &mut log);
///
/// assert_eq!(out, "# Intro\n\n[Foo]{#foo} and a note []{#n1}.\n");
/// let index = resolver.into_index();
/// assert_eq!(index.label("foo"), Some("Foo"));
/// assert!(index.is_known("intro"));
/// assert!(index.is_known("n1"));
/// ```
#[derive(Debug, Default)]
pub struct AnchorResolver {
    index: AnchorIndex,
    slugs: SlugCounter,
    warnings: Vec<String>,
}

impl AnchorResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Warnings collected so far (duplicate label bindings).
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The index built so far.
    #[must_use]
    pub fn index(&self) -> &AnchorIndex {
        &self.index
    }

    /// Consume the resolver, returning the index.
    #[must_use]
    pub fn into_index(self) -> AnchorIndex {
        self.index
    }

    /// Resolve anchors in `input`, returning the rewritten text.
    pub fn process(&mut self, input: &str, log: &mut ChangeLog) -> String {
        let protected = Protected::new(input);
        let masked = protected.masked();
        let mut locator = protected.locator(masked);
        let mut out = String::with_capacity(masked.len() + 16);
        let mut offset = 0;

        for (i, line) in masked.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
            }

            if parse_heading(line).is_some() {
                let restored = protected.restore(line);
                if let Some(heading) = parse_heading(&restored) {
                    let id = self.slugs.identifier(&heading);
                    self.index.known.insert(id);
                }
                out.push_str(line);
            } else {
                let mut last = 0;
                for caps in ANCHOR_RE.captures_iter(line) {
                    let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                        continue;
                    };
                    let id = id.as_str();
                    if id.contains(':') {
                        continue;
                    }
                    let prefix = &line[..whole.start()];

                    if prefix.trim_end_matches([' ', '\t']).ends_with("[]") {
                        self.index.known.insert(id.to_owned());
                        continue;
                    }
                    if prefix.ends_with(']') {
                        if let Some(label) = label_before(prefix) {
                            self.bind(id, &protected.restore(label));
                        }
                        continue;
                    }
                    if prefix.ends_with(')') {
                        // Attribute block of a link or image.
                        continue;
                    }

                    let replacement = format!("[]{}", whole.as_str());
                    log.record(
                        ChangeKind::Anchor,
                        locator.locate(offset + whole.start()),
                        whole.as_str(),
                        &replacement,
                    );
                    out.push_str(&line[last..whole.start()]);
                    out.push_str(&replacement);
                    last = whole.end();
                    self.index.known.insert(id.to_owned());
                }
                out.push_str(&line[last..]);
            }

            offset += line.len() + 1;
        }

        tracing::debug!(
            labels = self.index.labels.len(),
            known = self.index.known.len(),
            "Resolved anchors"
        );
        protected.restore(&out)
    }

    fn bind(&mut self, id: &str, label: &str) {
        let label = label.trim();
        if label.is_empty() {
            self.index.known.insert(id.to_owned());
            return;
        }
        if self.index.labels.insert(id, label) {
            return;
        }
        let kept = self.index.labels.get(id).unwrap_or_default();
        if kept != label {
            tracing::warn!(id, kept, ignored = label, "Duplicate label binding");
            self.warnings.push(format!(
                "duplicate label for `{id}`: keeping \"{kept}\", ignoring \"{label}\""
            ));
        }
    }
}

/// Text between the `]` ending `prefix` and its matching `[`.
fn label_before(prefix: &str) -> Option<&str> {
    let close = prefix.len().checked_sub(1)?;
    let mut depth = 0usize;
    for (pos, c) in prefix[..close].char_indices().rev() {
        match c {
            ']' => depth += 1,
            '[' if depth == 0 => return Some(&prefix[pos + 1..close]),
            '[' => depth -= 1,
            _ => {}
        }
    }
    None
}
