//! Symbol map rules.
//!
//! A rule file is line oriented:
//!
//! ```text
//! # comment
//! α=\alpha
//! /-{2,3}>/=→
//! ```
//!
//! Each `lhs=rhs` line becomes one compiled matcher. A left-hand side wrapped
//! in slashes is a regular expression; anything else matches literally. A
//! right-hand side starting with a backslash is a TeX macro and is wrapped in
//! `$...$` when substituted.
//!
//! Rules run one after another over the prose of the document, each rule
//! seeing the output of the previous one. Regex rules run before literal ones.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::changes::{ChangeKind, ChangeLog};
use crate::protect::Protected;

/// Error raised while compiling a rule table.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("{origin}:{line}: invalid regex /{pattern}/: {source}")]
    InvalidRegex {
        origin: String,
        line: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// How a rule's left-hand side is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "snake_case"))]
pub enum RuleKind {
    Regex,
    Literal,
}

/// A compiled substitution rule.
#[derive(Clone, Debug)]
pub struct Rule {
    kind: RuleKind,
    pattern: String,
    replacement: String,
    line: usize,
    matcher: Regex,
}

impl Rule {
    #[must_use]
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// Left-hand side as written, without the regex slashes.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Text inserted for every match (already wrapped in `$...$` for macros).
    #[must_use]
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Line of the rule file this rule was read from.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RuleKind::Regex => write!(f, "/{}/ -> {}", self.pattern, self.replacement),
            RuleKind::Literal => write!(f, "{} -> {}", self.pattern, self.replacement),
        }
    }
}

/// Ordered list of compiled rules.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    origin: String,
}

impl RuleSet {
    /// An empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and compile a rule table.
    ///
    /// `origin` names the source (usually a file path) in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidRegex`] for the first regex rule that fails
    /// to compile. No partial rule set is ever returned.
    pub fn parse(source: &str, origin: &str) -> Result<Self, RuleError> {
        let mut regex_rules = Vec::new();
        let mut literal_rules = Vec::new();

        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((lhs, rhs)) = line.split_once('=') else {
                continue;
            };
            let lhs = lhs.trim_matches([' ', '\t']);
            let rhs = rhs.trim_matches([' ', '\t']);
            if lhs.is_empty() {
                continue;
            }

            let replacement = if rhs.starts_with('\\') {
                format!("${rhs}$")
            } else {
                rhs.to_owned()
            };

            if let Some(pattern) = regex_body(lhs) {
                let matcher = RegexBuilder::new(pattern)
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|source| RuleError::InvalidRegex {
                        origin: origin.to_owned(),
                        line: line_no,
                        pattern: pattern.to_owned(),
                        source,
                    })?;
                regex_rules.push(Rule {
                    kind: RuleKind::Regex,
                    pattern: pattern.to_owned(),
                    replacement,
                    line: line_no,
                    matcher,
                });
            } else {
                let matcher = Regex::new(&regex::escape(lhs)).map_err(|source| {
                    RuleError::InvalidRegex {
                        origin: origin.to_owned(),
                        line: line_no,
                        pattern: lhs.to_owned(),
                        source,
                    }
                })?;
                literal_rules.push(Rule {
                    kind: RuleKind::Literal,
                    pattern: lhs.to_owned(),
                    replacement,
                    line: line_no,
                    matcher,
                });
            }
        }

        regex_rules.append(&mut literal_rules);
        tracing::debug!(origin, rules = regex_rules.len(), "Compiled rule table");

        Ok(Self {
            rules: regex_rules,
            origin: origin.to_owned(),
        })
    }

    /// Where the rules were read from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Rules in application order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule to the prose of `text`.
    ///
    /// Code and math are masked before the first rule runs and stay masked
    /// until the last one is done.
    #[must_use]
    pub fn apply(&self, text: &str, log: &mut ChangeLog) -> String {
        if self.rules.is_empty() {
            return text.to_owned();
        }

        let protected = Protected::new(text);
        let mut masked = protected.masked().to_owned();

        for rule in &self.rules {
            let mut locator = protected.locator(&masked);
            let next = protected.map_prose(&masked, |offset, prose| {
                let mut out = String::with_capacity(prose.len());
                let mut last = 0;
                for m in rule.matcher.find_iter(prose) {
                    if m.is_empty() {
                        continue;
                    }
                    out.push_str(&prose[last..m.start()]);
                    out.push_str(&rule.replacement);
                    log.record(
                        ChangeKind::Mapping,
                        locator.locate(offset + m.start()),
                        m.as_str(),
                        &rule.replacement,
                    );
                    last = m.end();
                }
                out.push_str(&prose[last..]);
                out
            });
            masked = next;
        }

        protected.restore(&masked)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Body of a `/.../` pattern, if `lhs` is one.
fn regex_body(lhs: &str) -> Option<&str> {
    if lhs.len() < 3 {
        return None;
    }
    lhs.strip_prefix('/')?.strip_suffix('/')
}
