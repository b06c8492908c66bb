//! Cross-reference rewriting.
//!
//! Four passes, run in this order by the pipeline:
//!
//! 1. [`normalize_link_destinations`]: `](@id)` becomes `](#id)`.
//! 2. [`ReferenceExpander`]: `@id` / `[@id]` become links, using the labels
//!    and anchors collected by the anchor resolver.
//! 3. [`NamedReferences`]: `@ns:id` becomes `\nameref{ns:id}` for the
//!    configured namespaces.
//! 4. [`bare_hash`]: stray `#id` in prose becomes `[](#id)`.
//!
//! Every pass masks code and math first.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::anchors::AnchorIndex;
use crate::changes::{ChangeKind, ChangeLog};
use crate::heading::is_heading_line;
use crate::protect::Protected;

static DESTINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\([ \t]*@([A-Za-z0-9_:-]+)[ \t]*\)").unwrap());

/// Default cross-reference namespaces.
pub const DEFAULT_NAMESPACES: [&str; 4] = ["sec", "fig", "eq", "tbl"];

/// Default named reference command.
pub const DEFAULT_NAMEREF_COMMAND: &str = "nameref";

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-')
}

/// Take an identifier from the start of `s`.
///
/// Trailing `:` and `-` are not part of the identifier, so `@intro:` and
/// `@intro-` end before the punctuation.
fn take_id(s: &str) -> &str {
    let end = s.find(|c: char| !is_id_char(c)).unwrap_or(s.len());
    s[..end].trim_end_matches([':', '-'])
}

/// Rewrite `](@id)` link destinations to `](#id)`.
pub fn normalize_link_destinations(input: &str, log: &mut ChangeLog) -> String {
    let protected = Protected::new(input);
    let masked = protected.masked();
    let mut locator = protected.locator(masked);

    let rewritten = protected.map_prose(masked, |offset, prose| {
        let mut out = String::with_capacity(prose.len());
        let mut last = 0;
        for caps in DESTINATION_RE.captures_iter(prose) {
            let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let replacement = format!("](#{})", id.as_str());
            log.record(
                ChangeKind::LinkDestination,
                locator.locate(offset + whole.start()),
                whole.as_str(),
                &replacement,
            );
            out.push_str(&prose[last..whole.start()]);
            out.push_str(&replacement);
            last = whole.end();
        }
        out.push_str(&prose[last..]);
        out
    });

    protected.restore(&rewritten)
}

/// An `@id` or `[@id]` token in a masked buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AtToken<'a> {
    /// Byte offset of the token (the `[` for bracketed tokens).
    start: usize,
    end: usize,
    id: &'a str,
    bracketed: bool,
}

/// Byte ranges of bracketed text directly followed by `(`, `[` or `{`: link
/// text, reference link text and `[label]{#id}` spans. Nothing inside them is
/// rewritten, so labels copied into links stay exactly as written.
fn bracket_spans(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut open = Vec::new();
    let mut spans = Vec::new();
    for (pos, &b) in bytes.iter().enumerate() {
        match b {
            b'[' => open.push(pos),
            b']' => {
                if let Some(start) = open.pop()
                    && matches!(bytes.get(pos + 1), Some(b'(' | b'[' | b'{'))
                {
                    spans.push(start..pos + 1);
                }
            }
            // Brackets never pair across a paragraph break.
            b'\n' if bytes.get(pos + 1) == Some(&b'\n') => open.clear(),
            _ => {}
        }
    }
    spans
}

fn in_spans(spans: &[Range<usize>], pos: usize) -> bool {
    spans.iter().any(|span| span.contains(&pos))
}

/// Characters that make an `@` part of a larger word (emails, handles, paths).
///
/// `)` and `}` close the output of an earlier rewrite (`[..](#a)@b`,
/// `\nameref{sec:a}@b`), where the `@` was glued to an identifier before.
fn blocks_at(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '.' | '_' | '%' | '+' | '/' | '@' | '-' | ')' | '}')
}

/// Find reference tokens in `text`.
///
/// Tokens inside link text or a `[label]{#id}` span are skipped entirely.
fn at_tokens(text: &str) -> Vec<AtToken<'_>> {
    let spans = bracket_spans(text);
    let mut tokens = Vec::new();
    let mut search = 0;

    while let Some(found) = text[search..].find('@') {
        let at = search + found;
        search = at + 1;

        if in_spans(&spans, at) || text[..at].chars().next_back().is_some_and(blocks_at) {
            continue;
        }
        let id = take_id(&text[at + 1..]);
        if id.is_empty() {
            continue;
        }
        let id_end = at + 1 + id.len();

        let before = text[..at].trim_end_matches([' ', '\t']);
        let after = text[id_end..].trim_start_matches([' ', '\t']);
        if before.ends_with('[') && after.starts_with(']') {
            let start = before.len() - 1;
            let end = text.len() - after.len() + 1;
            tokens.push(AtToken {
                start,
                end,
                id,
                bracketed: true,
            });
            search = end;
        } else {
            tokens.push(AtToken {
                start: at,
                end: id_end,
                id,
                bracketed: false,
            });
            search = id_end;
        }
    }

    tokens
}

/// Rewrite the tokens of `input` selected by `rewrite`, logging each one.
fn rewrite_tokens<F>(input: &str, kind: ChangeKind, log: &mut ChangeLog, mut rewrite: F) -> String
where
    F: FnMut(&AtToken<'_>) -> Option<String>,
{
    let protected = Protected::new(input);
    let masked = protected.masked();
    let mut locator = protected.locator(masked);
    let mut out = String::with_capacity(masked.len());
    let mut last = 0;

    for token in at_tokens(masked) {
        let Some(replacement) = rewrite(&token) else {
            continue;
        };
        let original = &masked[token.start..token.end];
        log.record(kind, locator.locate(token.start), original, &replacement);
        out.push_str(&masked[last..token.start]);
        out.push_str(&replacement);
        last = token.end;
    }
    out.push_str(&masked[last..]);

    protected.restore(&out)
}

/// Expands `@id` and `[@id]` using the document's anchor index.
///
/// Resolution order for an identifier without a colon:
///
/// 1. a label from `[label]{#id}` gives `[label](#id)`;
/// 2. a known anchor gives `[@id](#id)`;
/// 3. anything else is left as written and reported as a warning.
///
/// The bracketed form wraps the resulting link in one more pair of brackets.
#[derive(Debug)]
pub struct ReferenceExpander<'i> {
    index: &'i AnchorIndex,
    warnings: Vec<String>,
}

impl<'i> ReferenceExpander<'i> {
    #[must_use]
    pub fn new(index: &'i AnchorIndex) -> Self {
        Self {
            index,
            warnings: Vec::new(),
        }
    }

    /// Unresolved references seen so far.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[must_use]
    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    pub fn process(&mut self, input: &str, log: &mut ChangeLog) -> String {
        let index = self.index;
        let warnings = &mut self.warnings;

        rewrite_tokens(input, ChangeKind::Reference, log, |token| {
            if token.id.contains(':') {
                return None;
            }
            let link = if let Some(label) = index.label(token.id) {
                format!("[{label}](#{})", token.id)
            } else if index.is_known(token.id) {
                format!("[@{id}](#{id})", id = token.id)
            } else {
                tracing::warn!(id = token.id, "Unresolved reference");
                warnings.push(format!("unresolved reference `@{}`", token.id));
                return None;
            };
            Some(if token.bracketed {
                format!("[{link}]")
            } else {
                link
            })
        })
    }
}

/// Rewrites namespaced references (`@sec:intro`) to a named reference
/// directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedReferences {
    namespaces: Vec<String>,
    command: String,
}

impl Default for NamedReferences {
    fn default() -> Self {
        Self {
            namespaces: DEFAULT_NAMESPACES.iter().map(|&ns| ns.to_owned()).collect(),
            command: DEFAULT_NAMEREF_COMMAND.to_owned(),
        }
    }
}

impl NamedReferences {
    #[must_use]
    pub fn new(namespaces: Vec<String>, command: impl Into<String>) -> Self {
        Self {
            namespaces,
            command: command.into(),
        }
    }

    fn handles(&self, id: &str) -> bool {
        id.split_once(':')
            .is_some_and(|(ns, rest)| !rest.is_empty() && self.namespaces.iter().any(|n| n == ns))
    }

    /// Rewrite `@ns:id` to `\command{ns:id}`; `[@ns:id]` keeps its brackets.
    pub fn process(&self, input: &str, log: &mut ChangeLog) -> String {
        rewrite_tokens(input, ChangeKind::NamedReference, log, |token| {
            if !self.handles(token.id) {
                return None;
            }
            let directive = format!("\\{}{{{}}}", self.command, token.id);
            Some(if token.bracketed {
                format!("[{directive}]")
            } else {
                directive
            })
        })
    }
}

/// Characters that make a `#` part of something else: a heading marker, a
/// word, an attribute block, a link target, an entity, a URL fragment or the
/// `)` ending an earlier `[](#id)` rewrite.
fn blocks_hash(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '#' | '_' | '{' | '(' | ')' | '&' | '/' | '\\')
}

/// Rewrite stray `#id` in prose to an empty link `[](#id)`.
///
/// Heading lines are left alone, as is anything inside an unclosed `{` on
/// the same line (attribute blocks such as `{.class #id}`), link text and
/// `[label]{#id}` spans.
pub fn bare_hash(input: &str, log: &mut ChangeLog) -> String {
    let protected = Protected::new(input);
    let masked = protected.masked();
    let spans = bracket_spans(masked);
    let mut locator = protected.locator(masked);
    let mut out = String::with_capacity(masked.len());
    let mut offset = 0;

    for (i, line) in masked.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if is_heading_line(line) {
            out.push_str(line);
            offset += line.len() + 1;
            continue;
        }

        let mut last = 0;
        for (pos, _) in line.match_indices('#') {
            if pos < last {
                continue;
            }
            if line[..pos].chars().next_back().is_some_and(blocks_hash) {
                continue;
            }
            if inside_braces(&line[..pos]) || in_spans(&spans, offset + pos) {
                continue;
            }
            let id = take_id(&line[pos + 1..]);
            if id.is_empty() {
                continue;
            }
            let end = pos + 1 + id.len();
            if line[end..].starts_with('(') {
                continue;
            }

            let replacement = format!("[](#{id})");
            log.record(
                ChangeKind::BareHash,
                locator.locate(offset + pos),
                &line[pos..end],
                &replacement,
            );
            out.push_str(&line[last..pos]);
            out.push_str(&replacement);
            last = end;
        }
        out.push_str(&line[last..]);
        offset += line.len() + 1;
    }

    protected.restore(&out)
}

fn inside_braces(prefix: &str) -> bool {
    let mut depth = 0usize;
    for c in prefix.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::LabelMap;
    use pretty_assertions::assert_eq;

    fn index() -> AnchorIndex {
        let mut labels = LabelMap::new();
        labels.insert("intro", "Intro");
        AnchorIndex {
            labels,
            known: ["methods".to_owned(), "note".to_owned()].into_iter().collect(),
        }
    }

    fn expand(input: &str) -> (String, Vec<String>) {
        let index = index();
        let mut expander = ReferenceExpander::new(&index);
        let mut log = ChangeLog::new();
        let out = expander.process(input, &mut log);
        (out, expander.into_warnings())
    }

    #[test]
    fn test_destination_normalized() {
        let mut log = ChangeLog::new();
        let out = normalize_link_destinations("[a](@x) and [b]( @sec:y ) `[c](@z)`", &mut log);
        assert_eq!(out, "[a](#x) and [b](#sec:y) `[c](@z)`");
        assert_eq!(log.count(ChangeKind::LinkDestination), 2);
    }

    #[test]
    fn test_label_wins_over_known() {
        let (out, warnings) = expand("See @intro for details.");
        assert_eq!(out, "See [Intro](#intro) for details.");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_known_anchor_self_labeled() {
        let (out, _) = expand("See @methods.");
        assert_eq!(out, "See [@methods](#methods).");
    }

    #[test]
    fn test_bracketed_form_wrapped() {
        let (out, _) = expand("as in [@intro] and [ @note ]");
        assert_eq!(out, "as in [[Intro](#intro)] and [[@note](#note)]");
    }

    #[test]
    fn test_unresolved_left_alone() {
        let (out, warnings) = expand("ask @nobody");
        assert_eq!(out, "ask @nobody");
        assert_eq!(warnings, vec!["unresolved reference `@nobody`".to_owned()]);
    }

    #[test]
    fn test_email_and_code_untouched() {
        let (out, warnings) = expand("mail me@intro.org or `@intro`");
        assert_eq!(out, "mail me@intro.org or `@intro`");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_trailing_punctuation_not_in_id() {
        let (out, _) = expand("(see @intro-), @methods: done");
        assert_eq!(out, "(see [Intro](#intro)-), [@methods](#methods): done");
    }

    #[test]
    fn test_link_label_skipped() {
        let (out, _) = expand("[@methods](#methods) and [@intro][ref]");
        assert_eq!(out, "[@methods](#methods) and [@intro][ref]");
    }

    #[test]
    fn test_colon_ids_not_expanded() {
        let (out, warnings) = expand("@sec:intro and [@fig:a]");
        assert_eq!(out, "@sec:intro and [@fig:a]");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_named_references() {
        let mut log = ChangeLog::new();
        let named = NamedReferences::default();
        let out = named.process("@sec:results, [@fig:plot] and @foo:bar", &mut log);
        assert_eq!(out, "\\nameref{sec:results}, [\\nameref{fig:plot}] and @foo:bar");
        assert_eq!(log.count(ChangeKind::NamedReference), 2);
    }

    #[test]
    fn test_named_references_custom_command() {
        let mut log = ChangeLog::new();
        let named = NamedReferences::new(vec!["thm".to_owned()], "autoref");
        let out = named.process("by @thm:main", &mut log);
        assert_eq!(out, "by \\autoref{thm:main}");
    }

    #[test]
    fn test_bare_hash_rewritten() {
        let mut log = ChangeLog::new();
        let out = bare_hash("see #orphan here", &mut log);
        assert_eq!(out, "see [](#orphan) here");
        let change = log.iter().next().unwrap();
        assert_eq!((change.line, change.column), (1, 5));
    }

    #[test]
    fn test_bare_hash_skips_links_anchors_and_headings() {
        let mut log = ChangeLog::new();
        let input = "# Title\n\n[a](#x) []{#y} [](#z) {.c #w} a#b &#123; http://h/#f `#c`";
        assert_eq!(bare_hash(input, &mut log), input);
        assert!(log.is_empty());
    }

    #[test]
    fn test_bare_hash_before_paren_skipped() {
        let mut log = ChangeLog::new();
        assert_eq!(bare_hash("call #f(x)", &mut log), "call #f(x)");
    }

    #[test]
    fn test_bare_hash_line_start() {
        let mut log = ChangeLog::new();
        assert_eq!(bare_hash("#tag only", &mut log), "[](#tag) only");
    }

    #[test]
    fn test_label_span_contents_untouched() {
        let (out, warnings) = expand("[Mail @methods]{#m} and [see @intro](http://x)");
        assert_eq!(out, "[Mail @methods]{#m} and [see @intro](http://x)");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_expanded_label_is_stable() {
        let mut labels = LabelMap::new();
        labels.insert("m", "Mail @methods");
        let index = AnchorIndex {
            labels,
            known: ["methods".to_owned()].into_iter().collect(),
        };
        let mut log = ChangeLog::new();
        let once = ReferenceExpander::new(&index).process("See @m.", &mut log);
        assert_eq!(once, "See [Mail @methods](#m).");
        let twice = ReferenceExpander::new(&index).process(&once, &mut log);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_at_after_rewrite_output_is_stable() {
        let (once, _) = expand("@methods@intro");
        assert_eq!(once, "[@methods](#methods)@intro");
        let (twice, _) = expand(&once);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_bare_hash_adjacent_runs_are_stable() {
        let mut log = ChangeLog::new();
        let once = bare_hash("#a#b and )#c", &mut log);
        assert_eq!(once, "[](#a)#b and )#c");
        assert_eq!(bare_hash(&once, &mut log), once);
    }

    #[test]
    fn test_bare_hash_skips_label_text() {
        let mut log = ChangeLog::new();
        let input = "[Foo #bar]{#x} and [see #baz](#x)";
        assert_eq!(bare_hash(input, &mut log), input);
        assert!(log.is_empty());
    }

    #[test]
    fn test_bracket_spans() {
        let text = "[a]{#x} [b] [[c](#y)] [d][e]\n\n[f\n\n](g)";
        let spans: Vec<&str> = bracket_spans(text).into_iter().map(|r| &text[r]).collect();
        assert_eq!(spans, vec!["[a]", "[c]", "[d]"]);
    }
}
