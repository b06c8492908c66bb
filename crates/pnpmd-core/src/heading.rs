//! ATX headings: parsing, slugs and level shifting.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::protect::Protected;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})[ \t]+(.+?)(?:[ \t]+\{([^}]*)\})?[ \t]*$").unwrap()
});

static ATTR_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)#([A-Za-z0-9_:-]+)").unwrap());

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());

static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_~`]+").unwrap());

/// A parsed ATX heading line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading<'a> {
    /// Heading level (1-6).
    pub level: u8,
    /// Title text without the attribute block.
    pub title: &'a str,
    /// Contents of a trailing `{...}` attribute block.
    pub attrs: Option<&'a str>,
}

impl Heading<'_> {
    /// Identifier declared in the attribute block (`{#id .class}`).
    #[must_use]
    pub fn explicit_id(&self) -> Option<&str> {
        let attrs = self.attrs?;
        ATTR_ID_RE
            .captures(attrs)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Parse `line` as an ATX heading.
#[must_use]
pub fn parse_heading(line: &str) -> Option<Heading<'_>> {
    let caps = HEADING_RE.captures(line)?;
    let hashes = caps.get(1)?.as_str();
    Some(Heading {
        level: u8::try_from(hashes.len()).ok()?,
        title: caps.get(2)?.as_str(),
        attrs: caps.get(3).map(|m| m.as_str()),
    })
}

/// Whether `line` is an ATX heading line.
#[must_use]
pub fn is_heading_line(line: &str) -> bool {
    HEADING_RE.is_match(line)
}

/// Compute the automatic identifier for a heading title.
///
/// Link markup is reduced to its text and emphasis markers are dropped. The
/// rest is lowercased, everything but ASCII alphanumerics, spaces and `-`
/// is removed, whitespace runs become single hyphens and repeated
/// hyphens collapse. An empty result becomes `x`.
///
/// ```
/// use pnpmd_core::slugify;
///
/// assert_eq!(slugify("Results & *Discussion*"), "results-discussion");
/// assert_eq!(slugify("See [the docs](http://x)"), "see-the-docs");
/// assert_eq!(slugify("???"), "x");
/// ```
#[must_use]
pub fn slugify(title: &str) -> String {
    let unlinked = LINK_RE.replace_all(title, "$1");
    let plain = EMPHASIS_RE.replace_all(&unlinked, "");

    let kept: String = plain
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '\t' | '-'))
        .collect();

    let mut slug = String::with_capacity(kept.len());
    for word in kept.split_whitespace() {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(word);
    }

    let mut collapsed = String::with_capacity(slug.len());
    for c in slug.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        "x".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Hands out heading identifiers, disambiguating duplicate slugs.
#[derive(Debug, Default)]
pub(crate) struct SlugCounter {
    seen: HashMap<String, usize>,
}

impl SlugCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Identifier for `heading`: its explicit id, otherwise a slug of its
    /// title with `-1`, `-2`... appended to repeats.
    pub(crate) fn identifier(&mut self, heading: &Heading<'_>) -> String {
        if let Some(id) = heading.explicit_id() {
            self.seen.entry(id.to_owned()).or_insert(0);
            return id.to_owned();
        }
        let slug = slugify(heading.title);
        match self.seen.get_mut(&slug) {
            Some(count) => {
                *count += 1;
                let id = format!("{slug}-{count}");
                self.seen.entry(id.clone()).or_insert(0);
                id
            }
            None => {
                self.seen.insert(slug.clone(), 0);
                slug
            }
        }
    }
}

/// Smallest heading level outside protected regions.
#[must_use]
pub fn min_heading_level(text: &str) -> Option<u8> {
    let protected = Protected::new(text);
    protected
        .masked()
        .lines()
        .filter_map(parse_heading)
        .map(|h| h.level)
        .min()
}

/// Level shift that brings the shallowest heading to level 1.
///
/// Returns `1 - k` when the shallowest heading has level `k > 1`, and `0`
/// when it is already level 1 or the document has no headings. The shift is
/// never positive.
///
/// ```
/// use pnpmd_core::heading_shift;
///
/// assert_eq!(heading_shift("## A\n\n### B\n"), -1);
/// assert_eq!(heading_shift("# A\n"), 0);
/// ```
#[must_use]
pub fn heading_shift(text: &str) -> i8 {
    match min_heading_level(text) {
        Some(level) if level > 1 => 1 - i8::try_from(level).unwrap_or(1),
        _ => 0,
    }
}

/// Apply a (non-positive) level shift to every heading outside protected
/// regions.
#[must_use]
pub fn shift_headings(text: &str, shift: i8) -> String {
    if shift >= 0 {
        return text.to_owned();
    }
    let drop = usize::from(shift.unsigned_abs());
    let protected = Protected::new(text);
    let shifted: Vec<&str> = protected
        .masked()
        .split('\n')
        .map(|line| match parse_heading(line) {
            Some(h) if usize::from(h.level) > drop => &line[drop..],
            _ => line,
        })
        .collect();
    protected.restore(&shifted.join("\n"))
}
