//! Protected region detection.
//!
//! Splits a buffer into prose and opaque spans (code and math) that no
//! rewriting pass may touch. Detection is staged and the order matters:
//!
//! 1. Fenced code blocks (line based, see [`fence`](crate::fence)).
//! 2. Inline code spans over what remains.
//! 3. Block math `$$...$$`.
//! 4. Inline math `$...$`.
//!
//! A later stage never starts or ends a region inside an earlier one, but a
//! math span may enclose a code span; such candidates are merged into one
//! region covering the union of both.

use std::ops::Range;

use crate::fence::fenced_blocks;
use crate::protect::is_sentinel_char;

/// Classification of a protected region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "snake_case"))]
pub enum RegionKind {
    /// Fenced code block (backticks or tildes).
    FencedCode,
    /// Inline code span.
    InlineCode,
    /// Display math delimited by `$$`.
    BlockMath,
    /// Inline math delimited by single `$`.
    InlineMath,
    /// A character from the sentinel alphabet that was already in the input.
    Reserved,
}

/// A half-open byte span `[start, end)` that rewriting passes must skip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub start: usize,
    pub end: usize,
}

impl Region {
    fn new(kind: RegionKind, range: Range<usize>) -> Self {
        Self {
            kind,
            start: range.start,
            end: range.end,
        }
    }

    /// Byte range of this region.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// A lexical token of the document: either prose or an opaque region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    Prose(&'a str),
    Protected { kind: RegionKind, text: &'a str },
}

/// Tokenize `text` into prose and protected spans covering the whole input.
///
/// # Example
///
/// ```
/// use pnpmd_core::{RegionKind, Token, tokenize};
///
/// let tokens = tokenize("See `@fake` here");
/// assert_eq!(tokens[0], Token::Prose("See "));
/// assert_eq!(
///     tokens[1],
///     Token::Protected { kind: RegionKind::InlineCode, text: "`@fake`" }
/// );
/// assert_eq!(tokens[2], Token::Prose(" here"));
/// ```
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    for region in scan_regions(text) {
        if region.start > cursor {
            tokens.push(Token::Prose(&text[cursor..region.start]));
        }
        tokens.push(Token::Protected {
            kind: region.kind,
            text: &text[region.range()],
        });
        cursor = region.end;
    }
    if cursor < text.len() {
        tokens.push(Token::Prose(&text[cursor..]));
    }
    tokens
}

/// Find all protected regions in `text`.
///
/// The result is sorted by start offset and contains no overlapping regions.
#[must_use]
pub fn scan_regions(text: &str) -> Vec<Region> {
    let mut scanner = Scanner::new(text);

    for block in fenced_blocks(text) {
        scanner.claim(Region::new(RegionKind::FencedCode, block.range));
    }
    scanner.scan_inline_code();
    scanner.scan_block_math();
    scanner.scan_inline_math();
    scanner.scan_reserved();

    merge(scanner.regions)
}

/// Byte-level scanner that remembers which bytes are already claimed.
struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    owner: Vec<Option<RegionKind>>,
    regions: Vec<Region>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            owner: vec![None; text.len()],
            regions: Vec::new(),
        }
    }

    fn claim(&mut self, region: Region) {
        for slot in &mut self.owner[region.range()] {
            if slot.is_none() {
                *slot = Some(region.kind);
            }
        }
        self.regions.push(region);
    }

    fn is_free(&self, pos: usize) -> bool {
        self.owner.get(pos).is_some_and(Option::is_none)
    }

    fn byte(&self, pos: usize) -> Option<u8> {
        self.bytes.get(pos).copied()
    }

    /// A delimiter is escaped when preceded by an odd number of backslashes.
    fn is_escaped(&self, pos: usize) -> bool {
        let preceding = self.bytes[..pos]
            .iter()
            .rev()
            .take_while(|&&b| b == b'\\')
            .count();
        preceding % 2 == 1
    }

    /// Whether the newline at `pos` starts a blank line (paragraph break).
    fn is_paragraph_break(&self, pos: usize) -> bool {
        if self.bytes[pos] != b'\n' {
            return false;
        }
        let rest = &self.bytes[pos + 1..];
        let indent = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
        matches!(rest.get(indent), None | Some(b'\n'))
    }

    fn run_length(&self, pos: usize, byte: u8) -> usize {
        self.bytes[pos..].iter().take_while(|&&b| b == byte).count()
    }

    fn scan_inline_code(&mut self) {
        let mut pos = 0;
        while pos < self.bytes.len() {
            if self.bytes[pos] != b'`' || !self.is_free(pos) {
                pos += 1;
                continue;
            }
            let ticks = self.run_length(pos, b'`');
            if self.is_escaped(pos) {
                pos += ticks;
                continue;
            }
            match self.find_closing_ticks(pos + ticks, ticks) {
                Some(end) => {
                    self.claim(Region::new(RegionKind::InlineCode, pos..end));
                    pos = end;
                }
                None => pos += ticks,
            }
        }
    }

    fn find_closing_ticks(&self, from: usize, ticks: usize) -> Option<usize> {
        let mut pos = from;
        while pos < self.bytes.len() {
            if !self.is_free(pos) || self.is_paragraph_break(pos) {
                return None;
            }
            if self.bytes[pos] == b'`' {
                let run = self.run_length(pos, b'`');
                if run == ticks {
                    return Some(pos + run);
                }
                pos += run;
            } else {
                pos += 1;
            }
        }
        None
    }

    fn is_double_dollar(&self, pos: usize) -> bool {
        self.byte(pos) == Some(b'$') && self.byte(pos + 1) == Some(b'$')
    }

    fn scan_block_math(&mut self) {
        let mut pos = 0;
        while pos + 1 < self.bytes.len() {
            if !self.is_double_dollar(pos)
                || !self.is_free(pos)
                || !self.is_free(pos + 1)
                || self.is_escaped(pos)
            {
                pos += 1;
                continue;
            }
            match self.find_closing_block_math(pos + 2) {
                Some(end) => {
                    self.claim(Region::new(RegionKind::BlockMath, pos..end));
                    pos = end;
                }
                None => pos += 2,
            }
        }
    }

    fn find_closing_block_math(&self, from: usize) -> Option<usize> {
        let mut pos = from;
        while pos + 1 < self.bytes.len() {
            if self.owner[pos] == Some(RegionKind::FencedCode) {
                return None;
            }
            if self.is_double_dollar(pos)
                && self.is_free(pos)
                && self.is_free(pos + 1)
                && !self.is_escaped(pos)
            {
                return Some(pos + 2);
            }
            pos += 1;
        }
        None
    }

    /// A single `$` that could delimit inline math: free, unescaped and not
    /// part of a `$$` pair.
    fn is_lone_dollar(&self, pos: usize) -> bool {
        self.byte(pos) == Some(b'$')
            && self.is_free(pos)
            && !self.is_escaped(pos)
            && (pos == 0 || self.bytes[pos - 1] != b'$')
            && self.byte(pos + 1) != Some(b'$')
    }

    fn scan_inline_math(&mut self) {
        let mut pos = 0;
        while pos < self.bytes.len() {
            let opens = self.is_lone_dollar(pos)
                && self
                    .byte(pos + 1)
                    .is_some_and(|b| !b.is_ascii_whitespace());
            if !opens {
                pos += 1;
                continue;
            }
            match self.find_closing_inline_math(pos + 1) {
                Some(end) => {
                    self.claim(Region::new(RegionKind::InlineMath, pos..end));
                    pos = end;
                }
                None => pos += 1,
            }
        }
    }

    fn find_closing_inline_math(&self, from: usize) -> Option<usize> {
        let mut pos = from;
        while pos < self.bytes.len() {
            match self.owner[pos] {
                Some(RegionKind::FencedCode | RegionKind::BlockMath) => return None,
                Some(_) => {
                    pos += 1;
                    continue;
                }
                None => {}
            }
            if self.is_paragraph_break(pos) {
                return None;
            }
            if self.is_lone_dollar(pos)
                && !self.bytes[pos - 1].is_ascii_whitespace()
                && !self.byte(pos + 1).is_some_and(|b| b.is_ascii_digit())
            {
                return Some(pos + 1);
            }
            pos += 1;
        }
        None
    }

    fn scan_reserved(&mut self) {
        let reserved: Vec<Region> = self
            .text
            .char_indices()
            .filter(|&(pos, c)| is_sentinel_char(c) && self.is_free(pos))
            .map(|(pos, c)| Region::new(RegionKind::Reserved, pos..pos + c.len_utf8()))
            .collect();
        for region in reserved {
            self.claim(region);
        }
    }
}

/// Sort regions and merge overlapping ones into their union.
///
/// The merged region keeps the kind of the earliest-starting candidate.
fn merge(mut regions: Vec<Region>) -> Vec<Region> {
    regions.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut merged: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if region.start < last.end => last.end = last.end.max(region.end),
            _ => merged.push(region),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(text: &str) -> Vec<(RegionKind, &str)> {
        scan_regions(text)
            .into_iter()
            .map(|r| (r.kind, &text[r.range()]))
            .collect()
    }

    #[test]
    fn test_no_regions() {
        assert!(scan_regions("Plain prose with @ref and {#id}.").is_empty());
    }

    #[test]
    fn test_inline_code_matching_tick_runs() {
        assert_eq!(
            spans("a ``x ` y`` b `z` c"),
            vec![
                (RegionKind::InlineCode, "``x ` y``"),
                (RegionKind::InlineCode, "`z`"),
            ]
        );
    }

    #[test]
    fn test_unmatched_backtick_is_prose() {
        assert!(scan_regions("it`s fine").is_empty());
    }

    #[test]
    fn test_inline_code_stops_at_blank_line() {
        assert!(scan_regions("open ` here\n\nclose ` there").is_empty());
    }

    #[test]
    fn test_fence_wins_over_inline_code() {
        let text = "```\n`not inline\n```\nand `code`";
        assert_eq!(
            spans(text),
            vec![
                (RegionKind::FencedCode, "```\n`not inline\n```"),
                (RegionKind::InlineCode, "`code`"),
            ]
        );
    }

    #[test]
    fn test_block_math_spans_lines() {
        let text = "before\n$$\na = b\n$$\nafter";
        assert_eq!(spans(text), vec![(RegionKind::BlockMath, "$$\na = b\n$$")]);
    }

    #[test]
    fn test_inline_math() {
        assert_eq!(
            spans("where $x^2$ holds"),
            vec![(RegionKind::InlineMath, "$x^2$")]
        );
    }

    #[test]
    fn test_escaped_dollar_does_not_terminate() {
        assert_eq!(
            spans(r"cost $a \$ b$ end"),
            vec![(RegionKind::InlineMath, r"$a \$ b$")]
        );
    }

    #[test]
    fn test_currency_is_not_math() {
        assert!(scan_regions("it costs $5 and $10 today").is_empty());
    }

    #[test]
    fn test_double_dollar_not_inline_math() {
        assert!(scan_regions("lonely $$ marker").is_empty());
    }

    #[test]
    fn test_math_enclosing_code_is_merged() {
        assert_eq!(
            spans("x $a `b` c$ y"),
            vec![(RegionKind::InlineMath, "$a `b` c$")]
        );
    }

    #[test]
    fn test_code_found_before_math() {
        assert_eq!(
            spans("$a `b$ c` d"),
            vec![(RegionKind::InlineCode, "`b$ c`")]
        );
    }

    #[test]
    fn test_reserved_characters_are_protected() {
        let text = "odd \u{F0000} char";
        assert_eq!(spans(text), vec![(RegionKind::Reserved, "\u{F0000}")]);
    }

    #[test]
    fn test_tokenize_covers_input() {
        let text = "a `b` c $d$ e";
        let rebuilt: String = tokenize(text)
            .into_iter()
            .map(|t| match t {
                Token::Prose(s) | Token::Protected { text: s, .. } => s,
            })
            .collect();
        assert_eq!(rebuilt, text);
    }
}
