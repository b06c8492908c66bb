//! Sentinel masking of protected regions.
//!
//! [`Protected`] replaces every region found by [`scan_regions`] with a
//! sentinel token so that line- and regex-based passes can run over the
//! masked buffer without seeing code or math. Sentinels are spelled entirely
//! with Supplementary Private Use Area code points, so no ASCII pattern can
//! match inside one, and any such code point already present in the input is
//! itself protected. The round trip through [`Protected::restore`] is
//! therefore lossless for every input.

use crate::changes::Location;
use crate::region::{Region, RegionKind, scan_regions};

const OPEN: char = '\u{F0000}';
const CLOSE: char = '\u{F0001}';
/// First of sixteen code points used as hexadecimal digits of the index.
const DIGIT_BASE: u32 = 0xF0010;

/// Whether `c` belongs to the sentinel alphabet.
pub(crate) fn is_sentinel_char(c: char) -> bool {
    ('\u{F0000}'..='\u{F001F}').contains(&c)
}

fn sentinel(index: usize) -> String {
    let mut token = String::new();
    token.push(OPEN);
    for digit in format!("{index:x}").chars() {
        let value = digit.to_digit(16).unwrap_or(0);
        token.extend(char::from_u32(DIGIT_BASE + value));
    }
    token.push(CLOSE);
    token
}

/// Parse a sentinel at the start of `s`, returning its index and byte length.
fn parse_sentinel(s: &str) -> Option<(usize, usize)> {
    let mut chars = s.char_indices();
    if chars.next()?.1 != OPEN {
        return None;
    }
    let mut index = 0usize;
    let mut digits = 0;
    for (pos, c) in chars {
        if c == CLOSE {
            return (digits > 0).then_some((index, pos + c.len_utf8()));
        }
        let value = u32::from(c).checked_sub(DIGIT_BASE).filter(|v| *v < 16)?;
        index = index.checked_mul(16)?.checked_add(value as usize)?;
        digits += 1;
    }
    None
}

/// A piece of a masked buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'m> {
    Prose { offset: usize, text: &'m str },
    Sentinel { index: usize, text: &'m str },
}

/// Split a masked buffer into prose runs and sentinels.
fn pieces(masked: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut prose_start = 0;
    let mut pos = 0;
    while pos < masked.len() {
        let rest = &masked[pos..];
        if rest.starts_with(OPEN)
            && let Some((index, len)) = parse_sentinel(rest)
        {
            if pos > prose_start {
                out.push(Piece::Prose {
                    offset: prose_start,
                    text: &masked[prose_start..pos],
                });
            }
            out.push(Piece::Sentinel {
                index,
                text: &rest[..len],
            });
            pos += len;
            prose_start = pos;
            continue;
        }
        pos += rest.chars().next().map_or(1, char::len_utf8);
    }
    if prose_start < masked.len() {
        out.push(Piece::Prose {
            offset: prose_start,
            text: &masked[prose_start..],
        });
    }
    out
}

/// Original text of one masked region.
#[derive(Debug, Clone)]
struct Stashed<'a> {
    kind: RegionKind,
    text: &'a str,
    /// Number of newlines inside the region.
    newlines: usize,
    /// Characters after the region's last newline (or in total when it has none).
    tail_chars: usize,
}

/// A buffer with its protected regions replaced by sentinels.
///
/// # Example
///
/// ```
/// use pnpmd_core::Protected;
///
/// let source = "Call `f(@x)` with $y$.";
/// let protected = Protected::new(source);
/// assert!(!protected.masked().contains('`'));
/// assert_eq!(protected.restore(protected.masked()), source);
/// ```
#[derive(Debug, Clone)]
pub struct Protected<'a> {
    masked: String,
    stash: Vec<Stashed<'a>>,
}

impl<'a> Protected<'a> {
    /// Mask every protected region of `source`.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self::from_regions(source, &scan_regions(source))
    }

    fn from_regions(source: &'a str, regions: &[Region]) -> Self {
        let mut masked = String::with_capacity(source.len());
        let mut stash = Vec::with_capacity(regions.len());
        let mut cursor = 0;

        for region in regions {
            masked.push_str(&source[cursor..region.start]);
            masked.push_str(&sentinel(stash.len()));
            let text = &source[region.range()];
            let (newlines, tail) = match text.rfind('\n') {
                Some(last) => (text.matches('\n').count(), &text[last + 1..]),
                None => (0, text),
            };
            stash.push(Stashed {
                kind: region.kind,
                text,
                newlines,
                tail_chars: tail.chars().count(),
            });
            cursor = region.end;
        }
        masked.push_str(&source[cursor..]);

        Self { masked, stash }
    }

    /// The masked buffer.
    #[must_use]
    pub fn masked(&self) -> &str {
        &self.masked
    }

    /// Number of protected regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stash.len()
    }

    /// Whether the source contained no protected region.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stash.is_empty()
    }

    /// Protected regions in document order, as `(kind, original text)`.
    pub fn regions(&self) -> impl Iterator<Item = (RegionKind, &'a str)> + '_ {
        self.stash.iter().map(|s| (s.kind, s.text))
    }

    /// Replace every sentinel in `masked` with its original text.
    ///
    /// `masked` may be any rewrite of [`masked()`](Self::masked) that kept the
    /// sentinels intact.
    #[must_use]
    pub fn restore(&self, masked: &str) -> String {
        if self.stash.is_empty() {
            return masked.to_owned();
        }
        let mut out = String::with_capacity(masked.len());
        for piece in pieces(masked) {
            match piece {
                Piece::Prose { text, .. } => out.push_str(text),
                Piece::Sentinel { index, text } => match self.stash.get(index) {
                    Some(stashed) => out.push_str(stashed.text),
                    None => out.push_str(text),
                },
            }
        }
        out
    }

    /// Rewrite each prose run of `masked`, leaving sentinels untouched.
    ///
    /// The callback receives the byte offset of the run within `masked` and
    /// the run itself.
    pub fn map_prose<F>(&self, masked: &str, mut f: F) -> String
    where
        F: FnMut(usize, &str) -> String,
    {
        let mut out = String::with_capacity(masked.len());
        for piece in pieces(masked) {
            match piece {
                Piece::Prose { offset, text } => out.push_str(&f(offset, text)),
                Piece::Sentinel { text, .. } => out.push_str(text),
            }
        }
        out
    }

    /// Create a [`Locator`] for offsets into `masked`.
    #[must_use]
    pub fn locator<'p>(&'p self, masked: &'p str) -> Locator<'p, 'a> {
        Locator {
            protected: self,
            masked,
            pos: 0,
            line: 0,
            column: 0,
        }
    }
}

/// Translates byte offsets of a masked buffer into line/column positions of
/// the unmasked text.
///
/// Offsets are expected in increasing order; an earlier offset restarts the
/// scan from the beginning.
pub struct Locator<'p, 'a> {
    protected: &'p Protected<'a>,
    masked: &'p str,
    pos: usize,
    line: usize,
    column: usize,
}

impl Locator<'_, '_> {
    /// Locate a byte offset of the masked buffer (1-based line and column).
    pub fn locate(&mut self, offset: usize) -> Location {
        if offset < self.pos {
            self.pos = 0;
            self.line = 0;
            self.column = 0;
        }
        let target = offset.min(self.masked.len());
        while self.pos < target {
            let rest = &self.masked[self.pos..];
            if rest.starts_with(OPEN)
                && let Some((index, len)) = parse_sentinel(rest)
                && let Some(stashed) = self.protected.stash.get(index)
            {
                if stashed.newlines > 0 {
                    self.line += stashed.newlines;
                    self.column = stashed.tail_chars;
                } else {
                    self.column += stashed.tail_chars;
                }
                self.pos += len;
                continue;
            }
            let Some(c) = rest.chars().next() else {
                break;
            };
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
            self.pos += c.len_utf8();
        }
        Location {
            line: self.line + 1,
            column: self.column + 1,
        }
    }
}
