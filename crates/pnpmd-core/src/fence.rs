//! Code fence tracking.
//!
//! Tracks whether we're inside a fenced code block so that fenced content
//! can be excluded from every rewriting pass.

use std::ops::Range;

/// Tracks code fence state during line-by-line processing.
///
/// Code fences in `CommonMark` can use backticks or tildes (three or more).
/// The closing fence must use the same character and be at least as long
/// as the opening fence.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    /// Character used for the current fence (backtick or tilde).
    fence_char: Option<char>,
    /// Length of the opening fence (minimum length for closing).
    fence_len: usize,
}

impl FenceTracker {
    /// Create a new fence tracker.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Check if currently inside a fenced code block.
    pub(crate) fn in_fence(&self) -> bool {
        self.fence_char.is_some()
    }

    /// Update fence state based on a line.
    ///
    /// Call this for each line to track fence state. Returns `true` if
    /// the line is a fence marker (opening or closing).
    pub(crate) fn update(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();

        if let Some(fence_char) = self.fence_char {
            if is_fence_line(trimmed, fence_char, self.fence_len) {
                self.fence_char = None;
                self.fence_len = 0;
                return true;
            }
            false
        } else {
            if let Some((ch, len)) = detect_fence(trimmed) {
                self.fence_char = Some(ch);
                self.fence_len = len;
                return true;
            }
            false
        }
    }
}

/// A fenced block located in a text buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FencedBlock {
    /// Byte range from the start of the opening line to the end of the
    /// closing line (its newline excluded).
    pub range: Range<usize>,
    /// Whether a closing fence was found before the end of the buffer.
    pub terminated: bool,
}

/// Find every fenced code block in `text`.
///
/// An unterminated fence extends to the end of the buffer.
pub(crate) fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut tracker = FenceTracker::new();
    let mut open_at = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let was_open = tracker.in_fence();
        if tracker.update(content) {
            if was_open {
                if let Some(start) = open_at.take() {
                    blocks.push(FencedBlock {
                        range: start..offset + content.len(),
                        terminated: true,
                    });
                }
            } else {
                open_at = Some(offset);
            }
        }
        offset += line.len();
    }

    if let Some(start) = open_at {
        blocks.push(FencedBlock {
            range: start..text.len(),
            terminated: false,
        });
    }

    blocks
}

/// Detect if a line starts a code fence.
///
/// Returns the fence character and length if found. A backtick fence whose
/// info string contains a backtick is inline code, not a fence.
fn detect_fence(trimmed: &str) -> Option<(char, usize)> {
    let first = trimmed.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }

    let count = trimmed.chars().take_while(|&c| c == first).count();
    if count < 3 {
        return None;
    }
    if first == '`' && trimmed[count..].contains('`') {
        return None;
    }
    Some((first, count))
}

/// Check if a line is a valid closing fence.
///
/// The closing fence must:
/// - Use the same character as opening
/// - Be at least as long as opening
/// - Contain only fence characters (optionally followed by whitespace)
fn is_fence_line(trimmed: &str, expected_char: char, min_len: usize) -> bool {
    let first = match trimmed.chars().next() {
        Some(c) if c == expected_char => c,
        _ => return false,
    };

    let count = trimmed.chars().take_while(|&c| c == first).count();
    if count < min_len {
        return false;
    }

    trimmed[count..].chars().all(char::is_whitespace)
}
