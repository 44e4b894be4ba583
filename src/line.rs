// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// First-line extraction (spec §3.4): derives the snip's display line and
// line count from raw clip text.

/// Fixed size of the `line` buffer stored in a snip slot, including the
/// terminating NUL.
pub const SNIP_LINE_SIZE: usize = 512;

/// The first non-blank line of `text`, plus the total line count.
///
/// `line` is truncated to `SNIP_LINE_SIZE - 1` bytes without splitting a
/// multi-byte UTF-8 sequence, leaving room for the NUL terminator the slot
/// encoder appends.
pub fn first_line(text: &str) -> (String, u32) {
    if text.is_empty() {
        return (String::new(), 0);
    }

    let newline_count = text.bytes().filter(|&b| b == b'\n').count() as u32;
    let ends_in_newline = text.as_bytes().last() == Some(&b'\n');
    let nr_lines = newline_count + u32::from(!ends_in_newline);

    let line = text.split('\n').find(|segment| !segment.is_empty()).unwrap_or("");
    (truncate_utf8(line, SNIP_LINE_SIZE - 1).to_string(), nr_lines)
}

/// Truncate `s` to at most `max_bytes` bytes without splitting a code point.
fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// True if `s` contains at least one non-whitespace character.
///
/// Matches the original's `is_salient_text`: whitespace-only clips (and
/// empty clips) are not salient and should never reach the store.
pub fn is_salient_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}
