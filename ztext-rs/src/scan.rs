//! Low-level string scanning utilities shared by the parser and evaluator.
//!
//! All range-taking functions work on inclusive `[begin, end]` byte bounds.
//! Every delimiter in the ZText grammar is ASCII, so scanning bytewise is
//! safe: a multi-byte UTF-8 sequence can never contain an ASCII byte, and
//! slices are only ever taken at delimiter positions.

/// The escape character.  `\{{` and `\}}` are literal text.
pub(crate) const ESCAPE: u8 = b'\\';

/// Whitespace as the C locale defines it: space, `\t`, `\n`, `\v`, `\f`, `\r`.
#[inline]
pub(crate) fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// `true` when the byte at `index` is preceded by an (unconsumed) escape.
#[inline]
pub(crate) fn is_escaped(bytes: &[u8], index: usize) -> bool {
    index > 0 && bytes[index - 1] == ESCAPE
}

/// Advance `index` past whitespace.  Returns the first non-whitespace index,
/// or `s.len()` when the rest of the string is whitespace.
pub fn skip_ws_leading(s: &str, mut index: usize) -> usize {
    let bytes = s.as_bytes();
    while index < bytes.len() && is_space(bytes[index]) {
        index += 1;
    }
    index
}

/// Retreat `index` over whitespace.  Returns the first non-whitespace index
/// at or before the starting point, or `0` when only whitespace remains.
pub fn skip_ws_trailing(s: &str, mut index: usize) -> usize {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return 0;
    }
    if index >= bytes.len() {
        index = bytes.len() - 1;
    }
    while index > 0 && is_space(bytes[index]) {
        index -= 1;
    }
    index
}

/// Find the first unescaped occurrence of `c` in `[begin, end]`.
pub fn find_char(s: &str, c: u8, begin: usize, end: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut index = begin;
    while index <= end && index < bytes.len() {
        if bytes[index] == c && !is_escaped(bytes, index) {
            return Some(index);
        }
        index += 1;
    }
    None
}

/// Depth-balanced search for the `close` byte matching the `open` byte at
/// `begin`.  The scan starts at `begin + 1`; unescaped `open` bytes push the
/// depth, unescaped `close` bytes pop it, and the `close` that brings the
/// depth back to zero is returned.
pub fn find_matching(s: &str, open: u8, close: u8, begin: usize, end: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut index = begin + 1;
    let mut depth = 0usize;
    while index <= end && index < bytes.len() {
        if bytes[index] == open && !is_escaped(bytes, index) {
            depth += 1;
        } else if bytes[index] == close && !is_escaped(bytes, index) {
            if depth == 0 {
                return Some(index);
            }
            depth -= 1;
        }
        index += 1;
    }
    None
}

/// Collapse every maximal run of whitespace to a single space.  Leading and
/// trailing whitespace is preserved as a single space, not stripped.
pub fn clean_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if c.is_ascii() && is_space(c as u8) {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

/// Remove exactly one leading backslash from every `\{{` and `\}}`.
/// All other characters, including lone backslashes, pass through unchanged.
pub fn unescape(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut segment_start = 0;
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == ESCAPE
            && index + 2 < bytes.len()
            && ((bytes[index + 1] == b'{' && bytes[index + 2] == b'{')
                || (bytes[index + 1] == b'}' && bytes[index + 2] == b'}'))
        {
            out.push_str(&s[segment_start..index]);
            out.push_str(&s[index + 1..index + 3]);
            index += 3;
            segment_start = index;
        } else {
            index += 1;
        }
    }
    out.push_str(&s[segment_start..]);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
