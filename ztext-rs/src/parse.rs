//! The document parser.
//!
//! Turns a source string into an element chain.  A document interleaves
//! literal text with `{{…}}` tokens; a token is a variable reference
//! (`{{name$}}`), a variable assignment (`{{name$ body}}`), or a command
//! (`{{name}}`, `{{name body}}`, `{{name(key=value) body}}`).  Token
//! delimiters escaped as `\{{` / `\}}` are literal text.  Nested tokens are
//! matched by depth, so a body may contain further tokens.
//!
//! Whitespace rules: text runs are whitespace-cleaned but not trimmed, so a
//! single leading or trailing space survives into the tree; variable and
//! command bodies are trimmed at parse and cleaned inside.
//!
//! On any failure the partially built chain is destroyed before the error is
//! returned; a failed parse never leaks elements.

use crate::element::{ElementId, ElementPool, PropertyMap};
use crate::error::{ParseError, ZTextError};
use crate::scan;

/// Parse `source` into a chain owned by `pool`, returning the head.
///
/// The empty string, and any range that contains nothing, produce a single
/// empty Text element rather than an error.
pub(crate) fn parse_chain(
    pool: &mut ElementPool,
    source: &str,
    begin: usize,
    end: usize,
) -> Result<ElementId, ParseError> {
    let bytes = source.as_bytes();
    let mut head: Option<ElementId> = None;
    let mut tail: Option<ElementId> = None;
    let mut index = begin;

    while index <= end && index < bytes.len() {
        let parsed = if token_begins_at(bytes, index, end) {
            parse_token(pool, source, index, end).map(|(id, next)| (Some(id), next))
        } else {
            parse_text(pool, source, index, end)
        };

        let (element, next_index) = match parsed {
            Ok(step) => step,
            Err(error) => {
                if let Some(h) = head {
                    let _ = pool.destroy_all(h);
                }
                return Err(error);
            }
        };

        if let Some(id) = element {
            match tail {
                Some(t) => {
                    pool.append(t, id).map_err(ParseError::from)?;
                }
                None => head = Some(id),
            }
            tail = Some(id);
        }
        index = next_index;
    }

    match head {
        Some(h) => Ok(h),
        None => Ok(pool.create_text("")),
    }
}

#[inline]
fn token_begins_at(bytes: &[u8], index: usize, end: usize) -> bool {
    index + 1 <= end
        && bytes[index] == b'{'
        && bytes[index + 1] == b'{'
        && !scan::is_escaped(bytes, index)
}

#[inline]
fn token_ends_at(bytes: &[u8], index: usize, end: usize) -> bool {
    index + 1 <= end
        && bytes[index] == b'}'
        && bytes[index + 1] == b'}'
        && !scan::is_escaped(bytes, index)
}

/// Consume a text run up to (not including) the next unescaped `{{`.
///
/// Returns `None` when the run cleans to nothing, so the caller emits no
/// element.  A stray unescaped `}}` fails with `TokenBeginMissing`.
fn parse_text(
    pool: &mut ElementPool,
    source: &str,
    begin: usize,
    end: usize,
) -> Result<(Option<ElementId>, usize), ParseError> {
    let bytes = source.as_bytes();
    let mut index = begin;
    while index <= end && index < bytes.len() {
        if token_begins_at(bytes, index, end) {
            break;
        }
        if token_ends_at(bytes, index, end) {
            return Err(ParseError::new(ZTextError::TokenBeginMissing, index));
        }
        index += 1;
    }

    if index == begin {
        return Ok((None, index));
    }
    let cleaned = scan::clean_whitespace(&source[begin..index]);
    if cleaned.is_empty() {
        return Ok((None, index));
    }
    Ok((Some(pool.create_text(&cleaned)), index))
}

/// Parse one token starting at the unescaped `{{` at `begin`.  Returns the
/// element and the index just past the closing `}}`.
fn parse_token(
    pool: &mut ElementPool,
    source: &str,
    begin: usize,
    end: usize,
) -> Result<(ElementId, usize), ParseError> {
    let bytes = source.as_bytes();

    // Depth-balanced scan for the matching `}}`; `token_end` is the index of
    // its second `}`.
    let token_end = {
        let mut index = begin + 2;
        let mut depth = 0usize;
        let mut found = None;
        while index + 1 <= end && index + 1 < bytes.len() {
            if token_begins_at(bytes, index, end) {
                depth += 1;
                index += 2;
            } else if token_ends_at(bytes, index, end) {
                if depth == 0 {
                    found = Some(index + 1);
                    break;
                }
                depth -= 1;
                index += 2;
            } else {
                index += 1;
            }
        }
        found.ok_or(ParseError::new(ZTextError::TokenEndMissing, begin + 2))?
    };

    // Name.
    let name_begin = scan::skip_ws_leading(source, begin + 2);
    match bytes[name_begin] {
        b'$' | b'(' | b'}' => {
            return Err(ParseError::new(ZTextError::TokenNameMissing, name_begin))
        }
        _ => {}
    }
    let mut name_end = name_begin;
    while name_end < token_end
        && (bytes[name_end].is_ascii_alphanumeric() || bytes[name_end] == b'_')
    {
        name_end += 1;
    }
    if name_end == name_begin {
        return Err(ParseError::new(ZTextError::TokenNameInvalid, name_begin));
    }
    let name = &source[name_begin..name_end];

    let identifier = scan::skip_ws_leading(source, name_end);
    if bytes[identifier] == b'$' {
        parse_token_variable(pool, source, name, identifier, token_end)
    } else {
        parse_token_command(pool, source, name, identifier, token_end)
    }
}

/// `{{name$}}` or `{{name$ body}}`; `identifier` is the index of the `$`.
fn parse_token_variable(
    pool: &mut ElementPool,
    source: &str,
    name: &str,
    identifier: usize,
    token_end: usize,
) -> Result<(ElementId, usize), ParseError> {
    let element = pool
        .create_variable(name)
        .map_err(|error| ParseError::new(error, identifier))?;

    let content_begin = scan::skip_ws_leading(source, identifier + 1);
    if content_begin < token_end - 1 {
        let content_end = scan::skip_ws_trailing(source, token_end - 2);
        attach_body(pool, source, element, content_begin, content_end)?;
    }
    Ok((element, token_end + 1))
}

/// `{{name}}`, `{{name body}}`, or `{{name(props) body}}`; `after_name` is
/// the first non-whitespace index past the name.
fn parse_token_command(
    pool: &mut ElementPool,
    source: &str,
    name: &str,
    after_name: usize,
    token_end: usize,
) -> Result<(ElementId, usize), ParseError> {
    let bytes = source.as_bytes();
    let element = pool
        .create_command(name)
        .map_err(|error| ParseError::new(error, after_name))?;

    let mut cursor = after_name;
    if bytes[cursor] == b'(' {
        let property_end = match scan::find_matching(source, b'(', b')', cursor, token_end) {
            Some(index) => index,
            None => {
                let _ = pool.destroy(element);
                return Err(ParseError::new(ZTextError::PropertyEndMissing, cursor));
            }
        };
        match parse_map_range(source, cursor, property_end) {
            Ok(map) => {
                if let Some(e) = pool.get_mut(element) {
                    e.property = map;
                }
            }
            Err(error) => {
                let _ = pool.destroy(element);
                return Err(error);
            }
        }
        cursor = property_end + 1;
    }

    let content_begin = scan::skip_ws_leading(source, cursor);
    if content_begin < token_end - 1 {
        let content_end = scan::skip_ws_trailing(source, token_end - 2);
        attach_body(pool, source, element, content_begin, content_end)?;
    }
    Ok((element, token_end + 1))
}

/// Recursively parse `[begin, end]` and install the result as `owner`'s
/// child chain.  On failure `owner` is destroyed before the error surfaces.
fn attach_body(
    pool: &mut ElementPool,
    source: &str,
    owner: ElementId,
    begin: usize,
    end: usize,
) -> Result<(), ParseError> {
    let chain = match parse_chain(pool, source, begin, end) {
        Ok(chain) => chain,
        Err(error) => {
            let _ = pool.destroy(owner);
            return Err(error);
        }
    };
    pool.set_child(owner, chain)
        .map_err(|error| ParseError::new(error, begin))
}

// ── Property maps ─────────────────────────────────────────────────────────────

/// Parse a `(key=value, …)` property map.
///
/// `()` is the valid empty map; duplicate keys are last-write-wins; keys and
/// values are trimmed and whitespace-cleaned.  A `,` inside a value must be
/// escaped as `\,`.
pub fn parse_map(source: &str) -> Result<PropertyMap, ParseError> {
    if source.is_empty() {
        return Err(ParseError::new(ZTextError::NoTextFound, 0));
    }
    parse_map_range(source, 0, source.len() - 1)
}

/// [`parse_map`] over the inclusive byte range `[begin, end]`.
pub fn parse_map_range(
    source: &str,
    begin: usize,
    end: usize,
) -> Result<PropertyMap, ParseError> {
    let bytes = source.as_bytes();
    if begin >= bytes.len() || begin > end {
        return Err(ParseError::new(ZTextError::NoTextFound, begin));
    }

    let open = scan::skip_ws_leading(source, begin);
    if open > end || open >= bytes.len() {
        return Err(ParseError::new(ZTextError::NoTextFound, begin));
    }
    if bytes[open] != b'(' {
        return Err(ParseError::new(ZTextError::MapBeginMissing, open));
    }
    let close = scan::skip_ws_trailing(source, end.min(bytes.len() - 1));
    if close <= open || bytes[close] != b')' {
        return Err(ParseError::new(ZTextError::MapEndMissing, close));
    }

    let mut map = PropertyMap::new();
    // `()` and `(   )` are both the valid empty map.
    if scan::skip_ws_leading(source, open + 1) == close {
        return Ok(map);
    }

    let mut segment_begin = open + 1;
    loop {
        let comma = scan::find_char(source, b',', segment_begin, close - 1);
        let segment_end = match comma {
            Some(index) => index.saturating_sub(1),
            None => close - 1,
        };
        parse_key_value(source, segment_begin, segment_end, &mut map)?;
        match comma {
            Some(index) => segment_begin = index + 1,
            None => break,
        }
    }
    Ok(map)
}

/// Parse one `key = value` segment of a property map into `map`.
fn parse_key_value(
    source: &str,
    begin: usize,
    end: usize,
    map: &mut PropertyMap,
) -> Result<(), ParseError> {
    let key_begin = scan::skip_ws_leading(source, begin);
    if key_begin > end {
        return Err(ParseError::new(ZTextError::MapKeyValuePairMissing, begin));
    }
    let equals = match scan::find_char(source, b'=', key_begin, end) {
        Some(index) => index,
        None => return Err(ParseError::new(ZTextError::MapKeyValuePairMissing, key_begin)),
    };
    if equals == key_begin {
        return Err(ParseError::new(ZTextError::MapKeyMissing, key_begin));
    }
    let key_end = scan::skip_ws_trailing(source, equals - 1);
    let key = scan::clean_whitespace(&source[key_begin..=key_end]);

    let value_begin = scan::skip_ws_leading(source, equals + 1);
    if value_begin > end {
        return Err(ParseError::new(ZTextError::MapValueMissing, equals + 1));
    }
    let value_end = scan::skip_ws_trailing(source, end);
    let value = scan::clean_whitespace(&source[value_begin..=value_end]);

    map.insert(key, value);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;

    fn parse(pool: &mut ElementPool, source: &str) -> Result<ElementId, ParseError> {
        if source.is_empty() {
            return Ok(pool.create_text(""));
        }
        parse_chain(pool, source, 0, source.len() - 1)
    }

    fn kind(pool: &ElementPool, id: ElementId) -> ElementKind {
        pool.get(id).unwrap().kind
    }

    fn text(pool: &ElementPool, id: ElementId) -> &str {
        &pool.get(id).unwrap().text
    }

    #[test]
    fn plain_text_is_one_element() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "hello world").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Text);
        assert_eq!(text(&pool, head), "hello world");
        assert_eq!(pool.next(head), None);
    }

    #[test]
    fn text_runs_are_cleaned_not_trimmed() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "  X\tY  Z\n").unwrap();
        assert_eq!(text(&pool, head), " X Y Z ");
    }

    #[test]
    fn whitespace_only_becomes_single_space() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, " \t\n ").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Text);
        assert_eq!(text(&pool, head), " ");
    }

    #[test]
    fn escaped_delimiters_stay_text() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, r"foo \{{token\}} bar").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Text);
        assert_eq!(text(&pool, head), r"foo \{{token\}} bar");
        assert_eq!(pool.next(head), None);
    }

    #[test]
    fn bare_variable_reference() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "{{var$}}").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Variable);
        assert_eq!(text(&pool, head), "var");
        assert_eq!(pool.get(head).unwrap().child, None);
    }

    #[test]
    fn variable_assignment_has_trimmed_body() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "{{ var$   foo bar  }}").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Variable);
        let body = pool.get(head).unwrap().child.unwrap();
        assert_eq!(kind(&pool, body), ElementKind::Text);
        assert_eq!(text(&pool, body), "foo bar");
        assert_eq!(pool.get(body).unwrap().parent, Some(head));
    }

    #[test]
    fn variable_reference_with_inner_whitespace() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "{{ var$ }}").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Variable);
        assert_eq!(pool.get(head).unwrap().child, None);
    }

    #[test]
    fn command_without_anything() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "{{cmd}}").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Command);
        assert_eq!(text(&pool, head), "cmd");
        assert!(pool.get(head).unwrap().child.is_none());
        assert!(pool.get(head).unwrap().property.is_empty());
    }

    #[test]
    fn command_with_properties_and_body() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "{{cmd(foo=bar, n=1) hi there}}").unwrap();
        let e = pool.get(head).unwrap();
        assert_eq!(e.kind, ElementKind::Command);
        assert_eq!(e.property.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(e.property.get("n").map(String::as_str), Some("1"));
        let body = e.child.unwrap();
        assert_eq!(text(&pool, body), "hi there");
    }

    #[test]
    fn nested_tokens_matched_by_depth() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "{{outer$ a {{inner$}} b}}").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Variable);
        assert_eq!(pool.next(head), None);

        let body = pool.get(head).unwrap().child.unwrap();
        assert_eq!(text(&pool, body), "a ");
        let inner = pool.next(body).unwrap();
        assert_eq!(kind(&pool, inner), ElementKind::Variable);
        assert_eq!(text(&pool, inner), "inner");
        let tail = pool.next(inner).unwrap();
        assert_eq!(text(&pool, tail), " b");
    }

    #[test]
    fn mixed_document_chain() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "a {{v$}} b {{c}} d").unwrap();
        let kinds: Vec<ElementKind> = {
            let mut out = Vec::new();
            let mut current = Some(head);
            while let Some(id) = current {
                out.push(kind(&pool, id));
                current = pool.next(id);
            }
            out
        };
        assert_eq!(
            kinds,
            vec![
                ElementKind::Text,
                ElementKind::Variable,
                ElementKind::Text,
                ElementKind::Command,
                ElementKind::Text,
            ]
        );
    }

    #[test]
    fn unterminated_token() {
        let mut pool = ElementPool::new();
        let err = parse(&mut pool, "{{").unwrap_err();
        assert_eq!(err.error, ZTextError::TokenEndMissing);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn stray_close() {
        let mut pool = ElementPool::new();
        let err = parse(&mut pool, "}}").unwrap_err();
        assert_eq!(err.error, ZTextError::TokenBeginMissing);
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn stray_close_after_text_rolls_back() {
        let mut pool = ElementPool::new();
        let err = parse(&mut pool, "abc }} def").unwrap_err();
        assert_eq!(err.error, ZTextError::TokenBeginMissing);
        assert_eq!(err.offset, 4);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn name_missing() {
        let mut pool = ElementPool::new();
        for source in ["{{}}", "{{$}}", "{{(x=y)}}", "{{ $foo}}"] {
            let err = parse(&mut pool, source).unwrap_err();
            assert_eq!(err.error, ZTextError::TokenNameMissing, "{source}");
        }
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn name_invalid() {
        let mut pool = ElementPool::new();
        let err = parse(&mut pool, "{{*$}}").unwrap_err();
        assert_eq!(err.error, ZTextError::TokenNameInvalid);
    }

    #[test]
    fn property_end_missing() {
        let mut pool = ElementPool::new();
        let err = parse(&mut pool, "{{cmd(foo=bar}}").unwrap_err();
        assert_eq!(err.error, ZTextError::PropertyEndMissing);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn error_inside_body_rolls_back_everything() {
        let mut pool = ElementPool::new();
        let err = parse(&mut pool, "keep {{v$ }} oops}}").unwrap_err();
        assert_eq!(err.error, ZTextError::TokenBeginMissing);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn empty_source_is_empty_text() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "").unwrap();
        assert_eq!(kind(&pool, head), ElementKind::Text);
        assert_eq!(text(&pool, head), "");
    }

    // ── parse_map ─────────────────────────────────────────────────────────────

    #[test]
    fn map_empty_is_valid() {
        assert_eq!(parse_map("()").unwrap().len(), 0);
        assert_eq!(parse_map("(  )").unwrap().len(), 0);
        assert_eq!(parse_map("( \t\n )").unwrap().len(), 0);
        assert_eq!(parse_map("  (  )  ").unwrap().len(), 0);
    }

    #[test]
    fn command_with_whitespace_only_properties() {
        let mut pool = ElementPool::new();
        let head = parse(&mut pool, "{{cmd( ) hi}}").unwrap();
        let e = pool.get(head).unwrap();
        assert_eq!(e.kind, ElementKind::Command);
        assert!(e.property.is_empty());
        let body = e.child.unwrap();
        assert_eq!(text(&pool, body), "hi");
    }

    #[test]
    fn map_single_pair() {
        let map = parse_map("(foo=bar)").unwrap();
        assert_eq!(map.get("foo").map(String::as_str), Some("bar"));
    }

    #[test]
    fn map_pairs_are_trimmed_and_cleaned() {
        let map = parse_map("(  foo bar  =  baz\tqux  , x=y )").unwrap();
        assert_eq!(map.get("foo bar").map(String::as_str), Some("baz qux"));
        assert_eq!(map.get("x").map(String::as_str), Some("y"));
    }

    #[test]
    fn map_duplicate_keys_last_write_wins() {
        let map = parse_map("(k=first, k=second)").unwrap();
        assert_eq!(map.get("k").map(String::as_str), Some("second"));
    }

    #[test]
    fn map_escaped_comma_stays_in_value() {
        let map = parse_map(r"(k=a\,b)").unwrap();
        assert_eq!(map.get("k").map(String::as_str), Some(r"a\,b"));
    }

    #[test]
    fn map_errors() {
        assert_eq!(parse_map("").unwrap_err().error, ZTextError::NoTextFound);
        assert_eq!(parse_map(")").unwrap_err().error, ZTextError::MapBeginMissing);
        assert_eq!(parse_map("(").unwrap_err().error, ZTextError::MapEndMissing);
        assert_eq!(
            parse_map("(,)").unwrap_err().error,
            ZTextError::MapKeyValuePairMissing
        );
        assert_eq!(
            parse_map("(foo)").unwrap_err().error,
            ZTextError::MapKeyValuePairMissing
        );
        assert_eq!(parse_map("(=bar)").unwrap_err().error, ZTextError::MapKeyMissing);
        assert_eq!(parse_map("(foo=)").unwrap_err().error, ZTextError::MapValueMissing);
        assert_eq!(
            parse_map("(foo   =    )").unwrap_err().error,
            ZTextError::MapValueMissing
        );
    }
}
