//! `$n` placeholder scanning.
//!
//! Condition fragments are written with their own `$1..$k` numbering. When a
//! fragment is appended after other parameters, its placeholders must be
//! shifted. The scanner only touches placeholders in plain SQL text: `$n`
//! sequences inside single-quoted strings, quoted identifiers, comments and
//! dollar-quoted bodies are left alone.

use std::borrow::Cow;

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Visit every placeholder in `sql`, in order. The callback receives the byte
/// range of the whole token (including `$`) and its index.
fn scan(sql: &str, mut visit: impl FnMut(usize, usize, usize)) {
    let bytes = sql.as_bytes();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                // `$` inside an identifier (`price$1`) is a name character.
                b'$' if idx > 0 && is_ident_byte(bytes[idx - 1]) => {}
                b'$' => {
                    if let Some((end, index)) = scan_index(bytes, idx + 1) {
                        visit(idx, end, index);
                        idx = end;
                        continue;
                    }
                    if let Some((tag, close)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = close;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }
}

/// Bytes that continue an unquoted identifier. Non-ASCII bytes count, since
/// PostgreSQL accepts letters outside ASCII in names.
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Parse the digits of a placeholder starting at `start`. Returns the end
/// offset and the index. An identifier character right after the digits
/// (`$1abc`) does not form a placeholder.
fn scan_index(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return None;
    }
    if bytes
        .get(end)
        .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_' || *b == b'$')
    {
        return None;
    }
    std::str::from_utf8(&bytes[start..end])
        .ok()?
        .parse()
        .ok()
        .map(|index| (end, index))
}

/// Recognize `$tag$` openers. Tags cannot start with a digit, so `$1$` is
/// never a dollar quote.
fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    if bytes.get(idx).is_some_and(|b| b.is_ascii_digit()) {
        return None;
    }
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }

    if idx < bytes.len() && bytes[idx] == b'$' {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && bytes[idx + 1..end] == *tag.as_bytes() && bytes[end] == b'$'
}

/// Shift every placeholder in `sql` by `offset` (`$1` becomes `$(1 + offset)`).
///
/// Returns a borrowed `Cow` when nothing changes.
pub fn renumber(sql: &str, offset: usize) -> Cow<'_, str> {
    if offset == 0 {
        return Cow::Borrowed(sql);
    }

    let mut out: Option<String> = None;
    let mut copied = 0;
    scan(sql, |start, end, index| {
        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        buf.push_str(&sql[copied..start]);
        buf.push('$');
        buf.push_str(&(index + offset).to_string());
        copied = end;
    });

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Highest placeholder index referenced by `sql` (0 when there are none).
pub fn max_index(sql: &str) -> usize {
    let mut max = 0;
    scan(sql, |_, _, index| max = max.max(index));
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_simple_placeholders() {
        assert_eq!(renumber("id = $1 AND org = $2", 3), "id = $4 AND org = $5");
    }

    #[test]
    fn handles_multi_digit_indices() {
        assert_eq!(renumber("a = $10 OR b = $1", 2), "a = $12 OR b = $3");
        assert_eq!(renumber("a = $9", 1), "a = $10");
    }

    #[test]
    fn zero_offset_borrows() {
        assert!(matches!(renumber("id = $1", 0), Cow::Borrowed(_)));
    }

    #[test]
    fn no_placeholders_borrows() {
        assert!(matches!(renumber("deleted_at IS NULL", 4), Cow::Borrowed(_)));
    }

    #[test]
    fn skips_string_literals() {
        assert_eq!(
            renumber("price = $1 AND note <> 'costs $1' AND x = $2", 1),
            "price = $2 AND note <> 'costs $1' AND x = $3"
        );
        assert_eq!(renumber("a = 'it''s $1' AND b = $1", 5), "a = 'it''s $1' AND b = $6");
    }

    #[test]
    fn skips_quoted_identifiers_and_comments() {
        assert_eq!(
            renumber(r#""col$1" = $1 -- $2
AND /* $3 /* nested $4 */ */ b = $2"#, 2),
            r#""col$1" = $3 -- $2
AND /* $3 /* nested $4 */ */ b = $4"#
        );
    }

    #[test]
    fn skips_dollar_quoted_bodies() {
        assert_eq!(
            renumber("body = $tag$ pay $1 $tag$ AND id = $1", 1),
            "body = $tag$ pay $1 $tag$ AND id = $2"
        );
        assert_eq!(renumber("x = $$ $1 $$ AND y = $1", 1), "x = $$ $1 $$ AND y = $2");
    }

    #[test]
    fn placeholder_followed_by_cast_is_shifted() {
        assert_eq!(renumber("id = $1::uuid", 1), "id = $2::uuid");
    }

    #[test]
    fn dollar_inside_identifier_is_not_a_placeholder() {
        assert_eq!(renumber("price$1 = $1", 1), "price$1 = $2");
        assert_eq!(renumber("a$b$2 = $2 AND x = $1", 3), "a$b$2 = $5 AND x = $4");
        assert_eq!(max_index("price$3 = $1"), 1);
    }

    #[test]
    fn max_index_ignores_literals() {
        assert_eq!(max_index("a = $1 AND b = $3"), 3);
        assert_eq!(max_index("a = '$9' AND b = $2"), 2);
        assert_eq!(max_index("a IS NULL"), 0);
    }
}
