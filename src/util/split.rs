//! Top-level string splitting for boolean expressions.
//!
//! Both the detection condition compiler and the query string parser need to
//! find operator keywords at the top nesting level of an expression, ignoring
//! anything inside parentheses or quoted strings. The splitter lives here so
//! the two components cannot drift apart.

/// Split `input` on `delimiter`, ignoring occurrences inside parentheses or
/// quoted strings. Parts are trimmed; empty parts are dropped.
///
/// `ignore_case` selects case-insensitive matching for the delimiter, used by
/// the condition compiler where `and`/`AND` are equivalent. The query parser
/// matches its upper-case keywords exactly.
pub fn split_top_level(input: &str, delimiter: &str, ignore_case: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let bytes = input.as_bytes();
    let dlen = delimiter.len();

    let mut start = 0usize;
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut quote_char = b'"';

    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];

        if b == b'"' || b == b'\'' {
            if !in_quotes {
                in_quotes = true;
                quote_char = b;
            } else if b == quote_char {
                in_quotes = false;
            }
        }

        if !in_quotes {
            if b == b'(' {
                depth += 1;
            } else if b == b')' {
                depth -= 1;
            }
        }

        // Only compare the delimiter window at valid UTF-8 boundaries.
        if !in_quotes
            && depth == 0
            && i + dlen <= bytes.len()
            && input.is_char_boundary(i)
            && input.is_char_boundary(i + dlen)
        {
            let window = &input[i..i + dlen];
            let hit = if ignore_case {
                window.eq_ignore_ascii_case(delimiter)
            } else {
                window == delimiter
            };
            if hit {
                let piece = input[start..i].trim();
                if !piece.is_empty() {
                    parts.push(piece.to_string());
                }
                i += dlen;
                start = i;
                continue;
            }
        }

        i += 1;
    }

    let tail = input[start..].trim();
    if !tail.is_empty() {
        parts.push(tail.to_string());
    }

    parts
}

/// Check whether `input` is one expression completely wrapped in a single
/// pair of parentheses, i.e. the opening paren closes only at the last byte.
pub fn is_fully_parenthesized(input: &str) -> bool {
    if !input.starts_with('(') || !input.ends_with(')') {
        return false;
    }

    let mut depth = 0i32;
    for (i, c) in input.char_indices() {
        if c == '(' {
            depth += 1;
        } else if c == ')' {
            depth -= 1;
            // Closed everything before the end: two adjacent groups, not one.
            if depth == 0 && i < input.len() - 1 {
                return false;
            }
        }
    }

    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        let parts = split_top_level("a AND b AND c", " AND ", false);
        assert_eq!(parts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_respects_parentheses() {
        let parts = split_top_level("(a AND b) OR c", " OR ", false);
        assert_eq!(parts, vec!["(a AND b)", "c"]);

        let parts = split_top_level("(a AND b) OR c", " AND ", false);
        assert_eq!(parts, vec!["(a AND b) OR c"]);
    }

    #[test]
    fn test_split_respects_quotes() {
        let parts = split_top_level(r#"field is "x AND y" AND other is "z""#, " AND ", false);
        assert_eq!(parts, vec![r#"field is "x AND y""#, r#"other is "z""#]);
    }

    #[test]
    fn test_split_case_insensitive() {
        let parts = split_top_level("selection AND filter", " and ", true);
        assert_eq!(parts, vec!["selection", "filter"]);

        // Exact mode must not match a differently-cased keyword.
        let parts = split_top_level("selection and filter", " AND ", false);
        assert_eq!(parts, vec!["selection and filter"]);
    }

    #[test]
    fn test_split_no_delimiter() {
        let parts = split_top_level("selection", " or ", true);
        assert_eq!(parts, vec!["selection"]);
    }

    #[test]
    fn test_fully_parenthesized() {
        assert!(is_fully_parenthesized("(a AND b)"));
        assert!(is_fully_parenthesized("((a) OR (b))"));
        assert!(!is_fully_parenthesized("(a) AND (b)"));
        assert!(!is_fully_parenthesized("a AND b"));
        assert!(!is_fully_parenthesized("(a AND b"));
    }
}
