//! Protects structural delimiters that occur inside quoted strings.
//!
//! [`escape_delimiters`] marks every `( ) [ ] { } ,` found inside a
//! double-quoted string with [`ESCAPE_MARK`], so later structural scans can
//! treat any unmarked delimiter as real structure. A mark already present in
//! the text is doubled, so [`unescape_delimiters`] restores the original
//! exactly.

use crate::error::ParseError;

/// Private-use code point inserted in front of protected delimiters.
pub const ESCAPE_MARK: char = '\u{E000}';

pub fn is_delimiter(ch: char) -> bool {
    matches!(ch, '(' | ')' | '[' | ']' | '{' | '}' | ',')
}

/// Mark delimiters that sit inside double-quoted strings.
pub fn escape_delimiters(text: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    let mut after_backslash = false;
    let mut string_start = 0;

    for (offset, ch) in text.char_indices() {
        if ch == ESCAPE_MARK || (in_string && is_delimiter(ch)) {
            out.push(ESCAPE_MARK);
        }
        out.push(ch);

        if after_backslash {
            after_backslash = false;
            continue;
        }
        match ch {
            '\\' if in_string => after_backslash = true,
            '"' => {
                if !in_string {
                    string_start = offset;
                }
                in_string = !in_string;
            }
            _ => {}
        }
    }

    if in_string {
        return Err(ParseError::UnterminatedString(string_start));
    }
    Ok(out)
}

/// Drop the escape marks, keeping the character each one protects.
pub fn unescape_delimiters(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == ESCAPE_MARK {
            if let Some(protected) = chars.next() {
                out.push(protected);
            }
            continue;
        }
        out.push(ch);
    }
    out
}

/// Split escaped text on `separator` where it is unmarked and at bracket
/// depth zero. Unbalanced brackets are left for the parser to report.
pub fn split_top_level<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth: usize = 0;
    let mut start = 0;
    let mut escaped = false;
    let mut iter = text.char_indices();

    while let Some((offset, ch)) = iter.next() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            ESCAPE_MARK => escaped = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 && text[offset..].starts_with(separator) => {
                parts.push(&text[start..offset]);
                start = offset + separator.len();
                // Skip the rest of the separator.
                for _ in separator.chars().skip(1) {
                    iter.next();
                }
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_only_inside_strings() {
        let escaped = escape_delimiters(r#"[1, "a,b", (2)]"#).unwrap();
        assert_eq!(escaped, format!("[1, \"a{},b\", (2)]", ESCAPE_MARK));
    }

    #[test]
    fn test_escaped_quote_does_not_close_string() {
        let escaped = escape_delimiters(r#""a\"(b""#).unwrap();
        assert!(escaped.contains(&format!("{}(", ESCAPE_MARK)));
    }

    #[test]
    fn test_escaped_backslash_before_quote_closes_string() {
        let escaped = escape_delimiters(r#""a\\", [1]"#).unwrap();
        assert!(escaped.ends_with(", [1]"));
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            escape_delimiters(r#"[1, "oops]"#),
            Err(ParseError::UnterminatedString(4))
        );
    }

    #[test]
    fn test_round_trip_preserves_text() {
        for original in [
            r#"{"k{}" => "v, (w)"}"#,
            r#"$["[x]", "a,b,c", "{ ( ) [ ] , }"]"#,
            "plain text, no strings",
        ] {
            let escaped = escape_delimiters(original).unwrap();
            assert_eq!(unescape_delimiters(&escaped), original);
        }
    }

    #[test]
    fn test_literal_mark_survives() {
        let mark = ESCAPE_MARK.to_string();
        for original in [
            format!(r#"$["a{}(b", "{}"]"#, mark, mark),
            format!("{}, {}[", mark, mark),
        ] {
            let escaped = escape_delimiters(&original).unwrap();
            assert_eq!(unescape_delimiters(&escaped), original);
        }

        let escaped = escape_delimiters(&format!(r#""x{},y", 2"#, mark)).unwrap();
        let parts: Vec<String> = split_top_level(&escaped, ", ")
            .into_iter()
            .map(unescape_delimiters)
            .collect();
        assert_eq!(parts, vec![format!(r#""x{},y""#, mark), "2".to_string()]);
    }

    #[test]
    fn test_split_ignores_protected_and_nested_delimiters() {
        let escaped = escape_delimiters(r#"1, "x, y", [2, 3], {a => 4, b => 5}"#).unwrap();
        let parts: Vec<String> = split_top_level(&escaped, ", ")
            .into_iter()
            .map(unescape_delimiters)
            .collect();
        assert_eq!(
            parts,
            vec!["1", r#""x, y""#, "[2, 3]", "{a => 4, b => 5}"]
        );
    }

    #[test]
    fn test_split_multichar_separator() {
        let parts = split_top_level("key => [a => b]", " => ");
        assert_eq!(parts, vec!["key", "[a => b]"]);
    }

    #[test]
    fn test_split_without_separator() {
        assert_eq!(split_top_level("abc", ", "), vec!["abc"]);
        assert_eq!(split_top_level("", ", "), vec![""]);
    }
}
