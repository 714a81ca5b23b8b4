//! Decoding of the interpreter's textual self-representation
//!
//! A result is classified once by its leading characters into a
//! [`LiteralForm`], then decoded by the matching reader. Text that does not
//! decode cleanly comes back as a string scalar holding the raw text.

pub mod escape;
pub mod lexer;
pub mod parser;

pub use escape::{escape_delimiters, split_top_level, unescape_delimiters, ESCAPE_MARK};
pub use lexer::{Lexer, Token, TokenType};
pub use parser::{parse_mapping_span, parse_scalar, unquote, Element, Parser};

use crate::error::ParseError;
use crate::value::ResultValue;

/// Bare word that marks a table rule.
pub const HLINE: &str = "HLINE";

/// Shape of a raw result, decided from its leading characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralForm {
    /// `$[...]` or `$(...)`
    Sequence,
    /// `{...}`
    Mapping,
    Scalar,
}

impl LiteralForm {
    pub fn classify(text: &str) -> Self {
        let text = text.trim_start();
        if text.starts_with("$[") || text.starts_with("$(") {
            LiteralForm::Sequence
        } else if text.starts_with('{') {
            LiteralForm::Mapping
        } else {
            LiteralForm::Scalar
        }
    }
}

/// Decode `raw`, reporting malformed literals.
pub fn try_parse_result(raw: &str) -> Result<ResultValue, ParseError> {
    let text = raw.trim();
    match LiteralForm::classify(text) {
        LiteralForm::Sequence => {
            let escaped = escape_delimiters(text)?;
            let tokens = Lexer::new(&escaped).tokenize()?;
            Parser::new(tokens).parse_container_literal(true)
        }
        LiteralForm::Mapping => {
            let escaped = escape_delimiters(text)?;
            let tokens = Lexer::new(&escaped).tokenize()?;
            match tokens.as_slice() {
                [Token {
                    token_type: TokenType::Mapping(span),
                    ..
                }, Token {
                    token_type: TokenType::Eof,
                    ..
                }] => parse_mapping_span(span),
                _ => Err(ParseError::WrongForm("mapping")),
            }
        }
        LiteralForm::Scalar => Ok(parse_scalar(text).into_value()),
    }
}

/// Decode `raw`; malformed literals degrade to a string scalar of the
/// trimmed raw text.
pub fn parse_result(raw: &str) -> ResultValue {
    match try_parse_result(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Result literal did not parse ({}); passing through as text", e);
            ResultValue::string(raw.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ScalarKind, TableRow};

    fn num(text: &str) -> ResultValue {
        ResultValue::number(text)
    }

    fn s(text: &str) -> ResultValue {
        ResultValue::string(text)
    }

    #[test]
    fn test_classify() {
        assert_eq!(LiteralForm::classify("$[1]"), LiteralForm::Sequence);
        assert_eq!(LiteralForm::classify("  $(1,)"), LiteralForm::Sequence);
        assert_eq!(LiteralForm::classify("{a => 1}"), LiteralForm::Mapping);
        assert_eq!(LiteralForm::classify("[1, 2]"), LiteralForm::Scalar);
        assert_eq!(LiteralForm::classify("$x"), LiteralForm::Scalar);
    }

    #[test]
    fn test_flat_numeric_sequence() {
        assert_eq!(
            parse_result("$[1, 2, 3]"),
            ResultValue::Sequence(vec![num("1"), num("2"), num("3")])
        );
    }

    #[test]
    fn test_paren_sequence_with_trailing_newline() {
        assert_eq!(
            parse_result("$(\"a\", 2.5, True)\n"),
            ResultValue::Sequence(vec![
                s("a"),
                num("2.5"),
                ResultValue::Scalar {
                    text: "True".to_string(),
                    kind: ScalarKind::Boolean
                },
            ])
        );
    }

    #[test]
    fn test_mapping_order_preserved() {
        assert_eq!(
            parse_result("{a => 1, b => 2}"),
            ResultValue::Mapping(vec![
                ("a".to_string(), num("1")),
                ("b".to_string(), num("2")),
            ])
        );
        assert_eq!(
            parse_result("{z => 1, a => 2}"),
            ResultValue::Mapping(vec![
                ("z".to_string(), num("1")),
                ("a".to_string(), num("2")),
            ])
        );
    }

    #[test]
    fn test_hline_row() {
        assert_eq!(
            parse_result(r#"$[["name", "n"], HLINE, ["x", 1], ["y", 2]]"#),
            ResultValue::Table(vec![
                TableRow::Cells(vec![s("name"), s("n")]),
                TableRow::Hline,
                TableRow::Cells(vec![s("x"), num("1")]),
                TableRow::Cells(vec![s("y"), num("2")]),
            ])
        );
    }

    #[test]
    fn test_hline_with_scalar_rows() {
        let value = parse_result("$[1, HLINE, 2]");
        match value {
            ResultValue::Table(rows) => {
                assert_eq!(rows[1], TableRow::Hline);
                assert_eq!(rows[0], TableRow::Cells(vec![num("1")]));
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn test_quoted_hline_is_a_string() {
        assert_eq!(
            parse_result(r#"$["HLINE", 1]"#),
            ResultValue::Sequence(vec![s("HLINE"), num("1")])
        );
    }

    #[test]
    fn test_nested_itemized_rows() {
        assert_eq!(
            parse_result("$[$[1, 2], $(3, 4)]"),
            ResultValue::Table(vec![
                TableRow::Cells(vec![num("1"), num("2")]),
                TableRow::Cells(vec![num("3"), num("4")]),
            ])
        );
    }

    #[test]
    fn test_mixed_nesting_stays_sequence() {
        assert_eq!(
            parse_result("$[1, [2, 3]]"),
            ResultValue::Sequence(vec![
                num("1"),
                ResultValue::Sequence(vec![num("2"), num("3")]),
            ])
        );
    }

    #[test]
    fn test_strings_with_delimiters() {
        assert_eq!(
            parse_result(r#"$["a, b", "(c)", "[d]", "\{e\}", "f\"g,"]"#),
            ResultValue::Sequence(vec![
                s("a, b"),
                s("(c)"),
                s("[d]"),
                s("{e}"),
                s("f\"g,"),
            ])
        );
    }

    #[test]
    fn test_mapping_with_delimiters_in_strings() {
        assert_eq!(
            parse_result(r#"{key => "x, y => z", other => "[1, 2]"}"#),
            ResultValue::Mapping(vec![
                ("key".to_string(), s("x, y => z")),
                ("other".to_string(), s("[1, 2]")),
            ])
        );
    }

    #[test]
    fn test_sequence_of_mappings() {
        assert_eq!(
            parse_result("$[{a => 1}, {}]"),
            ResultValue::Sequence(vec![
                ResultValue::Mapping(vec![("a".to_string(), num("1"))]),
                ResultValue::Mapping(vec![]),
            ])
        );
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse_result("42\n"), num("42"));
        assert_eq!(parse_result(r#""hello, world""#), s("hello, world"));
        assert_eq!(parse_result("Nil"), s("Nil"));
        assert_eq!(
            parse_result("HLINE"),
            ResultValue::Table(vec![TableRow::Hline])
        );
    }

    #[test]
    fn test_malformed_falls_back_to_raw_text() {
        for raw in [
            "$[1, 2",
            "$[1, \"open]",
            "$[1, 2)",
            "{a => 1",
            "{a => 1, b}",
            "{a => 1} trailing",
        ] {
            assert!(try_parse_result(raw).is_err(), "{} should not parse", raw);
            assert_eq!(parse_result(raw), s(raw), "{} should pass through", raw);
        }
    }

    #[test]
    fn test_round_trip() {
        let trees = vec![
            ResultValue::Sequence(vec![num("1"), num("-2.5"), s("three"), ResultValue::boolean(false)]),
            ResultValue::Sequence(vec![]),
            ResultValue::Table(vec![
                TableRow::Cells(vec![s("a"), s("b")]),
                TableRow::Hline,
                TableRow::Cells(vec![num("1"), num("2")]),
            ]),
            ResultValue::Table(vec![
                TableRow::Cells(vec![num("1")]),
                TableRow::Cells(vec![num("2")]),
            ]),
            ResultValue::Mapping(vec![
                ("z".to_string(), num("26")),
                ("a".to_string(), ResultValue::Sequence(vec![num("1"), s("x y")])),
                ("m".to_string(), ResultValue::Mapping(vec![("k".to_string(), s("v"))])),
            ]),
            ResultValue::Sequence(vec![
                s("quote \" and \\ backslash"),
                ResultValue::Sequence(vec![num("1"), ResultValue::Sequence(vec![])]),
                ResultValue::Mapping(vec![("k".to_string(), num("0"))]),
            ]),
            ResultValue::Sequence(vec![
                ResultValue::Sequence(vec![num("1"), num("2")]),
                ResultValue::Sequence(vec![num("3")]),
            ]),
            num("3.14"),
            s("plain"),
        ];

        for tree in trees {
            let literal = tree.to_literal();
            assert_eq!(try_parse_result(&literal), Ok(tree.clone()), "literal: {}", literal);
        }
    }

    #[test]
    fn test_uniform_top_level_rows_read_back_as_table() {
        // Same literal as a table of those rows; the table is the canonical tree.
        let rows = ResultValue::Sequence(vec![
            ResultValue::Sequence(vec![num("1"), num("2")]),
            ResultValue::Sequence(vec![num("3"), num("4")]),
        ]);
        let table = ResultValue::Table(vec![
            TableRow::Cells(vec![num("1"), num("2")]),
            TableRow::Cells(vec![num("3"), num("4")]),
        ]);
        assert_eq!(rows.to_literal(), "$[[1, 2], [3, 4]]");
        assert_eq!(rows.to_literal(), table.to_literal());
        assert_eq!(parse_result(&rows.to_literal()), table);
        assert_eq!(rows.to_json(), table.to_json());
    }

    #[test]
    fn test_literal_escape_mark_in_string() {
        let text = format!("a{}(b", ESCAPE_MARK);
        let tree = ResultValue::Sequence(vec![s(&text), num("1")]);
        assert_eq!(parse_result(&tree.to_literal()), tree);
    }

    #[test]
    fn test_escaping_invariant() {
        let awkward = ["{", "(", ")", "[", "]", ",", "}", "a, (b) [c] {d}", ",,,", "])}"];
        let tree = ResultValue::Sequence(awkward.iter().map(|t| s(t)).collect());
        let literal = tree.to_literal();

        let escaped = escape_delimiters(&literal).unwrap();
        let inner = &escaped[2..escaped.len() - 1];
        let parts = split_top_level(inner, ", ");
        assert_eq!(parts.len(), awkward.len());
        for (part, original) in parts.iter().zip(awkward.iter()) {
            let restored = unescape_delimiters(part);
            assert_eq!(unquote(&restored).as_deref(), Some(*original));
        }

        assert_eq!(parse_result(&literal), tree);
    }
}
