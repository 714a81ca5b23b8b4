//! Structured results decoded from interpreter output

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Kind inferred for a scalar's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    String,
    Number,
    Boolean,
}

/// One row of a table: data cells or a horizontal rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "row", content = "cells", rename_all = "lowercase")]
pub enum TableRow {
    Cells(Vec<ResultValue>),
    Hline,
}

/// Result of an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ResultValue {
    Scalar { text: String, kind: ScalarKind },
    Sequence(Vec<ResultValue>),
    Table(Vec<TableRow>),
    Mapping(Vec<(String, ResultValue)>),
}

impl ResultValue {
    pub fn string(text: impl Into<String>) -> Self {
        ResultValue::Scalar {
            text: text.into(),
            kind: ScalarKind::String,
        }
    }

    pub fn number(text: impl Into<String>) -> Self {
        ResultValue::Scalar {
            text: text.into(),
            kind: ScalarKind::Number,
        }
    }

    pub fn boolean(value: bool) -> Self {
        ResultValue::Scalar {
            text: if value { "True" } else { "False" }.to_string(),
            kind: ScalarKind::Boolean,
        }
    }

    /// Text of a scalar, `None` for containers.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResultValue::Scalar { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Render as the literal syntax the result parser accepts.
    pub fn to_literal(&self) -> String {
        let mut out = String::new();
        self.write_literal(&mut out, true);
        out
    }

    fn write_literal(&self, out: &mut String, top_level: bool) {
        let itemizer = if top_level { "$" } else { "" };
        match self {
            ResultValue::Scalar { text, kind } => match kind {
                ScalarKind::String => out.push_str(&quote(text)),
                ScalarKind::Number | ScalarKind::Boolean => out.push_str(text),
            },
            ResultValue::Sequence(items) => {
                out.push_str(itemizer);
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_literal(out, false);
                }
                out.push(']');
            }
            ResultValue::Table(rows) => {
                out.push_str(itemizer);
                out.push('[');
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match row {
                        TableRow::Hline => out.push_str(crate::literal::HLINE),
                        TableRow::Cells(cells) => {
                            out.push('[');
                            for (j, cell) in cells.iter().enumerate() {
                                if j > 0 {
                                    out.push_str(", ");
                                }
                                cell.write_literal(out, false);
                            }
                            out.push(']');
                        }
                    }
                }
                out.push(']');
            }
            ResultValue::Mapping(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if needs_quoting(key) {
                        out.push_str(&quote(key));
                    } else {
                        out.push_str(key);
                    }
                    out.push_str(" => ");
                    value.write_literal(out, false);
                }
                out.push('}');
            }
        }
    }

    /// Convert to plain JSON; hline rows become the string `"hline"`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ResultValue::Scalar { text, kind } => match kind {
                ScalarKind::String => JsonValue::String(text.clone()),
                ScalarKind::Boolean => JsonValue::Bool(text.ends_with("True") || text == "true"),
                ScalarKind::Number => {
                    if let Ok(i) = text.parse::<i64>() {
                        JsonValue::Number(i.into())
                    } else {
                        text.parse::<f64>()
                            .ok()
                            .and_then(serde_json::Number::from_f64)
                            .map(JsonValue::Number)
                            .unwrap_or_else(|| JsonValue::String(text.clone()))
                    }
                }
            },
            ResultValue::Sequence(items) => {
                JsonValue::Array(items.iter().map(|v| v.to_json()).collect())
            }
            ResultValue::Table(rows) => JsonValue::Array(
                rows.iter()
                    .map(|row| match row {
                        TableRow::Hline => JsonValue::String("hline".to_string()),
                        TableRow::Cells(cells) => {
                            JsonValue::Array(cells.iter().map(|v| v.to_json()).collect())
                        }
                    })
                    .collect(),
            ),
            ResultValue::Mapping(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json());
                }
                JsonValue::Object(map)
            }
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty()
        || key.contains(" => ")
        || key
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | '[' | ']' | '(' | ')' | '{' | '}' | '$'))
}

/// Double-quote `text`, escaping what the scalar reader unescapes.
pub(crate) fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_literal() {
        let value = ResultValue::Sequence(vec![
            ResultValue::number("1"),
            ResultValue::string("two"),
            ResultValue::boolean(true),
        ]);
        assert_eq!(value.to_literal(), r#"$[1, "two", True]"#);
    }

    #[test]
    fn test_table_literal() {
        let value = ResultValue::Table(vec![
            TableRow::Cells(vec![ResultValue::string("a"), ResultValue::string("b")]),
            TableRow::Hline,
            TableRow::Cells(vec![ResultValue::number("1"), ResultValue::number("2")]),
        ]);
        assert_eq!(value.to_literal(), r#"$[["a", "b"], HLINE, [1, 2]]"#);
    }

    #[test]
    fn test_mapping_literal_quotes_awkward_keys() {
        let value = ResultValue::Mapping(vec![
            ("a".to_string(), ResultValue::number("1")),
            ("two words".to_string(), ResultValue::string("x")),
        ]);
        assert_eq!(value.to_literal(), r#"{a => 1, "two words" => "x"}"#);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("say \"hi\"\n"), r#""say \"hi\"\n""#);
    }

    #[test]
    fn test_to_json() {
        let value = ResultValue::Mapping(vec![
            ("z".to_string(), ResultValue::number("1")),
            ("a".to_string(), ResultValue::number("2.5")),
            (
                "rows".to_string(),
                ResultValue::Table(vec![TableRow::Hline]),
            ),
        ]);
        let json = value.to_json();
        assert_eq!(
            serde_json::to_string(&json).unwrap(),
            r#"{"z":1,"a":2.5,"rows":["hline"]}"#
        );
    }

    #[test]
    fn test_to_json_non_finite_number_falls_back_to_string() {
        assert_eq!(
            ResultValue::number("Inf").to_json(),
            JsonValue::String("Inf".to_string())
        );
    }

    #[test]
    fn test_tagged_serde() {
        let value = ResultValue::Sequence(vec![ResultValue::number("1")]);
        let json = serde_json::to_string(&value).unwrap();
        let back: ResultValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
