//! Recursive-descent parser for result literals
//!
//! Sequences go through the token stream from [`Lexer`]; mapping spans are
//! split on their top-level `, ` and ` => ` separators; whatever is left is
//! read as a scalar.

use std::sync::OnceLock;

use regex::Regex;

use super::escape::{split_top_level, unescape_delimiters};
use super::lexer::{Lexer, Token, TokenType};
use super::HLINE;
use crate::error::ParseError;
use crate::value::{ResultValue, ScalarKind, TableRow};

const ENTRY_SEPARATOR: &str = ", ";
const PAIR_SEPARATOR: &str = " => ";

/// A parsed sequence element: a value or a bare table rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Value(ResultValue),
    Hline,
}

impl Element {
    /// Lone hlines (outside any sequence) become a one-row table.
    pub fn into_value(self) -> ResultValue {
        match self {
            Element::Value(value) => value,
            Element::Hline => ResultValue::Table(vec![TableRow::Hline]),
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(t) if t.token_type == TokenType::Eof) {
            let offset = tokens.last().map(|t| t.offset + 1).unwrap_or(0);
            tokens.push(Token {
                token_type: TokenType::Eof,
                offset,
            });
        }
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse one container followed by end of input.
    pub fn parse_container_literal(&mut self, top_level: bool) -> Result<ResultValue, ParseError> {
        let value = self.parse_container(top_level)?;
        let token = self.advance();
        match token.token_type {
            TokenType::Eof => Ok(value),
            other => Err(ParseError::Unexpected(describe(&other), token.offset)),
        }
    }

    fn parse_container(&mut self, top_level: bool) -> Result<ResultValue, ParseError> {
        let open = self.advance();
        let (opener, closer) = match open.token_type {
            TokenType::LeftBracket => ('[', ']'),
            TokenType::LeftParen => ('(', ')'),
            other => return Err(ParseError::Unexpected(describe(&other), open.offset)),
        };

        let mut elements = Vec::new();
        loop {
            if closing_char(&self.peek().token_type) == Some(closer) {
                self.advance();
                break;
            }

            elements.push(self.parse_element(opener, open.offset)?);

            let next = self.advance();
            match &next.token_type {
                TokenType::Comma => continue,
                TokenType::Eof => return Err(ParseError::Unbalanced(opener, open.offset)),
                other => match closing_char(other) {
                    Some(c) if c == closer => break,
                    Some(found) => {
                        return Err(ParseError::Mismatched {
                            expected: closer,
                            found,
                            offset: next.offset,
                        })
                    }
                    None => return Err(ParseError::Unexpected(describe(other), next.offset)),
                },
            }
        }

        Ok(build_container(elements, top_level))
    }

    fn parse_element(&mut self, opener: char, open_offset: usize) -> Result<Element, ParseError> {
        let token = self.peek().clone();
        match token.token_type {
            TokenType::LeftBracket | TokenType::LeftParen => {
                Ok(Element::Value(self.parse_container(false)?))
            }
            TokenType::Mapping(span) => {
                self.advance();
                Ok(Element::Value(parse_mapping_span(&span)?))
            }
            TokenType::Atom(text) => {
                self.advance();
                Ok(parse_scalar(&unescape_delimiters(&text)))
            }
            TokenType::Eof => Err(ParseError::Unbalanced(opener, open_offset)),
            other => Err(ParseError::Unexpected(describe(&other), token.offset)),
        }
    }

    fn peek(&self) -> &Token {
        // new() guarantees a trailing Eof
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }
}

fn closing_char(token_type: &TokenType) -> Option<char> {
    match token_type {
        TokenType::RightBracket => Some(']'),
        TokenType::RightParen => Some(')'),
        _ => None,
    }
}

fn describe(token_type: &TokenType) -> String {
    match token_type {
        TokenType::LeftBracket => "[".to_string(),
        TokenType::RightBracket => "]".to_string(),
        TokenType::LeftParen => "(".to_string(),
        TokenType::RightParen => ")".to_string(),
        TokenType::Comma => ",".to_string(),
        TokenType::Mapping(span) => unescape_delimiters(span),
        TokenType::Atom(text) => unescape_delimiters(text),
        TokenType::Eof => "end of input".to_string(),
    }
}

/// Any hline turns a sequence into a table; at top level a non-empty list
/// of nested sequences of one common length is a table too.
fn build_container(elements: Vec<Element>, top_level: bool) -> ResultValue {
    let has_hline = elements.iter().any(|e| matches!(e, Element::Hline));
    let mut widths = elements.iter().map(|e| match e {
        Element::Value(ResultValue::Sequence(cells)) => Some(cells.len()),
        _ => None,
    });
    let uniform_rows = match widths.next() {
        Some(Some(width)) => widths.all(|w| w == Some(width)),
        _ => false,
    };

    if has_hline || (top_level && uniform_rows) {
        let rows = elements
            .into_iter()
            .map(|element| match element {
                Element::Hline => TableRow::Hline,
                Element::Value(ResultValue::Sequence(cells)) => TableRow::Cells(cells),
                Element::Value(other) => TableRow::Cells(vec![other]),
            })
            .collect();
        ResultValue::Table(rows)
    } else {
        ResultValue::Sequence(elements.into_iter().map(Element::into_value).collect())
    }
}

/// Parse an escaped `{...}` span, braces included.
pub fn parse_mapping_span(span: &str) -> Result<ResultValue, ParseError> {
    let inner = span
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or(ParseError::WrongForm("mapping"))?;

    if inner.trim().is_empty() {
        return Ok(ResultValue::Mapping(Vec::new()));
    }

    let mut entries = Vec::new();
    for entry in split_top_level(inner, ENTRY_SEPARATOR) {
        let entry = entry.trim();
        let key = split_top_level(entry, PAIR_SEPARATOR)
            .into_iter()
            .next()
            .unwrap_or_default();
        if key.len() == entry.len() {
            return Err(ParseError::MissingArrow(unescape_delimiters(entry)));
        }
        let value = &entry[key.len() + PAIR_SEPARATOR.len()..];

        let key = unescape_delimiters(key.trim());
        let key = unquote(&key).unwrap_or(key);
        entries.push((key, parse_fragment(value)?.into_value()));
    }

    Ok(ResultValue::Mapping(entries))
}

/// Parse an escaped fragment nested inside a larger literal.
fn parse_fragment(fragment: &str) -> Result<Element, ParseError> {
    let fragment = fragment.trim();
    if fragment.starts_with('{') {
        return parse_mapping_span(fragment).map(Element::Value);
    }
    if let Some(list) = parse_gist_list(fragment) {
        return Ok(Element::Value(list));
    }
    let is_container = ["$[", "$(", "[", "("]
        .iter()
        .any(|prefix| fragment.starts_with(prefix));
    if is_container {
        let tokens = Lexer::new(fragment).tokenize()?;
        return Parser::new(tokens)
            .parse_container_literal(false)
            .map(Element::Value);
    }
    Ok(parse_scalar(&unescape_delimiters(fragment)))
}

/// Read the space-separated list form a gisted mapping uses for its values,
/// e.g. `[1 2 3]` or `[[1 2] [3 4]]`. `None` when `fragment` is not one.
fn parse_gist_list(fragment: &str) -> Option<ResultValue> {
    let inner = fragment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| fragment.strip_prefix('(').and_then(|s| s.strip_suffix(')')))?;
    // Quoted items and commas mean the ordinary literal form.
    if inner.contains(['"', '\'', ',', '{', '}']) || split_top_level(inner, " ").len() < 2 {
        return None;
    }

    let mut elements = Vec::new();
    for item in split_top_level(inner, " ") {
        if item.is_empty() {
            continue;
        }
        if item.starts_with('[') || item.starts_with('(') {
            elements.push(Element::Value(parse_gist_list(item).or_else(|| {
                let tokens = Lexer::new(item).tokenize().ok()?;
                Parser::new(tokens).parse_container_literal(false).ok()
            })?));
        } else {
            elements.push(parse_scalar(&unescape_delimiters(item)));
        }
    }
    Some(build_container(elements, false))
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?$|^[-+]?Inf$|^NaN$")
            .expect("number pattern is valid")
    })
}

/// Read one unescaped scalar token.
pub fn parse_scalar(text: &str) -> Element {
    let text = text.trim();

    if text == HLINE {
        return Element::Hline;
    }

    if let Some(unquoted) = unquote(text) {
        return Element::Value(ResultValue::string(unquoted));
    }

    let kind = if number_pattern().is_match(text) {
        ScalarKind::Number
    } else if matches!(text, "True" | "False" | "Bool::True" | "Bool::False") {
        ScalarKind::Boolean
    } else {
        ScalarKind::String
    };

    Element::Value(ResultValue::Scalar {
        text: text.to_string(),
        kind,
    })
}

/// Strip one pair of surrounding quotes and undo escapes. `None` when `text`
/// is not exactly one quoted string.
pub fn unquote(text: &str) -> Option<String> {
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &text[1..];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices();

    while let Some((offset, ch)) = chars.next() {
        if ch == quote {
            // Closing quote must be the last character.
            return (offset + ch.len_utf8() == body.len()).then_some(out);
        }
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let (_, escaped) = chars.next()?;
        if quote == '\'' {
            if escaped != '\'' && escaped != '\\' {
                out.push('\\');
            }
            out.push(escaped);
            continue;
        }
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'x' => {
                let rest = &body[offset + 2..];
                let hex = rest.strip_prefix('[').and_then(|r| r.split_once(']'));
                match hex.and_then(|(digits, _)| {
                    u32::from_str_radix(digits, 16).ok().and_then(char::from_u32).map(|c| (c, digits.len()))
                }) {
                    Some((c, len)) => {
                        out.push(c);
                        // Skip `[digits]`.
                        for _ in 0..len + 2 {
                            chars.next();
                        }
                    }
                    None => out.push('x'),
                }
            }
            other => out.push(other),
        }
    }

    None
}
