//! Lexer for result literals
//!
//! Works on text that already went through
//! [`escape_delimiters`](super::escape::escape_delimiters): any delimiter
//! preceded by the escape mark belongs to a string and is read as part of an
//! atom, never as structure.

use super::escape::ESCAPE_MARK;
use crate::error::ParseError;

/// Token types recognized by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    /// `[` or `$[`
    LeftBracket,
    RightBracket,
    /// `(` or `$(`
    LeftParen,
    RightParen,
    Comma,
    /// A balanced `{...}` span, braces included, still escaped.
    Mapping(String),
    /// Scalar text between delimiters, trimmed, still escaped.
    Atom(String),
    Eof,
}

/// Token with location information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub offset: usize,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.token_type, TokenType::Eof);
            tokens.push(token);

            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace();
        let offset = self.position;

        let Some(ch) = self.current_char() else {
            return Ok(Token {
                token_type: TokenType::Eof,
                offset,
            });
        };

        let token_type = match ch {
            // Itemized container: `$[` / `$(`
            '$' if matches!(self.peek_char(), Some('[') | Some('(')) => {
                self.advance();
                return self.next_token().map(|mut token| {
                    token.offset = offset;
                    token
                });
            }
            '[' => {
                self.advance();
                TokenType::LeftBracket
            }
            ']' => {
                self.advance();
                TokenType::RightBracket
            }
            '(' => {
                self.advance();
                TokenType::LeftParen
            }
            ')' => {
                self.advance();
                TokenType::RightParen
            }
            ',' => {
                self.advance();
                TokenType::Comma
            }
            '{' => TokenType::Mapping(self.read_mapping()?),
            '}' => return Err(ParseError::Unbalanced('}', offset)),
            _ => TokenType::Atom(self.read_atom()),
        };

        Ok(Token { token_type, offset })
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read up to the next unmarked delimiter.
    fn read_atom(&mut self) -> String {
        let mut atom = String::new();
        while let Some(ch) = self.current_char() {
            if ch == ESCAPE_MARK {
                atom.push(ch);
                self.advance();
                if let Some(protected) = self.current_char() {
                    atom.push(protected);
                    self.advance();
                }
                continue;
            }
            if super::escape::is_delimiter(ch) {
                break;
            }
            atom.push(ch);
            self.advance();
        }
        atom.trim_end().to_string()
    }

    /// Read a balanced `{...}` span.
    fn read_mapping(&mut self) -> Result<String, ParseError> {
        let start = self.position;
        let mut depth = 0usize;
        let mut span = String::new();

        while let Some(ch) = self.current_char() {
            span.push(ch);
            self.advance();
            match ch {
                ESCAPE_MARK => {
                    if let Some(protected) = self.current_char() {
                        span.push(protected);
                        self.advance();
                    }
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(span);
                    }
                }
                _ => {}
            }
        }

        Err(ParseError::Unbalanced('{', start))
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }
}
