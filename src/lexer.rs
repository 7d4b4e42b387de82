//! Lexer for the shell mini-language.
//!
//! Converts source text into a stream of spanned tokens. Words are the
//! interesting part: adjacent segments (`raw`, `'single'`, `"double"`,
//! `$VAR`, `${VAR}`, `$( … )`) concatenate into a single word when nothing
//! separates them, quoting switches the scanning mode, and command
//! substitutions nest. That context-sensitivity is why the word scanner is
//! hand-written rather than pattern-driven: each word is lexed in one pass
//! into its segments, and `$( … )` bodies are captured raw (with their byte
//! offset) for the parser to descend into.
//!
//! # Token categories
//!
//! - **Separators**: `;`, `&`, newline
//! - **Operators**: `&&`, `||`, `|`, `|&`, `(`, `)`
//! - **Redirects**: `>`, `>>`, `<`, with optional fd prefix and `&fd` target
//! - **Words**: everything else, pre-split into segments

use std::fmt;
use std::ops::Range;

use crate::ast::RedirectOp;

/// Byte range of a token in the source text.
pub type Span = Range<usize>;

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Lexer error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedSingleQuote,
    UnterminatedDoubleQuote,
    UnterminatedCommandSubst,
    UnterminatedVariable,
    InvalidVariableName(String),
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexErrorKind::UnterminatedSingleQuote => write!(f, "unterminated single-quoted string"),
            LexErrorKind::UnterminatedDoubleQuote => write!(f, "unterminated double-quoted string"),
            LexErrorKind::UnterminatedCommandSubst => write!(f, "unterminated command substitution"),
            LexErrorKind::UnterminatedVariable => write!(f, "unterminated variable reference"),
            LexErrorKind::InvalidVariableName(name) => write!(f, "invalid variable name '{name}'"),
        }
    }
}

/// A lexing failure at a byte offset.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct LexError {
    pub offset: usize,
    pub kind: LexErrorKind,
}

/// Tokens produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(RawWord),
    Redirect(RedirectToken),
    Newline,
    Semi,
    Amp,
    AndAnd,
    OrOr,
    Pipe,
    PipeAmp,
    LParen,
    RParen,
}

/// A redirect operator, with the optional fd prefix (`2>`) and the optional
/// descriptor target (`>&1`). When `fd_target` is `None` the parser expects
/// a path word to follow.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectToken {
    pub fd: Option<u32>,
    pub op: RedirectOp,
    pub fd_target: Option<u32>,
}

/// A word as lexed: segments, not yet resolved into an AST word because
/// command substitutions are still raw source text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawWord {
    pub segments: Vec<Segment>,
}

/// One lexed segment of a word.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Variable(String),
    Quoted(Vec<Segment>),
    /// `$( … )` body, captured verbatim. `offset` is the byte position of
    /// the body in the original source, for error reporting during the
    /// parser's recursive descent.
    CommandSubst { raw: String, offset: usize },
}

/// Tokenize shell source.
pub fn tokenize(src: &str) -> Result<Vec<Spanned<Token>>, LexError> {
    Lexer::new(src).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

fn is_word_terminator(byte: u8) -> bool {
    matches!(
        byte,
        b' ' | b'\t' | b'\r' | b'\n' | b';' | b'&' | b'|' | b'(' | b')' | b'<' | b'>'
    )
}

fn is_name_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn bump_char(&mut self) -> Option<char> {
        let ch = self.src[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn run(&mut self) -> Result<Vec<Spanned<Token>>, LexError> {
        let mut tokens = Vec::new();
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r')) {
                self.bump();
            }
            let start = self.pos;
            let Some(byte) = self.peek() else { break };
            let token = match byte {
                b'\n' => {
                    self.bump();
                    Token::Newline
                }
                b';' => {
                    self.bump();
                    Token::Semi
                }
                b'&' => {
                    self.bump();
                    if self.peek() == Some(b'&') {
                        self.bump();
                        Token::AndAnd
                    } else {
                        Token::Amp
                    }
                }
                b'|' => {
                    self.bump();
                    match self.peek() {
                        Some(b'|') => {
                            self.bump();
                            Token::OrOr
                        }
                        Some(b'&') => {
                            self.bump();
                            Token::PipeAmp
                        }
                        _ => Token::Pipe,
                    }
                }
                b'(' => {
                    self.bump();
                    Token::LParen
                }
                b')' => {
                    self.bump();
                    Token::RParen
                }
                b'<' | b'>' => Token::Redirect(self.lex_redirect(None)),
                b'0'..=b'9' => match self.try_fd_redirect() {
                    Some(token) => token,
                    None => Token::Word(self.lex_word()?),
                },
                _ => Token::Word(self.lex_word()?),
            };
            tokens.push(Spanned::new(token, start..self.pos));
        }
        Ok(tokens)
    }

    /// Digits directly followed by a redirect operator are an fd prefix
    /// (`2>`, `0<`); otherwise the digits are an ordinary word start.
    fn try_fd_redirect(&mut self) -> Option<Token> {
        let digit_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        let is_redirect = matches!(self.peek(), Some(b'<' | b'>'));
        let fd = self.src[digit_start..self.pos].parse::<u32>().ok();
        match (is_redirect, fd) {
            (true, Some(fd)) => Some(Token::Redirect(self.lex_redirect(Some(fd)))),
            _ => {
                self.pos = digit_start;
                None
            }
        }
    }

    /// At `<` or `>`: consume the operator and an optional `&fd` target.
    fn lex_redirect(&mut self, fd: Option<u32>) -> RedirectToken {
        let op = if self.peek() == Some(b'<') {
            self.bump();
            RedirectOp::Read
        } else {
            self.bump();
            if self.peek() == Some(b'>') {
                self.bump();
                RedirectOp::Append
            } else {
                RedirectOp::Write
            }
        };
        let mut fd_target = None;
        if self.peek() == Some(b'&') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.bump();
            let target_start = self.pos;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
            fd_target = self.src[target_start..self.pos].parse::<u32>().ok();
        }
        RedirectToken { fd, op, fd_target }
    }

    fn lex_word(&mut self) -> Result<RawWord, LexError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        loop {
            let Some(byte) = self.peek() else { break };
            if is_word_terminator(byte) {
                break;
            }
            match byte {
                b'\'' => {
                    flush_text(&mut segments, &mut text);
                    segments.push(self.lex_single_quoted()?);
                }
                b'"' => {
                    flush_text(&mut segments, &mut text);
                    segments.push(self.lex_double_quoted()?);
                }
                b'$' => match self.lex_dollar()? {
                    Some(segment) => {
                        flush_text(&mut segments, &mut text);
                        segments.push(segment);
                    }
                    None => text.push('$'),
                },
                b'\\' => {
                    self.bump();
                    match self.bump_char() {
                        Some(ch) => text.push(ch),
                        None => text.push('\\'),
                    }
                }
                _ => {
                    let run_start = self.pos;
                    while let Some(byte) = self.peek() {
                        if is_word_terminator(byte) || matches!(byte, b'\'' | b'"' | b'$' | b'\\') {
                            break;
                        }
                        self.bump();
                    }
                    text.push_str(&self.src[run_start..self.pos]);
                }
            }
        }
        flush_text(&mut segments, &mut text);
        Ok(RawWord { segments })
    }

    fn lex_single_quoted(&mut self) -> Result<Segment, LexError> {
        let quote_pos = self.pos;
        self.bump();
        let content_start = self.pos;
        loop {
            match self.peek() {
                Some(b'\'') => {
                    let content = &self.src[content_start..self.pos];
                    self.bump();
                    let inner = if content.is_empty() {
                        Vec::new()
                    } else {
                        vec![Segment::Text(content.to_string())]
                    };
                    return Ok(Segment::Quoted(inner));
                }
                Some(_) => self.bump(),
                None => {
                    return Err(LexError {
                        offset: quote_pos,
                        kind: LexErrorKind::UnterminatedSingleQuote,
                    });
                }
            }
        }
    }

    fn lex_double_quoted(&mut self) -> Result<Segment, LexError> {
        let quote_pos = self.pos;
        self.bump();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        offset: quote_pos,
                        kind: LexErrorKind::UnterminatedDoubleQuote,
                    });
                }
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    match self.peek() {
                        Some(b'"' | b'$' | b'\\' | b'`') => {
                            text.push(self.peek().map(char::from).unwrap_or('\\'));
                            self.bump();
                        }
                        Some(_) => {
                            text.push('\\');
                            if let Some(ch) = self.bump_char() {
                                text.push(ch);
                            }
                        }
                        None => {
                            return Err(LexError {
                                offset: quote_pos,
                                kind: LexErrorKind::UnterminatedDoubleQuote,
                            });
                        }
                    }
                }
                Some(b'$') => match self.lex_dollar()? {
                    Some(segment) => {
                        flush_text(&mut parts, &mut text);
                        parts.push(segment);
                    }
                    None => text.push('$'),
                },
                Some(_) => {
                    let run_start = self.pos;
                    while let Some(byte) = self.peek() {
                        if matches!(byte, b'"' | b'\\' | b'$') {
                            break;
                        }
                        self.bump();
                    }
                    text.push_str(&self.src[run_start..self.pos]);
                }
            }
        }
        flush_text(&mut parts, &mut text);
        Ok(Segment::Quoted(parts))
    }

    /// At `$`: a command substitution, a variable reference, or just a
    /// literal dollar sign (`None`).
    fn lex_dollar(&mut self) -> Result<Option<Segment>, LexError> {
        let dollar_pos = self.pos;
        match self.peek_at(1) {
            Some(b'(') => {
                self.bump();
                self.bump();
                Ok(Some(self.lex_command_subst(dollar_pos)?))
            }
            Some(b'{') => {
                self.bump();
                self.bump();
                let name_start = self.pos;
                while matches!(self.peek(), Some(byte) if byte != b'}') {
                    self.bump();
                }
                if self.peek() != Some(b'}') {
                    return Err(LexError {
                        offset: dollar_pos,
                        kind: LexErrorKind::UnterminatedVariable,
                    });
                }
                let name = &self.src[name_start..self.pos];
                self.bump();
                if !is_valid_name(name) {
                    return Err(LexError {
                        offset: dollar_pos,
                        kind: LexErrorKind::InvalidVariableName(name.to_string()),
                    });
                }
                Ok(Some(Segment::Variable(name.to_string())))
            }
            Some(byte) if is_name_start(byte) => {
                self.bump();
                let name_start = self.pos;
                while matches!(self.peek(), Some(byte) if is_name_byte(byte)) {
                    self.bump();
                }
                Ok(Some(Segment::Variable(self.src[name_start..self.pos].to_string())))
            }
            _ => {
                self.bump();
                Ok(None)
            }
        }
    }

    /// After `$(`: capture the body verbatim up to the balancing `)`,
    /// honoring quotes so parentheses inside strings don't count.
    fn lex_command_subst(&mut self, open_pos: usize) -> Result<Segment, LexError> {
        let body_start = self.pos;
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        offset: open_pos,
                        kind: LexErrorKind::UnterminatedCommandSubst,
                    });
                }
                Some(b'(') => {
                    depth += 1;
                    self.bump();
                }
                Some(b')') => {
                    depth -= 1;
                    if depth == 0 {
                        let raw = self.src[body_start..self.pos].to_string();
                        self.bump();
                        return Ok(Segment::CommandSubst {
                            raw,
                            offset: body_start,
                        });
                    }
                    self.bump();
                }
                Some(b'\'') => {
                    let quote_pos = self.pos;
                    self.bump();
                    while matches!(self.peek(), Some(byte) if byte != b'\'') {
                        self.bump();
                    }
                    if self.peek() != Some(b'\'') {
                        return Err(LexError {
                            offset: quote_pos,
                            kind: LexErrorKind::UnterminatedSingleQuote,
                        });
                    }
                    self.bump();
                }
                Some(b'"') => {
                    let quote_pos = self.pos;
                    self.bump();
                    loop {
                        match self.peek() {
                            Some(b'"') => {
                                self.bump();
                                break;
                            }
                            Some(b'\\') => {
                                self.bump();
                                self.bump();
                            }
                            Some(_) => self.bump(),
                            None => {
                                return Err(LexError {
                                    offset: quote_pos,
                                    kind: LexErrorKind::UnterminatedDoubleQuote,
                                });
                            }
                        }
                    }
                }
                Some(b'\\') => {
                    self.bump();
                    self.bump();
                }
                Some(_) => self.bump(),
            }
        }
    }
}

fn flush_text(segments: &mut Vec<Segment>, text: &mut String) {
    if !text.is_empty() {
        segments.push(Segment::Text(std::mem::take(text)));
    }
}

fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    match bytes.first() {
        Some(&first) if is_name_start(first) => bytes.iter().all(|&byte| is_name_byte(byte)),
        _ => false,
    }
}
