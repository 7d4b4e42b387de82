//! Parser for the shell mini-language.
//!
//! Transforms the token stream from the lexer into a command tree:
//!
//! ```text
//! sequential_list := item (sep item)*          sep in { ';', '&', newline }
//! item            := boolean_list
//! boolean_list    := pipeline (('&&' | '||') pipeline)*    left-assoc
//! pipeline        := command (('|' | '|&') command)*       left-assoc
//! command         := subshell | simple
//! subshell        := '(' sequential_list ')'
//! simple          := (NAME '=' word)* word* redirect*
//! ```
//!
//! Command substitution bodies captured by the lexer are parsed here by
//! recursive descent into `parse_at`, carrying the byte offset so error
//! positions stay anchored to the original source.

use crate::ast::{
    BooleanList, BooleanOp, ListItem, Node, Pipeline, Redirect, RedirectOp, RedirectTarget,
    SequentialList, SimpleCommand, VariableAssignment, Word, WordPart,
};
use crate::lexer::{self, RawWord, Segment, Spanned, Token};

/// A parse failure: the byte offset it was detected at and what was
/// expected or found there.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at byte {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

/// Parse shell source into a [`SequentialList`]. Empty input parses to an
/// empty list.
pub fn parse(src: &str) -> Result<SequentialList, ParseError> {
    parse_at(src, 0)
}

fn parse_at(src: &str, base: usize) -> Result<SequentialList, ParseError> {
    let tokens = lexer::tokenize(src).map_err(|err| ParseError {
        offset: base + err.offset,
        message: err.to_string(),
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        src_len: src.len(),
        base,
    };
    let list = parser.parse_sequential_list(false)?;
    if let Some(spanned) = parser.peek_spanned() {
        let message = format!("unexpected {}", describe(&spanned.token));
        let offset = base + spanned.span.start;
        return Err(ParseError { offset, message });
    }
    Ok(list)
}

struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
    src_len: usize,
    base: usize,
}

impl Parser {
    fn peek_spanned(&self) -> Option<&Spanned<Token>> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_spanned().map(|spanned| &spanned.token)
    }

    fn bump(&mut self) -> Option<Spanned<Token>> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn offset(&self) -> usize {
        self.base
            + self
                .peek_spanned()
                .map(|spanned| spanned.span.start)
                .unwrap_or(self.src_len)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Newline | Token::Semi)) {
            self.bump();
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) {
            self.bump();
        }
    }

    fn parse_sequential_list(&mut self, in_subshell: bool) -> Result<SequentialList, ParseError> {
        let mut items = Vec::new();
        self.skip_separators();
        while let Some(token) = self.peek() {
            if in_subshell && matches!(token, Token::RParen) {
                break;
            }
            let node = self.parse_boolean_list()?;
            let mut is_async = false;
            match self.peek() {
                Some(Token::Amp) => {
                    self.bump();
                    is_async = true;
                }
                Some(Token::Semi | Token::Newline) => {
                    self.bump();
                }
                Some(Token::RParen) if in_subshell => {}
                None => {}
                Some(other) => {
                    return Err(self.error(format!("unexpected {}", describe(other))));
                }
            }
            items.push(ListItem { is_async, node });
            self.skip_separators();
        }
        Ok(SequentialList { items })
    }

    fn parse_boolean_list(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_pipeline()?;
        loop {
            let op = match self.peek() {
                Some(Token::AndAnd) => BooleanOp::And,
                Some(Token::OrOr) => BooleanOp::Or,
                _ => break,
            };
            self.bump();
            self.skip_newlines();
            let right = self.parse_pipeline()?;
            left = Node::Boolean(Box::new(BooleanList { left, op, right }));
        }
        Ok(left)
    }

    fn parse_pipeline(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_command()?;
        loop {
            let stderr_too = match self.peek() {
                Some(Token::Pipe) => false,
                Some(Token::PipeAmp) => true,
                _ => break,
            };
            self.bump();
            self.skip_newlines();
            let right = self.parse_command()?;
            left = Node::Pipeline(Box::new(Pipeline {
                left,
                right,
                stderr_too,
            }));
        }
        Ok(left)
    }

    fn parse_command(&mut self) -> Result<Node, ParseError> {
        match self.peek() {
            Some(Token::LParen) => {
                let open_offset = self.offset();
                self.bump();
                let inner = self.parse_sequential_list(true)?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.bump();
                    }
                    _ => {
                        return Err(ParseError {
                            offset: open_offset,
                            message: "unterminated subshell".to_string(),
                        });
                    }
                }
                if inner.items.is_empty() {
                    return Err(ParseError {
                        offset: open_offset,
                        message: "empty subshell".to_string(),
                    });
                }
                Ok(Node::Subshell(Box::new(inner)))
            }
            _ => self.parse_simple_command(),
        }
    }

    fn parse_simple_command(&mut self) -> Result<Node, ParseError> {
        let mut env = Vec::new();
        let mut args: Vec<Word> = Vec::new();
        let mut redirects = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    let Some(Spanned {
                        token: Token::Word(raw),
                        ..
                    }) = self.bump()
                    else {
                        unreachable!("peeked a word");
                    };
                    let word = self.convert_word(raw)?;
                    if args.is_empty() && redirects.is_empty() {
                        if let Some((name, value)) = split_assignment(&word) {
                            env.push(VariableAssignment { name, value });
                            continue;
                        }
                    }
                    args.push(word);
                }
                Some(Token::Redirect(_)) => {
                    let Some(Spanned {
                        token: Token::Redirect(redirect),
                        ..
                    }) = self.bump()
                    else {
                        unreachable!("peeked a redirect");
                    };
                    let fd = redirect.fd.unwrap_or(match redirect.op {
                        RedirectOp::Read => 0,
                        RedirectOp::Write | RedirectOp::Append => 1,
                    });
                    let target = match redirect.fd_target {
                        Some(target_fd) => RedirectTarget::Fd(target_fd),
                        None => match self.peek() {
                            Some(Token::Word(_)) => {
                                let Some(Spanned {
                                    token: Token::Word(raw),
                                    ..
                                }) = self.bump()
                                else {
                                    unreachable!("peeked a word");
                                };
                                RedirectTarget::Path(self.convert_word(raw)?)
                            }
                            _ => return Err(self.error("redirect missing target")),
                        },
                    };
                    redirects.push(Redirect {
                        fd,
                        op: redirect.op,
                        target,
                    });
                }
                _ => break,
            }
        }

        if env.is_empty() && args.is_empty() && redirects.is_empty() {
            let message = match self.peek() {
                Some(token) => format!("expected a command but found {}", describe(token)),
                None => "expected a command".to_string(),
            };
            return Err(self.error(message));
        }
        if args.is_empty() && redirects.is_empty() {
            Ok(Node::Assignment(env))
        } else {
            Ok(Node::Command(SimpleCommand {
                env,
                args,
                redirects,
            }))
        }
    }

    fn convert_word(&self, raw: RawWord) -> Result<Word, ParseError> {
        let parts = raw
            .segments
            .into_iter()
            .map(|segment| self.convert_segment(segment))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Word { parts })
    }

    fn convert_segment(&self, segment: Segment) -> Result<WordPart, ParseError> {
        Ok(match segment {
            Segment::Text(text) => WordPart::Text(text),
            Segment::Variable(name) => WordPart::Variable(name),
            Segment::Quoted(inner) => WordPart::Quoted(
                inner
                    .into_iter()
                    .map(|segment| self.convert_segment(segment))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Segment::CommandSubst { raw, offset } => {
                WordPart::CommandSubst(parse_at(&raw, self.base + offset)?)
            }
        })
    }
}

/// If the word starts with `NAME=`, split it into the name and the value
/// word. Only a leading literal segment can carry the assignment.
fn split_assignment(word: &Word) -> Option<(String, Word)> {
    let WordPart::Text(first) = word.parts.first()? else {
        return None;
    };
    let eq = first.find('=')?;
    let name = &first[..eq];
    if name.is_empty() || !is_valid_name(name) {
        return None;
    }
    let mut value_parts = Vec::new();
    let rest = &first[eq + 1..];
    if !rest.is_empty() {
        value_parts.push(WordPart::Text(rest.to_string()));
    }
    value_parts.extend(word.parts.iter().skip(1).cloned());
    Some((name.to_string(), Word { parts: value_parts }))
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Word(_) => "word".to_string(),
        Token::Redirect(_) => "redirect".to_string(),
        Token::Newline => "newline".to_string(),
        Token::Semi => "';'".to_string(),
        Token::Amp => "'&'".to_string(),
        Token::AndAnd => "'&&'".to_string(),
        Token::OrOr => "'||'".to_string(),
        Token::Pipe => "'|'".to_string(),
        Token::PipeAmp => "'|&'".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(src: &str) -> Node {
        let list = parse(src).expect("parse failed");
        assert_eq!(list.items.len(), 1, "expected one item for {src:?}");
        list.items[0].node.clone()
    }

    #[test]
    fn plain_command_args_are_whitespace_split() {
        let node = single("echo one two three");
        match node {
            Node::Command(cmd) => {
                let args: Vec<_> = cmd.args.iter().map(|w| w.parts.clone()).collect();
                assert_eq!(
                    args,
                    vec![
                        vec![WordPart::Text("echo".to_string())],
                        vec![WordPart::Text("one".to_string())],
                        vec![WordPart::Text("two".to_string())],
                        vec![WordPart::Text("three".to_string())],
                    ]
                );
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn boolean_lists_are_left_associative() {
        let node = single("a && b || c");
        match node {
            Node::Boolean(outer) => {
                assert_eq!(outer.op, BooleanOp::Or);
                match &outer.left {
                    Node::Boolean(inner) => assert_eq!(inner.op, BooleanOp::And),
                    other => panic!("expected nested boolean, got {other:?}"),
                }
            }
            other => panic!("expected boolean list, got {other:?}"),
        }
    }

    #[test]
    fn pipeline_binds_tighter_than_boolean() {
        let node = single("a | b && c");
        match node {
            Node::Boolean(outer) => {
                assert_eq!(outer.op, BooleanOp::And);
                assert!(matches!(&outer.left, Node::Pipeline(_)));
            }
            other => panic!("expected boolean list, got {other:?}"),
        }
    }

    #[test]
    fn pipe_amp_sets_stderr_flag() {
        match single("a |& b") {
            Node::Pipeline(p) => assert!(p.stderr_too),
            other => panic!("expected pipeline, got {other:?}"),
        }
        match single("a | b") {
            Node::Pipeline(p) => assert!(!p.stderr_too),
            other => panic!("expected pipeline, got {other:?}"),
        }
    }

    #[test]
    fn sequential_list_tracks_async_items() {
        let list = parse("sleep 1s & echo done").unwrap();
        assert_eq!(list.items.len(), 2);
        assert!(list.items[0].is_async);
        assert!(!list.items[1].is_async);
    }

    #[test]
    fn assignment_without_args_is_shell_local() {
        match single("FOO=bar") {
            Node::Assignment(assigns) => {
                assert_eq!(assigns.len(), 1);
                assert_eq!(assigns[0].name, "FOO");
                assert_eq!(assigns[0].value, Word::text("bar"));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn assignment_prefix_becomes_command_env() {
        match single("FOO=bar echo hi") {
            Node::Command(cmd) => {
                assert_eq!(cmd.env.len(), 1);
                assert_eq!(cmd.env[0].name, "FOO");
                assert_eq!(cmd.args.len(), 2);
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn equals_in_later_args_is_literal() {
        match single("echo FOO=bar") {
            Node::Command(cmd) => {
                assert!(cmd.env.is_empty());
                assert_eq!(cmd.args[1], Word::text("FOO=bar"));
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn subshell_wraps_inner_list() {
        match single("(echo a; echo b)") {
            Node::Subshell(inner) => assert_eq!(inner.items.len(), 2),
            other => panic!("expected subshell, got {other:?}"),
        }
    }

    #[test]
    fn redirects_collect_on_command() {
        match single("cmd arg > out.txt 2>&1") {
            Node::Command(cmd) => {
                assert_eq!(cmd.redirects.len(), 2);
                assert_eq!(cmd.redirects[0].fd, 1);
                assert_eq!(cmd.redirects[0].op, RedirectOp::Write);
                assert_eq!(cmd.redirects[1].fd, 2);
                assert_eq!(cmd.redirects[1].target, RedirectTarget::Fd(1));
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn command_subst_parses_recursively() {
        match single("echo $(echo inner)") {
            Node::Command(cmd) => match &cmd.args[1].parts[0] {
                WordPart::CommandSubst(list) => {
                    assert_eq!(list.items.len(), 1);
                    assert!(matches!(list.items[0].node, Node::Command(_)));
                }
                other => panic!("expected command subst, got {other:?}"),
            },
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn empty_source_parses_to_empty_list() {
        assert_eq!(parse("").unwrap().items.len(), 0);
        assert_eq!(parse(" \n ; \n").unwrap().items.len(), 0);
    }

    #[test]
    fn trailing_pipe_is_an_error() {
        let err = parse("echo a |").unwrap_err();
        assert_eq!(err.offset, 8);
        assert!(err.message.contains("expected a command"));
    }

    #[test]
    fn leading_operator_is_an_error() {
        let err = parse("&& echo a").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn unterminated_quote_reports_offset() {
        let err = parse("echo 'oops").unwrap_err();
        assert_eq!(err.offset, 5);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn error_inside_substitution_keeps_source_offset() {
        let err = parse("echo $(echo 'oops)").unwrap_err();
        // The quote opens at byte 12 of the original source.
        assert_eq!(err.offset, 12);
    }

    #[test]
    fn newline_allowed_after_boolean_operator() {
        let list = parse("echo a &&\necho b").unwrap();
        assert_eq!(list.items.len(), 1);
        assert!(matches!(list.items[0].node, Node::Boolean(_)));
    }
}
