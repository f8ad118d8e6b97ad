use logos::{Logos, SpannedIter};

pub(super) struct Token {
    pub(super) kind: TokenKind,
    pub(super) span: logos::Span,
    /// Span including the surrounding quotes for quoted strings.
    pub(super) outer: logos::Span,
}

pub(super) struct TokenIter<'a> {
    iter: SpannedIter<'a, LogosTokenKind>,
}

impl<'a> TokenIter<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            iter: LogosTokenKind::lexer(input).spanned(),
        }
    }
}

impl<'a> Iterator for TokenIter<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        match self.iter.next() {
            Some((Ok(kind), span)) => {
                let outer = span.clone();
                let (kind, span) = match kind {
                    LogosTokenKind::LParen => (TokenKind::LParen, span),
                    LogosTokenKind::RParen => (TokenKind::RParen, span),
                    LogosTokenKind::QuotedString => {
                        (TokenKind::String, (span.start + 1)..(span.end - 1))
                    }
                    LogosTokenKind::Atom => (TokenKind::String, span),
                };
                Some(Token { kind, span, outer })
            }
            Some((Err(_), span)) => Some(Token {
                kind: TokenKind::Error,
                span: span.clone(),
                outer: span,
            }),
            None => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum TokenKind {
    LParen,
    RParen,
    String,
    Error,
}

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
#[logos(skip r"[ \t\r\f\n]+")]
enum LogosTokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[regex(r#""([^"\\]|\\.)*""#)]
    QuotedString,
    #[regex(r#"[^"() \t\r\f\n]+"#)]
    Atom,
}
