use std::iter::Peekable;

use crate::error::ParseError;

use super::{
    lexer::{Token, TokenIter, TokenKind},
    SExpr,
};

pub(super) struct Parser<'a> {
    input: &'a str,
    iter: Peekable<TokenIter<'a>>,
}

pub type Span = logos::Span;

/// A parsed s-expression that remembers where each node came from.
///
/// `span` always covers the whole node in the source, including the
/// parentheses of a list or the quotes of a quoted string.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParsedSExpr {
    List {
        span: Span,
        label: Span,
        children: Vec<ParsedSExpr>,
    },
    Atom {
        span: Span,
        value: Span,
    },
}

impl ParsedSExpr {
    pub fn span(&self) -> Span {
        match self {
            ParsedSExpr::List { span, .. } | ParsedSExpr::Atom { span, .. } => span.clone(),
        }
    }

    /// The label of a list node, `None` for atoms.
    pub fn label<'a>(&self, input: &'a str) -> Option<&'a str> {
        match self {
            ParsedSExpr::List { label, .. } => Some(&input[label.clone()]),
            ParsedSExpr::Atom { .. } => None,
        }
    }

    pub fn children(&self) -> &[ParsedSExpr] {
        match self {
            ParsedSExpr::List { children, .. } => children,
            ParsedSExpr::Atom { .. } => &[],
        }
    }

    pub fn to_sexpr<'a>(&self, input: &'a str) -> SExpr<'a> {
        match self {
            ParsedSExpr::List {
                label, children, ..
            } => {
                let label = &input[label.clone()];
                let children: Box<[SExpr]> =
                    children.iter().map(|c| c.to_sexpr(input)).collect();
                SExpr::SExpr(label, children)
            }
            ParsedSExpr::Atom { value, .. } => SExpr::String(&input[value.clone()]),
        }
    }
}

impl<'a> Parser<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            input,
            iter: TokenIter::new(input).peekable(),
        }
    }

    fn eof(&self) -> ParseError {
        let end = self.input.len();
        ParseError::UnexpectedEof { at: end..end }
    }

    fn get(&mut self) -> Result<Token, ParseError> {
        self.iter.next().ok_or_else(|| self.eof())
    }

    fn peek(&mut self) -> Option<TokenKind> {
        self.iter.peek().map(|tok| tok.kind)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let tok = self.get()?;
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("{:?}", kind),
                found: format!("{:?}", tok.kind),
                at: tok.span.clone(),
            })
        }
    }

    fn parse_sexpr(&mut self) -> Result<ParsedSExpr, ParseError> {
        let open = self.expect(TokenKind::LParen)?;
        let label = self.expect(TokenKind::String)?;

        let mut children = Vec::new();
        loop {
            match self.peek() {
                Some(TokenKind::RParen) => {
                    let close = self.get()?;
                    break Ok(ParsedSExpr::List {
                        span: open.span.start..close.span.end,
                        label: label.span.clone(),
                        children,
                    });
                }
                Some(TokenKind::LParen) => {
                    children.push(self.parse_sexpr()?);
                }
                Some(TokenKind::String) => {
                    let tok = self.get()?;
                    children.push(ParsedSExpr::Atom {
                        span: tok.outer.clone(),
                        value: tok.span.clone(),
                    });
                }
                Some(TokenKind::Error) => {
                    let tok = self.get()?;
                    break Err(ParseError::UnknownToken {
                        found: self.input[tok.span.clone()].to_owned(),
                        at: tok.span.clone(),
                    });
                }
                None => break Err(self.eof()),
            }
        }
    }

    /// Parses exactly one root list and rejects anything after it.
    pub(super) fn parse_root(&mut self) -> Result<ParsedSExpr, ParseError> {
        let root = self.parse_sexpr()?;
        if let Some(tok) = self.iter.next() {
            return Err(ParseError::TrailingInput { at: tok.span });
        }
        Ok(root)
    }
}

impl<'a> TryFrom<&'a str> for SExpr<'a> {
    type Error = ParseError;

    fn try_from(input: &'a str) -> Result<Self, Self::Error> {
        let mut parser = Parser::new(input);
        let sexpr = parser.parse_root()?;
        let sexpr = sexpr.to_sexpr(input);
        Ok(sexpr)
    }
}
