use std::fmt::Display;

use crate::error::ParseError;

mod lexer;
mod parser;
mod writer;

pub use parser::{ParsedSExpr, Span};
pub use writer::{unescape, SExprBuf};

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SExpr<'a> {
    SExpr(&'a str, Box<[SExpr<'a>]>),
    String(&'a str),
}

/// Parses a document into a span-annotated tree with a single root list.
pub fn parse_spanned(input: &str) -> Result<ParsedSExpr, ParseError> {
    parser::Parser::new(input).parse_root()
}

impl<'a> Display for SExpr<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SExpr::SExpr(label, children) => {
                write!(f, "({}", label)?;
                for child in children.iter() {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
            SExpr::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl<'a> SExpr<'a> {
    pub fn label(&self) -> Option<&'a str> {
        match self {
            SExpr::SExpr(label, _) => Some(label),
            SExpr::String(_) => None,
        }
    }

    pub fn value(&self, label: &str) -> Result<&'a str, ParseError> {
        let child = self.child(label)?;
        child
            .atoms()
            .next()
            .ok_or_else(|| ParseError::MissingValue(label.to_owned()))
    }

    /// The bare or quoted string children of a list, in order.
    pub fn atoms<'b>(&'b self) -> impl Iterator<Item = &'a str> + 'b {
        let children: &'b [SExpr<'a>] = match self {
            SExpr::SExpr(_, children) => &children[..],
            SExpr::String(_) => &[],
        };
        children.iter().filter_map(|c| match c {
            SExpr::String(s) => Some(*s),
            SExpr::SExpr(_, _) => None,
        })
    }

    pub fn has_atom(&self, atom: &str) -> bool {
        self.atoms().any(|a| a == atom)
    }

    pub fn children<'b, 'c>(&'b self, label: &'c str) -> LabeledChildIterator<'a, 'b, 'c> {
        let iter = match self {
            SExpr::String(_) => None,
            SExpr::SExpr(_, children) => Some(children.iter()),
        };
        LabeledChildIterator { iter, label }
    }

    pub fn child<'b>(&self, label: &'b str) -> Result<&SExpr<'a>, ParseError> {
        let mut iter = self.children(label);
        iter.next()
            .ok_or(ParseError::MissingChild(label.to_owned()))
    }
}

#[derive(Debug)]
pub struct LabeledChildIterator<'a, 'b, 'c> {
    iter: Option<std::slice::Iter<'b, SExpr<'a>>>,
    label: &'c str,
}

impl<'a, 'b, 'c> Iterator for LabeledChildIterator<'a, 'b, 'c> {
    type Item = &'b SExpr<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let iter = self.iter.as_mut()?;
        loop {
            let item = iter.next();
            match &item {
                None => return None,
                Some(SExpr::String(_)) => continue,
                Some(SExpr::SExpr(label, _)) => {
                    if *label == self.label {
                        return item;
                    }
                }
            }
        }
    }
}

impl<'a> TryFrom<&'a String> for SExpr<'a> {
    type Error = ParseError;

    fn try_from(input: &'a String) -> Result<Self, Self::Error> {
        SExpr::try_from(input.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_data {
        ($fname:expr) => {
            std::fs::read_to_string(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/resources/test/",
                $fname
            ))
            .unwrap()
        };
    }

    #[test]
    fn sexpr_can_parse_full_schematic() {
        let i = &test_data!("switch.kicad_sch");
        let root = SExpr::try_from(i).unwrap();
        assert_eq!(root.label(), Some("kicad_sch"));
        assert!(root.children("symbol").count() > 0);
    }

    #[test]
    fn sexpr_can_parse_full_board() {
        let i = &test_data!("switch.kicad_pcb");
        let root = SExpr::try_from(i).unwrap();
        assert_eq!(root.label(), Some("kicad_pcb"));
        assert!(root.children("footprint").count() > 0);
    }

    #[test]
    fn sexpr_children_by_name_works() {
        let root = SExpr::try_from(r#"(a (b "1") (c "2") (b "3"))"#).unwrap();

        let mut iter = root.children("b");
        assert!(iter.next().is_some());
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert_eq!(root.value("c").unwrap(), "2");
        assert!(matches!(root.value("d"), Err(ParseError::MissingChild(_))));
    }

    #[test]
    fn atoms_skip_nested_lists() {
        let root = SExpr::try_from("(pad \"1\" smd rect (at 1 2))").unwrap();
        let atoms: Vec<_> = root.atoms().collect();
        assert_eq!(atoms, vec!["1", "smd", "rect"]);
        assert!(root.has_atom("smd"));
        assert!(!root.has_atom("thru_hole"));
    }
}
