use std::borrow::Cow;
use std::fmt::Display;

use crate::geometry::format_hundredths;

/// An owned s-expression used to render generated document elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExprBuf {
    List(String, Vec<SExprBuf>),
    Atom(String),
    Quoted(String),
}

impl SExprBuf {
    pub fn list(label: impl Into<String>) -> Self {
        SExprBuf::List(label.into(), Vec::new())
    }

    pub fn atom(atom: impl Into<String>) -> Self {
        SExprBuf::Atom(atom.into())
    }

    pub fn quoted(s: impl Into<String>) -> Self {
        SExprBuf::Quoted(s.into())
    }

    /// A fixed-point number stored in hundredths.
    pub fn number(hundredths: i64) -> Self {
        SExprBuf::Atom(format_hundredths(hundredths))
    }

    /// Appends a child; a no-op on atoms.
    pub fn with(mut self, child: SExprBuf) -> Self {
        if let SExprBuf::List(_, children) = &mut self {
            children.push(child);
        }
        self
    }

    pub fn with_atom(self, atom: impl Into<String>) -> Self {
        self.with(SExprBuf::atom(atom))
    }

    pub fn with_number(self, hundredths: i64) -> Self {
        self.with(SExprBuf::number(hundredths))
    }

    pub fn with_quoted(self, s: impl Into<String>) -> Self {
        self.with(SExprBuf::quoted(s))
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`escape`] on the contents of a quoted string read from a
/// document.
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(escaped) => out.push(escaped),
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

impl Display for SExprBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SExprBuf::List(label, children) => {
                write!(f, "({}", label)?;
                for child in children {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
            SExprBuf::Atom(s) => write!(f, "{}", s),
            SExprBuf::Quoted(s) => write!(f, "\"{}\"", escape(s)),
        }
    }
}
