//! Splices generated elements into a persisted schematic or board.
//!
//! The document is parsed into a span-annotated tree and rewritten from its
//! source text: untouched elements are copied byte for byte, stale
//! generated elements are dropped together with the whitespace before them,
//! and the fresh elements are inserted at one anchor.

use tracing::info;

use crate::artifact::ArtifactSet;
use crate::emit::{emit, NetCodes};
use crate::error::{DocumentStructureError, ParseError};
use crate::model::Representation;
use crate::sexpr::{parse_spanned, unescape, ParsedSExpr, SExpr, SExprBuf};

const INDENT: &str = "\n  ";

fn generated_kinds(representation: Representation) -> &'static [&'static str] {
    match representation {
        Representation::Schematic => &["wire", "junction", "label", "no_connect"],
        Representation::Board => &["segment", "via"],
    }
}

/// Elements the generated block is inserted in front of, first match wins.
fn anchors(representation: Representation) -> &'static [&'static str] {
    match representation {
        Representation::Schematic => &["symbol_instances", "sheet_instances", "embedded_fonts"],
        Representation::Board => &["embedded_fonts"],
    }
}

#[derive(Debug, Clone)]
pub struct Document<'a> {
    text: &'a str,
    root: ParsedSExpr,
    /// End of the root label; the first child's whitespace starts here.
    head: usize,
    representation: Representation,
}

impl<'a> Document<'a> {
    /// Fails unless the text is one balanced list labelled for `representation`.
    pub fn parse(text: &'a str, representation: Representation) -> Result<Self, DocumentStructureError> {
        let root = parse_spanned(text)?;
        let expected = representation.document_root();
        let head = match &root {
            ParsedSExpr::List { label, .. } if &text[label.clone()] == expected => label.end,
            _ => {
                return Err(DocumentStructureError::UnexpectedRoot {
                    expected: expected.to_owned(),
                    found: root.label(text).unwrap_or_default().to_owned(),
                })
            }
        };
        Ok(Self {
            text,
            root,
            head,
            representation,
        })
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Borrowed view of the whole tree for loaders.
    pub fn tree(&self) -> SExpr<'a> {
        self.root.to_sexpr(self.text)
    }

    fn is_generated(&self, node: &ParsedSExpr) -> bool {
        node.label(self.text)
            .is_some_and(|l| generated_kinds(self.representation).contains(&l))
    }

    /// Number of generated elements currently in the document.
    pub fn generated_count(&self) -> usize {
        self.root
            .children()
            .iter()
            .filter(|c| self.is_generated(c))
            .count()
    }

    /// Board net declarations, `(net 3 "GND")`, by name.
    pub fn net_codes(&self) -> Result<NetCodes, DocumentStructureError> {
        let mut codes = NetCodes::new();
        for node in self.root.children() {
            if node.label(self.text) != Some("net") {
                continue;
            }
            let net = node.to_sexpr(self.text);
            let mut atoms = net.atoms();
            let malformed = |source| DocumentStructureError::Malformed {
                element: net.to_string(),
                source,
            };
            let code = atoms
                .next()
                .ok_or_else(|| malformed(ParseError::MissingValue("net".into())))?;
            let code: u32 = code
                .parse()
                .map_err(|_| malformed(ParseError::InvalidNumber(code.to_owned())))?;
            let name = atoms.next().unwrap_or_default();
            codes.insert(unescape(name).into_owned(), code);
        }
        Ok(codes)
    }

    /// Replaces every generated element with those rendered from `artifacts`.
    pub fn rewrite(&self, artifacts: &ArtifactSet) -> Result<String, DocumentStructureError> {
        let text = self.text;
        let mut codes = self.net_codes()?;
        let mut declarations = String::new();
        if self.representation == Representation::Board {
            let mut next = codes.values().max().map_or(1, |c| c + 1);
            for net in artifacts.segments.iter().map(|s| &s.net).chain(artifacts.vias.iter().map(|v| &v.net)) {
                if !codes.contains_key(net) {
                    codes.insert(net.clone(), next);
                    let decl = SExprBuf::list("net")
                        .with_atom(next.to_string())
                        .with_quoted(net);
                    declarations.push_str(INDENT);
                    declarations.push_str(&decl.to_string());
                    next += 1;
                }
            }
        }

        let mut block = String::new();
        for element in emit(artifacts, &codes) {
            block.push_str(INDENT);
            block.push_str(&element.to_string());
        }

        let children = self.root.children();
        let anchor = anchors(self.representation).iter().find_map(|a| {
            children
                .iter()
                .position(|c| c.label(text) == Some(*a))
        });
        let last_net = children
            .iter()
            .rposition(|c| c.label(text) == Some("net"));
        if last_net.is_none() {
            block.insert_str(0, &declarations);
        }

        let mut out = String::with_capacity(text.len() + block.len());
        out.push_str(&text[..self.head]);
        let mut prev = self.head;
        let mut removed = 0;
        for (i, child) in children.iter().enumerate() {
            let span = child.span();
            let gap = &text[prev..span.start];
            prev = span.end;
            if self.is_generated(child) {
                removed += 1;
                continue;
            }
            if Some(i) == anchor {
                out.push_str(&block);
            }
            out.push_str(gap);
            out.push_str(&text[span]);
            if Some(i) == last_net {
                out.push_str(&declarations);
            }
        }
        if anchor.is_none() {
            out.push_str(&block);
        }
        out.push_str(&text[prev..]);

        info!(
            removed,
            inserted = artifacts.segments.len()
                + artifacts.vias.len()
                + artifacts.junctions.len()
                + artifacts.labels.len()
                + artifacts.no_connects.len(),
            "document rewritten"
        );
        Ok(out)
    }
}

/// Parses `existing` and replaces its generated elements.
pub fn rewrite(existing: &str, artifacts: &ArtifactSet) -> Result<String, DocumentStructureError> {
    Document::parse(existing, artifacts.representation)?.rewrite(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{element_id, Junction, PathSegment, Via, WidthClass};
    use crate::geometry::Point;
    use crate::model::Layer;

    const SCHEMATIC: &str = r#"(kicad_sch (version 20231120) (generator "eeschema")
  (lib_symbols
    (symbol "Device:R" (pin passive line (at 0 3.81 270) (length 1.27)))
  )
  (wire (pts (xy 1 1) (xy 2 1))
    (stroke (width 0) (type default))
    (uuid "old-1")
  )
  (symbol (lib_id "Device:R") (at 10 10 0)
    (property "Reference" "R1" (at 0 0 0))
  )
  (junction (at 2 1) (diameter 0) (color 0 0 0 0)
    (uuid "old-2")
  )
  (global_label "VBUS" (at 5 5 0))
  (sheet_instances
    (path "/" (page "1"))
  )
)
"#;

    fn artifacts() -> ArtifactSet {
        let mut set = ArtifactSet::new(Representation::Schematic);
        set.segments.push(PathSegment {
            id: element_id("wire", "N1", 0),
            net: "N1".into(),
            start: Point::from_mm(10.0, 6.19),
            end: Point::from_mm(20.0, 6.19),
            layer: Layer::Sheet,
            class: WidthClass::Signal,
            width: 0,
        });
        set.junctions.push(Junction {
            id: element_id("junction", "N1", 0),
            net: "N1".into(),
            at: Point::from_mm(20.0, 6.19),
        });
        set
    }

    #[test]
    fn stale_elements_are_replaced_and_the_rest_kept() {
        let out = rewrite(SCHEMATIC, &artifacts()).unwrap();
        assert!(!out.contains("old-1") && !out.contains("old-2"));
        assert!(out.contains("(global_label \"VBUS\" (at 5 5 0))"));
        assert!(out.contains("    (property \"Reference\" \"R1\" (at 0 0 0))\n  )"));
        let wire = out.find("(wire (pts (xy 10 6.19)").unwrap();
        let junction = out.find("(junction (at 20 6.19)").unwrap();
        let anchor = out.find("(sheet_instances").unwrap();
        assert!(out.find("(symbol (lib_id").unwrap() < wire);
        assert!(wire < junction && junction < anchor);
        assert!(out.ends_with(")\n"));
        assert_eq!(Document::parse(&out, Representation::Schematic).unwrap().generated_count(), 2);
    }

    #[test]
    fn rewriting_twice_changes_nothing() {
        let once = rewrite(SCHEMATIC, &artifacts()).unwrap();
        let twice = rewrite(&once, &artifacts()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_artifacts_strip_generated_elements() {
        let out = rewrite(SCHEMATIC, &ArtifactSet::new(Representation::Schematic)).unwrap();
        let doc = Document::parse(&out, Representation::Schematic).unwrap();
        assert_eq!(doc.generated_count(), 0);
        assert!(out.contains("(symbol (lib_id \"Device:R\")"));
    }

    #[test]
    fn unbalanced_documents_are_rejected() {
        let broken = &SCHEMATIC[..SCHEMATIC.len() - 3];
        assert!(matches!(
            rewrite(broken, &artifacts()),
            Err(DocumentStructureError::Parse(_))
        ));
        assert!(matches!(
            rewrite("(kicad_pcb (version 1))", &artifacts()),
            Err(DocumentStructureError::UnexpectedRoot { .. })
        ));
    }

    #[test]
    fn board_declares_missing_nets_after_existing_ones() {
        let board = "(kicad_pcb (version 20240108)\n  (net 0 \"\")\n  (net 1 \"GND\")\n  (footprint \"R\")\n  (segment (start 0 0) (end 1 0) (width 0.25) (layer \"F.Cu\") (net 1) (uuid \"x\"))\n)\n";
        let mut set = ArtifactSet::new(Representation::Board);
        set.vias.push(Via {
            id: element_id("via", "VBUS", 0),
            net: "VBUS".into(),
            at: Point::from_mm(3.0, 4.0),
            size: 80,
            drill: 40,
        });
        let out = rewrite(board, &set).unwrap();
        assert!(out.contains("(net 1 \"GND\")\n  (net 2 \"VBUS\")\n  (footprint"));
        assert!(out.contains("(via (at 3 4) (size 0.8) (drill 0.4) (layers \"F.Cu\" \"B.Cu\") (net 2)"));
        assert!(!out.contains("(segment"));
        assert_eq!(rewrite(&out, &set).unwrap(), out);

        let doc = Document::parse(&out, Representation::Board).unwrap();
        assert_eq!(doc.net_codes().unwrap().get("VBUS"), Some(&2));
    }

    #[test]
    fn escaped_net_names_keep_their_code() {
        let board = "(kicad_pcb (version 20240108)\n  (net 0 \"\")\n  (net 1 \"A\\\"B\")\n)\n";
        let doc = Document::parse(board, Representation::Board).unwrap();
        assert_eq!(doc.net_codes().unwrap().get("A\"B"), Some(&1));

        let mut set = ArtifactSet::new(Representation::Board);
        set.vias.push(Via {
            id: element_id("via", "A\"B", 0),
            net: "A\"B".into(),
            at: Point::from_mm(1.0, 1.0),
            size: 80,
            drill: 40,
        });
        let out = rewrite(board, &set).unwrap();
        assert!(!out.contains("(net 2"));
        assert!(out.contains("(layers \"F.Cu\" \"B.Cu\") (net 1)"));
    }

    #[test]
    fn malformed_net_declaration() {
        let doc = Document::parse("(kicad_pcb (net x \"A\"))", Representation::Board).unwrap();
        assert!(matches!(
            doc.net_codes(),
            Err(DocumentStructureError::Malformed { .. })
        ));
    }
}
