//! Reads component types and placements out of KiCad documents.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::document::Document;
use crate::error::{ConfigurationError, DocumentStructureError, Error, ParseError};
use crate::geometry::{Mirror, Offset, Placement, Point, Rotation};
use crate::model::{
    ComponentInstance, ComponentType, ConnectionPoint, Layer, RefDes, Representation, TypeId,
    TypeRegistry,
};
use crate::sexpr::{unescape, SExpr};

/// Types and placements found in a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loaded {
    pub types: TypeRegistry,
    pub instances: IndexMap<RefDes, ComponentInstance>,
}

impl Loaded {
    fn place(&mut self, instance: ComponentInstance) -> Result<(), ConfigurationError> {
        if self.instances.contains_key(&instance.ref_des) {
            return Err(ConfigurationError::DuplicateComponent(instance.ref_des.0));
        }
        self.instances.insert(instance.ref_des.clone(), instance);
        Ok(())
    }
}

fn malformed(node: &SExpr, source: ParseError) -> DocumentStructureError {
    DocumentStructureError::Malformed {
        element: node.label().unwrap_or_default().to_owned(),
        source,
    }
}

fn number(s: &str) -> Result<f64, ParseError> {
    s.parse().map_err(|_| ParseError::InvalidNumber(s.to_owned()))
}

/// `(at x y [angle])` of a node.
fn at(node: &SExpr) -> Result<(f64, f64, f64), DocumentStructureError> {
    let inner = || -> Result<(f64, f64, f64), ParseError> {
        let at = node.child("at")?;
        let mut atoms = at.atoms();
        let mut next = || atoms.next().ok_or_else(|| ParseError::MissingValue("at".into()));
        let x = number(next()?)?;
        let y = number(next()?)?;
        let angle = match atoms.next() {
            Some(a) => number(a)?,
            None => 0.0,
        };
        Ok((x, y, angle))
    };
    inner().map_err(|e| malformed(node, e))
}

fn property<'a>(node: &SExpr<'a>, name: &str) -> Option<&'a str> {
    node.children("property").find_map(|p| {
        let mut atoms = p.atoms();
        (atoms.next() == Some(name)).then(|| atoms.next()).flatten()
    })
}

fn pin(node: &SExpr) -> Result<ConnectionPoint, DocumentStructureError> {
    let (x, y, angle) = at(node)?;
    let number = node.value("number").map_err(|e| malformed(node, e))?;
    let name = node
        .value("name")
        .ok()
        .filter(|n| !n.is_empty() && *n != "~");
    Ok(ConnectionPoint {
        number: unescape(number).into_owned(),
        name: name.map(|n| unescape(n).into_owned()),
        offset: Offset::new(x, y),
        // The pin's own angle points from its tip into the body.
        exit: Some((angle + 180.0).rem_euclid(360.0)),
        through_hole: false,
    })
}

/// Unit and body style from a unit sub-symbol name, `"R_1_1"`.
fn unit_of(name: &str) -> Option<(u32, u32)> {
    let mut parts = name.rsplitn(3, '_');
    let style = parts.next()?.parse().ok()?;
    let unit = parts.next()?.parse().ok()?;
    Some((unit, style))
}

/// Pins of one library symbol tagged with their unit, 0 for shared pins.
struct LibSymbol {
    pins: Vec<(u32, ConnectionPoint)>,
}

impl LibSymbol {
    fn read(node: &SExpr) -> Result<Self, DocumentStructureError> {
        let mut pins = Vec::new();
        for p in node.children("pin") {
            pins.push((0, pin(p)?));
        }
        for sub in node.children("symbol") {
            let (unit, style) = sub.atoms().next().and_then(unit_of).unwrap_or((0, 1));
            // Alternate body styles repeat the same pins.
            if style > 1 {
                continue;
            }
            for p in sub.children("pin") {
                pins.push((unit, pin(p)?));
            }
        }
        Ok(Self { pins })
    }

    fn units(&self) -> usize {
        self.pins
            .iter()
            .filter(|(u, _)| *u > 0)
            .map(|(u, _)| *u)
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn points_for(&self, unit: u32) -> Vec<ConnectionPoint> {
        self.pins
            .iter()
            .filter(|(u, _)| *u == 0 || *u == unit)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

fn load_schematic(root: &SExpr) -> Result<Loaded, Error> {
    let mut library = IndexMap::new();
    if let Ok(lib) = root.child("lib_symbols") {
        for sym in lib.children("symbol") {
            let Some(id) = sym.atoms().next() else {
                continue;
            };
            library.insert(id, LibSymbol::read(sym)?);
        }
    }

    let mut loaded = Loaded::default();
    for sym in root.children("symbol") {
        let lib_id = sym.value("lib_id").map_err(|e| malformed(sym, e))?;
        let Some(reference) = property(sym, "Reference") else {
            debug!(lib_id, "skipping symbol without a reference");
            continue;
        };
        let (x, y, rot) = at(sym)?;
        let unit = match sym.value("unit") {
            Ok(u) => u.parse().map_err(|_| malformed(sym, ParseError::InvalidNumber(u.to_owned())))?,
            Err(_) => 1,
        };
        let mirror = sym.child("mirror").ok().and_then(|m| m.atoms().next());
        let mirror = Mirror {
            x: mirror == Some("x"),
            y: mirror == Some("y"),
        };

        let lib_name = unescape(lib_id);
        let type_id = match library.get(lib_id) {
            Some(lib) if lib.units() > 1 => {
                let id = TypeId(format!("{lib_name}#{unit}"));
                if loaded.types.get(&id).is_none() {
                    loaded.types.insert(ComponentType {
                        id: id.clone(),
                        points: lib.points_for(unit),
                    });
                }
                id
            }
            Some(lib) => {
                let id = TypeId(lib_name.into_owned());
                if loaded.types.get(&id).is_none() {
                    loaded.types.insert(ComponentType {
                        id: id.clone(),
                        points: lib.points_for(1),
                    });
                }
                id
            }
            None => TypeId(lib_name.into_owned()),
        };

        loaded.place(ComponentInstance {
            ref_des: RefDes(unescape(reference).into_owned()),
            type_id,
            placement: Placement {
                origin: Point::from_mm(x, y),
                rotation: Rotation::degrees(rot),
                mirror,
            },
            side: Layer::Sheet,
        })?;
    }
    Ok(loaded)
}

fn footprint_reference<'a>(fp: &SExpr<'a>) -> Option<&'a str> {
    property(fp, "Reference").or_else(|| {
        fp.children("fp_text").find_map(|t| {
            let mut atoms = t.atoms();
            (atoms.next() == Some("reference")).then(|| atoms.next()).flatten()
        })
    })
}

fn load_board(root: &SExpr) -> Result<Loaded, Error> {
    let mut loaded = Loaded::default();
    let footprints = root.children("footprint").chain(root.children("module"));
    for fp in footprints {
        let lib_id = fp.atoms().next().unwrap_or_default();
        let Some(reference) = footprint_reference(fp) else {
            debug!(lib_id, "skipping footprint without a reference");
            continue;
        };
        let (x, y, rot) = at(fp)?;
        let side = match fp.value("layer") {
            Ok("B.Cu") => Layer::Back,
            _ => Layer::Front,
        };

        let mut points = Vec::new();
        for pad in fp.children("pad") {
            let mut atoms = pad.atoms();
            let number = atoms.next().unwrap_or_default();
            let kind = atoms.next().unwrap_or_default();
            if number.is_empty() || kind == "np_thru_hole" {
                continue;
            }
            let (px, py, _) = at(pad)?;
            points.push(ConnectionPoint {
                number: unescape(number).into_owned(),
                name: None,
                offset: Offset::new(px, py),
                exit: None,
                through_hole: kind == "thru_hole",
            });
        }

        let reference = unescape(reference);
        let type_id = TypeId(format!("{}/{reference}", unescape(lib_id)));
        loaded.types.insert(ComponentType {
            id: type_id.clone(),
            points,
        });
        loaded.place(ComponentInstance {
            ref_des: RefDes(reference.into_owned()),
            type_id,
            placement: Placement {
                origin: Point::from_mm(x, y),
                rotation: Rotation::degrees(rot),
                mirror: Mirror::default(),
            },
            side,
        })?;
    }
    Ok(loaded)
}

/// Reads every placed component and the connection points of its type.
pub fn load(document: &Document) -> Result<Loaded, Error> {
    let tree = document.tree();
    let loaded = match document.representation() {
        Representation::Schematic => load_schematic(&tree)?,
        Representation::Board => load_board(&tree)?,
    };
    info!(
        types = loaded.types.types.len(),
        components = loaded.instances.len(),
        "loaded document"
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve_all;
    use crate::model::Design;

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

    fn design(loaded: Loaded, representation: Representation) -> Design {
        Design {
            representation,
            types: loaded.types,
            instances: loaded.instances,
            nets: IndexMap::new(),
        }
    }

    #[test]
    fn schematic_symbols_and_pins() {
        let text = test_data!("switch.kicad_sch");
        let doc = Document::parse(&text, Representation::Schematic).unwrap();
        let loaded = load(&doc).unwrap();
        assert!(loaded.instances.contains_key(&RefDes("R1".into())));
        assert!(loaded.instances.contains_key(&RefDes("#PWR01".into())));
        let sw = &loaded.instances[&RefDes("SW1".into())];
        assert!(sw.placement.mirror.y);

        let d = design(loaded, Representation::Schematic);
        let pins = resolve_all(&d).unwrap();
        let r1 = RefDes("R1".into());
        assert_eq!(pins.get(&r1, "1").unwrap().position, Point::from_mm(101.6, 76.2));
        assert_eq!(pins.get(&r1, "2").unwrap().position, Point::from_mm(101.6, 83.82));
        // Pin 1 of the resistor points up, out of the body.
        assert_eq!(
            crate::geometry::snap_right_angle(pins.get(&r1, "1").unwrap().exit.unwrap()),
            90
        );
    }

    #[test]
    fn board_footprints_and_pads() {
        let text = test_data!("switch.kicad_pcb");
        let doc = Document::parse(&text, Representation::Board).unwrap();
        let loaded = load(&doc).unwrap();
        let d = design(loaded, Representation::Board);
        let pins = resolve_all(&d).unwrap();

        let r1 = RefDes("R1".into());
        assert_eq!(pins.get(&r1, "1").unwrap().position, Point::from_mm(119.2, 80.0));
        let j1 = pins.get(&RefDes("J1".into()), "2").unwrap();
        assert!(j1.through_hole);
        assert_eq!(j1.position, Point::from_mm(110.0, 77.46));
        let back = pins.get(&RefDes("C1".into()), "1").unwrap();
        assert_eq!(back.layer, Layer::Back);
    }

    #[test]
    fn units_split_multi_unit_symbols() {
        let text = r#"(kicad_sch
  (lib_symbols
    (symbol "Amp:Dual"
      (symbol "Dual_0_1" (pin power_in line (at 0 5 270) (length 1) (name "V+") (number "8")))
      (symbol "Dual_1_1" (pin output line (at 5 0 180) (length 1) (name "~") (number "1")))
      (symbol "Dual_2_1" (pin output line (at 5 0 180) (length 1) (name "~") (number "7")))
      (symbol "Dual_2_2" (pin output line (at 9 9 180) (length 1) (name "~") (number "7")))
    )
  )
  (symbol (lib_id "Amp:Dual") (at 50 50 0) (unit 2)
    (property "Reference" "U1" (at 0 0 0))
  )
)"#;
        let doc = Document::parse(text, Representation::Schematic).unwrap();
        let loaded = load(&doc).unwrap();
        let ty = loaded.types.get(&TypeId("Amp:Dual#2".into())).unwrap();
        let numbers: Vec<&str> = ty.points.iter().map(|p| p.number.as_str()).collect();
        assert_eq!(numbers, vec!["8", "7"]);
        assert_eq!(ty.points[1].name, None);
    }

    #[test]
    fn quoted_names_are_unescaped() {
        let text = r#"(kicad_sch
  (lib_symbols
    (symbol "Lib:\"Q\"" (pin input line (at 0 0 0) (length 1) (name "A\\B") (number "1")))
  )
  (symbol (lib_id "Lib:\"Q\"") (at 0 0 0)
    (property "Reference" "Q\"1" (at 0 0 0))
  )
)"#;
        let doc = Document::parse(text, Representation::Schematic).unwrap();
        let loaded = load(&doc).unwrap();
        let q1 = &loaded.instances[&RefDes("Q\"1".into())];
        assert_eq!(q1.type_id, TypeId("Lib:\"Q\"".into()));
        let ty = loaded.types.get(&q1.type_id).unwrap();
        assert_eq!(ty.points[0].name.as_deref(), Some("A\\B"));
    }

    #[test]
    fn duplicate_references_are_rejected() {
        let text = r#"(kicad_pcb
  (footprint "R" (at 0 0) (property "Reference" "R1"))
  (footprint "R" (at 5 0) (fp_text reference "R1" (at 0 0)))
)"#;
        let doc = Document::parse(text, Representation::Board).unwrap();
        assert!(matches!(
            load(&doc),
            Err(Error::Configuration(ConfigurationError::DuplicateComponent(_)))
        ));
    }
}
