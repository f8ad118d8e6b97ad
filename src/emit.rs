//! Renders an artifact set as KiCad s-expression elements.

use indexmap::IndexMap;

use crate::artifact::{ArtifactSet, Junction, Label, NoConnect, PathSegment, Via};
use crate::geometry::Point;
use crate::model::{Layer, Representation};
use crate::sexpr::SExprBuf;

/// Board net name to net code.
pub type NetCodes = IndexMap<String, u32>;

fn xy(label: &str, p: Point) -> SExprBuf {
    SExprBuf::list(label).with_number(p.x).with_number(p.y)
}

fn uuid(id: &uuid::Uuid) -> SExprBuf {
    SExprBuf::list("uuid").with_quoted(id.to_string())
}

fn wire(s: &PathSegment) -> SExprBuf {
    SExprBuf::list("wire")
        .with(
            SExprBuf::list("pts")
                .with(xy("xy", s.start))
                .with(xy("xy", s.end)),
        )
        .with(
            SExprBuf::list("stroke")
                .with(SExprBuf::list("width").with_number(s.width))
                .with(SExprBuf::list("type").with_atom("default")),
        )
        .with(uuid(&s.id))
}

fn junction(j: &Junction) -> SExprBuf {
    SExprBuf::list("junction")
        .with(xy("at", j.at))
        .with(SExprBuf::list("diameter").with_atom("0"))
        .with(
            SExprBuf::list("color")
                .with_atom("0")
                .with_atom("0")
                .with_atom("0")
                .with_atom("0"),
        )
        .with(uuid(&j.id))
}

fn label(l: &Label) -> SExprBuf {
    let justify = if l.angle >= 180 { "right" } else { "left" };
    SExprBuf::list("label")
        .with_quoted(&l.net)
        .with(xy("at", l.at).with_atom(l.angle.to_string()))
        .with(SExprBuf::list("fields_autoplaced").with_atom("yes"))
        .with(
            SExprBuf::list("effects")
                .with(
                    SExprBuf::list("font")
                        .with(SExprBuf::list("size").with_atom("1.27").with_atom("1.27")),
                )
                .with(SExprBuf::list("justify").with_atom(justify).with_atom("bottom")),
        )
        .with(uuid(&l.id))
}

fn no_connect(n: &NoConnect) -> SExprBuf {
    SExprBuf::list("no_connect")
        .with(xy("at", n.at))
        .with(uuid(&n.id))
}

fn net_ref(codes: &NetCodes, net: &str) -> SExprBuf {
    let code = codes.get(net).copied().unwrap_or(0);
    SExprBuf::list("net").with_atom(code.to_string())
}

fn segment(s: &PathSegment, codes: &NetCodes) -> SExprBuf {
    SExprBuf::list("segment")
        .with(xy("start", s.start))
        .with(xy("end", s.end))
        .with(SExprBuf::list("width").with_number(s.width))
        .with(SExprBuf::list("layer").with_quoted(s.layer.kicad_name()))
        .with(net_ref(codes, &s.net))
        .with(uuid(&s.id))
}

fn via(v: &Via, codes: &NetCodes) -> SExprBuf {
    SExprBuf::list("via")
        .with(xy("at", v.at))
        .with(SExprBuf::list("size").with_number(v.size))
        .with(SExprBuf::list("drill").with_number(v.drill))
        .with(
            SExprBuf::list("layers")
                .with_quoted(Layer::Front.kicad_name())
                .with_quoted(Layer::Back.kicad_name()),
        )
        .with(net_ref(codes, &v.net))
        .with(uuid(&v.id))
}

/// Elements in emission order: paths, vias, junctions, labels, flags.
///
/// Unknown board nets are emitted with code 0; callers declare nets first.
pub fn emit(artifacts: &ArtifactSet, codes: &NetCodes) -> Vec<SExprBuf> {
    match artifacts.representation {
        Representation::Schematic => artifacts
            .segments
            .iter()
            .map(wire)
            .chain(artifacts.junctions.iter().map(junction))
            .chain(artifacts.labels.iter().map(label))
            .chain(artifacts.no_connects.iter().map(no_connect))
            .collect(),
        Representation::Board => artifacts
            .segments
            .iter()
            .map(|s| segment(s, codes))
            .chain(artifacts.vias.iter().map(|v| via(v, codes)))
            .collect(),
    }
}
