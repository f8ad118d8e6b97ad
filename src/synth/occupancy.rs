use std::collections::HashMap;
use std::fmt::Display;

use crate::error::GeometryConflict;
use crate::geometry::{
    collinear_overlap, point_on_segment, point_segment_distance, segment_distance, segments_touch,
    to_mm, Point, Rect,
};
use crate::model::{Design, Layer, RefDes, Representation};
use crate::resolve::PinMap;

use super::policy::Keepout;

/// A piece of geometry, as reported in conflicts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    Segment(Point, Point),
    Via(Point),
    Pin(Point),
    Keepout(Rect),
}

impl Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Segment(a, b) => write!(f, "segment {a}-{b}"),
            Shape::Via(p) => write!(f, "via at {p}"),
            Shape::Pin(p) => write!(f, "pin at {p}"),
            Shape::Keepout(r) => write!(f, "keep-out {r}"),
        }
    }
}

fn segment_enters_rect(a: Point, b: Point, r: &Rect) -> bool {
    if r.contains(a) || r.contains(b) {
        return true;
    }
    let corners = [
        r.min,
        Point::new(r.max.x, r.min.y),
        r.max,
        Point::new(r.min.x, r.max.y),
    ];
    (0..4).any(|i| segments_touch(a, b, corners[i], corners[(i + 1) % 4]))
}

/// Who committed an item.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Owner {
    Net(String),
    /// A connection point no net mentions, named `REF:PIN`. Blocks every net.
    Unconnected(String),
}

impl Owner {
    fn is(&self, net: &str) -> bool {
        matches!(self, Owner::Net(n) if n == net)
    }

    fn name(&self) -> &str {
        match self {
            Owner::Net(n) | Owner::Unconnected(n) => n,
        }
    }
}

/// Geometry an item occupies: a segment with a width, or a round feature.
#[derive(Debug, Clone)]
struct Item {
    owner: Owner,
    /// `None` for features present on every layer.
    layer: Option<Layer>,
    shape: Shape,
    /// Trace width or via diameter; zero for pins.
    size: i64,
}

impl Item {
    fn on(&self, layer: Layer) -> bool {
        self.layer.map_or(true, |l| l == layer)
    }
}

/// Geometry already committed by earlier nets, frozen while a net routes.
#[derive(Debug, Clone)]
pub struct Occupancy {
    representation: Representation,
    clearance: i64,
    items: Vec<Item>,
    keepouts: Vec<Keepout>,
}

impl Occupancy {
    pub fn new(representation: Representation, clearance: i64, keepouts: Vec<Keepout>) -> Self {
        Self {
            representation,
            clearance,
            items: Vec::new(),
            keepouts,
        }
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn commit_segment(&mut self, net: &str, layer: Layer, a: Point, b: Point, width: i64) {
        self.items.push(Item {
            owner: Owner::Net(net.to_owned()),
            layer: Some(layer),
            shape: Shape::Segment(a, b),
            size: width,
        });
    }

    pub fn commit_via(&mut self, net: &str, at: Point, size: i64) {
        self.items.push(Item {
            owner: Owner::Net(net.to_owned()),
            layer: None,
            shape: Shape::Via(at),
            size,
        });
    }

    /// A connection point; `layer` is `None` for through-hole pads.
    pub fn commit_pin(&mut self, net: &str, layer: Option<Layer>, at: Point) {
        self.items.push(Item {
            owner: Owner::Net(net.to_owned()),
            layer,
            shape: Shape::Pin(at),
            size: 0,
        });
    }

    /// A connection point outside every net, `member` as `REF:PIN`.
    pub fn commit_unconnected_pin(&mut self, member: &str, layer: Option<Layer>, at: Point) {
        self.items.push(Item {
            owner: Owner::Unconnected(member.to_owned()),
            layer,
            shape: Shape::Pin(at),
            size: 0,
        });
    }

    /// Commits every resolved point: members under their net, the rest as
    /// obstacles to all nets.
    pub fn commit_pins(&mut self, design: &Design, pins: &PinMap) {
        let mut owners: HashMap<(&RefDes, &str), &str> = HashMap::new();
        for net in design.nets.values() {
            for member in &net.members {
                let point = design
                    .instance_type(&member.ref_des)
                    .and_then(|(_, ty)| ty.point(&member.pin));
                if let Some(point) = point {
                    owners.insert((&member.ref_des, point.number.as_str()), net.name.as_str());
                }
            }
        }
        for (ref_des, number, point) in pins.numbered() {
            let layer = (!point.through_hole).then_some(point.layer);
            match owners.get(&(ref_des, number)) {
                Some(net) => self.commit_pin(net, layer, point.position),
                None => self.commit_unconnected_pin(
                    &format!("{ref_des}:{number}"),
                    layer,
                    point.position,
                ),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn required(&self, a: i64, b: i64) -> f64 {
        to_mm(self.clearance) + to_mm(a + b) / 2.0
    }

    fn clashes(&self, ours: Shape, our_size: i64, theirs: &Item) -> bool {
        match self.representation {
            Representation::Schematic => match (ours, theirs.shape) {
                (Shape::Segment(a, b), Shape::Segment(c, d)) => {
                    collinear_overlap(a, b, c, d) > 0
                        || point_on_segment(a, c, d)
                        || point_on_segment(b, c, d)
                        || point_on_segment(c, a, b)
                        || point_on_segment(d, a, b)
                }
                (Shape::Segment(a, b), Shape::Pin(p) | Shape::Via(p)) => point_on_segment(p, a, b),
                (Shape::Via(p) | Shape::Pin(p), Shape::Segment(a, b)) => point_on_segment(p, a, b),
                (Shape::Via(p) | Shape::Pin(p), Shape::Via(q) | Shape::Pin(q)) => p == q,
                _ => false,
            },
            Representation::Board => {
                let need = self.required(our_size, theirs.size);
                let distance = match (ours, theirs.shape) {
                    (Shape::Segment(a, b), Shape::Segment(c, d)) => segment_distance(a, b, c, d),
                    (Shape::Segment(a, b), Shape::Pin(p) | Shape::Via(p))
                    | (Shape::Via(p) | Shape::Pin(p), Shape::Segment(a, b)) => {
                        point_segment_distance(p, a, b)
                    }
                    (Shape::Via(p) | Shape::Pin(p), Shape::Via(q) | Shape::Pin(q)) => {
                        point_segment_distance(p, q, q)
                    }
                    _ => return false,
                };
                distance + 1e-9 < need
            }
        }
    }

    fn keepout_clash(shape: Shape, keepout: &Keepout) -> bool {
        match shape {
            Shape::Segment(a, b) => segment_enters_rect(a, b, &keepout.area),
            Shape::Via(p) | Shape::Pin(p) => keepout.area.contains(p),
            Shape::Keepout(_) => false,
        }
    }

    /// First committed item of another net that `shape` would violate.
    ///
    /// Vias are checked on every layer; segments only on their own.
    pub fn conflict(
        &self,
        net: &str,
        layer: Option<Layer>,
        shape: Shape,
        size: i64,
    ) -> Option<GeometryConflict> {
        let layers: Vec<Layer> = match (layer, self.representation) {
            (Some(l), _) => vec![l],
            (None, Representation::Board) => vec![Layer::Front, Layer::Back],
            (None, Representation::Schematic) => vec![Layer::Sheet],
        };
        for &l in &layers {
            let hit = self
                .items
                .iter()
                .filter(|item| !item.owner.is(net) && item.on(l))
                .find(|item| self.clashes(shape, size, item));
            if let Some(item) = hit {
                return Some(GeometryConflict {
                    net: net.to_owned(),
                    other_net: item.owner.name().to_owned(),
                    layer: l,
                    ours: shape,
                    theirs: item.shape,
                });
            }
            let blocked = self
                .keepouts
                .iter()
                .filter(|k| k.blocks(net, l))
                .find(|k| Self::keepout_clash(shape, k));
            if let Some(keepout) = blocked {
                return Some(GeometryConflict {
                    net: net.to_owned(),
                    other_net: keepout.name.clone(),
                    layer: l,
                    ours: shape,
                    theirs: Shape::Keepout(keepout.area),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn p(x: f64, y: f64) -> Point {
        Point::from_mm(x, y)
    }

    fn sheet_with_wire() -> Occupancy {
        let mut occ = Occupancy::new(Representation::Schematic, 0, vec![]);
        occ.commit_segment("A", Layer::Sheet, p(0., 0.), p(20., 0.), 0);
        occ
    }

    #[rstest]
    #[case::collinear(p(5., 0.), p(25., 0.), true)]
    #[case::endpoint_on_wire(p(5., 0.), p(5., 10.), true)]
    #[case::wire_ends_on_ours(p(20., -5.), p(20., 5.), true)]
    #[case::perpendicular_crossing(p(5., -5.), p(5., 5.), false)]
    #[case::parallel(p(0., 2.54), p(20., 2.54), false)]
    #[case::touching_at_extension(p(25., 0.), p(30., 0.), false)]
    fn schematic_conflicts(#[case] a: Point, #[case] b: Point, #[case] expected: bool) {
        let occ = sheet_with_wire();
        let hit = occ.conflict("B", Some(Layer::Sheet), Shape::Segment(a, b), 0);
        assert_eq!(hit.is_some(), expected);
    }

    #[test]
    fn same_net_never_conflicts() {
        let occ = sheet_with_wire();
        assert!(occ
            .conflict("A", Some(Layer::Sheet), Shape::Segment(p(5., 0.), p(25., 0.)), 0)
            .is_none());
    }

    #[rstest]
    #[case(0.4, false)]
    #[case(0.3, true)]
    fn board_clearance_includes_half_widths(#[case] gap: f64, #[case] expected: bool) {
        // 0.2 clearance + (0.25 + 0.25) / 2 = 0.45 between centre lines.
        let mut occ = Occupancy::new(Representation::Board, 20, vec![]);
        occ.commit_segment("A", Layer::Front, p(0., 0.), p(20., 0.), 25);
        let ours = Shape::Segment(p(0., gap + 0.1), p(20., gap + 0.1));
        let hit = occ.conflict("B", Some(Layer::Front), ours, 25);
        assert_eq!(hit.is_some(), expected);
        assert!(occ.conflict("B", Some(Layer::Back), ours, 25).is_none());
    }

    #[test]
    fn vias_block_both_layers() {
        let mut occ = Occupancy::new(Representation::Board, 20, vec![]);
        occ.commit_via("A", p(10., 0.), 60);
        let ours = Shape::Segment(p(0., 0.), p(20., 0.));
        let hit = occ.conflict("B", Some(Layer::Back), ours, 25).unwrap();
        assert_eq!(hit.other_net, "A");
        assert_eq!(hit.theirs, Shape::Via(p(10., 0.)));
    }

    #[test]
    fn pins_outside_every_net_block_all_nets() {
        let mut occ = sheet_with_wire();
        occ.commit_unconnected_pin("U3:1", Some(Layer::Sheet), p(10., 5.));
        let ours = Shape::Segment(p(10., 2.), p(10., 8.));
        let hit = occ.conflict("A", Some(Layer::Sheet), ours, 0).unwrap();
        assert_eq!(hit.other_net, "U3:1");
        assert_eq!(hit.theirs, Shape::Pin(p(10., 5.)));
        assert!(occ
            .conflict("B", Some(Layer::Sheet), Shape::Segment(p(12., 2.), p(12., 8.)), 0)
            .is_none());
    }

    #[test]
    fn keepouts_name_themselves() {
        let keepout = Keepout {
            name: "U1 body".into(),
            area: Rect::from_corners(p(5., -1.), p(8., 1.)),
            layer: None,
            allow_nets: vec![],
        };
        let occ = Occupancy::new(Representation::Board, 20, vec![keepout]);
        let hit = occ
            .conflict("B", Some(Layer::Front), Shape::Segment(p(0., 0.), p(20., 0.)), 25)
            .unwrap();
        assert_eq!(hit.other_net, "U1 body");
    }
}
