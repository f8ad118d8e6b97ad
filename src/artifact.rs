//! Explicit geometric records produced by synthesis, independent of any
//! document format.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Point;
use crate::model::{Layer, Representation};

/// Content-addressed identifier for the `index`th element of `kind` in `net`.
pub fn element_id(kind: &str, net: &str, index: usize) -> Uuid {
    let name = format!("kicad-wiring:{kind}/{net}/{index}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}

#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WidthClass {
    #[default]
    Signal,
    Power,
}

/// A straight wire or trace. Width is in hundredths of a millimetre.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PathSegment {
    pub id: Uuid,
    pub net: String,
    pub start: Point,
    pub end: Point,
    pub layer: Layer,
    pub class: WidthClass,
    pub width: i64,
}

impl PathSegment {
    pub fn is_zero_length(&self) -> bool {
        self.start == self.end
    }

    /// Same endpoints in either direction, on the same layer.
    pub fn coincides(&self, other: &PathSegment) -> bool {
        self.layer == other.layer
            && ((self.start == other.start && self.end == other.end)
                || (self.start == other.end && self.end == other.start))
    }

    pub fn length(&self) -> f64 {
        let dx = (self.end.x - self.start.x) as f64;
        let dy = (self.end.y - self.start.y) as f64;
        dx.hypot(dy) / crate::geometry::SCALE
    }
}

/// A through via joining both copper layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Via {
    pub id: Uuid,
    pub net: String,
    pub at: Point,
    pub size: i64,
    pub drill: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Junction {
    pub id: Uuid,
    pub net: String,
    pub at: Point,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Label {
    pub id: Uuid,
    pub net: String,
    pub at: Point,
    /// One of 0, 90, 180 or 270.
    pub angle: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NoConnect {
    pub id: Uuid,
    pub net: String,
    pub at: Point,
}

/// Everything generated for one run, in net declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactSet {
    pub representation: Representation,
    pub segments: Vec<PathSegment>,
    pub vias: Vec<Via>,
    pub junctions: Vec<Junction>,
    pub labels: Vec<Label>,
    pub no_connects: Vec<NoConnect>,
}

impl ArtifactSet {
    pub fn new(representation: Representation) -> Self {
        Self {
            representation,
            segments: Vec::new(),
            vias: Vec::new(),
            junctions: Vec::new(),
            labels: Vec::new(),
            no_connects: Vec::new(),
        }
    }

    pub fn extend(&mut self, other: ArtifactSet) {
        self.segments.extend(other.segments);
        self.vias.extend(other.vias);
        self.junctions.extend(other.junctions);
        self.labels.extend(other.labels);
        self.no_connects.extend(other.no_connects);
    }

    pub fn segments_of<'a>(&'a self, net: &'a str) -> impl Iterator<Item = &'a PathSegment> + 'a {
        self.segments.iter().filter(move |s| s.net == net)
    }

    pub fn vias_of<'a>(&'a self, net: &'a str) -> impl Iterator<Item = &'a Via> + 'a {
        self.vias.iter().filter(move |v| v.net == net)
    }

    pub fn junctions_of<'a>(&'a self, net: &'a str) -> impl Iterator<Item = &'a Junction> + 'a {
        self.junctions.iter().filter(move |j| j.net == net)
    }

    pub fn has_marker(&self, net: &str) -> bool {
        self.labels.iter().any(|l| l.net == net) || self.no_connects.iter().any(|n| n.net == net)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
            && self.vias.is_empty()
            && self.junctions.is_empty()
            && self.labels.is_empty()
            && self.no_connects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_depend_only_on_kind_net_and_index() {
        assert_eq!(element_id("wire", "VCC", 0), element_id("wire", "VCC", 0));
        assert_ne!(element_id("wire", "VCC", 0), element_id("wire", "VCC", 1));
        assert_ne!(element_id("wire", "VCC", 0), element_id("junction", "VCC", 0));
        assert_eq!(element_id("wire", "VCC", 0).get_version_num(), 5);
    }

    #[test]
    fn reversed_segments_coincide() {
        let seg = |a: Point, b: Point| PathSegment {
            id: Uuid::nil(),
            net: "N".into(),
            start: a,
            end: b,
            layer: Layer::Front,
            class: WidthClass::Signal,
            width: 25,
        };
        let a = seg(Point::new(0, 0), Point::new(1000, 0));
        let b = seg(Point::new(1000, 0), Point::new(0, 0));
        assert!(a.coincides(&b));
        assert_eq!(a.length(), 10.0);
    }
}
