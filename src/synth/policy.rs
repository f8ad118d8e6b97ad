use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::artifact::WidthClass;
use crate::geometry::{Point, Rect};
use crate::model::{Layer, Representation};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bend {
    #[default]
    HorizontalFirst,
    VerticalFirst,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ViaSize {
    pub size: i64,
    pub drill: i64,
}

/// Design rules, all lengths in hundredths of a millimetre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    pub clearance: i64,
    pub signal_width: i64,
    pub power_width: i64,
    pub signal_via: ViaSize,
    pub power_via: ViaSize,
    /// Distance from a bridged endpoint to its via.
    pub bridge_offset: i64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            clearance: 20,
            signal_width: 25,
            power_width: 50,
            signal_via: ViaSize { size: 60, drill: 30 },
            power_via: ViaSize { size: 80, drill: 40 },
            bridge_offset: 150,
        }
    }
}

impl Rules {
    /// Schematic wires use the sheet's default stroke.
    pub fn width(&self, representation: Representation, class: WidthClass) -> i64 {
        match (representation, class) {
            (Representation::Schematic, _) => 0,
            (Representation::Board, WidthClass::Signal) => self.signal_width,
            (Representation::Board, WidthClass::Power) => self.power_width,
        }
    }

    pub fn via(&self, class: WidthClass) -> ViaSize {
        match class {
            WidthClass::Signal => self.signal_via,
            WidthClass::Power => self.power_via,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NetPolicy {
    pub layer: Layer,
    pub class: WidthClass,
    pub bend: Bend,
}

impl NetPolicy {
    pub fn default_for(representation: Representation) -> Self {
        let layer = match representation {
            Representation::Schematic => Layer::Sheet,
            Representation::Board => Layer::Front,
        };
        Self {
            layer,
            class: WidthClass::Signal,
            bend: Bend::HorizontalFirst,
        }
    }
}

/// A fixed coordinate line a route may be deflected onto.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Horizontal { y: i64 },
    Vertical { x: i64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Detour {
    /// Run along the channel, on `layer` if given, bracketed by vias when
    /// that differs from the net's layer.
    Channel { channel: Channel, layer: Option<Layer> },
    /// Short stubs on the net's layer, the main run on the opposite one.
    /// `offset` places the first via, `end_offset` the second; both fall
    /// back to the rule default, `end_offset` to `offset` first.
    Bridge {
        offset: Option<i64>,
        end_offset: Option<i64>,
        bend: Bend,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Corridor {
    pub net: String,
    /// Chain hop this corridor applies to; every hop when `None`.
    pub hop: Option<usize>,
    pub detour: Detour,
    /// Use the corridor even when the direct route is clear.
    pub preferred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorridorPlan {
    pub corridors: Vec<Corridor>,
}

impl CorridorPlan {
    pub fn for_hop<'a>(&'a self, net: &'a str, hop: usize) -> impl Iterator<Item = &'a Corridor> + 'a {
        self.corridors
            .iter()
            .filter(move |c| c.net == net && c.hop.map_or(true, |h| h == hop))
    }
}

/// An area no other net may enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keepout {
    pub name: String,
    pub area: Rect,
    /// `None` blocks every layer.
    pub layer: Option<Layer>,
    pub allow_nets: Vec<String>,
}

impl Keepout {
    pub fn blocks(&self, net: &str, layer: Layer) -> bool {
        self.layer.map_or(true, |l| l == layer) && !self.allow_nets.iter().any(|n| n == net)
    }
}

/// An extra via requested for a net.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stitch {
    pub net: String,
    pub at: Point,
}

/// Everything the synthesizer needs beyond the resolved points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisPlan {
    pub rules: Rules,
    pub default_policy: NetPolicy,
    pub policies: IndexMap<String, NetPolicy>,
    pub corridors: CorridorPlan,
    pub keepouts: Vec<Keepout>,
    pub stitches: Vec<Stitch>,
}

impl SynthesisPlan {
    pub fn new(representation: Representation) -> Self {
        Self {
            rules: Rules::default(),
            default_policy: NetPolicy::default_for(representation),
            policies: IndexMap::new(),
            corridors: CorridorPlan::default(),
            keepouts: Vec::new(),
            stitches: Vec::new(),
        }
    }

    pub fn policy(&self, net: &str) -> NetPolicy {
        self.policies
            .get(net)
            .copied()
            .unwrap_or(self.default_policy)
    }

    pub fn stitches_of<'a>(&'a self, net: &'a str) -> impl Iterator<Item = &'a Stitch> + 'a {
        self.stitches.iter().filter(move |s| s.net == net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corridors_filter_by_net_and_hop() {
        let corridor = |net: &str, hop| Corridor {
            net: net.into(),
            hop,
            detour: Detour::Bridge {
                offset: None,
                end_offset: None,
                bend: Bend::HorizontalFirst,
            },
            preferred: false,
        };
        let plan = CorridorPlan {
            corridors: vec![corridor("A", None), corridor("A", Some(1)), corridor("B", Some(0))],
        };
        assert_eq!(plan.for_hop("A", 0).count(), 1);
        assert_eq!(plan.for_hop("A", 1).count(), 2);
        assert_eq!(plan.for_hop("B", 0).count(), 1);
        assert_eq!(plan.for_hop("C", 0).count(), 0);
    }

    #[test]
    fn power_nets_get_wider_copper() {
        let rules = Rules::default();
        assert_eq!(rules.width(Representation::Board, WidthClass::Power), 50);
        assert_eq!(rules.width(Representation::Schematic, WidthClass::Power), 0);
        assert!(rules.via(WidthClass::Power).size > rules.via(WidthClass::Signal).size);
    }

    #[test]
    fn keepouts_exempt_listed_nets() {
        let k = Keepout {
            name: "U1 body".into(),
            area: Rect::from_corners(Point::new(0, 0), Point::new(100, 100)),
            layer: Some(Layer::Front),
            allow_nets: vec!["GND".into()],
        };
        assert!(k.blocks("SDA", Layer::Front));
        assert!(!k.blocks("SDA", Layer::Back));
        assert!(!k.blocks("GND", Layer::Front));
    }
}
