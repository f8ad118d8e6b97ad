//! Job description as it appears on disk. Lengths are millimetres.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::artifact::WidthClass;
use crate::model::{Connection, Layer, MarkerKind, Representation};
use crate::synth::Bend;

/// The full job
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    pub representation: Representation,
    /// Loaded from the input document when absent.
    #[serde(default)]
    pub types: Option<Vec<Type>>,
    /// Loaded from the input document when absent.
    #[serde(default)]
    pub placements: Option<Vec<Placement>>,
    pub nets: Vec<Net>,
    #[serde(default)]
    pub default_policy: Policy,
    #[serde(default)]
    pub policies: IndexMap<String, Policy>,
    #[serde(default)]
    pub corridors: Vec<Corridor>,
    #[serde(default)]
    pub keepouts: Vec<Keepout>,
    #[serde(default)]
    pub rules: Rules,
    #[serde(default)]
    pub expectations: Vec<Expectation>,
    #[serde(default)]
    pub stitches: Vec<Stitch>,
}

/// A component type
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Type {
    pub id: String,
    pub points: Vec<Point>,
}

/// A connection point in the type's local frame
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Point {
    pub number: String,
    #[serde(default)]
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub exit: Option<f64>,
    #[serde(default)]
    pub through_hole: bool,
}

/// A placed component
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Placement {
    #[serde(rename = "ref")]
    pub ref_des: String,
    #[serde(rename = "type")]
    pub type_id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub mirror_x: bool,
    #[serde(default)]
    pub mirror_y: bool,
    #[serde(default)]
    pub side: Option<Layer>,
}

/// `"R1:2"` or `{"ref": "R1", "pin": "2"}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Member {
    Short(String),
    Full {
        #[serde(rename = "ref")]
        ref_des: String,
        pin: String,
    },
}

/// A net
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Net {
    pub name: String,
    pub members: Vec<Member>,
    /// Chain order as indices into `members`.
    #[serde(default)]
    pub visit: Option<Vec<usize>>,
    #[serde(default)]
    pub marker: Option<MarkerKind>,
    #[serde(default)]
    pub connect: Connection,
}

/// Routing policy; unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    #[serde(default)]
    pub layer: Option<Layer>,
    #[serde(default)]
    pub class: Option<WidthClass>,
    #[serde(default)]
    pub bend: Option<Bend>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detour {
    /// Exactly one of `x` and `y`.
    Channel {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        layer: Option<Layer>,
    },
    Bridge {
        #[serde(default)]
        offset: Option<f64>,
        /// Offset of the second via, `offset` when omitted.
        #[serde(default)]
        end_offset: Option<f64>,
        #[serde(default)]
        bend: Bend,
    },
}

/// A pre-declared detour for a net
#[derive(Debug, Clone, Deserialize)]
pub struct Corridor {
    pub net: String,
    #[serde(default)]
    pub hop: Option<usize>,
    #[serde(default)]
    pub preferred: bool,
    #[serde(flatten)]
    pub detour: Detour,
}

/// A rectangle other nets stay out of
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Keepout {
    pub name: String,
    pub from: [f64; 2],
    pub to: [f64; 2],
    #[serde(default)]
    pub layer: Option<Layer>,
    #[serde(default)]
    pub allow_nets: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViaSize {
    pub size: f64,
    pub drill: f64,
}

/// Design rules; unset fields keep the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rules {
    #[serde(default)]
    pub clearance: Option<f64>,
    #[serde(default)]
    pub signal_width: Option<f64>,
    #[serde(default)]
    pub power_width: Option<f64>,
    #[serde(default)]
    pub signal_via: Option<ViaSize>,
    #[serde(default)]
    pub power_via: Option<ViaSize>,
    #[serde(default)]
    pub bridge_offset: Option<f64>,
}

/// Where a member's connection point must end up
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    #[serde(rename = "ref")]
    pub ref_des: String,
    pub pin: String,
    pub x: f64,
    pub y: f64,
}

/// An extra via
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stitch {
    pub net: String,
    pub x: f64,
    pub y: f64,
}
