//! Components, connection points and nets for one synthesis run.

use std::collections::HashMap;
use std::fmt::Display;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::geometry::{FramePolicy, Offset, Placement};

/// Reference designator, unique per design (`R1`, `U3`, `#PWR01`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefDes(pub String);

/// Library identifier of a symbol or footprint (`Device:R`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub String);

impl Display for RefDes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    Schematic,
    Board,
}

impl Representation {
    pub fn frame(&self) -> FramePolicy {
        match self {
            Representation::Schematic => FramePolicy::schematic(),
            Representation::Board => FramePolicy::board(),
        }
    }

    /// Root element label of the persisted document.
    pub fn document_root(&self) -> &'static str {
        match self {
            Representation::Schematic => "kicad_sch",
            Representation::Board => "kicad_pcb",
        }
    }
}

/// A drawing plane. Schematics have exactly one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Sheet,
    Front,
    Back,
}

impl Layer {
    pub fn opposite(&self) -> Layer {
        match self {
            Layer::Sheet => Layer::Sheet,
            Layer::Front => Layer::Back,
            Layer::Back => Layer::Front,
        }
    }

    pub fn kicad_name(&self) -> &'static str {
        match self {
            Layer::Sheet => "Sheet",
            Layer::Front => "F.Cu",
            Layer::Back => "B.Cu",
        }
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kicad_name())
    }
}

/// A pin or pad on a component type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPoint {
    pub number: String,
    pub name: Option<String>,
    pub offset: Offset,
    /// Direction pointing away from the component body, in local degrees.
    pub exit: Option<f64>,
    /// Board pads only: reachable from both copper layers.
    pub through_hole: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentType {
    pub id: TypeId,
    pub points: Vec<ConnectionPoint>,
}

impl ComponentType {
    /// Looks a point up by number first, then by name.
    pub fn point(&self, pin: &str) -> Option<&ConnectionPoint> {
        self.points
            .iter()
            .find(|p| p.number == pin)
            .or_else(|| self.points.iter().find(|p| p.name.as_deref() == Some(pin)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeRegistry {
    pub types: IndexMap<TypeId, ComponentType>,
}

impl TypeRegistry {
    pub fn insert(&mut self, ty: ComponentType) {
        self.types.insert(ty.id.clone(), ty);
    }

    pub fn get(&self, id: &TypeId) -> Option<&ComponentType> {
        self.types.get(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInstance {
    pub ref_des: RefDes,
    pub type_id: TypeId,
    pub placement: Placement,
    /// Copper side of surface-mount pads; ignored on schematics.
    pub side: Layer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Label,
    NoConnect,
}

/// How a net's members are joined on a schematic.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connection {
    /// Drawn wires or traces.
    #[default]
    Wires,
    /// A label on every member and no wiring; KiCad joins equal labels.
    Labels,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetMember {
    pub ref_des: RefDes,
    pub pin: String,
}

impl Display for NetMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ref_des, self.pin)
    }
}

/// A named set of connection points, members stored in chain order.
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub name: String,
    pub members: Vec<NetMember>,
    /// Marker for a single-member net.
    pub marker: MarkerKind,
    pub connect: Connection,
}

impl Net {
    pub fn is_single(&self) -> bool {
        self.members.len() == 1
    }
}

/// Everything synthesis reads: immutable once checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    pub representation: Representation,
    pub types: TypeRegistry,
    pub instances: IndexMap<RefDes, ComponentInstance>,
    pub nets: IndexMap<String, Net>,
}

impl Design {
    pub fn instance_type(&self, ref_des: &RefDes) -> Option<(&ComponentInstance, &ComponentType)> {
        let instance = self.instances.get(ref_des)?;
        let ty = self.types.get(&instance.type_id)?;
        Some((instance, ty))
    }

    /// Enforces the net-membership invariants.
    pub fn check(&self) -> Result<(), ConfigurationError> {
        for instance in self.instances.values() {
            if self.types.get(&instance.type_id).is_none() {
                return Err(ConfigurationError::UnknownType {
                    ref_des: instance.ref_des.0.clone(),
                    type_id: instance.type_id.0.clone(),
                });
            }
            if self.representation == Representation::Board
                && instance.placement.rotation.quarter_turns().is_none()
            {
                return Err(ConfigurationError::NonManhattanRotation {
                    ref_des: instance.ref_des.0.clone(),
                    degrees: instance.placement.rotation.as_degrees(),
                });
            }
        }

        let mut owner: HashMap<(&RefDes, &str), &str> = HashMap::new();
        for net in self.nets.values() {
            if net.members.is_empty() {
                return Err(ConfigurationError::EmptyNet(net.name.clone()));
            }
            for member in &net.members {
                let Some((_, ty)) = self.instance_type(&member.ref_des) else {
                    return Err(ConfigurationError::UnknownComponent {
                        net: net.name.clone(),
                        ref_des: member.ref_des.0.clone(),
                    });
                };
                let Some(point) = ty.point(&member.pin) else {
                    return Err(ConfigurationError::PinNotFound {
                        ref_des: member.ref_des.0.clone(),
                        pin: member.pin.clone(),
                    });
                };
                if let Some(first) = owner.insert((&member.ref_des, point.number.as_str()), net.name.as_str()) {
                    if first != net.name {
                        return Err(ConfigurationError::PinInMultipleNets {
                            ref_des: member.ref_des.0.clone(),
                            pin: point.number.clone(),
                            first: first.to_owned(),
                            second: net.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
