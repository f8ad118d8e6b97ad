//! Absolute coordinates for every connection point of every placed component.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::ConfigurationError;
use crate::geometry::{FramePolicy, Point};
use crate::model::{
    ComponentInstance, ComponentType, ConnectionPoint, Design, Layer, NetMember, RefDes,
    Representation,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PinKey {
    Number(String),
    Name(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct ResolvedPoint {
    pub position: Point,
    pub layer: Layer,
    pub through_hole: bool,
    /// On-screen exit angle in degrees, if the type declares one.
    pub exit: Option<f64>,
}

impl ResolvedPoint {
    pub fn reachable_on(&self, layer: Layer) -> bool {
        self.through_hole || self.layer == layer
    }
}

/// Resolved points keyed by component and by pin number or pin name.
#[derive(Debug, Clone, Default)]
pub struct PinMap {
    points: BTreeMap<(RefDes, PinKey), ResolvedPoint>,
}

impl PinMap {
    pub fn get(&self, ref_des: &RefDes, pin: &str) -> Option<&ResolvedPoint> {
        let key = |k| (ref_des.clone(), k);
        self.points
            .get(&key(PinKey::Number(pin.to_owned())))
            .or_else(|| self.points.get(&key(PinKey::Name(pin.to_owned()))))
    }

    pub fn member(&self, member: &NetMember) -> Result<&ResolvedPoint, ConfigurationError> {
        self.get(&member.ref_des, &member.pin)
            .ok_or_else(|| ConfigurationError::PinNotFound {
                ref_des: member.ref_des.0.clone(),
                pin: member.pin.clone(),
            })
    }

    /// Number of lookup keys, counting names and numbers separately.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Every resolved point once, under its number.
    pub fn numbered(&self) -> impl Iterator<Item = (&RefDes, &str, &ResolvedPoint)> {
        self.points.iter().filter_map(|((ref_des, key), point)| match key {
            PinKey::Number(n) => Some((ref_des, n.as_str(), point)),
            PinKey::Name(_) => None,
        })
    }
}

fn resolve_point(
    frame: &FramePolicy,
    representation: Representation,
    instance: &ComponentInstance,
    point: &ConnectionPoint,
) -> ResolvedPoint {
    let layer = match representation {
        Representation::Schematic => Layer::Sheet,
        Representation::Board => instance.side,
    };
    ResolvedPoint {
        position: frame.resolve(point.offset, &instance.placement),
        layer,
        through_hole: representation == Representation::Board && point.through_hole,
        exit: point
            .exit
            .map(|angle| frame.direction(angle, &instance.placement)),
    }
}

/// Resolves a single pin, failing with [`ConfigurationError::PinNotFound`].
pub fn resolve(
    representation: Representation,
    instance: &ComponentInstance,
    ty: &ComponentType,
    pin: &str,
) -> Result<ResolvedPoint, ConfigurationError> {
    let point = ty.point(pin).ok_or_else(|| ConfigurationError::PinNotFound {
        ref_des: instance.ref_des.0.clone(),
        pin: pin.to_owned(),
    })?;
    Ok(resolve_point(
        &representation.frame(),
        representation,
        instance,
        point,
    ))
}

/// Resolves every point of every instance, referenced by a net or not.
pub fn resolve_all(design: &Design) -> Result<PinMap, ConfigurationError> {
    let frame = design.representation.frame();
    let mut map = PinMap::default();
    for instance in design.instances.values() {
        let ty = design
            .types
            .get(&instance.type_id)
            .ok_or_else(|| ConfigurationError::UnknownType {
                ref_des: instance.ref_des.0.clone(),
                type_id: instance.type_id.0.clone(),
            })?;
        for point in &ty.points {
            let resolved = resolve_point(&frame, design.representation, instance, point);
            debug!(
                component = %instance.ref_des,
                pin = %point.number,
                at = %resolved.position,
                "resolved connection point"
            );
            map.points
                .entry((instance.ref_des.clone(), PinKey::Number(point.number.clone())))
                .or_insert(resolved);
            if let Some(name) = &point.name {
                map.points
                    .entry((instance.ref_des.clone(), PinKey::Name(name.clone())))
                    .or_insert(resolved);
            }
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Offset, Point};
    use crate::model::tests::{design, instance, two_pin};
    use crate::model::{ConnectionPoint, TypeId};

    fn ground_symbol() -> ComponentType {
        ComponentType {
            id: TypeId("power:GND".into()),
            points: vec![ConnectionPoint {
                number: "1".into(),
                name: Some("GND".into()),
                offset: Offset::new(0.0, 0.0),
                exit: Some(90.0),
                through_hole: false,
            }],
        }
    }

    #[test]
    fn resolves_every_point_by_number_and_name() {
        let d = design(
            Representation::Schematic,
            vec![two_pin("Device:R", (0.0, 3.81), (0.0, -3.81)), ground_symbol()],
            vec![
                instance("R1", "Device:R", 139.7, 83.82, 0.0),
                instance("#PWR01", "power:GND", 50.8, 60.96, 0.0),
            ],
            vec![],
        );
        let map = resolve_all(&d).unwrap();
        let r1 = RefDes("R1".into());
        assert_eq!(map.get(&r1, "1").unwrap().position, Point::from_mm(139.7, 80.01));
        assert_eq!(map.get(&r1, "B").unwrap().position, Point::from_mm(139.7, 87.63));
        let gnd = map.get(&RefDes("#PWR01".into()), "1").unwrap();
        assert_eq!(gnd.position, Point::from_mm(50.8, 60.96));
        approx::assert_abs_diff_eq!(gnd.exit.unwrap(), 90.0, epsilon = 1e-9);
        assert_eq!(gnd.layer, Layer::Sheet);
        // Two numbers, two names, one number, one name.
        assert_eq!(map.len(), 6);
        assert_eq!(map.numbered().count(), 3);
    }

    #[test]
    fn numbers_win_over_names() {
        let mut ty = two_pin("X", (0.0, 0.0), (5.0, 0.0));
        ty.points[1].name = Some("1".into());
        let d = design(
            Representation::Board,
            vec![ty],
            vec![instance("U1", "X", 0.0, 0.0, 0.0)],
            vec![],
        );
        let map = resolve_all(&d).unwrap();
        assert_eq!(
            map.get(&RefDes("U1".into()), "1").unwrap().position,
            Point::from_mm(0.0, 0.0)
        );
    }

    #[test]
    fn missing_pin_names_component_and_point() {
        let ty = two_pin("Device:R", (0.0, 3.81), (0.0, -3.81));
        let inst = instance("R7", "Device:R", 0.0, 0.0, 0.0);
        let err = resolve(Representation::Schematic, &inst, &ty, "3").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::PinNotFound {
                ref_des: "R7".into(),
                pin: "3".into()
            }
        );
    }

    #[test]
    fn board_pads_carry_their_copper() {
        let mut ty = two_pin("Conn", (0.0, 0.0), (2.54, 0.0));
        ty.points[1].through_hole = true;
        let d = design(
            Representation::Board,
            vec![ty],
            vec![instance("J1", "Conn", 10.0, 10.0, 90.0)],
            vec![],
        );
        let map = resolve_all(&d).unwrap();
        let j1 = RefDes("J1".into());
        let smd = map.get(&j1, "1").unwrap();
        let tht = map.get(&j1, "2").unwrap();
        assert!(smd.reachable_on(Layer::Front) && !smd.reachable_on(Layer::Back));
        assert!(tht.reachable_on(Layer::Back));
        assert_eq!(tht.position, Point::from_mm(10.0, 7.46));
    }
}
