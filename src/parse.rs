use indexmap::IndexMap;

use crate::document::Document;
use crate::error::{ConfigurationError, Error};
use crate::geometry::{to_hundredths, Mirror, Offset, Placement, Point, Rect, Rotation};
use crate::load::{load, Loaded};
use crate::model::{
    ComponentInstance, ComponentType, Connection, ConnectionPoint, Design, Layer, MarkerKind, Net,
    NetMember, RefDes, Representation, TypeId, TypeRegistry,
};
use crate::raw;
use crate::synth::{
    Channel, Corridor, CorridorPlan, Detour, Keepout, NetPolicy, Rules, Stitch, SynthesisPlan,
    ViaSize,
};
use crate::validate::{PinExpectation, ValidationOptions};

/// A checked synthesis job. Types and placements may still come from the
/// input document.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub representation: Representation,
    pub types: Option<TypeRegistry>,
    pub placements: Option<IndexMap<RefDes, ComponentInstance>>,
    pub nets: IndexMap<String, Net>,
    pub plan: SynthesisPlan,
    pub expectations: Vec<PinExpectation>,
}

impl Job {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let raw: raw::Job = serde_json::from_str(text)?;
        Ok(raw.try_into()?)
    }

    /// Joins the job with whatever it leaves to `document`.
    pub fn design(&self, document: Option<&Document>) -> Result<Design, Error> {
        let loaded = match (&self.types, &self.placements) {
            (Some(_), Some(_)) => Loaded::default(),
            (types, _) => {
                let missing = if types.is_none() { "types" } else { "placements" };
                let document = document.ok_or(ConfigurationError::MissingSource(missing))?;
                load(document)?
            }
        };
        Ok(Design {
            representation: self.representation,
            types: self.types.clone().unwrap_or(loaded.types),
            instances: self.placements.clone().unwrap_or(loaded.instances),
            nets: self.nets.clone(),
        })
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            expectations: self.expectations.clone(),
            clearance: self.plan.rules.clearance,
        }
    }
}

fn point(x: f64, y: f64) -> Point {
    Point::from_mm(x, y)
}

fn check_layer(
    representation: Representation,
    layer: Layer,
    context: impl FnOnce() -> String,
) -> Result<Layer, ConfigurationError> {
    let exists = match representation {
        Representation::Schematic => layer == Layer::Sheet,
        Representation::Board => layer != Layer::Sheet,
    };
    if exists {
        Ok(layer)
    } else {
        Err(ConfigurationError::InvalidLayer {
            context: context(),
            layer,
            representation,
        })
    }
}

impl From<raw::Point> for ConnectionPoint {
    fn from(value: raw::Point) -> Self {
        let raw::Point {
            number,
            name,
            x,
            y,
            exit,
            through_hole,
        } = value;
        ConnectionPoint {
            number,
            name,
            offset: Offset::new(x, y),
            exit,
            through_hole,
        }
    }
}

impl From<raw::Type> for ComponentType {
    fn from(value: raw::Type) -> Self {
        let raw::Type { id, points } = value;
        ComponentType {
            id: TypeId(id),
            points: points.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<raw::Member> for NetMember {
    type Error = ConfigurationError;

    fn try_from(value: raw::Member) -> Result<Self, Self::Error> {
        let (ref_des, pin) = match value {
            raw::Member::Full { ref_des, pin } => (ref_des, pin),
            raw::Member::Short(s) => match s.split_once(':') {
                Some((r, p)) if !r.is_empty() && !p.is_empty() => (r.to_owned(), p.to_owned()),
                _ => return Err(ConfigurationError::InvalidMember(s)),
            },
        };
        Ok(NetMember {
            ref_des: RefDes(ref_des),
            pin,
        })
    }
}

impl TryFrom<raw::Net> for Net {
    type Error = ConfigurationError;

    fn try_from(value: raw::Net) -> Result<Self, Self::Error> {
        let raw::Net {
            name,
            members,
            visit,
            marker,
            connect,
        } = value;
        let mut members: Vec<NetMember> = members
            .into_iter()
            .map(|m| m.try_into())
            .collect::<Result<_, _>>()?;

        if let Some(visit) = visit {
            let mut seen = vec![false; members.len()];
            let is_permutation = visit.len() == members.len()
                && visit
                    .iter()
                    .all(|&i| i < seen.len() && !std::mem::replace(&mut seen[i], true));
            if !is_permutation {
                return Err(ConfigurationError::InvalidVisitOrder {
                    net: name,
                    members: members.len(),
                });
            }
            let mut ordered = Vec::with_capacity(members.len());
            for i in visit {
                ordered.push(members[i].clone());
            }
            members = ordered;
        }

        Ok(Net {
            name,
            members,
            marker: marker.unwrap_or(MarkerKind::Label),
            connect,
        })
    }
}

impl From<raw::ViaSize> for ViaSize {
    fn from(value: raw::ViaSize) -> Self {
        ViaSize {
            size: to_hundredths(value.size),
            drill: to_hundredths(value.drill),
        }
    }
}

impl From<raw::Rules> for Rules {
    fn from(value: raw::Rules) -> Self {
        let defaults = Rules::default();
        let length = |v: Option<f64>, default| v.map_or(default, to_hundredths);
        Rules {
            clearance: length(value.clearance, defaults.clearance),
            signal_width: length(value.signal_width, defaults.signal_width),
            power_width: length(value.power_width, defaults.power_width),
            signal_via: value.signal_via.map_or(defaults.signal_via, Into::into),
            power_via: value.power_via.map_or(defaults.power_via, Into::into),
            bridge_offset: length(value.bridge_offset, defaults.bridge_offset),
        }
    }
}

impl From<raw::Expectation> for PinExpectation {
    fn from(value: raw::Expectation) -> Self {
        let raw::Expectation { ref_des, pin, x, y } = value;
        PinExpectation {
            member: NetMember {
                ref_des: RefDes(ref_des),
                pin,
            },
            at: point(x, y),
        }
    }
}

fn instance(
    value: raw::Placement,
    representation: Representation,
) -> Result<ComponentInstance, ConfigurationError> {
    let raw::Placement {
        ref_des,
        type_id,
        x,
        y,
        rotation,
        mirror_x,
        mirror_y,
        side,
    } = value;
    let side = match (representation, side) {
        (Representation::Schematic, None) => Layer::Sheet,
        (Representation::Board, None) => Layer::Front,
        (_, Some(layer)) => check_layer(representation, layer, || format!("placement {ref_des}"))?,
    };
    Ok(ComponentInstance {
        ref_des: RefDes(ref_des),
        type_id: TypeId(type_id),
        placement: Placement {
            origin: point(x, y),
            rotation: Rotation::degrees(rotation),
            mirror: Mirror {
                x: mirror_x,
                y: mirror_y,
            },
        },
        side,
    })
}

fn policy(
    value: &raw::Policy,
    base: NetPolicy,
    representation: Representation,
    context: impl FnOnce() -> String,
) -> Result<NetPolicy, ConfigurationError> {
    let layer = match value.layer {
        Some(layer) => check_layer(representation, layer, context)?,
        None => base.layer,
    };
    Ok(NetPolicy {
        layer,
        class: value.class.unwrap_or(base.class),
        bend: value.bend.unwrap_or(base.bend),
    })
}

fn corridor(
    value: raw::Corridor,
    representation: Representation,
    nets: &IndexMap<String, Net>,
) -> Result<Corridor, ConfigurationError> {
    let raw::Corridor {
        net,
        hop,
        preferred,
        detour,
    } = value;
    let Some(members) = nets.get(&net).map(|n| n.members.len()) else {
        return Err(ConfigurationError::UnknownNet {
            context: "corridor",
            net,
        });
    };
    if let Some(hop) = hop {
        let hops = members.saturating_sub(1);
        if hop >= hops {
            return Err(ConfigurationError::InvalidHop { net, hop, hops });
        }
    }

    let invalid = |net: &str, reason| ConfigurationError::InvalidCorridor {
        net: net.to_owned(),
        reason,
    };
    let detour = match detour {
        raw::Detour::Channel { x, y, layer } => {
            let channel = match (x, y) {
                (Some(x), None) => Channel::Vertical { x: to_hundredths(x) },
                (None, Some(y)) => Channel::Horizontal { y: to_hundredths(y) },
                _ => return Err(invalid(&net, "a channel needs exactly one of x and y")),
            };
            let layer = match layer {
                Some(l) => Some(check_layer(representation, l, || format!("corridor for net {net}"))?),
                None => None,
            };
            Detour::Channel { channel, layer }
        }
        raw::Detour::Bridge {
            offset,
            end_offset,
            bend,
        } => {
            if representation == Representation::Schematic {
                return Err(invalid(&net, "via bridges need two copper layers"));
            }
            let offset = offset.map(to_hundredths);
            let end_offset = end_offset.map(to_hundredths);
            if offset.into_iter().chain(end_offset).any(|o| o <= 0) {
                return Err(invalid(&net, "bridge offset must be positive"));
            }
            Detour::Bridge {
                offset,
                end_offset,
                bend,
            }
        }
    };
    Ok(Corridor {
        net,
        hop,
        detour,
        preferred,
    })
}

fn keepout(
    value: raw::Keepout,
    representation: Representation,
    nets: &IndexMap<String, Net>,
) -> Result<Keepout, ConfigurationError> {
    let raw::Keepout {
        name,
        from,
        to,
        layer,
        allow_nets,
    } = value;
    if let Some(net) = allow_nets.iter().find(|n| !nets.contains_key(*n)) {
        return Err(ConfigurationError::UnknownNet {
            context: "keepout",
            net: net.clone(),
        });
    }
    let layer = match layer {
        Some(l) => Some(check_layer(representation, l, || format!("keepout {name}"))?),
        None => None,
    };
    Ok(Keepout {
        name,
        area: Rect::from_corners(point(from[0], from[1]), point(to[0], to[1])),
        layer,
        allow_nets,
    })
}

impl TryFrom<raw::Job> for Job {
    type Error = ConfigurationError;

    fn try_from(value: raw::Job) -> Result<Self, Self::Error> {
        let raw::Job {
            representation,
            types,
            placements,
            nets: raw_nets,
            default_policy,
            policies,
            corridors,
            keepouts,
            rules,
            expectations,
            stitches,
        } = value;

        let types = types.map(|types| {
            let mut registry = TypeRegistry::default();
            for ty in types {
                registry.insert(ty.into());
            }
            registry
        });

        let placements = match placements {
            Some(placements) => {
                let mut instances = IndexMap::new();
                for p in placements {
                    let inst = instance(p, representation)?;
                    if instances.contains_key(&inst.ref_des) {
                        return Err(ConfigurationError::DuplicateComponent(inst.ref_des.0));
                    }
                    instances.insert(inst.ref_des.clone(), inst);
                }
                Some(instances)
            }
            None => None,
        };

        let mut nets = IndexMap::new();
        for net in raw_nets {
            let net: Net = net.try_into()?;
            if representation == Representation::Board && net.connect == Connection::Labels {
                return Err(ConfigurationError::LabelsOnBoard(net.name));
            }
            if nets.contains_key(&net.name) {
                return Err(ConfigurationError::DuplicateNet(net.name));
            }
            nets.insert(net.name.clone(), net);
        }

        let mut plan = SynthesisPlan::new(representation);
        plan.rules = rules.into();
        plan.default_policy = policy(
            &default_policy,
            plan.default_policy,
            representation,
            || "default policy".to_owned(),
        )?;
        for (net, p) in &policies {
            if !nets.contains_key(net) {
                return Err(ConfigurationError::UnknownNet {
                    context: "policy",
                    net: net.clone(),
                });
            }
            let p = policy(p, plan.default_policy, representation, || format!("policy for net {net}"))?;
            plan.policies.insert(net.clone(), p);
        }
        plan.corridors = CorridorPlan {
            corridors: corridors
                .into_iter()
                .map(|c| corridor(c, representation, &nets))
                .collect::<Result<_, _>>()?,
        };
        plan.keepouts = keepouts
            .into_iter()
            .map(|k| keepout(k, representation, &nets))
            .collect::<Result<_, _>>()?;
        for raw::Stitch { net, x, y } in stitches {
            if !nets.contains_key(&net) {
                return Err(ConfigurationError::UnknownNet {
                    context: "stitch",
                    net,
                });
            }
            plan.stitches.push(Stitch {
                net,
                at: point(x, y),
            });
        }

        let expectations = expectations.into_iter().map(Into::into).collect();

        Ok(Job {
            representation,
            types,
            placements,
            nets,
            plan,
            expectations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::WidthClass;
    use crate::synth::Bend;
    use rstest::*;

    const JOB: &str = r#"{
        "representation": "board",
        "types": [
            {"id": "R", "points": [
                {"number": "1", "x": -1, "y": 0},
                {"number": "2", "x": 1, "y": 0}
            ]},
            {"id": "J", "points": [
                {"number": "1", "x": 0, "y": 0, "through_hole": true},
                {"number": "2", "x": 2.54, "y": 0, "through_hole": true}
            ]}
        ],
        "placements": [
            {"ref": "R1", "type": "R", "x": 10, "y": 10},
            {"ref": "R2", "type": "R", "x": 10, "y": 20, "rotation": 90, "side": "back"},
            {"ref": "J1", "type": "J", "x": 0, "y": 0}
        ],
        "nets": [
            {"name": "SIG", "members": ["R1:2", {"ref": "R2", "pin": "1"}, "J1:1"], "visit": [2, 0, 1]},
            {"name": "GND", "members": ["J1:2", "R1:1"]},
            {"name": "NC", "members": ["R2:2"], "marker": "no_connect"}
        ],
        "policies": {"GND": {"class": "power", "layer": "back"}},
        "corridors": [
            {"net": "SIG", "hop": 1, "kind": "channel", "y": 15.5, "layer": "back"},
            {"net": "GND", "kind": "bridge", "offset": 2, "end_offset": 0.5, "bend": "vertical_first", "preferred": true}
        ],
        "keepouts": [{"name": "U1 body", "from": [5, 5], "to": [2, 8], "layer": "front", "allow_nets": ["GND"]}],
        "rules": {"clearance": 0.15, "signal_via": {"size": 0.5, "drill": 0.25}},
        "expectations": [{"ref": "R1", "pin": "1", "x": 9, "y": 10}],
        "stitches": [{"net": "GND", "x": 1, "y": 1}]
    }"#;

    #[test]
    fn parses_a_full_job() {
        let job = Job::from_json(JOB).unwrap();
        assert_eq!(job.representation, Representation::Board);
        assert_eq!(job.types.as_ref().unwrap().types.len(), 2);

        let r2 = &job.placements.as_ref().unwrap()[&RefDes("R2".into())];
        assert_eq!(r2.side, Layer::Back);
        assert_eq!(r2.placement.origin, Point::new(1000, 2000));

        let sig = &job.nets["SIG"];
        let order: Vec<String> = sig.members.iter().map(ToString::to_string).collect();
        assert_eq!(order, vec!["J1:1", "R1:2", "R2:1"]);
        assert_eq!(job.nets["NC"].marker, MarkerKind::NoConnect);
        assert_eq!(job.nets["GND"].marker, MarkerKind::Label);
        assert_eq!(job.nets["GND"].connect, Connection::Wires);

        let gnd = job.plan.policy("GND");
        assert_eq!(gnd.class, WidthClass::Power);
        assert_eq!(gnd.layer, Layer::Back);
        assert_eq!(job.plan.policy("SIG"), NetPolicy::default_for(Representation::Board));

        let corridors = &job.plan.corridors.corridors;
        assert_eq!(
            corridors[0].detour,
            Detour::Channel {
                channel: Channel::Horizontal { y: 1550 },
                layer: Some(Layer::Back),
            }
        );
        assert_eq!(
            corridors[1].detour,
            Detour::Bridge {
                offset: Some(200),
                end_offset: Some(50),
                bend: Bend::VerticalFirst,
            }
        );
        assert!(corridors[1].preferred);
        assert_eq!(corridors[1].hop, None);

        let keepout = &job.plan.keepouts[0];
        assert_eq!(keepout.area.min, Point::new(200, 500));
        assert_eq!(keepout.area.max, Point::new(500, 800));

        assert_eq!(job.plan.rules.clearance, 15);
        assert_eq!(job.plan.rules.signal_via, ViaSize { size: 50, drill: 25 });
        assert_eq!(job.plan.rules.power_width, 50);
        assert_eq!(job.validation_options().clearance, 15);
        assert_eq!(job.expectations[0].at, Point::new(900, 1000));
        assert_eq!(job.plan.stitches_of("GND").count(), 1);

        let design = job.design(None).unwrap();
        design.check().unwrap();
    }

    fn job_with(nets: &str, extra: &str) -> String {
        format!(
            r#"{{"representation": "schematic", "types": [], "placements": [], "nets": {nets}{extra}}}"#
        )
    }

    #[rstest]
    #[case::bad_member(job_with(r#"[{"name": "A", "members": ["R1"]}]"#, ""))]
    #[case::repeated_visit(job_with(r#"[{"name": "A", "members": ["R1:1", "R2:1"], "visit": [0, 0]}]"#, ""))]
    #[case::short_visit(job_with(r#"[{"name": "A", "members": ["R1:1", "R2:1"], "visit": [1]}]"#, ""))]
    #[case::duplicate_net(job_with(r#"[{"name": "A", "members": ["R1:1"]}, {"name": "A", "members": ["R2:1"]}]"#, ""))]
    #[case::policy_for_unknown_net(job_with("[]", r#", "policies": {"X": {}}"#))]
    #[case::hop_out_of_range(job_with(
        r#"[{"name": "A", "members": ["R1:1", "R2:1"]}]"#,
        r#", "corridors": [{"net": "A", "hop": 1, "kind": "channel", "y": 5}]"#
    ))]
    #[case::channel_without_axis(job_with(
        r#"[{"name": "A", "members": ["R1:1", "R2:1"]}]"#,
        r#", "corridors": [{"net": "A", "kind": "channel"}]"#
    ))]
    #[case::bridge_on_schematic(job_with(
        r#"[{"name": "A", "members": ["R1:1", "R2:1"]}]"#,
        r#", "corridors": [{"net": "A", "kind": "bridge"}]"#
    ))]
    #[case::copper_on_schematic(job_with("[]", r#", "default_policy": {"layer": "front"}"#))]
    #[case::stitch_for_unknown_net(job_with("[]", r#", "stitches": [{"net": "X", "x": 0, "y": 0}]"#))]
    fn rejects_inconsistent_jobs(#[case] json: String) {
        assert!(matches!(Job::from_json(&json), Err(Error::Configuration(_))));
    }

    #[test]
    fn label_connections_are_schematic_only() {
        let nets = r#"[{"name": "ESP_TX", "members": ["U1:35", "U3:25"], "connect": "labels"}]"#;
        let job = Job::from_json(&job_with(nets, "")).unwrap();
        assert_eq!(job.nets["ESP_TX"].connect, Connection::Labels);

        let board = job_with(nets, "").replace("schematic", "board");
        assert!(matches!(
            Job::from_json(&board),
            Err(Error::Configuration(ConfigurationError::LabelsOnBoard(_)))
        ));
    }

    #[test]
    fn malformed_json_is_a_job_error() {
        assert!(matches!(
            Job::from_json(r#"{"representation": "breadboard", "nets": []}"#),
            Err(Error::Job(_))
        ));
    }

    #[test]
    fn missing_placements_need_a_document() {
        let job = Job::from_json(r#"{"representation": "schematic", "types": [], "nets": []}"#).unwrap();
        assert!(matches!(
            job.design(None),
            Err(Error::Configuration(ConfigurationError::MissingSource("placements")))
        ));

        let text = "(kicad_sch (symbol (lib_id \"X\") (at 1 2 0) (property \"Reference\" \"U1\")))";
        let doc = Document::parse(text, Representation::Schematic).unwrap();
        let design = job.design(Some(&doc)).unwrap();
        assert_eq!(design.instances.len(), 1);
        assert!(design.types.types.is_empty());
    }
}
