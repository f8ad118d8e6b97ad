//! Path synthesis: turns resolved net members into wires, traces, vias,
//! junctions and markers.
//!
//! Nets are routed one at a time in declaration order. Each net sees the
//! connection points of every component plus the committed geometry of the nets
//! routed before it, so the output depends only on the inputs.

mod occupancy;
mod policy;
mod route;

use tracing::{error, info};

use crate::artifact::ArtifactSet;
use crate::error::{ConfigurationError, GeometryConflict};
use crate::model::Design;
use crate::resolve::{PinMap, ResolvedPoint};

pub use occupancy::{Occupancy, Shape};
pub use policy::{
    Bend, Channel, Corridor, CorridorPlan, Detour, Keepout, NetPolicy, Rules, Stitch,
    SynthesisPlan, ViaSize,
};
pub use route::synthesize;

/// Output of a whole run. Nets listed in `conflicts` contributed nothing.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub artifacts: ArtifactSet,
    pub conflicts: Vec<GeometryConflict>,
}

impl Synthesis {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

pub fn synthesize_all(
    design: &Design,
    pins: &PinMap,
    plan: &SynthesisPlan,
) -> Result<Synthesis, ConfigurationError> {
    let representation = design.representation;
    let mut occupied = Occupancy::new(representation, plan.rules.clearance, plan.keepouts.clone());

    let mut nets = Vec::with_capacity(design.nets.len());
    for net in design.nets.values() {
        let points = net
            .members
            .iter()
            .map(|m| pins.member(m).copied())
            .collect::<Result<Vec<ResolvedPoint>, _>>()?;
        nets.push((net, points));
    }
    occupied.commit_pins(design, pins);

    let mut artifacts = ArtifactSet::new(representation);
    let mut conflicts = Vec::new();
    for (net, points) in nets {
        let policy = plan.policy(&net.name);
        match synthesize(net, &points, &policy, &occupied, plan) {
            Ok(set) => {
                for s in &set.segments {
                    occupied.commit_segment(&net.name, s.layer, s.start, s.end, s.width);
                }
                for v in &set.vias {
                    occupied.commit_via(&net.name, v.at, v.size);
                }
                artifacts.extend(set);
            }
            Err(conflict) => {
                error!(net = %net.name, other = %conflict.other_net, "{conflict}");
                conflicts.push(conflict);
            }
        }
    }

    info!(
        nets = design.nets.len(),
        segments = artifacts.segments.len(),
        vias = artifacts.vias.len(),
        junctions = artifacts.junctions.len(),
        labels = artifacts.labels.len(),
        no_connects = artifacts.no_connects.len(),
        conflicts = conflicts.len(),
        "synthesis finished"
    );
    Ok(Synthesis {
        artifacts,
        conflicts,
    })
}
