//! Routes one net as a chain of Manhattan hops.

use tracing::debug;

use crate::artifact::{element_id, ArtifactSet, Junction, Label, NoConnect, PathSegment, Via};
use crate::error::GeometryConflict;
use crate::geometry::{snap_right_angle, Point};
use crate::model::{Connection, Layer, MarkerKind, Net, Representation};
use crate::resolve::ResolvedPoint;

use super::occupancy::{Occupancy, Shape};
use super::policy::{Bend, Channel, Corridor, Detour, NetPolicy, SynthesisPlan, ViaSize};

/// A candidate path for one hop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Route {
    pub segments: Vec<(Point, Point, Layer)>,
    pub vias: Vec<Point>,
}

impl Route {
    fn push(&mut self, a: Point, b: Point, layer: Layer) {
        if a != b {
            self.segments.push((a, b, layer));
        }
    }

    fn l_route(&mut self, a: Point, b: Point, layer: Layer, bend: Bend) {
        if a.x == b.x || a.y == b.y {
            self.push(a, b, layer);
            return;
        }
        let corner = match bend {
            Bend::HorizontalFirst => Point::new(b.x, a.y),
            Bend::VerticalFirst => Point::new(a.x, b.y),
        };
        self.push(a, corner, layer);
        self.push(corner, b, layer);
    }

    pub(crate) fn direct(p: Point, q: Point, layer: Layer, bend: Bend) -> Self {
        let mut route = Route::default();
        route.l_route(p, q, layer, bend);
        route
    }

    /// `p`, onto the channel, along it, and off again to `q`.
    pub(crate) fn channel(p: Point, q: Point, layer: Layer, channel: Channel, run_layer: Layer) -> Self {
        let (enter, leave) = match channel {
            Channel::Horizontal { y } => (Point::new(p.x, y), Point::new(q.x, y)),
            Channel::Vertical { x } => (Point::new(x, p.y), Point::new(x, q.y)),
        };
        let mut route = Route::default();
        route.push(p, enter, layer);
        route.push(enter, leave, run_layer);
        route.push(leave, q, layer);
        if run_layer != layer {
            route.vias.push(enter);
            route.vias.push(leave);
        }
        route
    }

    /// Stub, via, main run on the opposite layer, via, stub.
    ///
    /// `None` when the two offsets do not fit strictly inside the hop's
    /// major span, since the vias would cross and the stubs fold back.
    pub(crate) fn bridge(
        p: Point,
        q: Point,
        layer: Layer,
        start: i64,
        end: i64,
        bend: Bend,
    ) -> Option<Self> {
        let (dx, dy) = (q.x - p.x, q.y - p.y);
        let span = dx.abs().max(dy.abs());
        if start + end >= span {
            return None;
        }
        let (v1, v2) = if dx.abs() > dy.abs() {
            let s = dx.signum();
            (Point::new(p.x + s * start, p.y), Point::new(q.x - s * end, q.y))
        } else {
            let s = dy.signum();
            (Point::new(p.x, p.y + s * start), Point::new(q.x, q.y - s * end))
        };
        let mut route = Route::default();
        route.push(p, v1, layer);
        route.vias.push(v1);
        route.l_route(v1, v2, layer.opposite(), bend);
        route.vias.push(v2);
        route.push(v2, q, layer);
        Some(route)
    }
}

/// Accumulates one net's output, dropping degenerate and repeated geometry.
struct NetOutput<'a> {
    net: &'a str,
    representation: Representation,
    policy: &'a NetPolicy,
    width: i64,
    via: ViaSize,
    set: ArtifactSet,
}

impl<'a> NetOutput<'a> {
    fn segment_kind(&self) -> &'static str {
        match self.representation {
            Representation::Schematic => "wire",
            Representation::Board => "segment",
        }
    }

    fn segment(&mut self, start: Point, end: Point, layer: Layer) {
        let candidate = PathSegment {
            id: element_id(self.segment_kind(), self.net, self.set.segments.len()),
            net: self.net.to_owned(),
            start,
            end,
            layer,
            class: self.policy.class,
            width: self.width,
        };
        if candidate.is_zero_length() || self.set.segments.iter().any(|s| s.coincides(&candidate)) {
            return;
        }
        self.set.segments.push(candidate);
    }

    fn via(&mut self, at: Point) {
        if self.set.vias.iter().any(|v| v.at == at) {
            return;
        }
        self.set.vias.push(Via {
            id: element_id("via", self.net, self.set.vias.len()),
            net: self.net.to_owned(),
            at,
            size: self.via.size,
            drill: self.via.drill,
        });
    }

    fn route(&mut self, route: Route) {
        for (a, b, layer) in route.segments {
            self.segment(a, b, layer);
        }
        for v in route.vias {
            self.via(v);
        }
    }

    fn junction(&mut self, at: Point) {
        let id = element_id("junction", self.net, self.set.junctions.len());
        self.set.junctions.push(Junction {
            id,
            net: self.net.to_owned(),
            at,
        });
    }
}

fn check_route(
    occupied: &Occupancy,
    net: &str,
    route: &Route,
    width: i64,
    via: ViaSize,
) -> Result<(), GeometryConflict> {
    for &(a, b, layer) in &route.segments {
        if let Some(conflict) = occupied.conflict(net, Some(layer), Shape::Segment(a, b), width) {
            return Err(conflict);
        }
    }
    for &v in &route.vias {
        if let Some(conflict) = occupied.conflict(net, None, Shape::Via(v), via.size) {
            return Err(conflict);
        }
    }
    Ok(())
}

fn detour(
    corridor: &Corridor,
    p: Point,
    q: Point,
    layer: Layer,
    plan: &SynthesisPlan,
) -> Option<Route> {
    match corridor.detour {
        Detour::Channel { channel, layer: run } => {
            Some(Route::channel(p, q, layer, channel, run.unwrap_or(layer)))
        }
        Detour::Bridge {
            offset,
            end_offset,
            bend,
        } => {
            let start = offset.unwrap_or(plan.rules.bridge_offset);
            let end = end_offset.unwrap_or(start);
            let route = Route::bridge(p, q, layer, start, end, bend);
            if route.is_none() {
                debug!(net = %corridor.net, from = %p, to = %q, "hop too short for via bridge");
            }
            route
        }
    }
}

fn label(net: &Net, index: usize, point: &ResolvedPoint) -> Label {
    Label {
        id: element_id("label", &net.name, index),
        net: net.name.clone(),
        at: point.position,
        angle: point.exit.map(snap_right_angle).unwrap_or(0),
    }
}

fn marker(net: &Net, point: &ResolvedPoint, set: &mut ArtifactSet) {
    match net.marker {
        MarkerKind::Label => set.labels.push(label(net, 0, point)),
        MarkerKind::NoConnect => set.no_connects.push(NoConnect {
            id: element_id("no_connect", &net.name, 0),
            net: net.name.clone(),
            at: point.position,
        }),
    }
}

/// Synthesizes the wiring for one net against frozen geometry.
///
/// `points` are the net's resolved members in chain order. Label-connected
/// schematic nets get a label per member instead of wiring. Each hop takes
/// the first clear candidate among its preferred corridors, the direct
/// L-route, and its remaining corridors. When none is clear the conflict of
/// the last candidate is returned and nothing of the net is kept.
pub fn synthesize(
    net: &Net,
    points: &[ResolvedPoint],
    policy: &NetPolicy,
    occupied: &Occupancy,
    plan: &SynthesisPlan,
) -> Result<ArtifactSet, GeometryConflict> {
    let representation = occupied.representation();
    let mut out = NetOutput {
        net: &net.name,
        representation,
        policy,
        width: plan.rules.width(representation, policy.class),
        via: plan.rules.via(policy.class),
        set: ArtifactSet::new(representation),
    };

    if let [single] = points {
        if representation == Representation::Schematic {
            marker(net, single, &mut out.set);
        }
        debug!(net = %net.name, at = %single.position, "single-point net");
        return Ok(out.set);
    }

    if net.connect == Connection::Labels && representation == Representation::Schematic {
        out.set.labels = points
            .iter()
            .enumerate()
            .map(|(i, point)| label(net, i, point))
            .collect();
        debug!(net = %net.name, labels = points.len(), "connected by labels");
        return Ok(out.set);
    }

    let layer = match representation {
        Representation::Schematic => Layer::Sheet,
        Representation::Board => policy.layer,
    };

    if representation == Representation::Board {
        for point in points.iter().filter(|p| !p.reachable_on(layer)) {
            let escape = Route {
                segments: vec![],
                vias: vec![point.position],
            };
            check_route(occupied, &net.name, &escape, out.width, out.via)?;
            debug!(net = %net.name, at = %point.position, "escape via");
            out.route(escape);
        }
    }

    for (hop, pair) in points.windows(2).enumerate() {
        let (p, q) = (pair[0].position, pair[1].position);
        if p == q {
            continue;
        }
        let corridors: Vec<&Corridor> = plan.corridors.for_hop(&net.name, hop).collect();
        let candidates = corridors
            .iter()
            .filter(|c| c.preferred)
            .filter_map(|c| detour(c, p, q, layer, plan))
            .chain(std::iter::once(Route::direct(p, q, layer, policy.bend)))
            .chain(
                corridors
                    .iter()
                    .filter(|c| !c.preferred)
                    .filter_map(|c| detour(c, p, q, layer, plan)),
            );

        let mut rejected = None;
        let mut chosen = None;
        for route in candidates {
            match check_route(occupied, &net.name, &route, out.width, out.via) {
                Ok(()) => {
                    chosen = Some(route);
                    break;
                }
                Err(conflict) => {
                    debug!(net = %net.name, hop, %conflict, "candidate rejected");
                    rejected = Some(conflict);
                }
            }
        }
        match (chosen, rejected) {
            (Some(route), _) => {
                debug!(
                    net = %net.name,
                    hop,
                    from = %p,
                    to = %q,
                    segments = route.segments.len(),
                    vias = route.vias.len(),
                    "routed hop"
                );
                out.route(route);
            }
            (None, Some(conflict)) => return Err(conflict),
            (None, None) => {}
        }
    }

    if representation == Representation::Schematic && points.len() > 2 {
        for point in &points[1..points.len() - 1] {
            out.junction(point.position);
        }
    }

    if representation == Representation::Board {
        for stitch in plan.stitches_of(&net.name) {
            let route = Route {
                segments: vec![],
                vias: vec![stitch.at],
            };
            check_route(occupied, &net.name, &route, out.width, out.via)?;
            out.route(route);
        }
    }

    Ok(out.set)
}
