//! Post-synthesis consistency checks.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;
use tracing::{span, Level};

use crate::artifact::ArtifactSet;
use crate::diagnostics::{Diagnostic, IssueSet, Severity};
use crate::geometry::{point_on_segment, Point};
use crate::model::{Connection, Design, Layer, Net, NetMember, Representation};
use crate::resolve::{PinMap, ResolvedPoint};
use crate::synth::{Occupancy, Shape};

/// Where a connection point is expected to land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinExpectation {
    pub member: NetMember,
    pub at: Point,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    pub expectations: Vec<PinExpectation>,
    /// Board copper clearance in hundredths of a millimetre.
    pub clearance: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Issue {
    cause: Cause,
    severity: Severity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cause {
    UnresolvedMember {
        net: String,
        member: String,
    },
    MemberNotReached {
        net: String,
        member: String,
        at: Point,
    },
    ZeroLengthSegment {
        net: String,
        at: Point,
    },
    DuplicateSegment {
        net: String,
        start: Point,
        end: Point,
    },
    JunctionCount {
        net: String,
        expected: usize,
        found: usize,
    },
    Disconnected {
        net: String,
        islands: usize,
    },
    Overlap {
        net: String,
        other_net: String,
        layer: Layer,
        ours: String,
        theirs: String,
    },
    PinPosition {
        member: String,
        expected: Point,
        found: Option<Point>,
    },
    SinglePointNet {
        net: String,
        marked: bool,
    },
    CoincidentMembers {
        net: String,
        at: Point,
    },
}

impl Diagnostic for Issue {
    fn severity(&self) -> Severity {
        self.severity
    }
}

impl Issue {
    pub fn new(cause: Cause, severity: Severity) -> Self {
        Self { cause, severity }
    }

    pub(crate) fn new_and_log(cause: Cause, severity: Severity) -> Self {
        let result = Self::new(cause, severity);
        match severity {
            Severity::Info => tracing::event!(Level::INFO, issue = ?result.cause, "{}", result),
            Severity::Warning => tracing::event!(Level::WARN, issue = ?result.cause, "{}", result),
            Severity::Error => tracing::event!(Level::ERROR, issue = ?result.cause, "{}", result),
        }
        result
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{tag}: {}", self.cause)
    }
}

impl Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedMember { net, member } => {
                write!(f, "net {net}: {member} has no resolved position")
            }
            Self::MemberNotReached { net, member, at } => {
                write!(f, "net {net}: {member} at {at} is not the end of any segment")
            }
            Self::ZeroLengthSegment { net, at } => {
                write!(f, "net {net}: zero-length segment at {at}")
            }
            Self::DuplicateSegment { net, start, end } => {
                write!(f, "net {net}: duplicate segment {start}-{end}")
            }
            Self::JunctionCount {
                net,
                expected,
                found,
            } => write!(f, "net {net}: expected {expected} junction(s), found {found}"),
            Self::Disconnected { net, islands } => {
                write!(f, "net {net}: members fall into {islands} unconnected groups")
            }
            Self::Overlap {
                net,
                other_net,
                layer,
                ours,
                theirs,
            } => write!(f, "net {net} overlaps {other_net} on {layer}: {ours} vs {theirs}"),
            Self::PinPosition {
                member,
                expected,
                found: Some(found),
            } => write!(f, "{member} resolved to {found}, expected {expected}"),
            Self::PinPosition {
                member,
                expected,
                found: None,
            } => write!(f, "{member} does not resolve, expected {expected}"),
            Self::SinglePointNet { net, marked: true } => {
                write!(f, "net {net} has a single point and is marked")
            }
            Self::SinglePointNet { net, marked: false } => {
                write!(f, "net {net} has a single point but no marker")
            }
            Self::CoincidentMembers { net, at } => {
                write!(f, "net {net}: several members coincide at {at}")
            }
        }
    }
}

/// Union-find over `(point, layer)` nodes.
#[derive(Debug, Default)]
struct Islands {
    index: BTreeMap<(Point, Layer), usize>,
    parent: Vec<usize>,
}

impl Islands {
    fn node(&mut self, point: Point, layer: Layer) -> usize {
        let next = self.parent.len();
        let id = *self.index.entry((point, layer)).or_insert(next);
        if id == next {
            self.parent.push(next);
        }
        id
    }

    fn find(&mut self, mut n: usize) -> usize {
        while self.parent[n] != n {
            self.parent[n] = self.parent[self.parent[n]];
            n = self.parent[n];
        }
        n
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

fn member_layers(representation: Representation, point: &ResolvedPoint) -> Vec<Layer> {
    match representation {
        Representation::Schematic => vec![Layer::Sheet],
        Representation::Board if point.through_hole => vec![Layer::Front, Layer::Back],
        Representation::Board => vec![point.layer],
    }
}

/// Number of separate groups the net's members fall into.
fn count_islands(
    representation: Representation,
    net: &str,
    points: &[ResolvedPoint],
    artifacts: &ArtifactSet,
) -> usize {
    let mut islands = Islands::default();
    let segments: Vec<_> = artifacts.segments_of(net).collect();
    for s in &segments {
        let (a, b) = (islands.node(s.start, s.layer), islands.node(s.end, s.layer));
        islands.union(a, b);
    }
    for v in artifacts.vias_of(net) {
        let (f, b) = (islands.node(v.at, Layer::Front), islands.node(v.at, Layer::Back));
        islands.union(f, b);
    }
    let mut members = Vec::new();
    for point in points {
        let layers = member_layers(representation, point);
        let nodes: Vec<usize> = layers
            .iter()
            .map(|&l| islands.node(point.position, l))
            .collect();
        for pair in nodes.windows(2) {
            islands.union(pair[0], pair[1]);
        }
        members.push(nodes[0]);
    }
    // Anything resting on a segment joins it.
    let nodes: Vec<((Point, Layer), usize)> = islands.index.iter().map(|(k, v)| (*k, *v)).collect();
    for ((p, layer), n) in nodes {
        for s in segments.iter().filter(|s| s.layer == layer) {
            if point_on_segment(p, s.start, s.end) {
                let a = islands.node(s.start, s.layer);
                islands.union(n, a);
            }
        }
    }
    let mut roots: Vec<usize> = members.into_iter().map(|m| islands.find(m)).collect();
    roots.sort_unstable();
    roots.dedup();
    roots.len()
}

fn validate_net(
    design: &Design,
    net: &Net,
    pins: &PinMap,
    artifacts: &ArtifactSet,
    issues: &mut IssueSet<Issue>,
) {
    let representation = design.representation;
    let mut points = Vec::with_capacity(net.members.len());
    for member in &net.members {
        match pins.get(&member.ref_des, &member.pin) {
            Some(p) => points.push((member, *p)),
            None => issues.add(Issue::new_and_log(
                Cause::UnresolvedMember {
                    net: net.name.clone(),
                    member: member.to_string(),
                },
                Severity::Error,
            )),
        }
    }

    if net.is_single() {
        if representation == Representation::Schematic {
            let marked = artifacts.has_marker(&net.name);
            let severity = if marked {
                Severity::Info
            } else {
                Severity::Warning
            };
            issues.add(Issue::new_and_log(
                Cause::SinglePointNet {
                    net: net.name.clone(),
                    marked,
                },
                severity,
            ));
        }
        return;
    }

    let segments: Vec<_> = artifacts.segments_of(&net.name).collect();
    for (i, s) in segments.iter().enumerate() {
        if s.is_zero_length() {
            issues.add(Issue::new_and_log(
                Cause::ZeroLengthSegment {
                    net: net.name.clone(),
                    at: s.start,
                },
                Severity::Warning,
            ));
        }
        if segments[..i].iter().any(|o| o.coincides(s)) {
            issues.add(Issue::new_and_log(
                Cause::DuplicateSegment {
                    net: net.name.clone(),
                    start: s.start,
                    end: s.end,
                },
                Severity::Warning,
            ));
        }
    }

    let mut seen: BTreeMap<Point, usize> = BTreeMap::new();
    for (_, p) in &points {
        *seen.entry(p.position).or_default() += 1;
    }
    for (at, _) in seen.iter().filter(|(_, n)| **n > 1) {
        issues.add(Issue::new_and_log(
            Cause::CoincidentMembers {
                net: net.name.clone(),
                at: *at,
            },
            Severity::Info,
        ));
    }

    if net.connect == Connection::Labels && representation == Representation::Schematic {
        for (member, p) in &points {
            let labelled = artifacts
                .labels
                .iter()
                .any(|l| l.net == net.name && l.at == p.position);
            if !labelled {
                issues.add(Issue::new_and_log(
                    Cause::MemberNotReached {
                        net: net.name.clone(),
                        member: member.to_string(),
                        at: p.position,
                    },
                    Severity::Error,
                ));
            }
        }
        return;
    }

    for (member, p) in &points {
        let on_segment = segments
            .iter()
            .any(|s| s.start == p.position || s.end == p.position);
        if !on_segment && seen[&p.position] < 2 {
            issues.add(Issue::new_and_log(
                Cause::MemberNotReached {
                    net: net.name.clone(),
                    member: member.to_string(),
                    at: p.position,
                },
                Severity::Error,
            ));
        }
    }

    if representation == Representation::Schematic {
        let expected = net.members.len().saturating_sub(2);
        let found = artifacts.junctions_of(&net.name).count();
        if expected != found {
            issues.add(Issue::new_and_log(
                Cause::JunctionCount {
                    net: net.name.clone(),
                    expected,
                    found,
                },
                Severity::Warning,
            ));
        }
    }

    let resolved: Vec<ResolvedPoint> = points.iter().map(|(_, p)| *p).collect();
    let islands = count_islands(representation, &net.name, &resolved, artifacts);
    if islands > 1 {
        issues.add(Issue::new_and_log(
            Cause::Disconnected {
                net: net.name.clone(),
                islands,
            },
            Severity::Error,
        ));
    }
}

fn validate_separation(
    design: &Design,
    pins: &PinMap,
    artifacts: &ArtifactSet,
    clearance: i64,
    issues: &mut IssueSet<Issue>,
) {
    let mut occupied = Occupancy::new(design.representation, clearance, vec![]);
    occupied.commit_pins(design, pins);
    let mut report = |c: crate::error::GeometryConflict| {
        issues.add(Issue::new_and_log(
            Cause::Overlap {
                net: c.net,
                other_net: c.other_net,
                layer: c.layer,
                ours: c.ours.to_string(),
                theirs: c.theirs.to_string(),
            },
            Severity::Error,
        ))
    };
    for s in &artifacts.segments {
        let shape = Shape::Segment(s.start, s.end);
        if let Some(c) = occupied.conflict(&s.net, Some(s.layer), shape, s.width) {
            report(c);
        }
        occupied.commit_segment(&s.net, s.layer, s.start, s.end, s.width);
    }
    for v in &artifacts.vias {
        if let Some(c) = occupied.conflict(&v.net, None, Shape::Via(v.at), v.size) {
            report(c);
        }
        occupied.commit_via(&v.net, v.at, v.size);
    }
}

/// Checks the generated artifacts against the netlist.
pub fn validate(
    design: &Design,
    pins: &PinMap,
    artifacts: &ArtifactSet,
    options: &ValidationOptions,
) -> IssueSet<Issue> {
    let _guard = span!(Level::INFO, "validating artifacts").entered();
    let mut issues = IssueSet::new();

    for net in design.nets.values() {
        validate_net(design, net, pins, artifacts, &mut issues);
    }

    validate_separation(design, pins, artifacts, options.clearance, &mut issues);

    for expectation in &options.expectations {
        let found = pins
            .get(&expectation.member.ref_des, &expectation.member.pin)
            .map(|p| p.position);
        if found != Some(expectation.at) {
            issues.add(Issue::new_and_log(
                Cause::PinPosition {
                    member: expectation.member.to_string(),
                    expected: expectation.at,
                    found,
                },
                Severity::Error,
            ));
        }
    }

    issues
}
