//! Fixed-point points and the rigid transforms that place component-local
//! connection points on a sheet or board.
//!
//! Absolute coordinates are integer hundredths of a millimetre, so two points
//! computed through different placements compare equal exactly when they
//! print the same.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Hundredths per millimetre.
pub const SCALE: f64 = 100.0;

/// Rounds millimetres to the fixed two-decimal grid.
pub fn to_hundredths(mm: f64) -> i64 {
    (mm * SCALE).round() as i64
}

pub fn to_mm(hundredths: i64) -> f64 {
    hundredths as f64 / SCALE
}

/// Shortest decimal rendering of a fixed-point value: `3810 -> "38.1"`.
pub fn format_hundredths(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let (int, frac) = (abs / 100, abs % 100);
    match frac {
        0 => format!("{sign}{int}"),
        f if f % 10 == 0 => format!("{sign}{int}.{}", f / 10),
        f => format!("{sign}{int}.{f:02}"),
    }
}

/// An absolute point in hundredths of a millimetre.
#[derive(
    Debug, Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn from_mm(x: f64, y: f64) -> Self {
        Self::new(to_hundredths(x), to_hundredths(y))
    }

    pub fn x_mm(&self) -> f64 {
        to_mm(self.x)
    }

    pub fn y_mm(&self) -> f64 {
        to_mm(self.y)
    }

    pub fn translate(&self, dx: i64, dy: i64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Point::from_mm(x, y)
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x_mm(), p.y_mm()]
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {})",
            format_hundredths(self.x),
            format_hundredths(self.y)
        )
    }
}

/// An axis-aligned rectangle, inclusive of its edges.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        (self.min.x..=self.max.x).contains(&p.x) && (self.min.y..=self.max.y).contains(&p.y)
    }
}

impl Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} .. {}]", self.min, self.max)
    }
}

/// Distance in millimetres from `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (px, py) = (p.x as f64, p.y as f64);
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (bx, by) = (b.x as f64, b.y as f64);
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt() / SCALE
}

fn orient(a: Point, b: Point, c: Point) -> i128 {
    let v = (b.x - a.x) as i128 * (c.y - a.y) as i128 - (b.y - a.y) as i128 * (c.x - a.x) as i128;
    v.signum()
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    orient(a, b, p) == 0
        && (a.x.min(b.x)..=a.x.max(b.x)).contains(&p.x)
        && (a.y.min(b.y)..=a.y.max(b.y)).contains(&p.y)
}

/// Exact test for two closed segments sharing at least one point.
pub fn segments_touch(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let (o1, o2) = (orient(a1, a2, b1), orient(a1, a2, b2));
    let (o3, o4) = (orient(b1, b2, a1), orient(b1, b2, a2));
    if o1 != o2 && o3 != o4 && o1 != 0 && o2 != 0 && o3 != 0 && o4 != 0 {
        return true;
    }
    on_segment(b1, a1, a2) || on_segment(b2, a1, a2) || on_segment(a1, b1, b2) || on_segment(a2, b1, b2)
}

/// Minimum distance in millimetres between two closed segments.
pub fn segment_distance(a1: Point, a2: Point, b1: Point, b2: Point) -> f64 {
    if segments_touch(a1, a2, b1, b2) {
        return 0.0;
    }
    [
        point_segment_distance(a1, b1, b2),
        point_segment_distance(a2, b1, b2),
        point_segment_distance(b1, a1, a2),
        point_segment_distance(b2, a1, a2),
    ]
    .into_iter()
    .fold(f64::INFINITY, f64::min)
}

/// True when the point lies on the closed segment.
pub fn point_on_segment(p: Point, a: Point, b: Point) -> bool {
    on_segment(p, a, b)
}

/// Length of the shared run of two collinear segments, zero otherwise.
pub fn collinear_overlap(a1: Point, a2: Point, b1: Point, b2: Point) -> i64 {
    if orient(a1, a2, b1) != 0 || orient(a1, a2, b2) != 0 {
        return 0;
    }
    let project = |p: Point| if a1.x != a2.x { p.x } else { p.y };
    let (a_lo, a_hi) = (project(a1).min(project(a2)), project(a1).max(project(a2)));
    let (b_lo, b_hi) = (project(b1).min(project(b2)), project(b1).max(project(b2)));
    (a_hi.min(b_hi) - a_lo.max(b_lo)).max(0)
}

/// A local offset in millimetres, in the type's own unrotated frame.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

impl Offset {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A rotation in degrees, normalised to `[0, 360)`.
#[derive(Debug, Copy, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Rotation(f64);

impl Rotation {
    pub fn degrees(deg: f64) -> Self {
        Self(deg.rem_euclid(360.0))
    }

    pub fn as_degrees(&self) -> f64 {
        self.0
    }

    /// The number of quarter turns, if this is a Manhattan rotation.
    pub fn quarter_turns(&self) -> Option<u8> {
        let turns = self.0 / 90.0;
        let rounded = turns.round();
        if (turns - rounded).abs() < 1e-9 {
            Some((rounded as i64).rem_euclid(4) as u8)
        } else {
            None
        }
    }
}

impl From<f64> for Rotation {
    fn from(deg: f64) -> Self {
        Rotation::degrees(deg)
    }
}

impl From<Rotation> for f64 {
    fn from(r: Rotation) -> Self {
        r.0
    }
}

/// Reflections applied after rotation, about axes through the placement origin.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mirror {
    /// Reflect about the horizontal axis (negates the vertical offset).
    #[serde(default)]
    pub x: bool,
    /// Reflect about the vertical axis (negates the horizontal offset).
    #[serde(default)]
    pub y: bool,
}

/// Rigid placement of a component instance in the global frame.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Placement {
    pub origin: Point,
    pub rotation: Rotation,
    pub mirror: Mirror,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chirality {
    /// `(x, y) -> (x cos + y sin, -x sin + y cos)`
    Clockwise,
    /// `(x, y) -> (x cos - y sin, x sin + y cos)`
    CounterClockwise,
}

/// How one representation maps local frames onto its global frame.
///
/// The schematic authors symbols with the vertical axis pointing up and
/// rotates them counter-clockwise in that frame before flipping onto the
/// downward sheet axis. The board keeps one downward axis throughout, and
/// positive angles turn clockwise in its coordinates, which appears
/// counter-clockwise on screen.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FramePolicy {
    pub chirality: Chirality,
    /// Negate the local vertical coordinate before translating.
    pub flip_local_y: bool,
}

impl FramePolicy {
    pub const fn schematic() -> Self {
        Self {
            chirality: Chirality::CounterClockwise,
            flip_local_y: true,
        }
    }

    pub const fn board() -> Self {
        Self {
            chirality: Chirality::Clockwise,
            flip_local_y: false,
        }
    }

    fn rotate(&self, (x, y): (f64, f64), rotation: Rotation, chirality: Chirality) -> (f64, f64) {
        let ccw = chirality == Chirality::CounterClockwise;
        if let Some(turns) = rotation.quarter_turns() {
            return match (turns, ccw) {
                (0, _) => (x, y),
                (2, _) => (-x, -y),
                (1, true) | (3, false) => (-y, x),
                _ => (y, -x),
            };
        }
        let (sin, cos) = rotation.as_degrees().to_radians().sin_cos();
        if ccw {
            (x * cos - y * sin, x * sin + y * cos)
        } else {
            (x * cos + y * sin, -x * sin + y * cos)
        }
    }

    /// Rotation, vertical flip and mirroring, without translation.
    pub fn orient(&self, local: Offset, placement: &Placement) -> (f64, f64) {
        let (mut x, mut y) = self.rotate((local.x, local.y), placement.rotation, self.chirality);
        if self.flip_local_y {
            y = -y;
        }
        if placement.mirror.x {
            y = -y;
        }
        if placement.mirror.y {
            x = -x;
        }
        (x, y)
    }

    /// Absolute position of a local point, rounded to the fixed grid.
    pub fn resolve(&self, local: Offset, placement: &Placement) -> Point {
        let (x, y) = self.orient(local, placement);
        placement.origin.translate(to_hundredths(x), to_hundredths(y))
    }

    /// Recovers the local offset of an absolute point.
    pub fn invert(&self, point: Point, placement: &Placement) -> Offset {
        let mut x = to_mm(point.x - placement.origin.x);
        let mut y = to_mm(point.y - placement.origin.y);
        if placement.mirror.y {
            x = -x;
        }
        if placement.mirror.x {
            y = -y;
        }
        if self.flip_local_y {
            y = -y;
        }
        let inverse = match self.chirality {
            Chirality::Clockwise => Chirality::CounterClockwise,
            Chirality::CounterClockwise => Chirality::Clockwise,
        };
        let (x, y) = self.rotate((x, y), placement.rotation, inverse);
        Offset::new(x, y)
    }

    /// On-screen angle (0 = right, counter-clockwise positive) of a local
    /// direction after placement. Both global frames point down.
    pub fn direction(&self, local_degrees: f64, placement: &Placement) -> f64 {
        let (sin, cos) = local_degrees.to_radians().sin_cos();
        let local = if self.flip_local_y {
            // Local frames of this representation point up.
            Offset::new(cos, sin)
        } else {
            Offset::new(cos, -sin)
        };
        let (dx, dy) = self.orient(local, placement);
        (-dy).atan2(dx).to_degrees().rem_euclid(360.0)
    }
}

/// Snaps an angle to the nearest of 0, 90, 180 and 270 degrees.
pub fn snap_right_angle(degrees: f64) -> u16 {
    ((degrees / 90.0).round() as i64).rem_euclid(4) as u16 * 90
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::*;

    fn placed(x: f64, y: f64, rot: f64, mx: bool, my: bool) -> Placement {
        Placement {
            origin: Point::from_mm(x, y),
            rotation: Rotation::degrees(rot),
            mirror: Mirror { x: mx, y: my },
        }
    }

    #[rstest]
    #[case(3810, "38.1")]
    #[case(-254, "-2.54")]
    #[case(-5, "-0.05")]
    #[case(500, "5")]
    #[case(0, "0")]
    #[case(25, "0.25")]
    fn formats_fixed_point(#[case] value: i64, #[case] expected: &str) {
        assert_eq!(format_hundredths(value), expected);
    }

    #[test]
    fn board_rotation_by_half_turn() {
        let p = FramePolicy::board().resolve(Offset::new(3.0, 0.0), &placed(20.0, 20.0, 180.0, false, false));
        assert_eq!(p, Point::from_mm(17.0, 20.0));
    }

    #[rstest]
    // Ferrite bead rotated a quarter turn on the sheet.
    #[case(Offset::new(0.0, 3.81), placed(63.5, 43.18, 90.0, false, false), Point::from_mm(59.69, 43.18))]
    #[case(Offset::new(0.0, -3.81), placed(63.5, 43.18, 90.0, false, false), Point::from_mm(67.31, 43.18))]
    // Unrotated symbol: only the vertical axis flips.
    #[case(Offset::new(-15.24, 12.7), placed(165.1, 101.6, 0.0, false, false), Point::from_mm(149.86, 88.9))]
    #[case(Offset::new(15.24, 10.16), placed(165.1, 101.6, 0.0, false, false), Point::from_mm(180.34, 91.44))]
    #[case(Offset::new(-5.08, 0.0), placed(233.68, 99.06, 0.0, false, false), Point::from_mm(228.6, 99.06))]
    // Mirrors reflect about the origin after rotation.
    #[case(Offset::new(-5.08, 0.0), placed(100.0, 100.0, 0.0, false, true), Point::from_mm(105.08, 100.0))]
    #[case(Offset::new(0.0, 2.54), placed(100.0, 100.0, 0.0, true, false), Point::from_mm(100.0, 102.54))]
    fn schematic_resolution(#[case] local: Offset, #[case] placement: Placement, #[case] expected: Point) {
        assert_eq!(FramePolicy::schematic().resolve(local, &placement), expected);
    }

    #[test]
    fn board_quarter_turn_is_counter_clockwise_on_screen() {
        // A pad to the right of the origin moves up (towards negative y).
        let p = FramePolicy::board().resolve(Offset::new(3.0, 0.0), &placed(0.0, 0.0, 90.0, false, false));
        assert_eq!(p, Point::from_mm(0.0, -3.0));
    }

    #[test]
    fn arbitrary_angles_round_to_the_grid() {
        let p = FramePolicy::schematic().resolve(Offset::new(10.0, 0.0), &placed(0.0, 0.0, 45.0, false, false));
        assert_eq!(p, Point::from_mm(7.07, -7.07));
    }

    #[rstest]
    fn transform_round_trips(
        #[values(FramePolicy::schematic(), FramePolicy::board())] policy: FramePolicy,
        #[values(0.0, 90.0, 180.0, 270.0, 30.0)] rot: f64,
        #[values((false, false), (true, false), (false, true), (true, true))] mirror: (bool, bool),
    ) {
        let placement = placed(12.7, -25.4, rot, mirror.0, mirror.1);
        let local = Offset::new(7.62, -2.54);
        let back = policy.invert(policy.resolve(local, &placement), &placement);
        assert_abs_diff_eq!(back.x, local.x, epsilon = 0.01);
        assert_abs_diff_eq!(back.y, local.y, epsilon = 0.01);
    }

    #[rstest]
    #[case(FramePolicy::schematic(), 0.0, 0.0, 0)]
    #[case(FramePolicy::schematic(), 180.0, 0.0, 180)]
    #[case(FramePolicy::schematic(), 0.0, 90.0, 90)]
    #[case(FramePolicy::board(), 0.0, 90.0, 90)]
    #[case(FramePolicy::board(), 90.0, 180.0, 270)]
    fn directions_follow_placement(
        #[case] policy: FramePolicy,
        #[case] local: f64,
        #[case] rot: f64,
        #[case] expected: u16,
    ) {
        let placement = placed(0.0, 0.0, rot, false, false);
        assert_eq!(snap_right_angle(policy.direction(local, &placement)), expected);
    }

    #[test]
    fn mirrored_direction_points_the_other_way() {
        let placement = placed(0.0, 0.0, 0.0, false, true);
        let angle = FramePolicy::schematic().direction(0.0, &placement);
        assert_eq!(snap_right_angle(angle), 180);
    }

    #[test]
    fn segment_predicates() {
        let p = |x, y| Point::from_mm(x, y);
        assert!(segments_touch(p(0., 0.), p(10., 0.), p(5., -5.), p(5., 5.)));
        assert!(!segments_touch(p(0., 0.), p(10., 0.), p(5., 1.), p(5., 5.)));
        assert_eq!(collinear_overlap(p(0., 0.), p(10., 0.), p(5., 0.), p(15., 0.)), 500);
        assert_eq!(collinear_overlap(p(0., 0.), p(10., 0.), p(10., 0.), p(15., 0.)), 0);
        assert_abs_diff_eq!(segment_distance(p(0., 0.), p(10., 0.), p(5., 1.), p(5., 5.)), 1.0);
        assert!(point_on_segment(p(3., 0.), p(0., 0.), p(10., 0.)));
    }
}
