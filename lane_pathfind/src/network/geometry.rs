use std::fmt;

use serde::{Deserialize, Serialize};

use crate::network::{LaneId, NetworkGraph, NodeId, SegmentId, TravelDirection};

/// A point in meters. Y points up, so counter-clockwise turns are to the left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pt2D {
    x: f64,
    y: f64,
}

impl Pt2D {
    pub fn new(x: f64, y: f64) -> Pt2D {
        Pt2D { x, y }
    }

    pub fn x(self) -> f64 {
        self.x
    }

    pub fn y(self) -> f64 {
        self.y
    }

    pub fn dist_to(self, other: Pt2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl fmt::Display for Pt2D {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pt2D({:.2}, {:.2})", self.x, self.y)
    }
}

/// Which side of the road vehicles keep to. The curb is on that side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficHandedness {
    RightHand,
    LeftHand,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnDirection {
    Left,
    Forward,
    Right,
    UTurn,
}

/// Where a lane's centerline is at some offset along its segment.
pub fn lane_point(graph: &dyn NetworkGraph, lane: LaneId, offset: u8) -> Pt2D {
    let lane = graph.lane(lane);
    let segment = graph.segment(lane.segment);
    let a = graph.node(segment.start_node).position;
    let b = graph.node(segment.end_node).position;
    let t = f64::from(offset) / 255.0;
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let center = Pt2D::new(a.x + dx * t, a.y + dy * t);

    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return center;
    }
    // The right-hand normal of (dx, dy)
    let (nx, ny) = (dy / len, -dx / len);
    let shift = f64::from(lane.lateral_offset);
    Pt2D::new(center.x + nx * shift, center.y + ny * shift)
}

/// The signed angle in degrees between arriving at the node along `from` and leaving along `to`.
/// Positive is a left turn.
pub fn turn_angle(graph: &dyn NetworkGraph, from: SegmentId, node: NodeId, to: SegmentId) -> f64 {
    let at = graph.node(node).position;
    let before = graph.node(graph.segment(from).other_node(node)).position;
    let after = graph.node(graph.segment(to).other_node(node)).position;

    let (ax, ay) = (at.x - before.x, at.y - before.y);
    let (bx, by) = (after.x - at.x, after.y - at.y);
    let cross = ax * by - ay * bx;
    let dot = ax * bx + ay * by;
    cross.atan2(dot).to_degrees()
}

pub fn classify_turn(angle_degrees: f64) -> TurnDirection {
    let abs = angle_degrees.abs();
    if abs <= 30.0 {
        TurnDirection::Forward
    } else if abs >= 150.0 {
        TurnDirection::UTurn
    } else if angle_degrees > 0.0 {
        TurnDirection::Left
    } else {
        TurnDirection::Right
    }
}

/// Index of `lane` among `similar` lanes, counted from the curb for a vehicle travelling in `dir`.
/// None if the lane isn't one of them.
pub fn lane_index_from_curb(
    graph: &dyn NetworkGraph,
    lane: LaneId,
    similar: &[LaneId],
    dir: TravelDirection,
    handedness: TrafficHandedness,
) -> Option<usize> {
    let mut sorted: Vec<(f32, LaneId)> = similar
        .iter()
        .map(|l| (graph.lane(*l).lateral_offset, *l))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    // Looking in the direction of travel, the rightmost lane has the largest lateral offset when
    // going forwards.
    let curb_is_max =
        (dir == TravelDirection::Forward) == (handedness == TrafficHandedness::RightHand);
    if curb_is_max {
        sorted.reverse();
    }
    sorted.iter().position(|(_, l)| *l == lane)
}
