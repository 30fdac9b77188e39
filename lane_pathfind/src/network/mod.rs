//! The static road network the pathfinder searches over. Segments join two nodes and carry an
//! ordered list of lanes; the search only ever reads this, so it's shared immutably between
//! workers.

use std::fmt;

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};

pub use self::geometry::{
    classify_turn, lane_index_from_curb, lane_point, turn_angle, Pt2D, TrafficHandedness,
    TurnDirection,
};
pub use self::road_network::{LaneSpec, RoadNetwork};

mod geometry;
mod road_network;

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Segment #{}", self.0)
    }
}

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Node #{}", self.0)
    }
}

/// Lanes are numbered densely from 0, so per-lane tables can be plain vectors.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LaneId(pub u32);

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Lane #{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, EnumSetType)]
pub enum LaneType {
    Vehicle,
    TransportVehicle,
    Pedestrian,
    /// Never routed over
    Parking,
}

impl LaneType {
    /// Vehicle and transit lanes form one group; changing between them isn't a change of travel
    /// mode.
    pub fn is_vehicle(self) -> bool {
        self == LaneType::Vehicle || self == LaneType::TransportVehicle
    }
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, EnumSetType)]
pub enum VehicleType {
    Car,
    Bus,
    Bicycle,
    Tram,
    Train,
    Metro,
    Ship,
    Emergency,
}

/// Relative to the segment's start node -> end node orientation. The Avoid variants permit travel
/// that the cost function discourages.
#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, EnumSetType)]
pub enum TravelDirection {
    Forward,
    Backward,
    AvoidForward,
    AvoidBackward,
}

impl TravelDirection {
    pub fn avoided(self) -> TravelDirection {
        match self {
            TravelDirection::Forward | TravelDirection::AvoidForward => {
                TravelDirection::AvoidForward
            }
            TravelDirection::Backward | TravelDirection::AvoidBackward => {
                TravelDirection::AvoidBackward
            }
        }
    }

    /// Strips Avoid.
    pub fn plain(self) -> TravelDirection {
        match self {
            TravelDirection::Forward | TravelDirection::AvoidForward => TravelDirection::Forward,
            TravelDirection::Backward | TravelDirection::AvoidBackward => {
                TravelDirection::Backward
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, EnumSetType)]
pub enum NodeFlag {
    /// Treat as a real junction even with fewer than 3 segments.
    Junction,
    Disabled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub start_node: NodeId,
    pub end_node: NodeId,
    /// In meters
    pub length: f32,
    /// Ordered from left to right, looking from the start node towards the end node.
    pub lanes: Vec<LaneId>,
}

impl Segment {
    /// The direction a vehicle travels along this segment to arrive at the node.
    pub fn direction_into(&self, node: NodeId) -> TravelDirection {
        if self.end_node == node {
            TravelDirection::Forward
        } else {
            TravelDirection::Backward
        }
    }

    /// The offset of the end touching the node.
    pub fn offset_at(&self, node: NodeId) -> u8 {
        if self.end_node == node {
            255
        } else {
            0
        }
    }

    pub fn other_node(&self, node: NodeId) -> NodeId {
        if self.start_node == node {
            self.end_node
        } else {
            self.start_node
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Pt2D,
    pub flags: EnumSet<NodeFlag>,
    pub segments: Vec<SegmentId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    pub segment: SegmentId,
    /// Position within the segment's lane list, counted from the left.
    pub index: u8,
    pub lane_type: LaneType,
    pub vehicle_types: EnumSet<VehicleType>,
    pub direction: EnumSet<TravelDirection>,
    /// In units of 50km/h
    pub speed_limit: f32,
    /// Signed offset from the segment's centerline, positive to the right of start -> end.
    pub lateral_offset: f32,
}

impl Lane {
    pub fn allows(&self, dir: TravelDirection) -> bool {
        self.direction.contains(dir.plain()) || self.direction.contains(dir.avoided())
    }

    /// Forward and/or Backward, with Avoid folded in.
    pub fn travel_directions(&self) -> EnumSet<TravelDirection> {
        let mut dirs = EnumSet::empty();
        for dir in [TravelDirection::Forward, TravelDirection::Backward] {
            if self.allows(dir) {
                dirs |= dir;
            }
        }
        dirs
    }

    /// True if travel in `dir` is only permitted as an avoided direction.
    pub fn is_avoided(&self, dir: TravelDirection) -> bool {
        !self.direction.contains(dir.plain()) && self.direction.contains(dir.avoided())
    }
}

/// Read-only queries the search needs. Implementations must be safe to share between worker
/// threads.
pub trait NetworkGraph: Send + Sync {
    fn lane_count(&self) -> usize;
    fn maybe_segment(&self, id: SegmentId) -> Option<&Segment>;
    fn maybe_node(&self, id: NodeId) -> Option<&Node>;
    fn maybe_lane(&self, id: LaneId) -> Option<&Lane>;

    fn segment(&self, id: SegmentId) -> &Segment {
        match self.maybe_segment(id) {
            Some(s) => s,
            None => panic!("{} doesn't exist", id),
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        match self.maybe_node(id) {
            Some(n) => n,
            None => panic!("{} doesn't exist", id),
        }
    }

    fn lane(&self, id: LaneId) -> &Lane {
        match self.maybe_lane(id) {
            Some(l) => l,
            None => panic!("{} doesn't exist", id),
        }
    }

    /// Ordered from left to right, looking from the start node towards the end node.
    fn segment_lanes(&self, id: SegmentId) -> &[LaneId] {
        &self.segment(id).lanes
    }

    fn node_segments(&self, id: NodeId) -> &[SegmentId] {
        &self.node(id).segments
    }

    /// The lane at a position within a segment, counted from the left.
    fn lane_at(&self, segment: SegmentId, index: u8) -> Option<LaneId> {
        self.maybe_segment(segment)?
            .lanes
            .get(index as usize)
            .cloned()
    }
}
