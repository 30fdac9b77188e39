//! A lane-level pathfinder for traffic simulation. Routes are searched over individual lanes, so
//! they account for lane changes, lane arrows, highway merges, vehicle restrictions, and switching
//! between walking and cycling. Searches run on a pool of worker threads; finished routes are
//! stored as chains of path units.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

pub use crate::config::RoutingParams;
pub use crate::error::PathFailure;
pub use crate::manager::PathManager;
pub use crate::network::{
    classify_turn, lane_index_from_curb, lane_point, turn_angle, Lane, LaneId, LaneSpec, LaneType,
    NetworkGraph, Node, NodeFlag, NodeId, Pt2D, RoadNetwork, Segment, SegmentId,
    TrafficHandedness, TravelDirection, TurnDirection, VehicleType,
};
pub use crate::path_units::{PathUnit, PathUnitFlag, PathUnitId, PathUnitPool, POSITIONS_PER_UNIT};
pub use crate::pathfind::{
    lateral_shift, reconstruct, similar_lane_range, FrontierItem, GraphExpander, LaneRange,
    OpenSet, Pathfinder, PushOutcome, BUCKET_CAPACITY, NUM_BUCKETS,
};
pub use crate::policy::{
    LaneArrow, NoPolicies, PolicyProviders, PrioritySign, SegmentFlag, StaticPolicies,
};
pub use crate::request::{PathFlag, PathPosition, PathRequest, PathResult, SearchStats};
pub use crate::worker::{PathHandle, PathState, PathfindWorker};

mod config;
mod error;
mod io;
mod manager;
mod network;
mod path_units;
mod pathfind;
mod policy;
mod request;
mod worker;
