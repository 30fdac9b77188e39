use std::fmt;

use anyhow::Result;
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};

use crate::network::{LaneId, LaneType, NetworkGraph, SegmentId, VehicleType};
use crate::path_units::PathUnitId;

/// A point along a lane. Offset 0 is at the segment's start node, 255 at its end node.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PathPosition {
    pub segment: SegmentId,
    pub lane_index: u8,
    pub offset: u8,
}

impl PathPosition {
    pub fn new(segment: SegmentId, lane_index: u8, offset: u8) -> PathPosition {
        PathPosition {
            segment,
            lane_index,
            offset,
        }
    }

    pub fn lane(&self, graph: &dyn NetworkGraph) -> Option<LaneId> {
        graph.lane_at(self.segment, self.lane_index)
    }
}

impl fmt::Display for PathPosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} lane {} at {}/255",
            self.segment, self.lane_index, self.offset
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, EnumSetType)]
pub enum PathFlag {
    HeavyVehicle,
    IgnoreBlocked,
    /// Disables jitter, so identical requests get identical paths.
    StablePath,
    TransitVehicle,
    /// Jump to the front of the worker's queue.
    SkipQueue,
    AllowDisabledNodes,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathRequest {
    pub start_a: PathPosition,
    pub start_b: Option<PathPosition>,
    pub end_a: PathPosition,
    pub end_b: Option<PathPosition>,
    /// Where the vehicle physically is, if it's not exactly at a start position.
    pub vehicle_position: Option<PathPosition>,
    pub lane_types: EnumSet<LaneType>,
    pub vehicle_types: EnumSet<VehicleType>,
    pub flags: EnumSet<PathFlag>,
    /// Costs are normalized by this; in meters.
    pub max_length: f32,
    pub seed: u64,
}

impl fmt::Display for PathRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PathRequest({}", self.start_a)?;
        if let Some(b) = self.start_b {
            write!(f, " or {}", b)?;
        }
        write!(f, " to {}", self.end_a)?;
        if let Some(b) = self.end_b {
            write!(f, " or {}", b)?;
        }
        write!(
            f,
            " for {:?} on {:?}, seed {})",
            self.vehicle_types, self.lane_types, self.seed
        )
    }
}

impl PathRequest {
    pub fn new(
        start: PathPosition,
        end: PathPosition,
        lane_types: EnumSet<LaneType>,
        vehicle_types: EnumSet<VehicleType>,
    ) -> PathRequest {
        PathRequest {
            start_a: start,
            start_b: None,
            end_a: end,
            end_b: None,
            vehicle_position: None,
            lane_types,
            vehicle_types,
            flags: EnumSet::empty(),
            max_length: 20_000.0,
            seed: 0,
        }
    }

    pub fn driving(start: PathPosition, end: PathPosition) -> PathRequest {
        PathRequest::new(
            start,
            end,
            EnumSet::only(LaneType::Vehicle),
            EnumSet::only(VehicleType::Car),
        )
    }

    pub fn walking(start: PathPosition, end: PathPosition) -> PathRequest {
        PathRequest::new(
            start,
            end,
            EnumSet::only(LaneType::Pedestrian),
            EnumSet::empty(),
        )
    }

    pub fn with_flag(mut self, flag: PathFlag) -> PathRequest {
        self.flags |= flag;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> PathRequest {
        self.seed = seed;
        self
    }

    pub fn with_alternatives(
        mut self,
        start_b: Option<PathPosition>,
        end_b: Option<PathPosition>,
    ) -> PathRequest {
        self.start_b = start_b;
        self.end_b = end_b;
        self
    }

    pub fn with_vehicle_position(mut self, pos: PathPosition) -> PathRequest {
        self.vehicle_position = Some(pos);
        self
    }

    pub fn has(&self, flag: PathFlag) -> bool {
        self.flags.contains(flag)
    }

    pub fn starts(&self) -> impl Iterator<Item = PathPosition> {
        std::iter::once(self.start_a).chain(self.start_b)
    }

    pub fn ends(&self) -> impl Iterator<Item = PathPosition> {
        std::iter::once(self.end_a).chain(self.end_b)
    }

    pub fn is_end(&self, pos: PathPosition) -> bool {
        pos == self.end_a || self.end_b == Some(pos)
    }

    /// Rejects requests the search can't make sense of, before they're queued.
    pub fn validate(&self, graph: &dyn NetworkGraph) -> Result<()> {
        if !self.max_length.is_finite() || self.max_length <= 0.0 {
            bail!("{} has bad max_length {}", self, self.max_length);
        }
        if self.lane_types.is_empty() {
            bail!("{} doesn't allow any lane types", self);
        }
        for pos in self
            .starts()
            .chain(self.ends())
            .chain(self.vehicle_position)
        {
            if pos.lane(graph).is_none() {
                bail!("{} refers to {}, which doesn't exist", self, pos);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub items_popped: usize,
    pub items_pushed: usize,
    pub items_dropped: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathResult {
    /// The first unit of the chain, owned by the pool until released
    pub chain: PathUnitId,
    /// Normalized cost scaled back up by max_length
    pub total_length: f32,
    pub position_count: usize,
    /// Some transition crossed a blocked segment.
    pub blocked: bool,
    pub stats: SearchStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{RoadNetwork, TravelDirection};

    #[test]
    fn validation() {
        let net = RoadNetwork::grid(2, 2, 100.0, 1);
        let start = PathPosition::new(SegmentId(0), 2, 0);
        let end = PathPosition::new(SegmentId(1), 2, 255);
        let req = PathRequest::driving(start, end);
        req.validate(&net).unwrap();
        assert_eq!(
            net.lane(start.lane(&net).unwrap()).direction,
            EnumSet::only(TravelDirection::Forward)
        );

        let mut bad = req.clone();
        bad.max_length = 0.0;
        assert!(bad.validate(&net).is_err());

        let bad = req
            .clone()
            .with_alternatives(Some(PathPosition::new(SegmentId(0), 9, 0)), None);
        assert!(bad.validate(&net).is_err());

        let bad = req.with_vehicle_position(PathPosition::new(SegmentId(99), 0, 0));
        assert!(bad.validate(&net).is_err());
    }

    #[test]
    fn display_mentions_alternatives() {
        let a = PathPosition::new(SegmentId(3), 1, 0);
        let b = PathPosition::new(SegmentId(4), 1, 255);
        let req = PathRequest::driving(a, b).with_alternatives(Some(b), None);
        let txt = req.to_string();
        assert!(txt.contains("Segment #3 lane 1 at 0/255 or Segment #4"));
        assert!(req.is_end(b));
        assert!(!req.is_end(a));
        assert_eq!(req.starts().count(), 2);
    }
}
