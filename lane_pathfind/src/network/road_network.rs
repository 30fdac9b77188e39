use anyhow::Result;
use enumset::EnumSet;
use serde::{Deserialize, Serialize};

use crate::network::{
    Lane, LaneId, LaneType, NetworkGraph, Node, NodeFlag, NodeId, Pt2D, Segment, SegmentId,
    TravelDirection, VehicleType,
};

/// Describes one lane when building a segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneSpec {
    pub lane_type: LaneType,
    pub vehicle_types: EnumSet<VehicleType>,
    pub direction: EnumSet<TravelDirection>,
    pub speed_limit: f32,
    /// In meters
    pub width: f32,
}

impl LaneSpec {
    pub fn driving(dir: TravelDirection) -> LaneSpec {
        LaneSpec {
            lane_type: LaneType::Vehicle,
            vehicle_types: VehicleType::Car
                | VehicleType::Bus
                | VehicleType::Bicycle
                | VehicleType::Emergency,
            direction: EnumSet::only(dir),
            speed_limit: 1.0,
            width: 3.0,
        }
    }

    pub fn transit(dir: TravelDirection) -> LaneSpec {
        LaneSpec {
            lane_type: LaneType::TransportVehicle,
            vehicle_types: VehicleType::Bus | VehicleType::Tram | VehicleType::Emergency,
            direction: EnumSet::only(dir),
            speed_limit: 1.0,
            width: 3.0,
        }
    }

    pub fn sidewalk() -> LaneSpec {
        LaneSpec {
            lane_type: LaneType::Pedestrian,
            vehicle_types: EnumSet::empty(),
            direction: TravelDirection::Forward | TravelDirection::Backward,
            speed_limit: 0.25,
            width: 2.0,
        }
    }

    pub fn speed(mut self, speed_limit: f32) -> LaneSpec {
        self.speed_limit = speed_limit;
        self
    }

    pub fn vehicles(mut self, vehicle_types: EnumSet<VehicleType>) -> LaneSpec {
        self.vehicle_types = vehicle_types;
        self
    }

    /// Permit travel in the lane's directions only as avoided travel.
    pub fn avoided(mut self) -> LaneSpec {
        self.direction = self.direction.iter().map(|d| d.avoided()).collect();
        self
    }
}

/// An in-memory network, built up incrementally or loaded from JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoadNetwork {
    nodes: Vec<Node>,
    segments: Vec<Segment>,
    lanes: Vec<Lane>,
}

impl RoadNetwork {
    pub fn new() -> RoadNetwork {
        RoadNetwork {
            nodes: Vec::new(),
            segments: Vec::new(),
            lanes: Vec::new(),
        }
    }

    pub fn add_node(&mut self, position: Pt2D) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            position,
            flags: EnumSet::empty(),
            segments: Vec::new(),
        });
        id
    }

    pub fn set_node_flags(&mut self, node: NodeId, flags: EnumSet<NodeFlag>) {
        self.nodes[node.0 as usize].flags = flags;
    }

    /// Lanes are given from left to right, looking from `start` towards `end`.
    pub fn add_segment(&mut self, start: NodeId, end: NodeId, lanes: Vec<LaneSpec>) -> SegmentId {
        assert!(lanes.len() <= 255, "a segment can't have {} lanes", lanes.len());
        let id = SegmentId(self.segments.len() as u32);
        let length = self.nodes[start.0 as usize]
            .position
            .dist_to(self.nodes[end.0 as usize].position) as f32;

        let total_width: f32 = lanes.iter().map(|l| l.width).sum();
        let mut left_edge = -total_width / 2.0;
        let mut lane_ids = Vec::new();
        for (idx, spec) in lanes.into_iter().enumerate() {
            let lane_id = LaneId(self.lanes.len() as u32);
            self.lanes.push(Lane {
                id: lane_id,
                segment: id,
                index: idx as u8,
                lane_type: spec.lane_type,
                vehicle_types: spec.vehicle_types,
                direction: spec.direction,
                speed_limit: spec.speed_limit,
                lateral_offset: left_edge + spec.width / 2.0,
            });
            left_edge += spec.width;
            lane_ids.push(lane_id);
        }

        self.segments.push(Segment {
            id,
            start_node: start,
            end_node: end,
            length,
            lanes: lane_ids,
        });
        self.nodes[start.0 as usize].segments.push(id);
        if start != end {
            self.nodes[end.0 as usize].segments.push(id);
        }
        id
    }

    /// A rows x cols grid of two-way streets with sidewalks on both sides. Forward lanes are on the
    /// right.
    pub fn grid(rows: usize, cols: usize, spacing: f64, lanes_per_direction: usize) -> RoadNetwork {
        let mut net = RoadNetwork::new();
        let mut lanes = vec![LaneSpec::sidewalk()];
        for _ in 0..lanes_per_direction {
            lanes.push(LaneSpec::driving(TravelDirection::Backward));
        }
        for _ in 0..lanes_per_direction {
            lanes.push(LaneSpec::driving(TravelDirection::Forward));
        }
        lanes.push(LaneSpec::sidewalk());

        let mut ids = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                ids.push(net.add_node(Pt2D::new(
                    col as f64 * spacing,
                    row as f64 * spacing,
                )));
            }
        }
        for row in 0..rows {
            for col in 0..cols {
                let here = ids[row * cols + col];
                if col + 1 < cols {
                    net.add_segment(here, ids[row * cols + col + 1], lanes.clone());
                }
                if row + 1 < rows {
                    net.add_segment(here, ids[(row + 1) * cols + col], lanes.clone());
                }
            }
        }
        net
    }

    pub fn load(path: &str) -> Result<RoadNetwork> {
        let net: RoadNetwork = crate::io::read_json(path)?;
        net.validate()?;
        Ok(net)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        crate::io::write_json(path, self)
    }

    /// Checks the cross-references a hand-written network file could get wrong.
    pub fn validate(&self) -> Result<()> {
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.id.0 as usize != idx {
                bail!("{} is stored at position {}", node.id, idx);
            }
            for s in &node.segments {
                let seg = self
                    .maybe_segment(*s)
                    .ok_or_else(|| anyhow!("{} refers to missing {}", node.id, s))?;
                if seg.start_node != node.id && seg.end_node != node.id {
                    bail!("{} lists {}, which doesn't touch it", node.id, s);
                }
            }
        }
        for (idx, seg) in self.segments.iter().enumerate() {
            if seg.id.0 as usize != idx {
                bail!("{} is stored at position {}", seg.id, idx);
            }
            for n in [seg.start_node, seg.end_node] {
                match self.maybe_node(n) {
                    Some(node) if node.segments.contains(&seg.id) => {}
                    Some(_) => bail!("{} doesn't list {}", n, seg.id),
                    None => bail!("{} refers to missing {}", seg.id, n),
                }
            }
            if seg.lanes.len() > 255 {
                bail!("{} has {} lanes", seg.id, seg.lanes.len());
            }
            for (pos, l) in seg.lanes.iter().enumerate() {
                let lane = self
                    .maybe_lane(*l)
                    .ok_or_else(|| anyhow!("{} refers to missing {}", seg.id, l))?;
                if lane.segment != seg.id || lane.index as usize != pos {
                    bail!("{} is out of place in {}", l, seg.id);
                }
            }
        }
        for (idx, lane) in self.lanes.iter().enumerate() {
            if lane.id.0 as usize != idx {
                bail!("{} is stored at position {}", lane.id, idx);
            }
            if lane.travel_directions().is_empty() {
                bail!("{} can't be travelled in any direction", lane.id);
            }
        }
        Ok(())
    }

    pub fn all_nodes(&self) -> &Vec<Node> {
        &self.nodes
    }

    pub fn all_segments(&self) -> &Vec<Segment> {
        &self.segments
    }

    pub fn all_lanes(&self) -> &Vec<Lane> {
        &self.lanes
    }
}

impl NetworkGraph for RoadNetwork {
    fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    fn maybe_segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id.0 as usize)
    }

    fn maybe_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    fn maybe_lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.get(id.0 as usize)
    }
}
