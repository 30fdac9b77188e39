use enumset::EnumSet;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::config::RoutingParams;
use crate::network::{
    classify_turn, lane_index_from_curb, lane_point, turn_angle, Lane, LaneId, LaneType,
    NetworkGraph, NodeFlag, NodeId, Pt2D, SegmentId, TravelDirection, TurnDirection, VehicleType,
};
use crate::pathfind::lane_matching::{arrows_allow, lateral_shift, mix, similar_lane_range};
use crate::pathfind::open_set::{FrontierItem, OpenSet, PushOutcome};
use crate::policy::{PolicyProviders, SegmentFlag};
use crate::request::{PathFlag, PathPosition, PathRequest, SearchStats};

/// The search runs backwards, from the end positions. Expanding an item on lane L asks which lanes
/// a vehicle could have been on just before entering L, and what the whole route from there costs.
pub struct GraphExpander<'a> {
    pub(crate) graph: &'a dyn NetworkGraph,
    pub(crate) policies: &'a dyn PolicyProviders,
    pub(crate) params: &'a RoutingParams,
    pub(crate) req: &'a PathRequest,

    starts: Vec<(LaneId, u8)>,
    vehicle_point: Option<Pt2D>,
    highway_window: u8,
    jitter: bool,
    emergency: bool,

    pub(crate) stats: SearchStats,
}

/// Travelling along an item's lane in one direction, from the node where the vehicle entered it.
pub(crate) struct Traversal {
    pub node: NodeId,
    pub dir: TravelDirection,
    /// Where the lane touches the node
    pub point: Pt2D,
    /// Meters along the item's lane, and the multiplier for driving them
    pub length: f32,
    pub factor: f32,
    pub method_distance: f32,
    pub speed: f32,
}

/// A node being passed through by vehicles, towards the item's segment.
struct Crossing {
    node: NodeId,
    outgoing: SegmentId,
    junction: bool,
    /// The item lane's index from the curb among its compatible neighbors, and their count
    k: usize,
    next_count: usize,
}

impl<'a> GraphExpander<'a> {
    pub fn new(
        graph: &'a dyn NetworkGraph,
        policies: &'a dyn PolicyProviders,
        params: &'a RoutingParams,
        req: &'a PathRequest,
    ) -> GraphExpander<'a> {
        let starts = req
            .starts()
            .filter_map(|pos| Some((pos.lane(graph)?, pos.offset)))
            .collect();
        let vehicle_point = req
            .vehicle_position
            .and_then(|pos| Some(lane_point(graph, pos.lane(graph)?, pos.offset)));
        let (lo, hi) = params.highway_window;
        let highway_window = XorShiftRng::seed_from_u64(req.seed).gen_range(lo..=hi);
        let jitter = params.jitter > 0.0
            && !req.has(PathFlag::StablePath)
            && req.vehicle_types.is_disjoint(params.lane_changing_vehicles);

        GraphExpander {
            graph,
            policies,
            params,
            req,
            starts,
            vehicle_point,
            highway_window,
            jitter,
            emergency: req.vehicle_types.contains(VehicleType::Emergency),
            stats: SearchStats::default(),
        }
    }

    /// One item per end position, at no cost.
    pub fn seed(&mut self, open: &mut OpenSet) {
        let graph = self.graph;
        let req = self.req;
        for end in req.ends() {
            let lane_id = match end.lane(graph) {
                Some(l) => l,
                None => continue,
            };
            let lane = graph.lane(lane_id);
            let item = FrontierItem {
                position: end,
                comparison_value: self.blocked_penalty(lane),
                method_distance: 0.0,
                lane: lane_id,
                direction: lane.travel_directions(),
                lanes_used: EnumSet::only(lane.lane_type),
                segments_to_junction: 0,
            };
            self.push(open, item, end);
        }
    }

    /// True if the item's lane is a start lane, and the start offset leads to the item's offset.
    pub fn reaches_start(&self, item: &FrontierItem) -> bool {
        self.starts.iter().any(|(lane, offset)| {
            *lane == item.lane
                && ((item.direction.contains(TravelDirection::Forward)
                    && *offset <= item.position.offset)
                    || (item.direction.contains(TravelDirection::Backward)
                        && *offset >= item.position.offset))
        })
    }

    /// The cost of the whole route once `found` terminated the search. Only an end position
    /// reached directly still lacks the stretch from the start offset, and the way there from the
    /// vehicle.
    pub fn final_cost(&self, found: &FrontierItem) -> f32 {
        if !self.req.is_end(found.position) {
            return found.comparison_value;
        }
        let lane = self.graph.lane(found.lane);
        let start_offset = match self.start_offset(found.lane) {
            Some(o) => o,
            None => return found.comparison_value,
        };
        let dir = if start_offset <= found.position.offset {
            TravelDirection::Forward
        } else {
            TravelDirection::Backward
        };
        let length = (f32::from(found.position.offset) - f32::from(start_offset)).abs() / 255.0
            * self.graph.segment(lane.segment).length;
        found.comparison_value
            + length / (self.speed(lane) * self.req.max_length) * self.traversal_factor(lane, dir)
            + self.vehicle_distance(lane, start_offset)
    }

    /// Where the chain of positions starts on this lane, if it's a start lane.
    pub(crate) fn start_offset(&self, lane: LaneId) -> Option<u8> {
        self.starts
            .iter()
            .find(|(l, _)| *l == lane)
            .map(|(_, o)| *o)
    }

    /// True if the route passes a blocked segment on a vehicle lane. Blocked segments only
    /// somewhere else in the searched area don't count.
    pub fn path_blocked(&self, positions: &[PathPosition]) -> bool {
        positions.iter().any(|pos| match pos.lane(self.graph) {
            Some(l) => self.is_blocked(self.graph.lane(l)),
            None => false,
        })
    }

    pub fn expand(&mut self, item: &FrontierItem, open: &mut OpenSet) {
        let graph = self.graph;
        let lane = graph.lane(item.lane);
        for dir in item.direction {
            let trav = self.traverse(item, lane, dir);
            if lane.lane_type == LaneType::Pedestrian {
                self.expand_walking(item, &trav, open);
            } else {
                self.expand_vehicle(item, &trav, open);
                if self.can_ride_bicycle(lane) && self.req.lane_types.contains(LaneType::Pedestrian)
                {
                    self.expand_bicycle_dismount(item, &trav, open);
                }
            }
        }
    }

    fn traverse(&self, item: &FrontierItem, lane: &Lane, dir: TravelDirection) -> Traversal {
        let graph = self.graph;
        let segment = graph.segment(lane.segment);
        let (node, connect_offset) = match dir.plain() {
            TravelDirection::Backward => (segment.end_node, 255),
            _ => (segment.start_node, 0),
        };
        let length = (f32::from(connect_offset) - f32::from(item.position.offset)).abs() / 255.0
            * segment.length;

        Traversal {
            node,
            dir,
            point: lane_point(graph, item.lane, connect_offset),
            length,
            factor: self.traversal_factor(lane, dir),
            method_distance: item.method_distance + length,
            speed: self.speed(lane),
        }
    }

    fn traversal_factor(&self, lane: &Lane, dir: TravelDirection) -> f32 {
        let params = self.params;
        let mut factor = 1.0;
        if lane.lane_type.is_vehicle() && !self.emergency {
            let flags = self.policies.segment_flags(lane.segment);
            if self.req.has(PathFlag::HeavyVehicle) && flags.contains(SegmentFlag::HeavyBan) {
                factor *= params.heavy_ban_factor;
            }
            if self.req.vehicle_types.contains(VehicleType::Car)
                && flags.contains(SegmentFlag::CarBan)
            {
                factor *= params.car_ban_factor;
            }
        }
        if self.req.has(PathFlag::TransitVehicle) && lane.lane_type == LaneType::TransportVehicle {
            factor *= params.transit_lane_factor;
        }
        if lane.is_avoided(dir) {
            factor *= params.avoid_direction_factor;
        }
        if self.jitter && lane.lane_type.is_vehicle() {
            let mut rng = XorShiftRng::seed_from_u64(self.req.seed ^ mix(u64::from(lane.segment.0)));
            factor *= 1.0 + params.jitter * rng.gen::<f32>();
        }
        factor
    }

    pub(crate) fn speed(&self, lane: &Lane) -> f32 {
        self.policies
            .speed_limit(lane.id)
            .unwrap_or(lane.speed_limit)
            .max(0.01)
    }

    /// Emergency vehicles ignore vehicle restrictions and may use transit lanes.
    pub(crate) fn can_use(&self, lane: &Lane) -> bool {
        if self.emergency {
            return (self.req.lane_types.contains(lane.lane_type)
                || lane.lane_type == LaneType::TransportVehicle)
                && !lane.vehicle_types.is_disjoint(self.req.vehicle_types);
        }
        if !self.req.lane_types.contains(lane.lane_type) {
            return false;
        }
        if lane.lane_type == LaneType::Pedestrian {
            return true;
        }
        let allowed = self
            .policies
            .allowed_vehicle_types(lane.id)
            .unwrap_or(lane.vehicle_types);
        !allowed.is_disjoint(self.req.vehicle_types)
    }

    pub(crate) fn can_ride_bicycle(&self, lane: &Lane) -> bool {
        self.req.vehicle_types.contains(VehicleType::Bicycle)
            && lane.lane_type.is_vehicle()
            && self.can_use(lane)
    }

    pub(crate) fn node_closed(&self, node: NodeId) -> bool {
        self.graph.node(node).flags.contains(NodeFlag::Disabled)
            && !self.req.has(PathFlag::AllowDisabledNodes)
    }

    pub(crate) fn segment_closed(&self, segment: SegmentId) -> bool {
        !self
            .policies
            .segment_flags(segment)
            .is_disjoint(SegmentFlag::Flooded | SegmentFlag::PathFailed)
    }

    fn is_blocked(&self, lane: &Lane) -> bool {
        !self.req.has(PathFlag::IgnoreBlocked)
            && lane.lane_type.is_vehicle()
            && self
                .policies
                .segment_flags(lane.segment)
                .contains(SegmentFlag::Blocked)
    }

    pub(crate) fn blocked_penalty(&self, lane: &Lane) -> f32 {
        if self.is_blocked(lane) {
            self.params.blocked_penalty
        } else {
            0.0
        }
    }

    /// A new item on a start lane must also pay for the stretch from the start offset to where it
    /// leaves the lane, plus reaching the lane from wherever the vehicle really is.
    pub(crate) fn start_correction(&self, lane: &Lane, exit_offset: u8, dir: TravelDirection) -> f32 {
        let start_offset = match self.start_offset(lane.id) {
            Some(o) => o,
            None => return 0.0,
        };
        let length = (f32::from(exit_offset) - f32::from(start_offset)).abs() / 255.0
            * self.graph.segment(lane.segment).length;
        length / (self.speed(lane) * self.req.max_length) * self.traversal_factor(lane, dir)
            + self.vehicle_distance(lane, start_offset)
    }

    /// Getting from the vehicle's real position onto a start lane
    fn vehicle_distance(&self, lane: &Lane, start_offset: u8) -> f32 {
        match self.vehicle_point {
            Some(pt) => {
                let from = lane_point(self.graph, lane.id, start_offset);
                pt.dist_to(from) as f32 / (self.speed(lane) * self.req.max_length)
            }
            None => 0.0,
        }
    }

    pub(crate) fn push(&mut self, open: &mut OpenSet, item: FrontierItem, target: PathPosition) {
        match open.push(item, target) {
            PushOutcome::Inserted | PushOutcome::Replaced => {
                self.stats.items_pushed += 1;
            }
            PushOutcome::Dropped => {
                self.stats.items_dropped += 1;
            }
            PushOutcome::Rejected => {}
        }
    }

    fn expand_vehicle(&mut self, item: &FrontierItem, trav: &Traversal, open: &mut OpenSet) {
        let graph = self.graph;
        if self.node_closed(trav.node) {
            return;
        }
        let node = graph.node(trav.node);
        let outgoing = graph.lane(item.lane).segment;
        let segments = graph.node_segments(trav.node);

        let next_lanes: Vec<LaneId> = graph
            .segment_lanes(outgoing)
            .iter()
            .cloned()
            .filter(|l| {
                let lane = graph.lane(*l);
                lane.lane_type.is_vehicle() && lane.allows(trav.dir) && self.can_use(lane)
            })
            .collect();
        let crossing = Crossing {
            node: trav.node,
            outgoing,
            junction: segments.len() >= 3 || node.flags.contains(NodeFlag::Junction),
            k: lane_index_from_curb(
                graph,
                item.lane,
                &next_lanes,
                trav.dir,
                self.params.traffic_handedness,
            )
            .unwrap_or(0),
            next_count: next_lanes.len().max(1),
        };

        let mut blocked_here = false;
        for incoming in segments {
            if *incoming != outgoing {
                blocked_here |= self.expand_from_segment(item, trav, &crossing, *incoming, open);
            }
        }
        if segments.len() == 1
            || self.policies.is_uturn_allowed(outgoing, trav.node)
            || blocked_here
        {
            self.expand_from_segment(item, trav, &crossing, outgoing, open);
        }
    }

    /// Returns true if any new item landed on a blocked segment.
    fn expand_from_segment(
        &mut self,
        item: &FrontierItem,
        trav: &Traversal,
        crossing: &Crossing,
        incoming: SegmentId,
        open: &mut OpenSet,
    ) -> bool {
        let graph = self.graph;
        let policies = self.policies;
        let handedness = self.params.traffic_handedness;
        if self.segment_closed(incoming) {
            return false;
        }

        let turn = if incoming == crossing.outgoing {
            TurnDirection::UTurn
        } else {
            if !policies.is_turn_allowed(incoming, crossing.node, crossing.outgoing) {
                return false;
            }
            let angle = turn_angle(graph, incoming, crossing.node, crossing.outgoing);
            if angle.abs() > self.params.max_turn_angle_degrees {
                return false;
            }
            classify_turn(angle)
        };

        let into = graph.segment(incoming).direction_into(crossing.node);
        let candidates: Vec<LaneId> = graph
            .segment_lanes(incoming)
            .iter()
            .cloned()
            .filter(|l| {
                let lane = graph.lane(*l);
                lane.lane_type.is_vehicle() && lane.allows(into) && self.can_use(lane)
            })
            .collect();
        if candidates.is_empty() {
            return false;
        }

        let arrow_mode = candidates.iter().any(|l| {
            policies.lane_arrows(*l, crossing.node).is_some()
                || policies.lane_connections(*l, crossing.node).is_some()
        });
        let mut blocked = false;

        if !arrow_mode {
            for m in &candidates {
                let p = lane_index_from_curb(graph, *m, &candidates, into, handedness).unwrap_or(0);
                let shift = lateral_shift(p, crossing.k, candidates.len(), crossing.next_count);
                blocked |= self.add_transition(item, trav, crossing, *m, shift, open);
            }
            return blocked;
        }

        let similar: Vec<LaneId> = candidates
            .iter()
            .cloned()
            .filter(|l| {
                policies.lane_connections(*l, crossing.node).is_none()
                    && arrows_allow(policies.lane_arrows(*l, crossing.node), turn, handedness)
            })
            .collect();
        for m in &candidates {
            if let Some(connected) = policies.lane_connections(*m, crossing.node) {
                if connected.contains(&item.lane) {
                    blocked |= self.add_transition(item, trav, crossing, *m, 0.0, open);
                }
                continue;
            }
            let p = match lane_index_from_curb(graph, *m, &similar, into, handedness) {
                Some(p) => p,
                None => continue,
            };
            let range = match similar_lane_range(p, similar.len(), crossing.next_count) {
                Some(r) => r.resolve(self.req.seed, *m),
                None => continue,
            };
            if !range.contains(crossing.k) {
                continue;
            }
            let shift = lateral_shift(p, crossing.k, similar.len(), crossing.next_count);
            blocked |= self.add_transition(item, trav, crossing, *m, shift, open);
        }
        blocked
    }

    /// A vehicle on lane `m` crosses the node onto the item's lane, shifting `shift` lanes sideways.
    fn add_transition(
        &mut self,
        item: &FrontierItem,
        trav: &Traversal,
        crossing: &Crossing,
        m: LaneId,
        shift: f32,
        open: &mut OpenSet,
    ) -> bool {
        let graph = self.graph;
        let params = self.params;
        let lane = graph.lane(m);
        let segment = graph.segment(lane.segment);
        let exit_offset = segment.offset_at(crossing.node);
        let into = segment.direction_into(crossing.node);

        let distance = lane_point(graph, m, exit_offset).dist_to(trav.point) as f32;
        let norm = (trav.speed + self.speed(lane)) * 0.5 * self.req.max_length;
        let mut increment = (trav.length * trav.factor + distance) / norm;

        let highway = !crossing.junction
            && self.policies.is_highway(lane.segment)
            && self.policies.is_highway(crossing.outgoing);
        if highway && item.segments_to_junction >= self.highway_window {
            // Too far from the junction to bother changing lanes yet
            if shift > 0.0 {
                increment += shift * params.highway_lane_change_tax / norm;
            } else {
                let density = self.policies.traffic_density(m).clamp(0.0, 1.0);
                increment *= 1.0 - params.highway_stay_reward * (1.0 - density);
            }
        } else if shift > 0.0 {
            increment += shift * params.lane_change_length / norm;
        }

        // Vehicles facing a yield or stop sign on the way into the node
        if let Some(sign) = self.policies.priority_sign(lane.segment, crossing.node) {
            increment += params.priority_penalty(sign) / norm;
        }

        let mut cost = item.comparison_value + increment;
        cost += self.start_correction(lane, exit_offset, into);
        cost += self.blocked_penalty(lane);

        let new_item = FrontierItem {
            position: PathPosition::new(lane.segment, lane.index, exit_offset),
            comparison_value: cost,
            method_distance: trav.method_distance + distance,
            lane: m,
            direction: EnumSet::only(into),
            lanes_used: item.lanes_used | lane.lane_type,
            segments_to_junction: if crossing.junction {
                0
            } else {
                item.segments_to_junction.saturating_add(1)
            },
        };
        self.push(open, new_item, item.position);
        self.is_blocked(lane)
    }
}
