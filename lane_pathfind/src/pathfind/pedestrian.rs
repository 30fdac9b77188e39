//! Walking, and switching between walking and cycling. Pedestrians aren't bound by lanes lining
//! up: at a node they can reach any sidewalk touching it, including the one across their own
//! segment. Cyclists can get on or off the bike at any node.

use enumset::EnumSet;

use crate::network::{lane_point, LaneId, LaneType};
use crate::pathfind::expand::{GraphExpander, Traversal};
use crate::pathfind::open_set::{FrontierItem, OpenSet};
use crate::request::PathPosition;

impl<'a> GraphExpander<'a> {
    pub(crate) fn expand_walking(
        &mut self,
        item: &FrontierItem,
        trav: &Traversal,
        open: &mut OpenSet,
    ) {
        let graph = self.graph;
        if self.node_closed(trav.node) {
            return;
        }
        let walking = self.req.lane_types.contains(LaneType::Pedestrian);

        for segment in graph.node_segments(trav.node) {
            if self.segment_closed(*segment) {
                continue;
            }
            for m in graph.segment_lanes(*segment) {
                if *m == item.lane {
                    continue;
                }
                let lane = graph.lane(*m);
                // A cyclist rode up to this node, then walked the bike from here
                let ride = self.can_ride_bicycle(lane);
                if (walking && lane.lane_type == LaneType::Pedestrian) || ride {
                    self.add_mode_transition(item, trav, *m, open);
                }
            }
        }
    }

    /// A cyclist may have walked the bike up to the node, then started riding.
    pub(crate) fn expand_bicycle_dismount(
        &mut self,
        item: &FrontierItem,
        trav: &Traversal,
        open: &mut OpenSet,
    ) {
        let graph = self.graph;
        if self.node_closed(trav.node) {
            return;
        }
        for segment in graph.node_segments(trav.node) {
            if self.segment_closed(*segment) {
                continue;
            }
            for m in graph.segment_lanes(*segment) {
                if graph.lane(*m).lane_type == LaneType::Pedestrian {
                    self.add_mode_transition(item, trav, *m, open);
                }
            }
        }
    }

    fn add_mode_transition(
        &mut self,
        item: &FrontierItem,
        trav: &Traversal,
        m: LaneId,
        open: &mut OpenSet,
    ) {
        let graph = self.graph;
        let params = self.params;
        let lane = graph.lane(m);
        let segment = graph.segment(lane.segment);
        let exit_offset = segment.offset_at(trav.node);
        let into = segment.direction_into(trav.node);
        if !lane.allows(into) {
            return;
        }

        let distance = lane_point(graph, m, exit_offset).dist_to(trav.point) as f32;
        let from_type = graph.lane(item.lane).lane_type;
        let switching = from_type.is_vehicle() != lane.lane_type.is_vehicle();
        let method_distance = if switching {
            0.0
        } else {
            trav.method_distance + distance
        };
        if lane.lane_type == LaneType::Pedestrian
            && method_distance >= params.max_pedestrian_method_distance
        {
            return;
        }

        // Walkers and cyclists are slow, so halve the normalization.
        let norm = (trav.speed + self.speed(lane)) * 0.25 * self.req.max_length;
        let mut cost = item.comparison_value + (trav.length * trav.factor + distance) / norm;
        if lane.lane_type == LaneType::Pedestrian && !item.lanes_used.contains(LaneType::Pedestrian)
        {
            cost += params.walk_transition_penalty / norm;
        }
        cost += self.start_correction(lane, exit_offset, into);
        cost += self.blocked_penalty(lane);

        let new_item = FrontierItem {
            position: PathPosition::new(lane.segment, lane.index, exit_offset),
            comparison_value: cost,
            method_distance,
            lane: m,
            direction: EnumSet::only(into),
            lanes_used: item.lanes_used | lane.lane_type,
            segments_to_junction: item.segments_to_junction,
        };
        self.push(open, new_item, item.position);
    }
}
