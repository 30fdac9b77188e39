use crate::error::PathFailure;
use crate::network::NetworkGraph;
use crate::pathfind::open_set::{FrontierItem, OpenSet};
use crate::request::{PathPosition, PathRequest};

/// Walks the per-lane targets from the item that reached a start lane to an end position. The
/// positions come out in travel order, beginning at the start offset, or at the vehicle when it's
/// somewhere else.
pub fn reconstruct(
    open: &OpenSet,
    graph: &dyn NetworkGraph,
    req: &PathRequest,
    found: &FrontierItem,
) -> Result<Vec<PathPosition>, PathFailure> {
    let mut positions = Vec::new();
    if let Some(pos) = req.vehicle_position {
        if pos != found.position {
            positions.push(pos);
        }
    }
    if let Some(start) = req.starts().find(|s| s.lane(graph) == Some(found.lane)) {
        if start != found.position && positions.last() != Some(&start) {
            positions.push(start);
        }
    }

    let mut current = found.position;
    // Lanes are visited at most once, so anything longer is a loop.
    for _ in 0..=graph.lane_count() {
        positions.push(current);
        if req.is_end(current) {
            return Ok(positions);
        }
        let lane = match current.lane(graph) {
            Some(l) => l,
            None => {
                error!("{} on the way to {} isn't a lane", current, req);
                return Err(PathFailure::CorruptChain);
            }
        };
        let next = match open.target(lane) {
            Some(pos) => pos,
            None => {
                error!("The search never reached {} for {}", current, req);
                return Err(PathFailure::CorruptChain);
            }
        };
        if next == current {
            break;
        }
        current = next;
    }
    error!(
        "Lane targets for {} don't lead to an end; gave up at {}",
        req, current
    );
    Err(PathFailure::CorruptChain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LaneId, RoadNetwork, SegmentId};

    fn item_at(net: &RoadNetwork, pos: PathPosition) -> FrontierItem {
        FrontierItem {
            position: pos,
            lane: pos.lane(net).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn follows_targets_to_the_end() {
        let net = RoadNetwork::grid(1, 4, 100.0, 1);
        let a = PathPosition::new(SegmentId(0), 2, 255);
        let b = PathPosition::new(SegmentId(1), 2, 255);
        let end = PathPosition::new(SegmentId(2), 2, 100);
        let start = PathPosition::new(SegmentId(0), 2, 0);
        let req = crate::request::PathRequest::driving(start, end);

        let mut open = OpenSet::new(net.lane_count());
        open.begin_search(net.lane_count());
        open.push(item_at(&net, end), end);
        open.push(item_at(&net, b), end);
        open.push(item_at(&net, a), b);

        assert_eq!(
            reconstruct(&open, &net, &req, &item_at(&net, a)),
            Ok(vec![start, a, b, end])
        );

        let vehicle = PathPosition::new(SegmentId(0), 1, 30);
        let req = req.with_vehicle_position(vehicle);
        assert_eq!(
            reconstruct(&open, &net, &req, &item_at(&net, a)),
            Ok(vec![vehicle, start, a, b, end])
        );
    }

    #[test]
    fn loops_are_corrupt() {
        let net = RoadNetwork::grid(1, 4, 100.0, 1);
        let a = PathPosition::new(SegmentId(0), 2, 255);
        let b = PathPosition::new(SegmentId(1), 2, 255);
        let end = PathPosition::new(SegmentId(2), 2, 100);
        let req = crate::request::PathRequest::driving(a, end);

        let mut open = OpenSet::new(net.lane_count());
        open.begin_search(net.lane_count());
        open.push(item_at(&net, a), b);
        open.push(item_at(&net, b), a);
        assert_eq!(
            reconstruct(&open, &net, &req, &item_at(&net, a)),
            Err(PathFailure::CorruptChain)
        );

        // A lane the search never reached
        let stray = item_at(&net, PathPosition::new(SegmentId(1), 1, 0));
        assert_eq!(stray.lane, LaneId(5));
        assert_eq!(
            reconstruct(&open, &net, &req, &stray),
            Err(PathFailure::CorruptChain)
        );
    }
}
