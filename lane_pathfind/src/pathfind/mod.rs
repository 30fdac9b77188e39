//! Lane-level search. The open set orders frontier items, the expander generates them, and
//! reconstruction turns the winning item into a chain of positions.

pub use self::expand::GraphExpander;
pub use self::lane_matching::{lateral_shift, similar_lane_range, LaneRange};
pub use self::open_set::{FrontierItem, OpenSet, PushOutcome, BUCKET_CAPACITY, NUM_BUCKETS};
pub use self::reconstruct::reconstruct;

use crate::config::RoutingParams;
use crate::error::PathFailure;
use crate::network::NetworkGraph;
use crate::path_units::PathUnitPool;
use crate::policy::PolicyProviders;
use crate::request::{PathRequest, PathResult};

mod expand;
mod lane_matching;
mod open_set;
mod pedestrian;
mod reconstruct;

/// Owns the per-search tables, so one Pathfinder serves one thread, reused across requests.
pub struct Pathfinder {
    open: OpenSet,
}

impl Pathfinder {
    pub fn new(lane_count: usize) -> Pathfinder {
        Pathfinder {
            open: OpenSet::new(lane_count),
        }
    }

    /// Runs one search to completion and stores the path in the pool.
    pub fn calculate(
        &mut self,
        graph: &dyn NetworkGraph,
        policies: &dyn PolicyProviders,
        params: &RoutingParams,
        req: &PathRequest,
        pool: &PathUnitPool,
    ) -> Result<PathResult, PathFailure> {
        self.open.begin_search(graph.lane_count());
        let mut expander = GraphExpander::new(graph, policies, params, req);
        expander.seed(&mut self.open);

        let mut found = None;
        while let Some(item) = self.open.pop() {
            expander.stats.items_popped += 1;
            if expander.reaches_start(&item) {
                found = Some(item);
                break;
            }
            expander.expand(&item, &mut self.open);
        }

        let stats = expander.stats;
        let found = match found {
            Some(item) => item,
            None => {
                debug!(
                    "No path for {} after popping {} items ({} dropped)",
                    req, stats.items_popped, stats.items_dropped
                );
                return Err(PathFailure::NoPath);
            }
        };

        let positions = reconstruct(&self.open, graph, req, &found)?;
        let total_length = expander.final_cost(&found) * req.max_length;
        let chain = pool.store_chain(&positions, total_length)?;
        debug!(
            "{}: {} positions, length {:.1}, {} items popped",
            req,
            positions.len(),
            total_length,
            stats.items_popped
        );

        Ok(PathResult {
            chain,
            total_length,
            position_count: positions.len(),
            blocked: expander.path_blocked(&positions),
            stats,
        })
    }

    /// The tables from the most recent search
    pub fn open_set(&self) -> &OpenSet {
        &self.open
    }
}
