//! Builds or loads a network, runs a batch of random requests through a pool of pathfinding
//! workers, and reports how it went.

#[macro_use]
extern crate log;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use structopt::StructOpt;

use lane_pathfind::{
    Lane, LaneType, NetworkGraph, PathManager, PathPosition, PathRequest, PathState,
    PolicyProviders, RoadNetwork, RoutingParams, StaticPolicies, TravelDirection,
};

#[derive(StructOpt)]
#[structopt(
    name = "benchmark_pathfinding",
    about = "Measures lane-level pathfinding throughput"
)]
enum Command {
    /// Generates a grid of two-way streets with one highway row
    Grid {
        #[structopt(long, default_value = "10")]
        rows: usize,
        #[structopt(long, default_value = "10")]
        cols: usize,
        /// Lanes per direction on every street
        #[structopt(long, default_value = "2")]
        lanes: usize,
        /// How many random requests to calculate
        #[structopt(long, default_value = "1000")]
        requests: usize,
        /// A seed for generating random numbers
        #[structopt(long, default_value = "42")]
        rng_seed: u64,
        /// JSON file overriding routing parameters
        #[structopt(long)]
        config: Option<String>,
        /// Also write the generated network here as JSON
        #[structopt(long)]
        save_network: Option<String>,
    },
    /// Uses a network previously saved as JSON
    Network {
        /// The path to a JSON network
        #[structopt(long)]
        input: String,
        /// JSON file with speed limits, arrows, turn bans, and so on
        #[structopt(long)]
        policies: Option<String>,
        /// JSON file overriding routing parameters
        #[structopt(long)]
        config: Option<String>,
        #[structopt(long, default_value = "1000")]
        requests: usize,
        #[structopt(long, default_value = "42")]
        rng_seed: u64,
    },
}

fn main() -> Result<()> {
    {
        use env_logger::{Builder, Env};
        Builder::from_env(Env::default().default_filter_or("info")).init();
    }

    match Command::from_args() {
        Command::Grid {
            rows,
            cols,
            lanes,
            requests,
            rng_seed,
            config,
            save_network,
        } => {
            if rows < 2 || cols < 2 || lanes == 0 {
                bail!("need at least a 2x2 grid with one lane per direction");
            }
            let net = RoadNetwork::grid(rows, cols, 100.0, lanes);
            if let Some(path) = save_network {
                net.save(&path)?;
            }
            let policies = highway_row(&net, rows / 2);
            run(net, policies, load_params(config)?, requests, rng_seed)
        }
        Command::Network {
            input,
            policies,
            config,
            requests,
            rng_seed,
        } => {
            let net = RoadNetwork::load(&input)?;
            let policies = match policies {
                Some(path) => StaticPolicies::load(&path)?,
                None => StaticPolicies::new(),
            };
            run(net, policies, load_params(config)?, requests, rng_seed)
        }
    }
}

fn load_params(path: Option<String>) -> Result<RoutingParams> {
    match path {
        Some(path) => RoutingParams::load(&path),
        None => Ok(RoutingParams::default()),
    }
}

/// Marks the horizontal streets of one row as highway.
fn highway_row(net: &RoadNetwork, row: usize) -> StaticPolicies {
    let mut policies = StaticPolicies::new();
    let y = row as f64 * 100.0;
    for segment in net.all_segments() {
        let start = net.node(segment.start_node).position;
        let end = net.node(segment.end_node).position;
        if start.y() == y && end.y() == y {
            policies.mark_highway(segment.id);
        }
    }
    policies
}

/// Where a trip on this lane could start and end, following its direction of travel.
fn endpoints(lane: &Lane) -> (u8, u8) {
    if lane.allows(TravelDirection::Forward) {
        (0, 255)
    } else {
        (255, 0)
    }
}

fn random_requests(net: &RoadNetwork, count: usize, rng: &mut XorShiftRng) -> Vec<PathRequest> {
    let driving: Vec<&Lane> = net
        .all_lanes()
        .iter()
        .filter(|l| l.lane_type == LaneType::Vehicle)
        .collect();
    let walking: Vec<&Lane> = net
        .all_lanes()
        .iter()
        .filter(|l| l.lane_type == LaneType::Pedestrian)
        .collect();

    let mut requests = Vec::new();
    for _ in 0..count {
        // Mostly drivers, some pedestrians
        let lanes = if walking.is_empty() || rng.gen_bool(0.8) {
            &driving
        } else {
            &walking
        };
        let (from, to) = match (lanes.choose(rng), lanes.choose(rng)) {
            (Some(from), Some(to)) => (*from, *to),
            _ => break,
        };
        let start = PathPosition::new(from.segment, from.index, endpoints(from).0);
        let end = PathPosition::new(to.segment, to.index, endpoints(to).1);
        let req = if from.lane_type == LaneType::Pedestrian {
            PathRequest::walking(start, end)
        } else {
            PathRequest::driving(start, end)
        };
        requests.push(req.with_seed(rng.gen()));
    }
    requests
}

fn run(
    net: RoadNetwork,
    policies: StaticPolicies,
    params: RoutingParams,
    num_requests: usize,
    rng_seed: u64,
) -> Result<()> {
    net.validate()?;
    let mut rng = XorShiftRng::seed_from_u64(rng_seed);
    let requests = random_requests(&net, num_requests, &mut rng);
    info!(
        "Network has {} nodes, {} segments, {} lanes; calculating {} paths",
        net.all_nodes().len(),
        net.all_segments().len(),
        net.lane_count(),
        requests.len()
    );

    let graph: Arc<dyn NetworkGraph> = Arc::new(net);
    let policies: Arc<dyn PolicyProviders> = Arc::new(policies);
    let mut manager = PathManager::new(graph, policies, params)?;

    let started = Instant::now();
    let mut handles = Vec::new();
    for req in requests {
        handles.push(manager.submit(req)?);
    }
    manager.wait_for_all_paths();
    let elapsed = started.elapsed();

    let mut succeeded = 0;
    let mut blocked = 0;
    let mut positions = 0;
    let mut length = 0.0;
    let mut failures: Vec<String> = Vec::new();
    for handle in &handles {
        match handle.state() {
            PathState::Succeeded(result) => {
                succeeded += 1;
                positions += result.position_count;
                length += f64::from(result.total_length);
                if result.blocked {
                    blocked += 1;
                }
            }
            PathState::Failed(failure) => failures.push(failure.to_string()),
            other => warn!("{} still {:?} after waiting", handle.request(), other),
        }
        handle.release();
    }
    failures.sort();
    failures.dedup();

    println!(
        "{} paths in {:.2}s ({:.0}/s) over {} workers",
        handles.len(),
        elapsed.as_secs_f64(),
        handles.len() as f64 / elapsed.as_secs_f64().max(1e-9),
        manager.num_workers()
    );
    println!(
        "{} succeeded ({} blocked), {} failed",
        succeeded,
        blocked,
        manager.failed_count()
    );
    if succeeded > 0 {
        println!(
            "Average path: {:.1} positions, cost {:.0}",
            positions as f64 / succeeded as f64,
            length / succeeded as f64
        );
    }
    if !failures.is_empty() {
        println!("Failure reasons: {}", failures.join(", "));
    }
    if manager.pool().in_use() != 0 {
        warn!("{} path units leaked", manager.pool().in_use());
    }

    manager.shutdown();
    Ok(())
}
