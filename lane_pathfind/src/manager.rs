use std::sync::Arc;

use anyhow::Result;

use crate::config::RoutingParams;
use crate::network::NetworkGraph;
use crate::path_units::PathUnitPool;
use crate::policy::PolicyProviders;
use crate::request::PathRequest;
use crate::worker::{PathHandle, PathfindWorker};

/// Spreads requests over a fixed set of workers sharing one network and one path-unit pool.
pub struct PathManager {
    workers: Vec<PathfindWorker>,
    pool: Arc<PathUnitPool>,
}

impl PathManager {
    pub fn new(
        graph: Arc<dyn NetworkGraph>,
        policies: Arc<dyn PolicyProviders>,
        params: RoutingParams,
    ) -> Result<PathManager> {
        params.validate()?;
        let pool = Arc::new(PathUnitPool::new(params.path_unit_capacity));
        let num_workers = params.num_workers;
        let params = Arc::new(params);

        let mut workers = Vec::new();
        for id in 0..num_workers {
            workers.push(PathfindWorker::spawn(
                id,
                graph.clone(),
                policies.clone(),
                params.clone(),
                pool.clone(),
            )?);
        }
        info!(
            "Started {} pathfinding workers over {} lanes",
            num_workers,
            graph.lane_count()
        );
        Ok(PathManager { workers, pool })
    }

    /// Goes to whichever worker has the least to do.
    pub fn submit(&self, request: PathRequest) -> Result<PathHandle> {
        let worker = self
            .workers
            .iter()
            .min_by_key(|w| w.queue_len())
            .ok_or_else(|| anyhow!("no pathfinding workers"))?;
        worker.submit(request)
    }

    pub fn wait_for_all_paths(&self) {
        for worker in &self.workers {
            worker.wait_for_all_paths();
        }
    }

    pub fn failed_count(&self) -> usize {
        self.workers.iter().map(|w| w.failed_count()).sum()
    }

    pub fn queue_len(&self) -> usize {
        self.workers.iter().map(|w| w.queue_len()).sum()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn pool(&self) -> &Arc<PathUnitPool> {
        &self.pool
    }

    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.shutdown();
        }
        info!("Stopped {} pathfinding workers", self.workers.len());
        self.workers.clear();
    }
}

impl Drop for PathManager {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}
