//! A background thread that takes requests off a queue and runs them one at a time.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

use crate::config::RoutingParams;
use crate::error::PathFailure;
use crate::network::NetworkGraph;
use crate::path_units::PathUnitPool;
use crate::pathfind::Pathfinder;
use crate::policy::PolicyProviders;
use crate::request::{PathFlag, PathPosition, PathRequest, PathResult};

#[derive(Clone, Debug, PartialEq)]
pub enum PathState {
    Queued,
    Calculating,
    Succeeded(PathResult),
    Failed(PathFailure),
    /// The caller is done with the path; its units went back to the pool.
    Released,
}

impl PathState {
    pub fn is_done(&self) -> bool {
        !matches!(self, PathState::Queued | PathState::Calculating)
    }
}

struct Job {
    request: PathRequest,
    state: Mutex<PathState>,
    changed: Condvar,
}

impl Job {
    fn set(&self, state: PathState) {
        *self.state.lock().unwrap() = state;
        self.changed.notify_all();
    }
}

/// The caller's side of a submitted request.
#[derive(Clone)]
pub struct PathHandle {
    job: Arc<Job>,
    pool: Arc<PathUnitPool>,
}

impl PathHandle {
    pub fn request(&self) -> &PathRequest {
        &self.job.request
    }

    pub fn state(&self) -> PathState {
        self.job.state.lock().unwrap().clone()
    }

    /// Blocks until the request succeeds or fails.
    pub fn wait(&self) -> PathState {
        let mut state = self.job.state.lock().unwrap();
        while !state.is_done() {
            state = self.job.changed.wait(state).unwrap();
        }
        state.clone()
    }

    /// The path's positions, if it succeeded and hasn't been released.
    pub fn positions(&self) -> Option<Vec<PathPosition>> {
        match self.state() {
            PathState::Succeeded(result) => Some(self.pool.positions(result.chain)),
            _ => None,
        }
    }

    /// Returns a finished path's units to the pool. Does nothing before the request is done.
    pub fn release(&self) {
        let mut state = self.job.state.lock().unwrap();
        if !state.is_done() {
            return;
        }
        if let PathState::Succeeded(result) = &*state {
            self.pool.release(result.chain);
        }
        *state = PathState::Released;
    }
}

struct QueueState {
    queue: VecDeque<Arc<Job>>,
    calculating: bool,
    terminated: bool,
}

impl QueueState {
    fn enqueue(&mut self, job: Arc<Job>) {
        if job.request.has(PathFlag::SkipQueue) {
            self.queue.push_front(job);
        } else {
            self.queue.push_back(job);
        }
    }

    fn is_drained(&self) -> bool {
        self.queue.is_empty() && !self.calculating
    }
}

struct Shared {
    state: Mutex<QueueState>,
    work_available: Condvar,
    drained: Condvar,
    failed: AtomicUsize,
}

pub struct PathfindWorker {
    id: usize,
    shared: Arc<Shared>,
    graph: Arc<dyn NetworkGraph>,
    pool: Arc<PathUnitPool>,
    thread: Option<JoinHandle<()>>,
}

impl PathfindWorker {
    pub fn spawn(
        id: usize,
        graph: Arc<dyn NetworkGraph>,
        policies: Arc<dyn PolicyProviders>,
        params: Arc<RoutingParams>,
        pool: Arc<PathUnitPool>,
    ) -> Result<PathfindWorker> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                calculating: false,
                terminated: false,
            }),
            work_available: Condvar::new(),
            drained: Condvar::new(),
            failed: AtomicUsize::new(0),
        });

        let thread = {
            let shared = shared.clone();
            let graph = graph.clone();
            let pool = pool.clone();
            thread::Builder::new()
                .name(format!("pathfind-{}", id))
                .spawn(move || run(shared, graph, policies, params, pool))
                .with_context(|| format!("couldn't start pathfinding worker {}", id))?
        };

        Ok(PathfindWorker {
            id,
            shared,
            graph,
            pool,
            thread: Some(thread),
        })
    }

    pub fn submit(&self, request: PathRequest) -> Result<PathHandle> {
        request.validate(self.graph.as_ref())?;
        let job = Arc::new(Job {
            request,
            state: Mutex::new(PathState::Queued),
            changed: Condvar::new(),
        });

        let mut state = self.shared.state.lock().unwrap();
        if state.terminated {
            bail!("pathfinding worker {} has shut down", self.id);
        }
        state.enqueue(job.clone());
        self.shared.work_available.notify_one();

        Ok(PathHandle {
            job,
            pool: self.pool.clone(),
        })
    }

    /// Requests waiting or being calculated
    pub fn queue_len(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state.queue.len() + usize::from(state.calculating)
    }

    pub fn failed_count(&self) -> usize {
        self.shared.failed.load(Ordering::SeqCst)
    }

    /// Blocks until nothing is queued or being calculated.
    pub fn wait_for_all_paths(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while !state.is_drained() && !state.terminated {
            state = self.shared.drained.wait(state).unwrap();
        }
    }

    /// Finishes the current request, fails anything still queued, and joins the thread.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.terminated = true;
            self.shared.work_available.notify_all();
            self.shared.drained.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Pathfinding worker {} died", self.id);
            }
        }
    }
}

impl Drop for PathfindWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    shared: Arc<Shared>,
    graph: Arc<dyn NetworkGraph>,
    policies: Arc<dyn PolicyProviders>,
    params: Arc<RoutingParams>,
    pool: Arc<PathUnitPool>,
) {
    let mut pathfinder = Pathfinder::new(graph.lane_count());
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            while state.queue.is_empty() && !state.terminated {
                state = shared.work_available.wait(state).unwrap();
            }
            if state.terminated {
                for job in state.queue.drain(..) {
                    job.set(PathState::Failed(PathFailure::Terminated));
                }
                shared.drained.notify_all();
                return;
            }
            match state.queue.pop_front() {
                Some(job) => {
                    state.calculating = true;
                    job
                }
                None => continue,
            }
        };

        job.set(PathState::Calculating);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pathfinder.calculate(
                graph.as_ref(),
                policies.as_ref(),
                &params,
                &job.request,
                &pool,
            )
        }));
        let result = match outcome {
            Ok(Ok(result)) => PathState::Succeeded(result),
            Ok(Err(failure)) => {
                shared.failed.fetch_add(1, Ordering::SeqCst);
                PathState::Failed(failure)
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!("Pathfinding for {} panicked: {}", job.request, msg);
                shared.failed.fetch_add(1, Ordering::SeqCst);
                PathState::Failed(PathFailure::Panicked(msg))
            }
        };
        job.set(result);

        let mut state = shared.state.lock().unwrap();
        state.calculating = false;
        if state.queue.is_empty() {
            shared.drained.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
