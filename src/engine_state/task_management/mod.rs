//! # Task Management System
//!
//! This module provides the worker pool that runs chunk generation and mesh
//! generation off the main thread.
//!
//! ## Architecture Overview
//!
//! The task management system consists of several key components:
//! - `TaskManager`: Central coordinator for task distribution and worker management
//! - `Task`: A unit of work that can be executed asynchronously
//! - `TaskResult`: The outcome of a task, tagged with its lane and chunk
//! - `TaskChannel`: Communication channel between the main thread and one worker
//!
//! There are two lanes, one per [`TaskKind`]. Each lane has its own workers,
//! its own queue of tasks waiting for a free worker, and one MPSC result queue
//! shared by its workers.
//!
//! ## Task Lifecycle
//! 1. Tasks are created and published via `TaskManager::publish_task()`
//! 2. The manager distributes tasks to available worker channels using round-robin
//! 3. Workers process tasks and send back a `TaskResult`
//! 4. Results are collected on the main thread in `drain_completed()`, at most
//!    a caller-chosen number per lane and frame
//!
//! ## Cancellation
//! Every published task gets a cancel flag. `cancel()` raises it and forgets
//! the task: a queued task is dropped before it starts, a running task may
//! stop at its next checkpoint, and whatever it sends back is discarded.
//!
//! ## Inline Mode
//! A lane created with zero workers runs its tasks on the calling thread
//! inside `process_queued_tasks()`, a bounded number per call.

pub mod task;

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::engine_state::voxels::chunk::ChunkPos;
use task::{Task, TaskKind, TaskOutcome, TaskResult};

/// Maximum number of tasks that can be in flight per worker channel.
///
/// Keeping this at 1 leaves everything else in the lane queue, where it can
/// still be cancelled before it starts.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

/// A task plus the bookkeeping that travels with it.
struct Dispatch {
    task: Box<dyn Task>,
    ticket: u64,
    cancel: Arc<AtomicBool>,
}

/// A result plus the channel it came from.
struct Completion {
    channel: usize,
    ticket: u64,
    result: TaskResult,
}

/// A communication channel between the main thread and a worker thread.
///
/// Dropping the sender lets the worker leave its receive loop.
struct TaskChannel {
    task_sender: Option<Sender<Dispatch>>,
    num_tasks_in_flight: usize,
    worker: Option<JoinHandle<()>>,
}

/// Workers, queue and results of one task kind.
struct Lane {
    kind: TaskKind,
    channels: Vec<TaskChannel>,
    queued_tasks: VecDeque<Dispatch>,
    current_channel: usize,
    result_receiver: Receiver<Completion>,
    completed: VecDeque<Completion>,
    inline_budget: usize,
}

/// Manages the worker pool and coordinates task execution.
///
/// The `TaskManager` is responsible for:
/// - Creating and joining worker threads
/// - Distributing tasks across available workers
/// - Queuing tasks when all workers are busy
/// - Tracking pending tasks so the same chunk is never worked on twice
/// - Handing finished results back on the main thread
pub struct TaskManager {
    lanes: Vec<Lane>,
    pending: HashMap<(TaskKind, ChunkPos), (u64, Arc<AtomicBool>)>,
    next_ticket: u64,
}

impl TaskManager {
    /// Creates a new `TaskManager` with `threads_per_lane` workers on each lane.
    ///
    /// # Arguments
    /// * `threads_per_lane` - Workers per lane; zero runs tasks inline
    /// * `inline_budget` - Tasks run per lane and call of
    ///   `process_queued_tasks()` when a lane has no workers
    pub fn new(threads_per_lane: usize, inline_budget: usize) -> Self {
        info!(
            "Available parallelism: {:?}",
            thread::available_parallelism()
        );
        let lanes = TaskKind::ALL
            .into_iter()
            .map(|kind| Lane::new(kind, threads_per_lane, inline_budget.max(1)))
            .collect();

        TaskManager {
            lanes,
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was immediately scheduled on an available worker
    /// - `false` if it was queued, or dropped because the same lane already
    ///   has a pending task for that chunk
    pub fn publish_task(&mut self, task: Box<dyn Task>) -> bool {
        let pending_key = (task.kind(), task.key());
        if self.pending.contains_key(&pending_key) {
            debug!("Task {:?} already pending", pending_key);
            return false;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        self.pending.insert(pending_key, (ticket, cancel.clone()));

        let lane = &mut self.lanes[pending_key.0.index()];
        lane.publish(Dispatch {
            task,
            ticket,
            cancel,
        })
    }

    /// True if a task for this lane and chunk was published and not yet
    /// drained or cancelled.
    pub fn is_pending(&self, kind: TaskKind, key: ChunkPos) -> bool {
        self.pending.contains_key(&(kind, key))
    }

    /// Pending tasks of one lane.
    pub fn pending_count(&self, kind: TaskKind) -> usize {
        self.pending.keys().filter(|(lane, _)| *lane == kind).count()
    }

    /// Chunks with a pending task on one lane.
    pub fn pending_keys(&self, kind: TaskKind) -> Vec<ChunkPos> {
        let mut keys: Vec<ChunkPos> = self
            .pending
            .keys()
            .filter(|(lane, _)| *lane == kind)
            .map(|(_, key)| *key)
            .collect();
        keys.sort();
        keys
    }

    /// Cancels a pending task. Returns false if nothing was pending.
    pub fn cancel(&mut self, kind: TaskKind, key: ChunkPos) -> bool {
        match self.pending.remove(&(kind, key)) {
            Some((_, cancel)) => {
                cancel.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Changes how many tasks an inline lane runs per call.
    pub fn set_inline_budget(&mut self, inline_budget: usize) {
        for lane in &mut self.lanes {
            lane.inline_budget = inline_budget.max(1);
        }
    }

    /// Moves queued tasks onto idle workers, or runs them inline on lanes
    /// without workers.
    pub fn process_queued_tasks(&mut self) {
        for lane in &mut self.lanes {
            lane.process_queued_tasks();
        }
    }

    /// Returns up to `max` finished results of one lane, oldest first.
    ///
    /// Results of cancelled tasks are dropped here without counting against `max`.
    pub fn drain_completed(&mut self, kind: TaskKind, max: usize) -> Vec<TaskResult> {
        let lane = &mut self.lanes[kind.index()];
        lane.collect_results();

        let mut drained = Vec::new();
        while drained.len() < max {
            let Some(completion) = lane.completed.pop_front() else {
                break;
            };
            let pending_key = (completion.result.kind, completion.result.key);
            match self.pending.get(&pending_key) {
                Some((ticket, _)) if *ticket == completion.ticket => {
                    self.pending.remove(&pending_key);
                    drained.push(completion.result);
                }
                _ => debug!("Discarding result of cancelled task {:?}", pending_key),
            }
        }
        drained
    }

    /// Cancels everything, lets running tasks finish and joins all workers.
    pub fn shutdown(&mut self) {
        for (_, (_, cancel)) in self.pending.drain() {
            cancel.store(true, Ordering::Relaxed);
        }
        for lane in &mut self.lanes {
            lane.shutdown();
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Lane {
    fn new(kind: TaskKind, num_workers: usize, inline_budget: usize) -> Self {
        let (result_tx, result_rx) = channel::<Completion>();
        let mut channels = Vec::with_capacity(num_workers);

        for index in 0..num_workers {
            let (task_tx, task_rx) = channel::<Dispatch>();
            let result_tx = result_tx.clone();

            let task_closure = move || {
                while let Ok(dispatch) = task_rx.recv() {
                    let completion = Completion {
                        channel: index,
                        ticket: dispatch.ticket,
                        result: run_task(dispatch.task.as_ref(), &dispatch.cancel),
                    };
                    if result_tx.send(completion).is_err() {
                        break;
                    }
                }
            };

            let name = format!("{:?}-{}", kind, index);
            match thread::Builder::new().name(name).spawn(task_closure) {
                Ok(worker) => channels.push(TaskChannel {
                    task_sender: Some(task_tx),
                    num_tasks_in_flight: 0,
                    worker: Some(worker),
                }),
                Err(err) => {
                    error!("Failed to spawn {:?} worker {}: {}", kind, index, err);
                    break;
                }
            }
        }
        if channels.is_empty() {
            info!("{:?} lane runs inline", kind);
        } else {
            info!("{:?} lane started with {} workers", kind, channels.len());
        }

        Lane {
            kind,
            channels,
            queued_tasks: VecDeque::new(),
            current_channel: 0,
            result_receiver: result_rx,
            completed: VecDeque::new(),
            inline_budget,
        }
    }

    fn publish(&mut self, dispatch: Dispatch) -> bool {
        if self.channels.is_empty() {
            self.queued_tasks.push_back(dispatch);
            return false;
        }

        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(dispatch, channel_idx) {
                Ok(()) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                    true
                }
                Err(dispatch) => {
                    self.queued_tasks.push_back(dispatch);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(dispatch);
                false
            }
        }
    }

    /// Sends a task to one worker, handing it back if the worker is gone.
    fn try_send_task(&mut self, dispatch: Dispatch, channel_idx: usize) -> Result<(), Dispatch> {
        let channel = &mut self.channels[channel_idx];
        let Some(sender) = channel.task_sender.as_ref() else {
            return Err(dispatch);
        };
        match sender.send(dispatch) {
            Ok(()) => {
                channel.num_tasks_in_flight += 1;
                Ok(())
            }
            Err(err) => Err(err.0),
        }
    }

    /// Round-robin search for a channel below `MAX_TASKS_IN_FLIGHT`.
    fn find_available_channel(&self) -> Option<usize> {
        if self.channels.is_empty() {
            return None;
        }
        let count = self.channels.len();
        (0..count)
            .map(|offset| (self.current_channel + offset) % count)
            .find(|index| {
                let channel = &self.channels[*index];
                channel.task_sender.is_some() && channel.num_tasks_in_flight < MAX_TASKS_IN_FLIGHT
            })
    }

    fn process_queued_tasks(&mut self) {
        if self.channels.is_empty() {
            self.run_inline();
            return;
        }

        while let Some(channel_idx) = self.find_available_channel() {
            let Some(dispatch) = self.queued_tasks.pop_front() else {
                break;
            };
            if dispatch.cancel.load(Ordering::Relaxed) {
                continue;
            }
            match self.try_send_task(dispatch, channel_idx) {
                Ok(()) => self.current_channel = (channel_idx + 1) % self.channels.len(),
                Err(dispatch) => {
                    warn!("{:?} worker {} disconnected", self.kind, channel_idx);
                    self.channels[channel_idx].task_sender = None;
                    self.queued_tasks.push_front(dispatch);
                }
            }
        }
    }

    fn run_inline(&mut self) {
        let mut ran = 0;
        while ran < self.inline_budget {
            let Some(dispatch) = self.queued_tasks.pop_front() else {
                break;
            };
            if dispatch.cancel.load(Ordering::Relaxed) {
                continue;
            }
            self.completed.push_back(Completion {
                channel: usize::MAX,
                ticket: dispatch.ticket,
                result: run_task(dispatch.task.as_ref(), &dispatch.cancel),
            });
            ran += 1;
        }
    }

    fn collect_results(&mut self) {
        while let Ok(completion) = self.result_receiver.try_recv() {
            if let Some(channel) = self.channels.get_mut(completion.channel) {
                channel.num_tasks_in_flight = channel.num_tasks_in_flight.saturating_sub(1);
            }
            self.completed.push_back(completion);
        }
    }

    fn shutdown(&mut self) {
        self.queued_tasks.clear();
        for channel in &mut self.channels {
            channel.task_sender = None;
        }
        for channel in &mut self.channels {
            if let Some(worker) = channel.worker.take() {
                if worker.join().is_err() {
                    error!("{:?} worker panicked outside a task", self.kind);
                }
            }
        }
        while self.result_receiver.try_recv().is_ok() {}
        self.completed.clear();
    }
}

/// Runs one task, turning a panic into [`TaskOutcome::Failed`].
fn run_task(task: &dyn Task, cancel: &AtomicBool) -> TaskResult {
    let kind = task.kind();
    let key = task.key();
    let outcome = if cancel.load(Ordering::Relaxed) {
        TaskOutcome::Cancelled
    } else {
        match catch_unwind(AssertUnwindSafe(|| task.process(cancel))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|message| message.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                TaskOutcome::Failed(format!("task panicked: {}", message))
            }
        }
    };
    TaskResult { kind, key, outcome }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::engine_state::{
        rendering::meshing::ChunkMesh,
        task_management::task::TaskOutput,
    };

    struct EchoTask {
        key: ChunkPos,
        panic: bool,
    }

    impl Task for EchoTask {
        fn kind(&self) -> TaskKind {
            TaskKind::MeshGeneration
        }

        fn key(&self) -> ChunkPos {
            self.key
        }

        fn process(&self, _cancel: &AtomicBool) -> TaskOutcome {
            if self.panic {
                panic!("boom");
            }
            TaskOutcome::Completed(TaskOutput::Mesh(Box::new(ChunkMesh::new(self.key, 7))))
        }
    }

    fn echo(x: i32) -> Box<dyn Task> {
        Box::new(EchoTask {
            key: ChunkPos::new(x, 0),
            panic: false,
        })
    }

    fn drain_all(manager: &mut TaskManager, expected: usize) -> Vec<TaskResult> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut results = Vec::new();
        while results.len() < expected && Instant::now() < deadline {
            manager.process_queued_tasks();
            results.extend(manager.drain_completed(TaskKind::MeshGeneration, usize::MAX));
            thread::sleep(Duration::from_millis(1));
        }
        results
    }

    #[test]
    fn threaded_lane_completes_every_task() {
        let mut manager = TaskManager::new(2, 4);
        for x in 0..10 {
            manager.publish_task(echo(x));
        }
        assert!(!manager.publish_task(echo(3)));
        let results = drain_all(&mut manager, 10);
        assert_eq!(results.len(), 10);
        assert_eq!(manager.pending_count(TaskKind::MeshGeneration), 0);
        manager.shutdown();
    }

    #[test]
    fn inline_lane_respects_its_budget() {
        let mut manager = TaskManager::new(0, 2);
        for x in 0..5 {
            manager.publish_task(echo(x));
        }
        manager.process_queued_tasks();
        let first = manager.drain_completed(TaskKind::MeshGeneration, usize::MAX);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].key, ChunkPos::new(0, 0));
        assert_eq!(manager.pending_count(TaskKind::MeshGeneration), 3);
    }

    #[test]
    fn drain_cap_leaves_the_rest_for_later() {
        let mut manager = TaskManager::new(0, 10);
        for x in 0..5 {
            manager.publish_task(echo(x));
        }
        manager.process_queued_tasks();
        assert_eq!(manager.drain_completed(TaskKind::MeshGeneration, 3).len(), 3);
        assert_eq!(manager.drain_completed(TaskKind::MeshGeneration, 3).len(), 2);
    }

    #[test]
    fn cancelled_tasks_never_surface() {
        let mut manager = TaskManager::new(0, 10);
        manager.publish_task(echo(1));
        manager.publish_task(echo(2));
        assert!(manager.cancel(TaskKind::MeshGeneration, ChunkPos::new(1, 0)));
        assert!(!manager.is_pending(TaskKind::MeshGeneration, ChunkPos::new(1, 0)));
        manager.process_queued_tasks();
        let results = manager.drain_completed(TaskKind::MeshGeneration, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, ChunkPos::new(2, 0));

        // Republishing after a cancel starts a fresh task.
        assert!(!manager.publish_task(echo(1)));
        manager.process_queued_tasks();
        assert_eq!(manager.drain_completed(TaskKind::MeshGeneration, 10).len(), 1);
    }

    #[test]
    fn panics_become_failures() {
        let mut manager = TaskManager::new(1, 1);
        manager.publish_task(Box::new(EchoTask {
            key: ChunkPos::new(0, 0),
            panic: true,
        }));
        let results = drain_all(&mut manager, 1);
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0].outcome, TaskOutcome::Failed(message) if message.contains("boom")));

        // The worker survives the panic.
        manager.publish_task(echo(5));
        assert_eq!(drain_all(&mut manager, 1).len(), 1);
    }
}
