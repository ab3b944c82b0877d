//! Parallel path enumeration
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │  work queue: root's children │
//!                 └──────────────┬───────────────┘
//!          ┌─────────────────────┼─────────────────────┐
//!    ┌─────▼─────┐         ┌─────▼─────┐         ┌─────▼─────┐
//!    │ Worker 1  │         │ Worker 2  │         │ Worker N  │
//!    │ DFS stack │         │ DFS stack │         │ DFS stack │
//!    └─────┬─────┘         └─────┬─────┘         └─────┬─────┘
//!          └─────────────────────┼─────────────────────┘
//!                    ┌───────────▼───────────┐
//!                    │ bounded path channel  │
//!                    └───────────┬───────────┘
//!                          caller's sink
//! ```
//!
//! Each worker takes one child of the root at a time and walks that whole
//! subtree itself, so concurrency is bounded by the pool size no matter how
//! large the namespace is. The sink runs on the calling thread. Workers block
//! when the path channel is full; when the last worker exits the channel
//! closes and the sink loop ends.

mod subtree;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::WalkError;
use crate::namespace::{DirectoryIndex, InodeIndex};
use crate::ROOT_INODE_ID;
use subtree::SubtreeWalk;

/// Default capacity of the path channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Shared stop signal for a walk (Ctrl-C handlers, sink failures, timeouts)
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Walk configuration
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Inode the walk starts from; never emitted as a path segment
    pub root_id: u64,
    /// Worker threads (capped at the root's fan-out)
    pub workers: usize,
    /// Paths buffered between workers and the sink
    pub channel_capacity: usize,
    /// Give up after this long
    pub timeout: Option<Duration>,
    pub cancel: CancelFlag,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            root_id: ROOT_INODE_ID,
            workers: default_workers(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            timeout: None,
            cancel: CancelFlag::new(),
        }
    }
}

/// Available parallelism, or 4 when it can't be determined
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Counters from a walk, summed over every task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Paths sent to the sink
    pub paths: u64,
    /// Child ids with no INODE record (emitted with an empty segment)
    pub unresolved_ids: u64,
    /// Children skipped because they were already an ancestor
    pub cycles_skipped: u64,
    /// Top-level subtrees walked
    pub subtrees: u64,
}

impl WalkStats {
    pub fn merge(&mut self, other: WalkStats) {
        self.paths += other.paths;
        self.unresolved_ids += other.unresolved_ids;
        self.cycles_skipped += other.cycles_skipped;
        self.subtrees += other.subtrees;
    }
}

/// Result of a finished walk
#[derive(Debug, Clone)]
pub struct WalkSummary {
    pub stats: WalkStats,
    /// Workers actually started
    pub workers: usize,
    /// False when the walk was cancelled or timed out
    pub completed: bool,
    pub duration: Duration,
}

/// Enumerates every leaf path below the root
pub struct TreeWalker<'a> {
    inodes: &'a InodeIndex,
    directories: &'a DirectoryIndex,
    config: WalkConfig,
}

impl<'a> TreeWalker<'a> {
    pub fn new(inodes: &'a InodeIndex, directories: &'a DirectoryIndex, config: WalkConfig) -> Self {
        Self {
            inodes,
            directories,
            config,
        }
    }

    /// Run the walk, handing each path to `sink` on the calling thread
    ///
    /// If `sink` fails the walk is cancelled, every worker is joined, and the
    /// sink's error is returned.
    pub fn walk<F>(&self, mut sink: F) -> Result<WalkSummary, WalkError>
    where
        F: FnMut(&[u8]) -> std::io::Result<()>,
    {
        let start = Instant::now();
        let cancel = &self.config.cancel;
        let root_children = self.directories.children(self.config.root_id).unwrap_or(&[]);

        if root_children.is_empty() {
            info!("Root {} has no children", self.config.root_id);
            let mut stats = WalkStats::default();
            if !cancel.is_cancelled() {
                sink(&b"/"[..]).map_err(WalkError::Sink)?;
                stats.paths = 1;
            }
            return Ok(WalkSummary {
                stats,
                workers: 0,
                completed: !cancel.is_cancelled(),
                duration: start.elapsed(),
            });
        }

        let workers = self.config.workers.clamp(1, root_children.len());
        info!(
            root = self.config.root_id,
            subtrees = root_children.len(),
            workers = workers,
            "Starting namespace walk"
        );

        let (work_tx, work_rx) = unbounded::<u64>();
        for &child in root_children {
            if work_tx.send(child).is_err() {
                break;
            }
        }
        drop(work_tx);

        let (path_tx, path_rx) = bounded::<Vec<u8>>(self.config.channel_capacity.max(1));
        let context = SubtreeWalk {
            root_id: self.config.root_id,
            inodes: self.inodes,
            directories: self.directories,
            cancel,
            deadline: self.config.timeout.map(|t| start + t),
        };

        let (stats, sink_error, panicked) = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let work_rx = work_rx.clone();
                    let path_tx = path_tx.clone();
                    let context = &context;
                    scope.spawn(move || run_worker(id, context, work_rx, path_tx))
                })
                .collect();

            // Workers now hold the only senders
            drop(path_tx);

            let mut sink_error = None;
            for path in path_rx.iter() {
                if let Err(e) = sink(path.as_slice()) {
                    cancel.cancel();
                    sink_error = Some(e);
                    break;
                }
            }
            // Unblocks any worker waiting on a full channel
            drop(path_rx);

            let mut stats = WalkStats::default();
            let mut panicked = None;
            for (id, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(worker_stats) => stats.merge(worker_stats),
                    Err(_) => panicked = Some(id),
                }
            }
            (stats, sink_error, panicked)
        });

        if let Some(e) = sink_error {
            return Err(WalkError::Sink(e));
        }
        if let Some(id) = panicked {
            return Err(WalkError::WorkerPanicked(id));
        }

        let completed = !cancel.is_cancelled();
        let duration = start.elapsed();

        if stats.unresolved_ids > 0 {
            warn!(
                "⚠️  {} child ids had no INODE record; their paths contain an empty segment",
                stats.unresolved_ids
            );
        }
        if stats.cycles_skipped > 0 {
            warn!("⚠️  {} cyclic directory links skipped", stats.cycles_skipped);
        }
        if !completed {
            warn!("Walk stopped before visiting every subtree");
        }

        info!(
            paths = stats.paths,
            subtrees = stats.subtrees,
            duration_ms = duration.as_millis() as u64,
            "Walk finished"
        );

        Ok(WalkSummary {
            stats,
            workers,
            completed,
            duration,
        })
    }

    /// Collect every path into memory (small namespaces and tests)
    pub fn collect_paths(&self) -> Result<(Vec<String>, WalkSummary), WalkError> {
        let mut paths = Vec::new();
        let summary = self.walk(|path| {
            paths.push(String::from_utf8_lossy(path).into_owned());
            Ok(())
        })?;
        Ok((paths, summary))
    }
}

/// Pull subtrees off the work queue until it is empty or the walk stops
fn run_worker(
    id: usize,
    context: &SubtreeWalk<'_>,
    work: Receiver<u64>,
    paths: Sender<Vec<u8>>,
) -> WalkStats {
    let mut stats = WalkStats::default();

    for top in work.iter() {
        if context.should_stop() {
            break;
        }
        let outcome = context.run(top, &paths);
        stats.merge(outcome.stats);
        if outcome.stopped {
            break;
        }
    }

    debug!(worker = id, paths = stats.paths, subtrees = stats.subtrees, "Worker finished");
    stats
}
