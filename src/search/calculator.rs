//! Layered best-first search over future placements.
//!
//! The calculator snapshots a root state plus a finite queue of upcoming
//! piece kinds and expands the tree one layer at a time: every surviving
//! node of layer d is handed to the worker pool as an independent task that
//! enumerates and evaluates all drop placements of `queue[d]`. A countdown
//! latch gates the layer boundary; the single coordinator thread then
//! inserts the children, prunes the layer to its configured width, and
//! atomically publishes the new depth together with the best root-to-leaf
//! path. Readers never see a torn result: depth and path live behind one
//! mutex and move together.
//!
//! Cancellation is cooperative. `stop()` raises a flag that expansion tasks
//! poll once per enumerated column; the calculator then finishes with
//! whatever layers completed. A panic inside a task is caught at the task
//! boundary, recorded, cancels its peers and parks the calculator in
//! `Error` - layers published before the failure stay readable.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::core::game_state::GameState;
use crate::core::pieces::{distinct_rotations, get_shape, shape_x_bounds};
use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::search::evaluator::Evaluator;
use crate::search::node::{NodeArena, NodeId};
use crate::search::worker::{panic_message, TaskContext, WorkerPool};
use crate::types::{PieceKind, MAX_LAYER_WIDTH, MAX_SEARCH_DEPTH};
use crate::util::latch::{Latch, LatchGuard};

/// Lifecycle of a calculator. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CalculatorStatus {
    Initial = 0,
    Starting = 1,
    Working = 2,
    Stopping = 3,
    Finished = 4,
    Error = 5,
}

impl CalculatorStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => CalculatorStatus::Initial,
            1 => CalculatorStatus::Starting,
            2 => CalculatorStatus::Working,
            3 => CalculatorStatus::Stopping,
            4 => CalculatorStatus::Finished,
            _ => CalculatorStatus::Error,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CalculatorStatus::Finished | CalculatorStatus::Error)
    }
}

/// How a completed layer is trimmed to its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruningPolicy {
    /// Keep the globally best W children across the whole layer.
    #[default]
    GlobalTopW,
    /// Give every parent an even share of W, then cap globally.
    PerParent,
}

/// Depth and best path move together under one lock.
struct Published {
    depth: usize,
    path: Arc<Vec<GameState>>,
}

struct CalcShared {
    status: AtomicU8,
    cancel: AtomicBool,
    published: Mutex<Published>,
    error: Mutex<Option<String>>,
    node_count: AtomicUsize,
}

impl CalcShared {
    fn status(&self) -> CalculatorStatus {
        CalculatorStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: CalculatorStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn record_error(&self, message: String) {
        let mut slot = match self.error.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            *slot = Some(message);
        }
        // Cancel peers; no further layer will complete.
        self.cancel.store(true, Ordering::Release);
    }

    fn publish(&self, depth: usize, path: Vec<GameState>) {
        let mut published = match self.published.lock() {
            Ok(published) => published,
            Err(poisoned) => poisoned.into_inner(),
        };
        published.depth = depth;
        published.path = Arc::new(path);
    }
}

struct CalcInputs {
    root: GameState,
    queue: Vec<PieceKind>,
    widths: Vec<usize>,
    evaluator: Evaluator,
    policy: PruningPolicy,
}

pub struct NodeCalculator {
    shared: Arc<CalcShared>,
    inputs: Option<CalcInputs>,
    pool: Arc<WorkerPool>,
    logger: Logger,
    coordinator: Option<JoinHandle<()>>,
}

impl NodeCalculator {
    /// Validate inputs and build an idle calculator.
    ///
    /// `widths[d]` bounds the survivors at depth `d + 1`; `widths.len()` is
    /// the search depth and must not exceed the snapshotted queue.
    pub fn new(
        root: GameState,
        queue: Vec<PieceKind>,
        widths: Vec<usize>,
        evaluator: Evaluator,
        policy: PruningPolicy,
        pool: Arc<WorkerPool>,
        logger: Logger,
    ) -> Result<Self> {
        if widths.is_empty() || widths.len() > MAX_SEARCH_DEPTH {
            return Err(Error::InvalidConfiguration(format!(
                "search depth must be 1..={MAX_SEARCH_DEPTH}, got {}",
                widths.len()
            )));
        }
        if let Some(&bad) = widths
            .iter()
            .find(|&&width| width == 0 || width > MAX_LAYER_WIDTH)
        {
            return Err(Error::InvalidConfiguration(format!(
                "layer widths must be 1..={MAX_LAYER_WIDTH}, got {bad}"
            )));
        }
        if queue.len() < widths.len() {
            return Err(Error::QueueTooShort {
                available: queue.len(),
                depth: widths.len(),
            });
        }

        let shared = Arc::new(CalcShared {
            status: AtomicU8::new(CalculatorStatus::Initial as u8),
            cancel: AtomicBool::new(false),
            published: Mutex::new(Published {
                depth: 0,
                path: Arc::new(vec![root.clone()]),
            }),
            error: Mutex::new(None),
            node_count: AtomicUsize::new(0),
        });

        Ok(Self {
            shared,
            inputs: Some(CalcInputs {
                root,
                queue,
                widths,
                evaluator,
                policy,
            }),
            pool,
            logger,
            coordinator: None,
        })
    }

    /// Launch the coordinator thread. Valid exactly once.
    pub fn start(&mut self) -> Result<()> {
        if self
            .shared
            .status
            .compare_exchange(
                CalculatorStatus::Initial as u8,
                CalculatorStatus::Starting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(Error::AlreadyStarted("node calculator"));
        }

        let inputs = match self.inputs.take() {
            Some(inputs) => inputs,
            None => return Err(Error::AlreadyStarted("node calculator")),
        };
        let shared = Arc::clone(&self.shared);
        let pool = Arc::clone(&self.pool);
        let logger = self.logger.clone();

        let handle = std::thread::Builder::new()
            .name("node-calculator".to_string())
            .spawn(move || run_coordinator(inputs, shared, pool, logger))
            .map_err(|e| Error::InvalidConfiguration(format!("coordinator spawn: {e}")))?;
        self.coordinator = Some(handle);
        Ok(())
    }

    /// Request cancellation and block until the search has wound down.
    /// Graceful: the calculator ends `Finished` with however many layers
    /// completed (an already-failed calculator stays `Error`).
    pub fn stop(&mut self) {
        let status = self.shared.status();
        if status == CalculatorStatus::Working || status == CalculatorStatus::Starting {
            self.shared.set_status(CalculatorStatus::Stopping);
        }
        self.shared.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.coordinator.take() {
            let _ = handle.join();
        }
        if self.shared.status() != CalculatorStatus::Error {
            self.shared.set_status(CalculatorStatus::Finished);
        }
    }

    pub fn status(&self) -> CalculatorStatus {
        self.shared.status()
    }

    /// Greatest depth whose layer is complete.
    pub fn current_depth(&self) -> usize {
        match self.shared.published.lock() {
            Ok(published) => published.depth,
            Err(poisoned) => poisoned.into_inner().depth,
        }
    }

    /// Best root-to-leaf path through the deepest completed layer. The
    /// returned states are a consistent snapshot of one publication.
    pub fn best_path(&self) -> Arc<Vec<GameState>> {
        match self.shared.published.lock() {
            Ok(published) => Arc::clone(&published.path),
            Err(poisoned) => Arc::clone(&poisoned.into_inner().path),
        }
    }

    /// Message recorded when a task failed (status `Error`).
    pub fn error_message(&self) -> Option<String> {
        match self.shared.error.lock() {
            Ok(error) => error.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of child nodes created so far.
    pub fn node_count(&self) -> usize {
        self.shared.node_count.load(Ordering::Relaxed)
    }
}

impl Drop for NodeCalculator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One expansion result: the child states of a single parent, in
/// enumeration order, paired with their qualities.
type ChildBatch = Vec<(GameState, i32)>;

fn run_coordinator(
    inputs: CalcInputs,
    shared: Arc<CalcShared>,
    pool: Arc<WorkerPool>,
    logger: Logger,
) {
    // Starting -> Working; an early stop() may already have moved the
    // status to Stopping, which must not be clobbered.
    let _ = shared.status.compare_exchange(
        CalculatorStatus::Starting as u8,
        CalculatorStatus::Working as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
    );

    let CalcInputs {
        root,
        queue,
        widths,
        evaluator,
        policy,
    } = inputs;

    let max_depth = widths.len();
    let root_quality = evaluator.evaluate(&root);
    let mut arena = NodeArena::new(root, root_quality);
    let mut survivors: Vec<NodeId> = vec![arena.root()];

    for depth in 0..max_depth {
        if shared.cancelled() {
            break;
        }

        let kind = queue[depth];
        let slots: Vec<Arc<Mutex<Option<ChildBatch>>>> = survivors
            .iter()
            .map(|_| Arc::new(Mutex::new(None)))
            .collect();
        let latch = Arc::new(Latch::new(survivors.len()));

        for (slot, &parent_id) in slots.iter().zip(survivors.iter()) {
            let parent_state = arena.state(parent_id).clone();
            let slot = Arc::clone(slot);
            let latch = Arc::clone(&latch);
            let shared = Arc::clone(&shared);

            pool.schedule(Box::new(move |ctx| {
                let _open_layer = LatchGuard::new(&latch);
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    expand(&parent_state, kind, &evaluator, &shared, ctx)
                }));
                match outcome {
                    Ok(Some(children)) => {
                        let mut slot = match slot.lock() {
                            Ok(slot) => slot,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        *slot = Some(children);
                    }
                    // Cancelled mid-enumeration: discard partial results.
                    Ok(None) => {}
                    Err(payload) => {
                        shared.record_error(panic_message(payload.as_ref()));
                    }
                }
            }));
        }

        latch.wait();

        if let Some(message) = shared_error(&shared) {
            logger.error(&format!("search failed at depth {}: {message}", depth + 1));
            shared.set_status(CalculatorStatus::Error);
            return;
        }
        if shared.cancelled() {
            break;
        }

        // Single-threaded insertion, in parent order: node ids double as
        // deterministic insertion sequence numbers.
        let mut layer: Vec<NodeId> = Vec::new();
        for (slot, &parent_id) in slots.iter().zip(survivors.iter()) {
            let batch = {
                let mut slot = match slot.lock() {
                    Ok(slot) => slot,
                    Err(poisoned) => poisoned.into_inner(),
                };
                slot.take().unwrap_or_default()
            };
            for (state, quality) in batch {
                layer.push(arena.add_child(parent_id, state, quality));
            }
        }

        if layer.is_empty() {
            // Every surviving line of play tops out here.
            logger.info(&format!(
                "search exhausted at depth {}: no legal placements",
                depth + 1
            ));
            break;
        }

        shared
            .node_count
            .fetch_add(layer.len(), Ordering::Relaxed);

        survivors = prune_layer(&arena, &survivors, layer, widths[depth], policy);

        let best = survivors[0];
        let path: Vec<GameState> = arena
            .path_from_root(best)
            .into_iter()
            .map(|id| arena.state(id).clone())
            .collect();
        shared.publish(depth + 1, path);
    }

    if shared.status() != CalculatorStatus::Error {
        shared.set_status(CalculatorStatus::Finished);
    }
}

fn shared_error(shared: &CalcShared) -> Option<String> {
    match shared.error.lock() {
        Ok(error) => error.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Enumerate and evaluate every drop placement of `kind` under `parent`.
/// Returns None when cancelled or interrupted; the caller discards the
/// partial batch.
fn expand(
    parent: &GameState,
    kind: PieceKind,
    evaluator: &Evaluator,
    shared: &CalcShared,
    ctx: &TaskContext,
) -> Option<ChildBatch> {
    let mut children: ChildBatch = Vec::new();
    let board_width = parent.board().width() as i8;

    for &rotation in distinct_rotations(kind) {
        let shape = get_shape(kind, rotation);
        let (min_dx, max_dx) = shape_x_bounds(&shape);
        for column in -min_dx..=(board_width - 1 - max_dx) {
            // Cancellation checkpoint: at least once per column.
            if shared.cancelled() || ctx.interrupted() {
                return None;
            }
            if let Some(child) = parent.place(kind, rotation, column) {
                let quality = evaluator.evaluate(&child);
                children.push((child, quality));
            }
        }
    }
    Some(children)
}

/// Trim a completed layer to `width` survivors, ordered best-first.
fn prune_layer(
    arena: &NodeArena,
    parents: &[NodeId],
    mut layer: Vec<NodeId>,
    width: usize,
    policy: PruningPolicy,
) -> Vec<NodeId> {
    match policy {
        PruningPolicy::GlobalTopW => {
            sort_best_first(arena, &mut layer);
            layer.truncate(width);
            layer
        }
        PruningPolicy::PerParent => {
            let fertile = parents
                .iter()
                .filter(|&&parent| !arena.children(parent).is_empty())
                .count()
                .max(1);
            let quota = width.div_ceil(fertile);

            // Children are already quality-sorted per parent: each fertile
            // parent contributes its quota, the rest go to the backfill
            // pool.
            let mut kept: Vec<NodeId> = Vec::new();
            let mut surplus: Vec<NodeId> = Vec::new();
            for &parent in parents {
                let children = arena.children(parent);
                let take = children.len().min(quota);
                kept.extend_from_slice(&children[..take]);
                surplus.extend_from_slice(&children[take..]);
            }

            // Backfill from beyond-quota children so an unbalanced layer
            // still keeps min(width, total) survivors.
            if kept.len() < width && !surplus.is_empty() {
                sort_best_first(arena, &mut surplus);
                let missing = width - kept.len();
                kept.extend(surplus.into_iter().take(missing));
            }

            sort_best_first(arena, &mut kept);
            kept.truncate(width);
            kept
        }
    }
}

fn sort_best_first(arena: &NodeArena, layer: &mut [NodeId]) {
    layer.sort_by_key(|&id| (std::cmp::Reverse(arena.quality(id)), id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::board::Board;

    fn shared_pool() -> Arc<WorkerPool> {
        Arc::new(WorkerPool::new("calc-test", 2, Logger::disabled()).expect("valid pool size"))
    }

    fn calculator(
        widths: Vec<usize>,
        queue: Vec<PieceKind>,
    ) -> Result<NodeCalculator> {
        NodeCalculator::new(
            GameState::initial(Board::default()),
            queue,
            widths,
            Evaluator::Balanced,
            PruningPolicy::GlobalTopW,
            shared_pool(),
            Logger::disabled(),
        )
    }

    #[test]
    fn rejects_zero_depth() {
        assert!(matches!(
            calculator(vec![], vec![]),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_width() {
        assert!(calculator(vec![0], vec![PieceKind::T]).is_err());
        assert!(calculator(vec![257], vec![PieceKind::T]).is_err());
    }

    #[test]
    fn rejects_short_queue() {
        let result = calculator(vec![4, 4], vec![PieceKind::T]);
        assert_eq!(
            result.err(),
            Some(Error::QueueTooShort {
                available: 1,
                depth: 2
            })
        );
    }

    #[test]
    fn initial_publication_is_the_root() {
        let calc = calculator(vec![2], vec![PieceKind::O]).unwrap();
        assert_eq!(calc.status(), CalculatorStatus::Initial);
        assert_eq!(calc.current_depth(), 0);
        assert_eq!(calc.best_path().len(), 1);
        assert_eq!(calc.node_count(), 0);
    }

    #[test]
    fn start_twice_fails() {
        let mut calc = calculator(vec![1], vec![PieceKind::O]).unwrap();
        calc.start().unwrap();
        assert!(matches!(calc.start(), Err(Error::AlreadyStarted(_))));
        calc.stop();
    }

    #[test]
    fn stop_before_start_finishes_quietly() {
        let mut calc = calculator(vec![1], vec![PieceKind::O]).unwrap();
        calc.stop();
        assert_eq!(calc.status(), CalculatorStatus::Finished);
        assert_eq!(calc.current_depth(), 0);
    }

    fn empty_state() -> GameState {
        GameState::initial(Board::default())
    }

    #[test]
    fn per_parent_pruning_backfills_unbalanced_layers() {
        let mut arena = NodeArena::new(empty_state(), 0);
        let parent_a = arena.add_child(arena.root(), empty_state(), 20);
        let parent_b = arena.add_child(arena.root(), empty_state(), 10);
        let parents = vec![parent_a, parent_b];

        // One parent carries nearly the whole layer.
        let mut layer = Vec::new();
        for quality in [5, 4, 3, 2, 1] {
            layer.push(arena.add_child(parent_a, empty_state(), quality));
        }
        layer.push(arena.add_child(parent_b, empty_state(), 0));

        // Quotas alone would keep 3 (two from a, one from b); the backfill
        // tops the layer up to min(width, total).
        let kept = prune_layer(&arena, &parents, layer.clone(), 4, PruningPolicy::PerParent);
        assert_eq!(kept.len(), 4.min(layer.len()));
        let qualities: Vec<i32> = kept.iter().map(|&id| arena.quality(id)).collect();
        assert_eq!(qualities, vec![5, 4, 3, 0]);

        // A width above the layer total keeps everything.
        let all = prune_layer(&arena, &parents, layer.clone(), 16, PruningPolicy::PerParent);
        assert_eq!(all.len(), layer.len());

        // And the global policy agrees on the survivor count.
        let global = prune_layer(&arena, &parents, layer.clone(), 4, PruningPolicy::GlobalTopW);
        assert_eq!(global.len(), kept.len());
    }
}
