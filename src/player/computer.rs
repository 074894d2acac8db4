//! The computer player.
//!
//! Binds a live game to the search and the actuator. A strategy timer
//! watches the game; whenever a new piece becomes active it snapshots the
//! board, the accumulated stats and a prefix of the upcoming piece kinds,
//! and launches a fresh [`NodeCalculator`] over the worker pool. The block
//! mover consumes whatever the running calculator has published so far, so
//! moves start flowing long before the search reaches full depth.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::search::calculator::{CalculatorStatus, NodeCalculator, PruningPolicy};
use crate::search::evaluator::Evaluator;
use crate::search::worker::WorkerPool;
use crate::types::{MoveDownBehavior, PieceKind, MAX_LAYER_WIDTH, MAX_SEARCH_DEPTH};
use crate::util::timer::Timer;

use super::block_mover::{BlockMover, TickRoute};
use super::game::SharedGame;
use super::PostAction;

/// How often the strategy loop checks for a new active piece.
const STRATEGY_PERIOD: Duration = Duration::from_millis(20);

pub struct ComputerConfig {
    /// Number of future pieces searched, 1..=6.
    pub search_depth: usize,
    /// Survivors kept per layer, 1..=256.
    pub search_width: usize,
    /// Worker threads, 1..=2x hardware concurrency.
    pub worker_count: usize,
    pub moves_per_second: u32,
    pub move_down_behavior: MoveDownBehavior,
    pub evaluator: Evaluator,
    pub pruning: PruningPolicy,
    /// Optional schedule-on-ui bridge: when set, every actuator step is
    /// marshalled through this callback instead of running on the timer
    /// thread.
    pub post_action: Option<PostAction>,
}

impl Default for ComputerConfig {
    fn default() -> Self {
        Self {
            search_depth: 3,
            search_width: 32,
            worker_count: num_cpus::get().max(1),
            moves_per_second: 30,
            move_down_behavior: MoveDownBehavior::Drop,
            evaluator: Evaluator::Balanced,
            pruning: PruningPolicy::GlobalTopW,
            post_action: None,
        }
    }
}

impl ComputerConfig {
    fn validate(&self) -> Result<()> {
        if self.search_depth == 0 || self.search_depth > MAX_SEARCH_DEPTH {
            return Err(Error::InvalidConfiguration(format!(
                "search depth must be 1..={MAX_SEARCH_DEPTH}, got {}",
                self.search_depth
            )));
        }
        if self.search_width == 0 || self.search_width > MAX_LAYER_WIDTH {
            return Err(Error::InvalidConfiguration(format!(
                "search width must be 1..={MAX_LAYER_WIDTH}, got {}",
                self.search_width
            )));
        }
        let worker_cap = num_cpus::get().max(1) * 2;
        if self.worker_count == 0 || self.worker_count > worker_cap {
            return Err(Error::InvalidConfiguration(format!(
                "worker count must be 1..={worker_cap}, got {}",
                self.worker_count
            )));
        }
        Ok(())
    }
}

/// Search settings the strategy loop reads on every (re)launch.
struct Settings {
    search_depth: AtomicUsize,
    search_width: AtomicUsize,
    evaluator: Mutex<Evaluator>,
    pruning: Mutex<PruningPolicy>,
    /// Piece id of the last launched search; 0 = none yet.
    last_piece_id: AtomicU32,
}

struct StrategyShared {
    game: SharedGame,
    calculator: Arc<Mutex<Option<NodeCalculator>>>,
    pool: Arc<WorkerPool>,
    settings: Settings,
    logger: Logger,
}

pub struct Computer {
    shared: Arc<StrategyShared>,
    mover: BlockMover,
    strategy_timer: Timer,
}

impl Computer {
    pub fn new(game: SharedGame, config: ComputerConfig) -> Result<Self> {
        config.validate()?;
        let logger = Logger::default();
        Self::with_logger(game, config, logger)
    }

    pub fn with_logger(game: SharedGame, config: ComputerConfig, logger: Logger) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(WorkerPool::new(
            "search-pool",
            config.worker_count,
            logger.clone(),
        )?);
        let calculator = Arc::new(Mutex::new(None));

        let route = match &config.post_action {
            Some(post) => TickRoute::Posted(Arc::clone(post)),
            None => TickRoute::Inline,
        };
        let mover = BlockMover::new(
            game.clone(),
            Arc::clone(&calculator),
            config.moves_per_second,
            config.move_down_behavior,
            route,
            logger.clone(),
        )?;

        let shared = Arc::new(StrategyShared {
            game,
            calculator,
            pool,
            settings: Settings {
                search_depth: AtomicUsize::new(config.search_depth),
                search_width: AtomicUsize::new(config.search_width),
                evaluator: Mutex::new(config.evaluator),
                pruning: Mutex::new(config.pruning),
                last_piece_id: AtomicU32::new(0),
            },
            logger,
        });

        Ok(Self {
            shared,
            mover,
            strategy_timer: Timer::with_period(STRATEGY_PERIOD),
        })
    }

    /// Start watching the game: launches searches and the actuator.
    pub fn start(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        self.strategy_timer.start(move || strategy_tick(&shared))?;
        self.mover.start()
    }

    /// Stop timers and the running search. The live game is untouched.
    pub fn stop(&mut self) {
        self.strategy_timer.stop();
        self.mover.stop();
        let mut slot = lock_calculator(&self.shared.calculator);
        if let Some(calculator) = slot.as_mut() {
            calculator.stop();
        }
        *slot = None;
    }

    pub fn set_search_depth(&self, depth: usize) -> Result<()> {
        if depth == 0 || depth > MAX_SEARCH_DEPTH {
            return Err(Error::InvalidConfiguration(format!(
                "search depth must be 1..={MAX_SEARCH_DEPTH}, got {depth}"
            )));
        }
        self.shared
            .settings
            .search_depth
            .store(depth, Ordering::Relaxed);
        Ok(())
    }

    pub fn search_depth(&self) -> usize {
        self.shared.settings.search_depth.load(Ordering::Relaxed)
    }

    pub fn set_search_width(&self, width: usize) -> Result<()> {
        if width == 0 || width > MAX_LAYER_WIDTH {
            return Err(Error::InvalidConfiguration(format!(
                "search width must be 1..={MAX_LAYER_WIDTH}, got {width}"
            )));
        }
        self.shared
            .settings
            .search_width
            .store(width, Ordering::Relaxed);
        Ok(())
    }

    pub fn search_width(&self) -> usize {
        self.shared.settings.search_width.load(Ordering::Relaxed)
    }

    pub fn set_worker_count(&self, count: usize) {
        self.shared.pool.resize(count);
    }

    pub fn worker_count(&self) -> usize {
        self.shared.pool.size()
    }

    pub fn set_move_speed(&self, moves_per_second: u32) -> Result<()> {
        self.mover.set_speed(moves_per_second)
    }

    pub fn move_speed(&self) -> u32 {
        self.mover.speed()
    }

    pub fn set_move_down_behavior(&self, behavior: MoveDownBehavior) {
        self.mover.set_move_down_behavior(behavior);
    }

    pub fn move_down_behavior(&self) -> MoveDownBehavior {
        self.mover.move_down_behavior()
    }

    /// Takes effect at the next search launch, never mid-search.
    pub fn set_evaluator(&self, evaluator: Evaluator) {
        *lock(&self.shared.settings.evaluator) = evaluator;
    }

    /// Status of the currently running search, if one exists.
    pub fn search_status(&self) -> Option<CalculatorStatus> {
        lock_calculator(&self.shared.calculator)
            .as_ref()
            .map(|calculator| calculator.status())
    }

    /// Depth the running search has published so far.
    pub fn current_search_depth(&self) -> usize {
        lock_calculator(&self.shared.calculator)
            .as_ref()
            .map(|calculator| calculator.current_depth())
            .unwrap_or(0)
    }
}

impl Drop for Computer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One pass of the strategy loop: restart the search when the game moved
/// on to a new piece.
fn strategy_tick(shared: &StrategyShared) {
    enum Observation {
        GameOver,
        NothingNew,
        NewPiece {
            piece_id: u32,
            kind: PieceKind,
            root: crate::core::GameState,
            queue: Vec<PieceKind>,
        },
    }

    let depth = shared.settings.search_depth.load(Ordering::Relaxed);
    let width = shared.settings.search_width.load(Ordering::Relaxed);
    let last_piece_id = shared.settings.last_piece_id.load(Ordering::Relaxed);

    // Everything the launch needs is snapshotted under one lock
    // acquisition: the active piece is the first searched piece, the bag
    // preview supplies the rest, the board becomes the root.
    let observed = shared.game.read(|game| {
        if game.game_over() {
            return Observation::GameOver;
        }
        let Some(active) = game.active_block() else {
            return Observation::NothingNew;
        };
        if game.piece_id() == last_piece_id {
            return Observation::NothingNew;
        }
        let mut queue = game.queue_preview(depth.saturating_sub(1));
        queue.insert(0, active.kind);
        Observation::NewPiece {
            piece_id: game.piece_id(),
            kind: active.kind,
            root: game.search_root(),
            queue,
        }
    });

    let (piece_id, kind, root, queue) = match observed {
        Observation::GameOver => {
            let mut slot = lock_calculator(&shared.calculator);
            if let Some(calculator) = slot.as_mut() {
                calculator.stop();
                shared.logger.info("game over: search stopped");
            }
            *slot = None;
            return;
        }
        Observation::NothingNew => return,
        Observation::NewPiece {
            piece_id,
            kind,
            root,
            queue,
        } => (piece_id, kind, root, queue),
    };

    let evaluator = *lock(&shared.settings.evaluator);
    let pruning = *lock(&shared.settings.pruning);

    let calculator = NodeCalculator::new(
        root,
        queue,
        vec![width; depth],
        evaluator,
        pruning,
        Arc::clone(&shared.pool),
        shared.logger.clone(),
    );
    let mut calculator = match calculator {
        Ok(calculator) => calculator,
        Err(error) => {
            shared.logger.error(&format!("search launch failed: {error}"));
            return;
        }
    };

    let mut slot = lock_calculator(&shared.calculator);
    if let Some(previous) = slot.as_mut() {
        previous.stop();
    }
    if let Err(error) = calculator.start() {
        shared.logger.error(&format!("search start failed: {error}"));
        *slot = None;
        return;
    }
    shared.logger.info(&format!(
        "searching piece {piece_id} ({}) to depth {depth}, width {width}",
        kind.as_str()
    ));
    *slot = Some(calculator);
    shared
        .settings
        .last_piece_id
        .store(piece_id, Ordering::Relaxed);
}

fn lock_calculator(
    slot: &Mutex<Option<NodeCalculator>>,
) -> std::sync::MutexGuard<'_, Option<NodeCalculator>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
