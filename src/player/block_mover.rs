//! Timer-driven actuator.
//!
//! Every tick moves the live piece a single step closer to the search's
//! current target placement: rotation first (shorter direction, ties
//! clockwise), then column, then the configured move-down behavior. The
//! mover only calls the live game's input methods, which enforce legality;
//! a rejected step is dropped silently and retried on the next tick, by
//! which time either the path or the live state will have advanced.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::game_state::Tetromino;
use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::search::calculator::NodeCalculator;
use crate::types::{Direction, MoveDownBehavior, Spin, MAX_MOVES_PER_SECOND};
use crate::util::timer::Timer;

use super::game::SharedGame;
use super::PostAction;

/// The single step a tick decided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedStep {
    Rotate(Spin),
    Shift(Direction),
    MoveDown,
    Drop,
    /// Rotation and column already match and vertical movement is left to
    /// gravity.
    Rest,
}

/// Decide the next single step that brings `live` closer to `target`.
///
/// Rotations compare in the piece's normalized orientation space, so a
/// visually-equivalent orientation never triggers extra quarter turns.
pub fn plan_step(live: Tetromino, target: Tetromino, behavior: MoveDownBehavior) -> PlannedStep {
    let period = live.kind.distinct_rotations();
    let live_rot = live.rotation.index() % period;
    let target_rot = target.rotation.index() % period;

    if live_rot != target_rot {
        let cw = (target_rot + period - live_rot) % period;
        let ccw = (live_rot + period - target_rot) % period;
        // Ties go clockwise.
        return if cw <= ccw {
            PlannedStep::Rotate(Spin::Clockwise)
        } else {
            PlannedStep::Rotate(Spin::CounterClockwise)
        };
    }

    if live.x != target.x {
        return if target.x < live.x {
            PlannedStep::Shift(Direction::Left)
        } else {
            PlannedStep::Shift(Direction::Right)
        };
    }

    match behavior {
        MoveDownBehavior::None => PlannedStep::Rest,
        MoveDownBehavior::Move => PlannedStep::MoveDown,
        MoveDownBehavior::Drop => PlannedStep::Drop,
    }
}

/// Everything a tick needs, shared with the timer thread.
pub(crate) struct MoverShared {
    pub game: SharedGame,
    pub calculator: Arc<Mutex<Option<NodeCalculator>>>,
    pub behavior: Mutex<MoveDownBehavior>,
    pub logger: Logger,
}

/// How a tick reaches the live game: directly, or marshalled through the
/// embedder's schedule-on-ui callback.
pub(crate) enum TickRoute {
    Inline,
    Posted(PostAction),
}

/// One actuator tick. Returns the step that was attempted, or None when
/// the tick was skipped (no search result, or the result no longer matches
/// the live piece).
pub(crate) fn tick_once(shared: &MoverShared) -> Option<PlannedStep> {
    // Read the published target without holding the game lock.
    let target = {
        let calculator = match shared.calculator.lock() {
            Ok(calculator) => calculator,
            Err(poisoned) => poisoned.into_inner(),
        };
        let calculator = calculator.as_ref()?;
        if calculator.current_depth() == 0 {
            return None;
        }
        calculator.best_path().get(1)?.last_placed()?
    };

    let behavior = *match shared.behavior.lock() {
        Ok(behavior) => behavior,
        Err(poisoned) => poisoned.into_inner(),
    };

    shared.game.write(|game| {
        let live = game.active_block()?;
        // The targeted piece already committed; wait for the next search.
        if live.kind != target.kind {
            return None;
        }

        let step = plan_step(live, target, behavior);
        let accepted = match step {
            PlannedStep::Rotate(spin) => game.rotate(spin),
            PlannedStep::Shift(direction) => game.move_horizontal(direction),
            PlannedStep::MoveDown => game.move_down(),
            PlannedStep::Drop => game.drop(),
            PlannedStep::Rest => true,
        };
        // Rejections are dropped silently; the next tick retries.
        let _ = accepted;
        Some(step)
    })
}

pub struct BlockMover {
    shared: Arc<MoverShared>,
    route: Arc<TickRoute>,
    timer: Timer,
    moves_per_second: AtomicU32,
}

impl BlockMover {
    pub(crate) fn new(
        game: SharedGame,
        calculator: Arc<Mutex<Option<NodeCalculator>>>,
        moves_per_second: u32,
        behavior: MoveDownBehavior,
        route: TickRoute,
        logger: Logger,
    ) -> Result<Self> {
        validate_speed(moves_per_second)?;
        Ok(Self {
            shared: Arc::new(MoverShared {
                game,
                calculator,
                behavior: Mutex::new(behavior),
                logger,
            }),
            route: Arc::new(route),
            timer: Timer::with_period(period_for(moves_per_second)),
            moves_per_second: AtomicU32::new(moves_per_second),
        })
    }

    pub(crate) fn start(&mut self) -> Result<()> {
        self.shared
            .logger
            .info(&format!("block mover started at {} moves/s", self.speed()));
        let shared = Arc::clone(&self.shared);
        let route = Arc::clone(&self.route);
        self.timer.start(move || match route.as_ref() {
            TickRoute::Inline => {
                let _ = tick_once(&shared);
            }
            TickRoute::Posted(post) => {
                let shared = Arc::clone(&shared);
                post(Box::new(move || {
                    let _ = tick_once(&shared);
                }));
            }
        })
    }

    pub(crate) fn stop(&mut self) {
        self.timer.stop();
    }

    pub fn set_speed(&self, moves_per_second: u32) -> Result<()> {
        validate_speed(moves_per_second)?;
        self.moves_per_second
            .store(moves_per_second, Ordering::Relaxed);
        self.timer.set_period(period_for(moves_per_second));
        Ok(())
    }

    pub fn speed(&self) -> u32 {
        self.moves_per_second.load(Ordering::Relaxed)
    }

    pub fn set_move_down_behavior(&self, behavior: MoveDownBehavior) {
        let mut slot = match self.shared.behavior.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = behavior;
    }

    pub fn move_down_behavior(&self) -> MoveDownBehavior {
        match self.shared.behavior.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Drop for BlockMover {
    fn drop(&mut self) {
        self.stop();
    }
}

fn validate_speed(moves_per_second: u32) -> Result<()> {
    if moves_per_second == 0 || moves_per_second > MAX_MOVES_PER_SECOND {
        return Err(Error::InvalidConfiguration(format!(
            "mover speed must be 1..={MAX_MOVES_PER_SECOND} moves/s, got {moves_per_second}"
        )));
    }
    Ok(())
}

fn period_for(moves_per_second: u32) -> Duration {
    Duration::from_millis((1000 / moves_per_second.max(1)) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PieceKind, Rotation};

    fn piece(kind: PieceKind, rotation: Rotation, x: i8) -> Tetromino {
        Tetromino {
            kind,
            rotation,
            x,
            y: 0,
        }
    }

    #[test]
    fn rotation_comes_before_horizontal() {
        let live = piece(PieceKind::T, Rotation::North, 3);
        let target = piece(PieceKind::T, Rotation::South, 5);

        let step = plan_step(live, target, MoveDownBehavior::Move);
        assert_eq!(step, PlannedStep::Rotate(Spin::Clockwise));

        // After the two rotation steps, horizontal movement starts.
        let live = piece(PieceKind::T, Rotation::South, 3);
        assert_eq!(
            plan_step(live, target, MoveDownBehavior::Move),
            PlannedStep::Shift(Direction::Right)
        );
    }

    #[test]
    fn rotation_takes_the_shorter_direction() {
        let live = piece(PieceKind::T, Rotation::North, 3);
        let target = piece(PieceKind::T, Rotation::West, 3);
        assert_eq!(
            plan_step(live, target, MoveDownBehavior::Move),
            PlannedStep::Rotate(Spin::CounterClockwise)
        );
    }

    #[test]
    fn opposite_rotation_ties_clockwise() {
        let live = piece(PieceKind::J, Rotation::North, 3);
        let target = piece(PieceKind::J, Rotation::South, 3);
        assert_eq!(
            plan_step(live, target, MoveDownBehavior::Move),
            PlannedStep::Rotate(Spin::Clockwise)
        );
    }

    #[test]
    fn symmetric_orientations_need_no_rotation() {
        // A live I showing its South shape already matches a North target.
        let live = piece(PieceKind::I, Rotation::South, 2);
        let target = piece(PieceKind::I, Rotation::North, 2);
        assert_eq!(
            plan_step(live, target, MoveDownBehavior::Move),
            PlannedStep::MoveDown
        );
    }

    #[test]
    fn aligned_piece_follows_move_down_behavior() {
        let live = piece(PieceKind::O, Rotation::North, 4);
        let target = piece(PieceKind::O, Rotation::North, 4);

        assert_eq!(
            plan_step(live, target, MoveDownBehavior::None),
            PlannedStep::Rest
        );
        assert_eq!(
            plan_step(live, target, MoveDownBehavior::Move),
            PlannedStep::MoveDown
        );
        assert_eq!(
            plan_step(live, target, MoveDownBehavior::Drop),
            PlannedStep::Drop
        );
    }

    #[test]
    fn left_shift_when_target_is_left() {
        let live = piece(PieceKind::L, Rotation::North, 6);
        let target = piece(PieceKind::L, Rotation::North, 1);
        assert_eq!(
            plan_step(live, target, MoveDownBehavior::Move),
            PlannedStep::Shift(Direction::Left)
        );
    }

    #[test]
    fn speed_validation() {
        assert!(validate_speed(0).is_err());
        assert!(validate_speed(61).is_err());
        assert!(validate_speed(1).is_ok());
        assert!(validate_speed(60).is_ok());
        assert_eq!(period_for(20), Duration::from_millis(50));
    }

    #[test]
    fn ticks_walk_the_piece_to_the_search_target() {
        use crate::player::game::shared_game;
        use crate::search::calculator::{NodeCalculator, PruningPolicy};
        use crate::search::evaluator::Evaluator;
        use crate::search::worker::WorkerPool;
        use std::time::Instant;

        let game = shared_game(21);
        let (root, kind) = game.read(|g| (g.search_root(), g.active_block().unwrap().kind));

        let pool = Arc::new(WorkerPool::new("mover-test", 1, Logger::disabled()).unwrap());
        let mut calculator = NodeCalculator::new(
            root,
            vec![kind],
            vec![1],
            Evaluator::Balanced,
            PruningPolicy::GlobalTopW,
            pool,
            Logger::disabled(),
        )
        .unwrap();
        calculator.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !calculator.status().is_terminal() {
            assert!(Instant::now() < deadline, "search never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
        let target = calculator.best_path()[1].last_placed().unwrap();

        let shared = MoverShared {
            game: game.clone(),
            calculator: Arc::new(Mutex::new(Some(calculator))),
            behavior: Mutex::new(MoveDownBehavior::Drop),
            logger: Logger::disabled(),
        };

        // Tick until the piece commits; every tick must act.
        let first_piece = game.read(|g| g.piece_id());
        let mut steps = 0;
        while game.read(|g| g.piece_id()) == first_piece {
            assert!(tick_once(&shared).is_some(), "tick skipped unexpectedly");
            steps += 1;
            assert!(steps < 64, "piece never committed");
        }

        // The committed cells sit exactly where the search placed them.
        game.read(|g| {
            for (dx, dy) in target.shape() {
                assert!(g.grid().is_occupied(target.x + dx, target.y + dy));
            }
        });
    }
}
