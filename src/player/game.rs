//! The live, mutable game.
//!
//! One coarse mutex serializes everything: callers go through
//! [`SharedGame`] (a `Protected<Game>`) and the closure-based accessors, so
//! renderers, gravity, and the computer's actuator all see consistent
//! state. The invariant maintained here is that the active piece, when
//! present, always sits at a legal position; the moment a spawn collides
//! the game is over, and `game_over` never clears.

use crate::core::board::Board;
use crate::core::game_state::{GameState, Tetromino};
use crate::core::rng::{BlockFactory, PieceBag};
use crate::core::stats::GameStateStats;
use crate::types::{Direction, PieceKind, Spin, LINE_SCORES};
use crate::util::protected::Protected;

/// Consistent value-copy of the visible state, taken under the game lock.
#[derive(Debug, Clone)]
pub struct GameSnapshot {
    pub board: Board,
    pub active: Option<Tetromino>,
    pub next_queue: Vec<PieceKind>,
    pub stats: GameStateStats,
    pub score: u32,
    pub piece_id: u32,
    pub game_over: bool,
}

pub struct Game {
    board: Board,
    active: Option<Tetromino>,
    factory: Box<dyn BlockFactory>,
    stats: GameStateStats,
    score: u32,
    /// Monotonic id, incremented on every successful spawn.
    piece_id: u32,
    game_over: bool,
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("active", &self.active)
            .field("score", &self.score)
            .field("piece_id", &self.piece_id)
            .field("game_over", &self.game_over)
            .finish_non_exhaustive()
    }
}

/// The game behind its single mutex.
pub type SharedGame = Protected<Game>;

impl Game {
    /// Start a game on `board`, spawning pieces from `factory`.
    pub fn new(board: Board, factory: impl BlockFactory + 'static) -> Self {
        let mut game = Self {
            board,
            active: None,
            factory: Box::new(factory),
            stats: GameStateStats::default(),
            score: 0,
            piece_id: 0,
            game_over: false,
        };
        game.spawn_next();
        game
    }

    pub fn grid(&self) -> &Board {
        &self.board
    }

    pub fn active_block(&self) -> Option<Tetromino> {
        self.active
    }

    pub fn game_over(&self) -> bool {
        self.game_over
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn stats(&self) -> &GameStateStats {
        &self.stats
    }

    pub fn piece_id(&self) -> u32 {
        self.piece_id
    }

    /// Upcoming piece kinds after the active one, without consuming them.
    pub fn queue_preview(&self, count: usize) -> Vec<PieceKind> {
        self.factory.preview(count)
    }

    /// Value-copy of everything a renderer or controller needs.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            board: self.board.clone(),
            active: self.active,
            next_queue: self.factory.preview(5),
            stats: self.stats,
            score: self.score,
            piece_id: self.piece_id,
            game_over: self.game_over,
        }
    }

    /// Root state for a search: the current board without the active piece,
    /// carrying the accumulated stats.
    pub fn search_root(&self) -> GameState {
        GameState::with_stats(self.board.clone(), self.stats)
    }

    /// Move the active piece one cell left or right. Rejected (false) when
    /// the target cells are blocked or there is no active piece.
    pub fn move_horizontal(&mut self, direction: Direction) -> bool {
        let dx = match direction {
            Direction::Left => -1,
            Direction::Right => 1,
        };
        self.try_shift(dx, 0)
    }

    /// Move the active piece one cell down.
    pub fn move_down(&mut self) -> bool {
        self.try_shift(0, 1)
    }

    /// Rotate the active piece one quarter turn. No wall kicks: the turned
    /// shape must fit in place.
    pub fn rotate(&mut self, spin: Spin) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        if self.game_over {
            return false;
        }

        let rotation = match spin {
            Spin::Clockwise => active.rotation.rotate_cw(),
            Spin::CounterClockwise => active.rotation.rotate_ccw(),
        };
        let candidate = Tetromino { rotation, ..active };
        if candidate.is_valid(&self.board) {
            self.active = Some(candidate);
            return true;
        }
        false
    }

    /// Hard drop: descend to the lowest legal row and commit immediately.
    pub fn drop(&mut self) -> bool {
        if self.active.is_none() || self.game_over {
            return false;
        }
        while self.try_shift(0, 1) {}
        self.commit();
        true
    }

    /// Commit the active piece if it is resting on the floor or the stack.
    /// Returns true when a commit happened.
    pub fn commit_if_landed(&mut self) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        if self.game_over || !active.is_grounded(&self.board) {
            return false;
        }
        self.commit();
        true
    }

    /// Replace the active piece. A block that collides where it stands
    /// ends the game in the same lock acquisition.
    pub fn set_active_block(&mut self, block: Tetromino) -> bool {
        if self.game_over {
            return false;
        }
        if block.is_valid(&self.board) {
            self.active = Some(block);
            return true;
        }
        self.active = None;
        self.game_over = true;
        false
    }

    fn try_shift(&mut self, dx: i8, dy: i8) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        if self.game_over {
            return false;
        }

        let candidate = Tetromino {
            x: active.x + dx,
            y: active.y + dy,
            ..active
        };
        if candidate.is_valid(&self.board) {
            self.active = Some(candidate);
            return true;
        }
        false
    }

    /// Stamp the active piece, clear rows, update stats and score, then
    /// spawn the next piece. A blocked spawn sets `game_over`.
    fn commit(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        self.board
            .stamp_shape(&active.shape(), active.x, active.y, active.kind);
        let cleared = self.board.clear_full_rows();
        self.stats = self.stats.with_cleared(cleared.len());
        self.score = self.score.saturating_add(LINE_SCORES[cleared.len()]);

        self.spawn_next();
    }

    fn spawn_next(&mut self) {
        if self.game_over {
            return;
        }
        let kind = self.factory.next();
        let piece = Tetromino::spawn(kind);
        if !piece.is_valid(&self.board) {
            self.game_over = true;
            return;
        }
        self.active = Some(piece);
        self.piece_id = self.piece_id.wrapping_add(1);
    }
}

/// Build a default-sized shared game from a seed.
pub fn shared_game(seed: u32) -> SharedGame {
    Protected::new(Game::new(Board::default(), PieceBag::new(seed)))
}
