//! Immutable search-side game state.
//!
//! A `GameState` is a board after some number of committed placements, plus
//! the cumulative clear stats along that line of play. States are never
//! mutated: `place` returns a fresh state, and the search tree hangs on to
//! old ones for path reconstruction. The live, mutable game lives in the
//! player layer; this type only models the transition rules the search
//! branches over.

use std::sync::OnceLock;

use crate::core::board::Board;
use crate::core::pieces::{distinct_rotations, get_shape, shape_x_bounds, PieceShape};
use crate::core::stats::GameStateStats;
use crate::types::{PieceKind, Rotation, SPAWN_X, SPAWN_Y};

/// A positioned piece: kind, orientation and shape-box origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tetromino {
    pub kind: PieceKind,
    pub rotation: Rotation,
    pub x: i8,
    pub y: i8,
}

impl Tetromino {
    /// A fresh piece at the spawn position.
    pub fn spawn(kind: PieceKind) -> Self {
        Self {
            kind,
            rotation: Rotation::North,
            x: SPAWN_X,
            y: SPAWN_Y,
        }
    }

    /// Get the shape (mino offsets) for current rotation
    pub fn shape(&self) -> PieceShape {
        get_shape(self.kind, self.rotation)
    }

    /// Check if all minos are at valid positions on the board
    pub fn is_valid(&self, board: &Board) -> bool {
        board.fits_shape(&self.shape(), self.x, self.y)
    }

    /// Check if the piece is resting on the floor or on filled cells.
    pub fn is_grounded(&self, board: &Board) -> bool {
        self.shape()
            .iter()
            .any(|&(dx, dy)| !board.is_valid(self.x + dx, self.y + dy + 1))
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    last_placed: Option<Tetromino>,
    stats: GameStateStats,
    quality_cache: OnceLock<QualityTag>,
}

#[derive(Debug, Clone, Copy)]
struct QualityTag {
    evaluator_id: u64,
    value: i32,
}

impl GameState {
    /// Root state: a board with no placement history.
    pub fn initial(board: Board) -> Self {
        Self {
            board,
            last_placed: None,
            stats: GameStateStats::default(),
            quality_cache: OnceLock::new(),
        }
    }

    /// Root state carrying stats accumulated before the search began.
    pub fn with_stats(board: Board, stats: GameStateStats) -> Self {
        Self {
            board,
            last_placed: None,
            stats,
            quality_cache: OnceLock::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn stats(&self) -> &GameStateStats {
        &self.stats
    }

    /// The placement that produced this state (None for a root).
    pub fn last_placed(&self) -> Option<Tetromino> {
        self.last_placed
    }

    /// Stamp `kind` at the given orientation and shape-box origin column,
    /// let it fall to the lowest legal row, then clear full rows.
    ///
    /// Returns None when the piece cannot enter the board at the top of
    /// that column - along that branch the game is over.
    pub fn place(&self, kind: PieceKind, rotation: Rotation, column: i8) -> Option<GameState> {
        let rotation = rotation.normalize(kind);
        let shape = get_shape(kind, rotation);

        if !self.board.fits_shape(&shape, column, 0) {
            return None;
        }

        // Gravity: lowest reachable row by straight descent.
        let mut y: i8 = 0;
        while self.board.fits_shape(&shape, column, y + 1) {
            y += 1;
        }

        let mut board = self.board.clone();
        board.stamp_shape(&shape, column, y, kind);
        let cleared = board.clear_full_rows();

        Some(GameState {
            board,
            last_placed: Some(Tetromino {
                kind,
                rotation,
                x: column,
                y,
            }),
            stats: self.stats.with_cleared(cleared.len()),
            quality_cache: OnceLock::new(),
        })
    }

    /// All legal drop placements of `kind`, in deterministic enumeration
    /// order: distinct rotations outermost, columns left to right.
    pub fn enumerate_placements(&self, kind: PieceKind) -> Vec<GameState> {
        let mut children = Vec::new();
        for &rotation in distinct_rotations(kind) {
            let shape = get_shape(kind, rotation);
            let (min_dx, max_dx) = shape_x_bounds(&shape);
            for column in -min_dx..=(self.board.width() as i8 - 1 - max_dx) {
                if let Some(child) = self.place(kind, rotation, column) {
                    children.push(child);
                }
            }
        }
        children
    }

    /// Quality under the evaluator identified by `evaluator_id`, computing
    /// with `compute` on a cache miss. The cache is filled once; a state
    /// evaluated under a different evaluator id is recomputed without
    /// disturbing the cached tag.
    pub fn cached_quality(&self, evaluator_id: u64, compute: impl FnOnce(&GameState) -> i32) -> i32 {
        if let Some(tag) = self.quality_cache.get() {
            if tag.evaluator_id == evaluator_id {
                return tag.value;
            }
            return compute(self);
        }
        let value = compute(self);
        let _ = self.quality_cache.set(QualityTag {
            evaluator_id,
            value,
        });
        value
    }
}
