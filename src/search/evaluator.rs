//! Quality evaluation of search states.
//!
//! An evaluator maps a `GameState` to a scalar quality, higher is better.
//! Evaluators are stateless and cheap to copy; the search caches the value
//! per state, tagged by evaluator id, so swapping evaluators between
//! searches never reuses stale numbers.

use itertools::Itertools;

use crate::core::game_state::GameState;
use crate::core::pieces::{shape_x_bounds, shape_y_bounds};

/// Weights for the balanced terms.
const W_LINES: i32 = 200;
const W_AGGREGATE_HEIGHT: i32 = -10;
const W_HOLES: i32 = -150;
const W_BUMPINESS: i32 = -5;
/// Per half-column distance of the last placement from the center column.
const W_CENTER_DISTANCE: i32 = -5;
/// Per row of the last placement's bottom edge (placing deep pays).
const W_LANDING_ROW: i32 = 8;

/// Tetris-seeking extras.
const W_RIGHT_COLUMN_FILL: i32 = -200;
const W_TETRIS: i32 = 2000;

#[derive(Debug, Clone, Copy)]
pub enum Evaluator {
    /// Penalize height, holes, bumpiness and off-center placements; reward
    /// cleared lines and deep landings.
    Balanced,
    /// Balanced terms, plus: keep the right-most column empty and reward
    /// every accumulated four-line clear heavily.
    TetrisSeeking,
    /// Embedder-supplied quality function.
    Custom {
        name: &'static str,
        evaluate: fn(&GameState) -> i32,
    },
}

impl Evaluator {
    pub fn name(&self) -> &'static str {
        match self {
            Evaluator::Balanced => "balanced",
            Evaluator::TetrisSeeking => "tetris-seeking",
            Evaluator::Custom { name, .. } => name,
        }
    }

    /// Identity used to tag cached qualities. Custom evaluators are keyed
    /// by their function pointer.
    pub fn id(&self) -> u64 {
        match self {
            Evaluator::Balanced => 1,
            Evaluator::TetrisSeeking => 2,
            Evaluator::Custom { evaluate, .. } => *evaluate as usize as u64,
        }
    }

    /// Quality of `state`, via its per-state cache.
    pub fn evaluate(&self, state: &GameState) -> i32 {
        state.cached_quality(self.id(), |state| self.evaluate_uncached(state))
    }

    fn evaluate_uncached(&self, state: &GameState) -> i32 {
        match self {
            Evaluator::Balanced => balanced_terms(state),
            Evaluator::TetrisSeeking => {
                let board = state.board();
                let right = board.width() as i8 - 1;
                let right_fill = (0..board.height() as i8)
                    .filter(|&y| board.is_occupied(right, y))
                    .count() as i32;
                balanced_terms(state)
                    + W_RIGHT_COLUMN_FILL * right_fill
                    + W_TETRIS * state.stats().tetrises as i32
            }
            Evaluator::Custom { evaluate, .. } => evaluate(state),
        }
    }
}

fn balanced_terms(state: &GameState) -> i32 {
    let board = state.board();

    let heights: Vec<i32> = (0..board.width() as i8)
        .map(|x| board.column_height(x) as i32)
        .collect();
    let aggregate_height: i32 = heights.iter().sum();
    let bumpiness: i32 = heights
        .iter()
        .tuple_windows()
        .map(|(a, b)| (a - b).abs())
        .sum();

    let mut quality = W_LINES * state.stats().lines as i32
        + W_AGGREGATE_HEIGHT * aggregate_height
        + W_HOLES * board.hole_count() as i32
        + W_BUMPINESS * bumpiness;

    if let Some(placed) = state.last_placed() {
        let shape = placed.shape();
        let (min_dx, max_dx) = shape_x_bounds(&shape);
        // Distance from the board's center line, in half-columns.
        let span2 = 2 * placed.x as i32 + min_dx as i32 + max_dx as i32;
        let center2 = board.width() as i32 - 1;
        quality += W_CENTER_DISTANCE * (span2 - center2).abs();

        let (_, max_dy) = shape_y_bounds(&shape);
        quality += W_LANDING_ROW * (placed.y as i32 + max_dy as i32);
    }

    quality
}
