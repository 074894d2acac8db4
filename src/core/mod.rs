//! Core module - board semantics and transition rules.
//!
//! Pure game rules with no threads and no I/O: the grid, the piece shape
//! tables, the bag generator, and the immutable state the search branches
//! over.

pub mod board;
pub mod game_state;
pub mod pieces;
pub mod rng;
pub mod stats;

// Re-export commonly used types
pub use board::Board;
pub use game_state::{GameState, Tetromino};
pub use pieces::{distinct_rotations, get_shape};
pub use rng::{BlockFactory, PieceBag, SimpleRng};
pub use stats::GameStateStats;
