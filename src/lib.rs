//! Competitive Tetris play by asynchronous game-tree search.
//!
//! The crate is a library core with three layers:
//!
//! - [`core`]: the board semantics the search branches over - grids, piece
//!   shape tables, the bag generator, and the immutable [`core::GameState`]
//!   with its placement enumeration.
//! - [`search`]: a best-first, depth-layered parallel search. A
//!   [`search::NodeCalculator`] expands placements for a snapshotted piece
//!   queue over a [`search::WorkerPool`], trims each layer to a configured
//!   width, and continuously publishes its deepest completed best path.
//! - [`player`]: the live mutable [`player::Game`] behind one mutex, and
//!   the [`player::Computer`] facade whose timers launch searches and feed
//!   single-step moves to the game while the search is still running.
//!
//! Rendering, input handling and process setup are the embedder's business;
//! the crate's outward surface is plain method calls plus an injected
//! [`logging::LogSink`].

pub mod core;
pub mod error;
pub mod logging;
pub mod player;
pub mod search;
pub mod types;
pub mod util;

pub use crate::core::{BlockFactory, Board, GameState, GameStateStats, PieceBag, Tetromino};
pub use crate::error::Error;
pub use crate::logging::{LogLevel, LogSink, Logger};
pub use crate::player::{Computer, ComputerConfig, Game, SharedGame};
pub use crate::search::{CalculatorStatus, Evaluator, NodeCalculator, PruningPolicy, WorkerPool};
pub use crate::types::{Direction, MoveDownBehavior, PieceKind, Rotation, Spin};
