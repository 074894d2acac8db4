//! Player module - the live game and the computer driving it.

pub mod block_mover;
pub mod computer;
pub mod game;
pub mod gravity;

pub use block_mover::{plan_step, BlockMover, PlannedStep};
pub use computer::{Computer, ComputerConfig};
pub use game::{shared_game, Game, GameSnapshot, SharedGame};
pub use gravity::Gravity;

/// Schedule-on-ui bridge: runs a deferred action on the embedder's thread
/// of choice. Used to marshal actuator steps when the embedding is
/// single-threaded on the UI side.
pub type PostAction = std::sync::Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;
