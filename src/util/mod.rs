//! Small concurrency utilities shared by the search and player layers.

pub mod latch;
pub mod protected;
pub mod timer;

pub use latch::Latch;
pub use protected::Protected;
pub use timer::Timer;
