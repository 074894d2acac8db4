//! RNG module - 7-bag random piece generation.
//!
//! Implements the "7-bag" randomization used by the live game and tests:
//! each bag holds one of every piece, shuffled; draws exhaust the bag
//! before the next one is generated. The generator is the in-crate stand-in
//! for an external bag shuffler; the search only ever sees a snapshotted
//! prefix of the sequence (`peek_queue`).
//!
//! A small LCG keeps the sequence deterministic per seed.

use crate::types::PieceKind;

/// Simple LCG (Linear Congruential Generator) RNG
/// Uses constants from Numerical Recipes
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u32,
}

impl SimpleRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u32) -> Self {
        // Avoid 0 seed which would produce all zeros
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u32
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }

    /// Generate random value in range [0, max)
    pub fn next_range(&mut self, max: u32) -> u32 {
        self.next_u32() % max
    }

    /// Shuffle a slice using Fisher-Yates
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.next_range((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }
}

/// Source of upcoming piece kinds.
///
/// The live game consumes one of these; embedders can hand in their own
/// shuffler, the in-crate [`PieceBag`] is the default. `preview` must
/// return exactly the kinds that subsequent `next` calls will yield.
pub trait BlockFactory: Send {
    fn next(&mut self) -> PieceKind;
    fn preview(&self, count: usize) -> Vec<PieceKind>;
}

/// 7-bag piece generator with unbounded lookahead.
#[derive(Debug, Clone)]
pub struct PieceBag {
    /// Current bag of pieces
    bag: [PieceKind; 7],
    /// Index into current bag
    bag_index: usize,
    /// RNG for shuffling
    rng: SimpleRng,
}

impl PieceBag {
    /// Create a new generator with the given seed
    pub fn new(seed: u32) -> Self {
        let mut bag = Self {
            bag: PieceKind::ALL,
            bag_index: 0,
            rng: SimpleRng::new(seed),
        };
        bag.refill();
        bag
    }

    fn refill(&mut self) {
        self.bag = PieceKind::ALL;
        self.rng.shuffle(&mut self.bag);
        self.bag_index = 0;
    }

    /// Draw the next piece from the queue
    pub fn draw(&mut self) -> PieceKind {
        if self.bag_index >= self.bag.len() {
            self.refill();
        }
        let piece = self.bag[self.bag_index];
        self.bag_index += 1;
        piece
    }

    /// Peek at the next piece without removing it
    pub fn peek(&self) -> PieceKind {
        self.clone().draw()
    }

    /// Snapshot the next `count` pieces without consuming them.
    ///
    /// Simulates future bags on a cloned generator, so any lookahead length
    /// works and the main sequence is untouched.
    pub fn peek_queue(&self, count: usize) -> Vec<PieceKind> {
        let mut preview = self.clone();
        (0..count).map(|_| preview.draw()).collect()
    }

    /// Current RNG state (for restarting a game with the same sequence).
    pub fn seed(&self) -> u32 {
        self.rng.state
    }

    #[cfg(test)]
    fn remaining(&self) -> &[PieceKind] {
        &self.bag[self.bag_index..]
    }
}

impl Default for PieceBag {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BlockFactory for PieceBag {
    fn next(&mut self) -> PieceKind {
        self.draw()
    }

    fn preview(&self, count: usize) -> Vec<PieceKind> {
        self.peek_queue(count)
    }
}
