//! Shared plain types and constants.
//!
//! Pure data with no dependencies on the search or player layers.

/// Default board dimensions (visible playfield).
pub const BOARD_WIDTH: u8 = 10;
pub const BOARD_HEIGHT: u8 = 20;

/// Spawn position for the shape box of a freshly spawned piece.
pub const SPAWN_X: i8 = 3;
pub const SPAWN_Y: i8 = 0;

/// Line clear scoring (flat classic table, indexed by lines cleared).
pub const LINE_SCORES: [u32; 5] = [0, 40, 100, 300, 1200];

/// Hard limits recognized at construction time.
pub const MAX_SEARCH_DEPTH: usize = 6;
pub const MAX_LAYER_WIDTH: usize = 256;
pub const MAX_MOVES_PER_SECOND: u32 = 60;

/// Drop intervals by level (milliseconds), used by the gravity timer.
pub const DROP_INTERVALS: [u32; 9] = [1000, 800, 650, 500, 400, 320, 250, 200, 160];
pub const DROP_INTERVAL_FLOOR_MS: u32 = 120;

/// Tetromino piece kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    /// All seven kinds, in bag order.
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    /// Stable index used for table lookups.
    pub fn index(self) -> usize {
        match self {
            PieceKind::I => 0,
            PieceKind::O => 1,
            PieceKind::T => 2,
            PieceKind::S => 3,
            PieceKind::Z => 4,
            PieceKind::J => 5,
            PieceKind::L => 6,
        }
    }

    /// Number of distinct orientations (I/S/Z repeat after two, O after one).
    pub fn distinct_rotations(self) -> usize {
        match self {
            PieceKind::O => 1,
            PieceKind::I | PieceKind::S | PieceKind::Z => 2,
            PieceKind::T | PieceKind::J | PieceKind::L => 4,
        }
    }

    /// Single-letter label for log messages.
    pub fn as_str(self) -> &'static str {
        match self {
            PieceKind::I => "I",
            PieceKind::O => "O",
            PieceKind::T => "T",
            PieceKind::S => "S",
            PieceKind::Z => "Z",
            PieceKind::J => "J",
            PieceKind::L => "L",
        }
    }
}

/// Rotation states (North = spawn orientation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    North,
    East,
    South,
    West,
}

impl Rotation {
    /// Rotate clockwise
    pub fn rotate_cw(self) -> Self {
        match self {
            Rotation::North => Rotation::East,
            Rotation::East => Rotation::South,
            Rotation::South => Rotation::West,
            Rotation::West => Rotation::North,
        }
    }

    /// Rotate counter-clockwise
    pub fn rotate_ccw(self) -> Self {
        match self {
            Rotation::North => Rotation::West,
            Rotation::West => Rotation::South,
            Rotation::South => Rotation::East,
            Rotation::East => Rotation::North,
        }
    }

    /// Quarter-turn count from North.
    pub fn index(self) -> usize {
        match self {
            Rotation::North => 0,
            Rotation::East => 1,
            Rotation::South => 2,
            Rotation::West => 3,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % 4 {
            0 => Rotation::North,
            1 => Rotation::East,
            2 => Rotation::South,
            _ => Rotation::West,
        }
    }

    /// Collapse onto the piece's distinct-orientation set.
    ///
    /// For I/S/Z the South/West shapes repeat North/East; for O every
    /// orientation repeats North.
    pub fn normalize(self, kind: PieceKind) -> Self {
        Rotation::from_index(self.index() % kind.distinct_rotations())
    }
}

/// Horizontal step direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

/// Rotation step direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spin {
    Clockwise,
    CounterClockwise,
}

/// What the actuator does once rotation and column already match the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveDownBehavior {
    /// Leave vertical movement to gravity.
    None,
    /// One cell down per tick.
    #[default]
    Move,
    /// Immediate hard drop.
    Drop,
}

/// Cell on the board (None = empty, Some = filled with piece kind)
pub type Cell = Option<PieceKind>;
