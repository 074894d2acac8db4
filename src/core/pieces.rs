//! Pieces module - tetromino shapes.
//!
//! Each (kind, rotation) pair maps to four mino offsets inside a 4x4 shape
//! box. Rotation here is plain: a rotation succeeds iff the target shape
//! fits, there are no wall kicks. Pieces with rotational symmetry (O, and
//! the I/S/Z pairs) expose a reduced distinct-rotation set used by the
//! search's placement enumeration.

use crate::types::{PieceKind, Rotation};

/// Offset of a single mino relative to piece origin
pub type MinoOffset = (i8, i8);

/// Shape of a piece - 4 mino offsets from piece origin
pub type PieceShape = [MinoOffset; 4];

/// Get the shape (mino offsets) for a piece kind and rotation
pub fn get_shape(kind: PieceKind, rotation: Rotation) -> PieceShape {
    match kind {
        PieceKind::I => get_i_shape(rotation),
        PieceKind::O => get_o_shape(rotation),
        PieceKind::T => get_t_shape(rotation),
        PieceKind::S => get_s_shape(rotation),
        PieceKind::Z => get_z_shape(rotation),
        PieceKind::J => get_j_shape(rotation),
        PieceKind::L => get_l_shape(rotation),
    }
}

/// I piece shapes
fn get_i_shape(rotation: Rotation) -> PieceShape {
    match rotation {
        // N: horizontal, centered on row 1
        Rotation::North => [(0, 1), (1, 1), (2, 1), (3, 1)],
        // E: vertical, right-aligned
        Rotation::East => [(2, 0), (2, 1), (2, 2), (2, 3)],
        // S: horizontal, centered on row 2
        Rotation::South => [(0, 2), (1, 2), (2, 2), (3, 2)],
        // W: vertical, left-aligned
        Rotation::West => [(1, 0), (1, 1), (1, 2), (1, 3)],
    }
}

/// O piece shapes (same for all rotations)
fn get_o_shape(_rotation: Rotation) -> PieceShape {
    [(1, 0), (2, 0), (1, 1), (2, 1)]
}

/// T piece shapes
fn get_t_shape(rotation: Rotation) -> PieceShape {
    match rotation {
        Rotation::North => [(1, 0), (0, 1), (1, 1), (2, 1)],
        Rotation::East => [(1, 0), (1, 1), (2, 1), (1, 2)],
        Rotation::South => [(0, 1), (1, 1), (2, 1), (1, 2)],
        Rotation::West => [(1, 0), (0, 1), (1, 1), (1, 2)],
    }
}

/// S piece shapes
fn get_s_shape(rotation: Rotation) -> PieceShape {
    match rotation {
        Rotation::North => [(1, 0), (2, 0), (0, 1), (1, 1)],
        Rotation::East => [(1, 0), (1, 1), (2, 1), (2, 2)],
        Rotation::South => [(1, 1), (2, 1), (0, 2), (1, 2)],
        Rotation::West => [(0, 0), (0, 1), (1, 1), (1, 2)],
    }
}

/// Z piece shapes
fn get_z_shape(rotation: Rotation) -> PieceShape {
    match rotation {
        Rotation::North => [(0, 0), (1, 0), (1, 1), (2, 1)],
        Rotation::East => [(2, 0), (1, 1), (2, 1), (1, 2)],
        Rotation::South => [(0, 1), (1, 1), (1, 2), (2, 2)],
        Rotation::West => [(1, 0), (0, 1), (1, 1), (0, 2)],
    }
}

/// J piece shapes
fn get_j_shape(rotation: Rotation) -> PieceShape {
    match rotation {
        Rotation::North => [(0, 0), (0, 1), (1, 1), (2, 1)],
        Rotation::East => [(1, 0), (2, 0), (1, 1), (1, 2)],
        Rotation::South => [(0, 1), (1, 1), (2, 1), (2, 2)],
        Rotation::West => [(1, 0), (1, 1), (0, 2), (1, 2)],
    }
}

/// L piece shapes
fn get_l_shape(rotation: Rotation) -> PieceShape {
    match rotation {
        Rotation::North => [(2, 0), (0, 1), (1, 1), (2, 1)],
        Rotation::East => [(1, 0), (1, 1), (1, 2), (2, 2)],
        Rotation::South => [(0, 1), (1, 1), (2, 1), (0, 2)],
        Rotation::West => [(0, 0), (1, 0), (1, 1), (1, 2)],
    }
}

/// The distinct orientations of a piece, in enumeration order.
pub fn distinct_rotations(kind: PieceKind) -> &'static [Rotation] {
    match kind.distinct_rotations() {
        1 => &[Rotation::North],
        2 => &[Rotation::North, Rotation::East],
        _ => &[
            Rotation::North,
            Rotation::East,
            Rotation::South,
            Rotation::West,
        ],
    }
}

/// Horizontal extent of a shape: (min dx, max dx) over its minos.
pub fn shape_x_bounds(shape: &PieceShape) -> (i8, i8) {
    let mut min_dx = i8::MAX;
    let mut max_dx = i8::MIN;
    for &(dx, _) in shape {
        min_dx = min_dx.min(dx);
        max_dx = max_dx.max(dx);
    }
    (min_dx, max_dx)
}

/// Vertical extent of a shape: (min dy, max dy) over its minos.
pub fn shape_y_bounds(shape: &PieceShape) -> (i8, i8) {
    let mut min_dy = i8::MAX;
    let mut max_dy = i8::MIN;
    for &(_, dy) in shape {
        min_dy = min_dy.min(dy);
        max_dy = max_dy.max(dy);
    }
    (min_dy, max_dy)
}
