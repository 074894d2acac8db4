use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use tetris_ai::core::{Board, GameState};
use tetris_ai::logging::Logger;
use tetris_ai::search::{max_worker_count, Evaluator, NodeCalculator, PruningPolicy, WorkerPool};
use tetris_ai::types::PieceKind;

fn mid_game_board() -> Board {
    let mut board = Board::default();
    // A ragged stack: a few partial rows with a column-0 well.
    for (offset, filled) in [(1usize, 9i8), (2, 8), (3, 9), (4, 7)] {
        for x in 1..=filled {
            board.set(x, (20 - offset) as i8, Some(PieceKind::J));
        }
    }
    board
}

fn bench_enumerate_placements(c: &mut Criterion) {
    let state = GameState::initial(mid_game_board());
    c.bench_function("enumerate_placements_t", |b| {
        b.iter(|| {
            let children = state.enumerate_placements(std::hint::black_box(PieceKind::T));
            std::hint::black_box(children.len())
        })
    });
}

fn bench_depth_two_search(c: &mut Criterion) {
    let workers = 4.min(max_worker_count());
    let pool = Arc::new(WorkerPool::new("bench-pool", workers, Logger::disabled()).expect("pool"));
    c.bench_function("search_depth_2_width_16", |b| {
        b.iter(|| {
            let mut calculator = NodeCalculator::new(
                GameState::initial(mid_game_board()),
                vec![PieceKind::I, PieceKind::T],
                vec![16, 8],
                Evaluator::Balanced,
                PruningPolicy::GlobalTopW,
                Arc::clone(&pool),
                Logger::disabled(),
            )
            .expect("valid inputs");
            calculator.start().expect("start");
            while !calculator.status().is_terminal() {
                std::thread::sleep(Duration::from_micros(50));
            }
            std::hint::black_box(calculator.node_count())
        })
    });
}

criterion_group!(benches, bench_enumerate_placements, bench_depth_two_search);
criterion_main!(benches);
