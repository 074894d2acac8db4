//! End-to-end calculator scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tetris_ai::core::{Board, GameState};
use tetris_ai::logging::Logger;
use tetris_ai::search::{
    max_worker_count, CalculatorStatus, Evaluator, NodeCalculator, PruningPolicy, WorkerPool,
};
use tetris_ai::types::PieceKind;

// Clamped so multi-worker runs still build on low-core machines.
fn pool(workers: usize) -> Arc<WorkerPool> {
    let workers = workers.clamp(1, max_worker_count());
    Arc::new(WorkerPool::new("search-test", workers, Logger::disabled()).expect("pool size"))
}

fn calculator_on(
    board: Board,
    queue: Vec<PieceKind>,
    widths: Vec<usize>,
    evaluator: Evaluator,
    policy: PruningPolicy,
    workers: usize,
) -> NodeCalculator {
    NodeCalculator::new(
        GameState::initial(board),
        queue,
        widths,
        evaluator,
        policy,
        pool(workers),
        Logger::disabled(),
    )
    .expect("valid calculator inputs")
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn run_to_completion(calculator: &mut NodeCalculator) {
    calculator.start().expect("start");
    assert!(
        wait_until(Duration::from_secs(10), || calculator.status().is_terminal()),
        "calculator did not finish in time"
    );
}

/// Every consecutive pair of the published path must be reproducible by a
/// legal placement of the recorded piece.
fn assert_path_is_legal(path: &[GameState]) {
    for pair in path.windows(2) {
        let placed = pair[1].last_placed().expect("non-root node has placement");
        let replay = pair[0]
            .place(placed.kind, placed.rotation, placed.x)
            .expect("published placement must be legal");
        assert_eq!(replay.board(), pair[1].board());
        assert_eq!(replay.stats(), pair[1].stats());
    }
}

#[test]
fn single_o_piece_lands_centered() {
    let mut calculator = calculator_on(
        Board::default(),
        vec![PieceKind::O],
        vec![1],
        Evaluator::Balanced,
        PruningPolicy::GlobalTopW,
        1,
    );
    run_to_completion(&mut calculator);

    assert_eq!(calculator.status(), CalculatorStatus::Finished);
    assert_eq!(calculator.current_depth(), 1);

    let path = calculator.best_path();
    assert_eq!(path.len(), 2);

    let best = &path[1];
    // The O rests on the floor in the two middle columns.
    assert!(best.board().is_occupied(4, 18));
    assert!(best.board().is_occupied(5, 18));
    assert!(best.board().is_occupied(4, 19));
    assert!(best.board().is_occupied(5, 19));
    assert_eq!(best.stats().lines, 0);

    let evaluator = Evaluator::Balanced;
    assert!(evaluator.evaluate(best) > evaluator.evaluate(&path[0]));
    assert_path_is_legal(&path);
}

#[test]
fn vertical_i_takes_the_tetris() {
    let mut board = Board::default();
    // Four bottom rows filled except the left-most column.
    for y in 16..20 {
        for x in 1..10 {
            board.set(x, y, Some(PieceKind::J));
        }
    }

    let mut calculator = calculator_on(
        board,
        vec![PieceKind::I],
        vec![4],
        Evaluator::Balanced,
        PruningPolicy::GlobalTopW,
        2,
    );
    run_to_completion(&mut calculator);

    let path = calculator.best_path();
    assert_eq!(path.len(), 2);

    let best = &path[1];
    assert_eq!(best.stats().lines, 4);
    assert_eq!(best.stats().tetrises, 1);
    assert_eq!(best.stats().score(), 1200);
    assert_eq!(best.board().occupied_count(), 0);
}

#[test]
fn depth_three_search_completes() {
    let mut calculator = calculator_on(
        Board::default(),
        vec![PieceKind::I, PieceKind::O, PieceKind::T],
        vec![64, 32, 16],
        Evaluator::Balanced,
        PruningPolicy::GlobalTopW,
        4,
    );
    run_to_completion(&mut calculator);

    assert_eq!(calculator.status(), CalculatorStatus::Finished);
    assert_eq!(calculator.current_depth(), 3);
    let path = calculator.best_path();
    assert_eq!(path.len(), 4);
    assert_path_is_legal(&path);
    assert!(calculator.node_count() > 0);
}

#[test]
fn pruning_bounds_the_layer() {
    // Layer 1: 17 I placements pruned to 2 survivors; layer 2: each
    // survivor yields 9 O placements.
    let mut calculator = calculator_on(
        Board::default(),
        vec![PieceKind::I, PieceKind::O],
        vec![2, 16],
        Evaluator::Balanced,
        PruningPolicy::GlobalTopW,
        2,
    );
    run_to_completion(&mut calculator);

    assert_eq!(calculator.current_depth(), 2);
    assert_eq!(calculator.node_count(), 17 + 2 * 9);
}

#[test]
fn per_parent_pruning_also_completes() {
    let mut calculator = calculator_on(
        Board::default(),
        vec![PieceKind::I, PieceKind::O],
        vec![2, 16],
        Evaluator::Balanced,
        PruningPolicy::PerParent,
        2,
    );
    run_to_completion(&mut calculator);

    assert_eq!(calculator.current_depth(), 2);
    // The layer-2 child count pins layer 1's survivors at exactly
    // min(2, 17): each survivor contributes 9 O placements.
    assert_eq!(calculator.node_count(), 17 + 2 * 9);
    assert_path_is_legal(&calculator.best_path());
}

#[test]
fn stop_midway_finishes_gracefully() {
    let mut calculator = calculator_on(
        Board::default(),
        vec![
            PieceKind::I,
            PieceKind::T,
            PieceKind::L,
            PieceKind::J,
            PieceKind::S,
            PieceKind::Z,
        ],
        vec![128, 128, 128, 128, 128, 128],
        Evaluator::Balanced,
        PruningPolicy::GlobalTopW,
        2,
    );
    calculator.start().expect("start");
    assert!(
        wait_until(Duration::from_secs(10), || calculator.current_depth() >= 1),
        "first layer never completed"
    );
    calculator.stop();

    assert_eq!(calculator.status(), CalculatorStatus::Finished);
    assert_eq!(calculator.error_message(), None);

    let depth = calculator.current_depth();
    assert!(depth >= 1);
    let path = calculator.best_path();
    assert_eq!(path.len(), depth + 1);
    assert_path_is_legal(&path);
}

#[test]
fn deterministic_across_worker_counts() {
    let queue = vec![PieceKind::T, PieceKind::S, PieceKind::I];
    let widths = vec![16, 8, 4];

    let mut results = Vec::new();
    for workers in [1, 4] {
        let mut calculator = calculator_on(
            Board::default(),
            queue.clone(),
            widths.clone(),
            Evaluator::Balanced,
            PruningPolicy::GlobalTopW,
            workers,
        );
        run_to_completion(&mut calculator);
        assert_eq!(calculator.current_depth(), 3);

        let path = calculator.best_path();
        let placements: Vec<_> = path
            .iter()
            .skip(1)
            .map(|state| state.last_placed().unwrap())
            .collect();
        results.push((placements, calculator.node_count()));
    }

    assert_eq!(results[0], results[1]);
}

#[test]
fn publication_depth_is_monotonic() {
    let mut calculator = calculator_on(
        Board::default(),
        vec![PieceKind::I, PieceKind::O, PieceKind::T, PieceKind::L],
        vec![64, 48, 32, 16],
        Evaluator::Balanced,
        PruningPolicy::GlobalTopW,
        4,
    );
    calculator.start().expect("start");

    let mut last_depth = 0;
    let deadline = Instant::now() + Duration::from_secs(10);
    while !calculator.status().is_terminal() && Instant::now() < deadline {
        let depth = calculator.current_depth();
        assert!(depth >= last_depth, "depth went backwards");
        last_depth = depth;

        // Paths grow with the published depth and never exceed it.
        let path = calculator.best_path();
        assert!(!path.is_empty());
        assert!(path.len() <= 5);
        assert!(path.len() >= last_depth, "path shorter than published depth");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(calculator.status(), CalculatorStatus::Finished);
    assert_eq!(calculator.current_depth(), 4);
    assert_eq!(calculator.best_path().len(), 5);
}

static EVAL_CALLS: AtomicUsize = AtomicUsize::new(0);

fn panicking_evaluator(state: &GameState) -> i32 {
    // Let the first layer finish, then blow up during the second.
    if EVAL_CALLS.fetch_add(1, Ordering::SeqCst) > 40 {
        panic!("evaluator exploded");
    }
    -(state.board().max_height() as i32)
}

#[test]
fn worker_panic_moves_calculator_to_error() {
    EVAL_CALLS.store(0, Ordering::SeqCst);
    let mut calculator = calculator_on(
        Board::default(),
        vec![PieceKind::I, PieceKind::O, PieceKind::T],
        vec![8, 8, 8],
        Evaluator::Custom {
            name: "panicking",
            evaluate: panicking_evaluator,
        },
        PruningPolicy::GlobalTopW,
        2,
    );
    calculator.start().expect("start");
    assert!(
        wait_until(Duration::from_secs(10), || calculator.status().is_terminal()),
        "calculator never reached a terminal state"
    );

    assert_eq!(calculator.status(), CalculatorStatus::Error);
    let message = calculator.error_message().expect("error message stored");
    assert!(message.contains("evaluator exploded"));

    // The completed first layer stays readable.
    assert_eq!(calculator.current_depth(), 1);
    assert_eq!(calculator.best_path().len(), 2);
}
