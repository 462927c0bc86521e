use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};

use panda_match::core::rng::DeterministicRng;
use panda_match::game::{
    board::{Board, DEFAULT_MAX_ACCESSIBLE_LAYER},
    layout::generate,
    tools::{self, Action},
    CollectorBuffer, PlayerId, Position, SessionState, Tile, TileId, TileKind,
};

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    for layers in [3u32, 8] {
        let layout = generate(&mut DeterministicRng::new(42), 8, 8, layers).unwrap();
        let mut board = Board::new(DEFAULT_MAX_ACCESSIBLE_LAYER);
        board.initialize(&layout);

        group.bench_function(format!("accessible_tiles/{layers}_layers"), |b| {
            b.iter(|| board.accessible_tiles().len());
        });
    }

    group.bench_function("resolve_matches/cascade", |b| {
        use TileKind::*;
        let kinds = [Leaf, Leaf, Fish, Fish, Fish, Leaf, Panda];
        let tiles: Vec<Tile> = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| Tile::new(TileId(i as u32 + 1), *k, Position::new(i as i32, 0, 0)))
            .collect();
        b.iter(|| {
            let mut buffer = CollectorBuffer::from_entries(tiles.clone()).unwrap();
            buffer.resolve_matches().len()
        });
    });

    group.bench_function("select_until_full", |b| {
        let layout = generate(&mut DeterministicRng::new(7), 5, 5, 4).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fresh = SessionState::new(
            [1; 16],
            PlayerId::new([2; 16]),
            1,
            &layout,
            DeterministicRng::new(7),
            7,
            DEFAULT_MAX_ACCESSIBLE_LAYER,
            at,
        );

        b.iter(|| {
            let mut state = fresh.clone();
            while state.buffer().can_accept() {
                let Some(tile) = state.board().accessible_tiles().first().copied() else {
                    break;
                };
                if tools::apply(&mut state, Action::Select { tile_id: tile.id }, at).is_err() {
                    break;
                }
            }
            state.score()
        });
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
