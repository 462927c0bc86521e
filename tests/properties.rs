//! Property tests for the engine invariants.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

use panda_match::core::rng::DeterministicRng;
use panda_match::game::{
    board::{Board, DEFAULT_MAX_ACCESSIBLE_LAYER},
    layout::{generate, validate, LayoutEntry, LevelLayout},
    tools::{self, Action, ActionError},
    CollectorBuffer, PlayerId, Position, SessionState, Tile, TileId, TileKind, BUFFER_CAPACITY,
};

fn kind_strategy() -> impl Strategy<Value = TileKind> {
    (0..TileKind::ALL.len()).prop_map(|i| TileKind::ALL[i])
}

fn generated_session(seed: u64, layers: u32) -> SessionState {
    let layout = generate(&mut DeterministicRng::new(seed), 5, 5, layers).unwrap();
    SessionState::new(
        [3; 16],
        PlayerId::new([4; 16]),
        1,
        &layout,
        DeterministicRng::new(seed),
        seed,
        DEFAULT_MAX_ACCESSIBLE_LAYER,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
}

/// Pick a random action that has a fair chance of being valid.
fn random_action(state: &SessionState, rng: &mut StdRng) -> Action {
    match rng.gen_range(0..10) {
        0 => Action::UseRemoveTool,
        1 => Action::UseWithdrawTool,
        2 => Action::UseShuffleTool,
        3 => match state.overflow().as_slice() {
            [] => Action::UseShuffleTool,
            tiles => Action::ReturnRemovedTile { tile_id: tiles[rng.gen_range(0..tiles.len())].id },
        },
        _ => {
            let accessible = state.board().accessible_tiles();
            if accessible.is_empty() {
                Action::UseShuffleTool
            } else {
                Action::Select { tile_id: accessible[rng.gen_range(0..accessible.len())].id }
            }
        }
    }
}

proptest! {
    #[test]
    fn validated_layouts_have_triplet_counts(kinds in prop::collection::vec(kind_strategy(), 0..60)) {
        let entries: Vec<LayoutEntry> = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| LayoutEntry::new(i as i32, 0, 0, *k))
            .collect();

        if let Ok(layout) = validate(LevelLayout(entries)) {
            for count in layout.kind_counts().values() {
                prop_assert_eq!(count % 3, 0);
            }
        }
    }

    #[test]
    fn generated_layouts_validate(seed in any::<u64>(), layers in 3u32..=8) {
        let layout = generate(&mut DeterministicRng::new(seed), 5, 5, layers).unwrap();
        prop_assert_eq!(layout.len() % 3, 0);
        for count in layout.kind_counts().values() {
            prop_assert_eq!(count % 3, 0);
        }
    }

    #[test]
    fn random_play_keeps_partition(seed in any::<u64>(), steps in 1usize..120) {
        let mut state = generated_session(seed, 3);
        let mut rng = StdRng::seed_from_u64(seed);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        for _ in 0..steps {
            if !state.is_active() || state.is_terminal() {
                break;
            }
            let action = random_action(&state, &mut rng);
            let before = state.clone();
            match tools::apply(&mut state, action, at) {
                Ok(_) => {
                    prop_assert!(state.buffer().len() <= BUFFER_CAPACITY);
                    prop_assert_eq!(state.score() % 10, 0);
                }
                Err(_) => {
                    prop_assert_eq!(&state, &before);
                }
            }
            prop_assert!(state.check_partition());
        }
    }

    #[test]
    fn resolve_matches_is_idempotent(kinds in prop::collection::vec(kind_strategy(), 0..=7)) {
        let tiles = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| Tile::new(TileId(i as u32 + 1), *k, Position::new(i as i32, 0, 0)))
            .collect();
        let mut buffer = CollectorBuffer::from_entries(tiles).unwrap();

        buffer.resolve_matches();
        let len = buffer.len();
        prop_assert!(buffer.resolve_matches().is_empty());
        prop_assert_eq!(buffer.len(), len);
    }

    #[test]
    fn select_fails_cleanly_on_full_buffer(seed in any::<u64>()) {
        let mut state = generated_session(seed, 4);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        // Fill the row with whatever is accessible until it is full
        while state.buffer().can_accept() {
            let Some(tile) = state.board().accessible_tiles().first().copied() else {
                break;
            };
            tools::apply(&mut state, Action::Select { tile_id: tile.id }, at).unwrap();
        }
        prop_assume!(state.buffer().is_full());

        if let Some(tile) = state.board().accessible_tiles().first().copied() {
            let before = state.clone();
            let result = tools::apply(&mut state, Action::Select { tile_id: tile.id }, at);
            prop_assert_eq!(result, Err(ActionError::BufferFull));
            prop_assert_eq!(&state, &before);
        }
    }

    #[test]
    fn occlusion_matches_footprint_rule(
        tiles in prop::collection::btree_set((0i32..4, 0i32..4, 0u32..4), 1..24),
    ) {
        let board = Board::from_tiles(
            tiles.iter().enumerate().map(|(i, (x, y, l))| {
                Tile::new(TileId(i as u32 + 1), TileKind::Leaf, Position::new(*x, *y, *l))
            }),
            DEFAULT_MAX_ACCESSIBLE_LAYER,
        )
        .unwrap();

        for (x, y, layer) in &tiles {
            let covered = tiles.iter().any(|(ox, oy, ol)| {
                *ol > *layer
                    && Position::FOOTPRINT.iter().any(|(dx, dy)| *ox == x + dx && *oy == y + dy)
            });
            let expected = *layer <= DEFAULT_MAX_ACCESSIBLE_LAYER && !covered;
            prop_assert_eq!(board.is_accessible(Position::new(*x, *y, *layer)), expected);
        }
    }
}
