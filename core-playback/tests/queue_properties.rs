//! Queue/history invariants under arbitrary operation sequences

mod common;

use common::{e, harness, harness_with, ids};
use core_playback::state::{load_player_state, HISTORY_LIMIT};
use core_playback::PreviousOutcome;
use core_runtime::config::PlaybackSettings;
use std::collections::HashSet;

/// Deterministic pseudo-random sequence (64-bit LCG).
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u32) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) % bound as u64) as u32
    }
}

fn assert_invariants(h: &common::Harness, step: usize) {
    let state = h.controller.snapshot();

    if let Some(current) = state.current_id() {
        assert!(
            !state.queue_contains(current),
            "step {}: current {} also queued",
            step,
            current
        );
    }

    let mut seen = HashSet::new();
    for item in &state.queue {
        assert!(
            seen.insert(item.episode.id.clone()),
            "step {}: {} queued twice",
            step,
            item.episode.id
        );
    }

    assert!(state.history.len() <= HISTORY_LIMIT, "step {}", step);
}

#[tokio::test]
async fn test_enqueue_is_idempotent() {
    let h = harness_with(PlaybackSettings::default(), 5);
    let ledger = h.ledger();
    ledger.set_current(e(1)).await;

    assert!(ledger.enqueue(e(2)).await);
    assert!(!ledger.enqueue(e(2)).await);
    assert!(!ledger.enqueue(e(1)).await);
    assert!(ledger.enqueue(e(3)).await);

    assert_eq!(h.queue_ids(), ids(&["E2", "E3"]));
}

#[tokio::test]
async fn test_history_is_bounded() {
    let h = harness_with(PlaybackSettings::default(), 25);
    for n in 1..=25 {
        h.ledger().set_current(e(n)).await;
    }

    let history = h.history_ids();
    assert_eq!(history.len(), HISTORY_LIMIT);
    assert_eq!(history.first().map(String::as_str), Some("E24"));
    assert_eq!(history.last().map(String::as_str), Some("E5"));
}

#[tokio::test]
async fn test_current_never_queued() {
    let h = harness_with(PlaybackSettings::default(), 8);
    let ledger = h.ledger();
    let mut rng = Lcg(0x5eed);

    for step in 0..400 {
        let n = rng.next(8) + 1;
        match rng.next(10) {
            0 | 1 => {
                ledger.enqueue(e(n)).await;
            }
            2 => ledger.set_current(e(n)).await,
            3 => {
                ledger.play_next().await;
            }
            4 => {
                ledger.play_previous().await;
            }
            5 => {
                ledger.remove_from_queue(&format!("E{}", n)).await;
            }
            6 => {
                let len = h.queue_ids().len().max(1) as u32;
                ledger
                    .reorder_queue(rng.next(len) as usize, rng.next(len) as usize)
                    .await;
            }
            7 => {
                let picks = (0..rng.next(5)).map(|_| e(rng.next(8) + 1)).collect();
                ledger.set_queue(picks).await;
            }
            8 => {
                ledger.next_in_series().await;
            }
            _ => {
                ledger.play_previous_in_series().await;
            }
        }
        assert_invariants(&h, step);
    }
}

#[tokio::test]
async fn test_restart_threshold_boundary() {
    for (position_ms, restarts) in [
        (0, false),
        (2_999, false),
        (3_000, false),
        (3_001, true),
        (600_000, true),
    ] {
        let h = harness();
        h.controller.play_episode(e(1), false).await.unwrap();
        h.controller.skip_next().await.unwrap();
        h.set_position(position_ms);

        let outcome = h.controller.skip_previous().await.unwrap();
        if restarts {
            assert_eq!(outcome, PreviousOutcome::Restarted, "at {}", position_ms);
        } else {
            assert_eq!(outcome, PreviousOutcome::Navigated(e(1)), "at {}", position_ms);
        }
    }
}

#[tokio::test]
async fn test_inclusive_restart_threshold() {
    let settings = PlaybackSettings::default().with_restart_threshold(3_000, true);
    for (position_ms, restarts) in [(2_999, false), (3_000, true)] {
        let h = harness_with(settings.clone(), 3);
        h.controller.play_episode(e(1), false).await.unwrap();
        h.controller.skip_next().await.unwrap();
        h.set_position(position_ms);

        let outcome = h.controller.skip_previous().await.unwrap();
        if restarts {
            assert_eq!(outcome, PreviousOutcome::Restarted, "at {}", position_ms);
        } else {
            assert_eq!(outcome, PreviousOutcome::Navigated(e(1)), "at {}", position_ms);
        }
    }
}

#[tokio::test]
async fn test_persisted_slice_rehydrates() {
    let h = harness_with(PlaybackSettings::default(), 4);
    h.controller.play_episode(e(1), false).await.unwrap();
    h.controller.skip_next().await.unwrap();
    h.controller.set_speed(1.5).await.unwrap();

    let restored = load_player_state(h.store.as_ref(), 1.0).await;

    assert_eq!(restored.current_id(), Some("E2"));
    let queue: Vec<_> = restored.queue.iter().map(|i| i.episode.id.clone()).collect();
    assert_eq!(queue, ids(&["E3", "E4"]));
    let history: Vec<_> = restored.history.iter().map(|ep| ep.id.clone()).collect();
    assert_eq!(history, ids(&["E1"]));
    assert_eq!(restored.playback_speed, 1.5);
    assert!(!restored.flags.appears_playing());
}
