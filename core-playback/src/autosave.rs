//! Position autosave
//!
//! While an episode is current and playing, its position is saved every
//! `autosave_interval`. Any change to either condition tears the timer down
//! and re-arms it only if still applicable, so a tick can never save against
//! an episode that is no longer current.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::session::PlaybackController;
use crate::state::PlayerState;

pub struct PositionAutosave {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PositionAutosave {
    /// Spawn the autosave task. Must be called from within a Tokio runtime.
    pub fn start(controller: Arc<PlaybackController>) -> Self {
        let interval = controller.settings().autosave_interval;
        let handle = tokio::spawn(run(controller, interval));
        Self {
            task: Mutex::new(Some(handle)),
        }
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PositionAutosave {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Episode the timer should be armed for, if any.
fn armed_for(state: &PlayerState) -> Option<String> {
    if state.flags.is_playing {
        state.current_id().map(str::to_string)
    } else {
        None
    }
}

async fn run(controller: Arc<PlaybackController>, period: Duration) {
    let mut rx = controller.state().subscribe();

    loop {
        let target = armed_for(&rx.borrow_and_update());

        let Some(episode_id) = target else {
            if rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        debug!(episode_id = %episode_id, "Autosave armed");
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => controller.autosave(&episode_id).await,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    // Progress updates arrive constantly; only re-arm when
                    // the playing episode itself changed.
                    if armed_for(&rx.borrow_and_update()).as_deref() != Some(episode_id.as_str()) {
                        debug!(episode_id = %episode_id, "Autosave disarmed");
                        break;
                    }
                }
            }
        }
    }
}
