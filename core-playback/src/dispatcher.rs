//! Engine event dispatcher
//!
//! Exactly one listener consumes the engine's event stream for the lifetime
//! of the app. The dispatcher is owned by the composition root; a second
//! [`EngineEventDispatcher::attach`] call is refused instead of registering a
//! duplicate listener that would, for example, advance the queue twice on a
//! single track end.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::PlaybackController;

pub struct EngineEventDispatcher {
    controller: Arc<PlaybackController>,
    attached: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EngineEventDispatcher {
    pub fn new(controller: Arc<PlaybackController>) -> Self {
        Self {
            controller,
            attached: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Subscribe to the engine and start dispatching.
    ///
    /// Returns `false` if a listener is already attached. Must be called
    /// from within a Tokio runtime.
    pub fn attach(&self) -> bool {
        if self.attached.swap(true, Ordering::SeqCst) {
            debug!("Engine listener already attached");
            return false;
        }

        let mut events = self.controller.engine().events();
        let controller = Arc::clone(&self.controller);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => controller.handle_engine_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Engine listener lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        info!("Engine event stream closed");
                        break;
                    }
                }
            }
        });

        *self.task.lock() = Some(handle);
        info!("Engine listener attached");
        true
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Stop dispatching. A later [`attach`](Self::attach) starts a fresh
    /// listener.
    pub fn detach(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.attached.store(false, Ordering::SeqCst);
    }
}

impl Drop for EngineEventDispatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
