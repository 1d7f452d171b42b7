//! Observable state containers.
//!
//! A [`StateStore`] owns one slice of process-wide state. Every mutation runs
//! under the store's lock and then publishes the whole new slice to
//! subscribers, so observers never see a half-applied transition.
//!
//! ```rust
//! use core_runtime::StateStore;
//!
//! #[derive(Clone, Default, PartialEq, Debug)]
//! struct Counter {
//!     value: u32,
//! }
//!
//! let store = StateStore::new(Counter::default());
//! let rx = store.subscribe();
//! store.update(|c| c.value += 1);
//! assert_eq!(rx.borrow().value, 1);
//! ```

use parking_lot::Mutex;
use std::fmt;
use tokio::sync::watch;

pub struct StateStore<T> {
    state: Mutex<T>,
    sender: watch::Sender<T>,
}

impl<T: Clone> StateStore<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial.clone());
        Self {
            state: Mutex::new(initial),
            sender,
        }
    }

    /// Snapshot of the current slice.
    pub fn get(&self) -> T {
        self.state.lock().clone()
    }

    /// Read a projection of the current slice without cloning all of it.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.lock())
    }

    /// Apply a transition and publish the resulting slice.
    ///
    /// `f` must not call back into the same store.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.state.lock();
        let result = f(&mut guard);
        self.sender.send_replace(guard.clone());
        result
    }

    /// Replace the whole slice.
    pub fn replace(&self, value: T) {
        self.update(|state| *state = value);
    }

    /// Receive every published slice from now on.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone + Default> Default for StateStore<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for StateStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("state", &*self.state.lock())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
