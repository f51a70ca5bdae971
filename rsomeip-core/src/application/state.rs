//! Application state.

use tokio::sync::watch;

/// State of an [`super::Application`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// The application was created. This is the initial state.
    #[default]
    Created,
    /// The application acquired its resources.
    Initialized,
    /// The application is connected and may start communicating.
    Registered,
    /// The application is processing messages.
    Running,
    /// The application is stopped. This is the final state.
    Stopped,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Initialized => "INITIALIZED",
            Self::Registered => "REGISTERED",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// A watcher for application [`State`] changes.
#[derive(Debug)]
pub struct StateWatcher {
    inner: watch::Sender<State>,
}

impl StateWatcher {
    /// Creates a new [`StateWatcher`].
    pub fn new() -> Self {
        let (sender, _) = watch::channel(State::default());
        Self { inner: sender }
    }

    /// Returns the current [`State`].
    pub fn state(&self) -> State {
        *self.inner.borrow()
    }

    /// Moves from the state `from` to the state `to`.
    ///
    /// Returns `false`, without changing anything, if the current state is not `from`.
    pub fn advance(&self, from: State, to: State) -> bool {
        self.inner.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Sets the current state to [`State::Stopped`].
    ///
    /// Returns the previous state.
    pub fn stop(&self) -> State {
        self.inner.send_replace(State::Stopped)
    }

    /// Returns a receiver that observes state changes.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.inner.subscribe()
    }
}

impl Default for StateWatcher {
    fn default() -> Self {
        Self::new()
    }
}
