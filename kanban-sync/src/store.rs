//! BoardStore - canonical in-memory board state
//!
//! The store holds one immutable [`BoardSnapshot`] behind a lock and swaps it
//! wholesale on every write, so readers and subscribers only ever see a
//! complete board. Listeners run after the lock is released, one board at a
//! time and in version order; a board already superseded by a delivered one
//! is skipped. A listener must not write to the store it listens to.

use crate::types::{BoardSnapshot, Column, Item};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::trace;

/// Callback invoked with the new board after every replacement
pub type Listener = Arc<dyn Fn(&BoardSnapshot) + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, Listener)>>;

struct State {
    board: Arc<BoardSnapshot>,
    version: u64,
}

/// In-memory board shared by the UI and the mutation pipeline
pub struct BoardStore {
    state: RwLock<State>,
    listeners: Arc<ListenerList>,
    next_listener: Mutex<u64>,
    /// Version of the last board handed to listeners
    delivered: Mutex<u64>,
}

impl BoardStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_board(BoardSnapshot::default())
    }

    /// Create a store holding `board`
    pub fn with_board(board: BoardSnapshot) -> Self {
        Self {
            state: RwLock::new(State {
                board: Arc::new(board),
                version: 0,
            }),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: Mutex::new(0),
            delivered: Mutex::new(0),
        }
    }

    /// The current board. Cheap: the snapshot is shared, not copied.
    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&self.read().board)
    }

    /// Number of replacements applied since creation
    pub fn version(&self) -> u64 {
        self.read().version
    }

    /// Initial load from the remote service
    pub fn hydrate(&self, columns: Vec<Column>, items: Vec<Item>) {
        self.restore(BoardSnapshot::new(columns, items));
    }

    /// Replace every column, keeping items as they are
    pub fn replace_columns(&self, columns: Vec<Column>) {
        self.replace_with(|current| BoardSnapshot::new(columns, current.items.clone()));
    }

    /// Replace every item, keeping columns as they are
    pub fn replace_items(&self, items: Vec<Item>) {
        self.replace_with(|current| BoardSnapshot::new(current.columns.clone(), items));
    }

    /// Replace columns and items in one step
    pub fn restore(&self, board: BoardSnapshot) {
        self.replace_with(|_| board);
    }

    /// Compute the next board from the current one and swap it in while
    /// holding the write lock. Returns the board that was replaced.
    ///
    /// When `next` fails nothing is replaced and no listener runs.
    pub(crate) fn try_update<E>(
        &self,
        next: impl FnOnce(&Arc<BoardSnapshot>) -> Result<BoardSnapshot, E>,
    ) -> Result<Arc<BoardSnapshot>, E> {
        let (previous, current, version) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let board = Arc::new(next(&state.board)?);
            let previous = std::mem::replace(&mut state.board, Arc::clone(&board));
            state.version += 1;
            trace!(version = state.version, "board replaced");
            (previous, board, state.version)
        };
        self.notify(&current, version);
        Ok(previous)
    }

    fn replace_with(&self, next: impl FnOnce(&Arc<BoardSnapshot>) -> BoardSnapshot) {
        let _ = self.try_update(|current| Ok::<_, std::convert::Infallible>(next(current)));
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or explicitly unsubscribed.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe(
        &self,
        listener: impl Fn(&BoardSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let id = {
            let mut next = self
                .next_listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, board: &BoardSnapshot, version: u64) {
        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        if *delivered >= version {
            trace!(version, delivered = *delivered, "skipping superseded board");
            return;
        }
        *delivered = version;

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(board);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BoardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardStore")
            .field("version", &self.version())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by [`BoardStore::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Remove the listener now
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
