//! Undo/redo history over whole-state snapshots
//!
//! Linear history: recording a new snapshot discards everything that
//! could have been redone. States are stored by value, so a restored state
//! cannot be changed by later edits to the live one.

/// Undo and redo stacks of state snapshots
pub struct HistoryManager<T: Clone> {
    undo_stack: Vec<T>,
    redo_stack: Vec<T>,
    /// Maximum undo depth, 0 = unlimited
    limit: usize,
}

impl<T: Clone> HistoryManager<T> {
    /// Create an empty history keeping at most `limit` undo steps
    /// (0 keeps everything)
    pub fn new(limit: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit,
        }
    }

    /// Record the state before an edit
    pub fn snapshot(&mut self, state: &T) {
        self.undo_stack.push(state.clone());
        self.redo_stack.clear();

        if self.limit > 0 && self.undo_stack.len() > self.limit {
            let excess = self.undo_stack.len() - self.limit;
            self.undo_stack.drain(..excess);
        }
    }

    /// Step back; returns `current` unchanged if there is nothing to undo
    pub fn undo(&mut self, current: T) -> T {
        match self.undo_stack.pop() {
            Some(previous) => {
                self.redo_stack.push(current);
                previous
            }
            None => current,
        }
    }

    /// Step forward; returns `current` unchanged if there is nothing to redo
    pub fn redo(&mut self, current: T) -> T {
        match self.redo_stack.pop() {
            Some(next) => {
                self.undo_stack.push(current);
                next
            }
            None => current,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl<T: Clone> Default for HistoryManager<T> {
    fn default() -> Self {
        Self::new(0)
    }
}
