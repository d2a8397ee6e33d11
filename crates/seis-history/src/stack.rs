use serde::{Deserialize, Serialize};

/// Undo/redo stack for one revision chain.
///
/// Slot 0 holds the baseline: the content to restore once every edit of the
/// chain has been undone, or `None` when the chain began with a creation.
/// The cursor never moves below the baseline or past the newest value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionUndoStack<R> {
    slots: Vec<Option<R>>,
    cursor: usize,
}

impl<R: Clone> RevisionUndoStack<R> {
    pub fn new(baseline: Option<R>) -> Self {
        Self {
            slots: vec![baseline],
            cursor: 0,
        }
    }

    /// Record a new value. Anything ahead of the cursor is discarded.
    pub fn push(&mut self, value: R) {
        self.slots.truncate(self.cursor + 1);
        self.slots.push(Some(value));
        self.cursor += 1;
    }

    /// Step back one value and return it. `None` means the revision should
    /// be removed.
    pub fn undo(&mut self) -> Option<R> {
        self.cursor = self.cursor.saturating_sub(1);
        self.value().cloned()
    }

    /// Step forward one value and return it.
    pub fn redo(&mut self) -> Option<R> {
        if self.cursor + 1 < self.slots.len() {
            self.cursor += 1;
        }
        self.value().cloned()
    }

    /// The value under the cursor.
    pub fn value(&self) -> Option<&R> {
        self.slots[self.cursor].as_ref()
    }

    pub fn baseline(&self) -> Option<&R> {
        self.slots[0].as_ref()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.slots.len()
    }

    /// Number of values recorded after the baseline.
    pub fn depth(&self) -> usize {
        self.slots.len() - 1
    }
}
