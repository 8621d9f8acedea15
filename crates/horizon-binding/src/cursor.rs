//! The position cursor of a currency manager.
//!
//! A [`PositionCursor`] owns the current index into one list. It keeps the
//! invariant that the position is `-1` exactly when the list is empty and a
//! valid row index otherwise. Every mutation returns the resulting
//! [`PositionChange`], if any, so the owning manager can raise notifications
//! in its own order.

use horizon_binding_core::logging::targets;

use crate::error::{BindingError, BindingResult};
use crate::list::ListIdentity;

/// A move of the cursor from one position to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChange {
    pub old: isize,
    pub new: isize,
}

impl PositionChange {
    /// The change from `old` to `new`, or `None` if they are equal.
    pub fn between(old: isize, new: isize) -> Option<Self> {
        (old != new).then_some(Self { old, new })
    }
}

/// Tracks the current position over a list of `count` rows.
#[derive(Debug, Clone)]
pub struct PositionCursor {
    position: isize,
    count: usize,
    list_identity: ListIdentity,
}

impl PositionCursor {
    /// Creates a cursor over a list of `count` rows, positioned on the first
    /// row if there is one.
    pub fn new(list_identity: ListIdentity, count: usize) -> Self {
        Self {
            position: if count == 0 { -1 } else { 0 },
            count,
            list_identity,
        }
    }

    /// The current position, `-1` when the list is empty.
    pub fn position(&self) -> isize {
        self.position
    }

    /// The row count the cursor was last synchronized with.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Identity of the list the cursor runs over.
    pub fn list_identity(&self) -> ListIdentity {
        self.list_identity
    }

    /// Moves to `position`.
    ///
    /// Setting the current position again is a no-op. On an empty list every
    /// request is ignored, since the only valid position is `-1`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::OutOfRange`] if the list is non-empty and
    /// `position` is outside `[0, count)`. The cursor is unchanged.
    pub fn set_position(&mut self, position: isize) -> BindingResult<Option<PositionChange>> {
        if self.count == 0 {
            return Ok(None);
        }
        if position < 0 || position as usize >= self.count {
            return Err(BindingError::out_of_range(position, self.count));
        }
        Ok(self.move_to(position))
    }

    /// Re-synchronizes with a list that now holds `count` rows.
    ///
    /// An empty list forces `-1`. Otherwise a position past the end is
    /// clamped to the last row before an unset position is moved to `0`.
    pub fn refresh(&mut self, count: usize) -> Option<PositionChange> {
        self.count = count;
        let target = if count == 0 {
            -1
        } else if self.position != -1 && self.position as usize >= count {
            count as isize - 1
        } else if self.position == -1 {
            0
        } else {
            self.position
        };
        tracing::trace!(target: targets::CURSOR, count, position = target, "refresh");
        self.move_to(target)
    }

    /// Binds the cursor to a different list of `count` rows.
    ///
    /// The cursor restarts at `-1` and is then refreshed, so it lands on the
    /// first row when the new list has any.
    pub fn rebind(&mut self, list_identity: ListIdentity, count: usize) -> Option<PositionChange> {
        let old = self.position;
        self.list_identity = list_identity;
        self.position = -1;
        self.refresh(count);
        PositionChange::between(old, self.position)
    }

    /// A row was inserted at `index`; the list now holds `count` rows.
    ///
    /// An insert at or before the current row keeps the cursor on that row.
    pub fn item_added(&mut self, index: usize, count: usize) -> Option<PositionChange> {
        if self.position >= 0 && index as isize <= self.position {
            self.count = count;
            let shifted = self.position + 1;
            return self.move_to(shifted);
        }
        self.refresh(count)
    }

    /// The row at `index` was removed; the list now holds `count` rows.
    ///
    /// A removal before the current row keeps the cursor on that row; removing
    /// the current row leaves the cursor at the same index, clamped.
    pub fn item_deleted(&mut self, index: usize, count: usize) -> Option<PositionChange> {
        if self.position > 0 && (index as isize) < self.position {
            self.count = count;
            let shifted = self.position - 1;
            return self.move_to(shifted);
        }
        self.refresh(count)
    }

    /// A row moved from `from` to `to`; the cursor follows the current row.
    pub fn item_moved(&mut self, from: usize, to: usize) -> Option<PositionChange> {
        if self.position < 0 {
            return None;
        }
        let (from, to) = (from as isize, to as isize);
        let target = if from == self.position {
            to
        } else if from < self.position && to >= self.position {
            self.position - 1
        } else if from > self.position && to <= self.position {
            self.position + 1
        } else {
            self.position
        };
        self.move_to(target)
    }

    fn move_to(&mut self, position: isize) -> Option<PositionChange> {
        let change = PositionChange::between(self.position, position)?;
        self.position = position;
        tracing::trace!(target: targets::CURSOR, old = change.old, new = change.new, "moved");
        Some(change)
    }
}
