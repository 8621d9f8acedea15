//! The currency manager.
//!
//! A [`CurrencyManager`] keeps the "current row" of one bound list. It
//! combines a [`PositionCursor`] with pending-edit tracking, add-new
//! transactions and the propagation of parent row changes to relation
//! children, and announces everything through [`CurrencySignals`].
//!
//! # States
//!
//! | State | Position | Pending edit |
//! |-------|----------|--------------|
//! | Empty | `-1` | none |
//! | Positioned | valid row | none |
//! | Editing | valid row | plain edit |
//! | AddingNew | valid row | add-new edit |
//!
//! # Notification order
//!
//! When one operation raises more than one of `item_changed`,
//! `current_changed` and `position_changed`, they are raised in that order.
//! `current_changed` is only raised when the current row object differs
//! from the previous one. List notifications the manager forwards on
//! `list_changed` come first for changes made by someone else, and last for
//! changes the manager made itself through `add_new` or a cancel.
//!
//! Relation children are re-materialized before the parent raises its own
//! notifications, so a handler of the parent's `current_changed` already
//! sees the new child rows.
//!
//! # Reentrancy
//!
//! No lock is held while notifications are raised or while the bound list is
//! mutated, so handlers may call back into the manager. A nested call
//! completes, including its notifications, before the outer call raises its
//! remaining ones.

use std::mem;
use std::sync::{Arc, Weak};

use horizon_binding_core::logging::{span_names, targets};
use horizon_binding_core::{ConnectionId, PerfSpan, Signal, ThreadAffinity};
use parking_lot::{Mutex, RwLock};

use crate::config::{BindingConfig, PendingEditPolicy};
use crate::cursor::{PositionChange, PositionCursor};
use crate::error::{BindingError, BindingResult};
use crate::graph::ListKind;
use crate::list::{BindableList, ListChangedEvent, ListChangedType, ListIdentity, RowHandle, same_row};
use crate::registry::{ManagerId, RegistryStore};

/// Notifications raised by a [`CurrencyManager`].
///
/// Slots run synchronously on the thread that triggered the change.
pub struct CurrencySignals {
    /// The position moved. Carries the new position.
    pub position_changed: Signal<isize>,
    /// The current row object changed.
    pub current_changed: Signal<()>,
    /// Row contents changed. Carries the row index, or `-1` when the shape
    /// of the list changed rather than one specific row.
    pub item_changed: Signal<isize>,
    /// The row schema changed.
    pub meta_data_changed: Signal<()>,
    /// The bound list reported a change.
    pub list_changed: Signal<ListChangedEvent>,
}

impl CurrencySignals {
    fn new() -> Self {
        Self {
            position_changed: Signal::new(),
            current_changed: Signal::new(),
            item_changed: Signal::new(),
            meta_data_changed: Signal::new(),
            list_changed: Signal::new(),
        }
    }
}

/// A row edit that has not been committed or rolled back yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEdit {
    /// `true` if the row was appended by `add_new`.
    pub is_add_new: bool,
    /// Index of the edited row.
    pub edit_index: usize,
}

impl PendingEdit {
    fn add_new(edit_index: usize) -> Self {
        Self {
            is_add_new: true,
            edit_index,
        }
    }

    fn edit(edit_index: usize) -> Self {
        Self {
            is_add_new: false,
            edit_index,
        }
    }

    fn after_insert(self, index: usize) -> Option<Self> {
        if index <= self.edit_index {
            Some(Self {
                edit_index: self.edit_index + 1,
                ..self
            })
        } else {
            Some(self)
        }
    }

    fn after_delete(self, index: usize) -> Option<Self> {
        if index == self.edit_index {
            None
        } else if index < self.edit_index {
            Some(Self {
                edit_index: self.edit_index - 1,
                ..self
            })
        } else {
            Some(self)
        }
    }

    fn after_move(self, from: usize, to: usize) -> Option<Self> {
        let edit_index = if from == self.edit_index {
            to
        } else if from < self.edit_index && to >= self.edit_index {
            self.edit_index - 1
        } else if from > self.edit_index && to <= self.edit_index {
            self.edit_index + 1
        } else {
            self.edit_index
        };
        Some(Self { edit_index, ..self })
    }

    fn after_reset(self, count: usize) -> Option<Self> {
        (self.edit_index < count).then_some(self)
    }
}

/// A notification computed under the state lock and raised after it is
/// released.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CurrencyEvent {
    ItemChanged(isize),
    CurrentChanged,
    PositionChanged(isize),
    MetaDataChanged,
    ListChanged(ListChangedEvent),
}

#[derive(Default)]
struct Outcome {
    events: Vec<CurrencyEvent>,
    /// Relation children must follow the new current row.
    propagate: bool,
}

impl Outcome {
    fn push(&mut self, event: CurrencyEvent) {
        self.events.push(event);
    }
}

struct ManagerState {
    list: Arc<dyn BindableList>,
    cursor: PositionCursor,
    /// The row at the cursor when notifications were last computed.
    current: Option<RowHandle>,
    pending: Option<PendingEdit>,
    suspended: bool,
    list_connection: Option<ConnectionId>,
    /// Nesting depth of list mutations made by the manager itself. List
    /// notifications raised meanwhile are queued in `deferred`.
    deferring: usize,
    deferred: Vec<ListChangedEvent>,
}

/// Tracks the current position over one bound list.
///
/// Managers are created and owned by a
/// [`ManagerRegistry`](crate::ManagerRegistry); use
/// [`get_manager`](crate::ManagerRegistry::get_manager) to obtain one.
///
/// The bound list is read while the manager's state lock is held, but never
/// mutated; lists must not call back into the manager from `count` or `row`.
pub struct CurrencyManager {
    id: ManagerId,
    path: String,
    kind: ListKind,
    config: BindingConfig,
    affinity: ThreadAffinity,
    weak_self: Weak<CurrencyManager>,
    state: Mutex<ManagerState>,
    dependents: Mutex<Vec<ManagerId>>,
    registry: Weak<RwLock<RegistryStore>>,
    signals: CurrencySignals,
}

impl CurrencyManager {
    pub(crate) fn new(
        id: ManagerId,
        path: String,
        list: Arc<dyn BindableList>,
        kind: ListKind,
        config: BindingConfig,
        registry: Weak<RwLock<RegistryStore>>,
        affinity: ThreadAffinity,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self: &Weak<Self>| {
            let cursor = PositionCursor::new(ListIdentity::of(&list), list.count());
            let current = row_at(&list, cursor.position());
            let list_connection = connect_list(weak_self.clone(), &list);
            Self {
                id,
                path,
                kind,
                config,
                affinity,
                weak_self: weak_self.clone(),
                state: Mutex::new(ManagerState {
                    list,
                    cursor,
                    current,
                    pending: None,
                    suspended: false,
                    list_connection,
                    deferring: 0,
                    deferred: Vec::new(),
                }),
                dependents: Mutex::new(Vec::new()),
                registry,
                signals: CurrencySignals::new(),
            }
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The id of this manager within its registry.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// The canonical relation path this manager was resolved for. Empty for
    /// a root list.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The kind of list this manager is bound to.
    pub fn kind(&self) -> &ListKind {
        &self.kind
    }

    /// The notifications of this manager.
    pub fn signals(&self) -> &CurrencySignals {
        &self.signals
    }

    /// The current position, `-1` when the bound list is empty.
    pub fn position(&self) -> isize {
        self.state.lock().cursor.position()
    }

    /// The number of rows in the bound list.
    pub fn count(&self) -> usize {
        self.state.lock().list.count()
    }

    /// The bound list. For relation children this is the list materialized
    /// for the parent's current row.
    pub fn list(&self) -> Arc<dyn BindableList> {
        self.state.lock().list.clone()
    }

    /// The current row.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::UninitializedAccess`] if the position is `-1`.
    pub fn current(&self) -> BindingResult<RowHandle> {
        let state = self.state.lock();
        let position = state.cursor.position();
        if position < 0 {
            return Err(BindingError::UninitializedAccess);
        }
        state
            .list
            .row(position as usize)
            .ok_or_else(|| BindingError::out_of_range(position, state.list.count()))
    }

    /// The current row, or `None` if the position is `-1`.
    pub fn current_row(&self) -> Option<RowHandle> {
        let state = self.state.lock();
        row_at(&state.list, state.cursor.position())
    }

    /// The row at `index` of the bound list.
    pub fn row(&self, index: usize) -> Option<RowHandle> {
        self.state.lock().list.row(index)
    }

    /// The pending edit, if any.
    pub fn pending_edit(&self) -> Option<PendingEdit> {
        self.state.lock().pending
    }

    /// Ids of the relation children that follow this manager's current row.
    pub fn dependents(&self) -> Vec<ManagerId> {
        self.dependents.lock().clone()
    }

    pub(crate) fn add_dependent(&self, id: ManagerId) {
        let mut dependents = self.dependents.lock();
        if !dependents.contains(&id) {
            dependents.push(id);
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Moves to `position`.
    ///
    /// A pending plain edit is committed before moving; a pending add-new row
    /// stays pending. Setting the current position again does nothing, and
    /// on an empty list or while binding is suspended a valid request is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::OutOfRange`] if the list is non-empty and
    /// `position` is outside `[0, count)`, suspended or not. Nothing changes
    /// in that case.
    #[tracing::instrument(skip(self), fields(id = ?self.id), target = "horizon_binding::manager", level = "trace")]
    pub fn set_position(&self, position: isize) -> BindingResult<()> {
        self.check_thread();
        let commit = {
            let mut state = self.state.lock();
            if position == state.cursor.position() {
                return Ok(());
            }
            let count = state.list.count();
            if count == 0 {
                return Ok(());
            }
            if position < 0 || position as usize >= count {
                return Err(BindingError::out_of_range(position, count));
            }
            if state.suspended {
                return Ok(());
            }
            match state.pending {
                Some(edit) if !edit.is_add_new => {
                    state.pending = None;
                    Some((state.list.clone(), edit.edit_index))
                }
                _ => None,
            }
        };

        if let Some((list, edit_index)) = commit {
            tracing::debug!(target: targets::MANAGER, id = ?self.id, edit_index, "committing edit before move");
            list.end_edit(edit_index);
        }

        let (outcome, result) = {
            let mut state = self.state.lock();
            let old = state.cursor.position();
            let count = state.list.count();
            state.cursor.refresh(count);
            let result = state.cursor.set_position(position).map(|_| ());
            let change = PositionChange::between(old, state.cursor.position());
            let mut outcome = Outcome::default();
            self.settle(&mut state, &mut outcome, change);
            (outcome, result)
        };

        tracing::debug!(target: targets::MANAGER, id = ?self.id, position, "position set");
        self.dispatch(outcome);
        result
    }

    /// Moves to `position` clamped to the valid range.
    pub fn set_position_saturating(&self, position: isize) -> BindingResult<()> {
        let count = self.count();
        if count == 0 {
            return Ok(());
        }
        self.set_position(position.clamp(0, count as isize - 1))
    }

    /// Moves by `delta` rows, stopping at the first and last row.
    pub fn move_by(&self, delta: isize) -> BindingResult<()> {
        let position = self.position();
        self.set_position_saturating(position.saturating_add(delta))
    }

    /// Moves to the first row.
    pub fn move_first(&self) -> BindingResult<()> {
        self.set_position_saturating(0)
    }

    /// Moves to the last row.
    pub fn move_last(&self) -> BindingResult<()> {
        self.set_position_saturating(isize::MAX)
    }

    /// Moves to the next row, staying on the last one.
    pub fn move_next(&self) -> BindingResult<()> {
        self.move_by(1)
    }

    /// Moves to the previous row, staying on the first one.
    pub fn move_previous(&self) -> BindingResult<()> {
        self.move_by(-1)
    }

    // =========================================================================
    // Edit transactions
    // =========================================================================

    /// Appends a new row through the list's add-new capability and moves to
    /// it. Returns the index of the new row.
    ///
    /// A pending edit is committed first. With
    /// [`PendingEditPolicy::Reject`], a pending add-new row fails the call
    /// instead.
    ///
    /// Raises `item_changed(-1)`, `current_changed`, `position_changed` and
    /// then the list's own `ItemAdded` notification.
    ///
    /// # Errors
    ///
    /// - [`BindingError::NotSupported`] if the list cannot add rows
    /// - [`BindingError::EditInProgress`] under the strict policy
    ///
    /// The manager is unchanged when an error is returned.
    #[tracing::instrument(skip(self), fields(id = ?self.id), target = "horizon_binding::manager", level = "trace")]
    pub fn add_new(&self) -> BindingResult<usize> {
        self.check_thread();
        {
            let state = self.state.lock();
            if let Some(edit) = state.pending
                && edit.is_add_new
                && self.config.pending_edit_policy == PendingEditPolicy::Reject
            {
                return Err(BindingError::EditInProgress {
                    edit_index: edit.edit_index,
                });
            }
            if !state.list.supports_add_new() {
                return Err(BindingError::not_supported("add-new"));
            }
        }

        self.end_current_edit()?;

        let (result, deferred) = self.with_list_deferred(|list| list.add_new());
        let index = match result {
            Ok(index) => index,
            Err(err) => {
                self.forward_deferred(deferred);
                return Err(err);
            }
        };

        let outcome = {
            let mut state = self.state.lock();
            let count = state.list.count();
            let old = state.cursor.position();
            state.cursor.refresh(count);
            state.cursor.set_position(index as isize)?;
            let change = PositionChange::between(old, state.cursor.position());
            state.pending = Some(PendingEdit::add_new(index));

            let mut outcome = Outcome::default();
            outcome.push(CurrencyEvent::ItemChanged(-1));
            self.settle(&mut state, &mut outcome, change);
            if state.list.list_changed().is_none() {
                outcome.push(CurrencyEvent::ListChanged(ListChangedEvent::item_added(index)));
            }
            outcome
                .events
                .extend(deferred.into_iter().map(CurrencyEvent::ListChanged));
            outcome
        };

        tracing::debug!(target: targets::MANAGER, id = ?self.id, index, "added new row");
        self.dispatch(outcome);
        Ok(index)
    }

    /// Starts a plain edit of the current row.
    ///
    /// Does nothing if the current row is already being edited. A pending
    /// add-new row elsewhere is committed first.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::UninitializedAccess`] if the position is `-1`.
    pub fn begin_edit(&self) -> BindingResult<()> {
        self.check_thread();
        let commit_first = {
            let state = self.state.lock();
            let position = state.cursor.position();
            if position < 0 {
                return Err(BindingError::UninitializedAccess);
            }
            match state.pending {
                Some(edit) if edit.edit_index == position as usize => return Ok(()),
                Some(_) => true,
                None => false,
            }
        };
        if commit_first {
            self.end_current_edit()?;
        }

        let (list, index) = {
            let mut state = self.state.lock();
            let position = state.cursor.position();
            if position < 0 {
                return Err(BindingError::UninitializedAccess);
            }
            let index = position as usize;
            state.pending = Some(PendingEdit::edit(index));
            (state.list.clone(), index)
        };
        tracing::debug!(target: targets::MANAGER, id = ?self.id, index, "edit started");
        list.begin_edit(index);
        Ok(())
    }

    /// Commits the pending edit, if any.
    ///
    /// Add-new rows are committed through the list's end-new capability when
    /// it has one. Does nothing on an empty manager.
    pub fn end_current_edit(&self) -> BindingResult<()> {
        self.check_thread();
        let (list, edit) = {
            let mut state = self.state.lock();
            if state.cursor.position() < 0 {
                return Ok(());
            }
            match state.pending.take() {
                Some(edit) => (state.list.clone(), edit),
                None => return Ok(()),
            }
        };

        if edit.is_add_new {
            if list.supports_end_new()
                && let Err(err) = list.end_new(edit.edit_index)
            {
                self.state.lock().pending = Some(edit);
                return Err(err);
            }
            tracing::debug!(target: targets::MANAGER, id = ?self.id, index = edit.edit_index, "new row committed");
        } else {
            list.end_edit(edit.edit_index);
            tracing::debug!(target: targets::MANAGER, id = ?self.id, index = edit.edit_index, "edit committed");
        }
        Ok(())
    }

    /// Rolls back the pending edit, if any.
    ///
    /// Cancelling an add-new removes the new row through the list's
    /// cancel-new capability and raises `item_changed(-1)`, then
    /// `current_changed` and `position_changed` as the position moves back,
    /// then the list's `ItemDeleted` notification. Cancelling a plain edit
    /// raises `item_changed` for the edited row. Does nothing on an empty
    /// manager.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::NotSupported`] when cancelling an add-new on a
    /// list without cancel-new support. The row stays pending.
    pub fn cancel_current_edit(&self) -> BindingResult<()> {
        self.check_thread();
        let edit = {
            let mut state = self.state.lock();
            if state.cursor.position() < 0 {
                return Ok(());
            }
            let Some(edit) = state.pending else {
                return Ok(());
            };
            if edit.is_add_new && !state.list.supports_cancel_new() {
                return Err(BindingError::not_supported("cancel-new"));
            }
            state.pending = None;
            edit
        };

        if edit.is_add_new {
            self.cancel_add_new(edit)
        } else {
            self.cancel_plain_edit(edit);
            Ok(())
        }
    }

    fn cancel_add_new(&self, edit: PendingEdit) -> BindingResult<()> {
        let count_before = self.count();
        let (result, deferred) = self.with_list_deferred(|list| list.cancel_new(edit.edit_index));
        if let Err(err) = result {
            self.state.lock().pending = Some(edit);
            self.forward_deferred(deferred);
            return Err(err);
        }

        let outcome = {
            let mut state = self.state.lock();
            let count = state.list.count();
            let removed = count < count_before;
            let change = if removed {
                state.cursor.item_deleted(edit.edit_index, count)
            } else {
                state.cursor.refresh(count)
            };

            let mut outcome = Outcome::default();
            outcome.push(CurrencyEvent::ItemChanged(-1));
            self.settle(&mut state, &mut outcome, change);
            if removed && state.list.list_changed().is_none() {
                outcome.push(CurrencyEvent::ListChanged(ListChangedEvent::item_deleted(
                    edit.edit_index,
                )));
            }
            outcome
                .events
                .extend(deferred.into_iter().map(CurrencyEvent::ListChanged));
            outcome
        };

        tracing::debug!(target: targets::MANAGER, id = ?self.id, index = edit.edit_index, "new row cancelled");
        self.dispatch(outcome);
        Ok(())
    }

    fn cancel_plain_edit(&self, edit: PendingEdit) {
        let ((), deferred) = self.with_list_deferred(|list| list.cancel_edit(edit.edit_index));

        let outcome = {
            let mut state = self.state.lock();
            let count = state.list.count();
            let change = state.cursor.refresh(count);
            let mut outcome = Outcome::default();
            outcome.push(CurrencyEvent::ItemChanged(edit.edit_index as isize));
            self.settle(&mut state, &mut outcome, change);
            outcome
                .events
                .extend(deferred.into_iter().map(CurrencyEvent::ListChanged));
            outcome
        };

        tracing::debug!(target: targets::MANAGER, id = ?self.id, index = edit.edit_index, "edit cancelled");
        self.dispatch(outcome);
    }

    // =========================================================================
    // Suspension
    // =========================================================================

    /// Stops following list notifications and position requests.
    ///
    /// Out-of-range position requests still fail while suspended.
    pub fn suspend_binding(&self) {
        self.check_thread();
        let mut state = self.state.lock();
        if !state.suspended {
            state.suspended = true;
            tracing::debug!(target: targets::MANAGER, id = ?self.id, "binding suspended");
        }
    }

    /// Resumes a suspended manager and re-synchronizes it with the list.
    ///
    /// Raises `list_changed(Reset)`, then `current_changed` and
    /// `position_changed` if the list changed while suspended.
    pub fn resume_binding(&self) {
        self.check_thread();
        let outcome = {
            let mut state = self.state.lock();
            if !state.suspended {
                return;
            }
            state.suspended = false;
            let count = state.list.count();
            state.pending = state.pending.and_then(|edit| edit.after_reset(count));
            let change = state.cursor.refresh(count);
            let mut outcome = Outcome::default();
            outcome.push(CurrencyEvent::ListChanged(ListChangedEvent::reset()));
            self.settle(&mut state, &mut outcome, change);
            outcome
        };
        tracing::debug!(target: targets::MANAGER, id = ?self.id, "binding resumed");
        self.dispatch(outcome);
    }

    /// Returns `true` while suspended, or when the bound list is empty.
    pub fn is_binding_suspended(&self) -> bool {
        let state = self.state.lock();
        state.suspended || state.list.count() == 0
    }

    // =========================================================================
    // List notifications
    // =========================================================================

    /// Applies a change notification of the bound list.
    ///
    /// Called by the list's change signal; lists without one can report
    /// changes by calling this directly.
    pub fn on_list_changed(&self, event: ListChangedEvent) {
        let outcome = {
            let mut state = self.state.lock();
            if state.deferring > 0 {
                state.deferred.push(event);
                return;
            }
            if state.suspended {
                return;
            }
            self.apply_list_event(&mut state, event)
        };
        self.dispatch(outcome);
    }

    fn apply_list_event(&self, state: &mut ManagerState, event: ListChangedEvent) -> Outcome {
        let mut outcome = Outcome::default();
        let count = state.list.count();
        let old_index = usize::try_from(event.old_index).ok();
        let new_index = usize::try_from(event.new_index).ok();

        let change = match (event.change_type, old_index, new_index) {
            (ListChangedType::ItemAdded, _, Some(index)) => {
                state.pending = state.pending.and_then(|edit| edit.after_insert(index));
                state.cursor.item_added(index, count)
            }
            (ListChangedType::ItemDeleted, Some(index), _) => {
                state.pending = state.pending.and_then(|edit| edit.after_delete(index));
                state.cursor.item_deleted(index, count)
            }
            (ListChangedType::ItemMoved, Some(from), Some(to)) => {
                state.pending = state.pending.and_then(|edit| edit.after_move(from, to));
                state.cursor.item_moved(from, to)
            }
            (ListChangedType::ItemChanged, _, index) => {
                outcome.push(CurrencyEvent::ItemChanged(event.new_index));
                if index.is_some() && event.new_index == state.cursor.position() {
                    // Same logical row with new contents.
                    state.current = row_at(&state.list, state.cursor.position());
                    outcome.propagate = true;
                }
                None
            }
            (change_type, _, _) if change_type.is_schema_change() => {
                outcome.push(CurrencyEvent::MetaDataChanged);
                None
            }
            _ => {
                state.pending = state.pending.and_then(|edit| edit.after_reset(count));
                state.cursor.refresh(count)
            }
        };

        tracing::trace!(
            target: targets::MANAGER,
            id = ?self.id,
            change = ?event.change_type,
            position = state.cursor.position(),
            "list changed"
        );
        outcome.push(CurrencyEvent::ListChanged(event));
        self.settle(state, &mut outcome, change);
        outcome
    }

    // =========================================================================
    // Relation propagation
    // =========================================================================

    /// Re-materializes a relation child for the parent's new current row.
    ///
    /// A pending child edit is committed first. The cursor restarts at the
    /// first row of the new list. Raises `meta_data_changed` if the row
    /// schema differs, then `list_changed(Reset)`, then `current_changed`
    /// and `position_changed` as applicable, and recurses into this
    /// manager's own relation children.
    pub(crate) fn rebind_to_parent_row(&self, parent_row: Option<&RowHandle>) {
        let ListKind::RelationChild(binding) = &self.kind else {
            return;
        };

        if let Err(err) = self.end_current_edit() {
            tracing::debug!(target: targets::MANAGER, id = ?self.id, %err, "pending child edit could not be committed");
            self.state.lock().pending = None;
        }

        let list = binding.rule.materialize(parent_row);
        let list_connection = connect_list(self.weak_self.clone(), &list);

        let (old_list, old_connection, outcome) = {
            let mut state = self.state.lock();
            let schema_changed = member_names(&state.list) != member_names(&list);
            let old_list = mem::replace(&mut state.list, list);
            let old_connection = mem::replace(&mut state.list_connection, list_connection);
            state.pending = None;
            state.deferred.clear();

            let identity = ListIdentity::of(&state.list);
            let count = state.list.count();
            let change = state.cursor.rebind(identity, count);

            let mut outcome = Outcome::default();
            if schema_changed {
                outcome.push(CurrencyEvent::MetaDataChanged);
            }
            outcome.push(CurrencyEvent::ListChanged(ListChangedEvent::reset()));
            self.settle(&mut state, &mut outcome, change);
            // Rows of a new list are new rows even at the same address.
            outcome.propagate = true;
            (old_list, old_connection, outcome)
        };

        if let (Some(id), Some(signal)) = (old_connection, old_list.list_changed()) {
            signal.disconnect(id);
        }

        tracing::debug!(
            target: targets::MANAGER,
            id = ?self.id,
            relation = %binding.name,
            count = self.count(),
            "relation child rebound"
        );
        self.dispatch(outcome);
    }

    fn propagate_to_dependents(&self) {
        let ids = self.dependents();
        if ids.is_empty() {
            return;
        }
        let Some(store) = self.registry.upgrade() else {
            return;
        };
        let children: Vec<Arc<CurrencyManager>> = {
            let store = store.read();
            ids.iter()
                .filter_map(|id| store.managers.get(*id).cloned())
                .collect()
        };

        let _span = PerfSpan::new(span_names::PROPAGATE);
        let row = self.current_row();
        for child in children {
            child.rebind_to_parent_row(row.as_ref());
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Updates the cached current row and queues `current_changed` and
    /// `position_changed` for the given move.
    fn settle(&self, state: &mut ManagerState, outcome: &mut Outcome, change: Option<PositionChange>) {
        let current = row_at(&state.list, state.cursor.position());
        if !same_row(&state.current, &current) {
            state.current = current;
            outcome.push(CurrencyEvent::CurrentChanged);
            outcome.propagate = true;
        }
        if let Some(change) = change {
            outcome.push(CurrencyEvent::PositionChanged(change.new));
        }
    }

    fn dispatch(&self, outcome: Outcome) {
        if outcome.propagate {
            self.propagate_to_dependents();
        }
        for event in outcome.events {
            match event {
                CurrencyEvent::ItemChanged(index) => self.signals.item_changed.emit(index),
                CurrencyEvent::CurrentChanged => self.signals.current_changed.emit(()),
                CurrencyEvent::PositionChanged(position) => {
                    self.signals.position_changed.emit(position)
                }
                CurrencyEvent::MetaDataChanged => self.signals.meta_data_changed.emit(()),
                CurrencyEvent::ListChanged(event) => self.signals.list_changed.emit(event),
            }
        }
    }

    /// Calls into the list with its notifications queued instead of applied.
    fn with_list_deferred<R>(&self, f: impl FnOnce(&dyn BindableList) -> R) -> (R, Vec<ListChangedEvent>) {
        let list = {
            let mut state = self.state.lock();
            state.deferring += 1;
            state.list.clone()
        };
        let result = f(list.as_ref());
        let mut state = self.state.lock();
        state.deferring -= 1;
        let deferred = if state.deferring == 0 {
            mem::take(&mut state.deferred)
        } else {
            Vec::new()
        };
        (result, deferred)
    }

    /// Applies queued notifications the normal way.
    fn forward_deferred(&self, deferred: Vec<ListChangedEvent>) {
        for event in deferred {
            self.on_list_changed(event);
        }
    }

    fn check_thread(&self) {
        if self.config.check_thread_affinity {
            self.affinity
                .assert_same_thread_with_msg("CurrencyManager used from a thread other than its binding thread");
        }
    }
}

impl Drop for CurrencyManager {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let (Some(id), Some(signal)) = (state.list_connection.take(), state.list.list_changed()) {
            signal.disconnect(id);
        }
    }
}

impl std::fmt::Debug for CurrencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CurrencyManager")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind.label())
            .field("position", &state.cursor.position())
            .field("count", &state.list.count())
            .field("pending", &state.pending)
            .field("suspended", &state.suspended)
            .finish()
    }
}

static_assertions::assert_impl_all!(CurrencyManager: Send, Sync);

fn connect_list(manager: Weak<CurrencyManager>, list: &Arc<dyn BindableList>) -> Option<ConnectionId> {
    list.list_changed().map(|signal| {
        signal.connect(move |event| {
            if let Some(manager) = manager.upgrade() {
                manager.on_list_changed(*event);
            }
        })
    })
}

fn row_at(list: &Arc<dyn BindableList>, position: isize) -> Option<RowHandle> {
    usize::try_from(position).ok().and_then(|index| list.row(index))
}

fn member_names(list: &Arc<dyn BindableList>) -> Vec<String> {
    list.members().into_iter().map(|member| member.name).collect()
}
