//! A ready-made bindable list backed by a `Vec`.
//!
//! `BindingList<T>` raises a [`ListChangedEvent`] for every mutation, can
//! create new rows through a factory, tracks one uncommitted new row at a
//! time and snapshots a row when an edit begins so the edit can be rolled
//! back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use horizon_binding_core::Signal;
use horizon_binding_core::logging::targets;
use parking_lot::{Mutex, RwLock};

use crate::error::{BindingError, BindingResult};
use crate::list::{BindableList, ListChangedEvent, ListChangedType, MemberDescriptor, RowHandle};

/// Type alias for a new-row factory.
pub type RowFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// A generic bindable list of rows.
///
/// Rows are stored as `Arc<T>` so that a [`RowHandle`] keeps pointing at
/// the same row object while the list around it changes.
///
/// # Example
///
/// ```
/// use horizon_binding::BindingList;
///
/// #[derive(Clone, Default)]
/// struct Customer {
///     name: String,
/// }
///
/// let customers = BindingList::with_factory(
///     vec![Customer { name: "Ada".into() }],
///     Customer::default,
/// );
/// customers.push(Customer { name: "Grace".into() });
/// assert_eq!(customers.len(), 2);
/// ```
pub struct BindingList<T> {
    items: RwLock<Vec<Arc<T>>>,
    factory: Option<RowFactory<T>>,
    members: RwLock<Vec<MemberDescriptor>>,
    /// Index of the row created by `add_new` that is not committed yet.
    pending_new: Mutex<Option<usize>>,
    /// Snapshot of the row being edited, for `cancel_edit`.
    edit_snapshot: Mutex<Option<(usize, T)>>,
    raise_list_changed: AtomicBool,
    list_changed: Signal<ListChangedEvent>,
}

impl<T: Clone + Send + Sync + 'static> BindingList<T> {
    /// Creates a list without add-new support.
    pub fn new(items: Vec<T>) -> Self {
        Self::build(items, None)
    }

    /// Creates a list whose `add_new` appends rows made by `factory`.
    pub fn with_factory<F>(items: Vec<T>, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(items, Some(Arc::new(factory)))
    }

    fn build(items: Vec<T>, factory: Option<RowFactory<T>>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(Arc::new).collect()),
            factory,
            members: RwLock::new(Vec::new()),
            pending_new: Mutex::new(None),
            edit_snapshot: Mutex::new(None),
            raise_list_changed: AtomicBool::new(true),
            list_changed: Signal::new(),
        }
    }

    /// Sets the row schema members.
    pub fn with_members(self, members: Vec<MemberDescriptor>) -> Self {
        *self.members.write() = members;
        self
    }

    /// Turns change notification off, making the list behave like a plain
    /// collection that never reports changes.
    pub fn without_notifications(self) -> Self {
        self.raise_list_changed.store(false, Ordering::SeqCst);
        self
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the list has no rows.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns the shared row at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.items.read().get(index).cloned()
    }

    /// Returns a snapshot of all rows.
    pub fn items(&self) -> Vec<Arc<T>> {
        self.items.read().clone()
    }

    /// Returns the index of the uncommitted new row, if any.
    pub fn pending_new_index(&self) -> Option<usize> {
        *self.pending_new.lock()
    }

    /// Appends a row.
    pub fn push(&self, item: T) {
        let index = {
            let mut items = self.items.write();
            items.push(Arc::new(item));
            items.len() - 1
        };
        self.notify(ListChangedEvent::item_added(index));
    }

    /// Inserts a row at `index`.
    ///
    /// Returns `false` (and changes nothing) if `index > len()`.
    pub fn insert(&self, index: usize, item: T) -> bool {
        {
            let mut items = self.items.write();
            if index > items.len() {
                return false;
            }
            items.insert(index, Arc::new(item));
        }
        self.shift_pending(|pending| if pending >= index { Some(pending + 1) } else { Some(pending) });
        self.notify(ListChangedEvent::item_added(index));
        true
    }

    /// Removes and returns the row at `index`.
    pub fn remove(&self, index: usize) -> Option<Arc<T>> {
        let removed = {
            let mut items = self.items.write();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.shift_pending(|pending| match pending.cmp(&index) {
            std::cmp::Ordering::Less => Some(pending),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(pending - 1),
        });
        self.notify(ListChangedEvent::item_deleted(index));
        Some(removed)
    }

    /// Moves the row at `from` to `to`.
    pub fn move_item(&self, from: usize, to: usize) -> bool {
        {
            let mut items = self.items.write();
            if from >= items.len() || to >= items.len() {
                return false;
            }
            let item = items.remove(from);
            items.insert(to, item);
        }
        self.notify(ListChangedEvent::item_moved(from, to));
        true
    }

    /// Modifies a row in place and reports it as changed.
    ///
    /// While other handles to the row are alive, the row object is replaced
    /// by an edited copy and those handles keep the old contents.
    pub fn modify<F, R>(&self, index: usize, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let result = {
            let mut items = self.items.write();
            let slot = items.get_mut(index)?;
            f(Arc::make_mut(slot))
        };
        self.notify(ListChangedEvent::item_changed(index));
        Some(result)
    }

    /// Removes all rows.
    pub fn clear(&self) {
        self.items.write().clear();
        *self.pending_new.lock() = None;
        self.notify(ListChangedEvent::reset());
    }

    /// Replaces all rows.
    pub fn set_items(&self, items: Vec<T>) {
        *self.items.write() = items.into_iter().map(Arc::new).collect();
        *self.pending_new.lock() = None;
        self.notify(ListChangedEvent::reset());
    }

    /// Adds a schema member and reports the schema change.
    pub fn add_member(&self, member: MemberDescriptor) {
        self.members.write().push(member);
        self.notify(ListChangedEvent::schema(
            ListChangedType::PropertyDescriptorAdded,
        ));
    }

    fn shift_pending(&self, f: impl FnOnce(usize) -> Option<usize>) {
        let mut pending = self.pending_new.lock();
        if let Some(index) = *pending {
            *pending = f(index);
        }
    }

    fn notify(&self, event: ListChangedEvent) {
        if self.raise_list_changed.load(Ordering::SeqCst) {
            self.list_changed.emit(event);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> BindableList for BindingList<T> {
    fn count(&self) -> usize {
        self.len()
    }

    fn row(&self, index: usize) -> Option<RowHandle> {
        self.get(index).map(RowHandle::from_arc)
    }

    fn list_changed(&self) -> Option<&Signal<ListChangedEvent>> {
        if self.raise_list_changed.load(Ordering::SeqCst) {
            Some(&self.list_changed)
        } else {
            None
        }
    }

    fn members(&self) -> Vec<MemberDescriptor> {
        self.members.read().clone()
    }

    fn supports_add_new(&self) -> bool {
        self.factory.is_some()
    }

    fn add_new(&self) -> BindingResult<usize> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| BindingError::not_supported("add-new"))?;

        // A second add-new commits the previous uncommitted row.
        self.pending_new.lock().take();

        let item = factory();
        let index = {
            let mut items = self.items.write();
            items.push(Arc::new(item));
            items.len() - 1
        };
        *self.pending_new.lock() = Some(index);
        tracing::trace!(target: targets::LIST, index, "added new row");
        self.notify(ListChangedEvent::item_added(index));
        Ok(index)
    }

    fn supports_cancel_new(&self) -> bool {
        true
    }

    fn cancel_new(&self, index: usize) -> BindingResult<()> {
        let matches = {
            let mut pending = self.pending_new.lock();
            if *pending == Some(index) {
                *pending = None;
                true
            } else {
                false
            }
        };
        if matches {
            tracing::trace!(target: targets::LIST, index, "cancelled new row");
            self.remove(index);
        }
        Ok(())
    }

    fn supports_end_new(&self) -> bool {
        true
    }

    fn end_new(&self, index: usize) -> BindingResult<()> {
        let mut pending = self.pending_new.lock();
        if *pending == Some(index) {
            *pending = None;
            tracing::trace!(target: targets::LIST, index, "committed new row");
        }
        Ok(())
    }

    fn begin_edit(&self, index: usize) {
        if let Some(row) = self.get(index) {
            *self.edit_snapshot.lock() = Some((index, (*row).clone()));
        }
    }

    fn end_edit(&self, index: usize) {
        let mut snapshot = self.edit_snapshot.lock();
        if matches!(*snapshot, Some((edited, _)) if edited == index) {
            *snapshot = None;
        }
    }

    fn cancel_edit(&self, index: usize) {
        let original = {
            let mut snapshot = self.edit_snapshot.lock();
            match snapshot.take() {
                Some((edited, original)) if edited == index => original,
                other => {
                    *snapshot = other;
                    return;
                }
            }
        };
        let restored = {
            let mut items = self.items.write();
            match items.get_mut(index) {
                Some(slot) => {
                    *slot = Arc::new(original);
                    true
                }
                None => false,
            }
        };
        if restored {
            self.notify(ListChangedEvent::item_changed(index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Item {
        label: String,
    }

    fn item(label: &str) -> Item {
        Item {
            label: label.to_string(),
        }
    }

    fn recorded(list: &BindingList<Item>) -> Arc<Mutex<Vec<ListChangedEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        list.list_changed()
            .unwrap()
            .connect(move |event| events_clone.lock().push(*event));
        events
    }

    #[test]
    fn test_mutations_raise_list_changed() {
        let list = BindingList::new(vec![item("a"), item("b")]);
        let events = recorded(&list);

        list.push(item("c"));
        assert!(list.insert(0, item("z")));
        assert!(!list.insert(10, item("nope")));
        assert!(list.move_item(0, 3));
        list.modify(1, |row| row.label.push('!'));
        list.remove(0);
        list.clear();

        assert_eq!(
            *events.lock(),
            vec![
                ListChangedEvent::item_added(2),
                ListChangedEvent::item_added(0),
                ListChangedEvent::item_moved(0, 3),
                ListChangedEvent::item_changed(1),
                ListChangedEvent::item_deleted(0),
                ListChangedEvent::reset(),
            ]
        );
        assert!(list.is_empty());
    }

    #[test]
    fn test_modify_replaces_row_identity() {
        let list = BindingList::new(vec![item("a")]);
        let before = list.row(0).unwrap();
        list.modify(0, |row| row.label = "b".into());
        let after = list.row(0).unwrap();

        assert_ne!(before, after);
        assert_eq!(before.downcast_ref::<Item>().unwrap().label, "a");
        assert_eq!(after.downcast_ref::<Item>().unwrap().label, "b");
        assert_eq!(list.row(0).unwrap(), after);
    }

    #[test]
    fn test_add_new_requires_factory() {
        let list = BindingList::new(vec![item("a")]);
        assert!(!list.supports_add_new());
        assert_eq!(list.add_new(), Err(BindingError::not_supported("add-new")));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_add_new_then_cancel_new() {
        let list = BindingList::with_factory(vec![item("a")], Item::default);
        let index = list.add_new().unwrap();
        assert_eq!(index, 1);
        assert_eq!(list.pending_new_index(), Some(1));

        list.cancel_new(0).unwrap();
        assert_eq!(list.len(), 2);

        list.cancel_new(1).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.pending_new_index(), None);
    }

    #[test]
    fn test_second_add_new_commits_first() {
        let list = BindingList::with_factory(Vec::new(), Item::default);
        list.add_new().unwrap();
        list.add_new().unwrap();
        assert_eq!(list.pending_new_index(), Some(1));

        list.cancel_new(1).unwrap();
        assert_eq!(list.len(), 1);
        list.end_new(0).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_pending_new_follows_inserts_and_removes() {
        let list = BindingList::with_factory(vec![item("a"), item("b")], Item::default);
        list.add_new().unwrap();
        list.insert(0, item("z"));
        assert_eq!(list.pending_new_index(), Some(3));
        list.remove(0);
        assert_eq!(list.pending_new_index(), Some(2));
        list.remove(2);
        assert_eq!(list.pending_new_index(), None);
    }

    #[test]
    fn test_cancel_edit_restores_snapshot() {
        let list = BindingList::new(vec![item("a")]);
        list.begin_edit(0);
        list.modify(0, |row| row.label = "edited".into());
        let events = recorded(&list);

        list.cancel_edit(0);
        assert_eq!(list.get(0).unwrap().label, "a");
        assert_eq!(*events.lock(), vec![ListChangedEvent::item_changed(0)]);

        list.begin_edit(0);
        list.modify(0, |row| row.label = "kept".into());
        list.end_edit(0);
        list.cancel_edit(0);
        assert_eq!(list.get(0).unwrap().label, "kept");
    }

    #[test]
    fn test_without_notifications() {
        let list = BindingList::new(vec![item("a")]).without_notifications();
        assert!(list.list_changed().is_none());
        list.push(item("b"));
        assert_eq!(list.count(), 2);
    }
}
