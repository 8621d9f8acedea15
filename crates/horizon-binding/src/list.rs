//! The bindable list abstraction.
//!
//! A currency manager never owns the rows it navigates. It talks to an
//! externally owned collection through the [`BindableList`] trait, which
//! exposes a row count, indexed reads and a handful of optional
//! capabilities: change notification, add-new transactions and row-level
//! edit hooks.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use horizon_binding_core::Signal;

use crate::error::{BindingError, BindingResult};
use crate::relation::Relation;

/// An opaque, cheaply cloneable handle to one row of a bindable list.
///
/// Handles compare by identity: two handles are equal when they point at the
/// same row object, regardless of the row's contents. This is what the
/// manager uses to decide whether the current item actually changed.
#[derive(Clone)]
pub struct RowHandle(Arc<dyn Any + Send + Sync>);

impl RowHandle {
    /// Wraps a new row value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps an already shared row, preserving its identity.
    pub fn from_arc<T: Any + Send + Sync>(row: Arc<T>) -> Self {
        Self(row)
    }

    /// Returns the row as `T` if it has that type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns the shared row as `Arc<T>` if it has that type.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// Returns `true` if both handles refer to the same row object.
    pub fn ptr_eq(&self, other: &RowHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl PartialEq for RowHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for RowHandle {}

impl fmt::Debug for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowHandle({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Returns `true` if two optional rows are the same row (or both absent).
pub(crate) fn same_row(a: &Option<RowHandle>, b: &Option<RowHandle>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.ptr_eq(b),
        (None, None) => true,
        _ => false,
    }
}

/// Identity of a list instance.
///
/// Two references to the same list object have the same identity; two
/// distinct lists with equal contents do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListIdentity(usize);

impl ListIdentity {
    /// Returns the identity of the given list.
    pub fn of(list: &Arc<dyn BindableList>) -> Self {
        Self(Arc::as_ptr(list) as *const () as usize)
    }
}

/// The kind of structural or schema change a list reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListChangedType {
    /// The list changed too much to describe; re-read everything.
    Reset,
    /// A row was inserted at `new_index`.
    ItemAdded,
    /// The row at `old_index` was removed.
    ItemDeleted,
    /// A row moved from `old_index` to `new_index`.
    ItemMoved,
    /// The contents of the row at `new_index` changed.
    ItemChanged,
    /// A member was added to the row schema.
    PropertyDescriptorAdded,
    /// A member was removed from the row schema.
    PropertyDescriptorDeleted,
    /// A member of the row schema changed.
    PropertyDescriptorChanged,
}

impl ListChangedType {
    /// Returns `true` for changes to the row schema rather than the rows.
    pub fn is_schema_change(self) -> bool {
        matches!(
            self,
            Self::PropertyDescriptorAdded
                | Self::PropertyDescriptorDeleted
                | Self::PropertyDescriptorChanged
        )
    }
}

/// A change notification raised by a bindable list.
///
/// Indices are `-1` when they do not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListChangedEvent {
    pub change_type: ListChangedType,
    pub old_index: isize,
    pub new_index: isize,
}

impl ListChangedEvent {
    /// Creates an event with explicit indices.
    pub fn new(change_type: ListChangedType, old_index: isize, new_index: isize) -> Self {
        Self {
            change_type,
            old_index,
            new_index,
        }
    }

    /// The whole list changed.
    pub fn reset() -> Self {
        Self::new(ListChangedType::Reset, -1, -1)
    }

    /// A row was inserted at `index`.
    pub fn item_added(index: usize) -> Self {
        Self::new(ListChangedType::ItemAdded, -1, index as isize)
    }

    /// The row at `index` was removed.
    pub fn item_deleted(index: usize) -> Self {
        Self::new(ListChangedType::ItemDeleted, index as isize, -1)
    }

    /// A row moved from `from` to `to`.
    pub fn item_moved(from: usize, to: usize) -> Self {
        Self::new(ListChangedType::ItemMoved, from as isize, to as isize)
    }

    /// The contents of the row at `index` changed.
    pub fn item_changed(index: usize) -> Self {
        Self::new(ListChangedType::ItemChanged, -1, index as isize)
    }

    /// The row schema changed.
    pub fn schema(change_type: ListChangedType) -> Self {
        debug_assert!(change_type.is_schema_change());
        Self::new(change_type, -1, -1)
    }
}

/// What a named member of a list's row schema is.
#[derive(Clone)]
pub enum MemberKind {
    /// A scalar data field. Binding to it yields no currency.
    Field,
    /// A list-valued member of a hierarchical source, such as a table in a
    /// data set.
    List(Arc<dyn BindableList>),
    /// A parent-to-child relation that fans out to the related child rows.
    ChildRelation(Arc<dyn Relation>),
    /// The child-to-parent side of a relation. Not navigable as a list.
    ParentRelation,
}

impl fmt::Debug for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field => write!(f, "Field"),
            Self::List(_) => write!(f, "List"),
            Self::ChildRelation(relation) => write!(f, "ChildRelation({})", relation.name()),
            Self::ParentRelation => write!(f, "ParentRelation"),
        }
    }
}

/// A named member of a list's row schema.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
}

impl MemberDescriptor {
    /// A scalar data field.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Field,
        }
    }

    /// A list-valued member.
    pub fn list(name: impl Into<String>, list: Arc<dyn BindableList>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::List(list),
        }
    }

    /// A parent-to-child relation, named after the relation.
    pub fn child_relation(relation: Arc<dyn Relation>) -> Self {
        Self {
            name: relation.name().to_string(),
            kind: MemberKind::ChildRelation(relation),
        }
    }

    /// The child-to-parent side of a relation.
    pub fn parent_relation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::ParentRelation,
        }
    }
}

/// The capability set a collection exposes to currency management.
///
/// Only [`count`](BindableList::count) and [`row`](BindableList::row) are
/// required. Everything else is an optional capability with a default that
/// reports "not supported".
///
/// # Notification contract
///
/// A list that returns a signal from [`list_changed`](BindableList::list_changed)
/// must emit on every structural change, after the change is visible
/// through `count`/`row`, and without holding any lock that `count` or
/// `row` needs. Managers trust this contract and do not detect lists that
/// mutate silently.
pub trait BindableList: Send + Sync {
    /// Returns the number of rows.
    fn count(&self) -> usize;

    /// Returns the row at `index`, or `None` if the index is out of bounds.
    fn row(&self, index: usize) -> Option<RowHandle>;

    /// Returns `true` if the list has no rows.
    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns the change notification signal, if the list raises one.
    fn list_changed(&self) -> Option<&Signal<ListChangedEvent>> {
        None
    }

    /// Describes the named members of the rows: fields, member lists and
    /// relations.
    fn members(&self) -> Vec<MemberDescriptor> {
        Vec::new()
    }

    /// Returns `true` if [`add_new`](BindableList::add_new) is available.
    fn supports_add_new(&self) -> bool {
        false
    }

    /// Appends a new, uncommitted row and returns its index.
    fn add_new(&self) -> BindingResult<usize> {
        Err(BindingError::not_supported("add-new"))
    }

    /// Returns `true` if uncommitted new rows can be rolled back.
    fn supports_cancel_new(&self) -> bool {
        false
    }

    /// Rolls back the uncommitted new row at `index`.
    fn cancel_new(&self, _index: usize) -> BindingResult<()> {
        Err(BindingError::not_supported("cancel-new"))
    }

    /// Returns `true` if uncommitted new rows need an explicit commit.
    fn supports_end_new(&self) -> bool {
        false
    }

    /// Commits the uncommitted new row at `index`.
    fn end_new(&self, _index: usize) -> BindingResult<()> {
        Err(BindingError::not_supported("end-new"))
    }

    /// Called when an edit of the row at `index` begins.
    fn begin_edit(&self, _index: usize) {}

    /// Called when the edit of the row at `index` is committed.
    fn end_edit(&self, _index: usize) {}

    /// Called when the edit of the row at `index` is rolled back.
    fn cancel_edit(&self, _index: usize) {}
}
