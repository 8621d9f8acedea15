//! Parent-to-child relations and their materialized child lists.
//!
//! A [`Relation`] is the materialization rule of one master/detail edge: given
//! the parent manager's current row it produces the list of related child
//! rows. [`KeyRelation`] implements the common case of matching keys between
//! a parent table and a child table, producing a [`RelatedView`] that
//! filters the child table down to the related rows and follows changes to
//! the child table.

use std::sync::{Arc, Weak};

use horizon_binding_core::{ConnectionId, Signal};
use parking_lot::RwLock;

use crate::binding_list::BindingList;
use crate::list::{BindableList, ListChangedEvent, ListChangedType, MemberDescriptor, RowHandle};

/// The materialization rule of a parent-to-child relation.
pub trait Relation: Send + Sync {
    /// The relation name used in binding paths.
    fn name(&self) -> &str;

    /// Produces the child rows related to `parent_row`.
    ///
    /// `None` means the parent has no current row; implementations return an
    /// empty list with the child schema.
    fn materialize(&self, parent_row: Option<&RowHandle>) -> Arc<dyn BindableList>;
}

/// Type alias for a row predicate used by [`RelatedView`].
pub type ViewFilter<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// Type alias for a parent/child row matcher.
pub type RowMatcher<P, C> = Arc<dyn Fn(&P, &C) -> bool + Send + Sync>;

/// A relation between a parent row type `P` and the rows of a child table.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use horizon_binding::{BindingList, KeyRelation, Relation, RowHandle};
///
/// #[derive(Clone)]
/// struct Order { id: u32 }
/// #[derive(Clone)]
/// struct Line { order_id: u32 }
///
/// let lines = Arc::new(BindingList::new(vec![Line { order_id: 1 }, Line { order_id: 2 }]));
/// let relation = KeyRelation::by_key("Lines", lines, |o: &Order| o.id, |l: &Line| l.order_id);
///
/// let related = relation.materialize(Some(&RowHandle::new(Order { id: 2 })));
/// assert_eq!(related.count(), 1);
/// ```
pub struct KeyRelation<P, C> {
    name: String,
    child_table: Arc<BindingList<C>>,
    matcher: RowMatcher<P, C>,
}

impl<P, C> KeyRelation<P, C>
where
    P: Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    /// Creates a relation that relates rows for which `matcher` returns `true`.
    pub fn new<F>(name: impl Into<String>, child_table: Arc<BindingList<C>>, matcher: F) -> Self
    where
        F: Fn(&P, &C) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            child_table,
            matcher: Arc::new(matcher),
        }
    }

    /// Creates a relation that relates rows with equal keys.
    pub fn by_key<K, FP, FC>(
        name: impl Into<String>,
        child_table: Arc<BindingList<C>>,
        parent_key: FP,
        child_key: FC,
    ) -> Self
    where
        K: PartialEq,
        FP: Fn(&P) -> K + Send + Sync + 'static,
        FC: Fn(&C) -> K + Send + Sync + 'static,
    {
        Self::new(name, child_table, move |parent, child| {
            parent_key(parent) == child_key(child)
        })
    }

    /// Returns the child table this relation filters.
    pub fn child_table(&self) -> &Arc<BindingList<C>> {
        &self.child_table
    }
}

impl<P, C> Relation for KeyRelation<P, C>
where
    P: Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn materialize(&self, parent_row: Option<&RowHandle>) -> Arc<dyn BindableList> {
        let filter: ViewFilter<C> = match parent_row.and_then(RowHandle::downcast_arc::<P>) {
            Some(parent) => {
                let matcher = self.matcher.clone();
                Arc::new(move |child: &C| matcher(parent.as_ref(), child))
            }
            None => Arc::new(|_: &C| false),
        };
        RelatedView::new(self.child_table.clone(), filter)
    }
}

/// A filtered view over a source table.
///
/// The view maps its own row indices to source row indices and rebuilds the
/// mapping whenever the source reports a change. Changes that alter which
/// rows are visible are reported as a reset; changes to a visible row are
/// reported at the view index.
pub struct RelatedView<C: Clone + Send + Sync + 'static> {
    source: Arc<BindingList<C>>,
    filter: ViewFilter<C>,
    /// Mapping from view row index to source row index.
    mapping: RwLock<Vec<usize>>,
    source_connection: Option<ConnectionId>,
    list_changed: Signal<ListChangedEvent>,
}

impl<C: Clone + Send + Sync + 'static> RelatedView<C> {
    /// Creates a view of the rows of `source` accepted by `filter`.
    pub fn new(source: Arc<BindingList<C>>, filter: ViewFilter<C>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let source_connection = source.list_changed().map(|signal| {
                signal.connect(move |event| {
                    if let Some(view) = weak.upgrade() {
                        view.on_source_changed(*event);
                    }
                })
            });
            let view = Self {
                source,
                filter,
                mapping: RwLock::new(Vec::new()),
                source_connection,
                list_changed: Signal::new(),
            };
            view.rebuild_mapping();
            view
        })
    }

    /// Maps a view row index to the source row index.
    pub fn map_to_source(&self, view_row: usize) -> Option<usize> {
        self.mapping.read().get(view_row).copied()
    }

    /// Maps a source row index to the view row index, if visible.
    pub fn map_from_source(&self, source_row: usize) -> Option<usize> {
        self.mapping.read().iter().position(|&row| row == source_row)
    }

    fn compute_mapping(&self) -> Vec<usize> {
        self.source
            .items()
            .iter()
            .enumerate()
            .filter(|(_, row)| (self.filter)(&**row))
            .map(|(index, _)| index)
            .collect()
    }

    fn rebuild_mapping(&self) -> bool {
        let mapping = self.compute_mapping();
        let mut current = self.mapping.write();
        if *current == mapping {
            false
        } else {
            *current = mapping;
            true
        }
    }

    fn on_source_changed(&self, event: ListChangedEvent) {
        if event.change_type.is_schema_change() {
            self.list_changed.emit(event);
            return;
        }

        if self.rebuild_mapping() {
            self.list_changed.emit(ListChangedEvent::reset());
        } else if event.change_type == ListChangedType::ItemChanged && event.new_index >= 0 {
            if let Some(view_row) = self.map_from_source(event.new_index as usize) {
                self.list_changed.emit(ListChangedEvent::item_changed(view_row));
            }
        }
    }
}

impl<C: Clone + Send + Sync + 'static> BindableList for RelatedView<C> {
    fn count(&self) -> usize {
        self.mapping.read().len()
    }

    fn row(&self, index: usize) -> Option<RowHandle> {
        let source_row = self.map_to_source(index)?;
        self.source.row(source_row)
    }

    fn list_changed(&self) -> Option<&Signal<ListChangedEvent>> {
        Some(&self.list_changed)
    }

    fn members(&self) -> Vec<MemberDescriptor> {
        self.source.members()
    }
}

impl<C: Clone + Send + Sync + 'static> Drop for RelatedView<C> {
    fn drop(&mut self) {
        if let (Some(id), Some(signal)) = (self.source_connection.take(), self.source.list_changed()) {
            signal.disconnect(id);
        }
    }
}
