//! Integration tests for currency management across related lists.

use std::sync::Arc;

use horizon_binding::{
    BindableList, BindingConfig, BindingError, BindingList, KeyRelation, ListChangedEvent,
    ManagerRegistry, MemberDescriptor, RegistryTreeDebug, Relation, RowHandle,
};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
struct Parent {
    id: u32,
}

#[derive(Debug, Clone)]
struct Child {
    parent_id: u32,
    label: String,
}

/// A data set with two tables: `Table1` (10 parents) and `Table2` (one child
/// per parent), related by `Table1.Relation`.
struct DataSet {
    root: Arc<dyn BindableList>,
    table1: Arc<BindingList<Parent>>,
    table2: Arc<BindingList<Child>>,
}

fn data_set() -> DataSet {
    let table2 = Arc::new(
        BindingList::new(
            (0..10)
                .map(|i| Child {
                    parent_id: i,
                    label: format!("child of {i}"),
                })
                .collect(),
        )
        .with_members(vec![
            MemberDescriptor::field("parent_id"),
            MemberDescriptor::field("label"),
            MemberDescriptor::parent_relation("Parent"),
        ]),
    );
    let relation: Arc<dyn Relation> = Arc::new(KeyRelation::by_key(
        "Relation",
        table2.clone(),
        |p: &Parent| p.id,
        |c: &Child| c.parent_id,
    ));
    let table1 = Arc::new(
        BindingList::new((0..10).map(|id| Parent { id }).collect()).with_members(vec![
            MemberDescriptor::field("id"),
            MemberDescriptor::child_relation(relation),
        ]),
    );
    let root: Arc<dyn BindableList> = Arc::new(BindingList::<()>::new(Vec::new()).with_members(
        vec![
            MemberDescriptor::list("Table1", table1.clone()),
            MemberDescriptor::list("Table2", table2.clone()),
        ],
    ));
    DataSet {
        root,
        table1,
        table2,
    }
}

fn label(row: RowHandle) -> String {
    row.downcast_ref::<Child>().unwrap().label.clone()
}

#[test]
fn test_saturating_moves_stay_on_last_row() {
    init_tracing();
    let registry = ManagerRegistry::new();
    let list: Arc<dyn BindableList> =
        Arc::new(BindingList::new((0..10).map(|i| format!("o{i}")).collect::<Vec<_>>()));
    let manager = registry.get_manager(list.clone(), "").unwrap().unwrap();

    manager.set_position(9).unwrap();
    manager.move_next().unwrap();
    manager.move_next().unwrap();

    assert_eq!(manager.position(), 9);
    assert_eq!(manager.current().unwrap(), list.row(9).unwrap());
    // The strict setter still rejects the same request.
    assert_eq!(
        manager.set_position(10),
        Err(BindingError::out_of_range(10, 10))
    );
}

#[test]
fn test_relation_child_follows_parent_only() {
    init_tracing();
    let registry = ManagerRegistry::new();
    let ds = data_set();

    let child = registry
        .get_manager(ds.root.clone(), "Table1.Relation")
        .unwrap()
        .unwrap();
    assert_eq!(child.count(), 1);
    assert_eq!(child.position(), 0);
    assert_eq!(label(child.current().unwrap()), "child of 0");

    let parent = registry.get_manager(ds.root.clone(), "Table1").unwrap().unwrap();
    let sibling = registry.get_manager(ds.root.clone(), "Table2").unwrap().unwrap();
    let table1_itself: Arc<dyn BindableList> = ds.table1.clone();
    let standalone = registry.get_manager(table1_itself, "").unwrap().unwrap();
    assert!(!Arc::ptr_eq(&parent, &standalone));

    parent.set_position(5).unwrap();

    assert_eq!(child.count(), 1);
    assert_eq!(child.position(), 0);
    assert_eq!(label(child.current().unwrap()), "child of 5");
    assert_eq!(sibling.position(), 0);
    assert_eq!(standalone.position(), 0);
    assert_eq!(parent.position(), 5);
}

#[test]
fn test_parent_move_event_order_on_child() {
    let registry = ManagerRegistry::new();
    let ds = data_set();
    let child = registry
        .get_manager(ds.root.clone(), "Table1.Relation")
        .unwrap()
        .unwrap();
    let parent = registry.get_manager(ds.root.clone(), "Table1").unwrap().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    child
        .signals()
        .list_changed
        .connect(move |e| s.lock().push(format!("child list {:?}", e.change_type)));
    let s = seen.clone();
    child
        .signals()
        .current_changed
        .connect(move |_| s.lock().push("child current".to_string()));
    let s = seen.clone();
    parent
        .signals()
        .current_changed
        .connect(move |_| s.lock().push("parent current".to_string()));
    let s = seen.clone();
    parent
        .signals()
        .position_changed
        .connect(move |p| s.lock().push(format!("parent position {p}")));

    parent.set_position(3).unwrap();
    assert_eq!(
        *seen.lock(),
        vec![
            "child list Reset",
            "child current",
            "parent current",
            "parent position 3",
        ]
    );
}

#[test]
fn test_parent_without_children_empties_child() {
    let registry = ManagerRegistry::new();
    let ds = data_set();
    let child = registry
        .get_manager(ds.root.clone(), "Table1.Relation")
        .unwrap()
        .unwrap();
    let parent = registry.get_manager(ds.root.clone(), "Table1").unwrap().unwrap();

    ds.table1.push(Parent { id: 99 });
    parent.move_last().unwrap();
    assert_eq!(child.count(), 0);
    assert_eq!(child.position(), -1);
    assert_eq!(child.current(), Err(BindingError::UninitializedAccess));
    assert!(child.is_binding_suspended());

    // Adding a related row shows up in the child.
    ds.table2.push(Child {
        parent_id: 99,
        label: "late".into(),
    });
    assert_eq!(child.count(), 1);
    assert_eq!(child.position(), 0);
    assert_eq!(label(child.current().unwrap()), "late");
}

#[test]
fn test_parent_row_removal_rebinds_child() {
    let registry = ManagerRegistry::new();
    let ds = data_set();
    let child = registry
        .get_manager(ds.root.clone(), "Table1.Relation")
        .unwrap()
        .unwrap();
    let parent = registry.get_manager(ds.root.clone(), "Table1").unwrap().unwrap();

    parent.set_position(2).unwrap();
    ds.table1.remove(2);
    // The parent stays at index 2, now the parent with id 3.
    assert_eq!(parent.position(), 2);
    assert_eq!(label(child.current().unwrap()), "child of 3");
}

#[test]
fn test_add_new_twice_commits_first() {
    let registry = ManagerRegistry::new();
    let list = Arc::new(BindingList::with_factory(
        vec![Parent { id: 0 }, Parent { id: 1 }],
        || Parent { id: 100 },
    ));
    let manager = registry.get_manager(list.clone(), "").unwrap().unwrap();

    manager.add_new().unwrap();
    manager.add_new().unwrap();

    assert_eq!(manager.count(), 4);
    assert_eq!(manager.position(), 3);
    // The first new row is committed; only the second is still pending.
    assert_eq!(list.pending_new_index(), Some(3));
    let pending = manager.pending_edit().unwrap();
    assert!(pending.is_add_new);
    assert_eq!(pending.edit_index, 3);
}

#[test]
fn test_add_new_then_cancel_restores_count() {
    let registry = ManagerRegistry::new();
    let list = Arc::new(BindingList::with_factory(
        (0..5).map(|id| Parent { id }).collect(),
        || Parent { id: 100 },
    ));
    let manager = registry.get_manager(list.clone(), "").unwrap().unwrap();
    manager.set_position(2).unwrap();

    let index = manager.add_new().unwrap();
    assert_eq!(index, 5);
    assert_eq!(manager.position(), manager.count() as isize - 1);

    manager.cancel_current_edit().unwrap();
    assert_eq!(manager.count(), 5);
    assert!(manager.position() <= 4);
    assert!(manager.position() >= 0);
}

#[test]
fn test_event_order_invariant_across_operations() {
    let registry = ManagerRegistry::new();
    let list = Arc::new(BindingList::with_factory(
        (0..3).map(|id| Parent { id }).collect(),
        || Parent { id: 100 },
    ));
    let manager = registry.get_manager(list.clone(), "").unwrap().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    manager
        .signals()
        .item_changed
        .connect(move |_| s.lock().push('I'));
    let s = seen.clone();
    manager
        .signals()
        .current_changed
        .connect(move |_| s.lock().push('C'));
    let s = seen.clone();
    manager
        .signals()
        .position_changed
        .connect(move |_| s.lock().push('P'));

    let check = |seen: &Mutex<Vec<char>>| {
        let events = std::mem::take(&mut *seen.lock());
        let rank = |c: &char| match c {
            'I' => 0,
            'C' => 1,
            _ => 2,
        };
        assert!(
            events.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])),
            "out of order: {events:?}"
        );
        events
    };

    manager.set_position(1).unwrap();
    assert_eq!(check(&seen), vec!['C', 'P']);
    manager.add_new().unwrap();
    assert_eq!(check(&seen), vec!['I', 'C', 'P']);
    manager.cancel_current_edit().unwrap();
    assert_eq!(check(&seen), vec!['I', 'C', 'P']);
    manager.begin_edit().unwrap();
    manager.cancel_current_edit().unwrap();
    check(&seen);
}

#[test]
fn test_list_changed_is_forwarded_last_for_add_new() {
    let registry = ManagerRegistry::new();
    let list = Arc::new(BindingList::with_factory(vec![Parent { id: 0 }], || {
        Parent { id: 1 }
    }));
    let manager = registry.get_manager(list, "").unwrap().unwrap();
    let last = Arc::new(Mutex::new(None));
    let l = last.clone();
    manager.signals().list_changed.connect(move |e| *l.lock() = Some(*e));

    manager.add_new().unwrap();
    assert_eq!(*last.lock(), Some(ListChangedEvent::item_added(1)));
}

#[test]
fn test_resolution_errors() {
    let registry = ManagerRegistry::new();
    let ds = data_set();

    assert!(registry.get_manager(ds.root.clone(), "Table1.id").unwrap().is_none());
    assert!(matches!(
        registry.get_manager(ds.root.clone(), "Table2.Parent"),
        Err(BindingError::InvalidRelation { .. })
    ));
    assert!(matches!(
        registry.get_manager(ds.root.clone(), "Table1.id.Relation"),
        Err(BindingError::InvalidRelation { .. })
    ));
    assert!(matches!(
        registry.get_manager(ds.root.clone(), "Table1..Relation"),
        Err(BindingError::InvalidPath { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_ambiguous_relation_name() {
    let registry = ManagerRegistry::new();
    let ds = data_set();
    let ambiguous: Arc<dyn BindableList> = Arc::new(
        BindingList::new(vec![Parent { id: 0 }]).with_members(vec![
            MemberDescriptor::field("relation"),
            MemberDescriptor::list("RELATION", ds.table2.clone()),
        ]),
    );
    match registry.get_manager(ambiguous, "Relation") {
        Err(BindingError::AmbiguousBinding { candidates, .. }) => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected an ambiguous binding, got {other:?}"),
    }
}

#[test]
fn test_identity_caching() {
    let registry = ManagerRegistry::new();
    let ds = data_set();
    let a = registry
        .get_manager(ds.root.clone(), "Table1.Relation")
        .unwrap()
        .unwrap();
    let b = registry
        .get_manager(ds.root.clone(), "table1.relation")
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    // Table1 and the relation child; no root manager was needed.
    assert_eq!(registry.len(), 2);

    let copy = data_set();
    let c = registry
        .get_manager(copy.root.clone(), "Table1.Relation")
        .unwrap()
        .unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
}

#[test]
fn test_strict_config_from_toml() {
    let config = BindingConfig::from_toml_str(
        r#"
        pending_edit_policy = "reject"
        name_matching = "exact"
        "#,
    )
    .unwrap();
    let registry = ManagerRegistry::with_config(config);
    let ds = data_set();

    assert!(registry.get_manager(ds.root.clone(), "table1").is_err());

    let list = Arc::new(BindingList::with_factory(Vec::new(), || Parent { id: 7 }));
    let manager = registry.get_manager(list, "").unwrap().unwrap();
    manager.add_new().unwrap();
    assert_eq!(
        manager.add_new(),
        Err(BindingError::EditInProgress { edit_index: 0 })
    );
}

#[test]
fn test_debug_tree_lists_relation_children() {
    let registry = ManagerRegistry::new();
    let ds = data_set();
    registry
        .get_manager(ds.root.clone(), "Table1.Relation")
        .unwrap();
    let output = RegistryTreeDebug::new(&registry).format_all();
    assert!(output.contains("Table1 (plain) @0/10"));
    assert!(output.contains("Table1.Relation (relation) @0/1"));
}

#[test]
fn test_wrong_thread_is_rejected() {
    horizon_binding_core::thread_check::set_thread_checks_enabled(true);
    let config = BindingConfig::default().with_thread_affinity_checks(true);
    let registry = ManagerRegistry::with_config(config);
    let list: Arc<dyn BindableList> = Arc::new(BindingList::new(vec![1, 2, 3]));
    let manager = registry.get_manager(list, "").unwrap().unwrap();

    let result = std::thread::spawn(move || manager.set_position(1)).join();
    assert!(result.is_err());
}
