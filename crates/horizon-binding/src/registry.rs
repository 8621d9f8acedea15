//! The manager registry.
//!
//! A [`ManagerRegistry`] is the binding context: it hands out one
//! [`CurrencyManager`] per distinct binding target and keeps every manager
//! it created alive until the registry itself is dropped. Targets are keyed
//! by the identity of the root list (not its contents) and the canonical
//! relation path, so asking twice for the same list and path yields the same
//! manager.
//!
//! Managers live in a slotmap arena and refer to each other through
//! [`ManagerId`]s. A parent manager records its relation children as
//! dependents and looks them up in the arena when its current row changes.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use horizon_binding_core::PerfSpan;
use horizon_binding_core::ThreadAffinity;
use horizon_binding_core::logging::{span_names, targets};
use parking_lot::RwLock;
use slotmap::{SlotMap, new_key_type};

use crate::config::BindingConfig;
use crate::error::BindingResult;
use crate::graph::{BindingPath, ListKind, RelationBinding, RelationGraph, StepSource};
use crate::list::{BindableList, ListIdentity};
use crate::manager::CurrencyManager;

new_key_type! {
    /// A unique identifier for a manager within its registry.
    pub struct ManagerId;
}

/// Cache key of one binding target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BindingKey {
    pub(crate) root: ListIdentity,
    /// Canonical path, empty for the root list itself.
    pub(crate) path: String,
}

/// Storage shared between the registry and its managers.
pub(crate) struct RegistryStore {
    pub(crate) managers: SlotMap<ManagerId, Arc<CurrencyManager>>,
    keys: HashMap<BindingKey, ManagerId>,
    /// Root lists with at least one manager, kept alive so that their
    /// identity cannot be reused by another list while cached.
    roots: HashMap<ListIdentity, Arc<dyn BindableList>>,
}

impl RegistryStore {
    fn new() -> Self {
        Self {
            managers: SlotMap::with_key(),
            keys: HashMap::new(),
            roots: HashMap::new(),
        }
    }

    fn lookup(&self, key: &BindingKey) -> Option<Arc<CurrencyManager>> {
        self.keys
            .get(key)
            .and_then(|id| self.managers.get(*id))
            .cloned()
    }
}

/// Shared handle to the store, held weakly by managers.
pub(crate) type SharedStore = Arc<RwLock<RegistryStore>>;

/// The binding context: a cache of currency managers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use horizon_binding::{BindableList, BindingList, ManagerRegistry};
///
/// let registry = ManagerRegistry::new();
/// let list: Arc<dyn BindableList> = Arc::new(BindingList::new(vec!["a", "b", "c"]));
///
/// let manager = registry.get_manager(list.clone(), "").unwrap().unwrap();
/// manager.set_position(2).unwrap();
///
/// // The same list and path always yield the same manager.
/// let again = registry.get_manager(list, "").unwrap().unwrap();
/// assert_eq!(again.position(), 2);
/// ```
pub struct ManagerRegistry {
    store: SharedStore,
    config: BindingConfig,
    graph: RelationGraph,
    affinity: ThreadAffinity,
}

impl Default for ManagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerRegistry {
    /// Creates a registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(BindingConfig::default())
    }

    /// Creates a registry with an explicit configuration.
    pub fn with_config(config: BindingConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(RegistryStore::new())),
            graph: RelationGraph::new(config.name_matching),
            config,
            affinity: ThreadAffinity::current(),
        }
    }

    /// The configuration shared by this registry's managers.
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Returns the manager for `path` relative to `list`, creating it and
    /// any missing parent managers on first use.
    ///
    /// Returns `Ok(None)` if the path ends in a data field.
    ///
    /// # Errors
    ///
    /// - [`BindingError::InvalidPath`](crate::BindingError::InvalidPath) for a malformed path
    /// - [`BindingError::InvalidRelation`](crate::BindingError::InvalidRelation) for a segment that
    ///   cannot be navigated as a list
    /// - [`BindingError::AmbiguousBinding`](crate::BindingError::AmbiguousBinding) for a segment
    ///   matching several members
    ///
    /// No manager is created when resolution fails.
    #[tracing::instrument(skip(self, list), target = "horizon_binding::registry", level = "trace")]
    pub fn get_manager(
        &self,
        list: Arc<dyn BindableList>,
        path: &str,
    ) -> BindingResult<Option<Arc<CurrencyManager>>> {
        self.check_thread();
        let path = BindingPath::parse(path)?;
        let root = ListIdentity::of(&list);

        // Fast path for targets that were already resolved under this exact
        // spelling.
        let exact = BindingKey {
            root,
            path: path.as_str().to_string(),
        };
        if let Some(manager) = self.store.read().lookup(&exact) {
            return Ok(Some(manager));
        }

        let _span = PerfSpan::new(span_names::RESOLVE);
        let Some(plan) = self.graph.plan(&list, &path)? else {
            return Ok(None);
        };

        let mut parent: Option<Arc<CurrencyManager>> = None;
        for step in plan.steps {
            let key = BindingKey {
                root,
                path: step.path,
            };
            let manager = match step.source {
                StepSource::Member(member) => {
                    let kind = ListKind::of_list(member.as_ref());
                    self.ensure(key, &list, || (member, kind))
                }
                StepSource::Relation { name, rule } => {
                    let owner = match parent.take() {
                        Some(owner) => owner,
                        None => self.ensure_root(&list),
                    };
                    self.ensure(key, &list, || {
                        let child = rule.materialize(owner.current_row().as_ref());
                        let binding = RelationBinding {
                            parent: owner.id(),
                            name,
                            rule,
                        };
                        (child, ListKind::RelationChild(binding))
                    })
                }
            };
            parent = Some(manager);
        }

        Ok(Some(match parent {
            Some(manager) => manager,
            None => self.ensure_root(&list),
        }))
    }

    /// Returns the manager for a target that was already resolved, without
    /// creating anything.
    pub fn lookup(&self, list: &Arc<dyn BindableList>, path: &str) -> Option<Arc<CurrencyManager>> {
        let path = BindingPath::parse(path).ok()?;
        let root = ListIdentity::of(list);
        let store = self.store.read();
        if let Some(manager) = store.lookup(&BindingKey {
            root,
            path: path.as_str().to_string(),
        }) {
            return Some(manager);
        }
        let plan = self.graph.plan(list, &path).ok()??;
        let last = plan.steps.last()?;
        store.lookup(&BindingKey {
            root,
            path: last.path.clone(),
        })
    }

    /// Returns `true` if a manager exists for `list` and `path`.
    pub fn contains(&self, list: &Arc<dyn BindableList>, path: &str) -> bool {
        self.lookup(list, path).is_some()
    }

    /// Returns the manager with the given id.
    pub fn manager(&self, id: ManagerId) -> Option<Arc<CurrencyManager>> {
        self.store.read().managers.get(id).cloned()
    }

    /// Ids of all managers, in creation order.
    pub fn manager_ids(&self) -> Vec<ManagerId> {
        self.store.read().managers.keys().collect()
    }

    /// Ids of the relation children of the manager `id`.
    pub fn dependents(&self, id: ManagerId) -> Vec<ManagerId> {
        self.manager(id)
            .map(|manager| manager.dependents())
            .unwrap_or_default()
    }

    /// Number of managers.
    pub fn len(&self) -> usize {
        self.store.read().managers.len()
    }

    /// Returns `true` if no manager was created yet.
    pub fn is_empty(&self) -> bool {
        self.store.read().managers.is_empty()
    }

    fn ensure_root(&self, list: &Arc<dyn BindableList>) -> Arc<CurrencyManager> {
        let key = BindingKey {
            root: ListIdentity::of(list),
            path: String::new(),
        };
        self.ensure(key, list, || (list.clone(), ListKind::of_list(list.as_ref())))
    }

    /// Returns the manager registered under `key`, creating it from `make`
    /// if needed.
    ///
    /// `make` runs without the store lock held, since materializing a
    /// relation reads the parent manager.
    fn ensure<F>(&self, key: BindingKey, root: &Arc<dyn BindableList>, make: F) -> Arc<CurrencyManager>
    where
        F: FnOnce() -> (Arc<dyn BindableList>, ListKind),
    {
        if let Some(manager) = self.store.read().lookup(&key) {
            return manager;
        }

        let (list, kind) = make();

        let mut store = self.store.write();
        if let Some(manager) = store.lookup(&key) {
            return manager;
        }

        let parent = kind.relation().map(|binding| binding.parent);
        let path = key.path.clone();
        let weak_store: Weak<RwLock<RegistryStore>> = Arc::downgrade(&self.store);
        let id = store.managers.insert_with_key(|id| {
            CurrencyManager::new(
                id,
                path.clone(),
                list,
                kind,
                self.config.clone(),
                weak_store,
                self.affinity,
            )
        });
        store.keys.insert(key.clone(), id);
        store
            .roots
            .entry(key.root)
            .or_insert_with(|| root.clone());
        if let Some(parent) = parent.and_then(|parent| store.managers.get(parent)) {
            parent.add_dependent(id);
        }

        tracing::debug!(
            target: targets::REGISTRY,
            ?id,
            path = %path,
            managers = store.managers.len(),
            "created currency manager"
        );

        store.managers[id].clone()
    }

    fn check_thread(&self) {
        if self.config.check_thread_affinity {
            self.affinity
                .assert_same_thread_with_msg("ManagerRegistry accessed from a thread other than its binding thread");
        }
    }
}

static_assertions::assert_impl_all!(ManagerRegistry: Send, Sync);
