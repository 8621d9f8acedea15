//! Horizon Binding - currency management for data-bound lists.
//!
//! A *currency manager* tracks the current row of a bound list, keeps it
//! consistent while the list changes, runs add-new and edit transactions,
//! and drives master/detail relations: when a parent manager moves, the
//! managers bound to its related child rows follow.
//!
//! # Key Types
//!
//! - [`BindableList`] - The capability set a collection exposes for binding
//! - [`BindingList`] - A ready-made bindable list over a `Vec`
//! - [`ManagerRegistry`] - The binding context handing out managers
//! - [`CurrencyManager`] - Position, edits and notifications for one list
//! - [`KeyRelation`] - A parent-to-child relation matching keys
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_binding::{BindableList, BindingList, ManagerRegistry};
//!
//! let registry = ManagerRegistry::new();
//! let names: Arc<dyn BindableList> =
//!     Arc::new(BindingList::new(vec!["Ada".to_string(), "Grace".to_string()]));
//!
//! let manager = registry.get_manager(names, "").unwrap().unwrap();
//! manager.signals().position_changed.connect(|position| {
//!     println!("now at row {}", position);
//! });
//!
//! manager.move_next().unwrap();
//! let current = manager.current().unwrap();
//! assert_eq!(current.downcast_ref::<String>().unwrap(), "Grace");
//! ```

pub mod binding_list;
pub mod config;
pub mod cursor;
pub mod debug;
pub mod error;
pub mod graph;
pub mod list;
pub mod manager;
pub mod registry;
pub mod relation;

pub use binding_list::{BindingList, RowFactory};
pub use config::{BindingConfig, ConfigError, NameMatching, PendingEditPolicy};
pub use cursor::{PositionChange, PositionCursor};
pub use debug::{RegistryTreeDebug, TreeFormatOptions, TreeStyle};
pub use error::{BindingError, BindingResult};
pub use graph::{BindingPath, ListKind, RelationBinding, RelationGraph};
pub use list::{
    BindableList, ListChangedEvent, ListChangedType, ListIdentity, MemberDescriptor, MemberKind,
    RowHandle,
};
pub use manager::{CurrencyManager, CurrencySignals, PendingEdit};
pub use registry::{ManagerId, ManagerRegistry};
pub use relation::{KeyRelation, RelatedView, Relation, RowMatcher, ViewFilter};

pub use horizon_binding_core::{ConnectionId, Signal};
