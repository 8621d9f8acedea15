//! Relation path resolution.
//!
//! A relation path such as `"Orders.OrderLines"` names a walk from a root
//! list through member lists and parent-to-child relations. The
//! [`RelationGraph`] turns a path into a [`ResolutionPlan`]: one step per
//! segment, each naming the canonical path of the manager it produces and
//! how that manager's list is obtained. The registry then realizes the plan,
//! creating the managers that do not exist yet.
//!
//! Segment matching follows the configured [`NameMatching`]. An exact-case
//! match always wins; a segment that still matches more than one member is
//! ambiguous.

use std::fmt;
use std::sync::Arc;

use horizon_binding_core::logging::targets;

use crate::config::NameMatching;
use crate::error::{BindingError, BindingResult};
use crate::list::{BindableList, MemberDescriptor, MemberKind};
use crate::registry::ManagerId;
use crate::relation::Relation;

/// A parsed relation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPath {
    raw: String,
    segments: Vec<String>,
}

impl BindingPath {
    /// Parses a dot-separated path. The empty path names the root list.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InvalidPath`] if any segment is empty, as in
    /// `"Orders..Lines"` or `".Orders"`.
    pub fn parse(path: &str) -> BindingResult<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Ok(Self {
                raw: String::new(),
                segments: Vec::new(),
            });
        }
        let segments: Vec<String> = trimmed.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(String::is_empty) {
            return Err(BindingError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// The path as written, trimmed.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns `true` for the empty path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for BindingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One parent-to-child edge of the manager graph.
#[derive(Clone)]
pub struct RelationBinding {
    /// The manager whose current row drives the child list.
    pub parent: ManagerId,
    /// The relation name as declared by the parent list.
    pub name: String,
    /// How the child list is computed from the parent row.
    pub rule: Arc<dyn Relation>,
}

impl fmt::Debug for RelationBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationBinding")
            .field("parent", &self.parent)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// What kind of list a manager is bound to, decided once at resolution.
#[derive(Debug, Clone)]
pub enum ListKind {
    /// A flat list of rows.
    Plain,
    /// A list that exposes member lists, such as a data set of tables.
    Hierarchical,
    /// The related rows of a parent manager's current row.
    RelationChild(RelationBinding),
}

impl ListKind {
    /// Classifies a root or member list.
    pub fn of_list(list: &dyn BindableList) -> Self {
        let hierarchical = list
            .members()
            .iter()
            .any(|member| matches!(member.kind, MemberKind::List(_)));
        if hierarchical {
            Self::Hierarchical
        } else {
            Self::Plain
        }
    }

    /// The relation edge, for relation children.
    pub fn relation(&self) -> Option<&RelationBinding> {
        match self {
            Self::RelationChild(binding) => Some(binding),
            _ => None,
        }
    }

    /// A short label for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Hierarchical => "hierarchical",
            Self::RelationChild(_) => "relation",
        }
    }
}

/// How the list of one resolved segment is obtained.
#[derive(Clone)]
pub(crate) enum StepSource {
    /// A fixed member list of the previous list.
    Member(Arc<dyn BindableList>),
    /// A relation materialized from the previous manager's current row.
    Relation {
        name: String,
        rule: Arc<dyn Relation>,
    },
}

/// One resolved segment.
#[derive(Clone)]
pub(crate) struct ResolutionStep {
    /// Canonical path up to and including this segment, using the declared
    /// member names.
    pub(crate) path: String,
    pub(crate) source: StepSource,
}

/// The managers a path resolves to, parent first.
pub(crate) struct ResolutionPlan {
    pub(crate) steps: Vec<ResolutionStep>,
}

/// Resolves relation paths against list schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationGraph {
    matching: NameMatching,
}

impl RelationGraph {
    /// Creates a graph using the given name matching policy.
    pub fn new(matching: NameMatching) -> Self {
        Self { matching }
    }

    /// The name matching policy.
    pub fn matching(&self) -> NameMatching {
        self.matching
    }

    /// Finds the member a path segment refers to.
    ///
    /// # Errors
    ///
    /// [`BindingError::AmbiguousBinding`] if the segment matches more than one
    /// member, [`BindingError::InvalidRelation`] if it matches none.
    pub fn lookup_member(
        &self,
        members: &[MemberDescriptor],
        path: &BindingPath,
        segment: &str,
    ) -> BindingResult<MemberDescriptor> {
        let exact: Vec<&MemberDescriptor> =
            members.iter().filter(|m| m.name == segment).collect();
        let candidates = if exact.is_empty() {
            members
                .iter()
                .filter(|m| self.matching.matches(&m.name, segment))
                .collect()
        } else {
            exact
        };

        match candidates.as_slice() {
            [member] => Ok((*member).clone()),
            [] => Err(BindingError::invalid_relation(
                path.as_str(),
                segment,
                "is not a member of the bound list",
            )),
            many => Err(BindingError::ambiguous(
                path.as_str(),
                segment,
                many.iter().map(|m| m.name.clone()).collect(),
            )),
        }
    }

    /// Plans the resolution of `path` against `root`.
    ///
    /// Returns `Ok(None)` when the last segment is a data field, which has no
    /// currency of its own.
    pub(crate) fn plan(
        &self,
        root: &Arc<dyn BindableList>,
        path: &BindingPath,
    ) -> BindingResult<Option<ResolutionPlan>> {
        let mut steps = Vec::with_capacity(path.segments().len());
        let mut members = root.members();
        let mut canonical = String::new();
        let last = path.segments().len().saturating_sub(1);

        for (i, segment) in path.segments().iter().enumerate() {
            let member = self.lookup_member(&members, path, segment).inspect_err(|err| {
                tracing::debug!(target: targets::GRAPH, path = %path, %err, "resolution failed");
            })?;

            if !canonical.is_empty() {
                canonical.push('.');
            }
            canonical.push_str(&member.name);

            let source = match member.kind {
                MemberKind::Field if i == last => {
                    tracing::trace!(target: targets::GRAPH, path = %path, "path ends in a field");
                    return Ok(None);
                }
                MemberKind::Field => {
                    return Err(self.reject(path, segment, "is a data field, not a list"));
                }
                MemberKind::ParentRelation => {
                    return Err(self.reject(
                        path,
                        segment,
                        "navigates from child to parent and cannot be bound as a list",
                    ));
                }
                MemberKind::List(list) => {
                    members = list.members();
                    StepSource::Member(list)
                }
                MemberKind::ChildRelation(rule) => {
                    // The schema of a relation child does not depend on the
                    // parent row.
                    members = rule.materialize(None).members();
                    StepSource::Relation {
                        name: member.name.clone(),
                        rule,
                    }
                }
            };

            steps.push(ResolutionStep {
                path: canonical.clone(),
                source,
            });
        }

        Ok(Some(ResolutionPlan { steps }))
    }

    fn reject(&self, path: &BindingPath, segment: &str, reason: &str) -> BindingError {
        let err = BindingError::invalid_relation(path.as_str(), segment, reason);
        tracing::debug!(target: targets::GRAPH, path = %path, %err, "resolution failed");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding_list::BindingList;
    use crate::relation::KeyRelation;

    #[derive(Clone)]
    struct Order {
        id: u32,
    }

    #[derive(Clone)]
    struct Line {
        order_id: u32,
    }

    fn data_set() -> Arc<dyn BindableList> {
        let lines = Arc::new(
            BindingList::new(vec![Line { order_id: 1 }])
                .with_members(vec![MemberDescriptor::field("order_id"), MemberDescriptor::parent_relation("Order")]),
        );
        let relation: Arc<dyn Relation> = Arc::new(KeyRelation::by_key(
            "Lines",
            lines.clone(),
            |o: &Order| o.id,
            |l: &Line| l.order_id,
        ));
        let orders = Arc::new(BindingList::new(vec![Order { id: 1 }]).with_members(vec![
            MemberDescriptor::field("id"),
            MemberDescriptor::child_relation(relation),
        ]));
        Arc::new(BindingList::<()>::new(Vec::new()).with_members(vec![
            MemberDescriptor::list("Orders", orders),
            MemberDescriptor::list("OrderLines", lines),
        ]))
    }

    fn plan_paths(graph: &RelationGraph, path: &str) -> BindingResult<Option<Vec<String>>> {
        let path = BindingPath::parse(path)?;
        Ok(graph
            .plan(&data_set(), &path)?
            .map(|plan| plan.steps.into_iter().map(|s| s.path).collect()))
    }

    #[test]
    fn test_parse_path() {
        assert!(BindingPath::parse("").unwrap().is_root());
        assert_eq!(
            BindingPath::parse(" Orders.Lines ").unwrap().segments(),
            ["Orders", "Lines"]
        );
        assert_eq!(
            BindingPath::parse("Orders..Lines"),
            Err(BindingError::InvalidPath {
                path: "Orders..Lines".into()
            })
        );
        assert!(BindingPath::parse(".Orders").is_err());
    }

    #[test]
    fn test_plan_canonicalizes_names() {
        let graph = RelationGraph::default();
        assert_eq!(
            plan_paths(&graph, "orders.lines").unwrap(),
            Some(vec!["Orders".to_string(), "Orders.Lines".to_string()])
        );
    }

    #[test]
    fn test_plan_field_yields_no_manager() {
        let graph = RelationGraph::default();
        assert_eq!(plan_paths(&graph, "Orders.id").unwrap(), None);
        assert_eq!(plan_paths(&graph, "Orders.Lines.order_id").unwrap(), None);
    }

    #[test]
    fn test_plan_rejects_non_navigable_segments() {
        let graph = RelationGraph::default();
        assert!(matches!(
            plan_paths(&graph, "OrderLines.Order"),
            Err(BindingError::InvalidRelation { .. })
        ));
        assert!(matches!(
            plan_paths(&graph, "Orders.id.Lines"),
            Err(BindingError::InvalidRelation { .. })
        ));
        assert!(matches!(
            plan_paths(&graph, "Customers"),
            Err(BindingError::InvalidRelation { .. })
        ));
    }

    #[test]
    fn test_exact_matching() {
        let graph = RelationGraph::new(NameMatching::Exact);
        assert!(plan_paths(&graph, "orders").is_err());
        assert!(plan_paths(&graph, "Orders").unwrap().is_some());
    }

    #[test]
    fn test_ambiguous_member() {
        let graph = RelationGraph::default();
        let members = vec![
            MemberDescriptor::field("Items"),
            MemberDescriptor::field("ITEMS"),
            MemberDescriptor::field("Total"),
        ];
        let path = BindingPath::parse("items").unwrap();
        match graph.lookup_member(&members, &path, "items") {
            Err(BindingError::AmbiguousBinding { candidates, .. }) => {
                assert_eq!(candidates, vec!["Items".to_string(), "ITEMS".to_string()]);
            }
            other => panic!("expected ambiguity, got {:?}", other.map(|m| m.name)),
        }
        // An exact match wins over case-insensitive ones.
        let path = BindingPath::parse("Items").unwrap();
        assert_eq!(graph.lookup_member(&members, &path, "Items").unwrap().name, "Items");
    }

    #[test]
    fn test_list_kind() {
        assert_eq!(ListKind::of_list(data_set().as_ref()).label(), "hierarchical");
        let flat = BindingList::new(vec![1_u8]);
        assert_eq!(ListKind::of_list(&flat).label(), "plain");
    }
}
