//! Text rendering of a registry's manager graph.
//!
//! [`RegistryTreeDebug`] prints every root manager with its relation
//! children nested below it, along with the position and row count of each:
//!
//! ```text
//! Currency Managers (3 total):
//! (root) (plain) @0/2
//! └── Notes (relation) @0/1
//!    └── Notes.Tags (relation) @0/2
//! ```

use std::fmt::{self, Write};

use crate::graph::ListKind;
use crate::registry::{ManagerId, ManagerRegistry};

/// Style options for manager tree visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for manager tree output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show manager IDs.
    pub show_ids: bool,
    /// Whether to show the list kind.
    pub show_kinds: bool,
    /// Whether to mark managers with a pending edit.
    pub show_pending: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: false,
            show_kinds: true,
            show_pending: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_ids: true,
            ..Default::default()
        }
    }

    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_kinds: false,
            show_pending: false,
            ..Default::default()
        }
    }
}

/// Debug utility for visualizing the managers of a registry.
#[derive(Clone)]
pub struct RegistryTreeDebug<'a> {
    registry: &'a ManagerRegistry,
    options: TreeFormatOptions,
}

impl<'a> RegistryTreeDebug<'a> {
    /// Create a visualizer with default options.
    pub fn new(registry: &'a ManagerRegistry) -> Self {
        Self::with_options(registry, TreeFormatOptions::default())
    }

    /// Create a visualizer with custom options.
    pub fn with_options(registry: &'a ManagerRegistry, options: TreeFormatOptions) -> Self {
        Self { registry, options }
    }

    /// Format every manager, starting from the managers that have no
    /// relation parent.
    pub fn format_all(&self) -> String {
        self.to_string()
    }

    /// Format one manager and its relation children, or `None` if `root`
    /// is not in the registry.
    pub fn format_subtree(&self, root: ManagerId) -> Option<String> {
        self.registry.manager(root)?;
        let mut output = String::new();
        self.write_subtree(&mut output, root, 0, true, &mut Vec::new()).ok()?;
        Some(output)
    }

    fn roots(&self) -> Vec<ManagerId> {
        self.registry
            .manager_ids()
            .into_iter()
            .filter(|id| {
                self.registry
                    .manager(*id)
                    .is_some_and(|manager| !matches!(manager.kind(), ListKind::RelationChild(_)))
            })
            .collect()
    }

    fn write_subtree(
        &self,
        output: &mut impl Write,
        id: ManagerId,
        depth: usize,
        is_last: bool,
        rails: &mut Vec<bool>,
    ) -> fmt::Result {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }
        let Some(manager) = self.registry.manager(id) else {
            return Ok(());
        };

        output.write_str(&self.build_prefix(rails, depth, is_last))?;
        let path = if manager.path().is_empty() {
            "(root)"
        } else {
            manager.path()
        };
        output.write_str(path)?;

        if self.options.show_ids {
            write!(output, " [{:?}]", id)?;
        }
        if self.options.show_kinds {
            write!(output, " ({})", manager.kind().label())?;
        }
        write!(output, " @{}/{}", manager.position(), manager.count())?;
        if self.options.show_pending
            && let Some(edit) = manager.pending_edit()
        {
            let what = if edit.is_add_new { "adding" } else { "editing" };
            write!(output, " *{} row {}", what, edit.edit_index)?;
        }
        output.write_char('\n')?;

        let children = manager.dependents();
        let child_count = children.len();
        // Levels below a last child get no rail.
        if depth > 0 {
            rails.push(!is_last);
        }
        let mut result = Ok(());
        for (i, child) in children.into_iter().enumerate() {
            result = self.write_subtree(output, child, depth + 1, i + 1 == child_count, rails);
            if result.is_err() {
                break;
            }
        }
        if depth > 0 {
            rails.pop();
        }
        result
    }

    /// Build the prefix string for a tree node.
    fn build_prefix(&self, rails: &[bool], depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for &rail in rails {
            if rail {
                prefix.push_str(branch);
            } else {
                prefix.extend(std::iter::repeat_n(' ', branch.chars().count()));
            }
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix.push(' ');
        prefix
    }
}

impl fmt::Display for RegistryTreeDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Currency Managers ({} total):", self.registry.len())?;
        let roots = self.roots();
        if roots.is_empty() {
            return writeln!(f, "  (empty)");
        }
        let root_count = roots.len();
        for (i, root) in roots.into_iter().enumerate() {
            self.write_subtree(f, root, 0, i + 1 == root_count, &mut Vec::new())?;
        }
        Ok(())
    }
}
