//! Per-request span tree assembly.
//!
//! Field timing events address spans by response path (`posts.0.title`).
//! Events arrive in no particular order: list elements complete out of
//! sequence and async resolvers finish whenever they finish. Inserting a
//! span therefore synthesizes any missing ancestors on the way up and
//! attaches each node to its parent exactly once, no matter how many
//! descendants arrive first.

use crate::error::TraceError;
use std::collections::HashMap;
use std::fmt;
use tracewire_report::proto::{node, Node};

/// One step of a response path: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Object field, addressed by its response name.
    Field(String),
    /// List element, addressed by position.
    Index(u32),
}

impl PathStep {
    /// Step addressing a named field.
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    /// Step addressing a list element.
    pub fn index(index: u32) -> Self {
        Self::Index(index)
    }

    fn id(&self) -> node::Id {
        match self {
            Self::Field(name) => node::Id::ResponseName(name.clone()),
            Self::Index(index) => node::Id::Index(*index),
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Renders a path the way a response would address it, e.g. `posts.0.title`.
pub fn format_path(path: &[PathStep]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

struct Slot {
    node: Node,
    children: Vec<usize>,
}

/// Sparse tree of timed spans for one in-flight request.
///
/// Nodes live in an arena indexed by path; parent-child edges are recorded
/// as arena indices and materialized into [`Node::child`] vectors when the
/// finished tree is taken with [`SpanTree::root`].
pub struct SpanTree {
    slots: Vec<Slot>,
    by_path: HashMap<Vec<PathStep>, usize>,
}

impl SpanTree {
    /// An empty tree holding only the root span.
    pub fn new() -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(Vec::new(), 0);
        let root = Slot {
            node: Node::default(),
            children: Vec::new(),
        };
        Self {
            slots: vec![root],
            by_path,
        }
    }

    /// Inserts the span observed at `path`.
    ///
    /// Missing ancestors are synthesized innermost first, each carrying only
    /// the step addressing it within its parent, and the chain is attached
    /// to the nearest ancestor already present. Inserting a path that
    /// already exists as a synthesized placeholder fills the placeholder in
    /// place, keeping its children and its position under its parent. The
    /// empty path addresses the root span itself.
    pub fn add(
        &mut self,
        path: &[PathStep],
        field_name: &str,
        type_name: &str,
        parent_type: &str,
        start_offset: u64,
        end_offset: u64,
    ) {
        if let Some(&index) = self.by_path.get(path) {
            let node = &mut self.slots[index].node;
            node.r#type = type_name.to_string();
            node.parent_type = parent_type.to_string();
            node.start_time = start_offset;
            node.end_time = end_offset;
            set_names(node, path.last(), field_name);
            return;
        }

        let mut node = Node {
            r#type: type_name.to_string(),
            parent_type: parent_type.to_string(),
            start_time: start_offset,
            end_time: end_offset,
            ..Node::default()
        };
        set_names(&mut node, path.last(), field_name);
        let index = self.slots.len();
        self.slots.push(Slot {
            node,
            children: Vec::new(),
        });
        self.by_path.insert(path.to_vec(), index);
        self.attach_upward(path, index);
    }

    /// Walks toward the root, synthesizing placeholder ancestors until an
    /// existing one is reached. Only called for freshly inserted non-root
    /// paths, so `path` is never empty here.
    fn attach_upward(&mut self, path: &[PathStep], index: usize) {
        let mut child = index;
        let mut parent_path = &path[..path.len() - 1];
        loop {
            if let Some(&parent) = self.by_path.get(parent_path) {
                self.slots[parent].children.push(child);
                return;
            }
            let placeholder = Node {
                id: parent_path.last().map(PathStep::id),
                ..Node::default()
            };
            let parent = self.slots.len();
            self.slots.push(Slot {
                node: placeholder,
                children: vec![child],
            });
            self.by_path.insert(parent_path.to_vec(), parent);
            child = parent;
            parent_path = &parent_path[..parent_path.len() - 1];
        }
    }

    /// Looks up the span recorded at `path` for in-place edits.
    ///
    /// A missing path is an integration error: completion events must refer
    /// to spans that were already placed.
    pub fn node_mut(&mut self, path: &[PathStep]) -> Result<&mut Node, TraceError> {
        match self.by_path.get(path) {
            Some(&index) => Ok(&mut self.slots[index].node),
            None => Err(TraceError::PathNotFound {
                path: format_path(path),
            }),
        }
    }

    /// Number of spans placed so far, counting the root.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when only the untouched root span is present.
    pub fn is_empty(&self) -> bool {
        self.slots.len() == 1
    }

    /// Consumes the tree and returns the root span, with every recorded
    /// child attached in insertion order.
    pub fn root(mut self) -> Node {
        self.take_subtree(0)
    }

    fn take_subtree(&mut self, index: usize) -> Node {
        let empty = Slot {
            node: Node::default(),
            children: Vec::new(),
        };
        let slot = std::mem::replace(&mut self.slots[index], empty);
        let mut node = slot.node;
        for child in slot.children {
            node.child.push(self.take_subtree(child));
        }
        node
    }
}

impl Default for SpanTree {
    fn default() -> Self {
        Self::new()
    }
}

fn set_names(node: &mut Node, step: Option<&PathStep>, field_name: &str) {
    node.id = step.map(PathStep::id);
    if let Some(PathStep::Field(response_name)) = step {
        if response_name != field_name && !field_name.is_empty() {
            node.original_field_name = field_name.to_string();
        }
    }
}
