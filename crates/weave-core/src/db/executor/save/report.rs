use crate::{error::InternalError, value::Key};

///
/// NodeOutcome
///

#[derive(Debug)]
pub enum NodeOutcome {
    Inserted,
    Updated,
    /// The node's own write (or one of its link writes) failed.
    Failed(InternalError),
    /// The node was not written because something it depends on failed.
    Skipped(String),
}

impl NodeOutcome {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

///
/// NodeReport
/// Outcome for one record reached by a save.
///

#[derive(Debug)]
pub struct NodeReport {
    /// Position in the saved graph, e.g. `Galleries.Images[1].Tags[0]`.
    pub path: String,
    pub model: String,
    pub key: Option<Key>,
    pub outcome: NodeOutcome,
}

///
/// SaveOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SaveOutcome {
    /// Every reached node was written.
    Saved,
    /// The root was written but at least one other node failed.
    Partial,
    /// The root itself was not written.
    Failed,
    /// Cancellation stopped the walk.
    Cancelled,
}

///
/// SaveReport
///
/// Per-node outcomes of one cascading save, in write order.
///

#[derive(Debug)]
pub struct SaveReport {
    root: String,
    nodes: Vec<NodeReport>,
    join_inserts: u64,
    join_removes: u64,
    cancelled: bool,
}

impl SaveReport {
    pub(crate) fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            nodes: Vec::new(),
            join_inserts: 0,
            join_removes: 0,
            cancelled: false,
        }
    }

    pub(crate) fn push(&mut self, node: NodeReport) {
        self.nodes.push(node);
    }

    pub(crate) const fn add_join_delta(&mut self, inserts: u64, removes: u64) {
        self.join_inserts = self.join_inserts.saturating_add(inserts);
        self.join_removes = self.join_removes.saturating_add(removes);
    }

    pub(crate) const fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    #[must_use]
    pub fn outcome(&self) -> SaveOutcome {
        if self.cancelled {
            return SaveOutcome::Cancelled;
        }
        if self.failures().next().is_none() {
            return SaveOutcome::Saved;
        }
        let root_written = self
            .nodes
            .iter()
            .any(|node| node.path == self.root && node.outcome.is_ok());

        if root_written {
            SaveOutcome::Partial
        } else {
            SaveOutcome::Failed
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome() == SaveOutcome::Saved
    }

    #[must_use]
    pub fn nodes(&self) -> &[NodeReport] {
        &self.nodes
    }

    /// Nodes that failed or were skipped.
    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|node| !node.outcome.is_ok())
    }

    /// Take the first failure's error, if any.
    #[must_use]
    pub fn into_first_error(self) -> Option<InternalError> {
        self.nodes.into_iter().find_map(|node| match node.outcome {
            NodeOutcome::Failed(err) => Some(err),
            _ => None,
        })
    }

    #[must_use]
    pub const fn join_inserts(&self) -> u64 {
        self.join_inserts
    }

    #[must_use]
    pub const fn join_removes(&self) -> u64 {
        self.join_removes
    }
}
