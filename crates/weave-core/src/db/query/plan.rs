use crate::{
    db::query::Query,
    error::InternalError,
    model::{RelationDef, SchemaCatalog},
};

///
/// EagerLoadSpec
///
/// Caller-supplied relation paths to load alongside root records.
///
/// Paths are dotted relation names ("Images.Tags") or the equivalent nested
/// form built with [`EagerLoadSpec::nest`]. Constraints attached to a path
/// apply to the deepest node of that path. Explicit paths may revisit a
/// model (`Images.Tags.Images.Tags`); each spelled-out segment is one
/// level, so recursion is bounded by the caller.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EagerLoadSpec {
    paths: Vec<EagerPath>,
}

#[derive(Clone, Debug, PartialEq)]
struct EagerPath {
    segments: Vec<String>,
    constraints: Option<Query>,
}

impl EagerLoadSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dotted relation path.
    #[must_use]
    pub fn path(mut self, dotted: &str) -> Self {
        self.paths.push(EagerPath {
            segments: split_path(dotted),
            constraints: None,
        });
        self
    }

    /// Add a dotted relation path whose deepest node is constrained.
    #[must_use]
    pub fn path_with(mut self, dotted: &str, constraints: Query) -> Self {
        self.paths.push(EagerPath {
            segments: split_path(dotted),
            constraints: Some(constraints),
        });
        self
    }

    /// Add `relation` and, beneath it, every path of `inner`.
    #[must_use]
    pub fn nest(self, relation: &str, inner: Self) -> Self {
        self.nest_inner(relation, None, inner)
    }

    /// Like [`EagerLoadSpec::nest`], constraining the `relation` node itself.
    #[must_use]
    pub fn nest_with(self, relation: &str, constraints: Query, inner: Self) -> Self {
        self.nest_inner(relation, Some(constraints), inner)
    }

    fn nest_inner(mut self, relation: &str, constraints: Option<Query>, inner: Self) -> Self {
        let prefix = split_path(relation);
        self.paths.push(EagerPath {
            segments: prefix.clone(),
            constraints,
        });
        for path in inner.paths {
            let mut segments = prefix.clone();
            segments.extend(path.segments);
            self.paths.push(EagerPath {
                segments,
                constraints: path.constraints,
            });
        }
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Paths in dotted form, in declaration order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.paths.iter().map(|p| p.segments.join(".")).collect()
    }
}

impl From<&str> for EagerLoadSpec {
    fn from(dotted: &str) -> Self {
        Self::new().path(dotted)
    }
}

impl<'a> FromIterator<&'a str> for EagerLoadSpec {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::path)
    }
}

fn split_path(dotted: &str) -> Vec<String> {
    dotted.split('.').map(|s| s.trim().to_string()).collect()
}

///
/// EagerLoadPlan
///
/// Validated, finite tree of relations to load, rooted at one model.
/// Siblings keep the order in which paths first named them.
///

#[derive(Clone, Debug, PartialEq)]
pub struct EagerLoadPlan {
    pub model: String,
    pub nodes: Vec<PlanNode>,
}

///
/// PlanNode
///
/// One relation to load for every record produced by the parent level.
///

#[derive(Clone, Debug, PartialEq)]
pub struct PlanNode {
    /// Model that declares `relation`.
    pub owner: String,
    pub relation: RelationDef,
    /// Constraints merged from every path ending at this node.
    pub constraints: Query,
    pub children: Vec<Self>,
}

impl PlanNode {
    fn new(owner: &str, relation: RelationDef) -> Self {
        Self {
            owner: owner.to_string(),
            relation,
            constraints: Query::default(),
            children: Vec::new(),
        }
    }
}

impl EagerLoadPlan {
    /// Plan that loads nothing beyond the root records.
    #[must_use]
    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            nodes: Vec::new(),
        }
    }

    /// Resolve every path against the catalog.
    ///
    /// Fails with an unknown-relationship error before any fetch happens.
    pub fn compile(
        catalog: &SchemaCatalog,
        root: &str,
        spec: &EagerLoadSpec,
    ) -> Result<Self, InternalError> {
        catalog.model(root)?;

        let mut nodes = Vec::new();
        for path in &spec.paths {
            insert_path(
                catalog,
                root,
                &mut nodes,
                &path.segments,
                path.constraints.as_ref(),
            )?;
        }

        Ok(Self {
            model: root.to_string(),
            nodes,
        })
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of relation nodes (one batched fetch each).
    #[must_use]
    pub fn node_count(&self) -> usize {
        fn count(nodes: &[PlanNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.nodes)
    }

    /// Longest root-to-leaf relation chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        fn depth(nodes: &[PlanNode]) -> usize {
            nodes.iter().map(|n| 1 + depth(&n.children)).max().unwrap_or(0)
        }
        depth(&self.nodes)
    }
}

fn insert_path(
    catalog: &SchemaCatalog,
    owner: &str,
    nodes: &mut Vec<PlanNode>,
    segments: &[String],
    constraints: Option<&Query>,
) -> Result<(), InternalError> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };
    let relation = catalog.relationship(owner, head)?;

    let position = match nodes.iter().position(|n| n.relation.name == *head) {
        Some(position) => position,
        None => {
            nodes.push(PlanNode::new(owner, relation.clone()));
            nodes.len() - 1
        }
    };
    let node = &mut nodes[position];

    if rest.is_empty() {
        if let Some(constraints) = constraints {
            node.constraints.merge(constraints);
        }
        return Ok(());
    }

    insert_path(
        catalog,
        &relation.target,
        &mut node.children,
        rest,
        constraints,
    )
}

///
/// TESTS
///
