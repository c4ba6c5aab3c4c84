use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::codec::TestId;
use crate::inventory::NodeRef;

/// The reconciliation rule that produced an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Local identifier found remotely.
    IdentifierMatch,
    /// Local identifier not found remotely; create the test under it.
    ExplicitCreate,
    /// No identifier; one unclaimed remote test has the same name and suite.
    StructuralMatch,
    /// No identifier and no structural match; the service issues one.
    NewTest,
    /// Matched test whose name or tags changed locally.
    AttributeChange,
    /// Local suite placement forced onto the project.
    KeepStructure,
    /// Remote test no longer present in source.
    MissingFromSource,
}

/// A changed attribute of a matched test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Change {
    Name { from: String, to: String },
    Tags { added: BTreeSet<String>, removed: BTreeSet<String> },
}

/// One reconciliation decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanOp {
    Assign {
        node: NodeRef,
    },
    KeepId {
        node: NodeRef,
        id: TestId,
        rule: Rule,
    },
    CreateWithId {
        node: NodeRef,
        id: TestId,
    },
    Update {
        node: NodeRef,
        id: TestId,
        changes: Vec<Change>,
    },
    Move {
        node: NodeRef,
        id: TestId,
        from: Vec<String>,
        to: Vec<String>,
    },
    Detach {
        id: TestId,
    },
}

impl PlanOp {
    pub fn rule(&self) -> Rule {
        match self {
            PlanOp::Assign { .. } => Rule::NewTest,
            PlanOp::KeepId { rule, .. } => *rule,
            PlanOp::CreateWithId { .. } => Rule::ExplicitCreate,
            PlanOp::Update { .. } => Rule::AttributeChange,
            PlanOp::Move { .. } => Rule::KeepStructure,
            PlanOp::Detach { .. } => Rule::MissingFromSource,
        }
    }

    /// The local test this operation concerns, if any.
    pub fn node(&self) -> Option<&NodeRef> {
        match self {
            PlanOp::Assign { node }
            | PlanOp::KeepId { node, .. }
            | PlanOp::CreateWithId { node, .. }
            | PlanOp::Update { node, .. }
            | PlanOp::Move { node, .. } => Some(node),
            PlanOp::Detach { .. } => None,
        }
    }

    pub fn id(&self) -> Option<&TestId> {
        match self {
            PlanOp::Assign { .. } => None,
            PlanOp::KeepId { id, .. }
            | PlanOp::CreateWithId { id, .. }
            | PlanOp::Update { id, .. }
            | PlanOp::Move { id, .. }
            | PlanOp::Detach { id } => Some(id),
        }
    }
}

/// The full set of decisions for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub ops: Vec<PlanOp>,
    /// Ask the service to remove suites left empty. Resolved server-side.
    pub prune_empty_suites: bool,
    /// Local suite paths are sent and respected.
    pub force_structure: bool,
    /// Ambiguities resolved by rule rather than by data.
    pub warnings: Vec<String>,
}

impl ReconciliationPlan {
    pub fn assigns(&self) -> impl Iterator<Item = &NodeRef> {
        self.ops.iter().filter_map(|op| match op {
            PlanOp::Assign { node } => Some(node),
            _ => None,
        })
    }

    pub fn detaches(&self) -> impl Iterator<Item = &TestId> {
        self.ops.iter().filter_map(|op| match op {
            PlanOp::Detach { id } => Some(id),
            _ => None,
        })
    }

    pub fn updates(&self) -> impl Iterator<Item = &PlanOp> {
        self.ops
            .iter()
            .filter(|op| matches!(op, PlanOp::Update { .. } | PlanOp::Move { .. }))
    }

    /// The primary operation for the local test at `index`: one of
    /// `Assign`, `KeepId` or `CreateWithId`.
    pub fn primary_for(&self, index: usize) -> Option<&PlanOp> {
        self.ops.iter().find(|op| {
            matches!(
                op,
                PlanOp::Assign { node } | PlanOp::KeepId { node, .. } | PlanOp::CreateWithId { node, .. }
                    if node.index == index
            )
        })
    }

    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for op in &self.ops {
            match op {
                PlanOp::Assign { .. } | PlanOp::CreateWithId { .. } => summary.created += 1,
                PlanOp::KeepId { .. } => summary.matched += 1,
                PlanOp::Update { .. } | PlanOp::Move { .. } => summary.updated += 1,
                PlanOp::Detach { .. } => summary.detached += 1,
            }
        }
        summary
    }

    /// True when the plan would change nothing on either side.
    pub fn is_noop(&self) -> bool {
        let summary = self.summary();
        summary.created == 0 && summary.updated == 0 && summary.detached == 0
    }
}

/// Human-readable counts of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub detached: usize,
    pub matched: usize,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} detached, {} matched",
            self.created, self.updated, self.detached, self.matched
        )
    }
}
