//! Diffs the local inventory against the remote snapshot.
//!
//! Matching is keyed by identifier. Only tests without an identifier fall
//! back to structural matching by name and suite path, and a structural
//! match never takes a remote test that a local identifier already claims.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::error::ReconciliationConflict;
use super::plan::{Change, PlanOp, ReconciliationPlan, Rule};
use crate::codec::TestId;
use crate::config::ImportOptions;
use crate::inventory::{Inventory, NodeRef, TestNode};
use crate::snapshot::{ProjectSnapshot, RemoteTest};

/// Fails when two local tests carry the same identifier.
///
/// Runs before any network activity.
pub fn check_claims(inventory: &Inventory) -> Result<(), ReconciliationConflict> {
    let mut seen: HashMap<&TestId, NodeRef> = HashMap::new();
    for node in inventory.tests() {
        let Some(id) = &node.identifier else { continue };
        if let Some(first) = seen.get(id) {
            return Err(ReconciliationConflict {
                id: id.clone(),
                first: first.clone(),
                second: node.node_ref(),
            });
        }
        seen.insert(id, node.node_ref());
    }
    Ok(())
}

/// Builds the reconciliation plan for one sync run.
pub fn reconcile(
    inventory: &Inventory,
    snapshot: &ProjectSnapshot,
    options: &ImportOptions,
) -> Result<ReconciliationPlan, ReconciliationConflict> {
    check_claims(inventory)?;

    let tests = inventory.tests();
    let claimed: BTreeSet<&TestId> = tests.iter().filter_map(|t| t.identifier.as_ref()).collect();
    let mut structural: BTreeSet<&TestId> = BTreeSet::new();

    let mut plan = ReconciliationPlan {
        prune_empty_suites: options.no_empty,
        force_structure: options.structure && !options.no_empty,
        ..ReconciliationPlan::default()
    };

    for node in &tests {
        match &node.identifier {
            Some(id) => plan_claimed(&mut plan, node, id, snapshot),
            None => {
                let candidates = snapshot.find_structural(&node.name, &node.suite_path);
                for remote in candidates.iter().filter(|r| claimed.contains(&r.id)) {
                    plan.warnings.push(format!(
                        "'{}' matches {} by name and suite, but {} is claimed by another test's identifier",
                        node.node_ref(),
                        remote.id,
                        remote.id
                    ));
                }

                let free: Vec<&RemoteTest> = candidates
                    .into_iter()
                    .filter(|r| !claimed.contains(&r.id) && !structural.contains(&r.id))
                    .collect();

                match free[..] {
                    [remote] => {
                        structural.insert(&remote.id);
                        plan.ops.push(PlanOp::KeepId {
                            node: node.node_ref(),
                            id: remote.id.clone(),
                            rule: Rule::StructuralMatch,
                        });
                    }
                    [] => plan.ops.push(PlanOp::Assign {
                        node: node.node_ref(),
                    }),
                    _ => {
                        plan.warnings.push(format!(
                            "'{}' matches {} remote tests by name and suite; a new identifier will be assigned",
                            node.node_ref(),
                            free.len()
                        ));
                        plan.ops.push(PlanOp::Assign {
                            node: node.node_ref(),
                        });
                    }
                }
            }
        }
    }

    if !options.no_detach {
        for id in snapshot.ids() {
            if !claimed.contains(id) && !structural.contains(id) {
                plan.ops.push(PlanOp::Detach { id: id.clone() });
            }
        }
    }

    for warning in &plan.warnings {
        warn!("{}", warning);
    }
    debug!(summary = %plan.summary(), "Reconciliation plan built");
    Ok(plan)
}

fn plan_claimed(plan: &mut ReconciliationPlan, node: &TestNode, id: &TestId, snapshot: &ProjectSnapshot) {
    let Some(remote) = snapshot.get(id) else {
        plan.ops.push(PlanOp::CreateWithId {
            node: node.node_ref(),
            id: id.clone(),
        });
        return;
    };

    plan.ops.push(PlanOp::KeepId {
        node: node.node_ref(),
        id: id.clone(),
        rule: Rule::IdentifierMatch,
    });

    let changes = attribute_changes(node, remote);
    if !changes.is_empty() {
        plan.ops.push(PlanOp::Update {
            node: node.node_ref(),
            id: id.clone(),
            changes,
        });
    }

    // Remote placement wins unless the local structure is forced.
    if plan.force_structure && !node.suite_path.ends_with(&remote.suite_path) {
        plan.ops.push(PlanOp::Move {
            node: node.node_ref(),
            id: id.clone(),
            from: remote.suite_path.clone(),
            to: node.suite_path.clone(),
        });
    }
}

fn attribute_changes(node: &TestNode, remote: &RemoteTest) -> Vec<Change> {
    let mut changes = Vec::new();

    if node.name != remote.title {
        changes.push(Change::Name {
            from: remote.title.clone(),
            to: node.name.clone(),
        });
    }

    if let Some(remote_tags) = &remote.tags {
        let added: BTreeSet<String> = node.tags.difference(remote_tags).cloned().collect();
        let removed: BTreeSet<String> = remote_tags.difference(&node.tags).cloned().collect();
        if !added.is_empty() || !removed.is_empty() {
            changes.push(Change::Tags { added, removed });
        }
    }

    changes
}
