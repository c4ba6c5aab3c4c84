//! Sends the reconciliation result to the service and writes the assigned
//! identifiers back into source.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::error::SyncError;
use super::plan::{PlanOp, ReconciliationPlan, SyncSummary};
use super::reconciler::{check_claims, reconcile};
use crate::api::{LoadRequest, LoadResponse, LoadTest, SharedApi};
use crate::codec::{self, TestId};
use crate::config::{ImportConfig, ImportOptions, DEFAULT_FRAMEWORK, DEFAULT_LANGUAGE};
use crate::inventory::{Inventory, NodeRef, TestNode};
use crate::snapshot::ProjectSnapshot;
use crate::source::{Rename, SourceRewriter};

/// A test name change to apply in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub file: PathBuf,
    pub old_name: String,
    pub new_name: String,
}

/// Result of a successful sync.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub plan: ReconciliationPlan,
    pub summary: SyncSummary,
    /// Identifier of every local test after the sync.
    pub identifiers: BTreeMap<NodeRef, TestId>,
    /// Renames applied to source files.
    pub rewrites: Vec<Rewrite>,
}

/// Runs one import/sync: reconcile, one load request, then rewrite source.
pub struct SyncTransport {
    api: SharedApi,
    rewriter: Arc<dyn SourceRewriter>,
    options: ImportOptions,
    import: ImportConfig,
}

impl SyncTransport {
    pub fn new(
        api: SharedApi,
        rewriter: Arc<dyn SourceRewriter>,
        options: ImportOptions,
        import: ImportConfig,
    ) -> Self {
        Self {
            api,
            rewriter,
            options,
            import,
        }
    }

    /// Syncs the inventory. Source files are only touched after the service
    /// accepted the request.
    pub async fn sync(&self, inventory: &Inventory) -> Result<SyncOutcome, SyncError> {
        self.options.validate()?;
        check_claims(inventory)?;

        if inventory.is_empty() {
            info!("No tests collected, nothing to import");
            return Ok(SyncOutcome::default());
        }

        let data = self.api.fetch_test_data().await.map_err(|e| {
            error!(error = %e, "Failed to fetch project tests");
            e
        })?;
        let snapshot = ProjectSnapshot::from_test_data(&data);
        let plan = reconcile(inventory, &snapshot, &self.options)?;

        let request = self.build_request(inventory, &plan);
        debug!(tests = request.tests.len(), detach = request.detach.len(), "Importing tests");
        let response = self.api.load_tests(&request).await.map_err(|e| {
            error!(error = %e, "Import request failed, source left untouched");
            e
        })?;

        let resolved = self.resolve_ids(inventory, &request, response).await?;
        let rewrites = plan_rewrites(inventory, &resolved);
        self.apply(&rewrites)?;

        let summary = plan.summary();
        info!(%summary, rewritten = rewrites.len(), "Import finished");

        let identifiers = inventory
            .tests()
            .into_iter()
            .filter_map(|node| resolved.get(&node.index).map(|id| (node.node_ref(), id.clone())))
            .collect();

        Ok(SyncOutcome {
            plan,
            summary,
            identifiers,
            rewrites,
        })
    }

    /// The single import request for a plan.
    pub fn build_request(&self, inventory: &Inventory, plan: &ReconciliationPlan) -> LoadRequest {
        let tests = inventory
            .tests()
            .into_iter()
            .map(|node| LoadTest {
                reference: reference(node.index),
                id: plan.primary_for(node.index).and_then(PlanOp::id).cloned(),
                name: node.name.clone(),
                suites: if plan.force_structure {
                    node.suite_path.clone()
                } else {
                    node.parent_suite().map(|s| vec![s.to_string()]).unwrap_or_default()
                },
                code: node.code.clone(),
                file: self.file_field(node, plan.force_structure),
                labels: self.import.sync_labels.clone(),
                tags: node.tags.iter().cloned().collect(),
            })
            .collect();

        LoadRequest {
            framework: DEFAULT_FRAMEWORK.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            noempty: plan.prune_empty_suites,
            no_detach: self.options.no_detach,
            structure: plan.force_structure,
            create: self.options.create,
            sync: true,
            tests,
            detach: plan.detaches().cloned().collect(),
        }
    }

    fn file_field(&self, node: &TestNode, full_path: bool) -> String {
        let file = if full_path {
            node.file.to_string_lossy().into_owned()
        } else {
            node.file_name()
        };
        match &self.import.directory {
            Some(dir) if !dir.is_empty() => Path::new(dir)
                .join(file)
                .to_string_lossy()
                .replace('\\', "/"),
            _ => file,
        }
    }

    /// Maps each local test index to its identifier after the import.
    ///
    /// Prefers the identifiers in the response. Tests the response gives no
    /// usable identifier for are looked up by name and suite in a fresh copy
    /// of the project.
    async fn resolve_ids(
        &self,
        inventory: &Inventory,
        request: &LoadRequest,
        response: LoadResponse,
    ) -> Result<BTreeMap<usize, TestId>, SyncError> {
        let tests = inventory.tests();
        let issued = response.identifiers();
        let mut resolved = BTreeMap::new();

        for (node, sent) in tests.iter().zip(&request.tests) {
            if let Some(id) = issued.get(sent.reference.as_str()).or(sent.id.as_ref()) {
                resolved.insert(node.index, id.clone());
            }
        }

        let missing: Vec<&TestNode> = tests
            .iter()
            .copied()
            .filter(|node| !resolved.contains_key(&node.index))
            .collect();
        if missing.is_empty() {
            return Ok(resolved);
        }

        debug!(missing = missing.len(), "Import response lacks identifiers, refetching");
        let snapshot = ProjectSnapshot::from_test_data(&self.api.fetch_test_data().await?);
        let mut taken: BTreeSet<TestId> = resolved.values().cloned().collect();

        for node in missing {
            let found = snapshot
                .find_structural(&node.name, &node.suite_path)
                .into_iter()
                .find(|remote| !taken.contains(&remote.id));
            match found {
                Some(remote) => {
                    taken.insert(remote.id.clone());
                    resolved.insert(node.index, remote.id.clone());
                }
                None => warn!(test = %node.node_ref(), "No identifier found for imported test"),
            }
        }
        Ok(resolved)
    }

    /// Writes renames into source. Every file is resolved before the first
    /// write, so a test missing from any file leaves all files untouched.
    fn apply(&self, rewrites: &[Rewrite]) -> Result<(), SyncError> {
        let mut by_file: BTreeMap<&Path, Vec<Rename>> = BTreeMap::new();
        for rewrite in rewrites {
            by_file.entry(rewrite.file.as_path()).or_default().push(Rename {
                old_name: rewrite.old_name.clone(),
                new_name: rewrite.new_name.clone(),
            });
        }

        let mut prepared = Vec::with_capacity(by_file.len());
        for (file, renames) in &by_file {
            if let Some(content) = self.rewriter.prepare_renames(file, renames).map_err(|e| {
                error!(error = %e, "Source rewrite aborted, no file was changed");
                e
            })? {
                prepared.push((*file, content));
            }
        }

        for (file, content) in prepared {
            self.rewriter.write_source(file, &content)?;
        }
        Ok(())
    }
}

/// Temporary reference for a local test inside one load request.
fn reference(index: usize) -> String {
    format!("t{}", index + 1)
}

/// Renames for tests whose identifier in source differs from the resolved one.
fn plan_rewrites(inventory: &Inventory, resolved: &BTreeMap<usize, TestId>) -> Vec<Rewrite> {
    inventory
        .tests()
        .into_iter()
        .filter_map(|node| {
            let id = resolved.get(&node.index)?;
            if node.identifier.as_ref() == Some(id) {
                return None;
            }
            Some(Rewrite {
                file: node.file.clone(),
                old_name: node.declared_name.clone(),
                new_name: codec::replace(&node.declared_name, id),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryBuilder, TestMeta};
    use crate::source::DryRunRewriter;
    use crate::api::MockApi;

    fn transport(api: &Arc<MockApi>, options: ImportOptions, import: ImportConfig) -> SyncTransport {
        SyncTransport::new(api.clone(), Arc::new(DryRunRewriter), options, import)
    }

    fn inventory() -> Inventory {
        let mut builder = InventoryBuilder::new();
        builder.start_suite("Tests", None);
        builder.start_suite("Math", Some("tests/math.robot".into()));
        builder.add_test(TestMeta::new("Test Addition", "tests/math.robot").with_tags(["smoke"]));
        builder.end_suite("Math");
        builder.end_suite("Tests");
        builder.finish()
    }

    #[test]
    fn test_request_default_mode() {
        let api = Arc::new(MockApi::new());
        let import = ImportConfig {
            directory: Some("robot".into()),
            sync_labels: vec!["imported".into()],
        };
        let transport = transport(&api, ImportOptions::default(), import);
        let inv = inventory();
        let plan = reconcile(&inv, &ProjectSnapshot::empty(), &ImportOptions::default()).unwrap();

        let request = transport.build_request(&inv, &plan);
        let test = &request.tests[0];
        assert_eq!(test.reference, "t1");
        assert_eq!(test.suites, vec!["Math"]);
        assert_eq!(test.file, "robot/math.robot");
        assert_eq!(test.labels, vec!["imported"]);
        assert_eq!(test.tags, vec!["smoke"]);
        assert!(test.id.is_none());
        assert!(request.sync);
    }

    #[test]
    fn test_request_structure_mode() {
        let api = Arc::new(MockApi::new());
        let options = ImportOptions {
            structure: true,
            ..ImportOptions::default()
        };
        let transport = transport(&api, options, ImportConfig::default());
        let inv = inventory();
        let plan = reconcile(&inv, &ProjectSnapshot::empty(), &options).unwrap();

        let request = transport.build_request(&inv, &plan);
        assert!(request.structure);
        assert_eq!(request.tests[0].suites, vec!["Tests", "Math"]);
        assert_eq!(request.tests[0].file, "tests/math.robot");
    }

    #[tokio::test]
    async fn test_conflicting_options_rejected_before_network() {
        let api = Arc::new(MockApi::new());
        let options = ImportOptions {
            structure: true,
            no_empty: true,
            ..ImportOptions::default()
        };
        let result = transport(&api, options, ImportConfig::default()).sync(&inventory()).await;
        assert!(matches!(result, Err(SyncError::Config(_))));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_resolution_without_ids_in_response() {
        let api = Arc::new(MockApi::new().with_issued_ids(["96c700e6"]).without_load_ids());
        let outcome = transport(&api, ImportOptions::default(), ImportConfig::default())
            .sync(&inventory())
            .await
            .unwrap();

        assert_eq!(outcome.rewrites.len(), 1);
        assert_eq!(outcome.rewrites[0].new_name, "Test Addition @T96c700e6");
    }
}
