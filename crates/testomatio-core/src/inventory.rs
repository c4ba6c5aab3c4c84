//! In-memory tree of the tests discovered in the local source tree.
//!
//! The host runner drives the [`InventoryBuilder`] with suite and test
//! boundaries in whatever order it delivers them. Suite ends without tests
//! and suite ends that match no open suite are tolerated.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{self, TestId};

/// Metadata the host supplies for a discovered test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMeta {
    /// Declared name, possibly carrying an identifier token.
    pub name: String,
    pub file: PathBuf,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Source block of the test, sent along with the import.
    #[serde(default)]
    pub code: Option<String>,
}

impl TestMeta {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Identity of a local test: its position in the inventory plus the
/// `(file, declared name)` pair used for error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeRef {
    pub index: usize,
    pub file: PathBuf,
    pub name: String,
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.name)
    }
}

/// A local test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestNode {
    /// Position among all tests, in discovery order.
    pub index: usize,
    pub file: PathBuf,
    /// Name without the identifier token.
    pub name: String,
    /// The name exactly as declared in source.
    pub declared_name: String,
    pub identifier: Option<TestId>,
    pub tags: BTreeSet<String>,
    /// Enclosing suites, outermost first.
    pub suite_path: Vec<String>,
    pub code: Option<String>,
}

impl TestNode {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            index: self.index,
            file: self.file.clone(),
            name: self.declared_name.clone(),
        }
    }

    pub fn parent_suite(&self) -> Option<&str> {
        self.suite_path.last().map(String::as_str)
    }

    /// File name without directories.
    pub fn file_name(&self) -> String {
        self.file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.to_string_lossy().into_owned())
    }
}

/// A suite (folder, file or test group).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteNode {
    pub name: String,
    pub source: Option<PathBuf>,
    pub children: Vec<Node>,
}

impl SuiteNode {
    pub fn is_empty(&self) -> bool {
        self.children.iter().all(|child| match child {
            Node::Suite(suite) => suite.is_empty(),
            Node::Test(_) => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Suite(SuiteNode),
    Test(TestNode),
}

/// The complete local tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    roots: Vec<Node>,
    len: usize,
}

impl Inventory {
    pub fn roots(&self) -> &[Node] {
        &self.roots
    }

    /// Every test in discovery order.
    pub fn tests(&self) -> Vec<&TestNode> {
        fn walk<'a>(nodes: &'a [Node], out: &mut Vec<&'a TestNode>) {
            for node in nodes {
                match node {
                    Node::Test(test) => out.push(test),
                    Node::Suite(suite) => walk(&suite.children, out),
                }
            }
        }

        let mut out = Vec::with_capacity(self.len);
        walk(&self.roots, &mut out);
        out.sort_by_key(|test| test.index);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Builds an [`Inventory`] from host lifecycle callbacks.
#[derive(Debug, Default)]
pub struct InventoryBuilder {
    open: Vec<SuiteNode>,
    roots: Vec<Node>,
    len: usize,
}

impl InventoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_suite(&mut self, name: impl Into<String>, source: Option<PathBuf>) {
        self.open.push(SuiteNode {
            name: name.into(),
            source,
            children: Vec::new(),
        });
    }

    /// Adds a test under the innermost open suite.
    pub fn add_test(&mut self, meta: TestMeta) {
        let (name, identifier) = codec::extract(&meta.name);
        let node = TestNode {
            index: self.len,
            file: meta.file,
            name,
            declared_name: meta.name,
            identifier,
            tags: meta.tags.into_iter().collect(),
            suite_path: self.open.iter().map(|s| s.name.clone()).collect(),
            code: meta.code,
        };
        self.len += 1;

        match self.open.last_mut() {
            Some(suite) => suite.children.push(Node::Test(node)),
            None => self.roots.push(Node::Test(node)),
        }
    }

    /// Closes the innermost open suite named `name`, along with any suites
    /// opened inside it. Unknown names are ignored.
    pub fn end_suite(&mut self, name: &str) {
        let Some(position) = self.open.iter().rposition(|s| s.name == name) else {
            debug!(suite = name, "Ignoring end of a suite that was never started");
            return;
        };

        while self.open.len() > position {
            self.close_innermost();
        }
    }

    /// Closes every open suite and returns the tree.
    pub fn finish(mut self) -> Inventory {
        while !self.open.is_empty() {
            self.close_innermost();
        }
        Inventory {
            roots: self.roots,
            len: self.len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn close_innermost(&mut self) {
        if let Some(suite) = self.open.pop() {
            match self.open.last_mut() {
                Some(parent) => parent.children.push(Node::Suite(suite)),
                None => self.roots.push(Node::Suite(suite)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_nested_tree() {
        let mut builder = InventoryBuilder::new();
        builder.start_suite("Tests", None);
        builder.start_suite("Math", Some("tests/math.robot".into()));
        builder.add_test(TestMeta::new("Test Addition @T96c700e6", "tests/math.robot"));
        builder.add_test(TestMeta::new("Test Subtraction", "tests/math.robot"));
        builder.end_suite("Math");
        builder.end_suite("Tests");

        let inventory = builder.finish();
        assert_eq!(inventory.len(), 2);

        let tests = inventory.tests();
        assert_eq!(tests[0].name, "Test Addition");
        assert_eq!(tests[0].identifier.as_ref().unwrap().body(), "96c700e6");
        assert_eq!(tests[0].suite_path, vec!["Tests", "Math"]);
        assert_eq!(tests[0].parent_suite(), Some("Math"));
        assert_eq!(tests[0].file_name(), "math.robot");
        assert!(tests[1].identifier.is_none());
    }

    #[test]
    fn test_tolerates_unbalanced_events() {
        let mut builder = InventoryBuilder::new();
        builder.end_suite("Never Started");
        builder.start_suite("Empty", None);
        builder.end_suite("Empty");
        builder.add_test(TestMeta::new("Orphan", "orphan.robot"));
        builder.start_suite("Outer", None);
        builder.start_suite("Inner", None);
        builder.add_test(TestMeta::new("Deep", "deep.robot"));
        builder.end_suite("Outer");

        let inventory = builder.finish();
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.roots().len(), 3);
        match &inventory.roots()[0] {
            Node::Suite(suite) => assert!(suite.is_empty()),
            other => panic!("unexpected node: {:?}", other),
        }
        let tests = inventory.tests();
        assert!(tests[0].suite_path.is_empty());
        assert_eq!(tests[1].suite_path, vec!["Outer", "Inner"]);
    }

    #[test]
    fn test_finish_closes_open_suites() {
        let mut builder = InventoryBuilder::new();
        builder.start_suite("Open", None);
        builder.add_test(TestMeta::new("Test", "t.robot"));
        let inventory = builder.finish();
        assert_eq!(inventory.roots().len(), 1);
        assert_eq!(inventory.tests()[0].suite_path, vec!["Open"]);
    }

    #[test]
    fn test_node_ref_keeps_declared_name() {
        let mut builder = InventoryBuilder::new();
        builder.add_test(TestMeta::new("Login @Taaaa1111", "auth.robot").with_tags(["smoke"]));
        let inventory = builder.finish();
        let node = inventory.tests()[0];
        assert_eq!(node.name, "Login");
        assert!(node.tags.contains("smoke"));
        assert_eq!(node.node_ref().to_string(), "auth.robot: Login @Taaaa1111");
    }
}
