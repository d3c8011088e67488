use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::debug;
use walkdir::WalkDir;

use crate::{emitter::ARTIFACT_FILE_NAME, model::package::ScopePattern};

/// Directories that never receive instructions and are not walked.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "dist",
    "build",
    "target",
];

pub type NodeId = usize;

/// Shared walk filter: hidden entries and generated directories are off
/// limits to every traversal, artifact sweeps included.
pub(crate) fn walkable(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return false;
    }
    if entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()) {
        return false;
    }
    true
}

#[derive(Debug)]
struct DirectoryNode {
    /// Path relative to the tree root; empty for the root itself.
    path: PathBuf,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Files directly in this directory, as paths relative to the tree root.
    files: Vec<PathBuf>,
    depth: usize,
}

/// The target project's directory shape, held in an arena and read-only once
/// built. Node 0 is always the root; children keep the traversal order of
/// construction, which is sorted by name, so node ids are deterministic for a
/// given tree shape.
#[derive(Debug)]
pub struct DirectoryTree {
    nodes: Vec<DirectoryNode>,
}

impl DirectoryTree {
    fn empty() -> DirectoryTree {
        DirectoryTree {
            nodes: vec![DirectoryNode {
                path: PathBuf::new(),
                parent: None,
                children: Vec::new(),
                files: Vec::new(),
                depth: 0,
            }],
        }
    }

    /// Walks the project directory. Hidden entries, generated directories and
    /// previously emitted artifacts are excluded so that recompiling over an
    /// earlier run sees the same tree.
    pub fn from_filesystem(root: &Path) -> anyhow::Result<DirectoryTree> {
        let mut tree = DirectoryTree::empty();
        let mut ids: HashMap<PathBuf, NodeId> = HashMap::new();
        ids.insert(PathBuf::new(), 0);

        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(walkable);

        for entry in walker {
            let entry = entry.with_context(|| format!("walking {}", root.display()))?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .with_context(|| format!("walking {}", root.display()))?
                .to_path_buf();
            let parent_path = relative.parent().map(Path::to_path_buf).unwrap_or_default();
            let parent = ids[&parent_path];

            if entry.file_type().is_dir() {
                let id = tree.push_child(parent, relative.clone());
                ids.insert(relative, id);
            } else if entry.file_name().to_string_lossy() != ARTIFACT_FILE_NAME {
                tree.nodes[parent].files.push(relative);
            }
        }

        debug!(
            "Walked {}: {} directories",
            root.display(),
            tree.nodes.len()
        );
        Ok(tree)
    }

    /// Builds a tree from explicit relative file paths, creating every
    /// intermediate directory. Test and dry-run helper.
    pub fn from_files<I, P>(paths: I) -> DirectoryTree
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut tree = DirectoryTree::empty();
        let mut ids: HashMap<PathBuf, NodeId> = HashMap::new();
        ids.insert(PathBuf::new(), 0);

        let mut sorted: Vec<PathBuf> = paths
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        sorted.sort();

        for file in sorted {
            let mut dir = PathBuf::new();
            let mut parent = 0;
            if let Some(parent_path) = file.parent() {
                for component in parent_path.components() {
                    dir.push(component);
                    parent = match ids.get(&dir) {
                        Some(id) => *id,
                        None => {
                            let id = tree.push_child(parent, dir.clone());
                            ids.insert(dir.clone(), id);
                            id
                        }
                    };
                }
            }
            tree.nodes[parent].files.push(file);
        }
        tree
    }

    fn push_child(&mut self, parent: NodeId, path: PathBuf) -> NodeId {
        let id = self.nodes.len();
        let depth = self.nodes[parent].depth + 1;
        self.nodes.push(DirectoryNode {
            path,
            parent: Some(parent),
            children: Vec::new(),
            files: Vec::new(),
            depth,
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// Number of directories, the root included. Never zero.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn path(&self, node: NodeId) -> &Path {
        &self.nodes[node].path
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].children
    }

    pub fn files(&self, node: NodeId) -> &[PathBuf] {
        &self.nodes[node].files
    }

    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id].parent;
        }
        false
    }

    /// Lowest common ancestor of two nodes.
    pub fn lca(&self, a: NodeId, b: NodeId) -> NodeId {
        let (mut a, mut b) = (a, b);
        while self.nodes[a].depth > self.nodes[b].depth {
            a = self.nodes[a].parent.unwrap_or(0);
        }
        while self.nodes[b].depth > self.nodes[a].depth {
            b = self.nodes[b].parent.unwrap_or(0);
        }
        while a != b {
            a = self.nodes[a].parent.unwrap_or(0);
            b = self.nodes[b].parent.unwrap_or(0);
        }
        a
    }

    /// Lowest common ancestor of a node set; `None` for the empty set.
    pub fn lca_of_set<'a>(&self, nodes: impl IntoIterator<Item = &'a NodeId>) -> Option<NodeId> {
        nodes
            .into_iter()
            .copied()
            .reduce(|acc, node| self.lca(acc, node))
    }

    /// All nodes of the subtree rooted at `node`, preorder.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            result.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        result
    }

    /// Nodes directly containing at least one file the pattern matches. This
    /// is the applicability set: a directory applies because of its own
    /// files, not its descendants'.
    pub fn applicability(&self, scope: &ScopePattern) -> BTreeSet<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.files.iter().any(|file| scope.matches_file(file)))
            .map(|(id, _)| id)
            .collect()
    }
}
