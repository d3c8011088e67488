use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use log::{debug, info};
use thiserror::Error;
use walkdir::WalkDir;

use crate::{
    conflict::EffectiveInstruction,
    placement::Placement,
    tree::{self, DirectoryTree},
};

pub const ARTIFACT_FILE_NAME: &str = "AGENTS.md";

const ARTIFACT_HEADER: &str =
    "<!-- Generated by agentpack. Do not edit; recompile instead. -->";

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("failed to write artifact {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to remove stale artifact {path}")]
    Remove {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to scan for stale artifacts")]
    Scan(#[from] walkdir::Error),
}

/// The filesystem-writer collaborator. Paths are relative to the project
/// root; implementations decide where that root lives.
pub trait ArtifactWriter {
    fn write(&self, path: &Path, content: &str) -> anyhow::Result<()>;
    fn remove(&self, path: &Path) -> anyhow::Result<()>;
}

/// Writes artifacts under a concrete project root.
pub struct FsWriter {
    root: PathBuf,
}

impl FsWriter {
    pub fn new(root: impl Into<PathBuf>) -> FsWriter {
        FsWriter { root: root.into() }
    }
}

impl ArtifactWriter for FsWriter {
    fn write(&self, path: &Path, content: &str) -> anyhow::Result<()> {
        Ok(std::fs::write(self.root.join(path), content)?)
    }

    fn remove(&self, path: &Path) -> anyhow::Result<()> {
        Ok(std::fs::remove_file(self.root.join(path))?)
    }
}

/// One output file, fully rendered in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    /// Relative path of the artifact file, directory included.
    pub path: PathBuf,
    pub content: String,
}

/// Renders every artifact in memory. Content is a pure function of the
/// placement and the instruction texts: instructions appear in collection
/// order under their qualified id, with no timestamps or other run-varying
/// data, so identical inputs render byte-identical artifacts.
pub fn render(
    placement: &Placement,
    effective: &[EffectiveInstruction],
    tree: &DirectoryTree,
) -> Vec<CompiledArtifact> {
    let mut by_order: Vec<&EffectiveInstruction> = effective.iter().collect();
    by_order.sort_by_key(|instruction| instruction.order);

    let mut artifacts = Vec::new();
    for node in placement.artifact_nodes() {
        let assigned: Vec<&EffectiveInstruction> = by_order
            .iter()
            .copied()
            .filter(|instruction| {
                placement
                    .sites(&instruction.qualified)
                    .is_some_and(|sites| sites.contains(&node))
            })
            .collect();
        if assigned.is_empty() {
            continue;
        }

        let mut content = String::new();
        content.push_str(ARTIFACT_HEADER);
        content.push('\n');
        for instruction in assigned {
            content.push('\n');
            content.push_str(&format!("## {}\n\n", instruction.qualified));
            content.push_str(instruction.text.trim_end());
            content.push('\n');
        }
        artifacts.push(CompiledArtifact {
            path: tree.path(node).join(ARTIFACT_FILE_NAME),
            content,
        });
    }
    debug!("Rendered {} artifacts", artifacts.len());
    artifacts
}

/// Persists rendered artifacts. Nothing is rendered here, so a failing
/// writer aborts the run without any further writes.
pub fn emit<W: ArtifactWriter>(artifacts: &[CompiledArtifact], writer: &W) -> Result<(), EmitError> {
    for artifact in artifacts {
        writer
            .write(&artifact.path, &artifact.content)
            .map_err(|source| EmitError::Write {
                path: artifact.path.clone(),
                source,
            })?;
    }
    info!("Wrote {} artifacts", artifacts.len());
    Ok(())
}

/// Removes artifacts left over from an earlier run at directories the
/// current placement no longer targets.
pub fn sweep_orphans<W: ArtifactWriter>(
    project_root: &Path,
    current: &[CompiledArtifact],
    writer: &W,
) -> Result<usize, EmitError> {
    let keep: BTreeSet<&Path> = current.iter().map(|a| a.path.as_path()).collect();
    let mut removed = 0;

    let walker = WalkDir::new(project_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(tree::walkable);
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() || entry.file_name().to_string_lossy() != ARTIFACT_FILE_NAME
        {
            continue;
        }
        let relative = match entry.path().strip_prefix(project_root) {
            Ok(path) => path,
            Err(_) => continue,
        };
        if !keep.contains(relative) {
            debug!("Removing stale artifact {}", relative.display());
            writer
                .remove(relative)
                .map_err(|source| EmitError::Remove {
                    path: relative.to_path_buf(),
                    source,
                })?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!("Removed {removed} stale artifacts");
    }
    Ok(removed)
}

/// Every artifact node with its assigned instruction count, for dry-run
/// summaries.
pub fn placement_summary(placement: &Placement, tree: &DirectoryTree) -> Vec<(PathBuf, usize)> {
    placement
        .artifact_nodes()
        .into_iter()
        .map(|node| {
            (
                tree.path(node).join(ARTIFACT_FILE_NAME),
                placement.assigned_count(node),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        placement::{place, PlacementSettings},
        tree::NodeId,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct MemoryWriter {
        files: Mutex<BTreeMap<PathBuf, String>>,
        fail: bool,
    }

    impl MemoryWriter {
        fn new() -> Self {
            MemoryWriter {
                files: Mutex::new(BTreeMap::new()),
                fail: false,
            }
        }
    }

    impl ArtifactWriter for MemoryWriter {
        fn write(&self, path: &Path, content: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), content.to_string());
            Ok(())
        }

        fn remove(&self, path: &Path) -> anyhow::Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }
    }

    fn effective(items: &[(&str, &str, usize, &[usize])]) -> Vec<EffectiveInstruction> {
        items
            .iter()
            .map(|(qualified, text, order, nodes)| EffectiveInstruction {
                qualified: qualified.parse().unwrap(),
                text: text.to_string(),
                tier: 0,
                distance: 1,
                order: *order,
                applicability: nodes.iter().copied().collect(),
            })
            .collect()
    }

    fn tree() -> DirectoryTree {
        DirectoryTree::from_files(["src/a.rs", "src/core/b.rs", "docs/guide.md"])
    }

    fn node_at(tree: &DirectoryTree, path: &str) -> NodeId {
        (0..tree.len())
            .find(|&id| tree.path(id) == Path::new(path))
            .unwrap()
    }

    #[test]
    fn renders_instructions_in_collection_order() {
        let tree = tree();
        let src = node_at(&tree, "src");
        let core = node_at(&tree, "src/core");
        let effective = effective(&[
            ("b:later", "Later rule.", 1, &[src, core]),
            ("a:earlier", "Earlier rule.", 0, &[src, core]),
        ]);
        let placement = place(&effective, &tree, &PlacementSettings::default()).unwrap();
        let artifacts = render(&placement, &effective, &tree);

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].path, PathBuf::from("src/AGENTS.md"));
        let earlier = artifacts[0].content.find("a:earlier").unwrap();
        let later = artifacts[0].content.find("b:later").unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn rendering_is_deterministic() {
        let tree = tree();
        let docs = node_at(&tree, "docs");
        let effective = effective(&[("p:docs", "Write plainly.", 0, &[docs])]);
        let placement = place(&effective, &tree, &PlacementSettings::default()).unwrap();

        let first = render(&placement, &effective, &tree);
        let second = render(&placement, &effective, &tree);
        assert_eq!(first, second);
        assert_eq!(
            first[0].content,
            "<!-- Generated by agentpack. Do not edit; recompile instead. -->\n\n\
             ## p:docs\n\nWrite plainly.\n"
        );
    }

    #[test]
    fn emit_writes_every_artifact() {
        let tree = tree();
        let src = node_at(&tree, "src");
        let docs = node_at(&tree, "docs");
        let effective = effective(&[
            ("p:rust", "Rust rule.", 0, &[src]),
            ("p:docs", "Docs rule.", 1, &[docs]),
        ]);
        let placement = place(&effective, &tree, &PlacementSettings::default()).unwrap();
        let artifacts = render(&placement, &effective, &tree);

        let writer = MemoryWriter::new();
        emit(&artifacts, &writer).unwrap();
        let files = writer.files.lock().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains_key(Path::new("src/AGENTS.md")));
        assert!(files.contains_key(Path::new("docs/AGENTS.md")));
    }

    #[test]
    fn emit_propagates_writer_failures() {
        let tree = tree();
        let src = node_at(&tree, "src");
        let effective = effective(&[("p:rust", "Rust rule.", 0, &[src])]);
        let placement = place(&effective, &tree, &PlacementSettings::default()).unwrap();
        let artifacts = render(&placement, &effective, &tree);

        let writer = MemoryWriter {
            files: Mutex::new(BTreeMap::new()),
            fail: true,
        };
        assert!(matches!(
            emit(&artifacts, &writer),
            Err(EmitError::Write { .. })
        ));
    }

    #[test]
    fn sweeps_stale_artifacts_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("old")).unwrap();
        std::fs::write(root.join("src/AGENTS.md"), "current").unwrap();
        std::fs::write(root.join("old/AGENTS.md"), "stale").unwrap();

        let current = vec![CompiledArtifact {
            path: PathBuf::from("src/AGENTS.md"),
            content: "current".to_string(),
        }];
        let writer = FsWriter::new(root);
        let removed = sweep_orphans(root, &current, &writer).unwrap();

        assert_eq!(removed, 1);
        assert!(root.join("src/AGENTS.md").exists());
        assert!(!root.join("old/AGENTS.md").exists());
    }

    #[test]
    fn sweep_ignores_generated_directories() {
        // Vendored and build-output trees are outside the compiler's reach;
        // an AGENTS.md shipped inside them must survive the sweep.
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join("target")).unwrap();
        std::fs::create_dir_all(root.join("old")).unwrap();
        std::fs::write(root.join("node_modules/pkg/AGENTS.md"), "vendored").unwrap();
        std::fs::write(root.join("target/AGENTS.md"), "built").unwrap();
        std::fs::write(root.join("old/AGENTS.md"), "stale").unwrap();

        let writer = FsWriter::new(root);
        let removed = sweep_orphans(root, &[], &writer).unwrap();

        assert_eq!(removed, 1);
        assert!(root.join("node_modules/pkg/AGENTS.md").exists());
        assert!(root.join("target/AGENTS.md").exists());
        assert!(!root.join("old/AGENTS.md").exists());
    }
}
