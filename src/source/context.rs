// ABOUTME: Finds the directory holding the Dockerfile and the port it exposes.
// ABOUTME: Looks at the tree root first, then exactly one level down in name order.

use super::error::NoBuildContextError;
use crate::types::Port;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Build description file name, matched case-insensitively.
pub const BUILD_FILE: &str = "Dockerfile";

static EXPOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*EXPOSE\s+(.+)$").unwrap_or_else(|e| panic!("invalid EXPOSE pattern: {e}"))
});

/// Directory a container image is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub root: PathBuf,
    pub dockerfile: PathBuf,
    /// First port the Dockerfile exposes, or 80.
    pub exposed_port: Port,
}

impl BuildContext {
    /// Build file name relative to `root`, spelled as found on disk.
    pub fn dockerfile_name(&self) -> String {
        self.dockerfile
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| BUILD_FILE.to_string())
    }
}

/// Locate the build context inside a working tree.
pub fn locate(tree_root: &Path) -> Result<BuildContext, NoBuildContextError> {
    if let Some(dockerfile) = find_build_file(tree_root) {
        return Ok(context_for(tree_root, dockerfile));
    }

    for dir in sorted_entries(tree_root)
        .into_iter()
        .filter(|p| p.is_dir() && !is_hidden(p))
    {
        if let Some(dockerfile) = find_build_file(&dir) {
            tracing::info!("Using build context {}", dir.display());
            return Ok(context_for(&dir, dockerfile));
        }
    }

    Err(NoBuildContextError {
        root: tree_root.to_path_buf(),
        entries: sorted_entries(tree_root)
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect(),
    })
}

fn context_for(dir: &Path, dockerfile: PathBuf) -> BuildContext {
    let exposed_port = fs::read_to_string(&dockerfile)
        .ok()
        .and_then(|content| parse_exposed_port(&content))
        .unwrap_or(Port::HTTP);

    BuildContext {
        root: dir.to_path_buf(),
        dockerfile,
        exposed_port,
    }
}

/// First numeric port declared by an `EXPOSE` instruction.
///
/// `8080/tcp` counts as 8080; variable references are skipped.
pub fn parse_exposed_port(dockerfile: &str) -> Option<Port> {
    dockerfile
        .lines()
        .filter_map(|line| EXPOSE.captures(line))
        .flat_map(|caps| {
            caps.get(1)
                .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(Vec::new)
        })
        .find_map(|token| {
            let number = token.split('/').next().unwrap_or_default();
            number.parse::<u16>().ok().and_then(|n| Port::new(n).ok())
        })
}

fn find_build_file(dir: &Path) -> Option<PathBuf> {
    sorted_entries(dir).into_iter().find(|p| {
        p.is_file()
            && p.file_name()
                .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(BUILD_FILE))
    })
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn prefers_root_dockerfile() {
        let tree = tempfile::tempdir().unwrap();
        write(&tree.path().join("Dockerfile"), "FROM nginx\nEXPOSE 8080\n");
        write(&tree.path().join("api/Dockerfile"), "FROM node\nEXPOSE 3000\n");

        let ctx = locate(tree.path()).unwrap();
        assert_eq!(ctx.root, tree.path());
        assert_eq!(ctx.exposed_port.get(), 8080);
    }

    #[test]
    fn falls_back_to_first_subdirectory_in_name_order() {
        let tree = tempfile::tempdir().unwrap();
        write(&tree.path().join("web/Dockerfile"), "FROM nginx\n");
        write(&tree.path().join("api/dockerfile"), "FROM node\nEXPOSE 3000\n");

        let ctx = locate(tree.path()).unwrap();
        assert_eq!(ctx.root, tree.path().join("api"));
        assert_eq!(ctx.exposed_port.get(), 3000);
    }

    #[test]
    fn keeps_build_file_spelling() {
        let tree = tempfile::tempdir().unwrap();
        write(&tree.path().join("DockerFile"), "FROM nginx\n");

        let ctx = locate(tree.path()).unwrap();
        assert_eq!(ctx.dockerfile_name(), "DockerFile");
    }

    #[test]
    fn does_not_search_two_levels_down() {
        let tree = tempfile::tempdir().unwrap();
        write(&tree.path().join("services/api/Dockerfile"), "FROM node\n");
        write(&tree.path().join("README.md"), "hello");

        let err = locate(tree.path()).unwrap_err();
        assert_eq!(err.entries, vec!["README.md", "services"]);
    }

    #[test]
    fn skips_hidden_directories() {
        let tree = tempfile::tempdir().unwrap();
        write(&tree.path().join(".git/Dockerfile"), "FROM scratch\n");

        assert!(locate(tree.path()).is_err());
    }

    #[test]
    fn defaults_port_to_80() {
        let tree = tempfile::tempdir().unwrap();
        write(&tree.path().join("Dockerfile"), "FROM nginx\n");

        assert_eq!(locate(tree.path()).unwrap().exposed_port, Port::HTTP);
    }

    #[test]
    fn parses_first_numeric_expose() {
        let content = "FROM x\nexpose $PORT\nEXPOSE 8080/tcp 9090\nEXPOSE 7000\n";
        assert_eq!(parse_exposed_port(content).map(Port::get), Some(8080));
    }

    #[test]
    fn ignores_expose_in_comments_and_other_words() {
        let content = "# EXPOSE 1234\nRUN echo EXPOSE 99\n";
        assert_eq!(parse_exposed_port(content), None);
    }
}
