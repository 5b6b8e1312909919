//! Firmware artifact discovery.
//!
//! Layout: `{project_dir}/{output_dir}/{board}/{artifact_name}`

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BuildSection;

/// Where the build tool leaves its per-board outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub output_dir: PathBuf,
    pub artifact_name: String,
}

impl ArtifactLayout {
    pub fn output_root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.output_dir)
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::from(&BuildSection::default())
    }
}

impl From<&BuildSection> for ArtifactLayout {
    fn from(build: &BuildSection) -> Self {
        Self {
            output_dir: build.output_dir.clone(),
            artifact_name: build.artifact_name.clone(),
        }
    }
}

/// A produced artifact for one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub board: String,
    pub path: PathBuf,
}

/// List artifacts under the output root, sorted by board name.
///
/// Non-directory entries and boards without the artifact are skipped.
pub fn discover_artifacts(
    output_root: &Path,
    artifact_name: &str,
) -> std::io::Result<Vec<ArtifactLocation>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(output_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let path = entry.path().join(artifact_name);
        if !path.is_file() {
            log::debug!("no {artifact_name} in {}", entry.path().display());
            continue;
        }

        found.push(ArtifactLocation {
            board: entry.file_name().to_string_lossy().into_owned(),
            path,
        });
    }

    found.sort_by(|a, b| a.board.cmp(&b.board));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_from_build_section() {
        let layout = ArtifactLayout::default();
        assert_eq!(
            layout.output_root(Path::new("/proj")),
            PathBuf::from("/proj/.build-output")
        );
        assert_eq!(layout.artifact_name, "firmware.bin");
    }

    #[test]
    fn skips_files_and_empty_boards() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("zeta")).unwrap();
        fs::write(root.join("zeta/firmware.bin"), b"z").unwrap();
        fs::create_dir_all(root.join("alpha")).unwrap();
        fs::write(root.join("alpha/firmware.bin"), b"a").unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("project.checksum"), b"x").unwrap();
        // A directory named like the artifact is not an artifact.
        fs::create_dir_all(root.join("odd/firmware.bin")).unwrap();

        let found = discover_artifacts(root, "firmware.bin").unwrap();
        let boards: Vec<&str> = found.iter().map(|a| a.board.as_str()).collect();
        assert_eq!(boards, vec!["alpha", "zeta"]);
        assert_eq!(found[0].path, root.join("alpha/firmware.bin"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_artifacts(&dir.path().join("nope"), "firmware.bin").is_err());
    }
}
