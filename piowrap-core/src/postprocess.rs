//! Post-build artifact pipeline.
//!
//! After a successful `run` build, every discovered artifact is signed (if a
//! signing key was given) and then encrypted (if an encryption key was
//! given). Each step writes to a sibling `.tmp` file which is renamed over
//! the artifact only once the external tool succeeded, so a failure never
//! exposes a half-written artifact.
//!
//! All sign operations finish before any encrypt operation starts. The first
//! failure aborts the pipeline; artifacts already signed stay signed.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifacts::{discover_artifacts, ArtifactLayout, ArtifactLocation};
use crate::transform::{ArtifactTransformer, TransformError, TransformStep};

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("{step} key {path} is not readable: {source}")]
    KeyUnreadable {
        step: TransformStep,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("build output directory {path} is not readable: {source}")]
    MissingBuildOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read artifact {path}: {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} failed for board '{board}': {source}")]
    Transform {
        step: TransformStep,
        board: String,
        #[source]
        source: TransformError,
    },

    #[error("failed to replace {path} after {step}: {source}")]
    Replace {
        step: TransformStep,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Key files requested on the command line, already absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformKeys {
    pub sign: Option<PathBuf>,
    pub encrypt: Option<PathBuf>,
}

impl TransformKeys {
    pub fn for_step(&self, step: TransformStep) -> Option<&Path> {
        match step {
            TransformStep::Sign => self.sign.as_deref(),
            TransformStep::Encrypt => self.encrypt.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sign.is_none() && self.encrypt.is_none()
    }

    /// Steps that will run, in order.
    pub fn steps(&self) -> Vec<TransformStep> {
        TransformStep::ORDER
            .into_iter()
            .filter(|s| self.for_step(*s).is_some())
            .collect()
    }
}

/// What happened to one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub board: String,
    pub path: PathBuf,
    pub steps: Vec<TransformStep>,
    /// BLAKE3 of the artifact as the build tool left it.
    pub digest_before: String,
    /// BLAKE3 after all steps.
    pub digest_after: String,
}

/// Summary of one post-processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessReport {
    pub project_dir: PathBuf,
    pub artifacts: Vec<ArtifactReport>,
}

impl PostProcessReport {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Sibling temp path for a step's output: `firmware.bin` → `firmware.bin.sign.tmp`.
pub fn temp_path(artifact: &Path, step: TransformStep) -> PathBuf {
    let name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    artifact.with_file_name(format!("{name}.{step}.tmp"))
}

/// Run the pipeline over every artifact under `project_dir`.
///
/// With no keys this returns an empty report without touching the filesystem.
pub fn post_process(
    project_dir: &Path,
    layout: &ArtifactLayout,
    keys: &TransformKeys,
    transformer: &dyn ArtifactTransformer,
) -> Result<PostProcessReport, PostProcessError> {
    let mut report = PostProcessReport {
        project_dir: project_dir.to_path_buf(),
        artifacts: Vec::new(),
    };
    if keys.is_empty() {
        return Ok(report);
    }

    for step in keys.steps() {
        if let Some(key) = keys.for_step(step) {
            check_key(step, key)?;
        }
    }

    let output_root = layout.output_root(project_dir);
    let artifacts = discover_artifacts(&output_root, &layout.artifact_name).map_err(|source| {
        PostProcessError::MissingBuildOutput {
            path: output_root.clone(),
            source,
        }
    })?;
    if artifacts.is_empty() {
        log::warn!(
            "no {} found under {}, nothing to post-process",
            layout.artifact_name,
            output_root.display()
        );
        return Ok(report);
    }

    let mut before = Vec::with_capacity(artifacts.len());
    for artifact in &artifacts {
        before.push(digest(&artifact.path)?);
    }

    let steps = keys.steps();
    for &step in &steps {
        let Some(key) = keys.for_step(step) else {
            continue;
        };
        for artifact in &artifacts {
            apply_step(step, key, artifact, transformer)?;
        }
    }

    for (artifact, digest_before) in artifacts.into_iter().zip(before) {
        let digest_after = digest(&artifact.path)?;
        if digest_after == digest_before {
            log::warn!("{} is unchanged after post-processing", artifact.path.display());
        }
        report.artifacts.push(ArtifactReport {
            board: artifact.board,
            path: artifact.path,
            steps: steps.clone(),
            digest_before,
            digest_after,
        });
    }

    Ok(report)
}

fn check_key(step: TransformStep, key: &Path) -> Result<(), PostProcessError> {
    File::open(key)
        .and_then(|f| {
            if f.metadata()?.is_file() {
                Ok(())
            } else {
                Err(std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"))
            }
        })
        .map_err(|source| PostProcessError::KeyUnreadable {
            step,
            path: key.to_path_buf(),
            source,
        })
}

fn apply_step(
    step: TransformStep,
    key: &Path,
    artifact: &ArtifactLocation,
    transformer: &dyn ArtifactTransformer,
) -> Result<(), PostProcessError> {
    let tmp = temp_path(&artifact.path, step);
    remove_if_present(&tmp);

    if let Err(source) = transformer.apply(step, key, &artifact.path, &tmp) {
        remove_if_present(&tmp);
        return Err(PostProcessError::Transform {
            step,
            board: artifact.board.clone(),
            source,
        });
    }

    fs::rename(&tmp, &artifact.path).map_err(|source| {
        remove_if_present(&tmp);
        PostProcessError::Replace {
            step,
            path: artifact.path.clone(),
            source,
        }
    })?;

    log::info!("{step}: replaced {} ({})", artifact.path.display(), artifact.board);
    Ok(())
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("could not remove {}: {e}", path.display());
        }
    }
}

fn digest(path: &Path) -> Result<String, PostProcessError> {
    let bytes = fs::read(path).map_err(|source| PostProcessError::ReadArtifact {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
