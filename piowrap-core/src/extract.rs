//! Archive staging before the build tool starts.

use std::fs::{self, File};
use thiserror::Error;

use crate::host::HostEnv;
use crate::invocation::ExtractSpec;

/// Errors from archive extraction. Each carries the offending spec.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to extract {spec}: empty {side} path")]
    EmptyPath { spec: String, side: &'static str },

    #[error("failed to extract {spec}: {source}")]
    Io {
        spec: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract {spec}: {source}")]
    Archive {
        spec: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Extract one archive into its destination, creating the destination first.
///
/// Relative paths resolve against the host's working directory.
pub fn extract_archive(spec: &ExtractSpec, host: &HostEnv) -> Result<(), ExtractError> {
    for (side, path) in [("archive", &spec.archive), ("destination", &spec.dest)] {
        if path.as_os_str().is_empty() {
            return Err(ExtractError::EmptyPath {
                spec: spec.to_string(),
                side,
            });
        }
    }

    let archive = host.absolutize(&spec.archive);
    let dest = host.absolutize(&spec.dest);
    let io_err = |source| ExtractError::Io {
        spec: spec.to_string(),
        source,
    };

    if !dest.exists() {
        fs::create_dir_all(&dest).map_err(io_err)?;
    }

    let file = File::open(&archive).map_err(io_err)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|source| ExtractError::Archive {
        spec: spec.to_string(),
        source,
    })?;
    zip.extract(&dest).map_err(|source| ExtractError::Archive {
        spec: spec.to_string(),
        source,
    })?;

    log::info!(
        "extracted {} entries from {} into {}",
        zip.len(),
        archive.display(),
        dest.display()
    );
    Ok(())
}

/// Extract every spec in order, stopping at the first failure.
pub fn extract_all(specs: &[ExtractSpec], host: &HostEnv) -> Result<usize, ExtractError> {
    for spec in specs {
        extract_archive(spec, host)?;
    }
    Ok(specs.len())
}
