//! Snapshot of the host process: environment variables, executable path,
//! working directory, and platform flavor.
//!
//! Captured once at startup. Everything downstream reads from the snapshot
//! instead of `std::env`, so tests can build one from literal pairs.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Platform flavor that decides PATH separators and essential directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Separator between entries of PATH-like variables.
    pub fn path_separator(self) -> char {
        match self {
            Platform::Windows => ';',
            Platform::Linux | Platform::MacOs => ':',
        }
    }
}

/// Immutable view of the wrapper's own process.
#[derive(Debug, Clone)]
pub struct HostEnv {
    vars: BTreeMap<OsString, OsString>,
    exe: PathBuf,
    cwd: PathBuf,
    platform: Platform,
}

impl HostEnv {
    /// Capture the running process.
    pub fn capture() -> std::io::Result<Self> {
        let exe = std::env::current_exe()
            .or_else(|_| std::env::args_os().next().map(PathBuf::from).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no executable path")
            }))?;
        Ok(Self {
            vars: std::env::vars_os().collect(),
            exe,
            cwd: std::env::current_dir()?,
            platform: Platform::current(),
        })
    }

    /// Build a snapshot from explicit values.
    pub fn from_parts<K, V>(
        vars: impl IntoIterator<Item = (K, V)>,
        exe: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
        platform: Platform,
    ) -> Self
    where
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            exe: exe.into(),
            cwd: cwd.into(),
            platform,
        }
    }

    /// Raw value of a variable. Names are case-insensitive on Windows, where
    /// the search path is usually reported as `Path`.
    pub fn var_os(&self, key: &str) -> Option<&OsStr> {
        if let Some(value) = self.vars.get(OsStr::new(key)) {
            return Some(value.as_os_str());
        }
        if self.platform != Platform::Windows {
            return None;
        }
        self.vars
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_os_str())
    }

    /// UTF-8 value of a variable; empty values count as unset.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.var_os(key)
            .and_then(|v| v.to_str())
            .filter(|v| !v.is_empty())
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Resolve `path` against the working directory unless already absolute.
    pub fn absolutize(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}
