//! Environment overlay handed to every child process.
//!
//! The wrapper never edits its own environment. Instead [`ToolEnv::prepare`]
//! computes the PATH/PYTHONPATH/interpreter settings once, and
//! [`ToolEnv::apply`] stamps them onto each `Command` before spawning.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::DepsSection;
use crate::host::{HostEnv, Platform};

const RUNFILES_SUFFIX: &str = ".runfiles";

/// Immutable set of variables exported to child processes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolEnv {
    vars: Vec<(String, OsString)>,
    runfiles: Option<PathBuf>,
}

impl ToolEnv {
    /// Compute the overlay from the host snapshot and dependency settings.
    pub fn prepare(host: &HostEnv, deps: &DepsSection) -> Self {
        let platform = host.platform();
        let mut vars = Vec::new();

        let path = match host.var_os("PATH") {
            Some(raw) => raw.to_str(),
            None => Some(""),
        };
        match path {
            Some(path) => match normalize_path(path, platform, host.var("SystemRoot")) {
                Some(normalized) => vars.push(("PATH".to_string(), OsString::from(normalized))),
                None => log::debug!("PATH already contains every essential directory"),
            },
            None => log::warn!("PATH is not valid UTF-8, leaving it untouched"),
        }

        let runfiles = discover_runfiles(host);
        match &runfiles {
            Some(dir) => log::debug!("runfiles root: {}", dir.display()),
            None => log::debug!("no runfiles root found"),
        }

        let dependency_dirs = resolve_dependency_dirs(&deps.site_packages, runfiles.as_deref());
        if !dependency_dirs.is_empty() {
            let sep = platform.path_separator().to_string();
            let mut entries: Vec<String> = dependency_dirs
                .iter()
                .map(|d| d.to_string_lossy().into_owned())
                .collect();
            if let Some(existing) = host.var("PYTHONPATH") {
                entries.push(existing.to_string());
            }
            vars.push(("PYTHONPATH".to_string(), OsString::from(entries.join(&sep))));

            if let Some(python) = &deps.python_exe {
                vars.push((
                    "PLATFORMIO_PYTHON_EXE".to_string(),
                    python.clone().into_os_string(),
                ));
            }
        }

        if deps.disable_update_check {
            vars.push((
                "PLATFORMIO_SETTING_CHECK_PLATFORMIO_INTERVAL".to_string(),
                OsString::from("9999"),
            ));
            vars.push((
                "PLATFORMIO_SETTING_ENABLE_TELEMETRY".to_string(),
                OsString::from("No"),
            ));
        }

        Self { vars, runfiles }
    }

    /// Export the overlay onto a command.
    pub fn apply<'c>(&self, cmd: &'c mut Command) -> &'c mut Command {
        for (key, value) in &self.vars {
            cmd.env(key, value);
        }
        cmd
    }

    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.vars.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn runfiles(&self) -> Option<&Path> {
        self.runfiles.as_deref()
    }
}

/// Directories that must be on PATH for the build tool's own subprocesses.
pub fn essential_dirs(platform: Platform, system_root: Option<&str>) -> Vec<String> {
    match platform {
        Platform::Linux => vec!["/usr/bin".into(), "/bin".into(), "/usr/local/bin".into()],
        Platform::MacOs => vec![
            "/usr/bin".into(),
            "/bin".into(),
            "/usr/local/bin".into(),
            "/opt/homebrew/bin".into(),
        ],
        Platform::Windows => {
            let root = system_root.unwrap_or("C:\\Windows");
            vec![
                format!("{root}\\System32"),
                root.to_string(),
                format!("{root}\\System32\\Wbem"),
            ]
        }
    }
}

/// Prepend each missing essential directory to `path`.
///
/// Returns `None` when nothing had to be added.
pub fn normalize_path(path: &str, platform: Platform, system_root: Option<&str>) -> Option<String> {
    let sep = platform.path_separator();
    let present: Vec<&str> = path.split(sep).collect();
    let mut normalized = path.to_string();
    let mut changed = false;

    for dir in essential_dirs(platform, system_root) {
        if present.iter().any(|entry| same_dir(entry, &dir, platform)) {
            continue;
        }
        normalized = if normalized.is_empty() {
            dir
        } else {
            format!("{dir}{sep}{normalized}")
        };
        changed = true;
    }

    changed.then_some(normalized)
}

fn same_dir(entry: &str, dir: &str, platform: Platform) -> bool {
    match platform {
        Platform::Windows => entry.trim_end_matches('\\').eq_ignore_ascii_case(dir),
        Platform::Linux | Platform::MacOs => entry == dir,
    }
}

/// Locate the runfiles tree staged next to the wrapper executable.
pub fn discover_runfiles(host: &HostEnv) -> Option<PathBuf> {
    if let Some(dir) = host.var("RUNFILES_DIR").or_else(|| host.var("PYTHON_RUNFILES")) {
        return Some(PathBuf::from(dir));
    }

    let exe = std::fs::canonicalize(host.exe()).unwrap_or_else(|_| host.exe().to_path_buf());
    let exe_str = exe.to_string_lossy();

    if let Some(idx) = exe_str.find(RUNFILES_SUFFIX) {
        return Some(PathBuf::from(&exe_str[..idx + RUNFILES_SUFFIX.len()]));
    }

    let sibling = PathBuf::from(format!("{exe_str}{RUNFILES_SUFFIX}"));
    if sibling.is_dir() {
        return Some(sibling);
    }

    host.absolutize(host.exe())
        .ancestors()
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(RUNFILES_SUFFIX))
        })
        .map(Path::to_path_buf)
}

/// Resolve configured dependency directories, keeping existing ones in order
/// without duplicates.
pub fn resolve_dependency_dirs(entries: &[PathBuf], runfiles: Option<&Path>) -> Vec<PathBuf> {
    let mut resolved: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let candidate = if entry.is_absolute() {
            entry.clone()
        } else if let Some(root) = runfiles {
            root.join(entry)
        } else {
            log::warn!(
                "dependency path {} is relative but no runfiles root was found",
                entry.display()
            );
            continue;
        };

        if !candidate.is_dir() {
            log::warn!("dependency path {} does not exist", candidate.display());
            continue;
        }
        if !resolved.contains(&candidate) {
            resolved.push(candidate);
        }
    }
    resolved
}
