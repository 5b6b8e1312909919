//! Splitting the command line into build-tool arguments and wrapper options.
//!
//! Wrapper flags may appear anywhere between the build tool's own arguments:
//!
//! ```text
//! piowrap run -e esp32dev --sign-key keys/sign.pem --bazel-unzip lib.zip:lib
//! ```
//!
//! Each recognized flag consumes the following token. A flag in last position
//! has no value and is passed through untouched.

use std::path::{Path, PathBuf};

use crate::host::HostEnv;

pub const UNZIP_FLAG: &str = "--bazel-unzip";
pub const SIGN_KEY_FLAG: &str = "--sign-key";
pub const ENCRYPT_KEY_FLAG: &str = "--encrypt-key";

/// Comma-separated extraction specs, processed before those on the command line.
pub const UNZIP_ENV: &str = "PIO_UNZIP_DATA";

/// The build tool's global options that take a value.
const GLOBAL_OPTIONS_WITH_VALUE: &[&str] = &["-c", "--caller"];

/// One `<archive_path>:<destination_dir>` extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSpec {
    pub archive: PathBuf,
    pub dest: PathBuf,
}

impl ExtractSpec {
    /// Parse a spec, splitting on the last `:` so a drive letter in the
    /// archive path survives. Returns `None` when there is no `:` at all;
    /// an empty side is kept and rejected at extraction time.
    pub fn parse(raw: &str) -> Option<Self> {
        let (archive, dest) = raw.rsplit_once(':')?;
        Some(Self {
            archive: PathBuf::from(archive),
            dest: PathBuf::from(dest),
        })
    }
}

impl std::fmt::Display for ExtractSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.archive.display(), self.dest.display())
    }
}

/// Parsed command line for one wrapper run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInvocation {
    passthrough: Vec<String>,
    extract_specs: Vec<ExtractSpec>,
    sign_key: Option<PathBuf>,
    encrypt_key: Option<PathBuf>,
    cwd: PathBuf,
}

impl BuildInvocation {
    /// Split `args` (without the program name). Extraction specs from
    /// `PIO_UNZIP_DATA` come first; key paths are made absolute against the
    /// host's working directory.
    pub fn parse<I, S>(args: I, host: &HostEnv) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut raw_specs: Vec<String> = host
            .var(UNZIP_ENV)
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        let mut passthrough = Vec::new();
        let mut sign_key = None;
        let mut encrypt_key = None;

        let mut iter = args.into_iter().map(Into::into);
        while let Some(arg) = iter.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if is_wrapper_flag(flag) => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            if !is_wrapper_flag(&flag) {
                passthrough.push(arg);
                continue;
            }

            let value = match inline {
                Some(value) => value,
                None => match iter.next() {
                    Some(value) => value,
                    None => {
                        passthrough.push(arg);
                        continue;
                    }
                },
            };

            match flag.as_str() {
                UNZIP_FLAG => raw_specs.push(value),
                SIGN_KEY_FLAG => sign_key = Some(host.absolutize(value)),
                ENCRYPT_KEY_FLAG => encrypt_key = Some(host.absolutize(value)),
                _ => unreachable!("checked by is_wrapper_flag"),
            }
        }

        let extract_specs = raw_specs
            .iter()
            .filter_map(|raw| {
                let spec = ExtractSpec::parse(raw);
                if spec.is_none() && !raw.is_empty() {
                    log::debug!("skipping extraction spec without ':' '{raw}'");
                }
                spec
            })
            .collect();

        Self {
            passthrough,
            extract_specs,
            sign_key,
            encrypt_key,
            cwd: host.cwd().to_path_buf(),
        }
    }

    /// Arguments forwarded verbatim to the build tool.
    pub fn passthrough(&self) -> &[String] {
        &self.passthrough
    }

    pub fn extract_specs(&self) -> &[ExtractSpec] {
        &self.extract_specs
    }

    pub fn sign_key(&self) -> Option<&Path> {
        self.sign_key.as_deref()
    }

    pub fn encrypt_key(&self) -> Option<&Path> {
        self.encrypt_key.as_deref()
    }

    pub fn has_keys(&self) -> bool {
        self.sign_key.is_some() || self.encrypt_key.is_some()
    }

    /// The build tool subcommand, skipping global options.
    pub fn command(&self) -> Option<&str> {
        let mut iter = self.passthrough.iter();
        while let Some(arg) = iter.next() {
            if GLOBAL_OPTIONS_WITH_VALUE.contains(&arg.as_str()) {
                iter.next();
                continue;
            }
            if arg.starts_with('-') {
                continue;
            }
            return Some(arg.as_str());
        }
        None
    }

    /// True when the build tool was asked to `run` (build) a project.
    pub fn is_run(&self) -> bool {
        self.command() == Some("run")
    }

    /// Project directory from `-d/--project-dir`, defaulting to the working
    /// directory. The last occurrence wins.
    pub fn project_dir(&self) -> PathBuf {
        let mut found: Option<&str> = None;
        let mut iter = self.passthrough.iter();
        while let Some(arg) = iter.next() {
            if arg == "-d" || arg == "--project-dir" {
                if let Some(value) = iter.next() {
                    found = Some(value.as_str());
                }
            } else if let Some(value) = arg.strip_prefix("--project-dir=") {
                found = Some(value);
            }
        }
        match found {
            Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
            Some(dir) => self.cwd.join(dir),
            None => self.cwd.clone(),
        }
    }
}

fn is_wrapper_flag(flag: &str) -> bool {
    matches!(flag, UNZIP_FLAG | SIGN_KEY_FLAG | ENCRYPT_KEY_FLAG)
}
