//! Post-processing pipeline through `run_wrapper`, with in-process fakes for
//! the build tool and the signing/encryption utility.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use piowrap_core::{
    run_wrapper, ArtifactLayout, ArtifactTransformer, BuildDriver, BuildError, BuildInvocation,
    HostEnv, Platform, PostProcessError, ToolEnv, TransformError, TransformStep, WrapperContext,
    WrapperError,
};

/// Build tool stand-in that records its arguments and returns a fixed code.
struct FakeBuild {
    exit_code: i32,
    calls: RefCell<Vec<Vec<String>>>,
}

impl FakeBuild {
    fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl BuildDriver for FakeBuild {
    fn run(&self, args: &[String], _env: &ToolEnv) -> Result<i32, BuildError> {
        self.calls.borrow_mut().push(args.to_vec());
        Ok(self.exit_code)
    }
}

/// Transformer stand-in: prefixes the input with a step tag.
#[derive(Default)]
struct FakeSecure {
    fail_on: Option<TransformStep>,
    calls: RefCell<Vec<(TransformStep, PathBuf, PathBuf)>>,
}

impl FakeSecure {
    fn failing_on(step: TransformStep) -> Self {
        Self {
            fail_on: Some(step),
            ..Self::default()
        }
    }

    fn steps(&self) -> Vec<TransformStep> {
        self.calls.borrow().iter().map(|(s, _, _)| *s).collect()
    }
}

impl ArtifactTransformer for FakeSecure {
    fn apply(
        &self,
        step: TransformStep,
        key: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<(), TransformError> {
        self.calls
            .borrow_mut()
            .push((step, key.to_path_buf(), input.to_path_buf()));
        if self.fail_on == Some(step) {
            // Leave a partial file behind like a crashing tool would.
            fs::write(output, b"partial").unwrap();
            return Err(TransformError::ToolFailed {
                step,
                code: "status 2".into(),
                stderr: "bad key".into(),
            });
        }
        let mut data = match step {
            TransformStep::Sign => b"SIG:".to_vec(),
            TransformStep::Encrypt => b"ENC:".to_vec(),
        };
        data.extend(fs::read(input).unwrap());
        fs::write(output, data).unwrap();
        Ok(())
    }
}

struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    /// Project with a key pair and the given boards; boards flagged `true` get an artifact.
    fn new(boards: &[(&str, bool)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sign.pem"), b"signing key").unwrap();
        fs::write(dir.path().join("flash.bin"), b"encryption key").unwrap();
        for (board, with_artifact) in boards {
            let board_dir = dir.path().join(".build-output").join(board);
            fs::create_dir_all(&board_dir).unwrap();
            if *with_artifact {
                fs::write(board_dir.join("firmware.bin"), format!("image-{board}")).unwrap();
            }
        }
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn artifact(&self, board: &str) -> PathBuf {
        self.root().join(".build-output").join(board).join("firmware.bin")
    }

    fn read(&self, board: &str) -> String {
        fs::read_to_string(self.artifact(board)).unwrap()
    }

    fn host(&self) -> HostEnv {
        HostEnv::from_parts(
            Vec::<(String, String)>::new(),
            "/bin/piowrap",
            self.root(),
            Platform::current(),
        )
    }

    fn run(
        &self,
        args: &[&str],
        build: &FakeBuild,
        secure: &FakeSecure,
    ) -> Result<piowrap_core::RunOutcome, WrapperError> {
        let host = self.host();
        let env = ToolEnv::default();
        let layout = ArtifactLayout::default();
        let invocation = BuildInvocation::parse(args.iter().copied(), &host);
        let ctx = WrapperContext {
            host: &host,
            env: &env,
            layout: &layout,
            driver: build,
            transformer: secure,
        };
        run_wrapper(&invocation, &ctx)
    }
}

#[test]
fn no_keys_means_no_transform_calls() {
    let project = Project::new(&[("esp32", true)]);
    let build = FakeBuild::new(0);
    let secure = FakeSecure::default();

    let outcome = project.run(&["run", "-e", "esp32"], &build, &secure).unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.report.is_none());
    assert!(secure.calls.borrow().is_empty());
    assert_eq!(project.read("esp32"), "image-esp32");
    assert_eq!(build.calls.borrow()[0], vec!["run", "-e", "esp32"]);
}

#[test]
fn sign_only_replaces_artifact_in_place() {
    let project = Project::new(&[("esp32", true)]);
    let build = FakeBuild::new(0);
    let secure = FakeSecure::default();

    let outcome = project
        .run(&["run", "--sign-key", "sign.pem"], &build, &secure)
        .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(secure.steps(), vec![TransformStep::Sign]);
    assert_eq!(secure.calls.borrow()[0].1, project.root().join("sign.pem"));
    assert_eq!(project.read("esp32"), "SIG:image-esp32");
    assert!(!project.artifact("esp32").with_file_name("firmware.bin.sign.tmp").exists());

    let report = outcome.report.unwrap();
    assert_eq!(report.artifacts.len(), 1);
    assert_ne!(report.artifacts[0].digest_before, report.artifacts[0].digest_after);
    assert_eq!(report.artifacts[0].steps, vec![TransformStep::Sign]);
}

#[test]
fn sign_runs_before_encrypt_on_every_board() {
    let project = Project::new(&[("a", true), ("b", true)]);
    let build = FakeBuild::new(0);
    let secure = FakeSecure::default();

    project
        .run(
            &["run", "--encrypt-key", "flash.bin", "--sign-key", "sign.pem"],
            &build,
            &secure,
        )
        .unwrap();

    assert_eq!(
        secure.steps(),
        vec![
            TransformStep::Sign,
            TransformStep::Sign,
            TransformStep::Encrypt,
            TransformStep::Encrypt,
        ]
    );
    assert_eq!(project.read("a"), "ENC:SIG:image-a");
    assert_eq!(project.read("b"), "ENC:SIG:image-b");
}

#[test]
fn sign_failure_stops_before_encrypt() {
    let project = Project::new(&[("esp32", true)]);
    let build = FakeBuild::new(0);
    let secure = FakeSecure::failing_on(TransformStep::Sign);

    let err = project
        .run(
            &["run", "--sign-key", "sign.pem", "--encrypt-key", "flash.bin"],
            &build,
            &secure,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        WrapperError::PostProcess(PostProcessError::Transform {
            step: TransformStep::Sign,
            ..
        })
    ));
    assert_eq!(secure.steps(), vec![TransformStep::Sign]);
    assert_eq!(project.read("esp32"), "image-esp32");
    assert!(!project.artifact("esp32").with_file_name("firmware.bin.sign.tmp").exists());
}

#[test]
fn encrypt_failure_leaves_signed_artifact() {
    let project = Project::new(&[("esp32", true)]);
    let build = FakeBuild::new(0);
    let secure = FakeSecure::failing_on(TransformStep::Encrypt);

    let err = project
        .run(
            &["run", "--sign-key", "sign.pem", "--encrypt-key", "flash.bin"],
            &build,
            &secure,
        )
        .unwrap_err();

    assert!(err.to_string().contains("encrypt failed for board 'esp32'"), "{err}");
    assert_eq!(project.read("esp32"), "SIG:image-esp32");
}

#[test]
fn only_boards_with_artifacts_are_processed() {
    let project = Project::new(&[("one", true), ("two", false), ("three", true)]);
    fs::write(project.root().join(".build-output/stray.txt"), b"x").unwrap();
    let build = FakeBuild::new(0);
    let secure = FakeSecure::default();

    let outcome = project
        .run(&["run", "--sign-key", "sign.pem"], &build, &secure)
        .unwrap();

    let boards: Vec<String> = outcome
        .report
        .unwrap()
        .artifacts
        .into_iter()
        .map(|a| a.board)
        .collect();
    assert_eq!(boards, vec!["one", "three"]);
    assert_eq!(secure.calls.borrow().len(), 2);
}

#[test]
fn build_failure_propagates_and_skips_post_processing() {
    let project = Project::new(&[("esp32", true)]);
    let build = FakeBuild::new(4);
    let secure = FakeSecure::default();

    let outcome = project
        .run(&["run", "--sign-key", "sign.pem"], &build, &secure)
        .unwrap();

    assert_eq!(outcome.exit_code, 4);
    assert!(outcome.report.is_none());
    assert!(secure.calls.borrow().is_empty());
}

#[test]
fn non_run_commands_ignore_keys() {
    let project = Project::new(&[("esp32", true)]);
    let build = FakeBuild::new(0);
    let secure = FakeSecure::default();

    let outcome = project
        .run(&["device", "list", "--sign-key", "sign.pem"], &build, &secure)
        .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert!(secure.calls.borrow().is_empty());
    assert_eq!(build.calls.borrow()[0], vec!["device", "list"]);
}

#[test]
fn missing_key_file_fails_before_any_transform() {
    let project = Project::new(&[("esp32", true)]);
    let build = FakeBuild::new(0);
    let secure = FakeSecure::default();

    let err = project
        .run(&["run", "--sign-key", "absent.pem"], &build, &secure)
        .unwrap_err();

    assert!(matches!(
        err,
        WrapperError::PostProcess(PostProcessError::KeyUnreadable { .. })
    ));
    assert!(secure.calls.borrow().is_empty());
}

#[test]
fn project_dir_argument_locates_outputs() {
    let project = Project::new(&[]);
    let fw = project.root().join("fw/.build-output/s3");
    fs::create_dir_all(&fw).unwrap();
    fs::write(fw.join("firmware.bin"), b"img").unwrap();
    let build = FakeBuild::new(0);
    let secure = FakeSecure::default();

    project
        .run(&["run", "-d", "fw", "--sign-key", "sign.pem"], &build, &secure)
        .unwrap();

    assert_eq!(fs::read(fw.join("firmware.bin")).unwrap(), b"SIG:img");
}

#[test]
fn missing_build_output_is_an_error_when_keys_given() {
    let project = Project::new(&[]);
    let build = FakeBuild::new(0);
    let secure = FakeSecure::default();

    let err = project
        .run(&["run", "--sign-key", "sign.pem"], &build, &secure)
        .unwrap_err();

    assert!(matches!(
        err,
        WrapperError::PostProcess(PostProcessError::MissingBuildOutput { .. })
    ));
}
