//! Host-side orchestration of the tester container.
//!
//! An exercise directory is bind-mounted into a fresh container under
//! `/data`, where the grader binary runs in `schedule` or `pages` mode and
//! writes its results into the one writable mount.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{GraderError, GraderInputError, GraderInternalError};
use crate::options::GraderContext;

const CONTAINER_ROOT: &str = "/data";
const CONTAINER_RESULT: &str = "/data/result.json";
const PAGE_SPEC: &str = "testSpec.json";
const FLAT_CONFIG: &str = "testConfig.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl BindMount {
    fn read_only(source: PathBuf, target: String) -> Self {
        Self {
            source,
            target,
            read_only: true,
        }
    }

    /// Renders the value of a `--mount` flag.
    pub fn to_arg(&self) -> String {
        let mut arg = format!(
            "type=bind,source={},target={}",
            self.source.display(),
            self.target
        );
        if self.read_only {
            arg.push_str(",readonly");
        }
        arg
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub working_dir: String,
    pub mounts: Vec<BindMount>,
    pub command: Vec<String>,
}

impl ContainerSpec {
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--workdir".to_string(),
            self.working_dir.clone(),
        ];
        for mount in &self.mounts {
            args.push("--mount".to_string());
            args.push(mount.to_arg());
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseMode {
    /// Structured page tests from `testSpec.json`.
    Pages,
    /// Process-backed tests from `testConfig.json` and a test module.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exercise {
    pub name: String,
    pub root: PathBuf,
    pub mode: ExerciseMode,
}

impl Exercise {
    /// Finds the exercise directory and works out which kind of tests it has.
    /// A page test spec wins when both kinds are present.
    pub fn locate(working_directory: &Path, name: &str) -> Result<Self, GraderInputError> {
        let root = working_directory.join(name);

        let mode = if root.join(PAGE_SPEC).exists() {
            ExerciseMode::Pages
        } else if root.join(FLAT_CONFIG).exists() {
            ExerciseMode::Flat
        } else {
            return Err(GraderInputError::MissingFile {
                kind: "Test spec",
                path: root.join(PAGE_SPEC),
            });
        };

        let exercise = Self {
            name: name.to_string(),
            root,
            mode,
        };

        let app = exercise.root.join("app");
        if !app.is_dir() {
            return Err(GraderInputError::MissingFile {
                kind: "Application directory",
                path: app,
            });
        }

        if mode == ExerciseMode::Flat && !exercise.test_module().exists() {
            return Err(GraderInputError::MissingFile {
                kind: "Test module",
                path: exercise.test_module(),
            });
        }

        Ok(exercise)
    }

    fn test_module_name(&self) -> String {
        format!("test_{}.py", self.name)
    }

    fn test_module(&self) -> PathBuf {
        self.root.join(self.test_module_name())
    }

    fn input_file(&self) -> &'static str {
        match self.mode {
            ExerciseMode::Pages => PAGE_SPEC,
            ExerciseMode::Flat => FLAT_CONFIG,
        }
    }

    pub fn mounts(&self, result_file: &Path) -> Vec<BindMount> {
        let mut mounts = vec![
            BindMount {
                source: result_file.to_path_buf(),
                target: CONTAINER_RESULT.to_string(),
                read_only: false,
            },
            BindMount::read_only(self.root.join("app"), format!("{CONTAINER_ROOT}/app")),
            BindMount::read_only(
                self.root.join(self.input_file()),
                format!("{CONTAINER_ROOT}/{}", self.input_file()),
            ),
        ];

        if self.mode == ExerciseMode::Flat {
            mounts.push(BindMount::read_only(
                self.test_module(),
                format!("{CONTAINER_ROOT}/{}", self.test_module_name()),
            ));
        }

        mounts
    }

    pub fn container_command(&self, binary: &str) -> Vec<String> {
        let (subcommand, input_flag) = match self.mode {
            ExerciseMode::Pages => ("pages", "--spec"),
            ExerciseMode::Flat => ("schedule", "--config"),
        };

        vec![
            binary.to_string(),
            subcommand.to_string(),
            input_flag.to_string(),
            format!("{CONTAINER_ROOT}/{}", self.input_file()),
            "--output".to_string(),
            CONTAINER_RESULT.to_string(),
        ]
    }

    pub fn container_spec(&self, ctx: &GraderContext, result_file: &Path) -> ContainerSpec {
        ContainerSpec {
            image: ctx.params.image.clone(),
            working_dir: CONTAINER_ROOT.to_string(),
            mounts: self.mounts(result_file),
            command: self.container_command(&ctx.params.container_binary),
        }
    }
}

/// Clears (or creates) the host file the container writes its results into.
pub async fn prepare_result_file(
    results_dir: &Path,
    exercise: &str,
) -> Result<PathBuf, GraderError> {
    if results_dir.exists() && !results_dir.is_dir() {
        return Err(GraderInputError::ResultsPathOccupied {
            path: results_dir.to_path_buf(),
        }
        .into());
    }

    tokio::fs::create_dir_all(results_dir)
        .await
        .map_err(|source| GraderInternalError::Io {
            path: results_dir.to_path_buf(),
            source,
        })?;

    let result_file = results_dir.join(format!("{exercise}_result.json"));
    tokio::fs::write(&result_file, b"")
        .await
        .map_err(|source| GraderInternalError::Io {
            path: result_file.clone(),
            source,
        })?;

    Ok(result_file)
}

#[async_trait]
pub trait ContainerRuntime: Sync {
    async fn build_image(&self, image: &str) -> Result<(), GraderInternalError>;

    /// Starts a detached container and returns its id.
    async fn start(&self, spec: &ContainerSpec) -> Result<String, GraderInternalError>;

    /// Blocks until the container exits, returning its status code.
    async fn wait(&self, id: &str) -> Result<i64, GraderInternalError>;

    async fn kill(&self, id: &str) -> Result<(), GraderInternalError>;

    async fn logs(&self, id: &str) -> Result<String, GraderInternalError>;

    async fn remove(&self, id: &str) -> Result<(), GraderInternalError>;
}

/// A container runtime driven through its command line, `docker` or anything
/// that accepts the same arguments.
#[derive(Debug, Clone)]
pub struct DockerCli {
    pub binary: String,
    pub build_context: PathBuf,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, build_context: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            build_context: build_context.into(),
        }
    }

    async fn invoke<S: AsRef<str>>(&self, args: &[S]) -> Result<Output, GraderInternalError> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let printed = format!("{} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.build_context)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GraderInternalError::Container {
                msg: format!("failed to run \"{printed}\": {e}"),
            })?;

        if !output.status.success() {
            return Err(GraderInternalError::Container {
                msg: format!(
                    "\"{printed}\" failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(output)
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build_image(&self, image: &str) -> Result<(), GraderInternalError> {
        self.invoke(&["build", "-t", image, "."]).await?;
        self.invoke(&["image", "prune", "-f"]).await?;
        Ok(())
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<String, GraderInternalError> {
        let output = self.invoke(spec.run_args().as_slice()).await?;
        Ok(stdout(&output).trim().to_string())
    }

    async fn wait(&self, id: &str) -> Result<i64, GraderInternalError> {
        let status = stdout(&self.invoke(&["wait", id]).await?);
        status
            .trim()
            .parse()
            .map_err(|_| GraderInternalError::Container {
                msg: format!("unexpected exit status {status:?} for container {id}"),
            })
    }

    async fn kill(&self, id: &str) -> Result<(), GraderInternalError> {
        self.invoke(&["kill", id]).await?;
        Ok(())
    }

    async fn logs(&self, id: &str) -> Result<String, GraderInternalError> {
        let output = self.invoke(&["logs", id]).await?;
        Ok(format!(
            "{}{}",
            stdout(&output),
            String::from_utf8_lossy(&output.stderr)
        ))
    }

    async fn remove(&self, id: &str) -> Result<(), GraderInternalError> {
        self.invoke(&["rm", id]).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseRun {
    pub exercise: Exercise,
    pub container_id: String,
    /// `None` when the container outlived its runtime and was killed.
    pub exit_status: Option<i64>,
    pub logs: String,
    pub result_file: PathBuf,
}

pub async fn run_exercise<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    ctx: &GraderContext,
    exercise_name: &str,
    build: bool,
    remove: bool,
) -> Result<ExerciseRun, GraderError> {
    let exercise = Exercise::locate(&ctx.working_directory, exercise_name)?;
    let result_file = prepare_result_file(&ctx.results_dir, exercise_name).await?;

    if build {
        runtime.build_image(&ctx.params.image).await?;
    }

    let spec = exercise.container_spec(ctx, &result_file);
    let container_id = runtime.start(&spec).await?;

    let max_runtime = Duration::from_secs(ctx.params.max_runtime);
    let exit_status = match tokio::time::timeout(max_runtime, runtime.wait(&container_id)).await {
        Ok(status) => Some(status?),
        Err(_) => {
            runtime.kill(&container_id).await?;
            None
        }
    };

    let logs = runtime.logs(&container_id).await?;

    if remove {
        runtime.remove(&container_id).await?;
    }

    Ok(ExerciseRun {
        exercise,
        container_id,
        exit_status,
        logs,
        result_file,
    })
}

#[cfg(test)]
mod test {
    use std::ffi::OsString;
    use std::sync::Mutex;

    use crate::options::{cli, configure_from};

    use super::*;

    fn context(dir: &Path, args: &[&str]) -> GraderContext {
        let matches = cli()
            .try_get_matches_from(args.iter().map(OsString::from))
            .expect("valid arguments");

        configure_from(matches, dir.to_path_buf())
            .expect("configuration loads")
            .0
    }

    fn page_exercise(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir.join(name).join("app")).unwrap();
        std::fs::write(dir.join(name).join(PAGE_SPEC), "{}").unwrap();
    }

    fn flat_exercise(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir.join(name).join("app")).unwrap();
        std::fs::write(dir.join(name).join(FLAT_CONFIG), "{}").unwrap();
        std::fs::write(dir.join(name).join(format!("test_{name}.py")), "").unwrap();
    }

    struct RecordingRuntime {
        wait_for: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingRuntime {
        fn new(wait_for: Duration) -> Self {
            Self {
                wait_for,
                calls: Mutex::new(vec![]),
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for RecordingRuntime {
        async fn build_image(&self, image: &str) -> Result<(), GraderInternalError> {
            self.record(format!("build {image}"));
            Ok(())
        }

        async fn start(&self, spec: &ContainerSpec) -> Result<String, GraderInternalError> {
            self.record(format!("start {}", spec.command.join(" ")));
            Ok("c0ffee".to_string())
        }

        async fn wait(&self, id: &str) -> Result<i64, GraderInternalError> {
            self.record(format!("wait {id}"));
            tokio::time::sleep(self.wait_for).await;
            Ok(0)
        }

        async fn kill(&self, id: &str) -> Result<(), GraderInternalError> {
            self.record(format!("kill {id}"));
            Ok(())
        }

        async fn logs(&self, id: &str) -> Result<String, GraderInternalError> {
            self.record(format!("logs {id}"));
            Ok("Ran 3 tests\n".to_string())
        }

        async fn remove(&self, id: &str) -> Result<(), GraderInternalError> {
            self.record(format!("remove {id}"));
            Ok(())
        }
    }

    #[test]
    fn test_locating_exercises() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        page_exercise(dir.path(), "login");
        flat_exercise(dir.path(), "blog");

        let login = Exercise::locate(dir.path(), "login").unwrap();
        assert_eq!(login.mode, ExerciseMode::Pages);

        let blog = Exercise::locate(dir.path(), "blog").unwrap();
        assert_eq!(blog.mode, ExerciseMode::Flat);

        let err = Exercise::locate(dir.path(), "todo").unwrap_err();
        assert_eq!(GraderError::from(err).exit_code(), 1);
    }

    #[test]
    fn test_flat_exercise_needs_its_test_module() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        flat_exercise(dir.path(), "blog");
        std::fs::remove_file(dir.path().join("blog/test_blog.py")).unwrap();

        let err = Exercise::locate(dir.path(), "blog").unwrap_err();

        assert!(matches!(
            err,
            GraderInputError::MissingFile {
                kind: "Test module",
                ..
            }
        ));
    }

    #[test]
    fn test_flat_mounts_and_command() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        flat_exercise(dir.path(), "blog");
        let blog = Exercise::locate(dir.path(), "blog").unwrap();
        let result_file = dir.path().join("results/blog_result.json");

        let mounts = blog.mounts(&result_file);

        let targets: Vec<(&str, bool)> = mounts
            .iter()
            .map(|m| (m.target.as_str(), m.read_only))
            .collect();
        assert_eq!(
            targets,
            vec![
                ("/data/result.json", false),
                ("/data/app", true),
                ("/data/testConfig.json", true),
                ("/data/test_blog.py", true),
            ]
        );
        assert_eq!(
            blog.container_command("pagegrade"),
            vec![
                "pagegrade",
                "schedule",
                "--config",
                "/data/testConfig.json",
                "--output",
                "/data/result.json"
            ]
        );
    }

    #[test]
    fn test_run_arguments() {
        let spec = ContainerSpec {
            image: "new_flask_tester".into(),
            working_dir: "/data".into(),
            mounts: vec![
                BindMount {
                    source: PathBuf::from("/work/results/login_result.json"),
                    target: "/data/result.json".into(),
                    read_only: false,
                },
                BindMount::read_only(PathBuf::from("/work/login/app"), "/data/app".into()),
            ],
            command: vec!["pagegrade".into(), "pages".into()],
        };

        assert_eq!(
            spec.run_args(),
            vec![
                "run",
                "--detach",
                "--workdir",
                "/data",
                "--mount",
                "type=bind,source=/work/results/login_result.json,target=/data/result.json",
                "--mount",
                "type=bind,source=/work/login/app,target=/data/app,readonly",
                "new_flask_tester",
                "pagegrade",
                "pages",
            ]
        );
    }

    #[tokio::test]
    async fn test_result_file_is_cleared() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        let results = dir.path().join("results");
        std::fs::create_dir_all(&results).unwrap();
        std::fs::write(results.join("login_result.json"), "{\"stale\": true}").unwrap();

        let file = prepare_result_file(&results, "login").await.unwrap();

        assert_eq!(std::fs::read_to_string(file).unwrap(), "");
    }

    #[tokio::test]
    async fn test_occupied_results_path() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        let results = dir.path().join("results");
        std::fs::write(&results, "not a directory").unwrap();

        let err = prepare_result_file(&results, "login").await.unwrap_err();

        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_full_run() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        page_exercise(dir.path(), "login");
        let ctx = context(dir.path(), &["pagegrade", "run", "login", "--build", "--rm"]);
        let runtime = RecordingRuntime::new(Duration::ZERO);

        let run = run_exercise(&runtime, &ctx, "login", true, true)
            .await
            .unwrap();

        assert_eq!(run.exit_status, Some(0));
        assert_eq!(run.logs, "Ran 3 tests\n");
        assert!(run.result_file.exists());
        assert_eq!(
            runtime.calls(),
            vec![
                "build new_flask_tester",
                "start pagegrade pages --spec /data/testSpec.json --output /data/result.json",
                "wait c0ffee",
                "logs c0ffee",
                "remove c0ffee",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_is_killed_after_max_runtime() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        page_exercise(dir.path(), "login");
        let ctx = context(dir.path(), &["pagegrade", "run", "login", "--max-runtime", "5"]);
        let runtime = RecordingRuntime::new(Duration::from_secs(60));

        let run = run_exercise(&runtime, &ctx, "login", false, false)
            .await
            .unwrap();

        assert_eq!(run.exit_status, None);
        assert_eq!(
            runtime.calls(),
            vec![
                "start pagegrade pages --spec /data/testSpec.json --output /data/result.json",
                "wait c0ffee",
                "kill c0ffee",
                "logs c0ffee",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_spec_stops_before_the_runtime() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        let ctx = context(dir.path(), &["pagegrade", "run", "login"]);
        let runtime = RecordingRuntime::new(Duration::ZERO);

        let err = run_exercise(&runtime, &ctx, "login", true, false)
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 1);
        assert!(runtime.calls().is_empty());
        assert!(!dir.path().join("results").exists());
    }
}
