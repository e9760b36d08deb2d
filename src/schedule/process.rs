use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::GraderInternalError;

use super::TestCase;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessOutput {
    pub successful: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs the external process behind a single flat test.
#[async_trait]
pub trait TestProcessRunner: Sync {
    async fn run_test(&self, test: &TestCase) -> Result<ProcessOutput, GraderInternalError>;
}

/// Runs each test through a shell command built from a template such as
/// `python3 -m unittest {file}.{class}.{test}`.
#[derive(Debug, Clone)]
pub struct UnittestRunner {
    pub command_template: String,
    pub test_file_name: String,
    pub test_class_name: String,
    pub working_directory: Option<PathBuf>,
}

impl UnittestRunner {
    pub fn command_for(&self, test: &TestCase) -> String {
        self.command_template
            .replace("{file}", &self.test_file_name)
            .replace("{class}", &self.test_class_name)
            .replace("{test}", &test.name)
    }
}

#[async_trait]
impl TestProcessRunner for UnittestRunner {
    async fn run_test(&self, test: &TestCase) -> Result<ProcessOutput, GraderInternalError> {
        let cli = self.command_for(test);

        let mut command = Command::new("sh");
        command.arg("-c").arg(&cli);
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| GraderInternalError::Process {
                msg: format!("failed to run \"{cli}\": {e}"),
            })?;

        Ok(ProcessOutput {
            successful: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
