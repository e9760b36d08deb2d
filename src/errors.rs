use std::path::PathBuf;

use chromiumoxide::error::CdpError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraderInputError {
    #[error("{kind} file {path} does not exist")]
    MissingFile { kind: &'static str, path: PathBuf },
    #[error("results path {path} exists but is not a directory")]
    ResultsPathOccupied { path: PathBuf },
    #[error("{path} failed to parse: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("test {name} is declared more than once")]
    DuplicateTest { name: String },
    #[error("test {test} depends on {dependency}, which does not exist")]
    UnknownDependency { test: String, dependency: String },
    #[error("tests have a dependency cycle between [{tests}]")]
    DependencyCycle { tests: String },
    #[error("page test {test} replays saved actions {name}, which do not exist")]
    UnknownSavedAction { test: String, name: String },
    #[error("element query must set exactly one of xpathQuery or cssQuery")]
    InvalidQuery,
    #[error("send keys action requires keysToSend")]
    MissingKeys,
    #[error("found multiple config files: [{files}], only one may exist")]
    MultipleConfigs { files: String },
    #[error("configuration failed to load: {msg}")]
    Config { msg: String },
}

#[derive(Error, Debug)]
pub enum GraderInternalError {
    #[error("Process error: {msg}")]
    Process { msg: String },
    #[error("Container error: {msg}")]
    Container { msg: String },
    #[error("Browser error: {0}")]
    Browser(#[from] CdpError),
    #[error("Browser error: {msg}")]
    Driver { msg: String },
    #[error("results failed to serialize: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum GraderError {
    #[error("Input error: {0}")]
    External(#[from] GraderInputError),
    #[error("Run error: {0}")]
    Internal(#[from] GraderInternalError),
}

impl GraderError {
    pub fn exit_code(&self) -> i32 {
        match self {
            GraderError::External(GraderInputError::ResultsPathOccupied { .. }) => 2,
            GraderError::External(_) => 1,
            GraderError::Internal(_) => 3,
        }
    }
}

impl From<CdpError> for GraderError {
    fn from(value: CdpError) -> Self {
        GraderError::Internal(value.into())
    }
}
