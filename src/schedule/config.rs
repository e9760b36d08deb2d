use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{GraderError, GraderInputError, GraderInternalError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlatTestConfig {
    pub test_file_name: String,
    pub test_class_name: String,
    pub tests: Vec<TestCaseConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<u32>,
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

pub async fn load_flat_config(path: &Path) -> Result<FlatTestConfig, GraderError> {
    if !path.exists() {
        return Err(GraderInputError::MissingFile {
            kind: "Test config",
            path: path.to_path_buf(),
        }
        .into());
    }

    let contents =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| GraderInternalError::Io {
                path: path.to_path_buf(),
                source,
            })?;

    serde_json::from_str(&contents).map_err(|source| {
        GraderInputError::ParseError {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}
