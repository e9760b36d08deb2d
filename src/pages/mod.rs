//! Browser-driven checks of the pages a web application serves.
//!
//! A [`ProjectTest`] names page tests, each of which loads a URL in a fresh
//! browser session, optionally replays saved action sequences (logging in, for
//! example), checks conditions on the loaded page and then performs action
//! steps, each followed by its own post-conditions.

use std::path::Path;

use crate::errors::{GraderError, GraderInputError, GraderInternalError};

pub use actions::ActionStepExecutor;
pub use document::{Browser, DocumentQuery, PageDriver};
pub use evaluate::{evaluate_element_condition, evaluate_page_condition, evaluate_url_condition};
pub use model::{
    Action, ActionStep, ElementCondition, ElementQuery, PageCondition, PageTest, ProjectTest,
    SavedActionSequence, TextSpec, TextSpecModifier, UrlCondition,
};
pub use results::{
    ActionStepResult, ElementConditionResult, PageConditionResult, PageTestResult,
    ProjectTestResult, TextContentResult, UrlConditionResult,
};
pub use runner::ProjectTestRunner;

mod actions;
pub(crate) mod document;
mod evaluate;
mod model;
mod results;
mod runner;

pub async fn load_project_test(path: &Path) -> Result<ProjectTest, GraderError> {
    if !path.exists() {
        return Err(GraderInputError::MissingFile {
            kind: "Test spec",
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

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_loading_a_project_test() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        let path = dir.path().join("testSpec.json");
        std::fs::write(
            &path,
            r#"{
                "baseUrl": "http://localhost:5000",
                "tests": { "index": { "url": "/", "initialPageSpec": [ { "_type": "UrlSpec", "awaitedUrl": "/" } ] } }
            }"#,
        )
        .unwrap();

        let project = load_project_test(&path).await.unwrap();

        assert_eq!(project.tests["index"].initial_page_conditions.len(), 1);
        assert!(project.saved_actions.is_empty());
    }

    #[tokio::test]
    async fn test_missing_spec_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");

        let err = load_project_test(&dir.path().join("testSpec.json"))
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("Test spec file"));
    }

    #[tokio::test]
    async fn test_ambiguous_query_fails_to_load() {
        let dir = tempfile::tempdir().expect("testing on a system with a temp dir");
        let path = dir.path().join("testSpec.json");
        std::fs::write(
            &path,
            r#"{
                "baseUrl": "http://localhost:5000",
                "tests": { "index": { "url": "/", "initialPageSpec": [ { "_type": "ElementSpec" } ] } }
            }"#,
        )
        .unwrap();

        let err = load_project_test(&path).await.unwrap_err();

        assert!(matches!(
            err,
            GraderError::External(GraderInputError::ParseError { .. })
        ));
    }
}
