use std::collections::BTreeMap;

use crate::errors::GraderInternalError;

use super::actions::ActionStepExecutor;
use super::document::{Browser, PageDriver};
use super::evaluate::evaluate_page_condition;
use super::model::{PageTest, ProjectTest};
use super::results::{PageTestResult, ProjectTestResult};

pub struct ProjectTestRunner<'p> {
    project: &'p ProjectTest,
    base_url: String,
    executor: ActionStepExecutor,
}

impl<'p> ProjectTestRunner<'p> {
    pub fn new(project: &'p ProjectTest, executor: ActionStepExecutor) -> Self {
        Self {
            project,
            base_url: project.base_url.clone(),
            executor,
        }
    }

    /// Points the page tests at another server than the one the project names.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Runs every page test in its own browser session.
    ///
    /// `observe` is called with each finished page test.
    pub async fn perform<B, F>(
        &self,
        browser: &B,
        mut observe: F,
    ) -> Result<ProjectTestResult, GraderInternalError>
    where
        B: Browser + ?Sized,
        F: FnMut(&str, &PageTestResult),
    {
        let mut page_test_results = BTreeMap::new();

        for (name, page_test) in &self.project.tests {
            let session = browser.open_session().await?;
            let outcome = self.run_page_test(page_test, &session).await;
            let closed = browser.close_session(session).await;
            // The run's own error takes precedence over the close.
            let result = outcome?;
            closed?;

            observe(name, &result);
            page_test_results.insert(name.clone(), result);
        }

        Ok(ProjectTestResult { page_test_results })
    }

    pub async fn run_page_test<D: PageDriver + ?Sized>(
        &self,
        page_test: &PageTest,
        driver: &D,
    ) -> Result<PageTestResult, GraderInternalError> {
        driver
            .navigate(&format!("{}{}", self.base_url, page_test.url))
            .await?;

        let mut saved_actions_performed = true;
        for name in &page_test.depends_on_saved_actions {
            let performed = match self.project.saved_actions.get(name) {
                Some(sequence) => self.executor.replay(sequence, driver).await?,
                None => false,
            };
            saved_actions_performed &= performed;
        }

        let mut initial_page_results = Vec::with_capacity(page_test.initial_page_conditions.len());
        for condition in &page_test.initial_page_conditions {
            initial_page_results.push(evaluate_page_condition(condition, driver).await?);
        }

        let mut action_results = Vec::with_capacity(page_test.actions.len());
        for step in &page_test.actions {
            action_results.push(self.executor.execute_step(step, driver).await?);
        }

        Ok(PageTestResult {
            saved_actions_performed,
            initial_page_results,
            action_results,
        })
    }
}
