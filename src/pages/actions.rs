use std::time::Duration;

use crate::errors::GraderInternalError;

use super::document::PageDriver;
use super::evaluate::evaluate_page_condition;
use super::model::{Action, ActionStep, SavedActionSequence};
use super::results::ActionStepResult;

/// Performs actions against a page driver.
///
/// An action is only performed when its query matches exactly one element.
/// After a performed action the executor waits `settle_delay` so that the
/// page can react before anything else is checked.
#[derive(Debug, Clone)]
pub struct ActionStepExecutor {
    pub settle_delay: Duration,
}

impl ActionStepExecutor {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    pub async fn perform<D: PageDriver + ?Sized>(
        &self,
        action: &Action,
        driver: &D,
    ) -> Result<bool, GraderInternalError> {
        let found = driver.query(None, action.query()).await?;
        let [element] = found.as_slice() else {
            return Ok(false);
        };

        match action {
            Action::Click { .. } => driver.click(element).await?,
            Action::SendKeys { keys, .. } => driver.send_keys(element, keys).await?,
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        Ok(true)
    }

    /// Post-conditions are evaluated even when the action could not be
    /// performed.
    pub async fn execute_step<D: PageDriver + ?Sized>(
        &self,
        step: &ActionStep,
        driver: &D,
    ) -> Result<ActionStepResult, GraderInternalError> {
        let action_performed = self.perform(&step.action, driver).await?;

        let mut post_condition_results = Vec::with_capacity(step.post_conditions.len());
        for condition in &step.post_conditions {
            post_condition_results.push(evaluate_page_condition(condition, driver).await?);
        }

        Ok(ActionStepResult {
            action_performed,
            post_condition_results,
        })
    }

    /// Replays a saved sequence, stopping at the first action that cannot be
    /// performed.
    pub async fn replay<D: PageDriver + ?Sized>(
        &self,
        sequence: &SavedActionSequence,
        driver: &D,
    ) -> Result<bool, GraderInternalError> {
        for action in &sequence.actions {
            if !self.perform(action, driver).await? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
