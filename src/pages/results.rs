use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::TextSpecModifier;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UrlConditionResult {
    pub awaited: String,
    pub gotten: String,
}

impl UrlConditionResult {
    /// Awaited URLs are relative, so only the end of the actual URL is checked.
    pub fn is_correct(&self) -> bool {
        self.gotten.ends_with(&self.awaited)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TextContentResult {
    pub awaited: String,
    pub gotten: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<TextSpecModifier>,
}

impl TextContentResult {
    pub fn is_correct(&self) -> bool {
        self.gotten
            .as_deref()
            .is_some_and(|gotten| TextSpecModifier::compare(self.modifier, &self.awaited, gotten))
    }
}

/// Everything observed while checking one element condition.
///
/// Unless exactly one element matched, only `found_elements_count` is
/// meaningful and every other field is left empty. Only the count is
/// camelCased on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementConditionResult {
    #[serde(rename = "foundElementsCount")]
    pub found_elements_count: usize,
    #[serde(default)]
    pub class_name_results: BTreeMap<String, bool>,
    #[serde(default)]
    pub text_content_result: Option<TextContentResult>,
    #[serde(default)]
    pub attribute_results: BTreeMap<String, TextContentResult>,
    #[serde(default)]
    pub child_results: Vec<ElementConditionResult>,
}

impl ElementConditionResult {
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Checks this element alone, ignoring its children.
    pub fn is_correct(&self) -> bool {
        self.found_elements_count == 1
            && self.class_name_results.values().all(|&present| present)
            && self
                .text_content_result
                .as_ref()
                .map_or(true, TextContentResult::is_correct)
            && self
                .attribute_results
                .values()
                .all(TextContentResult::is_correct)
    }

    pub fn is_fully_correct(&self) -> bool {
        self.is_correct()
            && self
                .child_results
                .iter()
                .all(ElementConditionResult::is_fully_correct)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "_type")]
pub enum PageConditionResult {
    #[serde(rename = "UrlSpecResult")]
    Url(UrlConditionResult),
    #[serde(rename = "ElementSpecResult")]
    Element(ElementConditionResult),
}

impl PageConditionResult {
    /// An element condition only counts as correct when its whole child
    /// tree is, so one failing descendant fails the condition.
    pub fn is_correct(&self) -> bool {
        match self {
            PageConditionResult::Url(url) => url.is_correct(),
            PageConditionResult::Element(element) => element.is_fully_correct(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionStepResult {
    pub action_performed: bool,
    pub post_condition_results: Vec<PageConditionResult>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageTestResult {
    pub saved_actions_performed: bool,
    pub initial_page_results: Vec<PageConditionResult>,
    pub action_results: Vec<ActionStepResult>,
}

impl PageTestResult {
    /// Counts checks as `(passed, total)`. Every condition and every action
    /// step counts as one check.
    pub fn tally(&self) -> (usize, usize) {
        let conditions = self.initial_page_results.iter().chain(
            self.action_results
                .iter()
                .flat_map(|step| step.post_condition_results.iter()),
        );

        let mut passed = 0;
        let mut total = 0;
        for condition in conditions {
            total += 1;
            if condition.is_correct() {
                passed += 1;
            }
        }
        for step in &self.action_results {
            total += 1;
            if step.action_performed {
                passed += 1;
            }
        }

        (passed, total)
    }

    pub fn is_correct(&self) -> bool {
        let (passed, total) = self.tally();
        self.saved_actions_performed && passed == total
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTestResult {
    pub page_test_results: BTreeMap<String, PageTestResult>,
}
