use futures::future::{FutureExt, LocalBoxFuture};

use crate::errors::GraderInternalError;

use super::document::DocumentQuery;
use super::model::{ElementCondition, PageCondition, TextSpec, UrlCondition};
use super::results::{
    ElementConditionResult, PageConditionResult, TextContentResult, UrlConditionResult,
};

pub async fn evaluate_page_condition<D: DocumentQuery + ?Sized>(
    condition: &PageCondition,
    document: &D,
) -> Result<PageConditionResult, GraderInternalError> {
    match condition {
        PageCondition::Url(url) => Ok(PageConditionResult::Url(
            evaluate_url_condition(url, document).await?,
        )),
        PageCondition::Element(element) => Ok(PageConditionResult::Element(
            evaluate_element_condition(element, document, None).await?,
        )),
    }
}

pub async fn evaluate_url_condition<D: DocumentQuery + ?Sized>(
    condition: &UrlCondition,
    document: &D,
) -> Result<UrlConditionResult, GraderInternalError> {
    Ok(UrlConditionResult {
        awaited: condition.awaited_url.clone(),
        gotten: document.current_url().await?,
    })
}

/// Checks an element condition, and its children relative to the matched
/// element. Nothing beyond the match count is inspected unless the query
/// matched exactly one element.
pub fn evaluate_element_condition<'a, D: DocumentQuery + ?Sized>(
    condition: &'a ElementCondition,
    document: &'a D,
    root: Option<&'a D::Element>,
) -> LocalBoxFuture<'a, Result<ElementConditionResult, GraderInternalError>> {
    async move {
        let found = document.query(root, &condition.query).await?;
        let [element] = found.as_slice() else {
            return Ok(ElementConditionResult {
                found_elements_count: found.len(),
                ..Default::default()
            });
        };

        let mut result = ElementConditionResult {
            found_elements_count: 1,
            ..Default::default()
        };

        if !condition.class_names.is_empty() {
            let classes = document
                .attribute(element, "class")
                .await?
                .unwrap_or_default();
            let tokens: Vec<&str> = classes.split_whitespace().collect();

            for class_name in &condition.class_names {
                result
                    .class_name_results
                    .insert(class_name.clone(), tokens.contains(&class_name.as_str()));
            }
        }

        if let Some(spec) = &condition.text_content {
            let text = document.text(element).await?;
            result.text_content_result = Some(text_result(spec, Some(text)));
        }

        for (name, spec) in &condition.attributes {
            let value = document.attribute(element, name).await?;
            result
                .attribute_results
                .insert(name.clone(), text_result(spec, value));
        }

        for child in &condition.children {
            result
                .child_results
                .push(evaluate_element_condition(child, document, Some(element)).await?);
        }

        Ok(result)
    }
    .boxed_local()
}

fn text_result(spec: &TextSpec, gotten: Option<String>) -> TextContentResult {
    TextContentResult {
        awaited: spec.awaited_text.clone(),
        gotten,
        modifier: spec.text_spec_modifier,
    }
}
