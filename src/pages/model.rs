use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::GraderInputError;

/// How an element is located, relative to the document or a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementQuery {
    XPath(String),
    Css(String),
}

impl ElementQuery {
    fn from_parts(
        xpath_query: Option<String>,
        css_query: Option<String>,
    ) -> Result<Self, GraderInputError> {
        match (xpath_query, css_query) {
            (Some(xpath), None) => Ok(ElementQuery::XPath(xpath)),
            (None, Some(css)) => Ok(ElementQuery::Css(css)),
            _ => Err(GraderInputError::InvalidQuery),
        }
    }

    fn into_parts(self) -> (Option<String>, Option<String>) {
        match self {
            ElementQuery::XPath(xpath) => (Some(xpath), None),
            ElementQuery::Css(css) => (None, Some(css)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ElementQuery::XPath(q) | ElementQuery::Css(q) => q,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSpecModifier {
    Contains,
    StartsWith,
    EndsWith,
    Url,
}

impl TextSpecModifier {
    /// Without a modifier, text has to match exactly.
    pub fn compare(modifier: Option<TextSpecModifier>, awaited: &str, gotten: &str) -> bool {
        use TextSpecModifier::*;

        match modifier {
            None => gotten == awaited,
            Some(Contains) => gotten.contains(awaited),
            Some(StartsWith) => gotten.starts_with(awaited),
            Some(EndsWith) | Some(Url) => gotten.ends_with(awaited),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TextSpec {
    pub awaited_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_spec_modifier: Option<TextSpecModifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCondition {
    pub awaited_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "RawElementCondition", into = "RawElementCondition")]
pub struct ElementCondition {
    pub query: ElementQuery,
    pub class_names: Vec<String>,
    pub text_content: Option<TextSpec>,
    pub attributes: BTreeMap<String, TextSpec>,
    pub children: Vec<ElementCondition>,
}

impl ElementCondition {
    pub fn new(query: ElementQuery) -> Self {
        Self {
            query,
            class_names: vec![],
            text_content: None,
            attributes: BTreeMap::new(),
            children: vec![],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "RawPageCondition", into = "RawPageCondition")]
pub enum PageCondition {
    Url(UrlCondition),
    Element(ElementCondition),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum Action {
    Click { query: ElementQuery },
    SendKeys { query: ElementQuery, keys: String },
}

impl Action {
    pub fn query(&self) -> &ElementQuery {
        match self {
            Action::Click { query } | Action::SendKeys { query, .. } => query,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    pub action: Action,
    #[serde(default)]
    pub post_conditions: Vec<PageCondition>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SavedActionSequence {
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Declared for documentation, never resolved.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageTest {
    pub url: String,
    /// Declared for documentation, never enforced between page tests.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub depends_on_saved_actions: Vec<String>,
    #[serde(default, rename = "initialPageSpec")]
    pub initial_page_conditions: Vec<PageCondition>,
    #[serde(default)]
    pub actions: Vec<ActionStep>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTest {
    pub base_url: String,
    #[serde(default)]
    pub tests: BTreeMap<String, PageTest>,
    #[serde(default)]
    pub saved_actions: BTreeMap<String, SavedActionSequence>,
}

impl ProjectTest {
    /// Checks the references between page tests and saved action sequences.
    ///
    /// A page test replaying a saved action sequence that does not exist is an
    /// error. Dangling `dependsOn` names are returned as warnings, as nothing
    /// ever resolves them.
    pub fn validate(&self) -> Result<Vec<String>, GraderInputError> {
        let mut warnings = vec![];

        for (test_name, test) in &self.tests {
            if let Some(missing) = test
                .depends_on_saved_actions
                .iter()
                .find(|name| !self.saved_actions.contains_key(*name))
            {
                return Err(GraderInputError::UnknownSavedAction {
                    test: test_name.clone(),
                    name: missing.clone(),
                });
            }

            for dependency in &test.depends_on {
                if !self.tests.contains_key(dependency) {
                    warnings.push(format!(
                        "page test {test_name} depends on {dependency}, which does not exist"
                    ));
                }
            }
        }

        for (sequence_name, sequence) in &self.saved_actions {
            for dependency in &sequence.depends_on {
                if !self.saved_actions.contains_key(dependency) {
                    warnings.push(format!(
                        "saved actions {sequence_name} depend on {dependency}, which do not exist"
                    ));
                }
            }
        }

        Ok(warnings)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawElementCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    xpath_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css_query: Option<String>,
    #[serde(default)]
    class_names: Vec<String>,
    #[serde(default)]
    text_content: Option<TextSpec>,
    #[serde(default)]
    attributes: BTreeMap<String, TextSpec>,
    #[serde(default)]
    children: Vec<ElementCondition>,
}

impl TryFrom<RawElementCondition> for ElementCondition {
    type Error = GraderInputError;

    fn try_from(value: RawElementCondition) -> Result<Self, Self::Error> {
        Ok(ElementCondition {
            query: ElementQuery::from_parts(value.xpath_query, value.css_query)?,
            class_names: value.class_names,
            text_content: value.text_content,
            attributes: value.attributes,
            children: value.children,
        })
    }
}

impl From<ElementCondition> for RawElementCondition {
    fn from(value: ElementCondition) -> Self {
        let (xpath_query, css_query) = value.query.into_parts();

        RawElementCondition {
            xpath_query,
            css_query,
            class_names: value.class_names,
            text_content: value.text_content,
            attributes: value.attributes,
            children: value.children,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "_type")]
enum RawPageCondition {
    #[serde(rename = "UrlSpec", rename_all = "camelCase")]
    Url { awaited_url: String },
    #[serde(rename = "ElementSpec", alias = "FlaskElementSpec")]
    Element(RawElementCondition),
}

impl TryFrom<RawPageCondition> for PageCondition {
    type Error = GraderInputError;

    fn try_from(value: RawPageCondition) -> Result<Self, Self::Error> {
        match value {
            RawPageCondition::Url { awaited_url } => {
                Ok(PageCondition::Url(UrlCondition { awaited_url }))
            }
            RawPageCondition::Element(raw) => Ok(PageCondition::Element(raw.try_into()?)),
        }
    }
}

impl From<PageCondition> for RawPageCondition {
    fn from(value: PageCondition) -> Self {
        match value {
            PageCondition::Url(UrlCondition { awaited_url }) => {
                RawPageCondition::Url { awaited_url }
            }
            PageCondition::Element(element) => RawPageCondition::Element(element.into()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "_type")]
enum RawAction {
    #[serde(
        rename = "ClickAction",
        alias = "FlaskClickAction",
        rename_all = "camelCase"
    )]
    Click {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        xpath_query: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        css_query: Option<String>,
    },
    #[serde(
        rename = "SendKeysAction",
        alias = "FlaskSendKeysAction",
        rename_all = "camelCase"
    )]
    SendKeys {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        xpath_query: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        css_query: Option<String>,
        #[serde(default)]
        keys_to_send: Option<String>,
    },
}

impl TryFrom<RawAction> for Action {
    type Error = GraderInputError;

    fn try_from(value: RawAction) -> Result<Self, Self::Error> {
        match value {
            RawAction::Click {
                xpath_query,
                css_query,
            } => Ok(Action::Click {
                query: ElementQuery::from_parts(xpath_query, css_query)?,
            }),
            RawAction::SendKeys {
                xpath_query,
                css_query,
                keys_to_send,
            } => Ok(Action::SendKeys {
                query: ElementQuery::from_parts(xpath_query, css_query)?,
                keys: keys_to_send.ok_or(GraderInputError::MissingKeys)?,
            }),
        }
    }
}

impl From<Action> for RawAction {
    fn from(value: Action) -> Self {
        match value {
            Action::Click { query } => {
                let (xpath_query, css_query) = query.into_parts();
                RawAction::Click {
                    xpath_query,
                    css_query,
                }
            }
            Action::SendKeys { query, keys } => {
                let (xpath_query, css_query) = query.into_parts();
                RawAction::SendKeys {
                    xpath_query,
                    css_query,
                    keys_to_send: Some(keys),
                }
            }
        }
    }
}
