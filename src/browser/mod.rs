use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::layout::Point;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::errors::GraderInternalError;
use crate::pages::{Browser, DocumentQuery, ElementQuery, PageDriver};

/// Defines `window.__pagegrade` on the page if it isn't there yet. Matched
/// elements are remembered in a page-side registry, keyed by id.
const HARNESS: &str = include_str!("./query.js");

#[derive(Debug, Clone, Default)]
pub struct ChromeSettings {
    pub headless: bool,
    pub executable: Option<PathBuf>,
}

/// A Chrome process driven over the DevTools protocol.
pub struct ChromeBrowser {
    browser: CdpBrowser,
    handler: JoinHandle<()>,
}

impl ChromeBrowser {
    pub async fn launch(settings: &ChromeSettings) -> Result<Self, GraderInternalError> {
        let mut builder = BrowserConfig::builder().no_sandbox();
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|msg| GraderInternalError::Driver { msg })?;

        let (browser, mut handler) = CdpBrowser::launch(config).await?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self { browser, handler })
    }

    pub async fn shutdown(mut self) -> Result<(), GraderInternalError> {
        let closed = self.browser.close().await;
        self.handler.abort();
        closed?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl Browser for ChromeBrowser {
    type Session = ChromePage;

    async fn open_session(&self) -> Result<ChromePage, GraderInternalError> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(ChromePage { page })
    }

    async fn close_session(&self, session: ChromePage) -> Result<(), GraderInternalError> {
        session.page.close().await?;
        Ok(())
    }
}

pub struct ChromePage {
    page: Page,
}

/// An element held in the page's registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeElement {
    node: String,
}

#[derive(Debug, Deserialize)]
struct Target {
    x: f64,
    y: f64,
}

impl ChromePage {
    async fn call<T: DeserializeOwned>(&self, call: String) -> Result<T, GraderInternalError> {
        let script = format!("{HARNESS}\n{call}");

        self.page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|e| GraderInternalError::Driver {
                msg: format!("page returned an unexpected value for {call}: {e}"),
            })
    }

    /// Scrolls the element into view and returns where to click it.
    async fn locate(&self, element: &ChromeElement) -> Result<Point, GraderInternalError> {
        let target: Option<Target> = self
            .call(format!("window.__pagegrade.point({})", json!(element.node)))
            .await?;

        target
            .map(|target| Point::new(target.x, target.y))
            .ok_or_else(|| GraderInternalError::Driver {
                msg: format!("element {} is no longer on the page", element.node),
            })
    }
}

#[async_trait(?Send)]
impl DocumentQuery for ChromePage {
    type Element = ChromeElement;

    async fn current_url(&self) -> Result<String, GraderInternalError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn query(
        &self,
        root: Option<&ChromeElement>,
        query: &ElementQuery,
    ) -> Result<Vec<ChromeElement>, GraderInternalError> {
        let (kind, text) = match query {
            ElementQuery::XPath(xpath) => ("xpath", xpath),
            ElementQuery::Css(css) => ("css", css),
        };
        let root = root.map(|r| r.node.as_str());

        // A root that has left the page has no children either.
        let nodes: Option<Vec<String>> = self
            .call(format!(
                "window.__pagegrade.query({}, {}, {})",
                json!(root),
                json!(kind),
                json!(text)
            ))
            .await?;

        Ok(nodes
            .unwrap_or_default()
            .into_iter()
            .map(|node| ChromeElement { node })
            .collect())
    }

    async fn attribute(
        &self,
        element: &ChromeElement,
        name: &str,
    ) -> Result<Option<String>, GraderInternalError> {
        self.call(format!(
            "window.__pagegrade.attribute({}, {})",
            json!(element.node),
            json!(name)
        ))
        .await
    }

    async fn text(&self, element: &ChromeElement) -> Result<String, GraderInternalError> {
        let text: Option<String> = self
            .call(format!("window.__pagegrade.text({})", json!(element.node)))
            .await?;
        Ok(text.unwrap_or_default())
    }
}

#[async_trait(?Send)]
impl PageDriver for ChromePage {
    async fn navigate(&self, url: &str) -> Result<(), GraderInternalError> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn click(&self, element: &ChromeElement) -> Result<(), GraderInternalError> {
        let point = self.locate(element).await?;
        self.page.click(point).await?;
        Ok(())
    }

    async fn send_keys(
        &self,
        element: &ChromeElement,
        keys: &str,
    ) -> Result<(), GraderInternalError> {
        self.click(element).await?;
        let focused: bool = self
            .call(format!("window.__pagegrade.focus({})", json!(element.node)))
            .await?;
        if !focused {
            return Err(GraderInternalError::Driver {
                msg: format!("element {} left the page before typing", element.node),
            });
        }

        self.page.execute(InsertTextParams::new(keys)).await?;
        Ok(())
    }
}
