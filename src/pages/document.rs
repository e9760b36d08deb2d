use async_trait::async_trait;

use crate::errors::GraderInternalError;

use super::model::ElementQuery;

/// Read access to the page currently loaded in a browser session.
#[async_trait(?Send)]
pub trait DocumentQuery {
    type Element: Clone;

    async fn current_url(&self) -> Result<String, GraderInternalError>;

    /// Runs `query` against the whole document, or relative to `root`.
    async fn query(
        &self,
        root: Option<&Self::Element>,
        query: &ElementQuery,
    ) -> Result<Vec<Self::Element>, GraderInternalError>;

    async fn attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, GraderInternalError>;

    async fn text(&self, element: &Self::Element) -> Result<String, GraderInternalError>;
}

#[async_trait(?Send)]
pub trait PageDriver: DocumentQuery {
    async fn navigate(&self, url: &str) -> Result<(), GraderInternalError>;

    async fn click(&self, element: &Self::Element) -> Result<(), GraderInternalError>;

    async fn send_keys(&self, element: &Self::Element, keys: &str)
        -> Result<(), GraderInternalError>;
}

/// Hands out isolated sessions, one per page test.
#[async_trait(?Send)]
pub trait Browser {
    type Session: PageDriver;

    async fn open_session(&self) -> Result<Self::Session, GraderInternalError>;

    async fn close_session(&self, session: Self::Session) -> Result<(), GraderInternalError>;
}
