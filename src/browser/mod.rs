pub mod error;
pub mod webdriver;

use async_trait::async_trait;

pub use error::BrowserError;

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Opaque reference to an element in the live DOM.
///
/// Handles do not survive navigation; re-locate after any page change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum By {
    XPath(String),
    Css(String),
    LinkText(String),
}

impl By {
    pub fn xpath(s: impl Into<String>) -> Self {
        By::XPath(s.into())
    }

    pub fn css(s: impl Into<String>) -> Self {
        By::Css(s.into())
    }

    pub fn link_text(s: impl Into<String>) -> Self {
        By::LinkText(s.into())
    }
}

/// Fold transient failures into `None`, keep fatal ones as errors.
pub fn recoverable<T>(res: BrowserResult<T>) -> BrowserResult<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!("recovered: {e}");
            Ok(None)
        }
    }
}

/// The browser primitives the capture workflow is written against.
///
/// A lookup that matches nothing is `Ok(None)` / an empty `Vec`, never an error.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    async fn find_elements(
        &self,
        scope: Option<ElementHandle>,
        by: &By,
    ) -> BrowserResult<Vec<ElementHandle>>;

    async fn find_element(
        &self,
        scope: Option<ElementHandle>,
        by: &By,
    ) -> BrowserResult<Option<ElementHandle>> {
        Ok(self.find_elements(scope, by).await?.into_iter().next())
    }

    async fn text(&self, el: ElementHandle) -> BrowserResult<String>;

    async fn attribute(&self, el: ElementHandle, name: &str) -> BrowserResult<Option<String>>;

    async fn is_enabled(&self, el: ElementHandle) -> BrowserResult<bool>;

    async fn click(&self, el: ElementHandle) -> BrowserResult<()>;

    async fn clear(&self, el: ElementHandle) -> BrowserResult<()>;

    async fn send_keys(&self, el: ElementHandle, text: &str) -> BrowserResult<()>;

    async fn element_screenshot(&self, el: ElementHandle) -> BrowserResult<Vec<u8>>;

    async fn current_url(&self) -> BrowserResult<String>;

    async fn page_source(&self) -> BrowserResult<String>;

    /// Print the current page to a PDF document.
    async fn render_to_document(&self) -> BrowserResult<Vec<u8>>;

    async fn cookies(&self) -> BrowserResult<Vec<(String, String)>>;

    async fn history_back(&self) -> BrowserResult<()>;

    async fn close(&self) -> BrowserResult<()>;
}
