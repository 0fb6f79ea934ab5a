use super::{Browser, BrowserError, BrowserResult, By, ElementHandle};
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use fantoccini::wd::WebDriverCompatibleCommand;
use fantoccini::{elements::Element, Client, ClientBuilder, Locator};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};
use url::{ParseError, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Firefox,
}

impl FromStr for BrowserKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserKind::Chrome),
            "firefox" => Ok(BrowserKind::Firefox),
            other => Err(anyhow!("unsupported browser.kind: {other}")),
        }
    }
}

impl BrowserKind {
    fn default_webdriver_url(self) -> &'static str {
        match self {
            BrowserKind::Chrome => "http://localhost:9515",
            BrowserKind::Firefox => "http://localhost:4444",
        }
    }

    fn driver_binary(self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chromedriver",
            BrowserKind::Firefox => "geckodriver",
        }
    }
}

/// Browser backed by a W3C WebDriver server (chromedriver or geckodriver).
pub struct WebDriverBrowser {
    client: Client,
    registry: Mutex<Registry<Element>>,
}

/// Live elements behind the opaque handles. Emptied whenever the page may
/// have changed, so it only ever holds handles for the current document.
struct Registry<T> {
    next: u64,
    live: HashMap<u64, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            next: 0,
            live: HashMap::new(),
        }
    }
}

impl<T: Clone> Registry<T> {
    fn insert(&mut self, item: T) -> ElementHandle {
        self.next += 1;
        self.live.insert(self.next, item);
        ElementHandle(self.next)
    }

    fn get(&self, handle: ElementHandle) -> Option<T> {
        self.live.get(&handle.0).cloned()
    }

    fn clear(&mut self) {
        self.live.clear();
    }

    fn len(&self) -> usize {
        self.live.len()
    }
}

impl WebDriverBrowser {
    pub async fn connect(cfg: &Config, download_dir: &Path) -> Result<Self> {
        let kind = BrowserKind::from_str(&cfg.browser.kind)?;
        let url = if cfg.browser.webdriver_url.trim().is_empty() {
            kind.default_webdriver_url().to_string()
        } else {
            cfg.browser.webdriver_url.trim().to_string()
        };
        let download_dir = download_dir
            .canonicalize()
            .with_context(|| format!("canonicalize download_dir: {}", download_dir.display()))?;
        let caps = capabilities(cfg, kind, &download_dir);
        debug!(?caps, "webdriver capabilities");

        info!("connecting to {} at {}", kind.driver_binary(), url);
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&url)
            .await
            .map_err(|e| {
                let driver = kind.driver_binary();
                anyhow!(
                    "cannot start a {driver} session at {url}: {e}\n\
                     Make sure the browser is installed and {driver} is running, e.g.:\n  \
                     {driver} --port {port}\n\
                     The driver version must match the installed browser version.",
                    port = url.rsplit(':').next().unwrap_or("9515"),
                )
            })?;

        Ok(Self {
            client,
            registry: Mutex::new(Registry::default()),
        })
    }

    fn register(&self, elements: Vec<Element>) -> Vec<ElementHandle> {
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        elements.into_iter().map(|el| reg.insert(el)).collect()
    }

    fn element(&self, handle: ElementHandle, op: &'static str) -> BrowserResult<Element> {
        let reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        reg.get(handle).ok_or(BrowserError::Stale(op))
    }

    fn forget_all(&self) {
        let mut reg = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        debug!("dropping {} element handles", reg.len());
        reg.clear();
    }
}

/// W3C "Print Page" (`POST /session/{id}/print`). The driver answers with the
/// PDF as a base64 string.
#[derive(Debug, Clone)]
pub struct PrintPage {
    pub background: bool,
}

impl Default for PrintPage {
    fn default() -> Self {
        Self { background: true }
    }
}

impl WebDriverCompatibleCommand for PrintPage {
    fn endpoint(&self, base_url: &Url, session_id: Option<&str>) -> Result<Url, ParseError> {
        base_url.join(&format!("session/{}/print", session_id.unwrap_or_default()))
    }

    fn method_and_body(&self, _request_url: &Url) -> (Method, Option<String>) {
        let body = json!({
            "background": self.background,
            "orientation": "portrait",
            "shrinkToFit": true,
        });
        (Method::POST, Some(body.to_string()))
    }
}

/// Decode the value returned by [`PrintPage`] into PDF bytes.
pub fn decode_printed_page(value: &Value) -> BrowserResult<Vec<u8>> {
    let Some(encoded) = value.as_str() else {
        return Err(BrowserError::command(
            "print",
            format!("expected a base64 string, got {value}"),
        ));
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| BrowserError::command("print", format!("invalid base64 payload: {e}")))
}

fn classify<E: Display>(op: &'static str) -> impl FnOnce(E) -> BrowserError {
    move |e| BrowserError::classify(op, e.to_string())
}

fn locator(by: &By) -> Locator<'_> {
    match by {
        By::XPath(s) => Locator::XPath(s),
        By::Css(s) => Locator::Css(s),
        By::LinkText(s) => Locator::LinkText(s),
    }
}

fn capabilities(cfg: &Config, kind: BrowserKind, download_dir: &Path) -> Map<String, Value> {
    let dir = download_dir.display().to_string();
    let mut caps = Map::new();
    match kind {
        BrowserKind::Chrome => {
            let mut args = vec![
                "--start-maximized".to_string(),
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ];
            if cfg.browser.headless {
                args.push("--headless=new".to_string());
                args.push("--disable-gpu".to_string());
            }
            if !cfg.browser.user_agent.is_empty() {
                args.push(format!("--user-agent={}", cfg.browser.user_agent));
            }
            args.extend(cfg.browser.extra_args.iter().cloned());
            caps.insert(
                "goog:chromeOptions".to_string(),
                json!({
                    "args": args,
                    "prefs": {
                        "download.default_directory": dir,
                        "download.prompt_for_download": false,
                        "download.directory_upgrade": true,
                        "plugins.always_open_pdf_externally": true,
                    }
                }),
            );
        }
        BrowserKind::Firefox => {
            let mut args = Vec::new();
            if cfg.browser.headless {
                args.push("-headless".to_string());
            }
            args.extend(cfg.browser.extra_args.iter().cloned());
            let mut prefs = json!({
                "browser.download.dir": dir,
                "browser.download.folderList": 2,
                "browser.download.useDownloadDir": true,
                "browser.helperApps.neverAsk.saveToDisk": "application/pdf",
                "pdfjs.disabled": true,
            });
            if !cfg.browser.user_agent.is_empty() {
                prefs["general.useragent.override"] = json!(cfg.browser.user_agent);
            }
            caps.insert(
                "moz:firefoxOptions".to_string(),
                json!({ "args": args, "prefs": prefs }),
            );
        }
    }
    caps
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.client.goto(url).await.map_err(classify("navigate"))?;
        self.forget_all();
        Ok(())
    }

    async fn find_elements(
        &self,
        scope: Option<ElementHandle>,
        by: &By,
    ) -> BrowserResult<Vec<ElementHandle>> {
        let found = match scope {
            Some(handle) => {
                let parent = self.element(handle, "find")?;
                parent.find_all(locator(by)).await.map_err(classify("find"))?
            }
            None => self
                .client
                .find_all(locator(by))
                .await
                .map_err(classify("find"))?,
        };
        Ok(self.register(found))
    }

    async fn text(&self, el: ElementHandle) -> BrowserResult<String> {
        let el = self.element(el, "text")?;
        el.text().await.map_err(classify("text"))
    }

    async fn attribute(&self, el: ElementHandle, name: &str) -> BrowserResult<Option<String>> {
        let el = self.element(el, "attribute")?;
        el.attr(name).await.map_err(classify("attribute"))
    }

    async fn is_enabled(&self, el: ElementHandle) -> BrowserResult<bool> {
        let el = self.element(el, "is_enabled")?;
        el.is_enabled().await.map_err(classify("is_enabled"))
    }

    async fn click(&self, el: ElementHandle) -> BrowserResult<()> {
        // Script click: the portal overlays rows with invisible layers that
        // swallow synthetic pointer events.
        let el = self.element(el, "click")?;
        let arg = serde_json::to_value(&el).map_err(classify("click"))?;
        self.client
            .execute("arguments[0].click();", vec![arg])
            .await
            .map_err(classify("click"))?;
        // A click may navigate; handles from before it are not trusted.
        self.forget_all();
        Ok(())
    }

    async fn clear(&self, el: ElementHandle) -> BrowserResult<()> {
        let el = self.element(el, "clear")?;
        el.clear().await.map_err(classify("clear"))
    }

    async fn send_keys(&self, el: ElementHandle, text: &str) -> BrowserResult<()> {
        let el = self.element(el, "send_keys")?;
        el.send_keys(text).await.map_err(classify("send_keys"))
    }

    async fn element_screenshot(&self, el: ElementHandle) -> BrowserResult<Vec<u8>> {
        let el = self.element(el, "screenshot")?;
        el.screenshot().await.map_err(classify("screenshot"))
    }

    async fn current_url(&self) -> BrowserResult<String> {
        let url = self
            .client
            .current_url()
            .await
            .map_err(classify("current_url"))?;
        Ok(url.to_string())
    }

    async fn page_source(&self) -> BrowserResult<String> {
        self.client.source().await.map_err(classify("page_source"))
    }

    async fn render_to_document(&self) -> BrowserResult<Vec<u8>> {
        let value = self
            .client
            .issue_cmd(PrintPage::default())
            .await
            .map_err(classify("print"))?;
        decode_printed_page(&value)
    }

    async fn cookies(&self) -> BrowserResult<Vec<(String, String)>> {
        let cookies = self
            .client
            .get_all_cookies()
            .await
            .map_err(classify("cookies"))?;
        Ok(cookies
            .iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect())
    }

    async fn history_back(&self) -> BrowserResult<()> {
        self.client.back().await.map_err(classify("history_back"))?;
        self.forget_all();
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.forget_all();
        self.client
            .clone()
            .close()
            .await
            .map_err(classify("close"))
    }
}
