use crate::browser::webdriver::WebDriverBrowser;
use crate::browser::Browser;
use crate::config::Config;
use crate::fetch::Fetch;
use crate::locate;
use crate::util::settle;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaSource {
    /// Inline `data:` image, captured as an element screenshot.
    Embedded,
    Fetched(String),
}

#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub image: Vec<u8>,
    pub source: CaptchaSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalCheck {
    pub current_url: String,
    pub captcha_image_found: bool,
    pub captcha_input_found: bool,
}

/// The one live browser of a run.
///
/// `close` consumes the session, so it runs at most once; dropping a session
/// that was never closed is logged.
pub struct Session<B: Browser> {
    browser: B,
    closed: bool,
}

impl Session<WebDriverBrowser> {
    pub async fn open(cfg: &Config, download_dir: &Path) -> Result<Self> {
        let browser = WebDriverBrowser::connect(cfg, download_dir)
            .await
            .with_context(|| "browser session could not be established")?;
        Ok(Self::new(browser))
    }
}

impl<B: Browser> Session<B> {
    pub fn new(browser: B) -> Self {
        Self {
            browser,
            closed: false,
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub async fn load_portal(&self, cfg: &Config) -> Result<()> {
        info!("loading portal {}", cfg.portal.url);
        self.browser
            .navigate(&cfg.portal.url)
            .await
            .with_context(|| format!("navigate to {}", cfg.portal.url))
    }

    /// Current CAPTCHA image. Each call re-reads it, so calling again after
    /// the portal rotates the image acts as a refresh.
    pub async fn captcha_challenge(
        &self,
        cfg: &Config,
        fetcher: &dyn Fetch,
    ) -> Result<CaptchaChallenge> {
        let found = locate::captcha_image(cfg)
            .resolve(&self.browser)
            .await?
            .ok_or_else(|| anyhow!("captcha image not found on the portal page"))?;
        let src = self
            .browser
            .attribute(found.handle, "src")
            .await?
            .unwrap_or_default();

        if src.is_empty() || src.starts_with("data:") {
            let image = self
                .browser
                .element_screenshot(found.handle)
                .await
                .with_context(|| "screenshot of embedded captcha")?;
            return Ok(CaptchaChallenge {
                image,
                source: CaptchaSource::Embedded,
            });
        }

        let base = self.browser.current_url().await?;
        let url = Url::parse(&base)
            .and_then(|b| b.join(&src))
            .map(|u| u.to_string())
            .unwrap_or(src);
        let cookies = self.browser.cookies().await?;
        debug!("fetching captcha from {url} with {} cookies", cookies.len());
        let image = fetcher
            .get(&url, &cookies, cfg.limits.captcha_timeout())
            .await
            .with_context(|| "fetching captcha image")?;
        Ok(CaptchaChallenge {
            image,
            source: CaptchaSource::Fetched(url),
        })
    }

    /// Type the answer, then pick the first case category the page offers.
    pub async fn submit_captcha(&self, cfg: &Config, answer: &str) -> Result<()> {
        let input = locate::captcha_input(cfg)
            .resolve(&self.browser)
            .await?
            .ok_or_else(|| anyhow!("captcha input not found on the portal page"))?;
        self.browser.clear(input.handle).await?;
        self.browser.send_keys(input.handle, answer.trim()).await?;

        let mut picked = None;
        for category in &cfg.portal.case_categories {
            if let Some(found) = locate::case_category(category)
                .resolve(&self.browser)
                .await?
            {
                self.browser.click(found.handle).await?;
                picked = Some(category.as_str());
                break;
            }
        }
        match picked {
            Some(category) => info!("selected case category {category}"),
            None => warn!(
                "no case category control found (tried {:?})",
                cfg.portal.case_categories
            ),
        }
        settle(cfg.timing.after_category_ms).await;
        Ok(())
    }

    pub async fn inspect(&self, cfg: &Config) -> Result<PortalCheck> {
        Ok(PortalCheck {
            current_url: self.browser.current_url().await?,
            captcha_image_found: locate::captcha_image(cfg)
                .resolve(&self.browser)
                .await?
                .is_some(),
            captcha_input_found: locate::captcha_input(cfg)
                .resolve(&self.browser)
                .await?
                .is_some(),
        })
    }

    pub async fn close(mut self) {
        self.closed = true;
        match self.browser.close().await {
            Ok(()) => info!("browser session closed"),
            Err(e) => warn!("closing browser session: {e}"),
        }
    }
}

impl<B: Browser> Drop for Session<B> {
    fn drop(&mut self) {
        if !self.closed {
            warn!("browser session dropped without close");
        }
    }
}
