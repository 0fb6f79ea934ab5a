use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{COOKIE, USER_AGENT};
use std::time::Duration;
use tracing::debug;

/// Plain GET used for CAPTCHA images and case attachments.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(
        &self,
        url: &str,
        cookies: &[(String, String)],
        timeout: Duration,
    ) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }
}

fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(
        &self,
        url: &str,
        cookies: &[(String, String)],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        debug!("GET {url} timeout={timeout:?}");
        let mut req = self.client.get(url).timeout(timeout);
        if !self.user_agent.is_empty() {
            req = req.header(USER_AGENT, &self.user_agent);
        }
        if !cookies.is_empty() {
            req = req.header(COOKIE, cookie_header(cookies));
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned {status}"));
        }
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        Ok(bytes.to_vec())
    }
}
