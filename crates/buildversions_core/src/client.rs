use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Credentials;

const CONTENT_API_PATH: &str = "rest/api/content";
const FETCH_EXPANSIONS: &str = "expand=version,body.storage";
const STORAGE_REPRESENTATION: &str = "storage";

/// Page body and the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub markup: String,
    pub revision: u64,
}

pub trait PageApi {
    fn fetch_page(&mut self) -> Result<PageSnapshot>;
    /// Store `markup` as revision `revision + 1`. No conflict check beyond what the
    /// server enforces.
    fn update_page(&mut self, markup: &str, revision: u64) -> Result<()>;
    fn request_count(&self) -> usize;
}

/// Identifies the page that is read and rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    pub base_url: String,
    pub page_id: String,
    pub space_key: String,
    pub title: String,
}

impl PageTarget {
    pub fn content_url(&self) -> Result<Url> {
        let raw = format!(
            "{}/{CONTENT_API_PATH}/{}",
            self.base_url.trim_end_matches('/'),
            self.page_id.trim()
        );
        Url::parse(&raw).with_context(|| format!("invalid Confluence URL: {raw}"))
    }

    pub fn fetch_url(&self) -> Result<Url> {
        let mut url = self.content_url()?;
        url.set_query(Some(FETCH_EXPANSIONS));
        Ok(url)
    }
}

#[derive(Debug, Clone)]
pub struct ConfluenceClientConfig {
    pub target: PageTarget,
    pub credentials: Credentials,
    pub user_agent: String,
    pub timeout_ms: u64,
}

pub struct ConfluenceClient {
    client: Client,
    config: ConfluenceClientConfig,
    request_count: usize,
}

impl ConfluenceClient {
    pub fn new(config: ConfluenceClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build Confluence HTTP client")?;

        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }
}

impl PageApi for ConfluenceClient {
    fn fetch_page(&mut self) -> Result<PageSnapshot> {
        let url = self.config.target.fetch_url()?;
        tracing::debug!(%url, "fetching page");
        self.request_count += 1;
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.config.user_agent.clone())
            .basic_auth(
                &self.config.credentials.username,
                Some(&self.config.credentials.password),
            )
            .send()
            .context("failed to call Confluence API")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Confluence page fetch failed with HTTP {status}");
        }
        let payload: Value = response
            .json()
            .context("failed to decode Confluence API JSON response")?;
        let snapshot = decode_page_snapshot(payload)?;
        tracing::debug!(
            revision = snapshot.revision,
            bytes = snapshot.markup.len(),
            "fetched page"
        );
        Ok(snapshot)
    }

    fn update_page(&mut self, markup: &str, revision: u64) -> Result<()> {
        let url = self.config.target.content_url()?;
        let body = UpdateRequest::new(&self.config.target, markup, revision);
        tracing::debug!(%url, version = body.version.number, "updating page");
        self.request_count += 1;
        let response = self
            .client
            .put(url)
            .header("User-Agent", self.config.user_agent.clone())
            .basic_auth(
                &self.config.credentials.username,
                Some(&self.config.credentials.password),
            )
            .json(&body)
            .send()
            .context("failed to call Confluence API")?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "Confluence page update to version {} failed with HTTP {status}",
                body.version.number
            );
        }
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    version: Option<ContentVersion>,
    body: Option<ContentBody>,
}

#[derive(Debug, Deserialize)]
struct ContentVersion {
    number: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    storage: Option<ContentStorage>,
}

#[derive(Debug, Deserialize)]
struct ContentStorage {
    value: Option<String>,
}

pub fn decode_page_snapshot(payload: Value) -> Result<PageSnapshot> {
    let parsed: ContentResponse =
        serde_json::from_value(payload).context("failed to decode Confluence content response")?;
    let revision = parsed
        .version
        .and_then(|version| version.number)
        .ok_or_else(|| anyhow::anyhow!("malformed Confluence response: missing version.number"))?;
    let markup = parsed
        .body
        .and_then(|body| body.storage)
        .and_then(|storage| storage.value)
        .ok_or_else(|| {
            anyhow::anyhow!("malformed Confluence response: missing body.storage.value")
        })?;
    Ok(PageSnapshot { markup, revision })
}

#[derive(Debug, Serialize)]
pub struct UpdateRequest<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    space: UpdateSpace<'a>,
    title: &'a str,
    version: UpdateVersion,
    body: UpdateBody<'a>,
}

#[derive(Debug, Serialize)]
struct UpdateSpace<'a> {
    key: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateVersion {
    number: u64,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    storage: UpdateStorage<'a>,
}

#[derive(Debug, Serialize)]
struct UpdateStorage<'a> {
    representation: &'static str,
    value: &'a str,
}

impl<'a> UpdateRequest<'a> {
    pub fn new(target: &'a PageTarget, markup: &'a str, revision: u64) -> Self {
        Self {
            id: &target.page_id,
            kind: "page",
            space: UpdateSpace {
                key: &target.space_key,
            },
            title: &target.title,
            version: UpdateVersion {
                number: revision + 1,
            },
            body: UpdateBody {
                storage: UpdateStorage {
                    representation: STORAGE_REPRESENTATION,
                    value: markup,
                },
            },
        }
    }
}
