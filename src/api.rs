use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, COOKIE, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::model::{ImageRecord, ViewSelector};

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub session_cookie: Option<String>,
    /// `None` leaves requests unbounded; a hung request is only superseded.
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    results: Vec<ImageRecord>,
}

/// Blocking client for the similarity-search service.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    session_cookie: Option<String>,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api client user agent required");
        }
        let base_url = Url::parse(config.base_url.trim())
            .with_context(|| format!("api: invalid base url {:?}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("api: base url {} cannot carry a path", base_url);
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout)
                .build()
                .context("api: build http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            session_cookie: config.session_cookie.filter(|c| !c.trim().is_empty()),
            base_url,
        })
    }

    /// `/random` for the default feed, `/search?url=` for a similarity pivot.
    pub fn page_url(&self, selector: &ViewSelector, offset: usize, limit: usize) -> Url {
        let mut url = self.base_url.clone();
        // Client::new rejects cannot-be-a-base urls, so segments are always available.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.push(match selector {
                ViewSelector::Default => "random",
                ViewSelector::Similar(_) => "search",
            });
        }
        {
            let mut query = url.query_pairs_mut();
            if let ViewSelector::Similar(reference) = selector {
                query.append_pair("url", reference);
            }
            query
                .append_pair("offset", &offset.to_string())
                .append_pair("limit", &limit.to_string());
        }
        url
    }

    pub fn page(
        &self,
        selector: &ViewSelector,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImageRecord>> {
        let url = self.page_url(selector, offset, limit);
        let mut request = self
            .http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json");
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .with_context(|| format!("api: request {}", url))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("api: request failed: {} - {}", status, body.trim());
        }

        let page: PageResponse = response.json().context("api: decode page")?;
        Ok(page.results)
    }
}
