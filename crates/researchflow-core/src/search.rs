//! Web search seam and the DuckDuckGo HTML provider.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::{ResearchError, SearchHit};

pub const DEFAULT_DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = concat!("researchflow/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeSearch {
    Off,
    Moderate,
    Strict,
}

impl SafeSearch {
    fn duckduckgo_param(self) -> &'static str {
        match self {
            SafeSearch::Off => "-2",
            SafeSearch::Moderate => "-1",
            SafeSearch::Strict => "1",
        }
    }
}

/// Recency window applied to search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeLimit {
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "w")]
    Week,
    #[serde(rename = "m")]
    Month,
    #[serde(rename = "y")]
    Year,
}

impl TimeLimit {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeLimit::Day => "d",
            TimeLimit::Week => "w",
            TimeLimit::Month => "m",
            TimeLimit::Year => "y",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub region: String,
    pub safesearch: SafeSearch,
    pub timelimit: TimeLimit,
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            region: "us-en".to_string(),
            safesearch: SafeSearch::Off,
            timelimit: TimeLimit::Year,
            max_results: 1,
        }
    }
}

/// Text search capability. Implementations return at most `options.max_results` hits.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn text(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, ResearchError>;
}

/// Scrapes the DuckDuckGo HTML endpoint.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: Url,
}

impl DuckDuckGoSearch {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ResearchError> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            ResearchError::InvalidConfiguration(format!("invalid search endpoint {endpoint}: {err}"))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| ResearchError::InvalidConfiguration(err.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    #[instrument(name = "search.duckduckgo", skip(self, options), fields(region = %options.region))]
    async fn text(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, ResearchError> {
        let params = [
            ("q", query),
            ("kl", options.region.as_str()),
            ("kp", options.safesearch.duckduckgo_param()),
            ("df", options.timelimit.as_str()),
        ];

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&params)
            .send()
            .await
            .map_err(|err| ResearchError::search(query, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResearchError::search(query, format!("HTTP status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ResearchError::search(query, err.to_string()))?;

        let hits = parse_results(&body, &self.endpoint, options.max_results);
        debug!(hits = hits.len(), "parsed duckduckgo results");
        Ok(hits)
    }
}

/// Extract result anchors from a DuckDuckGo HTML page.
pub fn parse_results(html: &str, base: &Url, max_results: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.result__a") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|anchor| {
            let title = anchor
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let href = resolve_href(anchor.value().attr("href")?, base)?;
            (!title.is_empty()).then(|| SearchHit::new(title, href))
        })
        .take(max_results)
        .collect()
}

fn resolve_href(raw: &str, base: &Url) -> Option<String> {
    let url = base.join(raw).ok()?;
    if url.path() == "/l/" {
        return url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned());
    }
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="result">
            <h2 class="result__title">
              <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.iea.org%2Freports%2Fbatteries&amp;rut=abc">
                Batteries   and <b>Secure</b> Energy
              </a>
            </h2>
          </div>
          <div class="result">
            <a class="result__a" href="https://example.org/direct">Direct link</a>
          </div>
          <div class="result">
            <a class="result__a" href="https://example.org/untitled">  </a>
          </div>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse(DEFAULT_DUCKDUCKGO_ENDPOINT).unwrap()
    }

    #[test]
    fn unwraps_redirect_links_and_normalises_titles() {
        let hits = parse_results(PAGE, &base(), 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Batteries and Secure Energy");
        assert_eq!(hits[0].href, "https://www.iea.org/reports/batteries");
        assert_eq!(hits[1].href, "https://example.org/direct");
    }

    #[test]
    fn honours_max_results() {
        let hits = parse_results(PAGE, &base(), 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn default_options_match_single_result_policy() {
        let options = SearchOptions::default();
        assert_eq!(options.region, "us-en");
        assert_eq!(options.safesearch, SafeSearch::Off);
        assert_eq!(options.timelimit, TimeLimit::Year);
        assert_eq!(options.max_results, 1);
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let err = DuckDuckGoSearch::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ResearchError::InvalidConfiguration(_)));
    }
}
