use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::time::Duration;
use log::debug;
use thiserror::Error;
use url::Url;
use crate::expander::Expander;

pub const DEFAULT_BASE_URL: &str = "https://www.aideaucodage.fr";
pub const DEFAULT_SYNONYM_CLASS: &str = "synonyme";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server answered {0}")]
    HttpStatus(StatusCode),
    #[error("code {0:?} is empty once cleaned")]
    EmptyCode(String),
    #[error("invalid lookup URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid synonym selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

impl ScrapeError {
    /// Errors tied to a single code. Anything else would fail for every code
    /// and stops the run.
    pub fn is_per_code(&self) -> bool {
        matches!(
            self,
            ScrapeError::Network(_) | ScrapeError::HttpStatus(_) | ScrapeError::EmptyCode(_) | ScrapeError::Url(_)
        )
    }
}

/// Anything able to turn a code into its synonyms.
pub trait SynonymSource {
    fn fetch_synonyms(&self, code: &str) -> Result<Vec<String>, ScrapeError>;
}

/// Looks codes up on the synonym website over one persistent HTTP session.
pub struct Scraper {
    client: Client,
    base_url: Url,
    selector: Selector,
    expander: Expander,
}

impl Scraper {
    pub fn new(base_url: &str, timeout: Duration, synonym_class: &str) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("fr-FR,fr;q=0.9,en;q=0.8"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        Ok(Scraper {
            client,
            base_url: directory_url(base_url)?,
            selector: synonym_selector(synonym_class)?,
            expander: Expander::new(),
        })
    }

    pub fn lookup_url(&self, code: &str) -> Result<Url, ScrapeError> {
        let cleaned = clean_code(code);
        if cleaned.is_empty() {
            return Err(ScrapeError::EmptyCode(code.to_string()));
        }
        Ok(self.base_url.join(&format!("cim-{}", cleaned.to_lowercase()))?)
    }

    fn visit_page(&self, url: Url) -> Result<String, ScrapeError> {
        let resp = self.client.get(url).send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus(status));
        }
        Ok(resp.text()?)
    }
}

// Lookup pages live under the base path, so it must end with '/' for
// `Url::join` to append rather than replace the last segment.
fn directory_url(base_url: &str) -> Result<Url, ScrapeError> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn synonym_selector(synonym_class: &str) -> Result<Selector, ScrapeError> {
    let selector = format!("li.{}", synonym_class);
    Selector::parse(&selector).map_err(|e| ScrapeError::Selector {
        selector: selector.clone(),
        reason: e.to_string(),
    })
}

impl SynonymSource for Scraper {
    fn fetch_synonyms(&self, code: &str) -> Result<Vec<String>, ScrapeError> {
        let url = self.lookup_url(code)?;
        debug!("GET {}", url);

        let html = self.visit_page(url)?;
        let synonyms = extract_raw_synonyms(&html, &self.selector)
            .iter()
            .flat_map(|raw| self.expander.expand(raw))
            .collect();
        Ok(synonyms)
    }
}

/// Removes the separators codes carry in source data (`A00.0` -> `A000`).
pub fn clean_code(code: &str) -> String {
    code.chars().filter(|c| *c != '.' && *c != '-').collect()
}

/// Trimmed, non-empty text of every element matched by `selector`, in
/// document order.
pub fn extract_raw_synonyms(html: &str, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}
