//! Case-record sources.
//!
//! A [`CaseSource`] yields the full candidate sequence of [`CaseRecord`]s for
//! one ingestion run. Deduplication is not the source's job; the ingestor
//! skips ids that are already indexed.
//!
//! | Source | Origin |
//! |--------|--------|
//! | [`JsonFileSource`] | a JSON array of `{id, title, text, meta}` on disk |
//! | [`LawApiSource`] | keyword sweep over the law.go.kr precedent API |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info, warn};

use clausemate_core::models::{CaseMeta, CaseRecord};

use crate::config::LawApiConfig;

#[async_trait]
pub trait CaseSource: Send + Sync {
    /// Short label used in logs and CLI output.
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<CaseRecord>>;
}

// ============ JSON file ============

pub struct JsonFileSource {
    path: PathBuf,
    label: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }
}

#[async_trait]
impl CaseSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn load(&self) -> Result<Vec<CaseRecord>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read case file: {}", self.path.display()))?;
        let records: Vec<CaseRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid case file: {}", self.path.display()))?;
        Ok(records)
    }
}

// ============ law.go.kr ============

/// One `<prec>` item of a `lawSearch.do` listing.
#[derive(Debug, Default, Clone, PartialEq)]
struct PrecedentListing {
    serial: String,
    case_name: String,
    decided_on: String,
    case_number: String,
}

/// Precedent sweep over the national law-information open API.
///
/// For every keyword, listing pages of `display` precedents are walked
/// newest first from `start_page`, for at most `pages` pages, stopping at the
/// first empty page. Each listed precedent is fetched in detail. The holding
/// summary (`판결요지`) is preferred over the full decision text
/// (`판례내용`); items with neither are dropped.
pub struct LawApiSource {
    client: reqwest::Client,
    config: LawApiConfig,
}

impl LawApiSource {
    pub fn new(config: LawApiConfig) -> Result<Self> {
        if config.user_id.trim().is_empty() {
            bail!("sources.law_api.user_id must not be empty");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    /// Replace the configured keyword list.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        if !keywords.is_empty() {
            self.config.keywords = keywords;
        }
        self
    }

    /// Override the page window of each keyword sweep.
    pub fn with_pages(mut self, start_page: Option<u32>, pages: Option<u32>) -> Self {
        if let Some(start) = start_page.filter(|p| *p > 0) {
            self.config.start_page = start;
        }
        if let Some(pages) = pages.filter(|p| *p > 0) {
            self.config.pages = pages;
        }
        self
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), name)
    }

    async fn search(&self, keyword: &str, page: u32) -> Result<Option<Vec<PrecedentListing>>> {
        let display = self.config.display.to_string();
        let page = page.to_string();
        let body = self
            .client
            .get(self.endpoint("lawSearch.do"))
            .query(&[
                ("OC", self.config.user_id.as_str()),
                ("target", "prec"),
                ("type", "XML"),
                ("display", display.as_str()),
                ("page", page.as_str()),
                ("sort", "date"),
                ("query", keyword),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        // The API answers refused requests with an HTML page.
        if looks_like_html(&body) {
            return Ok(None);
        }
        parse_listing(&body).map(Some)
    }

    async fn detail(&self, serial: &str) -> Result<Option<String>> {
        let body = self
            .client
            .get(self.endpoint("lawService.do"))
            .query(&[
                ("OC", self.config.user_id.as_str()),
                ("target", "prec"),
                ("ID", serial),
                ("type", "XML"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        if looks_like_html(&body) {
            return Ok(None);
        }
        parse_detail(&body)
    }

    async fn load_keyword(&self, keyword: &str) -> Result<Vec<CaseRecord>> {
        let first = self.config.start_page.max(1);
        let last = first.saturating_add(self.config.pages.max(1) - 1);
        let request_delay = Duration::from_millis(self.config.request_delay_ms);

        let mut records = Vec::new();
        for page in first..=last {
            if page > first {
                tokio::time::sleep(request_delay).await;
            }

            let listing = match self.search(keyword, page).await {
                Ok(Some(listing)) => listing,
                Ok(None) => {
                    warn!(keyword, page, "law API refused the search request, skipping keyword");
                    break;
                }
                Err(e) => {
                    warn!(keyword, page, error = %e, "listing page failed");
                    if page < last {
                        tokio::time::sleep(Duration::from_millis(self.config.error_delay_ms)).await;
                    }
                    continue;
                }
            };
            if listing.is_empty() {
                debug!(keyword, page, "no more precedents");
                break;
            }
            info!(keyword, page, found = listing.len(), "listed precedents");

            for item in listing {
                tokio::time::sleep(request_delay).await;
                let text = match self.detail(&item.serial).await {
                    Ok(Some(text)) => text,
                    Ok(None) => {
                        debug!(serial = %item.serial, "precedent has no text, dropping");
                        continue;
                    }
                    Err(e) => {
                        warn!(serial = %item.serial, error = %e, "precedent detail fetch failed");
                        continue;
                    }
                };
                records.push(listing_to_record(item, text, keyword));
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl CaseSource for LawApiSource {
    fn name(&self) -> &str {
        "law.go.kr"
    }

    async fn load(&self) -> Result<Vec<CaseRecord>> {
        let mut records = Vec::new();
        for (i, keyword) in self.config.keywords.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.keyword_delay_ms)).await;
            }
            match self.load_keyword(keyword).await {
                Ok(found) => records.extend(found),
                Err(e) => warn!(keyword = %keyword, error = %e, "keyword sweep failed"),
            }
        }
        Ok(records)
    }
}

fn looks_like_html(body: &str) -> bool {
    body.to_lowercase().contains("<html")
}

fn listing_to_record(item: PrecedentListing, text: String, keyword: &str) -> CaseRecord {
    let title = format!("{} {}", item.case_name, item.case_number)
        .trim()
        .to_string();
    CaseRecord {
        id: item.serial,
        title,
        body: text,
        meta: CaseMeta {
            source: format!("대법원 판례 {} ({})", item.case_number, keyword),
            date: Some(item.decided_on).filter(|d| !d.is_empty()),
            ..CaseMeta::default()
        },
    }
}

fn text_of(event: &quick_xml::events::BytesText<'_>) -> String {
    event
        .unescape()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(event).into_owned())
}

/// Parse the `<prec>` items of a search listing.
fn parse_listing(xml: &str) -> Result<Vec<PrecedentListing>> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();
    let mut current: Option<PrecedentListing> = None;
    let mut field: Option<String> = None;

    loop {
        let chunk = match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "prec" {
                    current = Some(PrecedentListing::default());
                } else if current.is_some() {
                    field = Some(name);
                }
                continue;
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"prec" {
                    if let Some(item) = current.take() {
                        if !item.serial.trim().is_empty() {
                            items.push(item);
                        }
                    }
                }
                field = None;
                continue;
            }
            Ok(Event::Text(t)) => text_of(&t),
            Ok(Event::CData(t)) => String::from_utf8_lossy(&t).into_owned(),
            Ok(Event::Eof) => break,
            Err(e) => bail!("XML parsing error at {}: {}", reader.buffer_position(), e),
            _ => continue,
        };

        if let (Some(item), Some(name)) = (current.as_mut(), field.as_deref()) {
            let slot = match name {
                "판례일련번호" => &mut item.serial,
                "사건명" => &mut item.case_name,
                "선고일자" => &mut item.decided_on,
                "사건번호" => &mut item.case_number,
                _ => continue,
            };
            slot.push_str(chunk.trim());
        }
    }

    Ok(items)
}

/// Extract the precedent text from a `lawService.do` detail document.
fn parse_detail(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    let mut summary = String::new();
    let mut full_text = String::new();
    let mut field: Option<String> = None;

    loop {
        let chunk = match reader.read_event() {
            Ok(Event::Start(e)) => {
                field = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                continue;
            }
            Ok(Event::End(_)) => {
                field = None;
                continue;
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"br" => "\n".to_string(),
            Ok(Event::Text(t)) => text_of(&t),
            Ok(Event::CData(t)) => String::from_utf8_lossy(&t).into_owned(),
            Ok(Event::Eof) => break,
            Err(e) => bail!("XML parsing error at {}: {}", reader.buffer_position(), e),
            _ => continue,
        };

        match field.as_deref() {
            Some("판결요지") => summary.push_str(&chunk),
            Some("판례내용") => full_text.push_str(&chunk),
            _ => {}
        }
    }

    let chosen = if summary.trim().is_empty() {
        full_text
    } else {
        summary
    };
    let cleaned = chosen
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .trim()
        .to_string();
    Ok(Some(cleaned).filter(|t| !t.is_empty()))
}
