//! HTTP search client that pages through a JSON search endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{RateLimitSignal, Session, SourceClient, SourceError};
use crate::controls::HarvestControls;
use crate::record::{Cursor, Page, Record};

const USER_AGENT: &str = "fastharvest/0.1";
/// Header carrying the unix timestamp at which a throttled client may retry.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";
/// Assumed throttle window when the source omits the reset header.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Search client bound to one query.
#[derive(Clone)]
pub struct HttpSearchClient {
    client: Client,
    endpoint: Url,
    query: String,
    product: String,
    page_size: usize,
}

impl HttpSearchClient {
    /// Builds a client for the query described by `controls`, authenticated by `session`.
    pub fn from_controls(
        controls: &HarvestControls,
        session: &Session,
    ) -> Result<Self, SourceError> {
        let endpoint = search_endpoint(controls.base_url())?;
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(controls.language())
                .map_err(|err| SourceError::Other(format!("invalid language tag: {err}")))?,
        );
        if let Some(cookie) = session.cookie_header() {
            let mut value = HeaderValue::from_str(&cookie)
                .map_err(|err| SourceError::Other(format!("invalid session cookies: {err}")))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(controls.request_timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            query: controls.query().to_string(),
            product: controls.product().to_string(),
            page_size: controls.page_size().max(1),
        })
    }

    /// Full request URL for the page starting at `cursor`.
    pub fn request_url(&self, cursor: Option<&Cursor>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("query", &self.query)
                .append_pair("product", &self.product)
                .append_pair("count", &self.page_size.to_string());
            if let Some(cursor) = cursor {
                pairs.append_pair("cursor", cursor.as_str());
            }
        }
        url
    }
}

#[async_trait]
impl SourceClient for HttpSearchClient {
    async fn fetch_page(&mut self, cursor: Option<&Cursor>) -> Result<Page, SourceError> {
        let url = self.request_url(cursor);
        debug!(%url, "requesting page");
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = rate_limit_reset(response.headers(), Utc::now());
            return Err(SourceError::RateLimited(RateLimitSignal::new(reset_at)));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        decode_page(&body)
    }
}

fn search_endpoint(base_url: &str) -> Result<Url, SourceError> {
    let raw = format!("{}/search", base_url.trim_end_matches('/'));
    Url::parse(&raw)
        .map_err(|err| SourceError::Other(format!("invalid base url {base_url}: {err}")))
}

/// Reads the reset time from a throttle response, falling back to a full window.
pub fn rate_limit_reset(headers: &HeaderMap, now: DateTime<Utc>) -> DateTime<Utc> {
    headers
        .get(RATE_LIMIT_RESET_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(|| {
            now + chrono::Duration::from_std(DEFAULT_RATE_LIMIT_WINDOW)
                .unwrap_or_else(|_| chrono::Duration::minutes(15))
        })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    records: Vec<WireRecord>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    author: String,
    text: String,
    created_at: String,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    favorite_count: u64,
}

impl From<WireRecord> for Record {
    fn from(wire: WireRecord) -> Self {
        Record {
            author: wire.author,
            text: wire.text,
            created_at: wire.created_at,
            retweets: wire.retweet_count,
            likes: wire.favorite_count,
        }
    }
}

/// Decodes a search response body into a page.
pub fn decode_page(body: &[u8]) -> Result<Page, SourceError> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|err| SourceError::Decode(err.to_string()))?;
    let records = response.records.into_iter().map(Record::from).collect();
    let next_cursor = response
        .next_cursor
        .filter(|token| !token.is_empty())
        .map(Cursor::new);
    Ok(Page::new(records, next_cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn client() -> HttpSearchClient {
        let controls = HarvestControls::new("(from:someone) lang:ar")
            .with_base_url("https://api.example.test/v1/")
            .with_page_size(20);
        HttpSearchClient::from_controls(&controls, &Session::from_cookies([("ct0", "abc")]))
            .expect("client builds")
    }

    #[test]
    fn first_page_url_has_no_cursor() {
        let url = client().request_url(None);
        assert_eq!(url.path(), "/v1/search");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("query".to_string(), "(from:someone) lang:ar".to_string()),
                ("product".to_string(), "Top".to_string()),
                ("count".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn later_page_url_carries_cursor() {
        let url = client().request_url(Some(&Cursor::new("DAABCgAB")));
        assert!(url
            .query_pairs()
            .any(|(key, value)| key == "cursor" && value == "DAABCgAB"));
    }

    #[test]
    fn decodes_records_and_cursor() {
        let body = r#"{
            "records": [
                {"author": "كاتب", "text": "مرحبا بالعالم", "created_at": "Mon Jan 01 10:00:00 +0000 2024", "retweet_count": 3, "favorite_count": 7}
            ],
            "next_cursor": "C1"
        }"#;
        let page = decode_page(body.as_bytes()).expect("page decodes");
        assert_eq!(page.len(), 1);
        assert_eq!(page.next_cursor(), Some(&Cursor::new("C1")));
        let record = &page.records()[0];
        assert_eq!(record.text, "مرحبا بالعالم");
        assert_eq!(record.author, "كاتب");
        assert_eq!(record.retweets, 3);
        assert_eq!(record.likes, 7);
        assert_eq!(record.created_at, "Mon Jan 01 10:00:00 +0000 2024");
    }

    #[test]
    fn created_at_keeps_source_offset() {
        let body = br#"{"records": [{"author": "a", "text": "b", "created_at": "Mon Jan 01 10:00:00 +0300 2024"}]}"#;
        let page = decode_page(body).expect("page decodes");
        assert_eq!(page.records()[0].created_at, "Mon Jan 01 10:00:00 +0300 2024");
    }

    #[test]
    fn empty_cursor_means_no_continuation() {
        let page = decode_page(br#"{"records": [], "next_cursor": ""}"#).expect("page decodes");
        assert!(page.is_empty());
        assert!(page.next_cursor().is_none());
    }

    #[test]
    fn unfamiliar_timestamp_layout_does_not_fail_page() {
        let body = br#"{"records": [
            {"author": "a", "text": "one", "created_at": "Mon Jan 01 10:00:00 +0000 2024"},
            {"author": "b", "text": "two", "created_at": "2024-01-01T10:00:00Z"},
            {"author": "c", "text": "three", "created_at": "Mon Jan 01 10:05:00 +0000 2024"}
        ]}"#;
        let page = decode_page(body).expect("page decodes");
        assert_eq!(page.len(), 3);
        assert_eq!(page.records()[1].created_at, "2024-01-01T10:00:00Z");
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = decode_page(b"<html>busy</html>").expect_err("body rejected");
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn reset_header_is_parsed_as_epoch_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from_static("1704103200"));
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(
            rate_limit_reset(&headers, now),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_reset_header_waits_a_full_window() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(
            rate_limit_reset(&HeaderMap::new(), now),
            now + chrono::Duration::minutes(15)
        );
    }
}
