//! Catalog service client.
//!
//! Lists uploaded videos and looks up the stream of a single title:
//!
//! - `GET {base}/movies` → `[{ id, title, thumbnailUrl, duration, createdAt }]`
//! - `GET {base}/movies/{id}` → the same fields plus `streamUrl`
//!
//! Older backends send `hls_url` relative to the server root instead of
//! `streamUrl`; both are accepted.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::CatalogError;
use crate::http::build_client;
use crate::stream::StreamDescriptor;

/// One listed video.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default, alias = "thumbnail_url")]
    pub thumbnail_url: Option<String>,
    /// Seconds. Accepts a number or `m:ss` / `h:mm:ss`.
    #[serde(default, deserialize_with = "duration_secs")]
    pub duration: Option<f64>,
    #[serde(default, alias = "created_at", alias = "createAt")]
    pub created_at: Option<String>,
}

impl CatalogEntry {
    /// Parse `created_at`; accepts RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS`.
    #[must_use]
    pub fn created(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    }

    /// `m:ss` (or `h:mm:ss`) for display.
    #[must_use]
    pub fn duration_label(&self) -> Option<String> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let total = self.duration?.round().max(0.0) as u64;
        let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
        Some(if h > 0 {
            format!("{h}:{m:02}:{s:02}")
        } else {
            format!("{m}:{s:02}")
        })
    }
}

/// A video with its stream location.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    #[serde(default, alias = "hls_url")]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

    async fn get(&self, id: &str) -> Result<CatalogItem, CatalogError>;
}

/// HTTP implementation of [`Catalog`].
pub struct CatalogClient {
    base: Url,
    client: Client,
    token: Option<String>,
}

impl CatalogClient {
    /// `base_url` is the API root; a trailing slash is added if missing.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let client = build_client(timeout)?;
        Self::with_client(base_url, token, client)
    }

    pub fn with_client(
        base_url: &str,
        token: Option<String>,
        client: Client,
    ) -> Result<Self, CatalogError> {
        let mut base = Url::parse(base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            client,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        id: Option<&str>,
    ) -> Result<T, CatalogError> {
        let url = self.base.join(path)?;
        debug!(%url, "Catalog request");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        match resp.status() {
            s if s.is_success() => Ok(resp.json().await?),
            StatusCode::UNAUTHORIZED => {
                warn!("Catalog rejected credentials");
                Err(CatalogError::Unauthorized)
            }
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(
                id.map_or_else(|| path.to_string(), str::to_string),
            )),
            s => Err(CatalogError::Status(s.as_u16())),
        }
    }

    /// Resolve an item's stream location. Relative paths are taken from the
    /// server root.
    pub fn stream_url(&self, item: &CatalogItem) -> Result<Url, CatalogError> {
        let raw = item
            .stream_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CatalogError::NoStream(item.entry.id.clone()))?;

        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let root = self.base.join("/")?;
                Ok(root.join(raw.trim_start_matches('/'))?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Build the descriptor for `item`, using its thumbnail as the poster.
    pub fn descriptor(&self, item: &CatalogItem) -> Result<StreamDescriptor, CatalogError> {
        let stream = self.stream_url(item)?;
        let poster = item
            .entry
            .thumbnail_url
            .as_deref()
            .and_then(|t| self.base.join(t).ok());
        Ok(StreamDescriptor::from_url(stream, poster)?)
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    #[instrument(skip(self), fields(base = %self.base))]
    async fn list(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.get_json("movies", None).await
    }

    #[instrument(skip(self), fields(base = %self.base))]
    async fn get(&self, id: &str) -> Result<CatalogItem, CatalogError> {
        let id = id.trim();
        if id.is_empty() || id.contains('/') {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        self.get_json(&format!("movies/{id}"), Some(id)).await
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn duration_secs<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => parse_clock(&s),
        _ => None,
    })
}

/// `ss`, `m:ss` or `h:mm:ss` to seconds.
fn parse_clock(s: &str) -> Option<f64> {
    let mut total = 0.0;
    for part in s.trim().split(':') {
        total = total * 60.0 + part.trim().parse::<f64>().ok()?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str, token: Option<&str>) -> CatalogClient {
        CatalogClient::new(base, token.map(str::to_string), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_entry_from_listing_json() {
        let json = r#"{
            "id": "1",
            "title": "Big Buck Bunny",
            "thumbnailUrl": "https://h/bbb.jpg",
            "duration": "9:56",
            "createdAt": "2023-05-15T10:30:00Z"
        }"#;
        let entry: CatalogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "1");
        assert_eq!(entry.duration, Some(596.0));
        assert_eq!(entry.duration_label().as_deref(), Some("9:56"));
        assert_eq!(entry.created().unwrap().to_rfc3339(), "2023-05-15T10:30:00+00:00");
    }

    #[test]
    fn test_entry_from_backend_json() {
        let json = r#"{"id": 7, "title": "Sintel", "duration": 888.4,
                       "thumbnail_url": null, "created_at": "2025-02-27T08:00:00"}"#;
        let entry: CatalogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "7");
        assert_eq!(entry.duration_label().as_deref(), Some("14:48"));
        assert!(entry.thumbnail_url.is_none());
        assert!(entry.created().is_some());
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("1:02:03"), Some(3723.0));
        assert_eq!(parse_clock("45"), Some(45.0));
        assert_eq!(parse_clock("a:b"), None);
    }

    #[test]
    fn test_relative_stream_url_resolves_against_server_root() {
        let catalog = client("http://127.0.0.1:5000/api", None);
        let item: CatalogItem = serde_json::from_str(
            r#"{"id": 3, "title": "x", "hls_url": "static/streams/3/index.m3u8"}"#,
        )
        .unwrap();
        assert_eq!(
            catalog.stream_url(&item).unwrap().as_str(),
            "http://127.0.0.1:5000/static/streams/3/index.m3u8"
        );
    }

    #[test]
    fn test_missing_stream_url() {
        let catalog = client("http://127.0.0.1:5000", None);
        let item: CatalogItem =
            serde_json::from_str(r#"{"id": 3, "title": "x", "hls_url": null}"#).unwrap();
        assert!(matches!(catalog.stream_url(&item), Err(CatalogError::NoStream(id)) if id == "3"));
    }

    #[tokio::test]
    async fn test_list_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/movies"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id": 1, "title": "A"}, {"id": "2", "title": "B", "duration": 60}]"#,
            ))
            .mount(&server)
            .await;

        let catalog = client(&format!("{}/api", server.uri()), Some("secret"));
        let entries = catalog.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].duration_label().as_deref(), Some("1:00"));
    }

    #[tokio::test]
    async fn test_get_builds_descriptor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/movies/9"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id": 9, "title": "T", "thumbnailUrl": "/thumbs/9.jpg",
                    "streamUrl": "https://cdn.example/9/master.m3u8"}"#,
            ))
            .mount(&server)
            .await;

        let catalog = client(&format!("{}/api/", server.uri()), None);
        let item = catalog.get("9").await.unwrap();
        let descriptor = catalog.descriptor(&item).unwrap();
        assert_eq!(
            descriptor.stream_url().as_str(),
            "https://cdn.example/9/master.m3u8"
        );
        assert_eq!(
            descriptor.poster_url().unwrap().as_str(),
            format!("{}/thumbs/9.jpg", server.uri())
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movies/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movies/401"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movies/500"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let catalog = client(&server.uri(), None);
        assert!(matches!(catalog.get("404").await, Err(CatalogError::NotFound(id)) if id == "404"));
        assert!(matches!(catalog.get("401").await, Err(CatalogError::Unauthorized)));
        assert!(matches!(catalog.get("500").await, Err(CatalogError::Status(500))));
        assert!(matches!(catalog.get("a/b").await, Err(CatalogError::NotFound(_))));
    }
}
