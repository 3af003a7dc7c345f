//! Immutable description of the stream to play.

use tracing::warn;
use url::Url;

use crate::error::AttachError;

/// A stream URL plus an optional preview image.
///
/// Selecting another title creates a new descriptor; existing ones are
/// never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    stream_url: Url,
    poster_url: Option<Url>,
}

impl StreamDescriptor {
    /// Validate and build a descriptor.
    ///
    /// The stream URL must be a non-empty `http`/`https` URL. An unparsable
    /// poster is dropped with a warning; it never blocks playback.
    pub fn new(stream_url: &str, poster_url: Option<&str>) -> Result<Self, AttachError> {
        let stream_url = parse_stream_url(stream_url)?;
        let poster_url = poster_url
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .and_then(|p| match Url::parse(p) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(poster = p, error = %e, "Ignoring invalid poster URL");
                    None
                }
            });

        Ok(Self {
            stream_url,
            poster_url,
        })
    }

    /// Build from an already-parsed stream URL.
    pub fn from_url(stream_url: Url, poster_url: Option<Url>) -> Result<Self, AttachError> {
        check_scheme(&stream_url)?;
        Ok(Self {
            stream_url,
            poster_url,
        })
    }

    #[must_use]
    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    #[must_use]
    pub fn poster_url(&self) -> Option<&Url> {
        self.poster_url.as_ref()
    }
}

fn parse_stream_url(raw: &str) -> Result<Url, AttachError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AttachError::EmptyUrl);
    }
    let url = Url::parse(raw).map_err(|e| AttachError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    check_scheme(&url)?;
    Ok(url)
}

fn check_scheme(url: &Url) -> Result<(), AttachError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AttachError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_descriptor() {
        let d = StreamDescriptor::new(
            "https://h/a.m3u8",
            Some("https://h/poster.jpg"),
        )
        .unwrap();
        assert_eq!(d.stream_url().as_str(), "https://h/a.m3u8");
        assert_eq!(d.poster_url().unwrap().as_str(), "https://h/poster.jpg");
    }

    #[test]
    fn test_empty_url_rejected() {
        assert_eq!(StreamDescriptor::new("  ", None), Err(AttachError::EmptyUrl));
    }

    #[test]
    fn test_relative_url_rejected() {
        assert!(matches!(
            StreamDescriptor::new("streams/a.m3u8", None),
            Err(AttachError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        assert_eq!(
            StreamDescriptor::new("file:///tmp/a.m3u8", None),
            Err(AttachError::UnsupportedScheme("file".to_string()))
        );
    }

    #[test]
    fn test_bad_poster_is_dropped() {
        let d = StreamDescriptor::new("http://h/a.m3u8", Some("not a url")).unwrap();
        assert!(d.poster_url().is_none());
        let d = StreamDescriptor::new("http://h/a.m3u8", Some("")).unwrap();
        assert!(d.poster_url().is_none());
    }
}
