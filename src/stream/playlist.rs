//! HLS playlist parsing.
//!
//! Handles the subset of RFC 8216 a VOD/live player needs:
//! - Master playlists (`#EXT-X-STREAM-INF` variants)
//! - Media playlists (`#EXTINF` segments, media sequence, end list)

use std::collections::HashMap;

use url::Url;

use super::StreamQuality;
use crate::error::PlaylistError;

/// One quality variant of a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// Peak bitrate in bits per second.
    pub bandwidth: u64,
    /// Vertical resolution (0 when the playlist doesn't say).
    pub height: u32,
    pub codecs: Option<String>,
    pub uri: Url,
}

/// A single media segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sequence: u64,
    /// Duration in seconds.
    pub duration: f64,
    pub uri: Url,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub segments: Vec<Segment>,
    /// `false` once `#EXT-X-ENDLIST` is present.
    pub is_live: bool,
    pub target_duration: f64,
    pub media_sequence: u64,
}

impl MediaPlaylist {
    /// Sum of all segment durations in seconds.
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    /// Variants sorted by bandwidth, highest first.
    Master(Vec<Variant>),
    Media(MediaPlaylist),
}

/// Parse playlist text fetched from `base`.
pub fn parse(content: &str, base: &Url) -> Result<Playlist, PlaylistError> {
    check_header(content)?;
    if content.contains("#EXT-X-STREAM-INF:") {
        parse_master(content, base).map(Playlist::Master)
    } else {
        parse_media(content, base).map(Playlist::Media)
    }
}

fn check_header(content: &str) -> Result<(), PlaylistError> {
    let body = content.trim_start_matches('\u{feff}').trim_start();
    if body.starts_with("#EXTM3U") {
        Ok(())
    } else {
        Err(PlaylistError::MissingHeader)
    }
}

/// Parse a master playlist into variants, highest bandwidth first.
pub fn parse_master(content: &str, base: &Url) -> Result<Vec<Variant>, PlaylistError> {
    check_header(content)?;

    let mut variants = Vec::new();
    let mut lines = content.lines().map(str::trim).peekable();

    while let Some(line) = lines.next() {
        let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") else {
            continue;
        };
        let attrs = parse_attributes(rest);
        let bandwidth = attrs
            .get("BANDWIDTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let height = attrs
            .get("RESOLUTION")
            .and_then(|r| r.split('x').nth(1))
            .and_then(|h| h.parse().ok())
            .unwrap_or(0);
        let codecs = attrs.get("CODECS").cloned();

        // The URI is the next non-empty line
        while lines.peek().is_some_and(|l| l.is_empty()) {
            lines.next();
        }
        if let Some(uri_line) = lines.next() {
            if !uri_line.starts_with('#') {
                variants.push(Variant {
                    bandwidth,
                    height,
                    codecs,
                    uri: resolve(base, uri_line)?,
                });
            }
        }
    }

    if variants.is_empty() {
        return Err(PlaylistError::NoVariants);
    }

    variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
    Ok(variants)
}

/// Parse a media playlist into segments.
///
/// A finished (VOD) playlist without segments is an error; an empty live
/// playlist is not, the next refresh may fill it.
pub fn parse_media(content: &str, base: &Url) -> Result<MediaPlaylist, PlaylistError> {
    check_header(content)?;

    let mut segments = Vec::new();
    let mut is_live = true;
    let mut media_sequence = 0u64;
    let mut target_duration = 10.0f64;
    let mut current_duration = None;

    for line in content.lines().map(str::trim) {
        if line.starts_with("#EXT-X-ENDLIST") {
            is_live = false;
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            media_sequence = rest.parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            target_duration = rest.parse().unwrap_or(10.0);
        } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
            current_duration = rest.split(',').next().and_then(|d| d.trim().parse().ok());
        } else if !line.starts_with('#') && !line.is_empty() {
            segments.push(Segment {
                sequence: media_sequence + segments.len() as u64,
                duration: current_duration.take().unwrap_or(target_duration),
                uri: resolve(base, line)?,
            });
        }
    }

    if segments.is_empty() && !is_live {
        return Err(PlaylistError::NoSegments);
    }

    Ok(MediaPlaylist {
        segments,
        is_live,
        target_duration,
        media_sequence,
    })
}

/// Parse an attribute list such as `BANDWIDTH=1280000,CODECS="avc1,mp4a"`.
#[must_use]
pub fn parse_attributes(attr_str: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut chars = attr_str.chars().peekable();

    while chars.peek().is_some() {
        let key: String = chars.by_ref().take_while(|&c| c != '=').collect();
        if key.trim().is_empty() {
            break;
        }

        let value = if chars.peek() == Some(&'"') {
            chars.next(); // opening quote
            let v: String = chars.by_ref().take_while(|&c| c != '"').collect();
            chars.next(); // trailing comma
            v
        } else {
            chars.by_ref().take_while(|&c| c != ',').collect()
        };

        attrs.insert(key.trim().to_string(), value.trim().to_string());
    }

    attrs
}

/// Pick the variant matching `quality`. Expects variants sorted by
/// bandwidth, highest first.
#[must_use]
pub fn select_variant<'a>(variants: &'a [Variant], quality: &StreamQuality) -> Option<&'a Variant> {
    match quality {
        StreamQuality::Best => variants.first(),
        StreamQuality::Worst => variants.last(),
        StreamQuality::Specific(height) => variants
            .iter()
            .min_by_key(|v| v.height.abs_diff(*height)),
    }
}

fn resolve(base: &Url, uri: &str) -> Result<Url, PlaylistError> {
    base.join(uri).map_err(|e| PlaylistError::BadUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}
