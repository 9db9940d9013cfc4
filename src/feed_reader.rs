//! Feed reader (C2, §4.2).
//!
//! Fetches a feed URL, recognizes YouTube channel feeds by URL shape, and
//! returns candidate episodes published within the lookback window. Non-
//! YouTube feeds are parsed generically via `feed-rs` (RSS/Atom/JSON Feed) —
//! the podscrape2 original only special-cased YouTube; everything else went
//! through a generic parser, which this mirrors.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{PipelineError, Result};
use crate::models::feed::EpisodeDescriptor;
use crate::recovery::{retry_with_backoff, RetryConfig};

fn youtube_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid regex"))
}

pub struct FeedReader {
    client: reqwest::Client,
}

impl FeedReader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Reads `feed_url`, returning episodes published on or after
    /// `now - lookback_days` (§4.2 invariant: lookback is inclusive of the
    /// boundary day).
    pub async fn read(&self, feed_url: &str, lookback_days: i64) -> Result<Vec<EpisodeDescriptor>> {
        if is_youtube_feed(feed_url) && extract_channel_id(feed_url).is_none() {
            return Ok(vec![]);
        }

        let cutoff = Utc::now() - ChronoDuration::days(lookback_days);
        let body = self.fetch_body(feed_url).await?;

        let descriptors = if is_youtube_feed(feed_url) {
            parse_youtube_feed(&body)?
        } else {
            parse_generic_feed(&body)?
        };

        Ok(descriptors
            .into_iter()
            .filter(|d| d.published_at >= cutoff)
            .collect())
    }

    async fn fetch_body(&self, feed_url: &str) -> Result<String> {
        let config = RetryConfig::default();
        let client = &self.client;

        retry_with_backoff(
            || async {
                let response = client
                    .get(feed_url)
                    .send()
                    .await
                    .map_err(|e| PipelineError::TransientExternal {
                        service: "feed_reader".to_string(),
                        message: e.to_string(),
                    })?;

                let status = response.status();
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();

                if !status.is_success() {
                    if status.is_server_error() || status.as_u16() == 429 {
                        return Err(PipelineError::TransientExternal {
                            service: "feed_reader".to_string(),
                            message: format!("http {status}"),
                        });
                    }
                    return Err(PipelineError::PermanentExternal {
                        service: "feed_reader".to_string(),
                        message: format!("http {status}"),
                    });
                }

                // A feed URL that resolves to an HTML document (redirected
                // to a landing page, paywalled, etc.) is treated as
                // transient: the feed may come back on the next scheduled
                // run (§4.2, §7).
                if content_type.contains("text/html") {
                    return Err(PipelineError::TransientExternal {
                        service: "feed_reader".to_string(),
                        message: "feed URL returned HTML content".to_string(),
                    });
                }

                response
                    .text()
                    .await
                    .map_err(|e| PipelineError::TransientExternal {
                        service: "feed_reader".to_string(),
                        message: e.to_string(),
                    })
            },
            &config,
            "feed_reader.fetch",
        )
        .await
    }
}

/// YouTube channel/playlist feeds are served from a fixed path and carry a
/// `channel_id=` or `playlist_id=` query parameter (§4.2).
pub fn is_youtube_feed(feed_url: &str) -> bool {
    feed_url.contains("youtube.com/feeds/videos.xml")
}

pub fn extract_channel_id(feed_url: &str) -> Option<String> {
    feed_url
        .split("channel_id=")
        .nth(1)
        .map(|rest| rest.split('&').next().unwrap_or(rest).to_string())
}

fn parse_generic_feed(body: &str) -> Result<Vec<EpisodeDescriptor>> {
    let parsed = feed_rs::parser::parse(body.as_bytes())
        .map_err(|e| PipelineError::PermanentExternal {
            service: "feed_reader".to_string(),
            message: format!("failed to parse feed: {e}"),
        })?;

    let descriptors = parsed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let published_at = entry
                .published
                .or(entry.updated)
                .unwrap_or_else(Utc::now);

            let title = entry.title.map(|t| t.content).unwrap_or_default();
            if title.is_empty() {
                return None;
            }

            let content_url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.media.first().and_then(|m| m.content.first()).and_then(|c| c.url.as_ref().map(|u| u.to_string())));

            let description = entry.summary.map(|s| s.content);

            let duration_seconds = entry
                .media
                .first()
                .and_then(|m| m.duration)
                .map(|d| d.as_secs() as i64);

            Some(EpisodeDescriptor {
                episode_guid: entry.id,
                title,
                published_at,
                duration_seconds,
                content_url,
                description,
            })
        })
        .collect();

    Ok(descriptors)
}

/// YouTube's own feed format is Atom but with `yt:videoId` entries whose ids
/// must match the 11-character video-id grammar; entries that don't match
/// are dropped rather than erroring, since YouTube occasionally injects
/// non-video entries (playlist markers) into channel feeds (§4.2).
fn parse_youtube_feed(body: &str) -> Result<Vec<EpisodeDescriptor>> {
    let descriptors = parse_generic_feed(body)?;
    Ok(descriptors
        .into_iter()
        .filter(|d| {
            let candidate = d.episode_guid.rsplit(':').next().unwrap_or(&d.episode_guid);
            youtube_id_re().is_match(candidate)
        })
        .map(|mut d| {
            if let Some(candidate) = d.episode_guid.rsplit(':').next() {
                if youtube_id_re().is_match(candidate) {
                    let id = candidate.to_string();
                    d.content_url
                        .get_or_insert_with(|| format!("https://www.youtube.com/watch?v={id}"));
                }
            }
            d
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_youtube_feed_urls() {
        assert!(is_youtube_feed(
            "https://www.youtube.com/feeds/videos.xml?channel_id=UCabc123"
        ));
        assert!(!is_youtube_feed("https://example.com/rss.xml"));
    }

    #[test]
    fn extracts_channel_id() {
        assert_eq!(
            extract_channel_id("https://www.youtube.com/feeds/videos.xml?channel_id=UCabc123"),
            Some("UCabc123".to_string())
        );
        assert_eq!(extract_channel_id("https://example.com/rss.xml"), None);
    }

    #[test]
    fn validates_youtube_id_grammar() {
        assert!(youtube_id_re().is_match("dQw4w9WgXcQ"));
        assert!(!youtube_id_re().is_match("too-short"));
        assert!(!youtube_id_re().is_match("has a space!"));
    }
}
