//! Transcript acquisition (C3, §4.3).
//!
//! Two interchangeable backends (YouTube captions, audio-chunk
//! transcription) behind one trait, mirroring podscrape2's split between
//! `subtitle_parser.py` (caption scraping) and `ytdlp_fetcher.py` +
//! Whisper-style chunked transcription for everything else. The orchestrator
//! tries sources in order and keeps the first `Ok` outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Outcome of a single transcript source attempt (§4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptOutcome {
    Ok {
        text: String,
        word_count: i32,
        language: String,
        auto_generated: bool,
    },
    /// The source has no transcript for this episode and never will —
    /// callers should try the next source, not retry this one.
    NotAvailable { reason: String },
    /// The source failed for a reason that may clear on a later run.
    Transient { reason: String },
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, content_url: &str, episode_guid: &str) -> Result<TranscriptOutcome>;
}

/// Picks the best of two available transcript candidates per §4.3's
/// preference order: manually-created over auto-generated, English over
/// other languages, ties broken by longer text.
pub fn prefer(a: TranscriptOutcome, b: TranscriptOutcome) -> TranscriptOutcome {
    match (&a, &b) {
        (
            TranscriptOutcome::Ok {
                auto_generated: auto_a,
                language: lang_a,
                text: text_a,
                ..
            },
            TranscriptOutcome::Ok {
                auto_generated: auto_b,
                language: lang_b,
                text: text_b,
                ..
            },
        ) => {
            if *auto_a != *auto_b {
                return if !*auto_a { a } else { b };
            }
            let a_is_en = lang_a.eq_ignore_ascii_case("en");
            let b_is_en = lang_b.eq_ignore_ascii_case("en");
            if a_is_en != b_is_en {
                return if a_is_en { a } else { b };
            }
            if text_a.len() >= text_b.len() {
                a
            } else {
                b
            }
        }
        (TranscriptOutcome::Ok { .. }, _) => a,
        (_, TranscriptOutcome::Ok { .. }) => b,
        _ => a,
    }
}

/// Estimates spoken duration from transcript word count at ~150 words per
/// minute (§4.3), used when the feed entry carries no explicit duration.
pub fn estimate_duration_seconds(word_count: i32) -> i64 {
    const WORDS_PER_MINUTE: f64 = 150.0;
    ((word_count as f64 / WORDS_PER_MINUTE) * 60.0).round() as i64
}

pub fn word_count(text: &str) -> i32 {
    text.split_whitespace().count() as i32
}

/// Records when a transcript was acquired; kept separate from the episode
/// model so the orchestrator can timestamp it itself rather than trusting a
/// source's clock.
pub fn acquired_now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(text: &str, auto: bool, lang: &str) -> TranscriptOutcome {
        TranscriptOutcome::Ok {
            text: text.to_string(),
            word_count: word_count(text),
            language: lang.to_string(),
            auto_generated: auto,
        }
    }

    #[test]
    fn prefers_manual_over_auto_generated() {
        let manual = ok("hello world", false, "en");
        let auto = ok("hello world extended", true, "en");
        assert_eq!(prefer(manual.clone(), auto), manual);
    }

    #[test]
    fn prefers_english_when_generation_tier_ties() {
        let en = ok("hello", true, "en");
        let fr = ok("bonjour le monde", true, "fr");
        assert_eq!(prefer(fr, en.clone()), en);
    }

    #[test]
    fn prefers_longer_text_on_full_tie() {
        let short = ok("hello", false, "en");
        let long = ok("hello there friend", false, "en");
        assert_eq!(prefer(short, long.clone()), long);
    }

    #[test]
    fn estimates_duration_from_word_count() {
        assert_eq!(estimate_duration_seconds(150), 60);
        assert_eq!(estimate_duration_seconds(75), 30);
    }
}
