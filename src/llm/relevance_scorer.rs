//! Relevance scorer (C4, §4.4).

use std::collections::HashMap;

use crate::error::Result;
use crate::llm::client::OpenAiClient;
use crate::models::topic::Topic;

const DEFAULT_TRANSCRIPT_CHARS: usize = 4000;
const TRIM_THRESHOLD_CHARS: usize = 500;
const TRIM_FRACTION: f64 = 0.05;

const BANDING_RUBRIC: &str = "Score each topic from 0.0 to 1.0 using this rubric: \
0.0-0.3 = not relevant, 0.4-0.6 = somewhat relevant, 0.7-0.8 = highly relevant, \
0.9-1.0 = the central subject of the episode.";

pub struct RelevanceScorer<'a> {
    client: &'a OpenAiClient,
    model: String,
    transcript_chars: usize,
}

pub struct ScoreOutcome {
    pub scores: HashMap<String, f64>,
    pub processing_ms: u128,
}

impl<'a> RelevanceScorer<'a> {
    pub fn new(client: &'a OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            transcript_chars: DEFAULT_TRANSCRIPT_CHARS,
        }
    }

    pub fn with_transcript_chars(mut self, n: usize) -> Self {
        self.transcript_chars = n;
        self
    }

    pub async fn score(&self, transcript_text: &str, topics: &[Topic]) -> Result<ScoreOutcome> {
        let started = std::time::Instant::now();
        let trimmed = trim_ad_segments(transcript_text);
        let excerpt: String = trimmed.chars().take(self.transcript_chars).collect();

        let topic_block = topics
            .iter()
            .map(|t| format!("- {}: {}", t.display_name, t.description))
            .collect::<Vec<_>>()
            .join("\n");

        let system_prompt = format!(
            "You score podcast/video transcripts for relevance against a fixed set of topics.\n\
             {BANDING_RUBRIC}\n\
             Topics:\n{topic_block}"
        );
        let user_prompt = format!("Transcript excerpt:\n\n{excerpt}");

        // The schema cannot be statically derived since the topic set is
        // data, not a compile-time type — build it by hand instead of going
        // through StructuredOutput.
        let schema = dynamic_score_schema(topics);

        let raw = self
            .client
            .extract_raw(&self.model, &system_prompt, &user_prompt, schema, "topic_scores")
            .await?;

        let parsed: HashMap<String, serde_json::Value> =
            serde_json::from_value(raw).unwrap_or_default();

        let scores = topics
            .iter()
            .map(|t| {
                let value = parsed
                    .get(&t.display_name)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                (t.display_name.clone(), value.clamp(0.0, 1.0))
            })
            .collect();

        Ok(ScoreOutcome {
            scores,
            processing_ms: started.elapsed().as_millis(),
        })
    }
}

fn dynamic_score_schema(topics: &[Topic]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = topics
        .iter()
        .map(|t| {
            (
                t.display_name.clone(),
                serde_json::json!({ "type": "number", "minimum": 0.0, "maximum": 1.0 }),
            )
        })
        .collect();
    let required: Vec<String> = topics.iter().map(|t| t.display_name.clone()).collect();

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// §4.4: trim the first and last 5% of the transcript (presumed ad reads)
/// once it is long enough that doing so won't gut the content.
fn trim_ad_segments(text: &str) -> &str {
    if text.len() < TRIM_THRESHOLD_CHARS {
        return text;
    }
    let chars: Vec<char> = text.chars().collect();
    let trim_count = ((chars.len() as f64) * TRIM_FRACTION).floor() as usize;
    let start_byte: usize = chars[..trim_count].iter().collect::<String>().len();
    let end_byte = text.len() - chars[chars.len() - trim_count..].iter().collect::<String>().len();
    &text[start_byte..end_byte]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_short_transcripts_untouched() {
        let text = "short transcript under the threshold";
        assert_eq!(trim_ad_segments(text), text);
    }

    #[test]
    fn trims_long_transcripts_on_both_ends() {
        let text = "x".repeat(2000);
        let trimmed = trim_ad_segments(&text);
        assert!(trimmed.len() < text.len());
    }
}
