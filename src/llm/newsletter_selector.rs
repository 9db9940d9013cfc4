//! Newsletter content selector (C10, §4.10).

use schemars::JsonSchema;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::client::OpenAiClient;
use crate::models::episode::Episode;
use crate::models::newsletter::{NewsletterExample, NewsletterIssue};

const CANDIDATE_LIMIT: usize = 20;
const PROMPT_LIMIT: usize = 10;
const TRANSCRIPT_EXCERPT_CHARS: usize = 8000;
const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct RawExample {
    title: String,
    description: String,
    how_to_replicate: String,
    why_useful: String,
    source_episode_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct SelectionResponse {
    big_news: Option<String>,
    examples: Vec<RawExample>,
}

pub struct SelectedIssue {
    pub issue: NewsletterIssue,
    pub examples: Vec<NewsletterExample>,
}

pub struct NewsletterSelector<'a> {
    client: &'a OpenAiClient,
    model: String,
}

impl<'a> NewsletterSelector<'a> {
    pub fn new(client: &'a OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// `candidates` must already be filtered to `status = scored`,
    /// `scores["AI and Technology"] >= 0.7`, scored within the window, and
    /// sorted by score descending (§4.10) — this only enforces the
    /// candidate/prompt-inclusion limits and truncation.
    pub async fn select(
        &self,
        issue_date: chrono::NaiveDate,
        candidates: &[Episode],
    ) -> Result<SelectedIssue> {
        let top_candidates: Vec<&Episode> = candidates.iter().take(CANDIDATE_LIMIT).collect();
        let prompt_candidates: Vec<&Episode> = top_candidates.iter().take(PROMPT_LIMIT).copied().collect();

        let transcripts_block = prompt_candidates
            .iter()
            .map(|ep| {
                let excerpt: String = ep
                    .transcript_text
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(TRANSCRIPT_EXCERPT_CHARS)
                    .collect();
                format!("### Episode {} — {}\n{excerpt}", ep.id, ep.title)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let system_prompt = "You curate a newsletter of practical AI examples from recent \
            podcast/video transcripts. Select up to 5 concrete, actionable examples worth \
            sharing, each with a title, description, how to replicate it, and why it's \
            useful. Optionally name one piece of big news from across the transcripts. \
            Reference episodes by their UUID exactly as given.";
        let user_prompt = format!("Transcripts:\n\n{transcripts_block}");

        let response: SelectionResponse = self
            .client
            .extract(&self.model, system_prompt, &user_prompt)
            .await?;

        let examples: Vec<RawExample> = response.examples.into_iter().take(MAX_EXAMPLES).collect();
        let example_count = examples.len();

        let issue_id = Uuid::new_v4();
        let subject_line = subject_line(response.big_news.is_some(), example_count);

        let issue = NewsletterIssue {
            id: issue_id,
            issue_date,
            subject_line,
            big_news_summary: response.big_news,
            generated_at: chrono::Utc::now(),
            sent_at: None,
        };

        let resolved_examples = examples
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let source = candidates.iter().find(|e| e.id == raw.source_episode_id);
                NewsletterExample {
                    id: Uuid::new_v4(),
                    issue_id,
                    position: (i + 1) as i32,
                    title: raw.title,
                    description: raw.description,
                    how_to_replicate: raw.how_to_replicate,
                    source_episode_id: raw.source_episode_id,
                    source_title: source.map(|e| e.title.clone()),
                    source_url: source.and_then(|e| e.content_url.clone()),
                }
            })
            .collect();

        Ok(SelectedIssue {
            issue,
            examples: resolved_examples,
        })
    }
}

/// §4.10: subject line is computed deterministically, not by the LLM.
fn subject_line(has_big_news: bool, example_count: usize) -> String {
    match (has_big_news, example_count) {
        (true, 0) => "This week in AI: the big story".to_string(),
        (true, n) => format!("This week in AI: the big story + {n} examples to try"),
        (false, 0) => "This week in AI".to_string(),
        (false, n) => format!("This week in AI: {n} examples to try"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_line_reflects_content_shape() {
        assert_eq!(subject_line(true, 3), "This week in AI: the big story + 3 examples to try");
        assert_eq!(subject_line(false, 0), "This week in AI");
        assert_eq!(subject_line(true, 0), "This week in AI: the big story");
        assert_eq!(subject_line(false, 5), "This week in AI: 5 examples to try");
    }
}
