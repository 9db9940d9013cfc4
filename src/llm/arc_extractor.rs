//! Story-arc extractor (C5, §4.5).

use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::Result;
use crate::llm::client::OpenAiClient;
use crate::llm::schema::StructuredOutput;
use crate::models::episode::Episode;
use crate::models::story_arc::{normalize_arc_slug, FunctionalCategory, Perspective};

/// Spec-level constants (§4.5), not user-tunable.
pub const MAX_ARCS_IN_VIEW: usize = 15;
pub const MAX_EVENTS_PER_ARC_CONTEXT: usize = 5;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ArcEntry {
    pub arc_name: String,
    pub event_summary: String,
    pub key_points: Vec<String>,
    pub category: String,
    pub perspective: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ArcExtractionResponse {
    pub continuing_arcs: Vec<ArcEntry>,
    pub new_arcs: Vec<ArcEntry>,
}

/// A classified arc entry, ready to be applied via C6.
pub struct ResolvedArcEvent {
    pub arc_name: String,
    pub arc_slug: String,
    pub event_summary: String,
    pub key_points: Vec<String>,
    pub category: FunctionalCategory,
    pub perspective: Perspective,
    /// True if this entry should create a new arc; false to append to an
    /// existing one found by slug.
    pub is_new: bool,
}

pub struct ArcExtractor<'a> {
    client: &'a OpenAiClient,
    model: String,
    max_arcs_per_episode: usize,
}

impl<'a> ArcExtractor<'a> {
    pub fn new(client: &'a OpenAiClient, model: impl Into<String>, max_arcs_per_episode: usize) -> Self {
        Self {
            client,
            model: model.into(),
            max_arcs_per_episode,
        }
    }

    pub async fn extract(
        &self,
        episode: &Episode,
        digest_topic: &str,
        active_arcs_view: &str,
        existing_slugs: &[String],
    ) -> Result<Vec<ResolvedArcEvent>> {
        let transcript_excerpt: String = episode
            .transcript_text
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(6000)
            .collect();

        let system_prompt = format!(
            "You track evolving news story arcs for the topic \"{digest_topic}\". \
             Given the transcript of a new episode and a summary of currently active \
             arcs, decide which arcs this episode continues and which new arcs it \
             introduces. Each entry needs 1 to 4 key points, a functional category, \
             and a perspective (positive, negative, neutral, or analytical).\n\n\
             Active arcs:\n{active_arcs_view}"
        );
        let user_prompt = format!(
            "Episode title: {}\n\nTranscript excerpt:\n{transcript_excerpt}",
            episode.title
        );

        let response: ArcExtractionResponse = self
            .client
            .extract(&self.model, &system_prompt, &user_prompt)
            .await?;

        Ok(self.resolve(response, existing_slugs))
    }

    /// §4.5 policy: reclassify continuing/new entries against the actual
    /// slug set, then cap at `max_arcs_per_episode`, dropping from `new`
    /// first.
    fn resolve(&self, response: ArcExtractionResponse, existing_slugs: &[String]) -> Vec<ResolvedArcEvent> {
        let to_resolved = |entry: ArcEntry, claimed_continuing: bool| {
            let slug = normalize_arc_slug(&entry.arc_name);
            let exists = existing_slugs.iter().any(|s| s == &slug);
            ResolvedArcEvent {
                arc_name: entry.arc_name,
                arc_slug: slug,
                event_summary: entry.event_summary,
                key_points: entry.key_points.into_iter().take(4).collect(),
                category: FunctionalCategory::from_str_loose(&entry.category),
                perspective: Perspective::from_str_loose(&entry.perspective),
                // A "continuing" entry whose slug doesn't resolve becomes
                // new; a "new" entry whose slug collides becomes continuing.
                is_new: if claimed_continuing { !exists } else { !exists },
            }
        };

        let mut continuing: Vec<ResolvedArcEvent> = response
            .continuing_arcs
            .into_iter()
            .map(|e| to_resolved(e, true))
            .collect();
        let mut new: Vec<ResolvedArcEvent> = response
            .new_arcs
            .into_iter()
            .map(|e| to_resolved(e, false))
            .collect();

        let mut combined: Vec<ResolvedArcEvent> = Vec::with_capacity(continuing.len() + new.len());
        combined.append(&mut continuing);
        let remaining_budget = self.max_arcs_per_episode.saturating_sub(combined.len());
        new.truncate(remaining_budget);
        combined.append(&mut new);
        combined.truncate(self.max_arcs_per_episode);
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ArcEntry {
        ArcEntry {
            arc_name: name.to_string(),
            event_summary: "summary".to_string(),
            key_points: vec!["point".to_string()],
            category: "model_release".to_string(),
            perspective: "neutral".to_string(),
        }
    }

    fn extractor() -> ArcExtractor<'static> {
        // Not used for network calls in these tests; client is never
        // dereferenced by `resolve`.
        ArcExtractor {
            client: Box::leak(Box::new(OpenAiClient::new("unused"))),
            model: "test-model".to_string(),
            max_arcs_per_episode: 3,
        }
    }

    #[test]
    fn unresolvable_continuing_entry_becomes_new() {
        let ex = extractor();
        let response = ArcExtractionResponse {
            continuing_arcs: vec![entry("Unknown Arc")],
            new_arcs: vec![],
        };
        let resolved = ex.resolve(response, &[]);
        assert!(resolved[0].is_new);
    }

    #[test]
    fn colliding_new_entry_becomes_continuing() {
        let ex = extractor();
        let response = ArcExtractionResponse {
            continuing_arcs: vec![],
            new_arcs: vec![entry("Existing Arc")],
        };
        let slug = normalize_arc_slug("Existing Arc");
        let resolved = ex.resolve(response, &[slug]);
        assert!(!resolved[0].is_new);
    }

    #[test]
    fn caps_combined_total_dropping_new_first() {
        let ex = extractor();
        let response = ArcExtractionResponse {
            continuing_arcs: vec![entry("C1"), entry("C2"), entry("C3")],
            new_arcs: vec![entry("N1"), entry("N2")],
        };
        let resolved = ex.resolve(response, &[]);
        assert_eq!(resolved.len(), 3);
        assert!(resolved.iter().all(|r| r.arc_name.starts_with('C')));
    }
}
