use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// §3: the closed set of functional categories an arc may be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalCategory {
    ModelRelease,
    CompanyStrategy,
    Research,
    Regulation,
    ProductLaunch,
    Partnership,
    Controversy,
    IndustryTrend,
    Technique,
    UseCase,
    Other,
}

impl FunctionalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionalCategory::ModelRelease => "model_release",
            FunctionalCategory::CompanyStrategy => "company_strategy",
            FunctionalCategory::Research => "research",
            FunctionalCategory::Regulation => "regulation",
            FunctionalCategory::ProductLaunch => "product_launch",
            FunctionalCategory::Partnership => "partnership",
            FunctionalCategory::Controversy => "controversy",
            FunctionalCategory::IndustryTrend => "industry_trend",
            FunctionalCategory::Technique => "technique",
            FunctionalCategory::UseCase => "use_case",
            FunctionalCategory::Other => "other",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "model_release" => FunctionalCategory::ModelRelease,
            "company_strategy" => FunctionalCategory::CompanyStrategy,
            "research" => FunctionalCategory::Research,
            "regulation" => FunctionalCategory::Regulation,
            "product_launch" => FunctionalCategory::ProductLaunch,
            "partnership" => FunctionalCategory::Partnership,
            "controversy" => FunctionalCategory::Controversy,
            "industry_trend" => FunctionalCategory::IndustryTrend,
            "technique" => FunctionalCategory::Technique,
            "use_case" => FunctionalCategory::UseCase,
            _ => FunctionalCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Positive,
    Negative,
    Neutral,
    Analytical,
}

impl Perspective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Perspective::Positive => "positive",
            Perspective::Negative => "negative",
            Perspective::Neutral => "neutral",
            Perspective::Analytical => "analytical",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "positive" => Perspective::Positive,
            "negative" => Perspective::Negative,
            "analytical" => Perspective::Analytical,
            _ => Perspective::Neutral,
        }
    }
}

/// §3: StoryArc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryArc {
    pub id: Uuid,
    pub arc_name: String,
    pub arc_slug: String,
    pub functional_category: FunctionalCategory,
    pub digest_topic: String,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub event_count: i32,
    pub source_count: i32,
    pub included_in_digest_id: Option<Uuid>,
    pub included_at: Option<DateTime<Utc>>,
    /// Eagerly loaded by [`crate::arc_store::ArcStore::active_arcs`]; empty
    /// otherwise.
    pub events: Vec<StoryArcEvent>,
}

/// §3: StoryArcEvent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryArcEvent {
    pub id: Uuid,
    pub arc_id: Uuid,
    pub event_date: DateTime<Utc>,
    pub event_summary: String,
    pub key_points: Vec<String>,
    pub source_feed_id: Uuid,
    pub source_episode_id: Uuid,
    pub source_episode_guid: String,
    pub source_display_name: String,
    pub perspective: Perspective,
    pub relevance_score: f64,
    pub extracted_at: DateTime<Utc>,
}

/// Normalizes a human-readable arc name into its slug form: lowercase,
/// non-alphanumerics collapsed to `-`, length-bounded (§3).
pub fn normalize_arc_slug(name: &str) -> String {
    const MAX_LEN: usize = 80;
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug.truncate(MAX_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_normalization() {
        assert_eq!(normalize_arc_slug("GPT-5 Development"), "gpt-5-development");
        assert_eq!(
            normalize_arc_slug("OpenAI's GPT-5 Development!!"),
            "openai-s-gpt-5-development"
        );
        assert_eq!(normalize_arc_slug("   leading spaces"), "leading-spaces");
    }

    #[test]
    fn category_round_trips() {
        for cat in [
            FunctionalCategory::ModelRelease,
            FunctionalCategory::CompanyStrategy,
            FunctionalCategory::Other,
        ] {
            assert_eq!(FunctionalCategory::from_str_loose(cat.as_str()).as_str(), cat.as_str());
        }
    }
}
