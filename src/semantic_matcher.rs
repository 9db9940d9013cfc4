//! Semantic matcher (C7, §4.7).
//!
//! Generates embeddings through the configured OpenAI model, caches them by
//! a truncated input prefix, and exposes cosine-similarity-based matching
//! plus union-find duplicate grouping.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::OpenAiClient;

const CACHE_KEY_CHARS: usize = 500;
const EMBEDDING_INPUT_CHARS: usize = 8000;
const MAX_CACHE_ENTRIES: usize = 1000;

pub struct SemanticMatcher {
    client: Arc<OpenAiClient>,
    model: String,
    cache: Arc<RwLock<HashMap<String, Vec<f32>>>>,
}

/// Anything that can be matched/deduped: a name, key points, the topic it
/// belongs to, and the metadata used to order duplicate groups.
#[derive(Debug, Clone)]
pub struct MatchableItem {
    pub id: Uuid,
    pub name: String,
    pub key_points: Vec<String>,
    pub digest_topic: String,
    pub first_mentioned_at: DateTime<Utc>,
    pub mention_count: i32,
}

pub struct Match {
    pub item_id: Uuid,
    pub similarity: f32,
}

impl SemanticMatcher {
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn to_text(item: &MatchableItem) -> String {
        if item.key_points.is_empty() {
            item.name.clone()
        } else {
            format!("{}: {}", item.name, item.key_points.join("; "))
        }
    }

    pub async fn embed(&self, item: &MatchableItem) -> Result<Vec<f32>> {
        self.embed_text(&Self::to_text(item)).await
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let cache_key: String = text.chars().take(CACHE_KEY_CHARS).collect();

        if let Some(cached) = self.cache.read().await.get(&cache_key) {
            return Ok(cached.clone());
        }

        let truncated: String = text.chars().take(EMBEDDING_INPUT_CHARS).collect();
        let embedding = self.client.embed(&self.model, &truncated).await?;

        let mut cache = self.cache.write().await;
        if cache.len() >= MAX_CACHE_ENTRIES {
            // Bounded cache, no eviction policy beyond a hard size cap —
            // clear and start fresh rather than track LRU order.
            cache.clear();
        }
        cache.insert(cache_key, embedding.clone());

        Ok(embedding)
    }

    /// §4.7: highest-similarity existing item above `threshold`, optionally
    /// restricted to the same `digest_topic`.
    pub async fn find_match(
        &self,
        candidate: &MatchableItem,
        existing: &[MatchableItem],
        digest_topic: Option<&str>,
        threshold: f32,
    ) -> Result<Option<Match>> {
        let candidate_vec = self.embed(candidate).await?;
        let mut best: Option<Match> = None;

        for item in existing {
            if item.id == candidate.id {
                continue;
            }
            if let Some(topic) = digest_topic {
                if item.digest_topic != topic {
                    continue;
                }
            }
            let item_vec = self.embed(item).await?;
            let similarity = cosine_similarity(&candidate_vec, &item_vec);
            if similarity >= threshold {
                match &best {
                    Some(b) if b.similarity >= similarity => {}
                    _ => {
                        best = Some(Match {
                            item_id: item.id,
                            similarity,
                        })
                    }
                }
            }
        }

        Ok(best)
    }

    /// §4.7: union-find over the pairwise similarity graph at `threshold`;
    /// groups of size >= 2, sorted canonical-first within each group.
    pub async fn duplicate_groups(
        &self,
        items: &[MatchableItem],
        threshold: f32,
    ) -> Result<Vec<Vec<MatchableItem>>> {
        let mut embeddings = Vec::with_capacity(items.len());
        for item in items {
            embeddings.push(self.embed(item).await?);
        }

        let mut uf = UnionFind::new(items.len());
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if cosine_similarity(&embeddings[i], &embeddings[j]) >= threshold {
                    uf.union(i, j);
                }
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..items.len() {
            groups.entry(uf.find(i)).or_default().push(i);
        }

        let mut result: Vec<Vec<MatchableItem>> = groups
            .into_values()
            .filter(|g| g.len() >= 2)
            .map(|indices| {
                let mut group: Vec<MatchableItem> =
                    indices.into_iter().map(|i| items[i].clone()).collect();
                group.sort_by(|a, b| {
                    a.first_mentioned_at
                        .cmp(&b.first_mentioned_at)
                        .then(b.mention_count.cmp(&a.mention_count))
                });
                group
            })
            .collect();

        result.sort_by_key(|g| g[0].first_mentioned_at);
        Ok(result)
    }
}

/// §4.7: zero-norm vectors yield similarity 0.0 rather than NaN/panic.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_norm_vector_yields_zero_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn identical_vectors_are_fully_similar() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn union_find_groups_transitively() {
        let mut uf = UnionFind::new(4);
        uf.union(0, 1);
        uf.union(1, 2);
        assert_eq!(uf.find(0), uf.find(2));
        assert_ne!(uf.find(0), uf.find(3));
    }
}
