//! Semantic prompt cache: exact SHA-256 match first, cosine-similarity
//! embedding fallback second, LRU-bounded. Optionally durable: when
//! constructed with a database connection, entries survive a restart in the
//! `prompt_cache_entries` table; lookups and similarity search still run
//! entirely against the in-memory map, since scoring every embedding is not
//! something SQL is asked to do here.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::database::DatabaseConnection;
use crate::domain_types::{CacheCapacity, PromptHash, RequestText};
use crate::orchestrator::traits::{
    CacheError, CachedPromptEntry, EmbeddingClient, PromptCache, PromptCacheStats, RoutingDecision,
};

/// Normalizes prompt text the same way before hashing and embedding: trim,
/// lowercase, collapse internal whitespace, strip trailing punctuation.
pub fn normalize(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ','))
        .to_string()
}

fn hash_of(normalized: &str) -> PromptHash {
    let digest = Sha256::digest(normalized.as_bytes());
    PromptHash::try_new(hex_encode(&digest)).expect("sha256 digest is always 64 hex chars")
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String cannot fail");
    }
    out
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

struct Record {
    entry: CachedPromptEntry,
    last_hit_order: u64,
}

/// Default implementation of [`PromptCache`].
pub struct PromptCacheImpl {
    embedder: Arc<dyn EmbeddingClient>,
    entries: DashMap<PromptHash, Record>,
    capacity: CacheCapacity,
    similarity_threshold: f64,
    clock: AtomicU64,
    exact_hits: AtomicU64,
    semantic_hits: AtomicU64,
    misses: AtomicU64,
    db: Option<DatabaseConnection>,
}

impl PromptCacheImpl {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, capacity: CacheCapacity, similarity_threshold: f64) -> Self {
        Self {
            embedder,
            entries: DashMap::new(),
            capacity,
            similarity_threshold,
            clock: AtomicU64::new(0),
            exact_hits: AtomicU64::new(0),
            semantic_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            db: None,
        }
    }

    /// Builds a cache backed by `prompt_cache_entries`, hydrating the
    /// in-memory map from whatever survived the last restart.
    pub async fn with_persistence(
        embedder: Arc<dyn EmbeddingClient>,
        capacity: CacheCapacity,
        similarity_threshold: f64,
        db: DatabaseConnection,
    ) -> Result<Self, CacheError> {
        let mut cache = Self::new(embedder, capacity, similarity_threshold);
        let rows: Vec<(String, String, String, String, i64)> = sqlx::query_as(
            "SELECT hash, normalized_text, embedding, decision, hit_count FROM prompt_cache_entries",
        )
        .fetch_all(db.pool())
        .await
        .map_err(|e| CacheError::Persistence(e.to_string()))?;

        for (order, (hash, normalized_text, embedding_json, decision_json, hit_count)) in rows.into_iter().enumerate() {
            let Ok(hash) = PromptHash::try_new(hash) else { continue };
            let Ok(embedding) = serde_json::from_str::<Vec<f32>>(&embedding_json) else { continue };
            let Ok(decision) = serde_json::from_str::<RoutingDecision>(&decision_json) else { continue };
            cache.entries.insert(
                hash.clone(),
                Record {
                    entry: CachedPromptEntry {
                        normalized_text,
                        hash,
                        embedding,
                        decision,
                        hit_count: u64::try_from(hit_count).unwrap_or(0),
                    },
                    last_hit_order: u64::try_from(order).unwrap_or(u64::MAX),
                },
            );
        }
        cache.clock = AtomicU64::new(u64::try_from(cache.entries.len()).unwrap_or(u64::MAX));
        cache.db = Some(db);
        Ok(cache)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_if_over_capacity(&self) {
        if self.entries.len() <= self.capacity.as_usize() {
            return;
        }
        // Evict the single least-recently-hit entry; called after every
        // insert so at most one entry is ever over budget.
        if let Some(oldest_key) = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_hit_order)
            .map(|entry| entry.key().clone())
        {
            self.entries.remove(&oldest_key);
            if let Some(db) = &self.db {
                let db = db.clone();
                let key = oldest_key.to_string();
                tokio::spawn(async move {
                    if let Err(e) = sqlx::query("DELETE FROM prompt_cache_entries WHERE hash = ?1")
                        .bind(key)
                        .execute(db.pool())
                        .await
                    {
                        warn!(error = %e, "failed to evict prompt cache entry from storage");
                    }
                });
            }
        }
    }

    async fn persist(&self, record: &Record) {
        let Some(db) = &self.db else { return };
        let Ok(embedding_json) = serde_json::to_string(&record.entry.embedding) else { return };
        let Ok(decision_json) = serde_json::to_string(&record.entry.decision) else { return };
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO prompt_cache_entries
                 (hash, normalized_text, embedding, decision, hit_count, created_at, last_hit_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(hash) DO UPDATE SET
                 decision = excluded.decision,
                 hit_count = excluded.hit_count,
                 last_hit_at = excluded.last_hit_at",
        )
        .bind(record.entry.hash.to_string())
        .bind(&record.entry.normalized_text)
        .bind(embedding_json)
        .bind(decision_json)
        .bind(i64::try_from(record.entry.hit_count).unwrap_or(i64::MAX))
        .bind(now)
        .execute(db.pool())
        .await;

        if let Err(e) = result {
            warn!(error = %e, "failed to persist prompt cache entry");
        }
    }
}

#[async_trait]
impl PromptCache for PromptCacheImpl {
    async fn lookup(&self, prompt: &RequestText) -> Option<RoutingDecision> {
        let normalized = normalize(prompt.as_ref());
        let hash = hash_of(&normalized);

        if let Some(mut record) = self.entries.get_mut(&hash) {
            record.entry.hit_count += 1;
            record.last_hit_order = self.tick();
            self.exact_hits.fetch_add(1, Ordering::Relaxed);
            let mut decision = record.entry.decision.clone();
            decision.provenance = crate::orchestrator::traits::CacheProvenance::Exact;
            return Some(decision);
        }

        let Ok(embedding) = self.embedder.embed(&normalized).await else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let best = self
            .entries
            .iter()
            .map(|entry| {
                let score = cosine_similarity(&embedding, &entry.value().entry.embedding);
                (entry.key().clone(), score)
            })
            .filter(|(_, score)| f64::from(*score) >= self.similarity_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((key, _)) = best {
            if let Some(mut record) = self.entries.get_mut(&key) {
                record.entry.hit_count += 1;
                record.last_hit_order = self.tick();
                self.semantic_hits.fetch_add(1, Ordering::Relaxed);
                let mut decision = record.entry.decision.clone();
                decision.provenance = crate::orchestrator::traits::CacheProvenance::Semantic;
                return Some(decision);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn store(&self, prompt: &RequestText, decision: RoutingDecision) {
        let normalized = normalize(prompt.as_ref());
        let hash = hash_of(&normalized);

        if let Some(to_persist) = {
            let mut existing = self.entries.get_mut(&hash);
            if let Some(existing) = existing.as_mut() {
                existing.entry.decision = decision.clone();
                existing.last_hit_order = self.tick();
            }
            existing.map(|entry| Record {
                entry: entry.entry.clone(),
                last_hit_order: entry.last_hit_order,
            })
        } {
            self.persist(&to_persist).await;
            return;
        }

        let embedding = self.embedder.embed(&normalized).await.unwrap_or_default();
        let order = self.tick();
        let record = Record {
            entry: CachedPromptEntry {
                normalized_text: normalized,
                hash: hash.clone(),
                embedding,
                decision,
                hit_count: 0,
            },
            last_hit_order: order,
        };
        self.persist(&record).await;
        self.entries.insert(hash, record);
        self.evict_if_over_capacity();
    }

    fn stats(&self) -> PromptCacheStats {
        PromptCacheStats {
            entries: self.entries.len(),
            exact_hits: self.exact_hits.load(Ordering::Relaxed),
            semantic_hits: self.semantic_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// A deterministic embedding client for tests: maps normalized text to a
/// small hash-derived vector so exact and near-duplicate prompts behave
/// predictably without calling out to a real provider.
pub struct DeterministicEmbeddingClient;

#[async_trait]
impl EmbeddingClient for DeterministicEmbeddingClient {
    async fn embed(&self, normalized_text: &str) -> Result<Vec<f32>, CacheError> {
        let digest = Sha256::digest(normalized_text.as_bytes());
        Ok(digest.iter().take(16).map(|b| f32::from(*b) / 255.0).collect())
    }
}
