//! History Store — persisted refinement results keyed by request
//! fingerprint.
//!
//! The fingerprint covers the request's semantic content (task type,
//! requirements, context) and deliberately excludes `request_id`, so
//! resubmitting the same work dedupes onto one record. Writes are
//! score-monotonic: a stored record is only ever replaced by a strictly
//! higher-scoring artifact.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{Artifact, Request, TaskType};

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileHistory;
pub use memory::InMemoryHistory;

// ────────────────────────────────────────────────────────────────────────────
// Fingerprinting
// ────────────────────────────────────────────────────────────────────────────

/// Hex-encoded SHA-256 over a request's semantic content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The dedup key covers task type, requirements, and context only; two
/// requests that differ in `request_id` or `constraints` (or context
/// insertion order) fingerprint identically. Fields are length-prefixed so
/// no two distinct requests can collide by concatenation.
pub fn fingerprint_for(request: &Request) -> Fingerprint {
    let mut hasher = Sha256::new();

    let mut feed = |part: &str| {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    };

    feed(request.task_type.as_str());
    feed(&request.requirements);
    // BTreeMap iterates in key order, so this is insertion-order independent.
    for (key, value) in &request.context {
        feed(key);
        feed(value);
    }

    Fingerprint(hex::encode(hasher.finalize()))
}

const TAG_KEYWORDS: [&str; 6] = [
    "data analysis",
    "image recognition",
    "text processing",
    "api",
    "test",
    "requirements",
];

/// Searchable labels for a record: the task type plus any keywords found
/// in the requirements text.
pub fn extract_tags(request: &Request) -> Vec<String> {
    let mut tags = vec![request.task_type.as_str().to_string()];
    let text = request.requirements.to_lowercase();
    for keyword in TAG_KEYWORDS {
        if text.contains(keyword) {
            tags.push(keyword.to_string());
        }
    }
    tags
}

// ────────────────────────────────────────────────────────────────────────────
// Records and queries
// ────────────────────────────────────────────────────────────────────────────

/// One persisted refinement result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub fingerprint: Fingerprint,
    pub task_type: TaskType,
    pub artifact: Artifact,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

impl HistoryRecord {
    pub fn new(request: &Request, artifact: Artifact) -> Self {
        Self {
            fingerprint: fingerprint_for(request),
            task_type: request.task_type,
            artifact,
            created_at: Utc::now(),
            tags: extract_tags(request),
        }
    }

    pub fn overall(&self) -> f64 {
        self.artifact.overall()
    }
}

/// What `put` did with the offered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No prior record for this fingerprint.
    Inserted,
    /// Strictly higher overall score; the old record was replaced.
    Upgraded,
    /// The stored record scored at least as high; nothing changed.
    Kept,
}

/// Conjunctive search filter; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub task_type: Option<TaskType>,
    pub tag: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_overall: Option<f64>,
}

impl HistoryQuery {
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        if self.task_type.is_some_and(|t| t != record.task_type) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !record.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if self.since.is_some_and(|s| record.created_at < s) {
            return false;
        }
        if self.until.is_some_and(|u| record.created_at > u) {
            return false;
        }
        if self.min_overall.is_some_and(|m| record.overall() < m) {
            return false;
        }
        true
    }
}

/// Aggregate view over everything stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_records: usize,
    pub accepted: usize,
    pub average_overall: f64,
    pub best_overall: f64,
    pub by_task_type: HashMap<String, usize>,
    /// Up to five tags, most frequent first.
    pub most_used_tags: Vec<String>,
}

impl HistoryStats {
    pub fn from_records<'a>(records: impl Iterator<Item = &'a HistoryRecord>) -> Self {
        let mut stats = HistoryStats::default();
        let mut score_sum = 0.0;
        let mut tag_counts: HashMap<&str, usize> = HashMap::new();

        for record in records {
            stats.total_records += 1;
            score_sum += record.overall();
            stats.best_overall = stats.best_overall.max(record.overall());
            if record.artifact.is_accepted() {
                stats.accepted += 1;
            }
            *stats
                .by_task_type
                .entry(record.task_type.as_str().to_string())
                .or_insert(0) += 1;
            for tag in &record.tags {
                *tag_counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }

        if stats.total_records > 0 {
            stats.average_overall = score_sum / stats.total_records as f64;
        }

        let mut ranked: Vec<(&str, usize)> = tag_counts.into_iter().collect();
        // Alphabetical within a count so the ranking is reproducible.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        stats.most_used_tags = ranked
            .into_iter()
            .take(5)
            .map(|(tag, _)| tag.to_string())
            .collect();
        stats
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Store trait
// ────────────────────────────────────────────────────────────────────────────

/// Persistence seam for refinement results. Implementations must keep
/// `put` score-monotonic per fingerprint.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Stores (or upgrades) the record for `request`'s fingerprint.
    async fn put(&self, request: &Request, artifact: Artifact) -> anyhow::Result<PutOutcome>;

    async fn get(&self, fingerprint: &Fingerprint) -> anyhow::Result<Option<HistoryRecord>>;

    /// Matching records, newest first.
    async fn search(&self, query: &HistoryQuery) -> anyhow::Result<Vec<HistoryRecord>>;

    async fn statistics(&self) -> anyhow::Result<HistoryStats>;

    /// All records, newest first, for export.
    async fn export_rows(&self) -> anyhow::Result<Vec<HistoryRecord>>;

    /// JSON array of all records, newest first.
    async fn export_json(&self) -> anyhow::Result<String> {
        let rows = self.export_rows().await?;
        Ok(serde_json::to_string_pretty(&rows)?)
    }
}
