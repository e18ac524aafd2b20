//! In-memory History Store. The default for tests and single-process use;
//! contents vanish with the process.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::history::{
    fingerprint_for, Fingerprint, HistoryQuery, HistoryRecord, HistoryStats, HistoryStore,
    PutOutcome,
};
use crate::models::{Artifact, Request};

type Bucket = Arc<Mutex<HistoryRecord>>;

/// Writes to the same fingerprint serialize on that bucket's mutex; the
/// outer map lock is held only to locate or insert a bucket, so unrelated
/// fingerprints never contend.
#[derive(Default)]
pub struct InMemoryHistory {
    buckets: RwLock<HashMap<Fingerprint, Bucket>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn snapshot(&self) -> Vec<HistoryRecord> {
        let buckets: Vec<Bucket> = self.buckets.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            records.push(bucket.lock().await.clone());
        }
        records
    }
}

/// Replaces the stored record only on a strictly higher overall score.
fn offer(record: &mut HistoryRecord, request: &Request, artifact: Artifact) -> PutOutcome {
    if artifact.overall() > record.overall() {
        *record = HistoryRecord::new(request, artifact);
        PutOutcome::Upgraded
    } else {
        PutOutcome::Kept
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn put(&self, request: &Request, artifact: Artifact) -> anyhow::Result<PutOutcome> {
        let fingerprint = fingerprint_for(request);

        let existing = self.buckets.read().await.get(&fingerprint).cloned();
        let outcome = match existing {
            Some(bucket) => offer(&mut *bucket.lock().await, request, artifact),
            None => match self.buckets.write().await.entry(fingerprint.clone()) {
                // A concurrent put won the insert race; offer against it.
                Entry::Occupied(occupied) => {
                    offer(&mut *occupied.get().lock().await, request, artifact)
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::new(Mutex::new(HistoryRecord::new(request, artifact))));
                    PutOutcome::Inserted
                }
            },
        };

        debug!(%fingerprint, ?outcome, "history put");
        Ok(outcome)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> anyhow::Result<Option<HistoryRecord>> {
        let bucket = self.buckets.read().await.get(fingerprint).cloned();
        Ok(match bucket {
            Some(bucket) => Some(bucket.lock().await.clone()),
            None => None,
        })
    }

    async fn search(&self, query: &HistoryQuery) -> anyhow::Result<Vec<HistoryRecord>> {
        let mut matched: Vec<HistoryRecord> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn statistics(&self) -> anyhow::Result<HistoryStats> {
        let records = self.snapshot().await;
        Ok(HistoryStats::from_records(records.iter()))
    }

    async fn export_rows(&self) -> anyhow::Result<Vec<HistoryRecord>> {
        self.search(&HistoryQuery::default()).await
    }
}
