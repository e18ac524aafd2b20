//! File-backed History Store. A single JSON array on disk, rewritten
//! atomically on every successful put. Suited to the tool's scale; swap in
//! a database-backed implementation behind [`HistoryStore`] if that
//! changes.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::history::{
    fingerprint_for, Fingerprint, HistoryQuery, HistoryRecord, HistoryStats, HistoryStore,
    PutOutcome,
};
use crate::models::{Artifact, Request};

pub struct JsonFileHistory {
    path: PathBuf,
    // Also serializes file rewrites, so holds across the await points.
    records: Mutex<Vec<HistoryRecord>>,
}

impl JsonFileHistory {
    /// Opens (or creates) the store at `path`, loading any existing
    /// records.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("history file {} is corrupt", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read history file {}", path.display()))
            }
        };

        info!(path = %path.display(), records = records.len(), "history store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Write-then-rename so a crash mid-write never truncates the store.
    async fn persist(&self, records: &[HistoryRecord]) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write history file {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace history file {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistory {
    async fn put(&self, request: &Request, artifact: Artifact) -> anyhow::Result<PutOutcome> {
        let fingerprint = fingerprint_for(request);
        let mut records = self.records.lock().await;

        // Memory is rolled back if the write fails, so the vec never gets
        // ahead of the file.
        let existing = records.iter().position(|r| r.fingerprint == fingerprint);
        let outcome = match existing {
            None => {
                records.push(HistoryRecord::new(request, artifact));
                if let Err(e) = self.persist(&records).await {
                    records.pop();
                    return Err(e);
                }
                PutOutcome::Inserted
            }
            Some(i) if artifact.overall() > records[i].overall() => {
                let previous =
                    std::mem::replace(&mut records[i], HistoryRecord::new(request, artifact));
                if let Err(e) = self.persist(&records).await {
                    records[i] = previous;
                    return Err(e);
                }
                PutOutcome::Upgraded
            }
            Some(_) => return Ok(PutOutcome::Kept),
        };

        debug!(%fingerprint, ?outcome, "history put persisted");
        Ok(outcome)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> anyhow::Result<Option<HistoryRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .find(|r| &r.fingerprint == fingerprint)
            .cloned())
    }

    async fn search(&self, query: &HistoryQuery) -> anyhow::Result<Vec<HistoryRecord>> {
        let records = self.records.lock().await;
        let mut matched: Vec<HistoryRecord> = records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn statistics(&self) -> anyhow::Result<HistoryStats> {
        let records = self.records.lock().await;
        Ok(HistoryStats::from_records(records.iter()))
    }

    async fn export_rows(&self) -> anyhow::Result<Vec<HistoryRecord>> {
        self.search(&HistoryQuery::default()).await
    }
}
