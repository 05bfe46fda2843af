//! Append-only log of generation attempts with aggregate counters
//!
//! The snapshot file (`{flows, stats}`) is rewritten on every append through a
//! temp file in the same directory, so a crash never leaves a torn document.

use crate::model::{Flow, Intent, LearningRecord, LearningStats};
use crate::utils::write_atomic;
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LearningMemory {
    #[serde(default)]
    flows: Vec<LearningRecord>,
    #[serde(default)]
    stats: LearningStats,
}

/// Counters plus the approval rate as a percentage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total: u64,
    pub approved: u64,
    pub rejected: u64,
    pub approval_rate: f64,
}

impl From<LearningStats> for StatsSummary {
    fn from(stats: LearningStats) -> Self {
        let approval_rate = if stats.total == 0 {
            0.0
        } else {
            let pct = stats.approved as f64 / stats.total as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };
        Self {
            total: stats.total,
            approved: stats.approved,
            rejected: stats.rejected,
            approval_rate,
        }
    }
}

pub struct LearningStore {
    path: PathBuf,
    memory: Mutex<LearningMemory>,
}

impl LearningStore {
    /// Load the snapshot; a missing or unreadable file starts an empty log
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let memory = load_memory(&path);
        tracing::debug!(path = %path.display(), records = memory.flows.len(), "Learning store loaded");
        Self {
            path,
            memory: Mutex::new(memory),
        }
    }

    /// Append one record and rewrite the snapshot.
    ///
    /// Memory is only updated once the file has been replaced.
    pub async fn append(
        &self,
        prompt: &str,
        intent: &Intent,
        flow: &Flow,
        approved: bool,
        errors: &[String],
        score: u8,
    ) -> Result<LearningRecord> {
        let mut memory = self.memory.lock().await;

        let id = memory.flows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let record = LearningRecord {
            id,
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            intent: intent.clone(),
            flow: flow.clone(),
            approved,
            errors: errors.to_vec(),
            score,
        };

        let mut next = memory.clone();
        next.flows.push(record.clone());
        next.stats.total += 1;
        if approved {
            next.stats.approved += 1;
        } else {
            next.stats.rejected += 1;
        }

        let bytes = serde_json::to_vec_pretty(&next)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| crate::FlowsmithError::storage(format!("snapshot task failed: {}", e)))??;

        *memory = next;
        Ok(record)
    }

    /// Most recent records, newest first
    pub async fn history(&self, limit: usize) -> Vec<LearningRecord> {
        let memory = self.memory.lock().await;
        memory.flows.iter().rev().take(limit).cloned().collect()
    }

    pub async fn stats(&self) -> LearningStats {
        self.memory.lock().await.stats
    }

    pub async fn summary(&self) -> StatsSummary {
        StatsSummary::from(self.stats().await)
    }
}

fn load_memory(path: &Path) -> LearningMemory {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LearningMemory::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read learning store, starting empty");
            return LearningMemory::default();
        }
    };

    serde_json::from_slice(&raw).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Corrupt learning store, starting empty");
        LearningMemory::default()
    })
}
