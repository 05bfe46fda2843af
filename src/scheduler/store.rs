//! Persisted automation registry
//!
//! `{dataDir}/active_automations.json` maps automation ids to automations and
//! is the only source of truth. Reads go through an in-memory copy of the last
//! document read or written. Every mutation rewrites the whole file and then
//! replaces that copy. Mutations are serialized by an async mutex, so two runs
//! of the same automation cannot lose a `run_count` increment.

use crate::model::Automation;
use crate::utils::write_atomic;
use crate::{FlowsmithError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type AutomationMap = BTreeMap<String, Automation>;

pub struct AutomationStore {
    path: PathBuf,
    cache: RwLock<Option<Arc<AutomationMap>>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl AutomationStore {
    /// Nothing is read until the first access
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document, from cache when present
    ///
    /// A missing file is an empty registry. So is an unreadable one, with a
    /// warning; the next mutation replaces it.
    pub async fn snapshot(&self) -> Result<Arc<AutomationMap>> {
        let cached = self.cache.read().clone();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let map = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => match serde_json::from_str::<AutomationMap>(&text) {
                Ok(map) => map,
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "Automation snapshot is corrupt, starting empty"
                    );
                    AutomationMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AutomationMap::new(),
            Err(err) => return Err(err.into()),
        };

        let map = Arc::new(map);
        *self.cache.write() = Some(map.clone());
        Ok(map)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Automation>> {
        Ok(self.snapshot().await?.get(id).cloned())
    }

    /// Oldest first
    pub async fn list(&self) -> Result<Vec<Automation>> {
        let mut automations: Vec<Automation> =
            self.snapshot().await?.values().cloned().collect();
        automations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(automations)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.snapshot().await?.len())
    }

    pub async fn insert(&self, automation: Automation) -> Result<()> {
        self.mutate(|map| {
            map.insert(automation.id.clone(), automation);
        })
        .await
    }

    /// Returns false when the id was unknown
    pub async fn remove(&self, id: &str) -> Result<bool> {
        self.mutate(|map| map.remove(id).is_some()).await
    }

    /// Increment `run_count` and stamp `last_run`
    ///
    /// `None` when the automation no longer exists.
    pub async fn record_run(&self, id: &str, at: DateTime<Utc>) -> Result<Option<Automation>> {
        self.mutate(|map| {
            map.get_mut(id).map(|automation| {
                automation.run_count += 1;
                automation.last_run = Some(at);
                automation.clone()
            })
        })
        .await
    }

    async fn mutate<T>(&self, apply: impl FnOnce(&mut AutomationMap) -> T) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.snapshot().await?.as_ref().clone();
        let output = apply(&mut next);
        for automation in next.values_mut() {
            automation.last_results.clear();
        }

        let bytes = serde_json::to_vec_pretty(&next)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| FlowsmithError::storage(format!("automation write task failed: {}", e)))??;

        *self.cache.write() = Some(Arc::new(next));
        Ok(output)
    }
}
