//! Generic JSON-file-backed document collection: synchronous load at
//! construction, async persist via `spawn_blocking`, and a broadcast channel
//! so the scheduler's `update()` can be woken by any mutation.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Clone)]
pub enum DocEvent<K> {
    Upserted(K),
    Removed(K),
}

pub struct DocStore<K, T> {
    inner: RwLock<HashMap<K, T>>,
    persist_path: PathBuf,
    key_of: Box<dyn Fn(&T) -> K + Send + Sync>,
    event_tx: broadcast::Sender<DocEvent<K>>,
}

impl<K, T> DocStore<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(persist_path: PathBuf, key_of: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let mut map = HashMap::new();
        if let Ok(data) = std::fs::read_to_string(&persist_path) {
            match serde_json::from_str::<Vec<T>>(&data) {
                Ok(docs) => {
                    for doc in docs {
                        map.insert(key_of(&doc), doc);
                    }
                    tracing::info!(count = map.len(), path = %persist_path.display(), "loaded documents from disk");
                }
                Err(e) => tracing::warn!(error = %e, path = %persist_path.display(), "failed to parse persisted documents"),
            }
        }

        Self { inner: RwLock::new(map), persist_path, key_of: Box::new(key_of), event_tx }
    }

    async fn persist(&self) {
        let docs: Vec<T> = self.inner.read().await.values().cloned().collect();
        let Ok(json) = serde_json::to_string_pretty(&docs) else {
            tracing::warn!("failed to serialize documents for persistence");
            return;
        };
        let path = self.persist_path.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!(error = %e, "failed to persist documents");
            }
        })
        .await;
    }

    pub async fn list(&self) -> Vec<T> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn get(&self, key: &K) -> Option<T> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn insert(&self, doc: T) -> T {
        let key = (self.key_of)(&doc);
        self.inner.write().await.insert(key.clone(), doc.clone());
        self.persist().await;
        let _ = self.event_tx.send(DocEvent::Upserted(key));
        doc
    }

    /// Read-then-write update. Callers needing atomicity under concurrent
    /// writers should prefer [`Self::update_atomic`]-style single-purpose
    /// methods defined on top of this store; this is the "last write wins"
    /// path used by the HTTP API handlers.
    pub async fn update(&self, key: &K, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut map = self.inner.write().await;
        let doc = map.get_mut(key)?;
        f(doc);
        let updated = doc.clone();
        drop(map);
        self.persist().await;
        let _ = self.event_tx.send(DocEvent::Upserted(key.clone()));
        Some(updated)
    }

    pub async fn delete(&self, key: &K) -> bool {
        let removed = self.inner.write().await.remove(key).is_some();
        if removed {
            self.persist().await;
            let _ = self.event_tx.send(DocEvent::Removed(key.clone()));
        }
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent<K>> {
        self.event_tx.subscribe()
    }
}
