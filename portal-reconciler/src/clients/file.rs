//! File-backed order store.
//!
//! Keeps the sub-resources of every order in one JSON document:
//!
//! ```json
//! { "order-7": [ { "prefix": "DC", "name": "foo", ... } ] }
//! ```
//!
//! Used by the CLI as a stand-in for the portal and as a persistent record of
//! the last converged collection. Writes go to a temporary file first and are
//! renamed into place.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clients::{CurrentSource, RemoteCapability};
use crate::error::RemoteError;
use crate::model::{ChangedFields, Collection, Identity, Resource};

type Document = BTreeMap<String, Vec<Value>>;

/// JSON file holding the collections of all orders for one entity kind.
pub struct FileOrderStore<R> {
    path: PathBuf,
    lock: Mutex<()>,
    _kind: PhantomData<fn() -> R>,
}

impl<R> FileOrderStore<R>
where
    R: Resource + Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _kind: PhantomData,
        }
    }

    async fn load(&self) -> Result<Document, RemoteError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => {
                return Err(RemoteError::transport(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        serde_json::from_slice(&raw).map_err(|e| {
            RemoteError::transport(format!("parse {}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, doc: &Document) -> Result<(), RemoteError> {
        let raw = serde_json::to_vec_pretty(doc)
            .map_err(|e| RemoteError::transport(format!("encode store: {}", e)))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, raw).await.map_err(|e| {
            RemoteError::transport(format!("write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            RemoteError::transport(format!("rename {}: {}", tmp.display(), e))
        })?;
        debug!("Saved order store {}", self.path.display());
        Ok(())
    }

    /// Position of the stored entity with `identity`, if any.
    fn position(entries: &[Value], identity: &Identity) -> Result<Option<usize>, RemoteError> {
        for (pos, entry) in entries.iter().enumerate() {
            if &decode::<R>(entry)?.identity() == identity {
                return Ok(Some(pos));
            }
        }
        Ok(None)
    }
}

fn decode<R: DeserializeOwned>(entry: &Value) -> Result<R, RemoteError> {
    serde_json::from_value(entry.clone())
        .map_err(|e| RemoteError::transport(format!("corrupt store entry: {}", e)))
}

#[async_trait]
impl<R> CurrentSource<R> for FileOrderStore<R>
where
    R: Resource + Serialize + DeserializeOwned,
{
    async fn fetch_current(&self, order_id: &str) -> Result<Collection<R>, RemoteError> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        doc.get(order_id)
            .map(|entries| entries.iter().map(decode::<R>).collect())
            .unwrap_or_else(|| Ok(Collection::default()))
    }
}

#[async_trait]
impl<R> RemoteCapability<R> for FileOrderStore<R>
where
    R: Resource + Serialize + DeserializeOwned,
{
    async fn create_batch(&self, order_id: &str, entities: &[R]) -> Result<(), RemoteError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let entries = doc.entry(order_id.to_string()).or_default();

        // All-or-nothing: check the whole batch before touching the document.
        let mut added = Vec::with_capacity(entities.len());
        for entity in entities {
            let identity = entity.identity();
            if Self::position(entries, &identity)?.is_some() {
                return Err(RemoteError::rejected(format!(
                    "{} {} already exists in order {}",
                    R::SCHEMA.kind,
                    identity,
                    order_id
                )));
            }
            let value = serde_json::to_value(entity)
                .map_err(|e| RemoteError::transport(format!("encode {}: {}", identity, e)))?;
            added.push(value);
        }
        entries.extend(added);

        self.save(&doc).await
    }

    async fn update_one(
        &self,
        order_id: &str,
        identity: &Identity,
        changes: &ChangedFields,
    ) -> Result<(), RemoteError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let not_found = || {
            RemoteError::rejected(format!(
                "{} {} not found in order {}",
                R::SCHEMA.kind,
                identity,
                order_id
            ))
        };

        let entries = doc.get_mut(order_id).ok_or_else(not_found)?;
        let pos = Self::position(entries, identity)?.ok_or_else(not_found)?;

        let mut merged = entries[pos].clone();
        let Value::Object(map) = &mut merged else {
            return Err(RemoteError::transport(format!(
                "corrupt store entry for {}",
                identity
            )));
        };
        for (name, value) in changes.changed.iter().chain(changes.context.iter()) {
            let value = serde_json::to_value(value)
                .map_err(|e| RemoteError::transport(format!("encode {}: {}", name, e)))?;
            map.insert((*name).to_string(), value);
        }

        // The merged record must still describe a valid entity.
        let updated: R = serde_json::from_value(merged.clone())
            .map_err(|e| RemoteError::rejected(format!("update {}: {}", identity, e)))?;
        if &updated.identity() != identity {
            return Err(RemoteError::rejected(format!(
                "update would change identity of {}",
                identity
            )));
        }
        entries[pos] = merged;

        self.save(&doc).await
    }

    async fn delete_batch(
        &self,
        order_id: &str,
        identities: &[Identity],
    ) -> Result<(), RemoteError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let Some(entries) = doc.get_mut(order_id) else {
            return Err(RemoteError::rejected(format!("order {} not found", order_id)));
        };

        let mut keep = Vec::with_capacity(entries.len());
        let mut removed = Vec::new();
        for entry in entries.drain(..) {
            let identity = decode::<R>(&entry)?.identity();
            if identities.contains(&identity) {
                removed.push(identity);
            } else {
                keep.push(entry);
            }
        }
        if let Some(missing) = identities.iter().find(|id| !removed.contains(id)) {
            return Err(RemoteError::rejected(format!(
                "{} {} not found in order {}",
                R::SCHEMA.kind,
                missing,
                order_id
            )));
        }
        *entries = keep;

        self.save(&doc).await
    }
}
