//! Test utilities for reconciler tests.
//!
//! Provides a scripted in-memory remote that records every call and fails
//! the calls it is told to fail.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::clients::{CurrentSource, RemoteCapability};
use crate::error::RemoteError;
use crate::model::{ChangedFields, Collection, Identity, Resource};

/// A call observed by [`ScriptedRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Fetch(String),
    Create(Vec<Identity>),
    Update(Identity, ChangedFields),
    Delete(Vec<Identity>),
}

/// In-memory remote with scripted failures.
pub struct ScriptedRemote<R> {
    current: Mutex<HashMap<String, Collection<R>>>,
    calls: Mutex<Vec<Call>>,
    fail_fetch: Mutex<Option<RemoteError>>,
    fail_create: Mutex<Option<RemoteError>>,
    fail_delete: Mutex<Option<RemoteError>>,
    fail_update: Mutex<HashMap<Identity, RemoteError>>,
    fetch_delay: Mutex<Option<Duration>>,
}

impl<R: Resource> Default for ScriptedRemote<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> ScriptedRemote<R> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_fetch: Mutex::new(None),
            fail_create: Mutex::new(None),
            fail_delete: Mutex::new(None),
            fail_update: Mutex::new(HashMap::new()),
            fetch_delay: Mutex::new(None),
        }
    }

    pub fn with_current(self, order_id: &str, current: Collection<R>) -> Self {
        self.set_current(order_id, current);
        self
    }

    pub fn set_current(&self, order_id: &str, current: Collection<R>) {
        self.current
            .lock()
            .unwrap()
            .insert(order_id.to_string(), current);
    }

    /// Suspend every fetch for `delay` after it is recorded.
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        *self.fetch_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn fail_fetch(&self, err: RemoteError) {
        *self.fail_fetch.lock().unwrap() = Some(err);
    }

    pub fn fail_create(&self, err: RemoteError) {
        *self.fail_create.lock().unwrap() = Some(err);
    }

    pub fn fail_delete(&self, err: RemoteError) {
        *self.fail_delete.lock().unwrap() = Some(err);
    }

    pub fn fail_update(&self, identity: &str, err: RemoteError) {
        self.fail_update
            .lock()
            .unwrap()
            .insert(Identity::new(identity), err);
    }

    /// Clear all scripted failures.
    pub fn heal(&self) {
        *self.fail_fetch.lock().unwrap() = None;
        *self.fail_create.lock().unwrap() = None;
        *self.fail_delete.lock().unwrap() = None;
        self.fail_update.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that would change remote state.
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Fetch(_)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl<R: Resource> RemoteCapability<R> for ScriptedRemote<R> {
    async fn create_batch(&self, _order_id: &str, entities: &[R]) -> Result<(), RemoteError> {
        self.record(Call::Create(entities.iter().map(|e| e.identity()).collect()));
        match self.fail_create.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn update_one(
        &self,
        _order_id: &str,
        identity: &Identity,
        changes: &ChangedFields,
    ) -> Result<(), RemoteError> {
        self.record(Call::Update(identity.clone(), changes.clone()));
        match self.fail_update.lock().unwrap().get(identity) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn delete_batch(
        &self,
        _order_id: &str,
        identities: &[Identity],
    ) -> Result<(), RemoteError> {
        self.record(Call::Delete(identities.to_vec()));
        match self.fail_delete.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: Resource> CurrentSource<R> for ScriptedRemote<R> {
    async fn fetch_current(&self, order_id: &str) -> Result<Collection<R>, RemoteError> {
        self.record(Call::Fetch(order_id.to_string()));
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_fetch.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self
            .current
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .unwrap_or_default())
    }
}
