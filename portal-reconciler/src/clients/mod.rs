//! Capabilities the reconciler consumes from the portal order client.
//!
//! The reconciler never talks to the network itself; every remote effect
//! goes through these traits.
//! - `RemoteCapability`: create/update/delete sub-resources of an order
//! - `CurrentSource`: read the last converged collection of an order

pub mod file;

pub use file::FileOrderStore;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::model::{ChangedFields, Collection, Identity, Resource};

/// Remote operations on the sub-resources of one order.
#[async_trait]
pub trait RemoteCapability<R: Resource>: Send + Sync {
    /// Create all entities in one call.
    async fn create_batch(&self, order_id: &str, entities: &[R]) -> Result<(), RemoteError>;

    /// Update a single entity. `changes.pairs` lists the paired fields that
    /// need the follow-up apply call.
    async fn update_one(
        &self,
        order_id: &str,
        identity: &Identity,
        changes: &ChangedFields,
    ) -> Result<(), RemoteError>;

    /// Delete all identities in one call.
    async fn delete_batch(&self, order_id: &str, identities: &[Identity])
    -> Result<(), RemoteError>;
}

/// Source of the current collection of an order.
#[async_trait]
pub trait CurrentSource<R: Resource>: Send + Sync {
    async fn fetch_current(&self, order_id: &str) -> Result<Collection<R>, RemoteError>;
}
