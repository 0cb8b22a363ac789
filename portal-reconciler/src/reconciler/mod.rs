//! Reconciliation of order sub-resource collections.
//!
//! A cycle fetches the current collection of an order, validates the desired
//! collection against it, diffs the two and drives the resulting operations
//! through the remote capability.

pub mod converge;
pub mod diff;
pub mod validate;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::clients::{CurrentSource, RemoteCapability};
use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, ValidationError};
use crate::model::{Collection, Resource};

pub use converge::{ConvergenceDriver, ConvergenceResult, Phase, PhaseOutcome};
pub use diff::{Operation, OperationSet, Update, diff};
pub use validate::validate;

/// Validate `desired` against `current` and compute the operations.
///
/// Nothing is returned unless validation passes, so a rejected plan can
/// never reach the remote.
pub fn plan<R: Resource>(
    current: &Collection<R>,
    desired: &Collection<R>,
) -> Result<OperationSet<R>, ValidationError> {
    let violations = validate(current, desired);
    if !violations.is_empty() {
        for v in &violations {
            warn!("{}: {}", R::SCHEMA.kind, v);
        }
        return Err(ValidationError {
            kind: R::SCHEMA.kind,
            violations,
        });
    }

    let ops = diff(current, desired);
    info!(
        "{} plan: {} create, {} update, {} delete",
        R::SCHEMA.kind,
        ops.creates.len(),
        ops.updates.len(),
        ops.deletes.len()
    );
    Ok(ops)
}

/// Reconciler for one entity kind against one portal client.
///
/// Cycles for the same order id are serialized; cycles for different orders
/// may run concurrently.
pub struct Reconciler<R, C> {
    client: C,
    driver: ConvergenceDriver,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    _kind: PhantomData<fn() -> R>,
}

impl<R, C> Reconciler<R, C>
where
    R: Resource,
    C: RemoteCapability<R> + CurrentSource<R>,
{
    pub fn new(client: C, config: ReconcilerConfig) -> Self {
        Self {
            client,
            driver: ConvergenceDriver::new(config),
            locks: Mutex::new(HashMap::new()),
            _kind: PhantomData,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one convergence cycle for `order_id`.
    ///
    /// Returns `Err` only when the cycle was aborted before any remote
    /// effect. Remote failures during convergence are reported in the
    /// result; check [`ConvergenceResult::partial_error`].
    pub async fn reconcile(
        &self,
        order_id: &str,
        desired: &Collection<R>,
    ) -> Result<ConvergenceResult<R>, ReconcileError> {
        let cycle = Uuid::new_v4();
        let span = info_span!("reconcile", order_id, kind = R::SCHEMA.kind, %cycle);

        let lock = self.order_lock(order_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_cycle(order_id, desired).instrument(span).await
        };
        drop(lock);
        self.release_lock(order_id).await;

        result
    }

    async fn run_cycle(
        &self,
        order_id: &str,
        desired: &Collection<R>,
    ) -> Result<ConvergenceResult<R>, ReconcileError> {
        let current = self
            .client
            .fetch_current(order_id)
            .await
            .map_err(|source| ReconcileError::FetchCurrent {
                order_id: order_id.to_string(),
                source,
            })?;
        info!(
            "Reconciling {} {} entities (current {})",
            desired.len(),
            R::SCHEMA.kind,
            current.len()
        );

        let ops = plan(&current, desired)?;
        if ops.is_empty() {
            info!("Order {} already converged", order_id);
        }

        Ok(self.driver.converge(order_id, ops, &self.client).await)
    }

    async fn order_lock(&self, order_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(order_id.to_string()).or_default())
    }

    /// Drop the lock entry once no cycle holds or waits for it.
    async fn release_lock(&self, order_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(order_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(order_id);
        }
    }
}
