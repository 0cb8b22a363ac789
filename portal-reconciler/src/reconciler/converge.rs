//! Convergence driver - issues the planned operations through a
//! [`RemoteCapability`] and collects a per-phase outcome.
//!
//! Phases run strictly one after another in the configured order. A failed
//! phase does not stop the others; only a cancellation or timeout does.

use std::fmt;

use tracing::{debug, error, info, warn};

use super::diff::{OperationSet, Update};
use crate::clients::RemoteCapability;
use crate::config::ReconcilerConfig;
use crate::error::{PartialConvergenceError, RemoteCallError, RemoteError};
use crate::model::{Collection, Identity, Resource};

/// One of the three convergence phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Create => write!(f, "create"),
            Phase::Update => write!(f, "update"),
            Phase::Delete => write!(f, "delete"),
        }
    }
}

/// Final state of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Every call of the phase succeeded (or there was nothing to do).
    Done,
    /// At least one call of the phase failed.
    Failed,
    /// The phase was not attempted, or stopped early, after an interrupt.
    Skipped,
}

/// Outcome of one convergence cycle.
#[derive(Debug, Clone)]
pub struct ConvergenceResult<R> {
    pub order_id: String,
    /// Entities confirmed created.
    pub created: Vec<R>,
    /// Updates confirmed applied.
    pub updated: Vec<Update<R>>,
    /// Identities confirmed deleted.
    pub deleted: Vec<Identity>,
    pub failures: Vec<RemoteCallError>,
    /// Operations never attempted because of an interrupt.
    pub skipped: Vec<(Phase, Identity)>,
    /// Outcome per phase, in the order the phases ran.
    pub phases: Vec<(Phase, PhaseOutcome)>,
}

impl<R: Resource> ConvergenceResult<R> {
    fn new(order_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            phases: Vec::new(),
        }
    }

    pub fn is_converged(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    pub fn outcome(&self, phase: Phase) -> Option<PhaseOutcome> {
        self.phases
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, o)| *o)
    }

    /// Identities whose operation was confirmed by the remote.
    pub fn converged(&self) -> Vec<Identity> {
        self.created
            .iter()
            .map(|c| c.identity())
            .chain(self.updated.iter().map(|u| u.identity.clone()))
            .chain(self.deleted.iter().cloned())
            .collect()
    }

    /// Identities whose operation failed.
    pub fn failed(&self) -> Vec<Identity> {
        self.failures
            .iter()
            .flat_map(|f| f.identities.iter().cloned())
            .collect()
    }

    /// The collection to persist: `current` with only the confirmed
    /// operations applied. Diffing it against the desired collection again
    /// yields exactly the operations that still need to run.
    pub fn confirmed(&self, current: &Collection<R>) -> Collection<R> {
        let confirmed = OperationSet {
            creates: self.created.clone(),
            updates: self.updated.clone(),
            deletes: self.deleted.clone(),
        };
        confirmed.apply_to(current)
    }

    /// `Some` when any operation failed or was skipped.
    pub fn partial_error(&self) -> Option<PartialConvergenceError> {
        if self.is_converged() {
            return None;
        }
        Some(PartialConvergenceError {
            order_id: self.order_id.clone(),
            failures: self.failures.clone(),
            skipped: self.skipped.iter().map(|(_, id)| id.clone()).collect(),
            converged: self.converged(),
        })
    }
}

/// Issues planned operations in a fixed phase order.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceDriver {
    config: ReconcilerConfig,
}

impl ConvergenceDriver {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    /// Apply `ops` for `order_id` through `remote`.
    ///
    /// Never returns early on a failed call: every phase is attempted and
    /// its outcome recorded. A cancellation or timeout stops the current
    /// phase at once and, with `stop_on_interrupt`, skips the remaining
    /// phases.
    pub async fn converge<R, C>(
        &self,
        order_id: &str,
        ops: OperationSet<R>,
        remote: &C,
    ) -> ConvergenceResult<R>
    where
        R: Resource,
        C: RemoteCapability<R> + ?Sized,
    {
        let mut result = ConvergenceResult::new(order_id);
        let OperationSet {
            creates,
            updates,
            deletes,
        } = ops;
        let mut creates = Some(creates);
        let mut updates = Some(updates);
        let mut deletes = Some(deletes);
        let mut interrupted = false;

        for phase in self.config.ordering.phases() {
            if interrupted {
                let skipped: Vec<Identity> = match phase {
                    Phase::Create => creates
                        .take()
                        .unwrap_or_default()
                        .iter()
                        .map(|c| c.identity())
                        .collect(),
                    Phase::Update => updates
                        .take()
                        .unwrap_or_default()
                        .into_iter()
                        .map(|u| u.identity)
                        .collect(),
                    Phase::Delete => deletes.take().unwrap_or_default(),
                };
                if skipped.is_empty() {
                    result.phases.push((phase, PhaseOutcome::Done));
                    continue;
                }
                warn!(
                    "Skipping {} phase for order {} after interrupt",
                    phase, order_id
                );
                result
                    .skipped
                    .extend(skipped.into_iter().map(|id| (phase, id)));
                result.phases.push((phase, PhaseOutcome::Skipped));
                continue;
            }

            let (outcome, interrupt) = match phase {
                Phase::Create => {
                    let batch = creates.take().unwrap_or_default();
                    self.create_phase(order_id, batch, remote, &mut result).await
                }
                Phase::Update => {
                    let batch = updates.take().unwrap_or_default();
                    self.update_phase(order_id, batch, remote, &mut result).await
                }
                Phase::Delete => {
                    let batch = deletes.take().unwrap_or_default();
                    self.delete_phase(order_id, batch, remote, &mut result).await
                }
            };
            result.phases.push((phase, outcome));
            interrupted = interrupt && self.config.stop_on_interrupt;
        }

        if result.is_converged() {
            info!(
                "Order {} converged: {} created, {} updated, {} deleted",
                order_id,
                result.created.len(),
                result.updated.len(),
                result.deleted.len()
            );
        } else {
            warn!(
                "Order {} partially converged: {} failed call(s), {} skipped, {} converged",
                order_id,
                result.failures.len(),
                result.skipped.len(),
                result.converged().len()
            );
        }

        result
    }

    async fn create_phase<R, C>(
        &self,
        order_id: &str,
        creates: Vec<R>,
        remote: &C,
        result: &mut ConvergenceResult<R>,
    ) -> (PhaseOutcome, bool)
    where
        R: Resource,
        C: RemoteCapability<R> + ?Sized,
    {
        if creates.is_empty() {
            return (PhaseOutcome::Done, false);
        }
        debug!("Creating {} entities in order {}", creates.len(), order_id);
        match remote.create_batch(order_id, &creates).await {
            Ok(()) => {
                result.created = creates;
                (PhaseOutcome::Done, false)
            }
            Err(e) => {
                let interrupt = e.is_interrupt();
                let identities = creates.iter().map(|c| c.identity()).collect();
                self.record_failure(Phase::Create, identities, e, result);
                (PhaseOutcome::Failed, interrupt)
            }
        }
    }

    async fn update_phase<R, C>(
        &self,
        order_id: &str,
        updates: Vec<Update<R>>,
        remote: &C,
        result: &mut ConvergenceResult<R>,
    ) -> (PhaseOutcome, bool)
    where
        R: Resource,
        C: RemoteCapability<R> + ?Sized,
    {
        let mut outcome = PhaseOutcome::Done;
        let mut pending = updates.into_iter();

        while let Some(update) = pending.next() {
            debug!(
                "Updating {} in order {} ({} changed field(s){})",
                update.identity,
                order_id,
                update.changes.changed.len(),
                if update.changes.touches_pair() {
                    ", paired values"
                } else {
                    ""
                }
            );
            match remote
                .update_one(order_id, &update.identity, &update.changes)
                .await
            {
                Ok(()) => result.updated.push(update),
                Err(e) => {
                    let interrupt = e.is_interrupt();
                    self.record_failure(Phase::Update, vec![update.identity], e, result);
                    outcome = PhaseOutcome::Failed;
                    if interrupt {
                        let rest: Vec<_> = pending.map(|u| (Phase::Update, u.identity)).collect();
                        if !rest.is_empty() {
                            warn!(
                                "Update phase for order {} interrupted, {} update(s) not attempted",
                                order_id,
                                rest.len()
                            );
                        }
                        result.skipped.extend(rest);
                        return (outcome, true);
                    }
                }
            }
        }

        (outcome, false)
    }

    async fn delete_phase<R, C>(
        &self,
        order_id: &str,
        deletes: Vec<Identity>,
        remote: &C,
        result: &mut ConvergenceResult<R>,
    ) -> (PhaseOutcome, bool)
    where
        R: Resource,
        C: RemoteCapability<R> + ?Sized,
    {
        if deletes.is_empty() {
            return (PhaseOutcome::Done, false);
        }
        debug!("Deleting {} entities in order {}", deletes.len(), order_id);
        match remote.delete_batch(order_id, &deletes).await {
            Ok(()) => {
                result.deleted = deletes;
                (PhaseOutcome::Done, false)
            }
            Err(e) => {
                let interrupt = e.is_interrupt();
                self.record_failure(Phase::Delete, deletes, e, result);
                (PhaseOutcome::Failed, interrupt)
            }
        }
    }

    fn record_failure<R: Resource>(
        &self,
        phase: Phase,
        identities: Vec<Identity>,
        source: RemoteError,
        result: &mut ConvergenceResult<R>,
    ) {
        let failure = RemoteCallError {
            phase,
            identities,
            source,
        };
        error!("Order {}: {}", result.order_id, failure);
        result.failures.push(failure);
    }
}
