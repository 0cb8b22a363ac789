//! portal-reconciler: converges the sub-resource collections of bank portal
//! orders to their desired state.
//!
//! - `reconciler::validate` rejects desired collections that change
//!   immutable fields, break paired-field constraints or repeat identities
//! - `reconciler::diff` computes the create/update/delete sets
//! - `reconciler::converge` issues them against a [`clients::RemoteCapability`]
//! - [`reconciler::Reconciler`] ties the steps into one cycle per order

pub mod clients;
pub mod config;
pub mod error;
pub mod model;
pub mod reconciler;
pub mod resources;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use config::{PhaseOrdering, ReconcilerConfig};
pub use error::{
    PartialConvergenceError, ReconcileError, RemoteCallError, RemoteError, RemoteErrorKind,
    ValidationError, Violation,
};
pub use model::{ChangedFields, Collection, FieldValue, Identity, Resource};
pub use reconciler::{ConvergenceResult, OperationSet, Reconciler};
