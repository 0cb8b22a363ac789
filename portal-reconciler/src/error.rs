//! Error types for reconciliation cycles.

use std::fmt;

use thiserror::Error;

use crate::model::{FieldValue, Identity};
use crate::reconciler::converge::Phase;

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Network or transport failure.
    Transport,
    /// The portal refused the request.
    Rejected,
    /// The caller's context was cancelled.
    Cancelled,
    /// The caller's deadline expired.
    TimedOut,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::Transport => write!(f, "transport error"),
            RemoteErrorKind::Rejected => write!(f, "rejected"),
            RemoteErrorKind::Cancelled => write!(f, "cancelled"),
            RemoteErrorKind::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Error returned by a remote capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Rejected, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Cancelled, message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::TimedOut, message)
    }

    /// Cancellation or deadline expiry. The driver stops issuing calls.
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Cancelled | RemoteErrorKind::TimedOut
        )
    }
}

/// Why a paired-field constraint failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairReason {
    /// Exactly one side carries the unset sentinel.
    PartiallySet,
    /// Both sides set, but lower bound exceeds upper bound.
    OutOfOrder,
}

impl fmt::Display for PairReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairReason::PartiallySet => write!(f, "must be set or unset together"),
            PairReason::OutOfOrder => write!(f, "lower bound exceeds upper bound"),
        }
    }
}

/// A single pre-flight finding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("duplicate identity {identity} at desired positions {}", join(.positions))]
    DuplicateIdentity {
        identity: Identity,
        positions: Vec<usize>,
    },

    #[error("{identity}: field {field} is immutable (current {old}, desired {new})")]
    ImmutableField {
        identity: Identity,
        field: &'static str,
        old: FieldValue,
        new: FieldValue,
    },

    #[error("{identity}: {low_field}={low} and {high_field}={high} {reason}")]
    PairedField {
        identity: Identity,
        low_field: &'static str,
        low: i64,
        high_field: &'static str,
        high: i64,
        reason: PairReason,
    },
}

/// Pre-flight rejection of a desired collection. No remote call was made.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} collection rejected: {}", join(.violations))]
pub struct ValidationError {
    pub kind: &'static str,
    pub violations: Vec<Violation>,
}

/// One failed remote call within a convergence phase.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{phase} failed for [{}]: {source}", join(.identities))]
pub struct RemoteCallError {
    pub phase: Phase,
    pub identities: Vec<Identity>,
    pub source: RemoteError,
}

/// Some operations of a cycle failed or were skipped while others converged.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "order {order_id} partially converged: {} failed call(s), {} skipped, {} converged",
    .failures.len(),
    .skipped.len(),
    .converged.len()
)]
pub struct PartialConvergenceError {
    pub order_id: String,
    pub failures: Vec<RemoteCallError>,
    pub skipped: Vec<Identity>,
    pub converged: Vec<Identity>,
}

/// Errors that abort a reconcile cycle before any remote effect.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to fetch current collection for order {order_id}: {source}")]
    FetchCurrent {
        order_id: String,
        source: RemoteError,
    },
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_messages_name_context() {
        let v = Violation::ImmutableField {
            identity: Identity::new("DC.foo"),
            field: "routing_type",
            old: FieldValue::from("ANYCAST"),
            new: FieldValue::from("MULTICAST"),
        };
        let msg = v.to_string();
        assert!(msg.contains("DC.foo"));
        assert!(msg.contains("routing_type"));
        assert!(msg.contains("ANYCAST"));
        assert!(msg.contains("MULTICAST"));

        let v = Violation::DuplicateIdentity {
            identity: Identity::new("DC.foo"),
            positions: vec![0, 3],
        };
        assert_eq!(
            v.to_string(),
            "duplicate identity DC.foo at desired positions 0, 3"
        );
    }

    #[test]
    fn test_interrupt_kinds() {
        assert!(RemoteError::cancelled("ctx").is_interrupt());
        assert!(RemoteError::timed_out("deadline").is_interrupt());
        assert!(!RemoteError::transport("reset").is_interrupt());
        assert!(!RemoteError::rejected("409").is_interrupt());
    }
}
