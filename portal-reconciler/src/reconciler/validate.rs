//! Immutability and cross-field invariant checks.
//!
//! Runs before any remote call. A non-empty result aborts the whole cycle
//! for the collection.

use std::collections::HashMap;

use crate::error::{PairReason, Violation};
use crate::model::{Collection, Fields, Identity, PairedField, Resource};

/// Check `desired` against `current` and the kind's schema.
///
/// Findings are ordered: duplicate identities, immutable-field changes,
/// then paired-field violations, each in desired order.
pub fn validate<R: Resource>(current: &Collection<R>, desired: &Collection<R>) -> Vec<Violation> {
    let mut violations = duplicate_identities(desired);

    let current_index = current.index();
    let mut immutable = Vec::new();
    let mut paired = Vec::new();

    for (identity, entity) in first_occurrences(desired) {
        let fields = entity.fields();

        if let Some(existing) = current_index.get(&identity) {
            let old = existing.fields();
            for field in R::SCHEMA.immutable {
                if let (Some(before), Some(after)) = (old.get(field), fields.get(field)) {
                    if before != after {
                        immutable.push(Violation::ImmutableField {
                            identity: identity.clone(),
                            field: *field,
                            old: before.clone(),
                            new: after.clone(),
                        });
                    }
                }
            }
        }

        for pair in R::SCHEMA.paired {
            if let Some(v) = check_pair(&identity, &fields, pair) {
                paired.push(v);
            }
        }
    }

    violations.extend(immutable);
    violations.extend(paired);
    violations
}

/// One violation per identity that occurs more than once.
fn duplicate_identities<R: Resource>(desired: &Collection<R>) -> Vec<Violation> {
    let mut positions: HashMap<Identity, Vec<usize>> = HashMap::new();
    let mut order: Vec<Identity> = Vec::new();

    for (pos, entity) in desired.iter().enumerate() {
        let identity = entity.identity();
        let slots = positions.entry(identity.clone()).or_default();
        if slots.is_empty() {
            order.push(identity);
        }
        slots.push(pos);
    }

    order
        .into_iter()
        .filter_map(|identity| {
            let slots = positions.remove(&identity)?;
            (slots.len() > 1).then_some(Violation::DuplicateIdentity {
                identity,
                positions: slots,
            })
        })
        .collect()
}

fn first_occurrences<R: Resource>(desired: &Collection<R>) -> Vec<(Identity, &R)> {
    let mut seen = std::collections::HashSet::new();
    desired
        .iter()
        .filter_map(|entity| {
            let identity = entity.identity();
            seen.insert(identity.clone()).then_some((identity, entity))
        })
        .collect()
}

/// Valid states are `(S, S)` or `(low, high)` with neither equal to `S` and
/// `low <= high`. A missing or non-integer field counts as unset.
pub fn check_pair(identity: &Identity, fields: &Fields, pair: &PairedField) -> Option<Violation> {
    let value = |name: &str| {
        fields
            .get(name)
            .and_then(|v| v.as_int())
            .unwrap_or(pair.sentinel)
    };
    let low = value(pair.low);
    let high = value(pair.high);

    let reason = match (low == pair.sentinel, high == pair.sentinel) {
        (true, true) => return None,
        (false, false) if low <= high => return None,
        (false, false) => PairReason::OutOfOrder,
        _ => PairReason::PartiallySet,
    };

    Some(Violation::PairedField {
        identity: identity.clone(),
        low_field: pair.low,
        low,
        high_field: pair.high,
        high,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;
    use crate::resources::{AddressPolicy, ConnectorTopic, TechnicalUser};

    fn delays(min: i64, max: i64) -> Collection<AddressPolicy> {
        Collection::new(vec![
            AddressPolicy::new("DC", "q", "FAIL", "1Mb").with_redelivery(min, max)
        ])
    }

    #[test]
    fn test_paired_fields_accepted() {
        let empty = Collection::default();
        assert!(validate(&empty, &delays(-1, -1)).is_empty());
        assert!(validate(&empty, &delays(3, 5)).is_empty());
        assert!(validate(&empty, &delays(5, 5)).is_empty());
    }

    #[test]
    fn test_paired_fields_partially_set_rejected() {
        let empty = Collection::default();
        for (min, max) in [(-1, 5), (5, -1)] {
            let violations = validate(&empty, &delays(min, max));
            assert_eq!(violations.len(), 1);
            assert!(matches!(
                violations[0],
                Violation::PairedField {
                    reason: PairReason::PartiallySet,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_paired_fields_out_of_order_rejected() {
        let violations = validate(&Collection::default(), &delays(10, 5));
        assert_eq!(
            violations,
            vec![Violation::PairedField {
                identity: Identity::new("DC.q"),
                low_field: "min_redelivery_delay",
                low: 10,
                high_field: "max_redelivery_delay",
                high: 5,
                reason: PairReason::OutOfOrder,
            }]
        );
    }

    #[test]
    fn test_paired_fields_checked_on_unchanged_entities() {
        // The pair is invalid in both collections; it is still rejected.
        let c = Collection::new(vec![ConnectorTopic {
            min_compaction_lag_ms: 100,
            ..ConnectorTopic::new("orders", 3)
        }]);
        assert_eq!(validate(&c, &c).len(), 1);
    }

    #[test]
    fn test_immutable_change_names_field_and_values() {
        let current = Collection::new(vec![AddressPolicy::new("DC", "x", "FAIL", "1Mb")]);
        let desired = Collection::new(vec![
            AddressPolicy::new("DC", "x", "BLOCK", "1Mb").with_routing_type("MULTICAST")
        ]);

        let violations = validate(&current, &desired);
        assert_eq!(
            violations,
            vec![Violation::ImmutableField {
                identity: Identity::new("DC.x"),
                field: "routing_type",
                old: FieldValue::from("ANYCAST"),
                new: FieldValue::from("MULTICAST"),
            }]
        );
    }

    #[test]
    fn test_immutable_fields_free_on_create() {
        let desired = Collection::new(vec![
            AddressPolicy::new("DC", "x", "FAIL", "1Mb").with_routing_type("MULTICAST")
        ]);
        assert!(validate(&Collection::default(), &desired).is_empty());
    }

    #[test]
    fn test_duplicate_identity_reported_once() {
        let desired = Collection::new(vec![
            TechnicalUser::new("svc-a"),
            TechnicalUser::new("DC.foo"),
            TechnicalUser::new("svc-b"),
            TechnicalUser::new("DC.foo"),
        ]);

        let violations = validate(&Collection::default(), &desired);
        assert_eq!(
            violations,
            vec![Violation::DuplicateIdentity {
                identity: Identity::new("DC.foo"),
                positions: vec![1, 3],
            }]
        );
    }

    #[test]
    fn test_violation_families_in_fixed_order() {
        let current = Collection::new(vec![ConnectorTopic::new("orders", 3)]);
        let desired = Collection::new(vec![
            ConnectorTopic {
                max_compaction_lag_ms: 10,
                ..ConnectorTopic::new("orders", 6)
            },
            ConnectorTopic::new("audit", 1),
            ConnectorTopic::new("audit", 1),
        ]);

        let violations = validate(&current, &desired);
        assert_eq!(violations.len(), 3);
        assert!(matches!(violations[0], Violation::DuplicateIdentity { .. }));
        assert!(matches!(violations[1], Violation::ImmutableField { field: "partitions", .. }));
        assert!(matches!(violations[2], Violation::PairedField { .. }));
    }
}
