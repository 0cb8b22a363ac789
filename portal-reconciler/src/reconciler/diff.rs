//! Collection diff engine.
//!
//! Computes the create/update/delete sets that take a current collection to
//! a desired one. Pure: nothing here talks to the remote.

use std::collections::HashSet;
use std::fmt;

use crate::model::{ChangedFields, Collection, Identity, Resource};

/// An update to an entity present in both collections.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<R> {
    pub identity: Identity,
    pub changes: ChangedFields,
    /// The full desired entity. Not sent to the remote.
    pub target: R,
}

/// A single remote operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation<'a, R> {
    Create(&'a R),
    Update(&'a Identity, &'a ChangedFields),
    Delete(&'a Identity),
}

/// Disjoint operation sets produced by [`diff`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSet<R> {
    /// In desired order.
    pub creates: Vec<R>,
    /// In desired order.
    pub updates: Vec<Update<R>>,
    /// In current order.
    pub deletes: Vec<Identity>,
}

impl<R> Default for OperationSet<R> {
    fn default() -> Self {
        Self {
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }
}

impl<R: Resource> OperationSet<R> {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    /// Creates, then updates, then deletes.
    pub fn operations(&self) -> impl Iterator<Item = Operation<'_, R>> {
        self.creates
            .iter()
            .map(Operation::Create)
            .chain(
                self.updates
                    .iter()
                    .map(|u| Operation::Update(&u.identity, &u.changes)),
            )
            .chain(self.deletes.iter().map(Operation::Delete))
    }

    pub fn create_identities(&self) -> Vec<Identity> {
        self.creates.iter().map(|c| c.identity()).collect()
    }

    /// Apply the operations to `current` without any remote involvement.
    pub fn apply_to(&self, current: &Collection<R>) -> Collection<R> {
        let deleted: HashSet<&Identity> = self.deletes.iter().collect();
        let mut items: Vec<R> = current
            .iter()
            .filter(|c| !deleted.contains(&c.identity()))
            .map(|c| {
                let id = c.identity();
                self.updates
                    .iter()
                    .find(|u| u.identity == id)
                    .map(|u| u.target.clone())
                    .unwrap_or_else(|| c.clone())
            })
            .collect();
        items.extend(self.creates.iter().cloned());
        Collection::new(items)
    }
}

impl<R: Resource> fmt::Display for OperationSet<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "no changes");
        }
        for create in &self.creates {
            writeln!(f, "+ {}", create.identity())?;
        }
        for update in &self.updates {
            let changed: Vec<String> = update
                .changes
                .changed
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            writeln!(f, "~ {} ({})", update.identity, changed.join(", "))?;
        }
        for delete in &self.deletes {
            writeln!(f, "- {}", delete)?;
        }
        Ok(())
    }
}

/// Compute the fields of `desired` that differ from `current`, plus the
/// context the remote update call requires.
pub fn changed_fields<R: Resource>(current: &R, desired: &R) -> ChangedFields {
    let old = current.fields();
    let new = desired.fields();

    let mut changes = ChangedFields::default();
    for (name, value) in &new {
        if old.get(name) != Some(value) {
            changes.changed.insert(*name, value.clone());
        }
    }
    if changes.is_empty() {
        return changes;
    }

    for name in R::SCHEMA.context {
        if let Some(value) = new.get(name) {
            if !changes.changed.contains_key(name) {
                changes.context.insert(*name, value.clone());
            }
        }
    }

    // Both members of a touched pair travel together.
    for pair in R::SCHEMA.paired {
        let low_changed = changes.changed.contains_key(pair.low);
        let high_changed = changes.changed.contains_key(pair.high);
        if !low_changed && !high_changed {
            continue;
        }
        for name in [pair.low, pair.high] {
            if !changes.changed.contains_key(name) {
                if let Some(value) = new.get(name) {
                    changes.context.insert(name, value.clone());
                }
            }
        }
        changes.pairs.push(*pair);
    }

    changes
}

/// Diff two collections keyed by identity.
///
/// Entities with a repeated identity in `desired` are considered once, at
/// their first position; validation rejects such collections before any
/// remote call.
pub fn diff<R: Resource>(current: &Collection<R>, desired: &Collection<R>) -> OperationSet<R> {
    let current_index = current.index();
    let mut seen: HashSet<Identity> = HashSet::with_capacity(desired.len());
    let mut ops = OperationSet::default();

    for entity in desired {
        let identity = entity.identity();
        if !seen.insert(identity.clone()) {
            continue;
        }
        match current_index.get(&identity) {
            None => ops.creates.push(entity.clone()),
            Some(existing) => {
                let changes = changed_fields(*existing, entity);
                if !changes.is_empty() {
                    ops.updates.push(Update {
                        identity,
                        changes,
                        target: entity.clone(),
                    });
                }
            }
        }
    }

    let mut deleted: HashSet<Identity> = HashSet::new();
    for entity in current {
        let identity = entity.identity();
        if !seen.contains(&identity) && deleted.insert(identity.clone()) {
            ops.deletes.push(identity);
        }
    }

    ops
}
