//! Bind pending plan entries to the instances phase 1 actually created.

use crate::error::{MateError, Result};
use crate::reconcile::{InstanceSource, PendingId, PendingInstance};
use crate::snapshot::AssemblySnapshot;
use std::collections::{BTreeMap, HashSet};

/// An instance present after phase 1 that was absent before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInstance {
    pub id: String,
    pub source: InstanceSource,
}

/// Instances of `updated` whose ids do not appear in `baseline`, in
/// snapshot order.
pub fn created_instances(baseline: &AssemblySnapshot, updated: &AssemblySnapshot) -> Vec<CreatedInstance> {
    let known: HashSet<&str> = baseline.instances().iter().map(|i| i.id.as_str()).collect();
    updated
        .instances()
        .iter()
        .filter(|i| !known.contains(i.id.as_str()))
        .map(|i| CreatedInstance {
            id: i.id.clone(),
            source: InstanceSource {
                path: updated.instance_path(i),
                part_id: i.part_id.clone(),
            },
        })
        .collect()
}

/// Bind each pending entry, in plan order, to the first remaining created
/// instance with a matching source. A bound instance leaves the pool, so no
/// two entries can share one.
///
/// Fails with [`MateError::UnmatchedInstance`] as soon as an entry finds no
/// match: features referencing it would point at a nonexistent instance.
pub fn match_instances(
    pending: &[PendingInstance],
    mut pool: Vec<CreatedInstance>,
) -> Result<BTreeMap<PendingId, String>> {
    let mut bindings = BTreeMap::new();
    for entry in pending {
        let Some(index) = pool.iter().position(|c| entry.source.matches(&c.source)) else {
            return Err(MateError::UnmatchedInstance {
                entry: entry.id,
                path: entry.source.path.to_string(),
            });
        };
        let created = pool.remove(index);
        tracing::debug!(entry = entry.id, instance = %created.id, "bound pending instance");
        bindings.insert(entry.id, created.id);
    }

    if !pool.is_empty() {
        tracing::warn!(
            unclaimed = pool.len(),
            "created instances left unclaimed by the plan"
        );
    }
    Ok(bindings)
}
