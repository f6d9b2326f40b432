//! Reconciliation: turn open connectors into a two-phase mutation plan.
//!
//! ```text
//! for each candidate, for each unused connector c:
//!
//!   part path not excluded ∧ c ∈ originMirrors ──► Origin  (mate c to origin)
//!   c ∈ targets ∧ c ∈ targetCorrespondence    ──► Target  (new instance of
//!                                                 targets[c], mate its
//!                                                 correspondence to c)
//!   c ∈ mirrors                               ──► Mirror  (new instance of the
//!                                                 same part, mate mirrors[c]
//!                                                 to c)
//!   otherwise                                 ──► ignored
//! ```
//!
//! Features that mate against an instance created in phase 1 refer to it
//! through a [`PendingId`] placeholder, resolved only after the instance
//! matcher has bound every pending instance to a concrete id.

use crate::candidates::Candidate;
use crate::error::{MateError, Result};
use crate::evaluate::{ClassificationMaps, TargetCorrespondence};
use crate::path::{ElementPath, PartPath};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Index of an entry in [`MutationPlan::pending_instances`].
pub type PendingId = usize;

pub const FASTEN_MATE: &str = "Fasten mate";
pub const MIRROR_MATE: &str = "Mirror mate";

/// What to insert: a whole part studio, or one part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSource {
    pub path: ElementPath,
    pub part_id: Option<String>,
}

impl InstanceSource {
    pub fn part_studio(path: ElementPath) -> Self {
        Self {
            path,
            part_id: None,
        }
    }

    pub fn part(part_path: &PartPath) -> Self {
        Self {
            path: part_path.path.clone(),
            part_id: Some(part_path.part_id.clone()),
        }
    }

    /// Structural match against the source of a created instance. A
    /// whole-part-studio source accepts any part of that studio.
    pub fn matches(&self, created: &InstanceSource) -> bool {
        self.path == created.path
            && match (&self.part_id, &created.part_id) {
                (Some(wanted), Some(got)) => wanted == got,
                (Some(_), None) => false,
                (None, _) => true,
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInstance {
    pub id: PendingId,
    pub source: InstanceSource,
    /// Instance whose connector triggered this addition.
    pub for_instance: String,
    pub for_connector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum InstanceRef {
    Existing(String),
    Pending(PendingId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MateEnd {
    Origin,
    #[serde(rename_all = "camelCase")]
    Connector {
        instance: InstanceRef,
        connector_id: String,
    },
}

impl MateEnd {
    fn existing(instance_id: &str, connector_id: &str) -> Self {
        MateEnd::Connector {
            instance: InstanceRef::Existing(instance_id.to_string()),
            connector_id: connector_id.to_string(),
        }
    }

    fn pending(id: PendingId, connector_id: &str) -> Self {
        MateEnd::Connector {
            instance: InstanceRef::Pending(id),
            connector_id: connector_id.to_string(),
        }
    }
}

/// A fastened mate to add, possibly referencing pending instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSpec {
    pub name: String,
    pub first: MateEnd,
    pub second: MateEnd,
}

/// A mate end with every placeholder replaced by a real instance id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ResolvedEnd {
    Origin,
    #[serde(rename_all = "camelCase")]
    Connector {
        instance_id: String,
        connector_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFeature {
    pub name: String,
    pub first: ResolvedEnd,
    pub second: ResolvedEnd,
}

impl FeatureSpec {
    pub fn resolve(&self, bindings: &BTreeMap<PendingId, String>) -> Result<ResolvedFeature> {
        Ok(ResolvedFeature {
            name: self.name.clone(),
            first: resolve_end(&self.first, bindings)?,
            second: resolve_end(&self.second, bindings)?,
        })
    }
}

fn resolve_end(end: &MateEnd, bindings: &BTreeMap<PendingId, String>) -> Result<ResolvedEnd> {
    match end {
        MateEnd::Origin => Ok(ResolvedEnd::Origin),
        MateEnd::Connector {
            instance,
            connector_id,
        } => {
            let instance_id = match instance {
                InstanceRef::Existing(id) => id.clone(),
                InstanceRef::Pending(pending) => bindings
                    .get(pending)
                    .cloned()
                    .ok_or_else(|| MateError::UnmatchedInstance {
                        entry: *pending,
                        path: format!("connector {connector_id}"),
                    })?,
            };
            Ok(ResolvedEnd::Connector {
                instance_id,
                connector_id: connector_id.clone(),
            })
        }
    }
}

/// The two ordered batches: instances first, then features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationPlan {
    pub pending_instances: Vec<PendingInstance>,
    pub pending_features: Vec<FeatureSpec>,
}

impl MutationPlan {
    pub fn is_empty(&self) -> bool {
        self.pending_instances.is_empty() && self.pending_features.is_empty()
    }

    fn add_instance(&mut self, source: InstanceSource, candidate: &Candidate, connector_id: &str) -> PendingId {
        let id = self.pending_instances.len();
        self.pending_instances.push(PendingInstance {
            id,
            source,
            for_instance: candidate.instance_id().to_string(),
            for_connector: connector_id.to_string(),
        });
        id
    }
}

/// How a single unused connector will be completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Origin,
    Target {
        path: ElementPath,
        target_connector: String,
    },
    Mirror {
        start_connector: String,
    },
}

pub struct ReconciliationEngine<'a> {
    maps: &'a ClassificationMaps,
    targets: &'a TargetCorrespondence,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(maps: &'a ClassificationMaps, targets: &'a TargetCorrespondence) -> Self {
        Self { maps, targets }
    }

    /// Part paths that already have an instance fastened to the origin
    /// through one of the origin-mirror connectors.
    pub fn origin_exclusions(&self, candidates: &[Candidate]) -> BTreeSet<PartPath> {
        candidates
            .iter()
            .filter(|c| c.used_connectors().any(|id| self.maps.origin_mirrors.contains(id)))
            .map(|c| c.part_path.clone())
            .collect()
    }

    /// Rule order is Origin, Target, Mirror; the first match wins.
    pub fn classify(&self, connector_id: &str, origin_allowed: bool) -> Option<Classification> {
        if origin_allowed && self.maps.origin_mirrors.contains(connector_id) {
            return Some(Classification::Origin);
        }
        if let (Some(path), Some(target_connector)) = (
            self.maps.targets.get(connector_id),
            self.targets.get(connector_id),
        ) {
            return Some(Classification::Target {
                path: path.clone(),
                target_connector: target_connector.clone(),
            });
        }
        self.maps
            .mirrors
            .get(connector_id)
            .map(|start| Classification::Mirror {
                start_connector: start.clone(),
            })
    }

    /// Build the plan. `candidates` may include fully used instances: they
    /// feed the origin exclusion set but add nothing to the plan.
    pub fn plan(&self, candidates: &[Candidate]) -> MutationPlan {
        let mut excluded = self.origin_exclusions(candidates);
        let mut plan = MutationPlan::default();

        for candidate in candidates.iter().filter(|c| !c.all_used) {
            for connector_id in candidate.unused_connectors() {
                let origin_allowed = !excluded.contains(&candidate.part_path);
                match self.classify(connector_id, origin_allowed) {
                    Some(Classification::Origin) => {
                        plan.pending_features.push(FeatureSpec {
                            name: MIRROR_MATE.to_string(),
                            first: MateEnd::Origin,
                            second: MateEnd::existing(candidate.instance_id(), connector_id),
                        });
                        excluded.insert(candidate.part_path.clone());
                    }
                    Some(Classification::Target {
                        path,
                        target_connector,
                    }) => {
                        let id = plan.add_instance(InstanceSource::part_studio(path), candidate, connector_id);
                        plan.pending_features.push(FeatureSpec {
                            name: FASTEN_MATE.to_string(),
                            first: MateEnd::pending(id, &target_connector),
                            second: MateEnd::existing(candidate.instance_id(), connector_id),
                        });
                    }
                    Some(Classification::Mirror { start_connector }) => {
                        let id = plan.add_instance(
                            InstanceSource::part(&candidate.part_path),
                            candidate,
                            connector_id,
                        );
                        plan.pending_features.push(FeatureSpec {
                            name: MIRROR_MATE.to_string(),
                            first: MateEnd::pending(id, &start_connector),
                            second: MateEnd::existing(candidate.instance_id(), connector_id),
                        });
                    }
                    None => {
                        tracing::debug!(
                            instance = %candidate.instance_id(),
                            connector = connector_id,
                            "connector matches no rule; leaving unused"
                        );
                    }
                }
            }
        }

        tracing::info!(
            instances = plan.pending_instances.len(),
            features = plan.pending_features.len(),
            "mutation plan built"
        );
        plan
    }
}
