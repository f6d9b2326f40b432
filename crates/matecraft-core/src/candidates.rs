//! Candidate selection: which part instances still have open connectors.

use crate::model::Instance;
use crate::path::{ElementPath, PartPath};
use crate::snapshot::AssemblySnapshot;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorUsage {
    pub connector_id: String,
    pub used: bool,
}

/// One part instance together with the usage state of every connector its
/// part declares, in declaration order.
///
/// `all_used` is true iff every connector is used (vacuously true for a part
/// without connectors).
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub instance: Instance,
    pub part_path: PartPath,
    pub connectors: Vec<ConnectorUsage>,
    pub all_used: bool,
}

impl Candidate {
    pub fn new(instance: Instance, part_path: PartPath, connectors: Vec<ConnectorUsage>) -> Self {
        let all_used = connectors.iter().all(|c| c.used);
        Self {
            instance,
            part_path,
            connectors,
            all_used,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance.id
    }

    /// The part studio that owns this candidate's part.
    pub fn element_path(&self) -> &ElementPath {
        &self.part_path.path
    }

    pub fn unused_connectors(&self) -> impl Iterator<Item = &str> {
        self.connectors
            .iter()
            .filter(|c| !c.used)
            .map(|c| c.connector_id.as_str())
    }

    pub fn used_connectors(&self) -> impl Iterator<Item = &str> {
        self.connectors
            .iter()
            .filter(|c| c.used)
            .map(|c| c.connector_id.as_str())
    }
}

/// Every part instance of the snapshot as a candidate, fully used or not.
///
/// Usage is computed by scanning the whole feature list once per
/// (instance, connector), which is O(instances × features). Fine for the
/// assembly sizes this runs against.
pub fn scan(snapshot: &AssemblySnapshot) -> Vec<Candidate> {
    let mut result = Vec::new();
    for instance in snapshot.instances().iter().filter(|i| i.is_part()) {
        let Some(part_path) = snapshot.part_path(instance) else {
            continue;
        };
        let Some(part) = snapshot.part(&part_path) else {
            tracing::warn!(
                instance = %instance.id,
                part = %part_path,
                "instance references a part missing from the assembly definition"
            );
            continue;
        };

        let connectors = part
            .mate_connectors
            .iter()
            .map(|mc| ConnectorUsage {
                connector_id: mc.feature_id.clone(),
                used: snapshot.is_connector_used(instance, &mc.feature_id),
            })
            .collect();
        result.push(Candidate::new(instance.clone(), part_path, connectors));
    }
    result
}

/// Candidates with at least one unused connector.
pub fn select(snapshot: &AssemblySnapshot) -> Vec<Candidate> {
    scan(snapshot).into_iter().filter(|c| !c.all_used).collect()
}

/// Distinct part studios owning the eligible candidates.
pub fn part_studios<'a>(candidates: impl IntoIterator<Item = &'a Candidate>) -> BTreeSet<ElementPath> {
    candidates
        .into_iter()
        .filter(|c| !c.all_used)
        .map(|c| c.element_path().clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;
    use crate::model::{AssemblyDefinition, RootAssembly};
    use crate::path::DocumentPath;

    fn snapshot(
        instances: Vec<Instance>,
        parts: Vec<crate::model::Part>,
        features: Vec<crate::model::MateFeature>,
    ) -> AssemblySnapshot {
        AssemblySnapshot::new(
            ElementPath::new(DocumentPath::workspace("doc", "ws"), "asm"),
            AssemblyDefinition {
                root_assembly: RootAssembly { instances },
                parts,
            },
            features,
        )
        .unwrap()
    }

    #[test]
    fn test_fully_used_instances_are_excluded() {
        let snap = snapshot(
            vec![
                mock::part_instance("x", "doc", "ps", "P1"),
                mock::part_instance("y", "doc", "ps", "P1"),
            ],
            vec![mock::part("doc", "ps", "P1", &["C1"])],
            vec![mock::fastened_mate("x", "C1", "y", "C1")],
        );
        assert!(select(&snap).is_empty());
        let all = scan(&snap);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.all_used));
    }

    #[test]
    fn test_partially_used_instance_is_selected() {
        let snap = snapshot(
            vec![mock::part_instance("x", "doc", "ps", "P1")],
            vec![mock::part("doc", "ps", "P1", &["C1", "C2"])],
            vec![mock::origin_mate("x", "C1")],
        );
        let selected = select(&snap);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].unused_connectors().collect::<Vec<_>>(), vec!["C2"]);
        assert_eq!(selected[0].used_connectors().collect::<Vec<_>>(), vec!["C1"]);
        assert!(!selected[0].all_used);
    }

    #[test]
    fn test_parts_without_connectors_are_never_candidates() {
        let snap = snapshot(
            vec![mock::part_instance("x", "doc", "ps", "P1")],
            vec![mock::part("doc", "ps", "P1", &[])],
            vec![],
        );
        assert!(select(&snap).is_empty());
    }

    #[test]
    fn test_sub_assemblies_are_skipped() {
        let snap = snapshot(
            vec![mock::assembly_instance("sub", "doc", "asm2")],
            vec![],
            vec![],
        );
        assert!(scan(&snap).is_empty());
    }

    #[test]
    fn test_part_studios_are_deduplicated() {
        let snap = snapshot(
            vec![
                mock::part_instance("x", "doc", "ps", "P1"),
                mock::part_instance("y", "doc", "ps", "P2"),
                mock::part_instance("z", "doc", "ps2", "P3"),
            ],
            vec![
                mock::part("doc", "ps", "P1", &["C1"]),
                mock::part("doc", "ps", "P2", &["C2"]),
                mock::part("doc", "ps2", "P3", &["C3"]),
            ],
            vec![],
        );
        let candidates = select(&snap);
        let studios = part_studios(&candidates);
        assert_eq!(studios.len(), 2);
    }
}
