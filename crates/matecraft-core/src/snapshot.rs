//! Immutable view of one assembly at one point in time.

use crate::error::{MateError, Result};
use crate::model::{AssemblyDefinition, AssemblyQuery, Instance, MateFeature, Part};
use crate::path::{DocumentPath, ElementPath, PartPath};
use crate::CadService;
use std::collections::HashMap;

/// Instances, parts and mate features of an assembly.
///
/// Built from two documents fetched concurrently (the assembly definition
/// and the assembly feature list). Never mutated: after a mutation phase a
/// fresh snapshot is fetched instead.
#[derive(Debug, Clone)]
pub struct AssemblySnapshot {
    path: ElementPath,
    instances: Vec<Instance>,
    parts: HashMap<PartPath, Part>,
    features: Vec<MateFeature>,
}

impl AssemblySnapshot {
    /// Validates that every part instance names its part.
    pub fn new(
        path: ElementPath,
        definition: AssemblyDefinition,
        features: Vec<MateFeature>,
    ) -> Result<Self> {
        let AssemblyDefinition {
            root_assembly,
            parts,
        } = definition;

        for instance in &root_assembly.instances {
            if instance.is_part() && instance.part_id.is_none() {
                return Err(MateError::MalformedResponse(format!(
                    "part instance `{}` has no `partId`",
                    instance.id
                )));
            }
        }

        let mut snapshot = Self {
            path,
            instances: root_assembly.instances,
            parts: HashMap::new(),
            features,
        };
        for part in parts {
            let key = PartPath::new(
                snapshot.resolve(&part.document_id, &part.element_id, part.document_version.as_deref()),
                &part.part_id,
            );
            snapshot.parts.insert(key, part);
        }
        Ok(snapshot)
    }

    /// Fetch the assembly definition and its feature list concurrently and
    /// join both before returning.
    pub async fn fetch(cad: &dyn CadService, path: &ElementPath) -> Result<Self> {
        let (definition, features) = tokio::try_join!(
            cad.get_assembly(path, AssemblyQuery::full()),
            cad.get_assembly_features(path),
        )?;
        tracing::debug!(
            assembly = %path,
            instances = definition.root_assembly.instances.len(),
            parts = definition.parts.len(),
            features = features.len(),
            "fetched assembly snapshot"
        );
        Self::new(path.clone(), definition, features)
    }

    /// Re-fetch only the instance tree (no feature list).
    pub async fn fetch_instances(cad: &dyn CadService, path: &ElementPath) -> Result<Self> {
        let definition = cad.get_assembly(path, AssemblyQuery::instances_only()).await?;
        Self::new(path.clone(), definition, Vec::new())
    }

    pub fn path(&self) -> &ElementPath {
        &self.path
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn part(&self, part_path: &PartPath) -> Option<&Part> {
        self.parts.get(part_path)
    }

    /// Versioned references resolve into that version; everything else
    /// resolves into the workspace or version this assembly is read at.
    fn resolve(&self, document_id: &str, element_id: &str, version: Option<&str>) -> ElementPath {
        let document = match version {
            Some(v) => DocumentPath::version(document_id, v),
            None => DocumentPath {
                document_id: document_id.to_string(),
                wv: self.path.document.wv,
                wv_id: self.path.document.wv_id.clone(),
            },
        };
        ElementPath::new(document, element_id)
    }

    /// The part studio (or sub-assembly) an instance was created from.
    pub fn instance_path(&self, instance: &Instance) -> ElementPath {
        self.resolve(
            &instance.document_id,
            &instance.element_id,
            instance.document_version.as_deref(),
        )
    }

    pub fn part_path(&self, instance: &Instance) -> Option<PartPath> {
        let part_id = instance.part_id.as_deref()?;
        Some(PartPath::new(self.instance_path(instance), part_id))
    }

    /// Scans the full feature list; called once per (instance, connector).
    pub fn is_connector_used(&self, instance: &Instance, connector_id: &str) -> bool {
        self.features
            .iter()
            .any(|feature| feature.fastens(&instance.id, connector_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockCad};
    use crate::model::RootAssembly;

    fn assembly_path() -> ElementPath {
        ElementPath::new(DocumentPath::workspace("doc", "ws"), "asm")
    }

    #[test]
    fn test_part_instance_without_part_id_is_rejected() {
        let mut instance = mock::part_instance("i1", "doc", "ps", "P1");
        instance.part_id = None;
        let definition = AssemblyDefinition {
            root_assembly: RootAssembly {
                instances: vec![instance],
            },
            parts: vec![],
        };
        let err = AssemblySnapshot::new(assembly_path(), definition, vec![]).unwrap_err();
        assert!(matches!(err, MateError::MalformedResponse(_)));
    }

    #[test]
    fn test_instance_path_resolution() {
        let definition = AssemblyDefinition {
            root_assembly: RootAssembly {
                instances: vec![
                    mock::part_instance("i1", "doc", "ps", "P1"),
                    mock::versioned_part_instance("i2", "lib", "v3", "ps2", "P2"),
                ],
            },
            parts: vec![],
        };
        let snapshot = AssemblySnapshot::new(assembly_path(), definition, vec![]).unwrap();
        let workspace = snapshot.instance_path(&snapshot.instances()[0]);
        assert_eq!(workspace.document, DocumentPath::workspace("doc", "ws"));
        let versioned = snapshot.instance_path(&snapshot.instances()[1]);
        assert_eq!(versioned.document, DocumentPath::version("lib", "v3"));
    }

    #[test]
    fn test_unversioned_reference_follows_assembly_version() {
        let definition = AssemblyDefinition {
            root_assembly: RootAssembly {
                instances: vec![mock::part_instance("i1", "doc", "ps", "P1")],
            },
            parts: vec![mock::part("doc", "ps", "P1", &["C1"])],
        };
        let at_version = ElementPath::new(DocumentPath::version("doc", "v5"), "asm");
        let snapshot = AssemblySnapshot::new(at_version, definition, vec![]).unwrap();

        let path = snapshot.instance_path(&snapshot.instances()[0]);
        assert_eq!(path.document, DocumentPath::version("doc", "v5"));
        let part_path = snapshot.part_path(&snapshot.instances()[0]).unwrap();
        assert!(snapshot.part(&part_path).is_some());
    }

    #[tokio::test]
    async fn test_fetch_joins_definition_and_features() {
        let cad = MockCad::new(
            vec![mock::part_instance("i1", "doc", "ps", "P1")],
            vec![mock::part("doc", "ps", "P1", &["C1", "C2"])],
        )
        .with_features(vec![mock::fastened_mate("i1", "C1", "i9", "C9")]);

        let snapshot = AssemblySnapshot::fetch(&cad, &assembly_path()).await.unwrap();
        let instance = &snapshot.instances()[0];
        assert!(snapshot.is_connector_used(instance, "C1"));
        assert!(!snapshot.is_connector_used(instance, "C2"));

        let part_path = snapshot.part_path(instance).unwrap();
        assert_eq!(snapshot.part(&part_path).unwrap().mate_connectors.len(), 2);
        assert_eq!(cad.call_count(), 2);
    }
}
