//! In-memory CAD service and script evaluator for testing.
//!
//! [`MockCad`] keeps an assembly in memory and applies instance and feature
//! additions to it, so a second run against the same mock sees the effects
//! of the first. Every call is recorded twice (start and finish) with a
//! yield in between, which lets tests check phase ordering.

use crate::error::{MateError, Result};
use crate::model::{
    AssemblyDefinition, AssemblyQuery, Instance, InstanceType, MateConnector, MateFeature, MateQuery,
    Part, RootAssembly,
};
use crate::path::{ElementPath, WorkspaceOrVersion};
use crate::reconcile::{InstanceSource, ResolvedEnd, ResolvedFeature};
use crate::{CadService, Script, ScriptEvaluator};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;

// ============================================================================
// Fixtures
// ============================================================================

pub fn part_instance(id: &str, document_id: &str, element_id: &str, part_id: &str) -> Instance {
    Instance {
        id: id.to_string(),
        kind: InstanceType::Part,
        document_id: document_id.to_string(),
        element_id: element_id.to_string(),
        part_id: Some(part_id.to_string()),
        document_version: None,
        name: None,
    }
}

pub fn versioned_part_instance(
    id: &str,
    document_id: &str,
    version_id: &str,
    element_id: &str,
    part_id: &str,
) -> Instance {
    Instance {
        document_version: Some(version_id.to_string()),
        ..part_instance(id, document_id, element_id, part_id)
    }
}

pub fn assembly_instance(id: &str, document_id: &str, element_id: &str) -> Instance {
    Instance {
        id: id.to_string(),
        kind: InstanceType::Assembly,
        document_id: document_id.to_string(),
        element_id: element_id.to_string(),
        part_id: None,
        document_version: None,
        name: None,
    }
}

pub fn part(document_id: &str, element_id: &str, part_id: &str, connectors: &[&str]) -> Part {
    Part {
        document_id: document_id.to_string(),
        element_id: element_id.to_string(),
        part_id: part_id.to_string(),
        document_version: None,
        mate_connectors: connectors
            .iter()
            .map(|c| MateConnector {
                feature_id: c.to_string(),
            })
            .collect(),
    }
}

fn fastened(queries: Vec<MateQuery>) -> MateFeature {
    MateFeature {
        feature_id: None,
        name: None,
        feature_type: Some("mate".to_string()),
        mate_type: Some("FASTENED".to_string()),
        queries,
    }
}

fn query(instance_id: &str, connector_id: &str) -> MateQuery {
    MateQuery {
        feature_id: connector_id.to_string(),
        path: vec![instance_id.to_string()],
    }
}

/// A fastened mate between two instance connectors.
pub fn fastened_mate(instance_a: &str, connector_a: &str, instance_b: &str, connector_b: &str) -> MateFeature {
    fastened(vec![query(instance_a, connector_a), query(instance_b, connector_b)])
}

/// A fastened mate between an instance connector and the origin.
pub fn origin_mate(instance_id: &str, connector_id: &str) -> MateFeature {
    fastened(vec![query(instance_id, connector_id)])
}

/// Classification result with the given `(end, start)` mirrors and origin
/// mirrors, and no targets.
pub fn mirror_report(mirrors: &[(&str, &str)], origin: &[&str]) -> Value {
    let mut entries: Vec<Value> = mirrors
        .iter()
        .map(|(end, start)| json!({ "endMateId": end, "startMateId": start, "mateToOrigin": false }))
        .collect();
    entries.extend(
        origin
            .iter()
            .map(|end| json!({ "endMateId": end, "mateToOrigin": true })),
    );
    json!({ "valid": true, "mates": [], "mirrors": entries })
}

/// Classification result pointing each connector at a target part studio.
pub fn target_report(targets: &[(&str, &ElementPath)]) -> Value {
    let mates: Vec<Value> = targets
        .iter()
        .map(|(connector, path)| {
            json!({
                "mateId": connector,
                "documentId": path.document.document_id,
                "wvm": path.document.wv.as_str(),
                "wvmId": path.document.wv_id,
                "elementId": path.element_id,
            })
        })
        .collect();
    json!({ "valid": true, "mates": mates, "mirrors": [] })
}

// ============================================================================
// Mock CAD Service
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CadCall {
    GetAssembly(ElementPath),
    GetFeatures(ElementPath),
    AddInstance(InstanceSource),
    AddFeature(ResolvedFeature),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CadEvent {
    pub call: CadCall,
    pub finished: bool,
}

#[derive(Default)]
struct CadState {
    instances: Vec<Instance>,
    parts: Vec<Part>,
    features: Vec<MateFeature>,
    added_features: Vec<ResolvedFeature>,
    next_id: usize,
}

pub struct MockCad {
    state: Mutex<CadState>,
    trace: Mutex<Vec<CadEvent>>,
    fail_instance_adds: bool,
}

impl MockCad {
    pub fn new(instances: Vec<Instance>, parts: Vec<Part>) -> Self {
        Self {
            state: Mutex::new(CadState {
                instances,
                parts,
                ..Default::default()
            }),
            trace: Mutex::new(Vec::new()),
            fail_instance_adds: false,
        }
    }

    pub fn with_features(self, features: Vec<MateFeature>) -> Self {
        self.state.lock().features = features;
        self
    }

    /// Every add-instance request fails with a 500.
    pub fn failing_instance_adds(mut self) -> Self {
        self.fail_instance_adds = true;
        self
    }

    pub fn trace(&self) -> Vec<CadEvent> {
        self.trace.lock().clone()
    }

    /// Number of calls started so far.
    pub fn call_count(&self) -> usize {
        self.trace.lock().iter().filter(|e| !e.finished).count()
    }

    pub fn added_features(&self) -> Vec<ResolvedFeature> {
        self.state.lock().added_features.clone()
    }

    fn record(&self, call: &CadCall, finished: bool) {
        self.trace.lock().push(CadEvent {
            call: call.clone(),
            finished,
        });
    }

    async fn enter(&self, call: &CadCall) {
        self.record(call, false);
        tokio::task::yield_now().await;
    }

    fn insert_instances(&self, source: &InstanceSource) -> Result<()> {
        let mut state = self.state.lock();
        let version = match source.path.document.wv {
            WorkspaceOrVersion::Version => Some(source.path.document.wv_id.clone()),
            WorkspaceOrVersion::Workspace => None,
        };
        let part_ids: Vec<String> = match &source.part_id {
            Some(part_id) => vec![part_id.clone()],
            None => state
                .parts
                .iter()
                .filter(|p| {
                    p.document_id == source.path.document.document_id
                        && p.element_id == source.path.element_id
                })
                .map(|p| p.part_id.clone())
                .collect(),
        };
        if part_ids.is_empty() {
            return Err(MateError::Api {
                status: 404,
                message: format!("no parts in {}", source.path),
            });
        }

        for part_id in part_ids {
            state.next_id += 1;
            let id = format!("new-{}", state.next_id);
            state.instances.push(Instance {
                document_version: version.clone(),
                ..part_instance(
                    &id,
                    &source.path.document.document_id,
                    &source.path.element_id,
                    &part_id,
                )
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CadService for MockCad {
    async fn get_assembly(&self, path: &ElementPath, _query: AssemblyQuery) -> Result<AssemblyDefinition> {
        let call = CadCall::GetAssembly(path.clone());
        self.enter(&call).await;
        let definition = {
            let state = self.state.lock();
            AssemblyDefinition {
                root_assembly: RootAssembly {
                    instances: state.instances.clone(),
                },
                parts: state.parts.clone(),
            }
        };
        self.record(&call, true);
        Ok(definition)
    }

    async fn get_assembly_features(&self, path: &ElementPath) -> Result<Vec<MateFeature>> {
        let call = CadCall::GetFeatures(path.clone());
        self.enter(&call).await;
        let features = self.state.lock().features.clone();
        self.record(&call, true);
        Ok(features)
    }

    async fn add_instance(&self, _assembly: &ElementPath, source: &InstanceSource) -> Result<()> {
        let call = CadCall::AddInstance(source.clone());
        self.enter(&call).await;
        let result = if self.fail_instance_adds {
            Err(MateError::Api {
                status: 500,
                message: "instance insertion failed".to_string(),
            })
        } else {
            self.insert_instances(source)
        };
        self.record(&call, true);
        result
    }

    async fn add_feature(&self, _assembly: &ElementPath, feature: &ResolvedFeature) -> Result<()> {
        let call = CadCall::AddFeature(feature.clone());
        self.enter(&call).await;
        {
            let mut state = self.state.lock();
            let queries = [&feature.first, &feature.second]
                .into_iter()
                .filter_map(|end| match end {
                    ResolvedEnd::Origin => None,
                    ResolvedEnd::Connector {
                        instance_id,
                        connector_id,
                    } => Some(query(instance_id, connector_id)),
                })
                .collect();
            state.features.push(fastened(queries));
            state.added_features.push(feature.clone());
        }
        self.record(&call, true);
        Ok(())
    }
}

// ============================================================================
// Mock Script Evaluator
// ============================================================================

/// Canned script results keyed by part studio. An unscripted part studio
/// answers with a 404.
#[derive(Default)]
pub struct MockEvaluator {
    classifications: HashMap<ElementPath, Value>,
    targets: HashMap<ElementPath, Value>,
    calls: Mutex<Vec<(ElementPath, Script)>>,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(mut self, path: ElementPath, result: Value) -> Self {
        self.classifications.insert(path, result);
        self
    }

    pub fn target(mut self, path: ElementPath, target_mate_id: &str) -> Self {
        self.targets
            .insert(path, json!({ "targetMateId": target_mate_id }));
        self
    }

    pub fn calls(&self, script: Script) -> usize {
        self.calls.lock().iter().filter(|(_, s)| *s == script).count()
    }
}

#[async_trait]
impl ScriptEvaluator for MockEvaluator {
    async fn evaluate(&self, path: &ElementPath, script: Script) -> Result<Value> {
        self.calls.lock().push((path.clone(), script));
        tokio::task::yield_now().await;
        let table = match script {
            Script::ClassifyPartStudio => &self.classifications,
            Script::ResolveTarget => &self.targets,
        };
        table.get(path).cloned().ok_or_else(|| MateError::Api {
            status: 404,
            message: format!("no {script:?} result scripted for {path}"),
        })
    }
}
