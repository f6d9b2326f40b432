//! Integration tests for the complete matecraft pipeline
//!
//! The CAD service here stores the exact JSON bodies the Onshape client
//! would send and answers reads by parsing them back, so a run exercises:
//! - FeatureScript result decoding → classification
//! - reconciliation → instance/feature wire encoding
//! - feature list parsing → connector usage on the next run
//!
//! Run with: cargo test --test integration_tests

use async_trait::async_trait;
use matecraft_core::model::parse_features;
use matecraft_core::{
    AssemblyDefinition, AssemblyQuery, AutoMate, CadService, DocumentPath, ElementPath,
    ExecutionReport, InstanceSource, MateError, MateFeature, ResolvedFeature, Result, Script,
    ScriptEvaluator,
};
use matecraft_onshape::client::decode_evaluation;
use matecraft_onshape::wire;
use serde_json::{json, Value};
use std::collections::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;

// ============================================================================
// JSON-backed CAD service
// ============================================================================

struct JsonCad {
    definition: Mutex<Value>,
    features: Mutex<Vec<Value>>,
    next_id: Mutex<usize>,
}

impl JsonCad {
    fn new(definition: Value) -> Self {
        Self {
            definition: Mutex::new(definition),
            features: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    fn feature_names(&self) -> Vec<String> {
        self.features
            .lock()
            .iter()
            .map(|f| f["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn instance_count(&self) -> usize {
        self.definition.lock()["rootAssembly"]["instances"]
            .as_array()
            .map(Vec::len)
            .unwrap_or_default()
    }
}

#[async_trait]
impl CadService for JsonCad {
    async fn get_assembly(&self, _path: &ElementPath, _query: AssemblyQuery) -> Result<AssemblyDefinition> {
        let definition = self.definition.lock().clone();
        AssemblyDefinition::from_json(definition)
    }

    async fn get_assembly_features(&self, _path: &ElementPath) -> Result<Vec<MateFeature>> {
        let features = self.features.lock().clone();
        parse_features(&json!({ "features": features }))
    }

    async fn add_instance(&self, _assembly: &ElementPath, source: &InstanceSource) -> Result<()> {
        let body = wire::instance_body(source);
        let mut definition = self.definition.lock();
        let part_id = match body.get("partId") {
            Some(id) => id.clone(),
            None => definition["parts"]
                .as_array()
                .and_then(|parts| parts.iter().find(|p| p["elementId"] == body["elementId"]))
                .map(|p| p["partId"].clone())
                .ok_or_else(|| MateError::Api {
                    status: 404,
                    message: "empty part studio".into(),
                })?,
        };
        let mut next_id = self.next_id.lock();
        *next_id += 1;
        let mut instance = json!({
            "id": format!("added{}", *next_id),
            "type": "Part",
            "documentId": body["documentId"],
            "elementId": body["elementId"],
            "partId": part_id,
        });
        if let Some(version) = body.get("versionId") {
            instance["documentVersion"] = version.clone();
        }
        if let Some(instances) = definition["rootAssembly"]["instances"].as_array_mut() {
            instances.push(instance);
        }
        Ok(())
    }

    async fn add_feature(&self, _assembly: &ElementPath, feature: &ResolvedFeature) -> Result<()> {
        let body = wire::feature_body(feature);
        self.features.lock().push(body["feature"].clone());
        Ok(())
    }
}

// ============================================================================
// FeatureScript-encoding evaluator
// ============================================================================

fn fs_encode(value: &Value) -> Value {
    match value {
        Value::Object(map) => json!({
            "btType": "BTFSValueMap-2062",
            "value": map
                .iter()
                .map(|(k, v)| json!({ "key": fs_encode(&json!(k)), "value": fs_encode(v) }))
                .collect::<Vec<_>>(),
        }),
        Value::Array(items) => json!({
            "btType": "BTFSValueArray-1499",
            "value": items.iter().map(fs_encode).collect::<Vec<_>>(),
        }),
        Value::String(_) => json!({ "btType": "BTFSValueString-1422", "value": value }),
        Value::Bool(_) => json!({ "btType": "BTFSValueBoolean-1195", "value": value }),
        Value::Number(_) => json!({ "btType": "BTFSValueNumber-772", "value": value }),
        Value::Null => json!({ "btType": "BTFSValueUndefined-2003" }),
    }
}

#[derive(Default)]
struct FsEvaluator {
    results: HashMap<(ElementPath, Script), Value>,
}

impl FsEvaluator {
    fn with(mut self, path: ElementPath, script: Script, result: Value) -> Self {
        self.results.insert((path, script), result);
        self
    }
}

#[async_trait]
impl ScriptEvaluator for FsEvaluator {
    async fn evaluate(&self, path: &ElementPath, script: Script) -> Result<Value> {
        let plain = self
            .results
            .get(&(path.clone(), script))
            .cloned()
            .unwrap_or_else(|| json!({ "valid": false }));
        decode_evaluation(&json!({ "result": fs_encode(&plain) }))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn ws(element_id: &str) -> ElementPath {
    ElementPath::new(DocumentPath::workspace("doc", "ws"), element_id)
}

fn bracket_assembly() -> Value {
    json!({
        "rootAssembly": { "instances": [
            { "id": "base", "type": "Part", "documentId": "doc", "elementId": "frame", "partId": "F" },
            { "id": "sub", "type": "Assembly", "documentId": "doc", "elementId": "other" },
        ]},
        "parts": [
            { "documentId": "doc", "elementId": "frame", "partId": "F",
              "mateConnectors": [ { "featureId": "mountL" }, { "featureId": "mountR" }, { "featureId": "ground" } ] },
            { "documentId": "doc", "elementId": "bolt", "partId": "B",
              "mateConnectors": [ { "featureId": "head" } ] },
        ]
    })
}

fn bracket_evaluator() -> FsEvaluator {
    FsEvaluator::default()
        .with(
            ws("frame"),
            Script::ClassifyPartStudio,
            json!({
                "valid": true,
                "mates": [
                    { "mateId": "mountL", "documentId": "doc", "workspaceId": "ws", "elementId": "bolt" }
                ],
                "mirrors": [
                    { "endMateId": "mountR", "startMateId": "mountL", "mateToOrigin": false },
                    { "endMateId": "ground", "mateToOrigin": true }
                ],
            }),
        )
        .with(ws("bolt"), Script::ResolveTarget, json!({ "targetMateId": "head" }))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_pipeline_through_wire_encoding() {
    let cad = Arc::new(JsonCad::new(bracket_assembly()));
    let engine = AutoMate::new(cad.clone(), Arc::new(bracket_evaluator()));

    let report = engine.run(&ws("asm")).await.unwrap();
    // mountL → bolt instance, mountR → mirrored frame, ground → origin.
    assert_eq!(report, ExecutionReport { instances_added: 2, features_added: 3 });
    assert_eq!(cad.instance_count(), 4);

    let mut names = cad.feature_names();
    names.sort();
    assert_eq!(names, vec!["Fasten mate", "Mirror mate", "Mirror mate"]);
}

#[tokio::test]
async fn test_second_run_only_touches_new_connectors() {
    let cad = Arc::new(JsonCad::new(bracket_assembly()));
    let engine = AutoMate::new(cad.clone(), Arc::new(bracket_evaluator()));
    engine.run(&ws("asm")).await.unwrap();

    let planned = engine.plan(&ws("asm")).await.unwrap();
    let base = planned
        .candidates
        .iter()
        .find(|c| c.instance_id() == "base")
        .unwrap();
    assert!(base.all_used);

    // The mirrored frame copy has mountL fastened; its mountR and ground
    // are still open and get the same treatment as the original, except
    // that the frame part path is already fastened to the origin.
    for spec in &planned.plan.pending_features {
        assert_ne!(spec.first, matecraft_core::MateEnd::Origin);
    }
}

#[tokio::test]
async fn test_versioned_assembly_reference() {
    let mut definition = bracket_assembly();
    definition["rootAssembly"]["instances"][0]["documentVersion"] = json!("v7");
    definition["parts"][0]["documentVersion"] = json!("v7");
    let cad = Arc::new(JsonCad::new(definition));

    let frame_v7 = ElementPath::new(DocumentPath::version("doc", "v7"), "frame");
    let evaluator = FsEvaluator::default().with(
        frame_v7,
        Script::ClassifyPartStudio,
        json!({
            "valid": true,
            "mates": [],
            "mirrors": [ { "endMateId": "mountR", "startMateId": "mountL", "mateToOrigin": false } ],
        }),
    );

    let report = AutoMate::new(cad.clone(), Arc::new(evaluator))
        .run(&ws("asm"))
        .await
        .unwrap();
    assert_eq!(report, ExecutionReport { instances_added: 1, features_added: 1 });

    let definition = cad.definition.lock().clone();
    let added = &definition["rootAssembly"]["instances"][2];
    assert_eq!(added["documentVersion"], "v7");
    assert_eq!(added["partId"], "F");
}

#[tokio::test]
async fn test_malformed_evaluation_result_fails_the_run() {
    let cad = Arc::new(JsonCad::new(bracket_assembly()));
    let evaluator = FsEvaluator::default().with(
        ws("frame"),
        Script::ClassifyPartStudio,
        json!({ "valid": true, "mates": [ { "mateId": "mountL" } ], "mirrors": [] }),
    );

    let err = AutoMate::new(cad.clone(), Arc::new(evaluator))
        .run(&ws("asm"))
        .await
        .unwrap_err();
    assert!(matches!(err, MateError::MalformedResponse(_)));
    assert!(cad.feature_names().is_empty());
}
