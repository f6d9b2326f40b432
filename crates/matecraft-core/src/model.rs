//! Typed records for CAD platform payloads.
//!
//! Raw JSON from the data service is validated here, once, at the boundary.
//! A missing required field is a [`MateError::MalformedResponse`], never a
//! silent default; optional fields are modelled as `Option` or empty lists.

use crate::error::{MateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Instance type tag. Anything other than parts and sub-assemblies is carried
/// as `Other` and ignored by the candidate selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceType {
    Part,
    Assembly,
    #[serde(other)]
    Other,
}

/// One placement of a part or sub-assembly inside an assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    pub document_id: String,
    pub element_id: String,
    #[serde(default)]
    pub part_id: Option<String>,
    #[serde(default)]
    pub document_version: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Instance {
    pub fn is_part(&self) -> bool {
        self.kind == InstanceType::Part
    }
}

/// A mate connector declared by a part; identified by the feature that
/// created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MateConnector {
    pub feature_id: String,
}

/// A part referenced by the assembly, with its declared mate connectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub document_id: String,
    pub element_id: String,
    pub part_id: String,
    #[serde(default)]
    pub document_version: Option<String>,
    #[serde(default)]
    pub mate_connectors: Vec<MateConnector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootAssembly {
    #[serde(default)]
    pub instances: Vec<Instance>,
}

/// The assembly definition document: root instances plus referenced parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyDefinition {
    pub root_assembly: RootAssembly,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl AssemblyDefinition {
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| MateError::malformed("assembly definition", e))
    }
}

/// Options for fetching an assembly definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyQuery {
    pub include_mate_features: bool,
    pub include_mate_connectors: bool,
}

impl AssemblyQuery {
    /// Everything the selector needs.
    pub fn full() -> Self {
        Self {
            include_mate_features: true,
            include_mate_connectors: true,
        }
    }

    /// Enough to see newly created instances after phase 1.
    pub fn instances_only() -> Self {
        Self {
            include_mate_features: false,
            include_mate_connectors: true,
        }
    }
}

/// A single occurrence query inside a mate: connector `feature_id` on the
/// instance at `path[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MateQuery {
    pub feature_id: String,
    pub path: Vec<String>,
}

/// An assembly feature, reduced to what connector-usage detection needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MateFeature {
    pub feature_id: Option<String>,
    pub name: Option<String>,
    pub feature_type: Option<String>,
    /// Value of the `mateType` parameter, when present.
    pub mate_type: Option<String>,
    /// Queries of the `mateConnectorsQuery` parameter.
    pub queries: Vec<MateQuery>,
}

impl MateFeature {
    /// A mate whose `mateType` is absent or `FASTENED`.
    pub fn is_fastened_mate(&self) -> bool {
        if self.feature_type.as_deref() != Some("mate") {
            return false;
        }
        match self.mate_type.as_deref() {
            None => true,
            Some(t) => t == "FASTENED",
        }
    }

    /// True if this is a fastened mate that consumes `connector_id` on
    /// `instance_id`.
    pub fn fastens(&self, instance_id: &str, connector_id: &str) -> bool {
        self.is_fastened_mate()
            && self.queries.iter().any(|q| {
                q.feature_id == connector_id && q.path.first().map(String::as_str) == Some(instance_id)
            })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeature {
    feature_id: Option<String>,
    name: Option<String>,
    feature_type: Option<String>,
    #[serde(default)]
    parameters: Vec<RawParameter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParameter {
    parameter_id: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    queries: Vec<Value>,
}

/// Parse the `features` list of an assembly features document.
pub fn parse_features(value: &Value) -> Result<Vec<MateFeature>> {
    let list = value
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| MateError::MalformedResponse("assembly features: missing `features`".into()))?;

    list.iter().map(parse_feature).collect()
}

/// Connector occurrence queries; untagged queries are assumed to be one.
/// Other query kinds (the origin, for instance) reference no connector.
fn is_occurrence_query(query: &Value) -> bool {
    match query.get("btType").and_then(Value::as_str) {
        Some(bt_type) => bt_type.starts_with("BTMFeatureQueryWithOccurrence"),
        None => true,
    }
}

fn parse_feature(value: &Value) -> Result<MateFeature> {
    let raw: RawFeature =
        serde_json::from_value(value.clone()).map_err(|e| MateError::malformed("assembly feature", e))?;
    let is_mate = raw.feature_type.as_deref() == Some("mate");

    let mut mate_type = None;
    let mut queries = Vec::new();
    for param in raw.parameters {
        match param.parameter_id.as_str() {
            "mateType" => {
                mate_type = param.value.as_ref().and_then(Value::as_str).map(str::to_string);
            }
            // Only mate queries participate in usage detection; other
            // features may carry arbitrary query shapes.
            "mateConnectorsQuery" if is_mate => {
                for q in param.queries.into_iter().filter(is_occurrence_query) {
                    let query: MateQuery = serde_json::from_value(q)
                        .map_err(|e| MateError::malformed("mate connector query", e))?;
                    queries.push(query);
                }
            }
            _ => {}
        }
    }

    Ok(MateFeature {
        feature_id: raw.feature_id,
        name: raw.name,
        feature_type: raw.feature_type,
        mate_type,
        queries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fastened(instance: &str, connector: &str) -> Value {
        json!({
            "featureType": "mate",
            "featureId": "M1",
            "name": "Fastened 1",
            "parameters": [
                { "parameterId": "mateType", "value": "FASTENED" },
                { "parameterId": "mateConnectorsQuery", "queries": [
                    { "featureId": connector, "path": [instance] }
                ]}
            ]
        })
    }

    #[test]
    fn test_definition_requires_root_assembly() {
        let err = AssemblyDefinition::from_json(json!({ "parts": [] })).unwrap_err();
        assert!(matches!(err, MateError::MalformedResponse(_)));
    }

    #[test]
    fn test_instance_missing_id_is_malformed() {
        let err = AssemblyDefinition::from_json(json!({
            "rootAssembly": { "instances": [
                { "type": "Part", "documentId": "d", "elementId": "e" }
            ]}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn test_unknown_instance_type_is_other() {
        let def = AssemblyDefinition::from_json(json!({
            "rootAssembly": { "instances": [
                { "id": "i1", "type": "Feature", "documentId": "d", "elementId": "e" }
            ]}
        }))
        .unwrap();
        assert_eq!(def.root_assembly.instances[0].kind, InstanceType::Other);
    }

    #[test]
    fn test_fastened_mate_detection() {
        let features = parse_features(&json!({ "features": [fastened("I1", "C1")] })).unwrap();
        assert!(features[0].fastens("I1", "C1"));
        assert!(!features[0].fastens("I2", "C1"));
        assert!(!features[0].fastens("I1", "C2"));
    }

    #[test]
    fn test_revolute_mate_does_not_fasten() {
        let mut feature = fastened("I1", "C1");
        feature["parameters"][0]["value"] = json!("REVOLUTE");
        let features = parse_features(&json!({ "features": [feature] })).unwrap();
        assert!(!features[0].fastens("I1", "C1"));
    }

    #[test]
    fn test_missing_mate_type_counts_as_fastened() {
        let features = parse_features(&json!({ "features": [{
            "featureType": "mate",
            "parameters": [
                { "parameterId": "mateConnectorsQuery", "queries": [
                    { "featureId": "C1", "path": ["I1"] }
                ]}
            ]
        }]}))
        .unwrap();
        assert!(features[0].fastens("I1", "C1"));
    }

    #[test]
    fn test_mate_query_without_feature_id_is_malformed() {
        let err = parse_features(&json!({ "features": [{
            "featureType": "mate",
            "parameters": [
                { "parameterId": "mateConnectorsQuery", "queries": [ { "path": ["I1"] } ] }
            ]
        }]}))
        .unwrap_err();
        assert!(matches!(err, MateError::MalformedResponse(_)));
    }

    #[test]
    fn test_origin_query_is_skipped() {
        let features = parse_features(&json!({ "features": [{
            "featureType": "mate",
            "parameters": [
                { "parameterId": "mateConnectorsQuery", "queries": [
                    { "btType": "BTMIndividualQuery-138", "queryString": "query=qEverything();" },
                    { "btType": "BTMFeatureQueryWithOccurrence-157", "featureId": "C1", "path": ["I1"] }
                ]}
            ]
        }]}))
        .unwrap();
        assert_eq!(features[0].queries.len(), 1);
        assert!(features[0].fastens("I1", "C1"));
    }

    #[test]
    fn test_non_mate_queries_are_ignored() {
        let features = parse_features(&json!({ "features": [{
            "featureType": "mateConnector",
            "parameters": [
                { "parameterId": "mateConnectorsQuery", "queries": [ { "weird": true } ] }
            ]
        }]}))
        .unwrap();
        assert!(features[0].queries.is_empty());
    }
}
