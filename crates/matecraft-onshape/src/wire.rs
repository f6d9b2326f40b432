//! Request bodies for the assembly mutation endpoints.

use matecraft_core::path::WorkspaceOrVersion;
use matecraft_core::{InstanceSource, ResolvedEnd, ResolvedFeature};
use serde_json::{json, Value};

/// FeatureScript query selecting the part studio origin.
pub const ORIGIN_QUERY: &str = "query=qCreatedBy(makeId(\"Origin\"), EntityType.VERTEX);";

/// Body of `POST assemblies/{path}/instances`.
pub fn instance_body(source: &InstanceSource) -> Value {
    let document = &source.path.document;
    let mut body = json!({
        "documentId": document.document_id,
        "elementId": source.path.element_id,
        "isWholePartStudio": source.part_id.is_none(),
        "includePartTypes": ["PARTS"],
    });
    let key = match document.wv {
        WorkspaceOrVersion::Workspace => "workspaceId",
        WorkspaceOrVersion::Version => "versionId",
    };
    body[key] = json!(document.wv_id);
    if let Some(part_id) = &source.part_id {
        body["partId"] = json!(part_id);
    }
    body
}

fn end_query(end: &ResolvedEnd) -> Value {
    match end {
        ResolvedEnd::Origin => json!({
            "btType": "BTMIndividualQuery-138",
            "queryString": ORIGIN_QUERY,
        }),
        ResolvedEnd::Connector {
            instance_id,
            connector_id,
        } => json!({
            "btType": "BTMFeatureQueryWithOccurrence-157",
            "featureId": connector_id,
            "path": [instance_id],
            "queryData": "",
        }),
    }
}

/// Body of `POST assemblies/{path}/features`: a fastened mate between the
/// two ends.
pub fn feature_body(feature: &ResolvedFeature) -> Value {
    json!({
        "feature": {
            "btType": "BTMMate-64",
            "featureType": "mate",
            "name": feature.name,
            "parameters": [
                {
                    "btType": "BTMParameterEnum-145",
                    "parameterId": "mateType",
                    "enumName": "Mate type",
                    "value": "FASTENED",
                },
                {
                    "btType": "BTMParameterQueryWithOccurrenceList-67",
                    "parameterId": "mateConnectorsQuery",
                    "queries": [end_query(&feature.first), end_query(&feature.second)],
                },
            ],
        }
    })
}

/// Body of `POST partstudios/{path}/featurescript`.
pub fn featurescript_body(script: &str) -> Value {
    json!({ "script": script, "queries": [] })
}
