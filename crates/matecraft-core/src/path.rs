//! Element and part addressing.
//!
//! An [`ElementPath`] names a part studio or assembly inside a document at a
//! specific workspace or version. Paths are plain values: they are compared,
//! hashed and ordered structurally and are used as map and set keys across
//! the whole pipeline.

use crate::error::{MateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Whether a document path points at a mutable workspace or a frozen version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkspaceOrVersion {
    #[serde(rename = "w")]
    Workspace,
    #[serde(rename = "v")]
    Version,
}

impl WorkspaceOrVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceOrVersion::Workspace => "w",
            WorkspaceOrVersion::Version => "v",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "w" | "workspace" => Ok(Self::Workspace),
            "v" | "version" => Ok(Self::Version),
            other => Err(MateError::InvalidPath(format!(
                "expected `w` or `v`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPath {
    pub document_id: String,
    pub wv: WorkspaceOrVersion,
    pub wv_id: String,
}

impl DocumentPath {
    pub fn workspace(document_id: &str, workspace_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            wv: WorkspaceOrVersion::Workspace,
            wv_id: workspace_id.to_string(),
        }
    }

    pub fn version(document_id: &str, version_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            wv: WorkspaceOrVersion::Version,
            wv_id: version_id.to_string(),
        }
    }
}

/// A part studio or assembly at a workspace or version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPath {
    pub document: DocumentPath,
    pub element_id: String,
}

impl ElementPath {
    pub fn new(document: DocumentPath, element_id: &str) -> Self {
        Self {
            document,
            element_id: element_id.to_string(),
        }
    }

    /// Build a path from a JSON object carrying `documentId`, `elementId` and
    /// one of `workspaceId`, `versionId`, or the pair `wvm` + `wvmId`.
    ///
    /// This is the shape of both the inbound request body and the target
    /// records reported by the classification script.
    pub fn from_json(value: &Value) -> Result<Self> {
        let field = |name: &str| -> Option<&str> {
            value
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };

        let document_id = field("documentId")
            .ok_or_else(|| MateError::InvalidPath("missing `documentId`".to_string()))?;
        let element_id = field("elementId")
            .ok_or_else(|| MateError::InvalidPath("missing `elementId`".to_string()))?;

        let document = match (field("workspaceId"), field("versionId")) {
            (Some(_), Some(_)) => {
                return Err(MateError::InvalidPath(
                    "pass only one of `workspaceId` or `versionId`".to_string(),
                ))
            }
            (Some(w), None) => DocumentPath::workspace(document_id, w),
            (None, Some(v)) => DocumentPath::version(document_id, v),
            (None, None) => {
                let (Some(wvm), Some(wvm_id)) = (field("wvm"), field("wvmId")) else {
                    return Err(MateError::InvalidPath(
                        "missing `workspaceId`, `versionId`, or `wvm` + `wvmId`".to_string(),
                    ));
                };
                DocumentPath {
                    document_id: document_id.to_string(),
                    wv: WorkspaceOrVersion::parse(wvm)?,
                    wv_id: wvm_id.to_string(),
                }
            }
        };

        Ok(Self::new(document, element_id))
    }
}

/// Renders the REST path segment `d/{did}/{w|v}/{id}/e/{eid}`.
impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "d/{}/{}/{}/e/{}",
            self.document.document_id,
            self.document.wv.as_str(),
            self.document.wv_id,
            self.element_id
        )
    }
}

/// A single part inside a part studio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartPath {
    pub path: ElementPath,
    pub part_id: String,
}

impl PartPath {
    pub fn new(path: ElementPath, part_id: &str) -> Self {
        Self {
            path,
            part_id: part_id.to_string(),
        }
    }
}

impl fmt::Display for PartPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/p/{}", self.path, self.part_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_workspace() {
        let path = ElementPath::from_json(&json!({
            "documentId": "d1",
            "workspaceId": "w1",
            "elementId": "e1",
        }))
        .unwrap();
        assert_eq!(path.document, DocumentPath::workspace("d1", "w1"));
        assert_eq!(path.element_id, "e1");
        assert_eq!(path.to_string(), "d/d1/w/w1/e/e1");
    }

    #[test]
    fn test_from_json_wvm_pair() {
        let path = ElementPath::from_json(&json!({
            "documentId": "d1",
            "wvm": "v",
            "wvmId": "v9",
            "elementId": "e1",
        }))
        .unwrap();
        assert_eq!(path.document.wv, WorkspaceOrVersion::Version);
        assert_eq!(path.document.wv_id, "v9");
    }

    #[test]
    fn test_from_json_rejects_missing_fields() {
        let missing_element = ElementPath::from_json(&json!({
            "documentId": "d1",
            "workspaceId": "w1",
        }));
        assert!(matches!(missing_element, Err(MateError::InvalidPath(_))));

        let ambiguous = ElementPath::from_json(&json!({
            "documentId": "d1",
            "workspaceId": "w1",
            "versionId": "v1",
            "elementId": "e1",
        }));
        assert!(ambiguous.is_err());

        let bad_wvm = ElementPath::from_json(&json!({
            "documentId": "d1",
            "wvm": "m",
            "wvmId": "x",
            "elementId": "e1",
        }));
        assert!(bad_wvm.is_err());
    }

    #[test]
    fn test_paths_are_value_keys() {
        let a = PartPath::new(
            ElementPath::new(DocumentPath::workspace("d", "w"), "e"),
            "JHD",
        );
        let b = PartPath::new(
            ElementPath::new(DocumentPath::workspace("d", "w"), "e"),
            "JHD",
        );
        let mut set = std::collections::BTreeSet::new();
        set.insert(a.clone());
        set.insert(b);
        assert_eq!(set.len(), 1);
        assert_eq!(a.to_string(), "d/d/w/w/e/e/p/JHD");
    }
}
