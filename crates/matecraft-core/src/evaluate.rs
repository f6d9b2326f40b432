//! Part-studio classification and target resolution.
//!
//! Both passes fan out one script evaluation per input and merge the results
//! as they complete. The merge is a single-writer loop over the task group,
//! so on a connector-id collision the last *completed* evaluation wins.

use crate::error::{MateError, Result};
use crate::fanout::TaskGroup;
use crate::path::ElementPath;
use crate::{Script, ScriptEvaluator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Connector classification tables derived from part-studio evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationMaps {
    /// Connector id → part studio owning the instance it should mate to.
    pub targets: BTreeMap<String, ElementPath>,
    /// End connector id → start connector id on the same part.
    pub mirrors: BTreeMap<String, String>,
    /// Connectors that mate directly to the coordinate origin.
    pub origin_mirrors: BTreeSet<String>,
}

impl ClassificationMaps {
    /// Plain key insertion; a repeated connector id overwrites.
    pub fn merge(&mut self, report: PartStudioReport) {
        for mate in report.mates {
            self.targets.insert(mate.mate_id, mate.path);
        }
        for mirror in report.mirrors {
            match mirror.start_mate_id {
                Some(start) if !mirror.mate_to_origin => {
                    self.mirrors.insert(mirror.end_mate_id, start);
                }
                _ => {
                    self.origin_mirrors.insert(mirror.end_mate_id);
                }
            }
        }
    }
}

/// Target-side connector for every target-classified connector.
pub type TargetCorrespondence = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMate {
    pub mate_id: String,
    pub path: ElementPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorMate {
    pub end_mate_id: String,
    pub start_mate_id: Option<String>,
    pub mate_to_origin: bool,
}

/// Validated result of the classification script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartStudioReport {
    pub valid: bool,
    pub mates: Vec<TargetMate>,
    pub mirrors: Vec<MirrorMate>,
}

impl PartStudioReport {
    pub fn from_json(value: &Value) -> Result<Self> {
        let valid = value
            .get("valid")
            .and_then(Value::as_bool)
            .ok_or_else(|| MateError::MalformedResponse("classification: missing `valid`".into()))?;
        if !valid {
            return Ok(Self {
                valid,
                mates: Vec::new(),
                mirrors: Vec::new(),
            });
        }

        let mut mates = Vec::new();
        for entry in array_field(value, "mates")? {
            let mate_id = str_field(entry, "mateId")?;
            let path = ElementPath::from_json(entry)
                .map_err(|e| MateError::malformed("classification target", e))?;
            mates.push(TargetMate { mate_id, path });
        }

        let mut mirrors = Vec::new();
        for entry in array_field(value, "mirrors")? {
            let end_mate_id = str_field(entry, "endMateId")?;
            let mate_to_origin = entry
                .get("mateToOrigin")
                .and_then(Value::as_bool)
                .ok_or_else(|| MateError::MalformedResponse("mirror: missing `mateToOrigin`".into()))?;
            let start_mate_id = if mate_to_origin {
                entry.get("startMateId").and_then(Value::as_str).map(str::to_string)
            } else {
                Some(str_field(entry, "startMateId")?)
            };
            mirrors.push(MirrorMate {
                end_mate_id,
                start_mate_id,
                mate_to_origin,
            });
        }

        Ok(Self {
            valid,
            mates,
            mirrors,
        })
    }
}

fn array_field<'a>(value: &'a Value, name: &str) -> Result<&'a Vec<Value>> {
    value
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| MateError::MalformedResponse(format!("classification: missing `{name}`")))
}

fn str_field(value: &Value, name: &str) -> Result<String> {
    value
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MateError::MalformedResponse(format!("missing `{name}`")))
}

/// Evaluate the classification script on every part studio and merge the
/// valid results.
///
/// A `valid: false` report is skipped. Any failed evaluation aborts the
/// whole pass.
pub async fn evaluate_part_studios(
    evaluator: Arc<dyn ScriptEvaluator>,
    paths: &BTreeSet<ElementPath>,
) -> Result<ClassificationMaps> {
    let mut group = TaskGroup::new("evaluate part studios");
    for path in paths {
        let evaluator = evaluator.clone();
        let path = path.clone();
        group.spawn(async move {
            let value = evaluator.evaluate(&path, Script::ClassifyPartStudio).await?;
            let report = PartStudioReport::from_json(&value)?;
            Ok((path, report))
        });
    }

    let mut maps = ClassificationMaps::default();
    while let Some(result) = group.next().await {
        let (path, report) = result?;
        if !report.valid {
            tracing::debug!(part_studio = %path, "no mate structure; skipping");
            continue;
        }
        tracing::debug!(
            part_studio = %path,
            targets = report.mates.len(),
            mirrors = report.mirrors.len(),
            "part studio classified"
        );
        maps.merge(report);
    }

    tracing::info!(
        part_studios = paths.len(),
        targets = maps.targets.len(),
        mirrors = maps.mirrors.len(),
        origin_mirrors = maps.origin_mirrors.len(),
        "classification complete"
    );
    Ok(maps)
}

/// Ask each target part studio which of its connectors pairs with the
/// target-classified connector.
///
/// One evaluation per connector; a part studio targeted by several
/// connectors is evaluated once for each of them.
pub async fn resolve_targets(
    evaluator: Arc<dyn ScriptEvaluator>,
    targets: &BTreeMap<String, ElementPath>,
) -> Result<TargetCorrespondence> {
    let mut group = TaskGroup::new("resolve targets");
    for (connector_id, path) in targets {
        let evaluator = evaluator.clone();
        let connector_id = connector_id.clone();
        let path = path.clone();
        group.spawn(async move {
            let value = evaluator.evaluate(&path, Script::ResolveTarget).await?;
            let target = str_field(&value, "targetMateId")
                .map_err(|e| MateError::malformed(&format!("target of `{connector_id}`"), e))?;
            Ok((connector_id, target))
        });
    }

    let mut correspondence = TargetCorrespondence::new();
    while let Some(result) = group.next().await {
        let (connector_id, target) = result?;
        correspondence.insert(connector_id, target);
    }
    Ok(correspondence)
}
