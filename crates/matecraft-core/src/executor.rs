//! Two-phase application of a [`MutationPlan`].
//!
//! Phase 1 adds every pending instance and waits for all of them. Only then
//! is the assembly re-fetched, the created instances matched back to the
//! plan, and phase 2 (feature additions) started. Phase 2 therefore never
//! sees an instance id that does not exist yet.
//!
//! Nothing is rolled back: a failure in either phase leaves whatever already
//! completed applied on the CAD platform.

use crate::error::Result;
use crate::fanout::TaskGroup;
use crate::matcher::{created_instances, match_instances};
use crate::path::ElementPath;
use crate::reconcile::{MutationPlan, PendingInstance, ResolvedFeature};
use crate::snapshot::AssemblySnapshot;
use crate::CadService;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub instances_added: usize,
    pub features_added: usize,
}

pub struct MutationExecutor {
    cad: Arc<dyn CadService>,
    assembly: ElementPath,
}

impl MutationExecutor {
    pub fn new(cad: Arc<dyn CadService>, assembly: ElementPath) -> Self {
        Self { cad, assembly }
    }

    /// Phase 1: one concurrent add-instance request per entry, full barrier.
    pub async fn add_instances(&self, pending: &[PendingInstance]) -> Result<usize> {
        let mut group = TaskGroup::new("add instances");
        for entry in pending {
            let cad = self.cad.clone();
            let assembly = self.assembly.clone();
            let source = entry.source.clone();
            group.spawn(async move { cad.add_instance(&assembly, &source).await });
        }
        let added = group.join_all().await?.len();
        tracing::info!(assembly = %self.assembly, added, "instance phase complete");
        Ok(added)
    }

    /// Phase 2: one concurrent add-feature request per feature, full barrier.
    pub async fn add_features(&self, features: Vec<ResolvedFeature>) -> Result<usize> {
        let mut group = TaskGroup::new("add features");
        for feature in features {
            let cad = self.cad.clone();
            let assembly = self.assembly.clone();
            group.spawn(async move { cad.add_feature(&assembly, &feature).await });
        }
        let added = group.join_all().await?.len();
        tracing::info!(assembly = %self.assembly, added, "feature phase complete");
        Ok(added)
    }

    /// Run both phases. `baseline` is the snapshot the plan was built from;
    /// instances absent from it after phase 1 are the created ones.
    pub async fn execute(&self, plan: &MutationPlan, baseline: &AssemblySnapshot) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        if plan.is_empty() {
            return Ok(report);
        }

        let mut bindings = BTreeMap::new();
        if !plan.pending_instances.is_empty() {
            report.instances_added = self.add_instances(&plan.pending_instances).await?;
            let updated = AssemblySnapshot::fetch_instances(self.cad.as_ref(), &self.assembly).await?;
            let created = created_instances(baseline, &updated);
            bindings = match_instances(&plan.pending_instances, created)?;
        }

        let features = plan
            .pending_features
            .iter()
            .map(|spec| spec.resolve(&bindings))
            .collect::<Result<Vec<_>>>()?;
        report.features_added = self.add_features(features).await?;
        Ok(report)
    }
}
