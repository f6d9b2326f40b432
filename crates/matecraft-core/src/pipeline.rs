//! End-to-end orchestration of a single request.

use crate::candidates::{self, Candidate};
use crate::error::Result;
use crate::evaluate::{self, ClassificationMaps, TargetCorrespondence};
use crate::executor::{ExecutionReport, MutationExecutor};
use crate::path::ElementPath;
use crate::reconcile::{MutationPlan, ReconciliationEngine};
use crate::snapshot::AssemblySnapshot;
use crate::{CadService, ScriptEvaluator};
use std::sync::Arc;

/// Everything computed up to (and including) the mutation plan.
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub snapshot: AssemblySnapshot,
    pub candidates: Vec<Candidate>,
    pub maps: ClassificationMaps,
    pub targets: TargetCorrespondence,
    pub plan: MutationPlan,
}

/// Completes and mirrors the mate connectors of one assembly.
///
/// Both boundary handles are held explicitly; there is no ambient request
/// context.
pub struct AutoMate {
    cad: Arc<dyn CadService>,
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl AutoMate {
    pub fn new(cad: Arc<dyn CadService>, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self { cad, evaluator }
    }

    /// Snapshot, select, classify, resolve targets and build the plan.
    /// Performs no mutation.
    pub async fn plan(&self, assembly: &ElementPath) -> Result<PlannedRun> {
        let snapshot = AssemblySnapshot::fetch(self.cad.as_ref(), assembly).await?;
        let all = candidates::scan(&snapshot);
        let part_studios = candidates::part_studios(&all);
        tracing::info!(
            assembly = %assembly,
            instances = all.len(),
            eligible = all.iter().filter(|c| !c.all_used).count(),
            part_studios = part_studios.len(),
            "candidates selected"
        );

        let (maps, targets) = if part_studios.is_empty() {
            (ClassificationMaps::default(), TargetCorrespondence::new())
        } else {
            let maps = evaluate::evaluate_part_studios(self.evaluator.clone(), &part_studios).await?;
            let targets = evaluate::resolve_targets(self.evaluator.clone(), &maps.targets).await?;
            (maps, targets)
        };

        let plan = ReconciliationEngine::new(&maps, &targets).plan(&all);
        Ok(PlannedRun {
            snapshot,
            candidates: all,
            maps,
            targets,
            plan,
        })
    }

    /// Build the plan and apply it in two phases.
    pub async fn run(&self, assembly: &ElementPath) -> Result<ExecutionReport> {
        let planned = self.plan(assembly).await?;
        if planned.plan.is_empty() {
            tracing::info!(assembly = %assembly, "nothing to do");
            return Ok(ExecutionReport::default());
        }
        MutationExecutor::new(self.cad.clone(), assembly.clone())
            .execute(&planned.plan, &planned.snapshot)
            .await
    }
}
