//! Matecraft Core: mate connector reconciliation for CAD assemblies
//!
//! Given an assembly whose parts declare mate connectors, this crate works
//! out which connectors are still unused, classifies each one against rules
//! computed by evaluating a script on the owning part studio, and applies a
//! two-phase plan of new instances and new fastened mates.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Snapshot   │──►│ Candidates │──►│  Part-studio │──►│    Target    │
//! │ (2 fetches)  │   │ (unused    │   │  evaluation  │   │  resolution  │
//! └──────────────┘   │ connectors)│   │  (fan-out)   │   │  (fan-out)   │
//!                    └────────────┘   └──────────────┘   └──────┬───────┘
//!                                                               │
//!        ┌──────────────────────────────────────────────────────┘
//!        ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │Reconciliation│──►│   Phase 1    │──►│  Re-snapshot │──►│   Phase 2    │
//! │    engine    │   │  instances   │   │  + instance  │   │   features   │
//! │ (plan only)  │   │  (barrier)   │   │   matching   │   │  (barrier)   │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! The CAD data service and the script evaluator are reached only through
//! the [`CadService`] and [`ScriptEvaluator`] traits, passed in explicitly.
//! Nothing is persisted: every run starts from a fresh snapshot.

pub mod candidates;
pub mod error;
pub mod evaluate;
pub mod executor;
pub mod fanout;
pub mod matcher;
pub mod mock;
pub mod model;
pub mod path;
pub mod pipeline;
pub mod reconcile;
pub mod snapshot;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use candidates::{Candidate, ConnectorUsage};
pub use error::{MateError, Result};
pub use evaluate::{ClassificationMaps, TargetCorrespondence};
pub use executor::{ExecutionReport, MutationExecutor};
pub use model::{AssemblyDefinition, AssemblyQuery, Instance, InstanceType, MateFeature, Part};
pub use path::{DocumentPath, ElementPath, PartPath, WorkspaceOrVersion};
pub use pipeline::{AutoMate, PlannedRun};
pub use reconcile::{
    Classification, FeatureSpec, InstanceSource, MateEnd, MutationPlan, ReconciliationEngine,
    ResolvedEnd, ResolvedFeature,
};
pub use snapshot::AssemblySnapshot;

// ============================================================================
// Boundary Traits
// ============================================================================

/// The CAD platform's assembly API.
#[async_trait]
pub trait CadService: Send + Sync {
    /// Fetch the assembly definition (instances and referenced parts).
    async fn get_assembly(&self, path: &ElementPath, query: AssemblyQuery) -> Result<AssemblyDefinition>;

    /// Fetch the assembly feature list (mates and friends).
    async fn get_assembly_features(&self, path: &ElementPath) -> Result<Vec<MateFeature>>;

    /// Insert a part studio, or one part of it, into the assembly.
    async fn add_instance(&self, assembly: &ElementPath, source: &InstanceSource) -> Result<()>;

    /// Add a fastened mate between two connectors (or a connector and the
    /// origin).
    async fn add_feature(&self, assembly: &ElementPath, feature: &ResolvedFeature) -> Result<()>;
}

/// Which of the two fixed scripts to run against a part studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Script {
    /// Reports targets, mirrors and origin mirrors for the part studio.
    ClassifyPartStudio,
    /// Reports the designated target connector of the part studio.
    ResolveTarget,
}

/// Runs one of the fixed scripts against a part studio and returns its raw
/// JSON result. Validation of the result happens in [`evaluate`].
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(&self, path: &ElementPath, script: Script) -> Result<serde_json::Value>;
}
