//! # Reconciliation Engine
//!
//! Desired-state reconciliation for directory objects: classify each object,
//! diff it against what its classification demands, and apply the minimal
//! corrective actions.
//!
//! ## Overview
//!
//! - Rule-based classification (tiers, stale, orphaned, non-compliant)
//! - Attribute rules take precedence over naming-convention rules
//! - Exclusion list seeded with built-in principals resolved by SID
//! - Idempotent corrective actions (group membership, attribute clear,
//!   disable, delete)
//! - Per-record error isolation, per-action timeouts and retries
//! - Dry-run mode for previewing changes
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      ReconciliationEngine                           │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌───────────┐   ┌────────────┐   ┌───────────┐   ┌────────────┐    │
//! │  │  QueryOp  │──►│ Classifier │──►│  Differ   │──►│ Reconciler │    │
//! │  │           │   │  (RuleSet) │   │           │   │            │    │
//! │  └───────────┘   └────────────┘   └───────────┘   └─────┬──────┘    │
//! │        ▲                                ▲                │          │
//! │        │                                │                ▼          │
//! │  ┌───────────┐                   ┌────────────┐   ┌────────────┐    │
//! │  │ Exclusion │                   │  Desired   │   │ MutationOp │    │
//! │  │   List    │                   │   State    │   │            │    │
//! │  └───────────┘                   └────────────┘   └────────────┘    │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tierwarden_reconcile::{ReconcileConfig, ReconciliationEngine, ReportGenerator};
//!
//! let config = ReconcileConfig::from_file("tierwarden.yaml")?;
//! let engine = ReconciliationEngine::new(Arc::new(directory));
//!
//! // Preview
//! let plan = engine.plan(&config).await?;
//! println!("{}", ReportGenerator::plan(&plan));
//!
//! // Apply (honours policy.dry_run)
//! let result = engine.run(&config).await?;
//! println!("{}", ReportGenerator::summary(&result));
//! ```

pub mod classify;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod executor;
pub mod plan;
pub mod report;
pub mod result;
pub mod statistics;
pub mod types;

pub use classify::{classify, NeverSetPolicy, Predicate, PredicateClass, Rule, RuleConfig, RuleSet};
pub use config::{ExecutionConfig, ReconcileConfig, SearchConfig};
pub use diff::{diff, DesiredState, ReconcilePolicy, DEFAULT_PROTECTED_GROUPS};
pub use engine::ReconciliationEngine;
pub use error::{ReconcileError, ReconcileResult};
pub use exclusion::{ExclusionConfig, ExclusionList};
pub use executor::Reconciler;
pub use plan::{RecordPlan, RunPlan};
pub use report::ReportGenerator;
pub use result::{RecordError, RecordOutcome, RunResult};
pub use statistics::{RunStatistics, StatisticsTracker};
pub use types::{ActionSet, Classification, CorrectiveAction, LifecycleAction, RecordState};
