//! ctrack Compliance Core
//!
//! Tracks how far each system in an organization implements the controls
//! of a cybersecurity framework, and rolls the result up through the
//! organizational hierarchy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              WORKSPACE                                  │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐ │
//! │  │  Hierarchy   │  │   Control    │  │  Assessment  │  │  Workflow   │ │
//! │  │  (snapshot)  │  │   Catalog    │  │    Ledger    │  │  (comments) │ │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘  └──────┬──────┘ │
//! │         │                 │                 │                 │        │
//! │  ┌──────▼─────────────────▼─────────────────▼─────────────────▼──────┐ │
//! │  │                           AGGREGATOR                              │ │
//! │  │     Bottom-up Roll-up | Scope Resolution | Function Breakdown     │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │                                │                                        │
//! │  ┌──────────────┐  ┌──────────▼─────────┐  ┌──────────────┐           │
//! │  │    Bulk      │  │     Reports        │  │   Recent     │           │
//! │  │   Updates    │  │   (JSON / CSV)     │  │   Activity   │           │
//! │  └──────────────┘  └────────────────────┘  └──────────────┘           │
//! └─────────────────────────────────┬───────────────────────────────────────┘
//!                                   │ AssessmentBackend
//!                                   ▼
//!                          REST API / in-memory
//! ```
//!
//! Aggregation, resolution and workflow derivation are pure functions over
//! immutable snapshots. Only the [`Workspace`] talks to the backend.

pub mod aggregate;
pub mod backend;
pub mod bulk;
pub mod catalog;
pub mod hierarchy;
pub mod ledger;
pub mod reporting;
pub mod scope;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod workflow;

use chrono::Utc;
use ctrack_common::{ControlCode, DomainError, SystemId, TrackerError};
use std::sync::Arc;
use thiserror::Error;

pub use aggregate::{summarize, Aggregator, ComplianceCounts, ComplianceSummary, RollupNode, RollupTree};
pub use backend::{AssessmentBackend, CatalogSnapshot, InMemoryBackend};
pub use bulk::{BatchFailure, BatchOutcome, BulkUpdater};
pub use catalog::{CatalogError, CategoryMap, Control, ControlCatalog, ExternalMapping, Function};
pub use hierarchy::{Hierarchy, NodeRef};
pub use ledger::{Assessment, AssessmentLedger};
pub use reporting::{ComplianceReport, ExportFormat, Gap, ReportGenerator};
pub use scope::{resolve, resolve_or_root, Navigator, Resolution, Scope, ScopeError, ScopeKind, ScopeRef};
pub use session::RecentActivity;
pub use snapshot::{SnapshotCell, SnapshotState};
pub use status::{ComplianceStatus, RiskLevel, ServerStatus};
pub use workflow::{derive_status, Comment, WorkflowAction, WorkflowError, WorkflowEvent, WorkflowLog, WorkflowState, WorkflowStatus};

/// Compliance error types
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl From<DomainError> for ComplianceError {
    fn from(e: DomainError) -> Self {
        Self::Tracker(e.into())
    }
}

impl ComplianceError {
    /// True when the caller should fall back to the root view
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Scope(ScopeError::NotFound { .. }) => true,
            Self::Tracker(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Result type for compliance operations
pub type ComplianceResult<T> = Result<T, ComplianceError>;

/// Consistent read view over the current snapshots
pub struct WorkspaceView {
    pub hierarchy: Arc<Hierarchy>,
    pub catalog: Arc<ControlCatalog>,
    pub assessments: Vec<Assessment>,
}

impl WorkspaceView {
    pub fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(&self.hierarchy, &self.assessments)
    }
}

/// Main compliance workspace
pub struct Workspace {
    backend: Arc<dyn AssessmentBackend>,
    hierarchy: SnapshotCell<Hierarchy>,
    catalog: SnapshotCell<ControlCatalog>,
    ledger: Arc<AssessmentLedger>,
}

impl Workspace {
    /// Create a workspace with empty caches
    pub fn new(backend: Arc<dyn AssessmentBackend>) -> Self {
        Self {
            backend,
            hierarchy: SnapshotCell::new("hierarchy"),
            catalog: SnapshotCell::new("catalog"),
            ledger: Arc::new(AssessmentLedger::new()),
        }
    }

    /// Fetch hierarchy, catalog and every system's assessments
    pub async fn load(&self) -> ComplianceResult<()> {
        self.refresh_hierarchy().await?;
        self.refresh_catalog().await?;
        self.refresh_assessments().await?;
        Ok(())
    }

    pub async fn refresh_hierarchy(&self) -> ComplianceResult<Arc<Hierarchy>> {
        match self.backend.fetch_hierarchy().await {
            Ok(hierarchy) => {
                hierarchy.validate();
                tracing::info!(systems = hierarchy.systems().len(), "loaded hierarchy snapshot");
                self.hierarchy.set_ready(hierarchy);
                Ok(self.hierarchy.get()?)
            }
            Err(e) => {
                self.hierarchy.set_failed(e.to_string());
                Err(e.into())
            }
        }
    }

    pub async fn refresh_catalog(&self) -> ComplianceResult<Arc<ControlCatalog>> {
        let snapshot = match self.backend.fetch_catalog().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.catalog.set_failed(e.to_string());
                return Err(e.into());
            }
        };
        if let Some(map) = &snapshot.category_map {
            if let Err(e) = map.validate() {
                tracing::warn!(error = %e, "category map has invalid entries; falling back per control");
            }
        }
        self.catalog.set_ready(snapshot.into_catalog());
        Ok(self.catalog.get()?)
    }

    /// Reload assessments for every system in the hierarchy snapshot
    pub async fn refresh_assessments(&self) -> ComplianceResult<usize> {
        let hierarchy = self.hierarchy.get()?;
        let mut loaded = 0;
        for system in hierarchy.systems() {
            loaded += self.load_system(&system.id).await?;
        }
        tracing::info!(assessments = loaded, "loaded assessments");
        Ok(loaded)
    }

    /// Reload one system's assessments
    pub async fn load_system(&self, system_id: &SystemId) -> ComplianceResult<usize> {
        let assessments = self.backend.list_assessments(system_id).await?;
        let count = assessments.len();
        self.ledger.load_system(system_id, assessments);
        Ok(count)
    }

    pub fn hierarchy(&self) -> ComplianceResult<Arc<Hierarchy>> {
        Ok(self.hierarchy.get()?)
    }

    pub fn catalog(&self) -> ComplianceResult<Arc<ControlCatalog>> {
        Ok(self.catalog.get()?)
    }

    pub fn ledger(&self) -> &Arc<AssessmentLedger> {
        &self.ledger
    }

    /// Read view; fails with `StaleSnapshot` until both snapshots are ready
    pub fn view(&self) -> ComplianceResult<WorkspaceView> {
        Ok(WorkspaceView {
            hierarchy: self.hierarchy.get()?,
            catalog: self.catalog.get()?,
            assessments: self.ledger.all(),
        })
    }

    pub fn summary(&self, scope: &Scope) -> ComplianceResult<ComplianceSummary> {
        let view = self.view()?;
        let summary = view.aggregator().summary_for_scope(scope)?;
        Ok(summary)
    }

    pub fn rollup(&self) -> ComplianceResult<RollupTree> {
        let view = self.view()?;
        let tree = view.aggregator().rollup();
        Ok(tree)
    }

    pub fn report(&self, scope: &Scope) -> ComplianceResult<ComplianceReport> {
        let view = self.view()?;
        ReportGenerator::scope_report(&view.aggregator(), scope, &view.catalog)
    }

    /// Change one control's status
    ///
    /// Setting "Not Assessed" on a control with no record is a no-op and
    /// returns `None`.
    pub async fn set_status(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        status: ComplianceStatus,
    ) -> ComplianceResult<Option<Assessment>> {
        if status == ComplianceStatus::NotAssessed && self.ledger.get(system_id, control_id).is_none() {
            return Ok(None);
        }
        let assessment = self.backend.upsert_status(system_id, control_id, status).await?;
        self.ledger.upsert(assessment.clone());
        Ok(Some(assessment))
    }

    /// Set one status on many controls; see [`BulkUpdater::apply`]
    pub async fn bulk_set_status(
        &self,
        system_id: &SystemId,
        control_ids: &[ControlCode],
        status: ComplianceStatus,
    ) -> BatchOutcome {
        BulkUpdater::new(Arc::clone(&self.backend), Arc::clone(&self.ledger))
            .apply(system_id, control_ids, status)
            .await
    }

    /// Remove an assessment that no evidence references
    pub async fn delete_assessment(&self, system_id: &SystemId, control_id: &ControlCode) -> ComplianceResult<()> {
        if let Some(existing) = self.ledger.get(system_id, control_id) {
            if !existing.evidence_ids.is_empty() {
                return Err(DomainError::EvidenceReferenced(existing.id).into());
            }
        }
        self.backend.delete_assessment(system_id, control_id).await?;
        if let Err(e) = self.ledger.remove(system_id, control_id) {
            tracing::debug!(error = %e, "deleted assessment was not cached");
        }
        Ok(())
    }

    /// Workflow log rebuilt from the assessment's comment thread
    pub async fn workflow_log(&self, assessment_id: &str) -> ComplianceResult<WorkflowLog> {
        let comments = self.backend.list_comments(assessment_id).await?;
        Ok(WorkflowLog::from_comments(&comments))
    }

    pub async fn workflow_status(&self, assessment_id: &str) -> ComplianceResult<WorkflowStatus> {
        Ok(self.workflow_log(assessment_id).await?.status())
    }

    /// Post a workflow action as a marker comment
    ///
    /// Only the state transition is checked before posting; timestamps are
    /// assigned by the backend. Once the comment is stored the returned
    /// status is derived from the thread with the new event placed in
    /// timestamp order, even if that leaves the action superseded.
    pub async fn submit_workflow_action(
        &self,
        assessment_id: &str,
        action: WorkflowAction,
        note: Option<&str>,
    ) -> ComplianceResult<WorkflowStatus> {
        let mut log = self.workflow_log(assessment_id).await?;
        log.check_transition(action)?;

        let mut draft = WorkflowEvent::new(action, String::new(), Utc::now());
        if let Some(note) = note {
            draft = draft.with_note(note);
        }
        let comment = Comment::for_event(assessment_id, &draft);
        let posted = self.backend.post_comment(assessment_id, &comment.content).await?;
        let event = WorkflowEvent::from_comment(&posted).unwrap_or(WorkflowEvent {
            actor: posted.author.clone(),
            at: posted.created_at,
            ..draft
        });

        let status = log.record(event);
        if status.state != WorkflowState::after(action) {
            tracing::warn!(
                assessment = assessment_id,
                %action,
                state = %status.state,
                "workflow action stored before the latest event"
            );
        }
        tracing::info!(assessment = assessment_id, %action, state = %status.state, "workflow action recorded");
        Ok(status)
    }
}
