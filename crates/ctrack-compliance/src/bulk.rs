//! Bulk status updates
//!
//! One backend call per control, dispatched concurrently. There is no
//! ordering and no rollback: each control succeeds or fails on its own and
//! the outcome lists both sides.

use crate::backend::AssessmentBackend;
use crate::ledger::{Assessment, AssessmentLedger};
use crate::status::ComplianceStatus;
use ctrack_common::{ControlCode, SystemId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Per-control failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub control_id: ControlCode,
    pub error: String,
}

/// Result of a bulk update
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// Updated records, in control order
    pub succeeded: Vec<Assessment>,
    /// Failures, in control order
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Concurrent status updater
pub struct BulkUpdater {
    backend: Arc<dyn AssessmentBackend>,
    ledger: Arc<AssessmentLedger>,
}

impl BulkUpdater {
    pub fn new(backend: Arc<dyn AssessmentBackend>, ledger: Arc<AssessmentLedger>) -> Self {
        Self { backend, ledger }
    }

    /// Set `status` on every listed control of one system
    ///
    /// Duplicate control ids are dispatched once. Successful updates are
    /// written into the local ledger as they complete.
    pub async fn apply(
        &self,
        system_id: &SystemId,
        control_ids: &[ControlCode],
        status: ComplianceStatus,
    ) -> BatchOutcome {
        let mut pending: BTreeSet<ControlCode> = control_ids.iter().cloned().collect();
        let mut tasks = JoinSet::new();

        for control_id in pending.iter().cloned() {
            let backend = Arc::clone(&self.backend);
            let system_id = system_id.clone();
            tasks.spawn(async move {
                let result = backend.upsert_status(&system_id, &control_id, status).await;
                (control_id, result)
            });
        }

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((control_id, Ok(assessment))) => {
                    pending.remove(&control_id);
                    self.ledger.upsert(assessment.clone());
                    outcome.succeeded.push(assessment);
                }
                Ok((control_id, Err(e))) => {
                    tracing::warn!(system = %system_id, control = %control_id, error = %e, "bulk update failed");
                    pending.remove(&control_id);
                    outcome.failed.push(BatchFailure {
                        control_id,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    // the control id is lost with the task; swept up below
                    tracing::warn!(system = %system_id, error = %e, "bulk update task aborted");
                }
            }
        }

        for control_id in pending {
            outcome.failed.push(BatchFailure {
                control_id,
                error: "update task aborted".to_string(),
            });
        }

        outcome.succeeded.sort_by(|a, b| a.control_id.cmp(&b.control_id));
        outcome.failed.sort_by(|a, b| a.control_id.cmp(&b.control_id));

        tracing::info!(
            system = %system_id,
            %status,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "bulk update finished"
        );
        outcome
    }
}
