//! Backend collaborator
//!
//! Persistence and identity live behind [`AssessmentBackend`]. The HTTP
//! implementation lives in `ctrack-client`; [`InMemoryBackend`] serves
//! tests and offline use.

use crate::catalog::{CategoryMap, ControlCatalog, ControlRecord, ExternalMapping};
use crate::hierarchy::Hierarchy;
use crate::ledger::{Assessment, AssessmentLedger};
use crate::status::ComplianceStatus;
use crate::workflow::Comment;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ctrack_common::{ControlCode, SystemId, TrackerError, TrackerResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use uuid::Uuid;

/// Raw catalog as delivered by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub controls: Vec<ControlRecord>,
    #[serde(default)]
    pub mappings: Vec<ExternalMapping>,
    #[serde(default)]
    pub category_map: Option<CategoryMap>,
}

impl CatalogSnapshot {
    /// Index the raw records
    pub fn into_catalog(self) -> ControlCatalog {
        ControlCatalog::build(self.controls, self.mappings, self.category_map.as_ref())
    }
}

/// Remote store for hierarchy, catalog, assessments and comments
#[async_trait]
pub trait AssessmentBackend: Send + Sync {
    /// Whole hierarchy in one nested document
    async fn fetch_hierarchy(&self) -> TrackerResult<Hierarchy>;

    /// Controls, external mappings and the category table
    async fn fetch_catalog(&self) -> TrackerResult<CatalogSnapshot>;

    async fn list_assessments(&self, system_id: &SystemId) -> TrackerResult<Vec<Assessment>>;

    /// Create or update the assessment for (system, control)
    async fn upsert_status(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        status: ComplianceStatus,
    ) -> TrackerResult<Assessment>;

    async fn delete_assessment(&self, system_id: &SystemId, control_id: &ControlCode) -> TrackerResult<()>;

    async fn list_comments(&self, assessment_id: &str) -> TrackerResult<Vec<Comment>>;

    /// Post a comment as the authenticated user
    async fn post_comment(&self, assessment_id: &str, content: &str) -> TrackerResult<Comment>;
}

/// In-process backend
pub struct InMemoryBackend {
    user: String,
    hierarchy: RwLock<Hierarchy>,
    catalog: RwLock<CatalogSnapshot>,
    assessments: AssessmentLedger,
    comments: RwLock<HashMap<String, Vec<Comment>>>,
    failing_controls: RwLock<HashSet<ControlCode>>,
    offline: AtomicBool,
    upserts: AtomicUsize,
    clock_skew_ms: AtomicI64,
}

impl InMemoryBackend {
    /// Empty backend acting on behalf of `user`
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            hierarchy: RwLock::new(Hierarchy::default()),
            catalog: RwLock::new(CatalogSnapshot::default()),
            assessments: AssessmentLedger::new(),
            comments: RwLock::new(HashMap::new()),
            failing_controls: RwLock::new(HashSet::new()),
            offline: AtomicBool::new(false),
            upserts: AtomicUsize::new(0),
            clock_skew_ms: AtomicI64::new(0),
        }
    }

    pub fn with_hierarchy(self, hierarchy: Hierarchy) -> Self {
        *self.hierarchy.write() = hierarchy;
        self
    }

    pub fn with_catalog(self, catalog: CatalogSnapshot) -> Self {
        *self.catalog.write() = catalog;
        self
    }

    /// Seed an assessment
    pub fn insert_assessment(&self, assessment: Assessment) {
        self.assessments.upsert(assessment);
    }

    /// Underlying store, for evidence and notes edits
    pub fn assessments(&self) -> &AssessmentLedger {
        &self.assessments
    }

    /// Make every upsert for `control_id` fail
    pub fn fail_control(&self, control_id: ControlCode) {
        self.failing_controls.write().insert(control_id);
    }

    /// Make every call fail until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Offset applied to the timestamps this backend assigns
    pub fn set_clock_skew(&self, skew: Duration) {
        self.clock_skew_ms.store(skew.num_milliseconds(), Ordering::Release);
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now() + Duration::milliseconds(self.clock_skew_ms.load(Ordering::Acquire))
    }

    /// Number of upsert calls received
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::Acquire)
    }

    fn ensure_online(&self) -> TrackerResult<()> {
        if self.offline.load(Ordering::Acquire) {
            return Err(TrackerError::Backend("backend unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AssessmentBackend for InMemoryBackend {
    async fn fetch_hierarchy(&self) -> TrackerResult<Hierarchy> {
        self.ensure_online()?;
        Ok(self.hierarchy.read().clone())
    }

    async fn fetch_catalog(&self) -> TrackerResult<CatalogSnapshot> {
        self.ensure_online()?;
        Ok(self.catalog.read().clone())
    }

    async fn list_assessments(&self, system_id: &SystemId) -> TrackerResult<Vec<Assessment>> {
        self.ensure_online()?;
        Ok(self.assessments.for_system(system_id))
    }

    async fn upsert_status(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        status: ComplianceStatus,
    ) -> TrackerResult<Assessment> {
        self.ensure_online()?;
        self.upserts.fetch_add(1, Ordering::AcqRel);
        if self.failing_controls.read().contains(control_id) {
            return Err(TrackerError::Backend(format!("upsert rejected for {control_id}")));
        }

        // the server stores explicit "Not Assessed" records too
        match self.assessments.record_status(system_id, control_id, status) {
            Some(assessment) => Ok(assessment),
            None => {
                let created = Assessment::new(system_id.clone(), control_id.clone(), status);
                self.assessments.upsert(created.clone());
                Ok(created)
            }
        }
    }

    async fn delete_assessment(&self, system_id: &SystemId, control_id: &ControlCode) -> TrackerResult<()> {
        self.ensure_online()?;
        self.assessments.remove(system_id, control_id).map(|_| ())
    }

    async fn list_comments(&self, assessment_id: &str) -> TrackerResult<Vec<Comment>> {
        self.ensure_online()?;
        Ok(self.comments.read().get(assessment_id).cloned().unwrap_or_default())
    }

    async fn post_comment(&self, assessment_id: &str, content: &str) -> TrackerResult<Comment> {
        self.ensure_online()?;
        if self.assessments.find_by_id(assessment_id).is_none() {
            return Err(TrackerError::NotFound(format!("assessment {assessment_id}")));
        }
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            assessment_id: Some(assessment_id.to_string()),
            author: self.user.clone(),
            created_at: self.now(),
            content: content.to_string(),
        };
        self.comments
            .write()
            .entry(assessment_id.to_string())
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctrack_common::NodeId;

    fn sys(raw: &str) -> SystemId {
        NodeId::new(raw).unwrap()
    }

    fn ctl(raw: &str) -> ControlCode {
        ControlCode::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_then_list() {
        let backend = InMemoryBackend::new("alice");
        backend
            .upsert_status(&sys("s1"), &ctl("PR.AA-01"), ComplianceStatus::Implemented)
            .await
            .unwrap();
        let explicit = backend
            .upsert_status(&sys("s1"), &ctl("PR.AA-02"), ComplianceStatus::NotAssessed)
            .await
            .unwrap();
        assert_eq!(explicit.status, ComplianceStatus::NotAssessed);

        let listed = backend.list_assessments(&sys("s1")).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(backend.upsert_count(), 2);
    }

    #[tokio::test]
    async fn test_comments_are_authored_by_the_user() {
        let backend = InMemoryBackend::new("alice");
        let assessment = backend
            .upsert_status(&sys("s1"), &ctl("DE.CM-01"), ComplianceStatus::NotImplemented)
            .await
            .unwrap();

        let posted = backend.post_comment(&assessment.id, "[WORKFLOW:REQUEST_REVIEW]").await.unwrap();
        assert_eq!(posted.author, "alice");
        assert_eq!(backend.list_comments(&assessment.id).await.unwrap(), vec![posted]);
        assert!(backend.post_comment("missing", "hi").await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_offline_and_failing_controls() {
        let backend = InMemoryBackend::new("alice");
        backend.fail_control(ctl("RS.MA-01"));
        assert!(tokio_test::block_on(backend.upsert_status(
            &sys("s1"),
            &ctl("RS.MA-01"),
            ComplianceStatus::Implemented
        ))
        .is_err());

        backend.set_offline(true);
        assert!(matches!(
            tokio_test::block_on(backend.fetch_hierarchy()),
            Err(TrackerError::Backend(_))
        ));
        backend.set_offline(false);
        assert!(tokio_test::block_on(backend.fetch_catalog()).unwrap().controls.is_empty());
    }
}
