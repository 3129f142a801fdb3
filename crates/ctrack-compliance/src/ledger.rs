//! Assessment Ledger
//!
//! One record per (System, Control). A record is created the first time a
//! control's status moves away from "Not Assessed" and is updated in place
//! afterwards. Records referenced by evidence cannot be removed.

use crate::status::{ComplianceStatus, RiskLevel};
use chrono::{DateTime, Utc};
use ctrack_common::{ControlCode, DomainError, SystemId, TrackerError, TrackerResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Recorded compliance of one system against one control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: String,
    pub system_id: SystemId,
    pub control_id: ControlCode,
    pub status: ComplianceStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assessment {
    /// Create a fresh record
    pub fn new(system_id: SystemId, control_id: ControlCode, status: ComplianceStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            system_id,
            control_id,
            status,
            notes: String::new(),
            risk_level: None,
            evidence_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn key(&self) -> LedgerKey {
        (self.system_id.clone(), self.control_id.clone())
    }
}

type LedgerKey = (SystemId, ControlCode);

/// Local cache of assessments, unique per (system, control)
pub struct AssessmentLedger {
    entries: Arc<RwLock<HashMap<LedgerKey, Assessment>>>,
}

impl AssessmentLedger {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replace everything cached for one system with a fresh fetch
    pub fn load_system(&self, system_id: &SystemId, assessments: Vec<Assessment>) {
        let mut entries = self.entries.write();
        entries.retain(|(system, _), _| system != system_id);
        for assessment in assessments {
            if &assessment.system_id != system_id {
                tracing::warn!(
                    expected = %system_id,
                    got = %assessment.system_id,
                    "dropping assessment returned for another system"
                );
                continue;
            }
            entries.insert(assessment.key(), assessment);
        }
    }

    /// Insert or replace a record as returned by the backend
    pub fn upsert(&self, assessment: Assessment) {
        self.entries.write().insert(assessment.key(), assessment);
    }

    /// Apply a status change
    ///
    /// Creates the record on the first change; updates it in place after
    /// that. Setting "Not Assessed" on a control with no record creates
    /// nothing and returns `None`.
    pub fn record_status(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        status: ComplianceStatus,
    ) -> Option<Assessment> {
        let mut entries = self.entries.write();
        let key = (system_id.clone(), control_id.clone());
        match entries.get_mut(&key) {
            Some(existing) => {
                existing.status = status;
                existing.updated_at = Utc::now();
                Some(existing.clone())
            }
            None if status == ComplianceStatus::NotAssessed => None,
            None => {
                let created = Assessment::new(system_id.clone(), control_id.clone(), status);
                entries.insert(key, created.clone());
                Some(created)
            }
        }
    }

    pub fn get(&self, system_id: &SystemId, control_id: &ControlCode) -> Option<Assessment> {
        self.entries
            .read()
            .get(&(system_id.clone(), control_id.clone()))
            .cloned()
    }

    /// Find a record by its assessment id
    pub fn find_by_id(&self, assessment_id: &str) -> Option<Assessment> {
        self.entries
            .read()
            .values()
            .find(|a| a.id == assessment_id)
            .cloned()
    }

    /// Records for one system, in control order
    pub fn for_system(&self, system_id: &SystemId) -> Vec<Assessment> {
        let mut records: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|a| &a.system_id == system_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.control_id.cmp(&b.control_id));
        records
    }

    /// Snapshot of every record, ordered by system then control
    pub fn all(&self) -> Vec<Assessment> {
        let mut records: Vec<_> = self.entries.read().values().cloned().collect();
        records.sort_by(|a, b| {
            a.system_id
                .cmp(&b.system_id)
                .then_with(|| a.control_id.cmp(&b.control_id))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Update a record in place
    pub fn update(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        f: impl FnOnce(&mut Assessment),
    ) -> TrackerResult<Assessment> {
        let mut entries = self.entries.write();
        let record = entries
            .get_mut(&(system_id.clone(), control_id.clone()))
            .ok_or_else(|| TrackerError::NotFound(format!("assessment {system_id}/{control_id}")))?;
        f(record);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    pub fn set_notes(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        notes: impl Into<String>,
    ) -> TrackerResult<Assessment> {
        let notes = notes.into();
        self.update(system_id, control_id, |a| a.notes = notes)
    }

    pub fn set_risk_level(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        risk_level: Option<RiskLevel>,
    ) -> TrackerResult<Assessment> {
        self.update(system_id, control_id, |a| a.risk_level = risk_level)
    }

    /// Attach an evidence reference (idempotent)
    pub fn link_evidence(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        evidence_id: &str,
    ) -> TrackerResult<Assessment> {
        self.update(system_id, control_id, |a| {
            if !a.evidence_ids.iter().any(|e| e == evidence_id) {
                a.evidence_ids.push(evidence_id.to_string());
            }
        })
    }

    pub fn unlink_evidence(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        evidence_id: &str,
    ) -> TrackerResult<Assessment> {
        self.update(system_id, control_id, |a| a.evidence_ids.retain(|e| e != evidence_id))
    }

    /// Remove a record that no evidence references
    pub fn remove(&self, system_id: &SystemId, control_id: &ControlCode) -> TrackerResult<Assessment> {
        let mut entries = self.entries.write();
        let key = (system_id.clone(), control_id.clone());
        match entries.get(&key) {
            None => Err(TrackerError::NotFound(format!("assessment {system_id}/{control_id}"))),
            Some(record) if !record.evidence_ids.is_empty() => {
                Err(DomainError::EvidenceReferenced(record.id.clone()).into())
            }
            Some(_) => entries
                .remove(&key)
                .ok_or_else(|| TrackerError::NotFound(format!("assessment {system_id}/{control_id}"))),
        }
    }
}

impl Default for AssessmentLedger {
    fn default() -> Self {
        Self::new()
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

    #[test]
    fn test_first_change_creates_then_updates_in_place() {
        let ledger = AssessmentLedger::new();
        assert!(ledger
            .record_status(&sys("s1"), &ctl("PR.AA-01"), ComplianceStatus::NotAssessed)
            .is_none());
        assert!(ledger.is_empty());

        let created = ledger
            .record_status(&sys("s1"), &ctl("PR.AA-01"), ComplianceStatus::PartiallyImplemented)
            .unwrap();
        let updated = ledger
            .record_status(&sys("s1"), &ctl("PR.AA-01"), ComplianceStatus::Implemented)
            .unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&sys("s1"), &ctl("PR.AA-01")).unwrap().status, ComplianceStatus::Implemented);
    }

    #[test]
    fn test_evidence_blocks_removal() {
        let ledger = AssessmentLedger::new();
        ledger.record_status(&sys("s1"), &ctl("DE.CM-01"), ComplianceStatus::Implemented);
        ledger.link_evidence(&sys("s1"), &ctl("DE.CM-01"), "ev-1").unwrap();
        ledger.link_evidence(&sys("s1"), &ctl("DE.CM-01"), "ev-1").unwrap();
        assert_eq!(ledger.get(&sys("s1"), &ctl("DE.CM-01")).unwrap().evidence_ids.len(), 1);

        let err = ledger.remove(&sys("s1"), &ctl("DE.CM-01")).unwrap_err();
        assert!(matches!(err, TrackerError::Domain(DomainError::EvidenceReferenced(_))));

        ledger.unlink_evidence(&sys("s1"), &ctl("DE.CM-01"), "ev-1").unwrap();
        ledger.remove(&sys("s1"), &ctl("DE.CM-01")).unwrap();
        assert!(ledger.remove(&sys("s1"), &ctl("DE.CM-01")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_load_system_replaces_only_that_system() {
        let ledger = AssessmentLedger::new();
        ledger.record_status(&sys("s1"), &ctl("GV.OC-01"), ComplianceStatus::Implemented);
        ledger.record_status(&sys("s2"), &ctl("GV.OC-01"), ComplianceStatus::Implemented);

        let fresh = vec![
            Assessment::new(sys("s1"), ctl("GV.OC-02"), ComplianceStatus::NotImplemented),
            Assessment::new(sys("other"), ctl("GV.OC-03"), ComplianceStatus::Implemented),
        ];
        ledger.load_system(&sys("s1"), fresh);

        let s1: Vec<_> = ledger.for_system(&sys("s1")).into_iter().map(|a| a.control_id.to_string()).collect();
        assert_eq!(s1, vec!["GV.OC-02"]);
        assert_eq!(ledger.for_system(&sys("s2")).len(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_notes_and_risk_updates() {
        let ledger = AssessmentLedger::new();
        let created = ledger
            .record_status(&sys("s1"), &ctl("RS.MA-01"), ComplianceStatus::NotImplemented)
            .unwrap();
        ledger.set_notes(&sys("s1"), &ctl("RS.MA-01"), "runbook missing").unwrap();
        let updated = ledger.set_risk_level(&sys("s1"), &ctl("RS.MA-01"), Some(RiskLevel::High)).unwrap();
        assert_eq!(updated.notes, "runbook missing");
        assert_eq!(updated.risk_level, Some(RiskLevel::High));
        assert_eq!(ledger.find_by_id(&created.id).unwrap().notes, "runbook missing");
        assert!(ledger.set_notes(&sys("s9"), &ctl("RS.MA-01"), "x").is_err());
    }
}
