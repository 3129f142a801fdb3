//! Wire types
//!
//! The backend speaks camelCase JSON and reports statuses in its own
//! compliance vocabulary; translation happens here and nowhere else.

use chrono::{DateTime, Utc};
use ctrack_common::{ControlCode, DomainError, SystemId};
use ctrack_compliance::{Assessment, ComplianceStatus, RiskLevel, ServerStatus};
use serde::{Deserialize, Serialize};

/// Assessment as stored by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDto {
    pub id: String,
    #[serde(default)]
    pub system_id: Option<String>,
    pub control_id: String,
    pub status: ServerStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AssessmentDto {
    /// Convert to the domain record
    ///
    /// `requested_for` fills in the system when the backend omits it.
    pub fn into_assessment(self, requested_for: &SystemId) -> Result<Assessment, DomainError> {
        let system_id = match self.system_id {
            Some(raw) => SystemId::new(raw)?,
            None => requested_for.clone(),
        };
        Ok(Assessment {
            id: self.id,
            system_id,
            control_id: ControlCode::parse(self.control_id)?,
            status: ComplianceStatus::from(self.status),
            notes: self.notes.unwrap_or_default(),
            risk_level: self.risk_level,
            evidence_ids: self.evidence_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Body of a status update
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub status: ServerStatus,
}

/// Body of a new comment
#[derive(Debug, Clone, Serialize)]
pub struct NewComment<'a> {
    pub content: &'a str,
}
