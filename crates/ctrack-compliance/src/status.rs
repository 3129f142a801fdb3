//! Assessment status vocabulary
//!
//! The client speaks in implementation labels ("Partially Implemented"),
//! the backend in compliance terms (`PARTIALLY_COMPLIANT`). Both enums are
//! closed and map one-to-one.

use ctrack_common::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client-facing assessment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "Not Assessed")]
    NotAssessed,
    #[serde(rename = "Not Applicable")]
    NotApplicable,
    #[serde(rename = "Not Implemented")]
    NotImplemented,
    #[serde(rename = "Partially Implemented")]
    PartiallyImplemented,
    #[serde(rename = "Implemented")]
    Implemented,
}

impl ComplianceStatus {
    /// Every status, in display order
    pub const ALL: [ComplianceStatus; 5] = [
        Self::NotAssessed,
        Self::NotApplicable,
        Self::NotImplemented,
        Self::PartiallyImplemented,
        Self::Implemented,
    ];

    /// Human label
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotAssessed => "Not Assessed",
            Self::NotApplicable => "Not Applicable",
            Self::NotImplemented => "Not Implemented",
            Self::PartiallyImplemented => "Partially Implemented",
            Self::Implemented => "Implemented",
        }
    }

    /// Whether the status counts toward the score denominator
    pub fn is_assessed(&self) -> bool {
        !matches!(self, Self::NotAssessed | Self::NotApplicable)
    }

    /// Assessed but not fully implemented
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::NotImplemented | Self::PartiallyImplemented)
    }

    /// Server enum for this status
    pub fn to_server(self) -> ServerStatus {
        match self {
            Self::NotAssessed => ServerStatus::NotAssessed,
            Self::NotApplicable => ServerStatus::NotApplicable,
            Self::NotImplemented => ServerStatus::NonCompliant,
            Self::PartiallyImplemented => ServerStatus::PartiallyCompliant,
            Self::Implemented => ServerStatus::Compliant,
        }
    }

    /// Client status for a server enum value
    pub fn from_server(status: ServerStatus) -> Self {
        match status {
            ServerStatus::NotAssessed => Self::NotAssessed,
            ServerStatus::NotApplicable => Self::NotApplicable,
            ServerStatus::NonCompliant => Self::NotImplemented,
            ServerStatus::PartiallyCompliant => Self::PartiallyImplemented,
            ServerStatus::Compliant => Self::Implemented,
        }
    }
}

impl Default for ComplianceStatus {
    fn default() -> Self {
        Self::NotAssessed
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ComplianceStatus {
    type Err = DomainError;

    /// Accepts the label in any letter case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

impl From<ServerStatus> for ComplianceStatus {
    fn from(status: ServerStatus) -> Self {
        Self::from_server(status)
    }
}

impl From<ComplianceStatus> for ServerStatus {
    fn from(status: ComplianceStatus) -> Self {
        status.to_server()
    }
}

/// Backend assessment status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    NotAssessed,
    NotApplicable,
    NonCompliant,
    PartiallyCompliant,
    Compliant,
}

impl ServerStatus {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAssessed => "NOT_ASSESSED",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::NonCompliant => "NON_COMPLIANT",
            Self::PartiallyCompliant => "PARTIALLY_COMPLIANT",
            Self::Compliant => "COMPLIANT",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NOT_ASSESSED" => Ok(Self::NotAssessed),
            "NOT_APPLICABLE" => Ok(Self::NotApplicable),
            "NON_COMPLIANT" => Ok(Self::NonCompliant),
            "PARTIALLY_COMPLIANT" => Ok(Self::PartiallyCompliant),
            "COMPLIANT" => Ok(Self::Compliant),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Risk level recorded against an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}
