//! Value Objects - Immutable domain primitives with validation
//!
//! Value Objects are:
//! - Immutable
//! - Comparable by value (not identity)
//! - Self-validating

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Hierarchy node identifier (Value Object)
///
/// Issued by the backend for capability centres, frameworks, products and
/// systems.
///
/// # Invariants
/// - Must be non-empty after trimming
/// - Max 128 characters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Create new node ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidNodeId("cannot be empty".into()));
        }
        if id.len() > 128 {
            return Err(DomainError::InvalidNodeId("max 128 characters".into()));
        }
        Ok(Self(id))
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Systems are hierarchy nodes; assessments are keyed by them.
pub type SystemId = NodeId;

fn control_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Z]{2})\.([A-Z]{2})-(\d{1,4})$").expect("static control code pattern")
    })
}

/// Control code (Value Object), e.g. `DE.AE-01`
///
/// # Invariants
/// - Shape `<FN>.<CAT>-<NN>`: two upper-case letters, a dot, two upper-case
///   letters, a hyphen, 1-4 digits
///
/// Ordering compares function, category, then the numeric suffix as a
/// number, so `PR.AA-2` sorts before `PR.AA-10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlCode {
    raw: String,
    number: u32,
}

impl ControlCode {
    /// Parse and validate a control code
    pub fn parse(code: impl Into<String>) -> Result<Self, DomainError> {
        let raw = code.into();
        let number = control_code_pattern()
            .captures(&raw)
            .and_then(|caps| caps.get(3))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .ok_or_else(|| DomainError::InvalidControlCode(raw.clone()))?;
        Ok(Self { raw, number })
    }

    /// Full code
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Function segment (`DE` for `DE.AE-01`)
    pub fn function(&self) -> &str {
        &self.raw[..2]
    }

    /// Category prefix (`DE.AE` for `DE.AE-01`)
    ///
    /// Derived from the code itself; the server-supplied category field is
    /// not consulted.
    pub fn category(&self) -> &str {
        &self.raw[..5]
    }

    /// Numeric suffix
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl Ord for ControlCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.category()
            .cmp(other.category())
            .then(self.number.cmp(&other.number))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for ControlCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<String> for ControlCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ControlCode> for String {
    fn from(code: ControlCode) -> Self {
        code.raw
    }
}

/// Domain errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Blank or oversized node id
    #[error("invalid node ID: {0}")]
    InvalidNodeId(String),

    /// Code not shaped like `DE.AE-01`
    #[error("invalid control code: {0}")]
    InvalidControlCode(String),

    /// Status label or server value outside the closed set
    #[error("unknown status: {0}")]
    UnknownStatus(String),

    /// Removal of an assessment that evidence still points at
    #[error("assessment {0} is referenced by evidence")]
    EvidenceReferenced(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_valid() {
        let id = NodeId::new("sys-42").unwrap();
        assert_eq!(id.as_str(), "sys-42");
    }

    #[test]
    fn test_node_id_blank_fails() {
        assert!(NodeId::new("").is_err());
        assert!(NodeId::new("   ").is_err());
    }

    #[test]
    fn test_node_id_too_long_fails() {
        assert!(NodeId::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_control_code_segments() {
        let code = ControlCode::parse("DE.AE-01").unwrap();
        assert_eq!(code.function(), "DE");
        assert_eq!(code.category(), "DE.AE");
        assert_eq!(code.number(), 1);
    }

    #[test]
    fn test_control_code_rejects_malformed() {
        for bad in ["", "DE.AE", "de.ae-01", "DE-AE-01", "DE.AE-", "DEX.AE-01", "DE.AE-01a"] {
            assert!(ControlCode::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_control_code_numeric_ordering() {
        let mut codes: Vec<_> = ["PR.AA-10", "PR.AA-2", "GV.OC-01", "PR.AA-01"]
            .into_iter()
            .map(|c| ControlCode::parse(c).unwrap())
            .collect();
        codes.sort();
        let ordered: Vec<_> = codes.iter().map(|c| c.as_str()).collect();
        assert_eq!(ordered, vec!["GV.OC-01", "PR.AA-01", "PR.AA-2", "PR.AA-10"]);
    }

    #[test]
    fn test_control_code_serde_as_string() {
        let code = ControlCode::parse("RS.MA-03").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"RS.MA-03\"");
        let back: ControlCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
        assert!(serde_json::from_str::<ControlCode>("\"nope\"").is_err());
    }
}
