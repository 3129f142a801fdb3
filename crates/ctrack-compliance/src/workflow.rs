//! Approval Workflow
//!
//! Each assessment carries a review state derived from an append-only log
//! of events. Only the latest event decides the state; the per-kind
//! metadata (who requested, approved, rejected and when) comes from the
//! most recent event of that kind.
//!
//! ```text
//!   Draft --REQUEST_REVIEW--> PendingReview --APPROVE--> Approved
//!                              |        ^                   |
//!                        REJECT|        +--REQUEST_REVIEW---+
//!                              v        |
//!                           Rejected ---+ REQUEST_REVIEW
//! ```
//!
//! Events are persisted by the backend as comments whose text embeds a
//! marker such as `[WORKFLOW:APPROVE]`.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// Workflow errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("event at {attempted} precedes latest event at {latest}")]
    OutOfOrder {
        latest: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    #[error("{action} is not allowed from {from}")]
    InvalidTransition {
        from: WorkflowState,
        action: WorkflowAction,
    },
}

/// Kind of workflow event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    RequestReview,
    Approve,
    Reject,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestReview => "REQUEST_REVIEW",
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
        }
    }

    /// Comment marker, e.g. `[WORKFLOW:APPROVE]`
    pub fn marker(&self) -> String {
        format!("[WORKFLOW:{}]", self.as_str())
    }

    fn from_marker(raw: &str) -> Option<Self> {
        match raw {
            "REQUEST_REVIEW" => Some(Self::RequestReview),
            "APPROVE" => Some(Self::Approve),
            "REJECT" => Some(Self::Reject),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review state of an assessment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Draft,
    PendingReview,
    Approved,
    Rejected,
}

impl WorkflowState {
    /// State reached by applying `action` last
    pub fn after(action: WorkflowAction) -> Self {
        match action {
            WorkflowAction::RequestReview => Self::PendingReview,
            WorkflowAction::Approve => Self::Approved,
            WorkflowAction::Reject => Self::Rejected,
        }
    }

    /// Whether `action` may be appended in this state
    pub fn allows(&self, action: WorkflowAction) -> bool {
        match self {
            Self::Draft | Self::Approved | Self::Rejected => action == WorkflowAction::RequestReview,
            Self::PendingReview => true,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// One entry in a workflow log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub action: WorkflowAction,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[WORKFLOW:(REQUEST_REVIEW|APPROVE|REJECT)\]").expect("static marker pattern")
    })
}

impl WorkflowEvent {
    pub fn new(action: WorkflowAction, actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            action,
            actor: actor.into(),
            at,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Read an event out of a comment; `None` when it carries no marker
    ///
    /// The first marker wins. Remaining text becomes the note.
    pub fn from_comment(comment: &Comment) -> Option<Self> {
        let captures = marker_pattern().captures(&comment.content)?;
        let whole = captures.get(0)?;
        let action = WorkflowAction::from_marker(captures.get(1)?.as_str())?;

        let mut rest = String::with_capacity(comment.content.len());
        rest.push_str(&comment.content[..whole.start()]);
        rest.push_str(&comment.content[whole.end()..]);
        let rest = rest.trim();

        Some(Self {
            action,
            actor: comment.author.clone(),
            at: comment.created_at,
            note: (!rest.is_empty()).then(|| rest.to_string()),
        })
    }
}

/// Derived review state plus the latest actor per event kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub state: WorkflowState,
    pub requested_by: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
}

/// Derive the workflow status from events in any order
///
/// Events are ordered by timestamp; equal timestamps keep their given
/// order. No events means `Draft`.
pub fn derive_status(events: &[WorkflowEvent]) -> WorkflowStatus {
    let mut ordered: Vec<&WorkflowEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.at);

    let mut status = WorkflowStatus::default();
    for event in ordered {
        let who = Some(event.actor.clone());
        let when = Some(event.at);
        match event.action {
            WorkflowAction::RequestReview => {
                status.requested_by = who;
                status.requested_at = when;
            }
            WorkflowAction::Approve => {
                status.approved_by = who;
                status.approved_at = when;
            }
            WorkflowAction::Reject => {
                status.rejected_by = who;
                status.rejected_at = when;
            }
        }
        status.state = WorkflowState::after(event.action);
    }
    status
}

/// Extract events from a comment thread, skipping ordinary comments
pub fn events_from_comments(comments: &[Comment]) -> Vec<WorkflowEvent> {
    comments.iter().filter_map(WorkflowEvent::from_comment).collect()
}

/// Append-only event log for one assessment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowLog {
    events: Vec<WorkflowEvent>,
}

impl WorkflowLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from stored comments without re-validating history
    pub fn from_comments(comments: &[Comment]) -> Self {
        let mut events = events_from_comments(comments);
        events.sort_by_key(|e| e.at);
        Self { events }
    }

    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    pub fn latest(&self) -> Option<&WorkflowEvent> {
        self.events.last()
    }

    pub fn status(&self) -> WorkflowStatus {
        derive_status(&self.events)
    }

    /// Check that `event` may be appended without recording it
    pub fn check(&self, event: &WorkflowEvent) -> Result<(), WorkflowError> {
        if let Some(latest) = self.latest() {
            if event.at < latest.at {
                return Err(WorkflowError::OutOfOrder {
                    latest: latest.at,
                    attempted: event.at,
                });
            }
        }
        self.check_transition(event.action)
    }

    /// Check the state transition alone, ignoring timestamps
    pub fn check_transition(&self, action: WorkflowAction) -> Result<(), WorkflowError> {
        let from = self.status().state;
        if !from.allows(action) {
            return Err(WorkflowError::InvalidTransition { from, action });
        }
        Ok(())
    }

    /// Record an event already persisted elsewhere
    ///
    /// No validation; the event is placed after every event with the same
    /// or an earlier timestamp.
    pub fn record(&mut self, event: WorkflowEvent) -> WorkflowStatus {
        let idx = self.events.partition_point(|e| e.at <= event.at);
        self.events.insert(idx, event);
        self.status()
    }

    /// Validate and record an event
    pub fn append(&mut self, event: WorkflowEvent) -> Result<WorkflowStatus, WorkflowError> {
        self.check(&event)?;
        tracing::debug!(action = %event.action, actor = %event.actor, "workflow event appended");
        self.events.push(event);
        Ok(self.status())
    }
}

/// Discussion comment on an assessment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub assessment_id: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
}

impl Comment {
    /// Render an event as a marker comment ready to post
    pub fn for_event(assessment_id: &str, event: &WorkflowEvent) -> Self {
        let content = match &event.note {
            Some(note) => format!("{} {}", event.action.marker(), note),
            None => event.action.marker(),
        };
        Self {
            id: Uuid::new_v4().to_string(),
            assessment_id: Some(assessment_id.to_string()),
            author: event.actor.clone(),
            created_at: event.at,
            content,
        }
    }

    pub fn is_workflow(&self) -> bool {
        marker_pattern().is_match(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn comment(author: &str, at: DateTime<Utc>, content: &str) -> Comment {
        Comment {
            id: format!("c-{}", at.timestamp()),
            assessment_id: Some("a1".into()),
            author: author.into(),
            created_at: at,
            content: content.into(),
        }
    }

    #[test]
    fn test_no_events_is_draft() {
        assert_eq!(derive_status(&[]).state, WorkflowState::Draft);
        assert_eq!(WorkflowLog::new().status(), WorkflowStatus::default());
    }

    #[test]
    fn test_latest_event_decides_state() {
        let events = vec![
            WorkflowEvent::new(WorkflowAction::RequestReview, "alice", t(1)),
            WorkflowEvent::new(WorkflowAction::Approve, "bob", t(2)),
        ];
        let status = derive_status(&events);
        assert_eq!(status.state, WorkflowState::Approved);
        assert_eq!(status.approved_by.as_deref(), Some("bob"));

        let mut more = events.clone();
        more.push(WorkflowEvent::new(WorkflowAction::RequestReview, "carol", t(3)));
        let status = derive_status(&more);
        assert_eq!(status.state, WorkflowState::PendingReview);
        assert_eq!(status.approved_by.as_deref(), Some("bob"));
        assert_eq!(status.approved_at, Some(t(2)));
        assert_eq!(status.requested_by.as_deref(), Some("carol"));
    }

    #[test]
    fn test_derive_sorts_by_timestamp_stably() {
        let events = vec![
            WorkflowEvent::new(WorkflowAction::Approve, "bob", t(5)),
            WorkflowEvent::new(WorkflowAction::RequestReview, "alice", t(1)),
            WorkflowEvent::new(WorkflowAction::Reject, "dave", t(5)),
        ];
        let status = derive_status(&events);
        assert_eq!(status.state, WorkflowState::Rejected);
        assert_eq!(status.rejected_by.as_deref(), Some("dave"));
        assert_eq!(status.approved_by.as_deref(), Some("bob"));
    }

    #[test]
    fn test_parse_marker_comments() {
        let thread = vec![
            comment("alice", t(1), "[WORKFLOW:REQUEST_REVIEW] ready for a look"),
            comment("bob", t(2), "looks fine to me"),
            comment("bob", t(3), "[WORKFLOW:APPROVE]"),
            comment("eve", t(4), "[WORKFLOW:DELETE]"),
        ];
        let events = events_from_comments(&thread);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].note.as_deref(), Some("ready for a look"));
        assert_eq!(events[1].note, None);
        assert!(!thread[1].is_workflow());

        let log = WorkflowLog::from_comments(&thread);
        assert_eq!(log.status().state, WorkflowState::Approved);
    }

    #[test]
    fn test_for_event_round_trips_through_parser() {
        let event = WorkflowEvent::new(WorkflowAction::Reject, "bob", t(9)).with_note("missing evidence");
        let comment = Comment::for_event("a1", &event);
        assert_eq!(comment.content, "[WORKFLOW:REJECT] missing evidence");
        assert_eq!(WorkflowEvent::from_comment(&comment), Some(event));
    }

    #[test]
    fn test_record_places_events_by_timestamp() {
        let mut log = WorkflowLog::new();
        log.record(WorkflowEvent::new(WorkflowAction::RequestReview, "alice", t(10)));
        assert!(log.check_transition(WorkflowAction::Approve).is_ok());

        // stored with an earlier server timestamp than the request
        let status = log.record(WorkflowEvent::new(WorkflowAction::Approve, "bob", t(5)));
        assert_eq!(status.state, WorkflowState::PendingReview);
        assert_eq!(status.approved_by.as_deref(), Some("bob"));
        let actions: Vec<_> = log.events().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![WorkflowAction::Approve, WorkflowAction::RequestReview]);

        let status = log.record(WorkflowEvent::new(WorkflowAction::Reject, "carol", t(10)));
        assert_eq!(status.state, WorkflowState::Rejected);
        assert_eq!(
            log.check_transition(WorkflowAction::Approve),
            Err(WorkflowError::InvalidTransition { from: WorkflowState::Rejected, action: WorkflowAction::Approve })
        );
    }

    #[test]
    fn test_append_validates_order_and_transitions() {
        let mut log = WorkflowLog::new();
        let err = log
            .append(WorkflowEvent::new(WorkflowAction::Approve, "bob", t(1)))
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InvalidTransition { from: WorkflowState::Draft, action: WorkflowAction::Approve }
        );

        log.append(WorkflowEvent::new(WorkflowAction::RequestReview, "alice", t(2))).unwrap();
        let err = log
            .append(WorkflowEvent::new(WorkflowAction::Approve, "bob", t(1)))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::OutOfOrder { .. }));

        // the requester may approve their own request
        let status = log.append(WorkflowEvent::new(WorkflowAction::Approve, "alice", t(3))).unwrap();
        assert_eq!(status.state, WorkflowState::Approved);

        assert!(log.append(WorkflowEvent::new(WorkflowAction::Reject, "bob", t(4))).is_err());
        let status = log.append(WorkflowEvent::new(WorkflowAction::RequestReview, "alice", t(4))).unwrap();
        assert_eq!(status.state, WorkflowState::PendingReview);
        assert_eq!(log.events().len(), 3);
    }
}
