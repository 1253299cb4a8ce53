use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a signal originated. Both channels flow through the same
/// evaluator; nothing downstream branches on this except display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Chat,
    Social,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Social => "social",
        }
    }
}

/// One normalized evidence bundle per evaluated turn or post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSignal {
    /// Classifier confidence, clamped to [0, 1].
    pub confidence: f32,
    /// Sentiment score, clamped to [-1, 1]. Negative is unhappy.
    pub sentiment: f32,
    /// Raw keywords intersected with the configured vocabularies.
    pub matched_keywords: BTreeSet<String>,
    pub is_cancellation_intent: bool,
    pub channel: Channel,
    /// Back-reference to the originating message or post.
    pub source_ref: String,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    LowConfidence,
    SevereNegativeSentiment,
    EscalationKeyword,
    CancellationRequest,
    RepeatedEscalation,
    LegalRisk,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::SevereNegativeSentiment => "severe_negative_sentiment",
            Self::EscalationKeyword => "escalation_keyword",
            Self::CancellationRequest => "cancellation_request",
            Self::RepeatedEscalation => "repeated_escalation",
            Self::LegalRisk => "legal_risk",
        }
    }
}

/// Outcome of one policy evaluation. Never stored on its own; always
/// embedded in a turn outcome or a ticket creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub should_escalate: bool,
    pub reasons: BTreeSet<ReasonCode>,
    pub computed_at: DateTime<Utc>,
}

impl EscalationDecision {
    pub fn resolved() -> Self {
        Self {
            should_escalate: false,
            reasons: BTreeSet::new(),
            computed_at: Utc::now(),
        }
    }

    pub fn has_reason(&self, reason: ReasonCode) -> bool {
        self.reasons.contains(&reason)
    }
}

/// Queue priority. Derived `Ord` gives `Low < Medium < High < Urgent`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Active tickets block a second ticket on the same conversation.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Assigned | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// One audit-trail entry. `from: None` marks ticket creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: Option<TicketStatus>,
    pub to: TicketStatus,
    pub at: DateTime<Utc>,
    /// Agent ref or "system" for automated transitions.
    pub actor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub conversation_id: String,
    pub priority: Priority,
    pub status: TicketStatus,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

/// Read-only snapshot of a public post from the social platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub post_id: String,
    pub text: String,
    pub author: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub hashtags: BTreeSet<String>,
}

impl SocialPost {
    pub fn source_ref(&self) -> String {
        format!("social:{}", self.post_id)
    }
}

/// Per-conversation state carried across turns. Appending signals and
/// counting escalations is the only mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    #[serde(default)]
    pub customer_ref: Option<String>,
    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub prior_escalations: u32,
    #[serde(default)]
    pub history: Vec<EscalationSignal>,
    pub last_active: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            customer_ref: None,
            is_vip: false,
            prior_escalations: 0,
            history: Vec::new(),
            last_active: Utc::now(),
        }
    }

    pub fn push_signal(&mut self, signal: EscalationSignal) {
        self.history.push(signal);
        self.last_active = Utc::now();
    }

    pub fn note_escalation(&mut self) {
        self.prior_escalations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_total_order() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);

        let mut all = vec![
            Priority::High,
            Priority::Low,
            Priority::Urgent,
            Priority::Medium,
        ];
        all.sort();
        assert_eq!(
            all,
            vec![
                Priority::Low,
                Priority::Medium,
                Priority::High,
                Priority::Urgent
            ]
        );
    }

    #[test]
    fn ticket_status_activity() {
        assert!(TicketStatus::Open.is_active());
        assert!(TicketStatus::Assigned.is_active());
        assert!(TicketStatus::InProgress.is_active());
        assert!(!TicketStatus::Resolved.is_active());
        assert!(!TicketStatus::Closed.is_active());
        assert!(TicketStatus::Closed.is_terminal());
        assert!(!TicketStatus::Resolved.is_terminal());
    }

    #[test]
    fn resolved_decision_is_empty() {
        let decision = EscalationDecision::resolved();
        assert!(!decision.should_escalate);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn context_tracks_signals_and_escalations() {
        let mut ctx = ConversationContext::new("conv:1");
        assert_eq!(ctx.prior_escalations, 0);

        ctx.push_signal(EscalationSignal {
            confidence: 0.9,
            sentiment: 0.1,
            matched_keywords: BTreeSet::new(),
            is_cancellation_intent: false,
            channel: Channel::Chat,
            source_ref: "chat:conv:1".into(),
        });
        ctx.note_escalation();

        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.prior_escalations, 1);
    }

    #[test]
    fn ticket_backward_compat_defaults() {
        // Older rows have no assigned_agent or history fields.
        let old_json = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "conversation_id": "conv:9",
            "priority": "high",
            "status": "open",
            "created_at": "2026-05-01T10:00:00Z"
        }"#;

        let ticket: Ticket = serde_json::from_str(old_json).unwrap();
        assert_eq!(ticket.assigned_agent, None);
        assert!(ticket.history.is_empty());
        assert_eq!(ticket.priority, Priority::High);
    }

    #[test]
    fn reason_code_serde_is_snake_case() {
        let json = serde_json::to_string(&ReasonCode::SevereNegativeSentiment).unwrap();
        assert_eq!(json, "\"severe_negative_sentiment\"");
        let back: ReasonCode = serde_json::from_str("\"legal_risk\"").unwrap();
        assert_eq!(back, ReasonCode::LegalRisk);
    }

    #[test]
    fn social_post_source_ref() {
        let post = SocialPost {
            post_id: "113990".into(),
            text: "still no signal".into(),
            author: "mika".into(),
            at: Utc::now(),
            hashtags: BTreeSet::from(["support".to_string()]),
        };
        assert_eq!(post.source_ref(), "social:113990");
    }
}
