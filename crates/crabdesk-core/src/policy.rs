//! The escalation decision itself. Pure over (signal, context, static
//! config): no I/O, safe to call concurrently from chat and social paths.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use crabdesk_schema::{ConversationContext, EscalationDecision, EscalationSignal, ReasonCode};

use crate::config::{EscalationConfig, EscalationThresholds};

pub struct PolicyEvaluator {
    thresholds: EscalationThresholds,
    legal: HashSet<String>,
}

impl PolicyEvaluator {
    pub fn new(config: &EscalationConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            legal: config
                .legal_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn evaluate(
        &self,
        signal: &EscalationSignal,
        context: &ConversationContext,
    ) -> EscalationDecision {
        let mut reasons = BTreeSet::new();

        if signal.confidence < self.thresholds.low_confidence {
            reasons.insert(ReasonCode::LowConfidence);
        }
        if signal.sentiment < self.thresholds.severe_sentiment {
            reasons.insert(ReasonCode::SevereNegativeSentiment);
        }
        if !signal.matched_keywords.is_empty() {
            reasons.insert(ReasonCode::EscalationKeyword);
        }
        if signal.is_cancellation_intent {
            reasons.insert(ReasonCode::CancellationRequest);
        }
        // Anti-flap: once a conversation has been flagged it stays with a
        // human until the conversation ends.
        if context.prior_escalations >= 1 {
            reasons.insert(ReasonCode::RepeatedEscalation);
        }
        if signal
            .matched_keywords
            .iter()
            .any(|k| self.legal.contains(k))
        {
            reasons.insert(ReasonCode::LegalRisk);
        }

        EscalationDecision {
            should_escalate: !reasons.is_empty(),
            reasons,
            computed_at: Utc::now(),
        }
    }
}
