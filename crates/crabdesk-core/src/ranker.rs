//! Maps an escalation decision to a queue priority. Ordered rules, first
//! match wins, so replaying the same inputs always reproduces the same
//! priority.

use crabdesk_schema::{
    ConversationContext, EscalationDecision, EscalationSignal, Priority, ReasonCode,
};

use crate::config::EscalationThresholds;

pub struct PriorityRanker {
    thresholds: EscalationThresholds,
}

impl PriorityRanker {
    pub fn new(thresholds: EscalationThresholds) -> Self {
        Self { thresholds }
    }

    /// Only meaningful for escalated decisions; callers check
    /// `should_escalate` first.
    pub fn rank(
        &self,
        decision: &EscalationDecision,
        signal: &EscalationSignal,
        context: &ConversationContext,
    ) -> Priority {
        debug_assert!(decision.should_escalate, "ranking a non-escalated decision");

        if decision.has_reason(ReasonCode::LegalRisk) || context.is_vip {
            return Priority::Urgent;
        }
        if signal.sentiment <= self.thresholds.high_sentiment
            || decision.has_reason(ReasonCode::CancellationRequest)
        {
            return Priority::High;
        }
        if !signal.matched_keywords.is_empty()
            || decision.has_reason(ReasonCode::RepeatedEscalation)
        {
            return Priority::Medium;
        }
        Priority::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crabdesk_schema::Channel;
    use std::collections::BTreeSet;

    fn ranker() -> PriorityRanker {
        PriorityRanker::new(Default::default())
    }

    fn signal(sentiment: f32) -> EscalationSignal {
        EscalationSignal {
            confidence: 0.3,
            sentiment,
            matched_keywords: BTreeSet::new(),
            is_cancellation_intent: false,
            channel: Channel::Chat,
            source_ref: "chat:1".into(),
        }
    }

    fn decision(reasons: &[ReasonCode]) -> EscalationDecision {
        EscalationDecision {
            should_escalate: true,
            reasons: reasons.iter().copied().collect(),
            computed_at: Utc::now(),
        }
    }

    fn context() -> ConversationContext {
        ConversationContext::new("conv:1")
    }

    #[test]
    fn legal_risk_is_urgent_regardless_of_scores() {
        let d = decision(&[ReasonCode::LegalRisk, ReasonCode::EscalationKeyword]);
        let mut s = signal(0.9);
        s.confidence = 0.99;
        assert_eq!(ranker().rank(&d, &s, &context()), Priority::Urgent);
    }

    #[test]
    fn vip_escalation_is_urgent() {
        let d = decision(&[ReasonCode::LowConfidence]);
        let mut ctx = context();
        ctx.is_vip = true;
        assert_eq!(ranker().rank(&d, &signal(0.0), &ctx), Priority::Urgent);
    }

    #[test]
    fn deep_negative_sentiment_is_high() {
        let d = decision(&[ReasonCode::SevereNegativeSentiment]);
        assert_eq!(ranker().rank(&d, &signal(-0.9), &context()), Priority::High);
        // Boundary is inclusive.
        assert_eq!(
            ranker().rank(&d, &signal(-0.85), &context()),
            Priority::High
        );
    }

    #[test]
    fn cancellation_is_high() {
        let d = decision(&[ReasonCode::CancellationRequest]);
        assert_eq!(ranker().rank(&d, &signal(0.1), &context()), Priority::High);
    }

    #[test]
    fn keyword_or_repeat_is_medium() {
        let d = decision(&[ReasonCode::EscalationKeyword]);
        let mut s = signal(-0.2);
        s.matched_keywords.insert("complaint".into());
        assert_eq!(ranker().rank(&d, &s, &context()), Priority::Medium);

        let d = decision(&[ReasonCode::RepeatedEscalation]);
        assert_eq!(
            ranker().rank(&d, &signal(-0.2), &context()),
            Priority::Medium
        );
    }

    #[test]
    fn lone_low_confidence_is_low() {
        let d = decision(&[ReasonCode::LowConfidence]);
        assert_eq!(ranker().rank(&d, &signal(0.0), &context()), Priority::Low);
    }

    #[test]
    fn severe_sentiment_between_thresholds_is_medium_without_other_signals() {
        // -0.8 escalates (severe) but does not reach the high band; with a
        // repeat flag it lands medium.
        let d = decision(&[
            ReasonCode::SevereNegativeSentiment,
            ReasonCode::RepeatedEscalation,
        ]);
        assert_eq!(
            ranker().rank(&d, &signal(-0.8), &context()),
            Priority::Medium
        );
    }
}
