//! Coordinates one turn: collaborators in, decision out, ticket when the
//! decision says so. Chat turns and social posts share every step after
//! normalization.

use std::sync::Arc;

use anyhow::Result;
use crabdesk_provider::{Classification, Classifier, Generator, Retriever};
use crabdesk_schema::{
    Channel, ConversationContext, EscalationDecision, EscalationSignal, SocialPost, Ticket,
};
use crabdesk_ticket::{TicketError, TicketManager};

use crate::context::ContextManager;
use crate::normalizer::SignalNormalizer;
use crate::policy::PolicyEvaluator;
use crate::ranker::PriorityRanker;

/// Shown when the generation collaborator is unreachable. The turn still
/// resolves: confidence is forced to zero, which escalates it.
const FALLBACK_REPLY: &str =
    "Sorry, we are having technical trouble right now. A support agent will follow up with you shortly.";

pub struct TurnOutcome {
    pub response_text: String,
    pub decision: EscalationDecision,
    pub ticket: Option<Ticket>,
}

pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    normalizer: SignalNormalizer,
    evaluator: PolicyEvaluator,
    ranker: PriorityRanker,
    tickets: Arc<TicketManager>,
    contexts: ContextManager,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Arc<dyn Classifier>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        normalizer: SignalNormalizer,
        evaluator: PolicyEvaluator,
        ranker: PriorityRanker,
        tickets: Arc<TicketManager>,
        contexts: ContextManager,
    ) -> Self {
        Self {
            classifier,
            retriever,
            generator,
            normalizer,
            evaluator,
            ranker,
            tickets,
            contexts,
        }
    }

    /// Handle one chat turn end to end.
    pub async fn handle_turn(&self, conversation_id: &str, text: &str) -> Result<TurnOutcome> {
        let mut ctx = self.contexts.get_or_create(conversation_id).await?;

        let classification = self.classify_degraded(text).await;

        let passages = match self.retriever.retrieve(text).await {
            Ok(passages) => passages,
            Err(err) => {
                tracing::warn!(conversation_id, "retrieval failed, continuing without context: {err}");
                vec![]
            }
        };

        let (response_text, generation_ok) = match self.generator.generate(text, &passages).await {
            Ok(draft) => (draft.text, true),
            Err(err) => {
                tracing::warn!(conversation_id, "generation failed, using fallback reply: {err}");
                (FALLBACK_REPLY.to_string(), false)
            }
        };

        let confidence = if generation_ok {
            classification.confidence
        } else {
            0.0
        };

        let signal = self.normalizer.normalize(
            &classification.intent,
            confidence,
            classification.sentiment,
            &classification.keywords,
            Channel::Chat,
            format!("chat:{conversation_id}"),
        );
        let decision = self.evaluator.evaluate(&signal, &ctx);

        let ticket = if decision.should_escalate {
            Some(
                self.open_or_upgrade(conversation_id, &signal, &decision, &ctx)
                    .await?,
            )
        } else {
            None
        };

        self.contexts
            .record_turn(&mut ctx, signal, decision.should_escalate)
            .await?;

        Ok(TurnOutcome {
            response_text,
            decision,
            ticket,
        })
    }

    /// Handle one qualifying social post. Same evaluator, same ticket path;
    /// the conversation is keyed by author so repeat complaints land on one
    /// active ticket.
    pub async fn handle_social_post(&self, post: &SocialPost) -> Result<Option<Ticket>> {
        let conversation_id = format!("social:{}", post.author);
        let mut ctx = self.contexts.get_or_create(&conversation_id).await?;

        let classification = self.classify_degraded(&post.text).await;

        let mut raw_keywords = classification.keywords.clone();
        raw_keywords.extend(post.hashtags.iter().cloned());

        let signal = self.normalizer.normalize(
            &classification.intent,
            classification.confidence,
            classification.sentiment,
            &raw_keywords,
            Channel::Social,
            post.source_ref(),
        );
        let decision = self.evaluator.evaluate(&signal, &ctx);

        let ticket = if decision.should_escalate {
            Some(
                self.open_or_upgrade(&conversation_id, &signal, &decision, &ctx)
                    .await?,
            )
        } else {
            None
        };

        self.contexts
            .record_turn(&mut ctx, signal, decision.should_escalate)
            .await?;

        Ok(ticket)
    }

    /// Collaborator failures degrade the signal instead of failing the turn.
    async fn classify_degraded(&self, text: &str) -> Classification {
        match self.classifier.classify(text).await {
            Ok(classification) => classification,
            Err(err) => {
                tracing::warn!("classification failed, treating as zero confidence: {err}");
                Classification {
                    intent: "unknown".into(),
                    confidence: 0.0,
                    sentiment: 0.0,
                    keywords: vec![],
                }
            }
        }
    }

    /// One active ticket per conversation: a duplicate create turns into a
    /// priority upgrade on the existing ticket.
    async fn open_or_upgrade(
        &self,
        conversation_id: &str,
        signal: &EscalationSignal,
        decision: &EscalationDecision,
        ctx: &ConversationContext,
    ) -> Result<Ticket> {
        let priority = self.ranker.rank(decision, signal, ctx);
        match self.tickets.create(conversation_id, priority, decision).await {
            Ok(ticket) => Ok(ticket),
            Err(TicketError::DuplicateTicket { existing, .. }) => {
                Ok(self.tickets.upgrade_priority(existing, priority).await?)
            }
            Err(other) => Err(other.into()),
        }
    }
}
