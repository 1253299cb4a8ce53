//! Conversation context bookkeeping. A context idle longer than its TTL is
//! replaced by a fresh one on next contact, which resets the
//! prior-escalation counter; that is where "end of conversation" is drawn.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use crabdesk_schema::{ConversationContext, EscalationSignal};
use crabdesk_store::DeskStore;

pub struct ContextManager {
    store: Arc<DeskStore>,
    ttl_seconds: i64,
}

impl ContextManager {
    pub fn new(store: Arc<DeskStore>, ttl_seconds: i64) -> Self {
        Self { store, ttl_seconds }
    }

    pub async fn get_or_create(&self, conversation_id: &str) -> Result<ConversationContext> {
        if let Some(ctx) = self.store.get_context(conversation_id).await? {
            let idle = (Utc::now() - ctx.last_active).num_seconds();
            if idle < self.ttl_seconds {
                return Ok(ctx);
            }
            tracing::debug!(
                conversation_id,
                idle_secs = idle,
                "conversation expired, starting fresh context"
            );
        }

        let ctx = ConversationContext::new(conversation_id);
        self.store.upsert_context(&ctx).await?;
        Ok(ctx)
    }

    /// Append the turn's signal, bump the escalation counter when the turn
    /// escalated, and persist.
    pub async fn record_turn(
        &self,
        ctx: &mut ConversationContext,
        signal: EscalationSignal,
        escalated: bool,
    ) -> Result<()> {
        ctx.push_signal(signal);
        if escalated {
            ctx.note_escalation();
        }
        self.store.upsert_context(ctx).await
    }

    pub async fn mark_vip(&self, conversation_id: &str, is_vip: bool) -> Result<()> {
        let mut ctx = self.get_or_create(conversation_id).await?;
        ctx.is_vip = is_vip;
        self.store.upsert_context(&ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crabdesk_schema::Channel;
    use std::collections::BTreeSet;

    fn sample_signal() -> EscalationSignal {
        EscalationSignal {
            confidence: 0.4,
            sentiment: -0.1,
            matched_keywords: BTreeSet::new(),
            is_cancellation_intent: false,
            channel: Channel::Chat,
            source_ref: "chat:1".into(),
        }
    }

    #[tokio::test]
    async fn escalation_counter_persists_across_turns() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let mgr = ContextManager::new(store, 3_600);

        let mut ctx = mgr.get_or_create("conv:1").await.unwrap();
        mgr.record_turn(&mut ctx, sample_signal(), true).await.unwrap();

        let reloaded = mgr.get_or_create("conv:1").await.unwrap();
        assert_eq!(reloaded.prior_escalations, 1);
        assert_eq!(reloaded.history.len(), 1);
    }

    #[tokio::test]
    async fn expired_context_resets_prior_escalations() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let mgr = ContextManager::new(store, 0);

        let mut ctx = mgr.get_or_create("conv:2").await.unwrap();
        mgr.record_turn(&mut ctx, sample_signal(), true).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        let fresh = mgr.get_or_create("conv:2").await.unwrap();
        assert_eq!(fresh.prior_escalations, 0);
        assert!(fresh.history.is_empty());
    }

    #[tokio::test]
    async fn mark_vip_sticks() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let mgr = ContextManager::new(store, 3_600);

        mgr.mark_vip("conv:3", true).await.unwrap();
        let ctx = mgr.get_or_create("conv:3").await.unwrap();
        assert!(ctx.is_vip);
    }
}
