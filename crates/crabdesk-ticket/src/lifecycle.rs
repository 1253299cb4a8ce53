//! Ticket state machine. Owns every status transition and the audit trail;
//! callers never mutate tickets directly.

use std::sync::Arc;

use chrono::Utc;
use crabdesk_schema::{
    EscalationDecision, Priority, ReasonCode, StatusChange, Ticket, TicketStatus,
};
use crabdesk_store::DeskStore;
use uuid::Uuid;

use crate::error::TicketError;
use crate::lock::KeyLocks;

pub const SYSTEM_ACTOR: &str = "system";

pub struct TicketManager {
    store: Arc<DeskStore>,
    locks: KeyLocks,
}

fn transition_allowed(from: TicketStatus, to: TicketStatus) -> bool {
    use TicketStatus::*;
    matches!(
        (from, to),
        (Open, Assigned)
            | (Assigned, InProgress)
            | (InProgress, Resolved)
            | (Open, Resolved)
            | (Resolved, Closed)
    )
}

impl TicketManager {
    pub fn new(store: Arc<DeskStore>) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
        }
    }

    /// Open a ticket for an escalated conversation. At most one active
    /// ticket per conversation; a decision carrying legal risk always opens
    /// a fresh ticket instead of merging into the active one.
    pub async fn create(
        &self,
        conversation_id: &str,
        priority: Priority,
        decision: &EscalationDecision,
    ) -> Result<Ticket, TicketError> {
        let _guard = self.locks.acquire(&format!("conv:{conversation_id}")).await;

        if !decision.has_reason(ReasonCode::LegalRisk) {
            if let Some(existing) = self.store.active_ticket_for(conversation_id).await? {
                return Err(TicketError::DuplicateTicket {
                    conversation_id: conversation_id.to_string(),
                    existing: existing.id,
                });
            }
        }

        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            priority,
            status: TicketStatus::Open,
            assigned_agent: None,
            created_at: now,
            history: vec![StatusChange {
                from: None,
                to: TicketStatus::Open,
                at: now,
                actor: SYSTEM_ACTOR.to_string(),
            }],
        };
        self.store.insert_ticket(&ticket).await?;

        tracing::info!(
            ticket_id = %ticket.id,
            conversation_id,
            priority = priority.as_str(),
            reasons = ?decision.reasons,
            "ticket opened"
        );
        Ok(ticket)
    }

    pub async fn assign(&self, ticket_id: Uuid, agent: &str) -> Result<Ticket, TicketError> {
        self.transition(ticket_id, TicketStatus::Assigned, agent, Some(agent))
            .await
    }

    pub async fn start_work(&self, ticket_id: Uuid, agent: &str) -> Result<Ticket, TicketError> {
        self.transition(ticket_id, TicketStatus::InProgress, agent, None)
            .await
    }

    /// Resolve a ticket. Also valid straight from `Open` (auto-resolved
    /// without an agent, e.g. a retracted complaint).
    pub async fn resolve(&self, ticket_id: Uuid, actor: &str) -> Result<Ticket, TicketError> {
        self.transition(ticket_id, TicketStatus::Resolved, actor, None)
            .await
    }

    pub async fn close(&self, ticket_id: Uuid, actor: &str) -> Result<Ticket, TicketError> {
        let ticket = self
            .transition(ticket_id, TicketStatus::Closed, actor, None)
            .await?;
        // Closed conversations no longer contend; shed their idle locks.
        self.locks.cleanup_unused().await;
        Ok(ticket)
    }

    /// Raise the ticket's priority. Downgrades are ignored and logged, never
    /// errors: a later calmer signal must not demote an already-hot ticket.
    pub async fn upgrade_priority(
        &self,
        ticket_id: Uuid,
        priority: Priority,
    ) -> Result<Ticket, TicketError> {
        let _guard = self.locks.acquire(&format!("ticket:{ticket_id}")).await;

        let mut ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or(TicketError::NotFound { ticket_id })?;

        if priority <= ticket.priority {
            tracing::info!(
                ticket_id = %ticket_id,
                current = ticket.priority.as_str(),
                requested = priority.as_str(),
                "priority downgrade ignored"
            );
            return Ok(ticket);
        }

        self.store.set_priority(ticket_id, priority).await?;
        tracing::info!(
            ticket_id = %ticket_id,
            from = ticket.priority.as_str(),
            to = priority.as_str(),
            "priority upgraded"
        );
        ticket.priority = priority;
        Ok(ticket)
    }

    async fn transition(
        &self,
        ticket_id: Uuid,
        to: TicketStatus,
        actor: &str,
        agent: Option<&str>,
    ) -> Result<Ticket, TicketError> {
        let _guard = self.locks.acquire(&format!("ticket:{ticket_id}")).await;

        let mut ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or(TicketError::NotFound { ticket_id })?;

        if !transition_allowed(ticket.status, to) {
            return Err(TicketError::InvalidTransition {
                ticket_id,
                from: ticket.status,
                attempted: to,
            });
        }

        // Audit times never run backwards within one ticket, even if the
        // wall clock does.
        let last_at = ticket.history.last().map(|c| c.at);
        let at = match last_at {
            Some(prev) if prev > Utc::now() => prev,
            _ => Utc::now(),
        };

        let change = StatusChange {
            from: Some(ticket.status),
            to,
            at,
            actor: actor.to_string(),
        };
        self.store
            .apply_status_change(ticket_id, to, agent, &change)
            .await?;

        tracing::info!(
            ticket_id = %ticket_id,
            from = ticket.status.as_str(),
            to = to.as_str(),
            actor,
            "ticket transition"
        );

        ticket.status = to;
        if let Some(agent) = agent {
            ticket.assigned_agent = Some(agent.to_string());
        }
        ticket.history.push(change);
        Ok(ticket)
    }
}
