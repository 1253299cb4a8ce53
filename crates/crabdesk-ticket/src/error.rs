use crabdesk_schema::TicketStatus;
use thiserror::Error;
use uuid::Uuid;

/// Recoverable ticket failures. Carried back to the caller with enough
/// context to audit; never panics the process.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("active ticket {existing} already exists for conversation {conversation_id}")]
    DuplicateTicket {
        conversation_id: String,
        existing: Uuid,
    },

    #[error(
        "invalid transition for ticket {ticket_id}: {} -> {}",
        from.as_str(),
        attempted.as_str()
    )]
    InvalidTransition {
        ticket_id: Uuid,
        from: TicketStatus,
        attempted: TicketStatus,
    },

    #[error("ticket not found: {ticket_id}")]
    NotFound { ticket_id: Uuid },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
