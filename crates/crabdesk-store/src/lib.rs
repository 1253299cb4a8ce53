//! SQLite-backed persistence for tickets, conversation contexts and the
//! seen-post window of the social watch.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use crabdesk_schema::{
    ConversationContext, Priority, StatusChange, Ticket, TicketStatus,
};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct DeskStore {
    conn: Arc<Mutex<Connection>>,
}

impl DeskStore {
    /// Open or create the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tickets
    // ─────────────────────────────────────────────────────────────────────

    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO tickets
               (id, conversation_id, priority, status, assigned_agent, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                ticket.id.to_string(),
                ticket.conversation_id,
                ticket.priority.as_str(),
                ticket.status.as_str(),
                ticket.assigned_agent,
                ticket.created_at.to_rfc3339(),
            ],
        )?;
        for change in &ticket.history {
            insert_status_change(&conn, ticket.id, change)?;
        }
        Ok(())
    }

    pub async fn get_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                r#"SELECT id, conversation_id, priority, status, assigned_agent, created_at
                   FROM tickets WHERE id = ?1"#,
                [ticket_id.to_string()],
                row_to_ticket,
            )
            .optional()?;

        let Some(mut ticket) = row else {
            return Ok(None);
        };
        ticket.history = load_history(&conn, ticket_id)?;
        Ok(Some(ticket))
    }

    /// Latest ticket in an active state for the conversation, if any.
    pub async fn active_ticket_for(&self, conversation_id: &str) -> Result<Option<Ticket>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                r#"SELECT id, conversation_id, priority, status, assigned_agent, created_at
                   FROM tickets
                   WHERE conversation_id = ?1
                     AND status IN ('open', 'assigned', 'in_progress')
                   ORDER BY created_at DESC
                   LIMIT 1"#,
                [conversation_id],
                row_to_ticket,
            )
            .optional()?;

        let Some(mut ticket) = row else {
            return Ok(None);
        };
        ticket.history = load_history(&conn, ticket.id)?;
        Ok(Some(ticket))
    }

    /// Persist a transition: new status, optional agent, and the audit entry.
    pub async fn apply_status_change(
        &self,
        ticket_id: Uuid,
        status: TicketStatus,
        assigned_agent: Option<&str>,
        change: &StatusChange,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            r#"UPDATE tickets SET status = ?2, assigned_agent = COALESCE(?3, assigned_agent)
               WHERE id = ?1"#,
            params![ticket_id.to_string(), status.as_str(), assigned_agent],
        )?;
        if updated == 0 {
            return Err(anyhow!("ticket not found: {ticket_id}"));
        }
        insert_status_change(&conn, ticket_id, change)?;
        Ok(())
    }

    pub async fn set_priority(&self, ticket_id: Uuid, priority: Priority) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE tickets SET priority = ?2 WHERE id = ?1",
            params![ticket_id.to_string(), priority.as_str()],
        )?;
        if updated == 0 {
            return Err(anyhow!("ticket not found: {ticket_id}"));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Conversation contexts
    // ─────────────────────────────────────────────────────────────────────

    pub async fn upsert_context(&self, ctx: &ConversationContext) -> Result<()> {
        let history = serde_json::to_string(&ctx.history)?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO conversations
               (conversation_id, customer_ref, is_vip, prior_escalations, history, last_active)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(conversation_id) DO UPDATE SET
                   customer_ref = excluded.customer_ref,
                   is_vip = excluded.is_vip,
                   prior_escalations = excluded.prior_escalations,
                   history = excluded.history,
                   last_active = excluded.last_active"#,
            params![
                ctx.conversation_id,
                ctx.customer_ref,
                ctx.is_vip as i64,
                ctx.prior_escalations as i64,
                history,
                ctx.last_active.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_context(&self, conversation_id: &str) -> Result<Option<ConversationContext>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            r#"SELECT conversation_id, customer_ref, is_vip, prior_escalations, history, last_active
               FROM conversations WHERE conversation_id = ?1"#,
            [conversation_id],
            |row| {
                let history_json: String = row.get(4)?;
                let last_active: String = row.get(5)?;
                Ok((
                    ConversationContext {
                        conversation_id: row.get(0)?,
                        customer_ref: row.get(1)?,
                        is_vip: row.get::<_, i64>(2)? != 0,
                        prior_escalations: row.get::<_, i64>(3)? as u32,
                        history: Vec::new(),
                        last_active: Utc::now(),
                    },
                    history_json,
                    last_active,
                ))
            },
        )
        .optional()?
        .map(|(mut ctx, history_json, last_active)| {
            ctx.history = serde_json::from_str(&history_json)?;
            ctx.last_active = parse_ts(&last_active)?;
            Ok(ctx)
        })
        .transpose()
    }

    pub async fn delete_context(&self, conversation_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM conversations WHERE conversation_id = ?1",
            [conversation_id],
        )?;
        Ok(deleted > 0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Seen social posts
    // ─────────────────────────────────────────────────────────────────────

    /// Record a post id. Returns false if it was already present, so callers
    /// can use this as an atomic check-and-mark.
    pub async fn mark_post_seen(&self, post_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO seen_posts (post_id, seen_at) VALUES (?1, ?2)",
            params![post_id, at.to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    /// Drop seen-post entries older than the cutoff, keeping the set bounded.
    pub async fn prune_seen_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        let pruned = conn.execute(
            "DELETE FROM seen_posts WHERE seen_at < ?1",
            [cutoff.to_rfc3339()],
        )?;
        if pruned > 0 {
            tracing::debug!("pruned {pruned} seen-post entries");
        }
        Ok(pruned)
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            priority        TEXT NOT NULL,
            status          TEXT NOT NULL,
            assigned_agent  TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tickets_conversation
            ON tickets (conversation_id, status);

        CREATE TABLE IF NOT EXISTS ticket_history (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id   TEXT NOT NULL,
            from_status TEXT,
            to_status   TEXT NOT NULL,
            at          TEXT NOT NULL,
            actor       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_ticket
            ON ticket_history (ticket_id, seq);

        CREATE TABLE IF NOT EXISTS conversations (
            conversation_id   TEXT PRIMARY KEY,
            customer_ref      TEXT,
            is_vip            INTEGER NOT NULL DEFAULT 0,
            prior_escalations INTEGER NOT NULL DEFAULT 0,
            history           TEXT NOT NULL DEFAULT '[]',
            last_active       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS seen_posts (
            post_id TEXT PRIMARY KEY,
            seen_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn insert_status_change(conn: &Connection, ticket_id: Uuid, change: &StatusChange) -> Result<()> {
    conn.execute(
        r#"INSERT INTO ticket_history (ticket_id, from_status, to_status, at, actor)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
        params![
            ticket_id.to_string(),
            change.from.map(|s| s.as_str()),
            change.to.as_str(),
            change.at.to_rfc3339(),
            change.actor,
        ],
    )?;
    Ok(())
}

fn load_history(conn: &Connection, ticket_id: Uuid) -> Result<Vec<StatusChange>> {
    let mut stmt = conn.prepare(
        r#"SELECT from_status, to_status, at, actor
           FROM ticket_history WHERE ticket_id = ?1 ORDER BY seq ASC"#,
    )?;
    let rows = stmt.query_map([ticket_id.to_string()], |row| {
        let from: Option<String> = row.get(0)?;
        let to: String = row.get(1)?;
        let at: String = row.get(2)?;
        let actor: String = row.get(3)?;
        Ok((from, to, at, actor))
    })?;

    let mut history = Vec::new();
    for row in rows {
        let (from, to, at, actor) = row?;
        history.push(StatusChange {
            from: from.as_deref().map(parse_status).transpose()?,
            to: parse_status(&to)?,
            at: parse_ts(&at)?,
            actor,
        });
    }
    Ok(history)
}

fn row_to_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    let id: String = row.get(0)?;
    let priority: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    Ok(Ticket {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        conversation_id: row.get(1)?,
        priority: parse_priority(&priority).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        status: parse_status(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        assigned_agent: row.get(4)?,
        created_at: parse_ts(&created_at).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
        })?,
        history: Vec::new(),
    })
}

fn parse_status(raw: &str) -> Result<TicketStatus> {
    match raw {
        "open" => Ok(TicketStatus::Open),
        "assigned" => Ok(TicketStatus::Assigned),
        "in_progress" => Ok(TicketStatus::InProgress),
        "resolved" => Ok(TicketStatus::Resolved),
        "closed" => Ok(TicketStatus::Closed),
        other => Err(anyhow!("unknown ticket status: {other}")),
    }
}

fn parse_priority(raw: &str) -> Result<Priority> {
    match raw {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "urgent" => Ok(Priority::Urgent),
        other => Err(anyhow!("unknown priority: {other}")),
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| anyhow!("bad timestamp {raw}: {e}"))?
        .with_timezone(&Utc))
}
