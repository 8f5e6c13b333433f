//! Postgres-backed store. Enum fields travel as snake_case text and the
//! transcript payload as tagged JSON, matching the wire representation.
//! `advance_state` does its compare-and-swap in a single guarded UPDATE so
//! two racing transitions from the same state cannot both commit.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::shared::enums::{SenderType, TicketStatus};
use crate::shared::error::SupportError;
use crate::shared::models::{MessagePayload, StatusChange, Ticket, TranscriptEntry};
use crate::shared::state::DbPool;
use crate::store::schema::{support_chat_messages, support_status_history, support_tickets};
use crate::store::SupportStore;

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = support_tickets)]
struct TicketRow {
    id: Uuid,
    ticket_number: String,
    user_id: Uuid,
    company_id: Option<Uuid>,
    employee_code: Option<String>,
    status: String,
    is_resolved: bool,
    current_state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = SupportError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = TicketStatus::from_str(&row.status).map_err(SupportError::Store)?;
        Ok(Ticket {
            id: row.id,
            ticket_number: row.ticket_number,
            user_id: row.user_id,
            company_id: row.company_id,
            employee_code: row.employee_code,
            status,
            is_resolved: row.is_resolved,
            current_state: row.current_state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Ticket> for TicketRow {
    fn from(t: &Ticket) -> Self {
        Self {
            id: t.id,
            ticket_number: t.ticket_number.clone(),
            user_id: t.user_id,
            company_id: t.company_id,
            employee_code: t.employee_code.clone(),
            status: t.status.to_string(),
            is_resolved: t.is_resolved,
            current_state: t.current_state.clone(),
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = support_chat_messages)]
struct MessageRow {
    id: Uuid,
    ticket_id: Uuid,
    sender: String,
    payload: String,
    state_key: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for TranscriptEntry {
    type Error = SupportError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let sender = SenderType::from_str(&row.sender).map_err(SupportError::Store)?;
        let payload: MessagePayload = serde_json::from_str(&row.payload)
            .map_err(|e| SupportError::Store(format!("transcript payload: {e}")))?;
        Ok(TranscriptEntry {
            id: row.id,
            ticket_id: row.ticket_id,
            sender,
            payload,
            state_key: row.state_key,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = support_status_history)]
struct StatusRow {
    id: Uuid,
    ticket_id: Uuid,
    old_status: Option<String>,
    new_status: String,
    changed_by: Uuid,
    remarks: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StatusRow> for StatusChange {
    type Error = SupportError;

    fn try_from(row: StatusRow) -> Result<Self, Self::Error> {
        let old_status = row
            .old_status
            .as_deref()
            .map(TicketStatus::from_str)
            .transpose()
            .map_err(SupportError::Store)?;
        let new_status = TicketStatus::from_str(&row.new_status).map_err(SupportError::Store)?;
        Ok(StatusChange {
            id: row.id,
            ticket_id: row.ticket_id,
            old_status,
            new_status,
            changed_by: row.changed_by,
            remarks: row.remarks,
            created_at: row.created_at,
        })
    }
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SupportStore for PgStore {
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), SupportError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(support_tickets::table)
            .values(TicketRow::from(ticket))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, SupportError> {
        let mut conn = self.pool.get()?;
        let row: Option<TicketRow> = support_tickets::table
            .filter(support_tickets::id.eq(id))
            .first(&mut conn)
            .optional()?;
        row.map(Ticket::try_from).transpose()
    }

    async fn list_tickets(
        &self,
        user_id: Uuid,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, SupportError> {
        let mut conn = self.pool.get()?;
        let mut q = support_tickets::table
            .filter(support_tickets::user_id.eq(user_id))
            .into_boxed();
        if let Some(status) = status {
            q = q.filter(support_tickets::status.eq(status.to_string()));
        }
        let rows: Vec<TicketRow> = q
            .order(support_tickets::updated_at.desc())
            .load(&mut conn)?;
        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn set_status(&self, id: Uuid, status: TicketStatus) -> Result<(), SupportError> {
        let mut conn = self.pool.get()?;
        let updated = diesel::update(support_tickets::table.filter(support_tickets::id.eq(id)))
            .set((
                support_tickets::status.eq(status.to_string()),
                support_tickets::is_resolved.eq(status.is_resolved()),
                support_tickets::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(SupportError::TicketNotFound);
        }
        Ok(())
    }

    async fn advance_state(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<(), SupportError> {
        let mut conn = self.pool.get()?;
        let updated = diesel::update(
            support_tickets::table
                .filter(support_tickets::id.eq(id))
                .filter(support_tickets::current_state.eq(expected)),
        )
        .set((
            support_tickets::current_state.eq(next),
            support_tickets::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;
        if updated == 1 {
            return Ok(());
        }
        // Nothing matched: either the ticket is gone or someone advanced it
        // under us.
        let exists: Option<Uuid> = support_tickets::table
            .filter(support_tickets::id.eq(id))
            .select(support_tickets::id)
            .first(&mut conn)
            .optional()?;
        match exists {
            Some(_) => Err(SupportError::StaleState {
                expected: expected.to_string(),
            }),
            None => Err(SupportError::TicketNotFound),
        }
    }

    async fn append_entry(&self, entry: &TranscriptEntry) -> Result<(), SupportError> {
        let mut conn = self.pool.get()?;
        let payload = serde_json::to_string(&entry.payload)
            .map_err(|e| SupportError::Internal(format!("encode payload: {e}")))?;
        diesel::insert_into(support_chat_messages::table)
            .values(MessageRow {
                id: entry.id,
                ticket_id: entry.ticket_id,
                sender: entry.sender.to_string(),
                payload,
                state_key: entry.state_key.clone(),
                created_at: entry.created_at,
            })
            .execute(&mut conn)?;
        Ok(())
    }

    async fn transcript(&self, ticket_id: Uuid) -> Result<Vec<TranscriptEntry>, SupportError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<MessageRow> = support_chat_messages::table
            .filter(support_chat_messages::ticket_id.eq(ticket_id))
            .order(support_chat_messages::created_at.asc())
            .load(&mut conn)?;
        rows.into_iter().map(TranscriptEntry::try_from).collect()
    }

    async fn record_status_change(&self, change: &StatusChange) -> Result<(), SupportError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(support_status_history::table)
            .values(StatusRow {
                id: change.id,
                ticket_id: change.ticket_id,
                old_status: change.old_status.map(|s| s.to_string()),
                new_status: change.new_status.to_string(),
                changed_by: change.changed_by,
                remarks: change.remarks.clone(),
                created_at: change.created_at,
            })
            .execute(&mut conn)?;
        Ok(())
    }

    async fn status_history(&self, ticket_id: Uuid) -> Result<Vec<StatusChange>, SupportError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<StatusRow> = support_status_history::table
            .filter(support_status_history::ticket_id.eq(ticket_id))
            .order(support_status_history::created_at.asc())
            .load(&mut conn)?;
        rows.into_iter().map(StatusChange::try_from).collect()
    }
}
