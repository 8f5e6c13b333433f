//! Persistence seam for the support engine. Tickets, the conversation
//! transcript and the status audit log are append-heavy; the only in-place
//! updates are the denormalized `status`/`current_state` projections on the
//! ticket row.

pub mod memory;
pub mod pg;
pub mod schema;

use async_trait::async_trait;
use uuid::Uuid;

use crate::shared::enums::TicketStatus;
use crate::shared::error::SupportError;
use crate::shared::models::{StatusChange, Ticket, TranscriptEntry};

#[async_trait]
pub trait SupportStore: Send + Sync {
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), SupportError>;

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, SupportError>;

    /// Most recently updated first.
    async fn list_tickets(
        &self,
        user_id: Uuid,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, SupportError>;

    async fn set_status(&self, id: Uuid, status: TicketStatus) -> Result<(), SupportError>;

    /// Compare-and-swap on the ticket's current conversation state. This is
    /// the per-ticket serialization point: a request advancing from a stale
    /// state fails with `StaleState` and writes nothing.
    async fn advance_state(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<(), SupportError>;

    async fn append_entry(&self, entry: &TranscriptEntry) -> Result<(), SupportError>;

    /// Ascending by creation time.
    async fn transcript(&self, ticket_id: Uuid) -> Result<Vec<TranscriptEntry>, SupportError>;

    async fn record_status_change(&self, change: &StatusChange) -> Result<(), SupportError>;

    /// Ascending by creation time.
    async fn status_history(&self, ticket_id: Uuid) -> Result<Vec<StatusChange>, SupportError>;
}
