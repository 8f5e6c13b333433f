//! In-memory store used by the test suite and database-less runs. A single
//! async mutex over the maps gives the same per-ticket serialization the
//! Postgres store gets from its compare-and-swap update.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::shared::enums::TicketStatus;
use crate::shared::error::SupportError;
use crate::shared::models::{StatusChange, Ticket, TranscriptEntry};
use crate::store::SupportStore;

#[derive(Default)]
struct Inner {
    tickets: HashMap<Uuid, Ticket>,
    transcripts: HashMap<Uuid, Vec<TranscriptEntry>>,
    status_log: HashMap<Uuid, Vec<StatusChange>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SupportStore for MemoryStore {
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), SupportError> {
        let mut inner = self.inner.lock().await;
        if inner.tickets.contains_key(&ticket.id) {
            return Err(SupportError::Store(format!("duplicate ticket id {}", ticket.id)));
        }
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, SupportError> {
        Ok(self.inner.lock().await.tickets.get(&id).cloned())
    }

    async fn list_tickets(
        &self,
        user_id: Uuid,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, SupportError> {
        let inner = self.inner.lock().await;
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(tickets)
    }

    async fn set_status(&self, id: Uuid, status: TicketStatus) -> Result<(), SupportError> {
        let mut inner = self.inner.lock().await;
        let ticket = inner
            .tickets
            .get_mut(&id)
            .ok_or(SupportError::TicketNotFound)?;
        ticket.status = status;
        ticket.is_resolved = status.is_resolved();
        ticket.updated_at = Utc::now();
        Ok(())
    }

    async fn advance_state(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<(), SupportError> {
        let mut inner = self.inner.lock().await;
        let ticket = inner
            .tickets
            .get_mut(&id)
            .ok_or(SupportError::TicketNotFound)?;
        if ticket.current_state != expected {
            return Err(SupportError::StaleState {
                expected: expected.to_string(),
            });
        }
        ticket.current_state = next.to_string();
        ticket.updated_at = Utc::now();
        Ok(())
    }

    async fn append_entry(&self, entry: &TranscriptEntry) -> Result<(), SupportError> {
        let mut inner = self.inner.lock().await;
        if !inner.tickets.contains_key(&entry.ticket_id) {
            return Err(SupportError::TicketNotFound);
        }
        inner
            .transcripts
            .entry(entry.ticket_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn transcript(&self, ticket_id: Uuid) -> Result<Vec<TranscriptEntry>, SupportError> {
        let inner = self.inner.lock().await;
        let mut entries = inner.transcripts.get(&ticket_id).cloned().unwrap_or_default();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn record_status_change(&self, change: &StatusChange) -> Result<(), SupportError> {
        let mut inner = self.inner.lock().await;
        if !inner.tickets.contains_key(&change.ticket_id) {
            return Err(SupportError::TicketNotFound);
        }
        inner
            .status_log
            .entry(change.ticket_id)
            .or_default()
            .push(change.clone());
        Ok(())
    }

    async fn status_history(&self, ticket_id: Uuid) -> Result<Vec<StatusChange>, SupportError> {
        let inner = self.inner.lock().await;
        let mut changes = inner.status_log.get(&ticket_id).cloned().unwrap_or_default();
        changes.sort_by_key(|c| c.created_at);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::SenderType;
    use crate::shared::models::MessagePayload;

    fn ticket(user_id: Uuid) -> Ticket {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Ticket {
            id,
            ticket_number: Ticket::number_for(id),
            user_id,
            company_id: None,
            employee_code: None,
            status: TicketStatus::Open,
            is_resolved: false,
            current_state: "start".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn advance_state_is_a_cas() {
        let store = MemoryStore::new();
        let t = ticket(Uuid::new_v4());
        store.insert_ticket(&t).await.unwrap();

        store.advance_state(t.id, "start", "claims_menu").await.unwrap();
        // Second advance from the same stale state must be rejected.
        let err = store.advance_state(t.id, "start", "coverage_menu").await.unwrap_err();
        assert!(matches!(err, SupportError::StaleState { .. }));

        let current = store.ticket(t.id).await.unwrap().unwrap();
        assert_eq!(current.current_state, "claims_menu");
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_status() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mine = ticket(alice);
        let theirs = ticket(bob);
        store.insert_ticket(&mine).await.unwrap();
        store.insert_ticket(&theirs).await.unwrap();
        store.set_status(mine.id, TicketStatus::Resolved).await.unwrap();

        let all = store.list_tickets(alice, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, mine.id);

        let open = store.list_tickets(alice, Some(TicketStatus::Open)).await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn transcript_preserves_write_order() {
        let store = MemoryStore::new();
        let t = ticket(Uuid::new_v4());
        store.insert_ticket(&t).await.unwrap();

        for i in 0..3i64 {
            let entry = TranscriptEntry {
                id: Uuid::new_v4(),
                ticket_id: t.id,
                sender: SenderType::User,
                payload: MessagePayload::text(format!("msg {i}")),
                state_key: "user_query".into(),
                created_at: Utc::now() + chrono::Duration::milliseconds(i),
            };
            store.append_entry(&entry).await.unwrap();
        }

        let first = store.transcript(t.id).await.unwrap();
        let second = store.transcript(t.id).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(
            first.iter().map(|e| e.id).collect::<Vec<_>>(),
            second.iter().map(|e| e.id).collect::<Vec<_>>()
        );
        assert_eq!(first[0].payload, MessagePayload::text("msg 0"));
    }

    #[tokio::test]
    async fn orphan_writes_are_rejected() {
        let store = MemoryStore::new();
        let entry = TranscriptEntry {
            id: Uuid::new_v4(),
            ticket_id: Uuid::new_v4(),
            sender: SenderType::Bot,
            payload: MessagePayload::text("hello"),
            state_key: "start".into(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            store.append_entry(&entry).await,
            Err(SupportError::TicketNotFound)
        ));
    }
}
