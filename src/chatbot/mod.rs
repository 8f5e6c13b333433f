//! Conversational support engine and its HTTP surface. The engine is
//! stateless between calls: the ticket row carries the current flow state
//! and every turn is persisted before the response is rendered.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use log::{error, info, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::escalation::{EscalationNotice, EscalationNotifier};
use crate::flow::Flow;
use crate::shared::enums::{SenderType, TicketStatus};
use crate::shared::error::SupportError;
use crate::shared::models::{
    EscalationReply, MessagePayload, SessionStart, StatusChange, StatusChangeView,
    StatusUpdateReply, StepReply, Ticket, TicketHistory, TicketSummary, TranscriptEntry,
    TranscriptView,
};
use crate::shared::state::AppState;
use crate::store::SupportStore;

/// Sentinel state for free-text user messages outside the flow graph.
pub const STATE_USER_QUERY: &str = "user_query";
/// Sentinel state for the acknowledgment written after escalation.
pub const STATE_TICKET_CREATED: &str = "ticket_created";

const ESCALATION_REMARKS: &str = "User submitted unresolved query";

#[derive(Clone)]
pub struct ChatEngine {
    flow: Arc<Flow>,
    store: Arc<dyn SupportStore>,
    notifier: Arc<dyn EscalationNotifier>,
    notify_timeout: Duration,
}

impl ChatEngine {
    pub fn new(
        flow: Arc<Flow>,
        store: Arc<dyn SupportStore>,
        notifier: Arc<dyn EscalationNotifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            flow,
            store,
            notifier,
            notify_timeout,
        }
    }

    /// Loads a ticket and enforces ownership. Unknown ids are 404; ids that
    /// exist but belong to someone else are 403 with a generic message.
    async fn owned_ticket(&self, ticket_id: Uuid, user_id: Uuid) -> Result<Ticket, SupportError> {
        let ticket = self
            .store
            .ticket(ticket_id)
            .await?
            .ok_or(SupportError::TicketNotFound)?;
        if ticket.user_id != user_id {
            return Err(SupportError::Forbidden);
        }
        Ok(ticket)
    }

    pub async fn start_session(
        &self,
        user_id: Uuid,
        company_id: Option<Uuid>,
        employee_code: Option<String>,
    ) -> Result<SessionStart, SupportError> {
        let entry = self.flow.entry_node();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let ticket = Ticket {
            id,
            ticket_number: Ticket::number_for(id),
            user_id,
            company_id,
            employee_code,
            status: TicketStatus::Open,
            is_resolved: false,
            current_state: entry.key.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_ticket(&ticket).await?;

        self.store
            .record_status_change(&StatusChange {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                old_status: None,
                new_status: TicketStatus::Open,
                changed_by: user_id,
                remarks: None,
                created_at: now,
            })
            .await?;

        self.store
            .append_entry(&TranscriptEntry {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                sender: SenderType::Bot,
                payload: MessagePayload::Prompt {
                    text: entry.message.clone(),
                    options: entry.option_views(),
                },
                state_key: entry.key.clone(),
                created_at: now,
            })
            .await?;

        info!("started support session {} for user {user_id}", ticket.ticket_number);

        Ok(SessionStart {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number,
            message: entry.message.clone(),
            options: entry.option_views(),
            state_key: entry.key.clone(),
        })
    }

    /// One guided hop through the flow graph. The ticket status is never
    /// touched here; only escalation and explicit updates move it.
    pub async fn continue_with_option(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        state_key: &str,
        option_id: &str,
    ) -> Result<StepReply, SupportError> {
        let ticket = self.owned_ticket(ticket_id, user_id).await?;

        let origin = self.flow.node(state_key)?;
        let selected = origin
            .options
            .iter()
            .find(|o| o.id == option_id)
            .ok_or_else(|| SupportError::InvalidOption {
                state_key: state_key.to_string(),
                option_id: option_id.to_string(),
            })?
            .clone();
        let dest = self.flow.resolve_option(state_key, option_id)?;

        // Serialization point: rejects this hop if the ticket has already
        // moved past `state_key`, so divergent branches cannot both commit.
        self.store
            .advance_state(ticket.id, state_key, &dest.key)
            .await?;

        self.store
            .append_entry(&TranscriptEntry {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                sender: SenderType::User,
                payload: MessagePayload::Selection {
                    option_id: selected.id,
                    label: selected.label,
                },
                state_key: state_key.to_string(),
                created_at: Utc::now(),
            })
            .await?;

        self.store
            .append_entry(&TranscriptEntry {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                sender: SenderType::Bot,
                payload: MessagePayload::Prompt {
                    text: dest.message.clone(),
                    options: dest.option_views(),
                },
                state_key: dest.key.clone(),
                created_at: Utc::now(),
            })
            .await?;

        let is_terminal = dest.is_terminal();
        Ok(StepReply {
            message: dest.message.clone(),
            options: dest.option_views(),
            state_key: dest.key.clone(),
            is_terminal,
            show_write_to_support: is_terminal,
        })
    }

    /// Free text short-circuits the graph: the ticket is handed to human
    /// support, unconditionally landing on `in_progress`. The notification
    /// is best-effort and can never fail the ticket writes.
    pub async fn continue_with_free_text(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        text: &str,
    ) -> Result<EscalationReply, SupportError> {
        let ticket = self.owned_ticket(ticket_id, user_id).await?;

        self.store
            .append_entry(&TranscriptEntry {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                sender: SenderType::User,
                payload: MessagePayload::text(text),
                state_key: STATE_USER_QUERY.to_string(),
                created_at: Utc::now(),
            })
            .await?;

        let previous = ticket.status;
        self.store
            .set_status(ticket.id, TicketStatus::InProgress)
            .await?;
        self.store
            .record_status_change(&StatusChange {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                old_status: Some(previous),
                new_status: TicketStatus::InProgress,
                changed_by: user_id,
                remarks: Some(ESCALATION_REMARKS.to_string()),
                created_at: Utc::now(),
            })
            .await?;

        let email_sent = self
            .dispatch_escalation(EscalationNotice {
                ticket_id: ticket.id,
                ticket_number: ticket.ticket_number.clone(),
                user_id,
                company_id: ticket.company_id,
                employee_code: ticket.employee_code.clone(),
                query: text.to_string(),
            })
            .await;

        let ack = format!(
            "Thanks! Your ticket {} has been passed to our support team. \
             We'll get back to you shortly.",
            ticket.ticket_number
        );
        self.store
            .append_entry(&TranscriptEntry {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                sender: SenderType::Bot,
                payload: MessagePayload::text(ack.clone()),
                state_key: STATE_TICKET_CREATED.to_string(),
                created_at: Utc::now(),
            })
            .await?;

        Ok(EscalationReply {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number,
            message: ack,
            status: TicketStatus::InProgress,
            email_sent,
        })
    }

    /// Bounded wait on a spawned send: timeout and failure both degrade to
    /// `false`, and a timed-out send keeps running in the background.
    async fn dispatch_escalation(&self, notice: EscalationNotice) -> bool {
        let ticket_number = notice.ticket_number.clone();
        let notifier = Arc::clone(&self.notifier);
        let task = tokio::spawn(async move { notifier.notify(notice).await });
        match tokio::time::timeout(self.notify_timeout, task).await {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                warn!("escalation notification failed for {ticket_number}: {e}");
                false
            }
            Ok(Err(e)) => {
                error!("escalation notification task aborted for {ticket_number}: {e}");
                false
            }
            Err(_) => {
                warn!(
                    "escalation notification for {ticket_number} still pending after {:?}",
                    self.notify_timeout
                );
                false
            }
        }
    }

    pub async fn history(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
    ) -> Result<TicketHistory, SupportError> {
        let ticket = self.owned_ticket(ticket_id, user_id).await?;
        let chat_history = self
            .store
            .transcript(ticket.id)
            .await?
            .into_iter()
            .map(|e| TranscriptView {
                sender: e.sender,
                message: e.payload,
                state_key: e.state_key,
                timestamp: e.created_at,
            })
            .collect();
        let status_history = self
            .store
            .status_history(ticket.id)
            .await?
            .into_iter()
            .map(|c| StatusChangeView {
                old_status: c.old_status,
                new_status: c.new_status,
                changed_by: c.changed_by,
                remarks: c.remarks,
                timestamp: c.created_at,
            })
            .collect();
        Ok(TicketHistory {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number,
            status: ticket.status,
            is_resolved: ticket.is_resolved,
            created_at: ticket.created_at,
            chat_history,
            status_history,
        })
    }

    pub async fn list_tickets(
        &self,
        user_id: Uuid,
        status: Option<TicketStatus>,
    ) -> Result<Vec<TicketSummary>, SupportError> {
        let tickets = self.store.list_tickets(user_id, status).await?;
        Ok(tickets.iter().map(TicketSummary::from).collect())
    }

    /// Any registered status may be set from any status, including moving a
    /// closed ticket back to open. Deliberate: support reopening is allowed
    /// and the audit log keeps every hop.
    pub async fn update_status(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        status: TicketStatus,
        remarks: Option<String>,
    ) -> Result<StatusUpdateReply, SupportError> {
        let ticket = self.owned_ticket(ticket_id, user_id).await?;
        let old_status = ticket.status;
        self.store.set_status(ticket.id, status).await?;
        self.store
            .record_status_change(&StatusChange {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                old_status: Some(old_status),
                new_status: status,
                changed_by: user_id,
                remarks,
                created_at: Utc::now(),
            })
            .await?;
        Ok(StatusUpdateReply {
            ticket_id: ticket.id,
            old_status,
            new_status: status,
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

/// Authenticated principal, taken from the `x-user-id` header placed by the
/// upstream identity layer. Missing or malformed means 401.
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = SupportError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or(SupportError::Unauthorized)?;
        let user_id = Uuid::parse_str(raw).map_err(|_| SupportError::Unauthorized)?;
        Ok(AuthUser(user_id))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    pub company_id: Option<Uuid>,
    pub employee_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContinueRequest {
    pub state_key: Option<String>,
    pub option_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<String>,
}

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: Option<Json<StartSessionRequest>>,
) -> Result<Json<SessionStart>, SupportError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let reply = state
        .engine
        .start_session(user_id, req.company_id, req.employee_code)
        .await?;
    Ok(Json(reply))
}

/// One continue endpoint for both turn kinds; exactly one of `option_id`
/// and `message` must be present.
pub async fn continue_session(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<ContinueRequest>,
) -> Result<Response, SupportError> {
    match (req.option_id, req.message) {
        (Some(option_id), None) => {
            let state_key = req.state_key.ok_or_else(|| {
                SupportError::BadRequest("state_key is required when selecting an option".into())
            })?;
            let reply = state
                .engine
                .continue_with_option(ticket_id, user_id, &state_key, &option_id)
                .await?;
            Ok(Json(reply).into_response())
        }
        (None, Some(message)) => {
            let text = message.trim();
            if text.is_empty() {
                return Err(SupportError::BadRequest("message must not be empty".into()));
            }
            let reply = state
                .engine
                .continue_with_free_text(ticket_id, user_id, text)
                .await?;
            Ok(Json(reply).into_response())
        }
        _ => Err(SupportError::BadRequest(
            "provide exactly one of option_id or message".into(),
        )),
    }
}

pub async fn ticket_history(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketHistory>, SupportError> {
    Ok(Json(state.engine.history(ticket_id, user_id).await?))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<Vec<TicketSummary>>, SupportError> {
    let status = query
        .status
        .as_deref()
        .map(TicketStatus::from_str)
        .transpose()
        .map_err(SupportError::InvalidStatus)?;
    Ok(Json(state.engine.list_tickets(user_id, status).await?))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<StatusUpdateReply>, SupportError> {
    let status = TicketStatus::from_str(&req.status).map_err(SupportError::InvalidStatus)?;
    let reply = state
        .engine
        .update_status(ticket_id, user_id, status, req.remarks)
        .await?;
    Ok(Json(reply))
}

pub fn configure_support_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/support/sessions", post(start_session))
        .route("/api/support/sessions/:ticket_id/messages", post(continue_session))
        .route("/api/support/tickets", get(list_tickets))
        .route("/api/support/tickets/:ticket_id/history", get(ticket_history))
        .route("/api/support/tickets/:ticket_id/status", put(update_status))
}
