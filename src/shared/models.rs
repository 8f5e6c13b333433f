use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::enums::{SenderType, TicketStatus};

/// One selectable option as rendered to the client. The destination node is
/// deliberately absent; clients only ever see `{id, label}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: String,
    pub label: String,
}

/// Transcript message body, tagged at write time so reads never have to
/// guess whether a stored string is structured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Plain text, from either side of the conversation.
    Text { text: String },
    /// A bot turn: the node message plus the options offered.
    Prompt { text: String, options: Vec<OptionView> },
    /// A user menu turn: which option was picked.
    Selection { option_id: String, label: String },
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Aggregate root for one support conversation. `status` and
/// `current_state` are denormalized projections of the two append-only logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    pub employee_code: Option<String>,
    pub status: TicketStatus,
    pub is_resolved: bool,
    pub current_state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Display alias derived from the uuid; the uuid stays the real key.
    pub fn number_for(id: Uuid) -> String {
        let hex = id.simple().to_string();
        format!("TKT-{}", hex[..8].to_uppercase())
    }
}

/// One immutable line of the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender: SenderType,
    pub payload: MessagePayload,
    pub state_key: String,
    pub created_at: DateTime<Utc>,
}

/// One immutable line of the status audit log. `old_status` is `None` only
/// for the entry written when the ticket is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub old_status: Option<TicketStatus>,
    pub new_status: TicketStatus,
    pub changed_by: Uuid,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Response views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SessionStart {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub message: String,
    pub options: Vec<OptionView>,
    pub state_key: String,
}

#[derive(Debug, Serialize)]
pub struct StepReply {
    pub message: String,
    pub options: Vec<OptionView>,
    pub state_key: String,
    pub is_terminal: bool,
    pub show_write_to_support: bool,
}

#[derive(Debug, Serialize)]
pub struct EscalationReply {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub message: String,
    pub status: TicketStatus,
    pub email_sent: bool,
}

#[derive(Debug, Serialize)]
pub struct TicketSummary {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub status: TicketStatus,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Ticket> for TicketSummary {
    fn from(t: &Ticket) -> Self {
        Self {
            ticket_id: t.id,
            ticket_number: t.ticket_number.clone(),
            status: t.status,
            is_resolved: t.is_resolved,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TranscriptView {
    pub sender: SenderType,
    pub message: MessagePayload,
    pub state_key: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusChangeView {
    pub old_status: Option<TicketStatus>,
    pub new_status: TicketStatus,
    pub changed_by: Uuid,
    pub remarks: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TicketHistory {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub status: TicketStatus,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub chat_history: Vec<TranscriptView>,
    pub status_history: Vec<StatusChangeView>,
}

#[derive(Debug, Serialize)]
pub struct StatusUpdateReply {
    pub ticket_id: Uuid,
    pub old_status: TicketStatus,
    pub new_status: TicketStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_kind_tag() {
        let prompt = MessagePayload::Prompt {
            text: "Pick one".into(),
            options: vec![OptionView { id: "claims".into(), label: "Claims".into() }],
        };
        let json = serde_json::to_value(&prompt).unwrap();
        assert_eq!(json["kind"], "prompt");
        assert_eq!(json["options"][0]["id"], "claims");

        let back: MessagePayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, prompt);

        let text = serde_json::to_value(MessagePayload::text("hello")).unwrap();
        assert_eq!(text["kind"], "text");
    }

    #[test]
    fn ticket_number_is_stable_for_an_id() {
        let id = Uuid::new_v4();
        let n1 = Ticket::number_for(id);
        let n2 = Ticket::number_for(id);
        assert_eq!(n1, n2);
        assert!(n1.starts_with("TKT-"));
        assert_eq!(n1.len(), 12);
    }
}
