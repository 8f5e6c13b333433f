//! Built-in benefits-support conversation graph. Menus cycle back to the
//! start node; info leaves are terminal so the client surfaces the
//! write-to-support affordance there.

use super::{Flow, FlowOption};

pub const ENTRY_STATE: &str = "start";

fn opt(id: &str, label: &str, next: &str) -> FlowOption {
    FlowOption::new(id, label, next)
}

/// The entry menu plus the claims/coverage/enrollment/account submenus.
/// Validated on construction; a malformed catalog fails at boot, never at
/// request time.
pub fn benefits_flow() -> Flow {
    Flow::builder(ENTRY_STATE)
        .node(
            ENTRY_STATE,
            "Hi! I'm your benefits assistant. What can I help you with today?",
            vec![
                opt("claims", "Claims help", "claims_menu"),
                opt("coverage", "Coverage questions", "coverage_menu"),
                opt("enrollment", "Enrollment", "enrollment_menu"),
                opt("account", "My account", "account_menu"),
            ],
        )
        .node(
            "claims_menu",
            "Sure, let's look at claims. What do you need?",
            vec![
                opt("file_claim", "How do I file a claim?", "file_claim_info"),
                opt("claim_status", "Check claim status", "claim_status_info"),
                opt("claim_rejected", "My claim was rejected", "claim_rejected_info"),
                opt("back", "Back to main menu", ENTRY_STATE),
            ],
        )
        .node(
            "coverage_menu",
            "Happy to help with coverage. Pick a topic:",
            vec![
                opt("plan_summary", "What does my plan cover?", "coverage_info"),
                opt("dependents", "Adding or removing dependents", "dependents_info"),
                opt("back", "Back to main menu", ENTRY_STATE),
            ],
        )
        .node(
            "enrollment_menu",
            "Enrollment questions, got it. Which one applies?",
            vec![
                opt("new_enrollment", "Enrolling for the first time", "enrollment_info"),
                opt("qualifying_event", "I had a qualifying life event", "qualifying_event_info"),
                opt("back", "Back to main menu", ENTRY_STATE),
            ],
        )
        .node(
            "account_menu",
            "Account and profile help. What would you like to do?",
            vec![
                opt("update_details", "Update my personal details", "account_info"),
                opt("id_card", "Get my member ID card", "id_card_info"),
                opt("back", "Back to main menu", ENTRY_STATE),
            ],
        )
        .node(
            "file_claim_info",
            "To file a claim, sign in to the member portal, open Claims > New Claim, \
             attach your itemized bill and submit. Most claims are processed within \
             10 business days.",
            vec![],
        )
        .node(
            "claim_status_info",
            "You can track any claim under Claims > My Claims in the member portal. \
             Statuses update nightly once your provider submits paperwork.",
            vec![],
        )
        .node(
            "claim_rejected_info",
            "Rejected claims include a reason code on the explanation of benefits. \
             You can appeal within 60 days from the portal's Claims > Appeals page.",
            vec![],
        )
        .node(
            "coverage_info",
            "Your plan summary, including covered services and copays, is available \
             under Documents > Summary of Benefits in the member portal.",
            vec![],
        )
        .node(
            "dependents_info",
            "Dependents can be added or removed during open enrollment, or within \
             30 days of a qualifying life event, from Profile > Dependents.",
            vec![],
        )
        .node(
            "enrollment_info",
            "First-time enrollment opens with your welcome email. Complete the \
             enrollment form and pick a plan before your window closes.",
            vec![],
        )
        .node(
            "qualifying_event_info",
            "Marriage, birth, adoption and loss of other coverage are qualifying \
             events. Report them within 30 days to make mid-year changes.",
            vec![],
        )
        .node(
            "account_info",
            "Personal details such as address and contact information can be \
             updated any time under Profile > Personal Details.",
            vec![],
        )
        .node(
            "id_card_info",
            "A digital member ID card is available under Profile > ID Card, and you \
             can request a printed copy from the same page.",
            vec![],
        )
        .build()
        .expect("built-in benefits flow must be closed")
}
