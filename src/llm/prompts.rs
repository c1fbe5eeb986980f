//! Fixed instructions for the energy assistant.
//!
//! The system message is prepended to every outbound conversation. It is
//! the only place the assistant's persona and tool-use guidance live; the
//! tool descriptors themselves come from the tool server at connect time.

/// Default system instruction.
pub const SYSTEM_PROMPT: &str = "\
You are VoltGuard's energy assistant. You help people understand and reduce \
wasted electricity in the rooms monitored by VoltGuard's cameras.

Rules:
- Use the available tools to look up real data before answering questions \
about waste, costs, devices, rooms, trends or detection quality. Never invent \
numbers.
- Dates passed to tools use the YYYY-MM-DD format.
- Keep answers short and practical: lead with the finding, then one or two \
concrete suggestions for saving energy.
- If a tool returns an error or no data, say so plainly.";

/// Reply shown when the tool server is not connected.
pub const NOT_CONNECTED_REPLY: &str =
    "I can't reach the energy database right now. Please try again in a moment.";

/// Reply shown when any step of a turn fails.
pub const TURN_FAILED_REPLY: &str =
    "Sorry, something went wrong while answering. Please try again.";

/// Transient status shown while tools run.
pub const CHECKING_STATUS: &str = "Checking the energy database…";

/// Greeting shown when a chat session starts.
pub const GREETING: &str = "How can I help you save energy today?";

/// The system instruction to use, honouring a configured override.
pub fn system_prompt(configured: &str) -> &str {
    if configured.trim().is_empty() {
        SYSTEM_PROMPT
    } else {
        configured
    }
}
