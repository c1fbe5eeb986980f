//! Two-phase, tool-augmented chat turns.
//!
//! ```text
//! Idle ─▶ Sending(First) ─┬─────────────────────────────▶ Idle
//!                         └▶ ToolPhase ─▶ Sending(Second) ─▶ Idle
//! ```
//!
//! The first completion request offers every discovered tool with
//! `tool_choice: "auto"`. If the model asks for tools they run one at a
//! time, in the order returned, and a second request without tools
//! synthesizes the answer. Only one round of tool calls is made per turn.
//! Any failure along the way becomes one generic error notice and the
//! orchestrator returns to `Idle`.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde_json::Value;

use super::transcript::{Entry, Transcript};
use crate::llm::prompts::{self, CHECKING_STATUS, NOT_CONNECTED_REPLY, TURN_FAILED_REPLY};
use crate::llm::{ChatMessage, Completer, ToolCatalog};
use crate::mcp::ToolInvoker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Request that may return tool calls.
    First,
    /// Synthesis request after tools ran.
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending(Phase),
    ToolPhase,
}

/// Observes a turn while it runs. All methods default to no-ops.
pub trait TurnObserver {
    /// `thinking` is true in every network-bound state.
    fn state_changed(&mut self, _state: ChatState, _thinking: bool) {}

    fn tool_started(&mut self, _name: &str, _arguments: &Value) {}

    fn tool_finished(&mut self, _name: &str, _result: &Result<String>) {}
}

impl TurnObserver for () {}

/// A tool call made during a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExchange {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Tool server not connected; nothing was sent.
    Rejected,
    /// Answered without tools.
    Direct,
    /// Answered after running tools.
    WithTools,
    /// Something failed; a generic error notice was shown.
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Tools that completed before the turn ended.
    pub tools: Vec<ToolExchange>,
    pub latency: Duration,
}

impl TurnReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Direct | TurnOutcome::WithTools)
    }
}

pub struct ChatOrchestrator<C: Completer, T: ToolInvoker> {
    completer: C,
    tools: T,
    catalog: ToolCatalog,
    system_prompt: String,
    transcript: Transcript,
    state: ChatState,
}

impl<C: Completer, T: ToolInvoker> ChatOrchestrator<C, T> {
    /// The tool catalog is built once from the tools discovered at connect.
    pub fn new(completer: C, tools: T, system_prompt: &str) -> Self {
        let catalog = ToolCatalog::from_tools(tools.tools());
        Self {
            completer,
            tools,
            catalog,
            system_prompt: prompts::system_prompt(system_prompt).to_string(),
            transcript: Transcript::new(),
            state: ChatState::Idle,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_thinking(&self) -> bool {
        self.state != ChatState::Idle
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    fn set_state(&mut self, state: ChatState, observer: &mut dyn TurnObserver) {
        self.state = state;
        observer.state_changed(state, state != ChatState::Idle);
    }

    /// Run one user turn to completion.
    pub fn send(&mut self, text: &str, observer: &mut dyn TurnObserver) -> TurnReport {
        let start = Instant::now();

        if !self.tools.is_connected() {
            self.transcript.push(Entry::error(NOT_CONNECTED_REPLY));
            return TurnReport {
                outcome: TurnOutcome::Rejected,
                tools: Vec::new(),
                latency: start.elapsed(),
            };
        }

        self.transcript.push(Entry::user(text));
        let mut exchanges = Vec::new();
        let outcome = match self.run_turn(&mut exchanges, observer) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transcript.clear_status();
                self.transcript.push(Entry::error(TURN_FAILED_REPLY));
                TurnOutcome::Failed {
                    error: format!("{e:#}"),
                }
            }
        };
        self.set_state(ChatState::Idle, observer);

        TurnReport {
            outcome,
            tools: exchanges,
            latency: start.elapsed(),
        }
    }

    fn run_turn(
        &mut self,
        exchanges: &mut Vec<ToolExchange>,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        let mut outbound = self.transcript.wire_view(&self.system_prompt);

        self.set_state(ChatState::Sending(Phase::First), observer);
        let reply = self
            .completer
            .complete(&outbound, Some(self.catalog.specs()))?;

        if reply.tool_calls.is_empty() {
            let content = reply.content.unwrap_or_default();
            self.transcript.push(Entry::assistant(content));
            return Ok(TurnOutcome::Direct);
        }

        self.transcript.push(Entry::status(CHECKING_STATUS));
        self.set_state(ChatState::ToolPhase, observer);
        outbound.push(ChatMessage::assistant_tool_calls(
            reply.content.clone(),
            reply.tool_calls.clone(),
        ));

        for call in &reply.tool_calls {
            let arguments = call.parse_arguments()?;
            let name = self.catalog.original_name(&call.function.name).to_string();
            observer.tool_started(&name, &arguments);
            let result = self
                .tools
                .execute_tool(&name, arguments.clone())
                .with_context(|| format!("tool {name} failed"));
            observer.tool_finished(&name, &result);
            let output = result?;
            outbound.push(ChatMessage::tool(&call.id, &output));
            exchanges.push(ToolExchange {
                call_id: call.id.clone(),
                name,
                arguments,
                output,
            });
        }

        self.set_state(ChatState::Sending(Phase::Second), observer);
        let synthesis = self.completer.complete(&outbound, None)?;
        let Some(content) = synthesis.content else {
            bail!("model requested more tools instead of answering");
        };
        self.transcript.replace_status(Entry::assistant(content));
        Ok(TurnOutcome::WithTools)
    }
}
