//! Per-agent conversation recording and call-chain emission.
//!
//! Every LLM exchange an agent makes during one `process` call is buffered
//! as a [`ConversationTurn`]. When the agent finishes, the buffer is sealed
//! into an [`AgentCallChain`], numbered by the session-wide
//! [`ChainSequencer`], handed to the artifact logger and cleared.

use std::sync::Mutex;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::artifacts::{ArtifactEvent, ArtifactHandle};
use crate::llm::{ChatMessage, ChatResponse};

#[derive(Debug, Clone, Serialize)]
pub struct TurnMetadata {
    pub model: String,
    pub provider: String,
    pub tokens: u64,
    pub cost: f64,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResultRecord {
    pub tool_name: String,
    pub arguments: Value,
    pub result: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub messages_sent: Vec<ChatMessage>,
    pub response: ChatResponse,
    pub tool_results: Vec<ToolResultRecord>,
    pub metadata: TurnMetadata,
}

/// The audit artifact for one agent invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AgentCallChain {
    pub agent: String,
    pub symbol: String,
    pub sequence: u32,
    pub conversation_id: String,
    pub turns: Vec<ConversationTurn>,
    pub final_result: Value,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
}

/// Monotonic per-(date, symbol) chain counter, starting at 1. The counter
/// resets whenever the scope key changes, so a new symbol (or a new day)
/// starts over at 01.
#[derive(Default)]
pub struct ChainSequencer {
    inner: Mutex<SequencerState>,
}

#[derive(Default)]
struct SequencerState {
    key: Option<(String, String)>,
    counter: u32,
}

impl ChainSequencer {
    pub fn new() -> Arc<Self> {
        Arc::new(ChainSequencer::default())
    }

    pub fn next(&self, date: &str, symbol: &str) -> u32 {
        let mut state = self.inner.lock().expect("sequencer lock poisoned");
        let key = (date.to_string(), symbol.to_uppercase());
        if state.key.as_ref() != Some(&key) {
            state.key = Some(key);
            state.counter = 0;
        }
        state.counter += 1;
        state.counter
    }
}

/// Append-only turn buffer for one agent. Not shared across agents, so a
/// plain mutex around the buffer is all the synchronization needed.
pub struct ConversationRecorder {
    agent_name: String,
    sequencer: Arc<ChainSequencer>,
    artifacts: ArtifactHandle,
    state: Mutex<RecorderState>,
}

struct RecorderState {
    conversation_id: String,
    turns: Vec<ConversationTurn>,
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl ConversationRecorder {
    pub fn new(
        agent_name: impl Into<String>,
        sequencer: Arc<ChainSequencer>,
        artifacts: ArtifactHandle,
    ) -> Self {
        let agent_name = agent_name.into();
        let conversation_id = short_id();
        debug!(agent = %agent_name, conversation_id = %conversation_id, "recorder ready");
        ConversationRecorder {
            agent_name,
            sequencer,
            artifacts,
            state: Mutex::new(RecorderState {
                conversation_id,
                turns: Vec::new(),
            }),
        }
    }

    pub fn conversation_id(&self) -> String {
        self.state.lock().expect("recorder lock poisoned").conversation_id.clone()
    }

    /// Append one turn.
    pub fn record_llm_call(
        &self,
        messages: Vec<ChatMessage>,
        response: ChatResponse,
        metadata: TurnMetadata,
    ) {
        let mut state = self.state.lock().expect("recorder lock poisoned");
        state.turns.push(ConversationTurn {
            messages_sent: messages,
            response,
            tool_results: Vec::new(),
            metadata,
        });
    }

    /// Attach tool results to the most recent turn.
    pub fn attach_tool_results(&self, results: Vec<ToolResultRecord>) {
        if results.is_empty() {
            return;
        }
        let mut state = self.state.lock().expect("recorder lock poisoned");
        if let Some(last) = state.turns.last_mut() {
            last.tool_results = results;
        }
    }

    /// Seal the buffered turns into a numbered chain, publish it and clear
    /// the buffer. Returns the assigned sequence number.
    pub fn emit_chain(&self, symbol: &str, final_result: Value, success: bool) -> u32 {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let sequence = self.sequencer.next(&date, symbol);
        let mut state = self.state.lock().expect("recorder lock poisoned");
        let chain = AgentCallChain {
            agent: self.agent_name.clone(),
            symbol: symbol.to_uppercase(),
            sequence,
            conversation_id: state.conversation_id.clone(),
            turns: std::mem::take(&mut state.turns),
            final_result,
            success,
            completed_at: Utc::now(),
        };
        drop(state);
        self.artifacts.publish(ArtifactEvent::CallChain(Box::new(chain)));
        sequence
    }

    /// Clear the buffer without emission and start a fresh conversation id.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("recorder lock poisoned");
        state.turns.clear();
        state.conversation_id = short_id();
    }

    pub fn turn_count(&self) -> usize {
        self.state.lock().expect("recorder lock poisoned").turns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> TurnMetadata {
        TurnMetadata {
            model: "test-model".to_string(),
            provider: "test".to_string(),
            tokens: 10,
            cost: 0.0,
            latency_ms: 5,
            timestamp: Utc::now(),
        }
    }

    fn recorder(sequencer: Arc<ChainSequencer>) -> ConversationRecorder {
        ConversationRecorder::new("tester", sequencer, ArtifactHandle::disabled())
    }

    #[test]
    fn sequence_is_monotonic_per_symbol_and_resets_on_change() {
        let sequencer = ChainSequencer::new();
        assert_eq!(sequencer.next("2026-08-01", "AAPL"), 1);
        assert_eq!(sequencer.next("2026-08-01", "AAPL"), 2);
        assert_eq!(sequencer.next("2026-08-01", "aapl"), 3);
        assert_eq!(sequencer.next("2026-08-01", "MSFT"), 1);
        assert_eq!(sequencer.next("2026-08-01", "MSFT"), 2);
        // A new date is a new scope too.
        assert_eq!(sequencer.next("2026-08-02", "MSFT"), 1);
    }

    #[test]
    fn emit_clears_buffer_and_numbers_chains() {
        let sequencer = ChainSequencer::new();
        let recorder = recorder(sequencer.clone());
        recorder.record_llm_call(
            vec![ChatMessage::user("hello")],
            ChatResponse::Text {
                content: "hi".to_string(),
            },
            metadata(),
        );
        assert_eq!(recorder.turn_count(), 1);
        let first = recorder.emit_chain("AAPL", json!({"ok": true}), true);
        assert_eq!(first, 1);
        assert_eq!(recorder.turn_count(), 0);

        recorder.record_llm_call(
            vec![ChatMessage::user("again")],
            ChatResponse::Text {
                content: "sure".to_string(),
            },
            metadata(),
        );
        let second = recorder.emit_chain("AAPL", json!({}), true);
        assert_eq!(second, 2);
    }

    #[test]
    fn tool_results_attach_to_last_turn() {
        let recorder = recorder(ChainSequencer::new());
        recorder.record_llm_call(
            vec![ChatMessage::user("x")],
            ChatResponse::Text {
                content: String::new(),
            },
            metadata(),
        );
        recorder.attach_tool_results(vec![ToolResultRecord {
            tool_name: "emit_sample".to_string(),
            arguments: json!({}),
            result: "ok".to_string(),
            success: true,
        }]);
        let state = recorder.state.lock().unwrap();
        assert_eq!(state.turns[0].tool_results.len(), 1);
    }

    #[test]
    fn reset_rotates_conversation_id() {
        let recorder = recorder(ChainSequencer::new());
        let before = recorder.conversation_id();
        recorder.reset();
        assert_ne!(before, recorder.conversation_id());
    }
}
