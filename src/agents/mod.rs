//! Agent core: the tool-call loop every agent runs on.
//!
//! An agent binds a role, a system prompt, an LLM client and a tool set
//! with exactly one terminal emitter. [`AgentCore::run_until_tool`] drives
//! the model through iterative tool invocations until the terminal emitter
//! is called; its structured arguments become the agent's output. Debate
//! participants additionally use [`AgentCore::debate_turn`], a single-turn
//! call with no tools.

pub mod analysts;
pub mod fund_manager;
pub mod researchers;
pub mod risk;
pub mod trader;

pub use analysts::{Analyst, AnalystKind};
pub use fund_manager::FundManager;
pub use researchers::{Researcher, ResearchStance};
pub use risk::{RiskAnalyst, RiskManagerAgent, RiskStance};
pub use trader::{Trader, TraderContext};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::artifacts::{ArtifactEvent, ArtifactHandle};
use crate::cancel::CancelSignal;
use crate::conversation::{
    ChainSequencer, ConversationRecorder, ToolResultRecord, TurnMetadata,
};
use crate::error::AgentError;
use crate::llm::{ChatMessage, ChatResponse, LlmClient};
use crate::session::{AgentRole, SessionManager};
use crate::tools::{parse_arguments, ToolOutcome, ToolRegistry};

/// Shared wiring handed to every agent at construction.
#[derive(Clone)]
pub struct AgentRuntime {
    pub session: Arc<SessionManager>,
    pub sequencer: Arc<ChainSequencer>,
    pub artifacts: ArtifactHandle,
    pub max_iterations: usize,
}

impl AgentRuntime {
    pub fn new(
        session: Arc<SessionManager>,
        sequencer: Arc<ChainSequencer>,
        artifacts: ArtifactHandle,
        max_iterations: usize,
    ) -> Self {
        AgentRuntime {
            session,
            sequencer,
            artifacts,
            max_iterations,
        }
    }
}

pub struct AgentCore {
    pub role: AgentRole,
    system_prompt: String,
    llm: LlmClient,
    tools: ToolRegistry,
    terminal_tool: String,
    max_iterations: usize,
    recorder: ConversationRecorder,
    session: Arc<SessionManager>,
    artifacts: ArtifactHandle,
}

impl AgentCore {
    pub fn new(
        role: AgentRole,
        system_prompt: impl Into<String>,
        llm: LlmClient,
        tools: ToolRegistry,
        terminal_tool: impl Into<String>,
        runtime: &AgentRuntime,
    ) -> Self {
        let terminal_tool = terminal_tool.into();
        debug_assert!(tools.has_tool(&terminal_tool), "terminal tool must be registered");
        AgentCore {
            role,
            system_prompt: system_prompt.into(),
            llm,
            tools,
            terminal_tool,
            max_iterations: runtime.max_iterations,
            recorder: ConversationRecorder::new(
                role.as_str(),
                runtime.sequencer.clone(),
                runtime.artifacts.clone(),
            ),
            session: runtime.session.clone(),
            artifacts: runtime.artifacts.clone(),
        }
    }

    pub fn name(&self) -> &str {
        self.role.display_name()
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Start a session for `symbol` if none is active.
    pub fn ensure_session(&self, symbol: &str) {
        if !self.session.has_session() {
            self.session.start_session(symbol);
        }
    }

    pub fn reset_recorder(&self) {
        self.recorder.reset();
    }

    /// Seal the recorded turns into a call chain.
    pub fn emit_chain(&self, symbol: &str, final_result: Value, success: bool) -> u32 {
        self.recorder.emit_chain(symbol, final_result, success)
    }

    /// Human-readable output block for the markdown transcript tree.
    pub fn log_output(&self, symbol: &str, stage: &str, content: String) {
        self.artifacts.publish(ArtifactEvent::AgentOutput {
            agent: self.role.as_str().to_string(),
            symbol: symbol.to_string(),
            stage: stage.to_string(),
            content,
        });
    }

    /// Drive the model until the terminal tool is invoked, at most
    /// `max_iterations` exchanges. Returns the terminal tool's structured
    /// return value.
    pub async fn run_until_tool(
        &self,
        user_prompt: &str,
        cancel: &CancelSignal,
    ) -> Result<Value, AgentError> {
        let terminal = self.terminal_tool.clone();
        self.run_until_named(user_prompt, &terminal, cancel).await
    }

    /// Same loop, but the terminal tool is chosen per call. Used by the
    /// debate coordinator, whose judge owns two emitters.
    pub async fn run_until_named(
        &self,
        user_prompt: &str,
        terminal_tool: &str,
        cancel: &CancelSignal,
    ) -> Result<Value, AgentError> {
        let schemas = self.tools.schemas();
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(user_prompt),
        ];

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            debug!(agent = %self.role, iteration, "tool loop iteration");

            let started = Instant::now();
            let reply = self
                .llm
                .chat_completion(messages.clone(), Some(schemas.clone()), cancel)
                .await?;
            self.recorder.record_llm_call(
                messages.clone(),
                reply.response.clone(),
                self.turn_metadata(&self.llm, reply.total_tokens, started),
            );

            match reply.response {
                ChatResponse::Text { content } => {
                    // No terminal tool yet; keep the model's own reply in
                    // context and ask again.
                    messages.push(ChatMessage::assistant(content));
                }
                ChatResponse::ToolCalls { content, calls } => {
                    messages.push(ChatMessage::assistant_with_tool_calls(content.as_str(), &calls));

                    let mut terminal_args: Option<Value> = None;
                    let mut records: Vec<ToolResultRecord> = Vec::new();
                    for call in &calls {
                        let args = parse_arguments(&call.arguments);
                        let outcome = self.tools.execute(&call.name, args.clone()).await;
                        let (result_string, success, fatal) = match outcome {
                            ToolOutcome::Success(value) => {
                                if call.name == terminal_tool {
                                    terminal_args = Some(value.clone());
                                }
                                (value.to_string(), true, None)
                            }
                            ToolOutcome::Failure(message) => {
                                let fatal = (call.name == terminal_tool)
                                    .then(|| AgentError::ToolExecution {
                                        tool: call.name.clone(),
                                        message: message.clone(),
                                    });
                                (format!("tool execution failed: {message}"), false, fatal)
                            }
                            ToolOutcome::Unknown => {
                                (format!("unknown tool: {}", call.name), false, None)
                            }
                        };
                        records.push(ToolResultRecord {
                            tool_name: call.name.clone(),
                            arguments: Value::Object(args),
                            result: result_string.clone(),
                            success,
                        });
                        messages.push(ChatMessage::tool(call.id.as_str(), result_string));

                        if let Some(error) = fatal {
                            warn!(agent = %self.role, tool = %call.name, "terminal emitter failed");
                            self.recorder.attach_tool_results(records);
                            return Err(error);
                        }
                    }
                    self.recorder.attach_tool_results(records);

                    if let Some(args) = terminal_args {
                        return Ok(args);
                    }
                }
            }
        }

        Err(AgentError::TerminalToolNotCalled(terminal_tool.to_string()))
    }

    /// One plain exchange with no tools, used for debate turns. The caller
    /// may supply a different LLM for this turn (model randomization);
    /// returns the reply text together with the model/provider that
    /// produced it.
    pub async fn debate_turn(
        &self,
        prompt: &str,
        llm_override: Option<&LlmClient>,
        cancel: &CancelSignal,
    ) -> Result<DebateReply, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let llm = llm_override.unwrap_or(&self.llm);
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ];
        let started = Instant::now();
        let reply = llm.chat_completion(messages.clone(), None, cancel).await?;
        self.recorder.record_llm_call(
            messages,
            reply.response.clone(),
            self.turn_metadata(llm, reply.total_tokens, started),
        );
        Ok(DebateReply {
            content: reply.response.content().to_string(),
            model: llm.model().to_string(),
            provider: llm.provider().to_string(),
        })
    }

    fn turn_metadata(&self, llm: &LlmClient, tokens: u64, started: Instant) -> TurnMetadata {
        TurnMetadata {
            model: llm.model().to_string(),
            provider: llm.provider().to_string(),
            tokens,
            cost: 0.0,
            latency_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        }
    }
}

/// Result of one debate turn, tagged with the model that spoke.
#[derive(Debug, Clone)]
pub struct DebateReply {
    pub content: String,
    pub model: String,
    pub provider: String,
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transports shared by the unit tests in this module tree.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::{
        ChatCompletionApi, ChatReply, ChatRequest, ChatResponse, ToolCallRequest, TransportError,
    };

    /// Plays back a fixed sequence of responses, then repeats the last one.
    pub struct ScriptedApi {
        responses: Mutex<Vec<ChatResponse>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedApi {
        pub fn new(responses: Vec<ChatResponse>) -> Self {
            ScriptedApi {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn text(content: &str) -> ChatResponse {
            ChatResponse::Text {
                content: content.to_string(),
            }
        }

        pub fn tool_call(name: &str, arguments: &str) -> ChatResponse {
            ChatResponse::ToolCalls {
                content: String::new(),
                calls: vec![ToolCallRequest {
                    id: format!("call_{name}"),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
            }
        }
    }

    #[async_trait]
    impl ChatCompletionApi for ScriptedApi {
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatReply, TransportError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            let response = responses
                .get(index)
                .or_else(|| responses.last())
                .cloned()
                .ok_or_else(|| TransportError::Malformed("script exhausted".to_string()))?;
            Ok(ChatReply {
                response,
                total_tokens: 7,
            })
        }

        fn provider(&self) -> &str {
            "scripted"
        }
    }
}
