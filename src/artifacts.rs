//! Structured artifact logging.
//!
//! Components publish [`ArtifactEvent`]s to a channel; a dedicated writer
//! task consumes them and appends markdown files under the log root. This
//! keeps file I/O off the hot path of agents and coordinators.
//!
//! Layout on disk:
//!
//! ```text
//! logs/markdown/<YYYY-MM-DD>/<SYMBOL>/<agent>.md    per-agent transcript
//! logs/markdown/<YYYY-MM-DD>/<SYMBOL>/workflow.md   per-stage markers
//! logs/llm/<YYYY-MM-DD>/<SYMBOL>/<NN>.<agent>.md    per-agent call chain
//! ```

use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::conversation::AgentCallChain;
use crate::llm::ChatResponse;

#[derive(Debug)]
pub enum ArtifactEvent {
    /// One agent's human-readable output for a stage.
    AgentOutput {
        agent: String,
        symbol: String,
        stage: String,
        content: String,
    },
    /// Workflow stage start/end marker.
    StageMarker {
        symbol: String,
        stage: String,
        content: String,
        success: bool,
    },
    /// A sealed per-agent LLM call chain.
    CallChain(Box<AgentCallChain>),
}

/// Cheap clonable publisher side. A disabled handle swallows events, which
/// keeps tests and library embedders free of filesystem side effects.
#[derive(Clone)]
pub struct ArtifactHandle {
    tx: Option<mpsc::UnboundedSender<ArtifactEvent>>,
}

impl ArtifactHandle {
    pub fn disabled() -> Self {
        ArtifactHandle { tx: None }
    }

    pub fn publish(&self, event: ArtifactEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                warn!("artifact writer is gone; dropping event");
            }
        }
    }
}

pub struct ArtifactLogger;

impl ArtifactLogger {
    /// Spawn the writer task. The handle keeps the channel open; dropping
    /// every handle ends the task.
    pub fn spawn(root: impl Into<PathBuf>) -> (ArtifactHandle, JoinHandle<()>) {
        let root = root.into();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = write_event(&root, event).await {
                    error!(error = %err, "failed to write artifact");
                }
            }
        });
        (ArtifactHandle { tx: Some(tx) }, task)
    }
}

async fn write_event(root: &Path, event: ArtifactEvent) -> std::io::Result<()> {
    let today = Local::now().format("%Y-%m-%d").to_string();
    let timestamp = Local::now().format("%H:%M:%S").to_string();
    match event {
        ArtifactEvent::AgentOutput {
            agent,
            symbol,
            stage,
            content,
        } => {
            let dir = root.join("markdown").join(&today).join(symbol.to_uppercase());
            let path = dir.join(format!("{}.md", sanitize(&agent)));
            let mut block = String::new();
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                block.push_str(&format!("# {agent} - {}\n\n", symbol.to_uppercase()));
                block.push_str(&format!("**Date**: {today}\n\n---\n\n"));
            }
            block.push_str(&format!("## {timestamp}\n\n"));
            if !stage.is_empty() {
                block.push_str(&format!("**Stage**: {stage}\n\n"));
            }
            block.push_str(&content);
            block.push_str("\n\n---\n\n");
            append(&dir, &path, &block).await
        }
        ArtifactEvent::StageMarker {
            symbol,
            stage,
            content,
            success,
        } => {
            let dir = root.join("markdown").join(&today).join(symbol.to_uppercase());
            let path = dir.join("workflow.md");
            let mut block = String::new();
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                block.push_str(&format!("# Trading workflow - {}\n\n", symbol.to_uppercase()));
                block.push_str(&format!("**Date**: {today}\n\n## Stages\n\n"));
            }
            let status = if success { "ok" } else { "failed" };
            block.push_str(&format!("### {stage} [{status}] ({timestamp})\n\n"));
            block.push_str(&content);
            block.push_str("\n\n---\n\n");
            append(&dir, &path, &block).await
        }
        ArtifactEvent::CallChain(chain) => {
            let dir = root.join("llm").join(&today).join(chain.symbol.to_uppercase());
            let path = dir.join(format!(
                "{:02}.{}.md",
                chain.sequence,
                sanitize(&chain.agent)
            ));
            append(&dir, &path, &render_chain(&chain)).await
        }
    }
}

async fn append(dir: &Path, path: &Path, content: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let existing = tokio::fs::read_to_string(path).await.unwrap_or_default();
    tokio::fs::write(path, existing + content).await
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

fn render_chain(chain: &AgentCallChain) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# {} call chain - {} (#{:02})\n\n",
        chain.agent, chain.symbol, chain.sequence
    ));
    out.push_str(&format!(
        "**Conversation**: {}  \n**Success**: {}\n\n",
        chain.conversation_id, chain.success
    ));
    for (i, turn) in chain.turns.iter().enumerate() {
        out.push_str(&format!(
            "## Turn {} ({} / {}, {} tokens, {} ms)\n\n",
            i + 1,
            turn.metadata.provider,
            turn.metadata.model,
            turn.metadata.tokens,
            turn.metadata.latency_ms,
        ));
        for message in &turn.messages_sent {
            out.push_str(&format!("- **{}**: {}\n", message.role, truncate(&message.content, 400)));
        }
        match &turn.response {
            ChatResponse::Text { content } => {
                out.push_str(&format!("\n**Response**: {}\n\n", truncate(content, 2000)));
            }
            ChatResponse::ToolCalls { content, calls } => {
                if !content.is_empty() {
                    out.push_str(&format!("\n**Response**: {}\n", truncate(content, 2000)));
                }
                for call in calls {
                    out.push_str(&format!(
                        "\n**Tool call** `{}`: {}\n",
                        call.name,
                        truncate(&call.arguments, 1000)
                    ));
                }
                out.push('\n');
            }
        }
        for result in &turn.tool_results {
            out.push_str(&format!(
                "**Tool result** `{}` ({}): {}\n\n",
                result.tool_name,
                if result.success { "ok" } else { "failed" },
                truncate(&result.result, 1000)
            ));
        }
    }
    out.push_str("## Final result\n\n```json\n");
    out.push_str(
        &serde_json::to_string_pretty(&chain.final_result).unwrap_or_else(|_| "{}".to_string()),
    );
    out.push_str("\n```\n");
    out
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// Render a JSON value for inclusion in prompts and transcripts.
pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_characters() {
        assert_eq!(sanitize("Bull Researcher"), "bull_researcher");
        assert_eq!(sanitize("../evil"), "___evil");
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ab", 3), "ab");
    }

    #[tokio::test]
    async fn disabled_handle_swallows_events() {
        let handle = ArtifactHandle::disabled();
        handle.publish(ArtifactEvent::StageMarker {
            symbol: "AAPL".to_string(),
            stage: "ANALYSIS".to_string(),
            content: String::new(),
            success: true,
        });
    }
}
