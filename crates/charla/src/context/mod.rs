//! In-memory operations on a conversation history.
//!
//! A history is an ordered `Vec<Message>` whose index 0 is always the
//! system message; it is never empty. Four operations mutate or rebuild
//! it: [`initialize`], [`append`], [`purge`] (lossy truncation by count),
//! and [`compress`] (summarization of older messages through one extra
//! model call). Persistence lives in [`store`].

pub mod store;

use crate::{AgentError, ChatModel, ChatOptions, ChatRequest, Message, MessageRole, ToolCall};
use tracing::{debug, info};

/// Placeholder recorded when a message would otherwise have empty content.
/// History content is never null.
pub const NO_CONTENT: &str = "<no content>";

/// Default system prompt for the summarization call used by [`compress`].
pub const DEFAULT_SUMMARY_PROMPT: &str = "\
You summarize a chat conversation so it can continue in less space. \
Produce a concise, factual summary of the messages you are given. Keep \
names, numbers, file names, and decisions verbatim. Only include facts \
explicitly stated in the messages. Reply with the summary text only.";

// ── Compression configuration ──────────────────────────────────────

/// Configuration for summarization-based context compression.
///
/// Constructed once at startup and passed by argument; the core never
/// reads ambient state.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Context utilization percentage above which the agent loop compresses
    /// the history before continuing.
    pub trigger_pct: f64,
    /// System prompt for the summarization call. The conversation's own
    /// system message is not replaced by this text: the original prompt
    /// survives compression verbatim at index 0.
    pub replacement_system_text: String,
    /// Model used for the summarization call.
    pub model: String,
    /// Sampling options for the summarization call.
    pub options: ChatOptions,
}

impl CompressionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            trigger_pct: 70.0,
            replacement_system_text: DEFAULT_SUMMARY_PROMPT.to_string(),
            model: model.into(),
            options: ChatOptions::default(),
        }
    }

    pub fn with_trigger_pct(mut self, pct: f64) -> Self {
        self.trigger_pct = pct;
        self
    }

    pub fn with_replacement_system_text(mut self, text: impl Into<String>) -> Self {
        self.replacement_system_text = text.into();
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }
}

// ── History operations ─────────────────────────────────────────────

/// Create a fresh history: exactly one system message.
pub fn initialize(system_prompt: &str) -> Vec<Message> {
    vec![Message::system(system_prompt)]
}

/// Append one turn to the history.
///
/// Empty content is recorded as the [`NO_CONTENT`] placeholder. When
/// `tool_calls` is supplied the message records both content and the
/// requested calls.
pub fn append(
    history: &mut Vec<Message>,
    role: MessageRole,
    content: &str,
    tool_calls: Option<Vec<ToolCall>>,
) {
    let content = if content.is_empty() {
        NO_CONTENT.to_string()
    } else {
        content.to_string()
    };
    history.push(Message {
        role,
        content,
        tool_calls,
        tool_call_id: None,
        name: None,
    });
}

/// Bound history growth by unconditional truncation.
///
/// No-op while `history.len() <= max_count`. Otherwise the history becomes
/// the system message plus the last `keep_count` messages; everything in
/// between is discarded permanently. Lossy by design — a cheap bound on
/// unbounded growth, not a summarization strategy.
pub fn purge(history: &mut Vec<Message>, keep_count: usize, max_count: usize) {
    debug!("messages: {} / {max_count}", history.len());
    if history.len() <= max_count {
        return;
    }
    info!(
        "context purge triggered: {} messages, keeping system + last {keep_count}",
        history.len()
    );
    let tail_start = history.len().saturating_sub(keep_count).max(1);
    let mut purged = Vec::with_capacity(1 + keep_count);
    purged.push(history[0].clone());
    purged.extend_from_slice(&history[tail_start..]);
    *history = purged;
}

/// Compress the history by summarizing everything older than the last two
/// messages through one extra model call.
///
/// Returns the rebuilt history
/// `[system, ...latest messages, assistant summary]`. "Latest" is normally
/// the last two messages, widened when those are tool results so they stay
/// together with the assistant message that requested them. The original
/// system message survives verbatim at index 0. On a failed summarization
/// call this returns `Err` and the caller keeps the original history — the
/// conversation state is never silently shrunk by a failure.
pub async fn compress(
    model: &dyn ChatModel,
    history: &[Message],
    cfg: &CompressionConfig,
) -> Result<Vec<Message>, AgentError> {
    // System message plus at most two recent messages: nothing older to
    // summarize, hand back an unchanged copy.
    if history.len() <= 3 {
        return Ok(history.to_vec());
    }

    let mut split = history.len() - 2;
    // A tool result is only valid after the assistant message carrying its
    // tool_call_id; never cut a tool group off from its owner.
    while split > 1 && history[split].role == MessageRole::Tool {
        split -= 1;
    }
    if split <= 1 {
        // The whole tail is one tool group; nothing older to summarize.
        return Ok(history.to_vec());
    }

    let older = &history[1..split];
    let latest = &history[split..];

    let request = ChatRequest::new(
        &cfg.model,
        vec![
            Message::system(&cfg.replacement_system_text),
            Message::user(format_span(older)),
        ],
        cfg.options.clone(),
    );

    let completion = model.chat(&request).await?;
    info!(
        "context compressed: {} older messages folded into a summary",
        older.len()
    );

    let mut rebuilt = Vec::with_capacity(4);
    rebuilt.push(history[0].clone());
    rebuilt.extend_from_slice(latest);
    rebuilt.push(Message::assistant(format!(
        "Summary of the earlier conversation: {}",
        completion.content
    )));
    Ok(rebuilt)
}

/// Render a span of messages as plain text for the summarization call.
fn format_span(span: &[Message]) -> String {
    let mut out = String::new();
    for msg in span {
        out.push_str(&format!("[{}]: {}\n\n", msg.role, msg.content));
    }
    out
}
