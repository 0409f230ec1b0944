//! Conversational tool-calling agent runtime on top of the Ollama chat API.
//!
//! `charla` provides the engine behind a chat bot: the [`Agent`](agent::Agent)
//! runs a bounded iterate-call-model/execute-tools loop for one conversation
//! turn, the [`context`] module owns the per-conversation message history
//! (append, purge, compress, persist), and the [`tools`] module defines the
//! tool registry and dispatch contract.
//!
//! # Getting started
//!
//! ```ignore
//! use charla::agent::{Agent, TurnConfig};
//! use charla::context::store::ContextStore;
//! use charla::tools;
//! use charla::OllamaClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), charla::AgentError> {
//!     let client = OllamaClient::new("http://localhost:11434")?;
//!     let registry = tools::default_registry("data", None)?;
//!     let store = ContextStore::new("data/history")?;
//!
//!     let config = TurnConfig::new("llama3.2", "You are a helpful assistant.")
//!         .with_max_tool_iterations(6)
//!         .with_num_ctx(8192);
//!
//!     let agent = Agent::new(&client, &registry, config);
//!     let outcome = agent.interact("What time is it?", "chat-42", &store).await?;
//!     println!("{}", outcome.text());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **The agent loop:** [`Agent`](agent::Agent) and
//!   [`TurnConfig`](agent::TurnConfig). One call to
//!   [`Agent::interact()`](agent::Agent::interact) processes a whole turn:
//!   load history, iterate model calls, dispatch tools, persist, reply.
//! - **Tools:** the [`Tool`](tools::core::Tool) trait and
//!   [`ToolRegistry`](tools::core::ToolRegistry) for collection/dispatch.
//!   Built-in tools (disk, web, weather, clock, math) live in [`tools`].
//! - **Conversation state:** [`context`] for the in-memory history
//!   operations, [`context::store`] for JSON persistence keyed by chat id.
//! - **The model boundary:** [`ChatModel`] is the seam the loop and the
//!   compressor depend on; [`OllamaClient`] is the production implementation.
//!
//! # Design principles
//!
//! 1. **One turn at a time.** The loop is synchronous per conversation:
//!    tool calls dispatch strictly in the order the model requested them,
//!    and the iteration cap is the sole backpressure against runaway loops.
//! 2. **Context is the scarcest resource.** History is purged by count and
//!    compressed by summarization when the model reports high window usage.
//! 3. **Tool failures are content.** A failing or unknown tool becomes a
//!    `tool` message the model can react to; only transport failures abort
//!    the turn.

pub mod agent;
pub mod context;
pub mod error;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

pub use error::AgentError;

// ── Constants ──────────────────────────────────────────────────────

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Nanoseconds per second, for converting Ollama's duration fields.
const NANOS_PER_SEC: f64 = 1_000_000_000.0;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the parameter schema the Ollama function-calling API expects.
///
/// # Example
///
/// ```
/// use charla::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ReadFileArgs {
///     filename: String,
/// }
///
/// let schema = json_schema_for::<ReadFileArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"filename".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// `content` is always present (possibly a placeholder), never null.
/// `tool_calls` appears only on assistant messages that request tools;
/// `tool_call_id`/`name` only on tool messages, linking a result back to
/// the assistant message that requested it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// A tool result message, linked back to the originating call.
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(tool_name.into()),
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (Ollama function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model.
///
/// Ollama does not assign call ids; [`OllamaClient`] generates a fresh UUID
/// for each call so tool results can be linked back unambiguously.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "ToolType::function")]
    pub call_type: ToolType,
    pub function: FunctionCall,
}

impl ToolType {
    fn function() -> Self {
        ToolType::Function
    }
}

/// Name and arguments of a requested call. Ollama delivers arguments as a
/// JSON object, not a string.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

// ── Request types ──────────────────────────────────────────────────

/// Sampling options forwarded to Ollama.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatOptions {
    pub temperature: f32,
    /// Context window size in tokens. Also the denominator for the usage
    /// percentage reported in [`ChatCompletion`].
    pub num_ctx: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            num_ctx: 8192,
        }
    }
}

/// Chat request body for the Ollama `/api/chat` endpoint.
#[derive(Serialize, Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Always sent as `false`: tool-call turns need a complete message, so
    /// the adapter requests whole responses even when the caller configures
    /// streaming elsewhere.
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    pub options: ChatOptions,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, options: ChatOptions) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            tools: None,
            options,
        }
    }

    /// Attach tool definitions. An empty list is sent as no tools at all —
    /// some models refuse requests with an empty `tools` array.
    pub fn with_tools(mut self, tools: Vec<ToolDef>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    #[serde(default)]
    model: String,
    message: RawResponseMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    load_duration: u64,
    #[serde(default)]
    prompt_eval_duration: u64,
    #[serde(default)]
    eval_duration: u64,
    #[serde(default)]
    total_duration: u64,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    #[serde(default)]
    content: String,
    tool_calls: Option<Vec<ToolCall>>,
}

/// Clean return type from a [`ChatModel::chat()`] call.
///
/// If the model requested zero tools, `tool_calls` is `None` and `content`
/// carries the final answer text for this iteration.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Prompt tokens consumed as a percentage of the declared context
    /// window. Drives the compression trigger in the agent loop.
    pub usage_pct: f64,
    pub stats: Option<StepStats>,
}

/// Per-call timing and token statistics reported by Ollama.
#[derive(Debug, Clone)]
pub struct StepStats {
    pub model: String,
    pub prompt_tokens: u64,
    pub eval_tokens: u64,
    pub load_secs: f64,
    pub prompt_secs: f64,
    pub gen_secs: f64,
    pub total_secs: f64,
}

impl StepStats {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "{} loaded in {:.1}s; prompt {} tokens in {:.1}s; generation {} tokens in {:.1}s; total {:.1}s",
            self.model,
            self.load_secs,
            self.prompt_tokens,
            self.prompt_secs,
            self.eval_tokens,
            self.gen_secs,
            self.total_secs,
        )
    }
}

/// Prompt-token usage as a percentage of the context window.
pub fn usage_percentage(prompt_tokens: u64, num_ctx: u32) -> f64 {
    if num_ctx == 0 {
        return 0.0;
    }
    prompt_tokens as f64 / f64::from(num_ctx) * 100.0
}

// ── ChatModel trait ────────────────────────────────────────────────

/// Boxed future returned by [`ChatModel::chat`].
pub type ChatFuture<'a> =
    std::pin::Pin<Box<dyn Future<Output = Result<ChatCompletion, AgentError>> + Send + 'a>>;

/// A single request/response call to a language-model endpoint.
///
/// This is the boundary the agent loop and the context compressor depend
/// on. A transport or endpoint failure is a typed [`AgentError`], always
/// distinguishable from a successful empty-content reply.
///
/// Uses a boxed future so the trait is dyn-compatible.
pub trait ChatModel: Send + Sync {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a>;
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Ollama chat API.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    /// When true, per-call stats are logged at `info` instead of `debug`.
    log_stats: bool,
}

impl OllamaClient {
    /// Create a new client against the given base URL
    /// (e.g. `http://localhost:11434`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .user_agent("charla/0.3")
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            log_stats: false,
        })
    }

    /// Log per-call model statistics at `info` level.
    pub fn with_stats_logging(mut self, enabled: bool) -> Self {
        self.log_stats = enabled;
        self
    }

    async fn chat_inner(&self, body: &ChatRequest) -> Result<ChatCompletion, AgentError> {
        let tool_count = body.tools.as_ref().map_or(0, |t| t.len());
        debug!(
            "LLM request: model={}, messages={}, tools={}, temp={}, num_ctx={}",
            body.model,
            body.messages.len(),
            tool_count,
            body.options.temperature,
            body.options.num_ctx,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(AgentError::Endpoint {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)?;

        let stats = StepStats {
            model: parsed.model.clone(),
            prompt_tokens: parsed.prompt_eval_count,
            eval_tokens: parsed.eval_count,
            load_secs: parsed.load_duration as f64 / NANOS_PER_SEC,
            prompt_secs: parsed.prompt_eval_duration as f64 / NANOS_PER_SEC,
            gen_secs: parsed.eval_duration as f64 / NANOS_PER_SEC,
            total_secs: parsed.total_duration as f64 / NANOS_PER_SEC,
        };
        if self.log_stats {
            info!("{}", stats.to_log_string());
        } else {
            debug!("{}", stats.to_log_string());
        }

        let usage_pct = usage_percentage(parsed.prompt_eval_count, body.options.num_ctx);

        // Normalize tool calls: zero requested tools is `None`, and every
        // call gets a fresh id since Ollama does not supply one.
        let tool_calls = match parsed.message.tool_calls {
            Some(calls) if !calls.is_empty() => Some(
                calls
                    .into_iter()
                    .map(|mut call| {
                        if call.id.is_empty() {
                            call.id = uuid::Uuid::new_v4().to_string();
                        }
                        call
                    })
                    .collect(),
            ),
            _ => None,
        };

        debug!(
            "LLM output: {} chars text, {} tool call(s), usage {:.1}%",
            parsed.message.content.len(),
            tool_calls.as_ref().map_or(0, Vec::len),
            usage_pct,
        );

        Ok(ChatCompletion {
            content: parsed.message.content,
            tool_calls,
            usage_pct,
            stats: Some(stats),
        })
    }
}

impl ChatModel for OllamaClient {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.chat_inner(request))
    }
}
