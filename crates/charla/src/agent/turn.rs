//! The agent loop: one conversation turn from user text to final reply.
//!
//! [`Agent::interact`] drives a bounded state machine:
//!
//! ```text
//! LOADING -> ITERATING -> { TOOLS_PENDING -> ITERATING }* -> DONE
//!                                                         -> DONE (budget exceeded)
//! ```
//!
//! Each iteration sends the history plus tool definitions to the model. A
//! text-only response ends the turn; requested tool calls are dispatched
//! strictly in the order the model returned them, their results appended,
//! and the loop continues. The iteration cap bounds the loop against a
//! model that never stops requesting tools.

use super::config::TurnConfig;
use crate::context;
use crate::context::store::ContextStore;
use crate::tools::core::ToolRegistry;
use crate::{AgentError, ChatModel, ChatRequest, MessageRole};
use tracing::{debug, info, warn};

/// Sentinel reply returned when the iteration budget runs out before the
/// model produces a tool-free response.
pub const BUDGET_EXCEEDED_REPLY: &str = "Max tool iterations triggered!";

/// Terminal state of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// The model produced a tool-free reply within the budget.
    Done,
    /// The iteration budget ran out; the reply is the fixed sentinel.
    BudgetExceeded,
}

/// One tool invocation observed during a turn, for the caller's trace.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    /// Compact JSON rendering of the call's arguments.
    pub arguments: String,
}

/// Result of one conversation turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The model's final reply, or [`BUDGET_EXCEEDED_REPLY`].
    pub reply: String,
    /// Every tool invoked during the turn, in dispatch order.
    pub tool_trace: Vec<ToolInvocation>,
    /// Context usage reported by the last model call, as a percentage.
    pub usage_pct: f64,
    /// Model iterations consumed.
    pub iterations: u32,
    pub state: TurnState,
}

impl TurnOutcome {
    /// Render the outcome as chat text: one caption line per tool invoked,
    /// then the reply.
    pub fn text(&self) -> String {
        if self.tool_trace.is_empty() {
            return self.reply.clone();
        }
        let mut out = String::new();
        for invocation in &self.tool_trace {
            out.push_str(&format!("🛠️ {}({})\n", invocation.name, invocation.arguments));
        }
        out.push_str(&self.reply);
        out
    }
}

/// The conversation agent.
///
/// `Agent<'a>` borrows the model client and tool registry by reference;
/// both must outlive the [`interact`](Agent::interact) call. One agent can
/// serve many conversations, but concurrent turns on the *same* chat id
/// must be serialized by the caller — persistence is last-writer-wins.
pub struct Agent<'a> {
    model: &'a dyn ChatModel,
    tools: &'a ToolRegistry,
    config: TurnConfig,
}

impl<'a> Agent<'a> {
    pub fn new(model: &'a dyn ChatModel, tools: &'a ToolRegistry, config: TurnConfig) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }

    /// Process one user turn for the given conversation id.
    ///
    /// Loads (or initializes) the conversation history, runs the bounded
    /// iterate/execute cycle, persists the history, and returns the
    /// outcome. Only a transport or endpoint failure aborts the turn; tool
    /// failures become `tool` message content the model reacts to, and a
    /// failed save is logged without failing the reply.
    ///
    /// On budget exhaustion the history accumulated so far is still
    /// persisted, so a retry does not repeat the same tool calls.
    pub async fn interact(
        &self,
        user_text: &str,
        chat_id: &str,
        store: &ContextStore,
    ) -> Result<TurnOutcome, AgentError> {
        let mut history = store
            .load(chat_id)
            .unwrap_or_else(|| context::initialize(&self.config.system_prompt));
        context::append(&mut history, MessageRole::User, user_text, None);

        info!("turn start for {chat_id}: {} messages loaded", history.len() - 1);

        let definitions = self.tools.definitions();
        let mut tool_trace = Vec::new();
        let mut usage_pct = 0.0;

        for iteration in 1..=self.config.max_tool_iterations {
            debug!("iteration {iteration} / {}", self.config.max_tool_iterations);

            let request =
                ChatRequest::new(&self.config.model, history.clone(), self.config.options())
                    .with_tools(definitions.clone());
            let completion = self.model.chat(&request).await?;
            usage_pct = completion.usage_pct;

            if completion.usage_pct > self.config.compression.trigger_pct {
                info!(
                    "context usage {:.1}% over {:.1}% threshold, compressing",
                    completion.usage_pct, self.config.compression.trigger_pct
                );
                match context::compress(self.model, &history, &self.config.compression).await {
                    Ok(rebuilt) => history = rebuilt,
                    // Never shrink conversation state on a failed
                    // summarization call.
                    Err(e) => warn!("compression failed, keeping full history: {e}"),
                }
            }

            context::append(
                &mut history,
                MessageRole::Assistant,
                &completion.content,
                completion.tool_calls.clone(),
            );

            let Some(calls) = completion.tool_calls else {
                if let Err(e) = store.save(chat_id, &history) {
                    warn!("could not persist history for {chat_id}: {e}");
                }
                info!(
                    "turn done for {chat_id}: {iteration} iteration(s), {} tool call(s), usage {:.1}%",
                    tool_trace.len(),
                    usage_pct
                );
                return Ok(TurnOutcome {
                    reply: completion.content,
                    tool_trace,
                    usage_pct,
                    iterations: iteration,
                    state: TurnState::Done,
                });
            };

            // Dispatch in the order the model requested; append results in
            // that same order before the next model call.
            for call in &calls {
                tool_trace.push(ToolInvocation {
                    name: call.function.name.clone(),
                    arguments: serde_json::Value::Object(call.function.arguments.clone())
                        .to_string(),
                });
                let result = self.tools.dispatch(call).await;
                history.push(result);
            }
            context::purge(&mut history, self.config.keep_count, self.config.max_count);
        }

        // Budget exhausted. Persist the partial progress anyway: the tool
        // results already in the history spare a retry from redoing them.
        if let Err(e) = store.save(chat_id, &history) {
            warn!("could not persist history for {chat_id}: {e}");
        }
        warn!(
            "tool iteration budget ({}) exhausted for {chat_id}",
            self.config.max_tool_iterations
        );
        Ok(TurnOutcome {
            reply: BUDGET_EXCEEDED_REPLY.to_string(),
            tool_trace,
            usage_pct,
            iterations: self.config.max_tool_iterations,
            state: TurnState::BudgetExceeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MathOperations;
    use crate::{ChatCompletion, ChatFuture, FunctionCall, Message, ToolCall, ToolType};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A model that replays a fixed script of responses, one per call.
    struct ScriptedModel {
        script: Mutex<VecDeque<Result<ChatCompletion, AgentError>>>,
        calls: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        fn new(script: Vec<Result<ChatCompletion, AgentError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatModel for ScriptedModel {
        fn chat<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
            self.calls.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            Box::pin(async move { next.expect("model called more times than scripted") })
        }
    }

    /// A model that requests the same tool on every call, forever.
    struct AdversarialModel;

    impl ChatModel for AdversarialModel {
        fn chat<'a>(&'a self, _request: &'a ChatRequest) -> ChatFuture<'a> {
            Box::pin(async { Ok(completion("thinking...", Some(vec![math_call("c", 1.0, "+", 1.0)]))) })
        }
    }

    fn completion(content: &str, tool_calls: Option<Vec<ToolCall>>) -> ChatCompletion {
        ChatCompletion {
            content: content.into(),
            tool_calls,
            usage_pct: 10.0,
            stats: None,
        }
    }

    fn math_call(id: &str, a: f64, op: &str, b: f64) -> ToolCall {
        ToolCall {
            id: id.into(),
            call_type: ToolType::Function,
            function: FunctionCall {
                name: "do_math_operations".into(),
                arguments: serde_json::json!({"a": a, "op": op, "b": b})
                    .as_object()
                    .cloned()
                    .unwrap(),
            },
        }
    }

    fn config() -> TurnConfig {
        TurnConfig::new("llama3.2", "You are a helpful assistant.")
    }

    fn store() -> (tempfile::TempDir, ContextStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn plain_reply_persists_three_messages() {
        let model = ScriptedModel::new(vec![Ok(completion("hi there", None))]);
        let tools = ToolRegistry::new();
        let (_dir, store) = store();

        let agent = Agent::new(&model, &tools, config());
        let outcome = agent.interact("hello", "chat-1", &store).await.unwrap();

        assert_eq!(outcome.reply, "hi there");
        assert_eq!(outcome.state, TurnState::Done);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.text(), "hi there");

        let history = store.load("chat-1").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, MessageRole::System);
        assert_eq!(history[1].role, MessageRole::User);
        assert_eq!(history[2].role, MessageRole::Assistant);
        assert_eq!(history[2].content, "hi there");
    }

    #[tokio::test]
    async fn math_tool_turn_persists_five_messages() {
        let model = ScriptedModel::new(vec![
            Ok(completion("", Some(vec![math_call("c1", 3.0, "*", 2.0)]))),
            Ok(completion("3 times 2 is 6", None)),
        ]);
        let tools = ToolRegistry::new().with(MathOperations);
        let (_dir, store) = store();

        let agent = Agent::new(&model, &tools, config());
        let outcome = agent.interact("what is 3*2?", "chat-2", &store).await.unwrap();

        assert_eq!(outcome.reply, "3 times 2 is 6");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_trace.len(), 1);
        assert_eq!(outcome.tool_trace[0].name, "do_math_operations");
        assert!(outcome.text().starts_with("🛠️ do_math_operations("));
        assert!(outcome.text().ends_with("3 times 2 is 6"));

        let history = store.load("chat-2").unwrap();
        assert_eq!(history.len(), 5);
        assert!(history[2].tool_calls.is_some());
        assert_eq!(history[3].role, MessageRole::Tool);
        assert_eq!(history[3].content, "6");
        assert_eq!(history[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(history[4].content, "3 times 2 is 6");
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_sentinel_and_persists_progress() {
        let tools = ToolRegistry::new().with(MathOperations);
        let (_dir, store) = store();

        let agent = Agent::new(
            &AdversarialModel,
            &tools,
            config().with_max_tool_iterations(2),
        );
        let outcome = agent.interact("loop forever", "chat-3", &store).await.unwrap();

        assert_eq!(outcome.reply, BUDGET_EXCEEDED_REPLY);
        assert_eq!(outcome.state, TurnState::BudgetExceeded);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_trace.len(), 2);

        // Partial progress survives for the next attempt.
        let history = store.load("chat-3").unwrap();
        assert!(history.iter().any(|m| m.role == MessageRole::Tool));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_content_and_loop_continues() {
        let mut call = math_call("c9", 1.0, "+", 1.0);
        call.function.name = "nonexistent_tool".into();
        let model = ScriptedModel::new(vec![
            Ok(completion("", Some(vec![call]))),
            Ok(completion("never mind", None)),
        ]);
        let tools = ToolRegistry::new();
        let (_dir, store) = store();

        let agent = Agent::new(&model, &tools, config());
        let outcome = agent.interact("use a tool", "chat-4", &store).await.unwrap();

        assert_eq!(outcome.reply, "never mind");
        let history = store.load("chat-4").unwrap();
        let tool_msg = history.iter().find(|m| m.role == MessageRole::Tool).unwrap();
        assert_eq!(tool_msg.content, crate::tools::TOOL_NOT_FOUND);
    }

    #[tokio::test]
    async fn transport_error_aborts_without_persisting() {
        let model = ScriptedModel::new(vec![Err(AgentError::Endpoint {
            status: 500,
            body: "boom".into(),
        })]);
        let tools = ToolRegistry::new();
        let (_dir, store) = store();

        let agent = Agent::new(&model, &tools, config());
        let result = agent.interact("hello", "chat-5", &store).await;

        assert!(result.is_err());
        assert!(store.load("chat-5").is_none());
    }

    #[tokio::test]
    async fn multiple_calls_dispatch_in_model_order() {
        let model = ScriptedModel::new(vec![
            Ok(completion(
                "",
                Some(vec![
                    math_call("c1", 1.0, "+", 2.0),
                    math_call("c2", 3.0, "*", 3.0),
                ]),
            )),
            Ok(completion("done", None)),
        ]);
        let tools = ToolRegistry::new().with(MathOperations);
        let (_dir, store) = store();

        let agent = Agent::new(&model, &tools, config());
        agent.interact("two sums", "chat-6", &store).await.unwrap();

        let history = store.load("chat-6").unwrap();
        assert_eq!(history[3].content, "3");
        assert_eq!(history[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(history[4].content, "9");
        assert_eq!(history[4].tool_call_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn purge_bounds_history_after_tool_results() {
        let model = ScriptedModel::new(vec![
            Ok(completion("", Some(vec![math_call("c1", 1.0, "+", 1.0)]))),
            Ok(completion("done", None)),
        ]);
        let tools = ToolRegistry::new().with(MathOperations);
        let (_dir, store) = store();

        // After the tool result the history is 4 long, over max_count 3:
        // purge keeps system + last 2, then the final reply lands on top.
        let agent = Agent::new(&model, &tools, config().with_purge_thresholds(2, 3));
        agent.interact("hello", "chat-7", &store).await.unwrap();

        let history = store.load("chat-7").unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, MessageRole::System);
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[2].role, MessageRole::Tool);
        assert_eq!(history[3].content, "done");
    }

    #[tokio::test]
    async fn high_usage_triggers_compression() {
        let mut first = completion("all wrapped up", None);
        first.usage_pct = 95.0;
        let model = ScriptedModel::new(vec![
            Ok(first),
            // Second scripted response answers the summarization call.
            Ok(completion("earlier they discussed fruit", None)),
        ]);
        let tools = ToolRegistry::new();
        let (_dir, store) = store();

        // Seed a long-enough prior history for compression to bite.
        let mut seeded = vec![Message::system("You are a helpful assistant.")];
        for i in 1..=5 {
            seeded.push(Message::user(format!("older message {i}")));
        }
        store.save("chat-8", &seeded).unwrap();

        let agent = Agent::new(&model, &tools, config());
        let outcome = agent.interact("latest question", "chat-8", &store).await.unwrap();

        assert_eq!(outcome.reply, "all wrapped up");
        let history = store.load("chat-8").unwrap();
        // [system, last two pre-compression, summary, final reply]
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].content, "You are a helpful assistant.");
        assert!(history[3].content.contains("earlier they discussed fruit"));
        assert_eq!(history[4].content, "all wrapped up");

        // Both the turn call and the summarization call carried the model.
        assert_eq!(model.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_compression_keeps_full_history_and_finishes_turn() {
        let mut first = completion("still answered", None);
        first.usage_pct = 95.0;
        let model = ScriptedModel::new(vec![
            Ok(first),
            // The summarization call fails; the turn must not.
            Err(AgentError::Endpoint {
                status: 503,
                body: "unavailable".into(),
            }),
        ]);
        let tools = ToolRegistry::new();
        let (_dir, store) = store();

        let mut seeded = vec![Message::system("You are a helpful assistant.")];
        for i in 1..=5 {
            seeded.push(Message::user(format!("older message {i}")));
        }
        store.save("chat-9", &seeded).unwrap();

        let agent = Agent::new(&model, &tools, config());
        let outcome = agent.interact("latest question", "chat-9", &store).await.unwrap();

        assert_eq!(outcome.reply, "still answered");
        assert_eq!(outcome.state, TurnState::Done);

        // Unshrunk: seeded 6 + user + assistant, and no summary message.
        let history = store.load("chat-9").unwrap();
        assert_eq!(history.len(), 8);
        assert!(
            history
                .iter()
                .all(|m| !m.content.contains("Summary of the earlier conversation"))
        );
        assert_eq!(history[7].content, "still answered");

        // Both the turn call and the failed summarization call went out.
        assert_eq!(model.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn outcome_text_without_tools_is_just_the_reply() {
        let outcome = TurnOutcome {
            reply: "plain".into(),
            tool_trace: vec![],
            usage_pct: 0.0,
            iterations: 1,
            state: TurnState::Done,
        };
        assert_eq!(outcome.text(), "plain");
    }
}
