//! Conversation orchestrator: drives one user question to a final answer.
//!
//! State machine per run:
//! 1. **INIT** — transcript = system prompt + prior history + user message
//! 2. **AWAITING_MODEL** — send transcript and full tool catalogue
//! 3. **DISPATCHING_TOOLS** — echo the model's tool-call message, run the
//!    whole batch concurrently, append one `tool` message per call
//! 4. back to 2, until the model answers in text or the round limit is hit
//! 5. **DONE** with the final text, or **FAILED** on an endpoint error or an
//!    expired deadline
//!
//! Runs share nothing mutable. The endpoint client and the tool registry are
//! injected at construction and only read.

use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::inference::{AssistantConfig, ChatMessage, CompletionEndpoint, ModelTurn, ToolDefinition};

use super::errors::AgentError;
use super::tool_router::ToolRouter;
use super::types::{AgentAnswer, RunState};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Instructions sent as the first message of every run.
pub const SYSTEM_PROMPT: &str = "You are an expense tracking assistant. You help the user understand \
their spending: analyse their expenses, spot patterns, and answer questions about their financial data.

Tools available for reading the user's data:
- get_user_expenses: the user's expenses, optionally limited to a date range
- get_expenses_with_categories: expenses together with their category names
- get_expense_summary: total spending per category
- get_total_expenses: the sum of all expenses
- get_user_categories: the user's expense categories

When you answer:
1. Call the tools that fetch the data the question needs
2. Be clear and concise, and quote concrete numbers when you have them
3. Point out anything notable about the spending patterns
4. Keep a helpful, conversational tone
5. Format amounts as currency
6. For trends or comparisons, base the analysis on the data you fetched

You can only see data belonging to the user who is asking.";

/// Answer used when the model produced no text.
pub const FALLBACK_RESPONSE: &str =
    "I apologize, but I encountered an issue processing your request.";

/// Default model↔tool round-trip limit.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 5;

/// Default wall-clock budget for one run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60);

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Runs the tool-calling loop against a completion endpoint.
pub struct Orchestrator<E> {
    endpoint: E,
    router: ToolRouter,
    max_tool_rounds: u32,
    run_timeout: Duration,
}

impl<E: CompletionEndpoint> Orchestrator<E> {
    pub fn new(endpoint: E, router: ToolRouter) -> Self {
        Self {
            endpoint,
            router,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Take the round limit and deadline from config.
    pub fn with_config(self, config: &AssistantConfig) -> Self {
        self.with_max_tool_rounds(config.max_tool_rounds)
            .with_run_timeout(config.run_timeout())
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: u32) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Answer one question for `user_id`.
    ///
    /// `history` is replayed verbatim between the system prompt and the new
    /// user message. Tool failures never fail the run; endpoint failures and
    /// an expired deadline do.
    pub async fn run(
        &self,
        user_id: &str,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<AgentAnswer, AgentError> {
        let deadline = Instant::now() + self.run_timeout;

        tracing::info!(
            state = %RunState::Init,
            user_id = %user_id,
            history_len = history.len(),
            max_tool_rounds = self.max_tool_rounds,
            "orchestrator: run started"
        );

        match self.run_loop(user_id, message, history, deadline).await {
            Ok(answer) => {
                tracing::info!(
                    state = %RunState::Done,
                    user_id = %user_id,
                    rounds = answer.rounds,
                    tools_used = ?answer.tools_used,
                    round_limit_reached = answer.round_limit_reached,
                    "orchestrator: run finished"
                );
                Ok(answer)
            }
            Err(e) => {
                tracing::error!(
                    state = %RunState::Failed,
                    user_id = %user_id,
                    error = %e,
                    "orchestrator: run failed"
                );
                Err(e)
            }
        }
    }

    async fn run_loop(
        &self,
        user_id: &str,
        message: &str,
        history: &[ChatMessage],
        deadline: Instant,
    ) -> Result<AgentAnswer, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(message));

        let tools = self.router.registry().definitions();
        let mut tools_used: Vec<String> = Vec::new();
        let mut rounds: u32 = 0;

        let mut turn = self.await_model(&messages, tools, rounds, deadline).await?;

        while turn.requests_tools() && rounds < self.max_tool_rounds {
            rounds += 1;

            for call in &turn.tool_calls {
                if !tools_used.contains(&call.name) {
                    tools_used.push(call.name.clone());
                }
            }

            tracing::info!(
                state = %RunState::DispatchingTools,
                round = rounds,
                tool_count = turn.tool_calls.len(),
                tools = ?turn.tool_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "orchestrator: dispatching tool calls"
            );

            let results = timeout_at(
                deadline,
                self.router.dispatch_tool_calls(&turn.tool_calls, user_id),
            )
            .await
            .map_err(|_| self.deadline_exceeded())?;

            let failed = results.iter().filter(|r| r.is_error()).count();
            if failed > 0 {
                tracing::warn!(round = rounds, failed, "orchestrator: some tool calls failed");
            }

            messages.push(turn.message);
            messages.extend(results.iter().map(|r| r.to_message()));

            turn = self.await_model(&messages, tools, rounds, deadline).await?;
        }

        let round_limit_reached = turn.requests_tools();
        if round_limit_reached {
            tracing::warn!(
                rounds,
                pending_calls = turn.tool_calls.len(),
                "orchestrator: tool round limit reached, returning best-effort answer"
            );
        }

        let response = turn
            .content
            .unwrap_or_else(|| FALLBACK_RESPONSE.to_string());

        Ok(AgentAnswer {
            response,
            tools_used,
            rounds,
            round_limit_reached,
        })
    }

    /// One completion call under the run deadline.
    async fn await_model(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        round: u32,
        deadline: Instant,
    ) -> Result<ModelTurn, AgentError> {
        tracing::info!(
            state = %RunState::AwaitingModel,
            round,
            message_count = messages.len(),
            "orchestrator: awaiting model"
        );

        let turn = timeout_at(deadline, self.endpoint.complete(messages, tools))
            .await
            .map_err(|_| self.deadline_exceeded())??;

        tracing::info!(
            round,
            tool_calls = turn.tool_calls.len(),
            has_content = turn.content.is_some(),
            finish_reason = turn.finish_reason.as_deref().unwrap_or("unknown"),
            "orchestrator: model turn received"
        );
        Ok(turn)
    }

    fn deadline_exceeded(&self) -> AgentError {
        AgentError::DeadlineExceeded {
            timeout_secs: self.run_timeout.as_secs(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use crate::agent_core::errors::ToolError;
    use crate::agent_core::tool_registry::ToolRegistry;
    use crate::agent_core::types::ToolArguments;
    use crate::inference::{CompletionFailureKind, InferenceError, Role, ToolCallRequest};
    use crate::store::{ExpenseDatabase, ExpenseStore, NewExpense};

    /// A recorded completion request.
    #[derive(Debug, Clone)]
    struct Recorded {
        messages: Vec<ChatMessage>,
        tool_count: usize,
    }

    /// Completion endpoint that replays scripted turns and records requests.
    ///
    /// Once the script is exhausted it keeps returning `repeat`, if set.
    #[derive(Default)]
    struct ScriptedEndpoint {
        script: Mutex<VecDeque<Result<ModelTurn, InferenceError>>>,
        repeat: Option<ModelTurn>,
        delay: Option<Duration>,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl ScriptedEndpoint {
        fn new(turns: Vec<Result<ModelTurn, InferenceError>>) -> Self {
            Self {
                script: Mutex::new(turns.into()),
                ..Self::default()
            }
        }

        fn repeating(turn: ModelTurn) -> Self {
            Self {
                repeat: Some(turn),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionEndpoint for ScriptedEndpoint {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
        ) -> Result<ModelTurn, InferenceError> {
            self.requests.lock().unwrap().push(Recorded {
                messages: messages.to_vec(),
                tool_count: tools.len(),
            });
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(turn) => turn,
                None => self.repeat.clone().ok_or(InferenceError::MalformedResponse {
                    reason: "script exhausted".into(),
                }),
            }
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn slow_tool(_: &dyn ExpenseStore, _: &ToolArguments) -> Result<Value, ToolError> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(json!({}))
    }

    /// u1 has 100.00 + 28.50; u2 has 999.00.
    fn router() -> ToolRouter {
        let db = ExpenseDatabase::open(":memory:").unwrap();
        for (user, amount) in [("u1", 100.0), ("u1", 28.5), ("u2", 999.0)] {
            db.insert_expense(&NewExpense {
                user_id: user.into(),
                category_id: None,
                amount,
                description: None,
                date: chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            })
            .unwrap();
        }
        let mut registry = ToolRegistry::standard();
        registry.register(
            ToolDefinition::function("slow_tool", "sleeps", json!({"type": "object"})),
            slow_tool,
        );
        ToolRouter::new(Arc::new(registry), Arc::new(db))
    }

    fn orchestrator(endpoint: ScriptedEndpoint) -> Orchestrator<ScriptedEndpoint> {
        Orchestrator::new(endpoint, router())
    }

    fn tool_messages(messages: &[ChatMessage]) -> Vec<&ChatMessage> {
        messages.iter().filter(|m| m.role == Role::Tool).collect()
    }

    #[tokio::test]
    async fn test_total_expenses_scenario() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(ModelTurn::tool_calls(vec![call("call_1", "get_total_expenses", "{}")])),
            Ok(ModelTurn::text("You've spent $128.50 in total.")),
        ]);
        let orch = orchestrator(endpoint);

        let answer = orch
            .run("u1", "What are my total expenses?", &[])
            .await
            .unwrap();
        assert_eq!(answer.response, "You've spent $128.50 in total.");
        assert_eq!(answer.tools_used, vec!["get_total_expenses"]);
        assert_eq!(answer.rounds, 1);
        assert!(!answer.round_limit_reached);

        let requests = orch.endpoint().requests();
        assert_eq!(requests.len(), 2);

        // First request: system, user. Full catalogue every time.
        let first = &requests[0].messages;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].role, Role::System);
        assert_eq!(first[0].content.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(first[1].content.as_deref(), Some("What are my total expenses?"));
        assert!(requests.iter().all(|r| r.tool_count == 6));

        // Second request: + echoed assistant call + tool result.
        let second = &requests[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].tool_calls.as_ref().unwrap()[0].id, "call_1");
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_1"));
        let payload: Value = serde_json::from_str(second[3].content.as_deref().unwrap()).unwrap();
        assert_eq!(payload, json!({"total": 128.5, "currency": "USD"}));
    }

    #[tokio::test]
    async fn test_history_is_replayed_between_system_and_user() {
        let endpoint = ScriptedEndpoint::new(vec![Ok(ModelTurn::text("Sure."))]);
        let orch = orchestrator(endpoint);
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("Hello! Ask me about your spending."),
        ];

        orch.run("u1", "thanks", &history).await.unwrap();

        let sent = &orch.endpoint().requests()[0].messages;
        let roles: Vec<Role> = sent.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(sent[3].content.as_deref(), Some("thanks"));
    }

    #[tokio::test]
    async fn test_unknown_tool_then_apology_is_done() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(ModelTurn::tool_calls(vec![call("call_1", "get_forecast", "{}")])),
            Ok(ModelTurn::text("Sorry, I can't forecast your spending.")),
        ]);
        let orch = orchestrator(endpoint);

        let answer = orch.run("u1", "Forecast next month", &[]).await.unwrap();
        assert_eq!(answer.response, "Sorry, I can't forecast your spending.");
        assert_eq!(answer.tools_used, vec!["get_forecast"]);

        let second = &orch.endpoint().requests()[1].messages;
        let tool_msg = tool_messages(second)[0];
        let content: Value = serde_json::from_str(tool_msg.content.as_deref().unwrap()).unwrap();
        assert_eq!(content["error"], "Unknown tool: get_forecast");
    }

    #[tokio::test]
    async fn test_round_limit_terminates_done_with_fallback() {
        let endpoint = ScriptedEndpoint::repeating(ModelTurn::tool_calls(vec![call(
            "call_x",
            "get_user_categories",
            "{}",
        )]));
        let orch = orchestrator(endpoint);

        let answer = orch.run("u1", "loop forever", &[]).await.unwrap();
        assert_eq!(answer.rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert!(answer.round_limit_reached);
        assert_eq!(answer.response, FALLBACK_RESPONSE);
        assert_eq!(answer.tools_used, vec!["get_user_categories"]);

        // One initial call plus one per round.
        assert_eq!(
            orch.endpoint().requests().len(),
            DEFAULT_MAX_TOOL_ROUNDS as usize + 1
        );
    }

    #[tokio::test]
    async fn test_custom_round_limit() {
        let endpoint = ScriptedEndpoint::repeating(ModelTurn::tool_calls(vec![call(
            "c",
            "get_total_expenses",
            "{}",
        )]));
        let orch = orchestrator(endpoint).with_max_tool_rounds(2);
        let answer = orch.run("u1", "q", &[]).await.unwrap();
        assert_eq!(answer.rounds, 2);
        assert_eq!(orch.endpoint().requests().len(), 3);
    }

    #[tokio::test]
    async fn test_round_limit_keeps_text_from_last_turn() {
        let mut last = ModelTurn::tool_calls(vec![call("c", "get_total_expenses", "{}")]);
        last.content = Some("Partial answer".into());
        let endpoint = ScriptedEndpoint::repeating(last);
        let orch = orchestrator(endpoint).with_max_tool_rounds(1);

        let answer = orch.run("u1", "q", &[]).await.unwrap();
        assert!(answer.round_limit_reached);
        assert_eq!(answer.response, "Partial answer");
    }

    #[tokio::test]
    async fn test_tools_used_is_deduplicated_across_turns() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(ModelTurn::tool_calls(vec![
                call("a", "get_total_expenses", "{}"),
                call("b", "get_expense_summary", "{}"),
            ])),
            Ok(ModelTurn::tool_calls(vec![
                call("c", "get_total_expenses", "{}"),
                call("d", "get_total_expenses", "{}"),
            ])),
            Ok(ModelTurn::text("done")),
        ]);
        let orch = orchestrator(endpoint);

        let answer = orch.run("u1", "q", &[]).await.unwrap();
        assert_eq!(
            answer.tools_used,
            vec!["get_total_expenses", "get_expense_summary"]
        );
        assert_eq!(answer.rounds, 2);

        // Repeated calls are still executed: 4 tool messages in the last request.
        let last = orch.endpoint().requests().pop().unwrap();
        assert_eq!(tool_messages(&last.messages).len(), 4);
    }

    #[tokio::test]
    async fn test_hallucinated_identity_is_overwritten() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(ModelTurn::tool_calls(vec![call(
                "call_1",
                "get_total_expenses",
                r#"{"userId":"u2"}"#,
            )])),
            Ok(ModelTurn::text("ok")),
        ]);
        let orch = orchestrator(endpoint);

        orch.run("u1", "q", &[]).await.unwrap();
        let second = &orch.endpoint().requests()[1].messages;
        let payload: Value =
            serde_json::from_str(tool_messages(second)[0].content.as_deref().unwrap()).unwrap();
        assert_eq!(payload["total"], 128.5);
    }

    #[tokio::test]
    async fn test_one_failing_call_does_not_block_batch() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(ModelTurn::tool_calls(vec![
                call("a", "get_total_expenses", "{}"),
                call("b", "get_user_expenses", r#"{"startDate":"not-a-date"}"#),
                call("c", "get_user_categories", "{}"),
            ])),
            Ok(ModelTurn::text("done")),
        ]);
        let orch = orchestrator(endpoint);

        orch.run("u1", "q", &[]).await.unwrap();
        let second = &orch.endpoint().requests()[1].messages;
        let tools = tool_messages(second);
        let ids: Vec<&str> = tools
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(tools[1].content.as_deref().unwrap().contains("error"));
        assert!(!tools[2].content.as_deref().unwrap().contains("error"));
    }

    #[tokio::test]
    async fn test_empty_text_answer_uses_fallback() {
        let endpoint = ScriptedEndpoint::new(vec![Ok(ModelTurn::text(""))]);
        let orch = orchestrator(endpoint);
        let answer = orch.run("u1", "q", &[]).await.unwrap();
        assert_eq!(answer.response, FALLBACK_RESPONSE);
        assert!(answer.tools_used.is_empty());
        assert_eq!(answer.rounds, 0);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_run() {
        let endpoint = ScriptedEndpoint::new(vec![Err(InferenceError::MissingCredential {
            env_var: "GROQ_API_KEY".into(),
        })]);
        let orch = orchestrator(endpoint);
        let err = orch.run("u1", "q", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_categorized() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(ModelTurn::tool_calls(vec![call("a", "get_total_expenses", "{}")])),
            Err(InferenceError::HttpError {
                status: 429,
                body: "rate limit".into(),
            }),
        ]);
        let orch = orchestrator(endpoint);
        let err = orch.run("u1", "q", &[]).await.unwrap_err();
        assert_eq!(err.completion_kind(), Some(CompletionFailureKind::RateLimited));
        assert_eq!(err.status_code(), 429);

        let endpoint = ScriptedEndpoint::new(vec![Err(InferenceError::HttpError {
            status: 401,
            body: "invalid api key".into(),
        })]);
        let err = orchestrator(endpoint).run("u1", "q", &[]).await.unwrap_err();
        assert_eq!(err.completion_kind(), Some(CompletionFailureKind::Unauthorized));
    }

    #[tokio::test]
    async fn test_deadline_on_slow_model() {
        let endpoint = ScriptedEndpoint {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedEndpoint::new(vec![Ok(ModelTurn::text("too late"))])
        };
        let orch = orchestrator(endpoint).with_run_timeout(Duration::from_millis(50));
        let err = orch.run("u1", "q", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::DeadlineExceeded { .. }));
        assert_eq!(err.status_code(), 504);
    }

    #[tokio::test]
    async fn test_deadline_on_slow_tool_batch() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(ModelTurn::tool_calls(vec![call("a", "slow_tool", "{}")])),
            Ok(ModelTurn::text("never reached")),
        ]);
        let orch = orchestrator(endpoint).with_run_timeout(Duration::from_millis(100));
        let err = orch.run("u1", "q", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::DeadlineExceeded { .. }));
        assert_eq!(orch.endpoint().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_orchestrator() {
        let endpoint = ScriptedEndpoint::repeating(ModelTurn::text("answer"));
        let orch = Arc::new(orchestrator(endpoint));

        let handles: Vec<_> = ["u1", "u2", "u3"]
            .into_iter()
            .map(|user| {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move { orch.run(user, "q", &[]).await })
            })
            .collect();

        for handle in handles {
            let answer = handle.await.unwrap().unwrap();
            assert_eq!(answer.response, "answer");
        }
        assert_eq!(orch.endpoint().requests().len(), 3);
    }
}
