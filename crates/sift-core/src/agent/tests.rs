use std::sync::Arc;
use std::time::Duration;

use sift_corpus::{Chunk, CorpusSnapshot};
use sift_index::Bm25Params;
use sift_llm::mock::MockProvider;
use sift_llm::{RetryPolicy, Role};
use sift_tools::{RetrievalContext, ToolRegistry};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::budget::estimate_tokens;

const ANSWER: &str = r#"{"action": "answer", "answer": "Alpha Capital filed in 2008."}"#;
const SEARCH_ALPHA: &str =
    r#"{"action": "use_tool", "tool": "text_search", "params": {"text": "alpha"}}"#;

fn context() -> RetrievalContext {
    let chunks = vec![
        Chunk::new("c0", "Alpha Capital filed for bankruptcy in September 2008.", 0),
        Chunk::new("c1", "Beta Holdings reported record profits the same year.", 1),
        Chunk::new("c2", "Gamma Partners later acquired the remaining assets.", 2),
    ];
    RetrievalContext::new(Arc::new(CorpusSnapshot::chunks_only(
        chunks,
        Bm25Params::default(),
    )))
}

fn agent(provider: MockProvider) -> (ReasoningAgent<MockProvider>, Arc<MockProvider>) {
    let provider = Arc::new(provider);
    let agent = ReasoningAgent::new(Arc::clone(&provider), Arc::new(ToolRegistry::retrieval()))
        .with_retry(RetryPolicy::none())
        .with_max_iterations(4);
    (agent, provider)
}

fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn user_prompt(provider: &MockProvider, call: usize) -> String {
    provider.recorded_calls()[call]
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap()
}

#[tokio::test]
async fn answer_ends_session_in_one_iteration() {
    let (agent, provider) = agent(MockProvider::with_responses(vec![ANSWER.into()]));
    let (sink, mut rx) = EventSink::channel();
    let agent = agent.with_events(sink);

    let outcome = agent.run("Who filed?", &context()).await.unwrap();

    assert_eq!(outcome.termination, Termination::Answered);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.answer, "Alpha Capital filed in 2008.");
    assert_eq!(provider.call_count(), 1);
    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(SessionEvent::SessionStarted { .. })));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::FinalAnswer {
            iterations: 1,
            fallback: false
        })
    );
}

#[tokio::test]
async fn first_prompt_carries_system_prompt_and_catalog() {
    let (agent, provider) = agent(MockProvider::with_responses(vec![ANSWER.into()]));
    agent.run("Who filed?", &context()).await.unwrap();

    let messages = &provider.recorded_calls()[0];
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].content, SYSTEM_PROMPT);
    let prompt = user_prompt(&provider, 0);
    assert!(prompt.contains("## Question\nWho filed?"));
    assert!(prompt.contains("## text_search"));
    assert!(!prompt.contains("## vector_search"));
    assert!(!prompt.contains("## fetch_group"));
}

#[tokio::test]
async fn endless_tool_use_stops_at_limit_with_fallback() {
    let (agent, provider) = agent(MockProvider::default().with_default_response(SEARCH_ALPHA));
    let (sink, mut rx) = EventSink::channel();
    let agent = agent.with_events(sink).with_max_iterations(3);

    let outcome = agent.run("Who filed?", &context()).await.unwrap();

    assert_eq!(provider.call_count(), 3);
    assert_eq!(outcome.termination, Termination::MaxIterations);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.tool_calls, 3);
    assert!(outcome.answer.contains("within 3 reasoning steps"));
    assert!(outcome.answer.contains("Alpha Capital"));
    assert_eq!(outcome.sources, vec!["chunk:c0"]);
    let events = drain(&mut rx);
    assert_eq!(
        events.last(),
        Some(&SessionEvent::FinalAnswer {
            iterations: 3,
            fallback: true
        })
    );
}

#[tokio::test]
async fn repeated_call_triggers_repetition_warning() {
    let (agent, provider) = agent(MockProvider::with_responses(vec![
        SEARCH_ALPHA.into(),
        SEARCH_ALPHA.into(),
        ANSWER.into(),
    ]));
    agent.run("Who filed?", &context()).await.unwrap();

    assert!(!user_prompt(&provider, 1).contains("identical parameters"));
    assert!(user_prompt(&provider, 2).contains("`text_search` with identical parameters"));
}

#[tokio::test]
async fn parallel_results_merge_in_declared_order() {
    let batch = r#"{"action": "use_tool", "parallel": true, "tool_calls": [
        {"tool": "text_search", "params": {"text": "gamma"}},
        {"tool": "text_search", "params": {"text": "alpha"}},
        {"tool": "teleport", "params": {}}
    ]}"#;
    let (agent, provider) = agent(MockProvider::with_responses(vec![
        batch.into(),
        ANSWER.into(),
    ]));
    let (sink, mut rx) = EventSink::channel();
    let agent = agent.with_events(sink);

    let outcome = agent.run("Who bought the assets?", &context()).await.unwrap();

    assert_eq!(outcome.tool_calls, 3);
    let labels: Vec<_> = outcome.context.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["text_search #1", "text_search #2"]);
    assert!(outcome.context[0].text.contains("Gamma"));
    assert!(outcome.context[1].text.contains("Alpha"));
    assert_eq!(outcome.sources, vec!["chunk:c2", "chunk:c0"]);

    let finished: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::ToolCallFinished { tool, success, .. } => Some((tool, success)),
            _ => None,
        })
        .collect();
    assert_eq!(
        finished,
        vec![
            ("text_search".to_owned(), true),
            ("text_search".to_owned(), true),
            ("teleport".to_owned(), false),
        ]
    );
    assert!(user_prompt(&provider, 1).contains("failed: unknown tool: teleport"));
}

#[tokio::test]
async fn context_is_pruned_before_next_reasoning_call() {
    let (agent, provider) = agent(MockProvider::with_responses(vec![
        SEARCH_ALPHA.into(),
        ANSWER.into(),
    ]));
    let (sink, mut rx) = EventSink::channel();
    let agent = agent.with_events(sink).with_budget_tokens(12);

    let outcome = agent.run("Who filed?", &context()).await.unwrap();

    let events = drain(&mut rx);
    let pruned = events
        .iter()
        .position(|e| matches!(e, SessionEvent::ContextPruned { .. }))
        .unwrap();
    let second_reasoning = events
        .iter()
        .position(|e| *e == SessionEvent::ReasoningStarted { iteration: 2 })
        .unwrap();
    assert!(pruned < second_reasoning);
    assert!(estimate_tokens(&outcome.rendered_context()) <= 12);
    assert!(user_prompt(&provider, 1).contains("### text_search #1 (truncated)"));
}

#[tokio::test]
async fn malformed_decision_consumes_iteration() {
    let (agent, provider) = agent(MockProvider::with_responses(vec![
        "I think the answer is 2008.".into(),
        ANSWER.into(),
    ]));
    let (sink, mut rx) = EventSink::channel();
    let agent = agent.with_events(sink);

    let outcome = agent.run("When?", &context()).await.unwrap();

    assert_eq!(outcome.iterations, 2);
    assert_eq!(provider.call_count(), 2);
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SessionEvent::DecisionRejected { iteration: 1, .. }))
    );
    assert!(user_prompt(&provider, 1).contains("[1] your reply was rejected"));
}

#[tokio::test]
async fn reasoning_failure_aborts_session() {
    let (agent, _provider) = agent(MockProvider::failing());
    let (sink, mut rx) = EventSink::channel();
    let agent = agent.with_events(sink);

    let err = agent.run("Who filed?", &context()).await.unwrap_err();

    assert!(matches!(err, AgentError::Reasoning(_)));
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SessionEvent::SessionError { message } if message.contains("mock LLM error")))
    );
}

#[tokio::test(start_paused = true)]
async fn transient_reasoning_failures_are_retried() {
    let (agent, provider) = agent(
        MockProvider::with_responses(vec![ANSWER.into()]).with_transient_failures(2),
    );
    let agent = agent.with_retry(RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 10,
        max_delay_ms: 100,
    });

    let outcome = agent.run("Who filed?", &context()).await.unwrap();

    assert_eq!(outcome.termination, Termination::Answered);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (agent, provider) = agent(MockProvider::with_responses(vec![ANSWER.into()]));
    let agent = agent.with_cancellation(cancel);

    let err = agent.run("Who filed?", &context()).await.unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_reasoning_call() {
    let cancel = CancellationToken::new();
    let (agent, _provider) = agent(MockProvider::with_responses(vec![ANSWER.into()]).with_delay(60_000));
    let agent = agent.with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let err = agent.run("Who filed?", &context()).await.unwrap_err();
    trigger.await.unwrap();

    assert!(matches!(err, AgentError::Cancelled));
}

#[test]
fn fallback_answer_without_context() {
    let text = fallback_answer(5, "");
    assert!(text.contains("nothing relevant was retrieved"));
}
