//! End-to-end tests for the agent loop: streaming, cancellation,
//! persistence, and configuration wiring.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inklore_agent::test_helpers::*;
use inklore_agent::{AgentLoop, INTERRUPTED_NOTICE, RunOutcome};
use inklore_config::EngineConfig;
use inklore_core::cancel::{CancelReason, CancelSignal};
use inklore_core::error::ToolError;
use inklore_core::event::{DomainEvent, EventBus};
use inklore_core::memory::TranscriptStore;
use inklore_core::retrieval::{RetrievedNote, Retriever};
use inklore_memory::InMemoryStore;

struct FixedRetriever;

#[async_trait]
impl Retriever for FixedRetriever {
    async fn search(
        &self,
        _query: &str,
        _salient_terms: &[String],
    ) -> Result<Vec<RetrievedNote>, ToolError> {
        Ok(vec![RetrievedNote {
            title: "Project Plan".into(),
            path: "work/plan.md".into(),
            content: "ship the beta in June".into(),
            score: 0.87,
        }])
    }
}

fn agent_with(provider: Arc<ScriptedStreamProvider>) -> AgentLoop {
    let tools = Arc::new(inklore_tools::default_registry(Arc::new(FixedRetriever)));
    AgentLoop::new(
        provider,
        "test-model",
        0.7,
        tools,
        Arc::new(EventBus::default()),
    )
}

#[tokio::test]
async fn cancellation_mid_stream_emits_one_notice_and_partial_result() {
    let provider = Arc::new(
        ScriptedStreamProvider::new(vec![vec![
            text_chunk("The answer "),
            text_chunk("starts here "),
            text_chunk("and keeps going "),
            text_chunk("for a while "),
            text_chunk("before finishing."),
            stop_chunk(),
        ]])
        .with_chunk_delay(Duration::from_millis(40)),
    );
    let agent = agent_with(provider);

    let emissions: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = emissions.clone();
    let cancel = CancelSignal::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel(CancelReason::Interrupted);
    });

    let outcome = agent
        .run("long question", cancel, move |s| {
            sink.lock().unwrap().push(s.to_string())
        })
        .await
        .unwrap();

    assert_eq!(outcome.outcome, RunOutcome::Aborted);

    // The decoder was closed cleanly: whatever streamed before the cut is
    // a well-formed partial result.
    let emitted = emissions.lock().unwrap();
    let notices = emitted
        .iter()
        .filter(|s| s.contains(INTERRUPTED_NOTICE))
        .count();
    assert_eq!(notices, 1, "interrupted notice must be emitted exactly once");
}

#[tokio::test]
async fn reasoning_segments_survive_into_final_answer() {
    let provider = Arc::new(ScriptedStreamProvider::new(vec![
        tool_call_turn("call_1", "local_search", r#"{"query":"beta date"}"#),
        vec![
            reasoning_chunk("the plan says June"),
            text_chunk("The beta ships in June."),
            stop_chunk(),
        ],
    ]));
    let agent = agent_with(provider);

    let outcome = agent
        .run("when does the beta ship?", CancelSignal::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(outcome.outcome, RunOutcome::Completed);
    assert!(outcome.text.contains("<think>"));
    assert!(outcome.text.contains("</think>"));
    assert!(outcome.text.contains("The beta ships in June."));
    assert_eq!(outcome.sources.len(), 1);
    assert_eq!(outcome.sources[0].path, "work/plan.md");
}

#[tokio::test]
async fn completed_run_persists_reconciled_exchange() {
    let provider = Arc::new(ScriptedStreamProvider::single_text("Persisted answer."));
    let store = Arc::new(InMemoryStore::new());
    let tools = Arc::new(inklore_tools::default_registry(Arc::new(FixedRetriever)));
    let agent = AgentLoop::new(
        provider,
        "test-model",
        0.7,
        tools,
        Arc::new(EventBus::default()),
    )
    .with_store(store.clone() as Arc<dyn TranscriptStore>);

    let outcome = agent
        .run("save this", CancelSignal::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(store.count().await, 1);
    let saved = store.all().await;
    assert_eq!(saved[0].input, "save this");
    assert_eq!(saved[0].output, outcome.text);
}

#[tokio::test]
async fn new_conversation_cancel_suppresses_persistence() {
    let provider = Arc::new(ScriptedStreamProvider::new(vec![]));
    let store = Arc::new(InMemoryStore::new());
    let tools = Arc::new(inklore_tools::default_registry(Arc::new(FixedRetriever)));
    let agent = AgentLoop::new(
        provider,
        "test-model",
        0.7,
        tools,
        Arc::new(EventBus::default()),
    )
    .with_store(store.clone() as Arc<dyn TranscriptStore>);

    let cancel = CancelSignal::new();
    cancel.cancel(CancelReason::NewConversation);

    let outcome = agent.run("discarded", cancel, |_| {}).await.unwrap();
    assert_eq!(outcome.outcome, RunOutcome::Aborted);
    assert_eq!(store.count().await, 0);
}

#[tokio::test]
async fn interrupted_cancel_still_persists_partial_progress() {
    let provider = Arc::new(ScriptedStreamProvider::new(vec![]));
    let store = Arc::new(InMemoryStore::new());
    let tools = Arc::new(inklore_tools::default_registry(Arc::new(FixedRetriever)));
    let agent = AgentLoop::new(
        provider,
        "test-model",
        0.7,
        tools,
        Arc::new(EventBus::default()),
    )
    .with_store(store.clone() as Arc<dyn TranscriptStore>);

    let cancel = CancelSignal::new();
    cancel.cancel(CancelReason::Interrupted);

    let outcome = agent.run("partial", cancel, |_| {}).await.unwrap();
    assert_eq!(outcome.outcome, RunOutcome::Aborted);
    assert_eq!(store.count().await, 1);
    assert_eq!(store.all().await[0].output, outcome.text);
}

#[tokio::test]
async fn from_config_wires_budgets() {
    let config = EngineConfig::from_toml(
        r#"
        [agent]
        max_iterations = 2

        [model]
        name = "test-model"
        "#,
    )
    .unwrap();

    let provider = Arc::new(ScriptedStreamProvider::new(vec![
        tool_call_turn("call_1", "local_search", r#"{"query":"a"}"#),
        tool_call_turn("call_2", "local_search", r#"{"query":"b"}"#),
    ]));
    let tools = Arc::new(inklore_tools::default_registry(Arc::new(FixedRetriever)));
    let agent = AgentLoop::from_config(
        provider.clone(),
        tools,
        Arc::new(EventBus::default()),
        &config,
    );

    let outcome = agent
        .run("looping question", CancelSignal::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(outcome.outcome, RunOutcome::MaxIterationsReached);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn run_events_are_published() {
    let provider = Arc::new(ScriptedStreamProvider::new(vec![
        tool_call_turn("call_1", "local_search", r#"{"query":"plan"}"#),
        text_turn("Done."),
    ]));
    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();
    let tools = Arc::new(inklore_tools::default_registry(Arc::new(FixedRetriever)));
    let agent = AgentLoop::new(provider, "test-model", 0.7, tools, event_bus.clone());

    agent
        .run("what's the plan?", CancelSignal::new(), |_| {})
        .await
        .unwrap();

    let mut saw_tool = false;
    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "local_search");
                assert!(success);
                saw_tool = true;
            }
            DomainEvent::RunCompleted { outcome, .. } => {
                assert_eq!(outcome, "Completed");
                saw_completed = true;
            }
            _ => {}
        }
    }
    assert!(saw_tool);
    assert!(saw_completed);
}
