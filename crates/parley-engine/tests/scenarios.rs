//! End-to-end turns over the built-in file tools and a scripted model.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use parley_context::{ContextConfig, ContextStore, ResourceTracker};
use parley_core::{
    BehaviorLookup, Decision, Message, Part, RetryConfig, Role, SessionId, StatefulResource,
    ToolCallStatus,
};
use parley_engine::tools::builtin_registry;
use parley_engine::{
    AutoApprove, ChatStatus, Confirmation, ConfirmationResponse, OrchestratorConfig, Phase,
    ScriptedConfirmation, SessionHandle, ToolOrchestrator, TurnConfig, TurnLoop, TurnOutcome,
};
use parley_llm::{MockModelClient, MockResponse, RetryingClient};

struct Engine {
    turn: TurnLoop,
    mock: Arc<MockModelClient>,
    orchestrator: Arc<ToolOrchestrator>,
}

fn engine(
    dir: &Path,
    mock: MockModelClient,
    confirmation: Arc<dyn Confirmation>,
    context: ContextConfig,
    retry: RetryConfig,
) -> Engine {
    let registry = Arc::new(builtin_registry().unwrap());
    let store = Arc::new(ContextStore::new(
        context,
        Arc::clone(&registry) as Arc<dyn BehaviorLookup>,
    ));
    let session = SessionHandle::new(SessionId::new(), store, ResourceTracker::filesystem())
        .with_working_directory(dir);
    let status = Arc::new(ChatStatus::new());
    let mock = Arc::new(mock);
    let client = Arc::new(RetryingClient::new(mock.clone(), retry));
    let orchestrator = Arc::new(ToolOrchestrator::new(
        registry,
        confirmation,
        Arc::clone(&status),
        OrchestratorConfig::default(),
    ));
    let turn = TurnLoop::new(
        session,
        client,
        Arc::clone(&orchestrator),
        status,
        TurnConfig::default(),
    );
    Engine {
        turn,
        mock,
        orchestrator,
    }
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 4,
        ..RetryConfig::default()
    }
}

fn call(id: &str, name: &str, args: Value) -> Part {
    Part::tool_call(id, name, args.as_object().cloned().unwrap_or_else(Map::new))
}

fn set_mtime(path: &Path, millis: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_millis(millis))
        .unwrap();
}

fn results_named<'a>(messages: &'a [Message], name: &str) -> Vec<&'a Part> {
    messages
        .iter()
        .flat_map(|m| m.tool_results())
        .filter(|p| p.tool_name() == Some(name))
        .collect()
}

fn calls_named<'a>(messages: &'a [Message], name: &str) -> Vec<&'a Part> {
    messages
        .iter()
        .flat_map(|m| m.tool_calls())
        .filter(|p| p.tool_name() == Some(name))
        .collect()
}

#[tokio::test]
async fn rereading_a_file_keeps_only_the_newest_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "first").unwrap();
    set_mtime(&path, 1_000_000);

    let e = engine(
        dir.path(),
        MockModelClient::new(vec![
            MockResponse::parts(vec![call("r1", "read_file", json!({"file_path": "a.txt"}))]),
            MockResponse::text("read it"),
            MockResponse::parts(vec![call("r2", "read_file", json!({"file_path": "a.txt"}))]),
            MockResponse::text("read it again"),
        ]),
        Arc::new(AutoApprove),
        ContextConfig::default(),
        fast_retry(3),
    );
    let cancel = CancellationToken::new();

    e.turn.submit("read file A", &cancel).await;
    std::fs::write(&path, "second version").unwrap();
    set_mtime(&path, 2_000_000);
    let outcome = e.turn.submit("read it again", &cancel).await;
    assert!(matches!(outcome, TurnOutcome::Completed { iterations: 2 }));

    let messages = e.turn.session().context.snapshot();
    let reads = results_named(&messages, "read_file");
    assert_eq!(reads.len(), 1);
    let resource = StatefulResource::from_payload(reads[0].result_payload().unwrap()).unwrap();
    assert_eq!(resource.last_modified, 2_000_000);
    assert_eq!(resource.size_bytes, 14);
    assert!(reads[0].result_payload().unwrap()["content"]
        .as_str()
        .unwrap()
        .contains("second version"));

    // The superseded call went with its result.
    let calls = calls_named(&messages, "read_file");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].call_id(), Some("r2"));
}

#[tokio::test]
async fn ephemeral_listing_ages_out_but_latest_read_stays() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.md"), "todo").unwrap();

    let e = engine(
        dir.path(),
        MockModelClient::new(vec![
            MockResponse::parts(vec![
                call("", "list_dir", json!({})),
                call("", "read_file", json!({"file_path": "notes.md"})),
            ]),
            MockResponse::text("found notes.md"),
            MockResponse::text("ok"),
        ]),
        Arc::new(AutoApprove),
        ContextConfig {
            turns_to_keep: 1,
            ..ContextConfig::default()
        },
        fast_retry(3),
    );
    let cancel = CancellationToken::new();

    e.turn.submit("what is in here?", &cancel).await;
    let before = e.turn.session().context.snapshot();
    assert_eq!(results_named(&before, "list_dir").len(), 1);

    e.turn.submit("thanks", &cancel).await;
    let after = e.turn.session().context.snapshot();
    assert!(results_named(&after, "list_dir").is_empty());
    assert!(calls_named(&after, "list_dir").is_empty());
    assert_eq!(results_named(&after, "read_file").len(), 1);
    assert_eq!(calls_named(&after, "read_file").len(), 1);
    assert_eq!(
        e.turn
            .session()
            .context
            .resources()
            .iter()
            .map(|r| r.resource_id.ends_with("notes.md"))
            .collect::<Vec<_>>(),
        vec![true]
    );
}

#[tokio::test]
async fn cancelled_confirmation_cancels_the_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    let confirmation = Arc::new(ScriptedConfirmation::new(vec![ConfirmationResponse {
        cancelled: true,
        ..ConfirmationResponse::default().decide("w2", Decision::No)
    }]));
    let e = engine(
        dir.path(),
        MockModelClient::new(vec![MockResponse::parts(vec![
            call("w1", "write_file", json!({"file_path": "1.txt", "content": "1"})),
            call("w2", "write_file", json!({"file_path": "2.txt", "content": "2"})),
            call("w3", "write_file", json!({"file_path": "3.txt", "content": "3"})),
        ])]),
        confirmation.clone(),
        ContextConfig::default(),
        fast_retry(3),
    );

    let outcome = e.turn.submit("write three files", &CancellationToken::new()).await;
    assert!(matches!(outcome, TurnOutcome::ToolsDeclined { iterations: 1 }));
    assert_eq!(confirmation.prompts().len(), 1);
    assert_eq!(confirmation.prompts()[0].len(), 3);
    for name in ["1.txt", "2.txt", "3.txt"] {
        assert!(!dir.path().join(name).exists());
    }

    let messages = e.turn.session().context.snapshot();
    assert!(messages.iter().all(|m| m.role != Role::Tool));
    let feedback: Vec<&Message> = messages.iter().filter(|m| m.is_feedback).collect();
    assert_eq!(feedback.len(), 1);
    let text = feedback[0].text_content();
    for id in ["[w1]", "[w2]", "[w3]"] {
        assert!(text.contains(id), "feedback should cite {id}: {text}");
    }
    assert_eq!(text.matches(ToolCallStatus::Cancelled.as_str()).count(), 3);
    assert_eq!(e.mock.call_count(), 1);
}

#[tokio::test]
async fn retry_budget_is_never_exceeded() {
    let dir = tempfile::tempdir().unwrap();
    let e = engine(
        dir.path(),
        MockModelClient::always(MockResponse::status(429)),
        Arc::new(AutoApprove),
        ContextConfig::default(),
        fast_retry(3),
    );

    let outcome = e.turn.submit("hello", &CancellationToken::new()).await;
    match outcome {
        TurnOutcome::Failed { error, attempts } => {
            assert_eq!(error.status_code(), Some(429));
            assert_eq!(attempts, 3);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(e.mock.call_count(), 3);

    let report = e.turn.status_report();
    assert_eq!(report.current_phase, Phase::Failed);
    assert!(report.last_error_summary.unwrap().contains("attempt 3"));
    // The user message stays; nothing half-written follows it.
    let messages = e.turn.session().context.snapshot();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn write_conflict_is_reported_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "v1").unwrap();
    set_mtime(&path, 1_000_000);

    let e = engine(
        dir.path(),
        MockModelClient::new(vec![
            MockResponse::parts(vec![call(
                "w1",
                "write_file",
                json!({"file_path": "a.txt", "content": "v2", "expectedLastModified": 999}),
            )]),
            MockResponse::text("it changed, I will re-read"),
        ]),
        Arc::new(AutoApprove),
        ContextConfig::default(),
        fast_retry(3),
    );

    let outcome = e.turn.submit("update a.txt", &CancellationToken::new()).await;
    assert!(matches!(outcome, TurnOutcome::Completed { iterations: 2 }));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "v1");

    let messages = e.turn.session().context.snapshot();
    let result = results_named(&messages, "write_file")[0];
    assert!(result.result_payload().unwrap()["error"]
        .as_str()
        .unwrap()
        .contains("resource conflict"));
    assert_eq!(e.orchestrator.failures().recent_failures(
        "write_file",
        &json!({"file_path": "a.txt", "content": "v2", "expectedLastModified": 999})
            .as_object()
            .cloned()
            .unwrap()
    ), 1);
}
