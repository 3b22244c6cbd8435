use super::*;
use crate::auth::StaticToken;
use crate::notify::{ChannelNotifier, NoticeLevel};
use crate::test_support::{
    connection, event_log, settle, Attempt, CountingTokens, EventLog, FakeConnector, FakeServer, FixedService,
};
use shared_types::{StreamKind, StreamMessage, StreamPhase};
use std::time::Duration;

const ASKING: &str = "Before I can write this agent I need a few details from you. \
    What is the Google Drive file ID of the report you want summarized?";

struct Fixture {
    session: Session,
    servers: Vec<FakeServer>,
    log: EventLog,
    notices: mpsc::UnboundedReceiver<Notice>,
}

fn fixture(service: FixedService, connections: usize, base_url: &str) -> Fixture {
    let log = event_log();
    let mut attempts = Vec::new();
    let mut servers = Vec::new();
    for id in 1..=connections {
        let (attempt, server) = connection(id, &log);
        attempts.push(attempt);
        servers.push(server);
    }
    if connections == 0 {
        attempts = (0..4).map(|_| Attempt::Fail).collect();
    }

    let config = ClientConfig::default().with_base_url(base_url);
    let (notifier, notices) = ChannelNotifier::new();
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    let streams = StreamController::new(
        FakeConnector::new(attempts, &log),
        Arc::new(CountingTokens::default()),
        notifier.clone(),
        &config,
    );
    let api = ApiClient::new(&config, Arc::new(StaticToken::new("tok").unwrap())).unwrap();
    let dispatcher = ActionDispatcher::new(api, notifier.clone(), &config);

    Fixture {
        session: Session::new(Arc::new(service), streams, dispatcher, notifier, &config),
        servers,
        log,
        notices,
    }
}

fn optimize_service() -> FixedService {
    FixedService {
        needs_reasoning: false,
        chat_reply: "Anything else?".to_string(),
    }
}

fn text(s: &str) -> StreamMessage {
    StreamMessage::text(StreamPhase::Claude, s)
}

fn answer(name: &str, value: &str) -> ParameterAnswer {
    ParameterAnswer {
        name: name.to_string(),
        value: value.to_string(),
    }
}

async fn next(session: &mut Session) -> GenerationEvent {
    tokio::time::timeout(Duration::from_secs(1), session.next_event())
        .await
        .expect("event expected")
        .expect("stream still open")
}

/// Read events until `pred` matches
async fn next_matching(session: &mut Session, pred: impl Fn(&GenerationEvent) -> bool) -> GenerationEvent {
    loop {
        let event = next(session).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn streaming_session(f: &mut Fixture) {
    f.session
        .begin("Summarize my report and email it to me", RoutingMode::Manual(false))
        .await
        .unwrap();
    f.session.generate().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_optimize_flow_reaches_code_ready() {
    let mut f = fixture(optimize_service(), 1, "http://127.0.0.1:9");

    let begin = f
        .session
        .begin("Email me the weather", RoutingMode::Auto)
        .await
        .unwrap();
    assert!(!begin.decision.needs_reasoning);
    assert!(begin.first_reply.is_none());
    assert_eq!(f.session.state(), SessionState::Routing);

    f.session.generate().await.unwrap();
    assert_eq!(f.session.state(), SessionState::Streaming);

    let frame = f.servers[0].first_frame();
    assert_eq!(frame["prompt"], "Optimized: Email me the weather");
    assert_eq!(frame["needsReasoning"], false);
    assert!(frame.get("identifyParameters").is_none());

    f.servers[0].push(&text("Here you go:\n```python\nprint('sunny')\n```"));
    f.servers[0].push(&StreamMessage::done());

    let finished = next_matching(&mut f.session, |e| matches!(e, GenerationEvent::Finished(_))).await;
    assert!(matches!(finished, GenerationEvent::Finished(_)));
    assert_eq!(f.session.state(), SessionState::CodeReady);
    assert_eq!(f.session.code().unwrap().code, "print('sunny')");
    assert_eq!(next(&mut f.session).await, GenerationEvent::Ended(StreamOutcome::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_reasoning_flow_requires_chat_turns() {
    let service = FixedService {
        needs_reasoning: true,
        chat_reply: "Which city?".to_string(),
    };
    let mut f = fixture(service, 1, "http://127.0.0.1:9");

    let begin = f
        .session
        .begin("Tell me each morning if I need an umbrella", RoutingMode::Auto)
        .await
        .unwrap();
    assert_eq!(begin.first_reply.unwrap().content, "Which city?");
    assert_eq!(f.session.state(), SessionState::Clarifying);

    assert!(matches!(
        f.session.generate().await,
        Err(PilotError::InvalidRequest { .. })
    ));
    assert_eq!(f.session.state(), SessionState::Clarifying);

    for reply in ["Berlin", "7am", "Telegram", "Only if rain is above 50%"] {
        f.session.send_chat(reply).await.unwrap();
    }
    f.session.generate().await.unwrap();

    let frame = f.servers[0].first_frame();
    assert_eq!(frame["needsReasoning"], true);
    let prompt = frame["prompt"].as_str().unwrap();
    assert!(prompt.starts_with("Tell me each morning if I need an umbrella"));
    assert!(prompt.contains("A: Berlin"));
}

#[tokio::test(start_paused = true)]
async fn test_sniffed_questions_pause_until_answered() {
    let mut f = fixture(optimize_service(), 1, "http://127.0.0.1:9");
    streaming_session(&mut f).await;

    f.servers[0].push(&text(ASKING));
    f.servers[0].push(&text("import os\n"));

    let event = next_matching(&mut f.session, |e| matches!(e, GenerationEvent::ParametersRequested { .. })).await;
    match event {
        GenerationEvent::ParametersRequested { parameters, source } => {
            assert_eq!(source, ParameterSource::Sniffed);
            assert_eq!(parameters[0].name, "document_id");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(f.session.state(), SessionState::ParameterClarification);

    // Paused: the queued frame must not come through yet
    settle().await;
    assert!(tokio::time::timeout(Duration::from_millis(100), f.session.next_event())
        .await
        .is_err());

    assert!(f.session.submit_parameters(vec![]).await.is_err());
    f.session
        .submit_parameters(vec![answer("document_id", "1AbC")])
        .await
        .unwrap();
    assert_eq!(f.session.state(), SessionState::Streaming);
    assert_eq!(next(&mut f.session).await, GenerationEvent::Text("import os\n".to_string()));
    assert_eq!(f.session.context().unwrap().parameters, vec![answer("document_id", "1AbC")]);
    assert_eq!(f.log.lock().unwrap().as_slice(), ["open:1"]);
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_supersedes_paused_stream() {
    let mut f = fixture(optimize_service(), 2, "http://127.0.0.1:9");
    streaming_session(&mut f).await;

    f.servers[0].push(&text(ASKING));
    next_matching(&mut f.session, |e| matches!(e, GenerationEvent::ParametersRequested { .. })).await;

    f.session
        .regenerate_with_parameters(vec![answer("document_id", "1AbC")])
        .await
        .unwrap();

    assert_eq!(f.session.state(), SessionState::Streaming);
    assert_eq!(f.log.lock().unwrap().as_slice(), ["open:1", "close:1", "open:2"]);
    let prompt = f.servers[1].first_frame()["prompt"].as_str().unwrap().to_string();
    assert!(prompt.contains("PARAMETER VALUES:\n- document_id: 1AbC\n"));
}

#[tokio::test(start_paused = true)]
async fn test_identified_parameters_restart_generation() {
    let mut f = fixture(optimize_service(), 2, "http://127.0.0.1:9");
    f.session
        .begin("Summarize my report", RoutingMode::Manual(false))
        .await
        .unwrap();
    f.session.identify_parameters().await.unwrap();
    assert_eq!(f.servers[0].first_frame()["identifyParameters"], true);

    let mut frame = StreamMessage::new(StreamPhase::Reasoning, StreamKind::Parameters);
    frame.content = Some(serde_json::json!({"parameters": [
        {"name": "document_id", "description": "Drive doc", "default": null, "required": true}
    ]}));
    f.servers[0].push(&frame);
    f.servers[0].push(&StreamMessage::done());

    next_matching(&mut f.session, |e| matches!(e, GenerationEvent::ParametersRequested { .. })).await;
    assert_eq!(f.session.state(), SessionState::ParameterClarification);

    f.session
        .submit_parameters(vec![answer("document_id", "1AbC")])
        .await
        .unwrap();

    let second = f.servers[1].first_frame();
    assert!(second.get("identifyParameters").is_none());
    assert!(second["prompt"].as_str().unwrap().contains("- document_id: 1AbC"));
}

#[tokio::test(start_paused = true)]
async fn test_parameters_error_reason_reaches_user() {
    let mut f = fixture(optimize_service(), 1, "http://127.0.0.1:9");
    f.session
        .begin("Summarize my report", RoutingMode::Manual(false))
        .await
        .unwrap();
    f.session.identify_parameters().await.unwrap();

    let mut failure = StreamMessage::new(StreamPhase::Reasoning, StreamKind::ParametersError);
    failure.content = Some(serde_json::json!("Failed to parse parameters JSON: boom"));
    f.servers[0].push(&failure);
    f.servers[0].push(&StreamMessage::new(StreamPhase::Reasoning, StreamKind::ParametersDone));
    f.servers[0].push(&StreamMessage::done());

    next_matching(&mut f.session, |e| matches!(e, GenerationEvent::Ended(_))).await;

    assert_eq!(f.session.state(), SessionState::Error);
    assert_eq!(
        f.session.last_error(),
        Some("Parameter identification failed: Failed to parse parameters JSON: boom")
    );
    let notices: Vec<_> = std::iter::from_fn(|| f.notices.try_recv().ok()).collect();
    assert!(notices
        .iter()
        .any(|n| n.level == NoticeLevel::Error && n.message.contains("boom")));
}

#[tokio::test(start_paused = true)]
async fn test_error_frame_fails_session_and_reset_recovers() {
    let mut f = fixture(optimize_service(), 1, "http://127.0.0.1:9");
    streaming_session(&mut f).await;

    f.servers[0].push(&StreamMessage::error("quota exceeded"));
    next_matching(&mut f.session, |e| matches!(e, GenerationEvent::Failed(_))).await;

    assert_eq!(f.session.state(), SessionState::Error);
    assert!(f.session.last_error().unwrap().contains("quota exceeded"));
    let levels: Vec<_> = std::iter::from_fn(|| f.notices.try_recv().ok()).map(|n| n.level).collect();
    assert!(levels.contains(&NoticeLevel::Error));

    f.session.reset().await;
    assert_eq!(f.session.state(), SessionState::Idle);
    assert!(f.session.context().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_before_code_fails_session() {
    let mut f = fixture(optimize_service(), 1, "http://127.0.0.1:9");
    streaming_session(&mut f).await;

    f.servers[0].push(&text("Working on it"));
    f.servers.clear();

    next_matching(&mut f.session, |e| matches!(e, GenerationEvent::Ended(_))).await;
    assert_eq!(f.session.state(), SessionState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_fails_session() {
    let mut f = fixture(optimize_service(), 0, "http://127.0.0.1:9");
    f.session
        .begin("Email me the weather", RoutingMode::Manual(false))
        .await
        .unwrap();

    let err = f.session.generate().await.unwrap_err();
    assert!(matches!(err, PilotError::ConnectionFailed { attempts: 4 }));
    assert_eq!(f.session.state(), SessionState::Error);
}

#[tokio::test]
async fn test_actions_need_code() {
    let mut f = fixture(optimize_service(), 0, "http://127.0.0.1:9");
    let cancel = CancellationToken::new();

    let err = f
        .session
        .execute(&mut ExecutionLog::new(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PilotError::InvalidTransition { .. }));
    assert!(f.session.test(&cancel).await.is_err());
    assert!(f.session.set_code("print(1)").is_err());
    assert_eq!(f.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_execute_returns_to_code_ready() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/agents/v2/execute")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "prompt": "Email me the weather",
            "code": "print('edited')"
        })))
        .with_status(200)
        .with_body("edited\n")
        .create_async()
        .await;

    let mut f = fixture(optimize_service(), 1, &server.url());
    f.session
        .begin("Email me the weather", RoutingMode::Manual(false))
        .await
        .unwrap();
    f.session.generate().await.unwrap();
    f.servers[0].push(&text("def main():\n    print('sunny')\n"));
    f.servers[0].push(&StreamMessage::done());
    next_matching(&mut f.session, |e| matches!(e, GenerationEvent::Finished(_))).await;

    f.session.set_code("print('edited')").unwrap();
    let mut log = ExecutionLog::new();
    f.session
        .execute(&mut log, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(log.as_str(), "edited\n");
    assert_eq!(f.session.state(), SessionState::CodeReady);
    mock.assert_async().await;
}
